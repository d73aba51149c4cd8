mod ext;
mod macros;

use crate::prelude::*;
use crate::util::DynError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing_error::SpanTrace;

pub(crate) use ext::*;
pub(crate) use macros::*;

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Any error of the bot. Cheap to clone, so that it can be both logged and
/// reported to the user.
#[derive(Clone)]
pub struct Error {
    imp: Arc<ErrorImp>,
}

struct ErrorImp {
    /// Short random id that is shown to the user together with the error
    /// message, so that the related logs can be looked up by it.
    id: String,
    kind: ErrorKind,

    /// Shown only in the [`fmt::Debug`] output
    spantrace: SpanTrace,
}

#[derive(Error, Debug)]
pub(crate) enum ErrorKind {
    #[error(transparent)]
    BroadcastCommand {
        #[from]
        source: crate::tg::BroadcastCommandError,
    },

    #[error(transparent)]
    StoredFileCommand {
        #[from]
        source: crate::tg::StoredFileCommandError,
    },

    #[error(transparent)]
    Broadcast {
        #[from]
        source: crate::broadcast::BroadcastError,
    },

    #[error(transparent)]
    Tg {
        #[from]
        source: teloxide::RequestError,
    },

    #[error(transparent)]
    Db {
        #[from]
        source: crate::db::DbError,
    },

    /// Something that must never happen. There is no way to handle it other
    /// than to give up on the current request.
    #[error("FATAL: {message}")]
    Fatal {
        message: String,
        source: Option<Box<DynError>>,
    },
}

impl From<sqlx::Error> for ErrorKind {
    fn from(err: sqlx::Error) -> Self {
        Self::Db { source: err.into() }
    }
}

impl Error {
    pub(crate) fn id(&self) -> &str {
        &self.imp.id
    }

    /// Whether the error is caused by the user's input rather than by the bot.
    /// Such errors are replied with a plain message and aren't logged as warnings.
    pub(crate) fn is_user_error(&self) -> bool {
        match &self.imp.kind {
            ErrorKind::BroadcastCommand { .. } | ErrorKind::StoredFileCommand { .. } => true,
            ErrorKind::Broadcast { .. }
            | ErrorKind::Tg { .. }
            | ErrorKind::Db { .. }
            | ErrorKind::Fatal { .. } => false,
        }
    }

    pub(crate) fn kind(&self) -> &ErrorKind {
        &self.imp.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error (id: {}): {}", self.imp.id, self.imp.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.imp.kind.source()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)?;
        fmt::Display::fmt(&self.imp.spantrace, f)
    }
}

impl<T: Into<ErrorKind>> From<T> for Error {
    #[track_caller]
    fn from(kind: T) -> Self {
        let imp = ErrorImp {
            kind: kind.into(),
            id: nanoid::nanoid!(6),
            spantrace: SpanTrace::capture(),
        };

        let err = Self { imp: Arc::new(imp) };

        trace!(err = tracing_err(&err), "Created an error");

        err
    }
}
