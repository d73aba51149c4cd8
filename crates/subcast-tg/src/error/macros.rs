//! Shorthands for constructing [`Error`](super::Error) values at the call site.

/// Builds an [`Error`](super::Error) out of a variant of any error enum that
/// converts into [`ErrorKind`](super::ErrorKind). Every field value goes
/// through [`Into`], a bare field name is taken from the local variable of
/// the same name.
///
/// ```ignore
/// err!(StoredFileCommandError::NotFound)
/// err!(BroadcastError::InvalidRate { rate })
/// ```
macro_rules! err {
    (@field $name:ident) => ($name);
    (@field $name:ident $value:expr) => ($value);
    ($variant:path $({
        $( $name:ident $(: $value:expr)? ),*
        $(,)?
    })?) => {{
        use $variant as Variant;

        $crate::error::Error::from(
            Variant $({$(
                $name: ::std::convert::Into::into(
                    $crate::error::err!(@field $name $($value)?)
                )
            ),*})?
        )
    }};
}

/// Closure for `map_err` that puts the mapped error into the `source` field
/// of the variant. The rest of the fields are passed as in [`err!`].
macro_rules! err_ctx {
    ($variant:path $({ $($fields:tt)* })?) => {
        |source| $crate::error::err!($variant { source, $($($fields)*)? })
    };
}

/// [`ErrorKind::Fatal`](super::ErrorKind::Fatal) with a `format!`-style message
macro_rules! fatal {
    ($($arg:tt)+) => {
        $crate::error::err!($crate::error::ErrorKind::Fatal {
            message: format!($($arg)+),
            source: None::<Box<$crate::util::DynError>>,
        })
    };
}

pub(crate) use err;
pub(crate) use err_ctx;
pub(crate) use fatal;
