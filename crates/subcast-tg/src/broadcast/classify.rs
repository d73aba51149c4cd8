use std::time::Duration;
use teloxide::{ApiError, RequestError};

/// Result of a single attempt to deliver a message to one recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchOutcome {
    Delivered,

    /// Telegram's flood control asked us to wait before trying again
    RateLimited { retry_after: Duration },

    /// The recipient blocked the bot or doesn't exist anymore.
    /// There is no point in keeping them in the subscribers list.
    PermanentlyUnreachable,

    /// Anything else. We don't know whether it will go away, so it's
    /// only counted as a failure.
    TransientFailure,
}

/// Fragments of Telegram error descriptions that tell the recipient can't be
/// reached anymore. Telegram reports some of these as `Bad Request`, which
/// is otherwise used for malformed payloads, so teloxide doesn't always map
/// them to a dedicated [`ApiError`] variant.
const UNREACHABLE_RECIPIENT_MARKERS: &[&str] = &[
    "bot was blocked",
    "bot was kicked",
    "bot can't initiate conversation",
    "chat not found",
    "user not found",
    "user is deactivated",
    "group chat was deactivated",
    "peer_id_invalid",
];

/// Maps a failed dispatch to the outcome that drives the broadcast policy.
///
/// A successful dispatch is never classified, it is [`DispatchOutcome::Delivered`]
/// by definition.
pub(crate) fn classify(err: &RequestError) -> DispatchOutcome {
    match err {
        RequestError::RetryAfter(retry_after) => DispatchOutcome::RateLimited {
            retry_after: *retry_after,
        },
        RequestError::Api(api_err) => classify_api(api_err),
        _ => DispatchOutcome::TransientFailure,
    }
}

fn classify_api(err: &ApiError) -> DispatchOutcome {
    match err {
        ApiError::BotBlocked
        | ApiError::BotKicked
        | ApiError::BotKickedFromSupergroup
        | ApiError::CantInitiateConversation
        | ApiError::CantTalkWithBots
        | ApiError::ChatNotFound
        | ApiError::UserNotFound
        | ApiError::UserDeactivated
        | ApiError::GroupDeactivated => DispatchOutcome::PermanentlyUnreachable,
        ApiError::Unknown(description) => classify_description(description),
        _ => DispatchOutcome::TransientFailure,
    }
}

fn classify_description(description: &str) -> DispatchOutcome {
    let description = description.to_lowercase();

    let unreachable = description.starts_with("forbidden")
        || UNREACHABLE_RECIPIENT_MARKERS
            .iter()
            .any(|marker| description.contains(marker));

    if unreachable {
        DispatchOutcome::PermanentlyUnreachable
    } else {
        DispatchOutcome::TransientFailure
    }
}
