use async_trait::async_trait;
use teloxide::types::{ChatId, ChatMemberKind, MessageId, UserId};
use teloxide::RequestError;

/// The content of a broadcast. The engine passes it through as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MessagePayload {
    Text(String),

    /// Copy an existing message, preserving its media and formatting,
    /// but without the "forwarded from" header.
    Copy {
        from_chat: ChatId,
        message_id: MessageId,
    },
}

/// The subset of the Telegram API that the bot's core logic depends on
#[async_trait]
pub(crate) trait Transport: Send + Sync {
    async fn dispatch(&self, recipient: ChatId, payload: &MessagePayload)
        -> Result<(), RequestError>;

    async fn membership(&self, channel: ChatId, user: UserId)
        -> Result<ChatMemberKind, RequestError>;
}
