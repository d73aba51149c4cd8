use crate::broadcast::{MessagePayload, Transport};
use crate::tg::Bot;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatMemberKind, UserId};
use teloxide::RequestError;

#[async_trait]
impl Transport for Bot {
    async fn dispatch(
        &self,
        recipient: ChatId,
        payload: &MessagePayload,
    ) -> Result<(), RequestError> {
        match payload {
            MessagePayload::Text(text) => {
                self.send_message(recipient, text.clone()).await?;
            }
            MessagePayload::Copy {
                from_chat,
                message_id,
            } => {
                self.copy_message(recipient, *from_chat, *message_id)
                    .await?;
            }
        }
        Ok(())
    }

    async fn membership(
        &self,
        channel: ChatId,
        user: UserId,
    ) -> Result<ChatMemberKind, RequestError> {
        Ok(self.get_chat_member(channel, user).await?.kind)
    }
}
