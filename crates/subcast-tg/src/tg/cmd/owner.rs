use crate::broadcast::MessagePayload;
use crate::broadcast::SubscriberStore;
use crate::prelude::*;
use crate::{tg, Result};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug)]
#[command(
    rename_rule = "snake_case",
    description = "The following commands are available to the bot owners:"
)]
pub(crate) enum Cmd {
    #[command(description = "display this text")]
    OwnerHelp,

    #[command(description = "\
        send the text to every subscriber; reply with this command \
        to a message to broadcast a copy of that message instead")]
    Broadcast(String),

    #[command(description = "stop the running broadcast")]
    CancelBroadcast,

    #[command(description = "show the number of subscribers")]
    Stats,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum BroadcastCommandError {
    #[error(
        "Usage: /broadcast <text>, or reply with /broadcast to the message \
        that you want to broadcast"
    )]
    EmptyPayload,

    #[error("A broadcast is already running. Cancel it with /cancel_broadcast first")]
    AlreadyRunning,

    #[error("There is no broadcast running right now")]
    NotRunning,
}

pub(crate) fn filter(ctx: Arc<tg::Ctx>, msg: Message) -> bool {
    let Some(user) = msg.from() else {
        return false;
    };

    let is_owner = ctx.cfg.is_owner(user.id);

    if !is_owner {
        info!(
            user = %user.debug_id(),
            "Non-owner user tried to access owner command"
        );
    }

    is_owner
}

#[async_trait]
impl tg::cmd::Command for Cmd {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        match self {
            Cmd::OwnerHelp => {
                ctx.bot.reply_help::<Cmd>(msg).await?;
            }
            Cmd::Broadcast(text) => {
                let payload = broadcast_payload(text, msg)?;
                ctx.broadcaster.start(msg.chat.id, payload).await?;
            }
            Cmd::CancelBroadcast => {
                if !ctx.broadcaster.slot().cancel() {
                    return Err(err!(BroadcastCommandError::NotRunning));
                }
                ctx.bot
                    .reply(msg, "Cancelling the broadcast after the current recipient...")
                    .await?;
            }
            Cmd::Stats => {
                let total = ctx.db.subscriber.count().await?;
                let broadcast = if ctx.broadcaster.slot().is_running() {
                    "running"
                } else {
                    "idle"
                };

                let text = format!("📊 Subscribers: {total}\nBroadcast: {broadcast}");
                ctx.bot.reply(msg, text).await?;
            }
        }
        Ok(())
    }
}

/// The text of the command wins over the replied-to message
fn broadcast_payload(text: String, msg: &Message) -> Result<MessagePayload> {
    let text = text.trim();

    if !text.is_empty() {
        return Ok(MessagePayload::Text(text.to_owned()));
    }

    let Some(reply) = msg.reply_to_message() else {
        return Err(err!(BroadcastCommandError::EmptyPayload));
    };

    Ok(MessagePayload::Copy {
        from_chat: reply.chat.id,
        message_id: reply.id,
    })
}
