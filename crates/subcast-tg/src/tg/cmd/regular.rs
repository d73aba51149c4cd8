use crate::db::NewSubscriber;
use crate::prelude::*;
use crate::tg::{self, join_gate, StoredFileCommandError};
use crate::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug)]
#[command(
    rename_rule = "snake_case",
    description = "The following commands are available:"
)]
pub(crate) enum Cmd {
    #[command(description = "display this text")]
    Help,
}

#[async_trait]
impl tg::cmd::Command for Cmd {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        match self {
            Cmd::Help => {
                ctx.bot.reply_help::<Cmd>(msg).await?;
            }
        }
        Ok(())
    }
}

/// `/start` is sent by Telegram automatically when the user opens the bot,
/// optionally with the payload of a `t.me/<bot>?start=<payload>` deep link.
///
/// We don't want this command to appear in the help message, so we handle
/// it separately
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "snake_case")]
pub(crate) enum StartCommand {
    #[command(description = "unreachable")]
    Start(String),
}

#[async_trait]
impl tg::cmd::Command for StartCommand {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        let StartCommand::Start(slug) = self;

        let new = ctx
            .db
            .subscriber
            .upsert(NewSubscriber {
                chat_id: msg.chat.id,
                user: msg.from(),
            })
            .await?;

        let slug = slug.trim();

        if slug.is_empty() {
            let greeting = if new {
                "✅ You are subscribed to the updates now."
            } else {
                "✅ You are already subscribed to the updates."
            };

            let text = format!(
                "{greeting}\n\nIf you have a link to a file, open it to receive the file."
            );

            ctx.bot.reply(msg, text).await?;
            return Ok(());
        }

        send_stored_file(ctx, msg, slug).await
    }
}

#[instrument(skip(ctx, msg))]
async fn send_stored_file(ctx: &tg::Ctx, msg: &Message, slug: &str) -> Result {
    if let (Some(channel), Some(user)) = (ctx.cfg.required_channel, msg.from()) {
        if !join_gate::is_member(&ctx.bot, channel, user.id).await {
            let text = match channel_link(ctx, channel).await {
                Some(link) => format!(
                    "Please join the channel first, then open the link again:\n{link}"
                ),
                None => "Please join our channel first, then open the link again.".to_owned(),
            };

            ctx.bot.reply(msg, text).await?;
            return Ok(());
        }
    }

    let file = ctx
        .db
        .stored_file
        .get_by_slug(slug)
        .await?
        .ok_or_else(|| err!(StoredFileCommandError::NotFound))?;

    info!(
        uploaded_by = file.uploaded_by,
        original_chat_id = file.original_chat_id,
        original_message_id = file.original_message_id,
        created_at = %file.created_at,
        "Sending stored file"
    );

    ctx.bot
        .copy_message(msg.chat.id, file.storage_chat(), file.storage_message())
        .await?;

    Ok(())
}

async fn channel_link(ctx: &tg::Ctx, channel: ChatId) -> Option<String> {
    let chat = ctx
        .bot
        .get_chat(channel)
        .await
        .map_err(|err| warn!(err = tracing_err(&err), "Failed to get the required channel"))
        .ok()?;

    if let Some(username) = chat.username() {
        return Some(format!("https://t.me/{username}"));
    }

    chat.invite_link().map(ToOwned::to_owned)
}

/// Private messages that no other handler picked up
#[derive(Debug, Clone)]
pub(crate) struct Fallback;

pub(crate) fn filter_fallback(msg: Message) -> Option<Fallback> {
    msg.chat.is_private().then_some(Fallback)
}

#[async_trait]
impl tg::cmd::Command for Fallback {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        let is_owner = msg.from().is_some_and(|user| ctx.cfg.is_owner(user.id));

        let text = if is_owner {
            "Send me a file (document, video, audio, photo, etc.) to store it \
            and get a shareable link."
        } else {
            "Open the file link that you have (t.me/<bot>?start=...) to receive the file."
        };

        ctx.bot.reply(msg, text).await?;

        Ok(())
    }
}
