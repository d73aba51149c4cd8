//! Owners send media to the bot, it keeps a copy in the storage chat and
//! replies with a deep link that anyone can open to receive the file.

use crate::db::NewStoredFile;
use crate::prelude::*;
use crate::{tg, Result};
use async_trait::async_trait;
use teloxide::prelude::*;

const SLUG_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoredFileCommandError {
    #[error("⛔ You don't have access to upload files")]
    AccessDenied,

    #[error("File storage isn't configured for this bot")]
    StorageDisabled,

    #[error("❌ The file was not found or the link is no longer valid")]
    NotFound,
}

/// A message with media, that an owner wants to store
#[derive(Debug, Clone)]
pub(crate) struct Upload;

pub(crate) fn filter(msg: Message) -> Option<Upload> {
    let has_media = msg.document().is_some()
        || msg.video().is_some()
        || msg.audio().is_some()
        || msg.voice().is_some()
        || msg.photo().is_some()
        || msg.animation().is_some()
        || msg.sticker().is_some()
        || msg.video_note().is_some();

    (has_media && msg.chat.is_private()).then_some(Upload)
}

#[async_trait]
impl tg::cmd::Command for Upload {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        let user = msg
            .from()
            .filter(|user| ctx.cfg.is_owner(user.id))
            .ok_or_else(|| err!(StoredFileCommandError::AccessDenied))?;

        let storage_chat = ctx
            .cfg
            .storage_chat
            .ok_or_else(|| err!(StoredFileCommandError::StorageDisabled))?;

        let stored = ctx
            .bot
            .copy_message(storage_chat, msg.chat.id, msg.id)
            .await?;

        let slug = nanoid::nanoid!(SLUG_LEN);

        ctx.db
            .stored_file
            .insert(NewStoredFile {
                slug: &slug,
                storage_chat,
                storage_message: stored,
                uploaded_by: user.id,
                original_chat: msg.chat.id,
                original_message: msg.id,
            })
            .await?;

        info!(slug, "Stored a new file");

        let text = match ctx.cfg.deep_link(&slug) {
            Some(link) => format!("✅ Stored!\n🔗 Public link:\n{link}"),
            None => format!(
                "✅ Stored!\nSlug: {slug}\n\
                Set TG_BOT_USERNAME to get t.me links generated automatically."
            ),
        };

        ctx.bot.reply(msg, text).await?;

        Ok(())
    }
}
