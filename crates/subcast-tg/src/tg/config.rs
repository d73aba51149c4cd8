use serde::Deserialize;
use teloxide::types::{ChatId, UserId};

#[derive(Deserialize, Clone)]
pub(crate) struct Config {
    pub(crate) token: String,

    /// IDs of the users who may broadcast and upload files
    pub(crate) owners: Vec<UserId>,

    /// Used to build `t.me` deep links to the stored files
    pub(crate) bot_username: Option<String>,

    /// Private channel where the uploaded files are kept. File uploads
    /// are disabled if this isn't set.
    pub(crate) storage_chat: Option<ChatId>,

    /// Users must be members of this channel to receive stored files
    pub(crate) required_channel: Option<ChatId>,
}

impl Config {
    pub(crate) fn is_owner(&self, user: UserId) -> bool {
        self.owners.contains(&user)
    }

    pub(crate) fn deep_link(&self, slug: &str) -> Option<String> {
        let username = self.bot_username.as_deref()?.trim_start_matches('@');
        Some(format!("https://t.me/{username}?start={slug}"))
    }
}
