use crate::Result;
use async_trait::async_trait;
use teloxide::types::ChatId;

/// Position of a subscriber in creation order. Subscribers registered later
/// always get a greater key, so a cursor that walks the keys in ascending
/// order never skips rows and sees the new ones at the very end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct SubscriberKey(pub(crate) i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Subscriber {
    pub(crate) key: SubscriberKey,
    pub(crate) chat_id: ChatId,
}

/// Persistent list of broadcast recipients.
///
/// Any error returned from these methods means the store is unavailable,
/// which is fatal for the broadcast that is currently running.
#[async_trait]
pub(crate) trait SubscriberStore: Send + Sync {
    /// Returns at most `limit` subscribers with keys strictly greater than
    /// `after` in ascending key order.
    async fn page(&self, after: Option<SubscriberKey>, limit: u32) -> Result<Vec<Subscriber>>;

    /// Removes the subscriber. Removing an absent subscriber is not an error,
    /// the returned flag says whether anything was actually deleted.
    async fn remove(&self, chat_id: ChatId) -> Result<bool>;

    async fn count(&self) -> Result<u64>;
}
