use super::{Subscriber, SubscriberKey, SubscriberStore};
use crate::prelude::*;
use crate::Result;
use std::num::NonZeroU32;
use teloxide::types::ChatId;

/// Pull-based traversal over the whole subscriber list that keeps at most
/// one page of subscribers in memory.
///
/// It uses keyset pagination, so each page is a separate short query and no
/// database connection is held between the pages. The cursor is single-use:
/// open a new one for every broadcast.
pub(crate) struct SubscriberCursor<'s, S: ?Sized> {
    store: &'s S,
    batch_size: NonZeroU32,
    after: Option<SubscriberKey>,
    page: std::vec::IntoIter<Subscriber>,
    exhausted: bool,
    pages_fetched: u32,
}

impl<'s, S: SubscriberStore + ?Sized> SubscriberCursor<'s, S> {
    pub(crate) fn new(store: &'s S, batch_size: NonZeroU32) -> Self {
        Self {
            store,
            batch_size,
            after: None,
            page: Vec::new().into_iter(),
            exhausted: false,
            pages_fetched: 0,
        }
    }

    /// Returns the next recipient or `None` once the subscribers are over.
    pub(crate) async fn next(&mut self) -> Result<Option<ChatId>> {
        loop {
            if let Some(subscriber) = self.page.next() {
                self.after = Some(subscriber.key);
                return Ok(Some(subscriber.chat_id));
            }

            if self.exhausted {
                return Ok(None);
            }

            let page = self.store.page(self.after, self.batch_size.get()).await?;

            self.pages_fetched += 1;

            // A short page means there is nothing after it, which saves
            // us one extra query that would return an empty page.
            self.exhausted = page.len() < self.batch_size.get() as usize;

            debug!(
                page = self.pages_fetched,
                len = page.len(),
                after = self.after.map(|key| key.0),
                exhausted = self.exhausted,
                "Fetched a page of subscribers"
            );

            self.page = page.into_iter();
        }
    }

    pub(crate) fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }
}
