//! In-memory doubles of the broadcast collaborators

use super::{
    MessagePayload, ProgressSink, ProgressSnapshot, Subscriber, SubscriberKey, SubscriberStore,
    Transport,
};
use crate::db::DbError;
use crate::error::fatal;
use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::{ChatId, ChatMemberKind, UserId};
use teloxide::{ApiError, RequestError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub(crate) struct FakeStore {
    state: Arc<Mutex<FakeStoreState>>,
}

#[derive(Default)]
struct FakeStoreState {
    subscribers: BTreeMap<SubscriberKey, ChatId>,
    next_key: i64,
    page_sizes: Vec<usize>,
    removed: Vec<ChatId>,
    fail_pages: bool,
    fail_removals: bool,
}

impl FakeStore {
    pub(crate) fn with_recipients(ids: impl IntoIterator<Item = i64>) -> Self {
        let store = Self::default();
        for id in ids {
            store.add(ChatId(id));
        }
        store
    }

    pub(crate) fn add(&self, chat_id: ChatId) {
        let mut state = self.state.lock();
        state.next_key += 1;
        let key = SubscriberKey(state.next_key);
        state.subscribers.insert(key, chat_id);
    }

    /// Removes the subscriber bypassing the [`SubscriberStore`] bookkeeping
    pub(crate) fn remove_now(&self, chat_id: ChatId) {
        self.state
            .lock()
            .subscribers
            .retain(|_, subscriber| *subscriber != chat_id);
    }

    pub(crate) fn fail_pages(&self) {
        self.state.lock().fail_pages = true;
    }

    pub(crate) fn fail_removals(&self) {
        self.state.lock().fail_removals = true;
    }

    pub(crate) fn contains(&self, chat_id: ChatId) -> bool {
        self.state
            .lock()
            .subscribers
            .values()
            .any(|subscriber| *subscriber == chat_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Sizes of all pages returned so far
    pub(crate) fn page_sizes(&self) -> Vec<usize> {
        self.state.lock().page_sizes.clone()
    }

    /// Subscribers that were actually deleted via [`SubscriberStore::remove`]
    pub(crate) fn removed(&self) -> Vec<ChatId> {
        self.state.lock().removed.clone()
    }
}

fn unavailable() -> crate::Error {
    DbError::Query {
        source: sqlx::Error::PoolTimedOut,
    }
    .into()
}

#[async_trait]
impl SubscriberStore for FakeStore {
    async fn page(&self, after: Option<SubscriberKey>, limit: u32) -> Result<Vec<Subscriber>> {
        let mut state = self.state.lock();
        if state.fail_pages {
            return Err(unavailable());
        }

        let lower = match after {
            Some(after) => std::ops::Bound::Excluded(after),
            None => std::ops::Bound::Unbounded,
        };

        let page: Vec<_> = state
            .subscribers
            .range((lower, std::ops::Bound::Unbounded))
            .take(limit as usize)
            .map(|(&key, &chat_id)| Subscriber { key, chat_id })
            .collect();

        state.page_sizes.push(page.len());

        Ok(page)
    }

    async fn remove(&self, chat_id: ChatId) -> Result<bool> {
        let mut state = self.state.lock();
        if state.fail_removals {
            return Err(unavailable());
        }

        let before = state.subscribers.len();
        state.subscribers.retain(|_, subscriber| *subscriber != chat_id);
        let existed = state.subscribers.len() != before;

        if existed {
            state.removed.push(chat_id);
        }

        Ok(existed)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.state.lock().subscribers.len() as u64)
    }
}

/// What the fake transport answers to a single dispatch attempt
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    RetryAfter(Duration),
    Blocked,
    ChatNotFound,
    Io,
    Unknown(&'static str),
}

impl Reply {
    fn into_error(self) -> RequestError {
        match self {
            Reply::RetryAfter(duration) => RequestError::RetryAfter(duration),
            Reply::Blocked => RequestError::Api(ApiError::BotBlocked),
            Reply::ChatNotFound => RequestError::Api(ApiError::ChatNotFound),
            Reply::Io => RequestError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
            Reply::Unknown(description) => {
                RequestError::Api(ApiError::Unknown(description.to_owned()))
            }
        }
    }
}

type DispatchHook = Box<dyn Fn() + Send + Sync>;

/// Delivers successfully unless a scripted failure is queued for the recipient.
#[derive(Clone, Default)]
pub(crate) struct FakeTransport {
    state: Arc<Mutex<FakeTransportState>>,
}

#[derive(Default)]
struct FakeTransportState {
    scripts: HashMap<ChatId, VecDeque<Reply>>,
    hooks: HashMap<ChatId, DispatchHook>,
    log: Vec<(ChatId, Instant)>,
    members: HashMap<(ChatId, UserId), ChatMemberKind>,
}

impl FakeTransport {
    /// Queues failures for the next dispatch attempts to the recipient.
    /// Attempts beyond the script succeed.
    pub(crate) fn script(&self, recipient: ChatId, replies: impl IntoIterator<Item = Reply>) {
        self.state
            .lock()
            .scripts
            .entry(recipient)
            .or_default()
            .extend(replies);
    }

    /// Runs `hook` on every dispatch attempt to the recipient
    pub(crate) fn on_dispatch(&self, recipient: ChatId, hook: impl Fn() + Send + Sync + 'static) {
        self.state.lock().hooks.insert(recipient, Box::new(hook));
    }

    pub(crate) fn set_membership(&self, channel: ChatId, user: UserId, kind: ChatMemberKind) {
        self.state.lock().members.insert((channel, user), kind);
    }

    /// All dispatch attempts in the order they happened
    pub(crate) fn log(&self) -> Vec<(ChatId, Instant)> {
        self.state.lock().log.clone()
    }

    pub(crate) fn attempts_of(&self, recipient: ChatId) -> usize {
        self.attempt_instants(recipient).len()
    }

    pub(crate) fn attempt_instants(&self, recipient: ChatId) -> Vec<Instant> {
        self.state
            .lock()
            .log
            .iter()
            .filter(|(chat_id, _)| *chat_id == recipient)
            .map(|(_, instant)| *instant)
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn dispatch(
        &self,
        recipient: ChatId,
        _payload: &MessagePayload,
    ) -> Result<(), RequestError> {
        let mut state = self.state.lock();

        state.log.push((recipient, Instant::now()));

        if let Some(hook) = state.hooks.get(&recipient) {
            hook();
        }

        match state.scripts.get_mut(&recipient).and_then(VecDeque::pop_front) {
            Some(reply) => Err(reply.into_error()),
            None => Ok(()),
        }
    }

    async fn membership(
        &self,
        channel: ChatId,
        user: UserId,
    ) -> Result<ChatMemberKind, RequestError> {
        self.state
            .lock()
            .members
            .get(&(channel, user))
            .cloned()
            .ok_or(RequestError::Api(ApiError::UserNotFound))
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    snapshots: Mutex<Vec<ProgressSnapshot>>,
    fail: bool,
    cancel: Option<CancellationToken>,
}

impl RecordingSink {
    /// Records the snapshots, but reports an error for each of them
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Cancels the broadcast on the first snapshot
    pub(crate) fn cancelling(cancel: CancellationToken) -> Self {
        Self {
            cancel: Some(cancel),
            ..Default::default()
        }
    }

    pub(crate) fn snapshots(&self) -> Vec<ProgressSnapshot> {
        self.snapshots.lock().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn emit(&self, snapshot: ProgressSnapshot) -> Result {
        self.snapshots.lock().push(snapshot);

        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }

        if self.fail {
            return Err(fatal!("the progress message was deleted"));
        }

        Ok(())
    }
}
