use crate::broadcast::{
    self, BroadcastEngine, MessagePayload, ProgressSink, ProgressSnapshot, RateLimiter,
};
use crate::db::SubscriberRepo;
use crate::prelude::*;
use crate::tg::{Bot, BroadcastCommandError};
use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Allows at most one broadcast to run at a time.
#[derive(Clone, Default)]
pub(crate) struct BroadcastSlot {
    active: Arc<Mutex<Option<CancellationToken>>>,

    /// The task of the latest broadcast, it may have already finished
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Keeps the [`BroadcastSlot`] occupied until dropped
pub(crate) struct SlotGuard {
    slot: BroadcastSlot,
    cancel: CancellationToken,
}

impl BroadcastSlot {
    /// Returns `None` if there is already a broadcast running
    pub(crate) fn try_claim(&self) -> Option<SlotGuard> {
        let mut active = self.active.lock();
        if active.is_some() {
            return None;
        }

        let cancel = CancellationToken::new();
        *active = Some(cancel.clone());

        Some(SlotGuard {
            slot: self.clone(),
            cancel,
        })
    }

    /// Returns `false` if there was nothing to cancel
    pub(crate) fn cancel(&self) -> bool {
        match &*self.active.lock() {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    pub(crate) fn attach(&self, task: JoinHandle<()>) {
        *self.task.lock() = Some(task);
    }

    /// Cancels the running broadcast and waits until its task completes,
    /// but not longer than `grace`.
    pub(crate) async fn stop(&self, grace: Duration) -> Result {
        let Some(task) = self.task.lock().take() else {
            return Ok(());
        };

        if self.cancel() {
            info!("Cancelled the running broadcast, waiting for it to finish...");
        }

        tokio::time::timeout(grace, task)
            .await
            .map_err(|_| {
                fatal!(
                    "The broadcast didn't finish within {} after cancellation",
                    grace.whole_secs_display()
                )
            })?
            .fatal_ctx(|| "The broadcast task panicked")
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slot.active.lock().take();
    }
}

/// Runs broadcasts in the background, so that the bot keeps handling
/// updates (including the request to cancel the broadcast) meanwhile.
pub(crate) struct Broadcaster {
    bot: Bot,
    subscribers: SubscriberRepo,
    limiter: Arc<RateLimiter>,
    cfg: broadcast::Config,
    slot: BroadcastSlot,
}

impl Broadcaster {
    pub(crate) fn new(
        bot: Bot,
        subscribers: SubscriberRepo,
        limiter: Arc<RateLimiter>,
        cfg: broadcast::Config,
    ) -> Self {
        Self {
            bot,
            subscribers,
            limiter,
            cfg,
            slot: Default::default(),
        }
    }

    pub(crate) fn slot(&self) -> &BroadcastSlot {
        &self.slot
    }

    /// Claims the slot, posts the status message to the `owner_chat` and
    /// spawns the broadcast.
    pub(crate) async fn start(&self, owner_chat: ChatId, payload: MessagePayload) -> Result {
        let guard = self
            .slot
            .try_claim()
            .ok_or_else(|| err!(BroadcastCommandError::AlreadyRunning))?;

        let status = self
            .bot
            .send_message(owner_chat, "Broadcast is starting...")
            .await?;

        let engine = BroadcastEngine::new(
            self.bot.clone(),
            self.subscribers.clone(),
            self.limiter.clone(),
            self.cfg.clone(),
        );

        let sink = StatusMessage {
            bot: self.bot.clone(),
            chat: owner_chat,
            message: status.id,
        };

        let bot = self.bot.clone();
        let span = info_span!("broadcast", owner_chat = %owner_chat);

        let task = tokio::spawn(
            async move {
                let (result, elapsed) = engine
                    .run(&payload, &sink, &guard.cancel)
                    .with_duration()
                    .await;

                let summary = match result {
                    Ok(report) => format!("{report}\nTook: {}", elapsed.whole_secs_display()),
                    Err(err) => {
                        error!(err = tracing_err(&err), "Broadcast was aborted");
                        format!("Broadcast was aborted: {}", err.display_chain())
                    }
                };

                // Release the slot before the summary, so the owner may
                // start the next broadcast right when they see it
                drop(guard);

                if let Err(err) = bot.send_message(owner_chat, summary).await {
                    warn!(err = tracing_err(&err), "Failed to send the broadcast summary");
                }
            }
            .instrument(span),
        );

        self.slot.attach(task);

        Ok(())
    }

    /// Stops the running broadcast, if any, on the bot shutdown. The owner
    /// still gets the report of the cancelled run.
    pub(crate) async fn shutdown(&self) -> Result {
        self.slot.stop(self.cfg.shutdown_grace()).await
    }
}

/// Reports the progress by editing the status message of the broadcast
struct StatusMessage {
    bot: Bot,
    chat: ChatId,
    message: MessageId,
}

#[async_trait]
impl ProgressSink for StatusMessage {
    async fn emit(&self, snapshot: ProgressSnapshot) -> Result {
        self.bot
            .edit_message_text(self.chat, self.message, snapshot.to_string())
            .await?;
        Ok(())
    }
}
