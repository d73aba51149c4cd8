//! Telegram commands root module

mod broadcaster;
mod cmd;
mod config;
mod join_gate;
mod transport;
mod upload;

use crate::broadcast::{self, RateLimiter};
use crate::observability::metrics::{TG_UPDATES_SKIPPED_TOTAL, TG_UPDATES_TOTAL};
use crate::prelude::*;
use crate::util::DynError;
use crate::{db, Result};
use broadcaster::Broadcaster;
use dptree::di::DependencyMap;
use std::sync::Arc;
use teloxide::adaptors::{CacheMe, Throttle, Trace};
use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

pub(crate) use cmd::BroadcastCommandError;
pub(crate) use config::*;
pub(crate) use upload::StoredFileCommandError;

pub(crate) type Bot = Trace<CacheMe<Throttle<teloxide::Bot>>>;

pub(crate) struct Ctx {
    bot: Bot,
    db: Arc<db::Repo>,
    cfg: Arc<Config>,
    broadcaster: Broadcaster,
}

pub(crate) struct RunBotOptions {
    pub(crate) tg_cfg: Config,
    pub(crate) broadcast_cfg: broadcast::Config,
    pub(crate) db: db::Repo,
}

pub(crate) async fn run_bot(opts: RunBotOptions) -> Result {
    let mut di = DependencyMap::new();

    let bot: Bot = teloxide::Bot::new(opts.tg_cfg.token.clone())
        .throttle(Default::default())
        .cache_me()
        .trace(teloxide::adaptors::trace::Settings::all());

    // The only instance in the process. Everything that sends messages
    // in bulk must share it.
    let limiter = Arc::new(RateLimiter::per_second(opts.broadcast_cfg.rate)?);

    let broadcaster = Broadcaster::new(
        bot.clone(),
        opts.db.subscriber.clone(),
        limiter,
        opts.broadcast_cfg,
    );

    let ctx = Arc::new(Ctx {
        db: Arc::new(opts.db),
        bot: bot.clone(),
        cfg: Arc::new(opts.tg_cfg),
        broadcaster,
    });

    di.insert(ctx.clone());

    info!("Starting bot...");

    let commands: Vec<_> = cmd::regular::Cmd::bot_commands()
        .into_iter()
        .chain(cmd::owner::Cmd::bot_commands())
        .collect();

    bot.set_my_commands(commands).await?;

    Dispatcher::builder(bot, handler())
        .dependencies(di)
        // We don't handle all possible updates, so to suppress the warning
        // about that we have a noop default handler here
        .default_handler(|_| std::future::ready(()))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    ctx.broadcaster.shutdown().await?;

    info!("Bot stopped");

    Ok(())
}

fn handler() -> UpdateHandler<Box<DynError>> {
    dptree::entry()
        .inspect(|update: Update| {
            metrics::increment_counter!(TG_UPDATES_TOTAL, "kind" => update.kind.discriminator());
            trace!(
                target: "tg_update",
                "{}",
                serde_json::to_string_pretty(&update)
                    .unwrap_or_else(|err| format!("<unserializable update: {err}>")),
            );
        })
        .branch(
            Update::filter_message()
                .filter_command::<cmd::regular::StartCommand>()
                .endpoint(cmd::handle::<cmd::regular::StartCommand>()),
        )
        .branch(
            Update::filter_message()
                .filter_command::<cmd::regular::Cmd>()
                .endpoint(cmd::handle::<cmd::regular::Cmd>()),
        )
        .branch(
            Update::filter_message()
                .filter_command::<cmd::owner::Cmd>()
                .filter(cmd::owner::filter)
                .endpoint(cmd::handle::<cmd::owner::Cmd>()),
        )
        .branch(
            Update::filter_message()
                .filter_map(upload::filter)
                .endpoint(cmd::handle::<upload::Upload>()),
        )
        .branch(
            Update::filter_message()
                .filter_map(cmd::regular::filter_fallback)
                .endpoint(cmd::handle::<cmd::regular::Fallback>()),
        )
        .inspect(|update: Update| {
            metrics::increment_counter!(
                TG_UPDATES_SKIPPED_TOTAL,
                "kind" => update.kind.discriminator()
            );
        })
}
