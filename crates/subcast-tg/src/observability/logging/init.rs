use crate::config::from_env_or_panic;
use crate::observability::GLOBAL_LABELS;
use crate::prelude::*;
use serde::Deserialize;
use serde_with::serde_as;
use std::any::Any;
use std::collections::HashMap;
use tracing_subscriber::prelude::*;

/// Name of the env var with the [`tracing_subscriber::EnvFilter`] directives
const LOG_FILTER_VAR: &str = "TG_BOT_LOG";

#[serde_as]
#[derive(Deserialize)]
struct LoggingConfig {
    /// Logs are shipped to Loki only if this is set
    loki_url: Option<url::Url>,

    /// Extra labels attached to every log record shipped to Loki
    #[serde_as(as = "serde_with::json::JsonString")]
    #[serde(default)]
    tg_bot_log_labels: HashMap<String, String>,
}

/// Keeps the background task that pushes the logs to Loki alive.
/// Call [`LoggingTask::shutdown`] at the very end to flush the remaining logs.
pub struct LoggingTask {
    loki: Option<(tracing_loki::BackgroundTaskController, tokio::task::JoinHandle<()>)>,
}

impl LoggingTask {
    pub async fn shutdown(self) {
        let Some((controller, task)) = self.loki else {
            return;
        };

        info!("Flushing the logs to Loki...");

        let ((), elapsed) = controller.shutdown().with_duration().await;

        // The subscriber may already be unable to deliver this, so stderr it is
        eprintln!("Loki task stopped in {elapsed:.2?} with {:?}", task.await);
    }
}

pub fn init_logging() -> LoggingTask {
    let config: LoggingConfig = from_env_or_panic("");

    let (loki_layer, loki) = match config.loki_url {
        Some(url) => {
            let (layer, controller, task) = loki_layer(url, config.tg_bot_log_labels);
            (Some(layer), Some((controller, tokio::spawn(task))))
        }
        None => (None, None),
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::env::var("COLORS").as_deref() != Ok("0"))
        .pretty();

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(loki_layer)
        .with(tracing_subscriber::EnvFilter::from_env(LOG_FILTER_VAR))
        .with(tracing_error::ErrorLayer::default())
        .init();

    install_panic_hook();

    LoggingTask { loki }
}

fn loki_layer(
    url: url::Url,
    custom_labels: HashMap<String, String>,
) -> (
    tracing_loki::Layer,
    tracing_loki::BackgroundTaskController,
    tracing_loki::BackgroundTask,
) {
    let builtin_labels = GLOBAL_LABELS
        .iter()
        .chain(&[("source", env!("CARGO_PKG_NAME"))])
        .map(|&(key, value)| (key.to_owned(), value.to_owned()));

    let mut builder = tracing_loki::builder();

    for (key, value) in custom_labels.into_iter().chain(builtin_labels) {
        builder = builder
            .label(&key, value)
            .unwrap_or_else(|err| panic!("BUG: invalid loki label `{key}`: {err:#?}"));
    }

    builder
        .build_controller_url(url)
        .unwrap_or_else(|err| panic!("BUG: failed to initialize the loki layer: {err:#?}"))
}

/// Duplicates panics into the logs, because stderr of the process isn't
/// collected anywhere in production.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        // The panic may come from within the logging system itself, so
        // the default hook must run first to make it visible at all.
        default_hook(panic_info);

        let location = panic_info
            .location()
            .map(|location| location.to_string());

        error!(
            target: "panic",
            thread = std::thread::current().name(),
            location,
            span_trace = %tracing_error::SpanTrace::capture(),
            "{}",
            panic_message(panic_info.payload()),
        );
    }));
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    // Panics with interpolated values carry a `String`, the rest carry `&str`
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("<unknown>")
}
