use super::GLOBAL_LABELS;
use serde::Deserialize;

#[derive(Deserialize)]
struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    metrics_port: u16,
}

fn default_metrics_port() -> u16 {
    2000
}

pub fn init_metrics() {
    let config: MetricsConfig = crate::config::from_env_or_panic("");

    let mut builder = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port));

    for (key, value) in GLOBAL_LABELS {
        builder = builder.add_global_label(*key, *value);
    }

    builder
        .install()
        .expect("BUG: failed to initialize the metrics listener");

    describe();
}

pub(crate) const BROADCAST_DELIVERIES_TOTAL: &str = "subcast_broadcast_deliveries_total";
pub(crate) const BROADCAST_RUNS_TOTAL: &str = "subcast_broadcast_runs_total";
pub(crate) const TG_UPDATES_TOTAL: &str = "subcast_tg_updates_total";
pub(crate) const TG_UPDATES_SKIPPED_TOTAL: &str = "subcast_tg_updates_skipped_total";

fn describe() {
    metrics::describe_counter!(
        BROADCAST_DELIVERIES_TOTAL,
        "Number of broadcast recipients processed, labeled by the final outcome"
    );
    metrics::describe_counter!(
        BROADCAST_RUNS_TOTAL,
        "Number of broadcast runs, labeled by how they ended"
    );
    metrics::describe_counter!(TG_UPDATES_TOTAL, "Number of updates received from Telegram");
    metrics::describe_counter!(
        TG_UPDATES_SKIPPED_TOTAL,
        "Number of updates received from Telegram, that were skipped by the bot"
    );
}
