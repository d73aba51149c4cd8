use serde::Deserialize;

#[derive(Deserialize)]
pub(crate) struct Config {
    pub(crate) url: url::Url,

    #[serde(default = "default_database_pool_size")]
    pub(crate) pool_size: u32,
}

fn default_database_pool_size() -> u32 {
    // Broadcasts hold a connection only for the duration of a single page
    // fetch or removal, so a small pool is enough even during a long run.
    10
}
