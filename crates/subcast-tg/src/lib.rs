mod broadcast;
mod config;
mod db;
mod error;
mod observability;
mod tg;

mod util;

pub use crate::error::*;
pub use config::*;
pub use observability::*;

#[allow(unused_imports)]
mod prelude {
    pub(crate) use crate::error::{err, err_ctx, fatal, ResultExt as _};
    pub(crate) use crate::observability::logging::prelude::*;
    pub(crate) use crate::util::prelude::*;
}

/// Run the telegram bot processing loop
pub async fn run(config: Config) -> Result<()> {
    let db = db::init(config.db).await?;

    let opts = tg::RunBotOptions {
        tg_cfg: config.tg,
        broadcast_cfg: config.broadcast,
        db,
    };

    tg::run_bot(opts).await
}
