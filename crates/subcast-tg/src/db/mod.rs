mod cfg;
mod error;
mod stored_file;
mod subscriber;

use crate::prelude::*;
use crate::Result;
use sqlx::postgres::PgPoolOptions;

pub(crate) use cfg::*;
pub(crate) use error::*;
pub(crate) use stored_file::*;
pub(crate) use subscriber::*;

pub(crate) struct Repo {
    pub(crate) subscriber: SubscriberRepo,
    pub(crate) stored_file: StoredFileRepo,
}

pub(crate) async fn init(cfg: Config) -> Result<Repo> {
    // Verify that the connection is working early.
    // The connection created here is also reused by the migrations.
    let pool = PgPoolOptions::new()
        .max_connections(cfg.pool_size)
        .connect(cfg.url.as_str())
        .with_duration_log("Connecting to the database")
        .await
        .map_err(err_ctx!(DbError::Connect))?;

    sqlx::migrate!()
        .run(&pool)
        .with_duration_log("Applying database migrations")
        .await
        .map_err(err_ctx!(DbError::Migrate))?;

    info!(pool_size = cfg.pool_size, "Connected to the database");

    Ok(Repo {
        subscriber: SubscriberRepo::new(pool.clone()),
        stored_file: StoredFileRepo::new(pool),
    })
}
