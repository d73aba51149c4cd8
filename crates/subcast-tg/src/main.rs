use futures::prelude::*;
use std::panic::AssertUnwindSafe;
use std::process::ExitCode;
use subcast_tg::tracing_err;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = dotenvy::dotenv() {
        eprintln!("No .env file was loaded ({err}), using the process environment only");
    }

    let logging = subcast_tg::init_logging();

    subcast_tg::init_metrics();

    let bot = AssertUnwindSafe(run_bot()).catch_unwind().map(|result| {
        result.unwrap_or_else(|_| {
            error!("The bot panicked, exiting...");
            ExitCode::FAILURE
        })
    });

    // teloxide's graceful shutdown may take a while to wait for the pending
    // long polling request. A second Ctrl+C aborts it right away.
    let exit_code = tokio::select! {
        exit_code = bot => exit_code,
        () = force_exit_signal() => ExitCode::FAILURE,
    };

    logging.shutdown().await;

    exit_code
}

async fn run_bot() -> ExitCode {
    let config = subcast_tg::Config::load_or_panic();

    match subcast_tg::run(config).await {
        Ok(()) => {
            info!("The bot has stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(err = tracing_err(&err), "The bot has failed, exiting...");
            ExitCode::FAILURE
        }
    }
}

async fn force_exit_signal() {
    // The first Ctrl+C is handled by the dispatcher
    for _ in 0..2 {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(err = tracing_err(&err), "Failed to listen for Ctrl+C");
            return std::future::pending().await;
        }
    }
    info!("Ctrl+C received twice, exiting forcefully...");
}
