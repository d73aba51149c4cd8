use crate::prelude::*;
use easy_ext::ext;
use std::future::Future;
use std::time::Duration;

#[ext(FutureExt)]
pub(crate) impl<F: Future> F {
    /// Measures how long the future took to complete
    async fn with_duration(self) -> (F::Output, Duration) {
        let start = std::time::Instant::now();
        let output = self.await;
        (output, start.elapsed())
    }

    /// Same as [`FutureExt::with_duration`], but logs the duration and
    /// whether the future resolved to an error.
    async fn with_duration_log<T, E>(self, msg: &str) -> F::Output
    where
        F: Future<Output = std::result::Result<T, E>>,
    {
        let (result, duration) = self.with_duration().await;
        let duration = tracing_duration(duration);
        match &result {
            Ok(_) => info!(result = "ok", duration, "{msg}"),
            Err(_) => warn!(result = "err", duration, "{msg}"),
        }
        result
    }
}
