use super::ProgressSnapshot;
use crate::Result;
use async_trait::async_trait;

/// Receives periodic progress of a running broadcast.
///
/// Errors returned from [`ProgressSink::emit`] are logged by the engine and
/// otherwise ignored, a broken progress message must never stop the broadcast.
#[async_trait]
pub(crate) trait ProgressSink: Send + Sync {
    async fn emit(&self, snapshot: ProgressSnapshot) -> Result;
}
