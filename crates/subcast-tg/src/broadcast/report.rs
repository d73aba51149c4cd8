use std::fmt;

/// Running counters of a broadcast at some point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProgressSnapshot {
    pub(crate) processed: u64,
    pub(crate) sent: u64,
    pub(crate) removed: u64,
    pub(crate) failed: u64,
    pub(crate) total: u64,
}

/// Final summary of a broadcast run.
///
/// `sent + removed + failed` is the number of processed recipients, which
/// equals `total` unless the run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BroadcastReport {
    pub(crate) sent: u64,
    pub(crate) removed: u64,
    pub(crate) failed: u64,
    pub(crate) total: u64,
    pub(crate) cancelled: bool,
}

impl BroadcastReport {
    pub(crate) fn processed(&self) -> u64 {
        self.sent + self.removed + self.failed
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            processed,
            sent,
            removed,
            failed,
            total,
        } = self;

        write!(
            f,
            "Progress: {processed}/{total}\n\
            Sent: {sent}\n\
            Removed: {removed}\n\
            Failed: {failed}"
        )
    }
}

impl fmt::Display for BroadcastReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            sent,
            removed,
            failed,
            total,
            cancelled,
        } = self;

        let status = if *cancelled { "Cancelled" } else { "Finished" };
        let processed = self.processed();

        write!(
            f,
            "{status}: {processed}/{total}\n\
            Sent: {sent}\n\
            Removed: {removed}\n\
            Failed: {failed}"
        )
    }
}
