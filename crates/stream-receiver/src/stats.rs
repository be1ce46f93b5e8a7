use tracing::info;

/// Per-receiver access unit counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// AUs submitted while not halted.
    pub total_au_count: u64,
    /// AUs handed to the decoder side.
    pub output_au_count: u64,
    /// AUs dropped because no free slot was available.
    pub dropped_au_count: u64,
    /// AUs discarded for any other reason (paused, out of order, oversize,
    /// incomplete, unconfigured).
    pub discarded_au_count: u64,
    /// Delivered AUs classified as following a loss.
    pub missed_au_count: u64,
    /// Incomplete AUs seen, delivered or not.
    pub incomplete_au_count: u64,
}

impl ReceiverStats {
    pub fn log(&self) {
        info!(
            total = self.total_au_count,
            output = self.output_au_count,
            dropped = self.dropped_au_count,
            discarded = self.discarded_au_count,
            missed = self.missed_au_count,
            incomplete = self.incomplete_au_count,
            "receiver stats"
        );
    }
}
