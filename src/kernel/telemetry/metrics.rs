/// Counters describing what the dispatch path has done so far.
/// Observability only: nothing in the flush protocol reads these back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub flushes_started: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub retried: u64,
    pub empty: u64,
    pub skipped_consent: u64,
    pub skipped_in_progress: u64,
    pub events_sent: u64,
    pub events_discarded: u64,
    pub last_status: Option<u16>,
}

impl DispatchStats {
    /// Share of completed flushes that had to be retried.
    pub fn retry_ratio(&self) -> f64 {
        let completed = self.accepted + self.rejected + self.retried;
        if completed == 0 {
            return 0.0;
        }
        self.retried as f64 / completed as f64
    }
}
