use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::consent::ConsentGate;
use super::telemetry::buffer::{SharedBuffer, Token};
use super::telemetry::metrics::DispatchStats;
use crate::services::collect::{Transport, STATUS_ACCEPTED, STATUS_MALFORMED};
use crate::storage::cache::DiskCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ConsentMissing,
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    Status(u16),
    Transport(String),
    Serialization(String),
}

/// What one call to [`Dispatcher::flush`] did. Never an error: every
/// failure mode is either a deferral or a scheduled retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Skipped(SkipReason),
    /// Nothing was buffered.
    Empty,
    /// 204: batch delivered, disk cache cleared.
    Accepted { events: usize },
    /// 400: batch discarded so a poisoned event cannot block every later
    /// upload. Disk cache cleared.
    Rejected { events: usize },
    /// Batch merged back into the buffer and mirrored to disk.
    Retrying { events: usize, reason: RetryReason },
}

/// Releases the in-flight flag on every exit path, including a cancelled
/// flush future.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Dispatcher {
    buffer: SharedBuffer,
    cache: DiskCache,
    transport: Arc<dyn Transport>,
    consent: Arc<dyn ConsentGate>,
    collect_url: String,
    in_progress: AtomicBool,
    stats: Mutex<DispatchStats>,
}

impl Dispatcher {
    pub fn new(
        buffer: SharedBuffer,
        cache: DiskCache,
        transport: Arc<dyn Transport>,
        consent: Arc<dyn ConsentGate>,
        collect_url: impl Into<String>,
    ) -> Self {
        Self {
            buffer,
            cache,
            transport,
            consent,
            collect_url: collect_url.into(),
            in_progress: AtomicBool::new(false),
            stats: Mutex::new(DispatchStats::default()),
        }
    }

    pub fn collect_url(&self) -> &str {
        &self.collect_url
    }

    pub fn flush_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats.lock().clone()
    }

    pub async fn flush(&self) -> FlushOutcome {
        let Some(_in_flight) = self.try_begin() else {
            warn!("Analytics dispatcher is already flushing");
            self.stats.lock().skipped_in_progress += 1;
            return FlushOutcome::Skipped(SkipReason::InProgress);
        };

        if !self.consent.allows_dispatch() {
            warn!("Required consent wasn't checked and given, events cannot be sent");
            self.stats.lock().skipped_consent += 1;
            return FlushOutcome::Skipped(SkipReason::ConsentMissing);
        }

        // From here on the buffer keeps accepting events: the token owns the
        // captured bytes and the live buffer only holds what came later.
        let checked_out = self.buffer.lock().checkout();
        let Some(token) = checked_out else {
            self.stats.lock().empty += 1;
            return FlushOutcome::Empty;
        };
        let events = token.event_count();
        self.stats.lock().flushes_started += 1;

        let token = Arc::new(token);
        let serializing = token.clone();
        let payload = match tokio::task::spawn_blocking(move || serializing.serialize()).await {
            Ok(payload) => payload,
            Err(e) => {
                let reason = RetryReason::Serialization(e.to_string());
                return self.retry(unwrap_token(token), events, reason);
            }
        };

        if payload.is_empty() {
            self.buffer.lock().merge(unwrap_token(token));
            self.stats.lock().empty += 1;
            return FlushOutcome::Empty;
        }

        debug!("Uploading {} event(s) ({} bytes)", events, payload.len());
        let headers = self.consent.required_headers();
        let result = self.transport.post(&self.collect_url, payload, &headers).await;

        match result {
            Ok(STATUS_ACCEPTED) => {
                info!("Events uploaded successfully ({} event(s))", events);
                self.clear_cache();
                let mut stats = self.stats.lock();
                stats.accepted += 1;
                stats.events_sent += events as u64;
                stats.last_status = Some(STATUS_ACCEPTED);
                FlushOutcome::Accepted { events }
            }
            Ok(STATUS_MALFORMED) => {
                warn!(
                    "Events upload rejected as malformed, discarding {} event(s) from this batch",
                    events
                );
                self.clear_cache();
                let mut stats = self.stats.lock();
                stats.rejected += 1;
                stats.events_discarded += events as u64;
                stats.last_status = Some(STATUS_MALFORMED);
                FlushOutcome::Rejected { events }
            }
            Ok(status) => {
                self.stats.lock().last_status = Some(status);
                self.retry(unwrap_token(token), events, RetryReason::Status(status))
            }
            Err(e) => self.retry(unwrap_token(token), events, RetryReason::Transport(e.to_string())),
        }
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_progress))
    }

    fn retry(&self, token: Token, events: usize, reason: RetryReason) -> FlushOutcome {
        match &reason {
            RetryReason::Status(code) => {
                info!("Events failed to upload (code {}), will retry at next heartbeat", code)
            }
            RetryReason::Transport(e) => {
                info!("Events failed to upload ({}), will retry at next heartbeat", e)
            }
            RetryReason::Serialization(e) => {
                warn!("Batch serialization failed ({}), will retry at next heartbeat", e)
            }
        }

        let raw = {
            let mut buffer = self.buffer.lock();
            buffer.merge(token);
            buffer.raw_contents()
        };
        if let Err(e) = self.cache.save(&raw) {
            warn!("Could not write analytics cache: {}", e);
        }

        self.stats.lock().retried += 1;
        FlushOutcome::Retrying { events, reason }
    }

    fn clear_cache(&self) {
        if let Err(e) = self.cache.clear() {
            warn!("Could not delete analytics cache: {}", e);
        }
    }
}

fn unwrap_token(token: Arc<Token>) -> Token {
    Arc::try_unwrap(token).unwrap_or_else(|shared| (*shared).clone())
}
