use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::buffer::{EventBuffer, Identity, SharedBuffer};
use super::event::Event;
use crate::error::{BufferError, CacheError};
use crate::kernel::time::Clock;
use crate::storage::cache::DiskCache;

/// Periodic "still running" bookkeeping record.
pub const SESSION_RUNNING_EVENT: &str = "gameRunning";
/// Terminal bookkeeping record, written once at teardown.
pub const SESSION_ENDED_EVENT: &str = "gameEnded";

/// The append path. Every event is written under a single lock acquisition,
/// so a concurrent checkout never observes half an event as closed.
pub struct Recorder {
    buffer: SharedBuffer,
    clock: Arc<dyn Clock>,
    dropped: AtomicU64,
}

impl Recorder {
    pub fn new(clock: Arc<dyn Clock>, max_bytes: usize) -> Self {
        let buffer = EventBuffer::new(clock.clone()).with_max_bytes(max_bytes).shared();
        Self {
            buffer,
            clock,
            dropped: AtomicU64::new(0),
        }
    }

    /// Handle shared with the dispatcher.
    pub fn buffer(&self) -> SharedBuffer {
        self.buffer.clone()
    }

    pub fn set_identity(&self, identity: Identity) {
        self.buffer.lock().set_identity(identity);
    }

    pub fn identity(&self) -> Identity {
        self.buffer.lock().identity().clone()
    }

    pub fn events_recorded(&self) -> usize {
        self.buffer.lock().events_recorded()
    }

    /// Events refused because the buffer was at its size cap.
    pub fn events_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn record(&self, event: &Event) -> Result<(), BufferError> {
        self.write(event, false)
    }

    pub fn record_session_running(&self) -> Result<(), BufferError> {
        self.write(&Event::new(SESSION_RUNNING_EVENT), true)
    }

    pub fn record_session_ended(&self) -> Result<(), BufferError> {
        self.write(&Event::new(SESSION_ENDED_EVENT), true)
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }

    /// Mirrors the closed events to disk. An empty buffer removes the file.
    pub fn persist(&self, cache: &DiskCache) -> Result<(), CacheError> {
        let raw = self.buffer.lock().raw_contents();
        cache.save(&raw)
    }

    /// Loads a cached batch left by a previous process. A file that does not
    /// parse is deleted rather than retried forever.
    pub fn restore_from(&self, cache: &DiskCache) -> usize {
        let raw = match cache.load() {
            Ok(Some(raw)) => raw,
            Ok(None) => return 0,
            Err(e) => {
                warn!("Could not read analytics cache: {}", e);
                return 0;
            }
        };

        let restored = self.buffer.lock().restore(&raw);
        match restored {
            Ok(count) => {
                info!("Restored {} cached event(s) from {}", count, cache.path_display());
                count
            }
            Err(e) => {
                warn!("Discarding analytics cache: {}", e);
                if let Err(e) = cache.clear() {
                    warn!("Could not delete analytics cache: {}", e);
                }
                0
            }
        }
    }

    fn write(&self, event: &Event, include_identifiers: bool) -> Result<(), BufferError> {
        let timestamp = event.timestamp.unwrap_or_else(|| self.clock.now());
        let mut buffer = self.buffer.lock();

        if let Err(e) = buffer.begin_event(&event.name, &timestamp, event.version, include_identifiers) {
            if let BufferError::Full { len, limit } = e {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Analytics buffer full ({}/{} bytes), dropping event {}", len, limit, event.name);
            }
            return Err(e);
        }

        for (key, value) in event.params() {
            if let Err(e) = buffer.push_scalar(value, Some(key)) {
                buffer.abandon_event();
                return Err(e);
            }
        }
        buffer.end_event()?;

        debug!("Recorded event {}", event.name);
        Ok(())
    }
}
