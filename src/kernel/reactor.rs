use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::consent::ConsentGate;
use super::dispatcher::{Dispatcher, FlushOutcome};
use super::scheduler::{HeartbeatAction, HeartbeatScheduler};
use super::telemetry::buffer::Identity;
use super::telemetry::recorder::Recorder;
use super::time::{Clock, SystemClock, TICK, TICK_MS};
use crate::config::BeaconConfig;
use crate::error::TransportError;
use crate::services::collect::{HttpTransport, Transport};
use crate::storage::cache::DiskCache;

/// Composition root: owns the heartbeat and wires the recorder, dispatcher
/// and disk cache together. Construct one per process.
pub struct Reactor {
    scheduler: HeartbeatScheduler,
    recorder: Arc<Recorder>,
    dispatcher: Arc<Dispatcher>,
    cache: DiskCache,
    flushes: Vec<JoinHandle<FlushOutcome>>,
}

impl Reactor {
    pub fn new(
        config: &BeaconConfig,
        consent: Arc<dyn ConsentGate>,
        transport: Arc<dyn Transport>,
        cache: DiskCache,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let recorder = Arc::new(Recorder::new(clock.clone(), config.buffer.max_bytes));

        let install_id = config
            .identity
            .install_id
            .clone()
            .unwrap_or_else(|| clock.generate_id());
        recorder.set_identity(Identity {
            user_id: config.identity.user_id.clone().unwrap_or_else(|| install_id.clone()),
            session_id: clock.generate_id(),
            install_id,
            player_id: config.identity.player_id.clone(),
        });

        let restored = recorder.restore_from(&cache);
        if restored > 0 {
            debug!("Buffer starts with {} event(s) from a previous run", restored);
        }

        let dispatcher = Arc::new(Dispatcher::new(
            recorder.buffer(),
            cache.clone(),
            transport,
            consent,
            config.collect.url.clone(),
        ));

        Self {
            scheduler: HeartbeatScheduler::new(config.heartbeat_period(), config.session_period()),
            recorder,
            dispatcher,
            cache,
            flushes: Vec::new(),
        }
    }

    /// Real HTTP transport, system clock and the configured disk cache.
    pub fn from_config(config: &BeaconConfig, consent: Arc<dyn ConsentGate>) -> Result<Self, TransportError> {
        let cache = match config.cache_dir() {
            Some(dir) => DiskCache::probe(&dir, &config.cache.file_name),
            None => {
                info!("No persistent storage configured, disk cache disabled");
                DiskCache::disabled()
            }
        };
        let transport = Arc::new(HttpTransport::new(config.request_timeout())?);
        Ok(Self::new(config, consent, transport, cache, Arc::new(SystemClock)))
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &HeartbeatScheduler {
        &self.scheduler
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    /// Advances the heartbeat by `elapsed` real time and carries out what
    /// falls due. Flushes are spawned, never awaited here.
    pub fn tick_step(&mut self, elapsed: Duration) -> Vec<HeartbeatAction> {
        self.flushes.retain(|handle| !handle.is_finished());

        let actions = self.scheduler.tick(elapsed);
        for action in &actions {
            self.execute(*action);
        }
        actions
    }

    /// Manual flush outside the heartbeat.
    pub async fn flush_now(&self) -> FlushOutcome {
        self.dispatcher.flush().await
    }

    /// Waits for every spawned flush to resolve.
    pub async fn wait_for_flushes(&mut self) -> Vec<FlushOutcome> {
        let mut outcomes = Vec::new();
        for handle in self.flushes.drain(..) {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("Flush task failed: {}", e),
            }
        }
        outcomes
    }

    /// Async driver. Runs until `shutdown` is cancelled, then tears down.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!("Heartbeat started. Tick: {}ms", TICK_MS);

        let mut cadence = interval(TICK);
        cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = cadence.tick() => {
                    // Measured, not assumed: a stalled runtime must not slow the heartbeat.
                    let now = Instant::now();
                    self.tick_step(now - last);
                    last = now;
                }
            }
        }

        self.shutdown().await;
    }

    /// Records the terminal bookkeeping event, lets in-flight uploads settle
    /// and mirrors whatever is left to disk. Later calls do nothing.
    pub async fn shutdown(&mut self) {
        let Some(action) = self.scheduler.teardown() else {
            return;
        };
        self.execute(action);
        self.wait_for_flushes().await;

        if let Err(e) = self.recorder.persist(&self.cache) {
            warn!("Could not write analytics cache at shutdown: {}", e);
        }
        info!(
            "Heartbeat stopped, {} event(s) left for the next run",
            self.recorder.events_recorded()
        );
    }

    fn execute(&mut self, action: HeartbeatAction) {
        match action {
            HeartbeatAction::Flush => {
                let dispatcher = self.dispatcher.clone();
                self.flushes.push(tokio::spawn(async move { dispatcher.flush().await }));
            }
            HeartbeatAction::RecordSessionRunning => {
                if let Err(e) = self.recorder.record_session_running() {
                    debug!("Session running event not recorded: {}", e);
                }
            }
            HeartbeatAction::RecordSessionEnded => {
                if let Err(e) = self.recorder.record_session_ended() {
                    warn!("Session ended event not recorded: {}", e);
                }
            }
        }
    }
}
