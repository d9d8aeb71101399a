use std::time::Duration;

pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(60);
pub const DEFAULT_SESSION_PERIOD: Duration = Duration::from_secs(60);

/// Work the driver has to carry out after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    Flush,
    RecordSessionRunning,
    RecordSessionEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    Running,
    /// Terminal. Reached through [`HeartbeatScheduler::teardown`].
    Stopped,
}

/// Two independent real-time accumulators. Elapsed time fed in here must be
/// wall-clock time, never a paused or scaled application clock.
///
/// Pure projection: `tick` only decides; the reactor executes.
#[derive(Debug, Clone)]
pub struct HeartbeatScheduler {
    heartbeat_period: Duration,
    session_period: Duration,
    heartbeat_elapsed: Duration,
    session_elapsed: Duration,
    state: HeartbeatState,
}

impl Default for HeartbeatScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_PERIOD, DEFAULT_SESSION_PERIOD)
    }
}

impl HeartbeatScheduler {
    pub fn new(heartbeat_period: Duration, session_period: Duration) -> Self {
        Self {
            heartbeat_period,
            session_period,
            heartbeat_elapsed: Duration::ZERO,
            session_elapsed: Duration::ZERO,
            state: HeartbeatState::Running,
        }
    }

    pub fn state(&self) -> HeartbeatState {
        self.state
    }

    pub fn heartbeat_elapsed(&self) -> Duration {
        self.heartbeat_elapsed
    }

    pub fn session_elapsed(&self) -> Duration {
        self.session_elapsed
    }

    pub fn time_until_heartbeat(&self) -> Duration {
        self.heartbeat_period.saturating_sub(self.heartbeat_elapsed)
    }

    pub fn tick(&mut self, elapsed: Duration) -> Vec<HeartbeatAction> {
        let mut actions = Vec::new();
        if self.state == HeartbeatState::Stopped {
            return actions;
        }

        // Session bookkeeping first, so a "running" record that falls due on
        // the same tick as a heartbeat goes out with that flush.
        self.session_elapsed += elapsed;
        if self.session_elapsed >= self.session_period {
            actions.push(HeartbeatAction::RecordSessionRunning);
            self.session_elapsed = Duration::ZERO;
        }

        self.heartbeat_elapsed += elapsed;
        if self.heartbeat_elapsed >= self.heartbeat_period {
            actions.push(HeartbeatAction::Flush);
            self.heartbeat_elapsed = Duration::ZERO;
        }

        actions
    }

    /// Returns the terminal bookkeeping action exactly once.
    pub fn teardown(&mut self) -> Option<HeartbeatAction> {
        match self.state {
            HeartbeatState::Running => {
                self.state = HeartbeatState::Stopped;
                Some(HeartbeatAction::RecordSessionEnded)
            }
            HeartbeatState::Stopped => None,
        }
    }
}
