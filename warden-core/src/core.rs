//! Host-driven run-loop state: the daemon calls `tick` and the `on_*` event
//! methods, and performs the actions returned. No clocks and no I/O in here;
//! the host passes `now` in, which keeps cadence behavior deterministic.

use std::time::{Duration, Instant};

use crate::callerid;
use crate::protocol::ScreeningDecision;

/// Heartbeat cadence: successful sends are throttled to this interval.
/// Failures are retried on the next tick.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Minimum wait before reopening a degraded modem port.
pub const DEFAULT_REINIT_COOLDOWN: Duration = Duration::from_secs(5);

/// Action for the host to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a liveness report, then call `on_heartbeat_result`.
    SendHeartbeat,
    /// Reopen the modem port, then call `on_modem_recovered` on success.
    ReopenModem,
    /// Ask the screening service about `number`, then call
    /// `on_screen_decision`.
    ScreenCall { number: String },
    /// Issue the modem hangup command for a blocked call.
    HangUp { number: String },
}

/// Counters over screened calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub screened: u64,
    pub allowed: u64,
    pub blocked: u64,
}

/// Main coordinator for the monitoring loop.
pub struct WardenCore {
    heartbeat_interval: Duration,
    reinit_cooldown: Duration,
    last_heartbeat: Option<Instant>,
    modem_down_since: Option<Instant>,
    last_reopen_attempt: Option<Instant>,
    stats: CallStats,
}

impl WardenCore {
    pub fn new() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reinit_cooldown: DEFAULT_REINIT_COOLDOWN,
            last_heartbeat: None,
            modem_down_since: None,
            last_reopen_attempt: None,
            stats: CallStats::default(),
        }
    }

    /// Override the heartbeat interval.
    pub fn set_heartbeat_interval(&mut self, interval: Duration) {
        self.heartbeat_interval = interval;
    }

    /// Override the modem reinit cooldown.
    pub fn set_reinit_cooldown(&mut self, cooldown: Duration) {
        self.reinit_cooldown = cooldown;
    }

    /// One loop iteration: emit a heartbeat if due, and a modem reopen if the
    /// port is down and the cooldown has elapsed. Emitting `ReopenModem` arms
    /// the cooldown for the next attempt.
    pub fn tick(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();

        let heartbeat_due = match self.last_heartbeat {
            None => true,
            Some(sent) => now.duration_since(sent) >= self.heartbeat_interval,
        };
        if heartbeat_due {
            actions.push(Action::SendHeartbeat);
        }

        if let Some(since) = self.modem_down_since {
            let anchor = self.last_reopen_attempt.unwrap_or(since);
            if now.duration_since(anchor) >= self.reinit_cooldown {
                actions.push(Action::ReopenModem);
                self.last_reopen_attempt = Some(now);
            }
        }

        actions
    }

    /// Heartbeat outcome. Only success advances the throttle; a failure
    /// leaves the heartbeat due, so it is retried on the next tick.
    pub fn on_heartbeat_result(&mut self, now: Instant, ok: bool) {
        if ok {
            self.last_heartbeat = Some(now);
        }
    }

    /// The modem reported an I/O error. Starts the reinit cooldown; repeated
    /// errors while already down keep the original error time.
    pub fn on_modem_error(&mut self, now: Instant) {
        if self.modem_down_since.is_none() {
            self.modem_down_since = Some(now);
            self.last_reopen_attempt = None;
        }
    }

    /// The modem port was reopened and reinitialized.
    pub fn on_modem_recovered(&mut self) {
        self.modem_down_since = None;
        self.last_reopen_attempt = None;
    }

    pub fn modem_down(&self) -> bool {
        self.modem_down_since.is_some()
    }

    /// One raw modem line arrived. Returns a screening action when the line
    /// carries a caller id; everything else is "no number" and stays quiet.
    pub fn on_modem_line(&mut self, line: &str) -> Option<Action> {
        let number = callerid::parse_caller_id(line)?;
        self.stats.screened += 1;
        Some(Action::ScreenCall { number })
    }

    /// A screening decision came back. Blocked calls get a hangup action.
    pub fn on_screen_decision(&mut self, decision: &ScreeningDecision) -> Option<Action> {
        if decision.allow {
            self.stats.allowed += 1;
            None
        } else {
            self.stats.blocked += 1;
            Some(Action::HangUp {
                number: decision.phone_number.clone(),
            })
        }
    }

    pub fn stats(&self) -> CallStats {
        self.stats
    }
}

impl Default for WardenCore {
    fn default() -> Self {
        Self::new()
    }
}
