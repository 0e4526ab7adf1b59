//! Debounce state machine.
//!
//! Converts the noisy per-frame smoke signal into alert-worthy events using two
//! gates:
//! - a cooldown: no two fires closer together than `cooldown`;
//! - a recovery count: after a fire, `consecutive_clear_frames` frames without
//!   smoke are needed before the machine re-arms.
//!
//! `READY` means the next qualifying detection fires. `SUPPRESSED` means a fire
//! happened and the machine is waiting for the scene to clear.

use std::time::{Duration, Instant};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);
pub const DEFAULT_CONSECUTIVE_CLEAR_FRAMES: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebounceConfig {
    pub cooldown: Duration,
    pub consecutive_clear_frames: u32,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            consecutive_clear_frames: DEFAULT_CONSECUTIVE_CLEAR_FRAMES,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebouncePhase {
    Ready,
    Suppressed,
}

/// Result of feeding one frame to the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebounceOutcome {
    /// Emit an alert. The machine is now suppressed.
    Fired,
    /// Smoke while ready, but the cooldown has not elapsed. Dropped.
    CooldownDropped,
    /// Smoke while suppressed. Clear streak restarted.
    Suppressed,
    /// Clear frame that completed the recovery streak. Machine is ready again.
    Rearmed,
    /// Clear frame, no phase change.
    Clear,
}

impl DebounceOutcome {
    pub fn fired(self) -> bool {
        matches!(self, DebounceOutcome::Fired)
    }
}

/// Persistent debounce state, owned by the run loop.
#[derive(Clone, Debug)]
pub struct Debouncer {
    config: DebounceConfig,
    armed: bool,
    clear_run: u32,
    /// `None` stands for a trigger infinitely far in the past.
    last_trigger: Option<Instant>,
}

impl Debouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            armed: false,
            clear_run: 0,
            last_trigger: None,
        }
    }

    pub fn config(&self) -> DebounceConfig {
        self.config
    }

    pub fn phase(&self) -> DebouncePhase {
        if self.armed {
            DebouncePhase::Suppressed
        } else {
            DebouncePhase::Ready
        }
    }

    pub fn clear_run(&self) -> u32 {
        self.clear_run
    }

    pub fn last_trigger(&self) -> Option<Instant> {
        self.last_trigger
    }

    /// Feed one processed frame.
    pub fn observe(&mut self, present: bool, now: Instant) -> DebounceOutcome {
        if !present {
            self.clear_run = self.clear_run.saturating_add(1);
            if self.armed && self.clear_run >= self.config.consecutive_clear_frames {
                // clear_run keeps counting; only a fire resets it.
                self.armed = false;
                return DebounceOutcome::Rearmed;
            }
            return DebounceOutcome::Clear;
        }

        if self.armed {
            self.clear_run = 0;
            return DebounceOutcome::Suppressed;
        }

        if !self.cooldown_elapsed(now) {
            return DebounceOutcome::CooldownDropped;
        }

        self.armed = true;
        self.clear_run = 0;
        self.last_trigger = Some(now);
        DebounceOutcome::Fired
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_trigger {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.config.cooldown,
        }
    }
}
