//! Debounce for polled transport state.

use std::time::Duration;

use mobcast_transport::ReadyState;

/// Accepts a new [`ReadyState`] only if the previous accepted change is
/// at least `min_dwell` old. Observations inside the dwell are ignored,
/// so a backend that flickers Open/Closed/Open produces no transition.
#[derive(Debug, Clone)]
pub struct StateDebounce {
    min_dwell: Duration,
    accepted: ReadyState,
    changed_at: Duration,
}

impl StateDebounce {
    pub fn new(min_dwell: Duration) -> Self {
        Self {
            min_dwell,
            accepted: ReadyState::Closed,
            changed_at: Duration::ZERO,
        }
    }

    /// Starts a new dwell at `now` from a known state.
    pub fn reset(&mut self, now: Duration, state: ReadyState) {
        self.accepted = state;
        self.changed_at = now;
    }

    pub fn accepted(&self) -> ReadyState {
        self.accepted
    }

    /// Feeds one observation taken at session time `now`. Returns the
    /// new state when a change is accepted.
    pub fn observe(
        &mut self,
        now: Duration,
        observed: ReadyState,
    ) -> Option<ReadyState> {
        if observed == self.accepted {
            return None;
        }
        if now.saturating_sub(self.changed_at) < self.min_dwell {
            tracing::trace!(?observed, accepted = ?self.accepted, "state change inside dwell, ignoring");
            return None;
        }
        self.accepted = observed;
        self.changed_at = now;
        Some(observed)
    }
}
