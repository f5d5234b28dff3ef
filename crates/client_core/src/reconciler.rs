use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use shared::protocol::MatchSnapshot;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    Bootstrap,
    Push,
    Poll,
    ActionResult,
}

impl fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UpdateSource::Bootstrap => "bootstrap",
            UpdateSource::Push => "push",
            UpdateSource::Poll => "poll",
            UpdateSource::ActionResult => "action_result",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Replaced,
    /// Same logical state as the current snapshot; nothing observable changed.
    Unchanged,
    /// The register is closed, or a newer write landed first.
    Discarded,
}

/// Latest-wins slot holding the current match snapshot.
///
/// Every source replaces the whole value. The generation counter only moves
/// when the observable snapshot changes.
#[derive(Debug)]
pub struct SnapshotRegister {
    current: Option<Arc<MatchSnapshot>>,
    generation: u64,
    active: bool,
    last_source: Option<UpdateSource>,
    updated_at: Option<DateTime<Utc>>,
}

impl Default for SnapshotRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotRegister {
    pub fn new() -> Self {
        Self {
            current: None,
            generation: 0,
            active: true,
            last_source: None,
            updated_at: None,
        }
    }

    pub fn current(&self) -> Option<Arc<MatchSnapshot>> {
        self.current.clone()
    }

    pub fn current_ref(&self) -> Option<&MatchSnapshot> {
        self.current.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_source(&self) -> Option<UpdateSource> {
        self.last_source
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn apply(&mut self, source: UpdateSource, snapshot: MatchSnapshot) -> ApplyOutcome {
        if !self.active {
            debug!(%source, "reconciler: dropping snapshot after teardown");
            return ApplyOutcome::Discarded;
        }

        if self.current.as_deref() == Some(&snapshot) {
            return ApplyOutcome::Unchanged;
        }

        for anomaly in snapshot.check_invariants() {
            warn!(%source, "reconciler: server snapshot anomaly: {anomaly}");
        }

        info!(
            %source,
            phase = ?snapshot.phase,
            turn = %snapshot.current_turn_team,
            "reconciler: snapshot replaced"
        );
        self.current = Some(Arc::new(snapshot));
        self.generation += 1;
        self.last_source = Some(source);
        self.updated_at = Some(Utc::now());
        ApplyOutcome::Replaced
    }

    /// Applies `snapshot` only if nothing replaced the register since
    /// `observed_generation`. Used for results of requests that may have been
    /// overtaken while in flight.
    pub fn apply_if_current(
        &mut self,
        source: UpdateSource,
        snapshot: MatchSnapshot,
        observed_generation: u64,
    ) -> ApplyOutcome {
        if self.active && self.generation != observed_generation {
            debug!(
                %source,
                observed_generation,
                generation = self.generation,
                "reconciler: dropping overtaken snapshot"
            );
            return ApplyOutcome::Discarded;
        }
        self.apply(source, snapshot)
    }

    pub fn close(&mut self) {
        self.active = false;
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
