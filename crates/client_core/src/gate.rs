//! Turn/phase gate. The phase machine is owned by the server; the client only
//! observes it and decides whether the local viewer may act right now.

use shared::{
    domain::{ActionKind, MapId, MatchId, Phase, Role, TeamIndex},
    protocol::MatchSnapshot,
};

use crate::{error::GateError, identity::IdentityContext};

/// Action kind for a phase. `None` once the veto is completed.
pub fn current_action_kind(phase: Phase) -> Option<ActionKind> {
    phase.action_kind()
}

/// An action that passed every gate check and can be sent as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAction {
    pub match_id: MatchId,
    pub team_index: TeamIndex,
    pub kind: ActionKind,
    pub map_id: MapId,
    pub credential: String,
}

pub struct TurnGate<'a> {
    snapshot: Option<&'a MatchSnapshot>,
    identity: &'a IdentityContext,
}

impl<'a> TurnGate<'a> {
    pub fn new(snapshot: Option<&'a MatchSnapshot>, identity: &'a IdentityContext) -> Self {
        Self { snapshot, identity }
    }

    pub fn current_action_kind(&self) -> Option<ActionKind> {
        self.snapshot
            .and_then(|snapshot| current_action_kind(snapshot.phase))
    }

    pub fn is_viewer_authorized(&self) -> bool {
        self.identity.role == Role::Captain
            && self.identity.team_index.is_some()
            && self.identity.has_credential()
    }

    pub fn is_viewers_turn(&self) -> bool {
        match (self.snapshot, self.identity.team_index) {
            (Some(snapshot), Some(team)) => snapshot.current_turn_team == team,
            _ => false,
        }
    }

    /// Checks run in a fixed order: active match, authorization, turn, phase.
    pub fn validate_action(&self, map_id: MapId) -> Result<ValidatedAction, GateError> {
        let snapshot = match self.snapshot {
            Some(snapshot) if !self.identity.match_id.is_empty() => snapshot,
            _ => return Err(GateError::NoActiveMatch),
        };

        if !self.is_viewer_authorized() {
            return Err(GateError::NotCaptain);
        }

        if !self.is_viewers_turn() {
            return Err(GateError::WrongTurn {
                team_name: snapshot.current_team_name(),
            });
        }

        let kind = self.current_action_kind().ok_or(GateError::MatchCompleted)?;

        match (self.identity.team_index, self.identity.credential.as_ref()) {
            (Some(team_index), Some(credential)) => Ok(ValidatedAction {
                match_id: self.identity.match_id.clone(),
                team_index,
                kind,
                map_id,
                credential: credential.clone(),
            }),
            _ => Err(GateError::NotCaptain),
        }
    }
}

#[cfg(test)]
#[path = "tests/gate_tests.rs"]
mod tests;
