use std::sync::Arc;

use shared::protocol::MatchSnapshot;
use tracing::{info, warn};

use crate::{api::MatchApi, error::DispatchError, gate::ValidatedAction};

/// Proof that the caller owns the single in-flight action slot.
#[derive(Debug, PartialEq, Eq)]
pub struct InFlightToken {
    id: u64,
}

#[derive(Debug, Default)]
pub struct DispatchGuard {
    in_flight: Option<u64>,
    next_id: u64,
}

impl DispatchGuard {
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Claims the slot, or fails immediately if another action is outstanding.
    pub fn try_begin(&mut self) -> Result<InFlightToken, DispatchError> {
        if self.in_flight.is_some() {
            return Err(DispatchError::Busy);
        }
        self.next_id += 1;
        self.in_flight = Some(self.next_id);
        Ok(InFlightToken { id: self.next_id })
    }

    /// Releases the slot held by `token`. Returns false for a stale token.
    pub fn settle(&mut self, token: InFlightToken) -> bool {
        if self.in_flight == Some(token.id) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }
}

pub struct ActionDispatcher {
    api: Arc<dyn MatchApi>,
}

impl ActionDispatcher {
    pub fn new(api: Arc<dyn MatchApi>) -> Self {
        Self { api }
    }

    pub async fn dispatch(&self, action: &ValidatedAction) -> Result<MatchSnapshot, DispatchError> {
        info!(
            match_id = %action.match_id,
            team = %action.team_index,
            action = %action.kind,
            map = %action.map_id,
            "dispatch: sending action"
        );
        self.api
            .apply_action(
                &action.match_id,
                action.team_index,
                action.kind,
                action.map_id,
                Some(action.credential.as_str()),
            )
            .await
            .map_err(|err| {
                warn!(match_id = %action.match_id, "dispatch: action failed: {err}");
                DispatchError::Rejected(err)
            })
    }
}
