use shared::domain::{MatchId, TeamIndex};
use tracing::{error, info};

use crate::{
    api::MatchApi,
    error::{InputError, LobbyError},
    route::MatchRoute,
};

pub const DEFAULT_TEAM_A_NAME: &str = "Team A";
pub const DEFAULT_TEAM_B_NAME: &str = "Team B";
pub const DEFAULT_SLOTS_PER_TEAM: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMatchRequest {
    pub team_a: String,
    pub team_b: String,
    pub slots_per_team: u32,
}

impl Default for CreateMatchRequest {
    fn default() -> Self {
        Self {
            team_a: DEFAULT_TEAM_A_NAME.to_string(),
            team_b: DEFAULT_TEAM_B_NAME.to_string(),
            slots_per_team: DEFAULT_SLOTS_PER_TEAM,
        }
    }
}

impl CreateMatchRequest {
    pub fn validate(&self) -> Result<(), InputError> {
        if self.team_a.trim().is_empty() || self.team_b.trim().is_empty() {
            return Err(InputError::MissingTeamName);
        }
        if self.slots_per_team == 0 {
            return Err(InputError::InvalidSlots);
        }
        Ok(())
    }
}

pub async fn create_match(
    api: &dyn MatchApi,
    request: &CreateMatchRequest,
) -> Result<MatchId, LobbyError> {
    request.validate()?;
    let match_id = api
        .create_match(
            request.team_a.trim(),
            request.team_b.trim(),
            request.slots_per_team,
        )
        .await
        .map_err(|err| {
            error!("lobby: create match failed: {err}");
            LobbyError::CreateFailed(err)
        })?;
    info!(match_id = %match_id, slots = request.slots_per_team, "lobby: match created");
    Ok(match_id)
}

/// Validates a join form and returns the captain route for it.
pub fn join_match(match_id_input: &str, team_index: Option<i64>) -> Result<MatchRoute, InputError> {
    let match_id = parse_match_id(match_id_input)?;
    let team = team_index
        .and_then(|raw| TeamIndex::new(raw).ok())
        .ok_or(InputError::InvalidTeam)?;
    Ok(MatchRoute::captain(match_id, team))
}

pub fn join_as_spectator(match_id_input: &str) -> Result<MatchRoute, InputError> {
    Ok(MatchRoute::spectator(parse_match_id(match_id_input)?))
}

fn parse_match_id(raw: &str) -> Result<MatchId, InputError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InputError::MissingMatchId);
    }
    Ok(MatchId::new(trimmed))
}

#[cfg(test)]
#[path = "tests/lobby_tests.rs"]
mod tests;
