use shared::domain::{MatchId, TeamIndex};
use tracing::info;

/// Entry route of a match view: `/match/{id}` for spectators,
/// `/match/{id}/{team}` for captains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRoute {
    pub match_id: MatchId,
    pub team_param: Option<String>,
}

impl MatchRoute {
    pub fn spectator(match_id: MatchId) -> Self {
        Self {
            match_id,
            team_param: None,
        }
    }

    pub fn captain(match_id: MatchId, team: TeamIndex) -> Self {
        Self {
            match_id,
            team_param: Some(team.to_string()),
        }
    }

    pub fn parse(path: &str) -> Option<Self> {
        let mut segments = path.trim().trim_matches('/').split('/');
        if segments.next()? != "match" {
            return None;
        }
        let match_id = segments.next().filter(|id| !id.is_empty())?;
        let team_param = segments
            .next()
            .filter(|team| !team.is_empty())
            .map(str::to_string);
        if segments.next().is_some() {
            return None;
        }
        Some(Self {
            match_id: MatchId::new(match_id),
            team_param,
        })
    }

    pub fn parsed_team(&self) -> Option<TeamIndex> {
        self.team_param.as_deref().and_then(TeamIndex::parse_param)
    }

    pub fn path(&self) -> String {
        match &self.team_param {
            Some(team) => format!("/match/{}/{team}", self.match_id),
            None => self.spectator_path(),
        }
    }

    pub fn spectator_path(&self) -> String {
        format!("/match/{}", self.match_id)
    }
}

/// Navigation side effects requested by the core. The host decides how to
/// carry them out.
pub trait Navigator: Send + Sync {
    /// Rewrite the current location to the spectator form of the match route.
    fn canonicalize_spectator(&self, match_id: &MatchId);
    /// Leave the match view for a safe entry point.
    fn leave_to_entry(&self);
}

pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn canonicalize_spectator(&self, match_id: &MatchId) {
        info!(match_id = %match_id, "route: canonical spectator path /match/{match_id}");
    }

    fn leave_to_entry(&self) {
        info!("route: returning to entry point");
    }
}

#[cfg(test)]
#[path = "tests/route_tests.rs"]
mod tests;
