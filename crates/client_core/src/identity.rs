//! Viewer identity derived from the entry route and locally persisted
//! captain credentials. Never derived from server state.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use shared::domain::{MatchId, Role, TeamIndex};
use storage::Storage;
use tracing::{info, warn};

use crate::route::{MatchRoute, Navigator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    pub match_id: MatchId,
    pub team_index: Option<TeamIndex>,
    pub role: Role,
    pub credential: Option<String>,
}

impl IdentityContext {
    pub fn spectator(match_id: MatchId) -> Self {
        Self {
            match_id,
            team_index: None,
            role: Role::Spectator,
            credential: None,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.credential
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}

/// Result of consulting the credential store for one `(match, team)` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredAuthLookup {
    Missing,
    Found(String),
    /// The store itself could not be read.
    Unavailable,
}

#[async_trait]
pub trait CaptainAuthStore: Send + Sync {
    async fn load_raw(&self, match_id: &MatchId, team_param: &str) -> Result<Option<String>>;
}

#[async_trait]
impl CaptainAuthStore for Storage {
    async fn load_raw(&self, match_id: &MatchId, team_param: &str) -> Result<Option<String>> {
        self.load_captain_auth_raw(match_id, team_param).await
    }
}

pub struct MissingCaptainAuthStore;

#[async_trait]
impl CaptainAuthStore for MissingCaptainAuthStore {
    async fn load_raw(&self, match_id: &MatchId, _team_param: &str) -> Result<Option<String>> {
        Err(anyhow!(
            "credential store unavailable for match {}",
            match_id
        ))
    }
}

pub async fn lookup_stored_auth(
    store: &dyn CaptainAuthStore,
    route: &MatchRoute,
) -> StoredAuthLookup {
    let Some(team_param) = route.team_param.as_deref() else {
        return StoredAuthLookup::Missing;
    };
    match store.load_raw(&route.match_id, team_param).await {
        Ok(Some(raw)) => StoredAuthLookup::Found(raw),
        Ok(None) => StoredAuthLookup::Missing,
        Err(err) => {
            warn!(match_id = %route.match_id, team = team_param, "identity: credential lookup failed: {err:#}");
            StoredAuthLookup::Unavailable
        }
    }
}

/// Resolves the viewer identity for a route entry.
///
/// Without a team parameter, or without a stored record for it, the viewer is
/// a spectator and the navigator is asked to canonicalize the URL. A stored
/// record that does not parse still yields a captain, with no credential, so
/// the turn gate rejects it visibly.
pub fn resolve_identity(
    route: &MatchRoute,
    stored: &StoredAuthLookup,
    navigator: &dyn Navigator,
) -> IdentityContext {
    let match_id = route.match_id.clone();
    let Some(team_param) = route.team_param.as_deref() else {
        return spectator_with_redirect(match_id, navigator);
    };
    let route_team = TeamIndex::parse_param(team_param);

    let identity = match stored {
        StoredAuthLookup::Missing => return spectator_with_redirect(match_id, navigator),
        StoredAuthLookup::Unavailable => IdentityContext {
            match_id,
            team_index: route_team,
            role: Role::Unknown,
            credential: None,
        },
        StoredAuthLookup::Found(raw) => match parse_stored_record(raw) {
            Some(record) => IdentityContext {
                match_id,
                team_index: record.team.or(route_team),
                role: record.role,
                credential: record.token,
            },
            None => {
                warn!(match_id = %route.match_id, team = team_param, "identity: stored credential is malformed");
                IdentityContext {
                    match_id,
                    team_index: route_team,
                    role: Role::Captain,
                    credential: None,
                }
            }
        },
    };

    info!(
        match_id = %identity.match_id,
        role = ?identity.role,
        team = ?identity.team_index,
        has_credential = identity.has_credential(),
        "identity: resolved"
    );
    identity
}

fn spectator_with_redirect(match_id: MatchId, navigator: &dyn Navigator) -> IdentityContext {
    navigator.canonicalize_spectator(&match_id);
    info!(match_id = %match_id, "identity: resolved as spectator");
    IdentityContext::spectator(match_id)
}

struct ParsedRecord {
    role: Role,
    team: Option<TeamIndex>,
    token: Option<String>,
}

/// Lenient reader for `{role, team, token}`. Returns `None` unless the text is
/// a JSON object; individual fields of the wrong type fall back to defaults.
fn parse_stored_record(raw: &str) -> Option<ParsedRecord> {
    let Value::Object(fields) = serde_json::from_str::<Value>(raw).ok()? else {
        return None;
    };

    let role = match fields.get("role") {
        None | Some(Value::Null) => Role::Captain,
        Some(Value::String(role)) if role == "captain" => Role::Captain,
        Some(Value::String(role)) if role == "spectator" => Role::Spectator,
        Some(_) => Role::Unknown,
    };
    let team = fields
        .get("team")
        .and_then(integral_number)
        .and_then(|raw| TeamIndex::new(raw).ok());
    let token = fields
        .get("token")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    Some(ParsedRecord { role, team, token })
}

/// Accepts `1` and `1.0` alike. Fractional numbers are not integers.
fn integral_number(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|number| number.fract() == 0.0 && number.abs() <= i64::MAX as f64)
            .map(|number| number as i64)
    })
}

#[cfg(test)]
#[path = "tests/identity_tests.rs"]
mod tests;
