use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server-issued match identifier. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub String);

impl MatchId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Catalog map identifier. `0` is reserved for "unassigned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapId(pub u32);

impl MapId {
    pub const UNASSIGNED: MapId = MapId(0);

    pub fn is_assigned(self) -> bool {
        self != Self::UNASSIGNED
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("team index must be 0 or 1, got {0}")]
pub struct InvalidTeamIndex(pub i64);

/// Index into the fixed two-team array of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct TeamIndex(u8);

impl TeamIndex {
    pub const A: TeamIndex = TeamIndex(0);
    pub const B: TeamIndex = TeamIndex(1);

    pub fn new(raw: i64) -> Result<Self, InvalidTeamIndex> {
        match raw {
            0 | 1 => Ok(Self(raw as u8)),
            other => Err(InvalidTeamIndex(other)),
        }
    }

    /// Parses a route/query parameter. Anything that is not `0` or `1` yields `None`.
    pub fn parse_param(raw: &str) -> Option<Self> {
        raw.trim().parse::<i64>().ok().and_then(|v| Self::new(v).ok())
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }

    pub fn opponent(self) -> Self {
        Self(1 - self.0)
    }
}

impl TryFrom<i64> for TeamIndex {
    type Error = InvalidTeamIndex;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TeamIndex> for u8 {
    fn from(value: TeamIndex) -> Self {
        value.0
    }
}

impl fmt::Display for TeamIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown phase id {0}")]
pub struct UnknownPhase(pub i64);

/// Veto phase as owned by the server. The client only observes transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub enum Phase {
    Ban,
    Pick,
    Completed,
}

impl Phase {
    pub const BAN_ID: u8 = 0;
    pub const PICK_ID: u8 = 1;
    pub const COMPLETED_ID: u8 = 2;

    /// The action a captain performs in this phase, if any.
    pub fn action_kind(self) -> Option<ActionKind> {
        match self {
            Phase::Ban => Some(ActionKind::Ban),
            Phase::Pick => Some(ActionKind::Pick),
            Phase::Completed => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Ban => "Ban Phase",
            Phase::Pick => "Pick Phase",
            Phase::Completed => "Completed",
        }
    }
}

impl TryFrom<i64> for Phase {
    type Error = UnknownPhase;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            v if v == i64::from(Self::BAN_ID) => Ok(Phase::Ban),
            v if v == i64::from(Self::PICK_ID) => Ok(Phase::Pick),
            v if v == i64::from(Self::COMPLETED_ID) => Ok(Phase::Completed),
            other => Err(UnknownPhase(other)),
        }
    }
}

impl From<Phase> for u8 {
    fn from(value: Phase) -> Self {
        match value {
            Phase::Ban => Phase::BAN_ID,
            Phase::Pick => Phase::PICK_ID,
            Phase::Completed => Phase::COMPLETED_ID,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesType {
    Bo1,
    Bo3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Ban,
    Pick,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Ban => "ban",
            ActionKind::Pick => "pick",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Viewer role within a match session. `Unknown` is used when the credential
/// store could not be consulted at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Captain,
    Spectator,
    Unknown,
}
