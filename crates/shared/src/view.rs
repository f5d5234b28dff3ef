//! Read-only queries over a [`MatchSnapshot`] used to render the veto board.

use std::{collections::HashSet, fmt};

use crate::{
    domain::{MapId, Phase, SeriesType, TeamIndex},
    protocol::{MapInfo, MatchSnapshot},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapStatus {
    Available,
    Banned,
    Picked,
    Decider,
}

/// Server-side invariants a snapshot violated. Reported, never repaired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotAnomaly {
    DuplicateCatalogId(MapId),
    BannedAndPicked(MapId),
    DeciderNotInCatalog(MapId),
}

impl fmt::Display for SnapshotAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotAnomaly::DuplicateCatalogId(id) => {
                write!(f, "map id {id} appears more than once in the catalog")
            }
            SnapshotAnomaly::BannedAndPicked(id) => {
                write!(f, "map id {id} is both banned and picked")
            }
            SnapshotAnomaly::DeciderNotInCatalog(id) => {
                write!(f, "decider map id {id} is not in the catalog")
            }
        }
    }
}

impl MatchSnapshot {
    pub fn phase_label(&self) -> &'static str {
        self.phase.label()
    }

    pub fn team_name(&self, index: TeamIndex) -> String {
        let name = self.team(index).name.trim();
        if name.is_empty() {
            format!("Team {index}")
        } else {
            name.to_string()
        }
    }

    pub fn current_team_name(&self) -> String {
        self.team_name(self.current_turn_team)
    }

    pub fn map(&self, map_id: MapId) -> Option<&MapInfo> {
        self.available_maps.iter().find(|map| map.id == map_id)
    }

    /// Display name for a map id; empty for the unassigned id.
    pub fn map_name(&self, map_id: MapId) -> String {
        if !map_id.is_assigned() {
            return String::new();
        }
        match self.map(map_id) {
            Some(map) => map.name.clone(),
            None => format!("Map {map_id}"),
        }
    }

    pub fn is_map_banned(&self, map_id: MapId) -> bool {
        self.teams.iter().any(|team| team.has_banned(map_id))
    }

    pub fn is_map_picked(&self, map_id: MapId) -> bool {
        self.teams.iter().any(|team| team.has_picked(map_id))
    }

    /// True only once the veto is completed and `map_id` is the decider.
    pub fn is_decider(&self, map_id: MapId) -> bool {
        self.phase == Phase::Completed && self.decider_map_id == Some(map_id)
    }

    pub fn is_bo1(&self) -> bool {
        self.series_type == SeriesType::Bo1
    }

    pub fn is_bo3(&self) -> bool {
        self.series_type == SeriesType::Bo3
    }

    pub fn team_picked_map_names(&self, index: TeamIndex) -> Vec<String> {
        self.team(index)
            .picked_ids()
            .into_iter()
            .map(|id| self.map_name(id))
            .filter(|name| !name.is_empty())
            .collect()
    }

    pub fn decider_map_name(&self) -> String {
        match self.decider_map_id {
            Some(id) => self.map_name(id),
            None => String::new(),
        }
    }

    pub fn map_status(&self, map_id: MapId) -> MapStatus {
        if self.is_decider(map_id) {
            MapStatus::Decider
        } else if self.is_map_banned(map_id) {
            MapStatus::Banned
        } else if self.is_map_picked(map_id) {
            MapStatus::Picked
        } else {
            MapStatus::Available
        }
    }

    /// Whether a control for this map should be enabled. Purely cosmetic; the
    /// server remains the judge of legality.
    pub fn is_map_selectable(&self, map_id: MapId) -> bool {
        self.phase != Phase::Completed
            && self.map(map_id).is_some()
            && self.map_status(map_id) == MapStatus::Available
    }

    pub fn check_invariants(&self) -> Vec<SnapshotAnomaly> {
        let mut anomalies = Vec::new();

        let mut seen = HashSet::new();
        for map in &self.available_maps {
            if !seen.insert(map.id) {
                anomalies.push(SnapshotAnomaly::DuplicateCatalogId(map.id));
            }
        }

        let banned: HashSet<MapId> = self
            .teams
            .iter()
            .flat_map(|team| team.banned_map_ids.iter().copied())
            .collect();
        let mut both: Vec<MapId> = self
            .teams
            .iter()
            .flat_map(|team| team.picked_ids())
            .filter(|id| banned.contains(id))
            .collect();
        both.sort();
        both.dedup();
        anomalies.extend(both.into_iter().map(SnapshotAnomaly::BannedAndPicked));

        if self.phase == Phase::Completed {
            if let Some(decider) = self.decider_map_id {
                if self.map(decider).is_none() {
                    anomalies.push(SnapshotAnomaly::DeciderNotInCatalog(decider));
                }
            }
        }

        anomalies
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
