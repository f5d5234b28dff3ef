use serde::{Deserialize, Serialize};

use crate::domain::{MapId, MatchId, Phase, SeriesType, TeamIndex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapInfo {
    pub id: MapId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickSlot {
    pub map_id: MapId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub name: String,
    #[serde(default)]
    pub banned_map_ids: Vec<MapId>,
    #[serde(default)]
    pub picked_map_ids: Vec<MapId>,
    #[serde(default)]
    pub slots: Vec<PickSlot>,
}

impl Team {
    pub fn has_banned(&self, map_id: MapId) -> bool {
        self.banned_map_ids.contains(&map_id)
    }

    /// Older servers report picks as slots, newer ones as a flat id list; both count.
    pub fn has_picked(&self, map_id: MapId) -> bool {
        map_id.is_assigned()
            && (self.picked_map_ids.contains(&map_id)
                || self.slots.iter().any(|slot| slot.map_id == map_id))
    }

    /// Picked ids in display order, slots first, without duplicates or unassigned slots.
    pub fn picked_ids(&self) -> Vec<MapId> {
        let mut ids: Vec<MapId> = Vec::new();
        let from_slots = self.slots.iter().map(|slot| slot.map_id);
        for id in from_slots.chain(self.picked_map_ids.iter().copied()) {
            if id.is_assigned() && !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

/// Whole-state view of a match as last reported by the server.
///
/// Snapshots are never patched locally: every update replaces the previous
/// value wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    pub phase: Phase,
    pub current_turn_team: TeamIndex,
    pub series_type: SeriesType,
    #[serde(default)]
    pub decider_map_id: Option<MapId>,
    pub available_maps: Vec<MapInfo>,
    pub teams: [Team; 2],
}

impl MatchSnapshot {
    pub fn team(&self, index: TeamIndex) -> &Team {
        &self.teams[index.get()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMatchResponse {
    pub match_id: MatchId,
}
