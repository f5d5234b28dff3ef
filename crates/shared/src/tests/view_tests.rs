use super::*;
use crate::protocol::{PickSlot, Team};

fn catalog() -> Vec<MapInfo> {
    [(1, "Ascent"), (2, "Bind"), (3, "Haven"), (7, "Split")]
        .into_iter()
        .map(|(id, name)| MapInfo {
            id: MapId(id),
            name: name.to_string(),
        })
        .collect()
}

fn team(name: &str) -> Team {
    Team {
        name: name.to_string(),
        banned_map_ids: Vec::new(),
        picked_map_ids: Vec::new(),
        slots: Vec::new(),
    }
}

fn snapshot(phase: Phase) -> MatchSnapshot {
    MatchSnapshot {
        phase,
        current_turn_team: TeamIndex::A,
        series_type: SeriesType::Bo3,
        decider_map_id: None,
        available_maps: catalog(),
        teams: [team("Team A"), team("Team B")],
    }
}

#[test]
fn decodes_server_json_with_numeric_phase() {
    let raw = r#"{
        "phase": 1,
        "currentTurnTeam": 1,
        "seriesType": "bo1",
        "deciderMapId": null,
        "availableMaps": [{"id": 1, "name": "Ascent"}],
        "teams": [
            {"name": "Team A", "bannedMapIds": [], "pickedMapIds": [1]},
            {"name": "Team B", "bannedMapIds": [], "slots": [{"mapId": 0}]}
        ]
    }"#;
    let decoded: MatchSnapshot = serde_json::from_str(raw).expect("decode");
    assert_eq!(decoded.phase, Phase::Pick);
    assert_eq!(decoded.current_turn_team, TeamIndex::B);
    assert!(decoded.is_bo1());
    assert!(decoded.is_map_picked(MapId(1)));
}

#[test]
fn rejects_out_of_range_turn_and_wrong_team_count() {
    let bad_turn = r#"{"phase":0,"currentTurnTeam":2,"seriesType":"bo3","availableMaps":[],
        "teams":[{"name":"a"},{"name":"b"}]}"#;
    assert!(serde_json::from_str::<MatchSnapshot>(bad_turn).is_err());

    let three_teams = r#"{"phase":0,"currentTurnTeam":0,"seriesType":"bo3","availableMaps":[],
        "teams":[{"name":"a"},{"name":"b"},{"name":"c"}]}"#;
    assert!(serde_json::from_str::<MatchSnapshot>(three_teams).is_err());
}

#[test]
fn decider_only_counts_once_completed() {
    let mut state = snapshot(Phase::Completed);
    state.decider_map_id = Some(MapId(7));
    assert!(state.is_decider(MapId(7)));
    for other in [1, 2, 3] {
        assert!(!state.is_decider(MapId(other)));
    }

    state.phase = Phase::Pick;
    assert!(!state.is_decider(MapId(7)));
}

#[test]
fn map_names_fall_back_for_unknown_and_unassigned_ids() {
    let state = snapshot(Phase::Ban);
    assert_eq!(state.map_name(MapId(3)), "Haven");
    assert_eq!(state.map_name(MapId(42)), "Map 42");
    assert_eq!(state.map_name(MapId::UNASSIGNED), "");
}

#[test]
fn picked_names_merge_slots_and_flat_ids() {
    let mut state = snapshot(Phase::Pick);
    state.teams[0].slots = vec![
        PickSlot { map_id: MapId(2) },
        PickSlot {
            map_id: MapId::UNASSIGNED,
        },
    ];
    state.teams[0].picked_map_ids = vec![MapId(2), MapId(3)];
    assert_eq!(
        state.team_picked_map_names(TeamIndex::A),
        vec!["Bind".to_string(), "Haven".to_string()]
    );
    assert!(state.team_picked_map_names(TeamIndex::B).is_empty());
}

#[test]
fn status_and_selectability_follow_board_state() {
    let mut state = snapshot(Phase::Ban);
    state.teams[1].banned_map_ids.push(MapId(1));
    state.teams[0].picked_map_ids.push(MapId(2));

    assert_eq!(state.map_status(MapId(1)), MapStatus::Banned);
    assert_eq!(state.map_status(MapId(2)), MapStatus::Picked);
    assert_eq!(state.map_status(MapId(3)), MapStatus::Available);
    assert!(state.is_map_selectable(MapId(3)));
    assert!(!state.is_map_selectable(MapId(1)));
    assert!(!state.is_map_selectable(MapId(99)));
}

#[test]
fn current_team_name_falls_back_to_index() {
    let mut state = snapshot(Phase::Ban);
    state.teams[1].name = "  ".to_string();
    state.current_turn_team = TeamIndex::B;
    assert_eq!(state.current_team_name(), "Team 1");
    assert_eq!(state.phase_label(), "Ban Phase");
}

#[test]
fn reports_invariant_anomalies_without_repairing() {
    let mut state = snapshot(Phase::Completed);
    state.available_maps.push(MapInfo {
        id: MapId(1),
        name: "Ascent again".to_string(),
    });
    state.teams[0].banned_map_ids.push(MapId(3));
    state.teams[1].picked_map_ids.push(MapId(3));
    state.decider_map_id = Some(MapId(99));

    let anomalies = state.check_invariants();
    assert_eq!(
        anomalies,
        vec![
            SnapshotAnomaly::DuplicateCatalogId(MapId(1)),
            SnapshotAnomaly::BannedAndPicked(MapId(3)),
            SnapshotAnomaly::DeciderNotInCatalog(MapId(99)),
        ]
    );
    assert!(snapshot(Phase::Ban).check_invariants().is_empty());
}
