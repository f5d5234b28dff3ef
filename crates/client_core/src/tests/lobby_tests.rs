use super::*;
use async_trait::async_trait;
use shared::{
    domain::{ActionKind, MapId},
    protocol::MatchSnapshot,
};
use std::sync::Mutex;

use crate::error::TransportError;

#[derive(Default)]
struct RecordingApi {
    created: Mutex<Vec<(String, String, u32)>>,
    fail: bool,
}

#[async_trait]
impl MatchApi for RecordingApi {
    async fn create_match(
        &self,
        team_a: &str,
        team_b: &str,
        slots_per_team: u32,
    ) -> Result<MatchId, TransportError> {
        if self.fail {
            return Err(TransportError::Rejected {
                status: 500,
                message: "boom".to_string(),
            });
        }
        self.created.lock().expect("lock").push((
            team_a.to_string(),
            team_b.to_string(),
            slots_per_team,
        ));
        Ok(MatchId::new("new-match"))
    }

    async fn get_state(&self, _match_id: &MatchId) -> Result<MatchSnapshot, TransportError> {
        Err(TransportError::Decode("unused".to_string()))
    }

    async fn apply_action(
        &self,
        _match_id: &MatchId,
        _team_index: TeamIndex,
        _kind: ActionKind,
        _map_id: MapId,
        _credential: Option<&str>,
    ) -> Result<MatchSnapshot, TransportError> {
        Err(TransportError::Decode("unused".to_string()))
    }
}

#[test]
fn default_request_uses_standard_team_names() {
    let request = CreateMatchRequest::default();
    assert_eq!(request.team_a, "Team A");
    assert_eq!(request.team_b, "Team B");
    assert_eq!(request.slots_per_team, 1);
    assert_eq!(request.validate(), Ok(()));
}

#[test]
fn blank_names_and_zero_slots_are_rejected() {
    let blank = CreateMatchRequest {
        team_b: "   ".to_string(),
        ..CreateMatchRequest::default()
    };
    assert_eq!(blank.validate(), Err(InputError::MissingTeamName));

    let no_slots = CreateMatchRequest {
        slots_per_team: 0,
        ..CreateMatchRequest::default()
    };
    assert_eq!(no_slots.validate(), Err(InputError::InvalidSlots));
}

#[tokio::test]
async fn create_match_trims_names_before_sending() {
    let api = RecordingApi::default();
    let request = CreateMatchRequest {
        team_a: "  Sentinels ".to_string(),
        team_b: "Fnatic".to_string(),
        slots_per_team: 2,
    };

    let match_id = create_match(&api, &request).await.expect("created");

    assert_eq!(match_id, MatchId::new("new-match"));
    assert_eq!(
        api.created.lock().expect("lock").as_slice(),
        &[("Sentinels".to_string(), "Fnatic".to_string(), 2)]
    );
}

#[tokio::test]
async fn invalid_request_never_reaches_the_server() {
    let api = RecordingApi::default();
    let request = CreateMatchRequest {
        team_a: String::new(),
        ..CreateMatchRequest::default()
    };

    let err = create_match(&api, &request).await.expect_err("invalid");

    assert!(matches!(err, LobbyError::Input(InputError::MissingTeamName)));
    assert!(api.created.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn server_failure_reports_failed_to_create() {
    let api = RecordingApi {
        fail: true,
        ..RecordingApi::default()
    };

    let err = create_match(&api, &CreateMatchRequest::default())
        .await
        .expect_err("failed");

    assert_eq!(err.to_string(), "Failed to create match");
}

#[test]
fn join_trims_match_id_and_builds_captain_route() {
    let route = join_match("  abc123 ", Some(1)).expect("route");

    assert_eq!(route.match_id, MatchId::new("abc123"));
    assert_eq!(route.path(), "/match/abc123/1");
}

#[test]
fn join_requires_match_id_then_team() {
    assert_eq!(join_match("   ", Some(0)), Err(InputError::MissingMatchId));
    assert_eq!(
        join_match("", None).map_err(|err| err.to_string()),
        Err("Enter a match ID to join.".to_string())
    );
    assert_eq!(join_match("abc", None), Err(InputError::InvalidTeam));
    assert_eq!(
        join_match("abc", Some(2)).map_err(|err| err.to_string()),
        Err("Select a team index (0 or 1).".to_string())
    );
}

#[test]
fn spectator_join_uses_short_route() {
    let route = join_as_spectator("abc").expect("route");
    assert_eq!(route.path(), "/match/abc");
    assert_eq!(route.team_param, None);
}
