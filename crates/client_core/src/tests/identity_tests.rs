use super::*;
use std::sync::Mutex;

#[derive(Default)]
struct RecordingNavigator {
    canonicalized: Mutex<Vec<MatchId>>,
    left: Mutex<u32>,
}

impl RecordingNavigator {
    fn canonicalized(&self) -> Vec<MatchId> {
        self.canonicalized.lock().expect("lock").clone()
    }
}

impl Navigator for RecordingNavigator {
    fn canonicalize_spectator(&self, match_id: &MatchId) {
        self.canonicalized
            .lock()
            .expect("lock")
            .push(match_id.clone());
    }

    fn leave_to_entry(&self) {
        *self.left.lock().expect("lock") += 1;
    }
}

struct FixedStore(Option<String>);

#[async_trait]
impl CaptainAuthStore for FixedStore {
    async fn load_raw(&self, _match_id: &MatchId, _team_param: &str) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

fn captain_route(team: &str) -> MatchRoute {
    MatchRoute {
        match_id: MatchId::new("m1"),
        team_param: Some(team.to_string()),
    }
}

#[test]
fn route_without_team_is_spectator_and_canonicalized() {
    let navigator = RecordingNavigator::default();
    let route = MatchRoute::spectator(MatchId::new("m1"));

    let identity = resolve_identity(&route, &StoredAuthLookup::Missing, &navigator);

    assert_eq!(identity, IdentityContext::spectator(MatchId::new("m1")));
    assert_eq!(navigator.canonicalized(), vec![MatchId::new("m1")]);
}

#[test]
fn missing_record_demotes_to_spectator() {
    let navigator = RecordingNavigator::default();

    let identity = resolve_identity(&captain_route("0"), &StoredAuthLookup::Missing, &navigator);

    assert_eq!(identity.role, Role::Spectator);
    assert_eq!(identity.team_index, None);
    assert!(identity.credential.is_none());
    assert_eq!(navigator.canonicalized().len(), 1);
}

#[test]
fn stored_record_yields_captain_with_token() {
    let navigator = RecordingNavigator::default();
    let stored = StoredAuthLookup::Found(r#"{"role":"captain","team":1,"token":"tok-b"}"#.into());

    let identity = resolve_identity(&captain_route("1"), &stored, &navigator);

    assert_eq!(identity.role, Role::Captain);
    assert_eq!(identity.team_index, Some(TeamIndex::B));
    assert_eq!(identity.credential.as_deref(), Some("tok-b"));
    assert!(navigator.canonicalized().is_empty());
}

#[test]
fn record_without_team_uses_route_team() {
    let navigator = RecordingNavigator::default();
    let stored = StoredAuthLookup::Found(r#"{"token":"abc"}"#.into());

    let identity = resolve_identity(&captain_route("0"), &stored, &navigator);

    assert_eq!(identity.role, Role::Captain);
    assert_eq!(identity.team_index, Some(TeamIndex::A));
    assert!(identity.has_credential());
}

#[test]
fn malformed_record_is_captain_without_credential() {
    let navigator = RecordingNavigator::default();
    for raw in ["not json", "[1,2]", "\"captain\"", "{"] {
        let stored = StoredAuthLookup::Found(raw.to_string());

        let identity = resolve_identity(&captain_route("0"), &stored, &navigator);

        assert_eq!(identity.role, Role::Captain, "raw={raw}");
        assert_eq!(identity.team_index, Some(TeamIndex::A), "raw={raw}");
        assert_eq!(identity.credential, None, "raw={raw}");
    }
    assert!(navigator.canonicalized().is_empty());
}

#[test]
fn unreadable_store_resolves_unknown_role() {
    let navigator = RecordingNavigator::default();

    let identity = resolve_identity(&captain_route("1"), &StoredAuthLookup::Unavailable, &navigator);

    assert_eq!(identity.role, Role::Unknown);
    assert_eq!(identity.team_index, Some(TeamIndex::B));
    assert!(!identity.has_credential());
}

#[test]
fn lenient_parser_handles_odd_fields() {
    let record = parse_stored_record(r#"{"role":"admin","team":5,"token":""}"#).expect("object");
    assert_eq!(record.role, Role::Unknown);
    assert_eq!(record.team, None);
    assert_eq!(record.token, None);

    let record = parse_stored_record(r#"{"role":"spectator","team":"1","token":42}"#).expect("object");
    assert_eq!(record.role, Role::Spectator);
    assert_eq!(record.team, None);
    assert_eq!(record.token, None);
}

#[test]
fn whole_float_team_counts_as_integer() {
    let record = parse_stored_record(r#"{"team":1.0,"token":"t"}"#).expect("object");
    assert_eq!(record.team, Some(TeamIndex::B));
    assert_eq!(record.token.as_deref(), Some("t"));

    let record = parse_stored_record(r#"{"team":0.5,"token":"t"}"#).expect("object");
    assert_eq!(record.team, None);

    let route = captain_route("0");
    let stored = StoredAuthLookup::Found(r#"{"team":1.5,"token":"t"}"#.into());
    let identity = resolve_identity(&route, &stored, &RecordingNavigator::default());
    assert_eq!(identity.team_index, Some(TeamIndex::A));
}

#[tokio::test]
async fn lookup_skips_store_without_team_param() {
    let store = FixedStore(Some("{}".to_string()));
    let route = MatchRoute::spectator(MatchId::new("m1"));

    assert_eq!(lookup_stored_auth(&store, &route).await, StoredAuthLookup::Missing);
}

#[tokio::test]
async fn lookup_reports_found_missing_and_unavailable() {
    let found = FixedStore(Some(r#"{"token":"t"}"#.to_string()));
    assert_eq!(
        lookup_stored_auth(&found, &captain_route("0")).await,
        StoredAuthLookup::Found(r#"{"token":"t"}"#.to_string())
    );

    let empty = FixedStore(None);
    assert_eq!(
        lookup_stored_auth(&empty, &captain_route("0")).await,
        StoredAuthLookup::Missing
    );

    assert_eq!(
        lookup_stored_auth(&MissingCaptainAuthStore, &captain_route("0")).await,
        StoredAuthLookup::Unavailable
    );
}

#[tokio::test]
async fn lookup_reads_records_persisted_in_storage() {
    let storage = Storage::new("sqlite::memory:").await.expect("storage");
    storage
        .store_captain_auth_raw(&MatchId::new("m1"), "1", r#"{"team":1,"token":"persisted"}"#)
        .await
        .expect("store");

    let stored = lookup_stored_auth(&storage, &captain_route("1")).await;
    let identity = resolve_identity(&captain_route("1"), &stored, &RecordingNavigator::default());

    assert_eq!(identity.credential.as_deref(), Some("persisted"));
    assert_eq!(identity.team_index, Some(TeamIndex::B));
}
