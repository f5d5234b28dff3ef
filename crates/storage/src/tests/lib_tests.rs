use super::*;

fn match_id() -> MatchId {
    MatchId::new("m-42")
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("veto_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("veto.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn key_is_namespaced_by_match_and_team_param() {
    assert_eq!(captain_auth_key(&match_id(), "1"), "match_m-42_team_1_auth");
}

#[tokio::test]
async fn stores_and_loads_captain_record_as_json() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .store_captain_auth(&match_id(), "1", &CaptainAuthRecord::captain(TeamIndex::B, "tok"))
        .await
        .expect("store");

    let raw = storage
        .load_captain_auth_raw(&match_id(), "1")
        .await
        .expect("load")
        .expect("present");
    let decoded: CaptainAuthRecord = serde_json::from_str(&raw).expect("json");
    assert_eq!(decoded, CaptainAuthRecord::captain(TeamIndex::B, "tok"));

    assert!(storage
        .load_captain_auth_raw(&match_id(), "0")
        .await
        .expect("load other team")
        .is_none());
}

#[tokio::test]
async fn raw_payload_is_kept_verbatim_and_overwritten_on_restore() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .store_captain_auth_raw(&match_id(), "0", "{not json")
        .await
        .expect("store malformed");
    assert_eq!(
        storage
            .load_captain_auth_raw(&match_id(), "0")
            .await
            .expect("load")
            .as_deref(),
        Some("{not json")
    );

    storage
        .store_captain_auth_raw(&match_id(), "0", r#"{"token":"t2"}"#)
        .await
        .expect("overwrite");
    let listed = storage
        .list_captain_auth_for_match(&match_id())
        .await
        .expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].payload, r#"{"token":"t2"}"#);
    assert_eq!(listed[0].storage_key, "match_m-42_team_0_auth");
}

#[tokio::test]
async fn forgets_single_key_and_whole_match() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    for team in ["0", "1"] {
        storage
            .store_captain_auth_raw(&match_id(), team, "{}")
            .await
            .expect("store");
    }
    storage
        .store_captain_auth_raw(&MatchId::new("other"), "0", "{}")
        .await
        .expect("store other");

    assert!(storage
        .forget_captain_auth(&match_id(), "0")
        .await
        .expect("forget"));
    assert!(!storage
        .forget_captain_auth(&match_id(), "0")
        .await
        .expect("forget again"));
    assert_eq!(storage.forget_match(&match_id()).await.expect("forget match"), 1);
    assert!(storage
        .load_captain_auth_raw(&MatchId::new("other"), "0")
        .await
        .expect("load")
        .is_some());
}
