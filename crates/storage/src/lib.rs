use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::domain::{MatchId, Role, TeamIndex};

/// Persisted captain record, written after a credential has been issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptainAuthRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl CaptainAuthRecord {
    pub fn captain(team: TeamIndex, token: impl Into<String>) -> Self {
        Self {
            role: Some(Role::Captain),
            team: Some(team),
            token: Some(token.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredCaptainAuth {
    pub storage_key: String,
    pub match_id: MatchId,
    pub team_param: String,
    pub payload: String,
    pub updated_at: DateTime<Utc>,
}

/// Key under which the record for `(match_id, team_param)` is kept.
pub fn captain_auth_key(match_id: &MatchId, team_param: &str) -> String {
    format!("match_{}_team_{}_auth", match_id.as_str(), team_param)
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every in-memory connection is its own database.
        let max_connections = if sqlite_path(database_url).is_some() { 5 } else { 1 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn store_captain_auth(
        &self,
        match_id: &MatchId,
        team_param: &str,
        record: &CaptainAuthRecord,
    ) -> Result<()> {
        let payload =
            serde_json::to_string(record).context("failed to encode captain auth record")?;
        self.store_captain_auth_raw(match_id, team_param, &payload)
            .await
    }

    /// Stores `payload` verbatim. Malformed payloads are kept as-is so the
    /// reader can decide how to degrade.
    pub async fn store_captain_auth_raw(
        &self,
        match_id: &MatchId,
        team_param: &str,
        payload: &str,
    ) -> Result<()> {
        let storage_key = captain_auth_key(match_id, team_param);
        sqlx::query(
            r#"
            INSERT INTO captain_auth (storage_key, match_id, team_param, payload, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(storage_key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&storage_key)
        .bind(match_id.as_str())
        .bind(team_param)
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to store captain auth under {storage_key}"))?;
        debug!(storage_key = %storage_key, "storage: captain auth stored");
        Ok(())
    }

    pub async fn load_captain_auth_raw(
        &self,
        match_id: &MatchId,
        team_param: &str,
    ) -> Result<Option<String>> {
        let row = sqlx::query("SELECT payload FROM captain_auth WHERE storage_key = ?1")
            .bind(captain_auth_key(match_id, team_param))
            .fetch_optional(&self.pool)
            .await
            .context("failed to load captain auth")?;
        row.map(|row| row.try_get::<String, _>("payload"))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn list_captain_auth_for_match(
        &self,
        match_id: &MatchId,
    ) -> Result<Vec<StoredCaptainAuth>> {
        let rows = sqlx::query(
            r#"
            SELECT storage_key, match_id, team_param, payload, updated_at
            FROM captain_auth
            WHERE match_id = ?1
            ORDER BY team_param ASC
            "#,
        )
        .bind(match_id.as_str())
        .fetch_all(&self.pool)
        .await
        .context("failed to list captain auth")?;

        rows.into_iter()
            .map(|row| -> Result<StoredCaptainAuth> {
                Ok(StoredCaptainAuth {
                    storage_key: row.try_get("storage_key")?,
                    match_id: MatchId::new(row.try_get::<String, _>("match_id")?),
                    team_param: row.try_get("team_param")?,
                    payload: row.try_get("payload")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }

    pub async fn forget_captain_auth(&self, match_id: &MatchId, team_param: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM captain_auth WHERE storage_key = ?1")
            .bind(captain_auth_key(match_id, team_param))
            .execute(&self.pool)
            .await
            .context("failed to forget captain auth")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn forget_match(&self, match_id: &MatchId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM captain_auth WHERE match_id = ?1")
            .bind(match_id.as_str())
            .execute(&self.pool)
            .await
            .context("failed to forget match credentials")?;
        Ok(result.rows_affected())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
