use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{
    domain::{ActionKind, MapId, MatchId, TeamIndex},
    protocol::{CreateMatchResponse, MatchSnapshot},
};
use tracing::{debug, warn};

use crate::error::TransportError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Match server operations consumed by the client core.
#[async_trait]
pub trait MatchApi: Send + Sync {
    async fn create_match(
        &self,
        team_a: &str,
        team_b: &str,
        slots_per_team: u32,
    ) -> Result<MatchId, TransportError>;

    async fn get_state(&self, match_id: &MatchId) -> Result<MatchSnapshot, TransportError>;

    async fn apply_action(
        &self,
        match_id: &MatchId,
        team_index: TeamIndex,
        kind: ActionKind,
        map_id: MapId,
        credential: Option<&str>,
    ) -> Result<MatchSnapshot, TransportError>;
}

pub struct HttpMatchApi {
    http: Client,
    server_url: String,
}

impl HttpMatchApi {
    pub fn new(server_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        if !(server_url.starts_with("http://") || server_url.starts_with("https://")) {
            return Err(TransportError::InvalidUrl(format!(
                "server_url must start with http:// or https://, got {server_url}"
            )));
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, server_url })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/match/{path}", self.server_url)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, TransportError> {
        let res = request.send().await?;
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(TransportError::rejected(status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|err| TransportError::Decode(err.to_string()))
    }
}

#[async_trait]
impl MatchApi for HttpMatchApi {
    async fn create_match(
        &self,
        team_a: &str,
        team_b: &str,
        slots_per_team: u32,
    ) -> Result<MatchId, TransportError> {
        let slots = slots_per_team.to_string();
        let response: CreateMatchResponse = self
            .send_json(self.http.get(self.endpoint("create")).query(&[
                ("teamA", team_a),
                ("teamB", team_b),
                ("slots", slots.as_str()),
            ]))
            .await?;
        Ok(response.match_id)
    }

    async fn get_state(&self, match_id: &MatchId) -> Result<MatchSnapshot, TransportError> {
        self.send_json(
            self.http
                .get(self.endpoint("state"))
                .query(&[("id", match_id.as_str())]),
        )
        .await
    }

    async fn apply_action(
        &self,
        match_id: &MatchId,
        team_index: TeamIndex,
        kind: ActionKind,
        map_id: MapId,
        credential: Option<&str>,
    ) -> Result<MatchSnapshot, TransportError> {
        let team = team_index.to_string();
        let map = map_id.to_string();
        let mut request = self.http.get(self.endpoint("action")).query(&[
            ("id", match_id.as_str()),
            ("team", team.as_str()),
            ("action", kind.as_str()),
            ("map", map.as_str()),
        ]);
        if let Some(token) = credential {
            request = request.bearer_auth(token);
        }
        self.send_json(request).await
    }
}

/// Bounded exponential backoff for idempotent reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retrying after the given 1-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

pub async fn get_state_with_retry(
    api: &dyn MatchApi,
    match_id: &MatchId,
    policy: RetryPolicy,
) -> Result<MatchSnapshot, TransportError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match api.get_state(match_id).await {
            Ok(snapshot) => {
                debug!(match_id = %match_id, attempt, "api: state fetched");
                return Ok(snapshot);
            }
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    match_id = %match_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "api: transient state fetch failure, retrying: {err}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
