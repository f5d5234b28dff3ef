use std::{env, fs, path::Path, time::Duration};

use client_core::{RetryPolicy, SessionOptions};

pub const CONFIG_FILE: &str = "veto.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub database_url: String,
    pub poll_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub missed_heartbeats: u32,
    pub request_timeout_ms: u64,
    pub retry_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            database_url: "sqlite://./data/veto.db".into(),
            poll_interval_ms: 2000,
            heartbeat_interval_ms: 5000,
            missed_heartbeats: 3,
            request_timeout_ms: 10_000,
            retry_attempts: 3,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            missed_heartbeats: self.missed_heartbeats,
            retry: RetryPolicy {
                max_attempts: self.retry_attempts.max(1),
                ..RetryPolicy::default()
            },
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(CONFIG_FILE), |key| env::var(key).ok())
}

/// Defaults, then the config file, then environment. Unparseable or zero values are skipped.
pub fn load_settings_from(
    config_path: &Path,
    env_var: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(config_path) {
        if let Ok(file_cfg) = raw.parse::<toml::Table>() {
            let file_value = |key: &str| match file_cfg.get(key)? {
                toml::Value::String(v) => Some(v.clone()),
                toml::Value::Integer(v) => Some(v.to_string()),
                _ => None,
            };
            apply_values(&mut settings, file_value);
        }
    }

    if let Some(v) = env_var("VETO_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env_var("VETO_DATABASE_URL") {
        settings.database_url = v;
    }
    apply_values(&mut settings, |key| {
        env_var(&format!("APP__{}", key.to_ascii_uppercase()))
    });

    settings
}

fn apply_values(settings: &mut Settings, value: impl Fn(&str) -> Option<String>) {
    if let Some(v) = value("server_url") {
        settings.server_url = v;
    }
    if let Some(v) = value("database_url") {
        settings.database_url = v;
    }
    if let Some(parsed) = value("poll_interval_ms").and_then(|v| positive(&v)) {
        settings.poll_interval_ms = parsed;
    }
    if let Some(parsed) = value("heartbeat_interval_ms").and_then(|v| positive(&v)) {
        settings.heartbeat_interval_ms = parsed;
    }
    if let Some(parsed) = value("missed_heartbeats").and_then(|v| positive(&v)) {
        settings.missed_heartbeats = parsed;
    }
    if let Some(parsed) = value("request_timeout_ms").and_then(|v| positive(&v)) {
        settings.request_timeout_ms = parsed;
    }
    if let Some(parsed) = value("retry_attempts").and_then(|v| v.parse().ok()) {
        settings.retry_attempts = parsed;
    }
}

/// Intervals and counts of zero are meaningless, so they are skipped like unparseable text.
fn positive<T>(raw: &str) -> Option<T>
where
    T: std::str::FromStr + Default + PartialEq,
{
    raw.trim().parse().ok().filter(|parsed| *parsed != T::default())
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
