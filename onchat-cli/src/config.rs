//! Persistent configuration for the onchat CLI.
//!
//! Config file lives at `~/.config/onchat/cli.toml`. The resumption token is
//! not stored here; the SDK keeps it in `session.toml` next to it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use onchat_sdk::config::DEFAULT_ENDPOINT;
use onchat_sdk::{ClientConfig, FileSessionStore, QueuePolicy, ReconnectPolicy};
use serde::{Deserialize, Serialize};

/// User configuration (persisted in cli.toml).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// WebSocket endpoint. Default: the public onchat backend.
    pub endpoint: Option<String>,
    /// Username to log in as when a password is supplied.
    pub user: Option<String>,
    /// Automatic reconnect attempts after a drop.
    pub max_reconnect_attempts: Option<u32>,
    /// Pause before each reconnect attempt, in milliseconds.
    pub reconnect_delay_ms: Option<u64>,
    /// Grow the pause by this factor per attempt (1.0 = fixed).
    pub backoff_factor: Option<f64>,
    /// Randomize reconnect pauses a little.
    pub jitter: Option<bool>,
    /// Envelopes held while offline before the oldest is dropped.
    pub queue_capacity: Option<usize>,
    /// Drop queued envelopes older than this many seconds.
    pub queue_max_age_secs: Option<u64>,
    /// How long lookups like /exists wait for an answer.
    pub request_timeout_secs: Option<u64>,
    /// Give up on a connection attempt after this many seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Where the session token is kept.
    pub session_file: Option<PathBuf>,
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("onchat")
}

pub fn config_path() -> PathBuf {
    config_dir().join("cli.toml")
}

impl Config {
    /// Read `path`; a missing or broken file yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => return c,
                    Err(e) => tracing::warn!("bad config file {}: {e}", path.display()),
                },
                Err(e) => tracing::warn!("can't read {}: {e}", path.display()),
            }
        }
        Self::default()
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("can't create {}", dir.display()))?;
        }
        let text = toml::to_string_pretty(self).context("can't serialize config")?;
        std::fs::write(path, text).with_context(|| format!("can't write {}", path.display()))?;
        Ok(())
    }
}

/// Effective settings after merging CLI args > config file > defaults.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub user: Option<String>,
    pub client: ClientConfig,
    pub session_file: PathBuf,
}

impl Resolved {
    pub fn merge(cli: &super::Cli, config: &Config) -> Self {
        let endpoint = cli
            .endpoint
            .clone()
            .or_else(|| config.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let mut reconnect = ReconnectPolicy::default();
        if let Some(n) = cli.max_reconnect_attempts.or(config.max_reconnect_attempts) {
            reconnect = reconnect.max_attempts(n);
        }
        if let Some(ms) = cli.reconnect_delay_ms.or(config.reconnect_delay_ms) {
            reconnect = reconnect.delay(Duration::from_millis(ms));
        }
        if let Some(factor) = config.backoff_factor.filter(|f| *f > 1.0) {
            let cap = reconnect.max_delay;
            reconnect = reconnect.exponential(factor, cap);
        }
        reconnect = reconnect.jitter(config.jitter.unwrap_or(false));

        let mut queue = QueuePolicy::default();
        if let Some(cap) = cli.queue_capacity.or(config.queue_capacity) {
            queue = queue.capacity(cap);
        }
        if let Some(secs) = config.queue_max_age_secs {
            queue = queue.max_age(Duration::from_secs(secs));
        }

        let mut client = ClientConfig::new(endpoint).reconnect(reconnect).queue(queue);
        if let Some(secs) = config.request_timeout_secs {
            client = client.request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = config.connect_timeout_secs.filter(|s| *s > 0) {
            client = client.connect_timeout(Duration::from_secs(secs));
        }

        let session_file = cli
            .session_file
            .clone()
            .or_else(|| config.session_file.clone())
            .unwrap_or_else(FileSessionStore::default_path);

        Self {
            user: cli.user.clone().or_else(|| config.user.clone()),
            client,
            session_file,
        }
    }

    /// The merged settings as a config file, for `--save-config`.
    pub fn to_config(&self) -> Config {
        let queue_max_age_secs = self.client.queue.max_age.map(|d| d.as_secs());
        Config {
            endpoint: Some(self.client.endpoint.clone()),
            user: self.user.clone(),
            max_reconnect_attempts: Some(self.client.reconnect.max_attempts),
            reconnect_delay_ms: Some(self.client.reconnect.delay.as_millis() as u64),
            backoff_factor: Some(self.client.reconnect.backoff_factor),
            jitter: Some(self.client.reconnect.jitter),
            queue_capacity: Some(self.client.queue.capacity),
            queue_max_age_secs,
            request_timeout_secs: Some(self.client.request_timeout.as_secs()),
            connect_timeout_secs: Some(self.client.connect_timeout.as_secs()),
            session_file: Some(self.session_file.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;
    use clap::Parser;

    #[test]
    fn cli_beats_file_beats_defaults() {
        let cli = Cli::parse_from(["onchat", "--endpoint", "ws://localhost:9000/chat", "--queue-capacity", "8"]);
        let file = Config {
            endpoint: Some("ws://file.example/chat".into()),
            user: Some("alice".into()),
            max_reconnect_attempts: Some(2),
            queue_capacity: Some(64),
            ..Config::default()
        };
        let r = Resolved::merge(&cli, &file);
        assert_eq!(r.client.endpoint, "ws://localhost:9000/chat");
        assert_eq!(r.client.queue.capacity, 8);
        assert_eq!(r.client.reconnect.max_attempts, 2);
        assert_eq!(r.client.reconnect.delay, Duration::from_secs(3));
        assert_eq!(r.user.as_deref(), Some("alice"));
    }

    #[test]
    fn empty_everything_gives_sdk_defaults() {
        let cli = Cli::parse_from(["onchat"]);
        let r = Resolved::merge(&cli, &Config::default());
        assert_eq!(r.client.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(r.client.reconnect.max_attempts, 5);
        assert_eq!(r.client.connect_timeout, Duration::from_secs(5));
        assert_eq!(r.session_file, FileSessionStore::default_path());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onchat").join("cli.toml");
        let cli = Cli::parse_from(["onchat", "--reconnect-delay-ms", "500"]);
        let saved = Resolved::merge(&cli, &Config::default()).to_config();
        saved.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded, saved);
        assert_eq!(loaded.reconnect_delay_ms, Some(500));
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli.toml");
        std::fs::write(&path, "endpoint = ").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
        assert_eq!(Config::load_from(&dir.path().join("missing.toml")), Config::default());
    }
}
