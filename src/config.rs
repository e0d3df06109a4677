//! Link configuration
//!
//! Defaults match the backend contract; every field can be overridden through
//! the builder methods or `TOPICLINK_*` environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::types::{LinkError, LinkResult};

/// Configuration for a [`Link`](crate::Link)
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Page origin the socket URL is derived from (`http(s)://host:port`)
    pub origin: String,
    /// Fixed endpoint path on the origin
    pub path: String,
    /// Topics the server pushes for the whole process lifetime
    pub always_on: Vec<String>,
    /// First reconnect delay
    pub reconnect_base: Duration,
    /// Upper bound on any reconnect delay
    pub reconnect_cap: Duration,
    /// Consecutive failed attempts before giving up and invalidating
    pub max_reconnect_attempts: u32,
    /// Close code meaning "authentication failed"
    pub auth_close_code: u16,
    /// Close codes at or above this value are unrecoverable
    pub fatal_close_threshold: u16,
    /// Scroll backlog size that forces an immediate flush
    pub scroll_backlog_limit: usize,
    /// Flush cadence while the UI is visible (one frame)
    pub frame_interval: Duration,
    /// Flush cadence while the UI is hidden
    pub hidden_flush_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            path: "/ws".to_string(),
            always_on: Vec::new(),
            reconnect_base: Duration::from_millis(1000),
            reconnect_cap: Duration::from_millis(30_000),
            max_reconnect_attempts: 5,
            auth_close_code: 4001,
            fatal_close_threshold: 4000,
            scroll_backlog_limit: 50,
            frame_interval: Duration::from_millis(16),
            hidden_flush_interval: Duration::from_millis(250),
        }
    }
}

impl LinkConfig {
    /// Create config for the given page origin
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Default::default()
        }
    }

    /// Load config from `TOPICLINK_*` environment variables over the defaults
    pub fn from_env() -> LinkResult<Self> {
        let mut config = Self::default();

        if let Ok(origin) = env::var("TOPICLINK_ORIGIN") {
            config.origin = origin;
        }
        if let Ok(path) = env::var("TOPICLINK_PATH") {
            config.path = path;
        }
        if let Ok(list) = env::var("TOPICLINK_ALWAYS_ON") {
            config.always_on = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(ms) = env_number::<u64>("TOPICLINK_RECONNECT_BASE_MS")? {
            config.reconnect_base = Duration::from_millis(ms);
        }
        if let Some(ms) = env_number::<u64>("TOPICLINK_RECONNECT_CAP_MS")? {
            config.reconnect_cap = Duration::from_millis(ms);
        }
        if let Some(n) = env_number("TOPICLINK_MAX_RECONNECT_ATTEMPTS")? {
            config.max_reconnect_attempts = n;
        }
        if let Some(code) = env_number("TOPICLINK_AUTH_CLOSE_CODE")? {
            config.auth_close_code = code;
        }
        if let Some(code) = env_number("TOPICLINK_FATAL_CLOSE_CODE")? {
            config.fatal_close_threshold = code;
        }

        Ok(config)
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_always_on<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.always_on = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_backoff(mut self, base: Duration, cap: Duration, max_attempts: u32) -> Self {
        self.reconnect_base = base;
        self.reconnect_cap = cap;
        self.max_reconnect_attempts = max_attempts;
        self
    }

    pub fn with_close_codes(mut self, auth: u16, fatal_threshold: u16) -> Self {
        self.auth_close_code = auth;
        self.fatal_close_threshold = fatal_threshold;
        self
    }

    pub fn with_flush_intervals(mut self, frame: Duration, hidden: Duration) -> Self {
        self.frame_interval = frame;
        self.hidden_flush_interval = hidden;
        self
    }
}

fn env_number<T: FromStr>(key: &str) -> LinkResult<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| LinkError::Config(format!("{} must be a number, got '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.reconnect_base, Duration::from_secs(1));
        assert_eq!(config.reconnect_cap, Duration::from_secs(30));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.scroll_backlog_limit, 50);
        assert_eq!(config.path, "/ws");
    }

    #[test]
    fn test_builders() {
        let config = LinkConfig::new("https://example.com")
            .with_path("/api/ws")
            .with_always_on(["status", "alerts"])
            .with_close_codes(4401, 4500);
        assert_eq!(config.origin, "https://example.com");
        assert_eq!(config.path, "/api/ws");
        assert_eq!(config.always_on, vec!["status", "alerts"]);
        assert_eq!(config.auth_close_code, 4401);
        assert_eq!(config.fatal_close_threshold, 4500);
    }

    #[test]
    fn test_env_number_rejects_garbage() {
        env::set_var("TOPICLINK_TEST_GARBAGE", "soon");
        let parsed = env_number::<u64>("TOPICLINK_TEST_GARBAGE");
        assert!(matches!(parsed, Err(LinkError::Config(_))));
        env::remove_var("TOPICLINK_TEST_GARBAGE");

        assert!(env_number::<u64>("TOPICLINK_TEST_UNSET").unwrap().is_none());
    }
}
