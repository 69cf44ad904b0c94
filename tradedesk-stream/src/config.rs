//! Client configuration and endpoint resolution

use std::time::Duration;

use tracing::info;
use url::Url;

use tradedesk_core::{ReconnectPolicy, StreamError, StreamResult, Subscription};

/// Origin used for same-origin endpoint derivation when none is configured
pub const DEFAULT_ORIGIN: &str = "http://localhost:8000";

/// Path of the stream endpoint relative to an API base or origin
const STREAM_PATH: &str = "ws";

/// Configuration for [`StreamClient`](crate::StreamClient)
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Resolved websocket URL
    pub endpoint: String,
    pub policy: ReconnectPolicy,
    /// Recorded before the first connect and replayed like any other
    pub initial_subscriptions: Vec<Subscription>,
    /// Client keepalive ping interval (websocket transport only)
    pub ping_interval: Option<Duration>,
    /// Reject price frames with an older timestamp than the stored quote
    pub monotonic_prices: bool,
    pub command_buffer: usize,
    pub event_buffer: usize,
}

impl StreamConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            policy: ReconnectPolicy::default(),
            initial_subscriptions: Vec::new(),
            ping_interval: None,
            monotonic_prices: false,
            command_buffer: 100,
            event_buffer: 1024,
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_subscription(mut self, subscription: Subscription) -> Self {
        self.initial_subscriptions.push(subscription);
        self
    }

    pub fn with_ping_interval(mut self, ping_interval: Duration) -> Self {
        self.ping_interval = Some(ping_interval);
        self
    }

    pub fn with_monotonic_prices(mut self, monotonic: bool) -> Self {
        self.monotonic_prices = monotonic;
        self
    }

    /// Build from `STREAM_*` environment variables
    pub fn from_env() -> StreamResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (environment, file, test map)
    pub fn from_lookup<F>(lookup: F) -> StreamResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = resolve_endpoint(
            lookup("STREAM_WS_URL").as_deref(),
            lookup("STREAM_API_BASE").as_deref(),
            lookup("STREAM_ORIGIN").as_deref().unwrap_or(DEFAULT_ORIGIN),
        )?;
        info!("[Stream] Using endpoint {}", endpoint);

        let defaults = ReconnectPolicy::default();
        let max_attempts = parse_var(&lookup, "STREAM_RECONNECT_MAX_ATTEMPTS")?
            .unwrap_or(defaults.max_attempts());
        let interval_ms = parse_var(&lookup, "STREAM_RECONNECT_INTERVAL_MS")?
            .unwrap_or(defaults.interval().as_millis() as u64);
        let policy = ReconnectPolicy::from_millis(max_attempts, interval_ms)?;

        let mut config = Self::new(endpoint).with_policy(policy);

        if let Some(secs) = parse_var::<u64, _>(&lookup, "STREAM_PING_INTERVAL_SECS")? {
            if secs > 0 {
                config.ping_interval = Some(Duration::from_secs(secs));
            }
        }

        if let Some(flag) = lookup("STREAM_MONOTONIC_PRICES") {
            config.monotonic_prices = parse_flag(&flag).ok_or_else(|| {
                StreamError::config(format!("STREAM_MONOTONIC_PRICES: invalid flag '{}'", flag))
            })?;
        }

        if let Some(channels) = lookup("STREAM_CHANNELS") {
            config.initial_subscriptions = parse_channels(&channels);
        }

        Ok(config)
    }
}

/// Pick the stream endpoint
///
/// Priority: explicit override, then derived from the API base
/// (`http` -> `ws`, `https` -> `wss`, path `/ws` appended), then the same
/// derivation from `origin`.
pub fn resolve_endpoint(
    override_url: Option<&str>,
    api_base: Option<&str>,
    origin: &str,
) -> StreamResult<String> {
    if let Some(url) = non_empty(override_url) {
        let parsed = Url::parse(url)
            .map_err(|e| StreamError::config(format!("invalid stream URL '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(StreamError::config(format!(
                "stream URL must use ws:// or wss://, got '{}'",
                url
            )));
        }
        return Ok(parsed.to_string());
    }

    match non_empty(api_base) {
        Some(base) => derive_ws_url(base),
        None => derive_ws_url(origin),
    }
}

fn derive_ws_url(base: &str) -> StreamResult<String> {
    let mut url = Url::parse(base)
        .map_err(|e| StreamError::config(format!("invalid base URL '{}': {}", base, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(StreamError::config(format!(
                "cannot derive a stream URL from scheme '{}'",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| StreamError::config(format!("cannot switch '{}' to {}", base, scheme)))?;

    let path = format!("{}/{}", url.path().trim_end_matches('/'), STREAM_PATH);
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);

    Ok(url.to_string())
}

/// Parse `prices:EUR_USD,US30;positions`
pub fn parse_channels(spec: &str) -> Vec<Subscription> {
    spec.split(';').filter_map(Subscription::parse).collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> StreamResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| StreamError::config(format!("{}: {}", key, e))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tradedesk_core::Channel;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_override_wins() {
        let url = resolve_endpoint(
            Some("wss://stream.example.com/live"),
            Some("https://api.example.com"),
            DEFAULT_ORIGIN,
        )
        .unwrap();
        assert_eq!(url, "wss://stream.example.com/live");
    }

    #[test]
    fn test_override_must_be_websocket() {
        assert!(resolve_endpoint(Some("https://stream.example.com"), None, DEFAULT_ORIGIN).is_err());
        assert!(resolve_endpoint(Some("not a url"), None, DEFAULT_ORIGIN).is_err());
    }

    #[test]
    fn test_derived_from_api_base() {
        let url = resolve_endpoint(None, Some("https://api.example.com/api/"), DEFAULT_ORIGIN).unwrap();
        assert_eq!(url, "wss://api.example.com/api/ws");

        let url = resolve_endpoint(Some("  "), Some("http://10.0.0.5:9000"), DEFAULT_ORIGIN).unwrap();
        assert_eq!(url, "ws://10.0.0.5:9000/ws");
    }

    #[test]
    fn test_same_origin_fallback() {
        let url = resolve_endpoint(None, None, DEFAULT_ORIGIN).unwrap();
        assert_eq!(url, "ws://localhost:8000/ws");

        assert!(resolve_endpoint(None, None, "ftp://files.example.com").is_err());
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = StreamConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.endpoint, "ws://localhost:8000/ws");
        assert_eq!(config.policy, ReconnectPolicy::default());
        assert!(config.initial_subscriptions.is_empty());
        assert!(config.ping_interval.is_none());
        assert!(!config.monotonic_prices);
    }

    #[test]
    fn test_from_lookup_full() {
        let config = StreamConfig::from_lookup(lookup(&[
            ("STREAM_WS_URL", "ws://bridge:8765/stream"),
            ("STREAM_RECONNECT_MAX_ATTEMPTS", "3"),
            ("STREAM_RECONNECT_INTERVAL_MS", "500"),
            ("STREAM_PING_INTERVAL_SECS", "15"),
            ("STREAM_MONOTONIC_PRICES", "yes"),
            ("STREAM_CHANNELS", "prices:EUR_USD,US30; positions"),
        ]))
        .unwrap();

        assert_eq!(config.endpoint, "ws://bridge:8765/stream");
        assert_eq!(config.policy.max_attempts(), 3);
        assert_eq!(config.policy.interval(), Duration::from_millis(500));
        assert_eq!(config.ping_interval, Some(Duration::from_secs(15)));
        assert!(config.monotonic_prices);
        assert_eq!(config.initial_subscriptions.len(), 2);
        assert_eq!(config.initial_subscriptions[1].channel, Channel::new("positions"));
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        assert!(StreamConfig::from_lookup(lookup(&[("STREAM_RECONNECT_INTERVAL_MS", "0")])).is_err());
        assert!(StreamConfig::from_lookup(lookup(&[("STREAM_RECONNECT_MAX_ATTEMPTS", "-1")])).is_err());
        assert!(StreamConfig::from_lookup(lookup(&[("STREAM_MONOTONIC_PRICES", "maybe")])).is_err());
    }
}
