use std::time::Duration;

/// Process-wide tunable constants, assembled once at startup from
/// environment variables with the documented defaults. No file or remote
/// config watching: this is a one-shot snapshot, matching the framework's
/// "application bootstrap and configuration loading... out of scope"
/// boundary (the core only needs the resulting values, not a reload path).
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub bind_addr: String,
    pub send_channel_capacity: usize,
    pub request_queue_capacity: usize,
    pub pubsub_queue_capacity: usize,
    pub recent_log_capacity: usize,
    pub rate_limiter_rate_per_sec: f64,
    pub rate_limiter_burst: u32,
    pub heartbeat_interval: Duration,
    pub janitor_interval: Duration,
    pub cleanup_ttl: Duration,
    pub i18n_data_path: String,
    pub dev_mode: bool,
    pub default_language: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3322".to_owned(),
            send_channel_capacity: 32,
            request_queue_capacity: 128,
            pubsub_queue_capacity: 128,
            recent_log_capacity: 100,
            rate_limiter_rate_per_sec: 50.0,
            rate_limiter_burst: 100,
            heartbeat_interval: Duration::from_secs(5),
            janitor_interval: Duration::from_secs(30),
            cleanup_ttl: Duration::from_secs(5 * 60),
            i18n_data_path: "./data".to_owned(),
            dev_mode: false,
            default_language: "zh".to_owned(),
        }
    }
}

impl HubConfig {
    /// Build from environment variables, falling back to defaults for
    /// anything unset, mirroring the `std::env::var(...).unwrap_or_else(...)`
    /// style used at the teacher's bootstrap edge.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: env_or("HUB_BIND_ADDR", defaults.bind_addr),
            send_channel_capacity: env_parsed_or(
                "HUB_SEND_CHANNEL_CAPACITY",
                defaults.send_channel_capacity,
            ),
            request_queue_capacity: env_parsed_or(
                "HUB_REQUEST_QUEUE_CAPACITY",
                defaults.request_queue_capacity,
            ),
            pubsub_queue_capacity: env_parsed_or(
                "HUB_PUBSUB_QUEUE_CAPACITY",
                defaults.pubsub_queue_capacity,
            ),
            recent_log_capacity: env_parsed_or(
                "HUB_RECENT_LOG_CAPACITY",
                defaults.recent_log_capacity,
            ),
            rate_limiter_rate_per_sec: env_parsed_or(
                "HUB_RATE_LIMITER_RATE",
                defaults.rate_limiter_rate_per_sec,
            ),
            rate_limiter_burst: env_parsed_or(
                "HUB_RATE_LIMITER_BURST",
                defaults.rate_limiter_burst,
            ),
            heartbeat_interval: Duration::from_secs(env_parsed_or(
                "HUB_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval.as_secs(),
            )),
            janitor_interval: Duration::from_secs(env_parsed_or(
                "HUB_JANITOR_INTERVAL_SECS",
                defaults.janitor_interval.as_secs(),
            )),
            cleanup_ttl: Duration::from_secs(env_parsed_or(
                "HUB_CLEANUP_TTL_SECS",
                defaults.cleanup_ttl.as_secs(),
            )),
            i18n_data_path: env_or("HUB_DATA_PATH", defaults.i18n_data_path),
            dev_mode: env_parsed_or("HUB_DEV_MODE", defaults.dev_mode),
            default_language: env_or("HUB_DEFAULT_LANGUAGE", defaults.default_language),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
