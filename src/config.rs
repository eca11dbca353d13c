use crate::constants::{
    COINMARKETCAP_API_URL, DEFAULT_BIND, DEFAULT_LISTINGS_LIMIT, DEFAULT_PORT,
    DEFAULT_QUOTE_CURRENCY, FETCH_TIMEOUT_SECS, MAX_LISTINGS_LIMIT, REFRESH_INTERVAL_SECS,
    STALE_THRESHOLD_SECS,
};
use crate::error::ConfigError;
use std::env;
use std::time::Duration;

/// Service configuration derived from environment variables.
///
/// Loaded once at startup; there is no hot reload.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    // ── Upstream ───────────────────────────────────────────────────
    pub api_url: String,
    pub api_key: String,
    pub listings_limit: u32,
    pub quote_currency: String,

    // ── Scheduling ─────────────────────────────────────────────────
    pub refresh_interval: Duration,
    /// Upper bound for one upstream call; always shorter than `refresh_interval`.
    pub fetch_timeout: Duration,
    pub stale_threshold: Duration,

    // ── Durable mirror ─────────────────────────────────────────────
    /// SQLite URL. `None` ⇒ in-memory only.
    pub database_url: Option<String>,

    // ── Front door ─────────────────────────────────────────────────
    pub bind: String,
    pub port: u16,
    pub log_json: bool,
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_str(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env_opt(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::invalid(name, format!("cannot parse {:?}", raw))),
        None => Ok(default),
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    env_opt(name)
        .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"))
        .unwrap_or(default)
}

impl ServiceConfig {
    /// Builds a config with defaults for everything but the API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: COINMARKETCAP_API_URL.to_string(),
            api_key: api_key.into(),
            listings_limit: DEFAULT_LISTINGS_LIMIT,
            quote_currency: DEFAULT_QUOTE_CURRENCY.to_string(),
            refresh_interval: Duration::from_secs(REFRESH_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
            stale_threshold: Duration::from_secs(STALE_THRESHOLD_SECS),
            database_url: None,
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            log_json: false,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env_opt("CMC_API_KEY").ok_or(ConfigError::Missing("CMC_API_KEY"))?;

        let config = Self {
            api_url: env_str("CMC_API_URL", COINMARKETCAP_API_URL),
            api_key,
            listings_limit: env_parse("MARKET_LISTINGS_LIMIT", DEFAULT_LISTINGS_LIMIT)?,
            quote_currency: env_str("MARKET_QUOTE_CURRENCY", DEFAULT_QUOTE_CURRENCY)
                .to_uppercase(),
            refresh_interval: Duration::from_secs(env_parse(
                "MARKET_REFRESH_INTERVAL_SECS",
                REFRESH_INTERVAL_SECS,
            )?),
            fetch_timeout: Duration::from_secs(env_parse(
                "MARKET_FETCH_TIMEOUT_SECS",
                FETCH_TIMEOUT_SECS,
            )?),
            stale_threshold: Duration::from_secs(env_parse(
                "MARKET_STALE_THRESHOLD_SECS",
                STALE_THRESHOLD_SECS,
            )?),
            database_url: env_opt("DATABASE_URL"),
            bind: env_str("MARKET_BIND", DEFAULT_BIND),
            port: env_parse("MARKET_PORT", DEFAULT_PORT)?,
            log_json: env_str("LOG_FORMAT", "pretty").eq_ignore_ascii_case("json")
                || env_bool("LOG_JSON", false),
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("CMC_API_KEY"));
        }
        if self.listings_limit == 0 || self.listings_limit > MAX_LISTINGS_LIMIT {
            return Err(ConfigError::invalid(
                "MARKET_LISTINGS_LIMIT",
                format!("must be within 1..={}", MAX_LISTINGS_LIMIT),
            ));
        }
        if self.quote_currency.trim().is_empty() {
            return Err(ConfigError::Missing("MARKET_QUOTE_CURRENCY"));
        }
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::invalid(
                "MARKET_REFRESH_INTERVAL_SECS",
                "must be greater than zero",
            ));
        }
        if self.fetch_timeout.is_zero() || self.fetch_timeout >= self.refresh_interval {
            return Err(ConfigError::invalid(
                "MARKET_FETCH_TIMEOUT_SECS",
                "must be non-zero and shorter than the refresh interval",
            ));
        }
        Ok(())
    }

    /// Socket address string for the front door
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
