//! Defaults for the market snapshot service
//!
//! Every value here can be overridden through the environment, see
//! [`crate::config::ServiceConfig::from_env`].

/// How often the scheduler refreshes the snapshot (in seconds)
pub const REFRESH_INTERVAL_SECS: u64 = 300;

/// HTTP request timeout when fetching listings (in seconds)
///
/// Must stay below the refresh interval so a stuck upstream call cannot
/// overlap the next tick.
pub const FETCH_TIMEOUT_SECS: u64 = 10;

/// Age after which a snapshot is reported as stale by the health check (in seconds)
pub const STALE_THRESHOLD_SECS: u64 = 900;

/// Number of top-ranked assets requested per refresh
pub const DEFAULT_LISTINGS_LIMIT: u32 = 50;

/// Upper bound accepted by the listings endpoint for `limit`
pub const MAX_LISTINGS_LIMIT: u32 = 5000;

/// Quote currency for price-like fields
pub const DEFAULT_QUOTE_CURRENCY: &str = "USD";

/// CoinMarketCap API base URL
pub const COINMARKETCAP_API_URL: &str = "https://pro-api.coinmarketcap.com";

/// CoinMarketCap endpoint for the latest listings
pub const COINMARKETCAP_LISTINGS_ENDPOINT: &str = "/v1/cryptocurrency/listings/latest";

/// Header carrying the CoinMarketCap API key
pub const COINMARKETCAP_API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";

/// Default bind address for the HTTP front door
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Default port for the HTTP front door
pub const DEFAULT_PORT: u16 = 5000;

/// User agent for HTTP requests
pub const USER_AGENT: &str = "market-snapshot/0.1.0";
