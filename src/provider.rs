//! Provider abstraction for fetching listings from external APIs

use crate::{error::FetchError, types::MarketRecord};
use async_trait::async_trait;

/// Trait for market listings providers
///
/// Implementations issue one outbound request per call and return the
/// normalized record set. They never touch the snapshot store.
#[async_trait]
pub trait ListingsProvider: Send + Sync {
    /// Fetches the top `limit` assets quoted in `quote_currency`
    ///
    /// # Arguments
    /// * `limit` - Number of top-ranked assets to request
    /// * `quote_currency` - Currency for price-like fields (e.g. "USD")
    ///
    /// # Returns
    /// Records in upstream rank order, or an error if any part of the fetch fails.
    /// A failed fetch never yields a partial record set.
    async fn fetch_latest(
        &self,
        limit: u32,
        quote_currency: &str,
    ) -> Result<Vec<MarketRecord>, FetchError>;

    /// Returns the name of this provider
    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Mock provider for testing
    pub struct MockProvider {
        response: Arc<Mutex<Result<Vec<MarketRecord>, FetchError>>>,
        delay: Arc<Mutex<Option<Duration>>>,
        call_count: Arc<Mutex<usize>>,
    }

    impl Default for MockProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockProvider {
        pub fn new() -> Self {
            Self {
                response: Arc::new(Mutex::new(Ok(Vec::new()))),
                delay: Arc::new(Mutex::new(None)),
                call_count: Arc::new(Mutex::new(0)),
            }
        }

        pub fn with_records(records: Vec<MarketRecord>) -> Self {
            let provider = Self::new();
            provider.set_records(records);
            provider
        }

        pub fn set_records(&self, records: Vec<MarketRecord>) {
            *self.response.lock().unwrap() = Ok(records);
        }

        pub fn set_error(&self, error: FetchError) {
            *self.response.lock().unwrap() = Err(error);
        }

        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap() = Some(delay);
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    /// Builds a record whose numeric fields all derive from `price`
    pub fn record(symbol: &str, price: f64) -> MarketRecord {
        MarketRecord {
            name: format!("{} coin", symbol),
            symbol: symbol.to_string(),
            price,
            market_cap: price * 1_000_000.0,
            volume_24h: price * 1_000.0,
            percent_change_24h: 0.5,
        }
    }

    #[async_trait]
    impl ListingsProvider for MockProvider {
        async fn fetch_latest(
            &self,
            _limit: u32,
            _quote_currency: &str,
        ) -> Result<Vec<MarketRecord>, FetchError> {
            *self.call_count.lock().unwrap() += 1;
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.response.lock().unwrap().clone()
        }

        fn provider_name(&self) -> &'static str {
            "mock"
        }
    }
}
