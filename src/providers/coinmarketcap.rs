//! CoinMarketCap listings provider implementation

use crate::{
    constants::{COINMARKETCAP_API_KEY_HEADER, COINMARKETCAP_LISTINGS_ENDPOINT, USER_AGENT},
    error::FetchError,
    provider::ListingsProvider,
    types::MarketRecord,
};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// CoinMarketCap API response for listings/latest
#[derive(Debug, Deserialize)]
struct ListingsResponse {
    data: Vec<ListingEntry>,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    name: Option<String>,
    symbol: Option<String>,
    quote: Option<HashMap<String, QuoteEntry>>,
}

#[derive(Debug, Deserialize)]
struct QuoteEntry {
    price: Option<f64>,
    market_cap: Option<f64>,
    volume_24h: Option<f64>,
    percent_change_24h: Option<f64>,
}

/// CoinMarketCap listings provider
pub struct CoinMarketCapProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl CoinMarketCapProvider {
    /// Creates a new CoinMarketCap provider
    ///
    /// `timeout` bounds the whole request, including reading the body.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::unreachable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn listings_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            COINMARKETCAP_LISTINGS_ENDPOINT
        )
    }
}

/// Parses a listings/latest body into records quoted in `quote_currency`
///
/// Either every entry parses or the whole body is rejected.
pub fn parse_listings(body: &str, quote_currency: &str) -> Result<Vec<MarketRecord>, FetchError> {
    let response: ListingsResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::malformed(format!("failed to parse listings body: {}", e)))?;

    response
        .data
        .into_iter()
        .enumerate()
        .map(|(index, entry)| parse_entry(index, entry, quote_currency))
        .collect()
}

fn parse_entry(
    index: usize,
    entry: ListingEntry,
    quote_currency: &str,
) -> Result<MarketRecord, FetchError> {
    let missing =
        |field: &str| FetchError::malformed(format!("entry {}: missing {}", index, field));

    let name = entry
        .name
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| missing("name"))?;
    let symbol = entry
        .symbol
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| missing("symbol"))?;

    let mut quotes = entry.quote.ok_or_else(|| missing("quote"))?;
    let quote = quotes
        .remove(quote_currency)
        .ok_or_else(|| missing(&format!("quote.{}", quote_currency)))?;

    let field = |value: Option<f64>, key: &str, signed: bool| -> Result<f64, FetchError> {
        let path = format!("quote.{}.{}", quote_currency, key);
        let value = value.ok_or_else(|| missing(&path))?;
        if !value.is_finite() || (!signed && value < 0.0) {
            return Err(FetchError::malformed(format!(
                "entry {} ({}): invalid {} = {}",
                index, symbol, path, value
            )));
        }
        Ok(value)
    };

    let price = field(quote.price, "price", false)?;
    let market_cap = field(quote.market_cap, "market_cap", false)?;
    let volume_24h = field(quote.volume_24h, "volume_24h", false)?;
    let percent_change_24h = field(quote.percent_change_24h, "percent_change_24h", true)?;

    Ok(MarketRecord {
        name,
        symbol,
        price,
        market_cap,
        volume_24h,
        percent_change_24h,
    })
}

#[async_trait]
impl ListingsProvider for CoinMarketCapProvider {
    async fn fetch_latest(
        &self,
        limit: u32,
        quote_currency: &str,
    ) -> Result<Vec<MarketRecord>, FetchError> {
        let url = self.listings_url();
        tracing::debug!(
            url = %url,
            limit,
            convert = quote_currency,
            "Fetching listings from CoinMarketCap"
        );

        let response = self
            .client
            .get(&url)
            .header(COINMARKETCAP_API_KEY_HEADER, &self.api_key)
            .header(header::ACCEPT, "application/json")
            .query(&[
                ("start", "1".to_string()),
                ("limit", limit.to_string()),
                ("convert", quote_currency.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::rejected(status.as_u16(), body));
        }

        let body = response.text().await?;
        let records = parse_listings(&body, quote_currency)?;

        tracing::debug!(
            count = records.len(),
            "Successfully fetched listings from CoinMarketCap"
        );

        Ok(records)
    }

    fn provider_name(&self) -> &'static str {
        "coinmarketcap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bitcoin_entry() -> serde_json::Value {
        json!({
            "id": 1,
            "name": "Bitcoin",
            "symbol": "BTC",
            "cmc_rank": 1,
            "quote": {
                "USD": {
                    "price": 50000,
                    "market_cap": 1e12,
                    "volume_24h": 2e10,
                    "percent_change_24h": 1.5
                }
            }
        })
    }

    #[test]
    fn test_field_mapping() {
        let body = json!({ "status": {}, "data": [bitcoin_entry()] }).to_string();
        let records = parse_listings(&body, "USD").unwrap();

        assert_eq!(
            records,
            vec![MarketRecord {
                name: "Bitcoin".to_string(),
                symbol: "BTC".to_string(),
                price: 50000.0,
                market_cap: 1e12,
                volume_24h: 2e10,
                percent_change_24h: 1.5,
            }]
        );
    }

    #[test]
    fn test_entry_missing_price_rejects_whole_body() {
        let broken = json!({
            "name": "Ethereum",
            "symbol": "ETH",
            "quote": { "USD": {
                "market_cap": 4e11, "volume_24h": 1e10, "percent_change_24h": -2.0
            } }
        });
        let body = json!({ "data": [bitcoin_entry(), broken] }).to_string();

        let err = parse_listings(&body, "USD").unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
        assert!(err.to_string().contains("quote.USD.price"));
    }

    #[test]
    fn test_missing_requested_currency_is_malformed() {
        let body = json!({ "data": [bitcoin_entry()] }).to_string();
        let err = parse_listings(&body, "EUR").unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_null_field_is_malformed() {
        let mut entry = bitcoin_entry();
        entry["quote"]["USD"]["market_cap"] = serde_json::Value::Null;
        let body = json!({ "data": [entry] }).to_string();

        assert!(matches!(
            parse_listings(&body, "USD"),
            Err(FetchError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_empty_symbol_is_malformed() {
        let mut entry = bitcoin_entry();
        entry["symbol"] = json!("");
        let body = json!({ "data": [entry] }).to_string();

        assert!(parse_listings(&body, "USD").is_err());
    }

    #[test]
    fn test_negative_price_is_malformed_but_negative_change_is_not() {
        let mut entry = bitcoin_entry();
        entry["quote"]["USD"]["percent_change_24h"] = json!(-12.25);
        let body = json!({ "data": [entry.clone()] }).to_string();
        assert_eq!(parse_listings(&body, "USD").unwrap()[0].percent_change_24h, -12.25);

        entry["quote"]["USD"]["price"] = json!(-1.0);
        let body = json!({ "data": [entry] }).to_string();
        assert!(parse_listings(&body, "USD").is_err());
    }

    #[test]
    fn test_missing_data_is_malformed() {
        let err = parse_listings(r#"{"status": {"error_code": 0}}"#, "USD").unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));

        let err = parse_listings("<html>", "USD").unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[test]
    fn test_empty_data_is_valid() {
        let records = parse_listings(r#"{"data": []}"#, "USD").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_listings_url_joins_base() {
        let provider =
            CoinMarketCapProvider::new("http://localhost:9000/", "key", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            provider.listings_url(),
            "http://localhost:9000/v1/cryptocurrency/listings/latest"
        );
    }
}
