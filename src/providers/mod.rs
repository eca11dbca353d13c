//! Listings provider implementations

pub mod coinmarketcap;

pub use coinmarketcap::{parse_listings, CoinMarketCapProvider};
