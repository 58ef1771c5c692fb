//! Provider subscribe/unsubscribe frames.
//!
//! Builders for the opaque text frames streaming providers expect. The
//! streaming client itself never inspects these; it just writes them.

use serde::Deserialize;
use serde_json::json;

/// Supported streaming data providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Tiingo,
    Eodhd,
}

/// Build the subscribe frame for the given provider dialect.
pub fn subscribe_frame(provider: Provider, api_key: &str, tickers: &[String]) -> String {
    match provider {
        Provider::Tiingo => json!({
            "eventName": "subscribe",
            "authorization": api_key,
            "eventData": {
                "thresholdLevel": 0,
                "tickers": tickers,
            },
        })
        .to_string(),
        Provider::Eodhd => json!({
            "action": "subscribe",
            "symbols": tickers.join(","),
        })
        .to_string(),
    }
}

/// Build the unsubscribe frame for the given provider dialect.
pub fn unsubscribe_frame(provider: Provider, api_key: &str, tickers: &[String]) -> String {
    match provider {
        Provider::Tiingo => json!({
            "eventName": "unsubscribe",
            "authorization": api_key,
            "eventData": {
                "tickers": tickers,
            },
        })
        .to_string(),
        Provider::Eodhd => json!({
            "action": "unsubscribe",
            "symbols": tickers.join(","),
        })
        .to_string(),
    }
}
