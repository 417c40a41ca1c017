//! Upstream market data records shared by the feed clients and the API.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A token as listed by the price aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenQuote {
    pub ticker: String,
    pub name: String,
    #[serde(default)]
    pub price_ada: Option<f64>,
    #[serde(default)]
    pub price_usd: Option<f64>,
    #[serde(default)]
    pub token_id: String,
    #[serde(default)]
    pub logo: String,
    #[serde(default)]
    pub decimals: u32,
}

impl TokenQuote {
    /// USD per ADA implied by this quote, when both prices are positive.
    pub fn implied_ada_usd(&self) -> Option<f64> {
        match (self.price_ada, self.price_usd) {
            (Some(ada), Some(usd)) if ada > 0.0 && usd > 0.0 => Some(usd / ada),
            _ => None,
        }
    }
}

/// USD/ADA rate from the first quote carrying both prices.
pub fn derive_ada_usd(tokens: &[TokenQuote]) -> Option<f64> {
    tokens.iter().find_map(TokenQuote::implied_ada_usd)
}

/// 24h traded volume for a ticker, denominated in ADA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeEntry {
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub volume: Option<f64>,
}

/// Raw swap event from the chain indexer.
///
/// Field names vary between indexer versions, so every field is optional
/// and the aliases cover both spellings. Numeric fields also accept numeric
/// strings; anything else reads as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwapEvent {
    #[serde(default, alias = "adaAmount", deserialize_with = "lenient_f64")]
    pub ada_amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lovelace: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub timestamp: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub time: Option<i64>,
    #[serde(default, alias = "txHash")]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub dex: Option<String>,
}

impl SwapEvent {
    /// Token unit, preferring `unit` over `token`.
    pub fn unit(&self) -> &str {
        self.unit
            .as_deref()
            .or(self.token.as_deref())
            .unwrap_or_default()
    }

    /// Event time, preferring `timestamp` over `time`.
    pub fn event_time(&self) -> Option<i64> {
        self.timestamp.or(self.time)
    }
}

fn number_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number_value(&value))
}

/// 소수 타임스탬프는 초 단위로 버림
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if let Some(n) = value.as_i64() {
        return Ok(Some(n));
    }

    Ok(number_value(&value)
        .map(f64::trunc)
        .filter(|v| *v >= i64::MIN as f64 && *v < i64::MAX as f64)
        .map(|v| v as i64))
}

/// Percentage price changes over several timeframes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceChanges {
    #[serde(default, rename = "1h")]
    pub h1: Option<f64>,
    #[serde(default, rename = "4h")]
    pub h4: Option<f64>,
    #[serde(default, rename = "24h")]
    pub h24: Option<f64>,
    #[serde(default, rename = "7d")]
    pub d7: Option<f64>,
}

/// Aggregate market statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    #[serde(default, rename = "totalVolume")]
    pub total_volume: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default, rename = "activeAddresses")]
    pub active_addresses: Option<u64>,
}

impl MarketStats {
    pub fn dex_volume(&self) -> Option<f64> {
        self.total_volume.or(self.volume)
    }
}

/// Normalised OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candle as returned upstream, with long or single-letter keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCandle {
    #[serde(default, alias = "timestamp", alias = "t")]
    pub time: Option<i64>,
    #[serde(default, alias = "o")]
    pub open: Option<f64>,
    #[serde(default, alias = "h")]
    pub high: Option<f64>,
    #[serde(default, alias = "l")]
    pub low: Option<f64>,
    #[serde(default, alias = "c")]
    pub close: Option<f64>,
    #[serde(default, alias = "v")]
    pub volume: Option<f64>,
}

impl From<RawCandle> for Candle {
    fn from(raw: RawCandle) -> Self {
        Candle {
            time: raw.time.unwrap_or(0),
            open: raw.open.unwrap_or(0.0),
            high: raw.high.unwrap_or(0.0),
            low: raw.low.unwrap_or(0.0),
            close: raw.close.unwrap_or(0.0),
            volume: raw.volume.unwrap_or(0.0),
        }
    }
}
