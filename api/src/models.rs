use posada_common::types::Candle;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `/api/tokens` 행
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRow {
    pub rank: usize,
    pub ticker: String,
    pub name: String,
    pub price_ada: Option<f64>,
    pub price_usd: Option<f64>,
    pub change_24h: Option<f64>,
    pub volume: Option<f64>,
    pub description: String,
    pub logo: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokensResponse {
    pub tokens: Vec<TokenRow>,
    pub updated_at: i64,
    pub source: String,
}

/// 다중 기간 가격 변동
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoverRow {
    pub ticker: String,
    pub name: String,
    pub price_ada: Option<f64>,
    pub price_usd: Option<f64>,
    pub chg_1h: Option<f64>,
    pub chg_4h: Option<f64>,
    pub chg_24h: Option<f64>,
    pub chg_7d: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketPulse {
    pub dex_volume: Option<f64>,
    pub active_addresses: Option<u64>,
    pub ada_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopVolumeRow {
    pub ticker: String,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoversResponse {
    pub gainers: Vec<MoverRow>,
    pub losers: Vec<MoverRow>,
    pub all: Vec<MoverRow>,
    pub market: MarketPulse,
    pub top_volume: Vec<TopVolumeRow>,
    pub updated_at: i64,
}

/// 고래 거래 한 건
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleTrade {
    pub time: i64,
    pub tx_hash: String,
    pub token: String,
    pub ada_amount: f64,
    pub direction: String,
    pub dex: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhalesResponse {
    pub trades: Vec<WhaleTrade>,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvResponse {
    pub ticker: String,
    pub unit: String,
    pub interval: String,
    pub candles: Vec<Candle>,
    pub updated_at: i64,
}

/// 봇이 보내는 거래 보고
///
/// `customer_id`는 문자열 또는 숫자, `opt_in`은 임의의 JSON 값을 받는다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeReport {
    #[serde(default)]
    pub customer_id: Option<Value>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub opt_in: Option<Value>,
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub pnl: Option<f64>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl TradeReport {
    /// 비어 있지 않은 고객 ID
    pub fn customer_key(&self) -> Option<String> {
        let key = match self.customer_id.as_ref()? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        (!key.is_empty() && key != "0").then_some(key)
    }

    /// 비어 있지 않은 이벤트 이름
    pub fn event_name(&self) -> Option<&str> {
        self.event.as_deref().filter(|e| !e.is_empty() && *e != "0")
    }
}

/// JSON 값의 참/거짓 판정 (false, 0, "", "0", null, 빈 배열/객체는 거짓)
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// 저장된 거래 기록
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ts: i64,
    pub cid: String,
    pub event: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub pnl: Option<f64>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub opt_in: bool,
    #[serde(default)]
    pub joined: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub username: String,
    pub total_pnl: f64,
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate: f64,
    pub fav_strategy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentTrade {
    pub ts: i64,
    pub username: String,
    pub event: String,
    pub symbol: String,
    pub strategy: String,
    pub pnl: Option<f64>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub leaderboard: Vec<LeaderboardRow>,
    pub recent: Vec<RecentTrade>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRow {
    pub name: String,
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate: f64,
    pub avg_pnl: f64,
    pub total_pnl: f64,
    pub top_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategiesResponse {
    pub strategies: Vec<StrategyRow>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub ok: bool,
    pub recorded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
