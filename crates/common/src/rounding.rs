use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// 소수점 `dp` 자리 반올림 (0.5는 0에서 먼 쪽으로)
///
/// Decimal로 변환해서 반올림한다. 변환할 수 없는 값은 그대로 반환.
pub fn round_dp(value: f64, dp: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }

    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// 통화 금액 (2자리)
pub fn round_currency(value: f64) -> f64 {
    round_dp(value, 2)
}

/// 승률 등 퍼센트 (1자리)
pub fn round_percent(value: f64) -> f64 {
    round_dp(value, 1)
}
