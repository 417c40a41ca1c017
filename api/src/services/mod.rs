//! 엔드포인트별 서비스
//!
//! 각 서비스는 업스트림 제공자와 캐시를 조합해 응답 모델을 만든다.
//! HTTP 관련 처리는 `routes`에서 한다.

pub mod leaderboard;
pub mod movers;
pub mod ohlcv;
pub mod tokens;
pub mod whales;

pub use leaderboard::LeaderboardService;
pub use movers::MoversService;
pub use ohlcv::{CandleQuery, OhlcvService};
pub use tokens::TokenService;
pub use whales::WhaleService;

use crate::cache::ResponseCache;
use posada_common::types::TokenQuote;
use tokens::TOKENS_CACHE_KEY;

/// 나이와 무관하게 마지막으로 저장된 토큰 목록. 없으면 빈 목록
pub(crate) async fn stored_token_list(cache: &ResponseCache) -> Vec<TokenQuote> {
    cache
        .read_any::<Vec<TokenQuote>>(TOKENS_CACHE_KEY)
        .await
        .map(|envelope| envelope.data)
        .unwrap_or_default()
}

/// 앞에서부터 최대 `n`글자
pub(crate) fn head_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// 뒤에서부터 최대 `n`글자
pub(crate) fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }

    match s.char_indices().nth(count - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
