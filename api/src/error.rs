use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use posada_common::error::MarketError;
use serde_json::json;
use thiserror::Error;

/// HTTP 응답용 에러. 항상 `{"error": ...}` 본문으로 직렬화된다
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// 필요한 캐시 데이터가 아직 없음
    #[error("{0}")]
    Unavailable(String),

    /// 캔들 조회 실패. 본문에 빈 `candles` 배열이 붙는다
    #[error("{0}")]
    NoCandles(String),

    #[error("storage error: {0}")]
    Storage(#[from] MarketError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NoCandles(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::NoCandles(msg) => json!({ "error": msg, "candles": [] }),
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
