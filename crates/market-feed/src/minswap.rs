use crate::provider::TokenListProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use posada_common::config::{TokensConfig, UpstreamConfig};
use posada_common::types::TokenQuote;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// 토큰 검색 요청 본문
#[derive(Debug, Serialize)]
struct TokenSearchRequest<'a> {
    query: &'a str,
    only_verified: bool,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    search_after: Option<&'a Value>,
}

/// Minswap 토큰 목록 한 페이지
#[derive(Debug, Default, Deserialize)]
pub struct TokenPage {
    #[serde(default)]
    pub tokens: Vec<MinswapToken>,
    #[serde(default)]
    pub search_after: Option<Value>,
}

impl TokenPage {
    /// 다음 페이지 커서. null이나 빈 값이면 마지막 페이지
    pub fn next_cursor(&self) -> Option<&Value> {
        match &self.search_after {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) if items.is_empty() => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(cursor) => Some(cursor),
        }
    }
}

/// Minswap에서 받아오는 토큰 데이터 구조
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MinswapToken {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub price_by_ada: Option<f64>,
    #[serde(default)]
    pub price_by_usd: Option<f64>,
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub decimals: Option<u32>,
}

/// 한 페이지의 토큰을 결과에 추가. `limit`에 도달하면 true
///
/// 티커는 대문자로 정규화되고, 빈 티커, 제외 목록, 이미 추가된 티커는 건너뛴다.
pub fn accumulate_page(
    result: &mut Vec<TokenQuote>,
    tokens: Vec<MinswapToken>,
    excluded: &[String],
    limit: usize,
) -> bool {
    for token in tokens {
        if result.len() >= limit {
            return true;
        }

        let ticker = token.ticker.as_deref().unwrap_or_default().to_uppercase();
        if ticker.is_empty() || excluded.iter().any(|e| e.eq_ignore_ascii_case(&ticker)) {
            continue;
        }
        if result.iter().any(|t| t.ticker == ticker) {
            continue;
        }

        result.push(TokenQuote {
            name: token.project_name.unwrap_or_else(|| ticker.clone()),
            ticker,
            price_ada: token.price_by_ada,
            price_usd: token.price_by_usd,
            token_id: token.token_id.unwrap_or_default(),
            logo: token.logo.unwrap_or_default(),
            decimals: token.decimals.unwrap_or(0),
        });
    }

    result.len() >= limit
}

/// Minswap aggregator와 통신하는 클라이언트
pub struct MinswapClient {
    client: Client,
    tokens_url: String,
    page_size: usize,
    max_pages: usize,
    rate_limit_backoff: Duration,
}

impl MinswapClient {
    /// 새로운 Minswap 클라이언트를 만듭니다
    pub fn new(upstream: &UpstreamConfig, tokens: &TokensConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(upstream.minswap_timeout_secs))
            .user_agent(upstream.user_agent.as_str())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            tokens_url: format!("{}/tokens", upstream.minswap_url.trim_end_matches('/')),
            page_size: tokens.page_size,
            max_pages: tokens.max_pages,
            rate_limit_backoff: Duration::from_secs(upstream.rate_limit_backoff_secs),
        })
    }

    async fn send(&self, cursor: Option<&Value>) -> Result<Response> {
        let body = TokenSearchRequest {
            query: "",
            only_verified: true,
            limit: self.page_size,
            search_after: cursor,
        };

        self.client
            .post(&self.tokens_url)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Minswap")
    }

    /// 페이지 하나 가져오기. 429이면 한 번만 재시도
    async fn fetch_page(&self, cursor: Option<&Value>) -> Result<TokenPage> {
        info!("🌐 Calling Minswap API: {}", self.tokens_url);

        let mut response = self.send(cursor).await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!(
                "Minswap rate limited, retrying once in {}s",
                self.rate_limit_backoff.as_secs()
            );
            sleep(self.rate_limit_backoff).await;
            response = self.send(cursor).await?;
        }

        if !response.status().is_success() {
            anyhow::bail!(
                "Minswap API returned error status: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            );
        }

        response
            .json::<TokenPage>()
            .await
            .context("Failed to parse Minswap response")
    }
}

#[async_trait]
impl TokenListProvider for MinswapClient {
    async fn fetch_tokens(&self, limit: usize, excluded: &[String]) -> Result<Vec<TokenQuote>> {
        let mut result = Vec::new();
        let mut cursor: Option<Value> = None;

        for page_no in 0..self.max_pages {
            let page = match self.fetch_page(cursor.as_ref()).await {
                Ok(page) => page,
                Err(e) if page_no == 0 => return Err(e),
                Err(e) => {
                    warn!(
                        "❌ Minswap page {} failed, keeping {} tokens: {}",
                        page_no + 1,
                        result.len(),
                        e
                    );
                    break;
                }
            };

            if page.tokens.is_empty() {
                break;
            }

            let next = page.next_cursor().cloned();
            if accumulate_page(&mut result, page.tokens, excluded, limit) {
                break;
            }

            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!("✅ Fetched {} tokens from Minswap", result.len());
        Ok(result)
    }

    fn name(&self) -> &str {
        "minswap"
    }
}
