use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::types::Market;
use super::HTTP_TIMEOUT_SECS;

const GAMMA_BASE: &str = "https://gamma-api.polymarket.com";
const CLOB_BASE: &str = "https://clob.polymarket.com";

/// Requests per second against the Polymarket APIs.
const RATE_LIMIT_PER_SEC: u32 = 8;

/// How the current market is chosen.
#[derive(Debug, Clone)]
pub enum MarketSelector {
    /// A fixed market slug.
    Slug(String),
    /// The soonest-expiring open market of a series; with
    /// `auto_latest` the selection rolls forward as windows settle.
    Series {
        slug: String,
        auto_latest: bool,
    },
    /// Same, addressed by the series' numeric id.
    SeriesId {
        id: String,
        auto_latest: bool,
    },
}

/// Read-only market-data surface consumed by the snapshot assembler.
/// Split out as a trait so tests can stub the venue.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Latest market matching the configured selector.
    async fn current_market(&self) -> Result<Option<Market>>;

    /// Best buy-side price for an outcome token, None when the book
    /// is empty.
    async fn buy_price(&self, token_id: &str) -> Result<Option<Decimal>>;
}

/// REST client for the gamma metadata API and the CLOB price
/// endpoint. All calls share one rate limiter and a 5 s deadline.
pub struct PolymarketClient {
    http: reqwest::Client,
    gamma_base: String,
    clob_base: String,
    selector: MarketSelector,
    limiter: governor::DefaultDirectRateLimiter,
}

impl PolymarketClient {
    pub fn new(selector: MarketSelector) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        let quota = Quota::per_second(
            NonZeroU32::new(RATE_LIMIT_PER_SEC).expect("rate limit is non-zero"),
        );
        Ok(Self {
            http,
            gamma_base: GAMMA_BASE.to_string(),
            clob_base: CLOB_BASE.to_string(),
            selector,
            limiter: RateLimiter::direct(quota),
        })
    }

    async fn fetch_markets(&self, query: &[(&str, &str)]) -> Result<Vec<serde_json::Value>> {
        self.limiter.until_ready().await;
        let url = format!("{}/markets", self.gamma_base);
        let response = self.http.get(&url).query(query).send().await?;
        let body: serde_json::Value = response.json().await?;
        match body {
            serde_json::Value::Array(items) => Ok(items),
            other => Ok(vec![other]),
        }
    }

    async fn fetch_series(
        &self,
        query: &[(&str, &str)],
        auto_latest: bool,
    ) -> Result<Vec<serde_json::Value>> {
        let mut items = self.fetch_markets(query).await?;
        if auto_latest {
            // Soonest future expiry first.
            let now_ms = Utc::now().timestamp_millis();
            items.sort_by_key(|m| parse_end_date_ms(m).unwrap_or(i64::MAX));
            items.retain(|m| parse_end_date_ms(m).map(|end| end > now_ms).unwrap_or(false));
        }
        Ok(items)
    }
}

#[async_trait]
impl MarketDataSource for PolymarketClient {
    async fn current_market(&self) -> Result<Option<Market>> {
        let raw = match &self.selector {
            MarketSelector::Slug(slug) => self.fetch_markets(&[("slug", slug)]).await?,
            MarketSelector::Series { slug, auto_latest } => {
                self.fetch_series(&[("series_slug", slug), ("closed", "false")], *auto_latest)
                    .await?
            }
            MarketSelector::SeriesId { id, auto_latest } => {
                self.fetch_series(&[("series_id", id), ("closed", "false")], *auto_latest)
                    .await?
            }
        };

        for item in &raw {
            match parse_market(item) {
                Ok(market) => return Ok(Some(market)),
                Err(e) => debug!("Skipping unparseable market: {e:#}"),
            }
        }
        Ok(None)
    }

    async fn buy_price(&self, token_id: &str) -> Result<Option<Decimal>> {
        self.limiter.until_ready().await;
        let url = format!("{}/price", self.clob_base);
        let response = self
            .http
            .get(&url)
            .query(&[("token_id", token_id), ("side", "buy")])
            .send()
            .await?;

        if !response.status().is_success() {
            warn!("CLOB price fetch for {token_id} returned {}", response.status());
            return Ok(None);
        }

        let body: serde_json::Value = response.json().await?;
        Ok(body
            .get("price")
            .and_then(|p| p.as_str())
            .and_then(|p| Decimal::from_str(p).ok())
            .filter(|p| *p > Decimal::ZERO && *p < Decimal::ONE))
    }
}

fn parse_end_date_ms(value: &serde_json::Value) -> Option<i64> {
    value
        .get("endDate")
        .and_then(|d| d.as_str())
        .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
        .map(|d| d.timestamp_millis())
}

/// Gamma encodes `outcomes` and `clobTokenIds` as JSON-in-a-string;
/// tolerate both that and plain arrays.
fn parse_string_array(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        Some(serde_json::Value::String(raw)) => serde_json::from_str::<Vec<String>>(raw)
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

pub fn parse_market(value: &serde_json::Value) -> Result<Market> {
    let slug = value
        .get("slug")
        .and_then(|s| s.as_str())
        .ok_or_else(|| anyhow!("market without slug"))?
        .to_string();
    let question = value
        .get("question")
        .and_then(|q| q.as_str())
        .unwrap_or_default()
        .to_string();
    let outcomes = parse_string_array(value.get("outcomes"));
    let clob_token_ids = parse_string_array(value.get("clobTokenIds"));
    let end_date_ms =
        parse_end_date_ms(value).ok_or_else(|| anyhow!("market {slug} without endDate"))?;

    if outcomes.len() != clob_token_ids.len() {
        return Err(anyhow!(
            "market {slug}: {} outcomes vs {} token ids",
            outcomes.len(),
            clob_token_ids.len()
        ));
    }

    let metadata: HashMap<String, serde_json::Value> = value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter(|(k, _)| {
                    !matches!(k.as_str(), "slug" | "question" | "outcomes" | "clobTokenIds")
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();

    Ok(Market {
        slug,
        question,
        outcomes,
        clob_token_ids,
        end_date_ms,
        metadata,
    })
}
