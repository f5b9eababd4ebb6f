use anyhow::Result;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{FeedError, PriceCell, PriceTick, HTTP_TIMEOUT_SECS, RECONNECT_BACKOFF_SECS};

/// `latestRoundData()` selector on the aggregator proxy.
const LATEST_ROUND_DATA: &str = "0xfeaf968c";

/// keccak("AnswerUpdated(int256,uint256,uint256)").
const ANSWER_UPDATED_TOPIC: &str =
    "0x0559884fd3a460db3073b7fc896cc77986f16e378210ded43186175bf646fc5f";

/// Chainlink answers carry 8 decimals on the BTC/USD feed.
const ANSWER_DECIMALS: u32 = 8;

/// Milliseconds of silence after which the WS value is considered
/// stale and the REST fallback kicks in.
const STALE_AFTER_MS: i64 = 10_000;

/// On-chain BTC/USD price feed. Subscribes to the aggregator's
/// AnswerUpdated logs over Polygon WSS and falls back to polling
/// `latestRoundData` over JSON-RPC when the stream goes quiet.
pub struct ChainlinkFeed {
    rpc_urls: Vec<String>,
    wss_urls: Vec<String>,
    aggregator: String,
    client: reqwest::Client,
}

impl ChainlinkFeed {
    pub fn new(rpc_urls: Vec<String>, wss_urls: Vec<String>, aggregator: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            rpc_urls,
            wss_urls,
            aggregator,
            client,
        })
    }

    pub fn start(self) -> PriceCell {
        let cell = PriceCell::new();

        if !self.wss_urls.is_empty() {
            let ws_cell = cell.clone();
            let wss_urls = self.wss_urls.clone();
            let aggregator = self.aggregator.clone();
            tokio::spawn(async move {
                let mut idx = 0usize;
                loop {
                    let url = &wss_urls[idx % wss_urls.len()];
                    idx += 1;
                    match Self::run_subscription(url, &aggregator, &ws_cell).await {
                        Ok(()) => warn!("Chainlink WSS closed, reconnecting..."),
                        Err(e) => warn!("Chainlink WSS error: {e:#}, reconnecting..."),
                    }
                    tokio::time::sleep(std::time::Duration::from_secs(RECONNECT_BACKOFF_SECS))
                        .await;
                }
            });
        }

        let poll_cell = cell.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(RECONNECT_BACKOFF_SECS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let now_ms = Utc::now().timestamp_millis();
                let stale = poll_cell
                    .age_ms(now_ms)
                    .map(|age| age > STALE_AFTER_MS)
                    .unwrap_or(true);
                if !stale {
                    continue;
                }
                match self.fetch_latest().await {
                    Ok(price) => {
                        poll_cell.store(PriceTick {
                            ts_ms: Utc::now().timestamp_millis(),
                            price,
                        });
                    }
                    Err(e) => warn!("Chainlink REST fallback failed: {e:#}"),
                }
            }
        });

        cell
    }

    /// Poll `latestRoundData` across the configured RPC endpoints,
    /// first success wins.
    pub async fn fetch_latest(&self) -> Result<Decimal, FeedError> {
        let mut last_err = FeedError::Payload("no RPC endpoints configured".to_string());
        for url in &self.rpc_urls {
            match self.eth_call(url).await {
                Ok(price) => return Ok(price),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    async fn eth_call(&self, rpc_url: &str) -> Result<Decimal, FeedError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                {"to": self.aggregator, "data": LATEST_ROUND_DATA},
                "latest"
            ]
        });
        let response: serde_json::Value = self
            .client
            .post(rpc_url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        let result = response
            .get("result")
            .and_then(|r| r.as_str())
            .ok_or_else(|| FeedError::Payload(format!("eth_call returned no result: {response}")))?;
        decode_round_data_answer(result)
    }

    async fn run_subscription(
        url: &str,
        aggregator: &str,
        cell: &PriceCell,
    ) -> Result<(), FeedError> {
        info!("Connecting to Polygon WSS: {url}");
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| FeedError::WebSocket(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_subscribe",
            "params": ["logs", {"address": aggregator, "topics": [ANSWER_UPDATED_TOPIC]}]
        });
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| FeedError::WebSocket(e.to_string()))?;
        info!("Chainlink log subscription requested");

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Some(price) = parse_answer_updated(&text) {
                        debug!("Chainlink answer: {price}");
                        cell.store(PriceTick {
                            ts_ms: Utc::now().timestamp_millis(),
                            price,
                        });
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Polygon WSS closed by server");
                    break;
                }
                Err(e) => {
                    warn!("Polygon WSS read error: {e}");
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Pull the indexed `current` answer out of an AnswerUpdated log
/// notification.
fn parse_answer_updated(text: &str) -> Option<Decimal> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let topics = value
        .get("params")?
        .get("result")?
        .get("topics")?
        .as_array()?;
    let answer_hex = topics.get(1)?.as_str()?;
    decode_uint_word(answer_hex).ok()
}

/// Second 32-byte word of the latestRoundData return payload is the
/// answer.
fn decode_round_data_answer(result_hex: &str) -> Result<Decimal, FeedError> {
    let hex = result_hex.trim_start_matches("0x");
    if hex.len() < 128 {
        return Err(FeedError::Payload(format!(
            "round data too short: {} chars",
            hex.len()
        )));
    }
    decode_uint_word(&hex[64..128])
}

/// Decode a 32-byte big-endian hex word into a price with the feed's
/// fixed decimals. BTC/USD answers are positive and far below the
/// i128 range, so the low 16 bytes are sufficient.
fn decode_uint_word(word: &str) -> Result<Decimal, FeedError> {
    let hex = word.trim_start_matches("0x");
    let tail = if hex.len() > 32 { &hex[hex.len() - 32..] } else { hex };
    let raw = u128::from_str_radix(tail, 16)
        .map_err(|e| FeedError::Payload(format!("bad hex word {word}: {e}")))?;
    Ok(Decimal::from_i128_with_scale(raw as i128, ANSWER_DECIMALS))
}
