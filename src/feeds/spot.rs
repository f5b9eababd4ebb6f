use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{FeedError, PriceCell, PriceTick, RECONNECT_BACKOFF_SECS};

/// Binance spot trade stream. Each trade updates the last-value cell
/// and is forwarded to the orchestrator for candle aggregation.
pub struct SpotFeed {
    url: String,
}

#[derive(Debug, Deserialize)]
struct TradeMessage {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "T")]
    trade_time_ms: i64,
    #[serde(rename = "p")]
    price: String,
}

impl SpotFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Spawn the reader task. Returns the shared price cell plus a
    /// tick channel; the producer never blocks on a full channel, it
    /// drops the oldest semantics to the receiver's pace.
    pub fn start(self) -> (PriceCell, mpsc::Receiver<PriceTick>) {
        let cell = PriceCell::new();
        let (tx, rx) = mpsc::channel(4096);
        let writer = cell.clone();

        tokio::spawn(async move {
            loop {
                match Self::run_connection(&self.url, &writer, &tx).await {
                    Ok(()) => warn!("Spot stream closed, reconnecting..."),
                    Err(e) => warn!("Spot stream error: {e:#}, reconnecting..."),
                }
                tokio::time::sleep(std::time::Duration::from_secs(RECONNECT_BACKOFF_SECS)).await;
            }
        });

        (cell, rx)
    }

    async fn run_connection(
        url: &str,
        cell: &PriceCell,
        tx: &mpsc::Sender<PriceTick>,
    ) -> Result<(), FeedError> {
        info!("Connecting to spot stream: {url}");
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| FeedError::WebSocket(e.to_string()))?;
        let (_, mut read) = ws_stream.split();
        info!("Spot stream connected");

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Some(tick) = Self::parse_trade(&text) {
                        cell.store(tick);
                        if tx.try_send(tick).is_err() {
                            debug!("Tick channel full, dropping trade");
                        }
                    }
                }
                Ok(Message::Ping(_)) => {
                    debug!("Spot stream ping");
                }
                Ok(Message::Close(_)) => {
                    info!("Spot stream closed by server");
                    break;
                }
                Err(e) => {
                    warn!("Spot stream read error: {e}");
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn parse_trade(text: &str) -> Option<PriceTick> {
        let msg: TradeMessage = serde_json::from_str(text).ok()?;
        if msg.event_type != "trade" {
            return None;
        }
        let price = Decimal::from_str(&msg.price).ok()?;
        Some(PriceTick {
            ts_ms: msg.trade_time_ms,
            price,
        })
    }
}
