pub mod spot;
pub mod chainlink;
pub mod polymarket;

pub use spot::*;
pub use chainlink::*;
pub use polymarket::*;

use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Interval between reconnect attempts for all WS readers.
pub const RECONNECT_BACKOFF_SECS: u64 = 3;

/// Deadline applied to every outbound HTTP request.
pub const HTTP_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("websocket error: {0}")]
    WebSocket(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed payload: {0}")]
    Payload(String),
}

/// A timestamped price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceTick {
    pub ts_ms: i64,
    pub price: Decimal,
}

/// Mutex-guarded last-value slot. Producers overwrite, readers only
/// ever see the freshest observation.
#[derive(Debug, Clone, Default)]
pub struct PriceCell {
    inner: Arc<Mutex<Option<PriceTick>>>,
}

impl PriceCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, tick: PriceTick) {
        if let Ok(mut slot) = self.inner.lock() {
            *slot = Some(tick);
        }
    }

    pub fn latest(&self) -> Option<PriceTick> {
        self.inner.lock().ok().and_then(|slot| *slot)
    }

    pub fn price(&self) -> Option<Decimal> {
        self.latest().map(|t| t.price)
    }

    /// Milliseconds since the last observation, measured against the
    /// supplied clock value.
    pub fn age_ms(&self, now_ms: i64) -> Option<i64> {
        self.latest().map(|t| now_ms - t.ts_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cell_keeps_only_freshest_value() {
        let cell = PriceCell::new();
        assert!(cell.latest().is_none());

        cell.store(PriceTick { ts_ms: 1_000, price: dec!(100) });
        cell.store(PriceTick { ts_ms: 2_000, price: dec!(101) });

        let latest = cell.latest().unwrap();
        assert_eq!(latest.ts_ms, 2_000);
        assert_eq!(latest.price, dec!(101));
        assert_eq!(cell.age_ms(12_000), Some(10_000));
    }

    #[test]
    fn clones_share_the_slot() {
        let cell = PriceCell::new();
        let writer = cell.clone();
        writer.store(PriceTick { ts_ms: 5, price: dec!(99) });
        assert_eq!(cell.price(), Some(dec!(99)));
    }
}
