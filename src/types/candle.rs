#![allow(dead_code)]
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One-minute bucket width in milliseconds.
pub const CANDLE_INTERVAL_MS: i64 = 60_000;

/// Trade-by-trade streams carry no usable volume, so each bucket gets a
/// fixed unit. Replaceable when richer feeds are wired in.
pub const UNIT_VOLUME: Decimal = Decimal::ONE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start, unix-ms, always a multiple of 60 000.
    pub open_time_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn new(open_time_ms: i64, price: Decimal) -> Self {
        Self {
            open_time_ms,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: UNIT_VOLUME,
        }
    }

    /// Fold a within-bucket tick into the forming candle.
    pub fn apply(&mut self, price: Decimal) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    pub fn close_time_ms(&self) -> i64 {
        self.open_time_ms + CANDLE_INTERVAL_MS
    }

    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn typical_price(&self) -> Decimal {
        (self.high + self.low + self.close) / Decimal::from(3)
    }

    pub fn ohlc4(&self) -> Decimal {
        (self.open + self.high + self.low + self.close) / Decimal::from(4)
    }
}

/// Bounded ring of closed candles, oldest first.
#[derive(Debug, Clone, Default)]
pub struct CandleRing {
    pub candles: Vec<Candle>,
    pub max_size: usize,
}

impl CandleRing {
    pub fn new(max_size: usize) -> Self {
        Self {
            candles: Vec::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, candle: Candle) {
        if self.candles.len() >= self.max_size {
            self.candles.remove(0);
        }
        self.candles.push(candle);
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn last_n(&self, n: usize) -> &[Candle] {
        let len = self.candles.len();
        if n >= len {
            &self.candles[..]
        } else {
            &self.candles[len - n..]
        }
    }

    pub fn closes(&self) -> Vec<Decimal> {
        self.candles.iter().map(|c| c.close).collect()
    }
}

/// Folds a stream of (timestamp, price) ticks into one-minute candles.
///
/// The forming candle mutates until its minute boundary elapses; a tick
/// in a later bucket closes it. Idle minutes between ticks are filled
/// with flat candles carrying the previous close forward, so closed
/// open-times always advance by exactly one interval.
#[derive(Debug)]
pub struct CandleAggregator {
    ring: CandleRing,
    forming: Option<Candle>,
}

impl CandleAggregator {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: CandleRing::new(capacity),
            forming: None,
        }
    }

    fn bucket_of(ts_ms: i64) -> i64 {
        ts_ms.div_euclid(CANDLE_INTERVAL_MS) * CANDLE_INTERVAL_MS
    }

    /// Feed one tick. Returns the candles closed by this tick (usually
    /// zero or one; more when the stream had idle minutes).
    pub fn on_tick(&mut self, ts_ms: i64, price: Decimal) -> Vec<Candle> {
        let bucket = Self::bucket_of(ts_ms);
        let mut closed = Vec::new();

        match self.forming.take() {
            None => {
                self.forming = Some(Candle::new(bucket, price));
            }
            Some(mut candle) if bucket <= candle.open_time_ms => {
                // Same bucket, or an out-of-order tick from a
                // reconnect; fold in rather than rewriting history.
                candle.apply(price);
                self.forming = Some(candle);
            }
            Some(candle) => {
                let last_close = candle.close;
                let mut next_open = candle.close_time_ms();
                closed.push(candle);

                while next_open < bucket {
                    closed.push(Candle {
                        open_time_ms: next_open,
                        open: last_close,
                        high: last_close,
                        low: last_close,
                        close: last_close,
                        volume: Decimal::ZERO,
                    });
                    next_open += CANDLE_INTERVAL_MS;
                }

                self.forming = Some(Candle::new(bucket, price));
            }
        }

        for candle in &closed {
            self.ring.push(candle.clone());
        }
        closed
    }

    pub fn forming(&self) -> Option<&Candle> {
        self.forming.as_ref()
    }

    pub fn ring(&self) -> &CandleRing {
        &self.ring
    }

    pub fn closed_count(&self) -> usize {
        self.ring.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn aggregates_minute_buckets() {
        let mut agg = CandleAggregator::new(240);
        assert!(agg.on_tick(0, dec!(100)).is_empty());
        assert!(agg.on_tick(30_000, dec!(110)).is_empty());
        assert!(agg.on_tick(45_000, dec!(90)).is_empty());

        let closed = agg.on_tick(61_000, dec!(105));
        assert_eq!(closed.len(), 1);
        let first = &closed[0];
        assert_eq!(first.open_time_ms, 0);
        assert_eq!(first.open, dec!(100));
        assert_eq!(first.high, dec!(110));
        assert_eq!(first.low, dec!(90));
        assert_eq!(first.close, dec!(90));

        let forming = agg.forming().unwrap();
        assert_eq!(forming.open, dec!(105));
        assert_eq!(forming.open_time_ms, 60_000);
    }

    #[test]
    fn closed_candles_are_contiguous() {
        let mut agg = CandleAggregator::new(240);
        agg.on_tick(5_000, dec!(100));
        // Jump three minutes; the gap fills with flat candles.
        agg.on_tick(185_000, dec!(104));
        let candles = &agg.ring().candles;
        assert_eq!(candles.len(), 3);
        for pair in candles.windows(2) {
            assert_eq!(pair[0].close_time_ms(), pair[1].open_time_ms);
        }
        for c in candles {
            assert_eq!(c.open_time_ms % CANDLE_INTERVAL_MS, 0);
            assert!(c.low <= c.open && c.low <= c.close);
            assert!(c.high >= c.open && c.high >= c.close);
        }
        // Flat fillers carry the previous close.
        assert_eq!(candles[1].open, candles[0].close);
        assert_eq!(candles[1].close, candles[0].close);
    }

    #[test]
    fn ring_is_bounded() {
        let mut ring = CandleRing::new(3);
        for i in 0..5 {
            ring.push(Candle::new(i * CANDLE_INTERVAL_MS, dec!(100)));
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.candles[0].open_time_ms, 2 * CANDLE_INTERVAL_MS);
    }

    #[test]
    fn out_of_order_tick_does_not_rewind() {
        let mut agg = CandleAggregator::new(240);
        agg.on_tick(65_000, dec!(100));
        let closed = agg.on_tick(64_000, dec!(95));
        assert!(closed.is_empty());
        let forming = agg.forming().unwrap();
        assert_eq!(forming.open_time_ms, 60_000);
        assert_eq!(forming.low, dec!(95));
    }
}