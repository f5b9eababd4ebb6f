#![allow(dead_code)]
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ema::EMA, Indicator};

/// MACD with the two previous histogram values retained so strategies
/// can test monotonic growth, not just sign.
#[derive(Debug, Clone)]
pub struct MACD {
    fast_ema: EMA,
    slow_ema: EMA,
    signal_ema: EMA,
    macd_line: Option<Decimal>,
    signal_line: Option<Decimal>,
    histogram: Option<Decimal>,
    prev_histogram: Option<Decimal>,
    prev2_histogram: Option<Decimal>,
}

impl MACD {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        Self {
            fast_ema: EMA::new(fast_period),
            slow_ema: EMA::new(slow_period),
            signal_ema: EMA::new(signal_period),
            macd_line: None,
            signal_line: None,
            histogram: None,
            prev_histogram: None,
            prev2_histogram: None,
        }
    }

    pub fn default_params() -> Self {
        Self::new(12, 26, 9)
    }

    pub fn update(&mut self, price: Decimal) -> Option<MacdSnapshot> {
        let fast = self.fast_ema.update(price);
        let slow = self.slow_ema.update(price);

        if let (Some(f), Some(s)) = (fast, slow) {
            let macd_line = f - s;
            self.macd_line = Some(macd_line);

            if let Some(signal) = self.signal_ema.update(macd_line) {
                self.prev2_histogram = self.prev_histogram;
                self.prev_histogram = self.histogram;
                self.signal_line = Some(signal);
                self.histogram = Some(macd_line - signal);
                return self.snapshot();
            }
        }

        None
    }

    pub fn snapshot(&self) -> Option<MacdSnapshot> {
        let (macd, signal, hist) = match (self.macd_line, self.signal_line, self.histogram) {
            (Some(m), Some(s), Some(h)) => (m, s, h),
            _ => return None,
        };
        let hist_prev = self.prev_histogram.unwrap_or(hist);
        let hist_prev2 = self.prev2_histogram.unwrap_or(hist_prev);
        Some(MacdSnapshot {
            macd,
            signal,
            hist,
            hist_prev,
            hist_prev2,
            hist_delta: hist - hist_prev,
        })
    }

    pub fn histogram(&self) -> Option<Decimal> {
        self.histogram
    }
}

impl Indicator for MACD {
    fn name(&self) -> &'static str {
        "MACD"
    }

    fn is_ready(&self) -> bool {
        self.histogram.is_some()
    }

    fn reset(&mut self) {
        self.fast_ema.reset();
        self.slow_ema.reset();
        self.signal_ema.reset();
        self.macd_line = None;
        self.signal_line = None;
        self.histogram = None;
        self.prev_histogram = None;
        self.prev2_histogram = None;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MacdSnapshot {
    pub macd: Decimal,
    pub signal: Decimal,
    pub hist: Decimal,
    pub hist_prev: Decimal,
    pub hist_prev2: Decimal,
    pub hist_delta: Decimal,
}

impl MacdSnapshot {
    /// Histogram strictly growing on the positive side.
    pub fn growing_up(&self) -> bool {
        self.hist > self.hist_prev && self.hist_prev > Decimal::ZERO
    }

    /// Histogram strictly growing on the negative side.
    pub fn growing_down(&self) -> bool {
        self.hist < self.hist_prev && self.hist_prev < Decimal::ZERO
    }
}

/// Final MACD state of the series with defaults 12/26/9, or None until
/// the signal line has formed.
pub fn macd_snapshot(closes: &[Decimal]) -> Option<MacdSnapshot> {
    let mut macd = MACD::default_params();
    for c in closes {
        macd.update(*c);
    }
    macd.snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ramp(n: usize) -> Vec<Decimal> {
        (0..n).map(|i| Decimal::from(100 + i as u32)).collect()
    }

    #[test]
    fn none_until_signal_forms() {
        assert!(macd_snapshot(&ramp(30)).is_none());
        assert!(macd_snapshot(&ramp(40)).is_some());
    }

    #[test]
    fn rising_series_has_positive_histogram_history() {
        let snap = macd_snapshot(&ramp(60)).unwrap();
        assert!(snap.hist > Decimal::ZERO);
        assert!(snap.hist_prev > Decimal::ZERO);
        assert!(snap.hist_prev2 > Decimal::ZERO);
        assert_eq!(snap.hist_delta, snap.hist - snap.hist_prev);
    }

    #[test]
    fn growth_tests_require_strict_ordering() {
        let flat = MacdSnapshot {
            macd: dec!(1),
            signal: dec!(0.5),
            hist: dec!(0.5),
            hist_prev: dec!(0.5),
            hist_prev2: dec!(0.5),
            hist_delta: Decimal::ZERO,
        };
        assert!(!flat.growing_up());
        assert!(!flat.growing_down());

        let up = MacdSnapshot {
            hist: dec!(5),
            hist_prev: dec!(3),
            ..flat
        };
        assert!(up.growing_up());

        let down = MacdSnapshot {
            hist: dec!(-5),
            hist_prev: dec!(-3),
            ..flat
        };
        assert!(down.growing_down());
    }
}