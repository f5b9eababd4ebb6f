#![allow(dead_code)]
pub mod ema;
pub mod rsi;
pub mod macd;
pub mod heiken_ashi;
pub mod vwap;

pub use ema::*;
pub use rsi::*;
pub use macd::*;
pub use heiken_ashi::*;
pub use vwap::*;

use rust_decimal::Decimal;

pub trait Indicator {
    fn name(&self) -> &'static str;
    fn is_ready(&self) -> bool;
    fn reset(&mut self);
}

pub fn sma(values: &[Decimal], period: usize) -> Option<Decimal> {
    if values.len() < period || period == 0 {
        return None;
    }
    let sum: Decimal = values.iter().rev().take(period).sum();
    Some(sum / Decimal::from(period as u32))
}

/// Discrete slope over the last k steps: (last - last_k) / k.
pub fn slope_last(series: &[Decimal], k: usize) -> Option<Decimal> {
    if k == 0 || series.len() <= k {
        return None;
    }
    let last = series[series.len() - 1];
    let earlier = series[series.len() - 1 - k];
    Some((last - earlier) / Decimal::from(k as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sma_requires_full_period() {
        let values = vec![dec!(1), dec!(2), dec!(3)];
        assert_eq!(sma(&values, 4), None);
        assert_eq!(sma(&values, 3), Some(dec!(2)));
        assert_eq!(sma(&values, 2), Some(dec!(2.5)));
    }

    #[test]
    fn slope_over_last_k() {
        let series = vec![dec!(10), dec!(12), dec!(16)];
        assert_eq!(slope_last(&series, 2), Some(dec!(3)));
        assert_eq!(slope_last(&series, 1), Some(dec!(4)));
        assert_eq!(slope_last(&series, 3), None);
    }
}