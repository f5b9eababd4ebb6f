#![allow(dead_code)]
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Side;

pub const WINDOW_MINUTES: i64 = 15;
pub const WINDOW_MS: i64 = WINDOW_MINUTES * 60_000;

/// A Polymarket-style 15-minute binary market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub slug: String,
    pub question: String,
    /// Outcome labels as published, e.g. ["Up", "Down"].
    pub outcomes: Vec<String>,
    /// CLOB token ids, index-aligned with `outcomes`.
    pub clob_token_ids: Vec<String>,
    /// Settlement instant, unix-ms.
    pub end_date_ms: i64,
    /// Raw metadata fields kept for strike search.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Market {
    /// Token id for a side, matched against the outcome labels.
    pub fn token_for(&self, side: Side) -> Option<&str> {
        let wanted = match side {
            Side::Up => "up",
            Side::Down => "down",
        };
        self.outcomes
            .iter()
            .position(|o| o.eq_ignore_ascii_case(wanted) || o.to_lowercase().contains(wanted))
            .and_then(|i| self.clob_token_ids.get(i))
            .map(|s| s.as_str())
    }

    /// Window start implied by the settlement instant.
    pub fn start_ms(&self) -> i64 {
        self.end_date_ms - WINDOW_MS
    }
}

/// Best buy-side prices for the two outcome tokens, each in (0, 1)
/// when present.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SideQuotes {
    pub up: Option<Decimal>,
    pub down: Option<Decimal>,
}

impl SideQuotes {
    pub fn for_side(&self, side: Side) -> Option<Decimal> {
        match side {
            Side::Up => self.up,
            Side::Down => self.down,
        }
    }

    /// Both sides present and strictly inside (0, 1).
    pub fn is_tradeable(&self) -> bool {
        let inside = |p: Decimal| p > Decimal::ZERO && p < Decimal::ONE;
        matches!((self.up, self.down), (Some(u), Some(d)) if inside(u) && inside(d))
    }
}

/// Deterministic 15-minute window arithmetic. When a market carries an
/// end date, that end date defines the true settlement instant and
/// overrides the clock-derived remaining time.
#[derive(Debug, Clone, Copy)]
pub struct MarketClock;

impl MarketClock {
    pub fn window_start_ms(now_ms: i64) -> i64 {
        now_ms.div_euclid(WINDOW_MS) * WINDOW_MS
    }

    pub fn window_end_ms(now_ms: i64) -> i64 {
        Self::window_start_ms(now_ms) + WINDOW_MS
    }

    pub fn elapsed_ms(now_ms: i64) -> i64 {
        now_ms - Self::window_start_ms(now_ms)
    }

    pub fn remaining_ms(now_ms: i64) -> i64 {
        Self::window_end_ms(now_ms) - now_ms
    }

    /// Minutes left before settlement, as a decimal. Negative once the
    /// market's end date has passed.
    pub fn time_left_min(now_ms: i64, market: Option<&Market>) -> Decimal {
        let remaining_ms = match market {
            Some(m) => m.end_date_ms - now_ms,
            None => Self::remaining_ms(now_ms),
        };
        Decimal::from(remaining_ms) / Decimal::from(60_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn market(end_date_ms: i64) -> Market {
        Market {
            slug: "btc-updown-test".to_string(),
            question: "Bitcoin Up or Down?".to_string(),
            outcomes: vec!["Up".to_string(), "Down".to_string()],
            clob_token_ids: vec!["111".to_string(), "222".to_string()],
            end_date_ms,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn window_bounds_align_to_fifteen_minutes() {
        let now = 7 * WINDOW_MS + 123_456;
        assert_eq!(MarketClock::window_start_ms(now), 7 * WINDOW_MS);
        assert_eq!(MarketClock::window_end_ms(now), 8 * WINDOW_MS);
        assert_eq!(
            MarketClock::elapsed_ms(now) + MarketClock::remaining_ms(now),
            WINDOW_MS
        );
    }

    #[test]
    fn market_end_date_overrides_clock() {
        let now = 10 * WINDOW_MS;
        let m = market(now + 90_000);
        assert_eq!(MarketClock::time_left_min(now, Some(&m)), dec!(1.5));
        // Without the market the full window remains.
        assert_eq!(MarketClock::time_left_min(now, None), dec!(15));
    }

    #[test]
    fn time_left_goes_negative_after_expiry() {
        let m = market(1_000_000);
        assert!(MarketClock::time_left_min(1_060_000, Some(&m)) < Decimal::ZERO);
    }

    #[test]
    fn token_lookup_by_outcome_label() {
        let m = market(WINDOW_MS);
        assert_eq!(m.token_for(Side::Up), Some("111"));
        assert_eq!(m.token_for(Side::Down), Some("222"));
    }

    #[test]
    fn quotes_tradeable_requires_both_sides_in_unit_interval() {
        let good = SideQuotes {
            up: Some(dec!(0.55)),
            down: Some(dec!(0.45)),
        };
        assert!(good.is_tradeable());

        let missing = SideQuotes {
            up: Some(dec!(0.55)),
            down: None,
        };
        assert!(!missing.is_tradeable());

        let degenerate = SideQuotes {
            up: Some(dec!(1.0)),
            down: Some(dec!(0.45)),
        };
        assert!(!degenerate.is_tradeable());
    }
}
