#![allow(dead_code)]
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Numeric trade policy for the paper trader and evaluator. Defaults
/// mirror the shipped configuration; every field can be overridden
/// through the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeLimits {
    /// Hard stop: close when ROI falls to or below this (percent,
    /// negative).
    pub stop_loss_roi_pct: Decimal,
    /// Fallback take-profit ROI for strategies without their own rule.
    pub take_profit_roi_pct: Decimal,
    /// Momentum-specific take-profit ROI.
    pub momentum_take_profit_roi_pct: Decimal,
    pub max_concurrent_positions: usize,
    /// Daily loss cap as a percent of balance.
    pub daily_loss_limit_pct: Decimal,
    pub entry_cooldown_seconds: i64,
    pub stop_loss_grace_period_seconds: i64,
    /// Minutes to stay out after a stop-loss.
    pub cooldown_minutes: i64,
    pub min_entry_price: Decimal,
    pub max_entry_price: Decimal,
    pub max_consecutive_losses: u32,
    /// Token price at or below which a position counts as effectively
    /// resolved against us; the time guard stops paying exit fees on
    /// those.
    pub resolution_threshold: Decimal,
    /// Time-guard threshold in minutes for non-late-window strategies.
    pub time_guard_minutes: Decimal,
    /// Late-window positions are given a shorter leash.
    pub late_window_guard_minutes: Decimal,
    pub use_kelly: bool,
    /// Conservatism multiplier applied to the raw Kelly fraction.
    pub kelly_fraction: Decimal,
    pub min_kelly_bet: Decimal,
    pub max_kelly_bet: Decimal,
    pub use_polymarket_dynamic_fees: bool,
    /// Flat fee percent when dynamic fees are off.
    pub fee_pct: Decimal,
    /// Minimum odds edge required before entering against the market.
    pub min_odds_edge: Decimal,
    /// Fallback fixed stake.
    pub min_bet: Decimal,
    /// Market metadata cache lifetime for the snapshot assembler.
    pub heavy_fetch_interval_ms: i64,
}

impl Default for TradeLimits {
    fn default() -> Self {
        Self {
            stop_loss_roi_pct: dec!(-40),
            take_profit_roi_pct: dec!(80),
            momentum_take_profit_roi_pct: dec!(50),
            max_concurrent_positions: 2,
            daily_loss_limit_pct: dec!(30),
            entry_cooldown_seconds: 30,
            stop_loss_grace_period_seconds: 15,
            cooldown_minutes: 5,
            min_entry_price: dec!(0.10),
            max_entry_price: dec!(0.90),
            max_consecutive_losses: 4,
            resolution_threshold: dec!(0.05),
            time_guard_minutes: dec!(2),
            late_window_guard_minutes: dec!(0.5),
            use_kelly: false,
            kelly_fraction: dec!(0.5),
            min_kelly_bet: dec!(3),
            max_kelly_bet: dec!(5),
            use_polymarket_dynamic_fees: true,
            fee_pct: dec!(1),
            min_odds_edge: dec!(0.10),
            min_bet: dec!(2),
            heavy_fetch_interval_ms: 30_000,
        }
    }
}

impl TradeLimits {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.stop_loss_roi_pct >= Decimal::ZERO {
            errors.push("stop_loss_roi_pct must be negative".to_string());
        }
        if self.min_entry_price <= Decimal::ZERO
            || self.max_entry_price >= Decimal::ONE
            || self.min_entry_price >= self.max_entry_price
        {
            errors.push("entry price band must satisfy 0 < min < max < 1".to_string());
        }
        if self.max_concurrent_positions == 0 {
            errors.push("max_concurrent_positions must be > 0".to_string());
        }
        if self.daily_loss_limit_pct <= Decimal::ZERO
            || self.daily_loss_limit_pct > dec!(100)
        {
            errors.push("daily_loss_limit_pct must be between 0 and 100".to_string());
        }
        if self.kelly_fraction <= Decimal::ZERO || self.kelly_fraction > Decimal::ONE {
            errors.push("kelly_fraction must be in (0, 1]".to_string());
        }
        if self.min_kelly_bet > self.max_kelly_bet {
            errors.push("min_kelly_bet must not exceed max_kelly_bet".to_string());
        }
        if self.resolution_threshold <= Decimal::ZERO
            || self.resolution_threshold >= Decimal::ONE
        {
            errors.push("resolution_threshold must be in (0, 1)".to_string());
        }
        if self.min_odds_edge < Decimal::ZERO || self.min_odds_edge >= Decimal::ONE {
            errors.push("min_odds_edge must be in [0, 1)".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Time-guard threshold for a given strategy tag.
    pub fn guard_minutes_for(&self, strategy: crate::types::StrategyKind) -> Decimal {
        match strategy {
            crate::types::StrategyKind::LateWindow => self.late_window_guard_minutes,
            _ => self.time_guard_minutes,
        }
    }
}
