use rust_decimal::Decimal;

use crate::types::{PaperState, Side, StrategyKind};
use super::TradeLimits;

/// Why an entry was blocked. Rendered into the activity feed; the tags
/// are stable because the dashboard filters on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    PriceOutOfBand(Decimal),
    CircuitBreaker(u32),
    DuplicatePosition,
    DailyLossLimit,
    StopLossCooldown,
    EntryDebounce,
    CapacityReached,
    InsufficientBalance,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::PriceOutOfBand(price) => {
                write!(f, "Entry price {price} outside band")
            }
            BlockReason::CircuitBreaker(losses) => {
                write!(f, "Circuit breaker ({losses} consecutive losses)")
            }
            BlockReason::DuplicatePosition => write!(f, "Duplicate position"),
            BlockReason::DailyLossLimit => write!(f, "Daily Loss Limit (%)"),
            BlockReason::StopLossCooldown => write!(f, "Stop-loss cooldown"),
            BlockReason::EntryDebounce => write!(f, "Entry cooldown"),
            BlockReason::CapacityReached => write!(f, "Max concurrent positions"),
            BlockReason::InsufficientBalance => write!(f, "Insufficient balance"),
        }
    }
}

/// Stateless entry gating. Checks run in a fixed order and the first
/// failure wins; the flip-flop close and sizing happen between
/// `pre_entry` and `check_balance` in the paper trader.
pub struct EntryGuard;

impl EntryGuard {
    /// Gates that do not depend on the stake. `side` and `strategy`
    /// identify the incoming signal for the duplicate check.
    pub fn pre_entry(
        state: &PaperState,
        limits: &TradeLimits,
        slug: &str,
        side: Side,
        strategy: StrategyKind,
        entry_price: Decimal,
        now_ms: i64,
    ) -> Result<(), BlockReason> {
        if entry_price < limits.min_entry_price || entry_price > limits.max_entry_price {
            return Err(BlockReason::PriceOutOfBand(entry_price));
        }

        if state.consecutive_losses >= limits.max_consecutive_losses {
            return Err(BlockReason::CircuitBreaker(state.consecutive_losses));
        }

        let duplicate = state
            .positions_for(slug)
            .any(|p| p.side == side && p.strategy == strategy);
        if duplicate {
            return Err(BlockReason::DuplicatePosition);
        }

        let cap = state.balance * limits.daily_loss_limit_pct / Decimal::from(100);
        if state.daily_loss >= cap {
            return Err(BlockReason::DailyLossLimit);
        }

        if let Some(sl_time) = state.last_stop_loss_time {
            if now_ms - sl_time < limits.cooldown_minutes * 60_000 {
                return Err(BlockReason::StopLossCooldown);
            }
        }

        if let Some(entry_time) = state.last_entry_time {
            if now_ms - entry_time < limits.entry_cooldown_seconds * 1000 {
                return Err(BlockReason::EntryDebounce);
            }
        }

        Ok(())
    }

    /// Per-market capacity, applied after any flip close has freed the
    /// opposite side.
    pub fn check_capacity(
        state: &PaperState,
        limits: &TradeLimits,
        slug: &str,
    ) -> Result<(), BlockReason> {
        if state.positions_for(slug).count() >= limits.max_concurrent_positions {
            return Err(BlockReason::CapacityReached);
        }
        Ok(())
    }

    pub fn check_balance(
        balance: Decimal,
        stake: Decimal,
        fee: Decimal,
    ) -> Result<(), BlockReason> {
        if balance < stake + fee {
            return Err(BlockReason::InsufficientBalance);
        }
        Ok(())
    }
}
