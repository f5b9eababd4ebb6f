#![allow(dead_code)]
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use super::{Side, StrategyKind, TradeOutcome};

/// Number of WIN/LOSS results retained for the dashboard streak view.
pub const RECENT_RESULTS_CAP: usize = 10;

/// An open paper position on one outcome token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub market_slug: String,
    pub side: Side,
    /// Token price paid at entry, strictly inside (0, 1).
    pub entry_price: Decimal,
    /// Total cost booked at entry: stake plus entry fee.
    pub amount: Decimal,
    /// stake / entry_price.
    pub shares: Decimal,
    pub entry_time_ms: i64,
    pub strategy: StrategyKind,
    pub strike_price: Option<Decimal>,
    pub end_date_ms: i64,
    #[serde(default)]
    pub hit_breakeven_trigger: bool,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        market_slug: String,
        side: Side,
        entry_price: Decimal,
        stake: Decimal,
        fee: Decimal,
        entry_time_ms: i64,
        strategy: StrategyKind,
        strike_price: Option<Decimal>,
        end_date_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            market_slug,
            side,
            entry_price,
            amount: stake + fee,
            shares: stake / entry_price,
            entry_time_ms,
            strategy,
            strike_price,
            end_date_ms,
            hit_breakeven_trigger: false,
        }
    }

    /// Mark-to-market value at the given token price.
    pub fn value_at(&self, price: Decimal) -> Decimal {
        self.shares * price
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.value_at(price) - self.amount
    }

    /// Return on the booked amount, in percent.
    pub fn roi_pct(&self, price: Decimal) -> Decimal {
        if self.amount.is_zero() {
            return Decimal::ZERO;
        }
        self.unrealized_pnl(price) / self.amount * Decimal::from(100)
    }

    pub fn age_seconds(&self, now_ms: i64) -> i64 {
        (now_ms - self.entry_time_ms) / 1000
    }
}

/// The paper trader's full persisted state. Serialized as-is to the
/// JSON state file; the key set is the stable on-disk layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperState {
    pub balance: Decimal,
    pub positions: Vec<Position>,
    /// Net realized loss accumulated today. Wins subtract, losses add;
    /// reset at the UTC day boundary.
    pub daily_loss: Decimal,
    pub last_stop_loss_time: Option<i64>,
    /// Ring of the most recent WIN/LOSS outcomes, newest last.
    pub recent_results: VecDeque<TradeOutcome>,
    pub last_daily_reset: NaiveDate,
    pub last_exit_time: Option<i64>,
    pub last_entry_time: Option<i64>,
    pub consecutive_losses: u32,
}

impl PaperState {
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance,
            positions: Vec::new(),
            daily_loss: Decimal::ZERO,
            last_stop_loss_time: None,
            recent_results: VecDeque::with_capacity(RECENT_RESULTS_CAP),
            last_daily_reset: Utc::now().date_naive(),
            last_exit_time: None,
            last_entry_time: None,
            consecutive_losses: 0,
        }
    }

    /// Apply the UTC daily reset if the calendar day has rolled over.
    /// Returns true when a reset happened.
    pub fn maybe_daily_reset(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        if today != self.last_daily_reset {
            self.daily_loss = Decimal::ZERO;
            self.last_daily_reset = today;
            true
        } else {
            false
        }
    }

    pub fn positions_for<'a>(&'a self, slug: &'a str) -> impl Iterator<Item = &'a Position> + 'a {
        self.positions.iter().filter(move |p| p.market_slug == slug)
    }

    pub fn record_result(&mut self, outcome: TradeOutcome) {
        if self.recent_results.len() >= RECENT_RESULTS_CAP {
            self.recent_results.pop_front();
        }
        self.recent_results.push_back(outcome);
        match outcome {
            TradeOutcome::Win => self.consecutive_losses = 0,
            TradeOutcome::Loss => self.consecutive_losses += 1,
        }
    }

    /// Book a realized pnl into the daily-loss counter. Losses push the
    /// counter up, wins pull it back down.
    pub fn book_daily(&mut self, pnl: Decimal) {
        self.daily_loss += (-pnl).max(Decimal::ZERO) - pnl.max(Decimal::ZERO);
    }

    pub fn recent_wins(&self) -> usize {
        self.recent_results
            .iter()
            .filter(|r| **r == TradeOutcome::Win)
            .count()
    }

    /// Equity = cash balance plus open positions marked at entry. The
    /// orchestrator substitutes live quotes for the UI figure.
    pub fn equity_at_cost(&self) -> Decimal {
        self.balance + self.positions.iter().map(|p| p.amount).sum::<Decimal>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn position(entry_price: Decimal, stake: Decimal, fee: Decimal) -> Position {
        Position::open(
            "btc-test".to_string(),
            Side::Up,
            entry_price,
            stake,
            fee,
            1_000_000,
            StrategyKind::Momentum,
            Some(dec!(100000)),
            1_900_000,
        )
    }

    #[test]
    fn open_books_stake_plus_fee() {
        let pos = position(dec!(0.50), dec!(4), dec!(0.02));
        assert_eq!(pos.amount, dec!(4.02));
        assert_eq!(pos.shares, dec!(8));
    }

    #[test]
    fn roi_and_pnl_track_token_price() {
        let pos = position(dec!(0.50), dec!(4), Decimal::ZERO);
        assert_eq!(pos.unrealized_pnl(dec!(0.75)), dec!(2));
        assert_eq!(pos.roi_pct(dec!(0.75)), dec!(50));
        assert_eq!(pos.roi_pct(dec!(0.25)), dec!(-50));
    }

    #[test]
    fn daily_reset_zeroes_loss_on_new_utc_day() {
        let mut state = PaperState::new(dec!(100));
        state.daily_loss = dec!(12.5);
        state.last_daily_reset = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();

        let next_day = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 5).unwrap();
        assert!(state.maybe_daily_reset(next_day));
        assert_eq!(state.daily_loss, Decimal::ZERO);
        assert_eq!(state.last_daily_reset, next_day.date_naive());

        // Same day again: no-op.
        assert!(!state.maybe_daily_reset(next_day));
    }

    #[test]
    fn recent_results_ring_caps_at_ten() {
        let mut state = PaperState::new(dec!(100));
        for _ in 0..12 {
            state.record_result(TradeOutcome::Loss);
        }
        assert_eq!(state.recent_results.len(), RECENT_RESULTS_CAP);
        assert_eq!(state.consecutive_losses, 12);

        state.record_result(TradeOutcome::Win);
        assert_eq!(state.consecutive_losses, 0);
    }

    #[test]
    fn book_daily_nets_wins_against_losses() {
        let mut state = PaperState::new(dec!(100));
        state.book_daily(dec!(-10));
        assert_eq!(state.daily_loss, dec!(10));
        state.book_daily(dec!(4));
        assert_eq!(state.daily_loss, dec!(6));
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state = PaperState::new(dec!(250));
        state.positions.push(position(dec!(0.40), dec!(5), dec!(0.01)));
        state.record_result(TradeOutcome::Win);

        let json = serde_json::to_string(&state).unwrap();
        let back: PaperState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.balance, state.balance);
        assert_eq!(back.positions.len(), 1);
        assert_eq!(back.positions[0].shares, state.positions[0].shares);
        assert_eq!(back.recent_results, state.recent_results);
    }
}