use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

use crate::persistence::StateStore;
use crate::risk::{BlockReason, EntryGuard, TradeLimits};
use crate::types::{
    Market, PaperState, Position, Recommendation, Side, SideQuotes, StrategyKind,
    TradeOutcome, Trend,
};

/// Exit reasons are plain strings on the wire; these constants keep
/// the spellings in one place. `lastStopLossTime` keys off the
/// STOP_LOSS substring.
pub const REASON_STOP_LOSS: &str = "STOP_LOSS";
pub const REASON_TIME_GUARD: &str = "TIME_GUARD";
pub const REASON_FLIP_CLOSE: &str = "FLIP_CLOSE";
pub const REASON_TP_MOMENTUM: &str = "TAKE_PROFIT_MOMENTUM";
pub const REASON_TP_MEAN_REVERSION: &str = "TAKE_PROFIT_MEAN_REVERSION";
pub const REASON_TIME_STOP_MEAN_REVERSION: &str = "TIME_STOP_MEAN_REVERSION";
pub const REASON_TP_FALLBACK: &str = "TAKE_PROFIT";
pub const REASON_EXPIRY_WIN: &str = "EXPIRY_WIN";
pub const REASON_EXPIRY_LOSS: &str = "EXPIRY_LOSS";

/// Mean-reversion's legacy time stop, in minutes.
const MEAN_REVERSION_TIME_STOP_MIN: Decimal = dec!(3);

/// Everything one paper-trader pass needs from the slow tick.
pub struct TickContext<'a> {
    pub rec: &'a Recommendation,
    pub quotes: SideQuotes,
    pub market: Option<&'a Market>,
    pub spot: Option<Decimal>,
    pub strike: Option<Decimal>,
    pub trend: Option<Trend>,
    pub time_left_min: Decimal,
    pub now_ms: i64,
}

#[derive(Debug, Clone)]
pub struct ClosedTrade {
    pub position: Position,
    pub exit_price: Decimal,
    pub fee: Decimal,
    pub proceeds: Decimal,
    pub pnl: Decimal,
    pub reason: String,
    pub outcome: TradeOutcome,
}

#[derive(Debug, Clone)]
pub struct OpenedTrade {
    pub position: Position,
    pub stake: Decimal,
    pub fee: Decimal,
}

/// What one tick did, for the activity feed and the trade log.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub daily_reset: bool,
    pub closed: Vec<ClosedTrade>,
    pub opened: Option<OpenedTrade>,
    pub blocked: Option<BlockReason>,
}

impl TickOutcome {
    pub fn changed_state(&self) -> bool {
        self.daily_reset || !self.closed.is_empty() || self.opened.is_some()
    }
}

/// Simulated position lifecycle over live odds: settlement, exits,
/// gated entries, fees, and daily risk accounting. Owns the persisted
/// state and writes it back after every mutating tick.
pub struct PaperTrader {
    state: PaperState,
    limits: TradeLimits,
    store: StateStore,
}

impl PaperTrader {
    pub fn new(state: PaperState, limits: TradeLimits, store: StateStore) -> Self {
        Self {
            state,
            limits,
            store,
        }
    }

    pub fn state(&self) -> &PaperState {
        &self.state
    }

    pub fn limits(&self) -> &TradeLimits {
        &self.limits
    }

    /// Fee for trading `notional` dollars of a token priced `p`.
    pub fn fee_for(&self, notional: Decimal, price: Decimal) -> Decimal {
        if self.limits.use_polymarket_dynamic_fees {
            let spread = price * (Decimal::ONE - price);
            notional * dec!(0.25) * spread * spread
        } else {
            notional * self.limits.fee_pct / Decimal::from(100)
        }
    }

    /// Stake for an accepted recommendation at the given entry price.
    pub fn stake_for(&self, rec: &Recommendation, entry_price: Decimal) -> Decimal {
        if self.limits.use_kelly {
            if let Some(p) = rec.probability {
                let denominator = Decimal::ONE - entry_price;
                if denominator > Decimal::ZERO {
                    let kelly = (p - entry_price) / denominator;
                    let raw = self.state.balance * self.limits.kelly_fraction * kelly;
                    return raw.clamp(self.limits.min_kelly_bet, self.limits.max_kelly_bet);
                }
            }
        }
        match rec.strategy {
            Some(StrategyKind::LateWindow) => dec!(5),
            Some(StrategyKind::Momentum) => dec!(4),
            Some(StrategyKind::MeanReversion) => dec!(3),
            _ => self.limits.min_bet,
        }
    }

    /// Sum of open-position mark-to-market pnl against live quotes.
    /// Positions with no quote are carried at cost.
    pub fn unrealized_pnl(&self, quotes: &SideQuotes) -> Decimal {
        self.state
            .positions
            .iter()
            .filter_map(|p| quotes.for_side(p.side).map(|price| p.unrealized_pnl(price)))
            .sum()
    }

    pub fn equity(&self, quotes: &SideQuotes) -> Decimal {
        self.state.balance
            + self
                .state
                .positions
                .iter()
                .map(|p| {
                    quotes
                        .for_side(p.side)
                        .map(|price| p.value_at(price))
                        .unwrap_or(p.amount)
                })
                .sum::<Decimal>()
    }

    /// One slow-tick pass: daily reset, settlement, exits, then entry.
    /// Exits always run before the entry so a flip liquidates first.
    pub fn tick(&mut self, ctx: &TickContext) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        let now = Utc
            .timestamp_millis_opt(ctx.now_ms)
            .single()
            .unwrap_or_else(Utc::now);
        outcome.daily_reset = self.state.maybe_daily_reset(now);

        outcome.closed.extend(self.settle_expired(ctx));
        outcome.closed.extend(self.scan_exits(ctx));

        if ctx.rec.is_enter() {
            let (opened, blocked, flip_closed) = self.try_enter(ctx);
            outcome.closed.extend(flip_closed);
            outcome.opened = opened;
            outcome.blocked = blocked;
        }

        if outcome.changed_state() {
            if let Err(e) = self.store.save(&self.state) {
                warn!("State save failed, continuing in-memory: {e:#}");
            }
        }

        outcome
    }

    /// Close and remove the position at `idx`.
    fn close_at(
        &mut self,
        idx: usize,
        exit_price: Decimal,
        fee: Decimal,
        reason: &str,
        now_ms: i64,
    ) -> ClosedTrade {
        let position = self.state.positions.remove(idx);
        let proceeds = (position.value_at(exit_price) - fee).max(Decimal::ZERO);
        let pnl = proceeds - position.amount;
        let outcome = if pnl > Decimal::ZERO {
            TradeOutcome::Win
        } else {
            TradeOutcome::Loss
        };

        self.state.balance += proceeds;
        self.state.book_daily(pnl);
        self.state.record_result(outcome);
        self.state.last_exit_time = Some(now_ms);
        if reason.contains(REASON_STOP_LOSS) {
            self.state.last_stop_loss_time = Some(now_ms);
        }

        info!(
            "Closed {} {} @ {} ({}): pnl {:.2}, balance {:.2}",
            position.side, position.market_slug, exit_price, reason, pnl, self.state.balance
        );

        ClosedTrade {
            position,
            exit_price,
            fee,
            proceeds,
            pnl,
            reason: reason.to_string(),
            outcome,
        }
    }

    /// Settle positions whose market has expired. Resolution needs
    /// both a strike and a spot; without them the position is held
    /// for a later tick.
    fn settle_expired(&mut self, ctx: &TickContext) -> Vec<ClosedTrade> {
        let Some(spot) = ctx.spot else {
            return Vec::new();
        };
        let current_slug = ctx.market.map(|m| m.slug.as_str());

        let mut closed = Vec::new();
        let mut idx = 0;
        while idx < self.state.positions.len() {
            let position = &self.state.positions[idx];
            let expired = ctx.now_ms >= position.end_date_ms
                || (Some(position.market_slug.as_str()) == current_slug
                    && ctx.time_left_min <= Decimal::ZERO);
            let strike = position.strike_price.or(ctx.strike);

            match (expired, strike) {
                (true, Some(strike)) => {
                    let won = match position.side {
                        Side::Up => spot >= strike,
                        Side::Down => spot < strike,
                    };
                    let (price, reason) = if won {
                        (Decimal::ONE, REASON_EXPIRY_WIN)
                    } else {
                        (Decimal::ZERO, REASON_EXPIRY_LOSS)
                    };
                    // Settlement pays out at resolution, no exit fee.
                    closed.push(self.close_at(idx, price, Decimal::ZERO, reason, ctx.now_ms));
                }
                _ => idx += 1,
            }
        }
        closed
    }

    /// Exit rules for open positions of the current market, in
    /// priority order: time guard, hard stop, take profit.
    fn scan_exits(&mut self, ctx: &TickContext) -> Vec<ClosedTrade> {
        let Some(market) = ctx.market else {
            return Vec::new();
        };
        let slug = market.slug.clone();

        let mut closed = Vec::new();
        let mut idx = 0;
        while idx < self.state.positions.len() {
            if self.state.positions[idx].market_slug != slug {
                idx += 1;
                continue;
            }
            let Some(price) = ctx.quotes.for_side(self.state.positions[idx].side) else {
                idx += 1;
                continue;
            };

            {
                let position = &mut self.state.positions[idx];
                if !position.hit_breakeven_trigger && price > position.entry_price {
                    position.hit_breakeven_trigger = true;
                }
            }
            let position = &self.state.positions[idx];

            if let Some(reason) = self.exit_reason(position, price, ctx) {
                let fee = self.fee_for(position.value_at(price), price);
                closed.push(self.close_at(idx, price, fee, &reason, ctx.now_ms));
            } else {
                idx += 1;
            }
        }
        closed
    }

    fn exit_reason(
        &self,
        position: &Position,
        price: Decimal,
        ctx: &TickContext,
    ) -> Option<String> {
        let roi = position.roi_pct(price);

        // Time guard: near expiry, dump positions in the murky middle.
        // Held back when the position is favored, still hopeful with
        // the trend behind it, or already a near-certain loss where
        // exiting only donates the fee.
        let guard = self.limits.guard_minutes_for(position.strategy);
        if ctx.time_left_min <= guard {
            let favored = price > dec!(0.50);
            let hopeful = price > dec!(0.20)
                && ctx.trend.map(|t| t.matches(position.side)).unwrap_or(false);
            let near_loss = price <= self.limits.resolution_threshold;
            if !favored && !hopeful && !near_loss {
                return Some(REASON_TIME_GUARD.to_string());
            }
        }

        // Hard stop-loss, once the entry grace period has passed.
        if roi <= self.limits.stop_loss_roi_pct
            && position.age_seconds(ctx.now_ms) >= self.limits.stop_loss_grace_period_seconds
        {
            return Some(REASON_STOP_LOSS.to_string());
        }

        match position.strategy {
            StrategyKind::Momentum => {
                if roi >= self.limits.momentum_take_profit_roi_pct {
                    return Some(REASON_TP_MOMENTUM.to_string());
                }
            }
            StrategyKind::MeanReversion => {
                if price >= dec!(0.50) {
                    return Some(REASON_TP_MEAN_REVERSION.to_string());
                }
                if ctx.time_left_min <= MEAN_REVERSION_TIME_STOP_MIN {
                    return Some(REASON_TIME_STOP_MEAN_REVERSION.to_string());
                }
            }
            StrategyKind::LateWindow => {
                // Rides to expiry.
            }
            StrategyKind::Sniper => {
                if roi >= self.limits.take_profit_roi_pct {
                    return Some(REASON_TP_FALLBACK.to_string());
                }
            }
        }

        None
    }

    fn try_enter(
        &mut self,
        ctx: &TickContext,
    ) -> (Option<OpenedTrade>, Option<BlockReason>, Vec<ClosedTrade>) {
        let (Some(side), Some(strategy)) = (ctx.rec.side, ctx.rec.strategy) else {
            return (None, None, Vec::new());
        };
        let Some(market) = ctx.market else {
            debug!("Entry signal with no market selected, skipping");
            return (None, None, Vec::new());
        };
        let Some(entry_price) = ctx.quotes.for_side(side) else {
            debug!("Entry signal with no {side} quote, skipping");
            return (None, None, Vec::new());
        };

        if let Err(reason) = EntryGuard::pre_entry(
            &self.state,
            &self.limits,
            &market.slug,
            side,
            strategy,
            entry_price,
            ctx.now_ms,
        ) {
            return (None, Some(reason), Vec::new());
        }

        // Flip: liquidate opposite-side exposure before re-entering.
        let mut flip_closed = Vec::new();
        let mut idx = 0;
        while idx < self.state.positions.len() {
            let position = &self.state.positions[idx];
            if position.market_slug == market.slug && position.side == side.opposite() {
                let price = ctx
                    .quotes
                    .for_side(position.side)
                    .unwrap_or(Decimal::ONE - entry_price);
                let fee = self.fee_for(position.value_at(price), price);
                flip_closed.push(self.close_at(idx, price, fee, REASON_FLIP_CLOSE, ctx.now_ms));
            } else {
                idx += 1;
            }
        }

        if let Err(reason) = EntryGuard::check_capacity(&self.state, &self.limits, &market.slug) {
            return (None, Some(reason), flip_closed);
        }

        let stake = self.stake_for(ctx.rec, entry_price);
        let fee = self.fee_for(stake, entry_price);
        if let Err(reason) = EntryGuard::check_balance(self.state.balance, stake, fee) {
            return (None, Some(reason), flip_closed);
        }

        let position = Position::open(
            market.slug.clone(),
            side,
            entry_price,
            stake,
            fee,
            ctx.now_ms,
            strategy,
            ctx.strike,
            market.end_date_ms,
        );
        self.state.balance -= stake + fee;
        self.state.last_entry_time = Some(ctx.now_ms);
        info!(
            "Opened {} {} @ {} ({}, stake {:.2}, fee {:.4}), balance {:.2}",
            side, market.slug, entry_price, strategy, stake, fee, self.state.balance
        );
        let opened = OpenedTrade {
            position: position.clone(),
            stake,
            fee,
        };
        self.state.positions.push(position);

        (Some(opened), None, flip_closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, Market};
    use std::collections::HashMap;

    const NOW: i64 = 1_760_000_100_000;

    fn market(slug: &str, end_date_ms: i64) -> Market {
        Market {
            slug: slug.to_string(),
            question: "Bitcoin Up or Down?".to_string(),
            outcomes: vec!["Up".to_string(), "Down".to_string()],
            clob_token_ids: vec!["1".to_string(), "2".to_string()],
            end_date_ms,
            metadata: HashMap::new(),
        }
    }

    fn trader(balance: Decimal) -> (PaperTrader, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let limits = TradeLimits {
            use_polymarket_dynamic_fees: false,
            fee_pct: Decimal::ZERO,
            ..TradeLimits::default()
        };
        (
            PaperTrader::new(PaperState::new(balance), limits, store),
            dir,
        )
    }

    fn enter_rec(side: Side, strategy: StrategyKind) -> Recommendation {
        Recommendation::enter(side, strategy, Confidence::High, "test entry")
    }

    fn no_trade() -> Recommendation {
        Recommendation::no_trade("test")
    }

    fn ctx<'a>(
        rec: &'a Recommendation,
        m: Option<&'a Market>,
        quotes: SideQuotes,
        time_left_min: Decimal,
    ) -> TickContext<'a> {
        TickContext {
            rec,
            quotes,
            market: m,
            spot: Some(dec!(100100)),
            strike: Some(dec!(100000)),
            trend: Some(Trend::Rising),
            time_left_min,
            now_ms: NOW,
        }
    }

    fn open_position(
        trader: &mut PaperTrader,
        m: &Market,
        side: Side,
        strategy: StrategyKind,
        entry_price: Decimal,
    ) -> Position {
        let rec = enter_rec(side, strategy);
        let quotes = match side {
            Side::Up => SideQuotes {
                up: Some(entry_price),
                down: Some(Decimal::ONE - entry_price),
            },
            Side::Down => SideQuotes {
                up: Some(Decimal::ONE - entry_price),
                down: Some(entry_price),
            },
        };
        let outcome = trader.tick(&ctx(&rec, Some(m), quotes, dec!(10)));
        // Clear the debounce so follow-up test entries are not gated.
        trader.state.last_entry_time = None;
        outcome.opened.expect("entry should open").position
    }

    #[test]
    fn entry_books_stake_plus_fee_and_persists() {
        let (mut trader, _dir) = trader(dec!(100));
        trader.limits.use_polymarket_dynamic_fees = true;
        let m = market("btc-1", NOW + 600_000);
        let rec = enter_rec(Side::Up, StrategyKind::Momentum);
        let quotes = SideQuotes {
            up: Some(dec!(0.50)),
            down: Some(dec!(0.50)),
        };

        let outcome = trader.tick(&ctx(&rec, Some(&m), quotes, dec!(10)));
        let opened = outcome.opened.unwrap();
        // Momentum fixed stake $4; dynamic fee at p=0.5 is
        // 4 * 0.25 * (0.25)^2 = 0.0625.
        assert_eq!(opened.stake, dec!(4));
        assert_eq!(opened.fee, dec!(0.0625));
        assert_eq!(opened.position.amount, dec!(4.0625));
        assert_eq!(trader.state().balance, dec!(100) - dec!(4.0625));

        let reloaded = trader.store.load_or_default(Decimal::ZERO);
        assert_eq!(reloaded.positions.len(), 1);
        assert_eq!(reloaded.balance, trader.state().balance);
    }

    #[test]
    fn time_guard_holds_favored_position() {
        let (mut trader, _dir) = trader(dec!(100));
        let m = market("btc-1", NOW + 600_000);
        open_position(&mut trader, &m, Side::Up, StrategyKind::Momentum, dec!(0.55));

        let rec = no_trade();
        let quotes = SideQuotes {
            up: Some(dec!(0.58)),
            down: Some(dec!(0.40)),
        };
        let outcome = trader.tick(&ctx(&rec, Some(&m), quotes, dec!(1.8)));
        assert!(outcome.closed.is_empty());
        assert_eq!(trader.state().positions.len(), 1);
    }

    #[test]
    fn time_guard_dumps_murky_middle() {
        let (mut trader, _dir) = trader(dec!(100));
        let m = market("btc-1", NOW + 600_000);
        open_position(&mut trader, &m, Side::Up, StrategyKind::Momentum, dec!(0.55));

        let rec = no_trade();
        // Price 0.35, trend against the side: neither favored nor
        // hopeful nor a near-loss.
        let quotes = SideQuotes {
            up: Some(dec!(0.35)),
            down: Some(dec!(0.60)),
        };
        let mut c = ctx(&rec, Some(&m), quotes, dec!(1.8));
        c.trend = Some(Trend::Falling);
        // Past the stop-loss grace period but above the stop level.
        let outcome = trader.tick(&c);
        assert_eq!(outcome.closed.len(), 1);
        assert_eq!(outcome.closed[0].reason, REASON_TIME_GUARD);
    }

    #[test]
    fn time_guard_spares_near_loss_dust() {
        let (mut trader, _dir) = trader(dec!(100));
        let m = market("btc-1", NOW + 600_000);
        let pos = open_position(&mut trader, &m, Side::Up, StrategyKind::Momentum, dec!(0.55));
        // Age the position past the grace period, then mark it to dust.
        trader
            .state
            .positions
            .iter_mut()
            .find(|p| p.id == pos.id)
            .unwrap()
            .entry_time_ms = NOW - 60_000;

        let rec = no_trade();
        let quotes = SideQuotes {
            up: Some(dec!(0.04)),
            down: Some(dec!(0.95)),
        };
        let mut c = ctx(&rec, Some(&m), quotes, dec!(1.8));
        c.trend = Some(Trend::Falling);
        let outcome = trader.tick(&c);
        // The guard spares the dust, but the hard stop still applies
        // further down the rule list.
        assert_eq!(outcome.closed.len(), 1);
        assert_eq!(outcome.closed[0].reason, REASON_STOP_LOSS);
    }

    #[test]
    fn stop_loss_respects_grace_period() {
        let (mut trader, _dir) = trader(dec!(100));
        let m = market("btc-1", NOW + 600_000);
        open_position(&mut trader, &m, Side::Up, StrategyKind::Momentum, dec!(0.55));

        let rec = no_trade();
        let quotes = SideQuotes {
            up: Some(dec!(0.30)),
            down: Some(dec!(0.65)),
        };
        // Fresh position (age 0): grace holds the stop back.
        let outcome = trader.tick(&ctx(&rec, Some(&m), quotes, dec!(8)));
        assert!(outcome.closed.is_empty());

        // Age it past the grace period: the stop fires and the
        // cooldown timestamp is recorded.
        trader.state.positions[0].entry_time_ms = NOW - 20_000;
        let outcome = trader.tick(&ctx(&rec, Some(&m), quotes, dec!(8)));
        assert_eq!(outcome.closed.len(), 1);
        assert_eq!(outcome.closed[0].reason, REASON_STOP_LOSS);
        assert_eq!(trader.state().last_stop_loss_time, Some(NOW));
        assert_eq!(trader.state().consecutive_losses, 1);
    }

    #[test]
    fn momentum_take_profit_at_fifty_percent_roi() {
        let (mut trader, _dir) = trader(dec!(100));
        let m = market("btc-1", NOW + 600_000);
        open_position(&mut trader, &m, Side::Up, StrategyKind::Momentum, dec!(0.50));

        let rec = no_trade();
        // Entry 0.50 -> 0.75 is +50% ROI.
        let quotes = SideQuotes {
            up: Some(dec!(0.75)),
            down: Some(dec!(0.22)),
        };
        let outcome = trader.tick(&ctx(&rec, Some(&m), quotes, dec!(8)));
        assert_eq!(outcome.closed.len(), 1);
        assert_eq!(outcome.closed[0].reason, REASON_TP_MOMENTUM);
        assert_eq!(outcome.closed[0].outcome, TradeOutcome::Win);
    }

    #[test]
    fn late_window_holds_to_expiry() {
        let (mut trader, _dir) = trader(dec!(100));
        let m = market("btc-1", NOW + 600_000);
        open_position(&mut trader, &m, Side::Up, StrategyKind::LateWindow, dec!(0.50));

        let rec = no_trade();
        let quotes = SideQuotes {
            up: Some(dec!(0.90)),
            down: Some(dec!(0.08)),
        };
        // Deep in profit and inside the generic guard window, but the
        // late-window play rides (price favored, and no TP rule).
        let outcome = trader.tick(&ctx(&rec, Some(&m), quotes, dec!(0.4)));
        assert!(outcome.closed.is_empty());
    }

    #[test]
    fn mean_reversion_legacy_exits_still_work() {
        let (mut trader, _dir) = trader(dec!(100));
        let m = market("btc-1", NOW + 600_000);
        // Positions opened under the retired strategy come from old
        // state files; simulate one directly.
        trader.state.positions.push(Position::open(
            "btc-1".to_string(),
            Side::Up,
            dec!(0.40),
            dec!(3),
            Decimal::ZERO,
            NOW - 120_000,
            StrategyKind::MeanReversion,
            Some(dec!(100000)),
            NOW + 600_000,
        ));

        let rec = no_trade();
        let quotes = SideQuotes {
            up: Some(dec!(0.52)),
            down: Some(dec!(0.46)),
        };
        let outcome = trader.tick(&ctx(&rec, Some(&m), quotes, dec!(8)));
        assert_eq!(outcome.closed.len(), 1);
        assert_eq!(outcome.closed[0].reason, REASON_TP_MEAN_REVERSION);

        // Time stop below three minutes when not yet at 0.50.
        trader.state.positions.push(Position::open(
            "btc-1".to_string(),
            Side::Up,
            dec!(0.40),
            dec!(3),
            Decimal::ZERO,
            NOW - 120_000,
            StrategyKind::MeanReversion,
            Some(dec!(100000)),
            NOW + 600_000,
        ));
        let quotes = SideQuotes {
            up: Some(dec!(0.42)),
            down: Some(dec!(0.56)),
        };
        let outcome = trader.tick(&ctx(&rec, Some(&m), quotes, dec!(2.5)));
        assert_eq!(outcome.closed.len(), 1);
        assert_eq!(outcome.closed[0].reason, REASON_TIME_STOP_MEAN_REVERSION);
    }

    #[test]
    fn expiry_settlement_pays_out_at_one_with_no_fee() {
        let (mut trader, _dir) = trader(dec!(100));
        let m = market("btc-1", NOW + 600_000);
        let pos = open_position(&mut trader, &m, Side::Up, StrategyKind::Momentum, dec!(0.45));
        let balance_after_entry = trader.state().balance;
        trader.state.consecutive_losses = 2;

        let rec = no_trade();
        let quotes = SideQuotes::default();
        let mut c = ctx(&rec, Some(&m), quotes, Decimal::ZERO);
        c.spot = Some(dec!(100050));
        c.strike = Some(dec!(100000));
        let outcome = trader.tick(&c);

        assert_eq!(outcome.closed.len(), 1);
        let closed = &outcome.closed[0];
        assert_eq!(closed.reason, REASON_EXPIRY_WIN);
        assert_eq!(closed.exit_price, Decimal::ONE);
        assert_eq!(closed.fee, Decimal::ZERO);
        assert_eq!(closed.pnl, pos.shares - pos.amount);
        assert_eq!(closed.outcome, TradeOutcome::Win);
        assert_eq!(trader.state().consecutive_losses, 0);
        assert_eq!(trader.state().balance, balance_after_entry + pos.shares);
    }

    #[test]
    fn expiry_settlement_down_side_loses_at_zero() {
        let (mut trader, _dir) = trader(dec!(100));
        let m = market("btc-1", NOW + 600_000);
        open_position(&mut trader, &m, Side::Down, StrategyKind::Momentum, dec!(0.45));

        let rec = no_trade();
        let mut c = ctx(&rec, Some(&m), SideQuotes::default(), Decimal::ZERO);
        // Spot exactly at the strike resolves UP.
        c.spot = Some(dec!(100000));
        let outcome = trader.tick(&c);
        assert_eq!(outcome.closed[0].reason, REASON_EXPIRY_LOSS);
        assert_eq!(outcome.closed[0].proceeds, Decimal::ZERO);
        assert_eq!(outcome.closed[0].outcome, TradeOutcome::Loss);
        assert_eq!(trader.state().daily_loss, outcome.closed[0].pnl.abs());
    }

    #[test]
    fn daily_loss_cap_blocks_entry() {
        let (mut trader, _dir) = trader(dec!(100));
        trader.state.daily_loss = dec!(30.01);
        let m = market("btc-1", NOW + 600_000);

        let rec = enter_rec(Side::Up, StrategyKind::Momentum);
        let quotes = SideQuotes {
            up: Some(dec!(0.60)),
            down: Some(dec!(0.38)),
        };
        let outcome = trader.tick(&ctx(&rec, Some(&m), quotes, dec!(10)));
        assert!(outcome.opened.is_none());
        assert_eq!(
            outcome.blocked.unwrap().to_string(),
            "Daily Loss Limit (%)"
        );
    }

    #[test]
    fn kelly_sizing_clamps_to_bounds() {
        let (mut trader, _dir) = trader(dec!(100));
        trader.limits.use_kelly = true;

        let rec = Recommendation {
            probability: Some(dec!(0.70)),
            ..enter_rec(Side::Up, StrategyKind::Momentum)
        };
        // f_k = (0.70 - 0.50) / 0.50 = 0.40; raw = 100 * 0.5 * 0.40 = 20.
        assert_eq!(trader.stake_for(&rec, dec!(0.50)), dec!(5));

        // Tiny edge clamps up to the floor.
        let rec = Recommendation {
            probability: Some(dec!(0.51)),
            ..enter_rec(Side::Up, StrategyKind::Momentum)
        };
        assert_eq!(trader.stake_for(&rec, dec!(0.50)), dec!(3));

        // Without a probability the fixed schedule applies.
        let rec = enter_rec(Side::Up, StrategyKind::LateWindow);
        assert_eq!(trader.stake_for(&rec, dec!(0.50)), dec!(5));
        let rec = enter_rec(Side::Up, StrategyKind::Sniper);
        assert_eq!(trader.stake_for(&rec, dec!(0.50)), trader.limits().min_bet);
    }

    #[test]
    fn flip_closes_opposite_side_then_opens() {
        let (mut trader, _dir) = trader(dec!(100));
        let m = market("btc-1", NOW + 600_000);
        open_position(&mut trader, &m, Side::Down, StrategyKind::Momentum, dec!(0.55));

        let rec = enter_rec(Side::Up, StrategyKind::Momentum);
        let quotes = SideQuotes {
            up: Some(dec!(0.60)),
            down: Some(dec!(0.38)),
        };
        let outcome = trader.tick(&ctx(&rec, Some(&m), quotes, dec!(10)));

        assert_eq!(outcome.closed.len(), 1);
        assert_eq!(outcome.closed[0].reason, REASON_FLIP_CLOSE);
        let opened = outcome.opened.unwrap();
        assert_eq!(opened.position.side, Side::Up);
        // No opposite-side positions remain.
        assert!(trader
            .state()
            .positions_for("btc-1")
            .all(|p| p.side == Side::Up));
    }

    #[test]
    fn capacity_cap_blocks_third_position() {
        let (mut trader, _dir) = trader(dec!(100));
        let m = market("btc-1", NOW + 600_000);
        open_position(&mut trader, &m, Side::Up, StrategyKind::Momentum, dec!(0.55));
        open_position(&mut trader, &m, Side::Up, StrategyKind::Sniper, dec!(0.55));

        let rec = enter_rec(Side::Up, StrategyKind::LateWindow);
        let quotes = SideQuotes {
            up: Some(dec!(0.55)),
            down: Some(dec!(0.42)),
        };
        let outcome = trader.tick(&ctx(&rec, Some(&m), quotes, dec!(10)));
        assert!(outcome.opened.is_none());
        assert_eq!(outcome.blocked, Some(BlockReason::CapacityReached));
        assert_eq!(trader.state().positions_for("btc-1").count(), 2);
    }

    #[test]
    fn position_conservation_across_open_and_close() {
        let (mut trader, _dir) = trader(dec!(100));
        trader.limits.use_polymarket_dynamic_fees = true;
        let m = market("btc-1", NOW + 600_000);
        let pos = open_position(&mut trader, &m, Side::Up, StrategyKind::Momentum, dec!(0.50));

        // Open-side conservation: balance dropped by exactly amount.
        assert_eq!(trader.state().balance, dec!(100) - pos.amount);

        let rec = no_trade();
        let quotes = SideQuotes {
            up: Some(dec!(0.80)),
            down: Some(dec!(0.18)),
        };
        let before = trader.state().balance;
        let outcome = trader.tick(&ctx(&rec, Some(&m), quotes, dec!(8)));
        let closed = &outcome.closed[0];
        // Close-side conservation: balance rose by exactly the
        // proceeds, which are value minus the exit fee.
        assert_eq!(trader.state().balance, before + closed.proceeds);
        assert_eq!(closed.proceeds, pos.shares * dec!(0.80) - closed.fee);
    }

    #[test]
    fn daily_reset_happens_before_gating() {
        let (mut trader, _dir) = trader(dec!(100));
        trader.state.daily_loss = dec!(99);
        trader.state.last_daily_reset =
            chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let m = market("btc-1", NOW + 600_000);

        let rec = enter_rec(Side::Up, StrategyKind::Momentum);
        let quotes = SideQuotes {
            up: Some(dec!(0.60)),
            down: Some(dec!(0.38)),
        };
        let outcome = trader.tick(&ctx(&rec, Some(&m), quotes, dec!(10)));
        assert!(outcome.daily_reset);
        // The stale daily loss no longer blocks the entry.
        assert!(outcome.opened.is_some());
        assert_eq!(trader.state().daily_loss, Decimal::ZERO);
    }

    #[test]
    fn breakeven_trigger_arms_once() {
        let (mut trader, _dir) = trader(dec!(100));
        let m = market("btc-1", NOW + 600_000);
        open_position(&mut trader, &m, Side::Up, StrategyKind::LateWindow, dec!(0.50));
        assert!(!trader.state().positions[0].hit_breakeven_trigger);

        let rec = no_trade();
        let quotes = SideQuotes {
            up: Some(dec!(0.55)),
            down: Some(dec!(0.43)),
        };
        trader.tick(&ctx(&rec, Some(&m), quotes, dec!(8)));
        assert!(trader.state().positions[0].hit_breakeven_trigger);
    }
}
