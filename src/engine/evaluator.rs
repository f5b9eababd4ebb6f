use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::risk::TradeLimits;
use crate::types::{Candle, Confidence, Recommendation, Side, StrategyKind};

use super::probability;
use super::snapshot::{HeikenState, Snapshot};
use crate::indicators::MacdSnapshot;

/// Minimum candle history before any strategy runs.
const MIN_CANDLES: usize = 30;

/// Momentum needs the spot at least this far from the strike.
const MOMENTUM_MIN_GAP: Decimal = dec!(50);
/// Momentum refuses to chase odds at or above this.
const MOMENTUM_ODDS_CAP: Decimal = dec!(0.85);

const LATE_MIN_GAP: Decimal = dec!(300);
/// Mean candle range over the last five minutes must stay below this
/// for the late window to be considered quiet.
const LATE_MAX_MEAN_RANGE: Decimal = dec!(80);
const LATE_MIN_HA_RUN: usize = 5;
const LATE_ODDS_CAP: Decimal = dec!(0.90);

const SNIPER_MIN_GAP: Decimal = dec!(80);
const SNIPER_MIN_HA_RUN: usize = 6;
const SNIPER_ODDS_CAP: Decimal = dec!(0.90);

/// Time buckets, in minutes.
const MOMENTUM_ONLY_ABOVE: Decimal = dec!(2.0);
const SNIPER_FLOOR: Decimal = dec!(0.5);
const LATE_WINDOW_LOW: Decimal = dec!(1.0);
const LATE_WINDOW_HIGH: Decimal = dec!(1.5);

/// Strike and indicator values pulled out once after the precondition
/// check, so the strategy bodies read them directly.
struct Gauges<'a> {
    snapshot: &'a Snapshot,
    strike: Decimal,
    ema21: Decimal,
    rsi: Decimal,
    macd: MacdSnapshot,
    heiken: HeikenState,
}

impl<'a> Gauges<'a> {
    fn extract(snapshot: &'a Snapshot) -> Option<Self> {
        Some(Self {
            snapshot,
            strike: snapshot.strike?,
            ema21: snapshot.indicators.ema21?,
            rsi: snapshot.indicators.rsi?,
            macd: snapshot.indicators.macd?,
            heiken: snapshot.indicators.heiken?,
        })
    }

    fn gap(&self) -> Decimal {
        self.snapshot.spot - self.strike
    }
}

/// Run the time-bucketed strategy tree over one snapshot.
pub fn evaluate(snapshot: &Snapshot, limits: &TradeLimits) -> Recommendation {
    if snapshot.candles.len() < MIN_CANDLES
        || !snapshot.indicators.is_formed()
        || !snapshot.quotes.is_tradeable()
    {
        return Recommendation::no_trade("missing_data");
    }
    let Some(gauges) = Gauges::extract(snapshot) else {
        return Recommendation::no_trade("missing_data");
    };

    let estimate = probability::estimate(snapshot, &snapshot.quotes);
    let finish = |rec: Recommendation| match estimate {
        Some(est) => rec.with_estimate(est),
        None => rec,
    };

    let tlm = snapshot.time_left_min;

    if tlm < SNIPER_FLOOR {
        return finish(Recommendation::no_trade("window_closing"));
    }

    if tlm >= MOMENTUM_ONLY_ABOVE {
        return finish(match momentum(&gauges, limits) {
            Ok(rec) => rec,
            Err(reason) => Recommendation::no_trade(reason),
        });
    }

    // Final two minutes: sniper first, momentum as backup, and the
    // late-window play only when both decline inside its sub-range.
    let mut declines: Vec<String> = Vec::new();

    match sniper(&gauges) {
        Ok(rec) => return finish(rec),
        Err(reason) => declines.push(format!("sniper: {reason}")),
    }
    match momentum(&gauges, limits) {
        Ok(rec) => return finish(rec),
        Err(reason) => declines.push(format!("momentum: {reason}")),
    }
    if tlm >= LATE_WINDOW_LOW && tlm <= LATE_WINDOW_HIGH {
        match late_window(&gauges) {
            Ok(rec) => return finish(rec),
            Err(reason) => declines.push(format!("late_window: {reason}")),
        }
    }

    finish(Recommendation::no_trade(declines.join(" | ")))
}

/// Direction implied by the spot's side of the strike.
fn direction(gap: Decimal) -> Side {
    if gap > Decimal::ZERO {
        Side::Up
    } else {
        Side::Down
    }
}

fn odds_gate(
    snapshot: &Snapshot,
    side: Side,
    cap: Decimal,
) -> Result<Decimal, String> {
    // Quotes were checked present by the precondition.
    let odds = snapshot
        .quotes
        .for_side(side)
        .ok_or_else(|| format!("odds_missing_{}", side.as_lower()))?;
    if odds >= cap {
        return Err(format!("odds_too_high_{}_{}", side.as_lower(), odds));
    }
    Ok(odds)
}

fn momentum(gauges: &Gauges, limits: &TradeLimits) -> Result<Recommendation, String> {
    let gap = gauges.gap();
    if gap.abs() <= MOMENTUM_MIN_GAP {
        return Err(format!("gap_below_threshold_{}", gap.abs()));
    }
    let side = direction(gap);
    let candles = &gauges.snapshot.candles;

    if candles.len() < 2 {
        return Err("not_enough_closed_candles".to_string());
    }
    let last_two: Vec<&Candle> = candles.iter().rev().take(2).collect();
    let aligned = last_two.iter().all(|c| match side {
        Side::Up => c.close > gauges.strike,
        Side::Down => c.close < gauges.strike,
    });
    if !aligned {
        return Err(format!("closes_not_aligned_{}", side.as_lower()));
    }

    let growing = match side {
        Side::Up => gauges.macd.growing_up(),
        Side::Down => gauges.macd.growing_down(),
    };
    if !growing {
        return Err(format!("macd_not_growing_{}", side.as_lower()));
    }

    let ema_ok = match side {
        Side::Up => gauges.snapshot.spot > gauges.ema21,
        Side::Down => gauges.snapshot.spot < gauges.ema21,
    };
    if !ema_ok {
        return Err(format!("spot_vs_ema21_against_{}", side.as_lower()));
    }

    if !gauges.heiken.matches(side) || gauges.heiken.run < 2 {
        return Err(format!("ha_streak_weak_{}", side.as_lower()));
    }

    let rsi_ok = match side {
        Side::Up => gauges.rsi >= dec!(40) && gauges.rsi <= dec!(80),
        Side::Down => gauges.rsi >= dec!(20) && gauges.rsi <= dec!(60),
    };
    if !rsi_ok {
        return Err(format!("rsi_out_of_band_{}", gauges.rsi));
    }

    let entry_cap = MOMENTUM_ODDS_CAP.min(Decimal::ONE - limits.min_odds_edge);
    let odds = odds_gate(gauges.snapshot, side, entry_cap)?;

    Ok(Recommendation::enter(
        side,
        StrategyKind::Momentum,
        Confidence::High,
        format!(
            "momentum {}: gap {}, macd hist {} > {}, ha run {}, rsi {}, odds {}",
            side.as_lower(),
            gap,
            gauges.macd.hist,
            gauges.macd.hist_prev,
            gauges.heiken.run,
            gauges.rsi,
            odds
        ),
    ))
}

fn late_window(gauges: &Gauges) -> Result<Recommendation, String> {
    let gap = gauges.gap();
    if gap.abs() <= LATE_MIN_GAP {
        return Err(format!("gap_below_threshold_{}", gap.abs()));
    }
    let side = direction(gap);
    let candles = &gauges.snapshot.candles;

    let last_five = &candles[candles.len().saturating_sub(5)..];
    if last_five.is_empty() {
        return Err("not_enough_closed_candles".to_string());
    }
    let mean_range: Decimal = last_five.iter().map(|c| c.range()).sum::<Decimal>()
        / Decimal::from(last_five.len() as u32);
    if mean_range > LATE_MAX_MEAN_RANGE {
        return Err(format!("volatility_too_high_{mean_range}"));
    }

    if !gauges.heiken.matches(side) || gauges.heiken.run < LATE_MIN_HA_RUN {
        return Err(format!("ha_streak_weak_{}", side.as_lower()));
    }

    let odds = odds_gate(gauges.snapshot, side, LATE_ODDS_CAP)?;

    Ok(Recommendation::enter(
        side,
        StrategyKind::LateWindow,
        Confidence::VeryHigh,
        format!(
            "late window {}: gap {}, mean range {}, ha run {}, odds {}",
            side.as_lower(),
            gap,
            mean_range,
            gauges.heiken.run,
            odds
        ),
    ))
}

fn sniper(gauges: &Gauges) -> Result<Recommendation, String> {
    let gap = gauges.gap();
    if gap.abs() <= SNIPER_MIN_GAP {
        return Err(format!("gap_below_threshold_{}", gap.abs()));
    }
    let side = direction(gap);

    if !gauges.heiken.matches(side) || gauges.heiken.run < SNIPER_MIN_HA_RUN {
        return Err(format!("ha_streak_weak_{}", side.as_lower()));
    }

    let rsi_ok = match side {
        Side::Up => gauges.rsi > dec!(60),
        Side::Down => gauges.rsi < dec!(40),
    };
    if !rsi_ok {
        return Err(format!("rsi_not_extreme_{}", gauges.rsi));
    }

    let odds = odds_gate(gauges.snapshot, side, SNIPER_ODDS_CAP)?;

    Ok(Recommendation::enter(
        side,
        StrategyKind::Sniper,
        Confidence::Max,
        format!(
            "sniper {}: gap {}, ha run {}, rsi {}, odds {}",
            side.as_lower(),
            gap,
            gauges.heiken.run,
            gauges.rsi,
            odds
        ),
    ))
}
