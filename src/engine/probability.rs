use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::indicators::{slope_last, HaColor};
use crate::types::{ProbEstimate, SideQuotes, WINDOW_MINUTES};

use super::snapshot::Snapshot;

/// Heuristic win-probability scorer carried over from the original
/// sizing path. Converts spot/VWAP/RSI/MACD/Heiken-Ashi into a raw
/// up-probability, then sharpens it as expiry approaches: the less
/// time remains, the less likely the current side of the strike flips.
pub fn estimate(snapshot: &Snapshot, quotes: &SideQuotes) -> Option<ProbEstimate> {
    let ind = &snapshot.indicators;
    let vwap = ind.vwap?;
    let rsi = ind.rsi?;
    let macd = ind.macd.as_ref()?;
    let heiken = ind.heiken.as_ref()?;

    let mut raw_up = dec!(0.5);

    // Price location vs the rolling VWAP.
    raw_up += if snapshot.spot > vwap { dec!(0.12) } else { dec!(-0.12) };

    // VWAP slope over the last five steps.
    if let Some(slope) = slope_last(&ind.vwap_series, 5) {
        if slope > Decimal::ZERO {
            raw_up += dec!(0.05);
        } else if slope < Decimal::ZERO {
            raw_up -= dec!(0.05);
        }
    }

    // RSI distance from the midline, scaled to +/- 0.15.
    raw_up += (rsi - dec!(50)) / dec!(100) * dec!(0.30);

    // MACD histogram sign, with a bonus for monotonic growth.
    if macd.hist > Decimal::ZERO {
        raw_up += dec!(0.06);
        if macd.growing_up() {
            raw_up += dec!(0.04);
        }
    } else if macd.hist < Decimal::ZERO {
        raw_up -= dec!(0.06);
        if macd.growing_down() {
            raw_up -= dec!(0.04);
        }
    }

    // Heiken-Ashi streak, capped so long runs saturate.
    let streak = Decimal::from(heiken.run.min(5) as u32) * dec!(0.02);
    match heiken.color {
        HaColor::Green => raw_up += streak,
        HaColor::Red => raw_up -= streak,
    }

    let raw_up = raw_up.clamp(dec!(0.05), dec!(0.95));

    // Time-aware sharpening: pull away from 0.5 as expiry nears.
    let elapsed = (Decimal::from(WINDOW_MINUTES) - snapshot.time_left_min)
        .clamp(Decimal::ZERO, Decimal::from(WINDOW_MINUTES));
    let factor = Decimal::ONE + elapsed / dec!(30);
    let adjusted_up =
        (dec!(0.5) + (raw_up - dec!(0.5)) * factor).clamp(dec!(0.02), dec!(0.98));
    let adjusted_down = Decimal::ONE - adjusted_up;

    let edge_up = quotes
        .up
        .map(|odds| adjusted_up - odds)
        .unwrap_or(Decimal::ZERO);
    let edge_down = quotes
        .down
        .map(|odds| adjusted_down - odds)
        .unwrap_or(Decimal::ZERO);

    Some(ProbEstimate {
        up: adjusted_up,
        down: adjusted_down,
        edge_up,
        edge_down,
    })
}
