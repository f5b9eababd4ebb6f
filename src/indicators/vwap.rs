use rust_decimal::Decimal;

use crate::types::Candle;

/// Volume-weighted average price of the supplied window, with typical
/// price (h+l+c)/3. The caller chooses the window; the assembler
/// passes a rolling 60-minute slice.
pub fn session_vwap(candles: &[Candle]) -> Option<Decimal> {
    vwap_series(candles).last().copied()
}

/// Running VWAP at each step of the window, for slope checks.
pub fn vwap_series(candles: &[Candle]) -> Vec<Decimal> {
    let mut out = Vec::with_capacity(candles.len());
    let mut pv_sum = Decimal::ZERO;
    let mut vol_sum = Decimal::ZERO;

    for c in candles {
        pv_sum += c.typical_price() * c.volume;
        vol_sum += c.volume;
        if vol_sum.is_zero() {
            continue;
        }
        out.push(pv_sum / vol_sum);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(high: Decimal, low: Decimal, close: Decimal, volume: Decimal) -> Candle {
        Candle {
            open_time_ms: 0,
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn unit_volumes_average_typical_prices() {
        let candles = vec![
            candle(dec!(102), dec!(98), dec!(100), Decimal::ONE),
            candle(dec!(112), dec!(108), dec!(110), Decimal::ONE),
        ];
        // Typicals are 100 and 110; equal weights give 105.
        assert_eq!(session_vwap(&candles), Some(dec!(105)));
    }

    #[test]
    fn volume_weighting_pulls_toward_heavy_bucket() {
        let candles = vec![
            candle(dec!(102), dec!(98), dec!(100), dec!(3)),
            candle(dec!(112), dec!(108), dec!(110), Decimal::ONE),
        ];
        // (100*3 + 110*1) / 4 = 102.5
        assert_eq!(session_vwap(&candles), Some(dec!(102.5)));
    }

    #[test]
    fn series_is_running_not_final() {
        let candles = vec![
            candle(dec!(102), dec!(98), dec!(100), Decimal::ONE),
            candle(dec!(112), dec!(108), dec!(110), Decimal::ONE),
            candle(dec!(122), dec!(118), dec!(120), Decimal::ONE),
        ];
        let series = vwap_series(&candles);
        assert_eq!(series, vec![dec!(100), dec!(105), dec!(110)]);
    }

    #[test]
    fn empty_window_has_no_value() {
        assert_eq!(session_vwap(&[]), None);
        // Zero-volume fillers alone produce nothing.
        let flat = vec![candle(dec!(100), dec!(100), dec!(100), Decimal::ZERO)];
        assert_eq!(session_vwap(&flat), None);
    }
}
