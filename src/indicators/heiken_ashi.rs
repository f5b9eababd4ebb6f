use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaColor {
    Green,
    Red,
}

impl HaColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            HaColor::Green => "green",
            HaColor::Red => "red",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HaCandle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl HaCandle {
    /// Green iff HA close >= HA open.
    pub fn color(&self) -> HaColor {
        if self.close >= self.open {
            HaColor::Green
        } else {
            HaColor::Red
        }
    }
}

/// Heiken-Ashi transform of a candle series.
///
/// HA_close = (o+h+l+c)/4, HA_open_t = (HA_open_{t-1} + HA_close_{t-1})/2
/// with HA_open_0 = (o_0+c_0)/2; high/low are the envelope of the raw
/// extreme and both HA body edges.
pub fn heiken_ashi(candles: &[Candle]) -> Vec<HaCandle> {
    let mut out = Vec::with_capacity(candles.len());
    let two = Decimal::from(2);
    let four = Decimal::from(4);

    for (i, c) in candles.iter().enumerate() {
        let ha_close = (c.open + c.high + c.low + c.close) / four;
        let ha_open = if i == 0 {
            (c.open + c.close) / two
        } else {
            let prev: &HaCandle = &out[i - 1];
            (prev.open + prev.close) / two
        };
        out.push(HaCandle {
            open: ha_open,
            high: c.high.max(ha_open).max(ha_close),
            low: c.low.min(ha_open).min(ha_close),
            close: ha_close,
        });
    }
    out
}

/// Run length and color of the final same-color streak.
pub fn count_consecutive(ha: &[HaCandle]) -> Option<(HaColor, usize)> {
    let last = ha.last()?;
    let color = last.color();
    let run = ha
        .iter()
        .rev()
        .take_while(|c| c.color() == color)
        .count();
    Some((color, run))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle {
            open_time_ms: 0,
            open,
            high,
            low,
            close,
            volume: Decimal::ONE,
        }
    }

    #[test]
    fn first_candle_seeds_open_from_midpoint() {
        let series = heiken_ashi(&[candle(dec!(100), dec!(110), dec!(90), dec!(104))]);
        assert_eq!(series[0].open, dec!(102));
        assert_eq!(series[0].close, dec!(101));
    }

    #[test]
    fn envelope_invariant_holds() {
        let candles: Vec<Candle> = (0..20)
            .map(|i| {
                let base = Decimal::from(100 + (i * 7) % 13);
                candle(base, base + dec!(5), base - dec!(5), base + Decimal::from(i % 3) - dec!(1))
            })
            .collect();
        for ha in heiken_ashi(&candles) {
            assert!(ha.low <= ha.open.min(ha.close));
            assert!(ha.high >= ha.open.max(ha.close));
        }
    }

    #[test]
    fn counts_final_streak() {
        // A hard drop, then three strong rises. HA smoothing keeps
        // the first candle red (close 100.5 < open 101) and the next
        // three green.
        let candles = vec![
            candle(dec!(110), dec!(110), dec!(90), dec!(92)),
            candle(dec!(92), dec!(112), dec!(92), dec!(112)),
            candle(dec!(112), dec!(132), dec!(112), dec!(132)),
            candle(dec!(132), dec!(152), dec!(132), dec!(152)),
        ];
        let ha = heiken_ashi(&candles);
        assert_eq!(ha[0].color(), HaColor::Red);
        let (color, run) = count_consecutive(&ha).unwrap();
        assert_eq!(color, HaColor::Green);
        assert_eq!(run, 3);
    }

    #[test]
    fn empty_series_has_no_streak() {
        assert!(count_consecutive(&[]).is_none());
    }

    #[test]
    fn doji_counts_as_green() {
        // Flat candle: HA close equals HA open, which reads as green.
        let ha = heiken_ashi(&[candle(dec!(100), dec!(100), dec!(100), dec!(100))]);
        assert_eq!(ha[0].color(), HaColor::Green);
    }
}
