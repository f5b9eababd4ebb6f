use rust_decimal::Decimal;
use super::Indicator;

/// Exponential moving average seeded with the SMA of the first
/// `period` samples, then EMA_t = a*x_t + (1-a)*EMA_{t-1} with
/// a = 2/(period+1). No value until `period` samples have arrived.
#[derive(Debug, Clone)]
pub struct EMA {
    period: usize,
    multiplier: Decimal,
    value: Option<Decimal>,
    count: usize,
    sum: Decimal,
}

impl EMA {
    pub fn new(period: usize) -> Self {
        let multiplier = Decimal::from(2) / Decimal::from(period as u32 + 1);
        Self {
            period,
            multiplier,
            value: None,
            count: 0,
            sum: Decimal::ZERO,
        }
    }

    pub fn update(&mut self, price: Decimal) -> Option<Decimal> {
        self.count += 1;

        if self.count < self.period {
            self.sum += price;
            return None;
        } else if self.count == self.period {
            self.sum += price;
            let sma = self.sum / Decimal::from(self.period as u32);
            self.value = Some(sma);
            return self.value;
        }

        if let Some(prev) = self.value {
            self.value = Some((price - prev) * self.multiplier + prev);
        }
        self.value
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for EMA {
    fn name(&self) -> &'static str {
        "EMA"
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.value = None;
        self.count = 0;
        self.sum = Decimal::ZERO;
    }
}

/// EMA value at each step from the seed onwards.
pub fn ema_series(values: &[Decimal], period: usize) -> Vec<Decimal> {
    let mut ema = EMA::new(period);
    values.iter().filter_map(|v| ema.update(*v)).collect()
}

/// Final EMA of the series, or None when the series is shorter than
/// the period.
pub fn ema_last(values: &[Decimal], period: usize) -> Option<Decimal> {
    let mut ema = EMA::new(period);
    for v in values {
        ema.update(*v);
    }
    ema.value()
}
