use rust_decimal::Decimal;
use super::Indicator;

/// Wilder's RSI. Seeds with simple averages of the first `period`
/// gains/losses, then applies Wilder smoothing. Needs period + 1
/// closes before it produces a value.
#[derive(Debug, Clone)]
pub struct RSI {
    period: usize,
    avg_gain: Option<Decimal>,
    avg_loss: Option<Decimal>,
    prev_price: Option<Decimal>,
    gains: Vec<Decimal>,
    losses: Vec<Decimal>,
    value: Option<Decimal>,
}

impl RSI {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            avg_gain: None,
            avg_loss: None,
            prev_price: None,
            gains: Vec::with_capacity(period),
            losses: Vec::with_capacity(period),
            value: None,
        }
    }

    pub fn update(&mut self, price: Decimal) -> Option<Decimal> {
        if let Some(prev) = self.prev_price {
            let change = price - prev;
            let gain = change.max(Decimal::ZERO);
            let loss = (-change).max(Decimal::ZERO);

            if self.gains.len() < self.period {
                self.gains.push(gain);
                self.losses.push(loss);

                if self.gains.len() == self.period {
                    let sum_gain: Decimal = self.gains.iter().sum();
                    let sum_loss: Decimal = self.losses.iter().sum();
                    self.avg_gain = Some(sum_gain / Decimal::from(self.period as u32));
                    self.avg_loss = Some(sum_loss / Decimal::from(self.period as u32));
                    self.value = self.calculate();
                }
            } else if let (Some(avg_gain), Some(avg_loss)) = (self.avg_gain, self.avg_loss) {
                let n = Decimal::from(self.period as u32);
                self.avg_gain = Some((avg_gain * (n - Decimal::ONE) + gain) / n);
                self.avg_loss = Some((avg_loss * (n - Decimal::ONE) + loss) / n);
                self.value = self.calculate();
            }
        }

        self.prev_price = Some(price);
        self.value
    }

    fn calculate(&self) -> Option<Decimal> {
        match (self.avg_gain, self.avg_loss) {
            (Some(avg_gain), Some(avg_loss)) => {
                if avg_loss.is_zero() {
                    Some(Decimal::from(100))
                } else {
                    let rs = avg_gain / avg_loss;
                    Some(Decimal::from(100) - (Decimal::from(100) / (Decimal::ONE + rs)))
                }
            }
            _ => None,
        }
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }
}

impl Indicator for RSI {
    fn name(&self) -> &'static str {
        "RSI"
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.avg_gain = None;
        self.avg_loss = None;
        self.prev_price = None;
        self.gains.clear();
        self.losses.clear();
        self.value = None;
    }
}

/// RSI of the final sample, None when |closes| <= period.
pub fn rsi_last(closes: &[Decimal], period: usize) -> Option<Decimal> {
    if closes.len() <= period {
        return None;
    }
    let mut rsi = RSI::new(period);
    for c in closes {
        rsi.update(*c);
    }
    rsi.value()
}

/// RSI value at each step once warmed up, for slope checks.
pub fn rsi_series(closes: &[Decimal], period: usize) -> Vec<Decimal> {
    let mut rsi = RSI::new(period);
    closes.iter().filter_map(|c| rsi.update(*c)).collect()
}
