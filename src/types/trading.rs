use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a binary outcome token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Up,
    Down,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Up => Side::Down,
            Side::Down => Side::Up,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Up => "UP",
            Side::Down => "DOWN",
        }
    }

    pub fn as_lower(&self) -> &'static str {
        match self {
            Side::Up => "up",
            Side::Down => "down",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which strategy produced a recommendation or opened a position.
/// MeanReversion is retained only so positions carried over from older
/// state files settle with the right exit rules; the evaluator never
/// emits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    Sniper,
    Momentum,
    LateWindow,
    MeanReversion,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Sniper => "SNIPER",
            StrategyKind::Momentum => "MOMENTUM",
            StrategyKind::LateWindow => "LATE_WINDOW",
            StrategyKind::MeanReversion => "MEAN_REVERSION",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    None,
    Medium,
    High,
    VeryHigh,
    Max,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::None => "NONE",
            Confidence::Medium => "MEDIUM",
            Confidence::High => "HIGH",
            Confidence::VeryHigh => "VERY_HIGH",
            Confidence::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Enter,
    NoTrade,
}

/// Spot trend relative to the 21-period EMA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Rising,
    Falling,
}

impl Trend {
    pub fn matches(&self, side: Side) -> bool {
        matches!(
            (self, side),
            (Trend::Rising, Side::Up) | (Trend::Falling, Side::Down)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Rising => "RISING",
            Trend::Falling => "FALLING",
        }
    }
}

/// Model probabilities and edges for both sides, produced by the
/// heuristic scorer whenever indicators are fully formed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProbEstimate {
    pub up: Decimal,
    pub down: Decimal,
    pub edge_up: Decimal,
    pub edge_down: Decimal,
}

impl ProbEstimate {
    pub fn for_side(&self, side: Side) -> Decimal {
        match side {
            Side::Up => self.up,
            Side::Down => self.down,
        }
    }

    pub fn edge_for(&self, side: Side) -> Decimal {
        match side {
            Side::Up => self.edge_up,
            Side::Down => self.edge_down,
        }
    }
}

/// Output of the strategy evaluator. Every branch carries a reason
/// string for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: Action,
    pub side: Option<Side>,
    pub strategy: Option<StrategyKind>,
    pub confidence: Confidence,
    pub reason: String,
    /// Model probability of the recommended side winning.
    pub probability: Option<Decimal>,
    /// Probability minus market odds on the same side, clamped to >= 0.
    pub edge: Option<Decimal>,
    pub estimate: Option<ProbEstimate>,
}

impl Recommendation {
    pub fn no_trade(reason: impl Into<String>) -> Self {
        Self {
            action: Action::NoTrade,
            side: None,
            strategy: None,
            confidence: Confidence::None,
            reason: reason.into(),
            probability: None,
            edge: None,
            estimate: None,
        }
    }

    pub fn enter(
        side: Side,
        strategy: StrategyKind,
        confidence: Confidence,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            action: Action::Enter,
            side: Some(side),
            strategy: Some(strategy),
            confidence,
            reason: reason.into(),
            probability: None,
            edge: None,
            estimate: None,
        }
    }

    pub fn with_estimate(mut self, estimate: ProbEstimate) -> Self {
        if let Some(side) = self.side {
            let edge = estimate.edge_for(side);
            self.probability = Some(estimate.for_side(side));
            self.edge = Some(edge.max(Decimal::ZERO));
        }
        self.estimate = Some(estimate);
        self
    }

    pub fn is_enter(&self) -> bool {
        self.action == Action::Enter
    }
}

/// Result of a settled or exited trade, kept in a small ring for the
/// dashboard win stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Win,
    Loss,
}

impl TradeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeOutcome::Win => "WIN",
            TradeOutcome::Loss => "LOSS",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn side_opposite() {
        assert_eq!(Side::Up.opposite(), Side::Down);
        assert_eq!(Side::Down.opposite(), Side::Up);
    }

    #[test]
    fn trend_matches_side() {
        assert!(Trend::Rising.matches(Side::Up));
        assert!(Trend::Falling.matches(Side::Down));
        assert!(!Trend::Rising.matches(Side::Down));
    }

    #[test]
    fn enter_with_estimate_clamps_edge() {
        let estimate = ProbEstimate {
            up: dec!(0.40),
            down: dec!(0.60),
            edge_up: dec!(-0.20),
            edge_down: dec!(0.05),
        };
        let rec = Recommendation::enter(
            Side::Up,
            StrategyKind::Momentum,
            Confidence::High,
            "test",
        )
        .with_estimate(estimate);

        assert_eq!(rec.probability, Some(dec!(0.40)));
        assert_eq!(rec.edge, Some(Decimal::ZERO));
    }

    #[test]
    fn confidence_ordering() {
        assert!(Confidence::Max > Confidence::VeryHigh);
        assert!(Confidence::High > Confidence::Medium);
    }
}
