use regex::Regex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};

/// Plausible BTC strike range; metadata numbers outside it are noise.
const STRIKE_MIN: i64 = 1_000;
const STRIKE_MAX: i64 = 2_000_000;

/// How often the override file is re-read, in milliseconds.
const OVERRIDE_POLL_MS: i64 = 5_000;

/// Resolves the strike price for each market and remembers it for the
/// market's lifetime.
///
/// Resolution order: parse the question text, search metadata fields,
/// then latch the first chainlink price observed after the market's
/// window start. An operator-provided override file beats everything.
pub struct StrikeTracker {
    question_patterns: Vec<Regex>,
    latched: HashMap<String, Decimal>,
    override_path: PathBuf,
    override_price: Option<Decimal>,
    last_override_poll_ms: i64,
}

impl StrikeTracker {
    pub fn new(override_path: impl Into<PathBuf>) -> Self {
        let question_patterns = vec![
            Regex::new(r"(?i)price to beat[:\s]*\$?([0-9][0-9,]*(?:\.[0-9]+)?)")
                .expect("static regex"),
            Regex::new(r">\s*\$([0-9][0-9,]*(?:\.[0-9]+)?)").expect("static regex"),
            Regex::new(r"(?i)above \$([0-9][0-9,]*(?:\.[0-9]+)?)").expect("static regex"),
        ];
        Self {
            question_patterns,
            latched: HashMap::new(),
            override_path: override_path.into(),
            override_price: None,
            last_override_poll_ms: i64::MIN,
        }
    }

    /// Resolve the strike for a market. `chainlink` is the freshest
    /// on-chain price, used only for latching.
    pub fn resolve(
        &mut self,
        market: &crate::types::Market,
        chainlink: Option<Decimal>,
        now_ms: i64,
    ) -> Option<Decimal> {
        self.poll_override(now_ms);
        if let Some(price) = self.override_price {
            return Some(price);
        }

        if let Some(latched) = self.latched.get(&market.slug) {
            return Some(*latched);
        }

        let parsed = self
            .parse_question(&market.question)
            .or_else(|| Self::search_metadata(&market.metadata));

        let strike = match parsed {
            Some(strike) => strike,
            None => {
                // Latch chainlink only once the window has started:
                // an earlier observation belongs to the prior market.
                let chainlink = chainlink?;
                if now_ms < market.start_ms() {
                    return None;
                }
                info!(
                    "Latched chainlink strike {} for {}",
                    chainlink, market.slug
                );
                chainlink
            }
        };

        self.latched.insert(market.slug.clone(), strike);
        Some(strike)
    }

    fn parse_question(&self, question: &str) -> Option<Decimal> {
        for pattern in &self.question_patterns {
            if let Some(caps) = pattern.captures(question) {
                if let Some(m) = caps.get(1) {
                    if let Some(value) = parse_price(m.as_str()) {
                        return Some(value);
                    }
                }
            }
        }
        None
    }

    fn search_metadata(
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Option<Decimal> {
        let mut keys: Vec<&String> = metadata
            .keys()
            .filter(|k| {
                let k = k.to_lowercase();
                ["price", "strike", "threshold", "target", "beat"]
                    .iter()
                    .any(|needle| k.contains(needle))
            })
            .collect();
        keys.sort(); // deterministic pick when several keys match

        for key in keys {
            let value = &metadata[key];
            let parsed = match value {
                serde_json::Value::Number(n) => {
                    n.as_f64().map(|f| f.to_string()).and_then(|s| parse_price(&s))
                }
                serde_json::Value::String(s) => parse_price(s),
                _ => None,
            };
            if let Some(price) = parsed {
                if in_strike_range(price) {
                    return Some(price);
                }
            }
        }
        None
    }

    fn poll_override(&mut self, now_ms: i64) {
        if now_ms.saturating_sub(self.last_override_poll_ms) < OVERRIDE_POLL_MS {
            return;
        }
        self.last_override_poll_ms = now_ms;

        match std::fs::read_to_string(&self.override_path) {
            Ok(raw) => {
                let parsed = parse_price(raw.trim());
                match parsed {
                    Some(price) => {
                        if self.override_price != Some(price) {
                            info!("Strike override active: {price}");
                        }
                        self.override_price = Some(price);
                    }
                    None => {
                        if !raw.trim().is_empty() {
                            warn!(
                                "Unparseable strike override in {}",
                                self.override_path.display()
                            );
                        }
                        self.override_price = None;
                    }
                }
            }
            Err(_) => {
                self.override_price = None;
            }
        }
    }
}

fn parse_price(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    Decimal::from_str(&cleaned).ok()
}

fn in_strike_range(price: Decimal) -> bool {
    price > Decimal::from(STRIKE_MIN) && price < Decimal::from(STRIKE_MAX)
}
