#![allow(dead_code)]
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};

use crate::feeds::HTTP_TIMEOUT_SECS;
use crate::types::{Side, StrategyKind};

/// Notification severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Events worth pushing to the operator.
#[derive(Debug, Clone)]
pub enum AlertType {
    PositionOpened {
        slug: String,
        side: Side,
        strategy: StrategyKind,
        entry_price: Decimal,
        stake: Decimal,
    },
    PositionClosed {
        slug: String,
        side: Side,
        pnl: Decimal,
        reason: String,
    },
    DailyReset,
    BotStarted {
        balance: Decimal,
    },
    BotStopped,
    Error {
        component: String,
        message: String,
    },
}

impl AlertType {
    pub fn severity(&self) -> Severity {
        match self {
            AlertType::Error { .. } => Severity::Critical,
            AlertType::PositionClosed { pnl, .. } if *pnl < Decimal::ZERO => Severity::Warning,
            _ => Severity::Info,
        }
    }

    pub fn title(&self) -> String {
        match self {
            AlertType::PositionOpened { slug, side, .. } => {
                format!("Position Opened: {side} on {slug}")
            }
            AlertType::PositionClosed { slug, side, .. } => {
                format!("Position Closed: {side} on {slug}")
            }
            AlertType::DailyReset => "Daily Loss Counter Reset".to_string(),
            AlertType::BotStarted { .. } => "Assistant Started".to_string(),
            AlertType::BotStopped => "Assistant Stopped".to_string(),
            AlertType::Error { component, .. } => format!("Error in {component}"),
        }
    }

    fn description(&self) -> String {
        match self {
            AlertType::PositionOpened {
                strategy,
                entry_price,
                stake,
                ..
            } => format!("{strategy} entry at {entry_price}, stake ${stake}"),
            AlertType::PositionClosed { pnl, reason, .. } => {
                format!("{reason}: pnl ${pnl}")
            }
            AlertType::DailyReset => "New UTC day".to_string(),
            AlertType::BotStarted { balance } => format!("Paper balance ${balance}"),
            AlertType::BotStopped => String::new(),
            AlertType::Error { message, .. } => message.clone(),
        }
    }
}

/// Pushes trade notifications to a Discord webhook when one is
/// configured; otherwise notifications only hit the log.
pub struct DiscordNotifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl DiscordNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            webhook_url,
            client,
        }
    }

    pub async fn notify(&self, alert: AlertType) {
        let title = alert.title();
        match alert.severity() {
            Severity::Critical => warn!("{title} - {:?}", alert),
            Severity::Warning => warn!("{title}"),
            Severity::Info => info!("{title}"),
        }

        let Some(url) = &self.webhook_url else {
            return;
        };

        let color = match alert.severity() {
            Severity::Info => 0x2ecc71,
            Severity::Warning => 0xf1c40f,
            Severity::Critical => 0xe74c3c,
        };
        let body = json!({
            "embeds": [{
                "title": title,
                "description": alert.description(),
                "color": color,
            }]
        });

        // A missed webhook is never worth interrupting trading for.
        if let Err(e) = self.client.post(url).json(&body).send().await {
            warn!("Discord webhook failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn severities_follow_outcome() {
        let open = AlertType::PositionOpened {
            slug: "btc-1".to_string(),
            side: Side::Up,
            strategy: StrategyKind::Momentum,
            entry_price: dec!(0.6),
            stake: dec!(4),
        };
        assert_eq!(open.severity(), Severity::Info);

        let losing_close = AlertType::PositionClosed {
            slug: "btc-1".to_string(),
            side: Side::Up,
            pnl: dec!(-4),
            reason: "STOP_LOSS".to_string(),
        };
        assert_eq!(losing_close.severity(), Severity::Warning);

        let winning_close = AlertType::PositionClosed {
            slug: "btc-1".to_string(),
            side: Side::Up,
            pnl: dec!(3),
            reason: "EXPIRY_WIN".to_string(),
        };
        assert_eq!(winning_close.severity(), Severity::Info);

        let error = AlertType::Error {
            component: "orchestrator".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(error.severity(), Severity::Critical);
    }

    #[tokio::test]
    async fn notify_without_webhook_is_a_no_op() {
        let notifier = DiscordNotifier::new(None);
        notifier.notify(AlertType::BotStopped).await;
    }
}