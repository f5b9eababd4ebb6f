#![allow(dead_code)]
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

const MAX_ACTIVITY: usize = 200;

/// Open-position block of the UI payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiPosition {
    pub side: String,
    pub strategy: String,
    pub entry_price: Decimal,
    pub shares: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiTrade {
    pub timestamp: DateTime<Utc>,
    pub side: String,
    pub pnl: Decimal,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiWinStats {
    /// "wins/total" for the current UTC day.
    pub today: String,
    pub overall: String,
}

/// The stable dashboard payload, pushed on every fast tick. Field
/// names are part of the wire contract with the front end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub market_name: String,
    pub market_slug: String,
    pub time_left_str: String,
    pub time_left_min: Decimal,
    pub side: String,
    pub phase: String,
    pub conviction: String,
    pub advice: String,
    pub binance_price: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub strike_price: Option<Decimal>,
    pub gap: Option<Decimal>,
    pub poly_up: Option<Decimal>,
    pub poly_down: Option<Decimal>,
    pub total_equity: Decimal,
    pub daily_pnl: Decimal,
    pub paper_balance: Decimal,
    pub position: Option<UiPosition>,
    pub pos_pnl: Option<Decimal>,
    pub ind_heiken: String,
    pub ind_rsi: String,
    pub ind_macd: String,
    pub ind_vwap: String,
    pub ind_ema: String,
    pub recent_trades: Vec<UiTrade>,
    pub win_stats: UiWinStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Info,
    Trade,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityRecord {
    pub timestamp: DateTime<Utc>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
}

/// Frames pushed over the dashboard websocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum WsFrame {
    State(Box<UiState>),
    Activity(ActivityRecord),
}

/// Shared dashboard state: latest UI payload plus a broadcast channel
/// fanned out to every websocket client.
#[derive(Clone)]
pub struct DashboardState {
    latest: Arc<RwLock<UiState>>,
    activity: Arc<RwLock<VecDeque<ActivityRecord>>>,
    pub tx: broadcast::Sender<WsFrame>,
}

impl DashboardState {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            latest: Arc::new(RwLock::new(UiState::default())),
            activity: Arc::new(RwLock::new(VecDeque::new())),
            tx,
        }
    }

    pub async fn publish_state(&self, state: UiState) {
        *self.latest.write().await = state.clone();
        let _ = self.tx.send(WsFrame::State(Box::new(state)));
    }

    pub async fn activity(&self, kind: ActivityKind, msg: impl Into<String>) {
        let record = ActivityRecord {
            timestamp: Utc::now(),
            msg: msg.into(),
            kind,
        };
        let mut log = self.activity.write().await;
        log.push_front(record.clone());
        if log.len() > MAX_ACTIVITY {
            log.pop_back();
        }
        drop(log);
        let _ = self.tx.send(WsFrame::Activity(record));
    }

    pub async fn latest(&self) -> UiState {
        self.latest.read().await.clone()
    }

    pub async fn recent_activity(&self, limit: usize) -> Vec<ActivityRecord> {
        self.activity
            .read()
            .await
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}
