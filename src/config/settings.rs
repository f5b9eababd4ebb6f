use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::risk::TradeLimits;

/// Process configuration assembled from the environment. `.env` files
/// are honored through dotenvy before this is read.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Dashboard port.
    pub port: u16,
    /// Starting paper balance when no state file exists.
    pub paper_balance: Decimal,
    pub polygon_rpc_urls: Vec<String>,
    pub polygon_wss_urls: Vec<String>,
    pub chainlink_btc_usd_aggregator: String,
    /// Explicit market slug; overrides series selection when set.
    pub polymarket_slug: Option<String>,
    pub polymarket_series_slug: Option<String>,
    pub polymarket_series_id: Option<String>,
    /// Follow the newest market of the series as windows roll over.
    pub polymarket_auto_select_latest: bool,
    pub polymarket_live_ws_url: String,
    pub spot_ws_url: String,
    pub discord_webhook_url: Option<String>,
    pub state_file: String,
    pub database_url: String,
    pub strike_override_file: String,
    pub limits: TradeLimits,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_list(name: &str) -> Vec<String> {
    var(name)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {name}: {raw}")),
        None => Ok(default),
    }
}

fn parse_bool(name: &str, default: bool) -> bool {
    match var(name).as_deref() {
        Some("1") | Some("true") | Some("TRUE") | Some("yes") => true,
        Some("0") | Some("false") | Some("FALSE") | Some("no") => false,
        _ => default,
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let defaults = TradeLimits::default();
        let limits = TradeLimits {
            stop_loss_roi_pct: parse_var("STOP_LOSS_ROI_PCT", defaults.stop_loss_roi_pct)?,
            take_profit_roi_pct: parse_var("TAKE_PROFIT_ROI_PCT", defaults.take_profit_roi_pct)?,
            momentum_take_profit_roi_pct: parse_var(
                "MOMENTUM_TAKE_PROFIT_ROI_PCT",
                defaults.momentum_take_profit_roi_pct,
            )?,
            max_concurrent_positions: parse_var(
                "MAX_CONCURRENT_POSITIONS",
                defaults.max_concurrent_positions,
            )?,
            daily_loss_limit_pct: parse_var("DAILY_LOSS_LIMIT_PCT", defaults.daily_loss_limit_pct)?,
            entry_cooldown_seconds: parse_var(
                "ENTRY_COOLDOWN_SECONDS",
                defaults.entry_cooldown_seconds,
            )?,
            stop_loss_grace_period_seconds: parse_var(
                "STOP_LOSS_GRACE_PERIOD_SECONDS",
                defaults.stop_loss_grace_period_seconds,
            )?,
            cooldown_minutes: parse_var("COOLDOWN_MINUTES", defaults.cooldown_minutes)?,
            min_entry_price: parse_var("MIN_ENTRY_PRICE", defaults.min_entry_price)?,
            max_entry_price: parse_var("MAX_ENTRY_PRICE", defaults.max_entry_price)?,
            max_consecutive_losses: parse_var(
                "MAX_CONSECUTIVE_LOSSES",
                defaults.max_consecutive_losses,
            )?,
            resolution_threshold: parse_var("RESOLUTION_THRESHOLD", defaults.resolution_threshold)?,
            time_guard_minutes: parse_var("TIME_GUARD_MINUTES", defaults.time_guard_minutes)?,
            late_window_guard_minutes: parse_var(
                "LATE_WINDOW_GUARD_MINUTES",
                defaults.late_window_guard_minutes,
            )?,
            use_kelly: parse_bool("USE_KELLY", defaults.use_kelly),
            kelly_fraction: parse_var("KELLY_FRACTION", defaults.kelly_fraction)?,
            min_kelly_bet: parse_var("MIN_KELLY_BET", defaults.min_kelly_bet)?,
            max_kelly_bet: parse_var("MAX_KELLY_BET", defaults.max_kelly_bet)?,
            use_polymarket_dynamic_fees: parse_bool(
                "USE_POLYMARKET_DYNAMIC_FEES",
                defaults.use_polymarket_dynamic_fees,
            ),
            fee_pct: parse_var("FEE_PCT", defaults.fee_pct)?,
            min_odds_edge: parse_var("MIN_ODDS_EDGE", defaults.min_odds_edge)?,
            min_bet: parse_var("MIN_BET", defaults.min_bet)?,
            heavy_fetch_interval_ms: parse_var(
                "HEAVY_FETCH_INTERVAL_MS",
                defaults.heavy_fetch_interval_ms,
            )?,
        };

        if let Err(errors) = limits.validate() {
            anyhow::bail!("invalid trade limits: {}", errors.join("; "));
        }

        let mut polygon_rpc_urls = var_list("POLYGON_RPC_URLS");
        if let Some(single) = var("POLYGON_RPC_URL") {
            polygon_rpc_urls.insert(0, single);
        }
        if polygon_rpc_urls.is_empty() {
            polygon_rpc_urls.push("https://polygon-rpc.com".to_string());
        }

        let mut polygon_wss_urls = var_list("POLYGON_WSS_URLS");
        if let Some(single) = var("POLYGON_WSS_URL") {
            polygon_wss_urls.insert(0, single);
        }

        Ok(Self {
            port: parse_var("PORT", 3000)?,
            paper_balance: parse_var("PAPER_BALANCE", Decimal::from(100))?,
            polygon_rpc_urls,
            polygon_wss_urls,
            chainlink_btc_usd_aggregator: var("CHAINLINK_BTC_USD_AGGREGATOR")
                .unwrap_or_else(|| "0xc907E116054Ad103354f2D350FD2514433D57F6f".to_string()),
            polymarket_slug: var("POLYMARKET_SLUG"),
            polymarket_series_slug: var("POLYMARKET_SERIES_SLUG"),
            polymarket_series_id: var("POLYMARKET_SERIES_ID"),
            polymarket_auto_select_latest: parse_bool("POLYMARKET_AUTO_SELECT_LATEST", true),
            polymarket_live_ws_url: var("POLYMARKET_LIVE_WS_URL")
                .unwrap_or_else(|| "wss://ws-live-data.polymarket.com".to_string()),
            spot_ws_url: var("SPOT_WS_URL")
                .unwrap_or_else(|| "wss://stream.binance.com:9443/ws/btcusdt@trade".to_string()),
            discord_webhook_url: var("DISCORD_WEBHOOK_URL"),
            state_file: var("STATE_FILE").unwrap_or_else(|| "paper_state.json".to_string()),
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:./assistant.db".to_string()),
            strike_override_file: var("STRIKE_OVERRIDE_FILE")
                .unwrap_or_else(|| "strike.txt".to_string()),
            limits,
        })
    }
}
