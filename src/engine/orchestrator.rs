use anyhow::{bail, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::database::{Database, PaperTradeRow, SignalRow, WinStats};
use crate::feeds::{PriceCell, PriceTick};
use crate::notifications::{AlertType, DiscordNotifier};
use crate::types::{Action, CandleAggregator, Recommendation, SideQuotes, WINDOW_MINUTES};
use crate::web::{ActivityKind, DashboardState, UiPosition, UiState, UiTrade, UiWinStats};

use super::paper::{ClosedTrade, OpenedTrade, PaperTrader, TickContext};
use super::snapshot::{Snapshot, SnapshotAssembler, INDICATOR_WINDOW};
use super::{evaluator, StrikeTracker};

const FAST_TICK_MS: u64 = 250;
/// Slow pass every eighth fast tick = 2 s.
const SLOW_EVERY: u64 = 8;
/// Consecutive hard errors before the process gives up.
const MAX_HARD_ERRORS: u32 = 10;
const MAX_RECENT_TRADES: usize = 20;

/// Owns all mutable domain state and both cadences. The WS readers
/// only ever write last-value cells and the tick channel; everything
/// else happens on this task.
pub struct Orchestrator {
    dashboard: DashboardState,
    database: Option<Arc<Database>>,
    notifier: Arc<DiscordNotifier>,
    trader: PaperTrader,
    assembler: SnapshotAssembler,
    strikes: StrikeTracker,
    aggregator: CandleAggregator,
    spot_cell: PriceCell,
    chainlink_cell: PriceCell,
    tick_rx: mpsc::Receiver<PriceTick>,
    last_snapshot: Option<Snapshot>,
    last_rec: Option<Recommendation>,
    recent_trades: Vec<UiTrade>,
    win_stats: WinStats,
    error_streak: u32,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dashboard: DashboardState,
        database: Option<Arc<Database>>,
        notifier: Arc<DiscordNotifier>,
        trader: PaperTrader,
        assembler: SnapshotAssembler,
        spot_cell: PriceCell,
        chainlink_cell: PriceCell,
        tick_rx: mpsc::Receiver<PriceTick>,
        strike_override_file: String,
    ) -> Self {
        let strikes = StrikeTracker::new(strike_override_file);
        Self {
            dashboard,
            database,
            notifier,
            trader,
            assembler,
            strikes,
            aggregator: CandleAggregator::new(INDICATOR_WINDOW),
            spot_cell,
            chainlink_cell,
            tick_rx,
            last_snapshot: None,
            last_rec: None,
            recent_trades: Vec::new(),
            win_stats: WinStats::default(),
            error_streak: 0,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        self.refresh_win_stats().await;
        if let Some(db) = &self.database {
            // Re-seed the dashboard trade list across restarts.
            match db.recent_closes(MAX_RECENT_TRADES as u32).await {
                Ok(rows) => {
                    self.recent_trades = rows
                        .into_iter()
                        .map(|r| UiTrade {
                            timestamp: r.timestamp,
                            side: r.side,
                            pnl: r.pnl.unwrap_or(Decimal::ZERO),
                            reason: "CLOSE".to_string(),
                        })
                        .collect();
                }
                Err(e) => warn!("Could not load recent trades: {e:#}"),
            }
        }
        self.notifier
            .notify(AlertType::BotStarted {
                balance: self.trader.state().balance,
            })
            .await;

        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(FAST_TICK_MS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut fast_count: u64 = 0;
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    fast_count += 1;
                    self.drain_ticks();

                    if fast_count % SLOW_EVERY == 0 {
                        match self.slow_pass().await {
                            Ok(()) => self.error_streak = 0,
                            Err(e) => {
                                self.error_streak += 1;
                                error!(
                                    "Slow pass failed ({}/{MAX_HARD_ERRORS}): {e:#}",
                                    self.error_streak
                                );
                                self.dashboard
                                    .activity(ActivityKind::Error, format!("{e:#}"))
                                    .await;
                                if self.error_streak >= MAX_HARD_ERRORS {
                                    self.notifier
                                        .notify(AlertType::Error {
                                            component: "orchestrator".to_string(),
                                            message: format!("{e:#}"),
                                        })
                                        .await;
                                    bail!("{MAX_HARD_ERRORS} consecutive hard errors, exiting");
                                }
                            }
                        }
                    }

                    // The fast pass reads state for the UI; it never
                    // mutates the paper trader.
                    self.fast_pass().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down...");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM received, shutting down...");
                    break;
                }
            }
        }

        self.notifier.notify(AlertType::BotStopped).await;
        let quotes = self.latest_quotes();
        println!("\n=== Session Summary ===");
        println!("Balance:   ${:.2}", self.trader.state().balance);
        println!("Equity:    ${:.2}", self.trader.equity(&quotes));
        println!("Daily P&L: ${:.2}", -self.trader.state().daily_loss);
        println!("Open positions: {}", self.trader.state().positions.len());

        Ok(())
    }

    fn drain_ticks(&mut self) {
        while let Ok(tick) = self.tick_rx.try_recv() {
            self.aggregator.on_tick(tick.ts_ms, tick.price);
        }
    }

    fn latest_quotes(&self) -> SideQuotes {
        self.last_snapshot
            .as_ref()
            .map(|s| s.quotes)
            .unwrap_or_default()
    }

    async fn slow_pass(&mut self) -> Result<()> {
        let now_ms = Utc::now().timestamp_millis();
        let spot = self.spot_cell.price();
        let chainlink = self.chainlink_cell.price();

        let snapshot = self
            .assembler
            .assemble(
                now_ms,
                spot,
                chainlink,
                self.aggregator.ring(),
                &mut self.strikes,
            )
            .await?;
        let Some(snapshot) = snapshot else {
            debug!("No spot price yet, skipping strategy pass");
            return Ok(());
        };

        let rec = evaluator::evaluate(&snapshot, self.trader.limits());
        self.log_signal(&snapshot, &rec).await;

        let ctx = TickContext {
            rec: &rec,
            quotes: snapshot.quotes,
            market: snapshot.market.as_ref(),
            spot: Some(snapshot.spot),
            strike: snapshot.strike,
            trend: snapshot.trend,
            time_left_min: snapshot.time_left_min,
            now_ms,
        };
        let outcome = self.trader.tick(&ctx);

        if outcome.daily_reset {
            self.dashboard
                .activity(ActivityKind::Info, "Daily loss counter reset")
                .await;
            self.notifier.notify(AlertType::DailyReset).await;
        }
        for closed in &outcome.closed {
            self.on_close(closed).await;
        }
        if let Some(opened) = &outcome.opened {
            self.on_open(opened).await;
        }
        if let Some(blocked) = &outcome.blocked {
            debug!("Entry blocked: {blocked}");
            self.dashboard
                .activity(ActivityKind::Info, format!("Entry blocked: {blocked}"))
                .await;
        }
        if !outcome.closed.is_empty() {
            self.refresh_win_stats().await;
        }

        self.last_snapshot = Some(snapshot);
        self.last_rec = Some(rec);
        Ok(())
    }

    async fn on_open(&mut self, opened: &OpenedTrade) {
        let position = &opened.position;
        self.dashboard
            .activity(
                ActivityKind::Trade,
                format!(
                    "Opened {} {} @ {} ({})",
                    position.side, position.market_slug, position.entry_price, position.strategy
                ),
            )
            .await;
        self.notifier
            .notify(AlertType::PositionOpened {
                slug: position.market_slug.clone(),
                side: position.side,
                strategy: position.strategy,
                entry_price: position.entry_price,
                stake: opened.stake,
            })
            .await;

        if let Some(db) = &self.database {
            let row = PaperTradeRow {
                timestamp: Utc::now(),
                action: "OPEN".to_string(),
                side: position.side.as_str().to_string(),
                price: position.entry_price,
                amount: position.amount,
                shares: position.shares,
                pnl: None,
                balance: self.trader.state().balance,
                market_slug: position.market_slug.clone(),
                fee: opened.fee,
            };
            // DB-busy downgrades to a warning; the log row is dropped.
            if let Err(e) = db.insert_paper_trade(&row).await {
                warn!("Failed to log trade open: {e:#}");
            }
        }
    }

    async fn on_close(&mut self, closed: &ClosedTrade) {
        let position = &closed.position;
        self.dashboard
            .activity(
                ActivityKind::Trade,
                format!(
                    "Closed {} {} @ {} ({}): {} ${:.2}",
                    position.side,
                    position.market_slug,
                    closed.exit_price,
                    closed.reason,
                    closed.outcome.as_str(),
                    closed.pnl
                ),
            )
            .await;
        self.notifier
            .notify(AlertType::PositionClosed {
                slug: position.market_slug.clone(),
                side: position.side,
                pnl: closed.pnl,
                reason: closed.reason.clone(),
            })
            .await;

        self.recent_trades.insert(
            0,
            UiTrade {
                timestamp: Utc::now(),
                side: position.side.as_str().to_string(),
                pnl: closed.pnl,
                reason: closed.reason.clone(),
            },
        );
        self.recent_trades.truncate(MAX_RECENT_TRADES);

        if let Some(db) = &self.database {
            let row = PaperTradeRow {
                timestamp: Utc::now(),
                action: "CLOSE".to_string(),
                side: position.side.as_str().to_string(),
                price: closed.exit_price,
                amount: position.amount,
                shares: position.shares,
                pnl: Some(closed.pnl),
                balance: self.trader.state().balance,
                market_slug: position.market_slug.clone(),
                fee: closed.fee,
            };
            if let Err(e) = db.insert_paper_trade(&row).await {
                warn!("Failed to log trade close: {e:#}");
            }
        }
    }

    async fn log_signal(&self, snapshot: &Snapshot, rec: &Recommendation) {
        let Some(db) = &self.database else {
            return;
        };
        let estimate = rec.estimate;
        let row = SignalRow {
            timestamp: Utc::now(),
            time_left_min: snapshot.time_left_min,
            regime: snapshot
                .trend
                .map(|t| t.as_str().to_string())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            signal: match rec.action {
                Action::Enter => format!(
                    "ENTER_{}",
                    rec.side.map(|s| s.as_str()).unwrap_or("?")
                ),
                Action::NoTrade => "NO_TRADE".to_string(),
            },
            model_prob_up: estimate.map(|e| e.up),
            model_prob_down: estimate.map(|e| e.down),
            market_prob_up: snapshot.quotes.up,
            market_prob_down: snapshot.quotes.down,
            edge_up: estimate.map(|e| e.edge_up),
            edge_down: estimate.map(|e| e.edge_down),
            recommendation: rec.reason.clone(),
            strike: snapshot.strike,
            current_price: snapshot.chainlink,
            binance_price: Some(snapshot.spot),
            gap: snapshot.gap(),
        };
        if let Err(e) = db.insert_signal(&row).await {
            warn!("Failed to log signal: {e:#}");
        }
    }

    async fn refresh_win_stats(&mut self) {
        if let Some(db) = &self.database {
            match db.win_stats(Utc::now()).await {
                Ok(stats) => self.win_stats = stats,
                Err(e) => warn!("Win-stats query failed: {e:#}"),
            }
        }
    }

    /// Rebuild and publish the UI payload from the freshest prices
    /// and the last slow-pass snapshot.
    async fn fast_pass(&mut self) {
        let spot = self.spot_cell.price();
        let chainlink = self.chainlink_cell.price();
        let snapshot = self.last_snapshot.as_ref();
        let quotes = self.latest_quotes();

        let time_left_min = snapshot
            .map(|s| s.time_left_min)
            .unwrap_or_else(|| Decimal::from(WINDOW_MINUTES));
        let strike = snapshot.and_then(|s| s.strike);
        let resolution_price = chainlink.or(spot);
        let gap = match (resolution_price, strike) {
            (Some(price), Some(strike)) => Some(price - strike),
            _ => None,
        };

        let position = snapshot
            .and_then(|s| s.market_slug())
            .and_then(|slug| self.trader.state().positions_for(slug).next())
            .cloned();
        let pos_pnl = position.as_ref().and_then(|p| {
            quotes.for_side(p.side).map(|price| p.unrealized_pnl(price))
        });

        let state = UiState {
            market_name: snapshot
                .and_then(|s| s.market.as_ref())
                .map(|m| m.question.clone())
                .unwrap_or_default(),
            market_slug: snapshot
                .and_then(|s| s.market_slug())
                .unwrap_or_default()
                .to_string(),
            time_left_str: format_time_left(time_left_min),
            time_left_min,
            side: self
                .last_rec
                .as_ref()
                .and_then(|r| r.side)
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "-".to_string()),
            phase: phase_label(time_left_min),
            conviction: self
                .last_rec
                .as_ref()
                .map(|r| r.confidence.as_str().to_string())
                .unwrap_or_default(),
            advice: self
                .last_rec
                .as_ref()
                .map(|r| r.reason.clone())
                .unwrap_or_default(),
            binance_price: spot,
            current_price: chainlink,
            strike_price: strike,
            gap,
            poly_up: quotes.up,
            poly_down: quotes.down,
            total_equity: self.trader.equity(&quotes),
            daily_pnl: -self.trader.state().daily_loss,
            paper_balance: self.trader.state().balance,
            position: position.as_ref().map(|p| UiPosition {
                side: p.side.as_str().to_string(),
                strategy: p.strategy.as_str().to_string(),
                entry_price: p.entry_price,
                shares: p.shares,
                amount: p.amount,
            }),
            pos_pnl,
            ind_heiken: snapshot
                .and_then(|s| s.indicators.heiken.as_ref())
                .map(|h| format!("{} x{}", h.color.as_str(), h.run))
                .unwrap_or_else(|| "-".to_string()),
            ind_rsi: snapshot
                .and_then(|s| s.indicators.rsi)
                .map(|r| format!("{r:.1}"))
                .unwrap_or_else(|| "-".to_string()),
            ind_macd: snapshot
                .and_then(|s| s.indicators.macd.as_ref())
                .map(|m| format!("hist {:.2} (d {:.2})", m.hist, m.hist_delta))
                .unwrap_or_else(|| "-".to_string()),
            ind_vwap: snapshot
                .and_then(|s| s.indicators.vwap)
                .map(|v| format!("{v:.2}"))
                .unwrap_or_else(|| "-".to_string()),
            ind_ema: snapshot
                .and_then(|s| s.indicators.ema21)
                .map(|e| format!("{e:.2}"))
                .unwrap_or_else(|| "-".to_string()),
            recent_trades: self.recent_trades.clone(),
            win_stats: UiWinStats {
                today: format!(
                    "{}/{}",
                    self.win_stats.today_wins, self.win_stats.today_total
                ),
                overall: format!(
                    "{}/{}",
                    self.win_stats.overall_wins, self.win_stats.overall_total
                ),
            },
        };

        self.dashboard.publish_state(state).await;
    }
}

fn format_time_left(time_left_min: Decimal) -> String {
    if time_left_min <= Decimal::ZERO {
        return "0:00".to_string();
    }
    let total_seconds = (time_left_min * Decimal::from(60))
        .floor()
        .try_into()
        .unwrap_or(0i64);
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

fn phase_label(time_left_min: Decimal) -> String {
    use rust_decimal_macros::dec;
    if time_left_min < dec!(0.5) {
        "CLOSING"
    } else if time_left_min < dec!(2.0) {
        "SNIPER_WINDOW"
    } else {
        "MOMENTUM_WINDOW"
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn time_left_formats_as_minutes_seconds() {
        assert_eq!(format_time_left(dec!(14.5)), "14:30");
        assert_eq!(format_time_left(dec!(0.25)), "0:15");
        assert_eq!(format_time_left(dec!(-1)), "0:00");
    }

    #[test]
    fn phase_follows_time_buckets() {
        assert_eq!(phase_label(dec!(10)), "MOMENTUM_WINDOW");
        assert_eq!(phase_label(dec!(1.5)), "SNIPER_WINDOW");
        assert_eq!(phase_label(dec!(0.3)), "CLOSING");
    }
}
