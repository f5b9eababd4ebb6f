mod types;
mod indicators;
mod feeds;
mod engine;
mod risk;
mod config;
mod web;
mod database;
mod notifications;
mod persistence;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

use config::Settings;
use engine::{Orchestrator, PaperTrader, SnapshotAssembler};
use feeds::{ChainlinkFeed, MarketDataSource, MarketSelector, PolymarketClient, SpotFeed};
use notifications::DiscordNotifier;
use persistence::StateStore;
use types::Side;
use web::{start_dashboard_server, DashboardState};

#[derive(Parser)]
#[command(name = "polymarket-assistant")]
#[command(author = "Trading Bot")]
#[command(version = "0.1.0")]
#[command(about = "Decision engine and paper trader for Polymarket 15-minute BTC markets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the assistant: feeds, strategy loop, paper trader, dashboard
    Run {
        /// Dashboard port (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the persisted paper-trading state
    Status,
    /// Show the currently selected market and its odds
    Market,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = Settings::from_env()?;

    match cli.command {
        Commands::Run { port } => run_assistant(settings, port).await,
        Commands::Status => show_status(&settings),
        Commands::Market => show_market(&settings).await,
    }
}

fn market_selector(settings: &Settings) -> MarketSelector {
    if let Some(slug) = &settings.polymarket_slug {
        MarketSelector::Slug(slug.clone())
    } else if let Some(id) = &settings.polymarket_series_id {
        MarketSelector::SeriesId {
            id: id.clone(),
            auto_latest: settings.polymarket_auto_select_latest,
        }
    } else {
        MarketSelector::Series {
            slug: settings
                .polymarket_series_slug
                .clone()
                .unwrap_or_else(|| "bitcoin-up-or-down-15-minute".to_string()),
            auto_latest: settings.polymarket_auto_select_latest,
        }
    }
}

async fn run_assistant(settings: Settings, port_override: Option<u16>) -> Result<()> {
    let port = port_override.unwrap_or(settings.port);
    info!("Polymarket Assistant v0.1.0");
    debug!(
        "Configured endpoints: spot {}, live data {}",
        settings.spot_ws_url, settings.polymarket_live_ws_url
    );

    let database = match database::Database::new(&settings.database_url).await {
        Ok(db) => Some(Arc::new(db)),
        Err(e) => {
            // Logging is an amenity, trading is not.
            error!("Database unavailable, running without trade log: {e:#}");
            None
        }
    };

    let notifier = Arc::new(DiscordNotifier::new(settings.discord_webhook_url.clone()));
    let dashboard = DashboardState::new();

    let dashboard_for_server = dashboard.clone();
    tokio::spawn(async move {
        if let Err(e) = start_dashboard_server(dashboard_for_server, port).await {
            error!("Dashboard server error: {e:#}");
        }
    });
    info!("Dashboard state at http://localhost:{port}/api/state");

    // Feed producers. Each owns its reconnect loop and only ever
    // writes a last-value cell (the spot feed also streams ticks for
    // candle aggregation).
    let (spot_cell, tick_rx) = SpotFeed::new(settings.spot_ws_url.clone()).start();
    let chainlink_cell = ChainlinkFeed::new(
        settings.polygon_rpc_urls.clone(),
        settings.polygon_wss_urls.clone(),
        settings.chainlink_btc_usd_aggregator.clone(),
    )?
    .start();

    let polymarket: Arc<dyn MarketDataSource> =
        Arc::new(PolymarketClient::new(market_selector(&settings))?);
    let assembler = SnapshotAssembler::new(polymarket, settings.limits.heavy_fetch_interval_ms);

    let store = StateStore::new(&settings.state_file);
    let state = store.load_or_default(settings.paper_balance);
    let trader = PaperTrader::new(state, settings.limits.clone(), store);

    let orchestrator = Orchestrator::new(
        dashboard,
        database,
        notifier,
        trader,
        assembler,
        spot_cell,
        chainlink_cell,
        tick_rx,
        settings.strike_override_file.clone(),
    );
    orchestrator.run().await
}

fn show_status(settings: &Settings) -> Result<()> {
    let store = StateStore::new(&settings.state_file);
    let state = store.load_or_default(settings.paper_balance);

    println!("\n=== Paper State ===");
    println!("Balance:            ${:.2}", state.balance);
    println!("Daily loss:         ${:.2}", state.daily_loss);
    println!("Consecutive losses: {}", state.consecutive_losses);
    println!(
        "Recent results:     {}",
        state
            .recent_results
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    );
    println!("Open positions:     {}", state.positions.len());
    for p in &state.positions {
        println!(
            "  {} {} @ {} ({}, ${:.2})",
            p.side, p.market_slug, p.entry_price, p.strategy, p.amount
        );
    }
    Ok(())
}

async fn show_market(settings: &Settings) -> Result<()> {
    let client = PolymarketClient::new(market_selector(settings))?;

    let Some(market) = client.current_market().await? else {
        println!("No open market found for the configured selector");
        return Ok(());
    };

    println!("\n=== Current Market ===");
    println!("Question: {}", market.question);
    println!("Slug:     {}", market.slug);
    println!("Ends:     {} (unix-ms)", market.end_date_ms);

    for side in [Side::Up, Side::Down] {
        if let Some(token) = market.token_for(side) {
            match client.buy_price(token).await? {
                Some(price) => println!("{side}: {price}"),
                None => println!("{side}: no book"),
            }
        }
    }
    Ok(())
}
