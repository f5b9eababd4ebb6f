use anyhow::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::feeds::MarketDataSource;
use crate::indicators::{
    count_consecutive, ema_last, heiken_ashi, macd_snapshot, rsi_last, rsi_series,
    session_vwap, vwap_series, HaColor, MacdSnapshot,
};
use crate::types::{Candle, CandleRing, Market, MarketClock, Side, SideQuotes, Trend};

use super::StrikeTracker;

/// Candle depth used for indicator computation.
pub const INDICATOR_WINDOW: usize = 240;

/// Strategy VWAP is a rolling proxy over the last hour of candles,
/// not a midnight-anchored session.
pub const VWAP_WINDOW: usize = 60;

const RSI_PERIOD: usize = 14;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HeikenState {
    pub color: HaColor,
    pub run: usize,
}

impl HeikenState {
    pub fn matches(&self, side: Side) -> bool {
        matches!(
            (self.color, side),
            (HaColor::Green, Side::Up) | (HaColor::Red, Side::Down)
        )
    }
}

/// Everything the evaluator and probability scorer read, computed in
/// one pass over the candle window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorBundle {
    pub ema9: Option<Decimal>,
    pub ema21: Option<Decimal>,
    pub ema200: Option<Decimal>,
    pub rsi: Option<Decimal>,
    pub rsi_series: Vec<Decimal>,
    pub macd: Option<MacdSnapshot>,
    pub heiken: Option<HeikenState>,
    pub vwap: Option<Decimal>,
    pub vwap_series: Vec<Decimal>,
}

impl IndicatorBundle {
    pub fn compute(candles: &[Candle]) -> Self {
        let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
        let ha = heiken_ashi(candles);
        let vwap_slice = if candles.len() > VWAP_WINDOW {
            &candles[candles.len() - VWAP_WINDOW..]
        } else {
            candles
        };

        Self {
            ema9: ema_last(&closes, 9),
            ema21: ema_last(&closes, 21),
            ema200: ema_last(&closes, 200),
            rsi: rsi_last(&closes, RSI_PERIOD),
            rsi_series: rsi_series(&closes, RSI_PERIOD),
            macd: macd_snapshot(&closes),
            heiken: count_consecutive(&ha).map(|(color, run)| HeikenState { color, run }),
            vwap: session_vwap(vwap_slice),
            vwap_series: vwap_series(vwap_slice),
        }
    }

    /// True once every indicator the strategies read has warmed up.
    /// ema200 is excluded: it needs hours of history and nothing
    /// gates on it.
    pub fn is_formed(&self) -> bool {
        self.ema9.is_some()
            && self.ema21.is_some()
            && self.rsi.is_some()
            && self.macd.is_some()
            && self.heiken.is_some()
            && self.vwap.is_some()
    }
}

/// Unified view of one slow-tick fetch round. The evaluator never
/// sees partially updated data: a snapshot is built once and read
/// many times.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub now_ms: i64,
    pub spot: Decimal,
    pub chainlink: Option<Decimal>,
    pub market: Option<Market>,
    pub strike: Option<Decimal>,
    pub quotes: SideQuotes,
    pub candles: Vec<Candle>,
    pub indicators: IndicatorBundle,
    pub time_left_min: Decimal,
    pub trend: Option<Trend>,
}

impl Snapshot {
    pub fn market_slug(&self) -> Option<&str> {
        self.market.as_ref().map(|m| m.slug.as_str())
    }

    /// Spot distance from the strike; positive above.
    pub fn gap(&self) -> Option<Decimal> {
        self.strike.map(|strike| self.spot - strike)
    }
}

/// Builds snapshots on the slow cadence. Market metadata is cached
/// within `heavy_fetch_interval_ms`; per-side CLOB prices are fetched
/// fresh, each side independently.
pub struct SnapshotAssembler {
    source: Arc<dyn MarketDataSource>,
    heavy_fetch_interval_ms: i64,
    cached_market: Option<Market>,
    market_fetched_at_ms: i64,
}

impl SnapshotAssembler {
    pub fn new(source: Arc<dyn MarketDataSource>, heavy_fetch_interval_ms: i64) -> Self {
        Self {
            source,
            heavy_fetch_interval_ms,
            cached_market: None,
            market_fetched_at_ms: 0,
        }
    }

    async fn market(&mut self, now_ms: i64) -> Option<Market> {
        let cache_expired = now_ms - self.market_fetched_at_ms >= self.heavy_fetch_interval_ms;
        let market_settled = self
            .cached_market
            .as_ref()
            .map(|m| m.end_date_ms <= now_ms)
            .unwrap_or(true);

        if cache_expired || market_settled {
            match self.source.current_market().await {
                Ok(found) => {
                    if let Some(ref m) = found {
                        debug!("Selected market {} (ends {})", m.slug, m.end_date_ms);
                    }
                    self.cached_market = found;
                    self.market_fetched_at_ms = now_ms;
                }
                Err(e) => {
                    warn!("Market metadata fetch failed: {e:#}");
                }
            }
        }
        self.cached_market.clone()
    }

    async fn quotes(&self, market: Option<&Market>) -> SideQuotes {
        let mut quotes = SideQuotes::default();
        let Some(market) = market else {
            return quotes;
        };

        // The two sides are independent fetches against independent
        // tokens; never derive one book from the other.
        if let Some(token) = market.token_for(Side::Up) {
            match self.source.buy_price(token).await {
                Ok(price) => quotes.up = price,
                Err(e) => warn!("UP price fetch failed: {e:#}"),
            }
        }
        if let Some(token) = market.token_for(Side::Down) {
            match self.source.buy_price(token).await {
                Ok(price) => quotes.down = price,
                Err(e) => warn!("DOWN price fetch failed: {e:#}"),
            }
        }
        quotes
    }

    /// One fetch round. Returns None until a spot price exists.
    pub async fn assemble(
        &mut self,
        now_ms: i64,
        spot: Option<Decimal>,
        chainlink: Option<Decimal>,
        ring: &CandleRing,
        strikes: &mut StrikeTracker,
    ) -> Result<Option<Snapshot>> {
        let Some(spot) = spot else {
            return Ok(None);
        };

        let market = self.market(now_ms).await;
        let quotes = self.quotes(market.as_ref()).await;
        let candles = ring.last_n(INDICATOR_WINDOW).to_vec();
        let indicators = IndicatorBundle::compute(&candles);
        let time_left_min = MarketClock::time_left_min(now_ms, market.as_ref());
        let strike = market
            .as_ref()
            .and_then(|m| strikes.resolve(m, chainlink, now_ms));
        let trend = indicators.ema21.map(|ema21| {
            if spot > ema21 {
                Trend::Rising
            } else {
                Trend::Falling
            }
        });

        Ok(Some(Snapshot {
            now_ms,
            spot,
            chainlink,
            market,
            strike,
            quotes,
            candles,
            indicators,
            time_left_min,
            trend,
        }))
    }
}
