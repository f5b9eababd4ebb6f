use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

/// One row per slow tick: what the model saw and what it recommended.
#[derive(Debug, Clone)]
pub struct SignalRow {
    pub timestamp: DateTime<Utc>,
    pub time_left_min: Decimal,
    pub regime: String,
    pub signal: String,
    pub model_prob_up: Option<Decimal>,
    pub model_prob_down: Option<Decimal>,
    pub market_prob_up: Option<Decimal>,
    pub market_prob_down: Option<Decimal>,
    pub edge_up: Option<Decimal>,
    pub edge_down: Option<Decimal>,
    pub recommendation: String,
    pub strike: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub binance_price: Option<Decimal>,
    pub gap: Option<Decimal>,
}

/// One row per open or close action of the paper trader.
#[derive(Debug, Clone)]
pub struct PaperTradeRow {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub side: String,
    pub price: Decimal,
    pub amount: Decimal,
    pub shares: Decimal,
    pub pnl: Option<Decimal>,
    pub balance: Decimal,
    pub market_slug: String,
    pub fee: Decimal,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct WinStats {
    pub today_wins: u64,
    pub today_total: u64,
    pub overall_wins: u64,
    pub overall_total: u64,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(db_path: &str) -> Result<Self> {
        info!("Initializing SQLite database at: {}", db_path);

        let options = SqliteConnectOptions::from_str(db_path)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.create_schema().await?;

        info!("Database initialized");
        Ok(db)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                time_left_min TEXT NOT NULL,
                regime TEXT NOT NULL,
                signal TEXT NOT NULL,
                model_prob_up TEXT,
                model_prob_down TEXT,
                market_prob_up TEXT,
                market_prob_down TEXT,
                edge_up TEXT,
                edge_down TEXT,
                recommendation TEXT NOT NULL,
                strike TEXT,
                current_price TEXT,
                binance_price TEXT,
                gap TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_signals_timestamp ON signals(timestamp)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS paper_trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                action TEXT NOT NULL,
                side TEXT NOT NULL,
                price TEXT NOT NULL,
                amount TEXT NOT NULL,
                shares TEXT NOT NULL,
                pnl TEXT,
                balance TEXT NOT NULL,
                market_slug TEXT NOT NULL,
                fee TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_paper_trades_timestamp ON paper_trades(timestamp)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_paper_trades_slug ON paper_trades(market_slug)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn opt(value: Option<Decimal>) -> Option<String> {
        value.map(|v| v.to_string())
    }

    pub async fn insert_signal(&self, row: &SignalRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signals (
                timestamp, time_left_min, regime, signal,
                model_prob_up, model_prob_down, market_prob_up, market_prob_down,
                edge_up, edge_down, recommendation, strike,
                current_price, binance_price, gap
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.timestamp.to_rfc3339())
        .bind(row.time_left_min.to_string())
        .bind(&row.regime)
        .bind(&row.signal)
        .bind(Self::opt(row.model_prob_up))
        .bind(Self::opt(row.model_prob_down))
        .bind(Self::opt(row.market_prob_up))
        .bind(Self::opt(row.market_prob_down))
        .bind(Self::opt(row.edge_up))
        .bind(Self::opt(row.edge_down))
        .bind(&row.recommendation)
        .bind(Self::opt(row.strike))
        .bind(Self::opt(row.current_price))
        .bind(Self::opt(row.binance_price))
        .bind(Self::opt(row.gap))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_paper_trade(&self, row: &PaperTradeRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO paper_trades (
                timestamp, action, side, price, amount, shares,
                pnl, balance, market_slug, fee
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.timestamp.to_rfc3339())
        .bind(&row.action)
        .bind(&row.side)
        .bind(row.price.to_string())
        .bind(row.amount.to_string())
        .bind(row.shares.to_string())
        .bind(Self::opt(row.pnl))
        .bind(row.balance.to_string())
        .bind(&row.market_slug)
        .bind(row.fee.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Recent close actions, newest first, for the dashboard trade
    /// list.
    pub async fn recent_closes(&self, limit: u32) -> Result<Vec<PaperTradeRow>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, action, side, price, amount, shares,
                   pnl, balance, market_slug, fee
            FROM paper_trades
            WHERE action = 'CLOSE'
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let parse = |name: &str| -> Decimal {
                row.get::<String, _>(name)
                    .parse()
                    .unwrap_or(Decimal::ZERO)
            };
            out.push(PaperTradeRow {
                timestamp: DateTime::parse_from_rfc3339(&row.get::<String, _>("timestamp"))
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                action: row.get("action"),
                side: row.get("side"),
                price: parse("price"),
                amount: parse("amount"),
                shares: parse("shares"),
                pnl: row
                    .get::<Option<String>, _>("pnl")
                    .and_then(|p| p.parse().ok()),
                balance: parse("balance"),
                market_slug: row.get("market_slug"),
                fee: parse("fee"),
            });
        }
        Ok(out)
    }

    /// Win/loss counts for the dashboard, today (UTC) and overall.
    pub async fn win_stats(&self, now: DateTime<Utc>) -> Result<WinStats> {
        let today_prefix = now.format("%Y-%m-%d").to_string();

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                SUM(CASE WHEN CAST(pnl AS REAL) > 0 THEN 1 ELSE 0 END) AS wins,
                SUM(CASE WHEN timestamp LIKE ? || '%' THEN 1 ELSE 0 END) AS today_total,
                SUM(CASE WHEN timestamp LIKE ? || '%' AND CAST(pnl AS REAL) > 0
                    THEN 1 ELSE 0 END) AS today_wins
            FROM paper_trades
            WHERE action = 'CLOSE' AND pnl IS NOT NULL
            "#,
        )
        .bind(&today_prefix)
        .bind(&today_prefix)
        .fetch_one(&self.pool)
        .await?;

        Ok(WinStats {
            today_wins: row.get::<Option<i64>, _>("today_wins").unwrap_or(0) as u64,
            today_total: row.get::<Option<i64>, _>("today_total").unwrap_or(0) as u64,
            overall_wins: row.get::<Option<i64>, _>("wins").unwrap_or(0) as u64,
            overall_total: row.get::<i64, _>("total") as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // A file-backed db: with a pooled ":memory:" each connection
    // would see its own empty database.
    async fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("test.db").display());
        (Database::new(&url).await.unwrap(), dir)
    }

    fn close_row(pnl: Decimal, timestamp: DateTime<Utc>) -> PaperTradeRow {
        PaperTradeRow {
            timestamp,
            action: "CLOSE".to_string(),
            side: "UP".to_string(),
            price: dec!(1),
            amount: dec!(4),
            shares: dec!(8),
            pnl: Some(pnl),
            balance: dec!(104),
            market_slug: "btc-1".to_string(),
            fee: Decimal::ZERO,
        }
    }

    #[tokio::test]
    async fn signals_round_trip() {
        let (db, _dir) = temp_db().await;
        let row = SignalRow {
            timestamp: Utc::now(),
            time_left_min: dec!(5.5),
            regime: "RISING".to_string(),
            signal: "ENTER".to_string(),
            model_prob_up: Some(dec!(0.64)),
            model_prob_down: Some(dec!(0.36)),
            market_prob_up: Some(dec!(0.60)),
            market_prob_down: Some(dec!(0.38)),
            edge_up: Some(dec!(0.04)),
            edge_down: Some(dec!(-0.02)),
            recommendation: "momentum up".to_string(),
            strike: Some(dec!(100000)),
            current_price: Some(dec!(100150)),
            binance_price: Some(dec!(100200)),
            gap: Some(dec!(200)),
        };
        db.insert_signal(&row).await.unwrap();
    }

    #[tokio::test]
    async fn win_stats_split_today_from_overall() {
        let (db, _dir) = temp_db().await;
        let now = Utc::now();
        let yesterday = now - chrono::Duration::days(1);

        db.insert_paper_trade(&close_row(dec!(3), now)).await.unwrap();
        db.insert_paper_trade(&close_row(dec!(-2), now)).await.unwrap();
        db.insert_paper_trade(&close_row(dec!(5), yesterday)).await.unwrap();

        let stats = db.win_stats(now).await.unwrap();
        assert_eq!(stats.today_total, 2);
        assert_eq!(stats.today_wins, 1);
        assert_eq!(stats.overall_total, 3);
        assert_eq!(stats.overall_wins, 2);
    }

    #[tokio::test]
    async fn recent_closes_skip_opens() {
        let (db, _dir) = temp_db().await;
        let now = Utc::now();
        let mut open = close_row(dec!(0), now);
        open.action = "OPEN".to_string();
        open.pnl = None;
        db.insert_paper_trade(&open).await.unwrap();
        db.insert_paper_trade(&close_row(dec!(2), now)).await.unwrap();

        let closes = db.recent_closes(10).await.unwrap();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].pnl, Some(dec!(2)));
    }
}
