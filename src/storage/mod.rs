//! Persistence layer.
//!
//! The core consumes storage through the [`RecordStore`] trait; the
//! production implementation is SQLite via `sqlx` (WAL mode, foreign keys
//! on). Single-key writes are serialized by SQLite itself, which is the
//! only concurrency guarantee the core relies on: bid upserts are atomic
//! per `(pot_id, round)` and the last writer wins.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{
    BidBook, HuiError, Payment, Period, Pot, PotId, PotStatus, ReminderTime, RoundEntry,
};

// ---------------------------------------------------------------------------
// Store abstraction
// ---------------------------------------------------------------------------

/// Abstraction over the record store holding pots, bids, and payments.
///
/// All write operations are atomic per key; `upsert_bid` is
/// last-write-wins on `(pot_id, round)`. Read operations return
/// snapshots — callers must treat them as potentially stale.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_pot(&self, pot: &Pot) -> Result<(), HuiError>;

    /// Load a pot by id. `NotFound` when absent.
    async fn load_pot(&self, id: PotId) -> Result<Pot, HuiError>;

    async fn list_pots(&self) -> Result<Vec<Pot>, HuiError>;

    /// Mark a pot CLOSED. Terminal; there is no reopen.
    async fn close_pot(&self, id: PotId) -> Result<(), HuiError>;

    async fn set_reminder(&self, id: PotId, reminder: ReminderTime) -> Result<(), HuiError>;

    /// Delete a pot and, by cascade, its rounds and payments.
    async fn delete_pot(&self, id: PotId) -> Result<(), HuiError>;

    /// Insert or overwrite the bid for `(pot_id, round)`.
    async fn upsert_bid(
        &self,
        id: PotId,
        round: u32,
        amount: i64,
        round_date: Option<NaiveDate>,
    ) -> Result<(), HuiError>;

    /// Bid amounts keyed by round index — the settlement snapshot.
    async fn bids_for(&self, id: PotId) -> Result<BidBook, HuiError>;

    /// Full bid records including explicit dates, ascending by round.
    async fn round_entries(&self, id: PotId) -> Result<Vec<RoundEntry>, HuiError>;

    async fn record_payment(
        &self,
        id: PotId,
        pay_date: NaiveDate,
        amount: i64,
    ) -> Result<(), HuiError>;

    async fn payments_for(&self, id: PotId) -> Result<Vec<Payment>, HuiError>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

const DATE_FMT: &str = "%Y-%m-%d";

/// SQLite-backed [`RecordStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the database at `path`, creating the file (and its parent
    /// directory) if missing. Schema creation is a separate, explicit
    /// [`migrate`](Self::migrate) call.
    pub async fn connect(path: &str) -> Result<Self, HuiError> {
        if let Some(dir) = Path::new(path).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .map_err(|e| HuiError::Storage(format!("cannot create {}: {e}", dir.display())))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!(path, "SQLite store ready");
        Ok(Self { pool })
    }

    /// Light migration: create tables if they don't exist.
    pub async fn migrate(&self) -> Result<(), HuiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pots(
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                period_days INTEGER NOT NULL,
                start_date TEXT NOT NULL,
                legs INTEGER NOT NULL,
                contribution INTEGER NOT NULL,
                floor_rate_pct TEXT NOT NULL,
                cap_rate_pct TEXT NOT NULL,
                fee_rate_pct TEXT NOT NULL,
                status TEXT NOT NULL,
                remind_hour INTEGER NOT NULL DEFAULT 8,
                remind_min INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rounds(
                pot_id TEXT NOT NULL REFERENCES pots(id) ON DELETE CASCADE,
                k INTEGER NOT NULL,
                bid INTEGER NOT NULL,
                round_date TEXT,
                PRIMARY KEY(pot_id, k)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS payments(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pot_id TEXT NOT NULL REFERENCES pots(id) ON DELETE CASCADE,
                pay_date TEXT NOT NULL,
                amount INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        debug!("migrations complete");
        Ok(())
    }
}

fn pot_from_row(row: &SqliteRow) -> Result<Pot, HuiError> {
    let corrupt = |what: &str| HuiError::Storage(format!("corrupt pot record: bad {what}"));

    let id: String = row.try_get("id")?;
    let period_days: i64 = row.try_get("period_days")?;
    let start_date: String = row.try_get("start_date")?;
    let status: String = row.try_get("status")?;
    let legs: i64 = row.try_get("legs")?;
    let floor: String = row.try_get("floor_rate_pct")?;
    let cap: String = row.try_get("cap_rate_pct")?;
    let fee: String = row.try_get("fee_rate_pct")?;
    let remind_hour: i64 = row.try_get("remind_hour")?;
    let remind_min: i64 = row.try_get("remind_min")?;

    Ok(Pot {
        id: Uuid::parse_str(&id).map_err(|_| corrupt("id"))?,
        name: row.try_get("name")?,
        period: Period::from_days(period_days).ok_or_else(|| corrupt("period"))?,
        start_date: NaiveDate::parse_from_str(&start_date, DATE_FMT)
            .map_err(|_| corrupt("start_date"))?,
        legs: legs as u32,
        contribution: row.try_get("contribution")?,
        floor_rate_pct: Decimal::from_str(&floor).map_err(|_| corrupt("floor_rate_pct"))?,
        cap_rate_pct: Decimal::from_str(&cap).map_err(|_| corrupt("cap_rate_pct"))?,
        fee_rate_pct: Decimal::from_str(&fee).map_err(|_| corrupt("fee_rate_pct"))?,
        status: match status.as_str() {
            "OPEN" => PotStatus::Open,
            "CLOSED" => PotStatus::Closed,
            _ => return Err(corrupt("status")),
        },
        reminder: ReminderTime {
            hour: remind_hour as u8,
            minute: remind_min as u8,
        },
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn create_pot(&self, pot: &Pot) -> Result<(), HuiError> {
        sqlx::query(
            "INSERT INTO pots(id, name, period_days, start_date, legs, contribution,
                              floor_rate_pct, cap_rate_pct, fee_rate_pct, status,
                              remind_hour, remind_min)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(pot.id.to_string())
        .bind(&pot.name)
        .bind(pot.period.days())
        .bind(pot.start_date.format(DATE_FMT).to_string())
        .bind(pot.legs as i64)
        .bind(pot.contribution)
        .bind(pot.floor_rate_pct.to_string())
        .bind(pot.cap_rate_pct.to_string())
        .bind(pot.fee_rate_pct.to_string())
        .bind(pot.status.to_string())
        .bind(pot.reminder.hour as i64)
        .bind(pot.reminder.minute as i64)
        .execute(&self.pool)
        .await?;

        debug!(pot_id = %pot.id, name = %pot.name, "Pot created");
        Ok(())
    }

    async fn load_pot(&self, id: PotId) -> Result<Pot, HuiError> {
        let row = sqlx::query("SELECT * FROM pots WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| HuiError::NotFound(format!("pot {id}")))?;
        pot_from_row(&row)
    }

    async fn list_pots(&self) -> Result<Vec<Pot>, HuiError> {
        let rows = sqlx::query("SELECT * FROM pots ORDER BY start_date, name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(pot_from_row).collect()
    }

    async fn close_pot(&self, id: PotId) -> Result<(), HuiError> {
        let result = sqlx::query("UPDATE pots SET status = 'CLOSED' WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(HuiError::NotFound(format!("pot {id}")));
        }
        info!(pot_id = %id, "Pot closed");
        Ok(())
    }

    async fn set_reminder(&self, id: PotId, reminder: ReminderTime) -> Result<(), HuiError> {
        let result = sqlx::query("UPDATE pots SET remind_hour = ?, remind_min = ? WHERE id = ?")
            .bind(reminder.hour as i64)
            .bind(reminder.minute as i64)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(HuiError::NotFound(format!("pot {id}")));
        }
        debug!(pot_id = %id, reminder = %reminder, "Reminder updated");
        Ok(())
    }

    async fn delete_pot(&self, id: PotId) -> Result<(), HuiError> {
        let result = sqlx::query("DELETE FROM pots WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(HuiError::NotFound(format!("pot {id}")));
        }
        info!(pot_id = %id, "Pot deleted");
        Ok(())
    }

    async fn upsert_bid(
        &self,
        id: PotId,
        round: u32,
        amount: i64,
        round_date: Option<NaiveDate>,
    ) -> Result<(), HuiError> {
        sqlx::query(
            "INSERT INTO rounds(pot_id, k, bid, round_date) VALUES(?, ?, ?, ?)
             ON CONFLICT(pot_id, k) DO UPDATE
             SET bid = excluded.bid, round_date = excluded.round_date",
        )
        .bind(id.to_string())
        .bind(round as i64)
        .bind(amount)
        .bind(round_date.map(|d| d.format(DATE_FMT).to_string()))
        .execute(&self.pool)
        .await?;

        debug!(pot_id = %id, round, amount, "Bid upserted");
        Ok(())
    }

    async fn bids_for(&self, id: PotId) -> Result<BidBook, HuiError> {
        let rows = sqlx::query("SELECT k, bid FROM rounds WHERE pot_id = ?")
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let k: i64 = row.try_get("k")?;
                let bid: i64 = row.try_get("bid")?;
                Ok((k as u32, bid))
            })
            .collect()
    }

    async fn round_entries(&self, id: PotId) -> Result<Vec<RoundEntry>, HuiError> {
        let rows = sqlx::query("SELECT k, bid, round_date FROM rounds WHERE pot_id = ? ORDER BY k")
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let k: i64 = row.try_get("k")?;
                let bid: i64 = row.try_get("bid")?;
                let date: Option<String> = row.try_get("round_date")?;
                let round_date = match date {
                    Some(d) => Some(
                        NaiveDate::parse_from_str(&d, DATE_FMT)
                            .map_err(|_| HuiError::Storage("corrupt round date".to_string()))?,
                    ),
                    None => None,
                };
                Ok(RoundEntry {
                    pot_id: id,
                    round: k as u32,
                    amount: bid,
                    round_date,
                })
            })
            .collect()
    }

    async fn record_payment(
        &self,
        id: PotId,
        pay_date: NaiveDate,
        amount: i64,
    ) -> Result<(), HuiError> {
        sqlx::query("INSERT INTO payments(pot_id, pay_date, amount) VALUES(?, ?, ?)")
            .bind(id.to_string())
            .bind(pay_date.format(DATE_FMT).to_string())
            .bind(amount)
            .execute(&self.pool)
            .await?;
        debug!(pot_id = %id, amount, "Payment recorded");
        Ok(())
    }

    async fn payments_for(&self, id: PotId) -> Result<Vec<Payment>, HuiError> {
        let rows =
            sqlx::query("SELECT pay_date, amount FROM payments WHERE pot_id = ? ORDER BY pay_date, id")
                .bind(id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.iter()
            .map(|row| {
                let date: String = row.try_get("pay_date")?;
                let amount: i64 = row.try_get("amount")?;
                Ok(Payment {
                    pot_id: id,
                    pay_date: NaiveDate::parse_from_str(&date, DATE_FMT)
                        .map_err(|_| HuiError::Storage("corrupt payment date".to_string()))?,
                    amount,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
