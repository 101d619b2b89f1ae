//! Shared types for the HUIBOT service.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that storage, ledger, settlement,
//! and gateway modules can depend on them without circular references.

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Opaque pot identifier, assigned at creation.
pub type PotId = Uuid;

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

/// Calendar spacing between rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    Weekly,
    Monthly,
}

impl Period {
    /// Days between consecutive rounds.
    pub fn days(&self) -> i64 {
        match self {
            Period::Weekly => 7,
            Period::Monthly => 30,
        }
    }

    /// Reconstruct from a stored day count.
    pub fn from_days(days: i64) -> Option<Self> {
        match days {
            7 => Some(Period::Weekly),
            30 => Some(Period::Monthly),
            _ => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Weekly => write!(f, "weekly"),
            Period::Monthly => write!(f, "monthly"),
        }
    }
}

/// Attempt to parse a string into a Period (case-insensitive).
/// Accepts the Vietnamese cycle names used in chat commands.
impl std::str::FromStr for Period {
    type Err = HuiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tuan" | "week" | "weekly" | "7" => Ok(Period::Weekly),
            "thang" | "month" | "monthly" | "30" => Ok(Period::Monthly),
            _ => Err(HuiError::Parse {
                what: "period",
                input: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Pot status & reminder
// ---------------------------------------------------------------------------

/// Pot lifecycle status. OPEN at creation; CLOSED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PotStatus {
    Open,
    Closed,
}

impl fmt::Display for PotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PotStatus::Open => write!(f, "OPEN"),
            PotStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Daily reminder time, informational only — exposed to the external
/// scheduler, never acted on inside this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderTime {
    pub hour: u8,
    pub minute: u8,
}

impl Default for ReminderTime {
    fn default() -> Self {
        // 08:00, the long-standing bot default
        Self { hour: 8, minute: 0 }
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Parse "HH:MM".
impl std::str::FromStr for ReminderTime {
    type Err = HuiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || HuiError::Parse {
            what: "reminder time",
            input: s.to_string(),
        };
        let (h, m) = s.trim().split_once(':').ok_or_else(parse_err)?;
        let hour: u8 = h.parse().map_err(|_| parse_err())?;
        let minute: u8 = m.parse().map_err(|_| parse_err())?;
        if hour > 23 || minute > 59 {
            return Err(parse_err());
        }
        Ok(Self { hour, minute })
    }
}

// ---------------------------------------------------------------------------
// Pot
// ---------------------------------------------------------------------------

/// Input for creating a pot. Validated by [`Pot::create`].
#[derive(Debug, Clone)]
pub struct NewPot {
    pub name: String,
    pub period: Period,
    pub start_date: NaiveDate,
    /// Total number of rounds = total number of participants.
    pub legs: u32,
    /// Base amount every non-winning participant pays each round.
    pub contribution: i64,
    pub floor_rate_pct: Decimal,
    pub cap_rate_pct: Decimal,
    pub fee_rate_pct: Decimal,
}

/// One savings cycle: a fixed group, fixed contribution, fixed round count.
///
/// Immutable configuration apart from `status` (explicit close) and
/// `reminder` (informational).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pot {
    pub id: PotId,
    pub name: String,
    pub period: Period,
    /// Calendar date of round 1.
    pub start_date: NaiveDate,
    pub legs: u32,
    pub contribution: i64,
    /// Minimum allowed bid as a percentage of the contribution.
    pub floor_rate_pct: Decimal,
    /// Maximum allowed bid as a percentage of the contribution.
    pub cap_rate_pct: Decimal,
    /// Administrative fee taken from the winner's payout, percentage of
    /// the contribution.
    pub fee_rate_pct: Decimal,
    pub status: PotStatus,
    pub reminder: ReminderTime,
}

impl Pot {
    /// Validate and create a pot. Fails with `Validation` identifying the
    /// violated constraint; never partially succeeds.
    pub fn create(new: NewPot) -> Result<Self, HuiError> {
        let pct = |label: &str, v: Decimal| -> Result<(), HuiError> {
            if v < Decimal::ZERO || v > dec!(100) {
                Err(HuiError::Validation(format!(
                    "{label} rate must be between 0 and 100, got {v}"
                )))
            } else {
                Ok(())
            }
        };

        if new.legs < 1 {
            return Err(HuiError::Validation("legs must be at least 1".into()));
        }
        if new.contribution <= 0 {
            return Err(HuiError::Validation(format!(
                "contribution must be positive, got {}",
                new.contribution
            )));
        }
        pct("floor", new.floor_rate_pct)?;
        pct("cap", new.cap_rate_pct)?;
        pct("fee", new.fee_rate_pct)?;
        if new.floor_rate_pct > new.cap_rate_pct {
            return Err(HuiError::Validation(format!(
                "floor rate {} must not exceed cap rate {}",
                new.floor_rate_pct, new.cap_rate_pct
            )));
        }

        Ok(Pot {
            id: Uuid::new_v4(),
            name: new.name,
            period: new.period,
            start_date: new.start_date,
            legs: new.legs,
            contribution: new.contribution,
            floor_rate_pct: new.floor_rate_pct,
            cap_rate_pct: new.cap_rate_pct,
            fee_rate_pct: new.fee_rate_pct,
            status: PotStatus::Open,
            reminder: ReminderTime::default(),
        })
    }

    /// Calendar date of round `k` (1-based): `start_date + (k-1) × period`.
    pub fn round_date(&self, k: u32) -> NaiveDate {
        self.start_date
            + chrono::Duration::days(k.saturating_sub(1) as i64 * self.period.days())
    }

    /// True once the pot is closed or the last round's date has arrived.
    pub fn is_finished(&self, today: NaiveDate) -> bool {
        self.status == PotStatus::Closed || today >= self.round_date(self.legs)
    }

    pub fn is_open(&self) -> bool {
        self.status == PotStatus::Open
    }

    /// Administrative fee in currency units: round(M × feeRatePct / 100).
    pub fn fee(&self) -> i64 {
        rate_of(self.contribution, self.fee_rate_pct)
    }

    /// Minimum allowed bid for this pot.
    pub fn min_bid(&self) -> i64 {
        rate_of(self.contribution, self.floor_rate_pct)
    }

    /// Maximum allowed bid for this pot.
    pub fn max_bid(&self) -> i64 {
        rate_of(self.contribution, self.cap_rate_pct)
    }

    /// Inclusive `[min, max]` bid window.
    pub fn bid_window(&self) -> (i64, i64) {
        (self.min_bid(), self.max_bid())
    }

    /// Helper to build a test pot with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        Pot::create(NewPot {
            name: "hui thang 12".to_string(),
            period: Period::Monthly,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
            legs: 12,
            contribution: 5_000_000,
            floor_rate_pct: dec!(4.5),
            cap_rate_pct: dec!(15),
            fee_rate_pct: dec!(40),
        })
        .unwrap()
    }
}

impl fmt::Display for Pot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} | {} legs x {} | bids {}%-{}% | fee {}% | from {}",
            self.name,
            self.status,
            self.period,
            self.legs,
            format_amount(self.contribution),
            self.floor_rate_pct.normalize(),
            self.cap_rate_pct.normalize(),
            self.fee_rate_pct.normalize(),
            self.start_date.format("%d-%m-%Y"),
        )
    }
}

/// Round-half-up `rate_pct` percent of `amount`. The single rounding
/// convention for every derived monetary amount (fee, bid bounds).
fn rate_of(amount: i64, rate_pct: Decimal) -> i64 {
    (Decimal::from(amount) * rate_pct / dec!(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Bids
// ---------------------------------------------------------------------------

/// One bid record, keyed by `(pot_id, round)`, unique per pot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundEntry {
    pub pot_id: PotId,
    /// 1-based round index.
    pub round: u32,
    /// Discount amount the winner of that round forwent.
    pub amount: i64,
    /// Optional explicit date overriding the computed calendar date.
    pub round_date: Option<NaiveDate>,
}

impl fmt::Display for RoundEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "k={} bid={}", self.round, format_amount(self.amount))?;
        if let Some(d) = self.round_date {
            write!(f, " ({})", d.format("%d-%m-%Y"))?;
        }
        Ok(())
    }
}

/// Read-only snapshot of a pot's recorded bids, ordered by round index.
///
/// Rounds with no entry are treated as bid amount 0 — settlement never
/// needs to distinguish "absent" from "no discount".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidBook(BTreeMap<u32, i64>);

impl BidBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bid amount at round `k`, 0 when no entry is recorded.
    pub fn bid_at(&self, k: u32) -> i64 {
        self.0.get(&k).copied().unwrap_or(0)
    }

    pub fn set(&mut self, k: u32, amount: i64) {
        self.0.insert(k, amount);
    }

    /// Recorded entries only, ascending by round index.
    pub fn iter(&self) -> impl Iterator<Item = (u32, i64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(u32, i64)> for BidBook {
    fn from_iter<I: IntoIterator<Item = (u32, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

/// Informational payment record for a pot. Not used in settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub pot_id: PotId,
    pub pay_date: NaiveDate,
    pub amount: i64,
}

impl fmt::Display for Payment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.pay_date.format("%d-%m-%Y"),
            format_amount(self.amount)
        )
    }
}

// ---------------------------------------------------------------------------
// Settlement results
// ---------------------------------------------------------------------------

/// Financial outcome of winning the pot at a specific round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// 1-based round index this settlement was computed for.
    pub round: u32,
    /// Amount collected when winning at this round, net of the fee.
    pub payout: i64,
    /// Net amount contributed over all prior rounds.
    pub paid_so_far: i64,
    pub profit: i64,
    /// Profit over the base actually paid in (or the nominal contribution
    /// if nothing has been paid yet).
    pub roi: Decimal,
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "k={} | payout={} | paid={} | profit={} | roi={}%",
            self.round,
            format_amount(self.payout),
            format_amount(self.paid_so_far),
            format_amount(self.profit),
            (self.roi * dec!(100)).round_dp(1).normalize(),
        )
    }
}

/// Metric maximized by the best-round search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    Roi,
    Profit,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Roi => write!(f, "ROI"),
            Metric::Profit => write!(f, "profit"),
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = HuiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "roi" | "return" => Ok(Metric::Roi),
            "profit" | "loi" => Ok(Metric::Profit),
            _ => Err(HuiError::Parse {
                what: "metric",
                input: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Group an amount in thousands with `.`, the same separator
/// [`crate::parse::parse_money`] accepts on input: `5000000` → `5.000.000`.
pub fn format_amount(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for HUIBOT. All are local, recoverable
/// conditions surfaced to the caller; none is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum HuiError {
    #[error("Cannot parse {what}: {input:?}")]
    Parse { what: &'static str, input: String },

    #[error("Invalid pot configuration: {0}")]
    Validation(String),

    #[error("Round {round} outside 1..={legs}")]
    Range { round: u32, legs: u32 },

    #[error("Bid {amount} outside allowed window [{min}, {max}]")]
    Bounds { amount: i64, min: i64, max: i64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for HuiError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => HuiError::NotFound("no matching record".to_string()),
            other => HuiError::Storage(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
