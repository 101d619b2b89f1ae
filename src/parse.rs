//! Value parsers for chat input.
//!
//! Turn free-form textual amounts, percentages, and dates into exact
//! values, tolerant of the shorthand people actually type: thousands
//! separators, `2tr`/`500k` money suffixes, decimal commas, two-digit
//! years. Range validation is the caller's job — these only normalize.

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use crate::types::HuiError;

/// Parse a money amount into whole currency units.
///
/// Thousands separators (`,`, `.`, `_`, spaces) are ignored when the rest
/// is all digits. Otherwise a case-insensitive magnitude suffix is
/// recognized — `tr`/`m`/`t` for millions, `k`/`n` for thousands — applied
/// to the decimal prefix and truncated to an integer: `2.5tr` → 2_500_000.
pub fn parse_money(text: &str) -> Result<i64, HuiError> {
    let err = || HuiError::Parse {
        what: "money",
        input: text.to_string(),
    };
    let t = text.trim().to_lowercase();

    // Plain number with optional grouping: 2.000.000 / 2,000,000 / 2 000 000
    let compact: String = t
        .chars()
        .filter(|c| !matches!(c, ',' | '.' | '_' | ' '))
        .collect();
    if !compact.is_empty() && compact.chars().all(|c| c.is_ascii_digit()) {
        return compact.parse::<i64>().map_err(|_| err());
    }

    // Suffix shorthand. "tr" before "t" — both mean millions.
    let (prefix, scale) = if let Some(p) = t.strip_suffix("tr") {
        (p, 1_000_000i64)
    } else if let Some(p) = t.strip_suffix('m').or_else(|| t.strip_suffix('t')) {
        (p, 1_000_000)
    } else if let Some(p) = t.strip_suffix('k').or_else(|| t.strip_suffix('n')) {
        (p, 1_000)
    } else {
        return Err(err());
    };

    let prefix = prefix.trim().replace(',', ".").replace(['_', ' '], "");
    if prefix.is_empty() {
        return Err(err());
    }
    let value = prefix.parse::<Decimal>().map_err(|_| err())?;
    (value * Decimal::from(scale)).trunc().to_i64().ok_or_else(err)
}

/// Parse a percentage: trailing `%` and spaces stripped, decimal comma
/// accepted. No range clamping here.
pub fn parse_percent(text: &str) -> Result<Decimal, HuiError> {
    let err = || HuiError::Parse {
        what: "percent",
        input: text.to_string(),
    };
    let t = text.trim().trim_end_matches('%').trim().replace(',', ".");
    if t.is_empty() {
        return Err(err());
    }
    t.parse::<Decimal>().map_err(|_| err())
}

/// Parse a user-entered date, `DD-MM-YYYY` or `DD/MM/YYYY`.
/// A two-digit year is promoted by adding 2000.
pub fn parse_user_date(text: &str) -> Result<NaiveDate, HuiError> {
    let err = || HuiError::Parse {
        what: "date",
        input: text.to_string(),
    };
    let parts: Vec<&str> = text.trim().split(['-', '/']).collect();
    if parts.len() != 3 {
        return Err(err());
    }
    let day: u32 = parts[0].trim().parse().map_err(|_| err())?;
    let month: u32 = parts[1].trim().parse().map_err(|_| err())?;
    let mut year: i32 = parts[2].trim().parse().map_err(|_| err())?;
    if (0..100).contains(&year) {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(err)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
