//! Round ledger — validated storage and retrieval of bids.
//!
//! Sits between the gateway and the record store: checks the round index
//! against the pot's leg count and the bid amount against the pot's
//! floor/cap window before the store's atomic upsert. The validation
//! itself is pure and usable without a store.

use chrono::NaiveDate;
use std::sync::Arc;

use crate::storage::RecordStore;
use crate::types::{BidBook, HuiError, Pot, PotId, RoundEntry};

pub struct Ledger {
    store: Arc<dyn RecordStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Validate a bid against a pot without touching storage.
    ///
    /// `Range` when the round index is outside `[1, legs]`; `Bounds` when
    /// the amount falls outside the pot's inclusive `[min, max]` window.
    pub fn check_bid(pot: &Pot, round: u32, amount: i64) -> Result<(), HuiError> {
        if round < 1 || round > pot.legs {
            return Err(HuiError::Range {
                round,
                legs: pot.legs,
            });
        }
        let (min, max) = pot.bid_window();
        if amount < min || amount > max {
            return Err(HuiError::Bounds { amount, min, max });
        }
        Ok(())
    }

    /// Validate and upsert a bid. Re-submitting the same round overwrites
    /// the prior value (last write wins).
    pub async fn set_bid(
        &self,
        pot: &Pot,
        round: u32,
        amount: i64,
        round_date: Option<NaiveDate>,
    ) -> Result<(), HuiError> {
        Self::check_bid(pot, round, amount)?;
        self.store.upsert_bid(pot.id, round, amount, round_date).await
    }

    /// Snapshot of the recorded bids for settlement.
    pub async fn bids(&self, pot_id: PotId) -> Result<BidBook, HuiError> {
        self.store.bids_for(pot_id).await
    }

    /// Full bid records, ascending by round, for display.
    pub async fn entries(&self, pot_id: PotId) -> Result<Vec<RoundEntry>, HuiError> {
        self.store.round_entries(pot_id).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
