//! Settlement engine.
//!
//! Computes the financial outcome of winning the pot at a given round and
//! scans all rounds for the most favorable one. Pure functions over a pot
//! and a bid snapshot — no storage access, no logging, no side effects.

use rust_decimal::Decimal;

use crate::types::{BidBook, HuiError, Metric, Pot, Settlement};

/// Settle a win at round `k` (1-based).
///
/// With M = contribution, N = legs, D = fee, and `T_k` the bid recorded at
/// round k (0 if absent):
///
/// ```text
/// payout(k)  = (k−1)·M + (N−k)·(M − T_k) − D
/// paid(k)    = Σ_{j<k} (M − T_j)
/// profit(k)  = payout(k) − paid(k)
/// roi(k)     = profit(k) / (paid(k) if paid(k) > 0 else M)
/// ```
///
/// Earlier rounds contribute the full M each; the `(N−k)` future
/// contributors each pay the discounted `M − T_k`; the fee comes off once.
pub fn settle_at(pot: &Pot, bids: &BidBook, k: u32) -> Result<Settlement, HuiError> {
    if k < 1 || k > pot.legs {
        return Err(HuiError::Range {
            round: k,
            legs: pot.legs,
        });
    }

    let m = pot.contribution;
    let n = pot.legs as i64;
    let ki = k as i64;

    let winning_bid = bids.bid_at(k);
    let payout = (ki - 1) * m + (n - ki) * (m - winning_bid) - pot.fee();

    // Net contribution over all prior rounds; missing bids count as 0.
    let paid_so_far: i64 = (1..k).map(|j| m - bids.bid_at(j)).sum();

    let profit = payout - paid_so_far;
    let base = if paid_so_far > 0 { paid_so_far } else { m };
    let roi = if base == 0 {
        Decimal::ZERO
    } else {
        Decimal::from(profit) / Decimal::from(base)
    };

    Ok(Settlement {
        round: k,
        payout,
        paid_so_far,
        profit,
        roi,
    })
}

/// Scan rounds 1..=N and return the settlement maximizing `metric`.
///
/// Strict `>` comparison: on ties the lowest round index wins, so
/// recommendations are reproducible. N is bounded by practical group
/// sizes (tens), so the per-round rescan of prior contributions stays
/// cheap.
pub fn best_round(pot: &Pot, bids: &BidBook, metric: Metric) -> Result<Settlement, HuiError> {
    let mut best = settle_at(pot, bids, 1)?;
    for k in 2..=pot.legs {
        let candidate = settle_at(pot, bids, k)?;
        if metric_value(&candidate, metric) > metric_value(&best, metric) {
            best = candidate;
        }
    }
    Ok(best)
}

fn metric_value(s: &Settlement, metric: Metric) -> Decimal {
    match metric {
        Metric::Roi => s.roi,
        Metric::Profit => Decimal::from(s.profit),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewPot, Period};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn make_pot(legs: u32, contribution: i64, fee_pct: Decimal) -> Pot {
        Pot::create(NewPot {
            name: "test".to_string(),
            period: Period::Monthly,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
            legs,
            contribution,
            floor_rate_pct: dec!(0),
            cap_rate_pct: dec!(100),
            fee_rate_pct: fee_pct,
        })
        .unwrap()
    }

    fn book(entries: &[(u32, i64)]) -> BidBook {
        entries.iter().copied().collect()
    }

    // -- settle_at --

    #[test]
    fn test_first_round_no_bids() {
        // legs=12, M=5_000_000, fee=40%: payout = 11·M − 2_000_000
        let pot = make_pot(12, 5_000_000, dec!(40));
        let s = settle_at(&pot, &BidBook::new(), 1).unwrap();
        assert_eq!(s.paid_so_far, 0);
        assert_eq!(s.payout, 53_000_000);
        assert_eq!(s.profit, 53_000_000);
        // base falls back to M when nothing has been paid yet
        assert_eq!(s.roi, dec!(10.6));
    }

    #[test]
    fn test_last_round_future_term_vanishes() {
        let pot = make_pot(5, 1_000_000, dec!(0));
        // A bid at the last round has no remaining contributors to discount
        let bids = book(&[(5, 300_000)]);
        let s = settle_at(&pot, &bids, 5).unwrap();
        assert_eq!(s.payout, 4 * 1_000_000);
        assert_eq!(s.paid_so_far, 4 * 1_000_000);
        assert_eq!(s.profit, 0);
        assert_eq!(s.roi, Decimal::ZERO);
    }

    #[test]
    fn test_winning_bid_discounts_future_rounds() {
        let pot = make_pot(10, 1_000_000, dec!(0));
        let without = settle_at(&pot, &BidBook::new(), 3).unwrap();
        let with = settle_at(&pot, &book(&[(3, 100_000)]), 3).unwrap();
        // 7 future contributors each pay 100_000 less
        assert_eq!(without.payout - with.payout, 7 * 100_000);
        // prior rounds are untouched by the round-3 bid
        assert_eq!(without.paid_so_far, with.paid_so_far);
    }

    #[test]
    fn test_prior_bids_reduce_paid_so_far() {
        let pot = make_pot(10, 1_000_000, dec!(0));
        let bids = book(&[(1, 150_000), (2, 100_000)]);
        let s = settle_at(&pot, &bids, 4).unwrap();
        // rounds 1..3: (M−150k) + (M−100k) + (M−0)
        assert_eq!(s.paid_so_far, 850_000 + 900_000 + 1_000_000);
    }

    #[test]
    fn test_fee_deducted_once() {
        let with_fee = make_pot(10, 1_000_000, dec!(10));
        let no_fee = make_pot(10, 1_000_000, dec!(0));
        let a = settle_at(&with_fee, &BidBook::new(), 4).unwrap();
        let b = settle_at(&no_fee, &BidBook::new(), 4).unwrap();
        assert_eq!(b.payout - a.payout, 100_000);
    }

    #[test]
    fn test_roi_uses_paid_base_after_first_round() {
        let pot = make_pot(4, 1_000_000, dec!(0));
        let s = settle_at(&pot, &BidBook::new(), 3).unwrap();
        // paid = 2M, payout = 2M + 1M = 3M, profit = 1M, roi = 0.5
        assert_eq!(s.paid_so_far, 2_000_000);
        assert_eq!(s.profit, 1_000_000);
        assert_eq!(s.roi, dec!(0.5));
    }

    #[test]
    fn test_single_leg_pot() {
        let pot = make_pot(1, 1_000_000, dec!(10));
        let s = settle_at(&pot, &BidBook::new(), 1).unwrap();
        // no other participants: the "payout" is just the fee going out
        assert_eq!(s.payout, -100_000);
        assert_eq!(s.paid_so_far, 0);
        assert_eq!(s.roi, dec!(-0.1));
    }

    #[test]
    fn test_round_out_of_range() {
        let pot = make_pot(12, 1_000_000, dec!(0));
        assert!(matches!(
            settle_at(&pot, &BidBook::new(), 0),
            Err(HuiError::Range { round: 0, legs: 12 })
        ));
        assert!(matches!(
            settle_at(&pot, &BidBook::new(), 13),
            Err(HuiError::Range { round: 13, legs: 12 })
        ));
    }

    // -- best_round --

    #[test]
    fn test_best_profit_no_bids_is_first_round() {
        // With no bids the payout is flat across rounds while paid-in
        // grows, so profit strictly decreases with k.
        let pot = make_pot(12, 5_000_000, dec!(40));
        let best = best_round(&pot, &BidBook::new(), Metric::Profit).unwrap();
        assert_eq!(best.round, 1);
        assert_eq!(best.profit, 53_000_000);
    }

    #[test]
    fn test_best_roi_no_bids_is_first_round() {
        let pot = make_pot(12, 5_000_000, dec!(40));
        let best = best_round(&pot, &BidBook::new(), Metric::Roi).unwrap();
        assert_eq!(best.round, 1);
    }

    #[test]
    fn test_profit_tie_prefers_lower_round() {
        // N=2, M=100, no fee, T_1=50:
        //   profit(1) = payout(1) = 100−50 = 50
        //   profit(2) = 100 − (100−50) = 50
        let pot = make_pot(2, 100, dec!(0));
        let bids = book(&[(1, 50)]);
        let one = settle_at(&pot, &bids, 1).unwrap();
        let two = settle_at(&pot, &bids, 2).unwrap();
        assert_eq!(one.profit, two.profit);

        let best = best_round(&pot, &bids, Metric::Profit).unwrap();
        assert_eq!(best.round, 1);
    }

    #[test]
    fn test_metric_changes_winner() {
        // Same setup as the tie test: equal profit, but round 2's base is
        // the discounted 50 actually paid in, so its ROI is higher.
        let pot = make_pot(2, 100, dec!(0));
        let bids = book(&[(1, 50)]);
        let best = best_round(&pot, &bids, Metric::Roi).unwrap();
        assert_eq!(best.round, 2);
        assert_eq!(best.roi, dec!(1));
    }

    #[test]
    fn test_best_round_single_leg() {
        let pot = make_pot(1, 1_000_000, dec!(0));
        let best = best_round(&pot, &BidBook::new(), Metric::Roi).unwrap();
        assert_eq!(best.round, 1);
    }

    #[test]
    fn test_heavy_early_bids_favor_waiting() {
        // Big discounts on early rounds make paying in cheap; winning later
        // collects full contributions while having paid discounted ones.
        let pot = make_pot(6, 1_000_000, dec!(0));
        let bids = book(&[(1, 500_000), (2, 500_000), (3, 500_000)]);
        let best = best_round(&pot, &bids, Metric::Profit).unwrap();
        assert!(best.round > 1, "expected a later round, got {}", best.round);

        // And it agrees with an exhaustive scan
        let mut expect = settle_at(&pot, &bids, 1).unwrap();
        for k in 2..=6 {
            let s = settle_at(&pot, &bids, k).unwrap();
            if s.profit > expect.profit {
                expect = s;
            }
        }
        assert_eq!(best.round, expect.round);
    }
}
