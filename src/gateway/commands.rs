//! Command dispatch.
//!
//! The messaging transport hands us an already-tokenized command line;
//! each handler loads the pot and its bid snapshot from the store, calls
//! the pure core, and formats a plain-text reply. Handlers hold no state
//! between requests, and every failure becomes a user-facing message
//! rather than an HTTP error.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ledger::Ledger;
use crate::parse;
use crate::settle;
use crate::storage::RecordStore;
use crate::types::{format_amount, HuiError, Metric, NewPot, Period, Pot, ReminderTime};

const USAGE: &str = "Commands:
  create <name> <tuan|thang> <DD-MM-YYYY> <legs> <contribution> <floor%> <cap%> <fee%>
  pots
  pot <id|name>
  close <id|name>
  delete <id|name>
  bid <id|name> <round> <amount> [DD-MM-YYYY]
  bids <id|name>
  settle <id|name> <round>
  best <id|name> [roi|profit]
  remind <id|name> <HH:MM>
  pay <id|name> <amount> [DD-MM-YYYY]
  payments <id|name>";

/// Run one command and produce the reply text. Never fails: errors are
/// rendered into the reply.
pub async fn dispatch(store: Arc<dyn RecordStore>, command: &str, args: &[String]) -> String {
    let result = match command.to_lowercase().as_str() {
        "create" | "newhui" => create_pot(&store, args).await,
        "pots" | "list" => list_pots(&store).await,
        "pot" | "info" => pot_info(&store, args).await,
        "close" => close_pot(&store, args).await,
        "delete" => delete_pot(&store, args).await,
        "bid" | "tham" => submit_bid(&store, args).await,
        "bids" => list_bids(&store, args).await,
        "settle" => settle_round(&store, args).await,
        "best" => best_round(&store, args).await,
        "remind" => set_reminder(&store, args).await,
        "pay" => record_payment(&store, args).await,
        "payments" => list_payments(&store, args).await,
        "help" => Ok(USAGE.to_string()),
        other => {
            warn!(command = other, "Unknown command");
            Ok(format!("Unknown command {other:?}.\n{USAGE}"))
        }
    };

    match result {
        Ok(reply) => reply,
        Err(e) => {
            debug!(command, error = %e, "Command failed");
            e.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn arg<'a>(args: &'a [String], idx: usize, what: &'static str) -> Result<&'a str, HuiError> {
    args.get(idx).map(String::as_str).ok_or(HuiError::Parse {
        what,
        input: String::new(),
    })
}

fn parse_index(text: &str, what: &'static str) -> Result<u32, HuiError> {
    text.parse().map_err(|_| HuiError::Parse {
        what,
        input: text.to_string(),
    })
}

/// Find a pot by full id, unique id prefix, or exact name.
async fn resolve_pot(store: &Arc<dyn RecordStore>, token: &str) -> Result<Pot, HuiError> {
    if let Ok(id) = Uuid::parse_str(token) {
        return store.load_pot(id).await;
    }

    let pots = store.list_pots().await?;
    let prefix = token.to_lowercase();
    let matches: Vec<&Pot> = pots
        .iter()
        .filter(|p| p.id.to_string().starts_with(&prefix) || p.name == token)
        .collect();
    match matches.as_slice() {
        [] => Err(HuiError::NotFound(format!("pot {token}"))),
        [one] => Ok((*one).clone()),
        _ => Err(HuiError::NotFound(format!(
            "pot reference {token:?} is ambiguous"
        ))),
    }
}

fn short_id(pot: &Pot) -> String {
    pot.id.to_string()[..8].to_string()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_pot(store: &Arc<dyn RecordStore>, args: &[String]) -> Result<String, HuiError> {
    let name = arg(args, 0, "pot name")?.to_string();
    let period: Period = arg(args, 1, "period")?.parse()?;
    let start_date = parse::parse_user_date(arg(args, 2, "date")?)?;
    let legs = parse_index(arg(args, 3, "legs")?, "legs")?;
    let contribution = parse::parse_money(arg(args, 4, "money")?)?;
    let floor_rate_pct = parse::parse_percent(arg(args, 5, "percent")?)?;
    let cap_rate_pct = parse::parse_percent(arg(args, 6, "percent")?)?;
    let fee_rate_pct = parse::parse_percent(arg(args, 7, "percent")?)?;

    let pot = Pot::create(NewPot {
        name,
        period,
        start_date,
        legs,
        contribution,
        floor_rate_pct,
        cap_rate_pct,
        fee_rate_pct,
    })?;
    store.create_pot(&pot).await?;

    info!(pot_id = %pot.id, name = %pot.name, "Pot created");
    Ok(format!("Created {pot}\nid: {}", pot.id))
}

async fn list_pots(store: &Arc<dyn RecordStore>) -> Result<String, HuiError> {
    let pots = store.list_pots().await?;
    if pots.is_empty() {
        return Ok("No pots yet. Use `create` to start one.".to_string());
    }
    let lines: Vec<String> = pots
        .iter()
        .map(|p| format!("[{}] {p}", short_id(p)))
        .collect();
    Ok(lines.join("\n"))
}

async fn pot_info(store: &Arc<dyn RecordStore>, args: &[String]) -> Result<String, HuiError> {
    let pot = resolve_pot(store, arg(args, 0, "pot name")?).await?;
    let (min, max) = pot.bid_window();
    let today = Utc::now().date_naive();
    let mut out = format!(
        "{pot}\nid: {}\nbid window: {} - {}\nfee: {}\nreminder: {}",
        pot.id,
        format_amount(min),
        format_amount(max),
        format_amount(pot.fee()),
        pot.reminder,
    );
    if pot.is_finished(today) {
        out.push_str("\nThis cycle is finished.");
    }
    Ok(out)
}

async fn close_pot(store: &Arc<dyn RecordStore>, args: &[String]) -> Result<String, HuiError> {
    let pot = resolve_pot(store, arg(args, 0, "pot name")?).await?;
    store.close_pot(pot.id).await?;
    Ok(format!("Closed {}. No further rounds expected.", pot.name))
}

async fn delete_pot(store: &Arc<dyn RecordStore>, args: &[String]) -> Result<String, HuiError> {
    let pot = resolve_pot(store, arg(args, 0, "pot name")?).await?;
    store.delete_pot(pot.id).await?;
    Ok(format!("Deleted {} and all its rounds.", pot.name))
}

async fn submit_bid(store: &Arc<dyn RecordStore>, args: &[String]) -> Result<String, HuiError> {
    let pot = resolve_pot(store, arg(args, 0, "pot name")?).await?;
    let round = parse_index(arg(args, 1, "round")?, "round")?;
    let amount = parse::parse_money(arg(args, 2, "money")?)?;
    let round_date = match args.get(3) {
        Some(d) => Some(parse::parse_user_date(d)?),
        None => None,
    };

    let ledger = Ledger::new(store.clone());
    ledger.set_bid(&pot, round, amount, round_date).await?;
    Ok(format!(
        "Bid recorded for {}: k={round} bid={}",
        pot.name,
        format_amount(amount)
    ))
}

async fn list_bids(store: &Arc<dyn RecordStore>, args: &[String]) -> Result<String, HuiError> {
    let pot = resolve_pot(store, arg(args, 0, "pot name")?).await?;
    let ledger = Ledger::new(store.clone());
    let entries = ledger.entries(pot.id).await?;

    let (min, max) = pot.bid_window();
    let header = format!(
        "{} — bids (window {} - {}):",
        pot.name,
        format_amount(min),
        format_amount(max)
    );
    if entries.is_empty() {
        return Ok(format!("{header}\n(none recorded)"));
    }
    let lines: Vec<String> = entries.iter().map(|e| format!("  {e}")).collect();
    Ok(format!("{header}\n{}", lines.join("\n")))
}

async fn settle_round(store: &Arc<dyn RecordStore>, args: &[String]) -> Result<String, HuiError> {
    let pot = resolve_pot(store, arg(args, 0, "pot name")?).await?;
    let round = parse_index(arg(args, 1, "round")?, "round")?;

    let bids = store.bids_for(pot.id).await?;
    let result = settle::settle_at(&pot, &bids, round)?;
    Ok(format!(
        "{} — win at round {round} ({}):\n{result}",
        pot.name,
        pot.round_date(round).format("%d-%m-%Y"),
    ))
}

async fn best_round(store: &Arc<dyn RecordStore>, args: &[String]) -> Result<String, HuiError> {
    let pot = resolve_pot(store, arg(args, 0, "pot name")?).await?;
    let metric: Metric = match args.get(1) {
        Some(m) => m.parse()?,
        None => Metric::Roi,
    };

    let bids = store.bids_for(pot.id).await?;
    let best = settle::best_round(&pot, &bids, metric)?;
    Ok(format!(
        "{} — best round by {metric}: k={} ({})\n{best}",
        pot.name,
        best.round,
        pot.round_date(best.round).format("%d-%m-%Y"),
    ))
}

async fn set_reminder(store: &Arc<dyn RecordStore>, args: &[String]) -> Result<String, HuiError> {
    let pot = resolve_pot(store, arg(args, 0, "pot name")?).await?;
    let reminder: ReminderTime = arg(args, 1, "reminder time")?.parse()?;
    store.set_reminder(pot.id, reminder).await?;
    Ok(format!("Reminder for {} set to {reminder}.", pot.name))
}

async fn record_payment(store: &Arc<dyn RecordStore>, args: &[String]) -> Result<String, HuiError> {
    let pot = resolve_pot(store, arg(args, 0, "pot name")?).await?;
    let amount = parse::parse_money(arg(args, 1, "money")?)?;
    let pay_date = match args.get(2) {
        Some(d) => parse::parse_user_date(d)?,
        None => Utc::now().date_naive(),
    };
    store.record_payment(pot.id, pay_date, amount).await?;
    Ok(format!(
        "Payment of {} recorded for {} on {}.",
        format_amount(amount),
        pot.name,
        pay_date.format("%d-%m-%Y"),
    ))
}

async fn list_payments(store: &Arc<dyn RecordStore>, args: &[String]) -> Result<String, HuiError> {
    let pot = resolve_pot(store, arg(args, 0, "pot name")?).await?;
    let payments = store.payments_for(pot.id).await?;
    if payments.is_empty() {
        return Ok(format!("{} — no payments recorded.", pot.name));
    }
    let total: i64 = payments.iter().map(|p| p.amount).sum();
    let lines: Vec<String> = payments.iter().map(|p| format!("  {p}")).collect();
    Ok(format!(
        "{} — payments:\n{}\n  total: {}",
        pot.name,
        lines.join("\n"),
        format_amount(total),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockRecordStore;
    use crate::types::BidBook;
    use mockall::predicate::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn store_with(mock: MockRecordStore) -> Arc<dyn RecordStore> {
        Arc::new(mock)
    }

    fn expect_load(mock: &mut MockRecordStore, pot: &Pot) {
        let pot = pot.clone();
        mock.expect_load_pot()
            .with(eq(pot.id))
            .returning(move |_| Ok(pot.clone()));
    }

    // -- create --

    #[tokio::test]
    async fn test_create_pot_happy_path() {
        let mut mock = MockRecordStore::new();
        mock.expect_create_pot().times(1).returning(|_| Ok(()));

        let reply = dispatch(
            store_with(mock),
            "create",
            &strings(&["hui12", "thang", "05-01-2025", "12", "5tr", "4,5", "15", "40"]),
        )
        .await;
        assert!(reply.contains("Created"), "{reply}");
        assert!(reply.contains("hui12"));
        assert!(reply.contains("5.000.000"));
    }

    #[tokio::test]
    async fn test_create_pot_invalid_rates() {
        let mut mock = MockRecordStore::new();
        mock.expect_create_pot().times(0);

        // floor above cap — rejected before any store call
        let reply = dispatch(
            store_with(mock),
            "create",
            &strings(&["x", "tuan", "05-01-2025", "10", "1tr", "20", "10", "5"]),
        )
        .await;
        assert!(reply.contains("Invalid pot configuration"), "{reply}");
    }

    #[tokio::test]
    async fn test_create_pot_missing_args() {
        let mock = MockRecordStore::new();
        let reply = dispatch(store_with(mock), "create", &strings(&["onlyname"])).await;
        assert!(reply.contains("Cannot parse"), "{reply}");
    }

    // -- bid --

    #[tokio::test]
    async fn test_bid_happy_path() {
        let pot = Pot::sample();
        let mut mock = MockRecordStore::new();
        expect_load(&mut mock, &pot);
        mock.expect_upsert_bid()
            .with(eq(pot.id), eq(3u32), eq(300_000i64), eq(None))
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let reply = dispatch(
            store_with(mock),
            "bid",
            &strings(&[&pot.id.to_string(), "3", "300k"]),
        )
        .await;
        assert!(reply.contains("Bid recorded"), "{reply}");
        assert!(reply.contains("300.000"));
    }

    #[tokio::test]
    async fn test_bid_out_of_bounds_never_stored() {
        let pot = Pot::sample(); // window 225_000..=750_000
        let mut mock = MockRecordStore::new();
        expect_load(&mut mock, &pot);
        mock.expect_upsert_bid().times(0);

        let reply = dispatch(
            store_with(mock),
            "bid",
            &strings(&[&pot.id.to_string(), "3", "100k"]),
        )
        .await;
        assert!(reply.contains("outside allowed window"), "{reply}");
    }

    #[tokio::test]
    async fn test_bid_round_out_of_range() {
        let pot = Pot::sample();
        let mut mock = MockRecordStore::new();
        expect_load(&mut mock, &pot);
        mock.expect_upsert_bid().times(0);

        let reply = dispatch(
            store_with(mock),
            "bid",
            &strings(&[&pot.id.to_string(), "13", "300k"]),
        )
        .await;
        assert!(reply.contains("outside 1..=12"), "{reply}");
    }

    // -- settle / best --

    #[tokio::test]
    async fn test_settle_no_bids() {
        let pot = Pot::sample(); // legs=12, M=5tr, fee 40%
        let mut mock = MockRecordStore::new();
        expect_load(&mut mock, &pot);
        mock.expect_bids_for()
            .with(eq(pot.id))
            .returning(|_| Ok(BidBook::new()));

        let reply = dispatch(
            store_with(mock),
            "settle",
            &strings(&[&pot.id.to_string(), "1"]),
        )
        .await;
        assert!(reply.contains("payout=53.000.000"), "{reply}");
        assert!(reply.contains("05-01-2025"), "{reply}");
    }

    #[tokio::test]
    async fn test_best_defaults_to_roi() {
        let pot = Pot::sample();
        let mut mock = MockRecordStore::new();
        expect_load(&mut mock, &pot);
        mock.expect_bids_for()
            .with(eq(pot.id))
            .returning(|_| Ok(BidBook::new()));

        let reply = dispatch(store_with(mock), "best", &strings(&[&pot.id.to_string()])).await;
        assert!(reply.contains("best round by ROI"), "{reply}");
        assert!(reply.contains("k=1"), "{reply}");
    }

    #[tokio::test]
    async fn test_best_rejects_unknown_metric() {
        let pot = Pot::sample();
        let mut mock = MockRecordStore::new();
        expect_load(&mut mock, &pot);

        let reply = dispatch(
            store_with(mock),
            "best",
            &strings(&[&pot.id.to_string(), "luck"]),
        )
        .await;
        assert!(reply.contains("Cannot parse metric"), "{reply}");
    }

    // -- pot resolution --

    #[tokio::test]
    async fn test_resolve_by_id_prefix() {
        let pot = Pot::sample();
        let prefix = pot.id.to_string()[..8].to_string();
        let list = vec![pot.clone()];
        let mut mock = MockRecordStore::new();
        mock.expect_list_pots().returning(move || Ok(list.clone()));
        mock.expect_close_pot()
            .with(eq(pot.id))
            .times(1)
            .returning(|_| Ok(()));

        let reply = dispatch(store_with(mock), "close", &strings(&[&prefix])).await;
        assert!(reply.contains("Closed"), "{reply}");
    }

    #[tokio::test]
    async fn test_resolve_unknown_pot() {
        let mut mock = MockRecordStore::new();
        mock.expect_list_pots().returning(|| Ok(Vec::new()));

        let reply = dispatch(store_with(mock), "pot", &strings(&["nothere"])).await;
        assert!(reply.contains("Not found"), "{reply}");
    }

    #[tokio::test]
    async fn test_resolve_ambiguous_prefix() {
        // Two pots sharing an id prefix: force it by reusing the id
        let a = Pot::sample();
        let mut b = Pot::sample();
        b.id = a.id;
        let list = vec![a.clone(), b];
        let prefix = a.id.to_string()[..1].to_string();
        let mut mock = MockRecordStore::new();
        mock.expect_list_pots().returning(move || Ok(list.clone()));

        let reply = dispatch(store_with(mock), "pot", &strings(&[&prefix])).await;
        assert!(reply.contains("ambiguous"), "{reply}");
    }

    // -- reminder / payments --

    #[tokio::test]
    async fn test_set_reminder() {
        let pot = Pot::sample();
        let mut mock = MockRecordStore::new();
        expect_load(&mut mock, &pot);
        mock.expect_set_reminder()
            .with(eq(pot.id), eq(ReminderTime { hour: 19, minute: 30 }))
            .times(1)
            .returning(|_, _| Ok(()));

        let reply = dispatch(
            store_with(mock),
            "remind",
            &strings(&[&pot.id.to_string(), "19:30"]),
        )
        .await;
        assert!(reply.contains("19:30"), "{reply}");
    }

    #[tokio::test]
    async fn test_record_payment_with_date() {
        let pot = Pot::sample();
        let date = chrono::NaiveDate::from_ymd_opt(2025, 2, 5).unwrap();
        let mut mock = MockRecordStore::new();
        expect_load(&mut mock, &pot);
        mock.expect_record_payment()
            .with(eq(pot.id), eq(date), eq(5_000_000i64))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let reply = dispatch(
            store_with(mock),
            "pay",
            &strings(&[&pot.id.to_string(), "5tr", "05-02-2025"]),
        )
        .await;
        assert!(reply.contains("Payment of 5.000.000"), "{reply}");
    }

    // -- misc --

    #[tokio::test]
    async fn test_unknown_command_shows_usage() {
        let mock = MockRecordStore::new();
        let reply = dispatch(store_with(mock), "dance", &[]).await;
        assert!(reply.contains("Unknown command"), "{reply}");
        assert!(reply.contains("settle"), "{reply}");
    }

    #[tokio::test]
    async fn test_help() {
        let mock = MockRecordStore::new();
        let reply = dispatch(store_with(mock), "help", &[]).await;
        assert!(reply.contains("create"));
        assert!(reply.contains("best"));
    }
}
