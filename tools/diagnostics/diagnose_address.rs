use std::path::PathBuf;

use rustyledger::amount::format_amount;
use rustyledger::balance::compute_balances;
use rustyledger::clock::SystemClock;
use rustyledger::config::{init_global_config, settings};
use rustyledger::memory::MemoryLedger;
use rustyledger::timelock::TimeLockEvaluator;
use rustyledger::{AddressIndex, ChainView, Collaborators, DepositIndex, MempoolView};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = std::env::args().nth(1)
        .ok_or("usage: diagnose-address <snapshot.json> <address>")?;
    let address = std::env::args().nth(2)
        .ok_or("usage: diagnose-address <snapshot.json> <address>")?;

    println!("🔍 Analyzing address: {}\n", address);

    init_global_config(None)?;
    let engine = settings()?;

    let path = PathBuf::from(shellexpand::tilde(&snapshot).to_string());
    let ledger = MemoryLedger::load(&path, &engine.network)?;
    let clock = SystemClock::new();
    let ctx = Collaborators::from_ledger(&ledger, &clock, &engine.network);

    let key = rustyledger::address::resolve_address_key(&address, &engine.network)?;
    println!("📊 Index Key:");
    println!("   Hash160: {}", hex::encode(key.hash));
    println!("   Type:    {:?} ({})", key.kind, key.kind.index_type());
    println!("   Tip:     {}", ledger.height());
    match ledger.median_time_past() {
        Some(mtp) => println!("   MTP:     {}", mtp),
        None => println!("   MTP:     (no tip, using wall clock)"),
    }

    let locks = TimeLockEvaluator::new(&ledger, &clock);

    let deltas = ledger.index_deltas(&key)?;
    println!("\n📜 Index Deltas ({}):", deltas.len());
    let mut running = 0i64;
    for delta in &deltas {
        running += delta.amount_satoshis;
        let lock_state = if delta.amount_satoshis > 0 {
            match locks.is_time_locked(delta.block_height, &delta.txid, &key) {
                Ok(true) => "🔒 locked".to_string(),
                Ok(false) => "unlocked".to_string(),
                Err(e) => format!("⚠️  {}", e),
            }
        } else {
            String::new()
        };
        println!(
            "   {:>8} {} {:>20} → {:>20} {}",
            delta.block_height,
            delta.txid,
            format_amount(delta.amount_satoshis),
            format_amount(running),
            lock_state
        );
    }

    let (count, _) = ledger.unspent_count(&key)?;
    println!("\n💰 Unspent Outputs ({}):", count);
    for record in ledger.unspent_slice(&key, None, 0, count, false)? {
        let spent = if ledger.is_spent(&record.outpoint()) { " [spent in mempool]" } else { "" };
        let locked = match locks.is_time_locked(record.block_height, &record.txid, &key) {
            Ok(true) => " 🔒",
            Ok(false) => "",
            Err(_) => " ⚠️",
        };
        println!(
            "   {}:{} {:>20} @ {} ({} conf){}{}",
            record.txid,
            record.output_index,
            format_amount(record.amount_satoshis),
            record.block_height,
            ledger.confirmations(record.block_height),
            locked,
            spent
        );
    }

    let pending = ledger.address_deltas(&key);
    println!("\n⏳ Mempool Deltas ({}):", pending.len());
    for delta in &pending {
        let instant = if ledger.is_instant_finalized(&delta.txid) { " ⚡ instant" } else { "" };
        println!(
            "   {} #{} {:>20} at {}{}",
            delta.txid,
            delta.index,
            format_amount(delta.amount_satoshis),
            delta.timestamp,
            instant
        );
    }

    let deposits = ledger.deposit_count(&key, 0, i64::MAX)?;
    println!("\n📥 Deposits: {}", deposits.count);
    if deposits.count > 0 {
        println!("   First: {}  Last: {}", deposits.first_timestamp, deposits.last_timestamp);
    }

    println!("\n📈 Balance:");
    match compute_balances(&ctx, engine.block_cache_size, &[address.clone()]) {
        Ok(report) => {
            for snapshot in &report.snapshots {
                println!("   Balance:     {}", format_amount(snapshot.balance));
                println!("   Locked:      {}", format_amount(snapshot.locked));
                println!("   Unlocked:    {}", format_amount(snapshot.unlocked()));
                println!("   Received:    {}", format_amount(snapshot.received));
                println!("   Sent:        {}", format_amount(snapshot.sent()));
                println!("   Unconfirmed: {}", format_amount(snapshot.unconfirmed_delta));
            }
            if running != report.snapshots.iter().map(|s| s.balance).sum::<i64>() - pending_instant(&ledger, &pending) {
                println!("\n   ⚠️  Delta sum does not match confirmed balance");
            } else {
                println!("\n   ✅ Delta sum matches confirmed balance");
            }
        }
        Err(e) => println!("   ❌ {}", e),
    }

    Ok(())
}

fn pending_instant(ledger: &MemoryLedger, pending: &[rustyledger::types::MempoolDelta]) -> i64 {
    pending
        .iter()
        .filter(|d| ledger.is_instant_finalized(&d.txid))
        .map(|d| d.amount_satoshis)
        .sum()
}
