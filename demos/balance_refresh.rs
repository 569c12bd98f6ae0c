//! # Balance Refresh Demo
//!
//! Runs the balance module headless and walks through a debounced refresh:
//! - two pulls in a row start a single fetch
//! - switching wallets mid-fetch cancels the old fetch and starts a new one
//! - every state transition is printed from a `states()` observer
//!
//! The engine's start/cancel decisions are logged to stderr; raise the level
//! with `RUST_LOG=feedloop_core=debug`.
//!
//! Run with: `cargo run --example balance_refresh`

use feedloop::futures::StreamExt;
use feedloop::wallet::balance::{self, BalanceAction, BalanceEvent, BalanceReducer, BalanceState};
use feedloop::wallet::repository::{Balance, InMemoryBalances};
use feedloop::{System, SystemOptions};
use std::sync::Arc;
use std::time::Duration;

#[feedloop::tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    feedloop::logging::init_stderr_tracing();

    let repository = Arc::new(
        InMemoryBalances::new()
            .with_latency(Duration::from_millis(500))
            .with_account("3PMain", vec![Balance::new("WAVES", 1_250_000_000, 8)])
            .with_account(
                "3PSavings",
                vec![Balance::new("WAVES", 90_000_000_000, 8), Balance::new("USD", 15_00, 2)],
            ),
    );

    let handle = System::<BalanceReducer>::new(BalanceState::new("3PMain"))
        .with_feedbacks(balance::feedback(repository.clone()))
        .with_options(SystemOptions {
            label: "balance".into(),
            ..SystemOptions::default()
        })
        .spawn();

    let mut states = handle.states();
    let printer = feedloop::tokio::spawn(async move {
        while let Some(state) = states.next().await {
            feedloop::tracing::info!(
                address = %state.address,
                needs_refresh = state.needs_refresh,
                action = ?state.action,
                balances = state.balances.len(),
                "state"
            );
        }
    });

    handle.send(BalanceEvent::UserPulledToRefresh)?;
    handle.send(BalanceEvent::UserPulledToRefresh)?;
    let state = handle.wait_for(|s| s.action == BalanceAction::Loaded).await?;
    println!(
        "{}: {} balance(s) after {} fetch(es)",
        state.address,
        state.balances.len(),
        repository.calls()
    );

    handle.send(BalanceEvent::UserPulledToRefresh)?;
    feedloop::tokio::time::sleep(Duration::from_millis(100)).await;
    handle.send(BalanceEvent::AddressSelected("3PSavings".into()))?;
    let state = handle
        .wait_for(|s| s.address == "3PSavings" && !s.needs_refresh)
        .await?;
    for b in &state.balances {
        println!("{}: {} {}", state.address, b.formatted(), b.asset);
    }
    println!("{} fetch(es) started in total", repository.calls());

    handle.shutdown();
    handle.stopped().await;
    printer.await?;
    Ok(())
}
