//! **feedloop** -- a request-driven, unidirectional feedback state machine.
//!
//! This is the umbrella crate that re-exports everything you need to build
//! a feedloop application from a single dependency:
//!
//! ```toml
//! [dependencies]
//! feedloop = "0.1"
//! ```
//!
//! # Re-exports
//!
//! * All public items from [`feedloop_core`] are available at the crate root
//!   ([`Reducer`], [`FeedbackLoop`], [`Effect`], [`System`], [`Screen`],
//!   [`logging`], [`testing`], etc.).
//! * The [`wallet`] module re-exports the wallet feature modules from
//!   [`feedloop_wallet`] (balances, trading, auth, history).
//! * [`ratatui`], [`crossterm`], [`tokio`], [`futures`] and [`tracing`] are
//!   re-exported so downstream crates do not need to depend on them directly.
//!
//! # Quick start
//!
//! ```ignore
//! use feedloop::wallet::balance::{self, BalanceEvent, BalanceReducer, BalanceState};
//! use feedloop::wallet::repository::InMemoryBalances;
//! use feedloop::System;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     feedloop::logging::init_tracing();
//!
//!     let repository = Arc::new(InMemoryBalances::new());
//!     let handle = System::<BalanceReducer>::new(BalanceState::new("3PAddr"))
//!         .with_feedbacks(balance::feedback(repository))
//!         .spawn();
//!
//!     handle.send(BalanceEvent::UserPulledToRefresh).unwrap();
//!     let state = handle.wait_for(|s| !s.needs_refresh).await.unwrap();
//!     println!("{:?}", state.balances);
//! }
//! ```

pub use feedloop_core::*;
pub mod wallet {
    pub use feedloop_wallet::*;
}

// Re-export dependencies for use in demos and downstream crates
pub use crossterm;
pub use futures;
pub use ratatui;
pub use tokio;
pub use tracing;
