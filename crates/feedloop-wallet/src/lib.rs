//! Wallet feature modules for **feedloop**.
//!
//! Each module is a self-contained state machine: a state type, an event
//! type, a [`Reducer`](feedloop_core::Reducer) and a `feedback(...)`
//! constructor that builds the module's loops from its collaborators.
//! Collaborators are passed in explicitly as `Arc<dyn Trait>` values.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`balance`] | Balances with pull-to-refresh |
//! | [`trading`] | Live order book for the selected pair |
//! | [`auth`] | Passcode entry with a retry lockout |
//! | [`history`] | Paged transaction history |
//! | [`repository`] | Domain types, collaborator traits and in-memory implementations |
//!
//! # Composing modules
//!
//! Modules run on their own [`System`](feedloop_core::System) or are embedded
//! in a parent state with [`FeedbackLoop::scope`](feedloop_core::FeedbackLoop::scope):
//!
//! ```ignore
//! let loops = balance::feedback(balances)
//!     .into_iter()
//!     .map(|f| f.scope(|app: &App| &app.balance, AppEvent::Balance));
//! ```

pub mod auth;
pub mod balance;
pub mod history;
pub mod repository;
pub mod trading;

pub use repository::RepositoryError;
