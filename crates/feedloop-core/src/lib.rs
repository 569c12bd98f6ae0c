//! Core engine for **feedloop**, a request-driven feedback state machine.
//!
//! A module's behavior is a pure [`Reducer`] over a `State` and an `Event`
//! type. Side effects never happen inside the reducer; instead each
//! [`FeedbackLoop`] looks at every new state, derives a *request* from it and
//! keeps exactly one [`Effect`] running per distinct request. The effect's
//! events flow back into the same reducer.
//!
//! # Key types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Reducer`] | Pure `(State, Event) -> State` transition function |
//! | [`FeedbackLoop`] | Request extractor paired with an effect factory |
//! | [`Effect`] | Asynchronous work producing zero or more events |
//! | [`EventSource`] | External stream of events (input, lifecycle, timers) |
//! | [`System`] | Owns the state, serializes reduction, manages effects |
//! | [`SystemHandle`] | Sends events to and observes a running system |
//! | [`Screen`] | Binds a system and a [`View`] to a real terminal |
//! | [`TestSystem`](testing::TestSystem) | Headless harness for unit-testing loops |
//!
//! # Flow
//!
//! 1. **event** -- An event arrives from a handle, a source or an effect.
//! 2. **reduce** -- The reducer produces the next state. Only the driver task
//!    ever calls it, one event at a time.
//! 3. **react** -- Every loop projects the new state to a request. An
//!    unchanged request leaves its effect alone; a changed one cancels the old
//!    effect and starts a new one; a missing one cancels.
//! 4. **observe** -- The new state is published to observers.
//!
//! Events that a canceled effect had already produced are dropped before they
//! reach the reducer.
//!
//! # Quick example
//!
//! ```ignore
//! use feedloop_core::{Effect, FeedbackLoop, Reducer, System};
//!
//! #[derive(Clone, Default)]
//! struct Quote { symbol: Option<String>, price: Option<f64> }
//!
//! enum Event { Select(String), Priced(f64) }
//!
//! struct QuoteReducer;
//!
//! impl Reducer for QuoteReducer {
//!     type State = Quote;
//!     type Event = Event;
//!
//!     fn reduce(mut state: Quote, event: Event) -> Quote {
//!         match event {
//!             Event::Select(symbol) => {
//!                 state.symbol = Some(symbol);
//!                 state.price = None;
//!             }
//!             Event::Priced(price) => state.price = Some(price),
//!         }
//!         state
//!     }
//! }
//!
//! let system = System::<QuoteReducer>::new(Quote::default()).with_feedback(
//!     FeedbackLoop::new(
//!         "price",
//!         |s: &Quote| s.symbol.clone(),
//!         |symbol: String| Effect::perform(fetch_price(symbol), Event::Priced),
//!     ),
//! );
//! let handle = system.spawn();
//! handle.send(Event::Select("WAVES".into()))?;
//! ```

pub mod effect;
pub mod feedback;
pub mod logging;
pub mod reducer;
pub mod source;
pub mod system;
pub mod testing;
pub mod ui;

pub use effect::Effect;
pub use feedback::{EffectId, FeedbackLoop, Request};
pub use reducer::{replay, Reducer};
pub use source::EventSource;
pub use system::{StateStream, System, SystemError, SystemHandle, SystemOptions};
pub use ui::{terminal_events, OutputTarget, Screen, ScreenOptions, TerminalEvent, View};
