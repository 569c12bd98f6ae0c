//! Paged transaction history.
//!
//! Pages load one at a time: asking for more while a page is loading does
//! nothing, and once the repository reports a page without `has_more` the
//! history is exhausted.

use crate::repository::{RepositoryError, Transaction, TransactionPage, TransactionRepository};
use feedloop_core::{Effect, FeedbackLoop, Reducer};
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HistoryAction {
    #[default]
    Idle,
    Loading {
        page: u32,
    },
    Exhausted,
    Failed(RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryState {
    pub address: String,
    pub page_size: usize,
    pub transactions: Vec<Transaction>,
    pub next_page: u32,
    pub action: HistoryAction,
}

impl HistoryState {
    pub fn new(address: impl Into<String>) -> Self {
        HistoryState {
            address: address.into(),
            page_size: DEFAULT_PAGE_SIZE,
            transactions: Vec::new(),
            next_page: 0,
            action: HistoryAction::Idle,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    NextPageRequested,
    /// Drop what is loaded and start again from the first page.
    Reloaded,
    PageLoaded { page: u32, result: TransactionPage },
    PageFailed { page: u32, error: RepositoryError },
}

pub struct HistoryReducer;

impl Reducer for HistoryReducer {
    type State = HistoryState;
    type Event = HistoryEvent;

    fn reduce(mut state: HistoryState, event: HistoryEvent) -> HistoryState {
        match event {
            HistoryEvent::NextPageRequested => {
                if matches!(state.action, HistoryAction::Idle | HistoryAction::Failed(_)) {
                    state.action = HistoryAction::Loading {
                        page: state.next_page,
                    };
                }
            }
            HistoryEvent::Reloaded => {
                state.transactions.clear();
                state.next_page = 0;
                state.action = HistoryAction::Loading { page: 0 };
            }
            HistoryEvent::PageLoaded { page, result } => {
                if state.action == (HistoryAction::Loading { page }) {
                    state.transactions.extend(result.transactions);
                    state.next_page = page + 1;
                    state.action = if result.has_more {
                        HistoryAction::Idle
                    } else {
                        HistoryAction::Exhausted
                    };
                }
            }
            HistoryEvent::PageFailed { page, error } => {
                if state.action == (HistoryAction::Loading { page }) {
                    state.action = HistoryAction::Failed(error);
                }
            }
        }
        state
    }
}

/// Identifies one page fetch: an address and a page number.
///
/// Reloading while page 0 is already loading keeps that fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub address: String,
    pub page: u32,
    pub page_size: usize,
}

/// The `page` loop: fetch the page being loaded.
pub fn page(
    repository: Arc<dyn TransactionRepository>,
) -> FeedbackLoop<HistoryState, HistoryEvent> {
    FeedbackLoop::new(
        "page",
        |state: &HistoryState| match state.action {
            HistoryAction::Loading { page } => Some(PageRequest {
                address: state.address.clone(),
                page,
                page_size: state.page_size,
            }),
            _ => None,
        },
        move |request: PageRequest| {
            let page = request.page;
            tracing::debug!(address = %request.address, page, "fetching history page");
            Effect::try_perform(
                repository.page(&request.address, page, request.page_size),
                move |result| HistoryEvent::PageLoaded { page, result },
                move |error| HistoryEvent::PageFailed { page, error },
            )
        },
    )
}

/// Every loop of the history module.
pub fn feedback(
    repository: Arc<dyn TransactionRepository>,
) -> Vec<FeedbackLoop<HistoryState, HistoryEvent>> {
    vec![page(repository)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryTransactions;
    use feedloop_core::testing::{Activity, TestSystem};
    use feedloop_core::{replay, System};
    use proptest::prelude::*;
    use std::time::Duration;

    fn tx(n: u64) -> Transaction {
        Transaction {
            id: format!("tx{n}"),
            asset: "WAVES".into(),
            amount: -(n as i64),
            timestamp: 1_700_000_000 - n,
        }
    }

    fn repository(count: u64) -> Arc<InMemoryTransactions> {
        Arc::new(
            InMemoryTransactions::new()
                .with_latency(Duration::from_millis(200))
                .with_history("addr", (0..count).map(tx).collect()),
        )
    }

    fn loaded(page: u32, range: std::ops::Range<u64>, has_more: bool) -> HistoryEvent {
        HistoryEvent::PageLoaded {
            page,
            result: TransactionPage {
                transactions: range.map(tx).collect(),
                has_more,
            },
        }
    }

    #[test]
    fn pages_append_in_order() {
        let state = replay::<HistoryReducer, _>(
            HistoryState::new("addr").with_page_size(2),
            [
                HistoryEvent::NextPageRequested,
                loaded(0, 0..2, true),
                HistoryEvent::NextPageRequested,
                loaded(1, 2..3, false),
            ],
        );
        assert_eq!(state.transactions, (0..3).map(tx).collect::<Vec<_>>());
        assert_eq!(state.action, HistoryAction::Exhausted);
        assert_eq!(state.next_page, 2);
    }

    #[test]
    fn requests_while_loading_or_exhausted_are_ignored() {
        let loading =
            HistoryReducer::reduce(HistoryState::new("addr"), HistoryEvent::NextPageRequested);
        assert_eq!(
            HistoryReducer::reduce(loading.clone(), HistoryEvent::NextPageRequested),
            loading
        );

        let exhausted = HistoryReducer::reduce(loading, loaded(0, 0..1, false));
        assert_eq!(
            HistoryReducer::reduce(exhausted.clone(), HistoryEvent::NextPageRequested),
            exhausted
        );
    }

    #[test]
    fn result_for_other_page_is_ignored() {
        let loading =
            HistoryReducer::reduce(HistoryState::new("addr"), HistoryEvent::NextPageRequested);
        assert_eq!(HistoryReducer::reduce(loading.clone(), loaded(3, 0..1, true)), loading);
    }

    #[test]
    fn failed_page_can_be_retried() {
        let state = replay::<HistoryReducer, _>(
            HistoryState::new("addr"),
            [
                HistoryEvent::NextPageRequested,
                HistoryEvent::PageFailed {
                    page: 0,
                    error: RepositoryError::Unavailable,
                },
                HistoryEvent::NextPageRequested,
            ],
        );
        assert_eq!(state.action, HistoryAction::Loading { page: 0 });
    }

    #[test]
    fn reload_during_first_page_keeps_fetch() {
        let mut sys = TestSystem::<HistoryReducer>::new(HistoryState::new("addr"))
            .with_feedbacks(feedback(repository(3)));
        sys.send(HistoryEvent::NextPageRequested);
        sys.send(HistoryEvent::Reloaded);
        assert_eq!(
            sys.activity(),
            &[Activity::started(
                "page",
                PageRequest {
                    address: "addr".into(),
                    page: 0,
                    page_size: DEFAULT_PAGE_SIZE,
                }
            )]
        );
    }

    #[tokio::test]
    async fn harness_loads_pages_until_exhausted() {
        let repository =
            InMemoryTransactions::new().with_history("addr", (0..3).map(tx).collect());
        let mut sys =
            TestSystem::<HistoryReducer>::new(HistoryState::new("addr").with_page_size(2))
                .with_feedbacks(feedback(Arc::new(repository)));
        sys.send(HistoryEvent::NextPageRequested);
        sys.resolve("page").await;
        sys.send(HistoryEvent::NextPageRequested);
        sys.resolve("page").await;
        assert_eq!(sys.state().transactions.len(), 3);
        assert_eq!(sys.state().action, HistoryAction::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn system_loads_every_page() {
        let handle = System::<HistoryReducer>::new(HistoryState::new("addr").with_page_size(4))
            .with_feedbacks(feedback(repository(10)))
            .spawn();

        for page in 1..=3 {
            handle.send(HistoryEvent::NextPageRequested).unwrap();
            handle.wait_for(|s| s.next_page == page).await.unwrap();
        }
        let state = handle.state();
        assert_eq!(state.action, HistoryAction::Exhausted);
        assert_eq!(state.transactions, (0..10).map(tx).collect::<Vec<_>>());
    }

    fn event() -> impl Strategy<Value = HistoryEvent> {
        prop_oneof![
            Just(HistoryEvent::NextPageRequested),
            Just(HistoryEvent::Reloaded),
            (0u32..3, any::<bool>()).prop_map(|(page, more)| loaded(page, 0..2, more)),
            (0u32..3).prop_map(|page| HistoryEvent::PageFailed {
                page,
                error: RepositoryError::Unavailable
            }),
        ]
    }

    proptest! {
        #[test]
        fn reduce_is_deterministic(events in prop::collection::vec(event(), 0..40)) {
            let a = replay::<HistoryReducer, _>(HistoryState::new("addr"), events.clone());
            let b = replay::<HistoryReducer, _>(HistoryState::new("addr"), events);
            prop_assert_eq!(a, b);
        }
    }
}
