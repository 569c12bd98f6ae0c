//! Wallet balances with pull-to-refresh.
//!
//! Pulling to refresh raises `needs_refresh`; while it is set the `refresh`
//! loop keeps exactly one fetch running for the wallet's address. Pulling
//! again during a fetch changes nothing, since the request is the same.

use crate::repository::{Balance, BalanceRepository, RepositoryError};
use crossterm::event::KeyCode;
use feedloop_core::{Effect, FeedbackLoop, Reducer, TerminalEvent, View};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;
use std::sync::Arc;

/// Where the balance screen is in its refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BalanceAction {
    #[default]
    Idle,
    Refreshing,
    Loaded,
    Failed(RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceState {
    pub address: String,
    pub needs_refresh: bool,
    pub balances: Vec<Balance>,
    pub action: BalanceAction,
}

impl BalanceState {
    pub fn new(address: impl Into<String>) -> Self {
        BalanceState {
            address: address.into(),
            needs_refresh: false,
            balances: Vec::new(),
            action: BalanceAction::Idle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceEvent {
    UserPulledToRefresh,
    /// Switch to another wallet and load its balances.
    AddressSelected(String),
    BalancesLoaded(Vec<Balance>),
    BalancesFailed(RepositoryError),
}

pub struct BalanceReducer;

impl Reducer for BalanceReducer {
    type State = BalanceState;
    type Event = BalanceEvent;

    fn reduce(mut state: BalanceState, event: BalanceEvent) -> BalanceState {
        match event {
            BalanceEvent::UserPulledToRefresh => {
                state.needs_refresh = true;
                state.action = BalanceAction::Refreshing;
            }
            BalanceEvent::AddressSelected(address) => {
                if address != state.address {
                    state.address = address;
                    state.balances.clear();
                    state.needs_refresh = true;
                    state.action = BalanceAction::Refreshing;
                }
            }
            BalanceEvent::BalancesLoaded(balances) => {
                if state.needs_refresh {
                    state.balances = balances;
                    state.needs_refresh = false;
                    state.action = BalanceAction::Loaded;
                }
            }
            BalanceEvent::BalancesFailed(error) => {
                if state.needs_refresh {
                    state.needs_refresh = false;
                    state.action = BalanceAction::Failed(error);
                }
            }
        }
        state
    }
}

/// Identifies one balance fetch.
///
/// Only the address takes part in equality: pulling again for the same
/// wallet reuses the running fetch, switching wallets replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub address: String,
}

/// The `refresh` loop: fetch balances while `needs_refresh` is set.
pub fn refresh(repository: Arc<dyn BalanceRepository>) -> FeedbackLoop<BalanceState, BalanceEvent> {
    FeedbackLoop::new(
        "refresh",
        |state: &BalanceState| {
            state.needs_refresh.then(|| RefreshRequest {
                address: state.address.clone(),
            })
        },
        move |request: RefreshRequest| {
            tracing::debug!(address = %request.address, "fetching balances");
            Effect::try_perform(
                repository.balances(&request.address),
                BalanceEvent::BalancesLoaded,
                BalanceEvent::BalancesFailed,
            )
        },
    )
}

/// Every loop of the balance module.
pub fn feedback(
    repository: Arc<dyn BalanceRepository>,
) -> Vec<FeedbackLoop<BalanceState, BalanceEvent>> {
    vec![refresh(repository)]
}

/// Key bindings: `r` pulls to refresh.
pub fn keymap(input: &TerminalEvent) -> Option<BalanceEvent> {
    match input {
        TerminalEvent::Key(key) if key.code == KeyCode::Char('r') => {
            Some(BalanceEvent::UserPulledToRefresh)
        }
        _ => None,
    }
}

/// Renders the balance list with a status line.
#[derive(Debug, Default, Clone, Copy)]
pub struct BalanceView;

impl View<BalanceState> for BalanceView {
    fn render(&self, state: &BalanceState, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" Balances {} ", state.address));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let [list_area, status_area] =
            Layout::vertical([Constraint::Min(0), Constraint::Length(1)]).areas(inner);

        let lines: Vec<Line> = if state.balances.is_empty() {
            vec![Line::styled("no balances", Style::default().fg(Color::DarkGray))]
        } else {
            state
                .balances
                .iter()
                .map(|b| {
                    Line::from(vec![
                        Span::styled(
                            format!("{:<8}", b.asset),
                            Style::default().add_modifier(Modifier::BOLD),
                        ),
                        Span::raw(b.formatted()),
                    ])
                })
                .collect()
        };
        frame.render_widget(Paragraph::new(lines), list_area);

        let status = match &state.action {
            BalanceAction::Idle => Line::raw("press r to refresh"),
            BalanceAction::Refreshing => {
                Line::styled("refreshing...", Style::default().fg(Color::Yellow))
            }
            BalanceAction::Loaded => Line::styled("up to date", Style::default().fg(Color::Green)),
            BalanceAction::Failed(err) => {
                Line::styled(format!("refresh failed: {err}"), Style::default().fg(Color::Red))
            }
        };
        frame.render_widget(Paragraph::new(status), status_area);
    }
}
