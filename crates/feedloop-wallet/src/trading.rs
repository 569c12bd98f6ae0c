//! Live order book for the selected trading pair.
//!
//! While the screen is visible the `order_book` loop keeps one feed
//! subscription open for `selected_pair`. Selecting another pair cancels the
//! old subscription before anything from the new one is applied, so the
//! reducer stores whatever book arrives without checking its pair.

use crate::repository::{AssetPair, OrderBook, OrderBookFeed, OrderLevel, RepositoryError};
use crossterm::event::KeyCode;
use feedloop_core::{Effect, FeedbackLoop, Reducer, TerminalEvent, View};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TradingAction {
    #[default]
    Idle,
    Streaming,
    Failed(RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingState {
    pub selected_pair: AssetPair,
    /// Pairs the user can cycle through.
    pub pairs: Vec<AssetPair>,
    pub visible: bool,
    pub order_book: Option<OrderBook>,
    pub updates: u64,
    pub action: TradingAction,
}

impl TradingState {
    pub fn new(selected_pair: AssetPair) -> Self {
        TradingState {
            pairs: vec![selected_pair.clone()],
            selected_pair,
            visible: false,
            order_book: None,
            updates: 0,
            action: TradingAction::Idle,
        }
    }

    /// Offer `pairs` for cycling with [`TradingEvent::NextPair`].
    pub fn with_pairs(mut self, pairs: Vec<AssetPair>) -> Self {
        if !pairs.contains(&self.selected_pair) {
            self.selected_pair = pairs.first().cloned().unwrap_or(self.selected_pair);
        }
        if !pairs.is_empty() {
            self.pairs = pairs;
        }
        self
    }

    /// Start out with the screen visible.
    pub fn shown(mut self) -> Self {
        self.visible = true;
        self.action = TradingAction::Streaming;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradingEvent {
    PairSelected(AssetPair),
    NextPair,
    ScreenShown,
    ScreenHidden,
    OrderBookUpdated(OrderBook),
    OrderBookFailed(RepositoryError),
}

pub struct TradingReducer;

impl TradingReducer {
    fn select(mut state: TradingState, pair: AssetPair) -> TradingState {
        if pair == state.selected_pair {
            return state;
        }
        state.selected_pair = pair;
        state.order_book = None;
        state.action = if state.visible {
            TradingAction::Streaming
        } else {
            TradingAction::Idle
        };
        state
    }
}

impl Reducer for TradingReducer {
    type State = TradingState;
    type Event = TradingEvent;

    fn reduce(mut state: TradingState, event: TradingEvent) -> TradingState {
        match event {
            TradingEvent::PairSelected(pair) => return Self::select(state, pair),
            TradingEvent::NextPair => {
                let next = state
                    .pairs
                    .iter()
                    .position(|p| *p == state.selected_pair)
                    .map(|i| (i + 1) % state.pairs.len())
                    .and_then(|i| state.pairs.get(i).cloned());
                if let Some(pair) = next {
                    return Self::select(state, pair);
                }
            }
            TradingEvent::ScreenShown => {
                state.visible = true;
                state.action = TradingAction::Streaming;
            }
            TradingEvent::ScreenHidden => {
                state.visible = false;
                state.action = TradingAction::Idle;
            }
            TradingEvent::OrderBookUpdated(book) => {
                if state.action == TradingAction::Streaming {
                    state.order_book = Some(book);
                    state.updates += 1;
                }
            }
            TradingEvent::OrderBookFailed(error) => {
                if state.action == TradingAction::Streaming {
                    state.action = TradingAction::Failed(error);
                }
            }
        }
        state
    }
}

/// Identifies one order book subscription.
///
/// Only the pair matters: unrelated state changes such as the update
/// counter leave the subscription open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBookRequest {
    pub pair: AssetPair,
}

/// The `order_book` loop: stream the selected pair's book while streaming.
///
/// A failure ends the request; showing the screen or picking a pair again
/// resubscribes.
pub fn order_book(feed: Arc<dyn OrderBookFeed>) -> FeedbackLoop<TradingState, TradingEvent> {
    FeedbackLoop::new(
        "order_book",
        |state: &TradingState| {
            (state.action == TradingAction::Streaming).then(|| OrderBookRequest {
                pair: state.selected_pair.clone(),
            })
        },
        move |request: OrderBookRequest| {
            tracing::debug!(pair = %request.pair, "subscribing to order book");
            Effect::try_stream(
                feed.subscribe(&request.pair),
                TradingEvent::OrderBookUpdated,
                TradingEvent::OrderBookFailed,
            )
        },
    )
}

/// Every loop of the trading module.
pub fn feedback(feed: Arc<dyn OrderBookFeed>) -> Vec<FeedbackLoop<TradingState, TradingEvent>> {
    vec![order_book(feed)]
}

/// Key bindings: `p` cycles pairs.
pub fn keymap(input: &TerminalEvent) -> Option<TradingEvent> {
    match input {
        TerminalEvent::Key(key) if key.code == KeyCode::Char('p') => Some(TradingEvent::NextPair),
        TerminalEvent::FocusGained => Some(TradingEvent::ScreenShown),
        _ => None,
    }
}

/// Renders the order book of the selected pair, bids beside asks.
#[derive(Debug, Default, Clone, Copy)]
pub struct TradingView;

impl View<TradingState> for TradingView {
    fn render(&self, state: &TradingState, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", state.selected_pair));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let [book_area, status_area] =
            Layout::vertical([Constraint::Min(0), Constraint::Length(1)]).areas(inner);
        let [bids_area, asks_area] =
            Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)])
                .areas(book_area);

        let (bids, asks) = match &state.order_book {
            Some(book) => (
                levels("bid", &book.bids, Color::Green),
                levels("ask", &book.asks, Color::Red),
            ),
            None => (vec![Line::raw("waiting for book")], Vec::new()),
        };
        frame.render_widget(Paragraph::new(bids), bids_area);
        frame.render_widget(Paragraph::new(asks), asks_area);

        let status = match &state.action {
            TradingAction::Idle => Line::raw("paused"),
            TradingAction::Streaming => {
                match state.order_book.as_ref().and_then(OrderBook::spread) {
                    Some(spread) => Line::raw(format!("live, spread {spread}")),
                    None => Line::raw("live"),
                }
            }
            TradingAction::Failed(err) => {
                Line::styled(format!("feed failed: {err}"), Style::default().fg(Color::Red))
            }
        };
        frame.render_widget(Paragraph::new(status), status_area);
    }
}

fn levels(side: &str, rows: &[OrderLevel], color: Color) -> Vec<Line<'static>> {
    let style = Style::default().fg(color);
    rows.iter()
        .map(|l| Line::styled(format!("{side} {:>8} x {}", l.price, l.amount), style))
        .collect()
}
