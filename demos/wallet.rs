//! # Wallet Demo
//!
//! A terminal wallet screen built from two feature modules:
//! - the balance module (pull to refresh with `r`)
//! - the trading module (live order book, cycle pairs with `p`)
//!
//! Both modules are embedded in one parent state with `FeedbackLoop::scope`,
//! backed by in-memory collaborators. The order book feed is driven by a
//! background task publishing a new snapshot every half second.
//!
//! Run with: `cargo run --example wallet`
//! Set `FEEDLOOP_LOG=wallet.log` to record the engine's decisions.

use feedloop::crossterm::event::{KeyCode, KeyModifiers};
use feedloop::ratatui::layout::{Alignment, Constraint, Layout, Rect};
use feedloop::ratatui::style::{Color, Style};
use feedloop::ratatui::text::{Line, Span};
use feedloop::ratatui::widgets::{Block, Borders, Paragraph};
use feedloop::ratatui::Frame;
use feedloop::wallet::balance::{self, BalanceEvent, BalanceReducer, BalanceState, BalanceView};
use feedloop::wallet::repository::{
    AssetPair, Balance, InMemoryBalances, InMemoryOrderBookFeed, OrderBook, OrderLevel,
};
use feedloop::wallet::trading::{self, TradingEvent, TradingReducer, TradingState, TradingView};
use feedloop::{terminal_events, FeedbackLoop, Reducer, Screen, System, TerminalEvent, View};
use std::sync::Arc;
use std::time::Duration;

const ADDRESS: &str = "3PJaDyprvekvPXPuAtxrapacuDJopgJRaU3";

#[derive(Clone, Debug)]
struct Wallet {
    balance: BalanceState,
    trading: TradingState,
    quit: bool,
}

#[derive(Debug)]
enum WalletEvent {
    Balance(BalanceEvent),
    Trading(TradingEvent),
    Quit,
}

struct WalletReducer;

impl Reducer for WalletReducer {
    type State = Wallet;
    type Event = WalletEvent;

    fn reduce(mut state: Wallet, event: WalletEvent) -> Wallet {
        match event {
            WalletEvent::Balance(e) => state.balance = BalanceReducer::reduce(state.balance, e),
            WalletEvent::Trading(e) => state.trading = TradingReducer::reduce(state.trading, e),
            WalletEvent::Quit => state.quit = true,
        }
        state
    }
}

struct WalletView;

impl View<Wallet> for WalletView {
    fn render(&self, state: &Wallet, frame: &mut Frame, area: Rect) {
        let [body, footer] =
            Layout::vertical([Constraint::Fill(1), Constraint::Length(3)]).areas(area);
        let [left, right] =
            Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)])
                .areas(body);

        BalanceView.render(&state.balance, frame, left);
        TradingView.render(&state.trading, frame, right);

        let key = Style::default().fg(Color::Cyan);
        let help = Paragraph::new(Line::from(vec![
            Span::styled("r", key),
            Span::raw(" refresh  "),
            Span::styled("p", key),
            Span::raw(" next pair  "),
            Span::styled("q", key),
            Span::raw(" quit"),
        ]))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
        frame.render_widget(help, footer);
    }
}

fn keymap(input: TerminalEvent) -> Option<WalletEvent> {
    if let TerminalEvent::Key(key) = &input {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Some(WalletEvent::Quit),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Some(WalletEvent::Quit)
            }
            _ => {}
        }
    }
    balance::keymap(&input)
        .map(WalletEvent::Balance)
        .or_else(|| trading::keymap(&input).map(WalletEvent::Trading))
}

/// Publish a drifting order book for every pair until the process exits.
fn drive_feed(feed: Arc<InMemoryOrderBookFeed>, pairs: Vec<AssetPair>) {
    feedloop::tokio::spawn(async move {
        let mut interval = feedloop::tokio::time::interval(Duration::from_millis(500));
        let mut tick: u64 = 0;
        loop {
            interval.tick().await;
            tick += 1;
            for (i, pair) in pairs.iter().enumerate() {
                let mid = 100 + (i as u64) * 20 + (tick * 7 + i as u64 * 3) % 11;
                let bids = (1..=5).map(|d| OrderLevel::new(mid - d, d * 10 + tick % 7)).collect();
                let asks = (1..=5).map(|d| OrderLevel::new(mid + d, d * 12 + tick % 5)).collect();
                feed.publish(OrderBook::new(pair.clone(), bids, asks));
            }
        }
    });
}

#[feedloop::tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    feedloop::logging::init_tracing();

    let pairs = vec![
        AssetPair::new("WAVES", "USD"),
        AssetPair::new("WAVES", "EUR"),
        AssetPair::new("BTC", "USD"),
    ];

    let balances = Arc::new(
        InMemoryBalances::new()
            .with_latency(Duration::from_millis(800))
            .with_account(
                ADDRESS,
                vec![
                    Balance::new("WAVES", 1_250_000_000, 8),
                    Balance::new("USD", 4_210, 2),
                    Balance::new("BTC", 310_000, 8),
                ],
            ),
    );
    let feed = Arc::new(InMemoryOrderBookFeed::new());
    drive_feed(feed.clone(), pairs.clone());

    let balance_loops = balance::feedback(balances)
        .into_iter()
        .map(|f| f.scope(|w: &Wallet| &w.balance, WalletEvent::Balance));
    let trading_loops = trading::feedback(feed)
        .into_iter()
        .map(|f| f.scope(|w: &Wallet| &w.trading, WalletEvent::Trading));
    let loops: Vec<FeedbackLoop<Wallet, WalletEvent>> =
        balance_loops.chain(trading_loops).collect();

    let initial = Wallet {
        balance: BalanceReducer::reduce(
            BalanceState::new(ADDRESS),
            BalanceEvent::UserPulledToRefresh,
        ),
        trading: TradingState::new(pairs[0].clone()).with_pairs(pairs).shown(),
        quit: false,
    };

    let system = System::<WalletReducer>::new(initial)
        .with_feedbacks(loops)
        .with_source(terminal_events(keymap));

    let final_state = Screen::new(system, WalletView)
        .exit_when(|w: &Wallet| w.quit)
        .run()
        .await?;

    println!(
        "{} balances loaded, {} order book updates on {}",
        final_state.balance.balances.len(),
        final_state.trading.updates,
        final_state.trading.selected_pair
    );
    Ok(())
}
