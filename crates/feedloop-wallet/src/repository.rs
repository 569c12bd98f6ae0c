//! Domain types and the collaborator interfaces wallet modules talk to.
//!
//! Every external service is one narrow trait returning boxed futures or
//! streams, so feedback loops can turn a call straight into an
//! [`Effect`](feedloop_core::Effect). The in-memory implementations back the
//! demos and tests.

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Ticker of an asset, e.g. `WAVES`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn new(ticker: impl Into<String>) -> Self {
        AssetId(ticker.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AssetId {
    fn from(ticker: &str) -> Self {
        AssetId::new(ticker)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A trading pair: the asset being bought or sold and the asset it is priced in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetPair {
    pub amount: AssetId,
    pub price: AssetId,
}

impl AssetPair {
    pub fn new(amount: impl Into<AssetId>, price: impl Into<AssetId>) -> Self {
        AssetPair {
            amount: amount.into(),
            price: price.into(),
        }
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.amount, self.price)
    }
}

/// Holdings of one asset, in the asset's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    pub asset: AssetId,
    pub amount: u64,
    pub decimals: u8,
}

impl Balance {
    pub fn new(asset: impl Into<AssetId>, amount: u64, decimals: u8) -> Self {
        Balance {
            asset: asset.into(),
            amount,
            decimals,
        }
    }

    /// The amount with its decimal point in place, e.g. `12.50000000`.
    pub fn formatted(&self) -> String {
        format_units(self.amount, self.decimals)
    }
}

/// One price level of an order book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLevel {
    pub price: u64,
    pub amount: u64,
}

impl OrderLevel {
    pub fn new(price: u64, amount: u64) -> Self {
        OrderLevel { price, amount }
    }
}

/// A snapshot of the open orders for a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBook {
    pub pair: AssetPair,
    pub bids: Vec<OrderLevel>,
    pub asks: Vec<OrderLevel>,
}

impl OrderBook {
    pub fn new(pair: AssetPair, bids: Vec<OrderLevel>, asks: Vec<OrderLevel>) -> Self {
        OrderBook { pair, bids, asks }
    }

    /// Difference between the best ask and the best bid, if both sides exist.
    pub fn spread(&self) -> Option<u64> {
        let bid = self.bids.iter().map(|l| l.price).max()?;
        let ask = self.asks.iter().map(|l| l.price).min()?;
        Some(ask.saturating_sub(bid))
    }
}

/// A confirmed transfer. Negative amounts leave the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: String,
    pub asset: AssetId,
    pub amount: i64,
    pub timestamp: u64,
}

/// One page of transaction history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub has_more: bool,
}

/// An authenticated session returned by [`AuthService::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
}

/// Failures reported by collaborators.
///
/// Errors end up inside module state, hence `Clone + PartialEq`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("network unavailable")]
    Unavailable,

    #[error("unknown address: {0}")]
    UnknownAddress(String),

    #[error("unknown asset pair: {0}")]
    UnknownPair(AssetPair),

    #[error("wrong passcode")]
    WrongPasscode,

    #[error("{0}")]
    Other(String),
}

/// Fetches the balances held by an address.
pub trait BalanceRepository: Send + Sync {
    fn balances(&self, address: &str) -> BoxFuture<'static, Result<Vec<Balance>, RepositoryError>>;
}

/// Streams live order book snapshots for a pair.
///
/// The stream runs until it is dropped; dropping it unsubscribes.
pub trait OrderBookFeed: Send + Sync {
    fn subscribe(&self, pair: &AssetPair) -> BoxStream<'static, Result<OrderBook, RepositoryError>>;
}

/// Checks a passcode and opens a session.
pub trait AuthService: Send + Sync {
    fn verify(&self, passcode: &str) -> BoxFuture<'static, Result<Session, RepositoryError>>;
}

/// Reads transaction history, newest first, one page at a time.
pub trait TransactionRepository: Send + Sync {
    fn page(
        &self,
        address: &str,
        page: u32,
        page_size: usize,
    ) -> BoxFuture<'static, Result<TransactionPage, RepositoryError>>;
}

fn format_units(amount: u64, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let scale = 10u64.pow(u32::from(decimals));
    format!(
        "{}.{:0width$}",
        amount / scale,
        amount % scale,
        width = usize::from(decimals)
    )
}

async fn delayed<T>(latency: Duration, value: T) -> T {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
    value
}

/// Balances kept in memory, answered after a fixed latency.
#[derive(Debug, Default)]
pub struct InMemoryBalances {
    accounts: Mutex<HashMap<String, Vec<Balance>>>,
    failure: Mutex<Option<RepositoryError>>,
    latency: Duration,
    calls: AtomicUsize,
}

impl InMemoryBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_account(self, address: impl Into<String>, balances: Vec<Balance>) -> Self {
        self.set_account(address, balances);
        self
    }

    /// Replace the balances of `address`.
    pub fn set_account(&self, address: impl Into<String>, balances: Vec<Balance>) {
        if let Ok(mut accounts) = self.accounts.lock() {
            accounts.insert(address.into(), balances);
        }
    }

    /// Make every following call fail with `error` (or succeed again with `None`).
    pub fn fail_with(&self, error: Option<RepositoryError>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = error;
        }
    }

    /// Number of fetches started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BalanceRepository for InMemoryBalances {
    fn balances(&self, address: &str) -> BoxFuture<'static, Result<Vec<Balance>, RepositoryError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.failure.lock().ok().and_then(|f| f.clone());
        let result = match failure {
            Some(error) => Err(error),
            None => self
                .accounts
                .lock()
                .ok()
                .and_then(|accounts| accounts.get(address).cloned())
                .ok_or_else(|| RepositoryError::UnknownAddress(address.to_string())),
        };
        delayed(self.latency, result).boxed()
    }
}

type BookSender = mpsc::UnboundedSender<Result<OrderBook, RepositoryError>>;

/// A push-based order book feed.
///
/// [`publish`](InMemoryOrderBookFeed::publish) fans a snapshot out to every
/// live subscriber of its pair. New subscribers first receive the latest
/// snapshot published for their pair.
#[derive(Debug, Default)]
pub struct InMemoryOrderBookFeed {
    subscribers: Mutex<HashMap<AssetPair, Vec<BookSender>>>,
    latest: Mutex<HashMap<AssetPair, OrderBook>>,
}

impl InMemoryOrderBookFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a snapshot for `book.pair`.
    pub fn publish(&self, book: OrderBook) {
        self.broadcast(&book.pair.clone(), Ok(book.clone()));
        if let Ok(mut latest) = self.latest.lock() {
            latest.insert(book.pair.clone(), book);
        }
    }

    /// Report an error to every subscriber of `pair`.
    pub fn publish_error(&self, pair: &AssetPair, error: RepositoryError) {
        self.broadcast(pair, Err(error));
    }

    /// Number of subscribers of `pair` still listening.
    pub fn subscribers(&self, pair: &AssetPair) -> usize {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return 0;
        };
        subscribers.get_mut(pair).map_or(0, |senders| {
            senders.retain(|tx| !tx.is_closed());
            senders.len()
        })
    }

    fn broadcast(&self, pair: &AssetPair, item: Result<OrderBook, RepositoryError>) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            if let Some(senders) = subscribers.get_mut(pair) {
                senders.retain(|tx| tx.send(item.clone()).is_ok());
            }
        }
    }
}

impl OrderBookFeed for InMemoryOrderBookFeed {
    fn subscribe(
        &self,
        pair: &AssetPair,
    ) -> BoxStream<'static, Result<OrderBook, RepositoryError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let snapshot = self.latest.lock().ok().and_then(|l| l.get(pair).cloned());
        if let Some(book) = snapshot {
            let _ = tx.send(Ok(book));
        }
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.entry(pair.clone()).or_default().push(tx);
        }
        UnboundedReceiverStream::new(rx).boxed()
    }
}

/// Accepts a single passcode.
#[derive(Debug)]
pub struct InMemoryAuth {
    passcode: String,
    latency: Duration,
    calls: AtomicUsize,
}

impl InMemoryAuth {
    pub fn new(passcode: impl Into<String>) -> Self {
        InMemoryAuth {
            passcode: passcode.into(),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of verifications started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AuthService for InMemoryAuth {
    fn verify(&self, passcode: &str) -> BoxFuture<'static, Result<Session, RepositoryError>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let result = if passcode == self.passcode {
            Ok(Session {
                token: format!("session-{call}"),
            })
        } else {
            Err(RepositoryError::WrongPasscode)
        };
        delayed(self.latency, result).boxed()
    }
}

/// Transaction history kept in memory, newest first per address.
#[derive(Debug, Default)]
pub struct InMemoryTransactions {
    history: HashMap<String, Vec<Transaction>>,
    latency: Duration,
}

impl InMemoryTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_history(
        mut self,
        address: impl Into<String>,
        transactions: Vec<Transaction>,
    ) -> Self {
        self.history.insert(address.into(), transactions);
        self
    }
}

impl TransactionRepository for InMemoryTransactions {
    fn page(
        &self,
        address: &str,
        page: u32,
        page_size: usize,
    ) -> BoxFuture<'static, Result<TransactionPage, RepositoryError>> {
        let result = match self.history.get(address) {
            Some(all) => {
                let start = (page as usize).saturating_mul(page_size).min(all.len());
                let end = start.saturating_add(page_size).min(all.len());
                Ok(TransactionPage {
                    transactions: all[start..end].to_vec(),
                    has_more: end < all.len(),
                })
            }
            None => Err(RepositoryError::UnknownAddress(address.to_string())),
        };
        delayed(self.latency, result).boxed()
    }
}
