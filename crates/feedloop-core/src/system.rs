use crate::effect::Effect;
use crate::feedback::{Directive, EffectId, FeedbackLoop};
use crate::reducer::Reducer;
use crate::source::EventSource;
use futures::{Stream, StreamExt};
use std::borrow::Cow;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::Instrument;

/// Errors surfaced by a [`SystemHandle`] or the terminal adapter.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// The system has shut down and no longer accepts events.
    #[error("system has stopped")]
    Stopped,
    /// An I/O error from terminal setup, rendering, or teardown.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration options for a [`System`].
///
/// Use struct update syntax to override only what you need:
///
/// ```
/// use feedloop_core::SystemOptions;
///
/// let options = SystemOptions {
///     label: "trading".into(),
///     ..SystemOptions::default()
/// };
/// assert!(options.evaluate_initial_state);
/// ```
#[derive(Debug, Clone)]
pub struct SystemOptions {
    /// Name attached to every log record the system emits (default: `"system"`).
    pub label: Cow<'static, str>,
    /// Show the initial state to the feedback loops before the first event
    /// (default: true). When false, requests already present in the initial
    /// state wait for the first transition.
    pub evaluate_initial_state: bool,
}

impl Default for SystemOptions {
    fn default() -> Self {
        Self {
            label: Cow::Borrowed("system"),
            evaluate_initial_state: true,
        }
    }
}

/// Everything the driver task receives, in arrival order.
pub(crate) enum Inbox<S, E> {
    External(E),
    Effect {
        slot: usize,
        member: u64,
        id: EffectId,
        event: E,
    },
    Finished {
        slot: usize,
        member: u64,
        id: EffectId,
    },
    Observe(mpsc::UnboundedSender<S>),
    Shutdown,
}

/// Sends `Shutdown` when the last owning handle goes away.
struct OwnerGuard<S, E> {
    inbox: mpsc::UnboundedSender<Inbox<S, E>>,
}

impl<S, E> Drop for OwnerGuard<S, E> {
    fn drop(&mut self) {
        let _ = self.inbox.send(Inbox::Shutdown);
    }
}

/// A cloneable handle to a running [`System`].
///
/// Handles inject events, read the latest state and observe every state the
/// reducer produces. Handles returned by [`System::spawn`] *own* the system:
/// when the last of them is dropped the system shuts down and cancels all of
/// its effects. Handles obtained from [`System::handle`] do not.
pub struct SystemHandle<S, E> {
    inbox: mpsc::UnboundedSender<Inbox<S, E>>,
    pub(crate) state: watch::Receiver<S>,
    owner: Option<Arc<OwnerGuard<S, E>>>,
}

impl<S, E> Clone for SystemHandle<S, E> {
    fn clone(&self) -> Self {
        Self {
            inbox: self.inbox.clone(),
            state: self.state.clone(),
            owner: self.owner.clone(),
        }
    }
}

impl<S: Clone + Send + Sync + 'static, E: Send + 'static> SystemHandle<S, E> {
    /// Send an event to the system.
    ///
    /// The event is queued behind everything already received and reduced in
    /// order.
    pub fn send(&self, event: E) -> Result<(), SystemError> {
        self.inbox
            .send(Inbox::External(event))
            .map_err(|_| SystemError::Stopped)
    }

    /// A snapshot of the latest state.
    pub fn state(&self) -> S {
        self.state.borrow().clone()
    }

    /// A stream of every state from now on, starting with the current one.
    ///
    /// Unlike [`state`](SystemHandle::state) and
    /// [`wait_for`](SystemHandle::wait_for), nothing is skipped: the stream
    /// yields one item per transition. It ends when the system stops.
    pub fn states(&self) -> StateStream<S> {
        let (tx, rx) = mpsc::unbounded_channel();
        // A stopped system drops `tx` with the message, ending the stream.
        let _ = self.inbox.send(Inbox::Observe(tx));
        StateStream {
            inner: UnboundedReceiverStream::new(rx),
        }
    }

    /// Wait until the latest state satisfies `predicate` and return it.
    ///
    /// States that are replaced before this task gets to look at them may be
    /// skipped; use [`states`](SystemHandle::states) to see every transition.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&S) -> bool) -> Result<S, SystemError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|state| predicate(state))
            .await
            .map_err(|_| SystemError::Stopped)?;
        Ok(state.clone())
    }

    /// Ask the system to stop.
    ///
    /// Every running effect and source is canceled; events already queued
    /// behind the request are discarded.
    pub fn shutdown(&self) {
        let _ = self.inbox.send(Inbox::Shutdown);
    }

    /// Wait until the system has stopped.
    pub async fn stopped(&self) {
        let mut rx = self.state.clone();
        while rx.changed().await.is_ok() {}
    }

    /// Returns `true` while the system still accepts events.
    pub fn is_running(&self) -> bool {
        !self.inbox.is_closed()
    }
}

/// Every state produced by a system, in order.
///
/// Obtained from [`SystemHandle::states`].
pub struct StateStream<S> {
    inner: UnboundedReceiverStream<S>,
}

impl<S> Stream for StateStream<S> {
    type Item = S;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

struct Running {
    id: EffectId,
    abort: AbortHandle,
}

struct LoopSlot<S, E: Send + 'static> {
    feedback: FeedbackLoop<S, E>,
    running: HashMap<u64, Running>,
}

impl<S, E: Send + 'static> LoopSlot<S, E> {
    fn is_current(&self, member: u64, id: EffectId) -> bool {
        self.running.get(&member).is_some_and(|r| r.id == id)
    }
}

/// The orchestrator: owns the state, serializes every event through the
/// reducer, and starts or cancels effects as the feedback loops decide.
///
/// ```text
///  sources ─┐                         ┌──> observers
///  handles ─┼──> inbox ──> reduce ──> state
///  effects ─┘                  ^       └──> feedback loops ──> effects
///                              └──────────────────────────────────┘
/// ```
///
/// The reducer only ever runs on the task driving the system, so state
/// transitions are totally ordered. Effects run on their own tasks and feed
/// their events back through the same inbox; an event whose effect has been
/// superseded is dropped before it reaches the reducer.
///
/// # Example
///
/// ```rust,ignore
/// let handle = System::<BalanceReducer>::new(BalanceState::new(address))
///     .with_feedback(balance::refresh(repository))
///     .with_source(pull_to_refresh)
///     .spawn();
///
/// handle.send(BalanceEvent::UserPulledToRefresh)?;
/// let state = handle.wait_for(|s| s.action.is_loaded()).await?;
/// ```
pub struct System<R: Reducer> {
    state: R::State,
    slots: Vec<LoopSlot<R::State, R::Event>>,
    sources: Vec<EventSource<R::Event>>,
    source_handles: Vec<AbortHandle>,
    inbox_tx: mpsc::UnboundedSender<Inbox<R::State, R::Event>>,
    inbox_rx: mpsc::UnboundedReceiver<Inbox<R::State, R::Event>>,
    state_tx: watch::Sender<R::State>,
    observers: Vec<mpsc::UnboundedSender<R::State>>,
    options: SystemOptions,
    #[allow(clippy::type_complexity)]
    filter: Option<Box<dyn Fn(R::Event) -> Option<R::Event> + Send>>,
    next_effect: u64,
    directives: Vec<Directive<R::Event>>,
}

impl<R: Reducer> System<R> {
    /// Create a system around an initial state.
    pub fn new(initial: R::State) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(initial.clone());
        Self {
            state: initial,
            slots: Vec::new(),
            sources: Vec::new(),
            source_handles: Vec::new(),
            inbox_tx,
            inbox_rx,
            state_tx,
            observers: Vec::new(),
            options: SystemOptions::default(),
            filter: None,
            next_effect: 0,
            directives: Vec::new(),
        }
    }

    /// Attach a feedback loop.
    ///
    /// Loops see each state in the order they were attached.
    pub fn with_feedback(mut self, feedback: FeedbackLoop<R::State, R::Event>) -> Self {
        self.slots.push(LoopSlot {
            feedback,
            running: HashMap::new(),
        });
        self
    }

    /// Attach several feedback loops at once.
    pub fn with_feedbacks(
        self,
        feedbacks: impl IntoIterator<Item = FeedbackLoop<R::State, R::Event>>,
    ) -> Self {
        feedbacks.into_iter().fold(self, Self::with_feedback)
    }

    /// Attach an external event source.
    pub fn with_source(mut self, source: EventSource<R::Event>) -> Self {
        self.sources.push(source);
        self
    }

    /// Replace the default options.
    pub fn with_options(mut self, options: SystemOptions) -> Self {
        self.options = options;
        self
    }

    /// Set an event filter. Events pass through the filter before reaching
    /// the reducer. Return `Some(event)` to pass (possibly transformed),
    /// `None` to drop.
    pub fn with_filter(
        mut self,
        filter: impl Fn(R::Event) -> Option<R::Event> + Send + 'static,
    ) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Get a non-owning handle, e.g. to keep around before calling
    /// [`run`](System::run).
    pub fn handle(&self) -> SystemHandle<R::State, R::Event> {
        SystemHandle {
            inbox: self.inbox_tx.clone(),
            state: self.state_tx.subscribe(),
            owner: None,
        }
    }

    /// Drive the system on a new tokio task and return an owning handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> SystemHandle<R::State, R::Event> {
        let mut handle = self.handle();
        handle.owner = Some(Arc::new(OwnerGuard {
            inbox: self.inbox_tx.clone(),
        }));
        tokio::spawn(self.run());
        handle
    }

    /// Drive the system until it is shut down, then return the final state.
    pub async fn run(mut self) -> R::State {
        let span = tracing::debug_span!("system", label = %self.options.label);
        async move {
            tracing::debug!(
                feedbacks = self.slots.len(),
                sources = self.sources.len(),
                "system started"
            );
            self.start_sources();
            if self.options.evaluate_initial_state {
                self.evaluate_feedbacks();
            }

            while let Some(msg) = self.inbox_rx.recv().await {
                match msg {
                    Inbox::External(event) => self.dispatch(event),
                    Inbox::Effect {
                        slot,
                        member,
                        id,
                        event,
                    } => {
                        if self.slots[slot].is_current(member, id) {
                            self.dispatch(event);
                        } else {
                            tracing::trace!(
                                feedback = self.slots[slot].feedback.name(),
                                effect = %id,
                                "dropped event from superseded effect"
                            );
                        }
                    }
                    Inbox::Finished { slot, member, id } => {
                        let entry = &mut self.slots[slot];
                        if entry.is_current(member, id) {
                            entry.running.remove(&member);
                            tracing::debug!(
                                feedback = entry.feedback.name(),
                                effect = %id,
                                "effect finished"
                            );
                        }
                    }
                    Inbox::Observe(tx) => {
                        if tx.send(self.state.clone()).is_ok() {
                            self.observers.push(tx);
                        }
                    }
                    Inbox::Shutdown => break,
                }
            }

            self.cancel_all();
            tracing::debug!("system stopped");
            self.state
        }
        .instrument(span)
        .await
    }

    fn start_sources(&mut self) {
        for source in self.sources.drain(..) {
            let tx = self.inbox_tx.clone();
            let name = source.name;
            let mut stream = source.stream;
            let handle = tokio::spawn(async move {
                while let Some(event) = stream.next().await {
                    if tx.send(Inbox::External(event)).is_err() {
                        break;
                    }
                }
                tracing::debug!(source = %name, "event source ended");
            });
            self.source_handles.push(handle.abort_handle());
        }
    }

    fn dispatch(&mut self, event: R::Event) {
        let event = match &self.filter {
            Some(filter) => match filter(event) {
                Some(event) => event,
                None => return,
            },
            None => event,
        };

        self.state = R::reduce(self.state.clone(), event);
        self.evaluate_feedbacks();

        self.state_tx.send_replace(self.state.clone());
        let state = &self.state;
        self.observers.retain(|tx| tx.send(state.clone()).is_ok());
    }

    /// Show the current state to every loop and apply their decisions.
    fn evaluate_feedbacks(&mut self) {
        for index in 0..self.slots.len() {
            let mut directives = std::mem::take(&mut self.directives);
            self.slots[index].feedback.react(&self.state, &mut directives);
            for directive in directives.drain(..) {
                match directive {
                    Directive::Cancel { member } => self.cancel(index, member),
                    Directive::Start {
                        member,
                        request,
                        effect,
                    } => self.start(index, member, &request, effect),
                }
            }
            self.directives = directives;
        }
    }

    fn cancel(&mut self, index: usize, member: u64) {
        let entry = &mut self.slots[index];
        if let Some(running) = entry.running.remove(&member) {
            running.abort.abort();
            tracing::debug!(
                feedback = entry.feedback.name(),
                effect = %running.id,
                "effect canceled"
            );
        }
    }

    fn start(&mut self, index: usize, member: u64, request: &str, effect: Effect<R::Event>) {
        let id = EffectId(self.next_effect);
        self.next_effect += 1;

        let entry = &mut self.slots[index];
        tracing::debug!(
            feedback = entry.feedback.name(),
            effect = %id,
            request,
            "effect started"
        );
        if effect.is_none() {
            return;
        }

        let tx = self.inbox_tx.clone();
        let mut events = effect.into_stream();
        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let msg = Inbox::Effect {
                    slot: index,
                    member,
                    id,
                    event,
                };
                if tx.send(msg).is_err() {
                    return;
                }
            }
            let _ = tx.send(Inbox::Finished {
                slot: index,
                member,
                id,
            });
        });
        entry.running.insert(
            member,
            Running {
                id,
                abort: handle.abort_handle(),
            },
        );
    }

    fn cancel_all(&mut self) {
        for entry in &mut self.slots {
            for (_, running) in entry.running.drain() {
                running.abort.abort();
            }
        }
        for handle in self.source_handles.drain(..) {
            handle.abort();
        }
        self.observers.clear();
    }
}
