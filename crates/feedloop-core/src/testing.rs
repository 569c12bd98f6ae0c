use crate::effect::{Effect, EffectInner};
use crate::feedback::{Directive, FeedbackLoop};
use crate::reducer::Reducer;
use crate::ui::View;
use futures::stream::BoxStream;
use futures::StreamExt;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::Terminal;
use std::collections::BTreeMap;

/// What a feedback loop did in response to a state, as recorded by
/// [`TestSystem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
    /// An effect was started for `request` (its `Debug` rendering).
    Started { feedback: String, request: String },
    /// The effect started for `request` was canceled.
    Canceled { feedback: String, request: String },
}

impl Activity {
    /// Shorthand for building an expected [`Activity::Started`].
    pub fn started(feedback: &str, request: impl std::fmt::Debug) -> Self {
        Activity::Started {
            feedback: feedback.to_string(),
            request: format!("{request:?}"),
        }
    }

    /// Shorthand for building an expected [`Activity::Canceled`].
    pub fn canceled(feedback: &str, request: impl std::fmt::Debug) -> Self {
        Activity::Canceled {
            feedback: feedback.to_string(),
            request: format!("{request:?}"),
        }
    }
}

struct InFlight<E> {
    id: u64,
    request: String,
    stream: Option<BoxStream<'static, E>>,
}

/// An immediate event waiting for `drain_messages`, tagged with its effect.
struct Pending<E> {
    key: (usize, u64),
    id: u64,
    event: E,
}

/// A headless harness that drives a reducer and its feedback loops without
/// spawning anything.
///
/// `TestSystem` applies the same start/cancel decisions as
/// [`System`](crate::System) but, instead of running effects, records them:
///
/// * every start and cancel is appended to [`activity`](TestSystem::activity);
/// * effects that are a single immediate event ([`Effect::message`]) queue
///   that event, flushed with [`drain_messages`](TestSystem::drain_messages)
///   unless the effect was canceled first;
/// * every other effect stays in flight until a test resolves it with
///   [`resolve`](TestSystem::resolve), which feeds its events back one by one
///   and stops as soon as the effect is superseded.
///
/// # Example
///
/// ```rust,ignore
/// use feedloop_core::testing::{Activity, TestSystem};
///
/// let mut sys = TestSystem::<BalanceReducer>::new(BalanceState::new(address))
///     .with_feedback(balance::refresh(repository));
/// sys.send(BalanceEvent::UserPulledToRefresh);
/// sys.send(BalanceEvent::UserPulledToRefresh);
/// assert_eq!(sys.activity().len(), 1);
///
/// sys.resolve("refresh").await;
/// assert!(!sys.state().needs_refresh);
/// ```
pub struct TestSystem<R: Reducer> {
    state: R::State,
    feedbacks: Vec<FeedbackLoop<R::State, R::Event>>,
    in_flight: BTreeMap<(usize, u64), InFlight<R::Event>>,
    activity: Vec<Activity>,
    pending_events: Vec<Pending<R::Event>>,
    transitions: usize,
    next_effect: u64,
}

impl<R: Reducer> TestSystem<R> {
    /// Create a harness around an initial state, with no feedback loops.
    pub fn new(initial: R::State) -> Self {
        Self {
            state: initial,
            feedbacks: Vec::new(),
            in_flight: BTreeMap::new(),
            activity: Vec::new(),
            pending_events: Vec::new(),
            transitions: 0,
            next_effect: 0,
        }
    }

    /// Attach a feedback loop and show it the current state.
    pub fn with_feedback(mut self, feedback: FeedbackLoop<R::State, R::Event>) -> Self {
        self.feedbacks.push(feedback);
        let index = self.feedbacks.len() - 1;
        self.evaluate(index);
        self
    }

    /// Attach several feedback loops at once.
    pub fn with_feedbacks(
        self,
        feedbacks: impl IntoIterator<Item = FeedbackLoop<R::State, R::Event>>,
    ) -> Self {
        feedbacks.into_iter().fold(self, Self::with_feedback)
    }

    /// Reduce one event, then let every loop react to the new state.
    pub fn send(&mut self, event: R::Event) {
        self.state = R::reduce(self.state.clone(), event);
        self.transitions += 1;
        for index in 0..self.feedbacks.len() {
            self.evaluate(index);
        }
    }

    /// Send several events in order.
    pub fn send_all(&mut self, events: impl IntoIterator<Item = R::Event>) {
        for event in events {
            self.send(event);
        }
    }

    /// Deliver queued immediate events until none are left.
    ///
    /// Events whose effect was canceled in the meantime are discarded.
    pub fn drain_messages(&mut self) {
        while !self.pending_events.is_empty() {
            let pending: Vec<_> = self.pending_events.drain(..).collect();
            for Pending { key, id, event } in pending {
                if self.is_current(key, id) {
                    self.in_flight.remove(&key);
                    self.send(event);
                }
            }
        }
    }

    /// Run the oldest in-flight effect of `feedback` to completion, reducing
    /// each of its events.
    ///
    /// Stops early when one of those events supersedes the effect itself.
    /// Returns the number of events that reached the reducer.
    pub async fn resolve(&mut self, feedback: &str) -> usize {
        let Some(key) = self.in_flight_key(feedback) else {
            return 0;
        };
        let Some((id, mut stream)) = self
            .in_flight
            .get_mut(&key)
            .and_then(|f| f.stream.take().map(|s| (f.id, s)))
        else {
            return 0;
        };

        let mut delivered = 0;
        while let Some(event) = stream.next().await {
            if !self.is_current(key, id) {
                return delivered;
            }
            self.send(event);
            delivered += 1;
        }
        if self.is_current(key, id) {
            self.in_flight.remove(&key);
        }
        delivered
    }

    /// Requests (`Debug` renderings) with an effect still in flight for
    /// `feedback`, oldest first.
    pub fn in_flight(&self, feedback: &str) -> Vec<String> {
        let Some(index) = self.index_of(feedback) else {
            return Vec::new();
        };
        self.in_flight
            .range((index, 0)..=(index, u64::MAX))
            .map(|(_, f)| f.request.clone())
            .collect()
    }

    /// Every start and cancel recorded so far.
    pub fn activity(&self) -> &[Activity] {
        &self.activity
    }

    /// Take the recorded activity, leaving the log empty.
    pub fn take_activity(&mut self) -> Vec<Activity> {
        std::mem::take(&mut self.activity)
    }

    /// The current state.
    pub fn state(&self) -> &R::State {
        &self.state
    }

    /// Number of events reduced so far.
    pub fn transitions(&self) -> usize {
        self.transitions
    }

    fn index_of(&self, feedback: &str) -> Option<usize> {
        self.feedbacks.iter().position(|f| f.name() == feedback)
    }

    fn in_flight_key(&self, feedback: &str) -> Option<(usize, u64)> {
        let index = self.index_of(feedback)?;
        self.in_flight
            .range((index, 0)..=(index, u64::MAX))
            .filter(|(_, f)| f.stream.is_some())
            .min_by_key(|(_, f)| f.id)
            .map(|(key, _)| *key)
    }

    fn is_current(&self, key: (usize, u64), id: u64) -> bool {
        self.in_flight.get(&key).is_some_and(|f| f.id == id)
    }

    fn evaluate(&mut self, index: usize) {
        let mut directives = Vec::new();
        self.feedbacks[index].react(&self.state, &mut directives);
        let name = self.feedbacks[index].name().to_string();

        for directive in directives {
            match directive {
                Directive::Cancel { member } => {
                    if let Some(flight) = self.in_flight.remove(&(index, member)) {
                        self.activity.push(Activity::Canceled {
                            feedback: name.clone(),
                            request: flight.request,
                        });
                    }
                }
                Directive::Start {
                    member,
                    request,
                    effect,
                } => {
                    self.activity.push(Activity::Started {
                        feedback: name.clone(),
                        request: request.clone(),
                    });
                    self.launch(index, member, request, effect);
                }
            }
        }
    }

    fn launch(&mut self, index: usize, member: u64, request: String, effect: Effect<R::Event>) {
        let id = self.next_effect;
        self.next_effect += 1;
        let key = (index, member);
        let stream = match effect.inner {
            EffectInner::None => return,
            EffectInner::Message(event) => {
                self.pending_events.push(Pending { key, id, event });
                None
            }
            inner => Some(Effect { inner }.into_stream()),
        };
        self.in_flight.insert(
            key,
            InFlight {
                id,
                request,
                stream,
            },
        );
    }
}

/// Render `state` through `view` into a [`Buffer`] of the given size.
pub fn render<S, V: View<S>>(view: &V, state: &S, width: u16, height: u16) -> Buffer {
    let backend = ratatui::backend::TestBackend::new(width, height);
    let mut terminal = Terminal::new(backend).unwrap();
    terminal
        .draw(|frame| {
            let area = frame.area();
            view.render(state, frame, area);
        })
        .unwrap();
    terminal.backend().buffer().clone()
}

/// Render `state` through `view` and return the visible content as text.
///
/// Rows are separated by newlines; trailing whitespace within each row is
/// preserved.
pub fn render_string<S, V: View<S>>(view: &V, state: &S, width: u16, height: u16) -> String {
    let buf = render(view, state, width, height);
    let area = Rect::new(0, 0, width, height);
    let mut output = String::new();
    for y in area.top()..area.bottom() {
        for x in area.left()..area.right() {
            output.push_str(buf[(x, y)].symbol());
        }
        if y < area.bottom() - 1 {
            output.push('\n');
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Search {
        query: Option<String>,
        hits: Vec<String>,
        keystrokes: u32,
    }

    #[derive(Debug)]
    enum SearchEvent {
        Typed(String),
        Cleared,
        Keystroke,
        Hit(String),
    }

    struct SearchReducer;

    impl Reducer for SearchReducer {
        type State = Search;
        type Event = SearchEvent;

        fn reduce(mut state: Search, event: SearchEvent) -> Search {
            match event {
                SearchEvent::Typed(q) => state.query = Some(q),
                SearchEvent::Cleared => state.query = None,
                SearchEvent::Keystroke => state.keystrokes += 1,
                SearchEvent::Hit(h) => state.hits.push(h),
            }
            state
        }
    }

    fn search() -> FeedbackLoop<Search, SearchEvent> {
        FeedbackLoop::new(
            "search",
            |s: &Search| s.query.clone(),
            |q: String| {
                Effect::stream(futures::stream::iter(vec![
                    SearchEvent::Hit(format!("{q}-1")),
                    SearchEvent::Hit(format!("{q}-2")),
                ]))
            },
        )
    }

    fn echo() -> FeedbackLoop<Search, SearchEvent> {
        FeedbackLoop::new(
            "echo",
            |s: &Search| (s.keystrokes == 1).then_some(()),
            |()| Effect::message(SearchEvent::Hit("first keystroke".into())),
        )
    }

    #[test]
    fn records_start_once_per_request() {
        let mut sys = TestSystem::<SearchReducer>::new(Search::default()).with_feedback(search());
        sys.send(SearchEvent::Typed("waves".into()));
        sys.send(SearchEvent::Keystroke);
        sys.send(SearchEvent::Keystroke);
        assert_eq!(sys.activity(), &[Activity::started("search", "waves")]);
        assert_eq!(sys.in_flight("search"), vec!["\"waves\""]);
        assert_eq!(sys.transitions(), 3);
    }

    #[test]
    fn records_cancel_before_restart() {
        let mut sys = TestSystem::<SearchReducer>::new(Search::default()).with_feedback(search());
        sys.send(SearchEvent::Typed("waves".into()));
        sys.send(SearchEvent::Typed("btc".into()));
        sys.send(SearchEvent::Cleared);
        assert_eq!(
            sys.take_activity(),
            vec![
                Activity::started("search", "waves"),
                Activity::canceled("search", "waves"),
                Activity::started("search", "btc"),
                Activity::canceled("search", "btc"),
            ]
        );
        assert!(sys.activity().is_empty());
        assert!(sys.in_flight("search").is_empty());
    }

    #[test]
    fn initial_state_is_evaluated_on_attach() {
        let initial = Search {
            query: Some("eur".into()),
            ..Search::default()
        };
        let sys = TestSystem::<SearchReducer>::new(initial).with_feedback(search());
        assert_eq!(sys.activity(), &[Activity::started("search", "eur")]);
    }

    #[test]
    fn immediate_effects_are_drained() {
        let mut sys = TestSystem::<SearchReducer>::new(Search::default()).with_feedback(echo());
        sys.send(SearchEvent::Keystroke);
        assert!(sys.state().hits.is_empty());
        sys.drain_messages();
        assert_eq!(sys.state().hits, vec!["first keystroke"]);
    }

    #[test]
    fn canceled_immediate_effects_are_not_delivered() {
        let lookup = FeedbackLoop::new(
            "lookup",
            |s: &Search| s.query.clone(),
            |q: String| Effect::message(SearchEvent::Hit(q)),
        );
        let mut sys = TestSystem::<SearchReducer>::new(Search::default()).with_feedback(lookup);
        sys.send(SearchEvent::Typed("waves".into()));
        sys.send(SearchEvent::Typed("btc".into()));
        sys.send(SearchEvent::Cleared);
        assert_eq!(
            sys.activity(),
            &[
                Activity::started("lookup", "waves"),
                Activity::canceled("lookup", "waves"),
                Activity::started("lookup", "btc"),
                Activity::canceled("lookup", "btc"),
            ]
        );

        sys.drain_messages();
        assert!(sys.state().hits.is_empty());
        assert_eq!(sys.transitions(), 3);
    }

    #[test]
    fn only_the_latest_immediate_effect_is_delivered() {
        let lookup = FeedbackLoop::new(
            "lookup",
            |s: &Search| s.query.clone(),
            |q: String| Effect::message(SearchEvent::Hit(q)),
        );
        let mut sys = TestSystem::<SearchReducer>::new(Search::default()).with_feedback(lookup);
        sys.send(SearchEvent::Typed("waves".into()));
        sys.send(SearchEvent::Typed("btc".into()));
        assert_eq!(sys.in_flight("lookup"), vec!["\"btc\""]);

        sys.drain_messages();
        assert_eq!(sys.state().hits, vec!["btc"]);
        assert!(sys.in_flight("lookup").is_empty());
    }

    #[tokio::test]
    async fn resolve_feeds_effect_events_back() {
        let mut sys = TestSystem::<SearchReducer>::new(Search::default()).with_feedback(search());
        sys.send(SearchEvent::Typed("waves".into()));
        assert_eq!(sys.resolve("search").await, 2);
        assert_eq!(sys.state().hits, vec!["waves-1", "waves-2"]);
        assert!(sys.in_flight("search").is_empty());
    }

    #[tokio::test]
    async fn resolve_of_unknown_loop_is_noop() {
        let mut sys = TestSystem::<SearchReducer>::new(Search::default()).with_feedback(search());
        assert_eq!(sys.resolve("missing").await, 0);
        assert_eq!(sys.resolve("search").await, 0);
    }

    #[tokio::test]
    async fn resolve_stops_when_effect_is_superseded() {
        // Each hit clears the query, which cancels the effect producing it.
        struct Clearing;
        impl Reducer for Clearing {
            type State = Search;
            type Event = SearchEvent;
            fn reduce(state: Search, event: SearchEvent) -> Search {
                let hit = matches!(event, SearchEvent::Hit(_));
                let mut state = SearchReducer::reduce(state, event);
                if hit {
                    state.query = None;
                }
                state
            }
        }

        let mut sys = TestSystem::<Clearing>::new(Search::default()).with_feedback(search());
        sys.send(SearchEvent::Typed("waves".into()));
        assert_eq!(sys.resolve("search").await, 1);
        assert_eq!(sys.state().hits, vec!["waves-1"]);
    }
}
