use crate::effect::Effect;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

/// A value derived from state that says "an effect should be running for me".
///
/// Requests are compared by value on every transition. Which state fields a
/// request carries decides which state changes the loop cares about: two
/// states that project to equal requests are the same as far as the loop is
/// concerned, and the running effect is left alone.
///
/// Blanket-implemented for every `PartialEq + Clone + Debug + Send + Sync +
/// 'static` type.
pub trait Request: PartialEq + Clone + Debug + Send + Sync + 'static {}

impl<T: PartialEq + Clone + Debug + Send + Sync + 'static> Request for T {}

/// Identifies one started effect for the lifetime of a system.
///
/// Every event an effect forwards is tagged with its id; the runtime drops
/// events whose id is no longer the current one for their loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EffectId(pub(crate) u64);

impl EffectId {
    /// The raw sequence number (ids increase in start order).
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a loop wants done after looking at a new state.
pub(crate) enum Directive<E: Send + 'static> {
    /// Stop the effect occupying `member`.
    Cancel { member: u64 },
    /// Start `effect` for a new request in `member`.
    Start {
        member: u64,
        request: String,
        effect: Effect<E>,
    },
}

impl<E: Send + 'static> Directive<E> {
    fn map<F2: Send + 'static>(self, f: Arc<dyn Fn(E) -> F2 + Send + Sync>) -> Directive<F2> {
        match self {
            Directive::Cancel { member } => Directive::Cancel { member },
            Directive::Start {
                member,
                request,
                effect,
            } => Directive::Start {
                member,
                request,
                effect: effect.map(move |event| f(event)),
            },
        }
    }
}

/// The per-loop decision procedure: state in, start/cancel directives out.
pub(crate) trait Reactor<S, E: Send + 'static>: Send {
    fn react(&mut self, state: &S, out: &mut Vec<Directive<E>>);
}

/// A pairing of a request extractor and an effect factory.
///
/// The runtime shows every new state to every loop. The loop projects the
/// state to a request and compares it to the request behind its running
/// effect:
///
/// | previous | next | action |
/// |----------|------|--------|
/// | none | none | nothing |
/// | `a` | `a` | nothing (the effect keeps running) |
/// | none | `b` | start an effect for `b` |
/// | `a` | `b` | cancel the effect for `a`, then start one for `b` |
/// | `a` | none | cancel the effect for `a` |
///
/// Decisions are taken transition by transition, in state order; a request
/// that appears for a single state still starts (and then cancels) its
/// effect.
///
/// # Example
///
/// ```rust,ignore
/// // Document the equality decision next to the extractor: only the address
/// // matters, so refreshing again for the same wallet reuses the fetch.
/// let refresh = FeedbackLoop::new(
///     "refresh",
///     |state: &BalanceState| state.needs_refresh.then(|| RefreshRequest {
///         address: state.address.clone(),
///     }),
///     move |request: RefreshRequest| {
///         let repository = repository.clone();
///         Effect::try_perform(
///             async move { repository.balances(&request.address).await },
///             BalanceEvent::BalancesLoaded,
///             BalanceEvent::BalancesFailed,
///         )
///     },
/// );
/// ```
pub struct FeedbackLoop<S, E: Send + 'static> {
    name: Cow<'static, str>,
    reactor: Box<dyn Reactor<S, E>>,
}

impl<S: 'static, E: Send + 'static> FeedbackLoop<S, E> {
    /// A loop running at most one effect, for the request `extractor` returns.
    pub fn new<R, X, F>(name: impl Into<Cow<'static, str>>, extractor: X, effect: F) -> Self
    where
        R: Request,
        X: Fn(&S) -> Option<R> + Send + 'static,
        F: Fn(R) -> Effect<E> + Send + 'static,
    {
        FeedbackLoop {
            name: name.into(),
            reactor: Box::new(Latest {
                extractor,
                effect,
                current: None,
                _state: PhantomData,
            }),
        }
    }

    /// A loop running one effect per distinct request in a set.
    ///
    /// Requests that leave the set are canceled, new ones are started and the
    /// rest keep running. Duplicates within one projection count once.
    pub fn keyed<R, X, F>(name: impl Into<Cow<'static, str>>, extractor: X, effect: F) -> Self
    where
        R: Request + Hash + Eq,
        X: Fn(&S) -> Vec<R> + Send + 'static,
        F: Fn(R) -> Effect<E> + Send + 'static,
    {
        FeedbackLoop {
            name: name.into(),
            reactor: Box::new(Keyed {
                extractor,
                effect,
                active: HashMap::new(),
                next_member: 0,
                _state: PhantomData,
            }),
        }
    }

    /// The loop's name, used in logs and test activity records.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lift a module's loop into a parent system.
    ///
    /// `lens` selects the module's slice of the parent state and `map` wraps
    /// the module's events into parent events.
    pub fn scope<P, PE>(
        self,
        lens: impl Fn(&P) -> &S + Send + 'static,
        map: impl Fn(E) -> PE + Send + Sync + 'static,
    ) -> FeedbackLoop<P, PE>
    where
        P: 'static,
        PE: Send + 'static,
    {
        FeedbackLoop {
            name: self.name,
            reactor: Box::new(Scoped {
                inner: self.reactor,
                lens,
                map: Arc::new(map),
                scratch: Vec::new(),
                _parent: PhantomData,
            }),
        }
    }

    pub(crate) fn react(&mut self, state: &S, out: &mut Vec<Directive<E>>) {
        self.reactor.react(state, out);
    }
}

impl<S, E: Send + 'static> Debug for FeedbackLoop<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedbackLoop")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

struct Latest<S, R, X, F> {
    extractor: X,
    effect: F,
    current: Option<R>,
    _state: PhantomData<fn(&S)>,
}

impl<S, E, R, X, F> Reactor<S, E> for Latest<S, R, X, F>
where
    E: Send + 'static,
    R: Request,
    X: Fn(&S) -> Option<R> + Send,
    F: Fn(R) -> Effect<E> + Send,
{
    fn react(&mut self, state: &S, out: &mut Vec<Directive<E>>) {
        let next = (self.extractor)(state);
        if next == self.current {
            return;
        }
        if self.current.take().is_some() {
            out.push(Directive::Cancel { member: 0 });
        }
        if let Some(request) = next {
            out.push(Directive::Start {
                member: 0,
                request: format!("{request:?}"),
                effect: (self.effect)(request.clone()),
            });
            self.current = Some(request);
        }
    }
}

struct Keyed<S, R, X, F> {
    extractor: X,
    effect: F,
    active: HashMap<R, u64>,
    next_member: u64,
    _state: PhantomData<fn(&S)>,
}

impl<S, E, R, X, F> Reactor<S, E> for Keyed<S, R, X, F>
where
    E: Send + 'static,
    R: Request + Hash + Eq,
    X: Fn(&S) -> Vec<R> + Send,
    F: Fn(R) -> Effect<E> + Send,
{
    fn react(&mut self, state: &S, out: &mut Vec<Directive<E>>) {
        let wanted = (self.extractor)(state);

        let mut gone: Vec<u64> = self
            .active
            .iter()
            .filter(|(request, _)| !wanted.contains(request))
            .map(|(_, member)| *member)
            .collect();
        gone.sort_unstable();
        self.active.retain(|request, _| wanted.contains(request));
        out.extend(gone.into_iter().map(|member| Directive::Cancel { member }));

        for request in wanted {
            if self.active.contains_key(&request) {
                continue;
            }
            let member = self.next_member;
            self.next_member += 1;
            out.push(Directive::Start {
                member,
                request: format!("{request:?}"),
                effect: (self.effect)(request.clone()),
            });
            self.active.insert(request, member);
        }
    }
}

struct Scoped<P, S, E: Send + 'static, PE, L> {
    inner: Box<dyn Reactor<S, E>>,
    lens: L,
    map: Arc<dyn Fn(E) -> PE + Send + Sync>,
    scratch: Vec<Directive<E>>,
    _parent: PhantomData<fn(&P)>,
}

impl<P, S, E, PE, L> Reactor<P, PE> for Scoped<P, S, E, PE, L>
where
    E: Send + 'static,
    PE: Send + 'static,
    L: Fn(&P) -> &S + Send,
{
    fn react(&mut self, state: &P, out: &mut Vec<Directive<PE>>) {
        self.inner.react((self.lens)(state), &mut self.scratch);
        out.extend(self.scratch.drain(..).map(|d| d.map(self.map.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default)]
    struct Screen {
        query: Option<String>,
        unrelated: u32,
        watched: Vec<u8>,
    }

    #[derive(Debug, PartialEq)]
    enum Seen {
        Cancel(u64),
        Start(u64, String),
    }

    fn search_loop() -> FeedbackLoop<Screen, String> {
        FeedbackLoop::new(
            "search",
            |s: &Screen| s.query.clone(),
            |q: String| Effect::message(q),
        )
    }

    fn watch_loop() -> FeedbackLoop<Screen, String> {
        FeedbackLoop::keyed(
            "watch",
            |s: &Screen| s.watched.clone(),
            |id: u8| Effect::message(id.to_string()),
        )
    }

    fn step<S: 'static, E: Send + 'static>(
        feedback: &mut FeedbackLoop<S, E>,
        state: &S,
    ) -> Vec<Seen> {
        let mut out = Vec::new();
        feedback.react(state, &mut out);
        out.into_iter()
            .map(|d| match d {
                Directive::Cancel { member } => Seen::Cancel(member),
                Directive::Start {
                    member, request, ..
                } => Seen::Start(member, request),
            })
            .collect()
    }

    #[test]
    fn requests_can_be_shared_across_threads() {
        fn debug_elsewhere<R: Request>(request: R) -> String {
            let shared = Arc::new(request);
            let other = shared.clone();
            std::thread::spawn(move || format!("{other:?}"))
                .join()
                .unwrap()
        }
        assert_eq!(debug_elsewhere(Some(7u32)), "Some(7)");
    }

    #[test]
    fn absent_request_does_nothing() {
        let mut feedback = search_loop();
        assert!(step(&mut feedback, &Screen::default()).is_empty());
    }

    #[test]
    fn new_request_starts_effect() {
        let mut feedback = search_loop();
        let state = Screen {
            query: Some("waves".into()),
            ..Screen::default()
        };
        assert_eq!(
            step(&mut feedback, &state),
            vec![Seen::Start(0, "\"waves\"".into())]
        );
    }

    #[test]
    fn unchanged_request_is_not_restarted() {
        let mut feedback = search_loop();
        let mut state = Screen {
            query: Some("waves".into()),
            ..Screen::default()
        };
        step(&mut feedback, &state);
        state.unrelated += 1;
        assert!(step(&mut feedback, &state).is_empty());
        state.unrelated += 1;
        assert!(step(&mut feedback, &state).is_empty());
    }

    #[test]
    fn changed_request_cancels_before_starting() {
        let mut feedback = search_loop();
        let mut state = Screen {
            query: Some("waves".into()),
            ..Screen::default()
        };
        step(&mut feedback, &state);
        state.query = Some("btc".into());
        assert_eq!(
            step(&mut feedback, &state),
            vec![Seen::Cancel(0), Seen::Start(0, "\"btc\"".into())]
        );
    }

    #[test]
    fn removed_request_cancels() {
        let mut feedback = search_loop();
        let mut state = Screen {
            query: Some("waves".into()),
            ..Screen::default()
        };
        step(&mut feedback, &state);
        state.query = None;
        assert_eq!(step(&mut feedback, &state), vec![Seen::Cancel(0)]);
        assert!(step(&mut feedback, &state).is_empty());
    }

    #[test]
    fn request_returning_after_absence_restarts() {
        let mut feedback = search_loop();
        let on = Screen {
            query: Some("waves".into()),
            ..Screen::default()
        };
        let off = Screen::default();
        step(&mut feedback, &on);
        step(&mut feedback, &off);
        assert_eq!(
            step(&mut feedback, &on),
            vec![Seen::Start(0, "\"waves\"".into())]
        );
    }

    #[test]
    fn keyed_starts_each_distinct_request_once() {
        let mut feedback = watch_loop();
        let state = Screen {
            watched: vec![1, 2, 2],
            ..Screen::default()
        };
        assert_eq!(
            step(&mut feedback, &state),
            vec![Seen::Start(0, "1".into()), Seen::Start(1, "2".into())]
        );
        assert!(step(&mut feedback, &state).is_empty());
    }

    #[test]
    fn keyed_diffs_membership() {
        let mut feedback = watch_loop();
        let mut state = Screen {
            watched: vec![1, 2],
            ..Screen::default()
        };
        step(&mut feedback, &state);
        state.watched = vec![2, 3];
        assert_eq!(
            step(&mut feedback, &state),
            vec![Seen::Cancel(0), Seen::Start(2, "3".into())]
        );
        state.watched.clear();
        assert_eq!(
            step(&mut feedback, &state),
            vec![Seen::Cancel(1), Seen::Cancel(2)]
        );
    }

    #[test]
    fn scoped_loop_reads_slice_and_wraps_events() {
        #[derive(Default)]
        struct App {
            screen: Screen,
        }

        let mut feedback: FeedbackLoop<App, Option<String>> =
            search_loop().scope(|app: &App| &app.screen, Some);
        assert_eq!(feedback.name(), "search");

        let app = App {
            screen: Screen {
                query: Some("eur".into()),
                ..Screen::default()
            },
        };
        let mut out = Vec::new();
        feedback.react(&app, &mut out);
        assert_eq!(out.len(), 1);
        match out.pop() {
            Some(Directive::Start { effect, .. }) => {
                assert_eq!(effect.into_message(), Some(Some("eur".to_string())));
            }
            _ => panic!("expected a start directive"),
        }
    }
}
