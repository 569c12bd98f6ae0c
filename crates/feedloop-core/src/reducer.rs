/// The pure transition function of a feedback system.
///
/// A `Reducer` is the only place where state changes. The runtime hands it
/// the current state and one event at a time, strictly serialized, and stores
/// whatever it returns as the new state.
///
/// Implementations must be:
///
/// * **pure** -- no I/O, no blocking, no global state;
/// * **total** -- every `(State, Event)` pair is handled; combinations that
///   mean nothing in the current state return `state` unchanged;
/// * **deterministic** -- replaying the same events from the same initial
///   state always yields the same sequence of states.
///
/// Side effects belong to [`FeedbackLoop`](crate::FeedbackLoop)s, which derive
/// requests from the state the reducer produces.
///
/// # Example
///
/// ```
/// use feedloop_core::Reducer;
///
/// #[derive(Clone, Default, PartialEq, Debug)]
/// struct Counter { count: i64 }
///
/// enum CounterEvent { Increment, Decrement }
///
/// struct CounterReducer;
///
/// impl Reducer for CounterReducer {
///     type State = Counter;
///     type Event = CounterEvent;
///
///     fn reduce(state: Counter, event: CounterEvent) -> Counter {
///         match event {
///             CounterEvent::Increment => Counter { count: state.count + 1 },
///             CounterEvent::Decrement => Counter { count: state.count - 1 },
///         }
///     }
/// }
///
/// let state = CounterReducer::reduce(Counter::default(), CounterEvent::Increment);
/// assert_eq!(state.count, 1);
/// ```
pub trait Reducer: Send + 'static {
    /// The module's state.
    ///
    /// Cloned once per transition for every observer, so prefer cheap clones
    /// (small values, `Arc`-backed collections).
    type State: Clone + Send + Sync + 'static;

    /// Every stimulus that can change [`State`](Reducer::State): user intents,
    /// effect results, lifecycle signals.
    type Event: Send + 'static;

    /// Apply one event to the state and return the next state.
    fn reduce(state: Self::State, event: Self::Event) -> Self::State;
}

/// Replay `events` through `R::reduce`, starting from `initial`.
///
/// Returns the final state. Useful for asserting determinism and for
/// rebuilding a state from a recorded event log.
pub fn replay<R, I>(initial: R::State, events: I) -> R::State
where
    R: Reducer,
    I: IntoIterator<Item = R::Event>,
{
    events.into_iter().fold(initial, R::reduce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Tally {
        total: i64,
        history: Vec<i64>,
    }

    #[derive(Clone, Debug)]
    enum TallyEvent {
        Add(i64),
        Undo,
        Clear,
    }

    struct TallyReducer;

    impl Reducer for TallyReducer {
        type State = Tally;
        type Event = TallyEvent;

        fn reduce(mut state: Tally, event: TallyEvent) -> Tally {
            match event {
                TallyEvent::Add(n) => {
                    state.total = state.total.saturating_add(n);
                    state.history.push(n);
                }
                TallyEvent::Undo => {
                    if let Some(n) = state.history.pop() {
                        state.total = state.total.saturating_sub(n);
                    }
                }
                TallyEvent::Clear => state = Tally::default(),
            }
            state
        }
    }

    fn tally_event() -> impl Strategy<Value = TallyEvent> {
        prop_oneof![
            (-1000i64..1000).prop_map(TallyEvent::Add),
            Just(TallyEvent::Undo),
            Just(TallyEvent::Clear),
        ]
    }

    #[test]
    fn replay_folds_in_order() {
        let state = replay::<TallyReducer, _>(
            Tally::default(),
            [TallyEvent::Add(2), TallyEvent::Add(3), TallyEvent::Undo],
        );
        assert_eq!(state.total, 2);
        assert_eq!(state.history, vec![2]);
    }

    #[test]
    fn replay_of_nothing_is_initial() {
        let initial = Tally {
            total: 7,
            history: vec![7],
        };
        let state = replay::<TallyReducer, _>(initial.clone(), []);
        assert_eq!(state, initial);
    }

    proptest! {
        #[test]
        fn replay_is_deterministic(events in prop::collection::vec(tally_event(), 0..64)) {
            let a = replay::<TallyReducer, _>(Tally::default(), events.clone());
            let b = replay::<TallyReducer, _>(Tally::default(), events);
            prop_assert_eq!(a, b);
        }
    }
}
