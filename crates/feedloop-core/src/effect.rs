use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{Future, Stream, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The asynchronous work a [`FeedbackLoop`](crate::FeedbackLoop) runs for a
/// request.
///
/// An effect produces zero or more events and then terminates. The runtime
/// drives it on its own tokio task and forwards every event it yields back
/// into the reducer, for as long as the request that started it stays
/// current. Once the request changes or disappears the task is aborted and any
/// event it still manages to yield is dropped.
///
/// Failures never escape an effect: the `try_*` constructors take an error
/// mapping so that a failed operation becomes an ordinary event carrying the
/// error for the reducer to interpret.
///
/// # Examples
///
/// ```rust,ignore
/// // Nothing to do for this request:
/// let effect = Effect::none();
///
/// // Await a fallible call and map both outcomes into events:
/// let effect = Effect::try_perform(
///     async move { repository.balances(&address).await },
///     Event::BalancesLoaded,
///     Event::BalancesFailed,
/// );
/// ```
pub struct Effect<E: Send + 'static> {
    pub(crate) inner: EffectInner<E>,
}

pub(crate) enum EffectInner<E: Send + 'static> {
    None,
    Message(E),
    Future(BoxFuture<'static, E>),
    Stream(BoxStream<'static, E>),
    Batch(Vec<Effect<E>>),
    Sequence(Vec<Effect<E>>),
}

impl<E: Send + 'static> Effect<E> {
    /// An effect that does nothing.
    ///
    /// The request that produced it still counts as seen: the loop will not
    /// ask again until the request changes.
    pub fn none() -> Self {
        Effect {
            inner: EffectInner::None,
        }
    }

    /// Emit a single event immediately.
    pub fn message(event: E) -> Self {
        Effect {
            inner: EffectInner::Message(event),
        }
    }

    /// Await a future and map its output to an event.
    pub fn perform<F, T>(future: F, map: impl FnOnce(T) -> E + Send + 'static) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Effect {
            inner: EffectInner::Future(Box::pin(async move { map(future.await) })),
        }
    }

    /// Await a fallible future, mapping success and failure to events.
    pub fn try_perform<F, T, Err>(
        future: F,
        on_ok: impl FnOnce(T) -> E + Send + 'static,
        on_err: impl FnOnce(Err) -> E + Send + 'static,
    ) -> Self
    where
        F: Future<Output = Result<T, Err>> + Send + 'static,
    {
        Effect::perform(future, move |result| match result {
            Ok(value) => on_ok(value),
            Err(err) => on_err(err),
        })
    }

    /// Forward every item of a stream as an event.
    pub fn stream(stream: impl Stream<Item = E> + Send + 'static) -> Self {
        Effect {
            inner: EffectInner::Stream(Box::pin(stream)),
        }
    }

    /// Forward a stream of results, mapping each item to an event.
    ///
    /// An `Err` item becomes an event too; the stream keeps being polled
    /// afterwards, so a feed that reports a transient error and then recovers
    /// keeps delivering.
    pub fn try_stream<S, T, Err>(
        stream: S,
        on_ok: impl Fn(T) -> E + Send + 'static,
        on_err: impl Fn(Err) -> E + Send + 'static,
    ) -> Self
    where
        S: Stream<Item = Result<T, Err>> + Send + 'static,
    {
        Effect::stream(stream.map(move |item| match item {
            Ok(value) => on_ok(value),
            Err(err) => on_err(err),
        }))
    }

    /// One-shot timer: fires once after `duration`.
    pub fn tick(duration: Duration, map: impl FnOnce(Instant) -> E + Send + 'static) -> Self {
        Effect::perform(
            async move {
                tokio::time::sleep(duration).await;
                Instant::now()
            },
            map,
        )
    }

    /// Repeating timer: fires every `interval`, the first tick immediately.
    ///
    /// Runs until the request that started it goes away.
    pub fn every(interval: Duration, map: impl Fn(Instant) -> E + Send + 'static) -> Self {
        // The interval is created on first poll so building the effect does
        // not need a running timer driver.
        let ticks = stream::once(async move {
            tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(interval))
        })
        .flatten();
        Effect::stream(ticks.map(move |tick| map(tick.into_std())))
    }

    /// Run several effects concurrently, interleaving their events.
    pub fn batch(effects: impl IntoIterator<Item = Effect<E>>) -> Self {
        let mut effects: Vec<_> = effects.into_iter().filter(|e| !e.is_none()).collect();
        match effects.len() {
            0 => Effect::none(),
            1 => effects.pop().unwrap_or_default(),
            _ => Effect {
                inner: EffectInner::Batch(effects),
            },
        }
    }

    /// Run effects one after another; each finishes before the next starts.
    pub fn sequence(effects: impl IntoIterator<Item = Effect<E>>) -> Self {
        let mut effects: Vec<_> = effects.into_iter().filter(|e| !e.is_none()).collect();
        match effects.len() {
            0 => Effect::none(),
            1 => effects.pop().unwrap_or_default(),
            _ => Effect {
                inner: EffectInner::Sequence(effects),
            },
        }
    }

    /// Transform the event type (for composing modules).
    pub fn map<F2: Send + 'static>(
        self,
        f: impl Fn(E) -> F2 + Send + Sync + 'static,
    ) -> Effect<F2> {
        self.map_with(Arc::new(f))
    }

    fn map_with<F2: Send + 'static>(self, f: Arc<dyn Fn(E) -> F2 + Send + Sync>) -> Effect<F2> {
        match self.inner {
            EffectInner::None => Effect::none(),
            EffectInner::Message(event) => Effect::message(f(event)),
            EffectInner::Future(fut) => Effect {
                inner: EffectInner::Future(Box::pin(async move { f(fut.await) })),
            },
            EffectInner::Stream(stream) => Effect {
                inner: EffectInner::Stream(Box::pin(stream.map(move |event| f(event)))),
            },
            EffectInner::Batch(effects) => Effect {
                inner: EffectInner::Batch(
                    effects.into_iter().map(|e| e.map_with(f.clone())).collect(),
                ),
            },
            EffectInner::Sequence(effects) => Effect {
                inner: EffectInner::Sequence(
                    effects.into_iter().map(|e| e.map_with(f.clone())).collect(),
                ),
            },
        }
    }

    /// Returns `true` if this effect does nothing.
    pub fn is_none(&self) -> bool {
        matches!(self.inner, EffectInner::None)
    }

    /// If this effect is a single immediate event, return it.
    pub fn into_message(self) -> Option<E> {
        match self.inner {
            EffectInner::Message(event) => Some(event),
            _ => None,
        }
    }

    /// Flatten the effect into the single event stream the runtime drives.
    pub fn into_stream(self) -> BoxStream<'static, E> {
        match self.inner {
            EffectInner::None => Box::pin(stream::empty()),
            EffectInner::Message(event) => Box::pin(stream::once(async move { event })),
            EffectInner::Future(fut) => Box::pin(stream::once(fut)),
            EffectInner::Stream(stream) => stream,
            EffectInner::Batch(effects) => {
                Box::pin(stream::select_all(effects.into_iter().map(Effect::into_stream)))
            }
            EffectInner::Sequence(effects) => {
                Box::pin(stream::iter(effects).flat_map(Effect::into_stream))
            }
        }
    }
}

impl<E: Send + 'static> Default for Effect<E> {
    fn default() -> Self {
        Effect::none()
    }
}

impl<E: Send + 'static> std::fmt::Debug for Effect<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            EffectInner::None => "None",
            EffectInner::Message(_) => "Message",
            EffectInner::Future(_) => "Future",
            EffectInner::Stream(_) => "Stream",
            EffectInner::Batch(_) => "Batch",
            EffectInner::Sequence(_) => "Sequence",
        };
        f.debug_tuple("Effect").field(&kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_none_is_none() {
        let effect: Effect<()> = Effect::none();
        assert!(effect.is_none());
    }

    #[test]
    fn effect_message_round_trips() {
        let effect: Effect<i32> = Effect::message(42);
        assert_eq!(effect.into_message(), Some(42));
    }

    #[test]
    fn effect_batch_empty_returns_none() {
        let effect: Effect<()> = Effect::batch(vec![]);
        assert!(effect.is_none());
    }

    #[test]
    fn effect_batch_drops_none_members() {
        let effect: Effect<i32> = Effect::batch(vec![Effect::none(), Effect::message(1)]);
        assert_eq!(effect.into_message(), Some(1));
    }

    #[test]
    fn effect_sequence_single_unwraps() {
        let effect: Effect<i32> = Effect::sequence(vec![Effect::message(7)]);
        assert_eq!(effect.into_message(), Some(7));
    }

    #[test]
    fn effect_map_message() {
        let effect: Effect<i32> = Effect::message(42);
        let mapped: Effect<String> = effect.map(|n| n.to_string());
        assert_eq!(mapped.into_message().as_deref(), Some("42"));
    }

    #[test]
    fn effect_map_none_stays_none() {
        let effect: Effect<i32> = Effect::none();
        assert!(effect.map(|n| n + 1).is_none());
    }

    #[tokio::test]
    async fn sequence_preserves_order() {
        let effect = Effect::sequence(vec![
            Effect::perform(async { 1 }, |n| n),
            Effect::message(2),
            Effect::stream(futures::stream::iter(vec![3, 4])),
        ]);
        let events: Vec<i32> = effect.into_stream().collect().await;
        assert_eq!(events, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn batch_yields_every_member() {
        let effect = Effect::batch(vec![Effect::message(1), Effect::message(2)]);
        let mut events: Vec<i32> = effect.into_stream().collect().await;
        events.sort();
        assert_eq!(events, vec![1, 2]);
    }

    #[tokio::test]
    async fn try_perform_maps_failure_to_event() {
        let effect: Effect<Result<u8, String>> = Effect::try_perform(
            async { Err::<u8, _>("offline") },
            Ok,
            |e: &str| Err(e.to_string()),
        );
        let events: Vec<_> = effect.into_stream().collect().await;
        assert_eq!(events, vec![Err("offline".to_string())]);
    }

    #[tokio::test]
    async fn try_stream_keeps_going_after_error() {
        let source = futures::stream::iter(vec![Ok(1), Err("blip"), Ok(2)]);
        let effect: Effect<i32> = Effect::try_stream(source, |n| n, |_| -1);
        let events: Vec<_> = effect.into_stream().collect().await;
        assert_eq!(events, vec![1, -1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_fires_after_duration() {
        let start = tokio::time::Instant::now();
        let effect = Effect::tick(Duration::from_secs(5), |_| ());
        let events: Vec<()> = effect.into_stream().collect().await;
        assert_eq!(events.len(), 1);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn every_repeats() {
        let effect = Effect::every(Duration::from_secs(1), |_| ());
        let events: Vec<()> = effect.into_stream().take(3).collect().await;
        assert_eq!(events.len(), 3);
    }
}
