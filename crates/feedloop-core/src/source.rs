use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use std::borrow::Cow;
use std::time::{Duration, Instant};

/// An external stream of events merged into a running system.
///
/// Sources carry everything that does not come from a feedback loop: user
/// gestures, lifecycle signals, push notifications. Each source is driven on
/// its own task; the order of its events is preserved, but nothing is promised
/// about how events of different sources interleave.
///
/// A source that ends is simply forgotten. All sources still running are
/// aborted when the system shuts down.
pub struct EventSource<E: Send + 'static> {
    pub(crate) name: Cow<'static, str>,
    pub(crate) stream: BoxStream<'static, E>,
}

impl<E: Send + 'static> EventSource<E> {
    /// Create a source from any stream.
    pub fn from_stream(
        name: impl Into<Cow<'static, str>>,
        stream: impl Stream<Item = E> + Send + 'static,
    ) -> Self {
        EventSource {
            name: name.into(),
            stream: Box::pin(stream),
        }
    }

    /// A source that yields the given events once, in order.
    pub fn from_iter(
        name: impl Into<Cow<'static, str>>,
        events: impl IntoIterator<Item = E, IntoIter: Send + 'static>,
    ) -> Self {
        EventSource::from_stream(name, stream::iter(events))
    }

    /// A repeating timer source, firing every `interval`.
    pub fn every(
        name: impl Into<Cow<'static, str>>,
        interval: Duration,
        map: impl Fn(Instant) -> E + Send + 'static,
    ) -> Self {
        let ticks = stream::once(async move {
            tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(interval))
        })
        .flatten();
        EventSource::from_stream(name, ticks.map(move |tick| map(tick.into_std())))
    }

    /// The source's name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transform the event type (for composing modules).
    pub fn map<F2: Send + 'static>(self, f: impl Fn(E) -> F2 + Send + 'static) -> EventSource<F2> {
        EventSource {
            name: self.name,
            stream: Box::pin(self.stream.map(f)),
        }
    }

    /// Drop events for which `f` returns `None`, transforming the rest.
    pub fn filter_map<F2: Send + 'static>(
        self,
        f: impl Fn(E) -> Option<F2> + Send + 'static,
    ) -> EventSource<F2> {
        EventSource {
            name: self.name,
            stream: Box::pin(self.stream.filter_map(move |event| {
                let mapped = f(event);
                async move { mapped }
            })),
        }
    }
}

impl<E: Send + 'static> std::fmt::Debug for EventSource<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
