//! Heartbeat multiplexing
//!
//! Long model calls produce no output for minutes. Consumers of the progress
//! stream still need proof of life, so while an inner future or stream is
//! pending we yield [`Heartbeat::Ping`] every `interval`.

use std::future::Future;
use std::time::Duration;

use async_stream::stream;
use futures::stream::{self, Stream, StreamExt};

/// Either a real item from the inner source or a keep-alive tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heartbeat<T> {
    Ping,
    Item(T),
}

impl<T> Heartbeat<T> {
    pub fn is_ping(&self) -> bool {
        matches!(self, Self::Ping)
    }

    pub fn into_item(self) -> Option<T> {
        match self {
            Self::Item(item) => Some(item),
            Self::Ping => None,
        }
    }
}

/// Interleave pings into `inner` whenever it stays silent for `interval`
///
/// The ping timer restarts after every emission, so a busy inner stream never
/// sees pings. The output ends when `inner` ends.
pub fn heartbeat_stream<S>(inner: S, interval: Duration) -> impl Stream<Item = Heartbeat<S::Item>>
where
    S: Stream,
{
    stream! {
        let mut inner = std::pin::pin!(inner);
        loop {
            let tick = tokio::time::sleep(interval);
            let beat = tokio::select! {
                biased;
                next = inner.next() => next.map(Heartbeat::Item),
                _ = tick => Some(Heartbeat::Ping),
            };
            match beat {
                Some(beat) => yield beat,
                None => break,
            }
        }
    }
}

/// Await `future`, pinging every `interval` until it resolves
///
/// Yields exactly one [`Heartbeat::Item`] as the final element.
pub fn with_heartbeat<F>(future: F, interval: Duration) -> impl Stream<Item = Heartbeat<F::Output>>
where
    F: Future,
{
    heartbeat_stream(stream::once(future), interval)
}
