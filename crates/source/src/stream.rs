use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use parley_model::Message;

use super::error::SourceResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type SourceWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// One delivery on a live channel.
///
/// `Ok(Some)` carries a payload, `Ok(None)` is an empty server notification
/// that must be discarded downstream, and `Err` is a per-delivery transport
/// failure that does not terminate the stream by itself.
pub type LiveDelivery = SourceResult<Option<Message>>;

/// The two semantically distinct push subscriptions a source exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiveChannel {
    Added,
    Updated,
}

impl LiveChannel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Added => "message-added",
            Self::Updated => "message-updated",
        }
    }
}

impl fmt::Display for LiveChannel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// Receiving side of one live subscription.
pub struct LiveEventStream {
    channel: LiveChannel,
    deliveries: mpsc::UnboundedReceiver<LiveDelivery>,
}

impl LiveEventStream {
    pub(crate) fn new(
        channel: LiveChannel,
        deliveries: mpsc::UnboundedReceiver<LiveDelivery>,
    ) -> Self {
        Self {
            channel,
            deliveries,
        }
    }

    pub fn channel(&self) -> LiveChannel {
        self.channel
    }

    /// Waits for the next delivery; `None` means the source closed the
    /// channel.
    pub async fn recv(&mut self) -> Option<LiveDelivery> {
        self.deliveries.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LiveDelivery> {
        self.deliveries.try_recv().ok()
    }
}

impl Stream for LiveEventStream {
    type Item = LiveDelivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.deliveries.poll_recv(cx)
    }
}

/// A live subscription plus the worker future that feeds it.
///
/// The caller owns scheduling: spawn the worker, then consume the stream.
pub struct LiveStreamHandle {
    pub stream: LiveEventStream,
    pub worker: SourceWorker,
}

/// Builds the channel pair backing one live subscription.
pub fn make_live_stream(
    channel: LiveChannel,
) -> (mpsc::UnboundedSender<LiveDelivery>, LiveEventStream) {
    let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
    (delivery_tx, LiveEventStream::new(channel, delivery_rx))
}
