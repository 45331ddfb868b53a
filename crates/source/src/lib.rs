pub mod error;
pub mod memory;
pub mod stream;

pub use error::{SourceError, SourceResult};
pub use memory::InMemorySource;
pub use stream::{
    BoxFuture, LiveChannel, LiveDelivery, LiveEventStream, LiveStreamHandle, SourceWorker,
    make_live_stream,
};

use parley_model::{Cursor, Message, Page};

/// Abstract conversation data source, realized by a transport collaborator.
///
/// The reconciliation core only ever sees already-resolved data through this
/// seam: resolved pages, resolved live deliveries, resolved send results.
pub trait MessageSource: Send + Sync {
    /// Fetches the page of up to `first` messages starting strictly after
    /// `after`, or the earliest page when no cursor is given.
    fn fetch_page(&self, first: u32, after: Option<Cursor>) -> BoxFuture<'_, SourceResult<Page>>;

    /// Opens the message-added push subscription.
    fn subscribe_added(&self) -> SourceResult<LiveStreamHandle>;

    /// Opens the message-updated push subscription.
    fn subscribe_updated(&self) -> SourceResult<LiveStreamHandle>;

    /// Creates a message on the server and returns the created record.
    ///
    /// Consumers that also hold the added subscription should merge the echo
    /// from that channel rather than this return value.
    fn send_message(&self, text: String) -> BoxFuture<'_, SourceResult<Message>>;
}
