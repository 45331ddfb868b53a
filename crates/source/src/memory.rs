use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

use parley_model::{Cursor, Message, MessageStatus, Page, PageInfo, Sender};

use super::MessageSource;
use super::error::{DeliverySnafu, PageFetchSnafu, SendMessageSnafu, SourceResult, SubscribeSnafu};
use super::stream::{
    BoxFuture, LiveChannel, LiveDelivery, LiveStreamHandle, make_live_stream,
};

const CURSOR_PREFIX: &str = "offset:";

#[derive(Default)]
struct LiveTaps {
    added: Vec<mpsc::UnboundedSender<LiveDelivery>>,
    updated: Vec<mpsc::UnboundedSender<LiveDelivery>>,
}

impl LiveTaps {
    fn for_channel(&mut self, channel: LiveChannel) -> &mut Vec<mpsc::UnboundedSender<LiveDelivery>> {
        match channel {
            LiveChannel::Added => &mut self.added,
            LiveChannel::Updated => &mut self.updated,
        }
    }
}

/// Channel-backed data source serving a seeded history list.
///
/// Cursors encode list offsets but stay opaque to consumers. Live deliveries
/// are pushed explicitly through the `publish_*` methods, which makes the
/// server-side anomalies the core must tolerate (redelivered adds, updates
/// for unloaded messages, empty notifications) trivial to reproduce.
pub struct InMemorySource {
    history: Mutex<Vec<Message>>,
    taps: Mutex<LiveTaps>,
    next_id: AtomicU64,
    fail_next_fetch: AtomicBool,
    fail_next_send: AtomicBool,
    fail_subscriptions: AtomicBool,
}

impl InMemorySource {
    pub fn new(seed: Vec<Message>) -> Self {
        let next_id = seed.len() as u64 + 1;
        Self {
            history: Mutex::new(seed),
            taps: Mutex::new(LiveTaps::default()),
            next_id: AtomicU64::new(next_id),
            fail_next_fetch: AtomicBool::new(false),
            fail_next_send: AtomicBool::new(false),
            fail_subscriptions: AtomicBool::new(false),
        }
    }

    /// Seeds `count` read messages with alternating senders.
    pub fn seeded(count: usize) -> Self {
        let seed = (0..count)
            .map(|index| {
                let sender = if index % 2 == 0 {
                    Sender::Customer
                } else {
                    Sender::Admin
                };
                Message::new(
                    format!("msg-{}", index + 1),
                    format!("message number {}", index + 1),
                    sender,
                    MessageStatus::Read,
                    current_unix_timestamp_seconds(),
                )
            })
            .collect::<Vec<_>>();

        Self::new(seed)
    }

    pub fn history_len(&self) -> usize {
        lock_ignoring_poison(&self.history).len()
    }

    /// Number of live subscribers still holding an open stream. Closed
    /// receivers are only pruned by the next publish on that channel.
    pub fn live_tap_count(&self, channel: LiveChannel) -> usize {
        lock_ignoring_poison(&self.taps).for_channel(channel).len()
    }

    /// Pushes a payload on the added channel, as the server does after any
    /// party creates a message.
    pub fn publish_added(&self, message: &Message) {
        self.publish(LiveChannel::Added, Ok(Some(message.clone())));
    }

    /// Pushes a payload on the updated channel. The message does not have to
    /// exist in the served history; the server is observed to push updates
    /// for messages a client never loaded.
    pub fn publish_updated(&self, message: &Message) {
        self.publish(LiveChannel::Updated, Ok(Some(message.clone())));
    }

    /// Pushes an empty notification carrying no payload.
    pub fn publish_empty(&self, channel: LiveChannel) {
        self.publish(channel, Ok(None));
    }

    /// Pushes a per-delivery transport failure.
    pub fn publish_failure(&self, channel: LiveChannel, details: impl Into<String>) {
        self.publish(
            channel,
            DeliverySnafu {
                stage: "memory-publish-failure",
                channel,
                details: details.into(),
            }
            .fail(),
        );
    }

    /// Makes the next `fetch_page` call fail once.
    pub fn fail_next_fetch(&self) {
        self.fail_next_fetch.store(true, Ordering::SeqCst);
    }

    /// Makes the next `send_message` call fail once.
    pub fn fail_next_send(&self) {
        self.fail_next_send.store(true, Ordering::SeqCst);
    }

    /// Makes every `subscribe_*` call fail until cleared.
    pub fn fail_subscriptions(&self, failing: bool) {
        self.fail_subscriptions.store(failing, Ordering::SeqCst);
    }

    fn publish(&self, channel: LiveChannel, delivery: LiveDelivery) {
        let mut taps = lock_ignoring_poison(&self.taps);
        // Closed receivers are pruned lazily on the next publish.
        taps.for_channel(channel)
            .retain(|tap| tap.send(delivery.clone()).is_ok());
    }

    fn subscribe(&self, channel: LiveChannel) -> SourceResult<LiveStreamHandle> {
        if self.fail_subscriptions.load(Ordering::SeqCst) {
            return SubscribeSnafu {
                stage: "memory-subscribe",
                channel,
                details: "injected subscription failure".to_string(),
            }
            .fail();
        }

        let (tap, stream) = make_live_stream(channel);
        lock_ignoring_poison(&self.taps)
            .for_channel(channel)
            .push(tap);

        // Deliveries are pushed synchronously by whoever drives this source,
        // so the worker has nothing left to do.
        Ok(LiveStreamHandle {
            stream,
            worker: Box::pin(async {}),
        })
    }

    fn slice_page(&self, first: u32, after: Option<Cursor>) -> SourceResult<Page> {
        let history = lock_ignoring_poison(&self.history);
        let offset = match after {
            Some(cursor) => decode_cursor(&cursor)? + 1,
            None => 0,
        };

        let start = offset.min(history.len());
        let end = start.saturating_add(first as usize).min(history.len());
        let messages = history[start..end].to_vec();

        let page_info = if messages.is_empty() {
            PageInfo {
                has_next_page: false,
                has_previous_page: start > 0,
                start_cursor: None,
                end_cursor: None,
            }
        } else {
            PageInfo {
                has_next_page: end < history.len(),
                has_previous_page: start > 0,
                start_cursor: Some(encode_cursor(start)),
                end_cursor: Some(encode_cursor(end - 1)),
            }
        };

        Ok(Page::new(messages, page_info))
    }
}

impl MessageSource for InMemorySource {
    fn fetch_page(&self, first: u32, after: Option<Cursor>) -> BoxFuture<'_, SourceResult<Page>> {
        Box::pin(async move {
            if self.fail_next_fetch.swap(false, Ordering::SeqCst) {
                return PageFetchSnafu {
                    stage: "memory-fetch-page",
                    details: "injected page fetch failure".to_string(),
                }
                .fail();
            }

            self.slice_page(first, after)
        })
    }

    fn subscribe_added(&self) -> SourceResult<LiveStreamHandle> {
        self.subscribe(LiveChannel::Added)
    }

    fn subscribe_updated(&self) -> SourceResult<LiveStreamHandle> {
        self.subscribe(LiveChannel::Updated)
    }

    fn send_message(&self, text: String) -> BoxFuture<'_, SourceResult<Message>> {
        Box::pin(async move {
            if self.fail_next_send.swap(false, Ordering::SeqCst) {
                return SendMessageSnafu {
                    stage: "memory-send-message",
                    details: "injected send failure".to_string(),
                }
                .fail();
            }

            let id = format!("msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            let message = Message::new(
                id,
                text,
                Sender::Customer,
                MessageStatus::Sent,
                current_unix_timestamp_seconds(),
            );

            lock_ignoring_poison(&self.history).push(message.clone());
            // The created message reaches clients through the added channel,
            // exactly like the echoed subscription event the real server sends.
            self.publish_added(&message);
            Ok(message)
        })
    }
}

fn encode_cursor(offset: usize) -> Cursor {
    Cursor::new(format!("{CURSOR_PREFIX}{offset}"))
}

fn decode_cursor(cursor: &Cursor) -> SourceResult<usize> {
    let raw = cursor
        .as_str()
        .strip_prefix(CURSOR_PREFIX)
        .and_then(|digits| digits.parse::<usize>().ok());

    match raw {
        Some(offset) => Ok(offset),
        None => PageFetchSnafu {
            stage: "memory-decode-cursor",
            details: format!("unrecognized cursor '{cursor}'"),
        }
        .fail(),
    }
}

fn current_unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;

    #[tokio::test]
    async fn first_page_serves_oldest_slice_with_continuation_cursor() {
        let source = InMemorySource::seeded(25);

        let page = source.fetch_page(10, None).await.unwrap();

        assert_eq!(page.len(), 10);
        assert_eq!(page.messages[0].id.as_str(), "msg-1");
        assert!(page.page_info.has_next_page);
        assert!(!page.page_info.has_previous_page);
        assert!(page.page_info.end_cursor.is_some());
    }

    #[tokio::test]
    async fn cursor_chain_walks_history_without_gaps_or_overlap() {
        let source = InMemorySource::seeded(25);
        let mut seen = Vec::new();
        let mut after = None;

        loop {
            let page = source.fetch_page(10, after.clone()).await.unwrap();
            seen.extend(page.messages.iter().map(|message| message.id.clone()));
            if !page.page_info.has_next_page {
                break;
            }
            after = page.page_info.end_cursor.clone();
        }

        let expected = (1..=25).map(|n| format!("msg-{n}")).collect::<Vec<_>>();
        assert_eq!(
            seen.iter().map(|id| id.as_str().to_string()).collect::<Vec<_>>(),
            expected
        );
    }

    #[tokio::test]
    async fn fetch_past_the_end_yields_an_exhausted_page() {
        let source = InMemorySource::seeded(3);
        let first = source.fetch_page(10, None).await.unwrap();
        assert!(!first.page_info.has_next_page);

        let past_end = source
            .fetch_page(10, first.page_info.end_cursor.clone())
            .await
            .unwrap();
        assert!(past_end.is_empty());
        assert!(!past_end.page_info.has_next_page);
    }

    #[tokio::test]
    async fn malformed_cursor_is_a_page_fetch_error() {
        let source = InMemorySource::seeded(3);

        let error = source
            .fetch_page(10, Some(Cursor::new("garbage")))
            .await
            .unwrap_err();

        assert!(matches!(error, SourceError::PageFetch { .. }));
    }

    #[tokio::test]
    async fn send_appends_to_history_and_echoes_on_added_channel() {
        let source = InMemorySource::seeded(2);
        let mut handle = source.subscribe_added().unwrap();

        let sent = source.send_message("hello".to_string()).await.unwrap();

        assert_eq!(source.history_len(), 3);
        let delivery = handle.stream.try_recv().expect("echo delivery");
        assert_eq!(delivery.unwrap(), Some(sent));
    }

    #[tokio::test]
    async fn injected_failures_fire_once_then_recover() {
        let source = InMemorySource::seeded(2);

        source.fail_next_fetch();
        assert!(source.fetch_page(10, None).await.is_err());
        assert!(source.fetch_page(10, None).await.is_ok());

        source.fail_next_send();
        assert!(source.send_message("x".to_string()).await.is_err());
        assert!(source.send_message("x".to_string()).await.is_ok());
    }
}
