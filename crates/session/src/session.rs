use std::sync::Arc;

use arc_swap::ArcSwap;
use futures::StreamExt;
use tokio::sync::mpsc;

use parley_model::Message;
use parley_source::{LiveChannel, LiveDelivery, LiveEventStream, MessageSource, SourceError};

use crate::error::SessionError;
use crate::pager::{CursorPager, PageFetchOutcome};
use crate::router::EventRouter;
use crate::settings::SessionSettings;

/// Immutable read state published to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub pending_error: Option<String>,
}

#[derive(Debug)]
enum SessionCommand {
    LoadMore,
    Send(String),
    ClearError,
}

/// Consumer-facing handle for one conversation session.
///
/// Reads go through the published snapshot; writes are commands delivered to
/// the single-writer driver task. Dropping every handle stops the driver.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshot: Arc<ArcSwap<SessionSnapshot>>,
}

impl SessionHandle {
    /// Read-only ordered view of the merged messages plus the pending error.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshot.load_full()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.snapshot().messages.clone()
    }

    pub fn pending_error(&self) -> Option<String> {
        self.snapshot().pending_error.clone()
    }

    /// To be called when the view reaches the oldest loaded message.
    pub fn trigger_load_more(&self) {
        let _ = self.commands.send(SessionCommand::LoadMore);
    }

    /// Sends a message through the data source. The created message reaches
    /// the store via the live add echo, never via the send response.
    pub fn send(&self, text: impl Into<String>) {
        let _ = self.commands.send(SessionCommand::Send(text.into()));
    }

    pub fn clear_error(&self) {
        let _ = self.commands.send(SessionCommand::ClearError);
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

pub struct ChatSession;

impl ChatSession {
    /// Spawns the driver task for one conversation view and returns its
    /// handle. The driver owns all mutable session state; there is no shared
    /// mutable singleton anywhere.
    pub fn spawn(source: Arc<dyn MessageSource>, settings: SessionSettings) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let snapshot = Arc::new(ArcSwap::from_pointee(SessionSnapshot::default()));

        let driver = SessionDriver::new(source, settings, command_rx, Arc::clone(&snapshot));
        tokio::spawn(driver.run());

        SessionHandle {
            commands: command_tx,
            snapshot,
        }
    }
}

struct SessionDriver {
    source: Arc<dyn MessageSource>,
    router: EventRouter,
    pager: CursorPager,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    snapshot: Arc<ArcSwap<SessionSnapshot>>,
    page_outcome_tx: mpsc::UnboundedSender<PageFetchOutcome>,
    page_outcomes: mpsc::UnboundedReceiver<PageFetchOutcome>,
    send_failure_tx: mpsc::UnboundedSender<SourceError>,
    send_failures: mpsc::UnboundedReceiver<SourceError>,
}

impl SessionDriver {
    fn new(
        source: Arc<dyn MessageSource>,
        settings: SessionSettings,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        snapshot: Arc<ArcSwap<SessionSnapshot>>,
    ) -> Self {
        let (page_outcome_tx, page_outcomes) = mpsc::unbounded_channel();
        let (send_failure_tx, send_failures) = mpsc::unbounded_channel();
        let pager = CursorPager::new(Arc::clone(&source), settings.page_size);

        Self {
            source,
            router: EventRouter::new(),
            pager,
            commands,
            snapshot,
            page_outcome_tx,
            page_outcomes,
            send_failure_tx,
            send_failures,
        }
    }

    async fn run(mut self) {
        let mut added = self.open_live_channel(LiveChannel::Added);
        let mut updated = self.open_live_channel(LiveChannel::Updated);
        self.pager.request_first_page(&self.page_outcome_tx);
        self.publish_snapshot();

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        // Every handle is gone; in-flight fetches finish on
                        // their own and get discarded with the channels.
                        tracing::debug!("session handles dropped, stopping driver");
                        break;
                    };
                    self.handle_command(command);
                }
                delivery = next_delivery(&mut added), if added.is_some() => {
                    let state = self.router.handle_live_delivery(LiveChannel::Added, delivery);
                    if !state.is_active() {
                        added = None;
                    }
                    self.publish_snapshot();
                }
                delivery = next_delivery(&mut updated), if updated.is_some() => {
                    let state = self.router.handle_live_delivery(LiveChannel::Updated, delivery);
                    if !state.is_active() {
                        updated = None;
                    }
                    self.publish_snapshot();
                }
                outcome = self.page_outcomes.recv() => {
                    if let Some(outcome) = outcome {
                        self.handle_page_outcome(outcome);
                        self.publish_snapshot();
                    }
                }
                failure = self.send_failures.recv() => {
                    if let Some(error) = failure {
                        self.router.report_failure(SessionError::Send {
                            stage: "send-message",
                            source: error,
                        });
                        self.publish_snapshot();
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::LoadMore => {
                let requested = self.pager.request_next_page(&self.page_outcome_tx);
                if !requested {
                    tracing::debug!("load-more trigger ignored, nothing to fetch");
                }
            }
            SessionCommand::Send(text) => self.spawn_send(text),
            SessionCommand::ClearError => {
                self.router.clear_error();
                self.publish_snapshot();
            }
        }
    }

    fn handle_page_outcome(&mut self, outcome: PageFetchOutcome) {
        match outcome.result {
            Ok(page) => {
                self.pager.complete(&page);
                self.router.apply_page(outcome.kind, page);
            }
            Err(error) => {
                tracing::warn!(kind = ?outcome.kind, error = %error, "page fetch failed");
                self.pager.fail();
                self.router.report_failure(SessionError::PageFetch {
                    stage: "page-fetch",
                    source: error,
                });
            }
        }
    }

    fn spawn_send(&self, text: String) {
        let source = Arc::clone(&self.source);
        let failures = self.send_failure_tx.clone();

        tokio::spawn(async move {
            match source.send_message(text).await {
                Ok(message) => {
                    // Deliberately not merged: the echo on the added channel
                    // inserts the message, so merging the response here would
                    // race it into a duplicate row.
                    tracing::debug!(message_id = %message.id, "send acknowledged");
                }
                Err(error) => {
                    let _ = failures.send(error);
                }
            }
        });
    }

    fn open_live_channel(&mut self, channel: LiveChannel) -> Option<LiveEventStream> {
        let subscription = match channel {
            LiveChannel::Added => self.source.subscribe_added(),
            LiveChannel::Updated => self.source.subscribe_updated(),
        };

        match subscription {
            Ok(handle) => {
                tokio::spawn(handle.worker);
                self.router.mark_subscribed(channel);
                Some(handle.stream)
            }
            Err(error) => {
                tracing::warn!(channel = %channel, error = %error, "subscription failed to open");
                self.router.report_failure(SessionError::Subscription {
                    stage: "open-subscription",
                    channel,
                    source: error,
                });
                self.router.mark_channel_failed(channel);
                None
            }
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot.store(Arc::new(SessionSnapshot {
            messages: self.router.store().snapshot(),
            pending_error: self.router.pending_error(),
        }));
    }
}

async fn next_delivery(stream: &mut Option<LiveEventStream>) -> Option<LiveDelivery> {
    match stream {
        Some(stream) => stream.next().await,
        // Branches on a missing stream are disabled by the select guard;
        // pending here keeps the future type total.
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use parley_model::{MessageStatus, Sender};
    use parley_source::InMemorySource;

    fn settings(page_size: u32) -> SessionSettings {
        SessionSettings { page_size }
    }

    async fn wait_for<F>(handle: &SessionHandle, predicate: F) -> Arc<SessionSnapshot>
    where
        F: Fn(&SessionSnapshot) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let snapshot = handle.snapshot();
                if predicate(&snapshot) {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("snapshot condition not reached in time")
    }

    fn spawn_session(source: &Arc<InMemorySource>, page_size: u32) -> SessionHandle {
        let dyn_source: Arc<dyn MessageSource> = Arc::clone(source) as Arc<dyn MessageSource>;
        ChatSession::spawn(dyn_source, settings(page_size))
    }

    fn live_message(id: &str, text: &str, status: MessageStatus) -> Message {
        Message::new(id, text, Sender::Admin, status, 0)
    }

    #[tokio::test]
    async fn initial_load_populates_the_first_page() {
        let source = Arc::new(InMemorySource::seeded(25));
        let handle = spawn_session(&source, 10);

        let snapshot = wait_for(&handle, |snapshot| snapshot.messages.len() == 10).await;

        assert_eq!(snapshot.messages[0].id.as_str(), "msg-1");
        assert_eq!(snapshot.messages[9].id.as_str(), "msg-10");
        assert!(snapshot.pending_error.is_none());
    }

    #[tokio::test]
    async fn scroll_triggers_walk_history_to_exhaustion() {
        let source = Arc::new(InMemorySource::seeded(25));
        let handle = spawn_session(&source, 10);
        wait_for(&handle, |snapshot| snapshot.messages.len() == 10).await;

        handle.trigger_load_more();
        wait_for(&handle, |snapshot| snapshot.messages.len() == 20).await;

        handle.trigger_load_more();
        let snapshot = wait_for(&handle, |snapshot| snapshot.messages.len() == 25).await;
        let expected = (1..=25).map(|n| format!("msg-{n}")).collect::<Vec<_>>();
        let actual = snapshot
            .messages
            .iter()
            .map(|message| message.id.to_string())
            .collect::<Vec<_>>();
        assert_eq!(actual, expected);

        // History is exhausted; further triggers fetch nothing.
        handle.trigger_load_more();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(handle.messages().len(), 25);
    }

    #[tokio::test]
    async fn sent_message_arrives_once_via_the_live_echo() {
        let source = Arc::new(InMemorySource::seeded(3));
        let handle = spawn_session(&source, 10);
        wait_for(&handle, |snapshot| snapshot.messages.len() == 3).await;

        handle.send("hello there");

        let snapshot = wait_for(&handle, |snapshot| snapshot.messages.len() == 4).await;
        let tail = snapshot.messages.last().expect("tail message");
        assert_eq!(tail.text, "hello there");

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(handle.messages().len(), 4, "echo must insert exactly once");
    }

    #[tokio::test]
    async fn redelivered_add_event_is_merged_once() {
        let source = Arc::new(InMemorySource::seeded(1));
        let handle = spawn_session(&source, 10);
        wait_for(&handle, |snapshot| snapshot.messages.len() == 1).await;

        let added = live_message("live-2", "yo", MessageStatus::Sent);
        source.publish_added(&added);
        source.publish_added(&added);

        wait_for(&handle, |snapshot| snapshot.messages.len() == 2).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(handle.messages().len(), 2);
    }

    #[tokio::test]
    async fn live_update_changes_status_in_place() {
        let source = Arc::new(InMemorySource::seeded(5));
        let handle = spawn_session(&source, 10);
        let before = wait_for(&handle, |snapshot| snapshot.messages.len() == 5).await;
        let target = before.messages[2].clone();
        assert_eq!(target.status, MessageStatus::Read);

        source.publish_updated(&target.clone().with_status(MessageStatus::Sent));

        let after = wait_for(&handle, |snapshot| {
            snapshot.messages[2].status == MessageStatus::Sent
        })
        .await;
        assert_eq!(after.messages[2].id, target.id);
        assert_eq!(after.messages.len(), 5);
    }

    #[tokio::test]
    async fn update_for_an_unloaded_message_is_dropped_silently() {
        let source = Arc::new(InMemorySource::seeded(2));
        let handle = spawn_session(&source, 10);
        wait_for(&handle, |snapshot| snapshot.messages.len() == 2).await;

        source.publish_updated(&live_message("msg-999", "ghost", MessageStatus::Sent));
        // A sentinel add proves the dropped update was processed before we
        // assert on it.
        source.publish_added(&live_message("sentinel", "after", MessageStatus::Sent));

        let snapshot = wait_for(&handle, |snapshot| snapshot.messages.len() == 3).await;
        assert!(snapshot.pending_error.is_none());
        assert!(
            !snapshot
                .messages
                .iter()
                .any(|message| message.id.as_str() == "msg-999")
        );
    }

    #[tokio::test]
    async fn empty_delivery_is_discarded_without_side_effects() {
        let source = Arc::new(InMemorySource::seeded(2));
        let handle = spawn_session(&source, 10);
        wait_for(&handle, |snapshot| snapshot.messages.len() == 2).await;

        source.publish_empty(LiveChannel::Added);
        source.publish_empty(LiveChannel::Updated);
        source.publish_added(&live_message("sentinel", "after", MessageStatus::Sent));

        let snapshot = wait_for(&handle, |snapshot| snapshot.messages.len() == 3).await;
        assert!(snapshot.pending_error.is_none());
    }

    #[tokio::test]
    async fn page_failure_surfaces_but_live_channels_keep_flowing() {
        let source = Arc::new(InMemorySource::seeded(25));
        let handle = spawn_session(&source, 10);
        wait_for(&handle, |snapshot| snapshot.messages.len() == 10).await;

        source.fail_next_fetch();
        handle.trigger_load_more();
        wait_for(&handle, |snapshot| snapshot.pending_error.is_some()).await;

        // Both live channels survive the pagination failure.
        source.publish_added(&live_message("live-x", "still here", MessageStatus::Sent));
        wait_for(&handle, |snapshot| snapshot.messages.len() == 11).await;

        // The error stays until explicitly cleared, then a retry works.
        assert!(handle.pending_error().is_some());
        handle.clear_error();
        wait_for(&handle, |snapshot| snapshot.pending_error.is_none()).await;

        handle.trigger_load_more();
        wait_for(&handle, |snapshot| snapshot.messages.len() == 21).await;
    }

    #[tokio::test]
    async fn send_failure_reports_and_a_retry_goes_through() {
        let source = Arc::new(InMemorySource::seeded(1));
        let handle = spawn_session(&source, 10);
        wait_for(&handle, |snapshot| snapshot.messages.len() == 1).await;

        source.fail_next_send();
        handle.send("first attempt");
        let snapshot = wait_for(&handle, |snapshot| snapshot.pending_error.is_some()).await;
        assert!(
            snapshot
                .pending_error
                .as_deref()
                .is_some_and(|error| error.contains("send"))
        );
        assert_eq!(snapshot.messages.len(), 1);

        handle.send("second attempt");
        let snapshot = wait_for(&handle, |snapshot| snapshot.messages.len() == 2).await;
        assert_eq!(snapshot.messages[1].text, "second attempt");
    }

    #[tokio::test]
    async fn subscription_failure_reports_without_stopping_pagination() {
        let source = Arc::new(InMemorySource::seeded(25));
        source.fail_subscriptions(true);
        let handle = spawn_session(&source, 10);

        let snapshot = wait_for(&handle, |snapshot| {
            snapshot.messages.len() == 10 && snapshot.pending_error.is_some()
        })
        .await;
        assert!(
            snapshot
                .pending_error
                .as_deref()
                .is_some_and(|error| error.contains("subscription"))
        );

        handle.trigger_load_more();
        wait_for(&handle, |snapshot| snapshot.messages.len() == 20).await;
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_driver() {
        let source = Arc::new(InMemorySource::seeded(2));
        let handle = spawn_session(&source, 10);
        wait_for(&handle, |snapshot| snapshot.messages.len() == 2).await;
        assert_eq!(source.live_tap_count(LiveChannel::Added), 1);

        drop(handle);

        // Once the driver stops it drops its stream receivers; the next
        // publish on the source prunes the dead tap.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                source.publish_added(&live_message("probe", "x", MessageStatus::Sent));
                if source.live_tap_count(LiveChannel::Added) == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("driver did not stop after handles were dropped");
    }
}
