use parley_model::{Message, Page};
use parley_source::{LiveChannel, LiveDelivery};

use crate::error::SessionError;
use crate::error_surface::ErrorSlot;
use crate::pager::PageRequestKind;
use crate::store::{MergeOutcome, MessageStore};

/// Lifecycle of one live subscription as seen by the router.
///
/// `Failed` is terminal and reached from any state on transport error or
/// stream close. It is never auto-recovered; a re-subscription is a fresh
/// external action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LiveChannelState {
    #[default]
    Idle,
    Subscribed,
    Failed,
}

impl LiveChannelState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Subscribed)
    }
}

/// A live event tagged by the channel that delivered it.
///
/// The two subscriptions are semantically distinct streams, not a tagged
/// union on the wire, so the discriminant is attached at routing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEvent {
    Added(Message),
    Updated(Message),
}

impl MessageEvent {
    pub fn from_channel(channel: LiveChannel, message: Message) -> Self {
        match channel {
            LiveChannel::Added => Self::Added(message),
            LiveChannel::Updated => Self::Updated(message),
        }
    }
}

/// Normalizes live deliveries and historical pages into store merges.
///
/// Owns the store and the error slot; every failure is isolated to its
/// origin channel and never rolls back or blocks the others.
#[derive(Debug, Default)]
pub struct EventRouter {
    store: MessageStore,
    errors: ErrorSlot,
    added_state: LiveChannelState,
    updated_state: LiveChannelState,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn pending_error(&self) -> Option<String> {
        self.errors.pending().map(str::to_string)
    }

    pub fn channel_state(&self, channel: LiveChannel) -> LiveChannelState {
        match channel {
            LiveChannel::Added => self.added_state,
            LiveChannel::Updated => self.updated_state,
        }
    }

    pub fn channel_active(&self, channel: LiveChannel) -> bool {
        self.channel_state(channel).is_active()
    }

    pub fn mark_subscribed(&mut self, channel: LiveChannel) {
        tracing::debug!(channel = %channel, "live channel subscribed");
        *self.state_mut(channel) = LiveChannelState::Subscribed;
    }

    pub fn mark_channel_failed(&mut self, channel: LiveChannel) {
        *self.state_mut(channel) = LiveChannelState::Failed;
    }

    /// Handles one delivery from a live stream; `None` is stream close.
    ///
    /// Returns the channel state after the delivery so the driver can stop
    /// polling a failed stream.
    pub fn handle_live_delivery(
        &mut self,
        channel: LiveChannel,
        delivery: Option<LiveDelivery>,
    ) -> LiveChannelState {
        match delivery {
            Some(Ok(Some(message))) => {
                let outcome = self.apply_event(MessageEvent::from_channel(channel, message));
                tracing::debug!(channel = %channel, outcome = ?outcome, "live delivery merged");
            }
            Some(Ok(None)) => {
                // Empty notification: no payload, no store or error mutation.
                tracing::debug!(channel = %channel, "empty live delivery discarded");
            }
            Some(Err(error)) => {
                tracing::warn!(channel = %channel, error = %error, "live delivery failed");
                self.report_failure(SessionError::Subscription {
                    stage: "live-delivery",
                    channel,
                    source: error,
                });
                self.mark_channel_failed(channel);
            }
            None => {
                // The source closed the stream without a transport error;
                // nothing to surface, but the channel is done.
                tracing::debug!(channel = %channel, "live channel closed");
                self.mark_channel_failed(channel);
            }
        }

        self.channel_state(channel)
    }

    /// Applies one classified event to the matching store operation,
    /// exactly once per delivery.
    pub fn apply_event(&mut self, event: MessageEvent) -> MergeOutcome {
        match event {
            MessageEvent::Added(message) => self.store.apply_add(message),
            MessageEvent::Updated(message) => self.store.apply_update(message),
        }
    }

    /// Merges a completed historical page.
    pub fn apply_page(&mut self, kind: PageRequestKind, page: Page) -> MergeOutcome {
        let outcome = match kind {
            PageRequestKind::Initial => self.store.apply_initial_page(page),
            PageRequestKind::Older => self.store.append_page(page),
        };
        tracing::debug!(kind = ?kind, outcome = ?outcome, "historical page merged");
        outcome
    }

    /// Overwrites the pending error with the most recent failure.
    pub fn report_failure(&mut self, error: SessionError) {
        self.errors.report(error.to_string());
    }

    pub fn clear_error(&mut self) {
        self.errors.clear();
    }

    fn state_mut(&mut self, channel: LiveChannel) -> &mut LiveChannelState {
        match channel {
            LiveChannel::Added => &mut self.added_state,
            LiveChannel::Updated => &mut self.updated_state,
        }
    }
}
