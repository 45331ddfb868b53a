use parley_model::{Message, MessageId, Page};

/// What one merge operation did to the store.
///
/// The ignored variants are expected in normal operation: the live add
/// channel redelivers creation events, and the update channel pushes
/// messages a client never paged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Replaced { count: usize },
    Appended { count: usize },
    Added,
    DuplicateAddIgnored,
    Updated,
    UnknownUpdateIgnored,
}

/// Ordered, deduplicated collection of messages.
///
/// Invariant: no two elements share an id. Element order is merge order —
/// the order pages and live events arrived — never `updated_at` order. The
/// store owns message lifetime; callers read snapshots and submit merges.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Owned copy of the current ordering, for snapshot publication.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.position(id).is_some()
    }

    /// Replaces the store content with the first completed historical fetch,
    /// preserving server-given order.
    pub fn apply_initial_page(&mut self, page: Page) -> MergeOutcome {
        let count = page.messages.len();
        self.messages = page.messages;
        MergeOutcome::Replaced { count }
    }

    /// Appends an older page at the tail, preserving in-page order.
    ///
    /// No dedup against existing content: pages are disjoint by contract of
    /// the cursor protocol, so a duplicate id across pages is an upstream
    /// anomaly this operation does not absorb.
    pub fn append_page(&mut self, page: Page) -> MergeOutcome {
        let count = page.messages.len();
        self.messages.extend(page.messages);
        MergeOutcome::Appended { count }
    }

    /// Tail-appends a live-added message, unless its id is already present.
    ///
    /// The added channel is observed to redeliver the same logical creation
    /// event; a naive append would render duplicate rows.
    pub fn apply_add(&mut self, message: Message) -> MergeOutcome {
        if self.contains(&message.id) {
            return MergeOutcome::DuplicateAddIgnored;
        }

        self.messages.push(message);
        MergeOutcome::Added
    }

    /// Replaces the matching element in place, position preserved.
    ///
    /// Updates for ids that were never paged in are dropped silently; the
    /// store cannot place a message it has no position for.
    pub fn apply_update(&mut self, message: Message) -> MergeOutcome {
        match self.position(&message.id) {
            Some(index) => {
                self.messages[index] = message;
                MergeOutcome::Updated
            }
            None => MergeOutcome::UnknownUpdateIgnored,
        }
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|message| message.id == *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_model::{MessageStatus, PageInfo, Sender};

    fn message(id: &str, text: &str) -> Message {
        Message::new(id, text, Sender::Customer, MessageStatus::Read, 0)
    }

    fn page_of(messages: Vec<Message>) -> Page {
        Page::new(messages, PageInfo::exhausted())
    }

    fn ids(store: &MessageStore) -> Vec<&str> {
        store
            .messages()
            .iter()
            .map(|message| message.id.as_str())
            .collect()
    }

    #[test]
    fn initial_page_replaces_content_in_server_order() {
        let mut store = MessageStore::new();
        store.apply_add(message("stale", "left over"));

        let outcome =
            store.apply_initial_page(page_of(vec![message("1", "hi"), message("2", "yo")]));

        assert_eq!(outcome, MergeOutcome::Replaced { count: 2 });
        assert_eq!(ids(&store), vec!["1", "2"]);
    }

    #[test]
    fn append_page_preserves_order_at_the_tail() {
        let mut store = MessageStore::new();
        store.apply_initial_page(page_of(vec![message("a", ""), message("b", "")]));

        store.append_page(page_of(vec![message("m1", ""), message("m2", "")]));

        assert_eq!(ids(&store), vec!["a", "b", "m1", "m2"]);
    }

    #[test]
    fn redelivered_add_is_a_no_op() {
        let mut store = MessageStore::new();
        store.apply_initial_page(page_of(vec![message("1", "hi")]));

        assert_eq!(store.apply_add(message("2", "yo")), MergeOutcome::Added);
        assert_eq!(
            store.apply_add(message("2", "yo")),
            MergeOutcome::DuplicateAddIgnored
        );

        assert_eq!(ids(&store), vec!["1", "2"]);
    }

    #[test]
    fn applying_the_same_add_twice_equals_applying_it_once() {
        let mut once = MessageStore::new();
        let mut twice = MessageStore::new();

        once.apply_add(message("m", "hello"));
        twice.apply_add(message("m", "hello"));
        twice.apply_add(message("m", "hello"));

        assert_eq!(once.messages(), twice.messages());
    }

    #[test]
    fn update_replaces_in_place_without_moving_the_row() {
        let mut store = MessageStore::new();
        store.apply_initial_page(page_of(vec![
            message("1", "first"),
            Message::new("2", "second", Sender::Customer, MessageStatus::Sending, 0),
            message("3", "third"),
        ]));

        let outcome = store.apply_update(Message::new(
            "2",
            "second",
            Sender::Customer,
            MessageStatus::Sent,
            1,
        ));

        assert_eq!(outcome, MergeOutcome::Updated);
        assert_eq!(ids(&store), vec!["1", "2", "3"]);
        assert_eq!(store.messages()[1].status, MessageStatus::Sent);
    }

    #[test]
    fn update_for_an_unloaded_id_leaves_the_store_unchanged() {
        let mut store = MessageStore::new();
        store.apply_initial_page(page_of(vec![message("1", "hi")]));
        let before = store.snapshot();

        let outcome = store.apply_update(Message::new(
            "99",
            "never loaded",
            Sender::Admin,
            MessageStatus::Sent,
            0,
        ));

        assert_eq!(outcome, MergeOutcome::UnknownUpdateIgnored);
        assert_eq!(store.messages(), before.as_slice());
    }

    #[test]
    fn no_merge_sequence_produces_a_duplicate_id() {
        let mut store = MessageStore::new();

        store.apply_initial_page(page_of(vec![message("1", ""), message("2", "")]));
        store.append_page(page_of(vec![message("3", "")]));
        store.apply_add(message("4", ""));
        store.apply_add(message("2", ""));
        store.apply_update(message("3", "edited"));
        store.apply_add(message("4", ""));

        let mut seen = std::collections::HashSet::new();
        for entry in store.messages() {
            assert!(seen.insert(entry.id.clone()), "duplicate id {}", entry.id);
        }
        assert_eq!(store.len(), 4);
    }
}
