use std::sync::Arc;

use tokio::sync::mpsc;

use parley_model::{Cursor, Page};
use parley_source::{MessageSource, SourceResult};

/// Which store operation a completed fetch feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequestKind {
    Initial,
    Older,
}

/// Resolved result of one spawned page fetch.
#[derive(Debug)]
pub struct PageFetchOutcome {
    pub kind: PageRequestKind,
    pub result: SourceResult<Page>,
}

/// Forward-only cursor pagination over a message source.
///
/// Fetches run as spawned tasks that deliver a `PageFetchOutcome` into the
/// caller's channel; the pager itself only tracks the cursor frontier and
/// the in-flight guard. A fetch is never cancelled — a stale completion is
/// simply discarded by whoever stops listening.
pub struct CursorPager {
    source: Arc<dyn MessageSource>,
    page_size: u32,
    end_cursor: Option<Cursor>,
    has_next_page: bool,
    in_flight: bool,
    first_page_requested: bool,
}

impl CursorPager {
    pub fn new(source: Arc<dyn MessageSource>, page_size: u32) -> Self {
        Self {
            source,
            page_size,
            end_cursor: None,
            has_next_page: false,
            in_flight: false,
            first_page_requested: false,
        }
    }

    pub fn has_next_page(&self) -> bool {
        self.has_next_page
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Requests the earliest available page. Returns false without fetching
    /// when the first page was already requested or a load is in flight.
    pub fn request_first_page(
        &mut self,
        outcomes: &mpsc::UnboundedSender<PageFetchOutcome>,
    ) -> bool {
        if self.first_page_requested || self.in_flight {
            return false;
        }

        self.first_page_requested = true;
        self.in_flight = true;
        self.spawn_fetch(PageRequestKind::Initial, None, outcomes);
        true
    }

    /// Requests the page strictly after the last known end cursor.
    ///
    /// Performs nothing when no further page exists, no cursor is known yet,
    /// or a load is already in flight — duplicate scroll triggers must not
    /// restart or overlap a request.
    pub fn request_next_page(
        &mut self,
        outcomes: &mpsc::UnboundedSender<PageFetchOutcome>,
    ) -> bool {
        if self.in_flight || !self.has_next_page {
            return false;
        }
        let Some(after) = self.end_cursor.clone() else {
            return false;
        };

        self.in_flight = true;
        self.spawn_fetch(PageRequestKind::Older, Some(after), outcomes);
        true
    }

    /// Absorbs the pagination metadata of a completed page.
    pub fn complete(&mut self, page: &Page) {
        self.in_flight = false;
        self.has_next_page = page.page_info.has_next_page;
        self.end_cursor = page.page_info.end_cursor.clone();
    }

    /// Clears the in-flight guard after a failed fetch so a user-triggered
    /// retry can go through. The pager never retries on its own.
    pub fn fail(&mut self) {
        self.in_flight = false;
    }

    fn spawn_fetch(
        &self,
        kind: PageRequestKind,
        after: Option<Cursor>,
        outcomes: &mpsc::UnboundedSender<PageFetchOutcome>,
    ) {
        let source = Arc::clone(&self.source);
        let first = self.page_size;
        let outcomes = outcomes.clone();

        tokio::spawn(async move {
            let result = source.fetch_page(first, after).await;
            // A closed receiver means the session is gone; the completed
            // fetch is discarded, not an error.
            let _ = outcomes.send(PageFetchOutcome { kind, result });
        });
    }
}
