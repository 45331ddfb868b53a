use std::fmt;

use serde::{Deserialize, Serialize};

use super::message::Message;

/// Opaque pagination token marking a position in the historical sequence.
///
/// Tokens are minted by the data source; the core only threads them back
/// verbatim into the next fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Forward/backward pagination metadata for one page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<Cursor>,
    pub end_cursor: Option<Cursor>,
}

impl PageInfo {
    /// Metadata for a terminal page with nothing after it.
    pub fn exhausted() -> Self {
        Self::default()
    }
}

/// A contiguous, cursor-bounded batch of messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub messages: Vec<Message>,
    pub page_info: PageInfo,
}

impl Page {
    pub fn new(messages: Vec<Message>, page_info: PageInfo) -> Self {
        Self {
            messages,
            page_info,
        }
    }

    /// A page carrying no messages and no further cursor.
    pub fn empty() -> Self {
        Self::new(Vec::new(), PageInfo::exhausted())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
