pub mod message;
pub mod page;

pub use message::{Message, MessageId, MessageStatus, Sender};
pub use page::{Cursor, Page, PageInfo};
