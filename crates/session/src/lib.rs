pub mod error;
pub mod error_surface;
pub mod pager;
pub mod router;
pub mod session;
pub mod settings;
pub mod store;

pub use error::{SessionError, SessionResult};
pub use error_surface::ErrorSlot;
pub use pager::{CursorPager, PageFetchOutcome, PageRequestKind};
pub use router::{EventRouter, LiveChannelState, MessageEvent};
pub use session::{ChatSession, SessionHandle, SessionSnapshot};
pub use settings::{
    DEFAULT_PAGE_SIZE, SessionSettings, SettingsError, SettingsResult,
};
pub use store::{MergeOutcome, MessageStore};
