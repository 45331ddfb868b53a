use snafu::Snafu;

use parley_source::{LiveChannel, SourceError};

/// Failure taxonomy for the reconciliation core.
///
/// None of these are fatal: each one is isolated to its origin channel,
/// surfaced through the error slot, and leaves the other channels running.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("failed to load messages: {source}"))]
    PageFetch {
        stage: &'static str,
        source: SourceError,
    },
    #[snafu(display("{channel} subscription failed: {source}"))]
    Subscription {
        stage: &'static str,
        channel: LiveChannel,
        source: SourceError,
    },
    #[snafu(display("failed to send message: {source}"))]
    Send {
        stage: &'static str,
        source: SourceError,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;
