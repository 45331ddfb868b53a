use snafu::Snafu;

use super::stream::LiveChannel;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    #[snafu(display("failed to fetch message page: {details}"))]
    PageFetch {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("failed to open {channel} subscription: {details}"))]
    Subscribe {
        stage: &'static str,
        channel: LiveChannel,
        details: String,
    },
    #[snafu(display("{channel} subscription delivery failed: {details}"))]
    Delivery {
        stage: &'static str,
        channel: LiveChannel,
        details: String,
    },
    #[snafu(display("failed to send message: {details}"))]
    SendMessage {
        stage: &'static str,
        details: String,
    },
}

pub type SourceResult<T> = Result<T, SourceError>;
