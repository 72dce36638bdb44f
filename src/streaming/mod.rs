mod broadcaster;
mod control;
mod encoder;
mod session;
mod stats;
#[cfg(test)]
mod tests;

pub use broadcaster::{StreamBroadcaster, StreamBroadcasterBuilder};
pub use control::{ControlMessage, ControlReply};
pub use encoder::{
    clamp_quality, encode_jpeg, EncodedFrame, FrameHeader, PayloadFormat, MAX_QUALITY,
    MIN_QUALITY,
};
pub use session::{ChannelSession, ViewerSession};
pub use stats::StreamStats;
