use super::encoder::EncodedFrame;
use crate::error::SessionSendError;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// A connected viewer as seen by the broadcaster
///
/// `send` is called from the broadcast thread and must not block.
pub trait ViewerSession: Send + Sync {
    fn id(&self) -> &str;

    fn send(&self, frame: &Arc<EncodedFrame>) -> Result<(), SessionSendError>;
}

/// Session backed by a bounded tokio channel
///
/// The transport task owns the receiver and writes frames to the network.
pub struct ChannelSession {
    id: String,
    sender: mpsc::Sender<Arc<EncodedFrame>>,
}

impl ChannelSession {
    /// Create a session with a random id and the receiving half
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Arc<EncodedFrame>>) {
        Self::with_id(Uuid::new_v4().to_string(), buffer)
    }

    pub fn with_id(
        id: impl Into<String>,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<Arc<EncodedFrame>>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (
            Self {
                id: id.into(),
                sender,
            },
            receiver,
        )
    }
}

impl ViewerSession for ChannelSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, frame: &Arc<EncodedFrame>) -> Result<(), SessionSendError> {
        self.sender
            .try_send(Arc::clone(frame))
            .map_err(|e| match e {
                TrySendError::Full(_) => SessionSendError::Full,
                TrySendError::Closed(_) => SessionSendError::Closed,
            })
    }
}
