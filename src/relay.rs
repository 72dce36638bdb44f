use crate::frame::Frame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Single-slot frame handoff between the capture and broadcast loops
///
/// Publishing never blocks on readers: a new frame replaces whatever sits in
/// the slot, and a replaced frame that no reader fetched counts as dropped.
/// Reads clone the `Arc` and leave the slot in place so a slow producer can
/// be covered by re-sending the last frame.
pub struct FrameRelay {
    slot: Mutex<Slot>,
    stats: RelayStats,
}

#[derive(Default)]
struct Slot {
    frame: Option<Arc<Frame>>,
    fetched: bool,
}

/// Statistics for relay monitoring
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Total frames published into the slot
    pub frames_published: AtomicU64,
    /// Total successful reads of the slot
    pub frames_retrieved: AtomicU64,
    /// Frames overwritten before any reader saw them
    pub frames_dropped: AtomicU64,
}

impl RelayStats {
    /// Get current statistics as a snapshot
    pub fn snapshot(&self, occupancy: usize) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            frames_published: self.frames_published.load(Ordering::Relaxed),
            frames_retrieved: self.frames_retrieved.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            occupancy,
        }
    }
}

/// Snapshot of relay statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RelayStatsSnapshot {
    pub frames_published: u64,
    pub frames_retrieved: u64,
    pub frames_dropped: u64,
    /// Number of frames currently held (0 or 1)
    pub occupancy: usize,
}

impl FrameRelay {
    pub fn new() -> Self {
        debug!("Created single-slot frame relay");
        Self {
            slot: Mutex::new(Slot::default()),
            stats: RelayStats::default(),
        }
    }

    /// Replace the slot contents with `frame`
    pub fn publish(&self, frame: Arc<Frame>) {
        let sequence = frame.sequence;
        let replaced_unread = {
            let mut slot = self.slot.lock();
            let replaced_unread = slot.frame.is_some() && !slot.fetched;
            slot.frame = Some(frame);
            slot.fetched = false;
            replaced_unread
        };

        if replaced_unread {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            trace!("Relay dropped unread frame before publishing {}", sequence);
        }
        self.stats.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the most recently published frame
    pub fn latest(&self) -> Option<Arc<Frame>> {
        let frame = {
            let mut slot = self.slot.lock();
            slot.fetched = true;
            slot.frame.clone()
        };

        if frame.is_some() {
            self.stats.frames_retrieved.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Number of frames held, never more than one
    pub fn occupancy(&self) -> usize {
        usize::from(self.slot.lock().frame.is_some())
    }

    /// Empty the slot
    pub fn clear(&self) {
        let mut slot = self.slot.lock();
        slot.frame = None;
        slot.fetched = false;
        debug!("Frame relay cleared");
    }

    pub fn stats(&self) -> RelayStatsSnapshot {
        self.stats.snapshot(self.occupancy())
    }
}

impl Default for FrameRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn create_test_frame(sequence: u64) -> Arc<Frame> {
        Arc::new(Frame::new(sequence, SystemTime::now(), vec![0u8; 12], 2, 2))
    }

    #[test]
    fn test_empty_relay() {
        let relay = FrameRelay::new();
        assert!(relay.latest().is_none());
        assert_eq!(relay.occupancy(), 0);
        assert_eq!(relay.stats().frames_retrieved, 0);
    }

    #[test]
    fn test_only_latest_frame_survives() {
        let relay = FrameRelay::new();

        for sequence in 0..1000 {
            relay.publish(create_test_frame(sequence));
        }

        let latest = relay.latest().unwrap();
        assert_eq!(latest.sequence, 999);
        assert_eq!(relay.occupancy(), 1);

        let stats = relay.stats();
        assert_eq!(stats.frames_published, 1000);
        assert_eq!(stats.frames_dropped, 999);
        assert_eq!(stats.occupancy, 1);
    }

    #[test]
    fn test_read_frames_are_not_counted_as_dropped() {
        let relay = FrameRelay::new();

        relay.publish(create_test_frame(1));
        assert_eq!(relay.latest().unwrap().sequence, 1);
        relay.publish(create_test_frame(2));

        // Reads do not consume the slot
        assert_eq!(relay.latest().unwrap().sequence, 2);
        assert_eq!(relay.latest().unwrap().sequence, 2);

        let stats = relay.stats();
        assert_eq!(stats.frames_dropped, 0);
        assert_eq!(stats.frames_retrieved, 3);
    }

    #[test]
    fn test_clear() {
        let relay = FrameRelay::new();
        relay.publish(create_test_frame(1));
        relay.clear();

        assert!(relay.latest().is_none());
        assert_eq!(relay.occupancy(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let relay = Arc::new(FrameRelay::new());
        let mut handles = Vec::new();

        for writer in 0..4u64 {
            let relay = Arc::clone(&relay);
            handles.push(tokio::spawn(async move {
                for i in 0..250u64 {
                    relay.publish(create_test_frame(writer * 1000 + i));
                }
            }));
        }

        for _ in 0..4 {
            let relay = Arc::clone(&relay);
            handles.push(tokio::spawn(async move {
                for _ in 0..250 {
                    if let Some(frame) = relay.latest() {
                        assert!(frame.validate_size());
                    }
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(relay.stats().frames_published, 1000);
        assert!(relay.occupancy() <= 1);
    }
}
