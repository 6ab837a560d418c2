// [libs/infra/broadcast/src/queue.rs]
//! Per-client outbound frame queue. Bounded to 256
//! frames by default; when full, the oldest queued frame is dropped to
//! make room for the newest rather than blocking the publisher or
//! dropping the new frame. A `Snapshot` is never evicted by this policy
//! — it is the one frame a client cannot afford to miss, since every
//! delta after it assumes the client already has it — so it is kept
//! pinned at the front instead of being queued through the same ring.
//! A client whose queue has dropped too many frames is disconnected
//! with close code 1011 rather than left to silently desync.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::frame::Frame;

pub const DEFAULT_CAPACITY: usize = 256;
const EXCESSIVE_DROP_THRESHOLD: u32 = 64;

struct QueueState {
    pinned_snapshot: Option<Frame>,
    frames: VecDeque<Frame>,
}

pub struct ClientQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU32,
    should_close: AtomicBool,
}

impl ClientQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState { pinned_snapshot: None, frames: VecDeque::with_capacity(capacity) }),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU32::new(0),
            should_close: AtomicBool::new(false),
        }
    }

    /// Enqueues a frame, evicting the oldest non-pinned frame if full.
    pub fn push(&self, frame: Frame) {
        let mut state = self.state.lock().expect("client queue mutex poisoned");

        if frame.is_snapshot() {
            // Everything queued before the snapshot is superseded by it; keeping
            // those deltas around would replay pre-snapshot state after resync.
            state.frames.clear();
            state.pinned_snapshot = Some(frame);
            self.notify.notify_one();
            return;
        }

        if state.frames.len() >= self.capacity {
            state.frames.pop_front();
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped >= EXCESSIVE_DROP_THRESHOLD {
                self.should_close.store(true, Ordering::Relaxed);
            }
        }
        state.frames.push_back(frame);
        self.notify.notify_one();
    }

    /// Waits for and returns the next frame to send: the pinned snapshot
    /// first (if one has arrived and not yet been taken), then FIFO
    /// order over the regular ring.
    pub async fn next(&self) -> Frame {
        loop {
            {
                let mut state = self.state.lock().expect("client queue mutex poisoned");
                if let Some(snapshot) = state.pinned_snapshot.take() {
                    self.dropped.store(0, Ordering::Relaxed);
                    return snapshot;
                }
                if let Some(frame) = state.frames.pop_front() {
                    return frame;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn should_close(&self) -> bool {
        self.should_close.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_domain::state::ClusterState;

    fn ping() -> Frame {
        Frame::Ping
    }

    #[tokio::test]
    async fn drops_oldest_when_full() {
        let queue = ClientQueue::new(2);
        queue.push(ping());
        queue.push(ping());
        queue.push(ping()); // should drop the first ping, not the second

        assert!(matches!(queue.next().await, Frame::Ping));
        assert!(matches!(queue.next().await, Frame::Ping));
    }

    #[tokio::test]
    async fn snapshot_is_never_evicted_and_takes_priority() {
        let queue = ClientQueue::new(1);
        queue.push(ping());
        queue.push(Frame::snapshot(ClusterState::new()));
        queue.push(ping()); // fills the regular ring after the snapshot is pinned

        let first = queue.next().await;
        assert!(first.is_snapshot());
    }

    #[tokio::test]
    async fn closes_after_excessive_drops() {
        let queue = ClientQueue::new(1);
        for _ in 0..(EXCESSIVE_DROP_THRESHOLD + 1) {
            queue.push(ping());
        }
        assert!(queue.should_close());
    }
}
