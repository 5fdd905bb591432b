//! Per-connection outbound frame queue.
//!
//! The match workers must never block on a slow socket, so every connection
//! gets a bounded queue drained by its writer task. Snapshots are absolute
//! state: when the queue is full the oldest queued snapshot is discarded to
//! make room. Every other frame (`game:start`, `game:end`, `error`, ...) is
//! delivered unconditionally and may grow the queue past its bound.

use shared::protocol::ServerEvent;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// A queued item for the writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Event(ServerEvent),
    /// Terminate the connection with the given close code after draining.
    Close { code: u16, reason: String },
}

#[derive(Debug, Default)]
struct Inner {
    frames: VecDeque<OutboundFrame>,
    closed: bool,
    dropped_snapshots: u64,
}

/// Bounded frame queue between match workers and one connection writer.
#[derive(Debug)]
pub struct OutboundQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Queues a frame for delivery. Snapshots are subject to the bound;
    /// anything else always goes through. Frames pushed after [`close`] are
    /// discarded.
    ///
    /// [`close`]: OutboundQueue::close
    pub fn push(&self, event: ServerEvent) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return;
        }

        if event.is_droppable() && inner.frames.len() >= self.capacity {
            let oldest_snapshot = inner
                .frames
                .iter()
                .position(|f| matches!(f, OutboundFrame::Event(e) if e.is_droppable()));
            match oldest_snapshot {
                Some(pos) => {
                    let _ = inner.frames.remove(pos);
                    inner.dropped_snapshots += 1;
                }
                None => {
                    // Queue is full of must-deliver frames; skip this
                    // snapshot, the next one carries the same information.
                    inner.dropped_snapshots += 1;
                    return;
                }
            }
        }

        inner.frames.push_back(OutboundFrame::Event(event));
        drop(inner);
        self.notify.notify_one();
    }

    /// Queues a close frame and seals the queue. Later pushes are no-ops.
    pub fn close(&self, code: u16, reason: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.frames.push_back(OutboundFrame::Close {
            code,
            reason: reason.to_string(),
        });
        drop(inner);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Snapshots discarded so far under backpressure.
    pub fn dropped_snapshots(&self) -> u64 {
        self.inner.lock().unwrap().dropped_snapshots
    }

    /// Non-blocking pop, used by tests and the drain path.
    pub fn try_recv(&self) -> Option<OutboundFrame> {
        self.inner.lock().unwrap().frames.pop_front()
    }

    /// Waits for the next frame. Returns `None` once the queue is closed and
    /// fully drained.
    pub async fn recv(&self) -> Option<OutboundFrame> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(frame) = inner.frames.pop_front() {
                    return Some(frame);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }
}
