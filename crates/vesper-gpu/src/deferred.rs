//! Deferred resource destruction for multi-frame-in-flight rendering.
//!
//! A resource replaced while earlier frames are still executing cannot be
//! destroyed right away. The queue holds any owned value whose `Drop` releases
//! GPU objects and drops it once every frame that may reference it has
//! completed.

use std::collections::VecDeque;

/// A resource pending destruction.
struct PendingDestruction {
    resource: Box<dyn Send>,
    /// Frame number when the resource was queued.
    frame_queued: u64,
}

/// Queue for deferred destruction.
pub struct DeferredDestructionQueue {
    pending: VecDeque<PendingDestruction>,
    /// Frames to keep a resource alive after it was queued.
    frames_in_flight: usize,
}

impl DeferredDestructionQueue {
    /// Create a queue that keeps resources for `frames_in_flight` frames.
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            frames_in_flight,
        }
    }

    /// Queue `resource` during frame `frame_number`.
    pub fn queue<R: Send + 'static>(&mut self, resource: R, frame_number: u64) {
        self.pending.push_back(PendingDestruction {
            resource: Box::new(resource),
            frame_queued: frame_number,
        });
    }

    /// Drop resources no in-flight frame can reference any more.
    ///
    /// A resource queued during frame `n` is released once
    /// `current_frame_number` reaches `n + frames_in_flight`: that frame reuses
    /// frame `n`'s slot, so its fence wait covered frame `n`. Call after the
    /// current slot's fence wait. Returns how many were released.
    pub fn process(&mut self, current_frame_number: u64) -> usize {
        let frames_in_flight = self.frames_in_flight as u64;

        // FIFO with non-decreasing frame numbers, so only the front can mature.
        let mut released = 0;
        while self
            .pending
            .front()
            .is_some_and(|p| p.frame_queued + frames_in_flight <= current_frame_number)
        {
            if let Some(pending) = self.pending.pop_front() {
                drop(pending.resource);
                released += 1;
            }
        }
        if released > 0 {
            tracing::debug!(released, "Released deferred resources");
        }
        released
    }

    /// Drop everything immediately. Only valid once the device is idle.
    pub fn flush(&mut self) -> usize {
        let released = self.pending.len();
        self.pending.clear();
        released
    }

    /// Number of resources waiting.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn holds_for_frames_in_flight() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut queue = DeferredDestructionQueue::new(2);
        queue.queue(Tracked(dropped.clone()), 5);

        for frame in 5..=6 {
            assert_eq!(queue.process(frame), 0);
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 0);

        assert_eq!(queue.process(7), 1);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn releases_in_order() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut queue = DeferredDestructionQueue::new(1);
        queue.queue(Tracked(dropped.clone()), 0);
        queue.queue(Tracked(dropped.clone()), 3);

        assert_eq!(queue.process(2), 1);
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.flush(), 1);
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
    }
}
