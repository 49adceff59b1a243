//! Single-slot frame hand-off between the transport and the control loop
//!
//! Transports deliver frames from whatever thread their decoder runs on. The
//! slot keeps only the newest frame plus a freshness flag. Reading a frame
//! leaves it fresh; only [`FrameSlot::invalidate`], called before an
//! interaction, clears the flag until the next frame arrives.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{ConstructError, Result};
use crate::model::Frame;

/// Write half of the frame slot, handed to the environment transport.
///
/// Cloneable, `Send + Sync` and callable from any thread, with or without a
/// tokio runtime.
#[derive(Clone)]
pub struct FrameSink {
    tx: Arc<watch::Sender<Option<Frame>>>,
}

impl FrameSink {
    /// Publish a frame, replacing any frame not yet consumed
    pub fn push(&self, frame: Frame) {
        self.tx.send_replace(Some(frame));
    }
}

impl std::fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink")
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}

/// Read half of the frame slot, owned by the session
pub(crate) struct FrameSlot {
    tx: Arc<watch::Sender<Option<Frame>>>,
    rx: watch::Receiver<Option<Frame>>,
    fresh: bool,
}

impl FrameSlot {
    pub(crate) fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            rx,
            fresh: false,
        }
    }

    pub(crate) fn sink(&self) -> FrameSink {
        FrameSink {
            tx: Arc::clone(&self.tx),
        }
    }

    /// Whether a frame arrived since the last invalidation
    pub(crate) fn is_fresh(&self) -> bool {
        self.fresh || (self.rx.has_changed().unwrap_or(false) && self.rx.borrow().is_some())
    }

    /// Drop freshness so only later frames satisfy a wait
    pub(crate) fn invalidate(&mut self) {
        self.rx.borrow_and_update();
        self.fresh = false;
    }

    /// Newest frame seen so far, fresh or not
    pub(crate) fn latest(&self) -> Option<Frame> {
        self.rx.borrow().clone()
    }

    /// Mark frames delivered since the last look as seen
    fn absorb(&mut self) {
        if self.rx.has_changed().unwrap_or(false) && self.rx.borrow_and_update().is_some() {
            self.fresh = true;
        }
    }

    /// Return the fresh frame, suspending until one arrives or `deadline` passes.
    ///
    /// The frame stays fresh, so repeated waits without an invalidation
    /// return it again at once.
    pub(crate) async fn wait_until(&mut self, deadline: Instant) -> Result<Frame> {
        loop {
            self.absorb();
            if self.fresh {
                if let Some(frame) = self.latest() {
                    return Ok(frame);
                }
            }

            match tokio::time::timeout_at(deadline, self.rx.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    return Err(ConstructError::Session("frame source closed".to_string()));
                }
                Err(_) => {
                    return Err(ConstructError::Timeout(
                        "no fresh frame before the deadline".to_string(),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fresh_frame_returns_immediately() {
        let mut slot = FrameSlot::new();
        slot.sink().push(Frame::solid(2, 2, [1, 2, 3]));
        assert!(slot.is_fresh());

        let frame = slot.wait_until(Instant::now()).await.unwrap();
        assert_eq!(frame.pixel(0, 0), Some([1, 2, 3]));
        assert!(slot.is_fresh());
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_stays_fresh_until_invalidated() {
        let mut slot = FrameSlot::new();
        slot.sink().push(Frame::solid(2, 1, [4, 5, 6]));

        let first = slot.wait_until(Instant::now()).await.unwrap();
        let second = slot
            .wait_until(Instant::now() + Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(first, second);

        slot.invalidate();
        assert!(!slot.is_fresh());
        let err = slot
            .wait_until(Instant::now() + Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_frame() {
        let mut slot = FrameSlot::new();
        let err = slot
            .wait_until(Instant::now() + Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_hides_stale_frame() {
        let mut slot = FrameSlot::new();
        slot.sink().push(Frame::solid(1, 1, [9, 9, 9]));
        slot.invalidate();

        assert!(!slot.is_fresh());
        assert!(slot.latest().is_some());

        let err = slot
            .wait_until(Instant::now() + Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_frame_wins() {
        let mut slot = FrameSlot::new();
        let sink = slot.sink();
        sink.push(Frame::solid(1, 1, [1, 0, 0]));
        sink.push(Frame::solid(1, 1, [2, 0, 0]));

        let frame = slot.wait_until(Instant::now()).await.unwrap();
        assert_eq!(frame.pixel(0, 0), Some([2, 0, 0]));
    }

    #[tokio::test]
    async fn test_push_from_foreign_thread() {
        let mut slot = FrameSlot::new();
        let sink = slot.sink();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            sink.push(Frame::solid(3, 1, [7, 7, 7]));
        });

        let frame = slot
            .wait_until(Instant::now() + Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(frame.width(), 3);
        handle.join().unwrap();
    }
}
