//! Heartbeat for frame callbacks that are not tied to a buffer.
//!
//! A client that commits only a frame request (no new buffer) is using the
//! compositor as an animation clock. Those requests are answered in batches
//! on a fixed quantum: the first request arms a one-shot timer, later ones
//! within the same quantum join the batch.

use std::io;
use std::time::Duration;

use crate::surface::SurfaceId;

/// A one-shot timer owned by the event loop.
pub trait HeartbeatTimer {
    /// Arranges for the engine's batch dispatch to run once after `after`.
    fn arm(&mut self, after: Duration) -> io::Result<()>;
}

pub const DEFAULT_FRAME_QUANTUM: Duration = Duration::from_millis(16);

pub struct FrameCallbackScheduler {
    quantum: Duration,
    timer: Box<dyn HeartbeatTimer>,
    queued: Vec<SurfaceId>,
    armed: bool,
}

impl FrameCallbackScheduler {
    pub fn new(quantum: Duration, timer: Box<dyn HeartbeatTimer>) -> Self {
        Self {
            quantum,
            timer,
            queued: Vec::new(),
            armed: false,
        }
    }

    pub fn quantum(&self) -> Duration {
        self.quantum
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Queues `surface` for the next batch. If the timer cannot be armed
    /// the surface stays queued and the next request tries again.
    pub fn request(&mut self, surface: SurfaceId) -> io::Result<()> {
        if !self.queued.contains(&surface) {
            self.queued.push(surface);
        }
        if !self.armed {
            self.timer.arm(self.quantum)?;
            self.armed = true;
        }
        Ok(())
    }

    /// Takes every queued surface and disarms, called when the timer fires.
    pub fn take_batch(&mut self) -> Vec<SurfaceId> {
        self.armed = false;
        std::mem::take(&mut self.queued)
    }

    pub fn forget(&mut self, surface: SurfaceId) {
        self.queued.retain(|s| *s != surface);
    }
}

impl std::fmt::Debug for FrameCallbackScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCallbackScheduler")
            .field("quantum", &self.quantum)
            .field("queued", &self.queued)
            .field("armed", &self.armed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingTimer(Rc<RefCell<Vec<Duration>>>);

    impl HeartbeatTimer for RecordingTimer {
        fn arm(&mut self, after: Duration) -> io::Result<()> {
            self.0.borrow_mut().push(after);
            Ok(())
        }
    }

    /// Refuses the first `failures` arms.
    struct FlakyTimer {
        failures: usize,
        arms: Rc<RefCell<Vec<Duration>>>,
    }

    impl HeartbeatTimer for FlakyTimer {
        fn arm(&mut self, after: Duration) -> io::Result<()> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(io::Error::other("timer unavailable"));
            }
            self.arms.borrow_mut().push(after);
            Ok(())
        }
    }

    fn scheduler() -> (FrameCallbackScheduler, Rc<RefCell<Vec<Duration>>>) {
        let arms = Rc::new(RefCell::new(Vec::new()));
        (
            FrameCallbackScheduler::new(DEFAULT_FRAME_QUANTUM, Box::new(RecordingTimer(arms.clone()))),
            arms,
        )
    }

    #[test]
    fn test_requests_within_a_quantum_share_one_wakeup() {
        let (mut scheduler, arms) = scheduler();
        let (a, b) = (SurfaceId::new_unique(), SurfaceId::new_unique());

        scheduler.request(a).unwrap();
        scheduler.request(b).unwrap();
        scheduler.request(a).unwrap();

        assert_eq!(*arms.borrow(), vec![DEFAULT_FRAME_QUANTUM]);
        assert_eq!(scheduler.take_batch(), vec![a, b]);
        assert!(!scheduler.is_armed());
    }

    #[test]
    fn test_request_after_batch_rearms() {
        let (mut scheduler, arms) = scheduler();
        let a = SurfaceId::new_unique();
        scheduler.request(a).unwrap();
        scheduler.take_batch();
        scheduler.request(a).unwrap();

        assert_eq!(arms.borrow().len(), 2);
        assert!(scheduler.is_armed());
    }

    #[test]
    fn test_forgotten_surface_leaves_batch() {
        let (mut scheduler, _) = scheduler();
        let (a, b) = (SurfaceId::new_unique(), SurfaceId::new_unique());
        scheduler.request(a).unwrap();
        scheduler.request(b).unwrap();
        scheduler.forget(a);
        assert_eq!(scheduler.take_batch(), vec![b]);
    }

    #[test]
    fn test_failed_arm_is_retried_on_next_request() {
        let arms = Rc::new(RefCell::new(Vec::new()));
        let timer = FlakyTimer {
            failures: 1,
            arms: arms.clone(),
        };
        let mut scheduler = FrameCallbackScheduler::new(DEFAULT_FRAME_QUANTUM, Box::new(timer));
        let (a, b) = (SurfaceId::new_unique(), SurfaceId::new_unique());

        assert!(scheduler.request(a).is_err());
        assert!(!scheduler.is_armed());

        scheduler.request(b).unwrap();
        assert!(scheduler.is_armed());
        assert_eq!(*arms.borrow(), vec![DEFAULT_FRAME_QUANTUM]);
        assert_eq!(scheduler.take_batch(), vec![a, b]);
    }
}
