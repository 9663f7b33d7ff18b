//! Failure injection for testing error delivery.
//!
//! A fail point is armed explicitly and fires once: the next operation that
//! checks it fails, after which it is disarmed again.
//!
//! ```rust
//! use vellum_storage::{FailPoint, FailPoints};
//!
//! let points = FailPoints::new();
//! points.arm(FailPoint::OpenSnapshot);
//! assert!(points.trigger(FailPoint::OpenSnapshot));
//! assert!(!points.trigger(FailPoint::OpenSnapshot));
//! ```

use hashbrown::HashSet;
use parking_lot::Mutex;

/// Named places where an injected failure can occur.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// Opening a snapshot for a background read.
    OpenSnapshot,
}

/// A set of armed fail points.
#[derive(Debug, Default)]
pub struct FailPoints {
    armed: Mutex<HashSet<FailPoint>>,
}

impl FailPoints {
    /// Creates a set with nothing armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a fail point so the next check of it fails.
    pub fn arm(&self, point: FailPoint) {
        log::debug!("fail point armed: {:?}", point);
        self.armed.lock().insert(point);
    }

    /// Disarms a fail point without triggering it.
    pub fn disarm(&self, point: FailPoint) {
        self.armed.lock().remove(&point);
    }

    /// Returns true (and disarms) if the point was armed.
    #[inline]
    pub fn trigger(&self, point: FailPoint) -> bool {
        let fired = self.armed.lock().remove(&point);
        if fired {
            log::debug!("fail point triggered: {:?}", point);
        }
        fired
    }
}
