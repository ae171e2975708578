//! Publication point for the current schedule snapshot.

use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use super::index::Timetable;

/// Shared slot holding the current [`Timetable`].
///
/// Readers take an `Arc` to one snapshot and keep using it for the whole
/// match even if a reload is published meanwhile.
#[derive(Debug)]
pub struct ScheduleHandle {
    current: RwLock<Arc<Timetable>>,
}

impl ScheduleHandle {
    pub fn new(timetable: Timetable) -> Self {
        Self {
            current: RwLock::new(Arc::new(timetable)),
        }
    }

    pub fn snapshot(&self) -> Arc<Timetable> {
        // The slot only ever holds a complete Arc, so a poisoned lock is safe to reuse.
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Replaces the current snapshot. In-flight readers keep the old one.
    pub fn publish(&self, timetable: Timetable) {
        let summary = timetable.summary();
        let next = Arc::new(timetable);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = next;
        drop(guard);

        info!(
            routes = summary.routes,
            patterns = summary.patterns,
            trips = summary.trips,
            services = summary.services,
            "Published schedule snapshot"
        );
    }
}
