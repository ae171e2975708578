//! Immutable schedule value types.
//!
//! Relationships are index handles into the owning [`Timetable`](super::Timetable)
//! rather than references, so the whole snapshot can be shared behind an
//! `Arc` and swapped as a unit.

use super::ids::{FeedScopedId, RouteIdx, ServiceCode, StopIdx};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agency {
    pub id: FeedScopedId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stop {
    pub id: FeedScopedId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub id: FeedScopedId,
    pub agency_id: FeedScopedId,
    pub short_name: String,
    /// GTFS `route_type` (3 = bus, 700 = extended bus, ...).
    pub route_type: i32,
}

/// GTFS `direction_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Outbound = 0,
    Inbound = 1,
}

impl Direction {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Direction::Outbound),
            1 => Some(Direction::Inbound),
            _ => None,
        }
    }

    pub fn id(self) -> u32 {
        self as u32
    }
}

/// Ordered stop sequence and direction shared by trips of one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub route: RouteIdx,
    pub direction: Direction,
    pub stops: Vec<StopIdx>,
}

impl Pattern {
    pub fn stop(&self, stop_index: usize) -> Option<StopIdx> {
        self.stops.get(stop_index).copied()
    }
}

/// Scheduled arrival and departure, in seconds from the start of the
/// service day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTime {
    pub arrival: u32,
    pub departure: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTrip {
    pub id: FeedScopedId,
    pub service_code: ServiceCode,
    pub short_name: Option<String>,
    /// One entry per stop of the owning pattern.
    pub times: Vec<StopTime>,
}

impl ScheduledTrip {
    pub fn num_stops(&self) -> usize {
        self.times.len()
    }

    pub fn scheduled_departure(&self, stop_index: usize) -> Option<u32> {
        self.times.get(stop_index).map(|t| t.departure)
    }

    pub fn scheduled_arrival(&self, stop_index: usize) -> Option<u32> {
        self.times.get(stop_index).map(|t| t.arrival)
    }

    pub fn first_departure(&self) -> Option<u32> {
        self.scheduled_departure(0)
    }

    /// Offsets never decrease along the stop sequence, and each arrival is
    /// no later than its departure.
    pub fn has_monotonic_times(&self) -> bool {
        let mut last = 0;
        for t in &self.times {
            if t.arrival < last || t.departure < t.arrival {
                return false;
            }
            last = t.departure;
        }
        true
    }
}
