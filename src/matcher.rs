//! Fuzzy matching of real-time trip descriptors to scheduled trips.
//!
//! Some producers publish GTFS-RT updates without a `trip_id`, only the
//! route, direction, start time and start date of the trip. The matcher
//! recovers the scheduled trip from those attributes, or leaves the
//! descriptor untouched when it cannot. It never fails: schedule matching
//! enriches an update but is not required to process it.
//!
//! Searches are first-match-wins in index order (routes, then patterns,
//! then trips, then stops), so results are reproducible for a given index.

use tracing::{debug, trace};

use crate::gtfs_rt::TripDescriptor;
use crate::schedule::{
    Direction, FeedScopedId, RouteIdx, SECONDS_PER_DAY, ScheduleIndex, ScheduledTrip, ServiceDate,
    StopIdx, parse_service_time,
};

/// Why [`FuzzyTripMatcher::resolve`] did or did not change a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The descriptor already had a trip id, even an empty one.
    AlreadyResolved,
    /// Route, direction, start time or start date was missing.
    InsufficientData,
    /// The route id is not in the schedule.
    UnknownRoute,
    /// The start time or start date could not be parsed.
    Unparseable,
    /// A scheduled trip was found. `rollover` is set when it was found on
    /// the previous service day.
    Matched { trip_id: String, rollover: bool },
    /// No scheduled trip fits, on the given day or the day before.
    NoMatch,
}

impl MatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOutcome::AlreadyResolved => "already_resolved",
            MatchOutcome::InsufficientData => "insufficient_data",
            MatchOutcome::UnknownRoute => "unknown_route",
            MatchOutcome::Unparseable => "unparseable",
            MatchOutcome::Matched {
                rollover: false, ..
            } => "matched",
            MatchOutcome::Matched { rollover: true, .. } => "matched_rollover",
            MatchOutcome::NoMatch => "no_match",
        }
    }

    pub fn matched_trip_id(&self) -> Option<&str> {
        match self {
            MatchOutcome::Matched { trip_id, .. } => Some(trip_id),
            _ => None,
        }
    }

    /// Copy of `trip`, with the matched trip id filled in if there is one.
    pub fn apply(&self, trip: &TripDescriptor) -> TripDescriptor {
        let mut resolved = trip.clone();
        if let Some(trip_id) = self.matched_trip_id() {
            resolved.trip_id = Some(trip_id.to_string());
        }
        resolved
    }
}

/// Which scheduled time of a stop to compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeKind {
    Arrival,
    Departure,
}

/// Parameters of [`FuzzyTripMatcher::resolve_by_stop_and_time`].
///
/// Short-name filters that are `None` or empty never exclude a trip, and
/// neither does a trip or route whose own short name is empty.
#[derive(Debug, Clone)]
pub struct StopTimeQuery<'q> {
    pub agency: Option<&'q FeedScopedId>,
    pub stop: StopIdx,
    /// Routes of any other type are always skipped.
    pub route_types: &'q [i32],
    pub trip_short_name: Option<&'q str>,
    pub route_short_name: Option<&'q str>,
    pub direction: Direction,
    /// Seconds since the start of the service day.
    pub time: u32,
    pub date: ServiceDate,
    pub kind: TimeKind,
}

fn is_blank(s: Option<&str>) -> bool {
    s.is_none_or(str::is_empty)
}

/// Both sides must be non-blank for a name to exclude a candidate.
fn short_name_conflicts(filter: Option<&str>, own: Option<&str>) -> bool {
    !is_blank(filter) && !is_blank(own) && filter != own
}

/// Borrows a schedule snapshot and resolves descriptors against it.
///
/// Holds no state of its own, so one matcher can serve many threads as
/// long as the index does.
#[derive(Debug)]
pub struct FuzzyTripMatcher<'a, I: ScheduleIndex + ?Sized> {
    index: &'a I,
}

impl<'a, I: ScheduleIndex + ?Sized> FuzzyTripMatcher<'a, I> {
    pub fn new(index: &'a I) -> Self {
        Self { index }
    }

    /// Returns `trip` with its `trip_id` filled in when a scheduled trip can
    /// be identified, or an unchanged copy otherwise.
    pub fn resolve(&self, feed_id: &str, trip: &TripDescriptor) -> TripDescriptor {
        self.classify(feed_id, trip).apply(trip)
    }

    /// Works out what [`resolve`](Self::resolve) would do with `trip`.
    pub fn classify(&self, feed_id: &str, trip: &TripDescriptor) -> MatchOutcome {
        if trip.trip_id.is_some() {
            return MatchOutcome::AlreadyResolved;
        }

        let (Some(route_id), Some(direction), Some(start_time), Some(start_date)) = (
            trip.route_id.as_deref(),
            trip.direction_id,
            trip.start_time.as_deref(),
            trip.start_date.as_deref(),
        ) else {
            return MatchOutcome::InsufficientData;
        };

        let scoped = FeedScopedId::new(feed_id, route_id);
        let Some(route) = self.index.route_for_scoped_id(&scoped) else {
            debug!(route_id = %scoped, "Route not in schedule");
            return MatchOutcome::UnknownRoute;
        };

        let (Some(time), Some(date)) = (
            parse_service_time(start_time),
            ServiceDate::parse(start_date),
        ) else {
            debug!(start_time, start_date, "Unparseable start time or date");
            return MatchOutcome::Unparseable;
        };

        let Some(direction) = Direction::from_id(direction) else {
            debug!(direction, "Direction is neither 0 nor 1");
            return MatchOutcome::NoMatch;
        };

        if let Some(found) = self.trip_for_start(route, direction, time, date) {
            debug!(route_id = %scoped, trip_id = %found.id, "Matched on service date");
            return MatchOutcome::Matched {
                trip_id: found.id.id.clone(),
                rollover: false,
            };
        }

        // A trip reported at 00:10 may be the 24:10 run of the previous service day.
        let previous = date
            .previous()
            .zip(time.checked_add(SECONDS_PER_DAY))
            .and_then(|(date, time)| self.trip_for_start(route, direction, time, date));
        if let Some(found) = previous {
            debug!(route_id = %scoped, trip_id = %found.id, "Matched on previous service day");
            return MatchOutcome::Matched {
                trip_id: found.id.id.clone(),
                rollover: true,
            };
        }

        debug!(route_id = %scoped, start_time, start_date, "No scheduled trip matches");
        MatchOutcome::NoMatch
    }

    /// First trip of `route` in `direction` whose first departure is
    /// `start_time` and whose service runs on `date`.
    pub fn trip_for_start(
        &self,
        route: RouteIdx,
        direction: Direction,
        start_time: u32,
        date: ServiceDate,
    ) -> Option<&'a ScheduledTrip> {
        let index = self.index;
        let services = index.active_service_codes(date);
        trace!(
            %date,
            direction = direction.id(),
            active = services.len(),
            start_time,
            "Scanning route patterns"
        );

        index
            .patterns_for_route(route)
            .iter()
            .filter(|&&p| index.pattern(p).is_some_and(|p| p.direction == direction))
            .flat_map(|&p| index.trips_for_pattern(p))
            .find(|trip| {
                trip.first_departure() == Some(start_time) && services.contains(trip.service_code)
            })
    }

    /// First trip calling at `query.stop` at exactly `query.time` on
    /// `query.date`, subject to the query's agency, route type, direction
    /// and short-name filters.
    pub fn resolve_by_stop_and_time(&self, query: &StopTimeQuery<'_>) -> Option<&'a ScheduledTrip> {
        let index = self.index;
        let services = index.active_service_codes(query.date);

        for &route_idx in index.routes_serving_stop(query.stop) {
            let Some(route) = index.route(route_idx) else {
                continue;
            };
            if query.agency.is_some_and(|a| *a != route.agency_id) {
                continue;
            }
            if short_name_conflicts(query.route_short_name, Some(route.short_name.as_str())) {
                continue;
            }
            if !query.route_types.contains(&route.route_type) {
                continue;
            }

            for &pattern_idx in index.patterns_for_route(route_idx) {
                let Some(pattern) = index.pattern(pattern_idx) else {
                    continue;
                };
                if pattern.direction != query.direction {
                    continue;
                }

                for trip in index.trips_for_pattern(pattern_idx) {
                    for stop_index in 0..trip.num_stops() {
                        let scheduled = match query.kind {
                            TimeKind::Departure => trip.scheduled_departure(stop_index),
                            TimeKind::Arrival => trip.scheduled_arrival(stop_index),
                        };
                        if scheduled != Some(query.time)
                            || !services.contains(trip.service_code)
                            || pattern.stop(stop_index) != Some(query.stop)
                        {
                            continue;
                        }
                        if short_name_conflicts(query.trip_short_name, trip.short_name.as_deref())
                        {
                            continue;
                        }
                        debug!(trip_id = %trip.id, route_id = %route.id, stop_index, "Matched by stop and time");
                        return Some(trip);
                    }
                }
            }
        }

        debug!(stop = query.stop.0, time = query.time, date = %query.date, "No trip at stop and time");
        None
    }
}
