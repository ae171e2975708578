//! The read-only schedule index contract and its in-memory snapshot.

use anyhow::{Result, bail};
use std::collections::{HashMap, HashSet};

use super::calendar::{ServiceCalendar, ServiceSet};
use super::ids::{FeedScopedId, PatternIdx, RouteIdx, ServiceCode, StopIdx};
use super::model::{Agency, Direction, Pattern, Route, ScheduledTrip, Stop};
use super::time::ServiceDate;

/// Lookups the trip matcher needs from a static schedule.
///
/// Implementations are immutable snapshots; a reload publishes a new
/// snapshot instead of mutating an existing one.
pub trait ScheduleIndex: Send + Sync {
    fn route_for_scoped_id(&self, id: &FeedScopedId) -> Option<RouteIdx>;

    fn route(&self, route: RouteIdx) -> Option<&Route>;

    /// Patterns of `route`, in index order.
    fn patterns_for_route(&self, route: RouteIdx) -> &[PatternIdx];

    fn pattern(&self, pattern: PatternIdx) -> Option<&Pattern>;

    /// Scheduled trips of `pattern`, in timetable order.
    fn trips_for_pattern(&self, pattern: PatternIdx) -> &[ScheduledTrip];

    fn stop_for_scoped_id(&self, id: &FeedScopedId) -> Option<StopIdx>;

    fn stop(&self, stop: StopIdx) -> Option<&Stop>;

    /// Routes with at least one pattern calling at `stop`, in index order.
    fn routes_serving_stop(&self, stop: StopIdx) -> &[RouteIdx];

    fn agency_for_scoped_id(&self, id: &FeedScopedId) -> Option<&Agency>;

    /// Service codes operating on `date`.
    fn active_service_codes(&self, date: ServiceDate) -> ServiceSet;
}

/// Entity counts of a [`Timetable`], for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimetableSummary {
    pub agencies: usize,
    pub stops: usize,
    pub routes: usize,
    pub patterns: usize,
    pub trips: usize,
    pub services: usize,
}

/// Immutable in-memory schedule snapshot. Built with [`TimetableBuilder`].
#[derive(Debug, Default)]
pub struct Timetable {
    agencies: Vec<Agency>,
    agency_by_id: HashMap<FeedScopedId, usize>,
    stops: Vec<Stop>,
    stop_by_id: HashMap<FeedScopedId, StopIdx>,
    routes: Vec<Route>,
    route_by_id: HashMap<FeedScopedId, RouteIdx>,
    patterns: Vec<Pattern>,
    pattern_trips: Vec<Vec<ScheduledTrip>>,
    route_patterns: Vec<Vec<PatternIdx>>,
    stop_routes: Vec<Vec<RouteIdx>>,
    calendar: ServiceCalendar,
}

impl Timetable {
    pub fn builder() -> TimetableBuilder {
        TimetableBuilder::default()
    }

    pub fn summary(&self) -> TimetableSummary {
        TimetableSummary {
            agencies: self.agencies.len(),
            stops: self.stops.len(),
            routes: self.routes.len(),
            patterns: self.patterns.len(),
            trips: self.pattern_trips.iter().map(Vec::len).sum(),
            services: self.calendar.service_count(),
        }
    }
}

impl ScheduleIndex for Timetable {
    fn route_for_scoped_id(&self, id: &FeedScopedId) -> Option<RouteIdx> {
        self.route_by_id.get(id).copied()
    }

    fn route(&self, route: RouteIdx) -> Option<&Route> {
        self.routes.get(route.index())
    }

    fn patterns_for_route(&self, route: RouteIdx) -> &[PatternIdx] {
        self.route_patterns
            .get(route.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn pattern(&self, pattern: PatternIdx) -> Option<&Pattern> {
        self.patterns.get(pattern.index())
    }

    fn trips_for_pattern(&self, pattern: PatternIdx) -> &[ScheduledTrip] {
        self.pattern_trips
            .get(pattern.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn stop_for_scoped_id(&self, id: &FeedScopedId) -> Option<StopIdx> {
        self.stop_by_id.get(id).copied()
    }

    fn stop(&self, stop: StopIdx) -> Option<&Stop> {
        self.stops.get(stop.index())
    }

    fn routes_serving_stop(&self, stop: StopIdx) -> &[RouteIdx] {
        self.stop_routes
            .get(stop.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn agency_for_scoped_id(&self, id: &FeedScopedId) -> Option<&Agency> {
        self.agency_by_id.get(id).map(|&i| &self.agencies[i])
    }

    fn active_service_codes(&self, date: ServiceDate) -> ServiceSet {
        self.calendar.active_services(date)
    }
}

/// Accumulates schedule entities and checks their invariants before
/// freezing them into a [`Timetable`].
#[derive(Debug, Default)]
pub struct TimetableBuilder {
    timetable: Timetable,
    service_by_id: HashMap<FeedScopedId, ServiceCode>,
    trip_ids: HashSet<FeedScopedId>,
}

impl TimetableBuilder {
    pub fn add_agency(&mut self, agency: Agency) -> Result<()> {
        let t = &mut self.timetable;
        if t.agency_by_id.contains_key(&agency.id) {
            bail!("duplicate agency {}", agency.id);
        }
        t.agency_by_id.insert(agency.id.clone(), t.agencies.len());
        t.agencies.push(agency);
        Ok(())
    }

    pub fn add_stop(&mut self, stop: Stop) -> Result<StopIdx> {
        let t = &mut self.timetable;
        if t.stop_by_id.contains_key(&stop.id) {
            bail!("duplicate stop {}", stop.id);
        }
        let idx = StopIdx(t.stops.len() as u32);
        t.stop_by_id.insert(stop.id.clone(), idx);
        t.stops.push(stop);
        t.stop_routes.push(Vec::new());
        Ok(idx)
    }

    pub fn add_route(&mut self, route: Route) -> Result<RouteIdx> {
        let t = &mut self.timetable;
        if t.route_by_id.contains_key(&route.id) {
            bail!("duplicate route {}", route.id);
        }
        let idx = RouteIdx(t.routes.len() as u32);
        t.route_by_id.insert(route.id.clone(), idx);
        t.routes.push(route);
        t.route_patterns.push(Vec::new());
        Ok(idx)
    }

    /// Returns the dense code for `service_id`, assigning the next free one
    /// on first sight.
    pub fn service_code(&mut self, service_id: &FeedScopedId) -> ServiceCode {
        if let Some(code) = self.service_by_id.get(service_id) {
            return *code;
        }
        let code = ServiceCode(self.service_by_id.len() as u32);
        self.service_by_id.insert(service_id.clone(), code);
        self.timetable.calendar.register(code);
        code
    }

    pub fn calendar_mut(&mut self) -> &mut ServiceCalendar {
        &mut self.timetable.calendar
    }

    pub fn stop_for_scoped_id(&self, id: &FeedScopedId) -> Option<StopIdx> {
        self.timetable.stop_for_scoped_id(id)
    }

    pub fn route_for_scoped_id(&self, id: &FeedScopedId) -> Option<RouteIdx> {
        self.timetable.route_for_scoped_id(id)
    }

    pub fn add_pattern(
        &mut self,
        route: RouteIdx,
        direction: Direction,
        stops: Vec<StopIdx>,
    ) -> Result<PatternIdx> {
        let t = &mut self.timetable;
        if route.index() >= t.routes.len() {
            bail!("pattern refers to unknown route index {}", route.0);
        }
        if let Some(bad) = stops.iter().find(|s| s.index() >= t.stops.len()) {
            bail!("pattern refers to unknown stop index {}", bad.0);
        }

        let idx = PatternIdx(t.patterns.len() as u32);
        for stop in &stops {
            let serving = &mut t.stop_routes[stop.index()];
            if !serving.contains(&route) {
                serving.push(route);
            }
        }
        t.route_patterns[route.index()].push(idx);
        t.patterns.push(Pattern {
            route,
            direction,
            stops,
        });
        t.pattern_trips.push(Vec::new());
        Ok(idx)
    }

    pub fn add_trip(&mut self, pattern: PatternIdx, trip: ScheduledTrip) -> Result<()> {
        let t = &mut self.timetable;
        let Some(p) = t.patterns.get(pattern.index()) else {
            bail!("trip {} refers to unknown pattern index {}", trip.id, pattern.0);
        };
        if trip.times.len() != p.stops.len() {
            bail!(
                "trip {} has {} stop times but its pattern has {} stops",
                trip.id,
                trip.times.len(),
                p.stops.len()
            );
        }
        if !trip.has_monotonic_times() {
            bail!("trip {} has decreasing stop times", trip.id);
        }
        if !self.trip_ids.insert(trip.id.clone()) {
            bail!("duplicate trip {}", trip.id);
        }
        t.calendar.register(trip.service_code);
        t.pattern_trips[pattern.index()].push(trip);
        Ok(())
    }

    pub fn build(self) -> Timetable {
        self.timetable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::model::StopTime;

    fn id(s: &str) -> FeedScopedId {
        FeedScopedId::new("f", s)
    }

    fn route(name: &str) -> Route {
        Route {
            id: id(name),
            agency_id: id("agency"),
            short_name: name.to_string(),
            route_type: 3,
        }
    }

    fn stop(name: &str) -> Stop {
        Stop {
            id: id(name),
            name: name.to_string(),
        }
    }

    fn trip(name: &str, times: &[u32]) -> ScheduledTrip {
        ScheduledTrip {
            id: id(name),
            service_code: ServiceCode(0),
            short_name: None,
            times: times
                .iter()
                .map(|&t| StopTime {
                    arrival: t,
                    departure: t,
                })
                .collect(),
        }
    }

    #[test]
    fn test_routes_serving_stop_in_first_seen_order() {
        let mut b = Timetable::builder();
        let a = b.add_stop(stop("A")).unwrap();
        let c = b.add_stop(stop("C")).unwrap();
        let r2 = b.add_route(route("2")).unwrap();
        let r1 = b.add_route(route("1")).unwrap();
        b.add_pattern(r1, Direction::Outbound, vec![a, c]).unwrap();
        b.add_pattern(r2, Direction::Outbound, vec![a]).unwrap();
        b.add_pattern(r1, Direction::Inbound, vec![c, a]).unwrap();
        let t = b.build();

        assert_eq!(t.routes_serving_stop(a), &[r1, r2]);
        assert_eq!(t.routes_serving_stop(c), &[r1]);
        assert_eq!(t.patterns_for_route(r1).len(), 2);
        assert_eq!(t.patterns_for_route(r2).len(), 1);
    }

    #[test]
    fn test_add_trip_rejects_length_mismatch() {
        let mut b = Timetable::builder();
        let a = b.add_stop(stop("A")).unwrap();
        let r = b.add_route(route("1")).unwrap();
        let p = b.add_pattern(r, Direction::Outbound, vec![a]).unwrap();
        assert!(b.add_trip(p, trip("t1", &[10, 20])).is_err());
        assert!(b.add_trip(p, trip("t1", &[10])).is_ok());
    }

    #[test]
    fn test_add_trip_rejects_decreasing_times() {
        let mut b = Timetable::builder();
        let a = b.add_stop(stop("A")).unwrap();
        let c = b.add_stop(stop("C")).unwrap();
        let r = b.add_route(route("1")).unwrap();
        let p = b.add_pattern(r, Direction::Outbound, vec![a, c]).unwrap();
        assert!(b.add_trip(p, trip("t1", &[100, 50])).is_err());
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let mut b = Timetable::builder();
        b.add_stop(stop("A")).unwrap();
        assert!(b.add_stop(stop("A")).is_err());
        b.add_route(route("1")).unwrap();
        assert!(b.add_route(route("1")).is_err());
    }

    #[test]
    fn test_service_codes_are_dense() {
        let mut b = Timetable::builder();
        let wk = b.service_code(&id("weekday"));
        let sa = b.service_code(&id("saturday"));
        assert_eq!(wk, ServiceCode(0));
        assert_eq!(sa, ServiceCode(1));
        assert_eq!(b.service_code(&id("weekday")), wk);
        assert_eq!(b.build().summary().services, 2);
    }

    #[test]
    fn test_agency_and_stop_lookups() {
        let mut b = Timetable::builder();
        b.add_agency(Agency {
            id: id("agency"),
            name: "Metro".to_string(),
        })
        .unwrap();
        let a = b.add_stop(stop("A")).unwrap();
        let t = b.build();

        assert_eq!(t.agency_for_scoped_id(&id("agency")).unwrap().name, "Metro");
        assert!(t.agency_for_scoped_id(&FeedScopedId::new("g", "agency")).is_none());
        assert_eq!(t.stop(a).unwrap().name, "A");
        assert_eq!(t.stop_for_scoped_id(&id("A")), Some(a));
        assert!(t.stop(StopIdx(5)).is_none());
    }

    #[test]
    fn test_unknown_handles_yield_empty_lookups() {
        let t = Timetable::builder().build();
        assert!(t.route(RouteIdx(3)).is_none());
        assert!(t.patterns_for_route(RouteIdx(3)).is_empty());
        assert!(t.trips_for_pattern(PatternIdx(0)).is_empty());
        assert!(t.routes_serving_stop(StopIdx(9)).is_empty());
    }
}
