use gtfs_rt_matcher::feed::resolve_feed;
use gtfs_rt_matcher::gtfs_rt::{
    FeedEntity, FeedHeader, FeedMessage, TripDescriptor, TripUpdate, VehiclePosition,
};
use gtfs_rt_matcher::matcher::{FuzzyTripMatcher, MatchOutcome, StopTimeQuery, TimeKind};
use gtfs_rt_matcher::parser::parse_feed;
use gtfs_rt_matcher::schedule::loader::load_gtfs_dir;
use gtfs_rt_matcher::schedule::{
    Direction, FeedScopedId, ScheduleHandle, ScheduleIndex, ServiceDate, Timetable,
};
use prost::Message;
use std::path::Path;
use std::sync::Arc;

const FEED: &str = "metro";

fn fixture() -> Timetable {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/gtfs");
    load_gtfs_dir(&dir, FEED).expect("Failed to load fixture feed")
}

fn descriptor(route: &str, direction: u32, start: &str, date: &str) -> TripDescriptor {
    TripDescriptor {
        route_id: Some(route.to_string()),
        direction_id: Some(direction),
        start_time: Some(start.to_string()),
        start_date: Some(date.to_string()),
        ..Default::default()
    }
}

fn resolved_id(timetable: &Timetable, d: &TripDescriptor) -> Option<String> {
    FuzzyTripMatcher::new(timetable).resolve(FEED, d).trip_id
}

#[test]
fn test_fixture_loads() {
    let summary = fixture().summary();
    assert_eq!(summary.agencies, 1);
    assert_eq!(summary.stops, 4);
    assert_eq!(summary.routes, 2);
    assert_eq!(summary.patterns, 4);
    assert_eq!(summary.trips, 7);
    assert_eq!(summary.services, 2);
}

#[test]
fn test_resolves_weekday_and_weekend_trips() {
    let t = fixture();

    // 2024-03-15 is a Friday, 2024-03-16 a Saturday
    let weekday = descriptor("R10", 0, "08:00:00", "20240315");
    assert_eq!(resolved_id(&t, &weekday).as_deref(), Some("R10-0800"));

    let weekend = descriptor("R10", 0, "08:00:00", "20240316");
    assert_eq!(resolved_id(&t, &weekend).as_deref(), Some("R10-0800-WE"));

    let inbound = descriptor("R10", 1, "08:15:00", "20240315");
    assert_eq!(resolved_id(&t, &inbound).as_deref(), Some("R10-0815-IN"));
}

#[test]
fn test_calendar_exceptions_apply() {
    let t = fixture();
    // Weekday service is removed and weekend service added on 2024-07-04.
    let holiday = descriptor("R10", 0, "08:00:00", "20240704");
    assert_eq!(resolved_id(&t, &holiday).as_deref(), Some("R10-0800-WE"));

    let later = descriptor("R10", 0, "08:30:00", "20240704");
    assert_eq!(resolved_id(&t, &later), None);
}

#[test]
fn test_after_midnight_trip_resolves_through_previous_day() {
    let t = fixture();
    let matcher = FuzzyTripMatcher::new(&t);

    // R10-2410 runs at 24:10 on Friday's service day.
    let d = descriptor("R10", 0, "00:10:00", "20240316");
    assert_eq!(
        matcher.classify(FEED, &d),
        MatchOutcome::Matched {
            trip_id: "R10-2410".to_string(),
            rollover: true,
        }
    );

    let conventional = descriptor("R10", 0, "24:10:00", "20240315");
    assert_eq!(resolved_id(&t, &conventional).as_deref(), Some("R10-2410"));

    // Saturday has no 24:10 weekday run to roll into Sunday.
    let sunday = descriptor("R10", 0, "00:10:00", "20240317");
    assert_eq!(matcher.classify(FEED, &sunday), MatchOutcome::NoMatch);
}

#[test]
fn test_interpolated_stop_time_is_searchable() {
    let t = fixture();
    let mkt = t
        .stop_for_scoped_id(&FeedScopedId::new(FEED, "MKT"))
        .unwrap();
    let query = StopTimeQuery {
        agency: None,
        stop: mkt,
        route_types: &[3],
        trip_short_name: None,
        route_short_name: None,
        direction: Direction::Outbound,
        // halfway between 24:10 and 24:30
        time: 24 * 3600 + 20 * 60,
        date: ServiceDate::parse("20240315").unwrap(),
        kind: TimeKind::Departure,
    };
    let trip = FuzzyTripMatcher::new(&t).resolve_by_stop_and_time(&query);
    assert_eq!(trip.map(|t| t.id.id.as_str()), Some("R10-2410"));
}

#[test]
fn test_stop_and_time_lookup() {
    let t = fixture();
    let matcher = FuzzyTripMatcher::new(&t);
    let stop = |id: &str| t.stop_for_scoped_id(&FeedScopedId::new(FEED, id)).unwrap();
    let agency = FeedScopedId::new(FEED, "MTA");

    let base = StopTimeQuery {
        agency: Some(&agency),
        stop: stop("MKT"),
        route_types: &[3],
        trip_short_name: None,
        route_short_name: Some("10"),
        direction: Direction::Outbound,
        time: 8 * 3600 + 10 * 60,
        date: ServiceDate::parse("20240315").unwrap(),
        kind: TimeKind::Departure,
    };
    let found = matcher.resolve_by_stop_and_time(&base).unwrap();
    assert_eq!(found.id.id, "R10-0800");

    let arrival = StopTimeQuery {
        time: 8 * 3600 + 9 * 60,
        kind: TimeKind::Arrival,
        ..base.clone()
    };
    assert_eq!(
        matcher.resolve_by_stop_and_time(&arrival).unwrap().id.id,
        "R10-0800"
    );

    let airport = StopTimeQuery {
        stop: stop("AIR"),
        route_types: &[2],
        route_short_name: None,
        time: 9 * 3600 + 15 * 60,
        kind: TimeKind::Arrival,
        ..base.clone()
    };
    assert_eq!(
        matcher.resolve_by_stop_and_time(&airport).unwrap().id.id,
        "L1-101"
    );

    let by_short_name = StopTimeQuery {
        trip_short_name: Some("103"),
        ..airport.clone()
    };
    assert_eq!(
        matcher.resolve_by_stop_and_time(&by_short_name).unwrap().id.id,
        "L1-103"
    );

    let wrong_type = StopTimeQuery {
        route_types: &[3],
        ..airport
    };
    assert!(matcher.resolve_by_stop_and_time(&wrong_type).is_none());
}

#[test]
fn test_full_pipeline() {
    let t = fixture();
    let feed = FeedMessage {
        header: FeedHeader {
            gtfs_realtime_version: "2.0".to_string(),
            timestamp: Some(1710489600),
            incrementality: None,
            feed_version: None,
        },
        entity: vec![
            FeedEntity {
                id: "1".to_string(),
                trip_update: Some(TripUpdate {
                    trip: descriptor("R10", 0, "08:30:00", "20240315"),
                    ..Default::default()
                }),
                ..Default::default()
            },
            FeedEntity {
                id: "2".to_string(),
                vehicle: Some(VehiclePosition {
                    trip: Some(descriptor("R10", 0, "00:10:00", "20240316")),
                    ..Default::default()
                }),
                ..Default::default()
            },
            FeedEntity {
                id: "3".to_string(),
                trip_update: Some(TripUpdate {
                    trip: TripDescriptor {
                        trip_id: Some("L1-101".to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                ..Default::default()
            },
            FeedEntity {
                id: "4".to_string(),
                trip_update: Some(TripUpdate {
                    trip: descriptor("X99", 0, "08:30:00", "20240315"),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ],
    };

    let bytes = feed.encode_to_vec();
    let mut parsed = parse_feed(&bytes).expect("Failed to parse feed");
    let result = resolve_feed(&FuzzyTripMatcher::new(&t), FEED, &mut parsed);

    assert_eq!(result.stats.total_entities, 4);
    assert_eq!(result.stats.descriptors, 4);
    assert_eq!(result.stats.matched, 1);
    assert_eq!(result.stats.matched_rollover, 1);
    assert_eq!(result.stats.already_resolved, 1);
    assert_eq!(result.stats.unknown_route, 1);

    let trip_id = |i: usize| {
        let e = &parsed.entity[i];
        e.trip_update
            .as_ref()
            .map(|u| &u.trip)
            .or_else(|| e.vehicle.as_ref().and_then(|v| v.trip.as_ref()))
            .and_then(|d| d.trip_id.clone())
    };
    assert_eq!(trip_id(0).as_deref(), Some("R10-0830"));
    assert_eq!(trip_id(1).as_deref(), Some("R10-2410"));
    assert_eq!(trip_id(2).as_deref(), Some("L1-101"));
    assert_eq!(trip_id(3), None);
}

#[test]
fn test_concurrent_matching_across_reload() {
    let handle = Arc::new(ScheduleHandle::new(fixture()));
    let d = descriptor("R10", 0, "08:00:00", "20240315");

    std::thread::scope(|s| {
        for _ in 0..4 {
            let handle = Arc::clone(&handle);
            let d = d.clone();
            s.spawn(move || {
                for _ in 0..50 {
                    let snapshot = handle.snapshot();
                    let id = FuzzyTripMatcher::new(snapshot.as_ref())
                        .resolve(FEED, &d)
                        .trip_id;
                    assert_eq!(id.as_deref(), Some("R10-0800"));
                }
            });
        }
        s.spawn(|| {
            for _ in 0..3 {
                handle.publish(fixture());
            }
        });
    });
}
