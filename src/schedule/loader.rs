//! Builds a [`Timetable`] from an unzipped static GTFS directory.

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

use super::calendar::WeeklyRule;
use super::ids::{FeedScopedId, PatternIdx, RouteIdx, StopIdx};
use super::index::Timetable;
use super::model::{Agency, Direction, Route, ScheduledTrip, Stop, StopTime};
use super::time::{ServiceDate, parse_service_time};

#[derive(Debug, Deserialize)]
struct AgencyRecord {
    #[serde(default)]
    agency_id: Option<String>,
    agency_name: String,
}

#[derive(Debug, Deserialize)]
struct StopRecord {
    stop_id: String,
    #[serde(default)]
    stop_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RouteRecord {
    route_id: String,
    #[serde(default)]
    agency_id: Option<String>,
    #[serde(default)]
    route_short_name: Option<String>,
    route_type: i32,
}

#[derive(Debug, Deserialize)]
struct TripRecord {
    route_id: String,
    service_id: String,
    trip_id: String,
    #[serde(default)]
    trip_short_name: Option<String>,
    #[serde(default)]
    direction_id: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StopTimeRecord {
    trip_id: String,
    #[serde(default)]
    arrival_time: Option<String>,
    #[serde(default)]
    departure_time: Option<String>,
    stop_id: String,
    stop_sequence: u32,
}

#[derive(Debug, Deserialize)]
struct CalendarRecord {
    service_id: String,
    monday: u8,
    tuesday: u8,
    wednesday: u8,
    thursday: u8,
    friday: u8,
    saturday: u8,
    sunday: u8,
    start_date: String,
    end_date: String,
}

#[derive(Debug, Deserialize)]
struct CalendarDateRecord {
    service_id: String,
    date: String,
    exception_type: u8,
}

/// Reads every row of `dir/name`. A missing optional file yields no rows.
fn read_records<T: DeserializeOwned>(dir: &Path, name: &str, required: bool) -> Result<Vec<T>> {
    let path = dir.join(name);
    if !path.exists() {
        if required {
            bail!("required GTFS file {} is missing", path.display());
        }
        debug!(file = name, "Optional GTFS file absent");
        return Ok(Vec::new());
    }

    let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let record: T = result.with_context(|| format!("parsing {}", path.display()))?;
        rows.push(record);
    }

    debug!(file = name, rows = rows.len(), "Read GTFS file");
    Ok(rows)
}

fn parse_date(value: &str, file: &str) -> Result<ServiceDate> {
    ServiceDate::parse(value).ok_or_else(|| anyhow!("invalid date '{value}' in {file}"))
}

/// Parses one stop time. A malformed value is logged and treated as untimed.
fn parse_stop_time(trip_id: &str, value: Option<&str>) -> Option<u32> {
    let value = value.filter(|v| !v.is_empty())?;
    let parsed = parse_service_time(value);
    if parsed.is_none() {
        warn!(trip_id, value, "Malformed stop time, treating stop as untimed");
    }
    parsed
}

/// Fills stops lacking both times by linear interpolation between the
/// surrounding timed stops. Returns `None` if the first or last stop is untimed.
fn interpolate(times: &[Option<(u32, u32)>]) -> Option<Vec<StopTime>> {
    let mut out = Vec::with_capacity(times.len());
    let mut i = 0;
    while i < times.len() {
        if let Some((arrival, departure)) = times[i] {
            out.push(StopTime { arrival, departure });
            i += 1;
            continue;
        }

        let prev = out.last()?.departure;
        let next_idx = (i..times.len()).find(|&j| times[j].is_some())?;
        let (next, _) = times[next_idx]?;
        let gap = (next_idx - i + 1) as u32;
        for (k, _) in (i..next_idx).enumerate() {
            let t = prev + next.saturating_sub(prev) * (k as u32 + 1) / gap;
            out.push(StopTime {
                arrival: t,
                departure: t,
            });
        }
        i = next_idx;
    }
    Some(out)
}

/// Loads the static GTFS feed at `dir`, scoping every id with `feed_id`.
///
/// Trips sharing a route, direction, and stop sequence are grouped into one
/// pattern. Within a pattern, trips are ordered by first departure.
#[tracing::instrument(skip(dir), fields(dir = %dir.display()))]
pub fn load_gtfs_dir(dir: &Path, feed_id: &str) -> Result<Timetable> {
    let scoped = |id: &str| FeedScopedId::new(feed_id, id);
    let mut builder = Timetable::builder();

    let agencies: Vec<AgencyRecord> = read_records(dir, "agency.txt", false)?;
    let default_agency = agencies
        .first()
        .and_then(|a| a.agency_id.clone())
        .unwrap_or_default();
    for a in agencies {
        let id = a.agency_id.unwrap_or_else(|| default_agency.clone());
        builder.add_agency(Agency {
            id: scoped(&id),
            name: a.agency_name,
        })?;
    }

    for s in read_records::<StopRecord>(dir, "stops.txt", true)? {
        builder.add_stop(Stop {
            id: scoped(&s.stop_id),
            name: s.stop_name.unwrap_or_default(),
        })?;
    }

    for r in read_records::<RouteRecord>(dir, "routes.txt", true)? {
        let agency = r.agency_id.unwrap_or_else(|| default_agency.clone());
        builder.add_route(Route {
            id: scoped(&r.route_id),
            agency_id: scoped(&agency),
            short_name: r.route_short_name.unwrap_or_default(),
            route_type: r.route_type,
        })?;
    }

    let calendars: Vec<CalendarRecord> = read_records(dir, "calendar.txt", false)?;
    let calendar_dates: Vec<CalendarDateRecord> = read_records(dir, "calendar_dates.txt", false)?;
    if calendars.is_empty() && calendar_dates.is_empty() {
        warn!("Feed has neither calendar.txt nor calendar_dates.txt; no service will be active");
    }

    for c in calendars {
        let code = builder.service_code(&scoped(&c.service_id));
        let weekdays = [
            c.monday, c.tuesday, c.wednesday, c.thursday, c.friday, c.saturday, c.sunday,
        ]
        .iter()
        .enumerate()
        .fold(0u8, |mask, (bit, flag)| {
            if *flag == 1 { mask | (1 << bit) } else { mask }
        });
        let rule = WeeklyRule {
            weekdays,
            start: parse_date(&c.start_date, "calendar.txt")?.date(),
            end: parse_date(&c.end_date, "calendar.txt")?.date(),
        };
        builder.calendar_mut().set_weekly(code, rule);
    }

    for cd in calendar_dates {
        let code = builder.service_code(&scoped(&cd.service_id));
        let date = parse_date(&cd.date, "calendar_dates.txt")?.date();
        match cd.exception_type {
            1 => builder.calendar_mut().add_exception(code, date, true),
            2 => builder.calendar_mut().add_exception(code, date, false),
            other => warn!(service_id = %cd.service_id, exception_type = other, "Unknown exception type ignored"),
        }
    }

    let mut stop_times: HashMap<String, Vec<StopTimeRecord>> = HashMap::new();
    for st in read_records::<StopTimeRecord>(dir, "stop_times.txt", true)? {
        stop_times.entry(st.trip_id.clone()).or_default().push(st);
    }

    let mut pattern_by_key: HashMap<(RouteIdx, Direction, Vec<StopIdx>), PatternIdx> =
        HashMap::new();
    let mut pending: Vec<(PatternIdx, ScheduledTrip)> = Vec::new();
    let mut skipped = 0usize;

    for t in read_records::<TripRecord>(dir, "trips.txt", true)? {
        let route_id = scoped(&t.route_id);
        let route = builder
            .route_for_scoped_id(&route_id)
            .ok_or_else(|| anyhow!("trip {} refers to unknown route {}", t.trip_id, route_id))?;

        let Some(mut calls) = stop_times.remove(&t.trip_id) else {
            warn!(trip_id = %t.trip_id, "Trip has no stop times, skipping");
            skipped += 1;
            continue;
        };
        calls.sort_by_key(|st| st.stop_sequence);

        let mut stops = Vec::with_capacity(calls.len());
        let mut raw_times = Vec::with_capacity(calls.len());
        for st in &calls {
            let stop_id = scoped(&st.stop_id);
            let stop = builder.stop_for_scoped_id(&stop_id).ok_or_else(|| {
                anyhow!("stop_times.txt refers to unknown stop {}", stop_id)
            })?;
            stops.push(stop);

            let arrival = parse_stop_time(&t.trip_id, st.arrival_time.as_deref());
            let departure = parse_stop_time(&t.trip_id, st.departure_time.as_deref());
            raw_times.push(match (arrival, departure) {
                (Some(a), Some(d)) => Some((a, d)),
                (Some(a), None) => Some((a, a)),
                (None, Some(d)) => Some((d, d)),
                (None, None) => None,
            });
        }

        let Some(times) = interpolate(&raw_times) else {
            warn!(trip_id = %t.trip_id, "Trip has untimed first or last stop, skipping");
            skipped += 1;
            continue;
        };

        let trip = ScheduledTrip {
            id: scoped(&t.trip_id),
            service_code: builder.service_code(&scoped(&t.service_id)),
            short_name: t.trip_short_name.filter(|s| !s.is_empty()),
            times,
        };
        if !trip.has_monotonic_times() {
            warn!(trip_id = %t.trip_id, "Trip has decreasing stop times, skipping");
            skipped += 1;
            continue;
        }

        let direction = match t.direction_id {
            Some(1) => Direction::Inbound,
            _ => Direction::Outbound,
        };
        let key = (route, direction, stops);
        let pattern = match pattern_by_key.get(&key) {
            Some(p) => *p,
            None => {
                let p = builder.add_pattern(key.0, key.1, key.2.clone())?;
                pattern_by_key.insert(key, p);
                p
            }
        };

        pending.push((pattern, trip));
    }

    if !stop_times.is_empty() {
        warn!(
            orphan_trips = stop_times.len(),
            "Stop times defined for unknown trips"
        );
    }

    // Stable: equal first departures keep file order.
    pending.sort_by_key(|(pattern, trip)| (*pattern, trip.first_departure()));
    for (pattern, trip) in pending {
        builder
            .add_trip(pattern, trip)
            .with_context(|| format!("loading trips of {}", dir.display()))?;
    }

    let timetable = builder.build();
    let summary = timetable.summary();
    info!(
        feed_id,
        agencies = summary.agencies,
        stops = summary.stops,
        routes = summary.routes,
        patterns = summary.patterns,
        trips = summary.trips,
        services = summary.services,
        skipped,
        "Static schedule loaded"
    );
    Ok(timetable)
}
