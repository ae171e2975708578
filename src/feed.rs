//! Runs the matcher over every trip descriptor of a decoded feed.

use serde::Serialize;
use tracing::debug;

use crate::gtfs_rt::{FeedMessage, TripDescriptor};
use crate::matcher::{FuzzyTripMatcher, MatchOutcome};
use crate::schedule::ScheduleIndex;
use crate::stats::MatchStats;

/// Where in a feed entity a descriptor was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorSource {
    TripUpdate,
    Vehicle,
}

/// One resolved descriptor, as written to the details CSV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRow {
    pub entity_id: String,
    pub source: DescriptorSource,
    pub route_id: Option<String>,
    pub direction_id: Option<u32>,
    pub start_time: Option<String>,
    pub start_date: Option<String>,
    pub outcome: &'static str,
    pub trip_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct FeedResolution {
    pub stats: MatchStats,
    pub rows: Vec<ResolvedRow>,
}

fn resolve_descriptor<I: ScheduleIndex + ?Sized>(
    matcher: &FuzzyTripMatcher<'_, I>,
    feed_id: &str,
    entity_id: &str,
    source: DescriptorSource,
    trip: &mut TripDescriptor,
    out: &mut FeedResolution,
) {
    let outcome = matcher.classify(feed_id, trip);
    out.stats.record(&outcome);
    out.rows.push(ResolvedRow {
        entity_id: entity_id.to_string(),
        source,
        route_id: trip.route_id.clone(),
        direction_id: trip.direction_id,
        start_time: trip.start_time.clone(),
        start_date: trip.start_date.clone(),
        outcome: outcome.as_str(),
        trip_id: outcome
            .matched_trip_id()
            .map(str::to_string)
            .or_else(|| trip.trip_id.clone()),
    });
    if let MatchOutcome::Matched { .. } = outcome {
        *trip = outcome.apply(trip);
    }
}

/// Resolves the descriptors of all trip updates and vehicle positions in
/// `feed` in place. Descriptors that cannot be matched are left as they were.
pub fn resolve_feed<I: ScheduleIndex + ?Sized>(
    matcher: &FuzzyTripMatcher<'_, I>,
    feed_id: &str,
    feed: &mut FeedMessage,
) -> FeedResolution {
    let mut out = FeedResolution {
        stats: MatchStats::new().with_feed_id(feed_id),
        rows: Vec::new(),
    };
    out.stats.total_entities = feed.entity.len();

    for entity in &mut feed.entity {
        if let Some(update) = &mut entity.trip_update {
            out.stats.from_trip_updates += 1;
            resolve_descriptor(
                matcher,
                feed_id,
                &entity.id,
                DescriptorSource::TripUpdate,
                &mut update.trip,
                &mut out,
            );
        }

        if let Some(trip) = entity.vehicle.as_mut().and_then(|v| v.trip.as_mut()) {
            out.stats.from_vehicles += 1;
            resolve_descriptor(
                matcher,
                feed_id,
                &entity.id,
                DescriptorSource::Vehicle,
                trip,
                &mut out,
            );
        }
    }

    debug!(
        feed_id,
        descriptors = out.stats.descriptors,
        matched = out.stats.matched + out.stats.matched_rollover,
        "Feed resolved"
    );
    out
}
