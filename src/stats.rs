use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::matcher::MatchOutcome;

/// Per-feed tally of matcher outcomes, one CSV row per sample.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStats {
    pub timestamp: DateTime<Utc>,
    pub feed_id: Option<String>,
    pub total_entities: usize,

    // descriptors seen, by source
    pub descriptors: usize,
    pub from_trip_updates: usize,
    pub from_vehicles: usize,

    // outcomes
    pub already_resolved: usize,
    pub insufficient_data: usize,
    pub unknown_route: usize,
    pub unparseable: usize,
    pub matched: usize,
    pub matched_rollover: usize,
    pub no_match: usize,

    // error tracking
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl MatchStats {
    pub fn new() -> Self {
        MatchStats {
            timestamp: Utc::now(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: &MatchOutcome) {
        self.descriptors += 1;
        match outcome {
            MatchOutcome::AlreadyResolved => self.already_resolved += 1,
            MatchOutcome::InsufficientData => self.insufficient_data += 1,
            MatchOutcome::UnknownRoute => self.unknown_route += 1,
            MatchOutcome::Unparseable => self.unparseable += 1,
            MatchOutcome::Matched {
                rollover: false, ..
            } => self.matched += 1,
            MatchOutcome::Matched { rollover: true, .. } => self.matched_rollover += 1,
            MatchOutcome::NoMatch => self.no_match += 1,
        }
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Share of descriptors lacking a trip id that the matcher resolved.
    pub fn match_rate(&self) -> f64 {
        let attempted = self.descriptors - self.already_resolved;
        Self::pct(self.matched + self.matched_rollover, attempted)
    }

    /// Create an error record with timestamp and error information
    pub fn from_error(error_type: &str, error_message: &str) -> Self {
        MatchStats {
            timestamp: Utc::now(),
            error_type: Some(error_type.to_string()),
            error_message: Some(error_message.to_string()),
            ..Default::default()
        }
    }

    pub fn with_feed_id(mut self, feed_id: &str) -> Self {
        self.feed_id = Some(feed_id.to_string());
        self
    }
}
