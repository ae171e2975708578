//! Service calendars and the active-service bit vector.

use chrono::{Datelike, NaiveDate};
use std::collections::BTreeSet;

use super::ids::ServiceCode;
use super::time::ServiceDate;

const WORD_BITS: usize = u64::BITS as usize;

/// Fixed-size bit vector of service codes.
///
/// Bit `n` is set when service code `n` operates. Codes beyond the
/// vector's capacity read as inactive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceSet {
    words: Vec<u64>,
}

impl ServiceSet {
    pub fn with_capacity(service_count: usize) -> Self {
        Self {
            words: vec![0; service_count.div_ceil(WORD_BITS)],
        }
    }

    /// Sets the bit for `code`, growing the vector if needed.
    pub fn insert(&mut self, code: ServiceCode) {
        let (word, bit) = (code.index() / WORD_BITS, code.index() % WORD_BITS);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << bit;
    }

    pub fn contains(&self, code: ServiceCode) -> bool {
        let (word, bit) = (code.index() / WORD_BITS, code.index() % WORD_BITS);
        self.words
            .get(word)
            .is_some_and(|w| w & (1 << bit) != 0)
    }

    /// Number of active services.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }
}

/// Weekly operating rule, as found in GTFS `calendar.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyRule {
    /// Monday is bit 0, Sunday bit 6.
    pub weekdays: u8,
    pub start: NaiveDate,
    /// Inclusive.
    pub end: NaiveDate,
}

impl WeeklyRule {
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        let bit = date.weekday().num_days_from_monday();
        date >= self.start && date <= self.end && self.weekdays & (1 << bit) != 0
    }
}

#[derive(Debug, Clone, Default)]
struct ServiceRule {
    weekly: Option<WeeklyRule>,
    added: BTreeSet<NaiveDate>,
    removed: BTreeSet<NaiveDate>,
}

impl ServiceRule {
    fn is_active(&self, date: NaiveDate) -> bool {
        if self.removed.contains(&date) {
            return false;
        }
        self.added.contains(&date) || self.weekly.as_ref().is_some_and(|w| w.runs_on(date))
    }
}

/// Maps every service code to the dates it operates on.
#[derive(Debug, Clone, Default)]
pub struct ServiceCalendar {
    rules: Vec<ServiceRule>,
}

impl ServiceCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of service codes known to the calendar.
    pub fn service_count(&self) -> usize {
        self.rules.len()
    }

    fn rule_mut(&mut self, code: ServiceCode) -> &mut ServiceRule {
        if code.index() >= self.rules.len() {
            self.rules.resize_with(code.index() + 1, ServiceRule::default);
        }
        &mut self.rules[code.index()]
    }

    pub fn set_weekly(&mut self, code: ServiceCode, rule: WeeklyRule) {
        self.rule_mut(code).weekly = Some(rule);
    }

    /// Records a `calendar_dates.txt` exception. An added date operates even
    /// outside the weekly rule; a removed date never operates.
    pub fn add_exception(&mut self, code: ServiceCode, date: NaiveDate, added: bool) {
        let rule = self.rule_mut(code);
        if added {
            rule.removed.remove(&date);
            rule.added.insert(date);
        } else {
            rule.added.remove(&date);
            rule.removed.insert(date);
        }
    }

    /// Ensures `code` exists even if it has no dates yet.
    pub fn register(&mut self, code: ServiceCode) {
        self.rule_mut(code);
    }

    /// Set of service codes operating on `date`.
    pub fn active_services(&self, date: ServiceDate) -> ServiceSet {
        let mut set = ServiceSet::with_capacity(self.rules.len());
        for (code, rule) in self.rules.iter().enumerate() {
            if rule.is_active(date.date()) {
                set.insert(ServiceCode(code as u32));
            }
        }
        set
    }
}
