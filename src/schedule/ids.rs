//! Feed-scoped identifiers and dense index handles.

use std::fmt;

/// Separator between the feed id and the entity id in a scoped id.
pub const ID_SEPARATOR: &str = ":";

/// An entity id qualified by the feed it was loaded from.
///
/// Two feeds may reuse the same raw `route_id` or `trip_id`, so every id
/// that crosses the index boundary carries its feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedScopedId {
    pub feed_id: String,
    pub id: String,
}

impl FeedScopedId {
    pub fn new(feed_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            feed_id: feed_id.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for FeedScopedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.feed_id, ID_SEPARATOR, self.id)
    }
}

macro_rules! dense_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

dense_index!(
    /// Position of a route in the index's route table.
    RouteIdx
);
dense_index!(
    /// Position of a pattern in the index's pattern table.
    PatternIdx
);
dense_index!(
    /// Position of a stop in the index's stop table.
    StopIdx
);
dense_index!(
    /// Dense service code assigned to one calendar rule at build time.
    /// Doubles as the bit position in a [`ServiceSet`](super::ServiceSet).
    ServiceCode
);
