//! Static schedule model and the read-only index the trip matcher queries.
//!
//! The index is built once (see [`loader`]) and then only read. Reloads go
//! through [`ScheduleHandle`], which swaps whole snapshots.

mod calendar;
mod handle;
mod ids;
mod index;
pub mod loader;
mod model;
mod time;

pub use calendar::{ServiceCalendar, ServiceSet, WeeklyRule};
pub use handle::ScheduleHandle;
pub use ids::{FeedScopedId, ID_SEPARATOR, PatternIdx, RouteIdx, ServiceCode, StopIdx};
pub use index::{ScheduleIndex, Timetable, TimetableBuilder, TimetableSummary};
pub use model::{Agency, Direction, Pattern, Route, ScheduledTrip, Stop, StopTime};
pub use time::{SECONDS_PER_DAY, ServiceDate, format_service_time, parse_service_time};
