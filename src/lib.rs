pub mod feed;
pub mod fetch;
pub mod matcher;
pub mod output;
pub mod parser;
pub mod schedule;
pub mod stats;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
