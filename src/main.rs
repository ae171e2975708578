//! CLI entry point for the GTFS-RT trip matcher.
//!
//! Provides subcommands for resolving the trip descriptors of one feed
//! snapshot, polling a feed continuously, and looking up a scheduled trip
//! by stop and time.

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use gtfs_rt_matcher::feed::resolve_feed;
use gtfs_rt_matcher::fetch::auth::{ApiKey, UrlParam};
use gtfs_rt_matcher::fetch::{BasicClient, HttpClient, fetch_bytes};
use gtfs_rt_matcher::matcher::{FuzzyTripMatcher, StopTimeQuery, TimeKind};
use gtfs_rt_matcher::output::{append_record, print_json, write_resolved};
use gtfs_rt_matcher::parser::parse_feed;
use gtfs_rt_matcher::schedule::loader::load_gtfs_dir;
use gtfs_rt_matcher::schedule::{
    Direction, FeedScopedId, ScheduleHandle, ScheduleIndex, ServiceDate, format_service_time,
    parse_service_time,
};
use gtfs_rt_matcher::stats::MatchStats;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_rt_matcher")]
#[command(about = "Recover missing trip ids in GTFS-RT feeds from the static schedule", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Static schedule to match against.
#[derive(Args, Clone)]
struct ScheduleArgs {
    /// Directory containing the unzipped static GTFS feed
    #[arg(short, long, value_name = "DIR")]
    gtfs: PathBuf,

    /// Feed id used to scope route and trip ids
    #[arg(short, long)]
    feed_id: String,
}

/// Feed credentials. The key itself is read from `FEED_API_KEY`.
#[derive(Args, Clone)]
struct AuthArgs {
    /// Send the API key in this HTTP header
    #[arg(long, conflicts_with = "api_key_param")]
    api_key_header: Option<String>,

    /// Send the API key as this URL query parameter
    #[arg(long)]
    api_key_param: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the trip descriptors of a GTFS-RT feed from a file or URL
    Resolve {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        #[command(flatten)]
        schedule: ScheduleArgs,

        #[command(flatten)]
        auth: AuthArgs,

        /// CSV file to append match statistics to
        #[arg(short, long, default_value = "match_stats.csv")]
        output: String,

        /// Optional: CSV file to append one row per descriptor to
        #[arg(long)]
        details: Option<String>,
    },
    /// Poll a GTFS-RT feed repeatedly, resolving every sample
    Watch {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        #[command(flatten)]
        schedule: ScheduleArgs,

        #[command(flatten)]
        auth: AuthArgs,

        /// CSV file to append match statistics to
        #[arg(short, long, default_value = "match_stats.csv")]
        output: String,

        /// Sample rate: query the feed every X seconds
        #[arg(short = 'r', long, default_value_t = 30)]
        sample_rate: u64,

        /// Number of samples to collect (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 0)]
        num_samples: usize,

        /// Reload the static schedule every N samples (0 = never)
        #[arg(long, default_value_t = 0)]
        reload_every: usize,
    },
    /// Find the scheduled trip calling at a stop at an exact time
    Lookup {
        #[command(flatten)]
        schedule: ScheduleArgs,

        /// Stop id (without feed prefix)
        #[arg(long)]
        stop: String,

        /// Scheduled time as HH:MM:SS (may exceed 24:00:00)
        #[arg(long)]
        time: String,

        /// Service date as YYYYMMDD
        #[arg(long)]
        date: String,

        /// Direction id, 0 or 1
        #[arg(long, default_value_t = 0)]
        direction: u32,

        /// Allowed GTFS route types, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        route_types: Vec<i32>,

        /// Only consider routes of this agency id
        #[arg(long)]
        agency: Option<String>,

        #[arg(long)]
        trip_short_name: Option<String>,

        #[arg(long)]
        route_short_name: Option<String>,

        /// Compare scheduled arrivals instead of departures
        #[arg(long, default_value_t = false)]
        arrival: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_rt_matcher.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_rt_matcher.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve {
            source,
            schedule,
            auth,
            output,
            details,
        } => {
            let timetable = load_schedule(&schedule).await?;
            let client = build_client(&auth)?;
            let bytes = fetcher(&*client, &source).await?;
            let mut feed = parse_feed(&bytes)?;

            let matcher = FuzzyTripMatcher::new(&timetable);
            let result = resolve_feed(&matcher, &schedule.feed_id, &mut feed);

            info!(
                descriptors = result.stats.descriptors,
                matched = result.stats.matched,
                matched_rollover = result.stats.matched_rollover,
                no_match = result.stats.no_match,
                match_rate = result.stats.match_rate(),
                "Feed resolved"
            );
            print_json(&result.stats)?;
            append_record(&output, &result.stats)?;
            if let Some(details) = details {
                write_resolved(&details, &result.rows)?;
            }
        }
        Commands::Watch {
            source,
            schedule,
            auth,
            output,
            sample_rate,
            num_samples,
            reload_every,
        } => {
            watch(
                &source,
                &schedule,
                &auth,
                &output,
                sample_rate,
                num_samples,
                reload_every,
            )
            .await?;
        }
        Commands::Lookup {
            schedule,
            stop,
            time,
            date,
            direction,
            route_types,
            agency,
            trip_short_name,
            route_short_name,
            arrival,
        } => {
            let timetable = load_schedule(&schedule).await?;

            let time = parse_service_time(&time)
                .ok_or_else(|| anyhow!("invalid time '{time}', expected HH:MM:SS"))?;
            let date = ServiceDate::parse(&date)
                .ok_or_else(|| anyhow!("invalid date '{date}', expected YYYYMMDD"))?;
            let direction = Direction::from_id(direction)
                .ok_or_else(|| anyhow!("direction must be 0 or 1, got {direction}"))?;
            let agency = agency.map(|a| FeedScopedId::new(&schedule.feed_id, a));
            if let Some(agency) = &agency {
                match timetable.agency_for_scoped_id(agency) {
                    Some(a) => info!(agency = %agency, name = %a.name, "Filtering by agency"),
                    None => {
                        warn!(agency = %agency, "Agency not in schedule");
                        return Ok(());
                    }
                }
            }

            let stop_id = FeedScopedId::new(&schedule.feed_id, &stop);
            let Some(stop) = timetable.stop_for_scoped_id(&stop_id) else {
                warn!(stop = %stop_id, "Stop not in schedule");
                return Ok(());
            };
            let stop_name = timetable.stop(stop).map(|s| s.name.as_str()).unwrap_or("");

            let query = StopTimeQuery {
                agency: agency.as_ref(),
                stop,
                route_types: &route_types,
                trip_short_name: trip_short_name.as_deref(),
                route_short_name: route_short_name.as_deref(),
                direction,
                time,
                date,
                kind: if arrival {
                    TimeKind::Arrival
                } else {
                    TimeKind::Departure
                },
            };

            match FuzzyTripMatcher::new(&timetable).resolve_by_stop_and_time(&query) {
                Some(trip) => info!(
                    trip_id = %trip.id,
                    stop = %stop_id,
                    stop_name,
                    trip_short_name = trip.short_name.as_deref().unwrap_or(""),
                    first_departure = %trip.first_departure().map(format_service_time).unwrap_or_default(),
                    "Trip found"
                ),
                None => info!(stop = %stop_id, stop_name, time = %format_service_time(time), %date, "No trip found"),
            }
        }
    }

    Ok(())
}

/// Loads the static schedule on a blocking worker.
#[tracing::instrument(skip(schedule), fields(feed_id = %schedule.feed_id))]
async fn load_schedule(schedule: &ScheduleArgs) -> Result<gtfs_rt_matcher::schedule::Timetable> {
    let dir = schedule.gtfs.clone();
    let feed_id = schedule.feed_id.clone();
    tokio::task::spawn_blocking(move || load_gtfs_dir(&dir, &feed_id))
        .await?
        .with_context(|| format!("loading static GTFS from {}", schedule.gtfs.display()))
}

/// Wraps the HTTP client with the configured feed credentials.
fn build_client(auth: &AuthArgs) -> Result<Box<dyn HttpClient>> {
    let basic = BasicClient::new()?;
    if auth.api_key_header.is_none() && auth.api_key_param.is_none() {
        return Ok(Box::new(basic));
    }

    let key = std::env::var("FEED_API_KEY")
        .context("FEED_API_KEY must be set when an API key header or parameter is given")?;

    match (&auth.api_key_header, &auth.api_key_param) {
        (Some(header), _) => Ok(Box::new(ApiKey::new(basic, header, &key)?)),
        (None, Some(param)) => Ok(Box::new(UrlParam {
            inner: basic,
            param_name: param.clone(),
            key,
        })),
        (None, None) => bail!("no API key transport configured"),
    }
}

/// Loads feed data from a local file path or fetches it over HTTP.
#[tracing::instrument(skip(client), fields(source = %url))]
async fn fetcher(client: &dyn HttpClient, url: &str) -> Result<Vec<u8>> {
    let bytes = if url.starts_with("http") {
        fetch_bytes(client, url).await?
    } else {
        std::fs::read(url).with_context(|| format!("reading {url}"))?
    };
    Ok(bytes)
}

/// Polls `source` every `sample_rate` seconds, resolving each sample
/// against the current schedule snapshot and appending statistics to
/// `output`. A failed sample is recorded and polling continues.
#[tracing::instrument(skip(schedule, auth), fields(feed_id = %schedule.feed_id))]
async fn watch(
    source: &str,
    schedule: &ScheduleArgs,
    auth: &AuthArgs,
    output: &str,
    sample_rate: u64,
    num_samples: usize,
    reload_every: usize,
) -> Result<()> {
    let handle = Arc::new(ScheduleHandle::new(load_schedule(schedule).await?));
    let client = build_client(auth)?;

    if num_samples == 0 {
        info!(sample_rate, "Sampling infinitely. Press Ctrl+C to stop.");
    } else {
        info!(num_samples, sample_rate, "Starting sample collection");
    }

    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(sample_rate.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut sample_count = 0;

    loop {
        // Check if we've reached the sample limit (0 = infinite)
        if num_samples > 0 && sample_count >= num_samples {
            break;
        }

        // the first tick completes immediately
        interval.tick().await;
        sample_count += 1;

        if reload_every > 0 && sample_count > 1 && (sample_count - 1) % reload_every == 0 {
            match load_schedule(schedule).await {
                Ok(timetable) => handle.publish(timetable),
                Err(e) => error!(error = %e, "Schedule reload failed, keeping previous snapshot"),
            }
        }

        let stats = match fetcher(&*client, source).await {
            Ok(bytes) => {
                let snapshot = handle.snapshot();
                let feed_id = schedule.feed_id.clone();
                let resolved = tokio::task::spawn_blocking(move || {
                    let mut feed = parse_feed(&bytes)?;
                    let matcher = FuzzyTripMatcher::new(snapshot.as_ref());
                    Ok::<_, anyhow::Error>(resolve_feed(&matcher, &feed_id, &mut feed).stats)
                })
                .await?;

                match resolved {
                    Ok(stats) => {
                        info!(
                            sample = sample_count,
                            descriptors = stats.descriptors,
                            match_rate = stats.match_rate(),
                            "Sample resolved"
                        );
                        stats
                    }
                    Err(e) => {
                        error!(error = %e, "Feed parse failed");
                        MatchStats::from_error("parse_error", &e.to_string())
                            .with_feed_id(&schedule.feed_id)
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Feed fetch failed");
                MatchStats::from_error("fetch_error", &e.to_string())
                    .with_feed_id(&schedule.feed_id)
            }
        };

        if let Err(e) = append_record(output, &stats) {
            error!(error = %e, "Failed to write stats for sample");
        }
    }

    info!(samples = sample_count, output, "Finished watching feed");
    Ok(())
}
