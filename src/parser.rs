//! Protobuf parser for GTFS Realtime feeds.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use prost::Message;
use std::io::Read;

use crate::gtfs_rt::FeedMessage;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// Gzip-compressed payloads (archived feed snapshots) are inflated first.
///
/// # Errors
///
/// Returns an error if the bytes are not valid protobuf for a `FeedMessage`,
/// or if a gzip payload is corrupt.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut inflated = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut inflated)
            .context("inflating gzip feed")?;
        return Ok(FeedMessage::decode(inflated.as_slice())?);
    }
    Ok(FeedMessage::decode(bytes)?)
}
