//! HTTP retrieval of GTFS-RT feed payloads.

mod basic;
pub mod auth;

pub use basic::BasicClient;

use anyhow::{Result, bail};
use async_trait::async_trait;
use reqwest::{Request, Response};
use tracing::debug;

/// Sends a prepared feed request. The [`auth`] wrappers decorate an inner
/// client with credentials before delegating to it.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// Issues a GET for `url` through `client` and returns the body bytes.
///
/// # Errors
///
/// Fails on an unparseable URL, a transport error, or a non-success status.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        bail!("feed request returned status {status}");
    }

    let bytes = resp.bytes().await?.to_vec();
    debug!(bytes = bytes.len(), "Feed bytes received");
    Ok(bytes)
}
