use std::path::Path;

use futures::Stream;
use futures::TryStreamExt;
use reqwest::{redirect, Client};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use super::models::{ReleaseConfig, UpdateStatus};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Server returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Invalid release URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Clone)]
pub struct ReleaseClient {
    config: ReleaseConfig,
}

impl ReleaseClient {
    pub fn new(config: ReleaseConfig) -> Self {
        Self { config }
    }

    fn client(&self) -> Result<Client> {
        Ok(Client::builder()
            .redirect(redirect::Policy::limited(self.config.max_redirects))
            .build()?)
    }

    fn asset_url(&self, name: &str) -> Result<Url> {
        let base = format!("{}/", self.config.base_url.trim_end_matches('/'));
        Ok(Url::parse(&base)?.join(name)?)
    }

    /// Fetch the release checksums file as text
    pub async fn fetch_checksums(&self) -> Result<String> {
        let url = self.asset_url(&self.config.checksums_name)?;
        let response = self.client()?.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }
        Ok(response.text().await?)
    }

    /// Compare the local binary with the checksum published for our asset
    pub async fn check_for_update(&self, local_binary: &Path) -> Result<UpdateStatus> {
        let local = sha256_file(local_binary).await?;
        let sums = self.fetch_checksums().await?;

        let Some(remote) = find_checksum(&sums, &self.config.asset_name) else {
            debug!(asset = %self.config.asset_name, "asset missing from checksums");
            return Ok(UpdateStatus::Unknown);
        };

        if local.eq_ignore_ascii_case(&remote) {
            info!("yt-dlp is up to date");
            Ok(UpdateStatus::UpToDate)
        } else {
            info!(%local, %remote, "yt-dlp update available");
            Ok(UpdateStatus::Available { local, remote })
        }
    }

    /// Download the release asset with progress stream
    /// Returns (total_size, stream)
    pub async fn download_file_stream(
        &self,
    ) -> Result<(Option<u64>, impl Stream<Item = Result<bytes::Bytes>>)> {
        let url = self.asset_url(&self.config.asset_name)?;
        let response = self.client()?.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }

        let total_size = response.content_length();
        let stream = response.bytes_stream().map_err(ApiError::RequestError);

        Ok((total_size, stream))
    }
}

/// Finds `<hex digest>  <name>` in a sha256sum-style listing
fn find_checksum(sums: &str, asset_name: &str) -> Option<String> {
    sums.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let digest = fields.next()?;
        let name = fields.next()?.trim_start_matches('*');
        (name == asset_name).then(|| digest.to_string())
    })
}

pub async fn sha256_file(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
