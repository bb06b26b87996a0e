//! HTTP client for the download backend
//!
//! Three endpoints are used:
//!
//! | Method | Path                | Purpose                               |
//! |--------|---------------------|---------------------------------------|
//! | GET    | `/preview`          | playlist or single-video metadata     |
//! | POST   | `/downloadplaylist` | start a job, answered with the stream |
//! | GET    | `/download/...`     | the finished archive (see completion) |

use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::types::{PlaylistDownloadRequest, PlaylistPreview, VideoPreview};
use crate::utils::join_base;

/// Thin typed wrapper over the backend's HTTP API
#[derive(Clone, Debug)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
}

impl BackendClient {
    /// Build a client from backend settings
    ///
    /// No client-wide timeout is set: the job stream stays open for the whole
    /// download. Preview requests get `request_timeout` individually.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            http,
            base_url,
            request_timeout: config.request_timeout,
        })
    }

    /// Backend base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Underlying HTTP client, shared with artifact retrieval
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Fetch the entries of a playlist
    pub async fn preview_playlist(&self, url: &str) -> Result<PlaylistPreview> {
        self.preview(url, "playlist").await
    }

    /// Fetch the available formats of a single video
    pub async fn preview_video(&self, url: &str) -> Result<VideoPreview> {
        self.preview(url, "single").await
    }

    async fn preview<T: DeserializeOwned>(&self, url: &str, kind: &str) -> Result<T> {
        let endpoint = join_base(&self.base_url, "/preview")?;
        tracing::debug!(url, kind, "requesting preview");

        let response = self
            .http
            .get(endpoint.clone())
            .query(&[("url", url), ("type", kind)])
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response, &endpoint)?;
        Ok(response.json().await?)
    }

    /// Start a playlist job and return the still-open streamed response
    ///
    /// The caller owns the body from here on; nothing is read yet.
    pub async fn open_playlist_stream(
        &self,
        request: &PlaylistDownloadRequest,
    ) -> Result<reqwest::Response> {
        let endpoint = join_base(&self.base_url, "/downloadplaylist")?;
        tracing::debug!(
            url = %request.url,
            videos = request.video_ids.len(),
            "opening playlist stream"
        );

        let response = self
            .http
            .post(endpoint.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;
        check_status(response, &endpoint)
    }
}

fn check_status(response: reqwest::Response, endpoint: &Url) -> Result<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Transport {
            status: status.as_u16(),
            url: endpoint.to_string(),
        });
    }
    Ok(response)
}
