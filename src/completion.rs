//! Artifact retrieval on job completion
//!
//! When the backend reports `completed` with a `zip_url`, the job state machine
//! resolves it against the backend base and hands the location to a
//! [`CompletionHandler`]. The hand-off is fire-and-forget: whatever the handler
//! does (save to disk, open a browser, nothing) never feeds back into the job.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::{Error, Result};
use crate::types::JobId;
use crate::utils::{extract_filename_from_response, get_unique_path, join_base};

/// Fallback name when neither headers nor URL provide one
const DEFAULT_ARTIFACT_NAME: &str = "playlist.zip";

/// Names tried before a save gives up
const MAX_CREATE_ATTEMPTS: usize = 32;

/// Receives the retrieval location of a completed job's artifact
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    /// Called at most once per job, only for a `completed` event carrying an artifact
    async fn artifact_ready(&self, job_id: JobId, location: Url);

    /// Handler name for logging
    fn name(&self) -> &'static str;
}

/// Resolve a `zip_url` against the backend base
pub fn resolve_artifact(base: &Url, zip_url: &str) -> Result<Url> {
    let zip_url = zip_url.trim();
    if zip_url.is_empty() {
        return Err(Error::Other("empty artifact reference".into()));
    }
    join_base(base, zip_url)
}

/// Handler that does nothing (auto-save disabled)
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCompletion;

#[async_trait]
impl CompletionHandler for NoopCompletion {
    async fn artifact_ready(&self, job_id: JobId, location: Url) {
        tracing::debug!(job_id = %job_id, location = %location, "artifact ready, auto-save disabled");
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Handler that downloads the artifact into a local directory
#[derive(Clone, Debug)]
pub struct ArtifactDownloader {
    client: reqwest::Client,
    save_dir: PathBuf,
}

impl ArtifactDownloader {
    /// Create a downloader saving into `save_dir`
    pub fn new(client: reqwest::Client, save_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            save_dir: save_dir.into(),
        }
    }

    /// Fetch `location` and stream it to a new file in the save directory
    ///
    /// Never overwrites: an existing name gets a ` (N)` suffix.
    pub async fn save(&self, location: &Url) -> Result<PathBuf> {
        let response = self.client.get(location.clone()).send().await?;
        if !response.status().is_success() {
            return Err(Error::Transport {
                status: response.status().as_u16(),
                url: location.to_string(),
            });
        }

        let name = extract_filename_from_response(&response, location, DEFAULT_ARTIFACT_NAME);
        tokio::fs::create_dir_all(&self.save_dir).await?;
        let (path, written) =
            write_new_file(&self.save_dir.join(name), response.bytes_stream()).await?;

        tracing::info!(path = %path.display(), bytes = written, "artifact saved");
        Ok(path)
    }
}

/// Claim a name that does not exist yet, starting from `target`
///
/// The file is created with `create_new`, so two saves racing for the same
/// name never share a file; the loser moves on to the next ` (N)` suffix.
async fn create_new_file(target: &Path) -> Result<(tokio::fs::File, PathBuf)> {
    for _ in 0..MAX_CREATE_ATTEMPTS {
        let path = get_unique_path(target)?;
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::Other(format!(
        "no free file name for {}",
        target.display()
    )))
}

/// Stream `body` into a new file near `target`, removing it if the body fails
async fn write_new_file<S, B, E>(target: &Path, body: S) -> Result<(PathBuf, u64)>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<Error>,
{
    let (mut file, path) = create_new_file(target).await?;
    let mut body = std::pin::pin!(body);

    let copied = async {
        let mut written: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(Into::into)?;
            file.write_all(chunk.as_ref()).await?;
            written += chunk.as_ref().len() as u64;
        }
        file.flush().await?;
        Ok::<_, Error>(written)
    }
    .await;

    match copied {
        Ok(written) => Ok((path, written)),
        Err(e) => {
            drop(file);
            if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %cleanup, "could not remove partial artifact");
            }
            Err(e)
        }
    }
}

#[async_trait]
impl CompletionHandler for ArtifactDownloader {
    async fn artifact_ready(&self, job_id: JobId, location: Url) {
        if let Err(e) = self.save(&location).await {
            tracing::warn!(job_id = %job_id, location = %location, error = %e, "artifact save failed");
        }
    }

    fn name(&self) -> &'static str {
        "artifact_downloader"
    }
}
