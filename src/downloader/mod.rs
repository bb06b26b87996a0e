//! The playlist download orchestrator
//!
//! [`PlaylistDownloader`] owns a single job slot. Each submission builds a
//! fresh [`JobMachine`](crate::job::JobMachine), spawns one read loop for it and
//! bumps the slot generation, so nothing from an earlier job can reach a later
//! one. Observers follow along through [`subscribe`](PlaylistDownloader::subscribe)
//! or read a [`snapshot`](PlaylistDownloader::snapshot).
//!
//! - [`control`] - submit, supersede and cancel

mod control;

pub use control::JobHandle;

use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio_stream::wrappers::BroadcastStream;

use crate::client::BackendClient;
use crate::completion::{ArtifactDownloader, CompletionHandler, NoopCompletion};
use crate::config::Config;
use crate::error::Result;
use crate::job::stream::JobSlot;
use crate::job::{BatchJob, MachineContext};
use crate::reconcile::Reconciler;
use crate::types::{JobEvent, JobStatus, PlaylistPreview, VideoPreview};

/// Main orchestrator instance (cloneable - all fields are Arc-wrapped or cheap)
#[derive(Clone)]
pub struct PlaylistDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Backend HTTP client
    pub(crate) client: BackendClient,
    /// Collaborators handed to every new job machine
    pub(crate) ctx: MachineContext,
    /// The single job slot, guarded by generation
    pub(crate) slot: Arc<Mutex<JobSlot>>,
}

impl PlaylistDownloader {
    /// Create a new PlaylistDownloader
    ///
    /// Validates the configuration, builds the backend client and picks the
    /// completion handler: [`ArtifactDownloader`] when `artifact.auto_save` is
    /// on, [`NoopCompletion`] otherwise.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let client = BackendClient::new(&config.backend)?;
        let completion: Arc<dyn CompletionHandler> = if config.artifact.auto_save {
            Arc::new(ArtifactDownloader::new(
                client.http().clone(),
                config.artifact.save_dir.clone(),
            ))
        } else {
            Arc::new(NoopCompletion)
        };
        let (events, _rx) = broadcast::channel(config.stream.event_capacity);

        let ctx = MachineContext {
            reconciler: Arc::new(Reconciler::for_strategy(config.stream.correlation)),
            completion,
            base_url: client.base_url().clone(),
            events,
        };

        tracing::debug!(
            base_url = %client.base_url(),
            handler = ctx.completion.name(),
            "playlist downloader created"
        );

        Ok(Self {
            config: Arc::new(config),
            client,
            ctx,
            slot: Arc::new(Mutex::new(JobSlot::default())),
        })
    }

    /// Replace the completion handler used by future jobs
    pub fn with_completion_handler(mut self, handler: Arc<dyn CompletionHandler>) -> Self {
        self.ctx.completion = handler;
        self
    }

    /// Subscribe to job events
    ///
    /// Each subscriber receives every event emitted after subscribing. A slow
    /// subscriber that falls more than `stream.event_capacity` events behind
    /// gets `RecvError::Lagged` and skips ahead.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.ctx.events.subscribe()
    }

    /// Job events as a `Stream`, for use with `StreamExt` combinators
    pub fn event_stream(&self) -> BroadcastStream<JobEvent> {
        BroadcastStream::new(self.subscribe())
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The backend client
    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    /// Fetch the entries of a playlist
    pub async fn preview_playlist(&self, url: &str) -> Result<PlaylistPreview> {
        self.client.preview_playlist(url).await
    }

    /// Fetch the available formats of a single video
    pub async fn preview_video(&self, url: &str) -> Result<VideoPreview> {
        self.client.preview_video(url).await
    }

    /// A copy of the current job, if any
    pub async fn snapshot(&self) -> Option<BatchJob> {
        let slot = self.slot.lock().await;
        slot.machine.as_ref().map(|m| m.job().clone())
    }

    /// Status of the current job, `Idle` when there is none
    pub async fn status(&self) -> JobStatus {
        let slot = self.slot.lock().await;
        slot.machine
            .as_ref()
            .map_or(JobStatus::Idle, |m| m.job().status())
    }
}
