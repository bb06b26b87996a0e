//! # playlist-dl
//!
//! Client-side orchestrator for streamed playlist download jobs.
//!
//! A backend downloads the selected entries of a playlist and reports progress
//! as a stream of `data:` frames on the response to `POST /downloadplaylist`.
//! This crate decodes that stream, keeps a per-item progress view in sync with
//! it, and hands the finished archive to a completion handler.
//!
//! ## Design Philosophy
//!
//! playlist-dl is designed to be:
//! - **Single-writer** - One state machine owns the job; observers get events and snapshots
//! - **Tolerant** - Malformed frames and unmatched reports are logged, never fatal
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use playlist_dl::{Config, JobEvent, PlaylistDownloader, PlaylistSelection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.backend.base_url = "http://localhost:8000".to_string();
//!
//!     let downloader = PlaylistDownloader::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let JobEvent::ItemUpdated { item, .. } = &event {
//!                 println!("{}: {:?}", item.id, item.progress_percent);
//!             }
//!         }
//!     });
//!
//!     let url = "https://www.youtube.com/playlist?list=PL123";
//!     let mut selection = PlaylistSelection::from_preview(url, downloader.preview_playlist(url).await?);
//!     selection.deselect("dQw4w9WgXcQ");
//!
//!     let job = downloader.submit(&selection).await?.join().await?;
//!     println!("finished: {:?}", job.map(|j| j.status()));
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Backend HTTP client
pub mod client;
/// Artifact hand-off on completion
pub mod completion;
/// Configuration types
pub mod config;
/// The orchestrator (job slot, submit/supersede/cancel)
pub mod downloader;
/// Error types
pub mod error;
/// Batch job record, state machine and read loop
pub mod job;
/// Stream frame decoding and event classification
pub mod protocol;
/// Mapping progress reports onto submitted items
pub mod reconcile;
/// Playlist entry selection
pub mod selection;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use client::BackendClient;
pub use completion::{ArtifactDownloader, CompletionHandler, NoopCompletion};
pub use config::{ArtifactConfig, BackendConfig, Config, Correlation, StreamConfig};
pub use downloader::{JobHandle, PlaylistDownloader};
pub use error::{Error, FrameError, JobError, Result};
pub use job::BatchJob;
pub use protocol::{EventDecoder, ProtocolEvent};
pub use reconcile::{FilenameOrdinal, ItemCorrelator, Reconciler, VideoIndex};
pub use selection::PlaylistSelection;
pub use types::{
    FormatDescriptor, ItemId, ItemRef, JobEvent, JobId, JobStatus, LogEntry, LogLevel,
    PlaylistDownloadRequest, PlaylistEntry, PlaylistPreview, VideoPreview,
};
