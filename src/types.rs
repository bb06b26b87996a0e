//! Core types for playlist-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of one batch job lifecycle
///
/// Ids are handed out by the orchestrator from a monotonically increasing
/// generation counter, so a newer submission always has a larger id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque, caller-assigned identifier of one playlist entry
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create a new ItemId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a batch job
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// No job submitted
    #[default]
    Idle,
    /// Submitted, stream open
    Running,
    /// Terminal success
    Completed,
    /// Terminal failure (transport or server-reported)
    Failed,
}

impl JobStatus {
    /// Completed or Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One logical unit of a batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemRef {
    /// Stable caller-assigned id
    pub id: ItemId,
    /// 1-based position within the submitted batch
    pub positional_index: usize,
    /// Display title, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Last reported progress, verbatim as the backend formats it (e.g. "45.2%")
    pub progress_percent: Option<String>,
    /// Whether the backend reported this item finished
    pub completed: bool,
}

impl ItemRef {
    /// Create a fresh item with no progress
    pub fn new(id: impl Into<ItemId>, positional_index: usize) -> Self {
        Self {
            id: id.into(),
            positional_index,
            title: None,
            progress_percent: None,
            completed: false,
        }
    }

    /// Attach a display title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Numeric progress in the range 0.0 to 100.0, parsed from the reported text
    pub fn progress_value(&self) -> Option<f32> {
        let text = self.progress_percent.as_deref()?;
        let value: f32 = text.trim().trim_end_matches('%').trim().parse().ok()?;
        Some(value.clamp(0.0, 100.0))
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Severity of a job log record
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Informational
    #[default]
    Info,
    /// Recoverable anomaly
    #[serde(alias = "warn")]
    Warning,
    /// Failure
    Error,
}

/// One human-readable record in a job's append-only log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the record was appended
    pub at: DateTime<Utc>,
    /// Severity
    pub level: LogLevel,
    /// Message text
    pub message: String,
}

impl LogEntry {
    /// Create a record stamped with the current time
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// Notification emitted to observers of the orchestrator
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new job entered Running
    Submitted {
        /// Job id
        job_id: JobId,
        /// Number of items in the batch
        item_count: usize,
    },

    /// A record was appended to the job log
    Logged {
        /// Job id
        job_id: JobId,
        /// The appended record
        entry: LogEntry,
    },

    /// An item's progress or completion changed
    ItemUpdated {
        /// Job id
        job_id: JobId,
        /// The item after the update
        item: ItemRef,
    },

    /// The artifact location was resolved and handed to the completion handler
    ArtifactReady {
        /// Job id
        job_id: JobId,
        /// Fully-qualified retrieval location
        location: String,
    },

    /// Job reached Completed
    Completed {
        /// Job id
        job_id: JobId,
    },

    /// Job reached Failed
    Failed {
        /// Job id
        job_id: JobId,
        /// Failure reason
        message: String,
    },
}

impl JobEvent {
    /// The job this event belongs to
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Submitted { job_id, .. }
            | JobEvent::Logged { job_id, .. }
            | JobEvent::ItemUpdated { job_id, .. }
            | JobEvent::ArtifactReady { job_id, .. }
            | JobEvent::Completed { job_id }
            | JobEvent::Failed { job_id, .. } => *job_id,
        }
    }

    /// Whether this event ends the job lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Completed { .. } | JobEvent::Failed { .. })
    }
}

/// Playlist metadata returned by `GET /preview?type=playlist`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlaylistPreview {
    /// Playlist title
    #[serde(default)]
    pub playlist_title: Option<String>,
    /// Playlist thumbnail
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Entries in playlist order
    #[serde(default)]
    pub videos: Vec<PlaylistEntry>,
}

impl PlaylistPreview {
    /// Sum of known entry durations in seconds
    pub fn total_duration(&self) -> f64 {
        self.videos.iter().filter_map(|v| v.duration).sum()
    }
}

/// One entry of a playlist preview
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaylistEntry {
    /// Video id
    pub id: String,
    /// Video title
    #[serde(default)]
    pub title: Option<String>,
    /// Thumbnail URL
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Single-video metadata returned by `GET /preview?type=single`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VideoPreview {
    /// Video title
    #[serde(default)]
    pub title: Option<String>,
    /// Thumbnail URL
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Video-only formats
    #[serde(default)]
    pub video_formats: Vec<FormatDescriptor>,
    /// Audio-only formats
    #[serde(default)]
    pub audio_formats: Vec<FormatDescriptor>,
    /// Formats carrying both audio and video
    #[serde(default)]
    pub combined_formats: Vec<FormatDescriptor>,
}

impl VideoPreview {
    /// Video-only format with the largest known filesize
    pub fn best_video(&self) -> Option<&FormatDescriptor> {
        largest(&self.video_formats)
    }

    /// Audio-only format with the largest known filesize
    pub fn best_audio(&self) -> Option<&FormatDescriptor> {
        largest(&self.audio_formats)
    }
}

fn largest(formats: &[FormatDescriptor]) -> Option<&FormatDescriptor> {
    formats.iter().max_by_key(|f| f.filesize.unwrap_or(0))
}

/// A media format as forwarded by the backend
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FormatDescriptor {
    /// Backend format id
    pub format_id: String,
    /// Container extension
    #[serde(default)]
    pub ext: Option<String>,
    /// Resolution label (video formats)
    #[serde(default)]
    pub resolution: Option<String>,
    /// Frames per second (video formats)
    #[serde(default)]
    pub fps: Option<f64>,
    /// Average audio bitrate (audio formats)
    #[serde(default)]
    pub abr: Option<f64>,
    /// Size in bytes, when known
    #[serde(default)]
    pub filesize: Option<u64>,
    /// Video codec
    #[serde(default)]
    pub vcodec: Option<String>,
    /// Audio codec
    #[serde(default)]
    pub acodec: Option<String>,
}

/// Body of `POST /downloadplaylist`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaylistDownloadRequest {
    /// Playlist URL
    pub url: String,
    /// Server-side download directory
    pub download_path: String,
    /// Always "playlist" for this endpoint
    pub mode: String,
    /// Selected video ids in submission order
    pub video_ids: Vec<String>,
    /// Playlist title, used by the backend to name the archive
    pub playlist_title: String,
}
