//! Classification of decoded frames into typed protocol events

use serde::{Deserialize, Serialize};

use crate::error::FrameError;
use crate::protocol::frame::RawFrame;
use crate::types::LogLevel;

/// A typed event reported by the backend over the job stream
///
/// The wire discriminator is the `event` field of the JSON payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// Free-form status line
    Status {
        /// Status text
        message: String,
    },

    /// Per-file download progress
    Progress {
        /// Output filename, prefixed with the item's 1-based ordinal (`"3 - Title.mp4"`)
        filename: String,
        /// Percent text as formatted by the backend (e.g. `"45.2%"`)
        percent: String,
        /// Speed text
        #[serde(default)]
        speed: String,
        /// ETA text
        #[serde(default)]
        eta: String,
        /// 0-based index of the item in the submitted selection, when sent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        video_index: Option<usize>,
    },

    /// One file finished downloading
    #[serde(rename = "video_finished")]
    ItemFinished {
        /// Output filename
        filename: String,
        /// 0-based index of the item in the submitted selection, when sent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        video_index: Option<usize>,
        /// Optional human-readable note
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Backend log line
    Log {
        /// Log text
        message: String,
        /// Severity, when sent and recognized
        #[serde(
            default,
            deserialize_with = "lenient_level",
            skip_serializing_if = "Option::is_none"
        )]
        level: Option<LogLevel>,
    },

    /// Terminal success
    Completed {
        /// Completion text
        message: String,
        /// Artifact path relative to the backend base, when there is one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        zip_url: Option<String>,
    },

    /// Terminal failure
    Error {
        /// Failure reason
        message: String,
    },
}

impl ProtocolEvent {
    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolEvent::Status { .. } => "status",
            ProtocolEvent::Progress { .. } => "progress",
            ProtocolEvent::ItemFinished { .. } => "video_finished",
            ProtocolEvent::Log { .. } => "log",
            ProtocolEvent::Completed { .. } => "completed",
            ProtocolEvent::Error { .. } => "error",
        }
    }

    /// Completed or Error
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProtocolEvent::Completed { .. } | ProtocolEvent::Error { .. }
        )
    }
}

/// Field prefix carrying the payload
const DATA_FIELD: &str = "data:";

/// Classify one complete frame
///
/// - No `data:` field, invalid JSON, or a non-object payload: `Err`, the
///   frame is to be dropped with a diagnostic.
/// - A JSON object whose `event` is missing, unknown, or lacks the fields its
///   variant requires: a [`ProtocolEvent::Log`] carrying the raw payload.
///
/// Pure: the same frame always yields the same result.
pub fn classify(frame: &RawFrame) -> Result<ProtocolEvent, FrameError> {
    let payload = data_payload(frame.as_str()).ok_or(FrameError::MissingData)?;
    let value: serde_json::Value = serde_json::from_str(&payload)?;
    if !value.is_object() {
        return Err(FrameError::NotAnObject);
    }
    Ok(serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "unrecognized event, keeping raw payload");
        ProtocolEvent::Log {
            message: payload,
            level: None,
        }
    }))
}

/// Unknown or mistyped levels read as absent instead of rejecting the event
fn lenient_level<'de, D>(deserializer: D) -> Result<Option<LogLevel>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

/// Join the values of every `data:` line in the frame
///
/// One optional space after the colon is stripped; comment lines (`:`) and
/// other fields are ignored.
fn data_payload(frame: &str) -> Option<String> {
    let mut payload: Option<String> = None;
    for line in frame.lines() {
        let Some(value) = line.strip_prefix(DATA_FIELD) else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match payload.as_mut() {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(value);
            }
            None => payload = Some(value.to_string()),
        }
    }
    payload
}
