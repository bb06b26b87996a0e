//! Configuration types for playlist-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Backend location and request settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend base URL (default: "http://localhost:8000")
    ///
    /// Relative artifact paths from the `completed` event are appended to this.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for preview requests (default: 60 seconds)
    ///
    /// Never applied to the job stream itself, which may legitimately stay open
    /// for as long as the backend keeps working.
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Server-side directory passed as `download_path` (default: "Downloads")
    #[serde(default = "default_download_path")]
    pub download_path: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            download_path: default_download_path(),
        }
    }
}

/// How progress reports are mapped back onto submitted items
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Correlation {
    /// Leading `N -` ordinal in the reported filename
    #[default]
    FilenameOrdinal,
    /// Explicit `video_index` field, falling back to the filename ordinal
    VideoIndex,
}

/// Job stream handling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Fail the job if no chunk arrives for this long (None = wait forever)
    #[serde(default, with = "optional_duration_serde")]
    pub idle_timeout: Option<Duration>,

    /// Largest undelimited frame kept in the decoder buffer (default: 1 MiB)
    ///
    /// An oversized remainder is discarded with a diagnostic instead of growing
    /// without bound.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Capacity of the observer broadcast channel (default: 1000)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Progress correlation strategy
    #[serde(default)]
    pub correlation: Correlation,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            max_frame_bytes: default_max_frame_bytes(),
            event_capacity: default_event_capacity(),
            correlation: Correlation::default(),
        }
    }
}

/// Artifact retrieval on job completion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Fetch the archive automatically when the job completes (default: true)
    #[serde(default = "default_true")]
    pub auto_save: bool,

    /// Local directory the archive is saved into (default: "./downloads")
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            auto_save: true,
            save_dir: default_save_dir(),
        }
    }
}

/// Main configuration for [`PlaylistDownloader`](crate::PlaylistDownloader)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend location and request settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Job stream handling
    #[serde(default)]
    pub stream: StreamConfig,

    /// Artifact retrieval
    #[serde(default)]
    pub artifact: ArtifactConfig,
}

impl Config {
    /// Check settings that would otherwise fail late, at first use
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.backend.base_url).map_err(|e| Error::Config {
            message: format!("invalid backend base URL '{}': {}", self.backend.base_url, e),
            key: Some("backend.base_url".into()),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::Config {
                message: format!("backend base URL must be http(s), got '{}'", base.scheme()),
                key: Some("backend.base_url".into()),
            });
        }
        if self.stream.max_frame_bytes == 0 {
            return Err(Error::Config {
                message: "max_frame_bytes must be greater than zero".into(),
                key: Some("stream.max_frame_bytes".into()),
            });
        }
        if self.stream.event_capacity == 0 {
            return Err(Error::Config {
                message: "event_capacity must be greater than zero".into(),
                key: Some("stream.event_capacity".into()),
            });
        }
        if self.stream.idle_timeout == Some(Duration::ZERO) {
            return Err(Error::Config {
                message: "idle_timeout must be greater than zero when set".into(),
                key: Some("stream.idle_timeout".into()),
            });
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".into()
}

fn default_user_agent() -> String {
    concat!("playlist-dl/", env!("CARGO_PKG_VERSION")).into()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_download_path() -> String {
    "Downloads".into()
}

fn default_max_frame_bytes() -> usize {
    1024 * 1024
}

fn default_event_capacity() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.backend.base_url, "http://localhost:8000");
        assert_eq!(config.backend.request_timeout, Duration::from_secs(60));
        assert_eq!(config.stream.idle_timeout, None);
        assert_eq!(config.stream.correlation, Correlation::FilenameOrdinal);
        assert!(config.artifact.auto_save);
        config.validate().unwrap();
    }

    #[test]
    fn durations_are_whole_seconds() {
        let config: Config = serde_json::from_str(
            r#"{"backend":{"request_timeout":5},"stream":{"idle_timeout":30,"correlation":"video_index"}}"#,
        )
        .unwrap();
        assert_eq!(config.backend.request_timeout, Duration::from_secs(5));
        assert_eq!(config.stream.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.stream.correlation, Correlation::VideoIndex);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["stream"]["idle_timeout"], 30);
        assert_eq!(json["backend"]["request_timeout"], 5);
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let mut config = Config::default();
        config.backend.base_url = "localhost:8000/api".into();
        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("backend.base_url")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let mut config = Config::default();
        config.stream.max_frame_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.stream.idle_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
