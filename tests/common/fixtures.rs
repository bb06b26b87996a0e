//! Mock backend and stream fixtures

use std::path::Path;
use std::time::Duration;

use playlist_dl::{
    Config, PlaylistDownloader, PlaylistEntry, PlaylistPreview, PlaylistSelection,
};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Playlist URL used throughout the tests
pub const PLAYLIST_URL: &str = "https://www.youtube.com/playlist?list=PLtest";

/// Encode one event as a stream frame
pub fn frame(payload: Value) -> String {
    format!("data: {payload}\n\n")
}

/// Concatenate frames into a response body
pub fn body(frames: &[Value]) -> String {
    frames.iter().cloned().map(frame).collect()
}

/// Three-entry playlist preview
pub fn sample_preview() -> PlaylistPreview {
    let entry = |id: &str, title: &str| PlaylistEntry {
        id: id.to_string(),
        title: Some(title.to_string()),
        thumbnail: None,
        duration: Some(120.0),
    };
    PlaylistPreview {
        playlist_title: Some("Road Trip".to_string()),
        thumbnail: None,
        videos: vec![
            entry("vid-a", "Opening"),
            entry("vid-b", "Middle"),
            entry("vid-c", "Closing"),
        ],
    }
}

/// Selection of the sample playlist, everything selected
pub fn sample_selection() -> PlaylistSelection {
    PlaylistSelection::from_preview(PLAYLIST_URL, sample_preview())
}

/// Config pointing at `server`, with auto-save off unless a save dir is given
pub fn test_config(server: &MockServer, save_dir: Option<&Path>) -> Config {
    let mut config = Config::default();
    config.backend.base_url = server.uri();
    config.backend.request_timeout = Duration::from_secs(5);
    match save_dir {
        Some(dir) => {
            config.artifact.auto_save = true;
            config.artifact.save_dir = dir.to_path_buf();
        }
        None => config.artifact.auto_save = false,
    }
    config
}

/// Downloader pointing at `server` with auto-save off
pub fn test_downloader(server: &MockServer) -> PlaylistDownloader {
    PlaylistDownloader::new(test_config(server, None)).unwrap()
}

/// Answer `POST /downloadplaylist` with `body` for requests whose ids match
pub async fn mount_stream(server: &MockServer, video_ids: &[&str], body: String) {
    mount_stream_with(
        server,
        video_ids,
        ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"),
    )
    .await;
}

/// Answer `POST /downloadplaylist` with an arbitrary template
pub async fn mount_stream_with(server: &MockServer, video_ids: &[&str], response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/downloadplaylist"))
        .and(body_partial_json(json!({ "video_ids": video_ids })))
        .respond_with(response)
        .mount(server)
        .await;
}

/// A well-formed stream for the full sample selection ending in `completed`
pub fn successful_stream(zip_url: Option<&str>) -> String {
    let mut frames = vec![
        json!({"event": "status", "message": "Starting playlist download"}),
        json!({"event": "progress", "filename": "1 - Opening.mp3", "percent": "50.0%", "speed": "1.2MiB/s", "eta": "00:02", "video_index": 0}),
        json!({"event": "video_finished", "filename": "1 - Opening.mp3", "video_index": 0}),
        json!({"event": "progress", "filename": "2 - Middle.mp3", "percent": "80.0%", "speed": "1.1MiB/s", "eta": "00:01", "video_index": 1}),
        json!({"event": "video_finished", "filename": "2 - Middle.mp3", "video_index": 1}),
        json!({"event": "log", "message": "[download] skipping fragment", "level": "warning"}),
        json!({"event": "video_finished", "filename": "3 - Closing.mp3", "video_index": 2}),
        json!({"event": "status", "message": "Creating ZIP archive..."}),
    ];
    let mut completed = json!({"event": "completed", "message": "Playlist download finished!"});
    if let Some(zip_url) = zip_url {
        completed["zip_url"] = json!(zip_url);
    }
    frames.push(completed);
    body(&frames)
}
