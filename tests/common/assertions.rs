//! Custom assertions for integration tests

use std::path::{Path, PathBuf};
use std::time::Duration;

use playlist_dl::{JobEvent, JobId};
use tokio::sync::broadcast;

/// Result of waiting for a job to finish
#[derive(Debug, PartialEq)]
pub enum WaitResult {
    /// Job completed successfully
    Completed,
    /// Job failed with message
    Failed(String),
    /// Timeout waiting for a terminal event
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for job `id` to emit a terminal event
pub async fn wait_for_terminal(
    events: &mut broadcast::Receiver<JobEvent>,
    id: JobId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(JobEvent::Completed { job_id }) if job_id == id => return WaitResult::Completed,
                Ok(JobEvent::Failed { job_id, message }) if job_id == id => {
                    return WaitResult::Failed(message);
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Drain every event already queued on `events`
pub fn drain(events: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Poll until `dir` holds exactly one file of `len` bytes, returning it
pub async fn wait_for_single_file(dir: &Path, len: u64, timeout: Duration) -> Option<PathBuf> {
    tokio::time::timeout(timeout, async {
        loop {
            if let Ok(entries) = std::fs::read_dir(dir) {
                let files: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
                if let [file] = files.as_slice()
                    && std::fs::metadata(file).is_ok_and(|m| m.len() == len)
                {
                    return Some(file.clone());
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .ok()
    .flatten()
}
