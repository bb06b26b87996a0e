//! Job control: submit, supersede, cancel

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::PlaylistDownloader;
use crate::error::{Error, JobError, Result};
use crate::job::stream::{JobSlot, LoopGuard, drive};
use crate::job::{BatchJob, JobMachine};
use crate::selection::PlaylistSelection;
use crate::types::{JobId, JobStatus, PlaylistDownloadRequest};

/// A submitted job's id and its read loop task
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    task: JoinHandle<Option<BatchJob>>,
}

impl JobHandle {
    /// Id of the submitted job
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Wait for the read loop to finish
    ///
    /// Returns the final job record, or None if the job was cancelled or
    /// superseded before its loop ended.
    pub async fn join(self) -> Result<Option<BatchJob>> {
        self.task
            .await
            .map_err(|e| Error::Other(format!("read loop task failed: {e}")))
    }
}

impl PlaylistDownloader {
    /// Submit a playlist selection as a new job
    ///
    /// The job enters Running immediately and the stream is opened by the
    /// spawned read loop; an open failure ends the job as Failed rather than
    /// being returned here. Refused while another job is still Running.
    ///
    /// # Errors
    ///
    /// - [`JobError::EmptySelection`] if nothing is selected
    /// - [`JobError::AlreadyRunning`] if the current job has not finished
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use playlist_dl::{PlaylistDownloader, PlaylistSelection, Result};
    /// # async fn example(downloader: PlaylistDownloader) -> Result<()> {
    /// let url = "https://www.youtube.com/playlist?list=PL123";
    /// let preview = downloader.preview_playlist(url).await?;
    /// let selection = PlaylistSelection::from_preview(url, preview);
    /// let handle = downloader.submit(&selection).await?;
    /// if let Some(job) = handle.join().await? {
    ///     println!("{:?}: {} items finished", job.status(), job.completed_count());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit(&self, selection: &PlaylistSelection) -> Result<JobHandle> {
        let request = selection.to_request(&self.config.backend.download_path)?;

        let mut slot = self.slot.lock().await;
        if let Some(machine) = slot.machine.as_ref()
            && machine.job().status() == JobStatus::Running
        {
            return Err(JobError::AlreadyRunning {
                id: machine.job().id(),
            }
            .into());
        }
        Ok(self.start_locked(&mut slot, selection, request))
    }

    /// Cancel the running job, if any, and submit `selection` in its place
    pub async fn supersede(&self, selection: &PlaylistSelection) -> Result<JobHandle> {
        let request = selection.to_request(&self.config.backend.download_path)?;

        let mut slot = self.slot.lock().await;
        if let Some(previous) = teardown_locked(&mut slot) {
            tracing::info!(job_id = %previous, "superseding running job");
        }
        Ok(self.start_locked(&mut slot, selection, request))
    }

    /// Abandon the current job and return to Idle
    ///
    /// The read loop is cancelled and the job record discarded; nothing the
    /// abandoned loop reads afterwards is applied. Returns the discarded job's id.
    pub async fn cancel(&self) -> Option<JobId> {
        let mut slot = self.slot.lock().await;
        let id = teardown_locked(&mut slot)?;
        tracing::info!(job_id = %id, "playlist job cancelled");
        Some(id)
    }

    fn start_locked(
        &self,
        slot: &mut JobSlot,
        selection: &PlaylistSelection,
        request: PlaylistDownloadRequest,
    ) -> JobHandle {
        slot.generation += 1;
        let id = JobId(slot.generation);
        let cancel = CancellationToken::new();

        slot.machine = Some(JobMachine::start(id, selection.items(), self.ctx.clone()));
        if let Some(stale) = slot.cancel.replace(cancel.clone()) {
            stale.cancel();
        }

        let guard = LoopGuard {
            job_id: id,
            generation: slot.generation,
            slot: Arc::clone(&self.slot),
            cancel,
        };
        let client = self.client.clone();
        let idle_timeout = self.config.stream.idle_timeout;
        let max_frame_bytes = self.config.stream.max_frame_bytes;

        let task = tokio::spawn(async move {
            let opened = tokio::select! {
                _ = guard.cancel.cancelled() => return None,
                opened = client.open_playlist_stream(&request) => opened,
            };
            match opened {
                Ok(response) => {
                    let owned =
                        drive(response.bytes_stream(), &guard, idle_timeout, max_frame_bytes).await;
                    if !owned {
                        tracing::debug!(job_id = %id, "job replaced before its stream ended");
                        return None;
                    }
                }
                Err(e) => {
                    guard.with_machine(|m| m.fail_transport(&e)).await;
                }
            }
            guard.with_machine(|m| m.job().clone()).await
        });

        JobHandle { id, task }
    }
}

/// Cancel and discard whatever job occupies the slot
fn teardown_locked(slot: &mut JobSlot) -> Option<JobId> {
    if let Some(cancel) = slot.cancel.take() {
        cancel.cancel();
    }
    let machine = slot.machine.take()?;
    slot.generation += 1;
    Some(machine.job().id())
}
