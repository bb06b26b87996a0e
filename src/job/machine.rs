//! Job lifecycle transitions
//!
//! ```text
//! Idle ──submit──▶ Running ──completed──▶ Completed
//!                    │  ▲
//!                    │  └─ status / progress / video_finished / log
//!                    └──── error | transport failure ──▶ Failed
//! ```
//!
//! Terminal states absorb everything: once Completed or Failed, further events
//! are neither logged nor applied. Leaving a terminal state takes a fresh
//! submission, which builds a new machine.

use std::sync::Arc;
use tokio::sync::broadcast;
use url::Url;

use super::BatchJob;
use crate::completion::{CompletionHandler, resolve_artifact};
use crate::error::Error;
use crate::protocol::{DroppedFrame, ProtocolEvent};
use crate::reconcile::{Reconciler, Reconciliation, ReportRef};
use crate::types::{ItemRef, JobEvent, JobId, JobStatus, LogEntry, LogLevel};

/// Collaborators shared by every job of one orchestrator
#[derive(Clone)]
pub struct MachineContext {
    /// Progress correlation
    pub reconciler: Arc<Reconciler>,
    /// Artifact hand-off on success
    pub completion: Arc<dyn CompletionHandler>,
    /// Backend base for resolving relative artifact paths
    pub base_url: Url,
    /// Observer channel
    pub events: broadcast::Sender<JobEvent>,
}

/// Outcome of feeding one input to the machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Job still running
    Continue,
    /// This input moved the job to Completed or Failed
    Terminal,
    /// Job was already terminal; nothing changed
    Ignored,
}

/// Owns one [`BatchJob`] and is its only writer
pub struct JobMachine {
    job: BatchJob,
    ctx: MachineContext,
}

impl JobMachine {
    /// Enter Running with a snapshot of the selected items
    pub fn start(id: JobId, items: Vec<ItemRef>, ctx: MachineContext) -> Self {
        let item_count = items.len();
        let mut machine = Self {
            job: BatchJob::new(id, items),
            ctx,
        };
        tracing::info!(job_id = %id, items = item_count, "playlist job submitted");
        machine.emit(JobEvent::Submitted {
            job_id: id,
            item_count,
        });
        machine.append(
            LogLevel::Info,
            format!("Starting playlist download ({item_count} items)"),
        );
        machine
    }

    /// Current job record
    pub fn job(&self) -> &BatchJob {
        &self.job
    }

    /// Apply one classified event
    pub fn apply(&mut self, event: ProtocolEvent) -> Step {
        if self.job.status.is_terminal() {
            tracing::debug!(job_id = %self.job.id, kind = event.kind(), "ignoring event after terminal state");
            return Step::Ignored;
        }

        match event {
            ProtocolEvent::Status { message } => {
                self.append(LogLevel::Info, message);
                Step::Continue
            }
            ProtocolEvent::Progress {
                filename,
                percent,
                speed,
                eta,
                video_index,
            } => {
                self.append(
                    LogLevel::Info,
                    format!("{filename} | {percent} @ {speed} (ETA {eta})"),
                );
                let report = ReportRef {
                    filename: &filename,
                    video_index,
                };
                let outcome =
                    self.ctx
                        .reconciler
                        .apply_progress(&mut self.job.items, report, &percent);
                self.after_reconcile(outcome, &filename);
                Step::Continue
            }
            ProtocolEvent::ItemFinished {
                filename,
                video_index,
                ..
            } => {
                self.append(LogLevel::Info, format!("Finished: {filename}"));
                let report = ReportRef {
                    filename: &filename,
                    video_index,
                };
                let outcome = self
                    .ctx
                    .reconciler
                    .apply_finished(&mut self.job.items, report);
                self.after_reconcile(outcome, &filename);
                Step::Continue
            }
            ProtocolEvent::Log { message, level } => {
                self.append(level.unwrap_or_default(), message);
                Step::Continue
            }
            ProtocolEvent::Completed { message, zip_url } => {
                self.complete(message, zip_url.as_deref());
                Step::Terminal
            }
            ProtocolEvent::Error { message } => {
                self.fail(message);
                Step::Terminal
            }
        }
    }

    /// Record a frame the classifier could not use; never changes status
    pub fn record_dropped(&mut self, dropped: &DroppedFrame) -> Step {
        if self.job.status.is_terminal() {
            return Step::Ignored;
        }
        tracing::warn!(job_id = %self.job.id, error = %dropped.error, "dropping malformed frame");
        self.append(
            LogLevel::Warning,
            format!("Dropped malformed frame: {}", dropped.error),
        );
        Step::Continue
    }

    /// Fail the job because the stream could not be opened or read
    pub fn fail_transport(&mut self, error: &Error) -> Step {
        if self.job.status.is_terminal() {
            return Step::Ignored;
        }
        tracing::warn!(job_id = %self.job.id, error = %error, "job stream failed");
        self.fail(format!("Stream error occurred: {error}"));
        Step::Terminal
    }

    fn after_reconcile(&mut self, outcome: Reconciliation, filename: &str) {
        match outcome {
            Reconciliation::Updated(pos) => {
                let item = self.job.items[pos].clone();
                self.emit(JobEvent::ItemUpdated {
                    job_id: self.job.id,
                    item,
                });
            }
            Reconciliation::NoOrdinal => {
                tracing::warn!(job_id = %self.job.id, filename, "report carries no item ordinal");
            }
            Reconciliation::OutOfRange(ordinal) => {
                tracing::warn!(
                    job_id = %self.job.id,
                    filename,
                    ordinal,
                    items = self.job.items.len(),
                    "report matches no submitted item"
                );
            }
        }
    }

    fn complete(&mut self, message: String, zip_url: Option<&str>) {
        self.append(LogLevel::Info, message);

        if let Some(zip_url) = zip_url {
            match resolve_artifact(&self.ctx.base_url, zip_url) {
                Ok(location) => {
                    self.job.artifact = Some(location.clone());
                    self.emit(JobEvent::ArtifactReady {
                        job_id: self.job.id,
                        location: location.to_string(),
                    });
                    let handler = Arc::clone(&self.ctx.completion);
                    let job_id = self.job.id;
                    match tokio::runtime::Handle::try_current() {
                        Ok(runtime) => {
                            tracing::debug!(job_id = %job_id, handler = handler.name(), "handing off artifact");
                            runtime.spawn(async move { handler.artifact_ready(job_id, location).await });
                        }
                        Err(_) => {
                            tracing::warn!(
                                job_id = %job_id,
                                handler = handler.name(),
                                %location,
                                "no async runtime, artifact hand-off skipped"
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(job_id = %self.job.id, zip_url, error = %e, "unresolvable artifact location");
                    self.append(
                        LogLevel::Warning,
                        format!("Could not resolve artifact location '{zip_url}': {e}"),
                    );
                }
            }
        }

        self.job.status = JobStatus::Completed;
        tracing::info!(
            job_id = %self.job.id,
            finished = self.job.completed_count(),
            items = self.job.items.len(),
            "playlist job completed"
        );
        self.emit(JobEvent::Completed {
            job_id: self.job.id,
        });
    }

    fn fail(&mut self, message: String) {
        self.append(LogLevel::Error, message.clone());
        self.job.status = JobStatus::Failed;
        self.job.failure = Some(message.clone());
        tracing::info!(job_id = %self.job.id, reason = %message, "playlist job failed");
        self.emit(JobEvent::Failed {
            job_id: self.job.id,
            message,
        });
    }

    fn append(&mut self, level: LogLevel, message: String) {
        let entry = LogEntry::new(level, message);
        self.job.log.push(entry.clone());
        self.emit(JobEvent::Logged {
            job_id: self.job.id,
            entry,
        });
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine
        self.ctx.events.send(event).ok();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::NoopCompletion;
    use crate::error::FrameError;
    use crate::protocol::RawFrame;
    use crate::types::ItemId;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct Recorder(mpsc::UnboundedSender<(JobId, Url)>);

    #[async_trait]
    impl CompletionHandler for Recorder {
        async fn artifact_ready(&self, job_id: JobId, location: Url) {
            self.0.send((job_id, location)).ok();
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    fn context(completion: Arc<dyn CompletionHandler>) -> (MachineContext, broadcast::Receiver<JobEvent>) {
        let (events, rx) = broadcast::channel(64);
        let ctx = MachineContext {
            reconciler: Arc::new(Reconciler::default()),
            completion,
            base_url: Url::parse("http://localhost:8000").unwrap(),
            events,
        };
        (ctx, rx)
    }

    fn machine() -> JobMachine {
        let (ctx, _rx) = context(Arc::new(NoopCompletion));
        JobMachine::start(
            JobId(1),
            vec![ItemRef::new("a", 1), ItemRef::new("b", 2)],
            ctx,
        )
    }

    fn progress(filename: &str, percent: &str) -> ProtocolEvent {
        ProtocolEvent::Progress {
            filename: filename.into(),
            percent: percent.into(),
            speed: "1MiB/s".into(),
            eta: "00:05".into(),
            video_index: None,
        }
    }

    #[tokio::test]
    async fn running_events_append_to_log() {
        let mut m = machine();
        assert_eq!(m.job().status(), JobStatus::Running);
        assert_eq!(m.job().log().len(), 1);

        assert_eq!(
            m.apply(ProtocolEvent::Status {
                message: "Creating ZIP archive...".into()
            }),
            Step::Continue
        );
        m.apply(ProtocolEvent::Log {
            message: "[video_1] slow".into(),
            level: Some(LogLevel::Warning),
        });

        let log = m.job().log();
        assert_eq!(log.len(), 3);
        assert_eq!(log[1].message, "Creating ZIP archive...");
        assert_eq!(log[2].level, LogLevel::Warning);
        assert_eq!(m.job().status(), JobStatus::Running);
    }

    #[tokio::test]
    async fn progress_is_reconciled_and_logged() {
        let mut m = machine();
        m.apply(progress("2 - Foo.mp3", "45%"));

        let job = m.job();
        assert_eq!(
            job.item(&ItemId::from("b")).unwrap().progress_percent.as_deref(),
            Some("45%")
        );
        assert_eq!(job.item(&ItemId::from("a")).unwrap().progress_percent, None);
        assert_eq!(
            job.log().last().unwrap().message,
            "2 - Foo.mp3 | 45% @ 1MiB/s (ETA 00:05)"
        );
    }

    #[tokio::test]
    async fn finished_overrides_lower_progress() {
        let mut m = machine();
        m.apply(progress("1 - Bar.mp3", "12%"));
        m.apply(ProtocolEvent::ItemFinished {
            filename: "1 - Bar.mp3".into(),
            video_index: None,
            message: None,
        });

        let item = m.job().item(&ItemId::from("a")).unwrap();
        assert!(item.completed);
        assert_eq!(item.progress_percent.as_deref(), Some("100%"));
        assert_eq!(m.job().completed_count(), 1);
    }

    #[tokio::test]
    async fn unmatched_progress_is_logged_but_mutates_nothing() {
        let mut m = machine();
        let before = m.job().items().to_vec();
        assert_eq!(m.apply(progress("9 - Ghost.mp3", "50%")), Step::Continue);
        assert_eq!(m.job().items(), before.as_slice());
        assert_eq!(m.job().log().len(), 2);
    }

    #[tokio::test]
    async fn completed_resolves_artifact_and_hands_off_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (ctx, mut events) = context(Arc::new(Recorder(tx)));
        let mut m = JobMachine::start(JobId(4), vec![ItemRef::new("a", 1)], ctx);

        let step = m.apply(ProtocolEvent::Completed {
            message: "Playlist download finished!".into(),
            zip_url: Some("/files/x.zip".into()),
        });
        assert_eq!(step, Step::Terminal);
        assert_eq!(m.job().status(), JobStatus::Completed);
        assert_eq!(
            m.job().artifact().map(Url::as_str),
            Some("http://localhost:8000/files/x.zip")
        );

        let (job_id, location) = rx.recv().await.unwrap();
        assert_eq!(job_id, JobId(4));
        assert_eq!(location.as_str(), "http://localhost:8000/files/x.zip");

        // A second completed is ignored and triggers nothing
        assert_eq!(
            m.apply(ProtocolEvent::Completed {
                message: "again".into(),
                zip_url: Some("/files/y.zip".into()),
            }),
            Step::Ignored
        );
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        let mut saw_artifact = 0;
        let mut saw_completed = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                JobEvent::ArtifactReady { .. } => saw_artifact += 1,
                JobEvent::Completed { .. } => saw_completed += 1,
                _ => {}
            }
        }
        assert_eq!((saw_artifact, saw_completed), (1, 1));
    }

    #[tokio::test]
    async fn completed_without_artifact_is_still_success() {
        let mut m = machine();
        m.apply(ProtocolEvent::Completed {
            message: "nothing to fetch".into(),
            zip_url: None,
        });
        assert_eq!(m.job().status(), JobStatus::Completed);
        assert!(m.job().artifact().is_none());
    }

    #[tokio::test]
    async fn error_fails_and_stops_further_application() {
        let mut m = machine();
        m.apply(progress("1 - A.mp3", "30%"));
        assert_eq!(
            m.apply(ProtocolEvent::Error {
                message: "Video #2 failed: unavailable".into()
            }),
            Step::Terminal
        );
        assert_eq!(m.job().status(), JobStatus::Failed);
        assert_eq!(m.job().failure(), Some("Video #2 failed: unavailable"));
        let log_len = m.job().log().len();
        assert_eq!(m.job().log().last().unwrap().level, LogLevel::Error);

        assert_eq!(m.apply(progress("1 - A.mp3", "90%")), Step::Ignored);
        assert_eq!(
            m.apply(ProtocolEvent::Completed {
                message: "late".into(),
                zip_url: None
            }),
            Step::Ignored
        );
        assert_eq!(m.job().status(), JobStatus::Failed);
        assert_eq!(m.job().log().len(), log_len);
        // Progress recorded before the failure is preserved
        assert_eq!(m.job().items()[0].progress_percent.as_deref(), Some("30%"));
    }

    #[tokio::test]
    async fn transport_failure_and_dropped_frames() {
        let mut m = machine();
        let dropped = DroppedFrame {
            frame: RawFrame::from("data: {oops"),
            error: FrameError::NotAnObject,
        };
        assert_eq!(m.record_dropped(&dropped), Step::Continue);
        assert_eq!(m.job().status(), JobStatus::Running);
        assert_eq!(m.job().log().last().unwrap().level, LogLevel::Warning);

        assert_eq!(m.fail_transport(&Error::StreamClosed), Step::Terminal);
        assert_eq!(m.job().status(), JobStatus::Failed);
        assert!(m.job().failure().unwrap().starts_with("Stream error occurred"));
        assert_eq!(m.fail_transport(&Error::StreamClosed), Step::Ignored);
        assert_eq!(m.record_dropped(&dropped), Step::Ignored);
    }

    #[test]
    fn completion_outside_a_runtime_still_completes() {
        let mut m = machine();
        let step = m.apply(ProtocolEvent::Completed {
            message: "done".into(),
            zip_url: Some("/files/x.zip".into()),
        });

        assert_eq!(step, Step::Terminal);
        assert_eq!(m.job().status(), JobStatus::Completed);
        assert_eq!(
            m.job().artifact().map(Url::as_str),
            Some("http://localhost:8000/files/x.zip")
        );
    }
}
