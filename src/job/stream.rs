//! The per-job stream read loop
//!
//! One loop per job. Each iteration suspends on "read next chunk" (optionally
//! bounded by the idle timeout) or on cancellation, whichever comes first.
//! Before every mutation the loop re-checks that its job is still the current
//! one, so a superseded loop that has not noticed its cancellation yet can
//! never touch a newer job.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::machine::{JobMachine, Step};
use crate::error::{Error, Result};
use crate::protocol::EventDecoder;
use crate::types::JobId;

/// The orchestrator's single job slot
#[derive(Default)]
pub(crate) struct JobSlot {
    /// Bumped on every submission and teardown
    pub(crate) generation: u64,
    pub(crate) machine: Option<JobMachine>,
    pub(crate) cancel: Option<CancellationToken>,
}

/// What a read loop needs to find and guard its job
#[derive(Clone)]
pub(crate) struct LoopGuard {
    pub(crate) job_id: JobId,
    pub(crate) generation: u64,
    pub(crate) slot: Arc<Mutex<JobSlot>>,
    pub(crate) cancel: CancellationToken,
}

impl LoopGuard {
    /// Run `f` on the machine if this loop still owns the slot
    ///
    /// Returns None when the job was superseded or torn down.
    pub(crate) async fn with_machine<T>(&self, f: impl FnOnce(&mut JobMachine) -> T) -> Option<T> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let mut slot = self.slot.lock().await;
        if slot.generation != self.generation {
            return None;
        }
        let machine = slot.machine.as_mut()?;
        Some(f(machine))
    }

    async fn fail(&self, error: &Error) {
        self.with_machine(|m| m.fail_transport(error)).await;
    }
}

/// Read `body` to the end, feeding decoded events to the guarded machine
///
/// Ends on a terminal event, a transport failure, stream end, or
/// cancellation. Returns whether the loop still owned its job when it ended.
pub(crate) async fn drive<S, B, E>(
    body: S,
    guard: &LoopGuard,
    idle_timeout: Option<Duration>,
    max_frame_bytes: usize,
) -> bool
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<Error>,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = EventDecoder::new(max_frame_bytes);

    loop {
        let next = tokio::select! {
            _ = guard.cancel.cancelled() => {
                tracing::debug!(job_id = %guard.job_id, "read loop abandoned");
                return false;
            }
            next = next_chunk(&mut body, idle_timeout) => next,
        };

        let chunk = match next {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                let oversized = decoder.dropped_frames();
                let discarded = decoder.finish();
                tracing::debug!(job_id = %guard.job_id, discarded, oversized, "job stream ended");
                // Only reached if no terminal event arrived
                guard.fail(&Error::StreamClosed).await;
                return !guard.cancel.is_cancelled();
            }
            Err(e) => {
                guard.fail(&e).await;
                return !guard.cancel.is_cancelled();
            }
        };

        decoder.push(chunk.as_ref());
        let mut decoded = Vec::new();
        while let Some(next) = decoder.next_event() {
            decoded.push(next);
        }
        if decoded.is_empty() {
            continue;
        }

        let step = guard
            .with_machine(|machine| {
                for next in decoded {
                    let step = match next {
                        Ok(event) => {
                            tracing::debug!(job_id = %machine.job().id(), kind = event.kind(), "event");
                            machine.apply(event)
                        }
                        Err(dropped) => machine.record_dropped(&dropped),
                    };
                    if step != Step::Continue {
                        return step;
                    }
                }
                Step::Continue
            })
            .await;

        match step {
            Some(Step::Continue) => {}
            Some(Step::Terminal | Step::Ignored) => return true,
            None => {
                tracing::debug!(job_id = %guard.job_id, "job superseded, dropping stream");
                return false;
            }
        }
    }
}

async fn next_chunk<S, B, E>(body: &mut S, idle_timeout: Option<Duration>) -> Result<Option<B>>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    E: Into<Error>,
{
    let next = match idle_timeout {
        Some(idle) => tokio::time::timeout(idle, body.next())
            .await
            .map_err(|_| Error::StreamIdle(idle))?,
        None => body.next().await,
    };
    next.transpose().map_err(Into::into)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::NoopCompletion;
    use crate::job::MachineContext;
    use crate::reconcile::Reconciler;
    use crate::types::{ItemRef, JobStatus};
    use futures::stream;
    use tokio::sync::broadcast;
    use url::Url;

    async fn guarded_job() -> LoopGuard {
        let (events, _rx) = broadcast::channel(64);
        let ctx = MachineContext {
            reconciler: Arc::new(Reconciler::default()),
            completion: Arc::new(NoopCompletion),
            base_url: Url::parse("http://localhost:8000").unwrap(),
            events,
        };
        let cancel = CancellationToken::new();
        let slot = JobSlot {
            generation: 1,
            machine: Some(JobMachine::start(
                JobId(1),
                vec![ItemRef::new("a", 1), ItemRef::new("b", 2)],
                ctx,
            )),
            cancel: Some(cancel.clone()),
        };
        LoopGuard {
            job_id: JobId(1),
            generation: 1,
            slot: Arc::new(Mutex::new(slot)),
            cancel,
        }
    }

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = std::result::Result<&'static [u8], Error>> {
        stream::iter(parts.iter().map(|p| Ok(p.as_bytes())).collect::<Vec<_>>())
    }

    async fn status(guard: &LoopGuard) -> JobStatus {
        let slot = guard.slot.lock().await;
        slot.machine.as_ref().unwrap().job().status()
    }

    #[tokio::test]
    async fn split_frames_drive_job_to_completion() {
        let guard = guarded_job().await;
        let body = chunks(&[
            "data: {\"event\":\"progress\",\"filename\":\"2 - Fo",
            "o.mp3\",\"percent\":\"45%\"}\n",
            "\ndata: {\"event\":\"completed\",\"message\":\"ok\"}\n\n",
            "data: {\"event\":\"log\",\"message\":\"after terminal\"}\n\n",
        ]);

        assert!(drive(body, &guard, None, 1024).await);

        let slot = guard.slot.lock().await;
        let job = slot.machine.as_ref().unwrap().job();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.items()[1].progress_percent.as_deref(), Some("45%"));
        assert!(job.log().iter().all(|e| e.message != "after terminal"));
    }

    #[tokio::test]
    async fn early_end_of_stream_fails_job() {
        let guard = guarded_job().await;
        let body = chunks(&["data: {\"event\":\"status\",\"message\":\"hi\"}\n\ndata: {\"ev"]);
        drive(body, &guard, None, 1024).await;
        assert_eq!(status(&guard).await, JobStatus::Failed);
    }

    #[tokio::test]
    async fn read_error_fails_job() {
        let guard = guarded_job().await;
        let body = stream::iter(vec![
            Ok(b"data: {\"event\":\"status\",\"message\":\"hi\"}\n\n".as_slice()),
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))),
        ]);
        drive(body, &guard, None, 1024).await;

        let slot = guard.slot.lock().await;
        let job = slot.machine.as_ref().unwrap().job();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.log().iter().any(|e| e.message == "hi"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stream_times_out() {
        let guard = guarded_job().await;
        let body = chunks(&["data: {\"event\":\"status\",\"message\":\"hi\"}\n\n"])
            .chain(stream::pending());
        drive(body, &guard, Some(Duration::from_secs(30)), 1024).await;

        let slot = guard.slot.lock().await;
        let job = slot.machine.as_ref().unwrap().job();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.failure().unwrap().contains("idle"));
    }

    #[tokio::test]
    async fn cancelled_loop_leaves_job_untouched() {
        let guard = guarded_job().await;
        guard.cancel.cancel();
        let body = chunks(&["data: {\"event\":\"error\",\"message\":\"late\"}\n\n"]);
        assert!(!drive(body, &guard, None, 1024).await);
        assert_eq!(status(&guard).await, JobStatus::Running);
    }

    #[tokio::test]
    async fn superseded_loop_cannot_mutate_newer_job() {
        let guard = guarded_job().await;
        // A newer submission took the slot
        guard.slot.lock().await.generation = 2;

        let body = chunks(&["data: {\"event\":\"error\",\"message\":\"stale\"}\n\n"]);
        assert!(!drive(body, &guard, None, 1024).await);
        assert_eq!(status(&guard).await, JobStatus::Running);
    }
}
