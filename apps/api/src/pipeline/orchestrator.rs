//! Stage Orchestrator: accepts stage requests, enforces single-flight,
//! resolves inputs and runs the stage in the background.
//!
//! ```text
//!  invoke ──► try_begin (lock: busy? inputs present?) ──► spawn ──► run_stage
//!                 │                                                     │
//!                 └─ Busy / MissingArtifact returned to caller          ▼
//!                                                      finish(run, outcome)
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, Instrument};

use crate::pipeline::contracts;
use crate::pipeline::tracker::{ProgressSink, TaskSnapshot, TaskTracker};
use crate::pipeline::types::{PipelineError, StageId};
use crate::stages::{self, StageRequest, StageServices};

/// Immediate answer to a stage request. The stage's own outcome is observed
/// by polling the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvokeStatus {
    Started {
        stage: StageId,
    },
    /// Serialized with the running stage under `stage`.
    Busy {
        #[serde(rename = "stage")]
        running: StageId,
    },
}

#[derive(Clone)]
pub struct Orchestrator {
    tracker: TaskTracker,
    services: Arc<StageServices>,
}

impl Orchestrator {
    pub fn new(services: StageServices) -> Self {
        Self {
            tracker: TaskTracker::new(),
            services: Arc::new(services),
        }
    }

    pub fn services(&self) -> &StageServices {
        &self.services
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.tracker.snapshot()
    }

    pub fn reset(&self) {
        self.tracker.reset();
    }

    /// Starts `request` in the background if nothing is running and its
    /// inputs are on disk. Must be called from within a Tokio runtime.
    ///
    /// A missing input is returned as `MissingArtifact` (and recorded as the
    /// task's ERROR); a concurrent request gets `Busy` and changes nothing.
    pub fn invoke(&self, request: StageRequest) -> Result<InvokeStatus, PipelineError> {
        let stage = request.stage();
        let services = Arc::clone(&self.services);
        self.start(
            stage,
            move || {
                let inputs = contracts::resolve(&request, &self.services.store)?;
                Ok((request, inputs))
            },
            move |(request, inputs): (StageRequest, contracts::ResolvedInputs), progress| async move {
                stages::run_stage(request, inputs, &services, &progress).await
            },
        )
    }

    /// Gate, then spawn. `precheck` runs under the tracker lock; `task` gets
    /// its result and a progress sink bound to the new run.
    pub(crate) fn start<T, F, Fut>(
        &self,
        stage: StageId,
        precheck: impl FnOnce() -> Result<T, PipelineError>,
        task: F,
    ) -> Result<InvokeStatus, PipelineError>
    where
        F: FnOnce(T, ProgressSink) -> Fut,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let (run, prepared) = match self.tracker.try_begin(stage, precheck) {
            Ok(started) => started,
            Err(PipelineError::Busy { running }) => return Ok(InvokeStatus::Busy { running }),
            Err(err) => return Err(err),
        };

        let work = task(prepared, self.tracker.sink(run, stage));
        let tracker = self.tracker.clone();
        let span = tracing::info_span!("stage", stage = %stage);

        tokio::spawn(
            async move {
                // The stage runs in its own task so a panic surfaces as a
                // JoinError here instead of leaving the tracker RUNNING.
                let outcome = match tokio::spawn(work).await {
                    Ok(result) => result,
                    Err(join_err) => {
                        error!("Stage task aborted: {join_err}");
                        Err(PipelineError::ExternalFailure(format!(
                            "stage task aborted: {join_err}"
                        )))
                    }
                };
                tracker.finish(run, outcome);
            }
            .instrument(span),
        );

        Ok(InvokeStatus::Started { stage })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;
    use crate::artifacts::{ArtifactName, PostingRecord};
    use crate::pipeline::types::TaskState;
    use crate::stages::testing::{services, ScriptedGenerator};
    use crate::stages::IngestMode;

    fn orchestrator(root: &std::path::Path, generator: ScriptedGenerator) -> Orchestrator {
        Orchestrator::new(services(root, generator))
    }

    async fn explode() -> Result<(), PipelineError> {
        panic!("boom")
    }

    async fn wait_for_terminal(orchestrator: &Orchestrator) -> TaskSnapshot {
        for _ in 0..200 {
            let snapshot = orchestrator.snapshot();
            if snapshot.task_state.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task never finished: {:?}", orchestrator.snapshot());
    }

    #[tokio::test]
    async fn test_second_request_is_busy_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path(), ScriptedGenerator::default());
        let (release, gate) = oneshot::channel::<()>();

        let first = orch
            .start(StageId::RewriteJobs, || Ok(()), |(), progress| async move {
                progress.log("waiting");
                let _ = gate.await;
                Ok::<(), PipelineError>(())
            })
            .unwrap();
        assert_eq!(first, InvokeStatus::Started { stage: StageId::RewriteJobs });

        let second = orch.invoke(StageRequest::RewriteCv).unwrap();
        assert_eq!(
            second,
            InvokeStatus::Busy {
                running: StageId::RewriteJobs
            }
        );
        // The rejected request did not touch the running task.
        let snapshot = orch.snapshot();
        assert_eq!(snapshot.task_state, TaskState::Running);
        assert_eq!(snapshot.active_task, Some(StageId::RewriteJobs));

        release.send(()).unwrap();
        let done = wait_for_terminal(&orch).await;
        assert_eq!(done.task_state, TaskState::Completed);
        assert_eq!(done.logs.last().unwrap(), "--- Finished rewrite_jobs ---");
    }

    #[tokio::test]
    async fn test_stage_error_ends_in_error_state() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path(), ScriptedGenerator::default());

        orch.start(StageId::EmbedMatch, || Ok(()), |(), _| async {
            Err::<(), _>(PipelineError::ExternalFailure("embedding server down".into()))
        })
        .unwrap();

        let done = wait_for_terminal(&orch).await;
        assert_eq!(done.task_state, TaskState::Error);
        assert!(done.logs.last().unwrap().contains("embedding server down"));
    }

    #[tokio::test]
    async fn test_panicking_stage_ends_in_error_state() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path(), ScriptedGenerator::default());

        orch.start(StageId::Explain, || Ok(()), |(), _| explode())
            .unwrap();

        let done = wait_for_terminal(&orch).await;
        assert_eq!(done.task_state, TaskState::Error);
        assert!(done.logs.last().unwrap().starts_with("ERROR:"));
    }

    #[tokio::test]
    async fn test_missing_input_never_reaches_running() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path(), ScriptedGenerator::default());

        let err = orch.invoke(StageRequest::RewriteJobs).unwrap_err();
        assert!(matches!(err, PipelineError::MissingArtifact { .. }));

        let snapshot = orch.snapshot();
        assert_eq!(snapshot.task_state, TaskState::Error);
        assert_eq!(snapshot.logs.len(), 1);
        assert!(snapshot.logs[0].starts_with("ERROR:"));
        assert!(snapshot.logs[0].contains("jobs_raw.json"));
    }

    #[tokio::test]
    async fn test_reset_detaches_running_task() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path(), ScriptedGenerator::default());
        let (release, gate) = oneshot::channel::<()>();
        let (finished_tx, finished_rx) = oneshot::channel::<()>();

        orch.start(StageId::Ingest, || Ok(()), |(), progress| async move {
            let _ = gate.await;
            progress.log("late progress");
            let _ = finished_tx.send(());
            Ok::<(), PipelineError>(())
        })
        .unwrap();

        orch.reset();
        release.send(()).unwrap();
        finished_rx.await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let snapshot = orch.snapshot();
        assert_eq!(snapshot.task_state, TaskState::Idle);
        assert!(snapshot.logs.is_empty());
        assert_eq!(snapshot.status, "Ready");
    }

    #[tokio::test]
    async fn test_invoke_runs_real_stage_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let reply = r#"{"title": "Data Analyst", "company": "Acme"}"#;
        let orch = orchestrator(dir.path(), ScriptedGenerator::with_replies([reply]));

        let status = orch
            .invoke(StageRequest::Ingest(IngestMode::Text {
                text: "Acme is hiring a data analyst".into(),
            }))
            .unwrap();
        assert_eq!(status, InvokeStatus::Started { stage: StageId::Ingest });

        let done = wait_for_terminal(&orch).await;
        assert_eq!(done.task_state, TaskState::Completed, "{:?}", done.logs);
        assert_eq!(done.logs.first().unwrap(), "--- Starting ingest ---");

        let rows: Vec<PostingRecord> = orch
            .services()
            .store
            .read_records(ArtifactName::RawPostings)
            .await
            .unwrap();
        assert_eq!(rows[0].company, "Acme");
    }

    #[tokio::test]
    async fn test_new_run_clears_previous_log() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path(), ScriptedGenerator::default());

        let _ = orch.invoke(StageRequest::RewriteJobs);
        assert_eq!(orch.snapshot().task_state, TaskState::Error);

        orch.start(StageId::Ingest, || Ok(()), |(), _| async { Ok::<(), PipelineError>(()) })
            .unwrap();
        let done = wait_for_terminal(&orch).await;
        assert_eq!(done.task_state, TaskState::Completed);
        assert!(done.logs.iter().all(|l| !l.starts_with("ERROR:")));
    }
}
