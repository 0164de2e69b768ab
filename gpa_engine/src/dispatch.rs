//! Trigger queue: accepts job messages and runs them on a single worker.
//!
//! Callers get an acknowledgement with a job id as soon as the message is
//! queued. The worker runs one job at a time on the blocking pool, logs the
//! outcome, and never retries. Dropping every [`Dispatcher`] closes the queue;
//! the worker drains what is left and [`WorkerHandle::join`] returns a report.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::filter::{RankFilter, RecomputeFilter};
use crate::jobs::{JobError, JobSummary, run_rank_recompute, run_score_recompute};
use crate::store::{Atomic, CpaStore, EnrollmentLookup, GpaStore, GradeLookup, ScoreSource};

/// A request to run a job.
///
/// Serialized as JSON tagged by `kind`, e.g.
/// `{"kind":"recompute","term_id":"T1"}` or `{"kind":"rerank","grade_id":"G9"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobMessage {
    /// Full score recompute.
    Recompute(RecomputeFilter),
    /// Rank-only recompute.
    Rerank(RankFilter),
}

/// A malformed line in a message stream.
#[derive(Debug, thiserror::Error)]
#[error("invalid job message on line {line}: {source}")]
pub struct MessageError {
    /// 1-based line number.
    pub line: usize,
    /// Parser error.
    #[source]
    pub source: serde_json::Error,
}

/// Parse newline-delimited JSON job messages. Blank lines and lines starting
/// with `#` are skipped.
pub fn parse_messages(input: &str) -> Result<Vec<JobMessage>, MessageError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, l)| {
            let l = l.trim();
            !l.is_empty() && !l.starts_with('#')
        })
        .map(|(i, l)| {
            serde_json::from_str(l).map_err(|source| MessageError { line: i + 1, source })
        })
        .collect()
}

/// Receipt for a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobAck {
    /// Id the worker logs the job under.
    pub job_id: Uuid,
}

/// Why a message was not queued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The worker has stopped.
    #[error("job queue is closed")]
    Closed,
    /// The queue is at capacity.
    #[error("job queue is full")]
    QueueFull,
}

/// Result of one job as seen by the worker.
#[derive(Debug)]
pub struct JobOutcome {
    /// Id from the acknowledgement.
    pub job_id: Uuid,
    /// Summary on success, error otherwise.
    pub result: Result<JobSummary, JobError>,
}

/// Everything a worker ran before it stopped.
#[derive(Debug, Default)]
pub struct WorkerReport {
    /// Jobs that committed.
    pub completed: usize,
    /// Jobs that failed.
    pub failed: usize,
    /// Per-job outcomes in execution order.
    pub outcomes: Vec<JobOutcome>,
}

#[derive(Debug)]
struct Envelope {
    job_id: Uuid,
    message: JobMessage,
}

/// Sending side of the trigger queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Envelope>,
}

/// Handle on the worker task.
#[derive(Debug)]
pub struct WorkerHandle {
    task: JoinHandle<WorkerReport>,
}

impl WorkerHandle {
    /// Wait for the worker to drain the queue and stop.
    pub async fn join(self) -> WorkerReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "job worker task failed");
                WorkerReport::default()
            }
        }
    }
}

impl Dispatcher {
    /// Start a worker on the current runtime.
    ///
    /// `open_store` is called once per job on the blocking pool; jobs never
    /// share a store or a transaction.
    pub fn spawn<S, F>(
        open_store: F,
        settings: EngineSettings,
        capacity: usize,
    ) -> (Self, WorkerHandle)
    where
        S: ScoreSource
            + GradeLookup
            + EnrollmentLookup
            + GpaStore
            + CpaStore
            + Atomic
            + Send
            + 'static,
        F: Fn() -> anyhow::Result<S> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(worker_loop(rx, Arc::new(open_store), Arc::new(settings)));
        (Self { tx }, WorkerHandle { task })
    }

    /// Queue a message, waiting for room if the queue is full.
    pub async fn submit(&self, message: JobMessage) -> Result<JobAck, DispatchError> {
        let job_id = Uuid::new_v4();
        self.tx
            .send(Envelope { job_id, message })
            .await
            .map_err(|_| DispatchError::Closed)?;
        tracing::debug!(%job_id, "job queued");
        Ok(JobAck { job_id })
    }

    /// Queue a message without waiting.
    pub fn try_submit(&self, message: JobMessage) -> Result<JobAck, DispatchError> {
        let job_id = Uuid::new_v4();
        self.tx
            .try_send(Envelope { job_id, message })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
            })?;
        tracing::debug!(%job_id, "job queued");
        Ok(JobAck { job_id })
    }
}

/// Run one message against a freshly opened store.
pub fn execute<S>(
    store: &mut S,
    message: &JobMessage,
    settings: &EngineSettings,
) -> Result<JobSummary, JobError>
where
    S: ScoreSource + GradeLookup + EnrollmentLookup + GpaStore + CpaStore + Atomic,
{
    match message {
        JobMessage::Recompute(filter) => {
            run_score_recompute(store, filter, settings).map(JobSummary::Recompute)
        }
        JobMessage::Rerank(filter) => {
            run_rank_recompute(store, filter, settings).map(JobSummary::Rerank)
        }
    }
}

async fn worker_loop<S, F>(
    mut rx: mpsc::Receiver<Envelope>,
    open_store: Arc<F>,
    settings: Arc<EngineSettings>,
) -> WorkerReport
where
    S: ScoreSource + GradeLookup + EnrollmentLookup + GpaStore + CpaStore + Atomic + Send + 'static,
    F: Fn() -> anyhow::Result<S> + Send + Sync + 'static,
{
    let mut report = WorkerReport::default();
    while let Some(Envelope { job_id, message }) = rx.recv().await {
        tracing::info!(%job_id, job = ?message, "job started");
        let open_store = Arc::clone(&open_store);
        let settings = Arc::clone(&settings);
        let joined = tokio::task::spawn_blocking(move || {
            let mut store = open_store().map_err(|e| JobError::Open(format!("{e:#}")))?;
            execute(&mut store, &message, &settings)
        })
        .await;

        let result = joined.unwrap_or_else(|e| Err(JobError::Aborted(e.to_string())));
        match &result {
            Ok(summary) => {
                report.completed += 1;
                tracing::info!(%job_id, %summary, "job finished");
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(%job_id, error = %e, "job failed");
            }
        }
        report.outcomes.push(JobOutcome { job_id, result });
    }
    tracing::debug!(
        completed = report.completed,
        failed = report.failed,
        "job queue closed"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::RerankSummary;
    use crate::store::MemoryStore;
    use crate::testing::row;

    #[test]
    fn messages_are_tagged_by_kind() {
        let msgs = parse_messages(
            r#"
            # nightly
            {"kind":"recompute","term_id":"T1"}

            {"kind":"rerank","grade_id":"G9","student_id":"u1"}
            "#,
        )
        .unwrap();
        assert_eq!(
            msgs,
            vec![
                JobMessage::Recompute(RecomputeFilter {
                    term_id: Some("T1".into()),
                    ..Default::default()
                }),
                JobMessage::Rerank(RankFilter {
                    grade_id: Some("G9".into()),
                    student_id: Some("u1".into()),
                    ..Default::default()
                }),
            ]
        );
    }

    #[test]
    fn bad_line_reports_line_number() {
        let err = parse_messages("{\"kind\":\"recompute\"}\n{\"kind\":\"purge\"}\n").unwrap_err();
        assert_eq!(err.line, 2);
        let err = parse_messages("{\"kind\":\"rerank\",\"term_id\":\"T1\"}").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn message_serializes_with_kind() {
        let json = serde_json::to_string(&JobMessage::Rerank(RankFilter::default())).unwrap();
        assert!(json.contains(r#""kind":"rerank""#));
    }

    #[tokio::test]
    async fn worker_runs_jobs_in_order() {
        let store = MemoryStore::new();
        store.add_scores([row("u1", "T1", "Math")]);
        store.set_profile("u1", Some("G9"), true);

        let shared = store.clone();
        let (dispatcher, worker) =
            Dispatcher::spawn(move || Ok(shared.clone()), EngineSettings::default(), 4);
        let first = dispatcher
            .submit(JobMessage::Recompute(RecomputeFilter::default()))
            .await
            .unwrap();
        let second = dispatcher
            .submit(JobMessage::Rerank(RankFilter::default()))
            .await
            .unwrap();
        assert_ne!(first.job_id, second.job_id);
        drop(dispatcher);

        let report = worker.join().await;
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.outcomes[0].job_id, first.job_id);
        assert!(matches!(
            report.outcomes[1].result,
            Ok(JobSummary::Rerank(RerankSummary { ranks_written: 1, .. }))
        ));
        assert_eq!(store.cpa_records()[0].rank, Some(1));
    }

    #[tokio::test]
    async fn open_failure_is_reported_not_retried() {
        let (dispatcher, worker) = Dispatcher::spawn(
            || -> anyhow::Result<MemoryStore> { anyhow::bail!("database unavailable") },
            EngineSettings::default(),
            1,
        );
        dispatcher
            .submit(JobMessage::Rerank(RankFilter::default()))
            .await
            .unwrap();
        drop(dispatcher);

        let report = worker.join().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.outcomes.len(), 1);
        assert!(matches!(report.outcomes[0].result, Err(JobError::Open(_))));
    }

    #[tokio::test]
    async fn closed_queue_rejects_messages() {
        let (dispatcher, worker) =
            Dispatcher::spawn(|| Ok(MemoryStore::new()), EngineSettings::default(), 1);
        worker.task.abort();
        let _ = worker.task.await;
        let err = dispatcher
            .try_submit(JobMessage::Rerank(RankFilter::default()))
            .unwrap_err();
        assert_eq!(err, DispatchError::Closed);
    }
}
