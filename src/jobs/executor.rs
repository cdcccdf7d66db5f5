//! Job executor.
//!
//! `execute(job_id, trace_id)` is invoked once per delivered work message
//! and is idempotent under redelivery: terminal jobs are absorbed, a job
//! found `running` is treated as a crashed run and restarted from a clean
//! slate (segments deleted, cascading to their assets, markup cleared).
//!
//! Pipeline failures mark the job failed and still return `Ok` so the
//! consumer commits; only infrastructure errors (database) propagate as
//! `Err`, leaving the message uncommitted for redelivery.

use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ai::VisionExtractor;
use crate::database::{
    segment_repository::NewSegment, AssetRepository, FileRepository, JobRepository,
    SegmentRepository,
};
use crate::jobs::markup;
use crate::messaging::{EventPublisher, JobEvent, WebhookMessage};
use crate::models::{ExtractionStatus, InputSource, Job, JobStatus};
use crate::pipeline::{PipelineError, SegmentPipeline};
use crate::segmentation::SegmentationEngine;
use crate::storage::ObjectStore;

/// Separator between extracted parts of a multi-file input.
const PART_SEPARATOR: &str = "\n\n---\n\n";

/// Error code recorded on failed jobs.
const PROCESSING_ERROR: &str = "processing_error";

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Internal split between "the job failed" and "the infrastructure failed".
enum RunError {
    Pipeline(String),
    Infra(sqlx::Error),
}

impl From<sqlx::Error> for RunError {
    fn from(e: sqlx::Error) -> Self {
        Self::Infra(e)
    }
}

pub struct JobExecutor {
    jobs: JobRepository,
    segments: SegmentRepository,
    assets: AssetRepository,
    files: FileRepository,
    store: Arc<dyn ObjectStore>,
    vision: Arc<dyn VisionExtractor>,
    engine: SegmentationEngine,
    pipeline: Arc<SegmentPipeline>,
    publisher: Arc<dyn EventPublisher>,
    max_concurrent_segments: usize,
}

impl JobExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: JobRepository,
        segments: SegmentRepository,
        assets: AssetRepository,
        files: FileRepository,
        store: Arc<dyn ObjectStore>,
        vision: Arc<dyn VisionExtractor>,
        engine: SegmentationEngine,
        pipeline: Arc<SegmentPipeline>,
        publisher: Arc<dyn EventPublisher>,
        max_concurrent_segments: usize,
    ) -> Self {
        Self {
            jobs,
            segments,
            assets,
            files,
            store,
            vision,
            engine,
            pipeline,
            publisher,
            max_concurrent_segments: max_concurrent_segments.max(1),
        }
    }

    pub async fn execute(&self, job_id: Uuid, trace_id: &str) -> Result<(), ExecuteError> {
        let Some(job) = self.jobs.fetch(job_id).await? else {
            warn!(%job_id, "work message for unknown job, dropping");
            return Ok(());
        };

        if job.status.is_terminal() {
            debug!(%job_id, status = ?job.status, "job already terminal, absorbing redelivery");
            return Ok(());
        }

        if job.status == JobStatus::Running {
            // A prior worker died mid-run. Segments have no (job_id, idx)
            // uniqueness, so a partial run must be wiped before re-running.
            let removed = self.segments.delete_for_job(job_id).await?;
            self.jobs.clear_output(job_id).await?;
            info!(%job_id, removed, "restarting job found running");
        }

        self.jobs.mark_running(job_id).await?;
        info!(%job_id, trace_id, "job started");

        match self.run(&job).await {
            Ok(markup) => {
                self.jobs.finish_success(job_id, &markup).await?;
                info!(%job_id, "job succeeded");
                self.emit(job_id, JobEvent::JobCompleted, trace_id).await;
                Ok(())
            }
            Err(RunError::Pipeline(message)) => {
                self.jobs
                    .finish_failure(job_id, PROCESSING_ERROR, &message)
                    .await?;
                error!(%job_id, "job failed: {}", message);
                self.emit(job_id, JobEvent::JobFailed, trace_id).await;
                Ok(())
            }
            Err(RunError::Infra(e)) => Err(e.into()),
        }
    }

    async fn run(&self, job: &Job) -> Result<String, RunError> {
        let input = self.resolve_input(job).await?;
        let input = input.trim();

        let planned = self
            .engine
            .segment(input, job.segments_count, job.input_type)
            .await;

        // Serial writes in idx order.
        let mut rows = Vec::with_capacity(planned.len());
        for seg in &planned {
            let row = self
                .segments
                .create(
                    job.id,
                    &NewSegment {
                        idx: seg.idx as i32,
                        start_char: seg.start_char as i64,
                        end_char: seg.end_char as i64,
                        title: Some(sanitize(&seg.title)),
                        text: sanitize(&seg.text),
                    },
                )
                .await?;
            rows.push(row);
        }

        self.fan_out(job, rows).await?;

        // Markup reads segments and assets back after fan-out completes.
        let sources = self.files.job_files(job.id).await?;
        let segments = self.segments.list_for_job(job.id).await?;
        let assets = self.assets.list_for_job(job.id).await?;
        Ok(markup::compose(&sources, &segments, &assets))
    }

    /// Resolve the segmentation input. File and mixed inputs run vision
    /// extraction over every linked file in declared order and persist the
    /// combined text.
    async fn resolve_input(&self, job: &Job) -> Result<String, RunError> {
        match job.input_source {
            InputSource::Text => Ok(job.input_text.clone()),
            InputSource::Files | InputSource::Mixed => {
                let mut parts = Vec::new();
                if job.input_source == InputSource::Mixed && !job.input_text.trim().is_empty() {
                    parts.push(job.input_text.clone());
                }

                for (link, file) in self.files.job_files(job.id).await? {
                    let bytes = self.store.get(&file.object_key).await.map_err(|e| {
                        RunError::Pipeline(format!("fetch file {}: {e}", file.id))
                    })?;

                    match self
                        .vision
                        .extract_text(&bytes, &file.mime_type, job.input_type)
                        .await
                    {
                        Ok(text) => {
                            self.files
                                .set_extraction(
                                    job.id,
                                    file.id,
                                    ExtractionStatus::Done,
                                    Some(&text),
                                )
                                .await?;
                            parts.push(text);
                        }
                        Err(e) => {
                            if let Err(mark) = self
                                .files
                                .set_extraction(job.id, link.file_id, ExtractionStatus::Failed, None)
                                .await
                            {
                                warn!(file = %file.id, "failed to record extraction failure: {}", mark);
                            }
                            return Err(RunError::Pipeline(format!(
                                "extract file {}: {e}",
                                file.id
                            )));
                        }
                    }
                }

                let combined = parts.join(PART_SEPARATOR);
                self.jobs.set_extracted_text(job.id, &combined).await?;
                Ok(combined)
            }
        }
    }

    /// Bounded per-segment fan-out. The first failure is captured; every
    /// in-flight segment still runs to completion before the job fails.
    async fn fan_out(
        &self,
        job: &Job,
        rows: Vec<crate::models::SegmentRow>,
    ) -> Result<(), RunError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_segments));
        let first_error: Arc<Mutex<Option<(i32, PipelineError)>>> = Arc::new(Mutex::new(None));

        let mut handles = Vec::with_capacity(rows.len());
        for row in rows {
            let semaphore = semaphore.clone();
            let pipeline = self.pipeline.clone();
            let first_error = first_error.clone();
            let job = job.clone();

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if let Err(e) = pipeline.process_segment(&job, &row).await {
                    let mut slot = first_error.lock().unwrap_or_else(|p| p.into_inner());
                    if slot.is_none() {
                        *slot = Some((row.idx, e));
                    }
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(job = %job.id, "segment task panicked: {}", e);
            }
        }

        let failure = first_error.lock().unwrap_or_else(|p| p.into_inner()).take();
        match failure {
            Some((idx, e)) => Err(RunError::Pipeline(format!("segment {idx}: {e}"))),
            None => Ok(()),
        }
    }

    /// Terminal-event emission is at-least-once via the message log; a
    /// publish failure never changes the job outcome.
    async fn emit(&self, job_id: Uuid, event: JobEvent, trace_id: &str) {
        let message = WebhookMessage {
            job_id,
            event,
            trace_id: trace_id.to_string(),
        };
        if let Err(e) = self.publisher.publish_webhook_event(&message).await {
            warn!(%job_id, "failed to emit terminal event: {}", e);
        }
    }
}

/// Valid UTF-8 in, valid UTF-8 out; lone surrogates or invalid sequences
/// from providers were already replaced with U+FFFD at decode time, so this
/// only strips NUL bytes Postgres cannot store.
fn sanitize(s: &str) -> String {
    if s.contains('\0') {
        s.replace('\0', "\u{FFFD}")
    } else {
        s.to_string()
    }
}

/// Consumes `jobs` messages and drives the executor.
pub struct JobMessageHandler {
    executor: JobExecutor,
}

impl JobMessageHandler {
    pub fn new(executor: JobExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait::async_trait]
impl crate::messaging::MessageHandler for JobMessageHandler {
    async fn handle(&self, payload: &[u8]) -> anyhow::Result<()> {
        let message: crate::messaging::JobMessage = match serde_json::from_slice(payload) {
            Ok(m) => m,
            Err(e) => {
                // Malformed messages can never succeed; drop them.
                warn!("malformed jobs message, dropping: {}", e);
                return Ok(());
            }
        };

        self.executor
            .execute(message.job_id, &message.trace_id)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_nul() {
        assert_eq!(sanitize("a\0b"), "a\u{FFFD}b");
        assert_eq!(sanitize("plain"), "plain");
    }
}
