//! Executor integration scenarios against a live Postgres.
//!
//! Run with a scratch database:
//!   DATABASE_URL=postgresql://localhost/stories_test cargo test -- --ignored

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use stories::ai::{
    AiResult, Capabilities, FactCheckReport, GeneratedImage, SynthesizedAudio,
};
use stories::database::{
    api_key_repository::QuotaOutcome, job_repository::NewJob, segment_repository::NewSegment,
    ApiKeyRepository, AssetRepository, FileRepository, JobRepository, PgBoundaryCache,
    SegmentRepository,
};
use stories::jobs::JobExecutor;
use stories::messaging::{EventPublisher, JobMessage, MessagingError, WebhookMessage};
use stories::models::{
    ApiKey, AssetKind, AudioType, InputSource, InputType, JobStatus, KeyStatus, QuotaPeriod,
    SegmentStatus,
};
use stories::pipeline::{PipelineSettings, SegmentPipeline};
use stories::segmentation::SegmentationEngine;
use stories::storage::{ObjectStore, StorageError};

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(b, _)| b.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn presign_get(&self, key: &str, _expires_in: Duration) -> Result<String, StorageError> {
        Ok(format!("memory://{key}"))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn bucket(&self) -> &str {
        "test-bucket"
    }
}

struct StubSegmentation {
    boundaries: Vec<usize>,
    calls: AtomicUsize,
}

#[async_trait]
impl stories::ai::SegmentationModel for StubSegmentation {
    async fn propose_boundaries(
        &self,
        _text: &str,
        _grapheme_count: usize,
        _target_count: usize,
        _input_type: InputType,
    ) -> AiResult<Vec<usize>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.boundaries.clone())
    }
}

struct StubNarration;

#[async_trait]
impl stories::ai::NarrationModel for StubNarration {
    async fn narrate(
        &self,
        segment_text: &str,
        _audio_type: AudioType,
        _input_type: InputType,
    ) -> AiResult<String> {
        Ok(format!("Narration for: {segment_text}"))
    }
}

struct StubSpeech;

#[async_trait]
impl stories::ai::SpeechSynthesizer for StubSpeech {
    async fn synthesize(
        &self,
        _script: &str,
        _audio_type: AudioType,
        _voice: &str,
    ) -> AiResult<SynthesizedAudio> {
        Ok(SynthesizedAudio {
            bytes: vec![0u8; 480],
            mime_type: "audio/L16; rate=24000".to_string(),
        })
    }
}

struct StubPrompt;

#[async_trait]
impl stories::ai::ImagePromptModel for StubPrompt {
    async fn image_prompt(&self, _segment_text: &str, _input_type: InputType) -> AiResult<String> {
        Ok("a calm illustration".to_string())
    }
}

struct StubImage;

#[async_trait]
impl stories::ai::ImageGenerator for StubImage {
    async fn generate(&self, _prompt: &str) -> AiResult<GeneratedImage> {
        Ok(GeneratedImage {
            bytes: vec![0x89, 0x50, 0x4e, 0x47],
            mime_type: "image/png".to_string(),
        })
    }
}

struct StubVision;

#[async_trait]
impl stories::ai::VisionExtractor for StubVision {
    async fn extract_text(
        &self,
        _bytes: &[u8],
        _mime_type: &str,
        _input_type: InputType,
    ) -> AiResult<String> {
        Ok("Extracted prose from a document.".to_string())
    }
}

struct StubFactCheck;

#[async_trait]
impl stories::ai::FactChecker for StubFactCheck {
    async fn fact_check(&self, _claim: &str) -> AiResult<FactCheckReport> {
        Ok(FactCheckReport {
            verdict: "accurate".to_string(),
            explanation: "stub".to_string(),
        })
    }
}

#[derive(Default)]
struct CollectingPublisher {
    webhook_events: Mutex<Vec<WebhookMessage>>,
}

#[async_trait]
impl EventPublisher for CollectingPublisher {
    async fn publish_job(&self, _message: &JobMessage) -> Result<(), MessagingError> {
        Ok(())
    }

    async fn publish_webhook_event(&self, message: &WebhookMessage) -> Result<(), MessagingError> {
        self.webhook_events.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required for integration tests");
    let pool = PgPool::connect(&url).await.expect("connect");
    stories::database::MIGRATOR.run(&pool).await.expect("migrations");
    pool
}

async fn seed_api_key(pool: &PgPool, quota_chars: i64) -> ApiKey {
    let key = ApiKey {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        secret_hash: "$2b$12$000000000000000000000uGkGYGxlEZWpcbdMQ6wnUPqqTlwIm7G6".to_string(),
        lookup_hash: format!("test-{}", Uuid::new_v4()),
        status: KeyStatus::Active,
        quota_period: QuotaPeriod::Monthly,
        quota_chars,
        used_chars: 0,
        period_started_at: Utc::now(),
        created_at: Utc::now(),
    };
    ApiKeyRepository::new(pool.clone()).insert(&key).await.expect("insert key");
    key
}

struct Harness {
    executor: JobExecutor,
    jobs: JobRepository,
    segments: SegmentRepository,
    assets: AssetRepository,
    publisher: Arc<CollectingPublisher>,
    segmentation_calls: Arc<StubSegmentation>,
}

fn build_harness(pool: &PgPool, boundaries: Vec<usize>) -> Harness {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::default());
    let segmentation = Arc::new(StubSegmentation {
        boundaries,
        calls: AtomicUsize::new(0),
    });

    let capabilities = Capabilities {
        segmentation: vec![segmentation.clone() as Arc<dyn stories::ai::SegmentationModel>],
        narration: vec![Arc::new(StubNarration)],
        speech: Arc::new(StubSpeech),
        image_prompt: Arc::new(StubPrompt),
        image: Arc::new(StubImage),
        vision: Arc::new(StubVision),
        fact_check: Arc::new(StubFactCheck),
    };

    let engine = SegmentationEngine::new(
        capabilities.segmentation.clone(),
        Arc::new(PgBoundaryCache::new(pool.clone())),
        false,
    );

    let pipeline = Arc::new(SegmentPipeline::new(
        capabilities.clone(),
        store.clone(),
        SegmentRepository::new(pool.clone()),
        AssetRepository::new(pool.clone()),
        PipelineSettings {
            tts_voice: "Kore".to_string(),
            tts_model: "stub-tts".to_string(),
            image_model: "stub-image".to_string(),
        },
    ));

    let publisher = Arc::new(CollectingPublisher::default());

    let executor = JobExecutor::new(
        JobRepository::new(pool.clone()),
        SegmentRepository::new(pool.clone()),
        AssetRepository::new(pool.clone()),
        FileRepository::new(pool.clone()),
        store,
        capabilities.vision.clone(),
        engine,
        pipeline,
        publisher.clone(),
        2,
    );

    Harness {
        executor,
        jobs: JobRepository::new(pool.clone()),
        segments: SegmentRepository::new(pool.clone()),
        assets: AssetRepository::new(pool.clone()),
        publisher,
        segmentation_calls: segmentation,
    }
}

async fn seed_job(pool: &PgPool, key: &ApiKey, text: &str, segments_count: i32) -> Uuid {
    let job = JobRepository::new(pool.clone())
        .create(&NewJob {
            id: Uuid::new_v4(),
            user_id: key.user_id,
            api_key_id: key.id,
            input_type: InputType::Educational,
            input_source: InputSource::Text,
            segments_count,
            audio_type: AudioType::Podcast,
            input_text: text.to_string(),
            webhook_url: None,
            webhook_secret: None,
        })
        .await
        .expect("create job");
    job.id
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
#[ignore = "Requires DATABASE_URL pointing at a scratch Postgres"]
async fn fresh_job_runs_to_success() {
    let pool = pool().await;
    let key = seed_api_key(&pool, 1_000_000).await;
    let harness = build_harness(&pool, vec![3, 6, 8]);

    let job_id = seed_job(&pool, &key, "A. B. C.", 3).await;
    harness.executor.execute(job_id, "trace-1").await.expect("execute");

    let job = harness.jobs.fetch(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job.finished_at.is_some());
    let markup = job.output_markup.expect("markup present on success");
    assert!(markup.contains("[[SEGMENT"));
    assert!(markup.contains("[[AUDIO"));
    assert!(markup.contains("[[IMAGE"));

    let segments = harness.segments.list_for_job(job_id).await.unwrap();
    assert_eq!(segments.len(), 3);
    assert!(segments.iter().all(|s| s.status == SegmentStatus::Succeeded));
    // Exact partition of the input.
    assert_eq!(segments[0].start_char, 0);
    assert_eq!(segments[2].end_char, 8);

    // One audio and one image asset per segment.
    let assets = harness.assets.list_for_job(job_id).await.unwrap();
    assert_eq!(assets.len(), 6);

    let events = harness.publisher.webhook_events.lock().unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL pointing at a scratch Postgres"]
async fn redelivery_of_terminal_job_is_a_noop() {
    let pool = pool().await;
    let key = seed_api_key(&pool, 1_000_000).await;
    let harness = build_harness(&pool, vec![3, 6, 8]);

    let job_id = seed_job(&pool, &key, "A. B. C.", 3).await;
    harness.executor.execute(job_id, "t1").await.unwrap();
    let calls_after_first = harness.segmentation_calls.calls.load(Ordering::SeqCst);

    harness.executor.execute(job_id, "t2").await.unwrap();
    assert_eq!(
        harness.segmentation_calls.calls.load(Ordering::SeqCst),
        calls_after_first,
        "terminal job must not re-run"
    );

    let events = harness.publisher.webhook_events.lock().unwrap();
    assert_eq!(events.len(), 1, "no second terminal event");
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL pointing at a scratch Postgres"]
async fn running_job_restarts_from_a_clean_slate() {
    let pool = pool().await;
    let key = seed_api_key(&pool, 1_000_000).await;
    let harness = build_harness(&pool, vec![3, 6, 8]);

    let job_id = seed_job(&pool, &key, "A. B. C.", 3).await;

    // Fake a crashed prior run: running status, two leftover segments, one
    // leftover asset.
    let jobs = JobRepository::new(pool.clone());
    jobs.mark_running(job_id).await.unwrap();
    let segments = SegmentRepository::new(pool.clone());
    let stale = segments
        .create(
            job_id,
            &NewSegment {
                idx: 0,
                start_char: 0,
                end_char: 4,
                title: Some("stale".to_string()),
                text: "A. B".to_string(),
            },
        )
        .await
        .unwrap();
    segments
        .create(
            job_id,
            &NewSegment {
                idx: 1,
                start_char: 4,
                end_char: 8,
                title: Some("stale".to_string()),
                text: ". C.".to_string(),
            },
        )
        .await
        .unwrap();
    AssetRepository::new(pool.clone())
        .create(&stories::database::asset_repository::NewAsset {
            job_id,
            segment_id: Some(stale.id),
            kind: AssetKind::Image,
            mime_type: "image/png".to_string(),
            bucket: "test-bucket".to_string(),
            object_key: "stale/image.png".to_string(),
            size_bytes: 4,
            checksum: None,
            metadata: serde_json::json!({}),
        })
        .await
        .unwrap();

    harness.executor.execute(job_id, "redelivered").await.unwrap();

    let job = harness.jobs.fetch(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);

    let rows = harness.segments.list_for_job(job_id).await.unwrap();
    assert_eq!(rows.len(), 3, "exactly the fresh run's segments");
    assert!(rows.iter().all(|s| s.title.as_deref() != Some("stale")));

    // The stale asset cascaded away with its segment; 3 segments x 2 assets
    // remain.
    let assets = harness.assets.list_for_job(job_id).await.unwrap();
    assert_eq!(assets.len(), 6);
    assert!(assets.iter().all(|a| a.object_key != "stale/image.png"));
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL pointing at a scratch Postgres"]
async fn quota_charges_accumulate_and_reject_over_budget() {
    let pool = pool().await;
    let key = seed_api_key(&pool, 100).await;
    let repo = ApiKeyRepository::new(pool.clone());

    assert_eq!(
        repo.charge_quota(key.id, key.quota_period, 60).await.unwrap(),
        QuotaOutcome::Charged
    );
    // 60 + 50 would exceed 100.
    assert_eq!(
        repo.charge_quota(key.id, key.quota_period, 50).await.unwrap(),
        QuotaOutcome::Exceeded
    );
    // The failed charge must not have consumed anything.
    let row = repo.fetch(key.id).await.unwrap().unwrap();
    assert_eq!(row.used_chars, 60);

    assert_eq!(
        repo.charge_quota(key.id, key.quota_period, 40).await.unwrap(),
        QuotaOutcome::Charged
    );
    let row = repo.fetch(key.id).await.unwrap().unwrap();
    assert_eq!(row.used_chars, 100);
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL pointing at a scratch Postgres"]
async fn quota_period_lapse_resets_consumption() {
    let pool = pool().await;
    let key = seed_api_key(&pool, 100).await;

    // Age the period past a month.
    sqlx::query("UPDATE api_keys SET used_chars = 90, period_started_at = now() - interval '40 days' WHERE id = $1")
        .bind(key.id)
        .execute(&pool)
        .await
        .unwrap();

    let repo = ApiKeyRepository::new(pool.clone());
    assert_eq!(
        repo.charge_quota(key.id, key.quota_period, 80).await.unwrap(),
        QuotaOutcome::Charged,
        "lapsed window resets before the charge"
    );

    let row = repo.fetch(key.id).await.unwrap().unwrap();
    assert_eq!(row.used_chars, 80);
    assert!(row.period_started_at > Utc::now() - chrono::Duration::hours(1));
}
