// src/queue/store.rs
//! Durable queue store - full-collection snapshots persisted to PostgreSQL.
//! One row per queue scope; every mutation rewrites its scope's snapshot so
//! whatever was on disk is exactly the queue at the last mutation.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use super::{Job, JobStatus, VideoQueueItem, STALE_RESTART_ERROR};

/// Snapshot scope for the primary job queue
pub const JOBS_SCOPE: &str = "jobs";
/// Snapshot scope for the secondary video assembly queue
pub const VIDEO_ITEMS_SCOPE: &str = "video_items";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Full snapshot of the job queue, id counter included so ids stay
/// monotonic across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobQueueSnapshot {
    pub jobs: Vec<Job>,
    pub next_job_id: u64,
}

impl JobQueueSnapshot {
    /// A job persisted as `processing` belonged to a stage task that died
    /// with the old process. Reclassify it deterministically instead of
    /// leaving it stuck. Returns how many jobs were touched.
    pub fn reclassify_stale_processing(&mut self) -> usize {
        let mut touched = 0;
        for job in &mut self.jobs {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Error;
                job.error = Some(STALE_RESTART_ERROR.to_string());
                job.completed_at = Some(Utc::now());
                touched += 1;
            }
        }
        touched
    }
}

/// Full snapshot of the video assembly queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoQueueSnapshot {
    pub items: Vec<VideoQueueItem>,
    pub next_item_id: u64,
}

/// Saves and loads queue snapshots
pub struct QueueCheckpointer {
    pool: PgPool,
}

impl QueueCheckpointer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the snapshot table
    pub async fn setup(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_snapshots (
                scope VARCHAR(64) PRIMARY KEY,
                state JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("✅ Queue snapshot table ready");
        Ok(())
    }

    async fn save_scope<T: Serialize>(&self, scope: &str, state: &T) -> Result<(), StoreError> {
        let state_json = serde_json::to_value(state)?;
        sqlx::query(
            r#"
            INSERT INTO queue_snapshots (scope, state, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (scope) DO UPDATE SET state = $2, updated_at = $3
            "#,
        )
        .bind(scope)
        .bind(state_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_scope<T: DeserializeOwned>(&self, scope: &str) -> Result<Option<T>, StoreError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT state FROM queue_snapshots WHERE scope = $1")
                .bind(scope)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((state,)) => Ok(Some(serde_json::from_value(state)?)),
            None => Ok(None),
        }
    }

    pub async fn save_jobs(&self, snapshot: &JobQueueSnapshot) -> Result<(), StoreError> {
        self.save_scope(JOBS_SCOPE, snapshot).await
    }

    pub async fn load_jobs(&self) -> Result<Option<JobQueueSnapshot>, StoreError> {
        self.load_scope(JOBS_SCOPE).await
    }

    pub async fn save_video_items(&self, snapshot: &VideoQueueSnapshot) -> Result<(), StoreError> {
        self.save_scope(VIDEO_ITEMS_SCOPE, snapshot).await
    }

    pub async fn load_video_items(&self) -> Result<Option<VideoQueueSnapshot>, StoreError> {
        self.load_scope(VIDEO_ITEMS_SCOPE).await
    }

    /// Best-effort write used on the mutation path: a persistence failure
    /// is logged, never bubbled into the user operation.
    pub async fn save_jobs_logged(&self, snapshot: &JobQueueSnapshot) {
        if let Err(e) = self.save_jobs(snapshot).await {
            warn!("⚠️ Failed to persist job queue snapshot: {}", e);
        }
    }

    pub async fn save_video_items_logged(&self, snapshot: &VideoQueueSnapshot) {
        if let Err(e) = self.save_video_items(snapshot).await {
            warn!("⚠️ Failed to persist video queue snapshot: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{
        AssemblyStrategy, GeneratedVoiceFile, ImageAsset, Job, JobKind, JobResult, JobStatus,
        MotionEffect, Segment, SegmentMetadata, VideoOptions, VoiceBlock,
    };
    use chrono::Utc;

    fn sample_job(id: u64, status: JobStatus) -> Job {
        Job {
            id,
            kind: JobKind::Podcast,
            prompt: format!("topic {id}"),
            target_duration: 10,
            target_word_count: 1500,
            assistant_ref: "asst_main".to_string(),
            credential_ref: "cred_default".to_string(),
            voice_ref: "voice_nova".to_string(),
            status,
            review_confirmed: status == JobStatus::AwaitingReview && id % 2 == 0,
            run_seq: id,
            created_at: Utc::now(),
            completed_at: None,
            shared_context: Some("an episode about topics".to_string()),
            segments: vec![Segment {
                segment_id: "seg-1".to_string(),
                metadata: SegmentMetadata {
                    title: "Intro".to_string(),
                    brief: "set the scene".to_string(),
                    target_words: 200,
                },
                content_blocks: vec![VoiceBlock {
                    block_name: "seg-1-host".to_string(),
                    text: "welcome back".to_string(),
                    voice_ref: "voice_nova".to_string(),
                }],
            }],
            source_job_id: None,
            video: None,
            result: None,
            error: None,
        }
    }

    #[test]
    fn job_snapshot_round_trips_field_for_field() {
        let mut completed = sample_job(3, JobStatus::Completed);
        completed.completed_at = Some(Utc::now());
        completed.result = Some(JobResult::Podcast {
            generated_files: vec![GeneratedVoiceFile {
                filename: "seg-1-host.mp3".to_string(),
                block_name: "seg-1-host".to_string(),
            }],
        });

        let mut failed = sample_job(4, JobStatus::Error);
        failed.error = Some("voice stage failed: upstream 500".to_string());

        let snapshot = JobQueueSnapshot {
            jobs: vec![
                sample_job(1, JobStatus::Waiting),
                sample_job(2, JobStatus::AwaitingReview),
                completed,
                failed,
            ],
            next_job_id: 5,
        };

        let value = serde_json::to_value(&snapshot).unwrap();
        let restored: JobQueueSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn video_snapshot_round_trips_field_for_field() {
        let snapshot = VideoQueueSnapshot {
            items: vec![VideoQueueItem {
                id: 1,
                job_id: 9,
                source_job_id: 3,
                voice_files: vec![GeneratedVoiceFile {
                    filename: "seg-1-host.mp3".to_string(),
                    block_name: "seg-1-host".to_string(),
                }],
                images: vec![ImageAsset {
                    filename: "img_000.png".to_string(),
                    position_index: 0,
                    source_prompt: "a radio tower at dusk".to_string(),
                    effects: vec![MotionEffect::ZoomIn],
                }],
                strategy: AssemblyStrategy::HighQuality,
                width: 1920,
                height: 1080,
                fps: 30,
                progress: 0.4,
                current_step: "assigning motion effects".to_string(),
                created_at: Utc::now(),
            }],
            next_item_id: 2,
        };

        let value = serde_json::to_value(&snapshot).unwrap();
        let restored: VideoQueueSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn stale_processing_jobs_become_errors_on_load() {
        let mut snapshot = JobQueueSnapshot {
            jobs: vec![
                sample_job(1, JobStatus::Waiting),
                sample_job(2, JobStatus::Processing),
                sample_job(3, JobStatus::AwaitingReview),
            ],
            next_job_id: 4,
        };

        assert_eq!(snapshot.reclassify_stale_processing(), 1);

        let stale = &snapshot.jobs[1];
        assert_eq!(stale.status, JobStatus::Error);
        assert_eq!(stale.error.as_deref(), Some(STALE_RESTART_ERROR));
        assert!(stale.completed_at.is_some());

        // untouched neighbours
        assert_eq!(snapshot.jobs[0].status, JobStatus::Waiting);
        assert_eq!(snapshot.jobs[2].status, JobStatus::AwaitingReview);

        // idempotent
        assert_eq!(snapshot.reclassify_stale_processing(), 0);
    }

    #[test]
    fn video_options_default_when_absent() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "id": 1,
            "kind": "podcast",
            "prompt": "topic",
            "target_duration": 10,
            "target_word_count": 1500,
            "assistant_ref": "a",
            "credential_ref": "c",
            "voice_ref": "v",
            "status": "waiting",
            "created_at": Utc::now(),
            "completed_at": null,
            "result": null,
            "error": null
        }))
        .unwrap();
        assert_eq!(job.video, None);
        assert!(job.segments.is_empty());
        assert!(!job.review_confirmed);

        let options: VideoOptions = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(options.width, 1920);
        assert_eq!(options.height, 1080);
        assert_eq!(options.fps, 30);
        assert_eq!(options.strategy, AssemblyStrategy::Fast);
    }
}
