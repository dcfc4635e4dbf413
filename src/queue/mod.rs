// src/queue/mod.rs
//! Persistent generation queue - jobs, statuses and the records the
//! pipeline stages read and write

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod scheduler;
pub mod store;

/// Monotonically increasing job identifier, assigned by the queue.
/// The counter is persisted so ids never repeat across restarts.
pub type JobId = u64;

/// Fixed error message recorded when a job is abandoned at the review gate.
pub const REVIEW_CANCELLED_ERROR: &str = "cancelled by user after review";

/// Fixed error message applied to jobs found `processing` in a loaded
/// snapshot - the stage task that owned them died with the old process.
pub const STALE_RESTART_ERROR: &str = "stage was still running when the service restarted";

/// What kind of artifact the job produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Narrated audio episode: structure, drafts, review, voice synthesis
    Podcast,
    /// Image-sequence video assembled from a completed podcast job
    Video,
}

/// Job status - the queue's state machine
///
/// `waiting -> processing -> { awaiting_review -> processing -> completed | error ; completed ; error }`
/// `cancelled` is reachable only by explicit cancellation, `error -> waiting`
/// only by explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Processing,
    AwaitingReview,
    Completed,
    Error,
    Cancelled,
}

/// Structural description of a segment, produced by the structure stage
/// before any content exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    pub title: String,
    pub brief: String,
    pub target_words: u32,
}

/// One outline segment of an episode. Owned exclusively by its job;
/// `content_blocks` stays empty until the draft fan-out fills it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub segment_id: String,
    pub metadata: SegmentMetadata,
    pub content_blocks: Vec<VoiceBlock>,
}

/// Leaf unit submitted to voice synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceBlock {
    pub block_name: String,
    pub text: String,
    pub voice_ref: String,
}

/// A synthesized audio file reference returned by the voice service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedVoiceFile {
    pub filename: String,
    pub block_name: String,
}

/// Named motion effect applied to a still image during assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionEffect {
    ZoomIn,
    ZoomOut,
    PanLeft,
    PanRight,
}

/// An image resolved for a video job plus its derived effect sequence.
/// `effects` is always recomputed as a whole, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub filename: String,
    pub position_index: usize,
    pub source_prompt: String,
    #[serde(default)]
    pub effects: Vec<MotionEffect>,
}

/// Assembly strategy - the three modes differ only in the effect
/// parameters handed to the render service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyStrategy {
    /// Still images, no motion
    Static,
    /// One effect per image, cycling through the rotation
    Fast,
    /// Full four-effect rotation on every image
    HighQuality,
}

impl Default for AssemblyStrategy {
    fn default() -> Self {
        AssemblyStrategy::Fast
    }
}

/// Render options carried by a video job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoOptions {
    #[serde(default)]
    pub force_regenerate: bool,
    #[serde(default)]
    pub custom_image_count: Option<u32>,
    #[serde(default)]
    pub strategy: AssemblyStrategy,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_fps() -> u32 {
    30
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            force_regenerate: false,
            custom_image_count: None,
            strategy: AssemblyStrategy::default(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
        }
    }
}

/// Terminal payload of a successful job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobResult {
    Podcast {
        generated_files: Vec<GeneratedVoiceFile>,
    },
    Video {
        artifact_ref: String,
        duration_seconds: f64,
        size_bytes: u64,
    },
}

/// The persisted unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub prompt: String,
    /// Target episode length in minutes
    pub target_duration: u32,
    pub target_word_count: u32,
    pub assistant_ref: String,
    pub credential_ref: String,
    pub voice_ref: String,
    pub status: JobStatus,
    /// Set by the review gate; a confirmed job resumes from its original
    /// queue position once the single-flight slot frees.
    #[serde(default)]
    pub review_confirmed: bool,
    /// Bumped on every dispatch. Stage outcomes carrying a stale value
    /// are discarded, which is how cancellation stays cooperative.
    #[serde(default)]
    pub run_seq: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub shared_context: Option<String>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    /// For video jobs: the completed podcast job the assembly reads from
    #[serde(default)]
    pub source_job_id: Option<JobId>,
    #[serde(default)]
    pub video: Option<VideoOptions>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl Job {
    /// Whether the dispatcher may pick this job up right now
    pub fn is_dispatchable(&self) -> bool {
        match self.status {
            JobStatus::Waiting => true,
            JobStatus::AwaitingReview => self.review_confirmed,
            _ => false,
        }
    }

    /// Terminal in the result-or-error sense. Cancelled jobs are settled
    /// too but carry neither field.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Error)
    }

    /// Every voice block of every segment, in segment order
    pub fn voice_blocks(&self) -> Vec<VoiceBlock> {
        self.segments
            .iter()
            .flat_map(|s| s.content_blocks.iter().cloned())
            .collect()
    }
}

/// Secondary record tracking the assembly stage of one video job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoQueueItem {
    pub id: u64,
    pub job_id: JobId,
    pub source_job_id: JobId,
    pub voice_files: Vec<GeneratedVoiceFile>,
    #[serde(default)]
    pub images: Vec<ImageAsset>,
    pub strategy: AssemblyStrategy,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub progress: f32,
    pub current_step: String,
    pub created_at: DateTime<Utc>,
}

/// What a caller submits to `enqueue`
#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    pub kind: JobKind,
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_target_duration")]
    pub target_duration: u32,
    #[serde(default = "default_target_word_count")]
    pub target_word_count: u32,
    #[serde(default)]
    pub assistant_ref: String,
    #[serde(default)]
    pub credential_ref: String,
    #[serde(default)]
    pub voice_ref: String,
    #[serde(default)]
    pub source_job_id: Option<JobId>,
    #[serde(default)]
    pub video: VideoOptions,
}

fn default_target_duration() -> u32 {
    10
}

fn default_target_word_count() -> u32 {
    1500
}

/// Rejected before a job record is ever created
#[derive(Debug, Error, PartialEq)]
pub enum EnqueueError {
    #[error("a prompt is required")]
    MissingPrompt,
    #[error("a credential reference is required")]
    MissingCredential,
    #[error("an assistant must be selected")]
    MissingAssistant,
    #[error("a video job must reference a source podcast job")]
    MissingSource,
    #[error("source job {0} not found")]
    SourceNotFound(JobId),
    #[error("source job {0} is not a completed podcast job")]
    SourceNotUsable(JobId),
}

impl JobSpec {
    /// Synchronous pre-enqueue validation; source-job checks happen in the
    /// queue where the collection is visible.
    pub fn validate(&self) -> Result<(), EnqueueError> {
        if self.prompt.trim().is_empty() {
            return Err(EnqueueError::MissingPrompt);
        }
        if self.credential_ref.trim().is_empty() {
            return Err(EnqueueError::MissingCredential);
        }
        if self.assistant_ref.trim().is_empty() {
            return Err(EnqueueError::MissingAssistant);
        }
        if self.kind == JobKind::Video && self.source_job_id.is_none() {
            return Err(EnqueueError::MissingSource);
        }
        Ok(())
    }
}

/// Failures of explicit user actions against existing jobs
#[derive(Debug, Error, PartialEq)]
pub enum QueueError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("cannot {action} job {id} while it is {status:?}")]
    InvalidTransition {
        id: JobId,
        status: JobStatus,
        action: &'static str,
    },
    #[error("edited content does not match the drafted segment structure")]
    ReviewShapeMismatch,
    #[error("job {0} is processing; cancel it before removing")]
    RemoveWhileProcessing(JobId),
    #[error("video queue item {0} not found")]
    ItemNotFound(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: JobKind) -> JobSpec {
        JobSpec {
            kind,
            prompt: "the history of radio drama".to_string(),
            target_duration: 12,
            target_word_count: 1800,
            assistant_ref: "asst_main".to_string(),
            credential_ref: "cred_default".to_string(),
            voice_ref: "voice_nova".to_string(),
            source_job_id: None,
            video: VideoOptions::default(),
        }
    }

    #[test]
    fn validation_rejects_missing_fields() {
        let mut s = spec(JobKind::Podcast);
        s.prompt = "  ".to_string();
        assert_eq!(s.validate(), Err(EnqueueError::MissingPrompt));

        let mut s = spec(JobKind::Podcast);
        s.credential_ref.clear();
        assert_eq!(s.validate(), Err(EnqueueError::MissingCredential));

        let mut s = spec(JobKind::Podcast);
        s.assistant_ref.clear();
        assert_eq!(s.validate(), Err(EnqueueError::MissingAssistant));

        assert!(spec(JobKind::Podcast).validate().is_ok());
    }

    #[test]
    fn video_spec_requires_source_job() {
        let s = spec(JobKind::Video);
        assert_eq!(s.validate(), Err(EnqueueError::MissingSource));

        let mut s = spec(JobKind::Video);
        s.source_job_id = Some(7);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn dispatchable_states() {
        let mut job = Job {
            id: 1,
            kind: JobKind::Podcast,
            prompt: "topic".to_string(),
            target_duration: 10,
            target_word_count: 1500,
            assistant_ref: "a".to_string(),
            credential_ref: "c".to_string(),
            voice_ref: "v".to_string(),
            status: JobStatus::Waiting,
            review_confirmed: false,
            run_seq: 0,
            created_at: Utc::now(),
            completed_at: None,
            shared_context: None,
            segments: Vec::new(),
            source_job_id: None,
            video: None,
            result: None,
            error: None,
        };
        assert!(job.is_dispatchable());

        job.status = JobStatus::AwaitingReview;
        assert!(!job.is_dispatchable());
        job.review_confirmed = true;
        assert!(job.is_dispatchable());

        for status in [
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Error,
            JobStatus::Cancelled,
        ] {
            job.status = status;
            assert!(!job.is_dispatchable(), "{status:?} must not dispatch");
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::AwaitingReview).unwrap();
        assert_eq!(json, "\"awaiting_review\"");
        let back: JobStatus = serde_json::from_str("\"awaiting_review\"").unwrap();
        assert_eq!(back, JobStatus::AwaitingReview);
    }
}
