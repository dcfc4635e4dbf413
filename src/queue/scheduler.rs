// src/queue/scheduler.rs
//! Single-flight queue scheduler. At most one job is processing at any
//! instant; waiting jobs dispatch FIFO; a podcast job parks at the review
//! gate without holding the slot. Every status mutation signals the
//! dispatch loop, which blocks on that signal instead of polling.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tracing::{error, info, warn};

use super::store::{JobQueueSnapshot, QueueCheckpointer, StoreError, VideoQueueSnapshot};
use super::{
    EnqueueError, Job, JobId, JobKind, JobResult, JobSpec, JobStatus, QueueError, Segment,
    VideoQueueItem, REVIEW_CANCELLED_ERROR,
};
use crate::pipeline::contracts::AssemblyProgress;
use crate::pipeline::{StageError, StageExecutor, StageOutcome};

#[derive(Default)]
struct QueueState {
    jobs: Vec<Job>,
    video_items: Vec<VideoQueueItem>,
    next_job_id: u64,
    next_item_id: u64,
    /// The single-flight gate: checked before every dispatch
    in_flight: Option<JobId>,
}

struct QueueInner {
    state: RwLock<QueueState>,
    executor: StageExecutor,
    checkpointer: Option<QueueCheckpointer>,
    wake: Notify,
}

/// The queue surface the rest of the application talks to. Cheap to clone;
/// all clones share the same state.
#[derive(Clone)]
pub struct PipelineQueue {
    inner: Arc<QueueInner>,
}

impl PipelineQueue {
    pub fn new(executor: StageExecutor, checkpointer: Option<QueueCheckpointer>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: RwLock::new(QueueState {
                    next_job_id: 1,
                    next_item_id: 1,
                    ..QueueState::default()
                }),
                executor,
                checkpointer,
                wake: Notify::new(),
            }),
        }
    }

    /// Load persisted snapshots. Jobs found `processing` are reclassified
    /// to `error` - their stage task died with the old process.
    pub async fn restore(&self) -> Result<(), StoreError> {
        let Some(checkpointer) = &self.inner.checkpointer else {
            return Ok(());
        };

        if let Some(mut snapshot) = checkpointer.load_jobs().await? {
            let stale = snapshot.reclassify_stale_processing();
            if stale > 0 {
                warn!(stale, "reclassified stale processing jobs after restart");
                checkpointer.save_jobs(&snapshot).await?;
            }
            let mut st = self.inner.state.write().await;
            st.jobs = snapshot.jobs;
            st.next_job_id = snapshot.next_job_id;
            info!(jobs = st.jobs.len(), "📥 restored job queue snapshot");
        }

        if let Some(snapshot) = checkpointer.load_video_items().await? {
            let mut st = self.inner.state.write().await;
            st.video_items = snapshot.items;
            st.next_item_id = snapshot.next_item_id;
            info!(items = st.video_items.len(), "📥 restored video queue snapshot");
        }

        Ok(())
    }

    /// Spawn the dispatch loop: try a dispatch, then block until the next
    /// status mutation signals the queue.
    pub fn start(&self) {
        let queue = self.clone();
        tokio::spawn(async move {
            info!("🚦 Queue dispatch loop started");
            loop {
                queue.try_dispatch().await;
                queue.inner.wake.notified().await;
            }
        });
    }

    // ------------------------------------------------------------------
    // user-facing operations
    // ------------------------------------------------------------------

    /// Validate and append a new job. Video jobs also get their secondary
    /// queue item, seeded from the completed source podcast.
    pub async fn enqueue(&self, spec: JobSpec) -> Result<Job, EnqueueError> {
        spec.validate()?;

        let job = {
            let mut st = self.inner.state.write().await;

            let (segments, voice_files, source_job_id) = match spec.kind {
                JobKind::Podcast => (Vec::new(), Vec::new(), None),
                JobKind::Video => {
                    let source_id = spec.source_job_id.ok_or(EnqueueError::MissingSource)?;
                    let source = st
                        .jobs
                        .iter()
                        .find(|j| j.id == source_id)
                        .ok_or(EnqueueError::SourceNotFound(source_id))?;
                    let files = match (&source.kind, &source.status, &source.result) {
                        (
                            JobKind::Podcast,
                            JobStatus::Completed,
                            Some(JobResult::Podcast { generated_files }),
                        ) => generated_files.clone(),
                        _ => return Err(EnqueueError::SourceNotUsable(source_id)),
                    };
                    (source.segments.clone(), files, Some(source_id))
                }
            };

            let id = st.next_job_id;
            st.next_job_id += 1;

            let job = Job {
                id,
                kind: spec.kind,
                prompt: spec.prompt,
                target_duration: spec.target_duration,
                target_word_count: spec.target_word_count,
                assistant_ref: spec.assistant_ref,
                credential_ref: spec.credential_ref,
                voice_ref: spec.voice_ref,
                status: JobStatus::Waiting,
                review_confirmed: false,
                run_seq: 0,
                created_at: Utc::now(),
                completed_at: None,
                shared_context: None,
                segments,
                source_job_id,
                video: (spec.kind == JobKind::Video).then(|| spec.video.clone()),
                result: None,
                error: None,
            };
            st.jobs.push(job.clone());

            if let (JobKind::Video, Some(source_id)) = (spec.kind, source_job_id) {
                let item_id = st.next_item_id;
                st.next_item_id += 1;
                st.video_items.push(VideoQueueItem {
                    id: item_id,
                    job_id: id,
                    source_job_id: source_id,
                    voice_files,
                    images: Vec::new(),
                    strategy: spec.video.strategy,
                    width: spec.video.width,
                    height: spec.video.height,
                    fps: spec.video.fps,
                    progress: 0.0,
                    current_step: "queued".to_string(),
                    created_at: Utc::now(),
                });
            }

            job
        };

        info!(job_id = job.id, kind = ?job.kind, "➕ job enqueued");
        self.persist_jobs().await;
        if job.kind == JobKind::Video {
            self.persist_video_items().await;
        }
        self.inner.wake.notify_one();
        Ok(job)
    }

    /// Ordered snapshot of the job queue
    pub async fn list(&self) -> Vec<Job> {
        self.inner.state.read().await.jobs.clone()
    }

    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.inner
            .state
            .read()
            .await
            .jobs
            .iter()
            .find(|j| j.id == id)
            .cloned()
    }

    pub async fn list_video_items(&self) -> Vec<VideoQueueItem> {
        self.inner.state.read().await.video_items.clone()
    }

    /// Confirm the review checkpoint, optionally carrying edited content.
    /// Edits are taken as-is apart from a structural shape check: same
    /// segment count, same ids, same order.
    pub async fn confirm_review(
        &self,
        id: JobId,
        edited: Option<Vec<Segment>>,
    ) -> Result<Job, QueueError> {
        let job = {
            let mut st = self.inner.state.write().await;
            let job = st
                .jobs
                .iter_mut()
                .find(|j| j.id == id)
                .ok_or(QueueError::NotFound(id))?;

            if job.status != JobStatus::AwaitingReview {
                return Err(QueueError::InvalidTransition {
                    id,
                    status: job.status,
                    action: "confirm review for",
                });
            }

            if let Some(segments) = edited {
                let shape_matches = segments.len() == job.segments.len()
                    && segments
                        .iter()
                        .zip(&job.segments)
                        .all(|(edited, drafted)| edited.segment_id == drafted.segment_id);
                if !shape_matches {
                    return Err(QueueError::ReviewShapeMismatch);
                }
                job.segments = segments;
            }

            job.review_confirmed = true;
            job.clone()
        };

        info!(job_id = id, "✅ review confirmed, job will resume when the slot frees");
        self.persist_jobs().await;
        self.inner.wake.notify_one();
        Ok(job)
    }

    /// User-initiated retry of a failed job. Drafts and review state are
    /// cleared and the job re-enters the queue at the tail - its original
    /// position is not preserved.
    pub async fn retry(&self, id: JobId) -> Result<Job, QueueError> {
        let job = {
            let mut st = self.inner.state.write().await;
            let index = st
                .jobs
                .iter()
                .position(|j| j.id == id)
                .ok_or(QueueError::NotFound(id))?;

            if st.jobs[index].status != JobStatus::Error {
                return Err(QueueError::InvalidTransition {
                    id,
                    status: st.jobs[index].status,
                    action: "retry",
                });
            }

            let mut job = st.jobs.remove(index);
            job.status = JobStatus::Waiting;
            job.error = None;
            job.result = None;
            job.completed_at = None;
            job.review_confirmed = false;
            job.shared_context = None;
            if job.kind == JobKind::Podcast {
                job.segments.clear();
            }
            st.jobs.push(job.clone());
            job
        };

        info!(job_id = id, "🔁 job reset to waiting at the queue tail");
        self.persist_jobs().await;
        self.inner.wake.notify_one();
        Ok(job)
    }

    /// Cancel a job. Processing and waiting jobs become `cancelled`; a job
    /// abandoned at the review gate becomes `error` with the fixed message.
    /// An outstanding stage call is not aborted - its outcome is discarded
    /// when it reports back against a job that is no longer processing.
    pub async fn cancel(&self, id: JobId) -> Result<Job, QueueError> {
        let job = {
            let mut st = self.inner.state.write().await;
            let slot_held = st.in_flight == Some(id);
            let job = st
                .jobs
                .iter_mut()
                .find(|j| j.id == id)
                .ok_or(QueueError::NotFound(id))?;

            match job.status {
                JobStatus::Processing | JobStatus::Waiting => {
                    job.status = JobStatus::Cancelled;
                    job.completed_at = Some(Utc::now());
                }
                JobStatus::AwaitingReview => {
                    job.status = JobStatus::Error;
                    job.error = Some(REVIEW_CANCELLED_ERROR.to_string());
                    job.completed_at = Some(Utc::now());
                }
                status => {
                    return Err(QueueError::InvalidTransition {
                        id,
                        status,
                        action: "cancel",
                    })
                }
            }
            let job = job.clone();
            if slot_held {
                st.in_flight = None;
            }
            job
        };

        info!(job_id = id, status = ?job.status, "🛑 job cancelled");
        self.persist_jobs().await;
        self.inner.wake.notify_one();
        Ok(job)
    }

    /// Remove a job from the store. In-flight jobs must be cancelled first
    /// so the slot bookkeeping can never dangle. Removing a video job also
    /// drops its queue item.
    pub async fn remove(&self, id: JobId) -> Result<(), QueueError> {
        let was_video = {
            let mut st = self.inner.state.write().await;
            let index = st
                .jobs
                .iter()
                .position(|j| j.id == id)
                .ok_or(QueueError::NotFound(id))?;

            if st.jobs[index].status == JobStatus::Processing {
                return Err(QueueError::RemoveWhileProcessing(id));
            }

            let job = st.jobs.remove(index);
            let was_video = job.kind == JobKind::Video;
            if was_video {
                st.video_items.retain(|item| item.job_id != id);
            }
            was_video
        };

        info!(job_id = id, "🗑️ job removed");
        self.persist_jobs().await;
        if was_video {
            self.persist_video_items().await;
        }
        self.inner.wake.notify_one();
        Ok(())
    }

    pub async fn remove_video_item(&self, item_id: u64) -> Result<(), QueueError> {
        {
            let mut st = self.inner.state.write().await;
            let before = st.video_items.len();
            st.video_items.retain(|item| item.id != item_id);
            if st.video_items.len() == before {
                return Err(QueueError::ItemNotFound(item_id));
            }
        }
        self.persist_video_items().await;
        Ok(())
    }

    /// Attempt an immediate dispatch instead of waiting for the next wake
    /// signal. The single-flight gate still applies.
    pub async fn force_dispatch(&self) -> bool {
        self.try_dispatch().await
    }

    // ------------------------------------------------------------------
    // dispatch internals
    // ------------------------------------------------------------------

    /// Dispatch the first eligible job in queue order if the slot is free.
    /// A confirmed review job sits at its original position, so it
    /// naturally resumes ahead of younger waiting jobs.
    async fn try_dispatch(&self) -> bool {
        let dispatched = {
            let mut st = self.inner.state.write().await;
            if st.in_flight.is_some() {
                None
            } else if let Some(index) = st.jobs.iter().position(|j| j.is_dispatchable()) {
                let job = &mut st.jobs[index];
                job.status = JobStatus::Processing;
                job.run_seq += 1;
                let job = job.clone();
                st.in_flight = Some(job.id);
                let item = match job.kind {
                    JobKind::Video => st
                        .video_items
                        .iter()
                        .find(|item| item.job_id == job.id)
                        .cloned(),
                    JobKind::Podcast => None,
                };
                Some((job, item))
            } else {
                None
            }
        };

        match dispatched {
            Some((job, item)) => {
                info!(job_id = job.id, kind = ?job.kind, run_seq = job.run_seq, "🚀 dispatching job");
                self.persist_jobs().await;
                self.spawn_stage(job, item);
                true
            }
            None => false,
        }
    }

    fn spawn_stage(&self, job: Job, item: Option<VideoQueueItem>) {
        let queue = self.clone();
        tokio::spawn(async move {
            let progress = ItemProgress {
                queue: queue.clone(),
                job_id: job.id,
            };
            let outcome = queue
                .inner
                .executor
                .run(&job, item.as_ref(), &progress)
                .await;
            queue.apply_outcome(job.id, job.run_seq, outcome).await;
        });
    }

    /// Apply a stage outcome. Discarded when the job was cancelled,
    /// retried or removed since dispatch (status or run_seq mismatch).
    async fn apply_outcome(
        &self,
        job_id: JobId,
        run_seq: u64,
        outcome: Result<StageOutcome, StageError>,
    ) {
        let applied = {
            let mut guard = self.inner.state.write().await;
            let st = &mut *guard;
            let slot_held = st.in_flight == Some(job_id);
            match st.jobs.iter_mut().find(|j| j.id == job_id) {
                None => {
                    if slot_held {
                        st.in_flight = None;
                    }
                    warn!(job_id, "stage outcome for a removed job discarded");
                    false
                }
                Some(job) if job.run_seq != run_seq || job.status != JobStatus::Processing => {
                    warn!(
                        job_id,
                        status = ?job.status,
                        "stale stage outcome discarded"
                    );
                    false
                }
                Some(job) => {
                    match outcome {
                        Ok(StageOutcome::DraftsReady {
                            segments,
                            shared_context,
                        }) => {
                            info!(
                                job_id,
                                segments = segments.len(),
                                "⏸️ drafts ready, awaiting review"
                            );
                            job.segments = segments;
                            job.shared_context = Some(shared_context);
                            job.status = JobStatus::AwaitingReview;
                            job.review_confirmed = false;
                        }
                        Ok(StageOutcome::PodcastComplete { generated_files }) => {
                            info!(job_id, files = generated_files.len(), "🏁 podcast completed");
                            job.status = JobStatus::Completed;
                            job.result = Some(JobResult::Podcast { generated_files });
                            job.completed_at = Some(Utc::now());
                        }
                        Ok(StageOutcome::VideoComplete {
                            artifact_ref,
                            duration_seconds,
                            size_bytes,
                        }) => {
                            info!(job_id, artifact = %artifact_ref, "🏁 video completed");
                            job.status = JobStatus::Completed;
                            job.result = Some(JobResult::Video {
                                artifact_ref,
                                duration_seconds,
                                size_bytes,
                            });
                            job.completed_at = Some(Utc::now());
                        }
                        Err(e) => {
                            error!(job_id, "❌ stage failed: {}", e);
                            job.status = JobStatus::Error;
                            job.error = Some(e.to_string());
                            job.completed_at = Some(Utc::now());
                        }
                    }
                    st.in_flight = None;
                    true
                }
            }
        };

        if applied {
            self.persist_jobs().await;
        }
        // wake the loop either way: the slot may have freed
        self.inner.wake.notify_one();
    }

    // ------------------------------------------------------------------
    // persistence
    // ------------------------------------------------------------------

    async fn persist_jobs(&self) {
        let Some(checkpointer) = &self.inner.checkpointer else {
            return;
        };
        let snapshot = {
            let st = self.inner.state.read().await;
            JobQueueSnapshot {
                jobs: st.jobs.clone(),
                next_job_id: st.next_job_id,
            }
        };
        checkpointer.save_jobs_logged(&snapshot).await;
    }

    async fn persist_video_items(&self) {
        let Some(checkpointer) = &self.inner.checkpointer else {
            return;
        };
        let snapshot = {
            let st = self.inner.state.read().await;
            VideoQueueSnapshot {
                items: st.video_items.clone(),
                next_item_id: st.next_item_id,
            }
        };
        checkpointer.save_video_items_logged(&snapshot).await;
    }
}

/// Feeds executor progress into the job's video queue item
struct ItemProgress {
    queue: PipelineQueue,
    job_id: JobId,
}

#[async_trait]
impl AssemblyProgress for ItemProgress {
    async fn step(&self, progress: f32, current_step: &str) {
        {
            let mut st = self.queue.inner.state.write().await;
            if let Some(item) = st
                .video_items
                .iter_mut()
                .find(|item| item.job_id == self.job_id)
            {
                item.progress = progress;
                item.current_step = current_step.to_string();
            }
        }
        self.queue.persist_video_items().await;
    }

    async fn images_resolved(&self, images: &[crate::queue::ImageAsset]) {
        {
            let mut st = self.queue.inner.state.write().await;
            if let Some(item) = st
                .video_items
                .iter_mut()
                .find(|item| item.job_id == self.job_id)
            {
                item.images = images.to_vec();
            }
        }
        self.queue.persist_video_items().await;
    }
}
