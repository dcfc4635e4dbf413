// src/pipeline/executor.rs
//! Stage executor - runs exactly one stage transition for a dispatched job.
//! Podcast jobs stop at the review boundary on their first pass and finish
//! with voice synthesis after confirmation; video jobs resolve images,
//! sequence effects and call the render service.

use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::contracts::{
    AssemblyProgress, AssemblyRequest, AssemblyService, DraftRequest, DraftService, ImageRequest,
    ImageService, StructureRequest, StructureService, VoiceRequest, VoiceService,
};
use super::effects::{self, EffectRule};
use crate::queue::{
    AssemblyStrategy, GeneratedVoiceFile, ImageAsset, Job, JobId, JobKind, Segment,
    VideoQueueItem,
};

/// What a successful stage run hands back to the scheduler
#[derive(Debug, Clone)]
pub enum StageOutcome {
    /// Draft fan-out finished; the job parks at the review gate
    DraftsReady {
        segments: Vec<Segment>,
        shared_context: String,
    },
    /// Voice synthesis finished; the job is done
    PodcastComplete {
        generated_files: Vec<GeneratedVoiceFile>,
    },
    /// Assembly finished; the job is done
    VideoComplete {
        artifact_ref: String,
        duration_seconds: f64,
        size_bytes: u64,
    },
}

/// Stage failure. The rendered message is stored verbatim on the job.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StageError {
    #[error("structure stage failed: {0}")]
    Structure(String),
    #[error("draft stage failed for segment {segment_id}: {message}")]
    Draft { segment_id: String, message: String },
    #[error("voice stage failed: {0}")]
    Voice(String),
    #[error("image stage failed: {0}")]
    Image(String),
    #[error("assembly stage failed: {0}")]
    Assembly(String),
    #[error("video job {0} has no video queue item")]
    MissingVideoItem(JobId),
}

/// Holds the collaborator handles and knows which stage a dispatched job
/// is due for.
#[derive(Clone)]
pub struct StageExecutor {
    structure: Arc<dyn StructureService>,
    draft: Arc<dyn DraftService>,
    voice: Arc<dyn VoiceService>,
    image: Arc<dyn ImageService>,
    assembly: Arc<dyn AssemblyService>,
}

impl StageExecutor {
    pub fn new(
        structure: Arc<dyn StructureService>,
        draft: Arc<dyn DraftService>,
        voice: Arc<dyn VoiceService>,
        image: Arc<dyn ImageService>,
        assembly: Arc<dyn AssemblyService>,
    ) -> Self {
        Self {
            structure,
            draft,
            voice,
            image,
            assembly,
        }
    }

    /// Run the stage the job is due for. The job snapshot was taken at
    /// dispatch time; the scheduler decides whether the outcome still
    /// applies when it comes back.
    pub async fn run(
        &self,
        job: &Job,
        item: Option<&VideoQueueItem>,
        progress: &dyn AssemblyProgress,
    ) -> Result<StageOutcome, StageError> {
        match job.kind {
            JobKind::Podcast if job.review_confirmed => self.run_voice_stage(job).await,
            JobKind::Podcast => self.run_draft_stages(job).await,
            JobKind::Video => {
                let item = item.ok_or(StageError::MissingVideoItem(job.id))?;
                self.run_assembly_stages(job, item, progress).await
            }
        }
    }

    /// Structure call followed by the concurrent per-segment draft fan-out
    async fn run_draft_stages(&self, job: &Job) -> Result<StageOutcome, StageError> {
        info!(job_id = job.id, "📝 drafting structure for '{}'", job.prompt);
        let outline = self
            .structure
            .draft_structure(StructureRequest {
                topic: job.prompt.clone(),
                target_duration: job.target_duration,
                target_word_count: job.target_word_count,
                assistant_ref: job.assistant_ref.clone(),
            })
            .await
            .map_err(|e| StageError::Structure(e.0))?;

        info!(
            job_id = job.id,
            segments = outline.segments.len(),
            "structure ready, fanning out drafts"
        );

        // One concurrent call per segment, unbounded. Each future carries
        // its segment id so the join produces a per-segment outcome list.
        let drafts = join_all(outline.segments.iter().map(|planned| {
            let draft = self.draft.clone();
            let request = DraftRequest {
                assistant_ref: job.assistant_ref.clone(),
                segment_id: planned.id.clone(),
                segment_metadata: planned.metadata.clone(),
                shared_context: outline.shared_context.clone(),
                voice_ref: job.voice_ref.clone(),
            };
            async move { (planned.id.clone(), draft.draft_segment(request).await) }
        }))
        .await;

        // All-or-nothing fan-in over the per-segment outcome list: a single
        // failure fails the stage and any successful sibling drafts are
        // discarded with it.
        let total = drafts.len();
        let mut segments = Vec::with_capacity(total);
        for (planned, (segment_id, result)) in outline.segments.into_iter().zip(drafts) {
            match result {
                Ok(response) => segments.push(Segment {
                    segment_id: planned.id,
                    metadata: planned.metadata,
                    content_blocks: response.content_blocks,
                }),
                Err(e) => {
                    warn!(
                        job_id = job.id,
                        segment = %segment_id,
                        total,
                        "draft fan-out failed, discarding partial drafts"
                    );
                    return Err(StageError::Draft {
                        segment_id,
                        message: e.0,
                    });
                }
            }
        }

        Ok(StageOutcome::DraftsReady {
            segments,
            shared_context: outline.shared_context,
        })
    }

    /// One batched voice-synthesis call over every block of every segment
    async fn run_voice_stage(&self, job: &Job) -> Result<StageOutcome, StageError> {
        let blocks = job.voice_blocks();
        if blocks.is_empty() {
            return Err(StageError::Voice(format!(
                "job {} has no drafted content blocks to synthesize",
                job.id
            )));
        }

        info!(job_id = job.id, blocks = blocks.len(), "🎙️ synthesizing voices");
        let response = self
            .voice
            .synthesize(VoiceRequest::from_blocks(&blocks))
            .await
            .map_err(|e| StageError::Voice(e.0))?;

        // Re-establish block order; the wire contract is an unordered map.
        let mut generated_files = Vec::with_capacity(blocks.len());
        for block in &blocks {
            let file = response
                .generated_files
                .iter()
                .find(|f| f.block_name == block.block_name)
                .cloned()
                .ok_or_else(|| {
                    StageError::Voice(format!(
                        "voice service returned no file for block '{}'",
                        block.block_name
                    ))
                })?;
            generated_files.push(file);
        }

        Ok(StageOutcome::PodcastComplete { generated_files })
    }

    /// Image resolution, effect assignment and the final render call
    async fn run_assembly_stages(
        &self,
        job: &Job,
        item: &VideoQueueItem,
        progress: &dyn AssemblyProgress,
    ) -> Result<StageOutcome, StageError> {
        let options = job.video.clone().unwrap_or_default();
        let project_ref = format!("job-{}", item.source_job_id);

        progress.step(0.1, "resolving images").await;
        let resolved = self
            .image
            .resolve_images(ImageRequest {
                project_ref: project_ref.clone(),
                content_blocks: job.voice_blocks(),
                force_regenerate: options.force_regenerate,
                custom_count: options.custom_image_count,
            })
            .await
            .map_err(|e| StageError::Image(e.0))?;

        info!(
            job_id = job.id,
            images = resolved.images.len(),
            from_cache = resolved.from_cache,
            "images resolved"
        );

        let mut images: Vec<ImageAsset> = resolved
            .images
            .into_iter()
            .map(|img| ImageAsset {
                filename: img.filename,
                position_index: img.position_index,
                source_prompt: img.source_prompt,
                effects: Vec::new(),
            })
            .collect();

        // Default positional sequences are what the item stores at rest.
        progress.step(0.4, "assigning motion effects").await;
        effects::assign_sequences(EffectRule::PerPosition, &mut images);
        progress.images_resolved(&images).await;

        // The strategies differ only in the sequences sent to the renderer.
        let mut render_images = images.clone();
        match options.strategy {
            AssemblyStrategy::Static => effects::clear_sequences(&mut render_images),
            AssemblyStrategy::Fast => {
                effects::assign_sequences(EffectRule::FastCycle, &mut render_images)
            }
            AssemblyStrategy::HighQuality => {
                effects::assign_sequences(EffectRule::ApplyAll, &mut render_images)
            }
        }

        progress.step(0.6, "rendering video").await;
        let artifact = self
            .assembly
            .assemble(AssemblyRequest {
                project_ref,
                images: render_images,
                voice_file_refs: item.voice_files.iter().map(|f| f.filename.clone()).collect(),
                width: options.width,
                height: options.height,
                fps: options.fps,
                strategy: options.strategy,
            })
            .await
            .map_err(|e| StageError::Assembly(e.0))?;

        progress.step(1.0, "done").await;
        Ok(StageOutcome::VideoComplete {
            artifact_ref: artifact.artifact_ref,
            duration_seconds: artifact.duration_seconds,
            size_bytes: artifact.size_bytes,
        })
    }
}
