// src/pipeline/contracts.rs
//! Request/response contracts for the external generation collaborators.
//! The stage executor only ever talks to these traits; the HTTP clients
//! implement them and tests substitute mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::queue::{GeneratedVoiceFile, SegmentMetadata, VoiceBlock};

/// Opaque collaborator failure. The message is what ends up, verbatim,
/// in the job's `error` field.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type ServiceResult<T> = Result<T, CollaboratorError>;

// ============================================================================
// STRUCTURE SERVICE
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StructureRequest {
    pub topic: String,
    pub target_duration: u32,
    pub target_word_count: u32,
    pub assistant_ref: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlannedSegment {
    pub id: String,
    pub metadata: SegmentMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StructureResponse {
    pub segments: Vec<PlannedSegment>,
    pub shared_context: String,
}

/// Drafts the episode outline: ordered segments, metadata only
#[async_trait]
pub trait StructureService: Send + Sync {
    async fn draft_structure(&self, request: StructureRequest) -> ServiceResult<StructureResponse>;
}

// ============================================================================
// DRAFT SERVICE
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DraftRequest {
    pub assistant_ref: String,
    pub segment_id: String,
    pub segment_metadata: SegmentMetadata,
    pub shared_context: String,
    /// Default narration voice for blocks the service does not cast itself
    pub voice_ref: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftResponse {
    pub segment_id: String,
    pub content_blocks: Vec<VoiceBlock>,
}

/// Writes the content blocks for one segment
#[async_trait]
pub trait DraftService: Send + Sync {
    async fn draft_segment(&self, request: DraftRequest) -> ServiceResult<DraftResponse>;
}

// ============================================================================
// VOICE SERVICE
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct VoiceBlockPayload {
    pub text: String,
    pub voice_ref: String,
}

/// One batched request per voice stage - the whole block map at once,
/// never a call per block.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceRequest {
    pub blocks: HashMap<String, VoiceBlockPayload>,
}

impl VoiceRequest {
    pub fn from_blocks(blocks: &[VoiceBlock]) -> Self {
        let blocks = blocks
            .iter()
            .map(|b| {
                (
                    b.block_name.clone(),
                    VoiceBlockPayload {
                        text: b.text.clone(),
                        voice_ref: b.voice_ref.clone(),
                    },
                )
            })
            .collect();
        Self { blocks }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceResponse {
    pub generated_files: Vec<GeneratedVoiceFile>,
}

#[async_trait]
pub trait VoiceService: Send + Sync {
    async fn synthesize(&self, request: VoiceRequest) -> ServiceResult<VoiceResponse>;
}

// ============================================================================
// IMAGE SERVICE
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ImageRequest {
    pub project_ref: String,
    pub content_blocks: Vec<VoiceBlock>,
    /// Explicit caller decision - a cache hit is never overridden silently
    pub force_regenerate: bool,
    pub custom_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolvedImage {
    pub filename: String,
    pub position_index: usize,
    pub source_prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageResponse {
    pub images: Vec<ResolvedImage>,
    pub from_cache: bool,
}

#[async_trait]
pub trait ImageService: Send + Sync {
    async fn resolve_images(&self, request: ImageRequest) -> ServiceResult<ImageResponse>;
}

// ============================================================================
// ASSEMBLY SERVICE
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AssemblyRequest {
    pub project_ref: String,
    /// Images with their effect sequences already parameterized for the
    /// chosen strategy
    pub images: Vec<crate::queue::ImageAsset>,
    pub voice_file_refs: Vec<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub strategy: crate::queue::AssemblyStrategy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssemblyResponse {
    pub artifact_ref: String,
    pub duration_seconds: f64,
    pub size_bytes: u64,
}

#[async_trait]
pub trait AssemblyService: Send + Sync {
    async fn assemble(&self, request: AssemblyRequest) -> ServiceResult<AssemblyResponse>;
}

// ============================================================================
// PROGRESS REPORTING
// ============================================================================

/// Sink for assembly progress; the scheduler feeds these updates into the
/// video queue item so the record is inspectable mid-flight.
#[async_trait]
pub trait AssemblyProgress: Send + Sync {
    async fn step(&self, progress: f32, current_step: &str);
    async fn images_resolved(&self, images: &[crate::queue::ImageAsset]);
}

/// No-op sink for podcast stages and tests
pub struct NullProgress;

#[async_trait]
impl AssemblyProgress for NullProgress {
    async fn step(&self, _progress: f32, _current_step: &str) {}
    async fn images_resolved(&self, _images: &[crate::queue::ImageAsset]) {}
}
