// src/assistant_client.rs
// OpenAI-compatible assistant client
// Supports: episode structure outlines, per-segment content drafting

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::pipeline::contracts::{
    CollaboratorError, DraftRequest, DraftResponse, DraftService, PlannedSegment, ServiceResult,
    StructureRequest, StructureResponse, StructureService,
};
use crate::queue::{SegmentMetadata, VoiceBlock};

#[derive(Clone)]
pub struct AssistantClient {
    api_key: String,
    client: Client,
    base_url: String,
}

// ============================================================================
// API REQUEST/RESPONSE STRUCTURES
// ============================================================================

#[derive(Serialize, Debug)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Serialize, Debug)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize, Debug)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChatChoiceMessage {
    content: String,
}

/// JSON payload the assistant is instructed to produce for an outline
#[derive(Deserialize, Debug)]
struct OutlinePayload {
    segments: Vec<OutlineSegmentPayload>,
    shared_context: String,
}

#[derive(Deserialize, Debug)]
struct OutlineSegmentPayload {
    id: String,
    title: String,
    brief: String,
    target_words: u32,
}

/// JSON payload the assistant is instructed to produce for a draft
#[derive(Deserialize, Debug)]
struct DraftPayload {
    blocks: Vec<DraftBlockPayload>,
}

#[derive(Deserialize, Debug)]
struct DraftBlockPayload {
    block_name: String,
    text: String,
    #[serde(default)]
    voice_ref: Option<String>,
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

impl AssistantClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// One JSON-mode chat call; returns the raw content string
    async fn chat_json(
        &self,
        model: &str,
        system_prompt: String,
        user_prompt: String,
    ) -> ServiceResult<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt,
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
            temperature: 0.7,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| CollaboratorError::new(format!("assistant request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CollaboratorError::new(format!(
                "Assistant API error ({status}): {error_text}"
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::new(format!("assistant response unreadable: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CollaboratorError::new("assistant returned no choices".to_string()))
    }
}

#[async_trait]
impl StructureService for AssistantClient {
    async fn draft_structure(&self, request: StructureRequest) -> ServiceResult<StructureResponse> {
        let system_prompt = "You plan podcast episodes. Respond with a JSON object: \
            {\"segments\": [{\"id\", \"title\", \"brief\", \"target_words\"}], \
            \"shared_context\"}. Segments are ordered; do not write any episode \
            content yet."
            .to_string();
        let user_prompt = format!(
            "Topic: {}\nTarget duration: {} minutes\nTarget total word count: {}",
            request.topic, request.target_duration, request.target_word_count
        );

        let content = self
            .chat_json(&request.assistant_ref, system_prompt, user_prompt)
            .await?;

        let payload: OutlinePayload = serde_json::from_str(&content).map_err(|e| {
            CollaboratorError::new(format!("assistant outline was not valid JSON: {e}"))
        })?;

        if payload.segments.is_empty() {
            return Err(CollaboratorError::new(
                "assistant outline contained no segments".to_string(),
            ));
        }

        Ok(StructureResponse {
            segments: payload
                .segments
                .into_iter()
                .map(|s| PlannedSegment {
                    id: s.id,
                    metadata: SegmentMetadata {
                        title: s.title,
                        brief: s.brief,
                        target_words: s.target_words,
                    },
                })
                .collect(),
            shared_context: payload.shared_context,
        })
    }
}

#[async_trait]
impl DraftService for AssistantClient {
    async fn draft_segment(&self, request: DraftRequest) -> ServiceResult<DraftResponse> {
        let system_prompt = "You write narration for one podcast segment. Respond with a \
            JSON object: {\"blocks\": [{\"block_name\", \"text\", \"voice_ref\"}]}. \
            block_name must be unique within the segment; voice_ref may be omitted \
            to use the default narrator."
            .to_string();
        let user_prompt = format!(
            "Segment: {} ({})\nBrief: {}\nTarget words: {}\n\nShared episode context:\n{}",
            request.segment_metadata.title,
            request.segment_id,
            request.segment_metadata.brief,
            request.segment_metadata.target_words,
            request.shared_context
        );

        let content = self
            .chat_json(&request.assistant_ref, system_prompt, user_prompt)
            .await?;

        let payload: DraftPayload = serde_json::from_str(&content).map_err(|e| {
            CollaboratorError::new(format!(
                "assistant draft for segment {} was not valid JSON: {e}",
                request.segment_id
            ))
        })?;

        Ok(DraftResponse {
            segment_id: request.segment_id,
            content_blocks: payload
                .blocks
                .into_iter()
                .map(|b| VoiceBlock {
                    block_name: b.block_name,
                    text: b.text,
                    voice_ref: b.voice_ref.unwrap_or_else(|| request.voice_ref.clone()),
                })
                .collect(),
        })
    }
}
