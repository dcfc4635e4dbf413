// src/voice_client.rs
// Eleven Labs voice synthesis client
// One queue-facing call per voice stage; the per-block requests happen here

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::pipeline::contracts::{
    CollaboratorError, ServiceResult, VoiceRequest, VoiceResponse, VoiceService,
};
use crate::queue::GeneratedVoiceFile;

#[derive(Clone)]
pub struct VoiceClient {
    api_key: String,
    client: Client,
    base_url: String,
    output_dir: String,
}

// ============================================================================
// API REQUEST STRUCTURES
// ============================================================================

#[derive(Serialize, Debug)]
struct TextToSpeechRequest {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_id: Option<String>,
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

impl VoiceClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: "https://api.elevenlabs.io/v1".to_string(),
            output_dir: "outputs/audio".to_string(),
        }
    }

    pub fn with_output_dir(mut self, output_dir: String) -> Self {
        self.output_dir = output_dir;
        self
    }

    /// Synthesize one block and write the audio next to the other outputs
    async fn synthesize_block(
        &self,
        block_name: &str,
        text: &str,
        voice_ref: &str,
    ) -> ServiceResult<GeneratedVoiceFile> {
        let url = format!("{}/text-to-speech/{}", self.base_url, voice_ref);

        let request_body = TextToSpeechRequest {
            text: text.to_string(),
            model_id: Some("eleven_multilingual_v2".to_string()),
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| CollaboratorError::new(format!("voice request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CollaboratorError::new(format!(
                "Eleven Labs TTS API error ({status}): {error_text}"
            )));
        }

        let audio_bytes = response
            .bytes()
            .await
            .map_err(|e| CollaboratorError::new(format!("voice audio unreadable: {e}")))?;

        let filename = format!("{}/{}.mp3", self.output_dir, block_name);
        let mut file = fs::File::create(&filename)
            .await
            .map_err(|e| CollaboratorError::new(format!("failed to create {filename}: {e}")))?;
        file.write_all(&audio_bytes)
            .await
            .map_err(|e| CollaboratorError::new(format!("failed to write {filename}: {e}")))?;

        Ok(GeneratedVoiceFile {
            filename,
            block_name: block_name.to_string(),
        })
    }
}

#[async_trait]
impl VoiceService for VoiceClient {
    async fn synthesize(&self, request: VoiceRequest) -> ServiceResult<VoiceResponse> {
        fs::create_dir_all(&self.output_dir).await.map_err(|e| {
            CollaboratorError::new(format!(
                "failed to create audio output directory {}: {e}",
                self.output_dir
            ))
        })?;

        info!(blocks = request.blocks.len(), "🎙️ synthesizing voice blocks");

        let mut generated_files = Vec::with_capacity(request.blocks.len());
        for (block_name, block) in &request.blocks {
            let file = self
                .synthesize_block(block_name, &block.text, &block.voice_ref)
                .await?;
            generated_files.push(file);
        }

        Ok(VoiceResponse { generated_files })
    }
}
