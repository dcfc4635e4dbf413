// src/image_client.rs
// Image generation client with a local cache probe
// Reuses previously generated images for a project unless the caller
// explicitly forces regeneration

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::pipeline::contracts::{
    CollaboratorError, ImageRequest, ImageResponse, ImageService, ResolvedImage, ServiceResult,
};
use crate::queue::VoiceBlock;

const PROMPT_EXCERPT_CHARS: usize = 160;

#[derive(Clone)]
pub struct ImageClient {
    api_key: String,
    client: Client,
    base_url: String,
    cache_dir: String,
}

// ============================================================================
// API REQUEST/RESPONSE STRUCTURES
// ============================================================================

#[derive(Serialize, Debug)]
struct TextToImageRequest {
    prompt: String,
    width: u32,
    height: u32,
    response_format: String,
}

#[derive(Deserialize, Debug)]
struct TextToImageResponse {
    url: String,
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

impl ImageClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: "https://api.getimg.ai/v1".to_string(),
            cache_dir: "outputs/images".to_string(),
        }
    }

    pub fn with_cache_dir(mut self, cache_dir: String) -> Self {
        self.cache_dir = cache_dir;
        self
    }

    /// One visual prompt per content block, or `custom_count` prompts
    /// cycled over the blocks.
    fn derive_prompts(blocks: &[VoiceBlock], custom_count: Option<u32>) -> Vec<String> {
        let per_block: Vec<String> = blocks
            .iter()
            .map(|b| {
                let excerpt: String = b.text.chars().take(PROMPT_EXCERPT_CHARS).collect();
                format!("Podcast scene illustration: {excerpt}")
            })
            .collect();

        match custom_count {
            None => per_block,
            Some(count) => (0..count as usize)
                .map(|i| {
                    per_block
                        .get(i % per_block.len().max(1))
                        .cloned()
                        .unwrap_or_else(|| "Podcast cover illustration".to_string())
                })
                .collect(),
        }
    }

    /// Existence probe: previously generated images for this project
    async fn cached_images(&self, project_dir: &str) -> Vec<String> {
        let mut filenames = Vec::new();
        let Ok(mut entries) = fs::read_dir(project_dir).await else {
            return filenames;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(name) = entry.file_name().to_str() {
                filenames.push(format!("{project_dir}/{name}"));
            }
        }
        filenames.sort();
        filenames
    }

    async fn generate_image(
        &self,
        prompt: &str,
        destination: &str,
    ) -> ServiceResult<()> {
        let url = format!("{}/text-to-image", self.base_url);

        let request_body = TextToImageRequest {
            prompt: prompt.to_string(),
            width: 1024,
            height: 576,
            response_format: "url".to_string(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| CollaboratorError::new(format!("image request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CollaboratorError::new(format!(
                "Image API error ({status}): {error_text}"
            )));
        }

        let body: TextToImageResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::new(format!("image response unreadable: {e}")))?;

        let image_bytes = self
            .client
            .get(&body.url)
            .send()
            .await
            .map_err(|e| CollaboratorError::new(format!("image download failed: {e}")))?
            .bytes()
            .await
            .map_err(|e| CollaboratorError::new(format!("image bytes unreadable: {e}")))?;

        let mut file = fs::File::create(destination)
            .await
            .map_err(|e| CollaboratorError::new(format!("failed to create {destination}: {e}")))?;
        file.write_all(&image_bytes)
            .await
            .map_err(|e| CollaboratorError::new(format!("failed to write {destination}: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl ImageService for ImageClient {
    async fn resolve_images(&self, request: ImageRequest) -> ServiceResult<ImageResponse> {
        let project_dir = format!("{}/{}", self.cache_dir, request.project_ref);
        let prompts = Self::derive_prompts(&request.content_blocks, request.custom_count);

        if prompts.is_empty() {
            return Err(CollaboratorError::new(
                "no content blocks to derive image prompts from".to_string(),
            ));
        }

        // cache hit: only when the caller did not force regeneration
        if !request.force_regenerate {
            let cached = self.cached_images(&project_dir).await;
            if cached.len() >= prompts.len() {
                info!(
                    project = %request.project_ref,
                    images = prompts.len(),
                    "♻️ reusing cached images"
                );
                return Ok(ImageResponse {
                    images: cached
                        .into_iter()
                        .take(prompts.len())
                        .zip(prompts)
                        .enumerate()
                        .map(|(position_index, (filename, source_prompt))| ResolvedImage {
                            filename,
                            position_index,
                            source_prompt,
                        })
                        .collect(),
                    from_cache: true,
                });
            }
        }

        fs::create_dir_all(&project_dir).await.map_err(|e| {
            CollaboratorError::new(format!(
                "failed to create image directory {project_dir}: {e}"
            ))
        })?;

        info!(
            project = %request.project_ref,
            images = prompts.len(),
            "🖼️ generating images"
        );

        let mut images = Vec::with_capacity(prompts.len());
        for (position_index, source_prompt) in prompts.into_iter().enumerate() {
            let filename = format!("{project_dir}/img_{position_index:03}.png");
            self.generate_image(&source_prompt, &filename).await?;
            images.push(ResolvedImage {
                filename,
                position_index,
                source_prompt,
            });
        }

        Ok(ImageResponse {
            images,
            from_cache: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(name: &str, text: &str) -> VoiceBlock {
        VoiceBlock {
            block_name: name.to_string(),
            text: text.to_string(),
            voice_ref: "voice_nova".to_string(),
        }
    }

    #[test]
    fn one_prompt_per_block_by_default() {
        let prompts = ImageClient::derive_prompts(
            &[block("a", "first block"), block("b", "second block")],
            None,
        );
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("first block"));
        assert!(prompts[1].contains("second block"));
    }

    #[test]
    fn custom_count_cycles_blocks() {
        let prompts =
            ImageClient::derive_prompts(&[block("a", "first"), block("b", "second")], Some(5));
        assert_eq!(prompts.len(), 5);
        assert_eq!(prompts[0], prompts[2]);
        assert_eq!(prompts[1], prompts[3]);
    }

    #[test]
    fn long_block_text_is_truncated() {
        let prompts = ImageClient::derive_prompts(&[block("a", &"x".repeat(4000))], None);
        assert!(prompts[0].len() < 4000);
    }
}
