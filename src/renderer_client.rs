// src/renderer_client.rs
// Render service client - the assembly collaborator that turns images,
// effect sequences and narration audio into the final video artifact

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::pipeline::contracts::{
    AssemblyRequest, AssemblyResponse, AssemblyService, CollaboratorError, ServiceResult,
};

#[derive(Clone)]
pub struct RendererClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl RendererClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl AssemblyService for RendererClient {
    async fn assemble(&self, request: AssemblyRequest) -> ServiceResult<AssemblyResponse> {
        let url = format!("{}/render", self.base_url);

        info!(
            project = %request.project_ref,
            images = request.images.len(),
            strategy = ?request.strategy,
            "🎬 submitting render job"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CollaboratorError::new(format!("render request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CollaboratorError::new(format!(
                "Render API error ({status}): {error_text}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CollaboratorError::new(format!("render response unreadable: {e}")))
    }
}
