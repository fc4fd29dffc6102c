// src/services/llm_service.rs
use crate::config::Config;
use crate::errors::PostfitError;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use log::{info, warn};
use reqwest::Client;
use serde_json::json;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// A multimodal model that answers a text prompt about one image.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        image_data: &[u8],
        mime_type: &str,
    ) -> Result<String, PostfitError>;

    fn name(&self) -> &str;
}

pub type ModelHandle = Arc<dyn VisionModel>;

pub struct GeminiModel {
    api_key: String,
    model: String,
    endpoint: String,
    client: Client,
}

impl GeminiModel {
    pub fn new(
        api_key: String,
        model: String,
        endpoint: String,
        timeout: Duration,
    ) -> Result<Self, PostfitError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PostfitError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            model,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }
}

#[async_trait]
impl VisionModel for GeminiModel {
    async fn generate(
        &self,
        prompt: &str,
        image_data: &[u8],
        mime_type: &str,
    ) -> Result<String, PostfitError> {
        let base64_image = general_purpose::STANDARD.encode(image_data);

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&json!({
                "contents": [{
                    "parts": [
                        { "text": prompt },
                        {
                            "inline_data": {
                                "mime_type": mime_type,
                                "data": base64_image
                            }
                        }
                    ]
                }]
            }))
            .send()
            .await
            .map_err(|e| PostfitError::Locator(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PostfitError::Locator(format!(
                "Gemini error {}: {}",
                status, error_text
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PostfitError::Locator(format!("Failed to parse Gemini response: {}", e)))?;

        extract_text(&result)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Concatenates the text parts of the first candidate.
fn extract_text(result: &serde_json::Value) -> Result<String, PostfitError> {
    let parts = result["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| PostfitError::Locator("No content in Gemini response".to_string()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect();

    if text.is_empty() {
        return Err(PostfitError::Locator(
            "Gemini response contained no text".to_string(),
        ));
    }
    Ok(text)
}

/// Owns the current model handle. Readers take a snapshot; `reload` swaps
/// the whole handle so in-flight runs keep the one they started with.
pub struct ModelRegistry {
    current: RwLock<Option<ModelHandle>>,
    model: String,
    endpoint: String,
    timeout: Duration,
}

impl ModelRegistry {
    pub fn from_config(config: &Config) -> Self {
        let registry = Self::empty(config);
        registry.reload(config.gemini_api_key.clone());
        registry
    }

    pub fn empty(config: &Config) -> Self {
        Self {
            current: RwLock::new(None),
            model: config.gemini_model.clone(),
            endpoint: config.gemini_endpoint.clone(),
            timeout: config.model_timeout,
        }
    }

    pub fn with_model(model: ModelHandle, config: &Config) -> Self {
        let registry = Self::empty(config);
        registry.swap(Some(model));
        registry
    }

    pub fn current(&self) -> Option<ModelHandle> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    /// Rebuilds the handle from `api_key` and installs it. Returns whether a
    /// model is loaded afterwards.
    pub fn reload(&self, api_key: Option<String>) -> bool {
        let handle = match api_key.filter(|k| !k.trim().is_empty()) {
            Some(key) => match GeminiModel::new(
                key,
                self.model.clone(),
                self.endpoint.clone(),
                self.timeout,
            ) {
                Ok(model) => {
                    info!("Gemini model {} loaded", self.model);
                    Some(Arc::new(model) as ModelHandle)
                }
                Err(e) => {
                    warn!("Error loading models: {}", e);
                    None
                }
            },
            None => {
                warn!("No API key provided for Gemini");
                None
            }
        };
        let loaded = handle.is_some();
        self.swap(handle);
        loaded
    }

    fn swap(&self, handle: Option<ModelHandle>) {
        match self.current.write() {
            Ok(mut guard) => *guard = handle,
            Err(poisoned) => *poisoned.into_inner() = handle,
        }
    }
}
