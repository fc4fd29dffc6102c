// src/services/pipeline.rs
//! Decode, locate the subject, optionally smart-crop, fit to the platform,
//! encode and store.
//!
//! Model and crop problems degrade to fallbacks. Decode, fit, encode and
//! storage problems turn the run into a [`ProcessingFailure`]. `process`
//! itself never returns an error.

use crate::errors::PostfitError;
use crate::models::{
    PlatformSpec, ProcessingFailure, ProcessingOptions, ProcessingResult, ProcessingSuccess,
    SubjectAnalysis,
};
use crate::services::asset_store::AssetStore;
use crate::services::geometry::{apply_focus_crop, fit_to_target};
use crate::services::image_processor::{ImageProcessor, sanitize_text};
use crate::services::llm_service::ModelRegistry;
use crate::services::subject_locator::{SubjectLocator, failure_fallback};
use bytes::Bytes;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct ImagePipeline {
    models: Arc<ModelRegistry>,
    processor: Arc<ImageProcessor>,
    store: AssetStore,
    model_timeout: Duration,
}

impl ImagePipeline {
    pub fn new(
        models: Arc<ModelRegistry>,
        processor: Arc<ImageProcessor>,
        store: AssetStore,
        model_timeout: Duration,
    ) -> Self {
        Self {
            models,
            processor,
            store,
            model_timeout,
        }
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    pub async fn process(&self, image_data: Bytes, options: &ProcessingOptions) -> ProcessingResult {
        match self.run(image_data, options).await {
            Ok(success) => {
                info!(
                    "Image processed successfully for platform {}: {}",
                    options.platform, success.optimized_image
                );
                ProcessingResult::Success(success)
            }
            Err(e) => {
                error!("Error in complete processing for {}: {}", options.platform, e);
                ProcessingResult::Failure(ProcessingFailure::new(&options.platform, &e))
            }
        }
    }

    async fn run(
        &self,
        image_data: Bytes,
        options: &ProcessingOptions,
    ) -> Result<ProcessingSuccess, PostfitError> {
        let request_id = Uuid::new_v4();
        let timestamp = Utc::now().timestamp_millis();
        debug!(
            "Request {}: enhance={} confidence={} (not applied)",
            request_id, options.enhance_enabled, options.confidence
        );

        let platform = PlatformSpec::lookup(&options.platform).ok_or_else(|| {
            PostfitError::Validation(format!("Unsupported platform: {}", options.platform))
        })?;

        let processor = self.processor.clone();
        let data = image_data.clone();
        let image = blocking(PostfitError::Decode, move || processor.decode(&data)).await?;

        let analysis = self.locate(image_data, &options.platform).await;

        let smart_crop = options.smart_crop_enabled;
        let focus = analysis.focus;
        let format = options.format;
        let (target_width, target_height) = platform.size();
        let processor = self.processor.clone();

        let (encoded, smart_cropped) = blocking(PostfitError::Geometry, move || {
            let mut image = image;
            let mut smart_cropped = false;
            if smart_crop {
                match apply_focus_crop(&image, &focus) {
                    Some(cropped) => {
                        image = cropped;
                        smart_cropped = true;
                    }
                    None => debug!("Smart crop declined for {:?}", focus),
                }
            }
            let fitted = fit_to_target(&image, target_width, target_height)?;
            let encoded = processor.encode(&fitted, format)?;
            Ok((encoded, smart_cropped))
        })
        .await?;

        let caption = sanitize_text(&analysis.caption);
        let hashtags = sanitize_text(&analysis.hashtags);

        let stem = format!("{}_{}_{}", platform.key, request_id, timestamp);
        let image_name = format!("{}.{}", stem, format.extension());
        let caption_name = format!("{}.txt", stem);

        let image_path = self.store.image_path(&image_name)?;
        self.store.save(&image_path, &encoded).await?;

        let caption_path = self.store.caption_path(&caption_name)?;
        self.store
            .save_text(&caption_path, &format!("{}\n\n{}", caption, hashtags))
            .await?;

        Ok(ProcessingSuccess {
            platform: platform.display_name(),
            size: platform.size(),
            optimized_image: AssetStore::public_url(&image_name),
            caption_text: caption,
            hashtags,
            enhanced: false,
            smart_cropped,
        })
    }

    /// Runs the locator on its own task with the model snapshot taken now.
    /// A panic inside it is treated like any other model failure.
    async fn locate(&self, image_data: Bytes, platform: &str) -> SubjectAnalysis {
        let locator = SubjectLocator::new(self.models.current(), self.model_timeout);
        let key = platform.to_string();

        match tokio::spawn(async move { locator.locate(&image_data, &key).await }).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Gemini processing failed: {}, using fallback", e);
                failure_fallback(platform)
            }
        }
    }
}

async fn blocking<T, F>(on_panic: fn(String) -> PostfitError, f: F) -> Result<T, PostfitError>
where
    F: FnOnce() -> Result<T, PostfitError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| on_panic(format!("worker task failed: {}", e)))?
}
