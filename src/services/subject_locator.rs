// src/services/subject_locator.rs
use crate::models::{FocusRegion, SubjectAnalysis};
use crate::services::llm_service::ModelHandle;
use log::{debug, warn};
use serde::Deserialize;
use std::time::Duration;

pub const NOT_AVAILABLE_CAPTION: &str = "Image analysis not available. Gemini model not loaded.";
pub const FAILED_CAPTION: &str = "Image analysis failed due to processing error.";

const GENERIC_INSTRUCTION: &str = "Create a general caption for social media";

fn platform_instruction(platform: &str) -> &'static str {
    match platform {
        "instagram" => "Create an engaging, conversational caption with emojis that would perform well on Instagram. Focus on lifestyle aspects and emotions.",
        "instagram_story" => "Create a brief, attention-grabbing caption suitable for Instagram Stories with relevant emojis.",
        "twitter" => "Create a concise, witty caption under 280 characters that would work well on Twitter/X.",
        "linkedin" => "Create a professional-sounding caption that highlights business value, industry insights or professional development aspects.",
        "facebook" => "Create a casual, descriptive caption that encourages engagement and conversation.",
        "facebook_story" => "Create a short, engaging caption suitable for Facebook Stories.",
        "pinterest" => "Create an inspirational caption that describes DIY, home decor, recipe, or lifestyle aspects with searchable keywords.",
        "youtube_thumbnail" => "Create an attention-grabbing title for a YouTube video that drives clicks while accurately describing the content.",
        _ => GENERIC_INSTRUCTION,
    }
}

pub fn build_prompt(platform: &str) -> String {
    format!(
        r##"Analyze this image and provide:
1. {instruction} (5-6 sentences max)
2. Bounding box coordinates of the main subject in format [x1, y1, x2, y2]
   where coordinates are normalized from 0 to 1
3. 8-10 relevant hashtags specific to {audience}, matching the platform's typical hashtag style and audience preferences

Format your response as JSON:
{{
  "caption": "your detailed caption here",
  "bounding_box": [x1, y1, x2, y2],
  "hashtags": "#hashtag1 #hashtag2 #hashtag3"
}}

Your response must be valid JSON only, with no additional text."##,
        instruction = platform_instruction(platform),
        audience = platform.replace('_', " "),
    )
}

pub fn not_available(platform: &str) -> SubjectAnalysis {
    SubjectAnalysis {
        caption: NOT_AVAILABLE_CAPTION.to_string(),
        focus: FocusRegion::FULL,
        hashtags: format!("#{}", platform),
    }
}

pub fn failure_fallback(platform: &str) -> SubjectAnalysis {
    SubjectAnalysis {
        caption: FAILED_CAPTION.to_string(),
        focus: FocusRegion::FULL,
        hashtags: format!("#{}", platform),
    }
}

#[derive(Debug, Deserialize)]
struct ModelReply {
    caption: String,
    bounding_box: [f64; 4],
    hashtags: String,
}

/// Removes a ```json or bare ``` fence around the payload, if present.
pub fn strip_code_fence(text: &str) -> &str {
    let inner = if let Some((_, rest)) = text.split_once("```json") {
        rest.split("```").next().unwrap_or_default()
    } else if text.contains("```") {
        text.split("```").nth(1).unwrap_or_default()
    } else {
        text
    };
    inner.trim()
}

/// Parses the model's reply. Any structural problem yields `None`; a
/// well-formed box is still clamped through [`FocusRegion::new`].
pub fn parse_reply(text: &str) -> Option<SubjectAnalysis> {
    let reply: ModelReply = match serde_json::from_str(strip_code_fence(text)) {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Error parsing Gemini response: {}", e);
            debug!("Raw response: {}", text);
            return None;
        }
    };
    let [x1, y1, x2, y2] = reply.bounding_box;
    Some(SubjectAnalysis {
        caption: reply.caption,
        focus: FocusRegion::new(x1, y1, x2, y2),
        hashtags: reply.hashtags,
    })
}

/// Asks the vision model for a caption, subject box and hashtags.
/// Never fails: every problem degrades to a fixed fallback.
pub struct SubjectLocator {
    model: Option<ModelHandle>,
    timeout: Duration,
}

impl SubjectLocator {
    pub fn new(model: Option<ModelHandle>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub async fn locate(&self, image_data: &[u8], platform: &str) -> SubjectAnalysis {
        let Some(model) = &self.model else {
            return not_available(platform);
        };

        let prompt = build_prompt(platform);
        let mime_type = guess_mime(image_data);

        let reply = tokio::time::timeout(
            self.timeout,
            model.generate(&prompt, image_data, mime_type),
        )
        .await;

        let text = match reply {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("Error processing with {}: {}", model.name(), e);
                return failure_fallback(platform);
            }
            Err(_) => {
                warn!(
                    "{} did not answer within {:?}, using fallback",
                    model.name(),
                    self.timeout
                );
                return failure_fallback(platform);
            }
        };

        parse_reply(&text).unwrap_or_else(|| failure_fallback(platform))
    }
}

fn guess_mime(image_data: &[u8]) -> &'static str {
    match image::guess_format(image_data) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Gif) => "image/gif",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Bmp) => "image/bmp",
        Ok(image::ImageFormat::Tiff) => "image/tiff",
        _ => "image/jpeg",
    }
}
