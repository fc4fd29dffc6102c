// src/models.rs
use crate::errors::PostfitError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformSpec {
    pub key: &'static str,
    pub width: u32,
    pub height: u32,
}

pub static PLATFORMS: [PlatformSpec; 8] = [
    PlatformSpec { key: "instagram", width: 1080, height: 1080 },
    PlatformSpec { key: "instagram_story", width: 1080, height: 1920 },
    PlatformSpec { key: "twitter", width: 1600, height: 900 },
    PlatformSpec { key: "linkedin", width: 1200, height: 627 },
    PlatformSpec { key: "facebook", width: 1080, height: 1920 },
    PlatformSpec { key: "facebook_story", width: 1080, height: 1920 },
    PlatformSpec { key: "pinterest", width: 1000, height: 1500 },
    PlatformSpec { key: "youtube_thumbnail", width: 1280, height: 720 },
];

impl PlatformSpec {
    pub fn lookup(key: &str) -> Option<&'static PlatformSpec> {
        PLATFORMS.iter().find(|p| p.key == key)
    }

    pub fn keys() -> impl Iterator<Item = &'static str> {
        PLATFORMS.iter().map(|p| p.key)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn display_name(&self) -> String {
        display_name(self.key)
    }
}

/// `instagram_story` -> `Instagram Story`.
pub fn display_name(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized bounding box of the detected subject.
///
/// Coordinates are always inside `[0, 1]` with `x2 > x1` and `y2 > y1`;
/// construction clamps and falls back to the full image otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusRegion {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl FocusRegion {
    pub const FULL: FocusRegion = FocusRegion {
        x1: 0.0,
        y1: 0.0,
        x2: 1.0,
        y2: 1.0,
    };

    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let clamp = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        let (x1, y1, x2, y2) = (clamp(x1), clamp(y1), clamp(x2), clamp(y2));
        if x2 <= x1 || y2 <= y1 {
            return Self::FULL;
        }
        Self { x1, y1, x2, y2 }
    }

    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }
}

impl Default for FocusRegion {
    fn default() -> Self {
        Self::FULL
    }
}

/// Caption, subject framing and hashtags produced for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectAnalysis {
    pub caption: String,
    pub focus: FocusRegion,
    pub hashtags: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Gif => "gif",
            OutputFormat::Bmp => "bmp",
            OutputFormat::Tiff => "tiff",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = PostfitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "JPEG" | "JPG" => Ok(OutputFormat::Jpeg),
            "PNG" => Ok(OutputFormat::Png),
            "GIF" => Ok(OutputFormat::Gif),
            "BMP" => Ok(OutputFormat::Bmp),
            "TIFF" | "TIF" => Ok(OutputFormat::Tiff),
            other => Err(PostfitError::Validation(format!(
                "Unsupported output format: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.extension().to_ascii_uppercase())
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingOptions {
    pub platform: String,
    pub format: OutputFormat,
    pub smart_crop_enabled: bool,
    /// Accepted but inert.
    pub enhance_enabled: bool,
    /// Accepted but inert.
    pub confidence: f32,
    /// Cache buster from the client; never read by the pipeline.
    pub cache_token: Option<String>,
}

impl ProcessingOptions {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            format: OutputFormat::Jpeg,
            smart_crop_enabled: false,
            enhance_enabled: false,
            confidence: 0.3,
            cache_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingSuccess {
    pub platform: String,
    pub size: (u32, u32),
    pub optimized_image: String,
    pub caption_text: String,
    pub hashtags: String,
    pub enhanced: bool,
    pub smart_cropped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingFailure {
    pub error: String,
    pub platform: String,
    pub size: (u32, u32),
    pub caption_text: String,
    pub hashtags: String,
    pub enhanced: bool,
    pub smart_cropped: bool,
}

impl ProcessingFailure {
    pub fn new(platform: &str, error: &PostfitError) -> Self {
        let size = PlatformSpec::lookup(platform)
            .map(PlatformSpec::size)
            .unwrap_or((0, 0));
        Self {
            error: format!("Processing failed: {}", error),
            platform: display_name(platform),
            size,
            caption_text: "Image processing failed.".to_string(),
            hashtags: format!("#{}", platform),
            enhanced: false,
            smart_cropped: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProcessingResult {
    Success(ProcessingSuccess),
    Failure(ProcessingFailure),
}

impl ProcessingResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingResult::Success(_))
    }
}
