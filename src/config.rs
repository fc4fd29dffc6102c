// src/config.rs
use crate::errors::PostfitError;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_endpoint: String,
    pub model_timeout: Duration,
    pub bind_addr: String,
    pub output_dir: PathBuf,
    pub caption_dir: PathBuf,
    pub static_dir: PathBuf,
    pub frontend_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            model_timeout: Duration::from_secs(30),
            bind_addr: "0.0.0.0:8000".to_string(),
            output_dir: PathBuf::from("media/optimized"),
            caption_dir: PathBuf::from("output_captions"),
            static_dir: PathBuf::from("static"),
            frontend_dir: PathBuf::from("frontend/build"),
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self, PostfitError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, PostfitError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let model_timeout = match non_empty("MODEL_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number(&raw, "MODEL_TIMEOUT_SECS")?),
            None => defaults.model_timeout,
        };
        let max_upload_bytes = match non_empty("MAX_UPLOAD_BYTES") {
            Some(raw) => parse_number(&raw, "MAX_UPLOAD_BYTES")?,
            None => defaults.max_upload_bytes,
        };

        Ok(Self {
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            gemini_model: non_empty("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_endpoint: non_empty("GEMINI_ENDPOINT").unwrap_or(defaults.gemini_endpoint),
            model_timeout,
            bind_addr: non_empty("BIND_ADDR").unwrap_or(defaults.bind_addr),
            output_dir: non_empty("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            caption_dir: non_empty("CAPTION_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.caption_dir),
            static_dir: non_empty("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            frontend_dir: non_empty("FRONTEND_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.frontend_dir),
            max_upload_bytes,
        })
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T, PostfitError> {
    raw.trim()
        .parse()
        .map_err(|_| PostfitError::Config(format!("{} must be a non-negative integer, got {:?}", key, raw)))
}
