// src/errors.rs
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostfitError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Vision model error: {0}")]
    Locator(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for PostfitError {
    fn from(e: std::io::Error) -> Self {
        PostfitError::Io(e.to_string())
    }
}

impl ResponseError for PostfitError {
    fn error_response(&self) -> HttpResponse {
        match self {
            PostfitError::Validation(_) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Validation error",
                "message": self.to_string()
            })),
            PostfitError::NotFound(_) => HttpResponse::NotFound().json(serde_json::json!({
                "error": "File not found",
                "message": self.to_string()
            })),
            PostfitError::Locator(_) => {
                HttpResponse::ServiceUnavailable().json(serde_json::json!({
                    "error": "AI service error",
                    "message": self.to_string()
                }))
            }
            PostfitError::Geometry(_) | PostfitError::Decode(_) | PostfitError::Encode(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Image processing error",
                    "message": self.to_string()
                }))
            }
            PostfitError::Io(_) | PostfitError::Config(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Server error",
                    "message": self.to_string()
                }))
            }
        }
    }
}
