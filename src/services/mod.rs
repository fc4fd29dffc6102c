// src/services/mod.rs
pub mod asset_store;
pub mod geometry;
pub mod image_processor;
pub mod llm_service;
pub mod pipeline;
pub mod subject_locator;

pub use asset_store::AssetStore;
pub use image_processor::ImageProcessor;
pub use llm_service::ModelRegistry;
pub use pipeline::ImagePipeline;
