// src/services/image_processor.rs
use crate::errors::PostfitError;
use crate::models::OutputFormat;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{ColorType, DynamicImage, ImageEncoder, ImageFormat as ImgFormat};
use std::io::Cursor;

/// JPEG quality for every optimized output.
pub const OUTPUT_QUALITY: u8 = 98;

pub struct ImageProcessor;

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, data: &[u8]) -> Result<DynamicImage, PostfitError> {
        image::load_from_memory(data)
            .map_err(|e| PostfitError::Decode(format!("Invalid image format: {}", e)))
    }

    /// Encodes as `format`. The image is flattened to RGB first, so alpha is
    /// dropped for every format.
    pub fn encode(&self, image: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>, PostfitError> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut output = Vec::new();

        let encoded = match format {
            OutputFormat::Jpeg => {
                // the image crate's baseline encoder writes 4:4:4, no chroma subsampling
                JpegEncoder::new_with_quality(&mut output, OUTPUT_QUALITY).encode(
                    rgb.as_raw(),
                    width,
                    height,
                    ColorType::Rgb8,
                )
            }
            OutputFormat::Png => PngEncoder::new_with_quality(
                &mut output,
                CompressionType::Best,
                PngFilter::Adaptive,
            )
            .write_image(rgb.as_raw(), width, height, ColorType::Rgb8),
            OutputFormat::Gif => DynamicImage::ImageRgb8(rgb)
                .write_to(&mut Cursor::new(&mut output), ImgFormat::Gif),
            OutputFormat::Bmp => DynamicImage::ImageRgb8(rgb)
                .write_to(&mut Cursor::new(&mut output), ImgFormat::Bmp),
            OutputFormat::Tiff => DynamicImage::ImageRgb8(rgb)
                .write_to(&mut Cursor::new(&mut output), ImgFormat::Tiff),
        };

        encoded.map_err(|e| {
            PostfitError::Encode(format!("Failed to encode {} image: {}", format, e))
        })?;
        Ok(output)
    }
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Makes model text safe for the two-line caption sidecar: line breaks and
/// tabs become spaces, other control characters become `?`.
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            c if c.is_control() => '?',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}
