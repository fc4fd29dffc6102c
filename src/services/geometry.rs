// src/services/geometry.rs
//! Crop and resize planning for platform targets.
//!
//! Planning is pure arithmetic on dimensions; the `apply` helpers only
//! execute a plan against a decoded image. A fit plan is laid out in resized
//! coordinates but executed as one crop of the source followed by one
//! resample, so no buffer larger than the source or the target is allocated.

use crate::errors::PostfitError;
use crate::models::FocusRegion;
use image::DynamicImage;
use image::imageops::FilterType;

/// Aspect ratios closer than this are treated as equal.
pub const ASPECT_TOLERANCE: f64 = 0.01;
/// Padding added around the subject, as a fraction of the subject size.
pub const FOCUS_PADDING: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitPlan {
    pub resize: (u32, u32),
    pub crop: Option<CropWindow>,
}

/// Works out how to turn `source` into exactly `target`.
pub fn plan_fit(source: (u32, u32), target: (u32, u32)) -> Result<FitPlan, PostfitError> {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    if src_w == 0 || src_h == 0 {
        return Err(PostfitError::Geometry(format!(
            "source image has zero area ({}x{})",
            src_w, src_h
        )));
    }
    if tgt_w == 0 || tgt_h == 0 {
        return Err(PostfitError::Geometry(format!(
            "target size has zero area ({}x{})",
            tgt_w, tgt_h
        )));
    }

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if (src_aspect - tgt_aspect).abs() <= ASPECT_TOLERANCE {
        return Ok(FitPlan {
            resize: target,
            crop: None,
        });
    }

    let resize = if src_aspect > tgt_aspect {
        // wider: match height, overflow width
        let w = scale(tgt_h, src_w, src_h).max(tgt_w);
        (w, tgt_h)
    } else {
        let h = scale(tgt_w, src_h, src_w).max(tgt_h);
        (tgt_w, h)
    };

    Ok(FitPlan {
        resize,
        crop: Some(center_crop(resize, target)),
    })
}

/// `value * num / den`, floored, without float rounding drift.
fn scale(value: u32, num: u32, den: u32) -> u32 {
    (value as u64 * num as u64 / den as u64).min(u32::MAX as u64) as u32
}

fn center_crop(current: (u32, u32), target: (u32, u32)) -> CropWindow {
    CropWindow {
        left: (current.0 - target.0) / 2,
        top: (current.1 - target.1) / 2,
        width: target.0,
        height: target.1,
    }
}

/// Maps the plan's crop window back onto the source image.
///
/// Returns `None` when the plan has no crop. The window always lies inside
/// the source and is at least one pixel on each side.
pub fn source_window(source: (u32, u32), plan: &FitPlan) -> Option<CropWindow> {
    let crop = plan.crop?;
    let (left, width) = project(crop.left, crop.width, plan.resize.0, source.0);
    let (top, height) = project(crop.top, crop.height, plan.resize.1, source.1);
    Some(CropWindow {
        left,
        top,
        width,
        height,
    })
}

fn project(offset: u32, length: u32, resized: u32, source: u32) -> (u32, u32) {
    let ratio = source as f64 / resized as f64;
    let length = ((length as f64 * ratio).round() as u32).clamp(1, source);
    let offset = ((offset as f64 * ratio).round() as u32).min(source - length);
    (offset, length)
}

/// Resizes and center-crops `image` to exactly `target_width` x `target_height`.
pub fn fit_to_target(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
) -> Result<DynamicImage, PostfitError> {
    let source = (image.width(), image.height());
    let plan = plan_fit(source, (target_width, target_height))?;

    let fitted = match source_window(source, &plan) {
        Some(window) => image
            .crop_imm(window.left, window.top, window.width, window.height)
            .resize_exact(target_width, target_height, FilterType::Lanczos3),
        None => image.resize_exact(target_width, target_height, FilterType::Lanczos3),
    };

    if fitted.width() != target_width || fitted.height() != target_height {
        return Err(PostfitError::Geometry(format!(
            "fit produced {}x{} instead of {}x{}",
            fitted.width(),
            fitted.height(),
            target_width,
            target_height
        )));
    }
    Ok(fitted)
}

/// Pixel window around the subject with padding, or `None` when the
/// padded box collapses.
pub fn focus_crop_window(dimensions: (u32, u32), region: &FocusRegion) -> Option<CropWindow> {
    let (width, height) = (dimensions.0 as i64, dimensions.1 as i64);

    let x1 = (region.x1 * width as f64) as i64;
    let y1 = (region.y1 * height as f64) as i64;
    let x2 = (region.x2 * width as f64) as i64;
    let y2 = (region.y2 * height as f64) as i64;

    let pad_x = ((x2 - x1) as f64 * FOCUS_PADDING) as i64;
    let pad_y = ((y2 - y1) as f64 * FOCUS_PADDING) as i64;

    let x1 = (x1 - pad_x).max(0);
    let y1 = (y1 - pad_y).max(0);
    let x2 = (x2 + pad_x).min(width);
    let y2 = (y2 + pad_y).min(height);

    if x1 >= x2 || y1 >= y2 || x2 <= 0 || y2 <= 0 {
        return None;
    }

    Some(CropWindow {
        left: x1 as u32,
        top: y1 as u32,
        width: (x2 - x1) as u32,
        height: (y2 - y1) as u32,
    })
}

/// Crops to the padded subject. `None` means the crop was declined and the
/// caller should keep the original image.
pub fn apply_focus_crop(image: &DynamicImage, region: &FocusRegion) -> Option<DynamicImage> {
    let window = focus_crop_window((image.width(), image.height()), region)?;
    Some(image.crop_imm(window.left, window.top, window.width, window.height))
}
