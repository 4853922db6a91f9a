//! Resize geometry and filter choice.
//!
//! The bound applies to the larger side; the other side follows the same
//! ratio, rounded to the nearest pixel. Downscaling uses Lanczos3, upscaling
//! the softer Catmull-Rom cubic.

use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// Target dimensions and filter for one resize
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizePlan {
    pub width: u32,
    pub height: u32,
    pub ratio: f64,
    pub filter: FilterType,
}

impl ResizePlan {
    /// Plan a resize only when the larger side exceeds `bound`
    pub fn for_bound(width: u32, height: u32, bound: Option<u32>) -> Option<Self> {
        let bound = bound?;
        let larger = width.max(height);
        if larger == 0 || larger <= bound {
            return None;
        }
        Some(Self::scaled(width, height, bound as f64 / larger as f64))
    }

    /// Scale both sides by `ratio`, never below one pixel
    pub fn scaled(width: u32, height: u32, ratio: f64) -> Self {
        let scale = |side: u32| ((side as f64 * ratio).round() as u32).max(1);
        Self {
            width: scale(width),
            height: scale(height),
            ratio,
            filter: filter_for_ratio(ratio),
        }
    }

    pub fn apply(&self, image: &DynamicImage) -> DynamicImage {
        debug!(
            "Resizing {}x{} -> {}x{} ({:?})",
            image.width(),
            image.height(),
            self.width,
            self.height,
            self.filter
        );
        image.resize_exact(self.width, self.height, self.filter)
    }
}

/// Downsampling and upsampling get different filters
pub fn filter_for_ratio(ratio: f64) -> FilterType {
    if ratio < 1.0 {
        FilterType::Lanczos3
    } else {
        FilterType::CatmullRom
    }
}
