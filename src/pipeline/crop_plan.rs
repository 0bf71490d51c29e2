use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CropPlanError {
    #[error("target {field} must be a positive integer (got {value})")]
    InvalidTarget { field: &'static str, value: i64 },
}

impl TargetSize {
    pub fn new(width: i64, height: i64) -> Result<Self, CropPlanError> {
        Ok(Self {
            width: positive_dimension("width", width)?,
            height: positive_dimension("height", height)?,
        })
    }
}

fn positive_dimension(field: &'static str, value: i64) -> Result<u32, CropPlanError> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or(CropPlanError::InvalidTarget { field, value })
}

/// Geometry for one cover-fit resize followed by a centered crop, in pixels.
/// Crop bounds may be fractional; the host rounds them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoverCropPlan {
    pub scale: f64,
    pub scaled_width: f64,
    pub scaled_height: f64,
    pub crop_left: f64,
    pub crop_top: f64,
    pub crop_right: f64,
    pub crop_bottom: f64,
}

/// Returns `None` when the document has no usable area; such files are
/// skipped rather than failing the batch.
pub fn plan_cover_crop(
    document_width: f64,
    document_height: f64,
    target: TargetSize,
) -> Option<CoverCropPlan> {
    if !(document_width.is_finite() && document_height.is_finite()) {
        return None;
    }
    if document_width <= 0.0 || document_height <= 0.0 {
        return None;
    }

    let target_width = f64::from(target.width);
    let target_height = f64::from(target.height);

    // The larger ratio covers both axes; the smaller one would letterbox.
    let scale = (target_width / document_width).max(target_height / document_height);
    let scaled_width = document_width * scale;
    let scaled_height = document_height * scale;
    let crop_left = (scaled_width - target_width) / 2.0;
    let crop_top = (scaled_height - target_height) / 2.0;

    Some(CoverCropPlan {
        scale,
        scaled_width,
        scaled_height,
        crop_left,
        crop_top,
        crop_right: crop_left + target_width,
        crop_bottom: crop_top + target_height,
    })
}
