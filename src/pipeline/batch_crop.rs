use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pipeline::crop_plan::{plan_cover_crop, CoverCropPlan, CropPlanError, TargetSize};
use crate::pipeline::host::{ScriptExecutionError, SharedScriptExecutor};
use crate::pipeline::script::{
    CoverCropBlock, OutputFormat, SaveSpec, ScriptBlock, ScriptBody, ScriptRenderError,
};
use crate::pipeline::selection::{
    select_recent_images, FileDescriptor, SelectionError, SUPPORTED_IMAGE_EXTENSIONS,
};
use crate::pipeline::settings::BatchDefaults;

/// Raw, caller-supplied batch arguments. Zero and missing numbers fall back
/// to the configured defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchCropParams {
    pub input_folder: Option<String>,
    pub output_folder: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub count: Option<i64>,
    pub format: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCropRequest {
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub target: TargetSize,
    pub max_count: usize,
    pub save: SaveSpec,
    pub dry_run: bool,
}

impl BatchCropRequest {
    pub fn from_params(
        params: BatchCropParams,
        defaults: &BatchDefaults,
    ) -> Result<Self, BatchCropError> {
        let input_folder = required_folder(params.input_folder, "inputFolder")?;
        let output_folder = required_folder(params.output_folder, "outputFolder")?;

        let width = or_default(params.width, i64::from(defaults.width));
        let height = or_default(params.height, i64::from(defaults.height));
        let target = TargetSize::new(width, height)?;

        let count = or_default(params.count, defaults.max_count as i64);
        let max_count = usize::try_from(count)
            .ok()
            .filter(|v| *v > 0)
            .ok_or(BatchCropError::InvalidCount(count))?;

        let format = match params.format.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => OutputFormat::parse(value).ok_or_else(|| {
                BatchCropError::InvalidRequest(format!(
                    "Field 'format' is invalid ({})",
                    OutputFormat::EXPECTED
                ))
            })?,
            None => defaults.output_format,
        };

        Ok(Self {
            input_folder,
            output_folder,
            target,
            max_count,
            save: SaveSpec {
                format,
                jpeg_quality: defaults.jpeg_quality,
            },
            dry_run: params.dry_run,
        })
    }
}

fn required_folder(value: Option<String>, field: &str) -> Result<PathBuf, BatchCropError> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BatchCropError::InvalidRequest(format!("Field '{field}' is required")))?;
    let path = PathBuf::from(value);
    Ok(std::path::absolute(path.as_path()).unwrap_or(path))
}

fn or_default(value: Option<i64>, default: i64) -> i64 {
    value.filter(|v| *v != 0).unwrap_or(default)
}

/// Output file name for the `index`-th (1-based) selected file. The index
/// prefix keeps names unique when sources share a stem.
pub fn output_file_name(index: usize, source_name: &str, format: OutputFormat) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| source_name.to_string());
    format!("cropped_{index}_{stem}.{}", format.extension())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CropPreview {
    pub index: usize,
    pub name: String,
    pub source: PathBuf,
    pub output: PathBuf,
    pub source_width: Option<u32>,
    pub source_height: Option<u32>,
    pub plan: Option<CoverCropPlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchCropOutcome {
    NoImages,
    Executed {
        files: Vec<String>,
        output: String,
    },
    Planned {
        files: Vec<String>,
        jobs: Vec<CropPreview>,
        script: String,
    },
}

impl BatchCropOutcome {
    pub fn processed_count(&self) -> usize {
        self.files().len()
    }

    pub fn files(&self) -> &[String] {
        match self {
            Self::NoImages => &[],
            Self::Executed { files, .. } | Self::Planned { files, .. } => files.as_slice(),
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::NoImages => String::from("No images found in folder"),
            Self::Executed { files, .. } => format!("Processed {} images", files.len()),
            Self::Planned { files, .. } => format!("Planned {} images", files.len()),
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchCropError {
    #[error(transparent)]
    InvalidTarget(#[from] CropPlanError),
    #[error("count must be a positive integer (got {0})")]
    InvalidCount(i64),
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("failed to create output folder '{}': {source}", .path.display())]
    OutputFolder {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to render batch script: {0}")]
    Render(#[from] ScriptRenderError),
    #[error(transparent)]
    Execution(#[from] ScriptExecutionError),
}

#[derive(Clone)]
pub struct BatchCropService {
    executor: SharedScriptExecutor,
    defaults: BatchDefaults,
}

impl BatchCropService {
    pub fn new(executor: SharedScriptExecutor, defaults: BatchDefaults) -> Self {
        Self { executor, defaults }
    }

    pub fn run_params(&self, params: BatchCropParams) -> Result<BatchCropOutcome, BatchCropError> {
        let request = BatchCropRequest::from_params(params, &self.defaults)?;
        self.run(&request)
    }

    pub fn run(&self, request: &BatchCropRequest) -> Result<BatchCropOutcome, BatchCropError> {
        info!(
            input = %request.input_folder.display(),
            output = %request.output_folder.display(),
            width = request.target.width,
            height = request.target.height,
            max_count = request.max_count,
            dry_run = request.dry_run,
            "batch crop requested"
        );

        let selected = select_recent_images(
            request.input_folder.as_path(),
            &SUPPORTED_IMAGE_EXTENSIONS,
            request.max_count,
        )?;
        if selected.is_empty() {
            info!(input = %request.input_folder.display(), "no images to crop");
            return Ok(BatchCropOutcome::NoImages);
        }
        let files = selected.iter().map(|f| f.name.clone()).collect::<Vec<_>>();

        if request.dry_run {
            let blocks = build_crop_blocks(selected.as_slice(), request);
            let script = render_batch_script(blocks.as_slice())?;
            let jobs = blocks
                .iter()
                .zip(selected.iter())
                .enumerate()
                .map(|(i, (block, file))| preview_job(i + 1, file, block, request.target))
                .collect();
            return Ok(BatchCropOutcome::Planned {
                files,
                jobs,
                script,
            });
        }

        fs::create_dir_all(request.output_folder.as_path()).map_err(|source| {
            BatchCropError::OutputFolder {
                path: request.output_folder.clone(),
                source,
            }
        })?;

        let blocks = build_crop_blocks(selected.as_slice(), request);
        let script = render_batch_script(blocks.as_slice())?;
        debug!(files = files.len(), bytes = script.len(), "batch script rendered");

        let output = self.executor.execute(script.as_str()).map_err(|error| {
            warn!(error = %error, "batch crop script failed");
            error
        })?;

        info!(processed = files.len(), "batch crop finished");
        Ok(BatchCropOutcome::Executed { files, output })
    }
}

fn build_crop_blocks(selected: &[FileDescriptor], request: &BatchCropRequest) -> Vec<CoverCropBlock> {
    selected
        .iter()
        .enumerate()
        .map(|(i, file)| CoverCropBlock {
            source: file.path.clone(),
            output: request.output_folder.join(output_file_name(
                i + 1,
                file.name.as_str(),
                request.save.format,
            )),
            target_width: request.target.width,
            target_height: request.target.height,
            save: request.save,
        })
        .collect()
}

fn render_batch_script(blocks: &[CoverCropBlock]) -> Result<String, ScriptRenderError> {
    let mut body = ScriptBody::new().with_pixel_units();
    for block in blocks {
        body.push(ScriptBlock::CoverCrop(block.clone()));
    }
    body.render()
}

fn preview_job(
    index: usize,
    file: &FileDescriptor,
    block: &CoverCropBlock,
    target: TargetSize,
) -> CropPreview {
    // PSD and damaged files have no readable header here; the host still
    // handles them at execution time.
    let dimensions = image::image_dimensions(file.path.as_path()).ok();
    let plan = dimensions
        .and_then(|(w, h)| plan_cover_crop(f64::from(w), f64::from(h), target));
    CropPreview {
        index,
        name: file.name.clone(),
        source: block.source.clone(),
        output: block.output.clone(),
        source_width: dimensions.map(|(w, _)| w),
        source_height: dimensions.map(|(_, h)| h),
        plan,
    }
}
