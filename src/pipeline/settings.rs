use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::pipeline::script::OutputFormat;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_PHOTOSHOP_PATH: &str =
    r"C:\Program Files\Adobe\Adobe Photoshop 2022\Photoshop.exe";
pub const DEFAULT_TARGET_WIDTH: u32 = 1000;
pub const DEFAULT_TARGET_HEIGHT: u32 = 1000;
pub const DEFAULT_MAX_COUNT: usize = 5;
pub const DEFAULT_JPEG_QUALITY: u8 = 10;

const SETTINGS_REL_PATH: &str = "config/psmcp.settings.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDefaults {
    pub width: u32,
    pub height: u32,
    pub max_count: usize,
    pub output_format: OutputFormat,
    pub jpeg_quality: u8,
}

impl Default for BatchDefaults {
    fn default() -> Self {
        Self {
            width: DEFAULT_TARGET_WIDTH,
            height: DEFAULT_TARGET_HEIGHT,
            max_count: DEFAULT_MAX_COUNT,
            output_format: OutputFormat::Png,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Runtime configuration for the bridge. Built once at startup and handed to
/// each service by value; nothing reads it from process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    pub bind: String,
    pub photoshop_path: String,
    pub script_dir: PathBuf,
    pub output_dir: PathBuf,
    pub keep_scripts: bool,
    pub batch: BatchDefaults,
}

impl BridgeSettings {
    pub fn with_app_root(app_root: &Path) -> Self {
        Self {
            bind: String::from(DEFAULT_BIND),
            photoshop_path: String::from(DEFAULT_PHOTOSHOP_PATH),
            script_dir: app_root.join("var").join("jsx"),
            output_dir: app_root.to_path_buf(),
            keep_scripts: false,
            batch: BatchDefaults::default(),
        }
    }

    pub fn create_image_output_path(&self) -> PathBuf {
        self.output_dir.join("output.png")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("failed to read bridge settings '{path}': {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse bridge settings TOML '{path}': {message}")]
    ParseToml { path: String, message: String },
    #[error("bridge setting '{field}' is invalid: {message}")]
    InvalidField { field: String, message: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    bind: Option<String>,
    photoshop_path: Option<String>,
    script_dir: Option<String>,
    output_dir: Option<String>,
    keep_scripts: Option<bool>,
    #[serde(default)]
    batch: BatchSettingsFile,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchSettingsFile {
    default_width: Option<u32>,
    default_height: Option<u32>,
    default_count: Option<usize>,
    output_format: Option<String>,
    jpeg_quality: Option<u8>,
}

/// Loads settings from `config/psmcp.settings.toml` (or `explicit_path`) and
/// then applies `PSMCP_*` environment overrides.
pub fn load_bridge_settings(
    app_root: &Path,
    explicit_path: Option<&str>,
) -> Result<BridgeSettings, SettingsError> {
    let settings = load_bridge_settings_file(app_root, explicit_path)?;
    apply_env_overrides(settings, app_root, |key| std::env::var(key).ok())
}

pub fn load_bridge_settings_file(
    app_root: &Path,
    explicit_path: Option<&str>,
) -> Result<BridgeSettings, SettingsError> {
    let explicit = explicit_path
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| resolve_under_root(app_root, v));
    let path = explicit
        .clone()
        .unwrap_or_else(|| app_root.join(SETTINGS_REL_PATH));

    if explicit.is_none() && !path.exists() {
        return Ok(BridgeSettings::with_app_root(app_root));
    }

    let raw = fs::read_to_string(path.as_path()).map_err(|error| SettingsError::ReadFile {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    parse_bridge_settings(app_root, raw.as_str(), path.display().to_string().as_str())
}

fn parse_bridge_settings(
    app_root: &Path,
    raw: &str,
    source: &str,
) -> Result<BridgeSettings, SettingsError> {
    let file: SettingsFile = toml::from_str(raw).map_err(|error| SettingsError::ParseToml {
        path: source.to_string(),
        message: error.to_string(),
    })?;

    let mut settings = BridgeSettings::with_app_root(app_root);
    if let Some(bind) = non_empty(file.bind) {
        settings.bind = bind;
    }
    if let Some(photoshop_path) = non_empty(file.photoshop_path) {
        settings.photoshop_path = photoshop_path;
    }
    if let Some(script_dir) = non_empty(file.script_dir) {
        settings.script_dir = resolve_under_root(app_root, script_dir.as_str());
    }
    if let Some(output_dir) = non_empty(file.output_dir) {
        settings.output_dir = resolve_under_root(app_root, output_dir.as_str());
    }
    if let Some(keep_scripts) = file.keep_scripts {
        settings.keep_scripts = keep_scripts;
    }

    let batch = file.batch;
    if let Some(width) = batch.default_width {
        settings.batch.width = positive("batch.default_width", width)?;
    }
    if let Some(height) = batch.default_height {
        settings.batch.height = positive("batch.default_height", height)?;
    }
    if let Some(count) = batch.default_count {
        if count == 0 {
            return Err(invalid_field("batch.default_count", "must be >= 1"));
        }
        settings.batch.max_count = count;
    }
    if let Some(format) = non_empty(batch.output_format) {
        settings.batch.output_format = OutputFormat::parse(format.as_str())
            .ok_or_else(|| invalid_field("batch.output_format", OutputFormat::EXPECTED))?;
    }
    if let Some(quality) = batch.jpeg_quality {
        if !(1..=12).contains(&quality) {
            return Err(invalid_field("batch.jpeg_quality", "must be between 1 and 12"));
        }
        settings.batch.jpeg_quality = quality;
    }

    Ok(settings)
}

fn apply_env_overrides(
    mut settings: BridgeSettings,
    app_root: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<BridgeSettings, SettingsError> {
    let read = |key: &str| non_empty(lookup(key).map(|v| v.trim().to_string()));

    if let Some(bind) = read("PSMCP_BIND") {
        settings.bind = bind;
    }
    if let Some(photoshop_path) = read("PSMCP_PHOTOSHOP_PATH") {
        settings.photoshop_path = photoshop_path;
    }
    if let Some(script_dir) = read("PSMCP_SCRIPT_DIR") {
        settings.script_dir = resolve_under_root(app_root, script_dir.as_str());
    }
    if let Some(output_dir) = read("PSMCP_OUTPUT_DIR") {
        settings.output_dir = resolve_under_root(app_root, output_dir.as_str());
    }
    if let Some(keep_scripts) = read("PSMCP_KEEP_SCRIPTS") {
        settings.keep_scripts = matches!(
            keep_scripts.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        );
    }
    Ok(settings)
}

fn resolve_under_root(root: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn positive(field: &str, value: u32) -> Result<u32, SettingsError> {
    if value == 0 {
        return Err(invalid_field(field, "must be >= 1"));
    }
    Ok(value)
}

fn invalid_field(field: &str, message: &str) -> SettingsError {
    SettingsError::InvalidField {
        field: field.to_string(),
        message: message.to_string(),
    }
}
