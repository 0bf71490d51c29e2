//! Typed ExtendScript (JSX) builder for the image host.
//!
//! Callers assemble a [`ScriptBody`] out of [`ScriptBlock`] records; the only
//! place that turns paths, strings and numbers into script text is the
//! renderer in this module.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg,
    Tiff,
    Psd,
}

impl OutputFormat {
    pub const EXPECTED: &'static str = "expected one of: png, jpg, tif, psd";

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "tif" | "tiff" => Some(Self::Tiff),
            "psd" => Some(Self::Psd),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Tiff => "tif",
            Self::Psd => "psd",
        }
    }

    fn save_options_constructor(self) -> &'static str {
        match self {
            Self::Png => "PNGSaveOptions",
            Self::Jpeg => "JPEGSaveOptions",
            Self::Tiff => "TiffSaveOptions",
            Self::Psd => "PhotoshopSaveOptions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveSpec {
    pub format: OutputFormat,
    /// Photoshop JPEG quality (0-12); ignored for other formats.
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RgbColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl RgbColor {
    pub const WHITE: Self = Self {
        red: 255,
        green: 255,
        blue: 255,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverCropBlock {
    pub source: PathBuf,
    pub output: PathBuf,
    pub target_width: u32,
    pub target_height: u32,
    pub save: SaveSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateDocumentBlock {
    pub width: u32,
    pub height: u32,
    pub background: RgbColor,
    pub save_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddTextLayerBlock {
    pub text: String,
    pub font_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptBlock {
    CoverCrop(CoverCropBlock),
    CreateDocument(CreateDocumentBlock),
    AddTextLayer(AddTextLayerBlock),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptRenderError {
    #[error("script value '{field}' must be a finite number")]
    NonFiniteNumber { field: &'static str },
}

/// Ordered list of blocks rendered into one script. Each block declares its
/// own variables (suffixed with its 1-based position) so no state is shared
/// between blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptBody {
    blocks: Vec<ScriptBlock>,
    pixel_units: bool,
}

impl ScriptBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch the host's ruler units to pixels for the duration of the
    /// script and restore the previous units afterwards.
    pub fn with_pixel_units(mut self) -> Self {
        self.pixel_units = true;
        self
    }

    pub fn push(&mut self, block: ScriptBlock) {
        self.blocks.push(block);
    }

    pub fn render(&self) -> Result<String, ScriptRenderError> {
        let mut w = JsxWriter::default();
        if self.pixel_units {
            w.line("var previousRulerUnits = app.preferences.rulerUnits;");
            w.line("app.preferences.rulerUnits = Units.PIXELS;");
            w.open("try {");
        }
        for (position, block) in self.blocks.iter().enumerate() {
            let n = position + 1;
            match block {
                ScriptBlock::CoverCrop(block) => render_cover_crop(&mut w, n, block)?,
                ScriptBlock::CreateDocument(block) => render_create_document(&mut w, n, block),
                ScriptBlock::AddTextLayer(block) => render_add_text_layer(&mut w, n, block)?,
            }
        }
        if self.pixel_units {
            w.close_open("} finally {");
            w.line("app.preferences.rulerUnits = previousRulerUnits;");
            w.close("}");
        }
        Ok(w.finish())
    }
}

fn render_cover_crop(
    w: &mut JsxWriter,
    n: usize,
    block: &CoverCropBlock,
) -> Result<(), ScriptRenderError> {
    let doc = format!("cropDoc{n}");
    let source = format!("cropSource{n}");
    let tw = format!("targetWidth{n}");
    let th = format!("targetHeight{n}");
    let dw = format!("docWidth{n}");
    let dh = format!("docHeight{n}");
    let scale = format!("scale{n}");
    let left = format!("cropLeft{n}");
    let top = format!("cropTop{n}");

    w.line(format!("// {}", comment_safe(display_name(block.source.as_path()).as_str())));
    w.line(format!("var {doc} = null;"));
    w.open("try {");
    w.line(format!(
        "var {source} = new File({});",
        js_path_literal(block.source.as_path())
    ));
    w.open(format!("if ({source}.exists) {{"));
    w.line(format!("{doc} = app.open({source});"));
    w.line(format!(
        "var {tw} = {};",
        format_number(f64::from(block.target_width), "target_width")?
    ));
    w.line(format!(
        "var {th} = {};",
        format_number(f64::from(block.target_height), "target_height")?
    ));
    w.line(format!("var {dw} = {doc}.width.as(\"px\");"));
    w.line(format!("var {dh} = {doc}.height.as(\"px\");"));
    w.open(format!("if ({dw} > 0 && {dh} > 0) {{"));
    w.line(format!("var {scale} = Math.max({tw} / {dw}, {th} / {dh});"));
    w.line(format!(
        "{doc}.resizeImage(new UnitValue({dw} * {scale}, \"px\"), new UnitValue({dh} * {scale}, \"px\"), {doc}.resolution, ResampleMethod.BICUBIC);"
    ));
    w.line(format!("{dw} = {doc}.width.as(\"px\");"));
    w.line(format!("{dh} = {doc}.height.as(\"px\");"));
    w.line(format!("var {left} = ({dw} - {tw}) / 2;"));
    w.line(format!("var {top} = ({dh} - {th}) / 2;"));
    w.line(format!(
        "{doc}.crop([new UnitValue({left}, \"px\"), new UnitValue({top}, \"px\"), new UnitValue({left} + {tw}, \"px\"), new UnitValue({top} + {th}, \"px\")]);"
    ));
    let options = render_save_options(w, n, block.save);
    w.line(format!(
        "{doc}.saveAs(new File({}), {options}, true);",
        js_path_literal(block.output.as_path())
    ));
    w.close("}");
    w.close("}");
    w.close_open(format!("}} catch (cropError{n}) {{"));
    w.line("// unreadable or vanished source: skip this file, keep the batch going");
    w.close_open("} finally {");
    w.line(format!(
        "if ({doc} !== null) {{ {doc}.close(SaveOptions.DONOTSAVECHANGES); }}"
    ));
    w.close("}");
    Ok(())
}

fn render_create_document(w: &mut JsxWriter, n: usize, block: &CreateDocumentBlock) {
    let color = format!("background{n}");
    let doc = format!("createdDoc{n}");
    w.line(format!("var {color} = new SolidColor();"));
    w.line(format!("{color}.rgb.red = {};", block.background.red));
    w.line(format!("{color}.rgb.green = {};", block.background.green));
    w.line(format!("{color}.rgb.blue = {};", block.background.blue));
    w.line(format!("app.backgroundColor = {color};"));
    w.line(format!(
        "var {doc} = app.documents.add(new UnitValue({}, \"px\"), new UnitValue({}, \"px\"), 72, \"Untitled\", NewDocumentMode.RGB, DocumentFill.BACKGROUNDCOLOR);",
        block.width, block.height
    ));
    w.line(format!(
        "{doc}.saveAs(new File({}), new PNGSaveOptions(), true);",
        js_path_literal(block.save_path.as_path())
    ));
}

fn render_add_text_layer(
    w: &mut JsxWriter,
    n: usize,
    block: &AddTextLayerBlock,
) -> Result<(), ScriptRenderError> {
    let doc = format!("textDoc{n}");
    let layer = format!("textLayer{n}");
    let size = format_number(block.font_size, "font_size")?;
    w.open("if (app.documents.length > 0) {");
    w.line(format!("var {doc} = app.activeDocument;"));
    w.line(format!("var {layer} = {doc}.artLayers.add();"));
    w.line(format!("{layer}.kind = LayerKind.TEXT;"));
    w.line(format!(
        "{layer}.textItem.contents = {};",
        js_string_literal(block.text.as_str())
    ));
    w.line(format!("{layer}.textItem.size = new UnitValue({size}, \"pt\");"));
    w.close("}");
    Ok(())
}

fn render_save_options(w: &mut JsxWriter, n: usize, save: SaveSpec) -> String {
    let options = format!("saveOptions{n}");
    w.line(format!(
        "var {options} = new {}();",
        save.format.save_options_constructor()
    ));
    if save.format == OutputFormat::Jpeg {
        w.line(format!("{options}.quality = {};", save.jpeg_quality.min(12)));
    }
    options
}

/// Encodes `value` as a double-quoted JavaScript string literal. Backslashes
/// (Windows path separators) and quotes are escaped, and line terminators and
/// other control characters are written as escapes so the literal stays on
/// one line.
pub fn js_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub fn js_path_literal(path: &Path) -> String {
    js_string_literal(path.to_string_lossy().as_ref())
}

/// Integers are written without a fraction; everything else uses Rust's
/// shortest round-trip form, which is also valid JavaScript.
pub fn format_number(value: f64, field: &'static str) -> Result<String, ScriptRenderError> {
    if !value.is_finite() {
        return Err(ScriptRenderError::NonFiniteNumber { field });
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return Ok(format!("{}", value as i64));
    }
    Ok(format!("{value}"))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn comment_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() || c == '\u{2028}' || c == '\u{2029}' { ' ' } else { c })
        .collect()
}

#[derive(Debug, Default)]
struct JsxWriter {
    out: String,
    depth: usize,
}

impl JsxWriter {
    fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn open(&mut self, text: impl AsRef<str>) {
        self.line(text);
        self.depth += 1;
    }

    fn close(&mut self, text: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
    }

    fn close_open(&mut self, text: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
        self.depth += 1;
    }

    fn finish(self) -> String {
        self.out
    }
}
