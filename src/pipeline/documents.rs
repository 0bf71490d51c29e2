use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::pipeline::host::{ScriptExecutionError, SharedScriptExecutor};
use crate::pipeline::script::{
    AddTextLayerBlock, CreateDocumentBlock, RgbColor, ScriptBlock, ScriptBody, ScriptRenderError,
};

pub const DEFAULT_FONT_SIZE: f64 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorParams {
    pub red: Option<i64>,
    pub green: Option<i64>,
    pub blue: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateImageParams {
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub color: Option<ColorParams>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AddTextParams {
    pub text: Option<String>,
    pub font_size: Option<f64>,
}

#[derive(Debug, Error)]
pub enum DocumentToolError {
    #[error("Field '{field}' is required")]
    MissingField { field: &'static str },
    #[error("Field '{field}' is invalid ({message})")]
    InvalidField {
        field: &'static str,
        message: String,
    },
    #[error("failed to render document script: {0}")]
    Render(#[from] ScriptRenderError),
    #[error(transparent)]
    Execution(#[from] ScriptExecutionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentToolOutcome {
    pub output: String,
}

/// Single-document tools: `createImage` and `addText`.
#[derive(Clone)]
pub struct DocumentToolService {
    executor: SharedScriptExecutor,
    save_path: PathBuf,
}

impl DocumentToolService {
    pub fn new(executor: SharedScriptExecutor, save_path: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            save_path: save_path.into(),
        }
    }

    pub fn create_image(
        &self,
        params: CreateImageParams,
    ) -> Result<DocumentToolOutcome, DocumentToolError> {
        let block = create_document_block(params, self.save_path.clone())?;
        info!(
            width = block.width,
            height = block.height,
            save_path = %block.save_path.display(),
            "creating document"
        );
        self.execute(ScriptBlock::CreateDocument(block))
    }

    pub fn add_text(&self, params: AddTextParams) -> Result<DocumentToolOutcome, DocumentToolError> {
        let block = add_text_block(params)?;
        info!(chars = block.text.chars().count(), font_size = block.font_size, "adding text layer");
        self.execute(ScriptBlock::AddTextLayer(block))
    }

    fn execute(&self, block: ScriptBlock) -> Result<DocumentToolOutcome, DocumentToolError> {
        let mut body = ScriptBody::new().with_pixel_units();
        body.push(block);
        let script = body.render()?;
        let output = self.executor.execute(script.as_str())?;
        Ok(DocumentToolOutcome { output })
    }
}

pub fn create_document_block(
    params: CreateImageParams,
    save_path: PathBuf,
) -> Result<CreateDocumentBlock, DocumentToolError> {
    let width = required_dimension("width", params.width)?;
    let height = required_dimension("height", params.height)?;
    let color = params.color.unwrap_or_default();
    Ok(CreateDocumentBlock {
        width,
        height,
        background: RgbColor {
            red: channel("color.red", color.red)?,
            green: channel("color.green", color.green)?,
            blue: channel("color.blue", color.blue)?,
        },
        save_path,
    })
}

pub fn add_text_block(params: AddTextParams) -> Result<AddTextLayerBlock, DocumentToolError> {
    let text = params
        .text
        .ok_or(DocumentToolError::MissingField { field: "text" })?;
    let font_size = params.font_size.unwrap_or(DEFAULT_FONT_SIZE);
    if !font_size.is_finite() || font_size <= 0.0 {
        return Err(DocumentToolError::InvalidField {
            field: "fontSize",
            message: String::from("expected a positive number"),
        });
    }
    Ok(AddTextLayerBlock { text, font_size })
}

fn required_dimension(field: &'static str, value: Option<i64>) -> Result<u32, DocumentToolError> {
    let value = value.ok_or(DocumentToolError::MissingField { field })?;
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| DocumentToolError::InvalidField {
            field,
            message: format!("expected a positive integer, got {value}"),
        })
}

fn channel(field: &'static str, value: Option<i64>) -> Result<u8, DocumentToolError> {
    match value {
        None => Ok(255),
        Some(v) => u8::try_from(v).map_err(|_| DocumentToolError::InvalidField {
            field,
            message: format!("expected 0-255, got {v}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::pipeline::host::ScriptExecutor;

    #[derive(Default)]
    struct FakeExecutor {
        seen: Mutex<Vec<String>>,
    }

    impl ScriptExecutor for FakeExecutor {
        fn execute(&self, script: &str) -> Result<String, ScriptExecutionError> {
            self.seen
                .lock()
                .expect("fake executor mutex poisoned")
                .push(script.to_string());
            Ok(String::from("ok"))
        }
    }

    fn service(fake: Arc<FakeExecutor>) -> DocumentToolService {
        DocumentToolService::new(fake, PathBuf::from("/srv/psmcp/output.png"))
    }

    #[test]
    fn create_image_defaults_missing_channels_to_white() {
        let block = create_document_block(
            CreateImageParams {
                width: Some(640),
                height: Some(480),
                color: Some(ColorParams {
                    red: Some(0),
                    green: None,
                    blue: Some(12),
                }),
            },
            PathBuf::from("/tmp/out.png"),
        )
        .expect("valid params");

        assert_eq!(
            block.background,
            RgbColor {
                red: 0,
                green: 255,
                blue: 12
            }
        );

        let block = create_document_block(
            CreateImageParams {
                width: Some(10),
                height: Some(10),
                color: None,
            },
            PathBuf::from("/tmp/out.png"),
        )
        .expect("valid params");
        assert_eq!(block.background, RgbColor::WHITE);
    }

    #[test]
    fn create_image_validates_dimensions_and_channels() {
        let err = create_document_block(
            CreateImageParams {
                width: None,
                height: Some(10),
                color: None,
            },
            PathBuf::from("/tmp/out.png"),
        )
        .expect_err("width required");
        assert_eq!(err.to_string(), "Field 'width' is required");

        let err = create_document_block(
            CreateImageParams {
                width: Some(10),
                height: Some(0),
                color: None,
            },
            PathBuf::from("/tmp/out.png"),
        )
        .expect_err("zero height rejected");
        assert!(matches!(
            err,
            DocumentToolError::InvalidField { field: "height", .. }
        ));

        let err = create_document_block(
            CreateImageParams {
                width: Some(10),
                height: Some(10),
                color: Some(ColorParams {
                    red: Some(256),
                    ..ColorParams::default()
                }),
            },
            PathBuf::from("/tmp/out.png"),
        )
        .expect_err("channel out of range");
        assert_eq!(
            err.to_string(),
            "Field 'color.red' is invalid (expected 0-255, got 256)"
        );
    }

    #[test]
    fn add_text_defaults_font_size() {
        let block = add_text_block(AddTextParams {
            text: Some(String::from("Hello")),
            font_size: None,
        })
        .expect("valid params");
        assert_eq!(block.font_size, DEFAULT_FONT_SIZE);

        assert!(matches!(
            add_text_block(AddTextParams::default()),
            Err(DocumentToolError::MissingField { field: "text" })
        ));
        assert!(matches!(
            add_text_block(AddTextParams {
                text: Some(String::from("x")),
                font_size: Some(-1.0),
            }),
            Err(DocumentToolError::InvalidField {
                field: "fontSize",
                ..
            })
        ));
    }

    #[test]
    fn create_image_saves_to_configured_path() {
        let fake = Arc::new(FakeExecutor::default());
        let outcome = service(fake.clone())
            .create_image(CreateImageParams {
                width: Some(800),
                height: Some(600),
                color: None,
            })
            .expect("create succeeds");
        assert_eq!(outcome.output, "ok");

        let seen = fake.seen.lock().expect("fake executor mutex poisoned");
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("app.documents.add(new UnitValue(800, \"px\"), new UnitValue(600, \"px\")"));
        assert!(seen[0].contains("\"/srv/psmcp/output.png\""));
        assert!(seen[0].contains("background1.rgb.red = 255;"));
    }

    #[test]
    fn add_text_escapes_user_text() {
        let fake = Arc::new(FakeExecutor::default());
        service(fake.clone())
            .add_text(AddTextParams {
                text: Some(String::from("line \"one\"\nline two")),
                font_size: Some(36.0),
            })
            .expect("add text succeeds");

        let seen = fake.seen.lock().expect("fake executor mutex poisoned");
        assert!(seen[0].contains(r#"textLayer1.textItem.contents = "line \"one\"\nline two";"#));
        assert!(seen[0].contains("new UnitValue(36, \"pt\")"));
        assert!(seen[0].contains("if (app.documents.length > 0) {"));
    }
}
