use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::error::ErrorKind;
use crate::api::handler_utils::{
    error_response, error_response_with_details, internal_error, into_json, task_failed,
    validation_error, ApiObject,
};
use crate::api::server::AppState;
use crate::pipeline::batch_crop::{BatchCropError, BatchCropOutcome, BatchCropParams, CropPreview};
use crate::pipeline::documents::{
    AddTextParams, ColorParams, CreateImageParams, DocumentToolError, DocumentToolOutcome,
};
use crate::pipeline::host::ScriptExecutionError;
use crate::pipeline::selection::SelectionError;

pub const SERVER_MESSAGE: &str = "Photoshop MCP server running";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpTool {
    CreateImage,
    AddText,
    BatchCrop,
}

impl McpTool {
    pub const ALL: [Self; 3] = [Self::CreateImage, Self::AddText, Self::BatchCrop];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CreateImage => "createImage",
            Self::AddText => "addText",
            Self::BatchCrop => "batchCrop",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::CreateImage => "Create a new RGB document filled with a background color",
            Self::AddText => "Add a text layer to the active document",
            Self::BatchCrop => {
                "Resize and center-crop the most recent images of a folder to one size"
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct McpToolRequest {
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateImageArgs {
    width: Option<i64>,
    height: Option<i64>,
    color: Option<ColorArgs>,
}

#[derive(Debug, Default, Deserialize)]
struct ColorArgs {
    red: Option<i64>,
    green: Option<i64>,
    blue: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTextArgs {
    text: Option<String>,
    font_size: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchCropArgs {
    input_folder: Option<String>,
    output_folder: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
    count: Option<i64>,
    format: Option<String>,
    dry_run: Option<bool>,
}

#[derive(Debug, Serialize)]
struct DocumentToolResponse {
    ok: bool,
    result: &'static str,
    output: String,
}

#[derive(Debug, Serialize)]
struct BatchCropResponse {
    ok: bool,
    result: String,
    files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jobs: Option<Vec<CropPreview>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    script: Option<String>,
}

impl From<BatchCropOutcome> for BatchCropResponse {
    fn from(outcome: BatchCropOutcome) -> Self {
        let result = outcome.summary();
        match outcome {
            BatchCropOutcome::NoImages => Self {
                ok: true,
                result,
                files: Vec::new(),
                output: None,
                jobs: None,
                script: None,
            },
            BatchCropOutcome::Executed { files, output } => Self {
                ok: true,
                result,
                files,
                output: Some(output),
                jobs: None,
                script: None,
            },
            BatchCropOutcome::Planned {
                files,
                jobs,
                script,
            } => Self {
                ok: true,
                result,
                files,
                output: None,
                jobs: Some(jobs),
                script: Some(script),
            },
        }
    }
}

/// JSON body for a finished batch crop, shared by the HTTP surface and the CLI.
pub fn batch_crop_payload(outcome: BatchCropOutcome) -> Value {
    into_json(BatchCropResponse::from(outcome)).0
}

pub async fn describe_tools_handler() -> ApiObject<Value> {
    let tools = McpTool::ALL
        .into_iter()
        .map(|tool| json!({"name": tool.name(), "description": tool.description()}))
        .collect::<Vec<_>>();
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "message": SERVER_MESSAGE,
            "tools": tools,
        })),
    )
}

pub async fn call_tool_handler(
    State(state): State<AppState>,
    Json(payload): Json<McpToolRequest>,
) -> ApiObject<Value> {
    let Some(name) = payload
        .tool
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
    else {
        return validation_error("Field 'tool' is required");
    };
    let Some(tool) = McpTool::parse(name) else {
        warn!(tool = name, "unknown tool requested");
        return error_response(
            StatusCode::NOT_FOUND,
            ErrorKind::Validation,
            "tool_not_found",
            "Tool not found",
        );
    };
    info!(tool = tool.name(), "tool call received");

    match tool {
        McpTool::CreateImage => create_image(state, payload.args).await,
        McpTool::AddText => add_text(state, payload.args).await,
        McpTool::BatchCrop => batch_crop(state, payload.args).await,
    }
}

async fn create_image(state: AppState, args: Value) -> ApiObject<Value> {
    let args = match parse_args::<CreateImageArgs>(McpTool::CreateImage, args) {
        Ok(args) => args,
        Err(response) => return response,
    };
    let params = CreateImageParams {
        width: args.width,
        height: args.height,
        color: args.color.map(|c| ColorParams {
            red: c.red,
            green: c.green,
            blue: c.blue,
        }),
    };

    let documents = state.documents.clone();
    let result = tokio::task::spawn_blocking(move || documents.create_image(params)).await;
    match result {
        Ok(Ok(outcome)) => document_success("Image created", outcome),
        Ok(Err(error)) => map_document_error(error),
        Err(join_error) => task_failed("createImage", join_error),
    }
}

async fn add_text(state: AppState, args: Value) -> ApiObject<Value> {
    let args = match parse_args::<AddTextArgs>(McpTool::AddText, args) {
        Ok(args) => args,
        Err(response) => return response,
    };
    let params = AddTextParams {
        text: args.text,
        font_size: args.font_size,
    };

    let documents = state.documents.clone();
    let result = tokio::task::spawn_blocking(move || documents.add_text(params)).await;
    match result {
        Ok(Ok(outcome)) => document_success("Text added", outcome),
        Ok(Err(error)) => map_document_error(error),
        Err(join_error) => task_failed("addText", join_error),
    }
}

async fn batch_crop(state: AppState, args: Value) -> ApiObject<Value> {
    let args = match parse_args::<BatchCropArgs>(McpTool::BatchCrop, args) {
        Ok(args) => args,
        Err(response) => return response,
    };
    let params = BatchCropParams {
        input_folder: args.input_folder,
        output_folder: args.output_folder,
        width: args.width,
        height: args.height,
        count: args.count,
        format: args.format,
        dry_run: args.dry_run.unwrap_or(false),
    };

    let service = state.batch_crop.clone();
    let result = tokio::task::spawn_blocking(move || service.run_params(params)).await;
    match result {
        Ok(Ok(outcome)) => (StatusCode::OK, Json(batch_crop_payload(outcome))),
        Ok(Err(error)) => map_batch_crop_error(error),
        Err(join_error) => task_failed("batchCrop", join_error),
    }
}

fn parse_args<T>(tool: McpTool, args: Value) -> Result<T, ApiObject<Value>>
where
    T: DeserializeOwned + Default,
{
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args)
        .map_err(|error| validation_error(format!("Invalid args for {}: {error}", tool.name())))
}

fn document_success(result: &'static str, outcome: DocumentToolOutcome) -> ApiObject<Value> {
    (
        StatusCode::OK,
        into_json(DocumentToolResponse {
            ok: true,
            result,
            output: outcome.output,
        }),
    )
}

fn execution_failed(error: ScriptExecutionError) -> ApiObject<Value> {
    warn!(error = %error, "script execution failed");
    error_response_with_details(
        StatusCode::BAD_GATEWAY,
        ErrorKind::Provider,
        "script_execution_failed",
        "Script execution failed",
        Some(error.to_string()),
    )
}

fn map_document_error(error: DocumentToolError) -> ApiObject<Value> {
    match error {
        DocumentToolError::MissingField { .. } | DocumentToolError::InvalidField { .. } => {
            validation_error(error.to_string())
        }
        DocumentToolError::Render(source) => internal_error(source.to_string()),
        DocumentToolError::Execution(source) => execution_failed(source),
    }
}

pub fn map_batch_crop_error(error: BatchCropError) -> ApiObject<Value> {
    match error {
        BatchCropError::InvalidTarget(_)
        | BatchCropError::InvalidCount(_)
        | BatchCropError::InvalidRequest(_) => validation_error(error.to_string()),
        BatchCropError::Selection(SelectionError::DirectoryUnreadable { path, source }) => {
            warn!(path = %path.display(), error = %source, "input folder unreadable");
            error_response_with_details(
                StatusCode::BAD_REQUEST,
                ErrorKind::Validation,
                "input_folder_unreadable",
                "Cannot read input folder",
                Some(source.to_string()),
            )
        }
        BatchCropError::OutputFolder { .. } | BatchCropError::Render(_) => {
            internal_error(error.to_string())
        }
        BatchCropError::Execution(source) => execution_failed(source),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;
    use crate::pipeline::crop_plan::CropPlanError;

    #[test]
    fn tool_names_round_trip() {
        for tool in McpTool::ALL {
            assert_eq!(McpTool::parse(tool.name()), Some(tool));
        }
        assert_eq!(McpTool::parse("batchcrop"), None);
        assert_eq!(McpTool::parse("deleteEverything"), None);
    }

    #[test]
    fn null_args_use_defaults() {
        let args = parse_args::<BatchCropArgs>(McpTool::BatchCrop, Value::Null)
            .expect("null args accepted");
        assert!(args.input_folder.is_none());
        assert!(args.dry_run.is_none());
    }

    #[test]
    fn mistyped_args_are_validation_errors() {
        let (status, payload) =
            parse_args::<BatchCropArgs>(McpTool::BatchCrop, json!({"width": "wide"}))
                .expect_err("string width rejected");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(payload.0["error"]
            .as_str()
            .expect("error text")
            .starts_with("Invalid args for batchCrop"));
    }

    #[test]
    fn unreadable_folder_maps_to_bad_request_with_details() {
        let (status, payload) = map_batch_crop_error(BatchCropError::Selection(
            SelectionError::DirectoryUnreadable {
                path: PathBuf::from("/nope"),
                source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
            },
        ));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(payload.0["error"], json!("Cannot read input folder"));
        assert_eq!(payload.0["details"], json!("No such file or directory"));
        assert_eq!(payload.0["error_code"], json!("input_folder_unreadable"));
    }

    #[test]
    fn invalid_target_maps_to_validation_error() {
        let (status, payload) = map_batch_crop_error(BatchCropError::InvalidTarget(
            CropPlanError::InvalidTarget {
                field: "width",
                value: -3,
            },
        ));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            payload.0["error"],
            json!("target width must be a positive integer (got -3)")
        );
    }

    #[test]
    fn output_folder_failure_is_sanitized() {
        let (status, payload) = map_batch_crop_error(BatchCropError::OutputFolder {
            path: PathBuf::from("/secret/out"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        });
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(payload.0["error"], json!("Internal server error"));
    }
}
