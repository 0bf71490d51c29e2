use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::api::error::ErrorKind;

pub type ApiObject<T> = (StatusCode, Json<T>);

#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    error_kind: ErrorKind,
    error_code: String,
}

pub fn error_response(
    status: StatusCode,
    kind: ErrorKind,
    code: impl Into<String>,
    message: impl Into<String>,
) -> ApiObject<Value> {
    error_response_with_details(status, kind, code, message, None)
}

pub fn error_response_with_details(
    status: StatusCode,
    kind: ErrorKind,
    code: impl Into<String>,
    message: impl Into<String>,
    details: Option<String>,
) -> ApiObject<Value> {
    (
        status,
        into_json(ErrorResponse {
            ok: false,
            error: message.into(),
            details,
            error_kind: kind,
            error_code: code.into(),
        }),
    )
}

pub fn validation_error(message: impl Into<String>) -> ApiObject<Value> {
    error_response(
        StatusCode::BAD_REQUEST,
        ErrorKind::Validation,
        "validation_error",
        message,
    )
}

pub fn internal_error(message: impl Into<String>) -> ApiObject<Value> {
    let detail = message.into();
    error!(detail = %detail, "internal api error");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Infra,
        "internal_error",
        "Internal server error",
    )
}

/// A blocking task that panicked or was cancelled.
pub fn task_failed(context: &str, join_error: tokio::task::JoinError) -> ApiObject<Value> {
    error!(context, error = %join_error, "blocking task failed");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Unknown,
        "task_failed",
        "Internal server error",
    )
}

pub fn into_json(payload: impl Serialize) -> Json<Value> {
    match serde_json::to_value(payload) {
        Ok(value) => Json(value),
        Err(error) => {
            error!(error = %error, "api payload failed to serialize");
            Json(json!({
                "ok": false,
                "error": "Internal server error",
                "error_kind": ErrorKind::Infra.as_str(),
                "error_code": "serialization_error",
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;

    #[test]
    fn error_response_omits_missing_details() {
        let (status, payload) = error_response(
            StatusCode::NOT_FOUND,
            ErrorKind::Validation,
            "tool_not_found",
            "Tool not found",
        );
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            payload.0,
            json!({
                "ok": false,
                "error": "Tool not found",
                "error_kind": "validation",
                "error_code": "tool_not_found",
            })
        );
    }

    #[test]
    fn error_response_carries_details_verbatim() {
        let (status, payload) = error_response_with_details(
            StatusCode::BAD_GATEWAY,
            ErrorKind::Provider,
            "script_execution_failed",
            "Script execution failed",
            Some(String::from("photoshop exited with code 1: boom")),
        );
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(payload.0["details"], json!("photoshop exited with code 1: boom"));
        assert_eq!(payload.0["error_kind"], json!("provider"));
    }

    #[test]
    fn internal_errors_are_sanitized() {
        let (status, payload) = internal_error("sensitive detail");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(payload.0["ok"], json!(false));
        assert_eq!(payload.0["error"], json!("Internal server error"));
        assert_eq!(payload.0["error_kind"], json!("infra"));
        assert_eq!(payload.0["error_code"], json!("internal_error"));
        assert!(payload.0.get("details").is_none());
    }
}
