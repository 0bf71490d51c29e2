use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::pipeline::batch_crop::BatchCropService;
use crate::pipeline::documents::DocumentToolService;
use crate::pipeline::host::{PhotoshopScriptExecutor, SharedScriptExecutor, StdHostCommandRunner};
use crate::pipeline::settings::BridgeSettings;

#[derive(Clone)]
pub struct AppState {
    pub service_name: &'static str,
    pub service_version: &'static str,
    pub started_unix_ms: i64,
    pub settings: Arc<BridgeSettings>,
    pub batch_crop: BatchCropService,
    pub documents: DocumentToolService,
}

impl AppState {
    pub fn new(settings: BridgeSettings, executor: SharedScriptExecutor) -> Self {
        let batch_crop = BatchCropService::new(executor.clone(), settings.batch.clone());
        let documents = DocumentToolService::new(executor, settings.create_image_output_path());
        Self {
            service_name: "psmcp-backend-core",
            service_version: env!("CARGO_PKG_VERSION"),
            started_unix_ms: chrono::Utc::now().timestamp_millis(),
            settings: Arc::new(settings),
            batch_crop,
            documents,
        }
    }
}

pub fn default_script_executor(settings: &BridgeSettings) -> SharedScriptExecutor {
    Arc::new(
        PhotoshopScriptExecutor::new(
            settings.photoshop_path.clone(),
            settings.script_dir.clone(),
            StdHostCommandRunner,
        )
        .with_keep_scripts(settings.keep_scripts),
    )
}

pub fn build_router(settings: BridgeSettings) -> Router {
    let executor = default_script_executor(&settings);
    build_router_with_executor(settings, executor)
}

pub fn build_router_with_executor(
    settings: BridgeSettings,
    executor: SharedScriptExecutor,
) -> Router {
    let state = AppState::new(settings, executor);
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/mcp",
            get(crate::api::tools::describe_tools_handler)
                .post(crate::api::tools::call_tool_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, settings: BridgeSettings) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        bind = %addr,
        photoshop = %settings.photoshop_path,
        script_dir = %settings.script_dir.display(),
        "starting psmcp-backend-core HTTP surface"
    );
    let app = build_router(settings);
    axum::serve(listener, app).await
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "status": "ok",
            "service": state.service_name,
            "version": state.service_version,
            "started_unix_ms": state.started_unix_ms,
            "batch_defaults": {
                "width": state.settings.batch.width,
                "height": state.settings.batch.height,
                "count": state.settings.batch.max_count,
                "format": state.settings.batch.output_format,
            },
        })),
    )
}
