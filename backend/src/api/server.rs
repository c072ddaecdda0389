//! HTTP server for fieldload.
//!
//! Import sessions live in memory, keyed by a random id. Submission runs
//! against the HTTP capabilities configured through the environment.
//!
//! # API Endpoints
//!
//! | Method | Path                                         | Description                        |
//! |--------|----------------------------------------------|------------------------------------|
//! | GET    | `/health`                                    | Health check                       |
//! | POST   | `/api/import`                                | Upload CSV, schema and mappings    |
//! | GET    | `/api/sessions/{id}`                         | Rows, records and statuses         |
//! | DELETE | `/api/sessions/{id}/rows/{index}`            | Delete one row                     |
//! | POST   | `/api/sessions/{id}/submit`                  | Submit every unfinished row        |
//! | POST   | `/api/sessions/{id}/rows/{index}/resubmit`   | Resubmit one row                   |
//! | GET    | `/api/sessions/{id}/export/successful`       | Transformed CSV of successful rows |
//! | GET    | `/api/sessions/{id}/export/incomplete`       | Original CSV of unfinished rows    |
//! | GET    | `/api/logs`                                  | SSE stream for real-time logs      |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{delete, get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{collections::HashMap, convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::{Mutex, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{ApiError, ImportResponse, SessionSnapshot, SubmitResponse};
use crate::config::{ServiceConfig, SubmitConfig, MAX_UPLOAD_SIZE};
use crate::dataset::Dataset;
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::export::{export_failed_or_pending, export_successful};
use crate::models::TargetSchema;
use crate::parser::{decode_bytes, CsvTable};
use crate::submit::{HttpBroadcaster, HttpUploader, SubmissionPipeline};
use crate::transform::MappingSet;

type Session = Arc<Mutex<Dataset>>;

#[derive(Clone)]
pub struct AppState {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    submit: SubmitConfig,
    services: ServiceConfig,
}

impl AppState {
    pub fn new(submit: SubmitConfig, services: ServiceConfig) -> Self {
        Self {
            sessions: Arc::default(),
            submit,
            services,
        }
    }

    async fn insert(&self, dataset: Dataset) -> Session {
        let session = Arc::new(Mutex::new(dataset));
        let id = session.lock().await.id();
        self.sessions.write().await.insert(id, session.clone());
        session
    }

    async fn session(&self, id: &str) -> ServerResult<Session> {
        let not_found = || ServerError::SessionNotFound(id.to_string());
        let uuid = Uuid::parse_str(id).map_err(|_| not_found())?;
        self.sessions.read().await.get(&uuid).cloned().ok_or_else(not_found)
    }

    fn pipeline(&self) -> ServerResult<SubmissionPipeline<HttpUploader, HttpBroadcaster>> {
        let uploader = HttpUploader::from_config(&self.services)
            .ok_or_else(|| ServerError::BadRequest("upload endpoint not configured".into()))?;
        let broadcaster = HttpBroadcaster::from_config(&self.services)
            .ok_or_else(|| ServerError::BadRequest("broadcast endpoint not configured".into()))?;
        Ok(SubmissionPipeline::new(uploader, broadcaster, self.submit.clone()))
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/import", post(import_csv))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/rows/{index}", delete(delete_row))
        .route("/api/sessions/{id}/submit", post(submit_session))
        .route("/api/sessions/{id}/rows/{index}/resubmit", post(resubmit_row))
        .route("/api/sessions/{id}/export/successful", get(export_success_csv))
        .route("/api/sessions/{id}/export/incomplete", get(export_incomplete_csv))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(port: u16, submit: SubmitConfig) -> Result<(), Box<dyn std::error::Error>> {
    let services = ServiceConfig::from_env();
    if services.upload_url.is_none() || services.broadcast_url.is_none() {
        println!("⚠️  Upload or broadcast endpoint not configured; submission is disabled");
    }

    let app = router(AppState::new(submit, services));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Fieldload server running on http://localhost:{}", port);
    println!("   POST /api/import              - Upload CSV with schema and mappings");
    println!("   GET  /api/sessions/{{id}}       - Session rows and statuses");
    println!("   POST /api/sessions/{{id}}/submit - Submit unfinished rows");
    println!("   GET  /api/logs                - SSE log stream");
    println!("   GET  /health                  - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "fieldload",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Fields of the import form.
struct ImportForm {
    bytes: Vec<u8>,
    file_name: Option<String>,
    has_headers: bool,
    schema: TargetSchema,
    mappings: MappingSet,
}

async fn read_import_form(mut multipart: Multipart) -> ServerResult<ImportForm> {
    let bad = |e: axum::extract::multipart::MultipartError| ServerError::BadRequest(format!("Multipart error: {}", e));

    let mut bytes = None;
    let mut file_name = None;
    let mut has_headers = true;
    let mut schema = None;
    let mut mappings = MappingSet::new();

    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                bytes = Some(field.bytes().await.map_err(bad)?.to_vec());
            }
            "hasHeaders" => {
                let value = field.text().await.map_err(bad)?;
                has_headers = !matches!(value.trim(), "false" | "0" | "no");
            }
            "schema" => schema = Some(TargetSchema::from_json(&field.text().await.map_err(bad)?)?),
            "mappings" => mappings = MappingSet::from_json(&field.text().await.map_err(bad)?)?,
            _ => {}
        }
    }

    Ok(ImportForm {
        bytes: bytes.ok_or_else(|| ServerError::BadRequest("No file provided".into()))?,
        file_name,
        has_headers,
        schema: schema.ok_or_else(|| ServerError::BadRequest("No schema provided".into()))?,
        mappings,
    })
}

async fn import_csv(State(state): State<AppState>, multipart: Multipart) -> Result<Json<ImportResponse>, ApiError> {
    let form = read_import_form(multipart).await?;
    log_info(format!(
        "📄 Import: {} ({} bytes)",
        form.file_name.as_deref().unwrap_or("unknown"),
        form.bytes.len()
    ));

    let decoded = decode_bytes(&form.bytes).map_err(ServerError::from)?;
    let table = CsvTable::from_text(&decoded.text, form.has_headers);
    let dataset = Dataset::from_table(table, form.schema, form.mappings).map_err(ServerError::from)?;

    let session = state.insert(dataset).await;
    let snapshot = SessionSnapshot::of(&*session.lock().await);
    Ok(Json(ImportResponse {
        encoding: decoded.encoding,
        session: snapshot,
    }))
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.session(&id).await?;
    let dataset = session.lock().await;
    Ok(Json(SessionSnapshot::of(&dataset)))
}

async fn delete_row(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.session(&id).await?;
    let mut dataset = session.try_lock().map_err(|_| ServerError::from(PipelineError::RunInProgress))?;
    dataset.delete_row(index).map_err(ServerError::from)?;
    Ok(Json(SessionSnapshot::of(&dataset)))
}

async fn submit_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SubmitResponse>, ApiError> {
    let session = state.session(&id).await?;
    let pipeline = state.pipeline()?;
    let mut dataset = session.try_lock().map_err(|_| ServerError::from(PipelineError::RunInProgress))?;

    let report = pipeline.submit_all(&mut dataset).await;
    Ok(Json(SubmitResponse {
        report,
        session: SessionSnapshot::of(&dataset),
    }))
}

async fn resubmit_row(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<Value>, ApiError> {
    let session = state.session(&id).await?;
    let pipeline = state.pipeline()?;
    let mut dataset = session.try_lock().map_err(|_| ServerError::from(PipelineError::RunInProgress))?;

    let status = pipeline.resubmit_row(&mut dataset, index).await.map_err(ServerError::from)?;
    Ok(Json(json!({
        "status": status,
        "session": SessionSnapshot::of(&dataset),
    })))
}

async fn export_success_csv(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let session = state.session(&id).await?;
    let csv = export_successful(&*session.lock().await).map_err(ServerError::from)?;
    Ok(csv_attachment("successful.csv", csv))
}

async fn export_incomplete_csv(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let session = state.session(&id).await?;
    let csv = export_failed_or_pending(&*session.lock().await).map_err(ServerError::from)?;
    Ok(csv_attachment("incomplete.csv", csv))
}

fn csv_attachment(file_name: &str, body: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file_name)),
        ],
        body,
    )
        .into_response()
}
