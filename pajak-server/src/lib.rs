#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Multipart;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use chrono::DateTime;
use chrono::Utc;
use futures::SinkExt;
use futures::StreamExt;
use pajak_pipeline::BatchOrchestrator;
use pajak_pipeline::PipelineError;
use pajak_pipeline::UploadedFile;
use pajak_progress::ProgressBus;
use pajak_reconcile::CreateProjectRequest;
use pajak_reconcile::DEFAULT_MIN_CONFIDENCE;
use pajak_reconcile::ReconError;
use pajak_reconcile::ReconciliationEngine;
use pajak_storage::BatchStatus;
use pajak_storage::StorageError;
use pajak_storage::Store;
use pajak_storage::User;
use serde::Deserialize;
use serde::Serialize;
use tracing::Instrument;
use tracing::info_span;
use tracing::warn;

mod auth;
mod bootstrap;
mod config;
mod rate_limit;

pub use crate::auth::AuthError;
pub use crate::auth::AuthService;
pub use crate::bootstrap::BootError;
pub use crate::bootstrap::bootstrap;
pub use crate::config::Config;
pub use crate::rate_limit::RateLimiter;

const REGISTER_LIMIT_PER_MINUTE: u32 = 5;
const LOGIN_LIMIT_PER_MINUTE: u32 = 10;
const UPLOAD_LIMIT_PER_MINUTE: u32 = 10;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BatchOrchestrator>,
    pub engine: Arc<ReconciliationEngine>,
    pub auth: Arc<AuthService>,
    pub bus: Arc<ProgressBus>,
    pub store: Arc<dyn Store>,
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/banks", get(supported_banks_handler))
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/upload", post(upload_handler))
        .route("/batches", get(list_batches_handler))
        .route("/batches/{id}", get(get_batch_handler))
        .route("/batches/{id}/results", get(batch_results_handler))
        .route("/results/{id}", get(get_result_handler))
        .route("/batches/{id}/export/{format}", get(export_handler))
        .route("/batches/{id}/cancel", post(cancel_handler))
        .route("/ws/batch/{id}", get(batch_ws_handler))
        .route(
            "/reconciliation/projects",
            post(create_project_handler).get(list_projects_handler),
        )
        .route("/reconciliation/projects/{id}", get(get_project_handler))
        .route(
            "/reconciliation/projects/{id}/invoices",
            get(list_invoices_handler),
        )
        .route(
            "/reconciliation/projects/{id}/transactions",
            get(list_transactions_handler),
        )
        .route(
            "/reconciliation/projects/{id}/matches",
            get(list_matches_handler),
        )
        .route(
            "/reconciliation/projects/{id}/import/invoices",
            post(import_invoices_handler),
        )
        .route(
            "/reconciliation/projects/{id}/import/transactions",
            post(import_transactions_handler),
        )
        .route(
            "/reconciliation/projects/{id}/import/evidence",
            post(import_evidence_handler),
        )
        .route(
            "/reconciliation/projects/{id}/auto-match",
            post(auto_match_handler),
        )
        .route(
            "/reconciliation/projects/{id}/suggestions/{invoice_id}",
            get(suggestions_handler),
        )
        .route(
            "/reconciliation/projects/{id}/manual-match",
            post(manual_match_handler),
        )
        .route(
            "/reconciliation/projects/{id}/unmatch",
            post(unmatch_handler),
        )
        .route(
            "/reconciliation/projects/{id}/ppn/auto-match",
            post(ppn_auto_match_handler),
        )
        .route(
            "/reconciliation/projects/{id}/ai/extract-vendors",
            post(extract_vendors_handler),
        )
        .route(
            "/reconciliation/projects/{id}/ai/extract-invoices",
            post(extract_invoices_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            security_headers,
        ))
        .with_state(state)
}

/// Uniform error envelope: `{"error": code, "message": text}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        )
    }

    fn rate_limited() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "too many requests; slow down",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.code,
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match &err {
            PipelineError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
            }
            PipelineError::Forbidden(_) => {
                Self::new(StatusCode::FORBIDDEN, "forbidden", err.to_string())
            }
            PipelineError::Storage(StorageError::NotFound(_)) => {
                Self::new(StatusCode::NOT_FOUND, "not_found", err.to_string())
            }
            _ => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                err.to_string(),
            ),
        }
    }
}

impl From<ReconError> for ApiError {
    fn from(err: ReconError) -> Self {
        match &err {
            ReconError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "not_found", err.to_string()),
            ReconError::Conflict(_) => Self::new(StatusCode::CONFLICT, "conflict", err.to_string()),
            ReconError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
            }
            ReconError::Storage(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                err.to_string(),
            ),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::NotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "not_found", err.to_string())
            }
            StorageError::Conflict(_) => {
                Self::new(StatusCode::CONFLICT, "conflict", err.to_string())
            }
            StorageError::Validation(_) | StorageError::InvalidTransition(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
            }
            StorageError::Internal(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                err.to_string(),
            ),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match &err {
            AuthError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
            }
            AuthError::InvalidCredentials => Self::new(
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                err.to_string(),
            ),
            AuthError::AccountDisabled => {
                Self::new(StatusCode::FORBIDDEN, "account_disabled", err.to_string())
            }
            AuthError::Unauthorized => Self::unauthorized(),
            AuthError::Internal(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                err.to_string(),
            ),
        }
    }
}

async fn security_headers(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        axum::http::HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "x-frame-options",
        axum::http::HeaderValue::from_static("DENY"),
    );
    headers.insert(
        "referrer-policy",
        axum::http::HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    if state.config.is_production() {
        headers.insert(
            "strict-transport-security",
            axum::http::HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }
    response
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(ApiError::unauthorized)?;
    Ok(state.auth.authenticate(token).await?)
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "pajak-scan document service",
        "status": "online",
    }))
}

/// Banks the statement normalizer can route without the mapper fallback,
/// in detection order.
async fn supported_banks_handler() -> Json<serde_json::Value> {
    let banks = pajak_bank::BankDetector::new()
        .supported_banks()
        .into_iter()
        .map(|(code, name)| serde_json::json!({"code": code, "name": name}))
        .collect::<Vec<_>>();
    Json(serde_json::json!({ "banks": banks }))
}

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    username: String,
    email: String,
    password: String,
    #[serde(default, rename = "fullName")]
    full_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserResponse {
    id: String,
    username: String,
    email: String,
    full_name: String,
    is_admin: bool,
    created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            is_admin: user.is_admin,
            created_at: user.created_at,
        }
    }
}

async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterPayload>,
) -> Result<Json<UserResponse>, ApiError> {
    if !state
        .limiter
        .allow("register", &client_ip(&headers), REGISTER_LIMIT_PER_MINUTE)
        .await
    {
        return Err(ApiError::rate_limited());
    }
    let user = state
        .auth
        .register(
            &payload.username,
            &payload.email,
            &payload.password,
            &payload.full_name,
        )
        .await?;
    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
    user: UserResponse,
}

async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<TokenResponse>, ApiError> {
    if !state
        .limiter
        .allow("login", &client_ip(&headers), LOGIN_LIMIT_PER_MINUTE)
        .await
    {
        return Err(ApiError::rate_limited());
    }
    let (token, user) = state.auth.login(&payload.username, &payload.password).await?;
    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer",
        user: user.into(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadFileResponse {
    id: String,
    name: String,
    #[serde(rename = "type")]
    declared_type: String,
    status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    batch_id: String,
    files: Vec<UploadFileResponse>,
    status: String,
    created_at: DateTime<Utc>,
    total_files: usize,
}

async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    if !state
        .limiter
        .allow("upload", &client_ip(&headers), UPLOAD_LIMIT_PER_MINUTE)
        .await
    {
        return Err(ApiError::rate_limited());
    }

    let mut files: Vec<(String, String, Vec<u8>)> = Vec::new();
    let mut document_types: Vec<String> = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        ApiError::new(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
    })? {
        match field.name() {
            Some("files") => {
                let filename = field.file_name().unwrap_or("unnamed").to_string();
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(|err| {
                    ApiError::new(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
                })?;
                files.push((filename, mime, bytes.to_vec()));
            }
            Some("document_types") => {
                let value = field.text().await.map_err(|err| {
                    ApiError::new(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
                })?;
                document_types.push(value.trim().to_string());
            }
            _ => {}
        }
    }

    if files.len() != document_types.len() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!(
                "files ({}) and document_types ({}) must be parallel arrays",
                files.len(),
                document_types.len()
            ),
        ));
    }

    let uploads = files
        .into_iter()
        .zip(document_types)
        .map(|((filename, mime, payload), declared_type)| UploadedFile {
            filename,
            declared_type,
            declared_mime: mime,
            payload,
        })
        .collect::<Vec<_>>();

    let span = info_span!("submit_batch", user = %user.username, files = uploads.len());
    let outcome = state
        .orchestrator
        .submit_batch(&user.id, uploads)
        .instrument(span)
        .await?;

    if outcome.batch.status == BatchStatus::Processing {
        state.orchestrator.spawn_process(outcome.batch.id.clone());
    }

    Ok(Json(UploadResponse {
        batch_id: outcome.batch.id.clone(),
        files: outcome
            .files
            .iter()
            .map(|file| UploadFileResponse {
                id: file.id.clone(),
                name: file.display_name.clone(),
                declared_type: file.declared_type.clone(),
                status: file.status.to_string(),
            })
            .collect(),
        status: outcome.batch.status.to_string(),
        created_at: outcome.batch.created_at,
        total_files: outcome.batch.total_files,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponse {
    id: String,
    status: String,
    total_files: usize,
    processed_files: usize,
    progress_percentage: f64,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl From<pajak_storage::Batch> for BatchResponse {
    fn from(batch: pajak_storage::Batch) -> Self {
        Self {
            id: batch.id.clone(),
            status: batch.status.to_string(),
            total_files: batch.total_files,
            processed_files: batch.processed_files,
            progress_percentage: batch.progress_percentage(),
            created_at: batch.created_at,
            completed_at: batch.completed_at,
            error_message: batch.error_message,
        }
    }
}

async fn list_batches_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<BatchResponse>>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let batches = state.orchestrator.list_batches(&user).await?;
    Ok(Json(batches.into_iter().map(BatchResponse::from).collect()))
}

async fn get_batch_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let batch = state.orchestrator.get_batch(&user, &batch_id).await?;
    Ok(Json(batch.into()))
}

async fn batch_results_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(batch_id): Path<String>,
) -> Result<Json<Vec<pajak_storage::ScanResult>>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let results = state.orchestrator.list_results(&user, &batch_id).await?;
    Ok(Json(results))
}

async fn get_result_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(result_id): Path<String>,
) -> Result<Json<pajak_storage::ScanResult>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let result = state.orchestrator.get_result(&user, &result_id).await?;
    Ok(Json(result))
}

/// Row-schema export. Excel and PDF rendering are external concerns; both
/// formats receive the same CSV row schema.
async fn export_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((batch_id, format)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    if !matches!(format.as_str(), "excel" | "pdf" | "csv") {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("unknown export format {format}"),
        ));
    }
    let user = current_user(&state, &headers).await?;
    let results = state.orchestrator.list_results(&user, &batch_id).await?;
    let body = export_sections(&results).map_err(|err| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            err.to_string(),
        )
    })?;

    let disposition = format!("attachment; filename=\"batch-{batch_id}-{format}.csv\"");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// One CSV section per document type present in the batch, each under its
/// own schema header. Sections are separated by a blank line.
fn export_sections(
    results: &[pajak_storage::ScanResult],
) -> Result<String, pajak_export::ExportError> {
    let mut sections = Vec::new();

    let bank_rows = results
        .iter()
        .filter(|result| result.document_type == "rekening_koran")
        .flat_map(|result| pajak_export::rekening_koran_rows(result))
        .collect::<Vec<_>>();
    if !bank_rows.is_empty() {
        sections.push(pajak_export::write_csv(&bank_rows)?);
    }

    let faktur_rows = pajak_export::faktur_pajak_rows(results);
    if !faktur_rows.is_empty() {
        sections.push(pajak_export::write_csv(&faktur_rows)?);
    }

    let invoice_rows = pajak_export::invoice_rows(results);
    if !invoice_rows.is_empty() {
        sections.push(pajak_export::write_csv(&invoice_rows)?);
    }

    let pph23_rows = pajak_export::pph23_rows(results);
    if !pph23_rows.is_empty() {
        sections.push(pajak_export::write_csv(&pph23_rows)?);
    }

    let summary_rows = pajak_export::document_summary_rows(results);
    if !summary_rows.is_empty() {
        sections.push(pajak_export::write_csv(&summary_rows)?);
    }

    Ok(sections.join("\n"))
}

async fn cancel_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(batch_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = current_user(&state, &headers).await?;
    state.orchestrator.cancel(&user, &batch_id).await?;
    Ok(Json(serde_json::json!({
        "batchId": batch_id,
        "status": "cancellation_requested",
    })))
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: String,
}

async fn batch_ws_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    Query(query): Query<WsQuery>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user = state.auth.authenticate(&query.token).await?;
    // Ownership gate before the upgrade completes.
    state.orchestrator.get_batch(&user, &batch_id).await?;

    let bus = state.bus.clone();
    Ok(upgrade.on_upgrade(move |socket| forward_batch_events(socket, bus, batch_id)))
}

/// Fans bus events to one subscriber. A lagging client just loses the
/// oldest events. After the terminal event the connection stays open until
/// the client closes it.
async fn forward_batch_events(socket: WebSocket, bus: Arc<ProgressBus>, batch_id: String) {
    let mut receiver = bus.subscribe(&batch_id).await;
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = receiver.recv() => match event {
                Ok(event) => {
                    let Ok(payload) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sink.send(Message::Text(payload.into())).await.is_err() {
                        return;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(batch_id = %batch_id, skipped, "websocket subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            message = stream.next() => match message {
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {}
                Some(Err(_)) => return,
            },
        }
    }

    // Bus closed; drain client messages until it hangs up.
    while let Some(message) = stream.next().await {
        if matches!(message, Ok(Message::Close(_)) | Err(_)) {
            return;
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateProjectPayload {
    name: String,
    #[serde(default)]
    description: Option<String>,
    period_start: chrono::NaiveDate,
    period_end: chrono::NaiveDate,
    #[serde(default)]
    company_npwp: String,
}

async fn create_project_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateProjectPayload>,
) -> Result<Json<pajak_reconcile::ReconciliationProject>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let project = state
        .engine
        .create_project(
            &user,
            CreateProjectRequest {
                user_id: user.id.clone(),
                name: payload.name,
                description: payload.description,
                period_start: payload.period_start,
                period_end: payload.period_end,
                company_npwp: payload.company_npwp,
            },
        )
        .await?;
    Ok(Json(project))
}

async fn list_projects_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<pajak_reconcile::ReconciliationProject>>, ApiError> {
    let user = current_user(&state, &headers).await?;
    Ok(Json(state.engine.list_projects(&user).await?))
}

async fn get_project_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> Result<Json<pajak_reconcile::ReconciliationProject>, ApiError> {
    let user = current_user(&state, &headers).await?;
    Ok(Json(state.engine.get_project(&user, &project_id).await?))
}

async fn list_invoices_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<pajak_reconcile::TaxInvoice>>, ApiError> {
    let user = current_user(&state, &headers).await?;
    Ok(Json(state.engine.list_invoices(&user, &project_id).await?))
}

async fn list_transactions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<pajak_reconcile::BankTransaction>>, ApiError> {
    let user = current_user(&state, &headers).await?;
    Ok(Json(
        state.engine.list_transactions(&user, &project_id).await?,
    ))
}

async fn list_matches_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<pajak_reconcile::ReconciliationMatch>>, ApiError> {
    let user = current_user(&state, &headers).await?;
    Ok(Json(state.engine.list_matches(&user, &project_id).await?))
}

#[derive(Debug, Deserialize)]
struct ImportPayload {
    batch_id: String,
}

async fn import_invoices_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(payload): Json<ImportPayload>,
) -> Result<Json<pajak_reconcile::ImportSummary>, ApiError> {
    let user = current_user(&state, &headers).await?;
    Ok(Json(
        state
            .engine
            .import_invoices_from_batch(&user, &project_id, &payload.batch_id)
            .await?,
    ))
}

async fn import_transactions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(payload): Json<ImportPayload>,
) -> Result<Json<pajak_reconcile::ImportSummary>, ApiError> {
    let user = current_user(&state, &headers).await?;
    Ok(Json(
        state
            .engine
            .import_transactions_from_batch(&user, &project_id, &payload.batch_id)
            .await?,
    ))
}

async fn import_evidence_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(payload): Json<ImportPayload>,
) -> Result<Json<pajak_reconcile::ImportSummary>, ApiError> {
    let user = current_user(&state, &headers).await?;
    Ok(Json(
        state
            .engine
            .import_evidence_from_batch(&user, &project_id, &payload.batch_id)
            .await?,
    ))
}

#[derive(Debug, Deserialize, Default)]
struct AutoMatchPayload {
    #[serde(default)]
    min_confidence: Option<f64>,
}

async fn auto_match_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(payload): Json<AutoMatchPayload>,
) -> Result<Json<pajak_reconcile::AutoMatchOutcome>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let min_confidence = payload.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE);
    Ok(Json(
        state
            .engine
            .auto_match_project(&user, &project_id, min_confidence)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct SuggestQuery {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SuggestionResponse {
    transaction: pajak_reconcile::BankTransaction,
    score: pajak_reconcile::MatchScore,
}

async fn suggestions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((project_id, invoice_id)): Path<(String, String)>,
    Query(query): Query<SuggestQuery>,
) -> Result<Json<Vec<SuggestionResponse>>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let suggestions = state
        .engine
        .suggest_matches(&user, &project_id, &invoice_id, query.limit.unwrap_or(5))
        .await?;
    Ok(Json(
        suggestions
            .into_iter()
            .map(|(transaction, score)| SuggestionResponse { transaction, score })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
struct ManualMatchPayload {
    invoice_id: String,
    transaction_id: String,
    #[serde(default)]
    notes: Option<String>,
}

async fn manual_match_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(payload): Json<ManualMatchPayload>,
) -> Result<Json<pajak_reconcile::ReconciliationMatch>, ApiError> {
    let user = current_user(&state, &headers).await?;
    Ok(Json(
        state
            .engine
            .manual_match(
                &user,
                &project_id,
                &payload.invoice_id,
                &payload.transaction_id,
                payload.notes,
            )
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct UnmatchPayload {
    match_id: String,
    #[serde(default)]
    reason: Option<String>,
}

async fn unmatch_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(payload): Json<UnmatchPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = current_user(&state, &headers).await?;
    state
        .engine
        .unmatch(&user, &project_id, &payload.match_id, payload.reason)
        .await?;
    Ok(Json(serde_json::json!({
        "matchId": payload.match_id,
        "status": "rejected",
    })))
}

async fn ppn_auto_match_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(payload): Json<AutoMatchPayload>,
) -> Result<Json<pajak_reconcile::PpnMatchOutcome>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let min_confidence = payload.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE);
    Ok(Json(
        state
            .engine
            .ppn_auto_match(&user, &project_id, min_confidence)
            .await?,
    ))
}

#[derive(Debug, Deserialize, Default)]
struct AiExtractPayload {
    #[serde(default)]
    batch_size: Option<usize>,
}

async fn extract_vendors_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(payload): Json<AiExtractPayload>,
) -> Result<Json<pajak_reconcile::AiExtractionSummary>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let batch_size = payload.batch_size.unwrap_or(50);
    Ok(Json(
        state
            .engine
            .ai_extract_vendor_from_transactions(&user, &project_id, batch_size)
            .await?,
    ))
}

async fn extract_invoices_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(payload): Json<AiExtractPayload>,
) -> Result<Json<pajak_reconcile::AiExtractionSummary>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let batch_size = payload.batch_size.unwrap_or(50);
    Ok(Json(
        state
            .engine
            .ai_extract_invoice_from_transactions(&user, &project_id, batch_size)
            .await?,
    ))
}
