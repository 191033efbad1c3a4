use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, Query, State, rejection::JsonRejection},
    http::{
        HeaderValue, Method, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::from_fn,
    response::Json,
    routing::{get, post},
};
use medicos_core::{
    CompletionBackend, Dispatcher, GatewayOptions, ModelGateway, OcrEngine, ReportAnalyzer,
    SessionStore, SymptomRules, TextExtractor,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    config::ServiceConfig,
    llm::OpenRouterBackend,
    models::{
        ChatRequest, ChatResponse, HistoryResponse, MessageResponse, UploadResponse, UserRequest,
    },
    ocr::OpenRouterVisionOcr,
    telemetry::correlation_id_middleware,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

/// Multipart field carrying the uploaded report.
pub const REPORT_FIELD: &str = "report";

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn unprocessable_error(message: &str) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": message })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub analyzer: ReportAnalyzer,
}

impl AppState {
    pub fn new(
        rules: SymptomRules,
        backend: Arc<dyn CompletionBackend>,
        ocr: Arc<dyn OcrEngine>,
        options: GatewayOptions,
    ) -> Self {
        let gateway = Arc::new(ModelGateway::new(backend, options));
        let dispatcher = Dispatcher::new(
            Arc::new(rules),
            Arc::new(SessionStore::new()),
            gateway.clone(),
        );
        let analyzer = ReportAnalyzer::new(TextExtractor::new(ocr), gateway);

        Self {
            dispatcher,
            analyzer,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        self.dispatcher.sessions()
    }
}

/// Router-level settings that don't belong to the pipeline itself.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

impl From<&ServiceConfig> for RouterOptions {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            allowed_origins: config.allowed_origins.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

pub async fn create_app(config: &ServiceConfig) -> anyhow::Result<Router> {
    let app_state = create_app_state(config).await?;

    if let Some(ttl) = config.session_idle_ttl {
        spawn_session_sweeper(app_state.sessions().clone(), ttl);
    }

    Ok(build_router(app_state, RouterOptions::from(config)))
}

pub async fn create_app_state(config: &ServiceConfig) -> anyhow::Result<AppState> {
    let rules = load_rules(config.symptom_rules_path.as_deref()).await?;
    info!(rules = rules.len(), "Symptom rule table loaded");

    let backend = Arc::new(OpenRouterBackend::new(&config.api_key, &config.chat_model));

    let http = reqwest::Client::builder()
        .timeout(config.model_timeout)
        .build()?;
    let ocr = Arc::new(OpenRouterVisionOcr::new(
        http,
        config.api_key.clone(),
        config.ocr_model.clone(),
    ));

    let options = GatewayOptions {
        timeout: config.model_timeout,
        simplify: config.simplify_responses,
    };

    Ok(AppState::new(rules, backend, ocr, options))
}

async fn load_rules(path: Option<&Path>) -> anyhow::Result<SymptomRules> {
    match path {
        Some(path) => {
            let json = tokio::fs::read_to_string(path).await?;
            Ok(SymptomRules::from_json(&json)?)
        }
        None => Ok(SymptomRules::builtin()),
    }
}

/// Periodically evicts sessions idle for longer than `ttl`.
pub fn spawn_session_sweeper(sessions: Arc<SessionStore>, ttl: Duration) -> JoinHandle<()> {
    let period = (ttl / 4).max(Duration::from_secs(1));
    info!(ttl = ?ttl, period = ?period, "Starting idle session sweeper");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            sessions.evict_idle(ttl);
        }
    })
}

pub fn build_router(app_state: AppState, options: RouterOptions) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .route("/api/chat", post(chat))
        .route("/chat", post(chat))
        .route("/api/history", get(history))
        .route("/history", get(history))
        .route("/api/clear", post(clear))
        .route("/clear", post(clear))
        .route("/api/upload", post(upload_report))
        .route("/upload", post(upload_report))
        // Uploads are the only large bodies
        .layer(DefaultBodyLimit::max(options.max_upload_bytes))
        .layer(cors_layer(&options.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(app_state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Medicos Health Assistant",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Symptom-aware health chat with AI fallback and medical report simplification",
        "endpoints": {
            "POST /api/chat": "Send a message: {user_id, message}",
            "GET /api/history?user_id=": "Get chat history and current symptom context",
            "POST /api/clear": "Clear a user's conversation: {user_id}",
            "POST /api/upload": "Upload a report (multipart field 'report') for a simplified summary",
            "GET /api/health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "API is running",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Unwraps a JSON body, answering malformed or missing bodies with the
/// service's own 400 instead of axum's plain-text rejection.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            warn!(status = %rejection.status(), error = %rejection.body_text(), "Rejected request body");
            Err(bad_request_error("No JSON data provided"))
        }
    }
}

async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<ChatResponse> {
    let request = json_body(body)?;

    // Both fields are required and must not be blank
    let (Some(user_id), Some(message)) = (required(request.user_id), required(request.message))
    else {
        return Err(bad_request_error("Missing user_id or message"));
    };

    info!(user_id = %user_id, message_len = message.len(), "Chat turn received");
    let outcome = state.dispatcher.handle_turn(&user_id, &message).await;

    Ok(Json(ChatResponse::from(outcome)))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    user_id: Option<String>,
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<HistoryResponse> {
    let user_id = required(query.user_id).ok_or_else(|| bad_request_error("Missing user_id"))?;

    let snapshot = state.sessions().snapshot(&user_id).await;
    Ok(Json(HistoryResponse::from(snapshot)))
}

async fn clear(
    State(state): State<AppState>,
    body: Result<Json<UserRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let request = json_body(body)?;
    let user_id = required(request.user_id).ok_or_else(|| bad_request_error("Missing user_id"))?;

    // Unknown users get the same reply
    state.sessions().clear(&user_id);
    Ok(Json(MessageResponse {
        message: "History cleared successfully".to_string(),
    }))
}

struct UploadedReport {
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

async fn upload_report(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<UploadResponse> {
    let report = read_report_field(&mut multipart).await?;
    info!(
        filename = %report.filename,
        content_type = ?report.content_type,
        size = report.bytes.len(),
        "Report uploaded"
    );

    // Extraction works on paths, so the upload is staged on disk first
    let file = stage_upload(&report).await.map_err(|e| {
        error!(error = %e, "Failed to stage upload");
        internal_error("Failed to store uploaded file", &e.to_string())
    })?;

    match state
        .analyzer
        .analyze(file.path(), report.content_type.as_deref())
        .await
    {
        Ok(analysis) => Ok(Json(UploadResponse {
            filename: report.filename,
            summary: analysis.summary,
            source_text: analysis.source_text,
        })),
        Err(e) => {
            warn!(filename = %report.filename, error = %e, "Report analysis failed");
            Err(unprocessable_error(&e.to_string()))
        }
    }
}

async fn read_report_field(multipart: &mut Multipart) -> Result<UploadedReport, ApiError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(bad_request_error("No file part")),
            Err(e) => {
                warn!(error = %e, "Malformed multipart body");
                return Err(bad_request_error("Failed to read upload"));
            }
        };

        // Other form fields are ignored
        if field.name() != Some(REPORT_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().trim().to_string();
        if filename.is_empty() {
            return Err(bad_request_error("No selected file"));
        }
        let content_type = field.content_type().map(str::to_string);

        let bytes = field.bytes().await.map_err(|e| {
            warn!(error = %e, "Failed to read upload bytes");
            bad_request_error("Failed to read upload")
        })?;

        return Ok(UploadedReport {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
}

/// Writes the upload to a temporary file that keeps the original extension;
/// the file is removed when the returned handle drops.
async fn stage_upload(report: &UploadedReport) -> std::io::Result<tempfile::NamedTempFile> {
    let suffix = Path::new(&report.filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    let file = tempfile::Builder::new()
        .prefix("report-")
        .suffix(&suffix)
        .tempfile()?;
    tokio::fs::write(file.path(), &report.bytes).await?;
    Ok(file)
}
