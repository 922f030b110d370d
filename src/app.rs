use axum::{
    Form, Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Request, State, multipart::MultipartError},
    http::StatusCode,
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use handlebars::Handlebars;
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::net::TcpListener;

use crate::classifier::Label;
use crate::config::{RunSettings, ServerConfig};
use crate::error::{ClassifyError, InputError, ModelError};
use crate::graph::{ChartOptions, render_pie_svg};
use crate::loader::{SpreadsheetFormat, Table, load_table};
use crate::model::ModelHandle;
use crate::report::Report;
use crate::session::{
    PendingUpload, UPLOAD_COOKIE, UploadRegistry, remove_upload_file, sanitize_filename,
};

const CSS: &str = include_str!("./static/layout.css");

pub struct AppState {
    templates: Handlebars<'static>,
    pub uploads: UploadRegistry,
    pub model: ModelHandle,
    pub settings: RunSettings,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        model: ModelHandle,
        settings: RunSettings,
        upload_dir: PathBuf,
        max_upload_bytes: usize,
    ) -> Result<Self, handlebars::TemplateError> {
        let mut templates = Handlebars::new();
        templates.register_template_string("index", include_str!("./static/index.hbs"))?;
        templates.register_template_string(
            "select_column",
            include_str!("./static/select_column.hbs"),
        )?;
        templates.register_template_string("report", include_str!("./static/report.hbs"))?;

        Ok(Self {
            templates,
            uploads: UploadRegistry::new(),
            model,
            settings,
            upload_dir,
            max_upload_bytes,
        })
    }

    fn render(&self, name: &str, data: &serde_json::Value) -> Result<Html<String>, AppError> {
        self.templates
            .render(name, data)
            .map(Html)
            .map_err(|e| AppError::Internal(format!("failed to render {}: {}", name, e)))
    }
}

/// Errors at the HTTP boundary.
///
/// Input errors go back to the user as-is with a 4xx status; everything else
/// is logged and answered with a generic 500 page.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Model(ModelError),

    #[error("{0}")]
    Internal(String),
}

impl From<ClassifyError> for AppError {
    fn from(e: ClassifyError) -> Self {
        match e {
            ClassifyError::Input(e) => AppError::Input(e),
            ClassifyError::Model(e) => AppError::Model(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Input(e) => {
                let status = match e {
                    InputError::FileMissing => StatusCode::NOT_FOUND,
                    InputError::TooManyRows { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    _ => StatusCode::BAD_REQUEST,
                };
                warn!("Rejected request: {}", e);
                (status, e.to_string()).into_response()
            }
            AppError::Multipart(e) => {
                warn!("Rejected upload: {}", e);
                (e.status(), e.body_text()).into_response()
            }
            AppError::Model(e) => {
                error!("Error in predict: {}", e);
                internal_error_page()
            }
            AppError::Internal(message) => {
                error!("Internal error: {}", message);
                internal_error_page()
            }
        }
    }
}

fn internal_error_page() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(include_str!("./static/500.html")),
    )
        .into_response()
}

/// Builds the router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(serve_index))
        .route("/upload", post(upload_file))
        .route("/predict", post(predict))
        .route("/api/classify", post(api_classify))
        .route("/health", get(health))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(limit))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let state = Arc::new(AppState::new(
        config.model.handle(),
        config.run.settings(),
        config.upload_dir.clone(),
        config.max_upload_bytes,
    )?);
    info!(
        "Profile {:?}: batch size {}, row cap {:?}, model {} (load {:?})",
        config.run.profile,
        state.settings.batch_size,
        state.settings.max_rows,
        config.model.model_url,
        state.model.policy()
    );

    let app = router(state);

    let listener = TcpListener::bind(config.bind).await?;
    info!("Listening on http://{}", config.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        "{} {} -> {} ({} ms)",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

async fn serve_index(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    state.render(
        "index",
        &json!({
            "css": CSS,
            "max_upload_mb": state.max_upload_bytes / (1024 * 1024),
            "max_rows": state.settings.max_rows,
        }),
    )
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "pending_uploads": state.uploads.len(),
    }))
}

async fn not_found() -> (StatusCode, Html<&'static str>) {
    (StatusCode::NOT_FOUND, Html(include_str!("./static/404.html")))
}

struct UploadedFile {
    name: String,
    data: Bytes,
}

#[derive(Default)]
struct UploadForm {
    file: Option<UploadedFile>,
    column: Option<String>,
}

impl UploadForm {
    /// The uploaded file, checked for presence, a name and a known extension.
    fn spreadsheet(&mut self) -> Result<UploadedFile, InputError> {
        let file = self.file.take().ok_or(InputError::NoFilePart)?;
        if file.name.is_empty() {
            return Err(InputError::NoSelectedFile);
        }
        SpreadsheetFormat::from_path(&file.name)?;
        Ok(file)
    }
}

async fn read_form(multipart: &mut Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or("unknown").to_string();

        match field_name.as_str() {
            "file" => {
                let name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                form.file = Some(UploadedFile { name, data });
            }
            "column" => {
                form.column = Some(field.text().await?);
            }
            _ => {}
        }
    }

    Ok(form)
}

fn selected_column(column: Option<String>) -> Result<String, InputError> {
    column
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or(InputError::NoColumnSelected)
}

/// Writes the upload into `dir` under a unique name that keeps the
/// original extension.
fn store_upload(dir: &Path, file: &UploadedFile) -> Result<tempfile::NamedTempFile, AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::Internal(format!("cannot create upload dir: {}", e)))?;

    let mut stored = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&format!("-{}", sanitize_filename(&file.name)))
        .tempfile_in(dir)
        .map_err(|e| AppError::Internal(format!("cannot create upload file: {}", e)))?;
    stored
        .write_all(&file.data)
        .map_err(|e| AppError::Internal(format!("cannot write upload file: {}", e)))?;

    Ok(stored)
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<(CookieJar, Html<String>), AppError> {
    let file = read_form(&mut multipart).await?.spreadsheet()?;

    let worker = state.clone();
    let original_name = file.name.clone();
    let (path, table) = tokio::task::spawn_blocking(move || -> Result<(PathBuf, Table), AppError> {
        let stored = store_upload(&worker.upload_dir, &file)?;
        let table = load_table(stored.path())?;
        // Readable, so keep it around for the column choice
        let (_, path) = stored
            .keep()
            .map_err(|e| AppError::Internal(format!("cannot keep upload file: {}", e)))?;
        Ok((path, table))
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    info!(
        "Stored upload {} ({} rows, {} columns)",
        original_name,
        table.row_count(),
        table.columns.len()
    );

    let id = state.uploads.register(PendingUpload {
        path,
        original_name: original_name.clone(),
        created: SystemTime::now(),
    });
    let cookie = Cookie::build((UPLOAD_COOKIE, id)).path("/").http_only(true);

    let html = state.render(
        "select_column",
        &json!({
            "css": CSS,
            "filename": original_name,
            "rows": table.row_count(),
            "columns": table.columns,
        }),
    )?;
    Ok((jar.add(cookie), html))
}

#[derive(Debug, Deserialize)]
struct PredictForm {
    #[serde(default)]
    column: Option<String>,
}

async fn predict(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<PredictForm>,
) -> Result<(CookieJar, Html<String>), AppError> {
    let column = selected_column(form.column)?;

    let id = jar
        .get(UPLOAD_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or(InputError::NoPendingUpload)?;
    let upload = state.uploads.get(&id).ok_or(InputError::NoPendingUpload)?;

    if !upload.path.exists() {
        state.uploads.take(&id);
        return Err(InputError::FileMissing.into());
    }

    let worker = state.clone();
    let path = upload.path.clone();
    let selected = column.clone();
    let outcome = tokio::task::spawn_blocking(move || -> Result<Vec<Label>, ClassifyError> {
        let table = load_table(&path)?;
        worker
            .settings
            .classifier()
            .classify_column(&worker.model, &table, &selected)
    })
    .await;

    // The upload is spent whatever the outcome
    state.uploads.take(&id);
    remove_upload_file(&upload.path);

    let labels = outcome.map_err(|e| AppError::Internal(e.to_string()))??;
    let report = Report::from_labels(&labels, state.settings.colors);
    info!(
        "Classified column '{}' of {}: {} responses, {} labels",
        column,
        upload.original_name,
        report.total,
        report.entries.len()
    );

    let html = render_report(&state, &report, &column)?;
    let jar = jar.remove(Cookie::build(UPLOAD_COOKIE).path("/"));
    Ok((jar, html))
}

fn render_report(state: &AppState, report: &Report, column: &str) -> Result<Html<String>, AppError> {
    let options = ChartOptions {
        style: state.settings.chart,
        ..ChartOptions::default()
    };
    let chart = render_pie_svg(report, &options)
        .map_err(|e| AppError::Internal(format!("failed to draw chart: {}", e)))?;

    let entries: Vec<serde_json::Value> = report
        .entries
        .iter()
        .map(|entry| {
            json!({
                "label": entry.label,
                "count": entry.count,
                "percent": format!("{:.1}", entry.percentage),
                "color": entry.color,
            })
        })
        .collect();

    state.render(
        "report",
        &json!({
            "css": CSS,
            "column": column,
            "total": report.total,
            "entries": entries,
            "chart": chart,
            "generated_at": report.generated_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        }),
    )
}

/// One-shot JSON endpoint: multipart `file` plus `column`, report back.
async fn api_classify(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Report>, AppError> {
    let mut form = read_form(&mut multipart).await?;
    let file = form.spreadsheet()?;
    let column = selected_column(form.column.take())?;

    let worker = state.clone();
    let labels = tokio::task::spawn_blocking(move || -> Result<Vec<Label>, AppError> {
        let stored = store_upload(&worker.upload_dir, &file)?;
        let outcome = load_table(stored.path())
            .map_err(ClassifyError::from)
            .and_then(|table| {
                worker
                    .settings
                    .classifier()
                    .classify_column(&worker.model, &table, &column)
            });
        if let Err(e) = stored.close() {
            warn!("Failed to remove temporary file: {}", e);
        }
        Ok(outcome?)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(Json(Report::from_labels(&labels, state.settings.colors)))
}
