use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::process::Command;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::cell::Row;
use crate::config::Config;
use crate::dashboard::{self, DashboardData, RecordCounts};
use crate::dates;
use crate::error::{DashboardError, Result};
use crate::lifecar;
use crate::loader::{self, UploadKind};
use crate::saving::{self, SnapshotCache};

pub struct AppState {
    pub config: Config,
    pub cache: SnapshotCache,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        AppState {
            config,
            cache: SnapshotCache::new(),
        }
    }
}

#[derive(Serialize)]
struct DataResponse<T> {
    message: String,
    data: T,
    timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse<T> {
    message: String,
    data: T,
    filename: String,
    record_counts: RecordCounts,
}

/// What a LifeCAR CSV upload hands back: the raw rows, in the slots the
/// dashboard reads them from.
#[derive(Serialize)]
struct CsvUploadData {
    broker_data: Vec<Row>,
    weekly_data: Vec<Row>,
    monthly_data: Vec<Row>,
    daily_cost_data: Vec<Row>,
    lifecar_data: Vec<Row>,
}

#[derive(Serialize)]
struct RefreshResponse {
    success: bool,
    message: String,
    output: String,
}

#[derive(Deserialize)]
struct RangeQuery {
    start: Option<String>,
    end: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let public_dir = state.config.public_dir.clone();
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/api/excel-data", get(get_excel_data).post(upload_excel_data))
        .route("/api/refresh-data", post(refresh_data))
        .route("/api/snapshot/:name", get(get_snapshot))
        .route("/api/lifecar", get(get_lifecar))
        .route("/api/brokers", get(get_brokers))
        .fallback_service(ServeDir::new(public_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let bind = config.bind;
    let app = router(Arc::new(AppState::new(config)));

    let listener = TcpListener::bind(bind).await?;
    info!("Listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

fn error_response(status: StatusCode, message: &str, err: &DashboardError) -> Response {
    (
        status,
        Json(json!({
            "error": message,
            "details": err.to_string(),
        })),
    )
        .into_response()
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Run blocking workbook I/O and parsing off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DashboardError::Io(std::io::Error::other(e)))?
}

/// Read and process the configured local workbook.
async fn load_local(state: &AppState) -> Result<DashboardData> {
    let path = state.config.data_file.clone();
    let policy = state.config.retry_policy();
    let options = state.config.process_options();

    blocking(move || {
        let workbook = loader::load_workbook(&path, policy)?;
        Ok(dashboard::process_workbook(&workbook, &options))
    })
    .await
}

async fn get_excel_data(State(state): State<Arc<AppState>>) -> Response {
    info!("Attempting to read file: {}", state.config.data_file.display());

    match load_local(&state).await {
        Ok(data) => Json(DataResponse {
            message: "Data processed successfully".to_string(),
            data,
            timestamp: timestamp(),
        })
        .into_response(),
        Err(DashboardError::FileNotFound(path)) => {
            info!("File not found, returning empty data: {}", path.display());
            Json(DataResponse {
                message: "No local data file found. Please upload an Excel file to populate the dashboard."
                    .to_string(),
                data: DashboardData::default(),
                timestamp: timestamp(),
            })
            .into_response()
        }
        Err(e) => {
            error!("Error reading Excel file: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read Excel file", &e)
        }
    }
}

struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

fn upload_body_error(e: MultipartError) -> DashboardError {
    DashboardError::UploadBody {
        status: e.status().as_u16(),
        reason: e.body_text(),
    }
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(upload_body_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(upload_body_error)?;
                upload = Some(Upload {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            "accountType" => {
                let account = field.text().await.map_err(upload_body_error)?;
                info!("Account Type: {}", account);
            }
            _ => {}
        }
    }

    upload.ok_or(DashboardError::MissingUpload)
}

fn upload_status(e: &DashboardError) -> StatusCode {
    match e {
        DashboardError::UploadBody { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
        }
        _ => StatusCode::BAD_REQUEST,
    }
}

async fn upload_excel_data(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    info!("POST /api/excel-data called");

    let upload = match read_upload(&mut multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            warn!("Rejected upload: {}", e);
            return error_response(upload_status(&e), &e.to_string(), &e);
        }
    };

    let kind = match UploadKind::from_filename(&upload.filename) {
        Ok(kind) => kind,
        Err(e) => {
            warn!("Invalid file type: {}", upload.filename);
            return error_response(StatusCode::BAD_REQUEST, &e.to_string(), &e);
        }
    };

    info!(
        "Processing file: {} Size: {}",
        upload.filename,
        upload.bytes.len()
    );

    let result = match kind {
        UploadKind::Excel => process_excel_upload(&state, upload).await,
        UploadKind::Csv => process_csv_upload(&state, upload).await,
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            error!("Error processing uploaded file: {}", e);
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            error_response(status, "Failed to process uploaded file", &e)
        }
    }
}

async fn process_excel_upload(state: &AppState, upload: Upload) -> Result<Response> {
    let options = state.config.process_options();
    let Upload { filename, bytes } = upload;

    let data = blocking(move || {
        let workbook = loader::from_excel_bytes(&bytes)?;
        Ok(dashboard::process_workbook(&workbook, &options))
    })
    .await?;

    Ok(Json(UploadResponse {
        message: "File uploaded and processed successfully".to_string(),
        record_counts: data.record_counts(),
        data,
        filename,
    })
    .into_response())
}

async fn process_csv_upload(state: &AppState, upload: Upload) -> Result<Response> {
    let public_dir = state.config.public_dir.clone();
    let Upload { filename, bytes } = upload;

    let table = blocking(move || {
        let table = loader::from_csv_bytes(&bytes)?;
        saving::save_lifecar_csv(&public_dir, &table.text)?;
        Ok(table)
    })
    .await?;

    let record_counts = RecordCounts {
        daily_cost_data: table.rows.len(),
        ..RecordCounts::default()
    };

    Ok(Json(UploadResponse {
        message: "File uploaded and processed successfully".to_string(),
        data: CsvUploadData {
            broker_data: Vec::new(),
            weekly_data: Vec::new(),
            monthly_data: Vec::new(),
            daily_cost_data: table.rows.clone(),
            lifecar_data: table.rows,
        },
        filename,
        record_counts,
    })
    .into_response())
}

async fn run_refresh_command(command: &str) -> Result<String> {
    info!("Refreshing data using: {}", command);

    #[cfg(windows)]
    let output = Command::new("cmd").args(["/C", command]).output().await?;
    #[cfg(not(windows))]
    let output = Command::new("sh").arg("-c").arg(command).output().await?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        return Err(DashboardError::Refresh(stderr));
    }
    if !output.status.success() {
        return Err(DashboardError::Refresh(format!("exited with {}", output.status)));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn refresh_in_process(state: &AppState) -> Result<String> {
    let data = load_local(state).await?;
    let public_dir = state.config.public_dir.clone();

    blocking(move || {
        let paths = saving::write_snapshots(&public_dir, &data)?;
        let counts = data.record_counts();
        Ok(format!(
            "Saved {} broker, {} weekly, {} monthly, {} daily cost records to {} files\n",
            counts.broker_data,
            counts.weekly_data,
            counts.monthly_data,
            counts.daily_cost_data,
            paths.len()
        ))
    })
    .await
}

async fn refresh_data(State(state): State<Arc<AppState>>) -> Response {
    let result = match state.config.refresh_command.as_deref() {
        Some(command) => run_refresh_command(command).await,
        None => refresh_in_process(&state).await,
    };

    match result {
        Ok(output) => {
            state.cache.clear();
            Json(RefreshResponse {
                success: true,
                message: "Data refreshed successfully".to_string(),
                output,
            })
            .into_response()
        }
        Err(e) => {
            error!("Refresh failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": "Error running refresh script",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

async fn get_snapshot(Path(name): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let loaded = {
        let state = Arc::clone(&state);
        blocking(move || state.cache.get_or_load(&state.config.public_dir, &name)).await
    };

    match loaded {
        Ok(value) => Json(value.as_ref().clone()).into_response(),
        Err(e @ DashboardError::UnknownSnapshot(_)) => {
            error_response(StatusCode::NOT_FOUND, "Unknown snapshot", &e)
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read snapshot", &e),
    }
}

fn parse_bound(value: Option<&str>) -> Result<Option<chrono::NaiveDate>> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(dates::parse_date_text)
        .transpose()
}

async fn get_lifecar(State(state): State<Arc<AppState>>, Query(range): Query<RangeQuery>) -> Response {
    let bounds = parse_bound(range.start.as_deref())
        .and_then(|start| Ok((start, parse_bound(range.end.as_deref())?)));
    let (start, end) = match bounds {
        Ok(bounds) => bounds,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "Invalid date range", &e),
    };

    let public_dir = state.config.public_dir.clone();
    match blocking(move || saving::load_lifecar_csv(&public_dir)).await {
        Ok(Some(text)) => Json(lifecar::build_report(&text, start, end)).into_response(),
        Ok(None) => Json(lifecar::LifecarReport::default()).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read LifeCAR data", &e),
    }
}

async fn get_brokers(State(state): State<Arc<AppState>>) -> Response {
    match load_local(&state).await {
        Ok(data) => Json(dashboard::overview(&data)).into_response(),
        Err(DashboardError::FileNotFound(_)) => {
            Json(dashboard::overview(&DashboardData::default())).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read Excel file", &e),
    }
}
