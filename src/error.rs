use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error(
        "Failed to read Excel file {}: {reason}. Please close the file in Excel if it's open.",
        path.display()
    )]
    FileLocked { path: PathBuf, reason: String },

    #[error("Failed to read workbook: {0}")]
    Workbook(#[from] calamine::XlsxError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No file provided")]
    MissingUpload,

    /// The multipart body itself could not be read. `status` is the HTTP
    /// status the upload layer chose, e.g. 413 past the body limit.
    #[error("Failed to read upload: {reason}")]
    UploadBody { status: u16, reason: String },

    #[error("Invalid file type. Please upload an Excel (.xlsx, .xlsm) or CSV file")]
    InvalidUpload(String),

    #[error("CSV file is empty")]
    EmptyCsv,

    #[error("Error running refresh script: {0}")]
    Refresh(String),

    #[error("Unknown snapshot: {0}")]
    UnknownSnapshot(String),
}

impl DashboardError {
    /// Upload validation failures are the caller's fault; everything else is ours.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DashboardError::MissingUpload
                | DashboardError::InvalidUpload(_)
                | DashboardError::UploadBody { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
