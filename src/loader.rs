use crate::cell::{CellValue, Row};
use crate::error::{DashboardError, Result};
use crate::spreadsheet::{Sheet, Workbook};
use calamine::{Data, Reader, Xlsx};
use log::{debug, info, warn};
use std::fs;
use std::collections::HashMap;
use std::io::{self, Cursor, ErrorKind};
use std::path::Path;
use std::thread;
use std::time::Duration;

/// How hard to try when the local workbook is held open by another program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Kind of file accepted by the upload endpoint, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Excel,
    Csv,
}

impl UploadKind {
    pub fn from_filename(filename: &str) -> Result<Self> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        match extension.as_deref() {
            Some("xlsx") | Some("xlsm") => Ok(UploadKind::Excel),
            Some("csv") => Ok(UploadKind::Csv),
            _ => Err(DashboardError::InvalidUpload(filename.to_string())),
        }
    }
}

/// Parse an in-memory `.xlsx`/`.xlsm` workbook.
///
/// Each sheet's first row becomes the header; later rows become [`Row`]s
/// keyed by those headers, with blank cells left out and blank rows dropped.
/// A sheet that fails to parse is logged and skipped.
pub fn from_excel_bytes(bytes: &[u8]) -> Result<Workbook> {
    debug!("Processing Excel buffer, size: {}", bytes.len());
    let mut excel: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;

    let names = excel.sheet_names();
    info!("Available sheets: {:?}", names);

    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        match excel.worksheet_range(&name) {
            Ok(range) => {
                let rows: Vec<Vec<CellValue>> = range
                    .rows()
                    .map(|row| row.iter().map(cell_value).collect())
                    .collect();
                sheets.push(Sheet::new(name, rows_to_records(rows)));
            }
            Err(e) => warn!("Skipping sheet {:?}: {}", name, e),
        }
    }

    Ok(Workbook::new(sheets))
}

fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) if s.trim().is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        // Date-formatted cells keep their serial so they resolve like any other number
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        _ => CellValue::Empty,
    }
}

fn rows_to_records(rows: Vec<Vec<CellValue>>) -> Vec<Row> {
    let mut rows = rows.into_iter();
    let Some(header_row) = rows.next() else {
        return Vec::new();
    };

    let mut seen: HashMap<String, usize> = HashMap::new();
    let headers: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(col, cell)| {
            let header = cell
                .as_text()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| format!("__EMPTY_{col}"));
            let count = seen.entry(header.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                header
            } else {
                // repeated headers become `Week_1`, `Week_2`, ...
                let renamed = format!("{header}_{}", *count - 1);
                debug!("Duplicate header {:?} renamed to {:?}", header, renamed);
                renamed
            }
        })
        .collect();

    rows.filter_map(|cells| {
        let row: Row = headers
            .iter()
            .zip(cells)
            .filter(|(_, value)| *value != CellValue::Empty)
            .map(|(header, value)| (header.clone(), value))
            .collect();
        (!row.is_empty()).then_some(row)
    })
    .collect()
}

fn is_retryable(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ResourceBusy | ErrorKind::WouldBlock | ErrorKind::NotFound
    )
}

/// Read a local file, retrying busy/vanished reads per `policy`.
///
/// A file that is absent before the first attempt is [`DashboardError::FileNotFound`];
/// failures after that surface as [`DashboardError::FileLocked`].
pub fn read_with_retry(path: &Path, policy: RetryPolicy) -> Result<Vec<u8>> {
    read_with_retry_using(path, policy, |p| fs::read(p))
}

fn read_with_retry_using<F>(path: &Path, policy: RetryPolicy, mut read: F) -> Result<Vec<u8>>
where
    F: FnMut(&Path) -> io::Result<Vec<u8>>,
{
    if !path.exists() {
        return Err(DashboardError::FileNotFound(path.to_path_buf()));
    }

    let mut attempt = 1;
    loop {
        match read(path) {
            Ok(bytes) => return Ok(bytes),
            Err(e) if is_retryable(e.kind()) && attempt < policy.attempts => {
                warn!(
                    "File busy/not found, retrying... ({} attempts left)",
                    policy.attempts - attempt
                );
                thread::sleep(policy.delay);
                attempt += 1;
            }
            Err(e) => {
                return Err(DashboardError::FileLocked {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Read and parse the workbook at `path`.
pub fn load_workbook(path: &Path, policy: RetryPolicy) -> Result<Workbook> {
    info!("Processing Excel file: {}", path.display());
    let bytes = read_with_retry(path, policy)?;
    from_excel_bytes(&bytes)
}

/// A parsed CSV export: the BOM-stripped text plus header-keyed rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvTable {
    pub text: String,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

fn is_summary_row(fields: &csv::StringRecord) -> bool {
    fields.get(0).is_some_and(|first| first.starts_with("合计"))
        || fields.iter().any(|field| field.contains("条记录"))
}

/// Parse a CSV export. Summary rows such as `合计104条记录` and blank lines
/// are dropped; missing trailing fields become empty text.
pub fn from_csv_bytes(bytes: &[u8]) -> Result<CsvTable> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text).to_string();

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.iter().all(String::is_empty) {
        return Err(DashboardError::EmptyCsv);
    }
    debug!("CSV Headers: {:?}", headers);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        if is_summary_row(&record) {
            debug!("Skipping summary row: {:?}", record.get(0));
            continue;
        }
        let row: Row = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                (
                    header.clone(),
                    CellValue::Text(record.get(i).unwrap_or_default().to_string()),
                )
            })
            .collect();
        rows.push(row);
    }

    info!("Parsed {} data rows from CSV", rows.len());
    Ok(CsvTable {
        text,
        headers,
        rows,
    })
}
