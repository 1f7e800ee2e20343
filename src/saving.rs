use crate::dashboard::DashboardData;
use crate::error::{DashboardError, Result};
use log::info;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

pub const SNAPSHOT_NAMES: [&str; 4] = [
    "broker_data",
    "weekly_data",
    "monthly_data",
    "daily_cost_data",
];

const LIFECAR_DIR: &str = "database_lifecar";
const LIFECAR_FILE: &str = "lifecar-data.csv";

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Write each dashboard table to `<public_dir>/<name>.json`.
pub fn write_snapshots(public_dir: &Path, data: &DashboardData) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(public_dir)?;

    let paths: Vec<PathBuf> = SNAPSHOT_NAMES
        .iter()
        .map(|name| public_dir.join(format!("{name}.json")))
        .collect();

    write_json(&paths[0], &data.broker_data)?;
    write_json(&paths[1], &data.weekly_data)?;
    write_json(&paths[2], &data.monthly_data)?;
    write_json(&paths[3], &data.daily_cost_data)?;

    let counts = data.record_counts();
    info!(
        "Saved {} broker, {} weekly, {} monthly, {} daily cost records",
        counts.broker_data, counts.weekly_data, counts.monthly_data, counts.daily_cost_data
    );
    Ok(paths)
}

/// Read one snapshot. A snapshot that was never written reads as `[]`.
pub fn read_snapshot(public_dir: &Path, name: &str) -> Result<Value> {
    if !SNAPSHOT_NAMES.contains(&name) {
        return Err(DashboardError::UnknownSnapshot(name.to_string()));
    }

    let path = public_dir.join(format!("{name}.json"));
    if !path.exists() {
        return Ok(Value::Array(Vec::new()));
    }
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn lifecar_csv_path(public_dir: &Path) -> PathBuf {
    public_dir.join(LIFECAR_DIR).join(LIFECAR_FILE)
}

/// Keep the uploaded LifeCAR export verbatim for later reports.
pub fn save_lifecar_csv(public_dir: &Path, text: &str) -> Result<PathBuf> {
    let path = lifecar_csv_path(public_dir);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, text)?;
    info!("LifeCAR CSV saved to: {}", path.display());
    Ok(path)
}

pub fn load_lifecar_csv(public_dir: &Path) -> Result<Option<String>> {
    let path = lifecar_csv_path(public_dir);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(fs::read_to_string(path)?))
}

/// Snapshots read from disk, kept until the next refresh.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: RwLock<HashMap<String, Arc<Value>>>,
    // bumped by every clear; a read that started before a clear is not cached
    generation: AtomicU64,
}

impl SnapshotCache {
    pub fn new() -> Self {
        SnapshotCache::default()
    }

    pub fn get_or_load(&self, public_dir: &Path, name: &str) -> Result<Arc<Value>> {
        if let Some(value) = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
        {
            return Ok(Arc::clone(value));
        }

        let generation = self.generation.load(Ordering::Acquire);
        let value = Arc::new(read_snapshot(public_dir, name)?);
        self.insert_if_current(name, Arc::clone(&value), generation);
        Ok(value)
    }

    fn insert_if_current(&self, name: &str, value: Arc<Value>, generation: u64) -> bool {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        entries.insert(name.to_string(), value);
        true
    }

    pub fn clear(&self) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
