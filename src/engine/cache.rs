//! Cross-session record of commented URNs.
//!
//! The on-disk file maps URN to the Unix timestamp (seconds) of the last
//! successful comment. Entries older than the retention window are ignored on
//! read and dropped the next time the file is written.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheFile {
    #[serde(default)]
    pub commented_urns_ts: BTreeMap<String, f64>,
}

/// Where the cache file lives. `load` returns `Ok(None)` for a missing store.
pub trait CacheStorage: Send {
    fn load(&self) -> Result<Option<CacheFile>>;
    fn save(&self, file: &CacheFile) -> Result<()>;
}

pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl CacheStorage for JsonFileStorage {
    fn load(&self) -> Result<Option<CacheFile>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read cache file: {}", self.path.display())))
            }
        };
        let file: CacheFile = serde_json::from_str(&content)
            .with_context(|| format!("Malformed cache file: {}", self.path.display()))?;
        Ok(Some(file))
    }

    fn save(&self, file: &CacheFile) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(file)?;
        // Readers never observe a partially written file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write cache file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace cache file: {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory storage holding raw JSON text, shareable between clones.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    raw: Arc<Mutex<Option<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raw(raw: &str) -> Self {
        Self { raw: Arc::new(Mutex::new(Some(raw.to_string()))) }
    }

    pub fn raw(&self) -> Option<String> {
        self.raw.lock().ok().and_then(|g| g.as_ref().cloned())
    }
}

impl CacheStorage for MemoryStorage {
    fn load(&self) -> Result<Option<CacheFile>> {
        let Some(raw) = self.raw() else {
            return Ok(None);
        };
        let file = serde_json::from_str(&raw).context("Malformed cache contents")?;
        Ok(Some(file))
    }

    fn save(&self, file: &CacheFile) -> Result<()> {
        let json = serde_json::to_string(file)?;
        let mut guard = self
            .raw
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache lock poisoned"))?;
        *guard = Some(json);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct PersistentCache {
    commented: HashMap<String, DateTime<Utc>>,
}

impl PersistentCache {
    pub fn from_file(file: &CacheFile) -> Self {
        let commented = file
            .commented_urns_ts
            .iter()
            .filter_map(|(urn, ts)| epoch_to_datetime(*ts).map(|dt| (urn.clone(), dt)))
            .collect();
        Self { commented }
    }

    /// Serialize, dropping entries already past retention at `now`.
    pub fn to_file(&self, now: DateTime<Utc>) -> CacheFile {
        let commented_urns_ts = self
            .commented
            .iter()
            .filter(|(_, at)| is_fresh(**at, now))
            .map(|(urn, at)| (urn.clone(), at.timestamp_millis() as f64 / 1000.0))
            .collect();
        CacheFile { commented_urns_ts }
    }

    pub fn commented_within_retention(&self, urn: &str, now: DateTime<Utc>) -> bool {
        self.commented.get(urn).is_some_and(|at| is_fresh(*at, now))
    }

    pub fn record_comment(&mut self, urn: &str, at: DateTime<Utc>) {
        self.commented.insert(urn.to_string(), at);
    }

    pub fn len(&self) -> usize {
        self.commented.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commented.is_empty()
    }
}

fn is_fresh(at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(at) < Duration::days(RETENTION_DAYS)
}

fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt((secs * 1000.0) as i64).single()
}
