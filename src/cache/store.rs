//! On-disk returns cache for baseline alphas
//!
//! Layout under the cache root:
//!
//! ```text
//! index.json                      metadata per alpha plus synced scopes
//! alphas/<alpha_id>/daily-pnl.json  return series of one alpha
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so a
//! reader (or a crash) sees either the previous or the new version. The series
//! file is committed before the index entry that points at it; an index entry
//! whose series file is missing is dropped on load.
//!
//! The index is rewritten every [`INDEX_CHECKPOINT`] changes and on
//! [`ReturnsCache::flush`] or [`ReturnsCache::mark_synced`], not on every
//! change. File I/O runs on the blocking pool.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tokio::task;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::models::{AlphaId, AlphaStats, CachedAlphaEntry, ReturnSeries, SyncScope};

pub const INDEX_VERSION: u32 = 1;
const INDEX_FILE: &str = "index.json";
const ALPHAS_DIR: &str = "alphas";
const SERIES_FILE: &str = "daily-pnl.json";
/// Unsaved index changes that force an index write
pub const INDEX_CHECKPOINT: usize = 32;

/// Entry metadata persisted in the index (everything except the series)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IndexEntry {
    name: Option<String>,
    region: String,
    universe: Option<String>,
    instrument_type: Option<String>,
    is_power_pool: bool,
    is_self: bool,
    stats: AlphaStats,
}

impl IndexEntry {
    fn from_entry(entry: &CachedAlphaEntry) -> Self {
        Self {
            name: entry.name.clone(),
            region: entry.region.clone(),
            universe: entry.universe.clone(),
            instrument_type: entry.instrument_type.clone(),
            is_power_pool: entry.is_power_pool,
            is_self: entry.is_self,
            stats: entry.stats,
        }
    }

    fn into_entry(self, id: AlphaId, series: ReturnSeries) -> CachedAlphaEntry {
        CachedAlphaEntry {
            id,
            name: self.name,
            region: self.region,
            universe: self.universe,
            instrument_type: self.instrument_type,
            is_power_pool: self.is_power_pool,
            is_self: self.is_self,
            stats: self.stats,
            series,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    alphas: BTreeMap<AlphaId, IndexEntry>,
    /// Scope key to the time its baseline last changed
    #[serde(default)]
    scopes: BTreeMap<String, DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<AlphaId, Arc<CachedAlphaEntry>>,
    scopes: BTreeMap<String, DateTime<Utc>>,
    /// Changes not yet reflected in the index file
    unsaved: usize,
}

/// Baseline entries keyed by alpha id, mirrored to disk.
///
/// Readers take `Arc` snapshots, so an entry replaced by a sync never changes
/// under an evaluation already holding it.
pub struct ReturnsCache {
    root: PathBuf,
    state: RwLock<CacheState>,
}

impl ReturnsCache {
    /// Open (or create) the cache rooted at `root` and load what is on disk
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_error(&root, e))?;

        let state = Self::load(&root)?;
        info!(
            root = %root.display(),
            alphas = state.entries.len(),
            scopes = state.scopes.len(),
            "ReturnsCache: opened with {} alphas",
            state.entries.len()
        );

        Ok(Self {
            root,
            state: RwLock::new(state),
        })
    }

    fn load(root: &Path) -> Result<CacheState, CacheError> {
        let index_path = root.join(INDEX_FILE);
        if !index_path.exists() {
            return Ok(CacheState::default());
        }

        let index: IndexFile = read_json(&index_path)?;
        if index.version != INDEX_VERSION {
            warn!(
                found = index.version,
                expected = INDEX_VERSION,
                "ReturnsCache: index version {} unsupported, starting empty",
                index.version
            );
            return Ok(CacheState::default());
        }

        let mut entries = HashMap::with_capacity(index.alphas.len());
        for (id, meta) in index.alphas {
            let series_path = series_path(root, &id);
            if !series_path.exists() {
                warn!(alpha_id = %id, "ReturnsCache: series for {} missing, treating as miss", id);
                continue;
            }
            match read_json::<ReturnSeries>(&series_path) {
                Ok(series) => {
                    entries.insert(id.clone(), Arc::new(meta.into_entry(id, series)));
                }
                Err(e) => {
                    warn!(alpha_id = %id, error = %e, "ReturnsCache: unreadable series for {}, treating as miss", id);
                }
            }
        }

        Ok(CacheState {
            entries,
            scopes: index.scopes,
            unsaved: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn get(&self, alpha_id: &AlphaId) -> Option<Arc<CachedAlphaEntry>> {
        self.state.read().await.entries.get(alpha_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Entries belonging to `scope`, ordered by alpha id
    pub async fn snapshot(&self, scope: &SyncScope) -> Vec<Arc<CachedAlphaEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<_> = state
            .entries
            .values()
            .filter(|e| e.in_scope(scope))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    /// Insert or replace an entry
    pub async fn put(&self, entry: CachedAlphaEntry) -> Result<Arc<CachedAlphaEntry>, CacheError> {
        let path = series_path(&self.root, &entry.id);
        let bytes = to_json(&path, &entry.series)?;

        let mut state = self.state.write().await;
        write_atomic(path, bytes).await?;

        let entry = Arc::new(entry);
        state.entries.insert(entry.id.clone(), entry.clone());
        self.record_change(&mut state).await?;

        debug!(alpha_id = %entry.id, points = entry.series.len(), "ReturnsCache: stored {}", entry.id);
        Ok(entry)
    }

    /// Replace an entry's metadata, keeping its series file untouched
    pub async fn update_metadata(
        &self,
        entry: CachedAlphaEntry,
    ) -> Result<Arc<CachedAlphaEntry>, CacheError> {
        let mut state = self.state.write().await;
        let entry = Arc::new(entry);
        state.entries.insert(entry.id.clone(), entry.clone());
        self.record_change(&mut state).await?;
        Ok(entry)
    }

    /// Remove an entry; returns whether it existed
    pub async fn remove(&self, alpha_id: &AlphaId) -> Result<bool, CacheError> {
        let mut state = self.state.write().await;
        if state.entries.remove(alpha_id).is_none() {
            return Ok(false);
        }
        self.record_change(&mut state).await?;

        let dir = self.root.join(ALPHAS_DIR).join(alpha_id.as_str());
        let target = dir.clone();
        let removed = task::spawn_blocking(move || fs::remove_dir_all(&target))
            .await
            .map_err(|e| io_error(&dir, std::io::Error::other(e)))?;
        match removed {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&dir, e)),
        }

        debug!(alpha_id = %alpha_id, "ReturnsCache: removed {}", alpha_id);
        Ok(true)
    }

    /// Record that `scope` has a usable baseline.
    ///
    /// The timestamp moves only when the scope is new or its contents changed.
    /// Pending index changes are written either way.
    pub async fn mark_synced(&self, scope: &SyncScope, changed: bool) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        let key = scope.key();
        if !changed && state.scopes.contains_key(&key) {
            if state.unsaved > 0 {
                self.write_index(&mut state).await?;
            }
            return Ok(());
        }
        state.scopes.insert(key, Utc::now());
        self.write_index(&mut state).await
    }

    /// Write pending index changes to disk
    pub async fn flush(&self) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        if state.unsaved == 0 {
            return Ok(());
        }
        self.write_index(&mut state).await
    }

    pub async fn is_synced(&self, scope: &SyncScope) -> bool {
        self.state.read().await.scopes.contains_key(&scope.key())
    }

    pub async fn synced_at(&self, scope: &SyncScope) -> Option<DateTime<Utc>> {
        self.state.read().await.scopes.get(&scope.key()).copied()
    }

    /// Scope keys with a synced baseline, e.g. `USA/power-pool`
    pub async fn synced_scopes(&self) -> Vec<String> {
        self.state.read().await.scopes.keys().cloned().collect()
    }

    async fn record_change(&self, state: &mut CacheState) -> Result<(), CacheError> {
        state.unsaved += 1;
        if state.unsaved >= INDEX_CHECKPOINT {
            self.write_index(state).await?;
        }
        Ok(())
    }

    async fn write_index(&self, state: &mut CacheState) -> Result<(), CacheError> {
        let index = IndexFile {
            version: INDEX_VERSION,
            updated_at: Utc::now(),
            alphas: state
                .entries
                .iter()
                .map(|(id, e)| (id.clone(), IndexEntry::from_entry(e)))
                .collect(),
            scopes: state.scopes.clone(),
        };
        let path = self.root.join(INDEX_FILE);
        let bytes = to_json(&path, &index)?;
        write_atomic(path, bytes).await?;

        debug!(alphas = state.entries.len(), changes = state.unsaved, "ReturnsCache: index written");
        state.unsaved = 0;
        Ok(())
    }
}

fn series_path(root: &Path, alpha_id: &AlphaId) -> PathBuf {
    root.join(ALPHAS_DIR).join(alpha_id.as_str()).join(SERIES_FILE)
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CacheError> {
    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| CacheError::Json {
        path: path.display().to_string(),
        source,
    })
}

fn to_json<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec(value).map_err(|source| CacheError::Json {
        path: path.display().to_string(),
        source,
    })
}

async fn write_atomic(path: PathBuf, bytes: Vec<u8>) -> Result<(), CacheError> {
    let display = path.clone();
    task::spawn_blocking(move || write_bytes_atomic(&path, &bytes))
        .await
        .map_err(|e| io_error(&display, std::io::Error::other(e)))?
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

    let tmp = NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    let mut writer = BufWriter::new(tmp);
    writer.write_all(bytes).map_err(|e| io_error(path, e))?;
    writer.flush().map_err(|e| io_error(path, e))?;

    let tmp = writer
        .into_inner()
        .map_err(|e| io_error(path, e.into_error()))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}
