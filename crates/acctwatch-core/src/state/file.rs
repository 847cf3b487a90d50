// # File Watch Registry
//
// File-based implementation of WatchRegistry with crash recovery.
//
// ## Purpose
//
// Keeps the watch list across daemon restarts and crashes.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good document
// - Recovery: Falls back to backup if corruption detected
//
// ## Commit Model
//
// Every mutation is applied to a copy of the table, the copy is written to
// disk, and only then swapped in. A failed write leaves both the file and
// the in-memory table exactly as they were, so no caller ever observes a
// half-applied entity.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "next_seq": 2,
//   "entities": {
//     "alice": {
//       "id": "alice",
//       "state": "ACTIVE",
//       "active": true,
//       "target": "general",
//       "last_checked_at": "2025-01-09T12:00:00Z",
//       "created_at": "2025-01-09T11:55:00Z",
//       "seq": 0
//     }
//   }
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::RegistryConfig;
use crate::state::table::EntityTable;
use crate::traits::{
    EntityFilter, EntityState, NotificationTarget, WatchRegistry, WatchRegistryFactory,
    WatchedEntity,
};

/// Registry file format version
/// Used for future migration if format changes
const REGISTRY_FILE_VERSION: &str = "1.0";

/// File-based watch registry with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use acctwatch_core::state::FileWatchRegistry;
/// use acctwatch_core::traits::{NotificationTarget, WatchRegistry};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = FileWatchRegistry::new("/var/lib/acctwatch/data.json").await?;
///
///     // Written to disk before returning
///     registry.upsert("alice", &NotificationTarget::new("general")).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileWatchRegistry {
    path: PathBuf,
    table: Arc<RwLock<EntityTable>>,
}

/// Serializable registry file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct RegistryFileFormat {
    version: String,
    #[serde(flatten)]
    table: EntityTable,
}

impl FileWatchRegistry {
    /// Create or load a file registry
    ///
    /// This will:
    /// 1. Try to load the existing registry file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with an empty registry
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create registry directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let mut table = Self::load_with_recovery(&path).await?;
        table.normalize();

        Ok(Self {
            path,
            table: Arc::new(RwLock::new(table)),
        })
    }

    /// Load the registry with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load the main file
    /// 2. If it does not parse, try loading the backup
    /// 3. If the backup also fails, start empty
    async fn load_with_recovery(path: &Path) -> Result<EntityTable, Error> {
        match Self::load(path).await {
            Ok(table) => {
                tracing::debug!("Loaded registry from file: {} entities", table.len());
                Ok(table)
            }
            Err(LoadError::Corrupt(e)) => {
                tracing::warn!(
                    "Registry file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty registry.");
                    return Ok(EntityTable::default());
                }

                match Self::load(&backup_path).await {
                    Ok(table) => {
                        tracing::info!("Recovered registry from backup: {} entities", table.len());

                        if let Err(restore_err) = Self::restore_from_backup(path, &backup_path).await
                        {
                            tracing::error!(
                                "Failed to restore registry file from backup: {}",
                                restore_err
                            );
                        }

                        Ok(table)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unreadable: {}. Starting with empty registry.",
                            backup_err
                        );
                        Ok(EntityTable::default())
                    }
                }
            }
            Err(LoadError::Io(e)) => Err(e),
        }
    }

    /// Load the registry from one file
    async fn load(path: &Path) -> Result<EntityTable, LoadError> {
        if !path.exists() {
            tracing::debug!("Registry file does not exist: {}", path.display());
            return Ok(EntityTable::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadError::Io(Error::registry(format!(
                "Failed to read registry file {}: {}",
                path.display(),
                e
            )))
        })?;

        let file: RegistryFileFormat = serde_json::from_str(&content).map_err(|e| {
            LoadError::Corrupt(Error::registry(format!(
                "Failed to parse registry file {}: {}",
                path.display(),
                e
            )))
        })?;

        if file.version != REGISTRY_FILE_VERSION {
            tracing::warn!(
                "Registry file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                REGISTRY_FILE_VERSION,
                file.version
            );
        }

        Ok(file.table)
    }

    /// Write a table to disk atomically
    async fn write_table(&self, table: &EntityTable) -> Result<(), Error> {
        let file = RegistryFileFormat {
            version: REGISTRY_FILE_VERSION.to_string(),
            table: table.clone(),
        };

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::registry(format!("Failed to serialize registry: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut handle = fs::File::create(&temp_path).await.map_err(|e| {
                Error::registry(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            handle.write_all(json.as_bytes()).await.map_err(|e| {
                Error::registry(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            handle.sync_all().await.map_err(|e| {
                Error::registry(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::registry(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Registry written to file: {}", self.path.display());
        Ok(())
    }

    /// Apply a mutation, persist it, then publish it
    ///
    /// `mutate` returns its result and whether anything changed; unchanged
    /// tables are not rewritten. The write lock is held across the disk
    /// write so concurrent commits serialize.
    async fn commit<T, F>(&self, mutate: F) -> Result<T, Error>
    where
        F: FnOnce(&mut EntityTable) -> (T, bool) + Send,
        T: Send,
    {
        let mut guard = self.table.write().await;
        let mut next = guard.clone();
        let (result, changed) = mutate(&mut next);

        if changed {
            self.write_table(&next).await?;
            *guard = next;
        }

        Ok(result)
    }

    /// Restore the registry file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::registry(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored registry file from backup");
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Path of the registry document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Force immediate write to disk
    pub async fn sync(&self) -> Result<(), Error> {
        let guard = self.table.write().await;
        self.write_table(&guard).await
    }
}

/// Distinguishes unreadable files from files that read but do not parse
enum LoadError {
    Io(Error),
    Corrupt(Error),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) | LoadError::Corrupt(e) => e.fmt(f),
        }
    }
}

#[async_trait]
impl WatchRegistry for FileWatchRegistry {
    async fn upsert(&self, id: &str, target: &NotificationTarget) -> Result<WatchedEntity, Error> {
        self.commit(|table| (table.upsert(id, target), true)).await
    }

    async fn deactivate(&self, id: &str) -> Result<bool, Error> {
        self.commit(|table| match table.deactivate(id) {
            Some(changed) => (true, changed),
            None => (false, false),
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<WatchedEntity>, Error> {
        let guard = self.table.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn list_by(&self, filter: EntityFilter<'_>) -> Result<Vec<WatchedEntity>, Error> {
        let guard = self.table.read().await;
        Ok(guard.list_by(filter))
    }

    async fn record_observation(
        &self,
        id: &str,
        state: EntityState,
        observed_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        self.commit(|table| {
            let applied = table.record(id, state, observed_at);
            (applied, applied)
        })
        .await
    }

    async fn record_first_observation(
        &self,
        id: &str,
        state: EntityState,
        observed_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        self.commit(|table| {
            let applied = table.record_if_unknown(id, state, observed_at);
            (applied, applied)
        })
        .await
    }

    async fn retarget(
        &self,
        from: &NotificationTarget,
        to: &NotificationTarget,
    ) -> Result<usize, Error> {
        self.commit(|table| {
            let moved = table.retarget(from, to);
            (moved, moved > 0)
        })
        .await
    }

    async fn remove(&self, id: &str) -> Result<bool, Error> {
        self.commit(|table| {
            let existed = table.remove(id);
            (existed, existed)
        })
        .await
    }

    async fn flush(&self) -> Result<(), Error> {
        // Every commit is already on disk
        Ok(())
    }
}

/// Factory for file-backed registries
pub struct FileWatchRegistryFactory;

#[async_trait]
impl WatchRegistryFactory for FileWatchRegistryFactory {
    async fn create(&self, config: &RegistryConfig) -> Result<Arc<dyn WatchRegistry>, Error> {
        match config {
            RegistryConfig::File { path } => Ok(Arc::new(FileWatchRegistry::new(path).await?)),
            _ => Err(Error::config("Invalid config for file registry")),
        }
    }
}
