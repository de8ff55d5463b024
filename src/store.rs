//! JSON snapshot persistence
//!
//! Every dataset is a whole-file JSON snapshot under the data directory.
//! Loading never fails: a missing or unreadable file yields the caller's
//! fallback. Saving logs failures instead of returning them, so the in-memory
//! state stays authoritative until the next successful write.
//!
//! Engines do not touch [`JsonStore`] directly. Each one owns a
//! [`Repository`] per entity kind, which serialises mutations and writes the
//! full snapshot while still holding its lock.

use derive_more::Display;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Set of user ids persisted as `{ "<id>": true }`
pub type FlagSet = BTreeMap<u64, bool>;

/// Named datasets and their files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Dataset {
    #[display("warnings")]
    Warnings,
    #[display("giveaways")]
    Giveaways,
    #[display("giveaway bans")]
    GiveawayBans,
    #[display("giveaway rigged")]
    GiveawayRigged,
    #[display("inactivity timers")]
    InactiveTimers,
    #[display("mutes")]
    Mutes,
    #[display("automod bypass")]
    Bypass,
    #[display("tickets")]
    Tickets,
    #[display("locked channels")]
    LockedChannels,
    #[display("stats channels")]
    StatsChannels,
}

impl Dataset {
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Warnings => "warnings.json",
            Self::Giveaways => "giveaways.json",
            Self::GiveawayBans => "giveaway_bans.json",
            Self::GiveawayRigged => "giveaway_rigged.json",
            Self::InactiveTimers => "inactive_timers.json",
            Self::Mutes => "mutes.json",
            Self::Bypass => "bypass.json",
            Self::Tickets => "tickets.json",
            Self::LockedChannels => "locked_channels.json",
            Self::StatsChannels => "stats_channels.json",
        }
    }

    /// Whether saves go through a temporary file and rename
    #[must_use]
    pub const fn is_atomic(self) -> bool {
        matches!(self, Self::Tickets)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Directory of JSON snapshots
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Open the data directory, creating it if needed and removing `*.tmp`
    /// files left behind by an interrupted atomic write.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            error!("Failed to create data directory {}: {e}", dir.display());
        }
        let store = Self { dir };
        store.remove_stale_temp_files();
        store
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_of(&self, dataset: Dataset) -> PathBuf {
        self.dir.join(dataset.file_name())
    }

    fn remove_stale_temp_files(&self) {
        let pattern = self.dir.join("*.tmp");
        let Some(pattern) = pattern.to_str() else {
            return;
        };
        let Ok(paths) = glob::glob(pattern) else {
            return;
        };
        for path in paths.flatten() {
            match std::fs::remove_file(&path) {
                Ok(()) => info!("Removed stale temp file {}", path.display()),
                Err(e) => warn!("Failed to remove stale temp file {}: {e}", path.display()),
            }
        }
    }

    /// Load a dataset, returning `fallback` when it is missing or malformed
    pub async fn load<T: DeserializeOwned>(&self, dataset: Dataset, fallback: T) -> T {
        match self.try_load(dataset).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("No {dataset} file yet, starting empty");
                fallback
            }
            Err(e) => {
                warn!("Failed to load {dataset}, using fallback: {e}");
                fallback
            }
        }
    }

    async fn try_load<T: DeserializeOwned>(&self, dataset: Dataset) -> Result<Option<T>, StoreError> {
        let path = self.path_of(dataset);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Json { path, source })
    }

    /// Write a dataset snapshot, logging instead of failing
    pub async fn save<T: Serialize>(&self, dataset: Dataset, value: &T) {
        if let Err(e) = self.try_save(dataset, value).await {
            error!("Failed to save {dataset}: {e}");
        }
    }

    async fn try_save<T: Serialize>(&self, dataset: Dataset, value: &T) -> Result<(), StoreError> {
        let path = self.path_of(dataset);
        let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;

        if dataset.is_atomic() {
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, json)
                .await
                .map_err(|source| StoreError::Io {
                    path: tmp.clone(),
                    source,
                })?;
            tokio::fs::rename(&tmp, &path)
                .await
                .map_err(|source| StoreError::Io { path, source })
        } else {
            tokio::fs::write(&path, json)
                .await
                .map_err(|source| StoreError::Io { path, source })
        }
    }
}

/// Owned state for one entity kind, persisted after every mutation
pub struct Repository<T> {
    store: JsonStore,
    dataset: Dataset,
    state: Mutex<T>,
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned + Default + Send,
{
    pub async fn open(store: JsonStore, dataset: Dataset) -> Self {
        let state = store.load(dataset, T::default()).await;
        Self {
            store,
            dataset,
            state: Mutex::new(state),
        }
    }

    /// Run a read-only closure against the current state
    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let state = self.state.lock().await;
        f(&state)
    }

    /// Mutate the state and persist the snapshot
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut state = self.state.lock().await;
        let result = f(&mut state);
        self.store.save(self.dataset, &*state).await;
        result
    }

    /// Like [`Repository::update`], but only persists when `f` succeeds.
    ///
    /// `f` must check its preconditions before mutating anything.
    pub async fn try_update<R, E>(&self, f: impl FnOnce(&mut T) -> Result<R, E>) -> Result<R, E> {
        let mut state = self.state.lock().await;
        let result = f(&mut state)?;
        self.store.save(self.dataset, &*state).await;
        Ok(result)
    }
}

impl Repository<FlagSet> {
    pub async fn contains(&self, id: u64) -> bool {
        self.read(|set| set.get(&id).copied().unwrap_or(false)).await
    }

    /// Set or clear a flag, returning whether anything changed
    pub async fn set(&self, id: u64, flagged: bool) -> bool {
        self.update(|set| {
            if flagged {
                set.insert(id, true) != Some(true)
            } else {
                set.remove(&id).is_some()
            }
        })
        .await
    }
}
