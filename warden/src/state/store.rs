//! Durable Run State storage.

use super::run_state::RunState;
use crate::util::{ensure_private_dir, write_atomic};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use warden_shared::constants::{STATE_SCHEMA_VERSION, layout};
use warden_shared::{WardenError, WardenResult};

const STATE_MODE: u32 = 0o600;
const STATE_DIR_MODE: u32 = 0o700;

/// Where Run State lives. Injected into the orchestrator.
pub trait StateStore: Send + Sync {
    /// `Ok(None)` when no state exists; `Err(StateCorruption)` when it
    /// exists but cannot be read.
    fn load(&self, install_id: &str) -> WardenResult<Option<RunState>>;

    /// Persist `state`. Readers see the old or the new record, never a mix.
    fn save(&self, state: &RunState) -> WardenResult<()>;

    /// Move the state aside for inspection. Returns whether one existed.
    fn discard(&self, install_id: &str) -> WardenResult<bool>;

    /// Delete the state outright. Returns whether one existed.
    fn remove(&self, install_id: &str) -> WardenResult<bool>;
}

/// One JSON file per install under `<home>/state`.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, install_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", install_id))
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.dir.join(layout::ARCHIVE_DIR)
    }

    /// Install ids with a stored state, sorted.
    pub fn install_ids(&self) -> WardenResult<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let id = name.strip_suffix(".json")?;
                (!id.starts_with('.')).then(|| id.to_string())
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}

impl StateStore for FileStateStore {
    fn load(&self, install_id: &str) -> WardenResult<Option<RunState>> {
        let path = self.path_for(install_id);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(WardenError::Storage(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let state: RunState = serde_json::from_slice(&data).map_err(|e| {
            WardenError::StateCorruption(format!("{}: {}", path.display(), e))
        })?;
        if state.schema_version > STATE_SCHEMA_VERSION {
            return Err(WardenError::StateCorruption(format!(
                "{} has schema version {}, this build reads up to {}",
                path.display(),
                state.schema_version,
                STATE_SCHEMA_VERSION
            )));
        }
        Ok(Some(state))
    }

    fn save(&self, state: &RunState) -> WardenResult<()> {
        ensure_private_dir(&self.dir, STATE_DIR_MODE)?;
        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| WardenError::Internal(format!("failed to serialize run state: {}", e)))?;
        write_atomic(&self.path_for(&state.install_id), &json, STATE_MODE)?;

        tracing::debug!(
            install_id = %state.install_id,
            status = %state.status,
            completed = state.completed.len(),
            "Saved run state"
        );
        Ok(())
    }

    fn discard(&self, install_id: &str) -> WardenResult<bool> {
        let path = self.path_for(install_id);
        if !path.exists() {
            return Ok(false);
        }

        let archive = self.archive_dir();
        ensure_private_dir(&archive, STATE_DIR_MODE)?;
        let target = archive.join(format!(
            "{}-{}.json",
            install_id,
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        ));
        std::fs::rename(&path, &target).map_err(|e| {
            WardenError::Storage(format!(
                "failed to archive {} to {}: {}",
                path.display(),
                target.display(),
                e
            ))
        })?;

        tracing::info!(install_id, archived = %target.display(), "Archived run state");
        Ok(true)
    }

    fn remove(&self, install_id: &str) -> WardenResult<bool> {
        match std::fs::remove_file(self.path_for(install_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Valid(RunState),
    Corrupt,
}

/// In-memory store that keeps every saved snapshot.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    slots: Mutex<BTreeMap<String, Slot>>,
    history: Mutex<Vec<RunState>>,
    archived: Mutex<Vec<String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate with `state`.
    pub fn with_state(state: RunState) -> Self {
        let store = Self::new();
        store
            .slots
            .lock()
            .insert(state.install_id.clone(), Slot::Valid(state));
        store
    }

    /// Make `install_id` unreadable, as if the file were garbage.
    pub fn corrupt(&self, install_id: &str) {
        self.slots.lock().insert(install_id.to_string(), Slot::Corrupt);
    }

    /// Current state, bypassing corruption handling.
    pub fn current(&self, install_id: &str) -> Option<RunState> {
        match self.slots.lock().get(install_id) {
            Some(Slot::Valid(state)) => Some(state.clone()),
            _ => None,
        }
    }

    /// Every state passed to `save`, in order.
    pub fn history(&self) -> Vec<RunState> {
        self.history.lock().clone()
    }

    /// Install ids discarded so far.
    pub fn archived(&self) -> Vec<String> {
        self.archived.lock().clone()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, install_id: &str) -> WardenResult<Option<RunState>> {
        match self.slots.lock().get(install_id) {
            None => Ok(None),
            Some(Slot::Valid(state)) => Ok(Some(state.clone())),
            Some(Slot::Corrupt) => Err(WardenError::StateCorruption(format!(
                "state for {} is unreadable",
                install_id
            ))),
        }
    }

    fn save(&self, state: &RunState) -> WardenResult<()> {
        self.slots
            .lock()
            .insert(state.install_id.clone(), Slot::Valid(state.clone()));
        self.history.lock().push(state.clone());
        Ok(())
    }

    fn discard(&self, install_id: &str) -> WardenResult<bool> {
        let existed = self.slots.lock().remove(install_id).is_some();
        if existed {
            self.archived.lock().push(install_id.to_string());
        }
        Ok(existed)
    }

    fn remove(&self, install_id: &str) -> WardenResult<bool> {
        Ok(self.slots.lock().remove(install_id).is_some())
    }
}
