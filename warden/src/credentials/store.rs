//! The credential record on disk.

use super::secret::Secret;
use crate::util::write_new;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use warden_shared::{WardenError, WardenResult};

const RECORD_MODE: u32 = 0o600;

/// Every secret of one install plus the policy each was validated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub install_id: String,
    pub created_at: DateTime<Utc>,
    pub secrets: BTreeMap<String, Secret>,
    /// Field key to a human-readable policy summary.
    #[serde(default)]
    pub policies: BTreeMap<String, String>,
}

impl CredentialRecord {
    pub fn new(install_id: impl Into<String>) -> Self {
        Self {
            install_id: install_id.into(),
            created_at: Utc::now(),
            secrets: BTreeMap::new(),
            policies: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: &str, secret: Secret, policy: Option<String>) {
        self.secrets.insert(key.to_string(), secret);
        if let Some(policy) = policy {
            self.policies.insert(key.to_string(), policy);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Secret> {
        self.secrets.get(key)
    }
}

/// `credentials.json`: appears fully written with mode 0600, never rewritten.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> WardenResult<Option<CredentialRecord>> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(WardenError::Storage(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        serde_json::from_slice(&data).map(Some).map_err(|e| {
            WardenError::Storage(format!(
                "credential record {} is unreadable: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Write `record`. Fails if a record already exists.
    pub fn write_once(&self, record: &CredentialRecord) -> WardenResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = zeroize::Zeroizing::new(serde_json::to_vec_pretty(record).map_err(|e| {
            WardenError::Internal(format!("failed to serialize credential record: {}", e))
        })?);
        write_new(&self.path, &json, RECORD_MODE)?;

        tracing::info!(
            path = %self.path.display(),
            secrets = record.secrets.len(),
            "Wrote credential record"
        );
        Ok(())
    }

    /// Delete the record. Returns whether one existed.
    pub fn remove(&self) -> WardenResult<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(WardenError::Storage(format!(
                "failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
