// crates/server/src/secrets.rs
//! Secret storage collaborator.
//!
//! The admin routes only talk to `SecretStorage`; which backend sits behind it
//! is a deployment decision. `MemorySecretStorage` is the in-process backend
//! used by default and in tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Components of a secret key, in order: `environment/project/deploy_group/key`.
pub const SECRET_KEY_PARTS: [&str; 4] = [
    "environment_permalink",
    "project_permalink",
    "deploy_group_permalink",
    "key",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("invalid secret key: {0}")]
    InvalidKey(String),
}

/// Parsed form of a secret key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyParts {
    pub environment_permalink: String,
    pub project_permalink: String,
    pub deploy_group_permalink: String,
    pub key: String,
}

/// Join key parts into the storage key. Parts must be non-empty and must not
/// contain `/`.
pub fn generate_secret_key(parts: &SecretKeyParts) -> Result<String, SecretError> {
    let values = [
        &parts.environment_permalink,
        &parts.project_permalink,
        &parts.deploy_group_permalink,
        &parts.key,
    ];
    for (name, value) in SECRET_KEY_PARTS.iter().zip(values) {
        if value.is_empty() || value.contains('/') {
            return Err(SecretError::InvalidKey(format!("{name} = {value:?}")));
        }
    }
    Ok(values.map(String::as_str).join("/"))
}

pub fn parse_secret_key(key: &str) -> Result<SecretKeyParts, SecretError> {
    let parts: Vec<&str> = key.split('/').collect();
    let [environment, project, deploy_group, name] = parts.as_slice() else {
        return Err(SecretError::InvalidKey(key.to_string()));
    };
    if parts.iter().any(|p| p.is_empty()) {
        return Err(SecretError::InvalidKey(key.to_string()));
    }
    Ok(SecretKeyParts {
        environment_permalink: environment.to_string(),
        project_permalink: project.to_string(),
        deploy_group_permalink: deploy_group.to_string(),
        key: name.to_string(),
    })
}

/// Writable attributes of a secret.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SecretAttributes {
    pub value: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub comment: Option<String>,
    /// Set by the route from the caller's identity, never from the body.
    #[serde(skip)]
    pub user_id: u64,
}

/// A stored secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretRecord {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub visible: bool,
    pub comment: Option<String>,
    pub updater_id: u64,
    pub updated_at: DateTime<Utc>,
}

impl SecretRecord {
    /// Copy with the value removed unless it is marked visible.
    pub fn redacted(&self) -> Self {
        let mut record = self.clone();
        if !record.visible {
            record.value = None;
        }
        record
    }
}

#[async_trait]
pub trait SecretStorage: Send + Sync {
    /// All keys, sorted.
    async fn list_keys(&self) -> Result<Vec<String>, SecretError>;

    /// The record for `key`, including its value.
    async fn read(&self, key: &str) -> Result<Option<SecretRecord>, SecretError>;

    /// Create or replace `key`. `Ok(false)` means the backend refused the write.
    async fn write(&self, key: &str, attributes: SecretAttributes) -> Result<bool, SecretError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), SecretError>;
}

/// In-process secret backend.
///
/// `set_available(false)` makes every call fail with `BackendUnavailable`,
/// the way an unreachable remote store would.
#[derive(Default)]
pub struct MemorySecretStorage {
    records: RwLock<BTreeMap<String, SecretRecord>>,
    unavailable: AtomicBool,
}

impl MemorySecretStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Relaxed);
    }

    fn check(&self) -> Result<(), SecretError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(SecretError::BackendUnavailable(
                "memory backend marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn poisoned(e: impl std::fmt::Display) -> SecretError {
        tracing::error!("RwLock poisoned in secret storage: {e}");
        SecretError::BackendUnavailable("secret storage lock poisoned".to_string())
    }
}

#[async_trait]
impl SecretStorage for MemorySecretStorage {
    async fn list_keys(&self) -> Result<Vec<String>, SecretError> {
        self.check()?;
        let records = self.records.read().map_err(Self::poisoned)?;
        Ok(records.keys().cloned().collect())
    }

    async fn read(&self, key: &str) -> Result<Option<SecretRecord>, SecretError> {
        self.check()?;
        let records = self.records.read().map_err(Self::poisoned)?;
        Ok(records.get(key).cloned())
    }

    async fn write(&self, key: &str, attributes: SecretAttributes) -> Result<bool, SecretError> {
        self.check()?;
        if parse_secret_key(key).is_err() || attributes.value.is_empty() {
            return Ok(false);
        }
        let record = SecretRecord {
            key: key.to_string(),
            value: Some(attributes.value),
            visible: attributes.visible,
            comment: attributes.comment,
            updater_id: attributes.user_id,
            updated_at: Utc::now(),
        };
        let mut records = self.records.write().map_err(Self::poisoned)?;
        records.insert(key.to_string(), record);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), SecretError> {
        self.check()?;
        let mut records = self.records.write().map_err(Self::poisoned)?;
        records.remove(key);
        Ok(())
    }
}
