//! The identity record and where it is stored.
//!
//! There is exactly one account. Its record is either the JSON user file
//! shared with the supervisor or a single key in an embedded sled tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodekeeper_core::config::CredentialBackend;
use nodekeeper_core::disk::{self, DiskError, FileMode};
use serde::{Deserialize, Serialize};

use super::{AuthConfig, AuthError, SYSTEM_USER};

/// The persisted identity.
///
/// Fields other than the ones below (the supervisor keeps its own data in
/// the user file) are carried through unchanged on rewrite.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Account name, always the system user.
    #[serde(default = "system_user")]
    pub username: String,

    /// Argon2 PHC hash. Stored under `password` for compatibility with the
    /// existing user file layout.
    #[serde(rename = "password")]
    pub password_hash: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Registration time.
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

fn system_user() -> String {
    SYSTEM_USER.to_string()
}

impl IdentityRecord {
    /// New record for the system user.
    #[must_use]
    pub fn new(password_hash: String) -> Self {
        Self {
            username: system_user(),
            password_hash,
            name: None,
            created_at: Some(Utc::now()),
            extra: serde_json::Map::new(),
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// App ids the supervisor recorded as installed.
    #[must_use]
    pub fn installed_apps(&self) -> Vec<String> {
        self.extra
            .get("installedApps")
            .and_then(serde_json::Value::as_array)
            .map(|apps| {
                apps.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for IdentityRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRecord")
            .field("username", &self.username)
            .field("name", &self.name)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Persistence for the identity record.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read the record, `None` if no one has registered.
    async fn read(&self) -> Result<Option<IdentityRecord>, AuthError>;

    /// Create the record. Fails with `AlreadyRegistered` if one exists,
    /// and of two racing writers exactly one succeeds.
    async fn write(&self, record: &IdentityRecord) -> Result<(), AuthError>;

    /// Overwrite the existing record.
    async fn replace(&self, record: &IdentityRecord) -> Result<(), AuthError>;

    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

/// Open the store selected by the config.
///
/// # Errors
///
/// Returns `Storage` if the sled database cannot be opened.
pub fn open_store(config: &AuthConfig) -> Result<Arc<dyn CredentialStore>, AuthError> {
    match config.credential_backend {
        CredentialBackend::File => Ok(Arc::new(FileCredentialStore::new(&config.user_file))),
        CredentialBackend::Sled => Ok(Arc::new(SledCredentialStore::open(&config.credential_db)?)),
    }
}

/// Identity record as a JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store at `path`. Nothing is touched until first use.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn read(&self) -> Result<Option<IdentityRecord>, AuthError> {
        match disk::read_json(&self.path).await {
            Ok(record) => Ok(Some(record)),
            Err(DiskError::NotFound(_)) => Ok(None),
            Err(e) => Err(AuthError::Storage(e.to_string())),
        }
    }

    async fn write(&self, record: &IdentityRecord) -> Result<(), AuthError> {
        match disk::write_json_once(&self.path, record, FileMode::Private).await {
            Ok(()) => Ok(()),
            Err(DiskError::AlreadyExists(_)) => Err(AuthError::AlreadyRegistered),
            Err(e) => Err(AuthError::Storage(e.to_string())),
        }
    }

    async fn replace(&self, record: &IdentityRecord) -> Result<(), AuthError> {
        disk::write_json_atomic(&self.path, record, FileMode::Private)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Identity record in a sled tree.
pub struct SledCredentialStore {
    path: PathBuf,
    tree: sled::Tree,
}

impl SledCredentialStore {
    /// Open or create the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, AuthError> {
        let db = sled::open(path)
            .map_err(|e| AuthError::Storage(format!("Failed to open credential database: {e}")))?;
        Self::with_db(&db, path)
    }

    /// Use an already opened database.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the tree cannot be opened.
    pub fn with_db(db: &sled::Db, path: &Path) -> Result<Self, AuthError> {
        let tree = db
            .open_tree("identity")
            .map_err(|e| AuthError::Storage(format!("Failed to open identity tree: {e}")))?;

        Ok(Self {
            path: path.to_path_buf(),
            tree,
        })
    }

    fn encode(record: &IdentityRecord) -> Result<Vec<u8>, AuthError> {
        serde_json::to_vec(record)
            .map_err(|e| AuthError::Storage(format!("Serialization error: {e}")))
    }

    async fn flush(&self) -> Result<(), AuthError> {
        self.tree
            .flush_async()
            .await
            .map(|_| ())
            .map_err(|e| AuthError::Storage(format!("Flush error: {e}")))
    }
}

impl std::fmt::Debug for SledCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledCredentialStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialStore for SledCredentialStore {
    async fn read(&self) -> Result<Option<IdentityRecord>, AuthError> {
        match self.tree.get(SYSTEM_USER) {
            Ok(Some(value)) => serde_json::from_slice(&value)
                .map(Some)
                .map_err(|e| AuthError::Storage(format!("Deserialization error: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(AuthError::Storage(format!("Get error: {e}"))),
        }
    }

    async fn write(&self, record: &IdentityRecord) -> Result<(), AuthError> {
        let value = Self::encode(record)?;

        let swapped = self
            .tree
            .compare_and_swap(SYSTEM_USER, None::<&[u8]>, Some(value))
            .map_err(|e| AuthError::Storage(format!("Insert error: {e}")))?;
        if swapped.is_err() {
            return Err(AuthError::AlreadyRegistered);
        }

        self.flush().await
    }

    async fn replace(&self, record: &IdentityRecord) -> Result<(), AuthError> {
        let value = Self::encode(record)?;

        self.tree
            .insert(SYSTEM_USER, value)
            .map_err(|e| AuthError::Storage(format!("Update error: {e}")))?;

        self.flush().await
    }

    fn location(&self) -> String {
        format!("{} (sled)", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn record(hash: &str) -> IdentityRecord {
        IdentityRecord::new(hash.to_string()).with_name(Some("Satoshi".to_string()))
    }

    async fn exercise(store: &dyn CredentialStore) {
        assert!(store.read().await.unwrap().is_none());

        store.write(&record("hash-one")).await.unwrap();
        let loaded = store.read().await.unwrap().unwrap();
        assert_eq!(loaded.username, "admin");
        assert_eq!(loaded.password_hash, "hash-one");
        assert_eq!(loaded.name.as_deref(), Some("Satoshi"));

        let second = store.write(&record("hash-two")).await;
        assert!(matches!(second, Err(AuthError::AlreadyRegistered)));
        assert_eq!(store.read().await.unwrap().unwrap().password_hash, "hash-one");

        let mut updated = loaded;
        updated.password_hash = "hash-three".to_string();
        store.replace(&updated).await.unwrap();
        assert_eq!(store.read().await.unwrap().unwrap().password_hash, "hash-three");
    }

    #[tokio::test]
    async fn test_file_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(&temp_dir.path().join("db/user.json"));
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_sled_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = SledCredentialStore::open(&temp_dir.path().join("credentials")).unwrap();
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_file_store_keeps_unknown_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("user.json");
        std::fs::write(
            &path,
            r#"{"name":"Satoshi","password":"old","installedApps":["bitcoin"]}"#,
        )
        .unwrap();

        let store = FileCredentialStore::new(&path);
        let mut record = store.read().await.unwrap().unwrap();
        assert_eq!(record.username, "admin");
        assert!(record.created_at.is_none());
        assert_eq!(record.installed_apps(), vec!["bitcoin".to_string()]);
        assert!(IdentityRecord::new("h".to_string()).installed_apps().is_empty());

        record.password_hash = "new".to_string();
        store.replace(&record).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["password"], "new");
        assert_eq!(raw["installedApps"][0], "bitcoin");
    }

    #[test]
    fn test_debug_hides_hash() {
        let debug = format!("{:?}", record("$argon2id$secret"));
        assert!(!debug.contains("argon2id"));
    }
}
