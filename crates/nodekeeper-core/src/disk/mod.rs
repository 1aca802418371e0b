//! Disk helpers for the state files shared with the supervisor.
//!
//! Writes never leave a partially written target behind: content goes to a
//! sibling temp file first and is then renamed (replace) or hard linked
//! (create-only) into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rand::RngCore;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Disk errors.
#[derive(Error, Debug)]
pub enum DiskError {
    /// The target of a create-only write already exists.
    #[error("File already exists: {0}")]
    AlreadyExists(PathBuf),

    /// The file to read does not exist.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Any other IO failure.
    #[error("IO error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// File content is not the expected JSON.
    #[error("JSON error in {path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl DiskError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// File permissions applied to written files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Default permissions.
    Shared,
    /// Owner read/write only (0600 on Unix).
    Private,
}

/// Read a file as UTF-8 with surrounding whitespace trimmed.
///
/// # Errors
///
/// Returns `NotFound` if the file is missing, `Io` otherwise.
pub async fn read_utf8(path: &Path) -> Result<String, DiskError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DiskError::io(path, e))?;
    Ok(content.trim().to_string())
}

/// Read and deserialize a JSON file.
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, DiskError> {
    let content = read_utf8(path).await?;
    serde_json::from_str(&content).map_err(|source| DiskError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Check whether a path exists.
pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Remove a file. Missing files are not an error.
///
/// # Errors
///
/// Returns error on any failure other than the file being absent.
pub async fn remove(path: &Path) -> Result<(), DiskError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DiskError::io(path, e)),
    }
}

/// Atomically replace `path` with `data`.
///
/// # Errors
///
/// Returns error if the temp file cannot be written or renamed.
pub async fn write_atomic(path: &Path, data: &[u8], mode: FileMode) -> Result<(), DiskError> {
    let temp = write_temp(path, data, mode).await?;

    if let Err(e) = tokio::fs::rename(&temp, path).await {
        discard_temp(&temp).await;
        return Err(DiskError::io(path, e));
    }

    Ok(())
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
///
/// # Errors
///
/// Returns error if serialization or the write fails.
pub async fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    mode: FileMode,
) -> Result<(), DiskError> {
    let data = serde_json::to_vec_pretty(value).map_err(|source| DiskError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &data, mode).await
}

/// Create `path` with `data` only if it does not exist yet.
///
/// The content is complete before the target appears, and of two racing
/// callers exactly one succeeds; the other gets `AlreadyExists`.
///
/// # Errors
///
/// Returns `AlreadyExists` if the target exists, `Io` on other failures.
pub async fn write_once(path: &Path, data: &[u8], mode: FileMode) -> Result<(), DiskError> {
    let temp = write_temp(path, data, mode).await?;

    let linked = tokio::fs::hard_link(&temp, path).await;
    discard_temp(&temp).await;

    match linked {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            Err(DiskError::AlreadyExists(path.to_path_buf()))
        }
        Err(e) => Err(DiskError::io(path, e)),
    }
}

/// Serialize `value` as pretty JSON and create `path` if absent.
///
/// # Errors
///
/// See [`write_once`].
pub async fn write_json_once<T: Serialize>(
    path: &Path,
    value: &T,
    mode: FileMode,
) -> Result<(), DiskError> {
    let data = serde_json::to_vec_pretty(value).map_err(|source| DiskError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_once(path, &data, mode).await
}

async fn write_temp(path: &Path, data: &[u8], mode: FileMode) -> Result<PathBuf, DiskError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DiskError::io(parent, e))?;
    }

    let temp = temp_path(path);
    if let Err(e) = write_and_sync(&temp, data, mode).await {
        discard_temp(&temp).await;
        return Err(DiskError::io(&temp, e));
    }

    Ok(temp)
}

async fn write_and_sync(path: &Path, data: &[u8], mode: FileMode) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if mode == FileMode::Private {
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await?;
        }
    }
    #[cfg(not(unix))]
    let _ = mode;

    file.write_all(data).await?;
    file.sync_all().await
}

async fn discard_temp(temp: &Path) {
    if let Err(e) = tokio::fs::remove_file(temp).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!(path = %temp.display(), error = %e, "Error removing temporary file");
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let suffix = rand::thread_rng().next_u32();
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{suffix}.tmp"));
    path.with_file_name(name)
}

/// A request for the supervisor, delivered as an empty file in the signal directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Reboot the device.
    Reboot,
    /// Power off the device.
    Shutdown,
    /// Apply the pending system update.
    Update,
    /// Collect debug output.
    Debug,
    /// Install an app.
    AppInstall(String),
    /// Uninstall an app.
    AppUninstall(String),
}

impl Signal {
    /// File name the supervisor watches for.
    #[must_use]
    pub fn file_name(&self) -> String {
        match self {
            Self::Reboot => "reboot".to_string(),
            Self::Shutdown => "shutdown".to_string(),
            Self::Update => "update".to_string(),
            Self::Debug => "debug".to_string(),
            Self::AppInstall(id) => format!("app-install-{id}"),
            Self::AppUninstall(id) => format!("app-uninstall-{id}"),
        }
    }
}

/// Drop a signal file for the supervisor.
///
/// # Errors
///
/// Returns error if the file cannot be written.
pub async fn write_signal(signal_dir: &Path, signal: &Signal) -> Result<(), DiskError> {
    let path = signal_dir.join(signal.file_name());
    write_atomic(&path, b"true", FileMode::Shared).await?;
    tracing::info!(signal = %signal.file_name(), "Signal written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
    }

    #[tokio::test]
    async fn test_write_atomic_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/file.txt");

        write_atomic(&path, b"one\n", FileMode::Shared).await.unwrap();
        write_atomic(&path, b"two\n", FileMode::Shared).await.unwrap();

        assert_eq!(read_utf8(&path).await.unwrap(), "two");
        // No temp files left behind
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_write_once_refuses_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("user.json");

        let first = Record { name: "a".into() };
        write_json_once(&path, &first, FileMode::Private).await.unwrap();

        let second = Record { name: "b".into() };
        let result = write_json_once(&path, &second, FileMode::Private).await;
        assert!(matches!(result, Err(DiskError::AlreadyExists(_))));

        let stored: Record = read_json(&path).await.unwrap();
        assert_eq!(stored, first);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_write_once_concurrent_single_winner() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("once");

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let path = path.clone();
            handles.push(tokio::spawn(async move {
                write_once(&path, &[i], FileMode::Shared).await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => ok += 1,
                Err(DiskError::AlreadyExists(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_private_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key");
        write_atomic(&path, b"secret", FileMode::Private).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_read_missing() {
        let dir = TempDir::new().unwrap();
        let result = read_utf8(&dir.path().join("missing")).await;
        assert!(matches!(result, Err(DiskError::NotFound(_))));
        assert!(!exists(&dir.path().join("missing")).await);
        assert!(remove(&dir.path().join("missing")).await.is_ok());
    }

    #[tokio::test]
    async fn test_write_signal() {
        let dir = TempDir::new().unwrap();
        write_signal(dir.path(), &Signal::AppInstall("bitcoin".into()))
            .await
            .unwrap();
        assert!(exists(&dir.path().join("app-install-bitcoin")).await);

        write_signal(dir.path(), &Signal::Reboot).await.unwrap();
        assert!(exists(&dir.path().join("reboot")).await);
    }
}
