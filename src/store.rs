//! ConfigStore — sole owner of the on-disk `mcp.json`.
//!
//! Reads are strict about presence, blankness, and JSON well-formedness.
//! Writes snapshot the previous content to `<path>.backup.<epoch-millis>`
//! before overwriting; a failed snapshot is logged and never blocks the write.
//! There is no locking: one operator, last write wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::ConfigDocument;
use crate::error::{BackupError, ManagerError};

/// Path of the backup snapshot for `path` taken at `millis`.
pub fn backup_path(path: &Path, millis: i64) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".backup.{millis}"));
    PathBuf::from(name)
}

/// Reads, backs up, and writes the configuration file at a fixed path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and parse the configuration file.
    ///
    /// A missing `mcpServers` is synthesized as `{}` in the returned document
    /// only; the file is not rewritten.
    pub async fn load(&self) -> crate::Result<ConfigDocument> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ManagerError::NotFound(self.path.clone()));
            }
            Err(source) => {
                return Err(ManagerError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            return Err(ManagerError::Empty(self.path.clone()));
        }

        // Bytes that are not UTF-8 surface as a parse error, not an I/O error.
        let value: serde_json::Value =
            serde_json::from_slice(&content).map_err(|e| ManagerError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            })?;

        let mut document = ConfigDocument::from_value(value).ok_or_else(|| ManagerError::Parse {
            path: self.path.clone(),
            message: "top-level value must be a JSON object".to_string(),
        })?;

        if document.normalize_servers() {
            tracing::debug!(path = %self.path.display(), "mcpServers missing, using empty map");
        }

        Ok(document)
    }

    /// Back up the current file (best effort) and overwrite it with `document`.
    ///
    /// Returns the path written. Only a failure of the overwrite itself is an
    /// error.
    pub async fn save(&self, document: &ConfigDocument) -> crate::Result<PathBuf> {
        self.save_with_stamp(document, chrono::Utc::now().timestamp_millis())
            .await
    }

    async fn save_with_stamp(
        &self,
        document: &ConfigDocument,
        millis: i64,
    ) -> crate::Result<PathBuf> {
        match self.backup_current(millis).await {
            Ok(Some(backup)) => {
                tracing::info!(backup = %backup.display(), "backup created");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "could not create backup, continuing with write");
            }
        }

        let json = document
            .to_pretty_json()
            .map_err(|e| ManagerError::Write {
                path: self.path.clone(),
                source: std::io::Error::new(ErrorKind::InvalidData, e),
            })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ManagerError::Write {
                    path: self.path.clone(),
                    source,
                })?;
        }

        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| {
                tracing::error!(path = %self.path.display(), error = %source, "config write failed");
                ManagerError::Write {
                    path: self.path.clone(),
                    source,
                }
            })?;

        tracing::info!(
            path = %self.path.display(),
            servers = document.server_count(),
            "MCP configuration updated"
        );
        Ok(self.path.clone())
    }

    /// Copy the current non-blank file to a fresh backup path.
    ///
    /// `Ok(None)` when there is nothing worth backing up. The millisecond
    /// suffix is bumped until the name is unused so snapshots never collide.
    async fn backup_current(&self, millis: i64) -> Result<Option<PathBuf>, BackupError> {
        let current = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(BackupError {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if current.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let mut stamp = millis;
        let mut target = backup_path(&self.path, stamp);
        while tokio::fs::try_exists(&target).await.unwrap_or(false) {
            stamp += 1;
            target = backup_path(&self.path, stamp);
        }

        tokio::fs::write(&target, &current)
            .await
            .map_err(|source| BackupError {
                path: target.clone(),
                source,
            })?;
        Ok(Some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join("mcp.json"))
    }

    fn backups_in(dir: &TempDir) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .map(|e| e.expect("entry").path())
            .filter(|p| p.to_string_lossy().contains(".backup."))
            .collect();
        found.sort();
        found
    }

    #[test]
    fn test_backup_path_suffix() {
        let path = backup_path(Path::new("/tmp/mcp.json"), 1700000000123);
        assert_eq!(path, PathBuf::from("/tmp/mcp.json.backup.1700000000123"));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_not_found() {
        let dir = TempDir::new().expect("temp dir");
        let result = store_in(&dir).load().await;
        assert!(matches!(result, Err(ManagerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_load_whitespace_is_empty() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        std::fs::write(store.path(), "  \n\t ").expect("write");
        let result = store.load().await;
        assert!(matches!(result, Err(ManagerError::Empty(_))));
    }

    #[tokio::test]
    async fn test_load_malformed_json_keeps_message() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        std::fs::write(store.path(), "{ not json").expect("write");
        match store.load().await {
            Err(ManagerError::Parse { message, .. }) => assert!(!message.is_empty()),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_invalid_utf8_is_parse_error() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        std::fs::write(store.path(), b"{\"mcpServers\": {\"a\xff\": {}}}").expect("write");
        match store.load().await {
            Err(ManagerError::Parse { message, .. }) => assert!(!message.is_empty()),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_array_root_is_parse_error() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        std::fs::write(store.path(), "[]").expect("write");
        assert!(matches!(store.load().await, Err(ManagerError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_load_synthesizes_servers_without_touching_file() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        std::fs::write(store.path(), r#"{"theme":"dark"}"#).expect("write");

        let document = store.load().await.expect("load");
        assert_eq!(document.to_value(), json!({ "theme": "dark", "mcpServers": {} }));

        let on_disk = std::fs::read_to_string(store.path()).expect("read");
        assert_eq!(on_disk, r#"{"theme":"dark"}"#);
    }

    #[tokio::test]
    async fn test_save_without_prior_file_makes_no_backup() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        let written = store.save(&ConfigDocument::new()).await.expect("save");
        assert_eq!(written, store.path());
        assert!(backups_in(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_save_backs_up_prior_bytes() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        let prior = "{\"mcpServers\":{\"a\":{\"command\":\"x\",\"args\":[]}}}\n";
        std::fs::write(store.path(), prior).expect("write");

        store
            .save_with_stamp(&ConfigDocument::new(), 42)
            .await
            .expect("save");

        let backups = backups_in(&dir);
        assert_eq!(backups, vec![backup_path(store.path(), 42)]);
        assert_eq!(std::fs::read_to_string(&backups[0]).expect("read"), prior);

        let saved = std::fs::read_to_string(store.path()).expect("read");
        assert_eq!(saved, "{\n  \"mcpServers\": {}\n}");
    }

    #[tokio::test]
    async fn test_blank_prior_file_is_not_backed_up() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        std::fs::write(store.path(), "   ").expect("write");
        store.save(&ConfigDocument::new()).await.expect("save");
        assert!(backups_in(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_same_millisecond_backups_do_not_collide() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        std::fs::write(store.path(), "{\"first\":true}").expect("write");

        store
            .save_with_stamp(&ConfigDocument::new(), 7)
            .await
            .expect("first save");
        store
            .save_with_stamp(&ConfigDocument::new(), 7)
            .await
            .expect("second save");

        let backups = backups_in(&dir);
        assert_eq!(
            backups,
            vec![backup_path(store.path(), 7), backup_path(store.path(), 8)]
        );
        assert_eq!(
            std::fs::read_to_string(&backups[0]).expect("read"),
            "{\"first\":true}"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_backup_does_not_block_write() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        std::fs::write(store.path(), "{\"old\":true}").expect("write");

        // A dangling link at the backup name points into a directory that
        // does not exist, so writing the snapshot fails.
        let blocked = backup_path(store.path(), 9);
        std::os::unix::fs::symlink(dir.path().join("missing").join("snapshot"), &blocked)
            .expect("symlink");
        assert!(store.backup_current(9).await.is_err());

        let written = store
            .save_with_stamp(&ConfigDocument::new(), 9)
            .await
            .expect("write must succeed without a backup");
        assert_eq!(written, store.path());
        assert_eq!(
            std::fs::read_to_string(store.path()).expect("read"),
            "{\n  \"mcpServers\": {}\n}"
        );
        assert!(!dir.path().join("missing").exists());
    }

    #[tokio::test]
    async fn test_save_creates_missing_parent_directory() {
        let dir = TempDir::new().expect("temp dir");
        let store = ConfigStore::new(dir.path().join("amazonq").join("mcp.json"));
        store.save(&ConfigDocument::new()).await.expect("save");
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_save_into_directory_path_is_write_error() {
        let dir = TempDir::new().expect("temp dir");
        let store = ConfigStore::new(dir.path());
        let result = store.save(&ConfigDocument::new()).await;
        assert!(matches!(result, Err(ManagerError::Write { .. })));
    }

    #[tokio::test]
    async fn test_round_trip_preserves_order() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"{"mcpServers":{"z":{"command":"a","args":[]},"b":{"command":"c","args":[]}}}"#,
        )
        .expect("write");

        let mut document = store.load().await.expect("load");
        document.toggle("b");
        store.save(&document).await.expect("save");

        let reloaded = store.load().await.expect("reload");
        assert_eq!(reloaded.server_names(), vec!["z", "b"]);
        assert_eq!(reloaded.is_enabled("b"), Some(false));
    }
}
