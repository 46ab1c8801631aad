//! Error types for MCP Manager operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::validate::ValidationError;

/// Main error type for config store, settings, and service operations
#[derive(Error, Debug)]
pub enum ManagerError {
    /// Config file does not exist at the configured path
    #[error("MCP configuration file not found at {}", .0.display())]
    NotFound(PathBuf),

    /// Config file exists but holds only whitespace
    #[error("MCP configuration file is empty")]
    Empty(PathBuf),

    /// Config file is not well-formed JSON (or not a JSON object)
    #[error("Invalid JSON in MCP configuration file: {message}")]
    Parse { path: PathBuf, message: String },

    /// Candidate document failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Reading the config file failed for a reason other than absence
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Overwriting the config file failed
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manager settings file is unreadable or inconsistent
    #[error("invalid settings: {0}")]
    Settings(String),
}

impl ManagerError {
    /// Config file path the error refers to, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ManagerError::NotFound(path)
            | ManagerError::Empty(path)
            | ManagerError::Parse { path, .. }
            | ManagerError::Read { path, .. }
            | ManagerError::Write { path, .. } => Some(path),
            ManagerError::Validation(_) | ManagerError::Settings(_) => None,
        }
    }
}

/// Failure while taking a backup snapshot. Logged by the store, never returned.
#[derive(Error, Debug)]
#[error("could not create backup at {}: {source}", path.display())]
pub struct BackupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Result type alias for MCP Manager operations
pub type Result<T> = std::result::Result<T, ManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = ManagerError::NotFound(PathBuf::from("/home/op/.aws/amazonq/mcp.json"));
        assert_eq!(
            err.to_string(),
            "MCP configuration file not found at /home/op/.aws/amazonq/mcp.json"
        );
    }

    #[test]
    fn test_parse_display_keeps_parser_message() {
        let err = ManagerError::Parse {
            path: PathBuf::from("mcp.json"),
            message: "expected value at line 1 column 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid JSON in MCP configuration file: expected value at line 1 column 1"
        );
    }

    #[test]
    fn test_path_accessor() {
        let err = ManagerError::Empty(PathBuf::from("mcp.json"));
        assert_eq!(err.path(), Some(&PathBuf::from("mcp.json")));
        let err = ManagerError::Settings("bad".to_string());
        assert!(err.path().is_none());
    }
}
