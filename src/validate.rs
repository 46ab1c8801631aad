//! Shape validation for candidate `mcp.json` documents.
//!
//! Two top-level checks fail fast (the document must be an object and carry an
//! `mcpServers` object). Past those, every entry is checked independently and
//! all violations are collected in document order.

use serde_json::Value;
use thiserror::Error;

use crate::config::is_truthy;

/// Why a candidate document was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Top-level shape is wrong; no per-server checks were attempted
    #[error("{0}")]
    Shape(String),

    /// One or more server entries violate the entry rules
    #[error("{}", .0.join(", "))]
    Entries(Vec<String>),
}

impl ValidationError {
    /// All violation messages, in the order they were found.
    pub fn errors(&self) -> Vec<&str> {
        match self {
            ValidationError::Shape(msg) => vec![msg.as_str()],
            ValidationError::Entries(errors) => errors.iter().map(String::as_str).collect(),
        }
    }
}

/// Validate a candidate configuration document.
pub fn validate(candidate: &Value) -> Result<(), ValidationError> {
    let Some(root) = candidate.as_object() else {
        return Err(ValidationError::Shape(
            "Invalid configuration format".to_string(),
        ));
    };

    let Some(servers) = root.get("mcpServers").and_then(Value::as_object) else {
        return Err(ValidationError::Shape(
            "Missing or invalid mcpServers section".to_string(),
        ));
    };

    let mut errors = Vec::new();
    for (name, entry) in servers {
        errors.extend(entry_errors(name, entry));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Entries(errors))
    }
}

/// Rule violations for a single entry. A non-object entry has none of the
/// required fields, so it reports missing command and non-array args.
fn entry_errors(name: &str, entry: &Value) -> Vec<String> {
    let field = |key: &str| entry.get(key);
    let mut errors = Vec::new();

    if !field("command").is_some_and(is_truthy) {
        errors.push(format!("Server \"{name}\" is missing command"));
    }
    if !field("args").is_some_and(Value::is_array) {
        errors.push(format!("Server \"{name}\" args must be an array"));
    }
    if let Some(env) = field("env").filter(|v| is_truthy(v)) {
        if !env.is_object() {
            errors.push(format!("Server \"{name}\" env must be an object"));
        }
    }
    if let Some(auto_approve) = field("autoApprove").filter(|v| is_truthy(v)) {
        if !auto_approve.is_array() {
            errors.push(format!("Server \"{name}\" autoApprove must be an array"));
        }
    }

    errors
}
