//! `mcp.json` document model — order-preserving JSON with typed entry views.
//!
//! The document is kept as a raw JSON object so unknown top-level keys and
//! unknown per-entry fields survive every read-modify-write cycle untouched.
//! `serde_json` is built with `preserve_order`, so server order round-trips.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key holding the server registry inside the document.
pub const SERVERS_KEY: &str = "mcpServers";

/// Default location of the managed file: `~/.aws/amazonq/mcp.json`.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".aws")
        .join("amazonq")
        .join("mcp.json")
}

/// JavaScript-style truthiness. The file format is shared with JS tooling,
/// whose checks treat `null`, `false`, `0`, and `""` as absent.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Root persisted entity: `{ "mcpServers": { "<name>": { ... } }, ... }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDocument {
    root: Map<String, Value>,
}

impl ConfigDocument {
    /// A document with an empty server registry.
    pub fn new() -> Self {
        let mut root = Map::new();
        root.insert(SERVERS_KEY.to_string(), Value::Object(Map::new()));
        Self { root }
    }

    /// Wrap a JSON value; `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(root) => Some(Self { root }),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Replace a missing or falsy `mcpServers` with an empty mapping.
    ///
    /// Returns `true` if the document was changed.
    pub fn normalize_servers(&mut self) -> bool {
        if self.root.get(SERVERS_KEY).is_some_and(is_truthy) {
            return false;
        }
        self.root
            .insert(SERVERS_KEY.to_string(), Value::Object(Map::new()));
        true
    }

    /// The server registry, if `mcpServers` is an object.
    pub fn servers(&self) -> Option<&Map<String, Value>> {
        self.root.get(SERVERS_KEY).and_then(Value::as_object)
    }

    fn servers_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.root.get_mut(SERVERS_KEY).and_then(Value::as_object_mut)
    }

    /// Server names in document order.
    pub fn server_names(&self) -> Vec<&str> {
        self.servers()
            .map(|servers| servers.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn server_count(&self) -> usize {
        self.servers().map_or(0, Map::len)
    }

    /// Lenient typed view of one entry.
    pub fn entry(&self, name: &str) -> Option<ServerEntry> {
        self.servers()?.get(name).map(ServerEntry::from_value)
    }

    /// Lenient typed views of all entries, in document order.
    pub fn entries(&self) -> Vec<(String, ServerEntry)> {
        self.servers()
            .map(|servers| {
                servers
                    .iter()
                    .map(|(name, value)| (name.clone(), ServerEntry::from_value(value)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert or replace an entry, creating `mcpServers` if needed.
    #[cfg(test)]
    pub fn insert_server(&mut self, name: impl Into<String>, entry: &ServerEntry) {
        self.normalize_servers();
        let value = serde_json::to_value(entry).unwrap_or(Value::Null);
        if let Some(servers) = self.servers_mut() {
            servers.insert(name.into(), value);
        }
    }

    /// Whether the named entry is enabled. `None` if there is no such entry.
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        let entry = self.servers()?.get(name)?;
        Some(!entry.get("disabled").is_some_and(is_truthy))
    }

    /// Set the `disabled` flag on one entry, leaving every other field alone.
    ///
    /// Returns `false` if the entry does not exist or is not an object.
    pub fn set_disabled(&mut self, name: &str, disabled: bool) -> bool {
        match self
            .servers_mut()
            .and_then(|servers| servers.get_mut(name))
            .and_then(Value::as_object_mut)
        {
            Some(entry) => {
                entry.insert("disabled".to_string(), Value::Bool(disabled));
                true
            }
            None => false,
        }
    }

    /// Flip the named entry's `disabled` flag. Returns the new value.
    pub fn toggle(&mut self, name: &str) -> Option<bool> {
        let disabled = !self.is_enabled(name)?;
        let next = !disabled;
        self.set_disabled(name, next).then_some(next)
    }

    /// Set `disabled` uniformly on every object entry.
    pub fn set_all_disabled(&mut self, disabled: bool) {
        if let Some(servers) = self.servers_mut() {
            for entry in servers.values_mut().filter_map(Value::as_object_mut) {
                entry.insert("disabled".to_string(), Value::Bool(disabled));
            }
        }
    }

    /// Two-space indented JSON, the on-disk format.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.root)
    }
}

/// One registered server definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEntry {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_approve: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    /// Fields this tool does not interpret, kept for round-tripping.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServerEntry {
    #[cfg(test)]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            ..Default::default()
        }
    }

    /// Build a view of an entry without failing on malformed fields.
    ///
    /// Wrong-typed fields read as empty; non-string list items are rendered
    /// as their JSON text.
    pub fn from_value(value: &Value) -> Self {
        let strings = |v: &Value| -> Vec<String> {
            v.as_array()
                .map(|items| {
                    items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let Some(map) = value.as_object() else {
            return Self::default();
        };

        let mut extra = map.clone();
        for key in ["command", "args", "env", "autoApprove", "disabled"] {
            extra.remove(key);
        }

        Self {
            command: map
                .get("command")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            args: map.get("args").map(strings).unwrap_or_default(),
            env: map.get("env").and_then(Value::as_object).cloned(),
            auto_approve: map
                .get("autoApprove")
                .filter(|v| v.is_array())
                .map(strings),
            disabled: map
                .get("disabled")
                .filter(|v| !v.is_null())
                .map(is_truthy),
            extra,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled.unwrap_or(false)
    }

    pub fn env_count(&self) -> usize {
        self.env.as_ref().map_or(0, Map::len)
    }

    pub fn auto_approve_count(&self) -> usize {
        self.auto_approve.as_ref().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> ConfigDocument {
        ConfigDocument::from_value(value).expect("object")
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!(1.5)));
    }

    #[test]
    fn test_normalize_missing_servers() {
        let mut document = doc(json!({ "other": 1 }));
        assert!(document.normalize_servers());
        assert_eq!(document.to_value(), json!({ "other": 1, "mcpServers": {} }));
        assert!(!document.normalize_servers());
    }

    #[test]
    fn test_toggle_is_reversible() {
        let mut document =
            doc(json!({ "mcpServers": { "a": { "command": "x", "args": [], "disabled": false } } }));
        assert_eq!(document.toggle("a"), Some(true));
        assert_eq!(document.is_enabled("a"), Some(false));
        assert_eq!(document.toggle("a"), Some(false));
        assert_eq!(document.is_enabled("a"), Some(true));
    }

    #[test]
    fn test_toggle_unknown_server() {
        let mut document = ConfigDocument::new();
        assert_eq!(document.toggle("missing"), None);
    }

    #[test]
    fn test_absent_disabled_means_enabled() {
        let document = doc(json!({ "mcpServers": { "a": { "command": "x", "args": [] } } }));
        assert_eq!(document.is_enabled("a"), Some(true));
    }

    #[test]
    fn test_set_all_disabled_overrides_prior_values() {
        let mut document = doc(json!({
            "mcpServers": {
                "a": { "command": "x", "args": [], "disabled": false },
                "b": { "command": "y", "args": [], "disabled": true },
                "c": { "command": "z", "args": [] }
            }
        }));
        document.set_all_disabled(true);
        assert!(document.server_names().iter().all(|n| document.is_enabled(n) == Some(false)));
        document.set_all_disabled(false);
        assert!(document.server_names().iter().all(|n| document.is_enabled(n) == Some(true)));
    }

    #[test]
    fn test_order_and_unknown_fields_survive_toggle() {
        let raw = r#"{
  "mcpServers": {
    "zeta": { "command": "docker", "args": ["run"], "timeout": 30 },
    "alpha": { "command": "uvx", "args": [] },
    "mid": { "command": "npx", "args": [] }
  },
  "version": 2
}"#;
        let mut document: ConfigDocument = serde_json::from_str(raw).unwrap();
        document.toggle("zeta");
        assert_eq!(document.server_names(), vec!["zeta", "alpha", "mid"]);
        let zeta = document.entry("zeta").unwrap();
        assert_eq!(zeta.extra.get("timeout"), Some(&json!(30)));
        assert_eq!(zeta.disabled, Some(true));
        let keys: Vec<&String> = document.as_map().keys().collect();
        assert_eq!(keys, vec!["mcpServers", "version"]);
    }

    #[test]
    fn test_pretty_json_uses_two_spaces() {
        let mut document = ConfigDocument::new();
        document.insert_server("a", &ServerEntry::new("x", vec![]));
        let text = document.to_pretty_json().unwrap();
        assert!(text.contains("\n  \"mcpServers\": {\n    \"a\": {\n      \"command\": \"x\""));
    }

    #[test]
    fn test_lenient_entry_view() {
        let entry = ServerEntry::from_value(&json!({
            "command": 7,
            "args": ["--port", 8080],
            "env": { "A": "1", "B": "2" },
            "autoApprove": "all",
            "disabled": 1
        }));
        assert_eq!(entry.command, "");
        assert_eq!(entry.args, vec!["--port".to_string(), "8080".to_string()]);
        assert_eq!(entry.env_count(), 2);
        assert_eq!(entry.auto_approve_count(), 0);
        assert!(!entry.is_enabled());
    }

    #[test]
    fn test_typed_entry_round_trip_keeps_camel_case() {
        let mut entry = ServerEntry::new("uvx", vec!["pkg@latest".to_string()]);
        entry.auto_approve = Some(vec!["read".to_string()]);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({ "command": "uvx", "args": ["pkg@latest"], "autoApprove": ["read"] })
        );
    }
}
