//! Engine configuration and injected report identity.

use std::path::Path;

use qagraph_types::QaError;
use serde::Deserialize;

/// Names the node types and parameters the engine treats specially.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Asset-loading node types; skipped when collecting diagnostics.
    pub loader_types: Vec<String>,
    /// Parameter on the loader holding the asset path.
    pub loader_file_parm: String,
    pub report_node_type: String,
    pub report_path_parm: String,
    pub report_trigger: String,
    /// Node types allowed to emit no diagnostics; they resolve to `pass`.
    pub diagnostic_free_types: Vec<String>,
    /// Print the tree summary after each report write.
    pub render_terminal: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            loader_types: vec!["file".into()],
            loader_file_parm: "file".into(),
            report_node_type: "report_json".into(),
            report_path_parm: "json_path".into(),
            report_trigger: "write".into(),
            diagnostic_free_types: Vec::new(),
            render_terminal: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, QaError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, QaError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn is_loader(&self, node_type: &str) -> bool {
        self.loader_types.iter().any(|t| t == node_type)
    }

    pub fn is_diagnostic_free(&self, node_type: &str) -> bool {
        self.diagnostic_free_types.iter().any(|t| t == node_type)
    }
}

/// Who produced a report, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    pub host: String,
}

impl Identity {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
        }
    }

    /// Read the identity from the process environment.
    ///
    /// The user comes from `USER` or `USERNAME`. Shells rarely export `HOSTNAME`, so
    /// after `HOSTNAME` and `COMPUTERNAME` the host falls back to the OS hostname
    /// files and then the `hostname` command. Values that cannot be found are empty.
    pub fn from_env() -> Self {
        Self {
            user: env_var(&["USER", "USERNAME"]).unwrap_or_default(),
            host: env_var(&["HOSTNAME", "COMPUTERNAME"])
                .or_else(|| read_first(&HOSTNAME_FILES.map(Path::new)))
                .or_else(hostname_command)
                .unwrap_or_default(),
        }
    }
}

const HOSTNAME_FILES: [&str; 2] = ["/etc/hostname", "/proc/sys/kernel/hostname"];

fn env_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|n| std::env::var(n).ok().and_then(non_empty))
}

/// First non-blank contents among `paths`, trimmed.
fn read_first(paths: &[&Path]) -> Option<String> {
    paths
        .iter()
        .find_map(|p| std::fs::read_to_string(p).ok().and_then(non_empty))
}

fn hostname_command() -> Option<String> {
    let output = std::process::Command::new("hostname").output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok().and_then(non_empty)
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert!(config.is_loader("file"));
        assert!(!config.is_loader("check_polycount"));
        assert_eq!(config.report_node_type, "report_json");
        assert!(config.render_terminal);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(
            r#"{"diagnostic_free_types": ["null"], "render_terminal": false}"#,
        )
        .unwrap();
        assert!(config.is_diagnostic_free("null"));
        assert!(!config.render_terminal);
        assert_eq!(config.loader_file_parm, "file");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa.json");
        std::fs::write(&path, r#"{"loader_types": ["file", "alembic"]}"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert!(config.is_loader("alembic"));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(
            EngineConfig::from_json("{"),
            Err(QaError::Json(_))
        ));
    }

    #[test]
    fn hostname_files_are_read_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let blank = dir.path().join("blank");
        let named = dir.path().join("named");
        let other = dir.path().join("other");
        std::fs::write(&blank, "  \n").unwrap();
        std::fs::write(&named, "ws01\n").unwrap();
        std::fs::write(&other, "ws02\n").unwrap();

        let paths = [missing.as_path(), blank.as_path(), named.as_path(), other.as_path()];
        assert_eq!(read_first(&paths).as_deref(), Some("ws01"));
        assert_eq!(read_first(&[missing.as_path(), blank.as_path()]), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn os_hostname_is_available_without_env() {
        assert!(read_first(&HOSTNAME_FILES.map(Path::new)).is_some());
    }
}
