//! Shared types, errors, and the versioned report format for the qagraph engine.
//!
//! This crate provides the foundational types used across the other qagraph crates:
//! - `SpecError`, `BuildError`, `HostError`, `ReportError` and the umbrella `QaError`
//! - `ParamValue`: a literal parameter value (bool, integer, float, string)
//! - `Status`: the classified outcome of one check node
//! - `Report` / `NodeDiagnostic`: the persisted, versioned report record

use serde::{Deserialize, Serialize};

/// Schema revision of [`Report`]. Bumped whenever the persisted shape changes.
pub const REPORT_VERSION: &str = "2.0";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A malformed pipeline specification. Always fatal, raised before any host work.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpecError {
    #[error("Pipeline is not valid JSON: {0}")]
    Syntax(String),

    #[error("Pipeline root must contain exactly one key 'nodes', found [{}]", found.join(", "))]
    MissingKey { found: Vec<String> },

    #[error("Pipeline {path} must be {expected}")]
    WrongType { path: String, expected: &'static str },

    #[error("Pipeline node {index} is missing 'type_name'")]
    MissingTypeName { index: usize },

    #[error("Pipeline node {index} has unexpected key '{key}'")]
    UnknownKey { index: usize, key: String },
}

/// Failure reported by the external host session.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Invalid node type name: '{0}'")]
    UnknownNodeType(String),

    #[error("Host has no object with handle {0}")]
    UnknownHandle(u64),

    #[error("Host operation failed: {0}")]
    OperationFailed(String),

    #[error("Cook failed: {0}")]
    CookFailed(String),

    #[error("Host protocol error: {0}")]
    Protocol(String),

    #[error("Host IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The pipeline references something the host does not provide.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid node name: '{type_name}'")]
    UnknownNodeType { type_name: String },

    #[error("Invalid parm name: '{name}' in '{type_name}'")]
    UnknownParameter { type_name: String, name: String },

    #[error("Invalid button name: '{name}' in '{type_name}'")]
    UnknownTrigger { type_name: String, name: String },

    #[error("Substitution value '{value}' is bound to more than one token")]
    DuplicateSubstitution { value: String },

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Failure while collecting, persisting, or presenting a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Node '{node}' emitted a malformed diagnostic warning ({reason}): {warning}")]
    MalformedWarning {
        node: String,
        warning: String,
        reason: String,
    },

    #[error("Report version \"{found}\" does not match the expected one \"{expected}\"")]
    VersionMismatch { found: String, expected: String },

    #[error("Chain ending at '{0}' has no loader node to read the asset path from")]
    MissingLoader(String),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Report IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Unified error type for the qagraph engine.
#[derive(Debug, thiserror::Error)]
pub enum QaError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl QaError {
    /// Returns `true` for errors that mean the pipeline itself must be fixed.
    pub fn is_spec_defect(&self) -> bool {
        matches!(
            self,
            QaError::Spec(_)
                | QaError::Build(BuildError::UnknownNodeType { .. })
                | QaError::Build(BuildError::UnknownParameter { .. })
                | QaError::Build(BuildError::UnknownTrigger { .. })
        )
    }
}

/// A convenience alias for `Result<T, QaError>`.
pub type Result<T> = std::result::Result<T, QaError>;

// ---------------------------------------------------------------------------
// ParamValue: literal value assigned to a node parameter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ParamValue {
    /// Convert a JSON scalar. Returns `None` for null, arrays, and objects.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(ParamValue::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(ParamValue::Int(i)),
                None => n.as_f64().map(ParamValue::Float),
            },
            serde_json::Value::String(s) => Some(ParamValue::String(s.clone())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::String(s)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        ParamValue::Float(x)
    }
}

// ---------------------------------------------------------------------------
// Status: classified outcome of a check node
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Warn,
    Fail,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "pass",
            Status::Warn => "warn",
            Status::Fail => "fail",
            Status::Error => "error",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Report: versioned record of one asset's checks
// ---------------------------------------------------------------------------

// Fields are declared in alphabetical order so serialization is key-sorted.

/// Classified outcome attributed to one node of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDiagnostic {
    pub message: String,
    pub node_name: String,
    pub node_type: String,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Report {
    pub asset_path: String,
    pub cook_success: bool,
    pub diagnostics: Vec<NodeDiagnostic>,
    pub host: String,
    pub timestamp: String,
    pub user: String,
    pub version: String,
}

impl Report {
    /// `true` iff every diagnostic passed. A report without diagnostics passes.
    pub fn passed(&self) -> bool {
        self.diagnostics.iter().all(|d| d.status == Status::Pass)
    }

    /// Number of diagnostics with the given status.
    pub fn count(&self, status: Status) -> usize {
        self.diagnostics.iter().filter(|d| d.status == status).count()
    }

    /// Fail unless this report was produced by the current schema revision.
    pub fn ensure_current_version(&self) -> std::result::Result<(), ReportError> {
        if self.version != REPORT_VERSION {
            return Err(ReportError::VersionMismatch {
                found: self.version.clone(),
                expected: REPORT_VERSION.to_string(),
            });
        }
        Ok(())
    }
}
