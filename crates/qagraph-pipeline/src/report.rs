//! Report persistence, terminal rendering, and the published report schema.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use qagraph_types::{Report, ReportError, Status, REPORT_VERSION};
use serde_json::{json, Value};

/// Write `report` as pretty JSON, creating missing parent directories.
///
/// Keys come out in a fixed order, so writing an unchanged report twice
/// produces identical bytes.
pub fn write_report(report: &Report, path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    tracing::info!(
        path = %path.display(),
        diagnostics = report.diagnostics.len(),
        "Report written"
    );
    Ok(())
}

/// Load a report, rejecting any version other than the current one.
pub fn read_report(path: &Path) -> Result<Report, ReportError> {
    let text = std::fs::read_to_string(path)?;
    let report: Report = serde_json::from_str(&text)?;
    report.ensure_current_version()?;
    Ok(report)
}

/// Render the tree summary shown after a report is written.
///
/// ```text
/// [FAIL] Checks for props/crate.fbx
/// ├── check_polycount1
/// │   ├── FAIL | check_polycount
/// │   └── 12000 polygons, budget is 5000
/// └── check_uv1
///     └── PASS | check_uv
/// ```
pub fn render_terminal(report: &Report) -> Result<String, ReportError> {
    report.ensure_current_version()?;

    let mut out = String::new();
    let verdict = if report.passed() { "PASS" } else { "FAIL" };
    let _ = write!(out, "[{verdict}] Checks for {}", report.asset_path);
    if !report.cook_success {
        out.push_str(" (cook failed)");
    }
    out.push('\n');

    let count = report.diagnostics.len();
    for (i, diagnostic) in report.diagnostics.iter().enumerate() {
        let last = i + 1 == count;
        let (branch, indent) = if last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        let _ = writeln!(out, "{branch}{}", diagnostic.node_name);

        let status = diagnostic.status.as_str().to_uppercase();
        if diagnostic.message.is_empty() {
            let _ = writeln!(out, "{indent}└── {status} | {}", diagnostic.node_type);
        } else {
            let _ = writeln!(out, "{indent}├── {status} | {}", diagnostic.node_type);
            let mut lines = diagnostic.message.lines();
            if let Some(first) = lines.next() {
                let _ = writeln!(out, "{indent}└── {first}");
            }
            for rest in lines {
                let _ = writeln!(out, "{indent}    {rest}");
            }
        }
    }
    Ok(out)
}

/// JSON Schema for reports of the current version.
pub fn report_schema() -> Value {
    let statuses: Vec<&str> = [Status::Pass, Status::Warn, Status::Fail, Status::Error]
        .iter()
        .map(Status::as_str)
        .collect();

    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "QA report",
        "type": "object",
        "additionalProperties": false,
        "required": [
            "asset_path", "cook_success", "diagnostics", "host", "timestamp", "user", "version"
        ],
        "properties": {
            "asset_path": { "type": "string" },
            "cook_success": { "type": "boolean" },
            "diagnostics": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["message", "node_name", "node_type", "status"],
                    "properties": {
                        "message": { "type": "string" },
                        "node_name": { "type": "string" },
                        "node_type": { "type": "string" },
                        "status": { "type": "string", "enum": statuses }
                    }
                }
            },
            "host": { "type": "string" },
            "timestamp": { "type": "string", "format": "date-time" },
            "user": { "type": "string" },
            "version": { "type": "string", "const": REPORT_VERSION }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use qagraph_types::NodeDiagnostic;

    fn diagnostic(name: &str, status: Status, message: &str) -> NodeDiagnostic {
        NodeDiagnostic {
            message: message.into(),
            node_name: name.into(),
            node_type: name.trim_end_matches(char::is_numeric).into(),
            status,
        }
    }

    fn report(diagnostics: Vec<NodeDiagnostic>) -> Report {
        Report {
            asset_path: "props/crate.fbx".into(),
            cook_success: true,
            diagnostics,
            host: "ws01".into(),
            timestamp: "2026-01-01T00:00:00+00:00".into(),
            user: "artist".into(),
            version: REPORT_VERSION.into(),
        }
    }

    #[test]
    fn write_creates_directories_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/nested/crate.fbx.json");
        let original = report(vec![diagnostic("check_uv1", Status::Warn, "seams")]);

        write_report(&original, &path).unwrap();
        assert_eq!(read_report(&path).unwrap(), original);
    }

    #[test]
    fn keys_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.json");
        write_report(&report(Vec::new()), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let keys = [
            "asset_path",
            "cook_success",
            "diagnostics",
            "host",
            "timestamp",
            "user",
            "version",
        ];
        let positions: Vec<usize> = keys
            .iter()
            .map(|k| text.find(&format!("\"{k}\"")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn read_rejects_other_versions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        let mut old = report(Vec::new());
        old.version = "1.0".into();
        std::fs::write(&path, serde_json::to_string(&old).unwrap()).unwrap();
        assert!(matches!(
            read_report(&path),
            Err(ReportError::VersionMismatch { ref found, .. }) if found == "1.0"
        ));
    }

    #[test]
    fn render_pass_tree() {
        let text = render_terminal(&report(vec![diagnostic("check_polycount1", Status::Pass, "")]))
            .unwrap();
        assert_eq!(
            text,
            "[PASS] Checks for props/crate.fbx\n\
             └── check_polycount1\n    \
             └── PASS | check_polycount\n"
        );
    }

    #[test]
    fn render_fail_tree_with_messages() {
        let mut r = report(vec![
            diagnostic("check_polycount1", Status::Fail, "too dense"),
            diagnostic("check_uv1", Status::Pass, "ok"),
        ]);
        r.cook_success = false;
        let text = render_terminal(&r).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[FAIL] Checks for props/crate.fbx (cook failed)");
        assert_eq!(lines[1], "├── check_polycount1");
        assert_eq!(lines[2], "│   ├── FAIL | check_polycount");
        assert_eq!(lines[3], "│   └── too dense");
        assert_eq!(lines[4], "└── check_uv1");
        assert_eq!(lines[5], "    ├── PASS | check_uv");
        assert_eq!(lines[6], "    └── ok");
    }

    #[test]
    fn render_rejects_other_versions() {
        let mut r = report(Vec::new());
        r.version = "1.0".into();
        assert!(render_terminal(&r).is_err());
    }

    #[test]
    fn schema_pins_current_version() {
        let schema = report_schema();
        assert_eq!(schema["properties"]["version"]["const"], REPORT_VERSION);
        assert_eq!(
            schema["properties"]["diagnostics"]["items"]["properties"]["status"]["enum"]
                .as_array()
                .unwrap()
                .len(),
            4
        );
    }
}
