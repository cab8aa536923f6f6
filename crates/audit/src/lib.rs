//! Append-only JSON-lines audit trail for security-relevant events.
//!
//! Records go to their own file, never through `tracing`.  Writes are
//! serialized behind a mutex; reads open the file independently and skip
//! lines that fail to parse (e.g. a partially written tail).

pub mod events;
pub mod rotation;
pub mod sanitize;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use hostagent_config::{PermissionLevel, SecurityConfig};
use serde_json::Value;
use tracing::{debug, warn};

pub use events::{AuditEvent, AuditRecord};
pub use rotation::RotationPolicy;
pub use sanitize::{REDACTED, sanitize_parameters};

/// Character cap for `result_summary`.
pub const RESULT_SUMMARY_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => bail!("unsupported export format: {other}"),
        }
    }
}

/// Everything recorded about one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolExecutionEntry<'a> {
    pub tool_name: &'a str,
    /// Raw arguments; redacted before they are written.
    pub parameters: &'a Value,
    pub result: Option<&'a Value>,
    pub error: Option<&'a str>,
    pub user_confirmed: bool,
    pub execution_time: Duration,
    pub permission_level: PermissionLevel,
}

pub struct AuditLogger {
    path: PathBuf,
    enabled: bool,
    policy: RotationPolicy,
    writer: Mutex<()>,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
            policy: RotationPolicy::default(),
            writer: Mutex::new(()),
        }
    }

    pub fn from_config(cfg: &SecurityConfig) -> Self {
        Self::new(&cfg.audit_log_path, cfg.enable_audit_log)
    }

    pub fn with_rotation(mut self, policy: RotationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Writes ───────────────────────────────────────────────────────────────

    /// Stamp and append one record.  Failures are reported through `tracing`
    /// and never reach the caller.
    pub fn record(&self, event: AuditEvent) {
        if !self.enabled {
            return;
        }
        let record = AuditRecord::now(event);
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize audit record");
                return;
            }
        };

        let _guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = rotation::append_line(&self.path, &line, self.policy) {
            warn!(path = %self.path.display(), error = %e, "failed to write audit record");
        } else {
            debug!(event = record.event.kind(), tool = record.tool_name(), "audit record written");
        }
    }

    pub fn log_tool_execution(&self, entry: ToolExecutionEntry<'_>) {
        let success = entry.error.is_none();
        let result_summary = if success {
            entry.result.map(summarize_result)
        } else {
            None
        };
        self.record(AuditEvent::ToolExecution {
            tool_name: entry.tool_name.to_string(),
            parameters: sanitize_parameters(entry.parameters),
            success,
            user_confirmed: entry.user_confirmed,
            execution_time: entry.execution_time.as_secs_f64(),
            permission_level: entry.permission_level,
            result_summary,
            error: entry.error.map(str::to_string),
        });
    }

    pub fn log_permission_denied(
        &self,
        tool_name: &str,
        required_level: PermissionLevel,
        current_level: PermissionLevel,
    ) {
        self.record(AuditEvent::PermissionDenied {
            tool_name: tool_name.to_string(),
            required_level,
            current_level,
        });
    }

    pub fn log_elevation_request(&self, tool_name: &str, success: bool, reason: &str) {
        self.record(AuditEvent::ElevationRequest {
            tool_name: tool_name.to_string(),
            success,
            reason: reason.to_string(),
        });
    }

    pub fn log_user_confirmation(&self, tool_name: &str, confirmed: bool, cached: bool) {
        self.record(AuditEvent::UserConfirmation {
            tool_name: tool_name.to_string(),
            confirmed,
            cached,
        });
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    fn read_all(&self) -> Result<Vec<AuditRecord>> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        let Some(raw) = read_if_present(&self.path)? else {
            return Ok(Vec::new());
        };
        Ok(raw
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str::<AuditRecord>(l) {
                Ok(rec) => Some(rec),
                Err(e) => {
                    debug!(error = %e, "skipping malformed audit line");
                    None
                }
            })
            .collect())
    }

    /// The last `limit` well-formed records, oldest first.
    pub fn recent_entries(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let mut all = self.read_all()?;
        let skip = all.len().saturating_sub(limit);
        Ok(all.split_off(skip))
    }

    /// Records whose timestamp falls within the inclusive `[start, end]`
    /// window, rendered as a pretty JSON array or CSV.  Returns an empty string
    /// when nothing matches.
    pub fn export(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        format: ExportFormat,
    ) -> Result<String> {
        let records: Vec<AuditRecord> = self
            .read_all()?
            .into_iter()
            .filter(|r| start.is_none_or(|s| r.timestamp >= s))
            .filter(|r| end.is_none_or(|e| r.timestamp <= e))
            .collect();
        if records.is_empty() {
            return Ok(String::new());
        }

        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&records)?),
            ExportFormat::Csv => {
                let rows = records
                    .iter()
                    .map(serde_json::to_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(to_csv(&rows))
            }
        }
    }

    /// Move the live log to `<path>.bak`, replacing any previous backup, and
    /// start a fresh empty log.
    pub fn clear(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let _guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());

        if self.path.exists() {
            let backup = PathBuf::from(format!("{}.bak", self.path.display()));
            if backup.exists() {
                std::fs::remove_file(&backup)
                    .with_context(|| format!("failed to remove {}", backup.display()))?;
            }
            std::fs::rename(&self.path, &backup)
                .with_context(|| format!("failed to back up {}", self.path.display()))?;
        } else if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::File::create(&self.path)
            .with_context(|| format!("failed to create {}", self.path.display()))?;
        warn!(path = %self.path.display(), "audit log cleared");
        Ok(())
    }
}

/// Contents of `path`, or `None` when it does not exist (including when a
/// rotation or clear renamed it away mid-read).
fn read_if_present(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn summarize_result(result: &Value) -> String {
    let text = match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match text.char_indices().nth(RESULT_SUMMARY_LIMIT) {
        Some((cut, _)) => format!("{}... [truncated]", &text[..cut]),
        None => text,
    }
}

fn csv_field(value: Option<&Value>) -> String {
    let text = match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// Header is the sorted union of keys across all rows; every field quoted.
fn to_csv(rows: &[Value]) -> String {
    let header: BTreeSet<&str> = rows
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|o| o.keys().map(String::as_str))
        .collect();

    let mut out = header
        .iter()
        .map(|h| csv_field(Some(&Value::String((*h).to_string()))))
        .collect::<Vec<_>>()
        .join(",");
    out.push('\n');
    for row in rows {
        let line = header
            .iter()
            .map(|h| csv_field(row.get(*h)))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn logger(dir: &tempfile::TempDir) -> AuditLogger {
        AuditLogger::new(dir.path().join("logs/audit.log"), true)
    }

    fn exec_entry<'a>(params: &'a Value, result: Option<&'a Value>, error: Option<&'a str>) -> ToolExecutionEntry<'a> {
        ToolExecutionEntry {
            tool_name: "echo",
            parameters: params,
            result,
            error,
            user_confirmed: false,
            execution_time: Duration::from_millis(5),
            permission_level: PermissionLevel::Basic,
        }
    }

    #[test]
    fn reads_tolerate_a_log_renamed_away() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(&dir);
        log.log_user_confirmation("write_file", true, false);
        std::fs::rename(log.path(), dir.path().join("moved.log")).unwrap();

        assert!(read_if_present(log.path()).unwrap().is_none());
        assert!(log.recent_entries(10).unwrap().is_empty());
        assert_eq!(log.export(None, None, ExportFormat::Csv).unwrap(), "");
    }

    #[test]
    fn read_errors_other_than_missing_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the log file should be cannot be read as text.
        let log = AuditLogger::new(dir.path(), true);
        assert!(log.recent_entries(10).is_err());
    }

    #[test]
    fn disabled_logger_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLogger::new(dir.path().join("audit.log"), false);
        log.log_permission_denied("delete_file", PermissionLevel::Admin, PermissionLevel::Basic);
        assert!(!log.path().exists());
        assert!(log.recent_entries(10).unwrap().is_empty());
        assert_eq!(log.export(None, None, ExportFormat::Json).unwrap(), "");
        log.clear().unwrap();
        assert!(!log.path().exists());
    }

    #[test]
    fn tool_execution_is_redacted_and_summarized() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(&dir);
        let params = json!({"message": "hi", "api_key": "sk-123"});
        let result = json!("x".repeat(600));
        log.log_tool_execution(exec_entry(&params, Some(&result), None));

        let entries = log.recent_entries(10).unwrap();
        assert_eq!(entries.len(), 1);
        match &entries[0].event {
            AuditEvent::ToolExecution {
                parameters,
                success,
                result_summary,
                error,
                ..
            } => {
                assert!(success);
                assert_eq!(parameters["api_key"], REDACTED);
                assert_eq!(parameters["message"], "hi");
                let summary = result_summary.as_deref().unwrap();
                assert!(summary.ends_with("... [truncated]"));
                assert_eq!(summary.chars().count(), 500 + "... [truncated]".len());
                assert!(error.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert!(!raw.contains("sk-123"));
    }

    #[test]
    fn failed_execution_records_error_without_summary() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(&dir);
        let params = json!({});
        log.log_tool_execution(exec_entry(&params, None, Some("boom")));

        let entries = log.recent_entries(1).unwrap();
        match &entries[0].event {
            AuditEvent::ToolExecution {
                success,
                error,
                result_summary,
                ..
            } => {
                assert!(!success);
                assert_eq!(error.as_deref(), Some("boom"));
                assert!(result_summary.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn recent_entries_tails_and_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(&dir);
        for i in 0..5 {
            log.log_user_confirmation(&format!("tool{i}"), true, false);
        }
        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new().append(true).open(log.path()).unwrap();
            writeln!(f, "{{not json").unwrap();
        }

        let tail = log.recent_entries(2).unwrap();
        let names: Vec<_> = tail.iter().map(|r| r.tool_name().to_string()).collect();
        assert_eq!(names, vec!["tool3", "tool4"]);
        assert_eq!(log.recent_entries(100).unwrap().len(), 5);
    }

    #[test]
    fn export_filters_by_window() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(&dir);
        log.log_elevation_request("kill_process", false, "sudo unavailable");

        let past = Utc::now() - chrono::Duration::hours(1);
        let future = Utc::now() + chrono::Duration::hours(1);

        let json = log.export(Some(past), Some(future), ExportFormat::Json).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["event_type"], "elevation_request");

        assert_eq!(log.export(Some(future), None, ExportFormat::Json).unwrap(), "");
        assert_eq!(log.export(None, Some(past), ExportFormat::Csv).unwrap(), "");
    }

    #[test]
    fn csv_header_is_sorted_union_and_fields_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(&dir);
        log.log_permission_denied("delete_file", PermissionLevel::Admin, PermissionLevel::Advanced);
        log.log_elevation_request("delete_file", false, "said \"no\"");

        let csv = log.export(None, None, ExportFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "\"current_level\",\"event_type\",\"reason\",\"required_level\",\"success\",\"timestamp\",\"tool_name\""
        );
        let first = lines.next().unwrap();
        assert!(first.starts_with("\"advanced\",\"permission_denied\",\"\",\"admin\",\"\","));
        let second = lines.next().unwrap();
        assert!(second.contains("\"said \"\"no\"\"\""));
        assert!(second.contains("\"false\""));
        assert!(lines.next().is_none());
    }

    #[test]
    fn clear_moves_log_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(&dir);
        log.log_user_confirmation("write_file", true, false);
        log.clear().unwrap();

        let backup = PathBuf::from(format!("{}.bak", log.path().display()));
        assert!(backup.exists());
        assert!(std::fs::read_to_string(&backup).unwrap().contains("write_file"));
        assert_eq!(std::fs::read_to_string(log.path()).unwrap(), "");
        assert!(log.recent_entries(10).unwrap().is_empty());

        log.log_user_confirmation("move_file", false, false);
        log.clear().unwrap();
        let backup_text = std::fs::read_to_string(&backup).unwrap();
        assert!(backup_text.contains("move_file"));
        assert!(!backup_text.contains("write_file"));
    }

    #[test]
    fn writes_rotate_under_policy() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(&dir).with_rotation(RotationPolicy {
            max_bytes: 200,
            backups: 2,
        });
        for i in 0..10 {
            log.log_user_confirmation(&format!("tool{i}"), true, false);
        }
        assert!(rotation::backup_path(log.path(), 1).exists());
        assert!(!rotation::backup_path(log.path(), 3).exists());
    }

    #[test]
    fn export_format_parses() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
