use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use hostagent_audit::{AuditEvent, AuditLogger, AuditRecord, ExportFormat};

/// One human-readable line per record.
pub(crate) fn describe(record: &AuditRecord) -> String {
    let ts = record.timestamp.format("%Y-%m-%d %H:%M:%S");
    let detail = match &record.event {
        AuditEvent::ToolExecution {
            tool_name,
            success,
            user_confirmed,
            execution_time,
            error,
            ..
        } => {
            let status = if *success { "ok" } else { "failed" };
            let mut line = format!("{tool_name} {status} in {execution_time:.3}s");
            if *user_confirmed {
                line.push_str(" (confirmed)");
            }
            if let Some(err) = error {
                line.push_str(&format!(": {err}"));
            }
            line
        }
        AuditEvent::PermissionDenied {
            tool_name,
            required_level,
            current_level,
        } => format!("{tool_name} needs {required_level}, configured {current_level}"),
        AuditEvent::ElevationRequest {
            tool_name,
            success,
            reason,
        } => format!(
            "{tool_name} elevation {} ({reason})",
            if *success { "granted" } else { "refused" }
        ),
        AuditEvent::UserConfirmation {
            tool_name,
            confirmed,
            cached,
        } => format!(
            "{tool_name} {}{}",
            if *confirmed { "allowed" } else { "denied" },
            if *cached { " (remembered)" } else { "" }
        ),
    };
    format!("{ts}  {:<18} {detail}", record.event.kind())
}

pub(crate) fn print_recent(audit: &AuditLogger, limit: usize) -> Result<()> {
    if !audit.is_enabled() {
        println!("audit logging is disabled");
        return Ok(());
    }
    let records = audit.recent_entries(limit)?;
    if records.is_empty() {
        println!("no audit records in {}", audit.path().display());
    }
    for record in &records {
        println!("{}", describe(record));
    }
    Ok(())
}

pub(crate) fn export(
    audit: &AuditLogger,
    format: ExportFormat,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    output: Option<&Path>,
) -> Result<()> {
    let text = audit.export(start, end, format)?;
    match output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("exported to {}", path.display());
        }
        None if text.is_empty() => println!("no matching audit records"),
        None => print!("{text}"),
    }
    Ok(())
}

pub(crate) fn clear(audit: &AuditLogger, yes: bool) -> Result<()> {
    if !yes {
        bail!("refusing to clear the audit log without --yes");
    }
    audit.clear()?;
    println!("audit log cleared; previous contents kept in {}.bak", audit.path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostagent_config::PermissionLevel;

    #[test]
    fn describes_each_event_kind() {
        let denied = AuditRecord::now(AuditEvent::PermissionDenied {
            tool_name: "delete_file".into(),
            required_level: PermissionLevel::Admin,
            current_level: PermissionLevel::Basic,
        });
        assert!(describe(&denied).contains("delete_file needs admin, configured basic"));

        let confirm = AuditRecord::now(AuditEvent::UserConfirmation {
            tool_name: "write_file".into(),
            confirmed: false,
            cached: true,
        });
        assert!(describe(&confirm).ends_with("write_file denied (remembered)"));
    }

    #[test]
    fn clear_requires_yes() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLogger::new(dir.path().join("audit.log"), true);
        assert!(clear(&audit, false).is_err());
        clear(&audit, true).unwrap();
        assert!(audit.path().exists());
    }

    #[test]
    fn export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLogger::new(dir.path().join("audit.log"), true);
        audit.log_user_confirmation("move_file", true, false);
        let out = dir.path().join("export.csv");
        export(&audit, ExportFormat::Csv, None, None, Some(&out)).unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("\"cached\",\"confirmed\",\"event_type\""));
    }
}
