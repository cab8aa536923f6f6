use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Size-based rotation for the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    /// Number of `<path>.N` files kept; the oldest is deleted on rotation.
    pub backups: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            backups: 5,
        }
    }
}

pub fn backup_path(path: &Path, index: usize) -> PathBuf {
    PathBuf::from(format!("{}.{index}", path.display()))
}

/// Append `line` plus a newline, rotating first when the write would push the
/// live file past `policy.max_bytes`.
pub fn append_line(path: &Path, line: &str, policy: RotationPolicy) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let current = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let incoming = line.len() as u64 + 1;
    if current > 0 && current + incoming > policy.max_bytes {
        rotate(path, policy)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    writeln!(file, "{line}").with_context(|| format!("failed to append to {}", path.display()))?;
    file.flush()?;
    Ok(())
}

/// Shift `<path>.N-1 → <path>.N` down to `<path> → <path>.1`, dropping the
/// oldest backup.  With zero backups the live file is simply truncated.
pub fn rotate(path: &Path, policy: RotationPolicy) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    if policy.backups == 0 {
        std::fs::remove_file(path)
            .with_context(|| format!("failed to truncate {}", path.display()))?;
        return Ok(());
    }

    let oldest = backup_path(path, policy.backups);
    if oldest.exists() {
        std::fs::remove_file(&oldest)
            .with_context(|| format!("failed to remove {}", oldest.display()))?;
    }
    for index in (1..policy.backups).rev() {
        let from = backup_path(path, index);
        if from.exists() {
            let to = backup_path(path, index + 1);
            std::fs::rename(&from, &to)
                .with_context(|| format!("failed to rotate {} to {}", from.display(), to.display()))?;
        }
    }
    let first = backup_path(path, 1);
    std::fs::rename(path, &first)
        .with_context(|| format!("failed to rotate {} to {}", path.display(), first.display()))?;
    Ok(())
}
