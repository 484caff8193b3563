//! Filesystem immutability lock contract (spec §4.7).
//!
//! The original implementation shells out to `chattr +i`/`-i`, with a sudo
//! password relay when not running as root (`utils/file_locker.py`). That
//! privilege-escalation path has no place in a non-interactive hook/CLI
//! binary and is explicitly out of scope (SPEC_FULL.md §11); only the
//! contract survives here — best-effort acquire before the first attempt,
//! guaranteed release afterward, silent continuation when the filesystem or
//! binary doesn't support it.

use std::path::{Path, PathBuf};
use std::process::Command;

/// RAII guard: `chattr -i` runs on drop regardless of why the guard is
/// dropped, matching the source's "releases it in a guaranteed-on-exit
/// block regardless of success/failure/timeout".
pub struct TaskFileLock {
    path: PathBuf,
    held: bool,
}

impl TaskFileLock {
    /// Best-effort acquire. Never fails the caller: an unsupported
    /// filesystem, a missing `chattr` binary, or a permissions error all
    /// result in `held: false` and a debug-level log line.
    pub fn acquire(path: &Path) -> Self {
        let held = run_chattr(path, "+i");
        if !held {
            tracing::debug!(path = %path.display(), "immutability lock not acquired, continuing without it");
        }
        TaskFileLock {
            path: path.to_path_buf(),
            held,
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }
}

impl Drop for TaskFileLock {
    fn drop(&mut self) {
        if self.held {
            run_chattr(&self.path, "-i");
        }
    }
}

fn run_chattr(path: &Path, flag: &str) -> bool {
    match Command::new("chattr").arg(flag).arg(path).output() {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_on_a_binary_that_does_not_exist_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("task.md");
        std::fs::write(&file, "content").unwrap();
        let lock = TaskFileLock::acquire(&file);
        // chattr is very likely unavailable/unprivileged in a test sandbox;
        // either way, acquiring and dropping must not panic or hang.
        drop(lock);
    }
}
