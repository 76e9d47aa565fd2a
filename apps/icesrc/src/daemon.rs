// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Pidfile lifecycle (spec.md §6 "Persisted state"): write the decimal PID
//! on startup, remove it on shutdown.
//!
//! `background` (fork-and-detach into a daemon) is not implemented: spawning
//! a second process and abandoning the controlling terminal from inside an
//! already-running tokio runtime isn't meaningful the way `fork()` is in the
//! original; DESIGN.md records this as a deliberate Open Question decision.
//! Supervising `icesrc` under a process manager (systemd, runit) gets the
//! same effect without forking.

use std::path::{Path, PathBuf};

/// Holds the pidfile path for the process lifetime; removes it on drop so
/// every exit path (clean shutdown, panic unwind) cleans up after itself.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Writes the current process id as a decimal string to `path`.
    pub fn create(path: &Path) -> std::io::Result<Self> {
        std::fs::write(path, format!("{}\n", std::process::id()))?;
        Ok(Self { path: path.to_path_buf() })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove pidfile");
        }
    }
}
