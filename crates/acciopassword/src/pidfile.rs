//! PID file guard held for the life of the server, and the `stop` path that
//! reads it back to interrupt a running server.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PidFileError {
    #[error("PID file {} already exists; is another instance running?", .0.display())]
    Exists(PathBuf),

    #[error("failed to write PID file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read PID file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("PID file {} does not hold a process id: {contents:?}", path.display())]
    Invalid { path: PathBuf, contents: String },

    #[cfg(unix)]
    #[error("failed to signal process {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("failed to remove PID file {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Removes the PID file when dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create `path` containing the current process id.
    ///
    /// # Errors
    ///
    /// Returns [`PidFileError::Exists`] if the file is already present.
    pub fn create(path: &Path) -> Result<Self, PidFileError> {
        let write_err = |source| PidFileError::Write {
            path: path.to_path_buf(),
            source,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => PidFileError::Exists(path.to_path_buf()),
                _ => write_err(e),
            })?;
        let guard = Self {
            path: path.to_path_buf(),
        };
        writeln!(file, "{}", std::process::id()).map_err(write_err)?;
        info!(path = %path.display(), "PID file written");
        Ok(guard)
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            // `stop` removes the file before the server exits.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove PID file");
            }
        }
    }
}

/// Read the process id recorded in `path`.
///
/// # Errors
///
/// Returns [`PidFileError::Read`] if the file cannot be read and
/// [`PidFileError::Invalid`] if it does not hold a positive integer.
pub fn read_pid(path: &Path) -> Result<i32, PidFileError> {
    let contents = std::fs::read_to_string(path).map_err(|source| PidFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    match contents.trim().parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(PidFileError::Invalid {
            path: path.to_path_buf(),
            contents: contents.trim().to_owned(),
        }),
    }
}

/// Interrupt the server recorded in `path` and remove the file.
///
/// Returns the signalled process id. The server drains as it would on Ctrl+C.
///
/// # Errors
///
/// Returns [`PidFileError`] if the file is missing or malformed, the process
/// cannot be signalled, or the file cannot be removed.
#[cfg(unix)]
pub fn stop(path: &Path) -> Result<i32, PidFileError> {
    use nix::{
        sys::signal::{kill, Signal},
        unistd::Pid,
    };

    let pid = read_pid(path)?;
    kill(Pid::from_raw(pid), Signal::SIGINT)
        .map_err(|source| PidFileError::Signal { pid, source })?;
    info!(pid, "sent interrupt to server");

    std::fs::remove_file(path).map_err(|source| PidFileError::Remove {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(pid)
}
