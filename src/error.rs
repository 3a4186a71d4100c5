//! Structured error taxonomy for the sandbox launcher.
//!
//! Library code returns `Result<T, Error>`; the binary boundary in `main.rs`
//! widens this into `anyhow::Result<()>` via the blanket `std::error::Error`
//! impl `thiserror` derives for us.

use nix::errno::Errno;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The user's mount policy is invalid: a nonexistent path, a path under
    /// the reserved scratch-root prefix, a duplicate across categories, or a
    /// non-HIDE path beneath a HIDE path.
    #[error("invalid policy: {0}")]
    Config(String),

    /// A kernel call was rejected. Carries the syscall name so the
    /// diagnostic can name exactly what failed, independent of errno's
    /// usually-terse `Display`.
    #[error("{name} failed: {errno}")]
    Syscall { name: &'static str, errno: Errno },

    /// The staging area still contained a live mountpoint at teardown time.
    /// Indicates a bug in ViewBuilder's own bookkeeping, not a user error.
    #[error("staging area {path:?} still mounted at teardown")]
    State { path: PathBuf },

    /// `execvp` of the target command failed.
    #[error("failed to exec {command:?}: {source}")]
    Exec {
        command: String,
        #[source]
        source: Errno,
    },
}

impl Error {
    pub fn syscall(name: &'static str, errno: Errno) -> Self {
        Error::Syscall { name, errno }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
