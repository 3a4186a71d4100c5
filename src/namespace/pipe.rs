//! One-shot pipe lock used to sequence the two nested forks.
//!
//! Each lock is a single close-on-exec pipe. The producer calls `notify`
//! once; the consumer calls `wait` once. Neither side is reusable after
//! that — a fresh `PipeLock` is created for each synchronization point.

use std::os::unix::io::RawFd;

use crate::error::{Error, Result};
use nix::fcntl::OFlag;
use nix::unistd::{close, pipe2, read};

pub struct PipeLock {
    rfd: RawFd,
    wfd: RawFd,
}

impl PipeLock {
    pub fn new() -> Result<Self> {
        let (rfd, wfd) = pipe2(OFlag::O_CLOEXEC).map_err(|e| Error::syscall("pipe2", e))?;
        Ok(PipeLock { rfd, wfd })
    }

    /// Block until the other end calls `notify`.
    pub fn wait(&self) -> Result<()> {
        close(self.wfd).map_err(|e| Error::syscall("close", e))?;
        let data: &mut [u8] = &mut [0];
        while read(self.rfd, data).map_err(|e| Error::syscall("read", e))? != 0 {}
        close(self.rfd).map_err(|e| Error::syscall("close", e))?;
        Ok(())
    }

    /// Release the other end's `wait` by closing both ends (EOF on read).
    pub fn notify(&self) -> Result<()> {
        close(self.rfd).map_err(|e| Error::syscall("close", e))?;
        close(self.wfd).map_err(|e| Error::syscall("close", e))?;
        Ok(())
    }
}
