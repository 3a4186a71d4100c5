//! Controlling-tty foreground process group handoff across the two nested
//! forks. Retargeting the foreground group is skipped outright when the fd
//! isn't a terminal, and skipped defensively when the caller doesn't
//! currently own the foreground group, to avoid the caller being stopped by
//! `SIGTTOU`.

use std::os::unix::io::RawFd;

use nix::errno::Errno;
use nix::unistd::{getpgrp, tcgetpgrp, tcsetpgrp, Pid};

use crate::error::{Error, Result};

pub fn safe_tc_setpgrp(fd: RawFd, pgrp: Pid) -> Result<()> {
    match tcgetpgrp(fd) {
        Ok(current) => {
            if current == getpgrp() {
                tcsetpgrp(fd, pgrp).map_err(|e| Error::syscall("tcsetpgrp", e))?;
            }
            Ok(())
        }
        Err(Errno::ENOTTY) => Ok(()),
        Err(e) => Err(Error::syscall("tcgetpgrp", e)),
    }
}
