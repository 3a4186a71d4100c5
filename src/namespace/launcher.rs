//! The namespace-entry state machine: one `unshare`, two nested `fork`s,
//! terminal foreground-group handoff, reaping, and exit-status mirroring.
//!
//! Three processes exist once this returns: the outer monitor (still in the
//! original PID namespace) never returns from [`NamespaceLauncher::enter`]
//! — it blocks in its own `wait` loop and then calls `process::exit`. The
//! reaper (PID 1 of the new PID namespace) likewise never returns. Only the
//! grandchild — the future command process — gets a `Ok(())` back from
//! `enter`.

use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::sys::signal::{kill, signal, SigHandler, Signal};
use nix::sys::wait::{wait, WaitStatus};
use nix::unistd::{fork, getpid, setpgid, ForkResult, Pid};

use super::idmap::setup_identity_mapping;
use super::pipe::PipeLock;
use super::tty::safe_tc_setpgrp;
use crate::error::{Error, Result};
use crate::syscall::Syscall;

const STDIN_FD: i32 = libc::STDIN_FILENO;

pub struct NamespaceLauncher {
    syscall: Box<dyn Syscall>,
    nonet: bool,
}

impl NamespaceLauncher {
    pub fn new(syscall: Box<dyn Syscall>, nonet: bool) -> Self {
        NamespaceLauncher { syscall, nonet }
    }

    /// The syscall gate this launcher was constructed with, for reuse by
    /// the view builder and executor once `enter` returns in the
    /// grandchild.
    pub fn syscall(&self) -> &dyn Syscall {
        self.syscall.as_ref()
    }

    /// Enters the namespace set and performs the two nested forks. Only
    /// returns in the grandchild; every other branch exits the process
    /// directly, mirroring the eventual command's exit status.
    pub fn enter(&self, scratch_root: &Path) -> Result<()> {
        let outer_lock = PipeLock::new()?;

        let mut flags = CloneFlags::CLONE_NEWUSER
            | CloneFlags::CLONE_NEWNS
            | CloneFlags::CLONE_NEWPID
            | CloneFlags::CLONE_NEWIPC;
        if self.nonet {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        self.syscall.unshare(flags)?;

        match unsafe { fork() }.map_err(|e| Error::syscall("fork", e))? {
            ForkResult::Parent { child } => {
                self.run_outer_monitor(child, &outer_lock, scratch_root)
            }
            ForkResult::Child => self.run_intermediate(&outer_lock),
        }
    }

    fn run_outer_monitor(&self, child: Pid, lock: &PipeLock, scratch_root: &Path) -> Result<()> {
        ignore_sigint();
        let _ = safe_tc_setpgrp(STDIN_FD, child);
        lock.notify()?;

        let status = reap_children(child)?;

        let _ = self
            .syscall
            .umount2(scratch_root, nix::mount::MntFlags::MNT_DETACH);
        let _ = std::fs::remove_dir(scratch_root);

        exit_as_status(status)
    }

    fn run_intermediate(&self, outer_lock: &PipeLock) -> Result<()> {
        setup_identity_mapping(self.syscall.as_ref())?;
        mount_private_propagation(self.syscall.as_ref())?;

        if self.nonet {
            if let Err(e) = self.syscall.set_iface_lo_up() {
                log::warn!("failed to bring up loopback interface: {}", e);
            }
        }

        outer_lock.wait()?;

        let reaper_lock = PipeLock::new()?;
        match unsafe { fork() }.map_err(|e| Error::syscall("fork", e))? {
            ForkResult::Parent { child } => self.run_reaper(child, &reaper_lock),
            ForkResult::Child => self.run_grandchild(&reaper_lock),
        }
    }

    fn run_reaper(&self, child: Pid, lock: &PipeLock) -> Result<()> {
        ignore_sigint();
        let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
        let _ = safe_tc_setpgrp(STDIN_FD, child);
        lock.notify()?;

        let status = reap_children(child)?;
        exit_as_status(status)
    }

    fn run_grandchild(&self, lock: &PipeLock) -> Result<()> {
        lock.wait()?;
        let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
        Ok(())
    }
}

fn ignore_sigint() {
    unsafe {
        let _ = signal(Signal::SIGINT, SigHandler::SigIgn);
    }
}

fn mount_private_propagation(syscall: &dyn Syscall) -> Result<()> {
    syscall.mount(
        None,
        Path::new("/"),
        None,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None,
    )
}

/// Waits for every child (including reparented orphans) until `ECHILD`,
/// tracking `target`'s own status along the way.
fn reap_children(target: Pid) -> Result<WaitStatus> {
    let mut target_status = None;
    loop {
        match wait() {
            Ok(status) => {
                if status.pid() == Some(target) {
                    target_status = Some(status);
                }
            }
            Err(nix::errno::Errno::ECHILD) => break,
            Err(e) => return Err(Error::syscall("wait", e)),
        }
    }
    target_status.ok_or_else(|| Error::config("target child was never reaped"))
}

/// Mirrors `status` onto this process's own exit: re-raises the same
/// signal if the child was signal-killed (falling back to `128 + signum`
/// if that doesn't take effect after a couple of attempts), else exits with
/// the child's own exit code.
fn exit_as_status(status: WaitStatus) -> ! {
    match status {
        WaitStatus::Signaled(_, sig, _) => {
            for _ in 0..2 {
                unsafe {
                    let _ = signal(sig, SigHandler::SigDfl);
                }
                let _ = kill(getpid(), sig);
                sleep(Duration::from_millis(100));
            }
            std::process::exit(128 + sig as i32);
        }
        WaitStatus::Exited(_, code) => std::process::exit(code),
        _ => std::process::exit(1),
    }
}
