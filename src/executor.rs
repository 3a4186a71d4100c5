//! The last step: become the target command. Runs after `chroot`, inside
//! the grandchild.

use std::path::Path;

use nix::sys::signal::{self, SigHandler, Signal};

use crate::error::Result;
use crate::syscall::Syscall;
use crate::utils::do_exec;

pub struct Executor<'a> {
    syscall: &'a dyn Syscall,
}

impl<'a> Executor<'a> {
    pub fn new(syscall: &'a dyn Syscall) -> Self {
        Executor { syscall }
    }

    /// Changes into `cwd` (falling back to `/` with a stderr diagnostic if
    /// it doesn't exist inside the sandbox), resets every signal currently
    /// set to `ignore` back to `default`, sets `no_new_privs`, and execs
    /// `command` via `PATH` lookup. Never returns on success.
    pub fn exec(&self, cwd: &Path, command: &[String]) -> Result<()> {
        if std::env::set_current_dir(cwd).is_err() {
            eprintln!(
                "nsbox: {:?} does not exist in the sandbox, falling back to /",
                cwd
            );
            let _ = std::env::set_current_dir("/");
        }

        reset_ignored_signals();

        self.syscall.set_no_new_privs()?;

        do_exec(&command[0], command)
    }
}

/// Resets every signal currently dispositioned `ignore` back to `default`,
/// so the exec'd command sees a clean signal mask instead of inheriting
/// whatever the namespace setup chose to ignore (`SIGINT`, notably).
fn reset_ignored_signals() {
    for raw in 1..signal::SIGRTMAX() {
        let sig = match Signal::try_from(raw) {
            Ok(sig) => sig,
            Err(_) => continue,
        };
        // signal(2) returns the previous disposition; putting it straight
        // back unless it was `ignore` makes this a read with a side effect
        // only when we actually want one.
        if let Ok(previous) = unsafe { signal::signal(sig, SigHandler::SigDfl) } {
            if !matches!(previous, SigHandler::SigIgn) {
                unsafe {
                    let _ = signal::signal(sig, previous);
                }
            }
        }
    }
}
