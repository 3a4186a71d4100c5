//! Namespace entry: the user/mount/PID/IPC(/net) namespace set, the two
//! nested forks that give the sandbox a usable PID-1 and reaper, terminal
//! foreground-group handoff, and exit-status mirroring.

mod idmap;
mod launcher;
pub mod pipe;
mod tty;

pub use launcher::NamespaceLauncher;
