//! Thin, typed wrapper over the kernel calls the sandbox needs: `unshare`,
//! `mount`, `umount2`, `chroot`, `prctl(PR_SET_NO_NEW_PRIVS)`, and the
//! uid/gid/setgroups map writes that establish identity mapping in a fresh
//! user namespace. Every failure is converted into a structured
//! [`crate::error::Error::Syscall`].

pub mod linux;
pub mod test;

use std::any::Any;
use std::path::Path;

use nix::mount::{MntFlags, MsFlags};
use nix::sched::CloneFlags;
use nix::unistd::{Gid, Uid};

use crate::error::Result;

pub trait Syscall {
    fn as_any(&self) -> &dyn Any;

    fn unshare(&self, flags: CloneFlags) -> Result<()>;

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()>;

    fn umount2(&self, target: &Path, flags: MntFlags) -> Result<()>;

    fn chroot(&self, path: &Path) -> Result<()>;

    /// Sets `PR_SET_NO_NEW_PRIVS`, making it impossible for the exec'd
    /// command or any of its descendants to gain privileges via set-uid
    /// binaries or file capabilities.
    fn set_no_new_privs(&self) -> Result<()>;

    /// Writes identity uid/gid maps for the current process, writing
    /// `"deny"` to `/proc/self/setgroups` first. Absence of `setgroups`
    /// (pre-3.19 kernels) is tolerated; any other failure is fatal.
    fn write_uid_gid_maps(&self, uid: Uid, gid: Gid) -> Result<()>;

    /// Brings the loopback interface up in the current (presumably fresh)
    /// network namespace via a raw ioctl, avoiding a netlink dependency for
    /// a single one-shot operation.
    fn set_iface_lo_up(&self) -> Result<()>;
}

pub fn create_syscall() -> Box<dyn Syscall> {
    if cfg!(test) {
        Box::new(test::TestHelperSyscall::default())
    } else {
        Box::new(linux::LinuxSyscall)
    }
}
