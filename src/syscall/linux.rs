//! Real `Syscall` implementation, backed by `nix` and raw `libc` calls.

use std::any::Any;
use std::mem;
use std::path::Path;

use nix::errno::Errno;
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sched::{unshare, CloneFlags};
use nix::unistd::{self, Gid, Uid};

use super::Syscall;
use crate::error::{Error, Result};

/// Empty structure to implement `Syscall` for; it carries no state of its
/// own, matching the teacher crate's `LinuxSyscall` unit struct.
#[derive(Clone)]
pub struct LinuxSyscall;

const IFNAMSIZ: usize = 16;

#[repr(C)]
struct IfReq {
    ifr_name: [libc::c_char; IFNAMSIZ],
    // Only the `ifr_flags` member of the kernel union is used here; the
    // trailing padding pads the struct out to the union's full size
    // (sizeof(struct sockaddr)) so the kernel never writes past our buffer.
    ifr_flags: libc::c_short,
    _pad: [u8; 14],
}

impl Syscall for LinuxSyscall {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn unshare(&self, flags: CloneFlags) -> Result<()> {
        unshare(flags).map_err(|e| Error::syscall("unshare", e))
    }

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()> {
        mount(source, target, fstype, flags, data).map_err(|e| Error::syscall("mount", e))
    }

    fn umount2(&self, target: &Path, flags: MntFlags) -> Result<()> {
        umount2(target, flags).map_err(|e| Error::syscall("umount2", e))
    }

    fn chroot(&self, path: &Path) -> Result<()> {
        unistd::chroot(path).map_err(|e| Error::syscall("chroot", e))
    }

    fn set_no_new_privs(&self) -> Result<()> {
        // PR_SET_NO_NEW_PRIVS = 38; libc doesn't name this constant, so it
        // is spelled out explicitly, same as the original's own constant
        // table.
        const PR_SET_NO_NEW_PRIVS: libc::c_int = 38;
        let res = unsafe { libc::prctl(PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
        if res != 0 {
            return Err(Error::syscall("prctl(PR_SET_NO_NEW_PRIVS)", Errno::last()));
        }
        Ok(())
    }

    fn write_uid_gid_maps(&self, uid: Uid, gid: Gid) -> Result<()> {
        std::fs::write("/proc/self/uid_map", format!("{} {} 1\n", uid, uid))
            .map_err(|_| Error::syscall("write(uid_map)", Errno::last()))?;

        // setgroups must be denied before gid_map can be written by an
        // unprivileged process. Its absence on pre-3.19 kernels is fine.
        match std::fs::write("/proc/self/setgroups", "deny") {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(_) => return Err(Error::syscall("write(setgroups)", Errno::last())),
        }

        std::fs::write("/proc/self/gid_map", format!("{} {} 1\n", gid, gid))
            .map_err(|_| Error::syscall("write(gid_map)", Errno::last()))?;
        Ok(())
    }

    fn set_iface_lo_up(&self) -> Result<()> {
        let mut ifr: IfReq = unsafe { mem::zeroed() };
        for (dst, src) in ifr.ifr_name.iter_mut().zip(b"lo\0".iter()) {
            *dst = *src as libc::c_char;
        }

        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
        if fd < 0 {
            return Err(Error::syscall("socket", Errno::last()));
        }

        let get_res = unsafe { libc::ioctl(fd, libc::SIOCGIFFLAGS, &mut ifr) };
        if get_res < 0 {
            let errno = Errno::last();
            unsafe { libc::close(fd) };
            return Err(Error::syscall("ioctl(SIOCGIFFLAGS)", errno));
        }

        ifr.ifr_flags |= libc::IFF_UP as libc::c_short;

        let set_res = unsafe { libc::ioctl(fd, libc::SIOCSIFFLAGS, &ifr) };
        let errno = Errno::last();
        unsafe { libc::close(fd) };
        if set_res < 0 {
            return Err(Error::syscall("ioctl(SIOCSIFFLAGS)", errno));
        }
        Ok(())
    }
}
