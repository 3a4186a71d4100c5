//! Call-recording `Syscall` double used by unit tests so they can assert on
//! the exact sequence of kernel calls a component would have made, without
//! needing real privilege or namespace support in the test environment.

use std::any::Any;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

use nix::mount::{MntFlags, MsFlags};
use nix::sched::CloneFlags;
use nix::unistd::{Gid, Uid};

use super::Syscall;
use crate::error::Result;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MountArgs {
    pub source: Option<PathBuf>,
    pub target: PathBuf,
    pub fstype: Option<String>,
    pub flags: MsFlags,
    pub data: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UmountArgs {
    pub target: PathBuf,
    pub flags: MntFlags,
}

#[derive(Default)]
pub struct TestHelperSyscall {
    unshare_args: RefCell<Vec<CloneFlags>>,
    mount_args: RefCell<Vec<MountArgs>>,
    umount_args: RefCell<Vec<UmountArgs>>,
    chroot_args: RefCell<Vec<PathBuf>>,
    set_no_new_privs_called: RefCell<bool>,
    uid_gid_map_args: RefCell<Vec<(Uid, Gid)>>,
    set_iface_lo_up_called: RefCell<bool>,
}

impl Syscall for TestHelperSyscall {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn unshare(&self, flags: CloneFlags) -> Result<()> {
        self.unshare_args.borrow_mut().push(flags);
        Ok(())
    }

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()> {
        self.mount_args.borrow_mut().push(MountArgs {
            source: source.map(|x| x.to_owned()),
            target: target.to_owned(),
            fstype: fstype.map(|x| x.to_owned()),
            flags,
            data: data.map(|x| x.to_owned()),
        });
        Ok(())
    }

    fn umount2(&self, target: &Path, flags: MntFlags) -> Result<()> {
        self.umount_args.borrow_mut().push(UmountArgs {
            target: target.to_owned(),
            flags,
        });
        Ok(())
    }

    fn chroot(&self, path: &Path) -> Result<()> {
        self.chroot_args.borrow_mut().push(path.to_owned());
        Ok(())
    }

    fn set_no_new_privs(&self) -> Result<()> {
        *self.set_no_new_privs_called.borrow_mut() = true;
        Ok(())
    }

    fn write_uid_gid_maps(&self, uid: Uid, gid: Gid) -> Result<()> {
        self.uid_gid_map_args.borrow_mut().push((uid, gid));
        Ok(())
    }

    fn set_iface_lo_up(&self) -> Result<()> {
        *self.set_iface_lo_up_called.borrow_mut() = true;
        Ok(())
    }
}

impl TestHelperSyscall {
    pub fn get_unshare_args(&self) -> Vec<CloneFlags> {
        self.unshare_args.borrow().clone()
    }

    pub fn get_mount_args(&self) -> Vec<MountArgs> {
        self.mount_args.borrow().clone()
    }

    pub fn get_umount_args(&self) -> Vec<UmountArgs> {
        self.umount_args.borrow().clone()
    }

    pub fn get_chroot_args(&self) -> Vec<PathBuf> {
        self.chroot_args.borrow().clone()
    }

    pub fn set_no_new_privs_called(&self) -> bool {
        *self.set_no_new_privs_called.borrow()
    }

    pub fn get_uid_gid_map_args(&self) -> Vec<(Uid, Gid)> {
        self.uid_gid_map_args.borrow().clone()
    }

    pub fn set_iface_lo_up_called(&self) -> bool {
        *self.set_iface_lo_up_called.borrow()
    }
}
