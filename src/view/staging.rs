//! Numbered staging slots: a host source is first bound into a private slot
//! under the scratch root so its submounts can be enumerated, then re-bound
//! onto its final destination and detached from the slot.

use std::cell::Cell;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use nix::mount::{MntFlags, MsFlags};

use crate::error::{Error, Result};
use crate::mount_info::MountTable;
use crate::syscall::Syscall;

pub const STAGING_DIR_NAME: &str = ".staging";

pub struct Staging {
    base: PathBuf,
    next_slot: Cell<u32>,
}

impl Staging {
    pub fn new(scratch_root: &Path) -> Result<Self> {
        let base = scratch_root.join(STAGING_DIR_NAME);
        fs::create_dir(&base)
            .map_err(|_| Error::config(format!("failed to create staging dir {:?}", base)))?;
        Ok(Staging {
            base,
            next_slot: Cell::new(0),
        })
    }

    /// Binds `source` (a host path) into a fresh numbered slot, recursively.
    /// Returns the slot's path.
    pub fn stage(&self, syscall: &dyn Syscall, source: &Path) -> Result<PathBuf> {
        let slot_id = self.next_slot.get();
        self.next_slot.set(slot_id + 1);
        let slot = self.base.join(slot_id.to_string());

        let metadata = fs::metadata(source)
            .map_err(|_| Error::config(format!("{:?} does not exist", source)))?;
        if metadata.is_dir() {
            fs::create_dir(&slot)
                .map_err(|_| Error::config(format!("failed to create slot {:?}", slot)))?;
        } else {
            File::create(&slot)
                .map_err(|_| Error::config(format!("failed to create slot {:?}", slot)))?;
        }

        syscall.mount(
            Some(source),
            &slot,
            None,
            MsFlags::MS_BIND | MsFlags::MS_REC,
            None,
        )?;

        Ok(slot)
    }

    /// Detaches a slot after its contents have been re-bound to their final
    /// destination. The slot's now-empty directory entry is left in place
    /// for the final staging teardown pass.
    pub fn detach(&self, syscall: &dyn Syscall, slot: &Path) -> Result<()> {
        syscall.umount2(slot, MntFlags::MNT_DETACH)
    }

    /// Removes the staging area. Every slot must already be detached; a
    /// slot still appearing as a live mountpoint indicates a bookkeeping
    /// bug upstream, not a user error.
    pub fn teardown(&self, table: &MountTable) -> Result<()> {
        let mut entries: Vec<PathBuf> = fs::read_dir(&self.base)
            .map_err(|_| Error::config(format!("failed to read staging dir {:?}", self.base)))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        for entry in &entries {
            if table.mountpoint(entry).is_some() {
                return Err(Error::State {
                    path: entry.clone(),
                });
            }
            let metadata = fs::symlink_metadata(entry)
                .map_err(|_| Error::config(format!("failed to stat {:?}", entry)))?;
            if metadata.is_dir() {
                fs::remove_dir(entry)
                    .map_err(|_| Error::config(format!("failed to remove {:?}", entry)))?;
            } else {
                fs::remove_file(entry)
                    .map_err(|_| Error::config(format!("failed to remove {:?}", entry)))?;
            }
        }

        fs::remove_dir(&self.base)
            .map_err(|_| Error::config(format!("failed to remove staging dir {:?}", self.base)))
    }
}
