//! Materializes a normalized directive list into a private mount tree and
//! `chroot`s into it. This is the heart of the sandbox: every other
//! component exists to get a set of directives and a namespace to this
//! point.

mod hide;
mod staging;

use std::collections::HashMap;
use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::mount::MsFlags;

use crate::error::{Error, Result};
use crate::mount_info::MountTable;
use crate::policy::{MountDirective, MountKind};
use crate::syscall::Syscall;
use crate::utils;

use hide::HideTemplates;
use staging::Staging;

fn preserve_remount_flags() -> MsFlags {
    MsFlags::MS_BIND | MsFlags::MS_REC | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY
}

/// Maps a host-absolute directive path onto its place under `scratch_root`.
fn target_path(scratch_root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix("/") {
        Ok(rel) => scratch_root.join(rel),
        Err(_) => scratch_root.join(path),
    }
}

fn ensure_leaf(target: &Path, is_dir: bool) -> Result<()> {
    if let Some(parent) = target.parent() {
        utils::create_dir_all(parent)?;
    }
    if is_dir {
        fs::create_dir(target)
            .map_err(|_| Error::config(format!("failed to create {:?}", target)))?;
    } else {
        File::create(target)
            .map_err(|_| Error::config(format!("failed to create {:?}", target)))?;
    }
    Ok(())
}

fn remount_ro_preserving(syscall: &dyn Syscall, table: &MountTable, path: &Path) -> Result<()> {
    let flags = table.flags_of(path) | preserve_remount_flags();
    syscall.mount(Some(path), path, None, flags, None)
}

fn mount_tmpfs(syscall: &dyn Syscall, target: &Path, mode: &str) -> Result<()> {
    syscall.mount(
        Some(Path::new("tmpfs")),
        target,
        Some("tmpfs"),
        MsFlags::MS_REC | MsFlags::MS_NOSUID | MsFlags::MS_NOATIME,
        Some(&format!("mode={}", mode)),
    )
}

pub struct ViewBuilder<'a> {
    syscall: &'a dyn Syscall,
}

impl<'a> ViewBuilder<'a> {
    pub fn new(syscall: &'a dyn Syscall) -> Self {
        ViewBuilder { syscall }
    }

    /// Builds the sandbox tree under `scratch_root` (an existing, empty
    /// directory on the host) and `chroot`s into it. Must be called after
    /// the namespace set has been entered and private propagation set.
    pub fn build(&self, scratch_root: &Path, directives: &[MountDirective]) -> Result<()> {
        // Step 1: scratch mount + /proc mountpoint.
        mount_tmpfs(self.syscall, scratch_root, "550")?;
        let proc_target = scratch_root.join("proc");
        fs::create_dir(&proc_target)
            .map_err(|_| Error::config(format!("failed to create {:?}", proc_target)))?;
        fs::set_permissions(&proc_target, fs::Permissions::from_mode(0o550))
            .map_err(|_| Error::config(format!("failed to chmod {:?}", proc_target)))?;

        // Step 2: mount /proc. Must happen after PID namespace entry, which
        // the namespace launcher guarantees by the time this runs.
        self.syscall.mount(
            Some(Path::new("proc")),
            &proc_target,
            Some("proc"),
            MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
            None,
        )?;

        // Step 3: hide templates.
        let hide_templates = HideTemplates::new(scratch_root)?;

        // Step 4: stage every RO/RW source.
        let staging = Staging::new(scratch_root)?;
        let mut slots: HashMap<&Path, PathBuf> = HashMap::new();
        for directive in directives {
            if matches!(directive.kind, MountKind::Ro | MountKind::Rw) {
                let slot = staging.stage(self.syscall, &directive.path)?;
                slots.insert(directive.path.as_path(), slot);
            }
        }

        // Step 5: snapshot submounts under every staging slot, before
        // later mounts can shadow them.
        let snapshot = MountTable::snapshot()?;
        let mut submounts: HashMap<&Path, Vec<PathBuf>> = HashMap::new();
        for directive in directives {
            if let Some(slot) = slots.get(directive.path.as_path()) {
                let relatives: Vec<PathBuf> = snapshot
                    .submounts_under(slot)
                    .into_iter()
                    .filter_map(|m| m.mount_point.strip_prefix(slot).ok().map(Path::to_path_buf))
                    .collect();
                submounts.insert(directive.path.as_path(), relatives);
            }
        }

        // Step 6: apply every directive.
        let mut ro_finalize: Vec<&MountDirective> = Vec::new();
        for directive in directives {
            let target = target_path(scratch_root, &directive.path);
            match directive.kind {
                MountKind::Ro | MountKind::Rw => {
                    let slot = slots
                        .get(directive.path.as_path())
                        .expect("every RO/RW directive was staged in step 4");
                    let is_dir = fs::metadata(&directive.path)
                        .map(|m| m.is_dir())
                        .unwrap_or(true);
                    ensure_leaf(&target, is_dir)?;
                    self.syscall.mount(
                        Some(slot.as_path()),
                        &target,
                        None,
                        MsFlags::MS_BIND | MsFlags::MS_REC,
                        None,
                    )?;
                    staging.detach(self.syscall, slot)?;
                    if directive.kind == MountKind::Ro {
                        ro_finalize.push(directive);
                    }
                }
                MountKind::Hide => {
                    let is_dir = fs::metadata(&directive.path)
                        .map(|m| m.is_dir())
                        .unwrap_or(true);
                    ensure_leaf(&target, is_dir)?;
                    let template = hide_templates.template_for(is_dir);
                    self.syscall
                        .mount(Some(template), &target, None, MsFlags::MS_BIND, None)?;
                    self.syscall.mount(
                        Some(&target),
                        &target,
                        None,
                        MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
                        None,
                    )?;
                }
                MountKind::Empty => {
                    ensure_leaf(&target, true)?;
                    mount_tmpfs(self.syscall, &target, "750")?;
                }
                MountKind::EmptyRo => {
                    ensure_leaf(&target, true)?;
                    mount_tmpfs(self.syscall, &target, "550")?;
                    ro_finalize.push(directive);
                }
            }
        }

        // Step 7: read-only sweep, preserving each mount's current flags.
        let post_apply = MountTable::snapshot()?;
        for directive in &ro_finalize {
            let target = target_path(scratch_root, &directive.path);
            remount_ro_preserving(self.syscall, &post_apply, &target)?;
            if directive.kind == MountKind::Ro {
                if let Some(relatives) = submounts.get(directive.path.as_path()) {
                    for relative in relatives {
                        let sub_target = target.join(relative);
                        remount_ro_preserving(self.syscall, &post_apply, &sub_target)?;
                    }
                }
            }
        }

        // Step 8: staging teardown.
        let final_snapshot = MountTable::snapshot()?;
        staging.teardown(&final_snapshot)?;

        // Step 9: finalize the scratch root itself.
        remount_ro_preserving(self.syscall, &final_snapshot, scratch_root)?;

        // Step 10: chroot.
        self.syscall.chroot(scratch_root)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::test::TestHelperSyscall;

    #[test]
    fn test_build_empty_directive_mounts_tmpfs_and_chroots() {
        let scratch = tempfile::tempdir().unwrap();
        let syscall = TestHelperSyscall::default();
        let builder = ViewBuilder::new(&syscall);

        let directives = vec![MountDirective {
            path: PathBuf::from("/tmp"),
            kind: MountKind::Empty,
        }];

        builder.build(scratch.path(), &directives).unwrap();

        let mounts = syscall.get_mount_args();
        assert!(mounts.iter().any(|m| {
            m.target == scratch.path().join("tmp") && m.data.as_deref() == Some("mode=750")
        }));
        assert!(mounts
            .iter()
            .any(|m| m.target == scratch.path() && m.data.as_deref() == Some("mode=550")));
        assert_eq!(
            syscall.get_chroot_args(),
            vec![scratch.path().to_path_buf()]
        );
    }

    #[test]
    fn test_target_path_strips_leading_slash() {
        let scratch = PathBuf::from("/scratch");
        assert_eq!(
            target_path(&scratch, Path::new("/usr/bin")),
            PathBuf::from("/scratch/usr/bin")
        );
    }
}
