//! A snapshot of `/proc/self/mountinfo`, used by the view builder to find
//! submounts created underneath a bind mount (each of which needs its own
//! read-only remount, since `MS_RDONLY` does not recurse across existing
//! mount points) and to discover each mount's current flags so a remount
//! can preserve them.

use std::path::{Path, PathBuf};

use nix::mount::MsFlags;
use procfs::process::{MountInfo, Process};

use crate::error::{Error, Result};

/// A queryable snapshot of the process's current mount table.
pub struct MountTable {
    entries: Vec<MountInfo>,
}

impl MountTable {
    /// Reads `/proc/self/mountinfo` fresh. Call this again after every
    /// mount/unmount whose submounts you need to see.
    pub fn snapshot() -> Result<Self> {
        let process = Process::myself().map_err(|_| Error::config("failed to open /proc/self"))?;
        let entries = process
            .mountinfo()
            .map_err(|_| Error::config("failed to parse /proc/self/mountinfo"))?;
        Ok(MountTable { entries })
    }

    /// All mount points strictly beneath `prefix` (not `prefix` itself),
    /// in the order the kernel reported them.
    pub fn submounts_under(&self, prefix: &Path) -> Vec<&MountInfo> {
        self.entries
            .iter()
            .filter(|m| m.mount_point != prefix && m.mount_point.starts_with(prefix))
            .collect()
    }

    /// The entry whose mount point is exactly `path`, if any. Mount
    /// namespaces can stack several mounts at one path; the last one in
    /// the file is the currently-visible one.
    pub fn mountpoint(&self, path: &Path) -> Option<&MountInfo> {
        self.entries.iter().rev().find(|m| m.mount_point == path)
    }

    /// The `MsFlags` a fresh bind-remount of `path` should preserve, derived
    /// from the mount options the kernel currently reports for it. Unknown
    /// options are ignored, same as the reference implementation this is
    /// ported from.
    pub fn flags_of(&self, path: &Path) -> MsFlags {
        self.mountpoint(path)
            .map(|m| mount_options_to_flags(m))
            .unwrap_or_else(MsFlags::empty)
    }
}

/// Maps the per-mount option strings `/proc/self/mountinfo` reports to the
/// `MS_*` flags that reproduce them on a bind remount.
fn mount_options_to_flags(info: &MountInfo) -> MsFlags {
    let mut flags = MsFlags::empty();
    for key in info.mount_options.keys() {
        match key.as_str() {
            "ro" => flags |= MsFlags::MS_RDONLY,
            "nosuid" => flags |= MsFlags::MS_NOSUID,
            "nodev" => flags |= MsFlags::MS_NODEV,
            "noexec" => flags |= MsFlags::MS_NOEXEC,
            "sync" => flags |= MsFlags::MS_SYNCHRONOUS,
            "mand" => flags |= MsFlags::MS_MANDLOCK,
            "dirsync" => flags |= MsFlags::MS_DIRSYNC,
            "noatime" => flags |= MsFlags::MS_NOATIME,
            "nodiratime" => flags |= MsFlags::MS_NODIRATIME,
            "relatime" => flags |= MsFlags::MS_RELATIME,
            "silent" => flags |= MsFlags::MS_SILENT,
            "iversion" => flags |= MsFlags::MS_I_VERSION,
            "strictatime" => flags |= MsFlags::MS_STRICTATIME,
            "lazytime" => flags |= MsFlags::MS_LAZYTIME,
            _ => {}
        }
    }
    flags
}

/// Paths that must never be touched by the mount policy. Mirrors the one
/// reserved prefix the launcher itself relies on for its own scratch root.
pub fn is_reserved(path: &Path) -> bool {
    path == Path::new("/run") || path.starts_with("/run/nsbox")
}

pub fn canonicalize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    std::fs::canonicalize(path)
        .map_err(|_| Error::config(format!("{:?} does not exist", path)))
}
