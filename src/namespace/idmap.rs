//! Identity uid/gid mapping for the fresh user namespace.

use nix::unistd::{getgid, getuid};

use crate::error::Result;
use crate::syscall::Syscall;

/// Maps the invoking user's uid/gid identically into the new user
/// namespace, so nothing inside the sandbox runs with more or less
/// privilege than the caller already had.
pub fn setup_identity_mapping(syscall: &dyn Syscall) -> Result<()> {
    syscall.write_uid_gid_maps(getuid(), getgid())
}
