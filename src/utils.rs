//! Small filesystem and process helpers shared across the launcher.

use std::ffi::CString;
use std::fs;
use std::path::Path;

use nix::unistd;

use crate::error::{Error, Result};

pub fn do_exec(path: impl AsRef<Path>, args: &[String]) -> Result<()> {
    let p = CString::new(path.as_ref().to_string_lossy().to_string())
        .map_err(|_| Error::config("command contains a NUL byte"))?;
    let a: Vec<CString> = args
        .iter()
        .map(|s| CString::new(s.as_str()).unwrap_or_default())
        .collect();
    unistd::execvp(&p, &a).map_err(|e| Error::Exec {
        command: path.as_ref().to_string_lossy().into_owned(),
        source: e,
    })?;
    Ok(())
}

pub fn create_dir_all<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    fs::create_dir_all(path)
        .map_err(|_| Error::config(format!("failed to create directory {:?}", path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_dir_all_creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        create_dir_all(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
