//! Two prebuilt, mode-000 bind sources used to conceal paths: an empty
//! directory for hiding directories, an empty file for hiding files.

use std::fs::{self, File, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct HideTemplates {
    dir_template: PathBuf,
    file_template: PathBuf,
}

impl HideTemplates {
    pub fn new(scratch_root: &Path) -> Result<Self> {
        let dir_template = scratch_root.join(".hide-dir");
        let file_template = scratch_root.join(".hide-file");

        fs::create_dir(&dir_template)
            .map_err(|_| Error::config(format!("failed to create {:?}", dir_template)))?;
        fs::set_permissions(&dir_template, Permissions::from_mode(0o000))
            .map_err(|_| Error::config(format!("failed to chmod {:?}", dir_template)))?;

        File::create(&file_template)
            .map_err(|_| Error::config(format!("failed to create {:?}", file_template)))?;
        fs::set_permissions(&file_template, Permissions::from_mode(0o000))
            .map_err(|_| Error::config(format!("failed to chmod {:?}", file_template)))?;

        Ok(HideTemplates {
            dir_template,
            file_template,
        })
    }

    /// Selects the dir or file template depending on what's being hidden.
    pub fn template_for(&self, target_is_dir: bool) -> &Path {
        if target_is_dir {
            &self.dir_template
        } else {
            &self.file_template
        }
    }
}
