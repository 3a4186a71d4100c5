//! Normalizes the user's requested mount policy plus the built-in defaults
//! into a sorted, conflict-free list of [`MountDirective`]s.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::mount_info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MountKind {
    Ro,
    Rw,
    Hide,
    Empty,
    EmptyRo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountDirective {
    pub path: PathBuf,
    pub kind: MountKind,
}

/// The raw, unmerged policy as collected from the CLI: one path list per
/// category, plus the ambient cwd/network settings.
#[derive(Debug, Default, Clone)]
pub struct RawPolicy {
    pub ro: Vec<PathBuf>,
    pub rw: Vec<PathBuf>,
    pub hide: Vec<PathBuf>,
    pub empty: Vec<PathBuf>,
    pub empty_ro: Vec<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub nonet: bool,
    pub command: Vec<String>,
}

/// Top-level host directories bound read-only by default, when present.
const DEFAULT_RO_NAMES: &[&str] = &[
    "bin", "boot", "etc", "sbin", "selinux", "sys", "usr", "var", "mnt",
];

const DEFAULT_RW_DEVICES: &[&str] = &[
    "/dev/null",
    "/dev/zero",
    "/dev/full",
    "/dev/random",
    "/dev/urandom",
    "/dev/tty",
    "/dev/pts",
    "/dev/ptmx",
];

const DEFAULT_HIDE: &[&str] = &["/sys/fs/fuse"];

/// Builds the default category lists by scanning the host's top-level
/// directories and merging in the fixed device/tmp/home entries. `home_dir`
/// and `runtime_dir` (`/run/<uid>`) are supplied by the caller since they
/// depend on the invoking user's identity.
pub fn default_policy(home_dir: &Path, runtime_dir: &Path) -> Result<RawPolicy> {
    let mut ro = Vec::new();
    let mut hide = Vec::new();

    for entry in std::fs::read_dir("/")
        .map_err(|_| Error::config("failed to read /"))?
    {
        let entry = entry.map_err(|_| Error::config("failed to read entry under /"))?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if matches!(name.as_ref(), "dev" | "home" | "proc" | "run" | "sys" | "tmp") {
            continue;
        }

        let file_type = entry
            .file_type()
            .map_err(|_| Error::config(format!("failed to stat {:?}", path)))?;

        if file_type.is_symlink() {
            // Materialize as an RO bind of the canonicalized target rather
            // than skipping it outright, so merged-/usr hosts (where
            // e.g. /lib is itself a symlink) still get RO coverage.
            ro.push(path);
            continue;
        }

        if DEFAULT_RO_NAMES.contains(&name.as_ref()) || name.starts_with("lib") {
            ro.push(path);
        } else {
            hide.push(path);
        }
    }

    let rw = DEFAULT_RW_DEVICES
        .iter()
        .map(PathBuf::from)
        .filter(|p| p.exists())
        .collect();

    let hide: Vec<PathBuf> = hide
        .into_iter()
        .chain(DEFAULT_HIDE.iter().map(PathBuf::from))
        .filter(|p| p.exists())
        .collect();

    let empty = vec![
        PathBuf::from("/tmp"),
        PathBuf::from("/var/tmp"),
        PathBuf::from("/dev/shm"),
        runtime_dir.to_path_buf(),
        home_dir.to_path_buf(),
    ];

    let empty_ro = vec![
        PathBuf::from("/home"),
        PathBuf::from("/dev"),
        PathBuf::from("/run"),
    ];

    Ok(RawPolicy {
        ro,
        rw,
        hide,
        empty,
        empty_ro,
        cwd: None,
        nonet: false,
        command: Vec::new(),
    })
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Resolves symlinks and `~` in `path`, failing if it doesn't exist on the
/// host. Used for RO/RW/HIDE, which all bind an existing host path.
fn preprocess_existing_path(path: &Path) -> Result<PathBuf> {
    mount_info::canonicalize(expand_tilde(path))
}

/// Resolves `~` and makes `path` absolute, without requiring it to exist.
/// Used for EMPTY/EMPTYRO, whose host path is only ever a fresh mountpoint
/// the view builder creates, never a bind source.
pub(crate) fn preprocess_plain_path(path: &Path) -> Result<PathBuf> {
    let expanded = expand_tilde(path);
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        let cwd = std::env::current_dir().map_err(|_| Error::config("failed to read cwd"))?;
        Ok(cwd.join(expanded))
    }
}

fn preprocess_all(paths: Vec<PathBuf>, preprocess: fn(&Path) -> Result<PathBuf>) -> Result<Vec<PathBuf>> {
    paths.iter().map(|p| preprocess(p)).collect()
}

/// Merges `user` into `defaults` for one category: user entries override a
/// default with the same (preprocessed) path, then any remaining user
/// entries are appended. `defaults` is expected to already have every
/// user-claimed path (from any category) stripped out by the caller.
fn override_category(defaults: Vec<PathBuf>, user: Vec<PathBuf>) -> Vec<PathBuf> {
    let user_set: std::collections::HashSet<_> = user.iter().cloned().collect();
    let mut merged: Vec<PathBuf> = defaults
        .into_iter()
        .filter(|p| !user_set.contains(p))
        .collect();
    merged.extend(user);
    merged
}

/// Normalizes `raw` (user policy, already merged over defaults by
/// [`override_category`] for each list) into the sorted, deduplicated,
/// conflict-free directive sequence the view builder consumes.
pub fn plan(defaults: RawPolicy, user: RawPolicy) -> Result<Vec<MountDirective>> {
    let user_ro = preprocess_all(user.ro, preprocess_existing_path)?;
    let user_rw = preprocess_all(user.rw, preprocess_existing_path)?;
    let user_hide = preprocess_all(user.hide, preprocess_existing_path)?;
    let user_empty = preprocess_all(user.empty, preprocess_plain_path)?;
    let user_empty_ro = preprocess_all(user.empty_ro, preprocess_plain_path)?;

    let user_categories: &[(&[PathBuf], MountKind)] = &[
        (&user_ro, MountKind::Ro),
        (&user_rw, MountKind::Rw),
        (&user_hide, MountKind::Hide),
        (&user_empty, MountKind::Empty),
        (&user_empty_ro, MountKind::EmptyRo),
    ];

    // Reject reserved and cross-category-duplicate paths among
    // *user-supplied* entries only; the reserved prefix and "one category
    // per path" rules exist to stop the user from fighting the launcher or
    // itself, not to reject the launcher's own defaults.
    let mut user_by_path: HashMap<PathBuf, MountKind> = HashMap::new();
    for (paths, kind) in user_categories {
        for path in *paths {
            if mount_info::is_reserved(path) {
                return Err(Error::config(format!(
                    "{:?} is reserved for internal use",
                    path
                )));
            }
            if let Some(existing) = user_by_path.insert(path.clone(), *kind) {
                if existing != *kind {
                    return Err(Error::config(format!(
                        "{:?} appears in more than one category",
                        path
                    )));
                }
            }
        }
    }

    // A user-specified path reclassifies a default out of whichever
    // category it happened to land in, not just its own: strip every
    // user-claimed path from every default category before merging.
    let strip = |defaults: Vec<PathBuf>, preprocess: fn(&Path) -> Result<PathBuf>| -> Result<Vec<PathBuf>> {
        Ok(preprocess_all(defaults, preprocess)?
            .into_iter()
            .filter(|p| !user_by_path.contains_key(p))
            .collect())
    };
    let default_ro = strip(defaults.ro, preprocess_existing_path)?;
    let default_rw = strip(defaults.rw, preprocess_existing_path)?;
    let default_hide = strip(defaults.hide, preprocess_existing_path)?;
    let default_empty = strip(defaults.empty, preprocess_plain_path)?;
    let default_empty_ro = strip(defaults.empty_ro, preprocess_plain_path)?;

    let ro = override_category(default_ro, user_ro);
    let rw = override_category(default_rw, user_rw);
    let hide = override_category(default_hide, user_hide);
    let empty = override_category(default_empty, user_empty);
    let empty_ro = override_category(default_empty_ro, user_empty_ro);

    let mut by_path: HashMap<PathBuf, MountKind> = HashMap::new();
    let categories: &[(&[PathBuf], MountKind)] = &[
        (&ro, MountKind::Ro),
        (&rw, MountKind::Rw),
        (&hide, MountKind::Hide),
        (&empty, MountKind::Empty),
        (&empty_ro, MountKind::EmptyRo),
    ];

    for (paths, kind) in categories {
        for path in *paths {
            if let Some(existing) = by_path.insert(path.clone(), *kind) {
                if existing != *kind {
                    return Err(Error::config(format!(
                        "{:?} appears in more than one category",
                        path
                    )));
                }
            }
        }
    }

    let hide_paths: Vec<&PathBuf> = by_path
        .iter()
        .filter(|(_, k)| **k == MountKind::Hide)
        .map(|(p, _)| p)
        .collect();

    for (path, kind) in &by_path {
        if *kind == MountKind::Hide {
            continue;
        }
        for hide_path in &hide_paths {
            if path.starts_with(hide_path.as_path()) && path != *hide_path {
                return Err(Error::config(format!(
                    "{:?} lies beneath HIDE path {:?}",
                    path, hide_path
                )));
            }
        }
    }

    let mut directives: Vec<MountDirective> = by_path
        .into_iter()
        .map(|(path, kind)| MountDirective { path, kind })
        .collect();
    directives.sort_by(|a, b| a.path.cmp(&b.path));

    log::info!("normalized {} mount directives", directives.len());

    Ok(directives)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A scratch directory tree with a few real, non-symlink entries, so
    /// tests can canonicalize paths without depending on the host's own
    /// layout (e.g. a merged-`/usr` host where `/bin` is itself a symlink).
    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::create_dir(dir.path().join("a")).unwrap();
            std::fs::create_dir(dir.path().join("b")).unwrap();
            std::fs::create_dir(dir.path().join("a").join("sub")).unwrap();
            Fixture { dir }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }
    }

    fn directive(path: PathBuf, kind: MountKind) -> MountDirective {
        MountDirective { path, kind }
    }

    #[test]
    #[serial_test::serial]
    fn test_preprocess_plain_path_expands_tilde_against_home() {
        let previous = std::env::var_os("HOME");
        std::env::set_var("HOME", "/tmp/nsbox-test-home");
        let result = preprocess_plain_path(Path::new("~/project"));
        match previous {
            Some(value) => std::env::set_var("HOME", value),
            None => std::env::remove_var("HOME"),
        }
        assert_eq!(
            result.unwrap(),
            PathBuf::from("/tmp/nsbox-test-home/project")
        );
    }

    #[test]
    fn test_override_category_user_wins() {
        let fx = Fixture::new();
        let defaults = vec![fx.path("a"), fx.path("b")];
        let user = vec![fx.path("a")];
        let merged = override_category(defaults, user);
        assert_eq!(merged, vec![fx.path("b"), fx.path("a")]);
    }

    #[test]
    fn test_plan_allows_run_in_default_empty_ro() {
        // The built-in defaults place `/run` in EMPTYRO (SPEC_FULL §6); this
        // must not trip the reserved-prefix check, which only applies to
        // user-supplied paths.
        let mut defaults = RawPolicy::default();
        defaults.empty_ro = vec![PathBuf::from("/run")];
        let directives = plan(defaults, RawPolicy::default()).unwrap();
        assert!(directives
            .iter()
            .any(|d| d.path == PathBuf::from("/run") && d.kind == MountKind::EmptyRo));
    }

    #[test]
    fn test_plan_user_reclassifies_default_into_different_category() {
        let fx = Fixture::new();
        let mut defaults = RawPolicy::default();
        defaults.empty_ro = vec![fx.path("a")];
        let mut user = RawPolicy::default();
        user.rw = vec![fx.path("a")];

        let directives = plan(defaults, user).unwrap();
        assert_eq!(
            directives,
            vec![directive(fx.path("a"), MountKind::Rw)]
        );
    }

    #[test]
    fn test_plan_rejects_duplicate_across_categories() {
        let fx = Fixture::new();
        let mut user = RawPolicy::default();
        user.ro = vec![fx.path("a")];
        user.rw = vec![fx.path("a")];
        assert!(plan(RawPolicy::default(), user).is_err());
    }

    #[test]
    fn test_plan_rejects_hide_conflict() {
        let fx = Fixture::new();
        let mut user = RawPolicy::default();
        user.hide = vec![fx.path("a")];
        user.ro = vec![fx.path("a").join("sub")];
        assert!(plan(RawPolicy::default(), user).is_err());
    }

    #[test]
    fn test_plan_rejects_reserved_prefix() {
        let mut user = RawPolicy::default();
        user.ro = vec![PathBuf::from("/run")];
        assert!(plan(RawPolicy::default(), user).is_err());
    }

    #[test]
    fn test_plan_sorts_by_path() {
        let fx = Fixture::new();
        let mut user = RawPolicy::default();
        user.ro = vec![fx.path("b")];
        user.rw = vec![fx.path("a")];
        let directives = plan(RawPolicy::default(), user).unwrap();
        assert_eq!(
            directives,
            vec![
                directive(fx.path("a"), MountKind::Rw),
                directive(fx.path("b"), MountKind::Ro),
            ]
        );
    }
}
