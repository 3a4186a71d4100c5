//! Library entry point for the sandbox launcher: wires the CLI-derived
//! policy through `PolicyPlanner`, `NamespaceLauncher`, `ViewBuilder`, and
//! `Executor` in that order.

pub mod cli;
pub mod error;
pub mod executor;
pub mod logger;
pub mod mount_info;
pub mod namespace;
pub mod policy;
pub mod syscall;
pub mod utils;
pub mod view;

use std::path::PathBuf;

use nix::unistd::{getuid, User};

use cli::Cli;

pub fn run(cli: Cli) -> anyhow::Result<()> {
    logger::init(cli.log.clone())?;

    let home = home_dir()?;
    let runtime_dir = user_runtime_dir();
    let defaults = policy::default_policy(&home, &runtime_dir)?;

    let nonet = cli.nonet;
    let cwd = match cli.cwd.clone() {
        Some(cwd) => policy::preprocess_plain_path(&cwd)?,
        None => std::env::current_dir()?,
    };
    let mut command = cli.command.clone();
    let user_policy = cli.into_raw_policy();

    if command.is_empty() {
        command = vec![login_shell()?];
    }

    let directives = policy::plan(defaults, user_policy)?;

    let scratch_root = tempfile::Builder::new()
        .prefix("nsbox")
        .tempdir()?
        .into_path();

    let launcher = namespace::NamespaceLauncher::new(syscall::create_syscall(), nonet);
    launcher.enter(&scratch_root)?;

    let builder = view::ViewBuilder::new(launcher.syscall());
    builder.build(&scratch_root, &directives)?;

    let executor = executor::Executor::new(launcher.syscall());
    executor.exec(&cwd, &command)?;

    Ok(())
}

fn home_dir() -> anyhow::Result<PathBuf> {
    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home));
    }
    let user = User::from_uid(getuid())?
        .ok_or_else(|| anyhow::anyhow!("no passwd entry for the current uid"))?;
    Ok(user.dir)
}

fn login_shell() -> anyhow::Result<String> {
    let user = User::from_uid(getuid())?
        .ok_or_else(|| anyhow::anyhow!("no passwd entry for the current uid"))?;
    Ok(user.shell.to_string_lossy().into_owned())
}

fn user_runtime_dir() -> PathBuf {
    PathBuf::from(format!("/run/{}", getuid()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // `home_dir` reads process-wide environment state, so tests that set it
    // must not run concurrently with other tests touching `HOME`.

    #[test]
    #[serial]
    fn test_home_dir_prefers_env_var() {
        let previous = std::env::var_os("HOME");
        std::env::set_var("HOME", "/tmp/nsbox-test-home");
        let result = home_dir();
        match previous {
            Some(value) => std::env::set_var("HOME", value),
            None => std::env::remove_var("HOME"),
        }
        assert_eq!(result.unwrap(), PathBuf::from("/tmp/nsbox-test-home"));
    }

    #[test]
    fn test_user_runtime_dir_is_under_run() {
        assert!(user_runtime_dir().starts_with("/run/"));
    }
}
