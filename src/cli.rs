//! `clap`-derive argument parsing. Produces a [`RawPolicy`] and hands off
//! to [`crate::policy::plan`].

use std::path::PathBuf;

use clap::Clap;

use crate::policy::RawPolicy;

#[derive(Clap, Debug)]
#[clap(name = "nsbox", about = "Unprivileged Linux sandbox launcher")]
pub struct Cli {
    /// Bind-mount PATH read-only inside the sandbox.
    #[clap(long = "ro", value_name = "PATH")]
    pub ro: Vec<PathBuf>,

    /// Bind-mount PATH read-write inside the sandbox.
    #[clap(long = "rw", value_name = "PATH")]
    pub rw: Vec<PathBuf>,

    /// Conceal PATH entirely inside the sandbox.
    #[clap(long = "hide", value_name = "PATH")]
    pub hide: Vec<PathBuf>,

    /// Mount a fresh, writable, empty tmpfs at PATH.
    #[clap(long = "empty", value_name = "PATH")]
    pub empty: Vec<PathBuf>,

    /// Mount a fresh, read-only, empty tmpfs at PATH.
    #[clap(long = "empty-ro", value_name = "PATH")]
    pub empty_ro: Vec<PathBuf>,

    /// Working directory inside the sandbox. Defaults to the caller's cwd.
    #[clap(long = "cwd", value_name = "PATH")]
    pub cwd: Option<PathBuf>,

    /// Create a network namespace with only the loopback interface up.
    #[clap(long = "nonet")]
    pub nonet: bool,

    /// Write log output to FILE instead of stderr.
    #[clap(long = "log", value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// The command to run, and its arguments. Defaults to the caller's
    /// login shell if empty.
    #[clap(trailing_var_arg(true), allow_hyphen_values(true))]
    pub command: Vec<String>,
}

impl Cli {
    pub fn into_raw_policy(self) -> RawPolicy {
        RawPolicy {
            ro: self.ro,
            rw: self.rw,
            hide: self.hide,
            empty: self.empty,
            empty_ro: self.empty_ro,
            cwd: self.cwd,
            nonet: self.nonet,
            command: self.command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_repeatable_flags_and_trailing_command() {
        let cli = Cli::parse_from(&[
            "nsbox",
            "--ro",
            "/usr",
            "--ro",
            "/lib",
            "--rw",
            "/dev/null",
            "--nonet",
            "echo",
            "--hello",
        ]);
        assert_eq!(cli.ro, vec![PathBuf::from("/usr"), PathBuf::from("/lib")]);
        assert_eq!(cli.rw, vec![PathBuf::from("/dev/null")]);
        assert!(cli.nonet);
        assert_eq!(cli.command, vec!["echo".to_string(), "--hello".to_string()]);
    }

    #[test]
    fn test_defaults_to_empty_command() {
        let cli = Cli::parse_from(&["nsbox"]);
        assert!(cli.command.is_empty());
        assert!(!cli.nonet);
    }

    #[test]
    fn test_into_raw_policy_carries_every_field() {
        let cli = Cli::parse_from(&["nsbox", "--hide", "/secret", "--cwd", "/work"]);
        let policy = cli.into_raw_policy();
        assert_eq!(policy.hide, vec![PathBuf::from("/secret")]);
        assert_eq!(policy.cwd, Some(PathBuf::from("/work")));
    }
}
