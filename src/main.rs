//! # nsbox
//! An unprivileged Linux sandbox launcher built on user, mount, PID, and
//! IPC namespaces.

use clap::Clap;

use nsbox::cli::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(err) = nsbox::run(cli) {
        eprintln!("nsbox: {:#}", err);
        std::process::exit(1);
    }
}
