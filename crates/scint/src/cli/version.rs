// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::Command;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn command() -> Command {
    Command::new("version").about("Display version and exit")
}

pub fn print() {
    println!("scint {VERSION}");
}
