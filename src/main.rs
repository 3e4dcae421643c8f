/*
 * paperback: paper backup generator suitable for long-term storage
 * Copyright (C) 2018-2022 Aleksa Sarai <cyphar@cyphar.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::process::exit;

use anyhow::{anyhow, Error};
use clap::Command;

mod raw;

fn run() -> Result<(), Error> {
    let mut app = Command::new("paperback-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Aleksa Sarai <cyphar@cyphar.com>")
        .about("Operate on a paperback backup using a basic CLI interface.")
        .subcommand(raw::subcommands());
    let matches = app.clone().get_matches();

    match matches.subcommand() {
        Some(("raw", sub_matches)) => raw::submatch(&mut app, sub_matches),
        Some((subcommand, _)) => {
            app.print_help()?;
            Err(anyhow!("unknown subcommand '{}'", subcommand))
        }
        None => {
            app.print_help()?;
            Err(anyhow!("no subcommand specified"))
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("paperback-cli: {:#}", err);
        exit(1);
    }
}
