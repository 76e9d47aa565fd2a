// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Command-line argument parsing (spec.md §6 "CLI"): a single positional
//! config-file path. `clap` exits with status 2 on a missing/malformed
//! argument on its own, matching spec.md's "non-zero exit" requirement.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "icesrc", about = "Live Vorbis source client for Icecast", version)]
pub struct Cli {
    /// Path to the XML configuration file.
    pub config: PathBuf,
}
