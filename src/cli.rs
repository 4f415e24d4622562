// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

/// A tool-using chat agent execution runtime.
///
/// With no subcommand, runs the stdio control-channel session: reads
/// newline-delimited JSON control messages (`init`, `user_message`,
/// `cancel`, `answer`) from stdin and writes one JSON event per line to
/// stdout. This mirrors the real transport's `init` → `user_message` →
/// stream-of-events cycle without requiring a WebSocket front end.
#[derive(Parser, Debug)]
#[command(
    name = "agentrt",
    about = "A tool-using chat agent execution runtime",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file (overrides auto-discovery).
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Workspace root for file tools. Defaults to the discovered project root.
    #[arg(long)]
    pub workspace_root: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace).
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Print the effective configuration and exit.
    ShowConfig,
    /// List available models for the configured provider(s).
    ListModels {
        #[arg(long, short = 'p')]
        provider: Option<String>,
        #[arg(long)]
        refresh: bool,
        #[arg(long)]
        json: bool,
    },
    /// List all supported model providers.
    ListProviders {
        #[arg(long, short = 'v')]
        verbose: bool,
        #[arg(long)]
        json: bool,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "agentrt", &mut std::io::stdout());
}
