//! CLI argument definitions.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::process::{ProcessOptions, DEFAULT_MAX_BUFFER};

/// Procwatch - run commands and wait until every child has exited
#[derive(Parser, Debug)]
#[command(name = "procwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Working directory for the commands
    #[arg(long, global = true, env = "PROCWATCH_CWD")]
    pub cwd: Option<PathBuf>,

    /// Extra environment variable for the commands (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair, global = true)]
    pub env: Vec<(String, String)>,

    /// Per-stream output limit in bytes for buffered commands
    #[arg(long, global = true, env = "PROCWATCH_MAX_BUFFER", default_value_t = DEFAULT_MAX_BUFFER)]
    pub max_buffer: usize,

    /// Kill buffered commands that run longer than this many milliseconds
    #[arg(long, global = true, env = "PROCWATCH_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Options shared by every subcommand.
    pub fn process_options(&self) -> ProcessOptions {
        let mut options = ProcessOptions::new()
            .envs(self.env.iter().cloned())
            .max_buffer(self.max_buffer);

        if let Some(ref dir) = self.cwd {
            options = options.working_dir(dir);
        }
        if let Some(ms) = self.timeout_ms {
            options = options.timeout(Duration::from_millis(ms));
        }

        options
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a shell command, buffering its output
    Exec {
        /// Command line, passed to the shell as one string
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Run a shell command synchronously and print its trimmed output
    Sync {
        /// Command line, passed to the shell as one string
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Run a program with its output passed straight through
    Run {
        /// Capture stderr and report it if the program fails
        #[arg(long)]
        pipe_stderr: bool,

        /// Program to execute
        program: String,

        /// Arguments for the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run several shell commands at once and summarize the results
    Parallel {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        /// Commands to run, one shell command line each
        #[arg(required = true)]
        commands: Vec<String>,
    },
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}
