//! CLI command execution.
//!
//! Every subcommand waits for the registry to go quiescent before
//! returning, so the binary never exits with children still running.

use std::process::ExitCode;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::error::{ExitKind, ProcessExecutionError};
use crate::process::{ExecOutput, ProcessExecutor, ProcessOptions};

use super::args::{Cli, Commands};

/// Execute the parsed command line.
pub async fn execute(cli: Cli) -> Result<ExitCode> {
    let options = cli.process_options();
    let executor = ProcessExecutor::default();

    let code = match cli.command {
        Commands::Exec { command } => exec(&executor, &command.join(" "), &options).await?,
        Commands::Sync { command } => sync(&executor, command.join(" "), options).await?,
        Commands::Run {
            pipe_stderr,
            program,
            args,
        } => {
            let options = if pipe_stderr {
                options.pipe_stderr()
            } else {
                options
            };
            run(&executor, &program, &args, &options).await?
        }
        Commands::Parallel { json, commands } => {
            parallel(&executor, &commands, &options, json).await?
        }
    };

    executor.registry().wait_for_quiescence().await;
    Ok(code)
}

async fn exec(executor: &ProcessExecutor, command: &str, options: &ProcessOptions) -> Result<ExitCode> {
    let output = executor.exec(command, options).wait().await?;
    print!("{}", output.stdout);

    match output.error_message() {
        Some(message) => {
            eprintln!("{message}");
            Ok(failure_code(output.error.as_ref()))
        }
        None => Ok(ExitCode::SUCCESS),
    }
}

async fn sync(executor: &ProcessExecutor, command: String, options: ProcessOptions) -> Result<ExitCode> {
    let executor = executor.clone();
    let result = tokio::task::spawn_blocking(move || executor.exec_sync(&command, &options))
        .await
        .context("Blocking command task panicked")?;

    match result {
        Ok(stdout) => {
            println!("{stdout}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{e}");
            Ok(failure_code(Some(&e)))
        }
    }
}

async fn run(
    executor: &ProcessExecutor,
    program: &str,
    args: &[String],
    options: &ProcessOptions,
) -> Result<ExitCode> {
    let outcome = executor.spawn(program, args, options).wait().await?;

    match outcome.failure {
        Some(reason) => {
            eprintln!("{reason}");
            Ok(match outcome.status {
                Some(ExitKind::Code(code)) => exit_code(code),
                _ => ExitCode::FAILURE,
            })
        }
        None => Ok(ExitCode::SUCCESS),
    }
}

/// Summary of one command run by `parallel`.
#[derive(Debug, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

impl CommandReport {
    fn new(command: String, output: ExecOutput) -> Self {
        Self {
            success: output.success(),
            exit_code: output.error.as_ref().map_or(Some(0), ProcessExecutionError::exit_code),
            error: output.error_message(),
            command,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Start every command at once and collect their reports in input order.
pub async fn run_all(
    executor: &ProcessExecutor,
    commands: &[String],
    options: &ProcessOptions,
) -> Result<Vec<CommandReport>> {
    let executions: Vec<_> = commands
        .iter()
        .map(|command| (command.clone(), executor.exec(command, options)))
        .collect();

    info!(
        started = executions.len(),
        live = executor.registry().live_count(),
        "started commands"
    );

    let mut reports = Vec::with_capacity(executions.len());
    for (command, execution) in executions {
        let output = execution
            .wait()
            .await
            .with_context(|| format!("Lost track of `{command}`"))?;
        reports.push(CommandReport::new(command, output));
    }

    Ok(reports)
}

async fn parallel(
    executor: &ProcessExecutor,
    commands: &[String],
    options: &ProcessOptions,
    json: bool,
) -> Result<ExitCode> {
    let reports = run_all(executor, commands, options).await?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&reports).context("Failed to serialize reports")?;
        println!("{rendered}");
    } else {
        for report in &reports {
            let marker = if report.success { "ok" } else { "FAILED" };
            println!("[{marker}] {}", report.command);
            for line in report.stdout.lines() {
                println!("    {line}");
            }
            if let Some(ref error) = report.error {
                eprintln!("{error}");
            }
        }
    }

    if reports.iter().all(|report| report.success) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn failure_code(error: Option<&ProcessExecutionError>) -> ExitCode {
    error
        .and_then(ProcessExecutionError::exit_code)
        .map_or(ExitCode::FAILURE, exit_code)
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code)
        .ok()
        .filter(|code| *code != 0)
        .map_or(ExitCode::FAILURE, ExitCode::from)
}
