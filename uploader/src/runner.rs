// External command execution
//
// Every device or image operation is delegated to an external tool. The
// `CommandRunner` trait is the seam between the workflow and the process
// table, so the workflow can be driven by a scripted runner in tests.

use colored::Colorize;
use std::fmt;
use std::process::{Command, Stdio};

/// An external program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Result of running a [`ToolCommand`]
///
/// `exit_code` is `None` when the process could not be started or was killed
/// by a signal. Output is only populated in [`OutputMode::Capture`]; spawn
/// failures put the OS error text in `stderr`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Self::default()
        }
    }
}

/// Where child output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Child writes straight to this process's console
    #[default]
    Inherit,
    /// Output is collected and only shown when the command fails
    Capture,
}

pub trait CommandRunner {
    /// Run `command` to completion.
    fn run(&mut self, command: &ToolCommand) -> CommandOutcome;
}

/// Runs commands as real child processes, blocking until they exit
#[derive(Debug, Default)]
pub struct SystemRunner {
    mode: OutputMode,
}

impl SystemRunner {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&mut self, command: &ToolCommand) -> CommandOutcome {
        println!("{}", format!("  $ {command}").dimmed());
        log::debug!("Running command: {command} ({:?})", self.mode);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);

        let outcome = match self.mode {
            OutputMode::Inherit => match cmd.status() {
                Ok(status) => CommandOutcome {
                    exit_code: status.code(),
                    ..CommandOutcome::default()
                },
                Err(e) => spawn_failure(command, &e),
            },
            OutputMode::Capture => match cmd
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
            {
                Ok(output) => CommandOutcome {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                },
                Err(e) => spawn_failure(command, &e),
            },
        };

        log::debug!("Command exit status: {:?}", outcome.exit_code);
        if !outcome.stdout.is_empty() {
            log::debug!("stdout: {}", outcome.stdout);
        }
        if !outcome.stderr.is_empty() {
            log::debug!("stderr: {}", outcome.stderr);
        }

        if self.mode == OutputMode::Capture && !outcome.success() {
            replay_output(&outcome);
        }

        outcome
    }
}

fn spawn_failure(command: &ToolCommand, error: &std::io::Error) -> CommandOutcome {
    CommandOutcome {
        exit_code: None,
        stdout: String::new(),
        stderr: format!("Failed to execute {}: {error}", command.program),
    }
}

fn replay_output(outcome: &CommandOutcome) {
    for line in outcome.stdout.lines().chain(outcome.stderr.lines()) {
        eprintln!("    {line}");
    }
}

/// Prints commands instead of running them; every command succeeds
#[derive(Debug, Default)]
pub struct DryRunRunner;

impl CommandRunner for DryRunRunner {
    fn run(&mut self, command: &ToolCommand) -> CommandOutcome {
        println!("{}", format!("  $ {command}").dimmed());
        println!("    {}", "(dry run, not executed)".yellow());
        CommandOutcome::exited(0)
    }
}
