//! spillway: run external commands with live-head output streaming, a
//! throttled display pipeline, and post-hoc transcript search.
//!
//! The first lines of a run stream to the display as they arrive; past
//! a threshold the remainder spills into a buffer that is released in
//! one pass when the process exits. The buffer is searchable afterward.

pub mod buffer;
pub mod config;
pub mod display;
pub mod runner;
pub mod sanitize;
pub mod search;
pub mod testing;
pub mod theme;
pub mod throttle;
pub mod tui;

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(RunArgs),
    Seq(SeqArgs),
    Help,
}

/// `spillway run`: flags come before the command; everything after the
/// command token is passed to the child verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub shell: bool,
    pub plain: bool,
    pub json: bool,
    pub log_file: Option<PathBuf>,
}

/// `spillway seq`: run or list named sequences from `spillway.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqArgs {
    pub name: Option<String>,
    pub cwd: Option<PathBuf>,
    pub plain: bool,
    pub list: bool,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliParseError {
    MissingRunCommand,
    MissingCwdValue,
    MissingLogFileValue,
    MissingSequenceName,
    UnknownArgument(String),
}

impl std::fmt::Display for CliParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliParseError::MissingRunCommand => write!(f, "run requires a command"),
            CliParseError::MissingCwdValue => write!(f, "--cwd requires a value"),
            CliParseError::MissingLogFileValue => write!(f, "--log-file requires a value"),
            CliParseError::MissingSequenceName => {
                write!(f, "seq requires a sequence name (or --list)")
            }
            CliParseError::UnknownArgument(arg) => write!(f, "unknown argument: {arg}"),
        }
    }
}

impl std::error::Error for CliParseError {}

pub fn parse_command<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(cmd) = args.next() else {
        return Ok(Command::Help);
    };

    if cmd == "--help" || cmd == "-h" {
        return Ok(Command::Help);
    }

    if cmd == "run" {
        return parse_run(args);
    }
    if cmd == "seq" {
        return parse_seq(args);
    }

    Err(CliParseError::UnknownArgument(cmd))
}

fn parse_run<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut cwd: Option<PathBuf> = None;
    let mut shell = false;
    let mut plain = false;
    let mut json = false;
    let mut log_file: Option<PathBuf> = None;
    let mut command: Option<String> = None;
    let mut child_args: Vec<String> = Vec::new();

    while let Some(arg) = args.next() {
        if command.is_some() {
            child_args.push(arg);
            continue;
        }
        match arg.as_str() {
            "--cwd" => {
                let Some(path) = args.next() else {
                    return Err(CliParseError::MissingCwdValue);
                };
                cwd = Some(PathBuf::from(path));
            }
            "--shell" => shell = true,
            "--plain" => plain = true,
            "--json" => json = true,
            "--log-file" => {
                let Some(path) = args.next() else {
                    return Err(CliParseError::MissingLogFileValue);
                };
                log_file = Some(PathBuf::from(path));
            }
            "--help" | "-h" => return Ok(Command::Help),
            other if other.starts_with('-') => {
                return Err(CliParseError::UnknownArgument(other.to_owned()));
            }
            other => command = Some(other.to_owned()),
        }
    }

    let Some(command) = command else {
        return Err(CliParseError::MissingRunCommand);
    };

    Ok(Command::Run(RunArgs {
        command,
        args: child_args,
        cwd,
        shell,
        plain,
        json,
        log_file,
    }))
}

fn parse_seq<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut name: Option<String> = None;
    let mut cwd: Option<PathBuf> = None;
    let mut plain = false;
    let mut list = false;
    let mut log_file: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--cwd" => {
                let Some(path) = args.next() else {
                    return Err(CliParseError::MissingCwdValue);
                };
                cwd = Some(PathBuf::from(path));
            }
            "--plain" => plain = true,
            "--list" => list = true,
            "--log-file" => {
                let Some(path) = args.next() else {
                    return Err(CliParseError::MissingLogFileValue);
                };
                log_file = Some(PathBuf::from(path));
            }
            "--help" | "-h" => return Ok(Command::Help),
            other if other.starts_with('-') => {
                return Err(CliParseError::UnknownArgument(other.to_owned()));
            }
            other => name = Some(other.to_owned()),
        }
    }

    if name.is_none() && !list {
        return Err(CliParseError::MissingSequenceName);
    }

    Ok(Command::Seq(SeqArgs {
        name,
        cwd,
        plain,
        list,
        log_file,
    }))
}

pub fn print_usage() {
    eprintln!(
        "spillway\n\nUSAGE:\n  spillway run [OPTIONS] <command> [args...]\n  spillway seq [OPTIONS] <name>\n  spillway seq --list\n\nCOMMANDS:\n  run               Run one command, streaming its output\n  seq               Run a named sequence from spillway.toml\n\nOPTIONS (run):\n  --cwd <PATH>      Working directory for the command\n  --shell           Run the command line under `sh -lc`\n  --plain           Line output instead of the interactive screen\n  --json            Print a JSON run summary on completion (implies --plain)\n  --log-file <PATH> Append the activity log to a file\n\nOPTIONS (seq):\n  --cwd <PATH>      Working directory for all steps\n  --plain           Line output instead of the interactive screen\n  --list            List sequences defined in spillway.toml\n  --log-file <PATH> Append the activity log to a file\n\nGENERAL:\n  -h, --help        Print help\n"
    );
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
