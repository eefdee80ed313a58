use std::path::PathBuf;

use super::{parse_command, CliParseError, Command};

fn parse(args: &[&str]) -> Result<Command, CliParseError> {
    parse_command(args.iter().map(|s| (*s).to_owned()))
}

#[test]
fn no_args_is_help() {
    assert_eq!(parse(&[]), Ok(Command::Help));
    assert_eq!(parse(&["--help"]), Ok(Command::Help));
    assert_eq!(parse(&["-h"]), Ok(Command::Help));
}

#[test]
fn run_parses_flags_before_command() {
    let Ok(Command::Run(args)) = parse(&["run", "--cwd", "/tmp", "--shell", "npm", "test"]) else {
        panic!("expected run command");
    };
    assert_eq!(args.command, "npm");
    assert_eq!(args.args, ["test"]);
    assert_eq!(args.cwd, Some(PathBuf::from("/tmp")));
    assert!(args.shell);
    assert!(!args.plain);
    assert!(!args.json);
}

#[test]
fn run_passes_child_flags_through_verbatim() {
    let Ok(Command::Run(args)) = parse(&["run", "git", "log", "--oneline", "-n", "5"]) else {
        panic!("expected run command");
    };
    assert_eq!(args.command, "git");
    assert_eq!(args.args, ["log", "--oneline", "-n", "5"]);
}

#[test]
fn run_without_command_is_an_error() {
    assert_eq!(parse(&["run"]), Err(CliParseError::MissingRunCommand));
    assert_eq!(
        parse(&["run", "--plain"]),
        Err(CliParseError::MissingRunCommand)
    );
}

#[test]
fn run_rejects_unknown_flags_before_command() {
    assert_eq!(
        parse(&["run", "--frobnicate", "ls"]),
        Err(CliParseError::UnknownArgument("--frobnicate".to_owned()))
    );
}

#[test]
fn cwd_requires_a_value() {
    assert_eq!(parse(&["run", "--cwd"]), Err(CliParseError::MissingCwdValue));
    assert_eq!(
        parse(&["seq", "diff", "--cwd"]),
        Err(CliParseError::MissingCwdValue)
    );
}

#[test]
fn seq_parses_name_and_flags() {
    let Ok(Command::Seq(args)) = parse(&["seq", "diff", "--plain", "--log-file", "run.log"]) else {
        panic!("expected seq command");
    };
    assert_eq!(args.name.as_deref(), Some("diff"));
    assert!(args.plain);
    assert!(!args.list);
    assert_eq!(args.log_file, Some(PathBuf::from("run.log")));
}

#[test]
fn seq_list_needs_no_name() {
    let Ok(Command::Seq(args)) = parse(&["seq", "--list"]) else {
        panic!("expected seq command");
    };
    assert!(args.list);
    assert_eq!(args.name, None);
}

#[test]
fn seq_without_name_or_list_is_an_error() {
    assert_eq!(parse(&["seq"]), Err(CliParseError::MissingSequenceName));
}

#[test]
fn unknown_top_level_command_is_an_error() {
    assert_eq!(
        parse(&["frob"]),
        Err(CliParseError::UnknownArgument("frob".to_owned()))
    );
}
