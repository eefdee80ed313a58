use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tabled::builder::Builder;
use tabled::settings::{Padding, Style};
use tracing_subscriber::EnvFilter;

use spillway::config::{discover_config, ConfigFile, SequenceConfig, Tuning};
use spillway::display::{
    write_error_block, ActivityLog, PlainSink, QuietStatus, SpinnerStatus, TracingActivity,
};
use spillway::runner::{
    render_report_json, run_sequence_to_completion, run_to_completion, RunReport, RunSpec, StepSpec,
};
use spillway::theme::OutputMode;
use spillway::tui::{run_app, TuiRequest};
use spillway::{parse_command, print_usage, Command, RunArgs, SeqArgs};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cmd = match parse_command(args) {
        Ok(cmd) => cmd,
        Err(err) => {
            write_error_block(
                "Invalid command arguments",
                &err.to_string(),
                Some("Run `spillway --help` to see supported command forms"),
            );
            print_usage();
            std::process::exit(2);
        }
    };

    let code = match cmd {
        Command::Help => {
            print_usage();
            0
        }
        Command::Run(args) => run_command(args),
        Command::Seq(args) => seq_command(args),
    };
    std::process::exit(code);
}

fn run_command(args: RunArgs) -> i32 {
    let Some(cwd) = resolve_cwd(args.cwd.clone()) else {
        return 1;
    };
    init_logging(args.log_file.as_deref());

    let tuning = match load_tuning(&cwd) {
        Ok(tuning) => tuning,
        Err(code) => return code,
    };

    let mut spec = RunSpec::new(args.command.clone(), args.args.clone(), cwd);
    if args.shell {
        spec = spec.with_shell();
    }

    let interactive = !args.plain && !args.json && std::io::stdout().is_terminal();
    if interactive {
        return match run_app(TuiRequest::Single(spec), tuning, activity()) {
            Ok(code) => code,
            Err(err) => {
                write_error_block("Terminal session failed", &err.to_string(), None);
                1
            }
        };
    }

    let report = headless_single(spec, tuning.unbounded_head());
    if args.json {
        println!("{}", render_report_json(&report));
    }
    report_exit_code(&report)
}

fn seq_command(args: SeqArgs) -> i32 {
    let Some(cwd) = resolve_cwd(args.cwd.clone()) else {
        return 1;
    };
    init_logging(args.log_file.as_deref());

    let config = match discover_config(&cwd) {
        Ok(Some((_, config))) => config,
        Ok(None) => {
            write_error_block(
                "No spillway.toml found",
                &format!("searched {} and its parents", cwd.display()),
                Some("Define [sequence.<name>] tables to use `spillway seq`"),
            );
            return 1;
        }
        Err(err) => {
            write_error_block("Invalid spillway.toml", &err.to_string(), None);
            return 1;
        }
    };

    if args.list {
        print!("{}", render_sequence_table(&config));
        return 0;
    }

    let Some(name) = args.name else {
        // parse_command guarantees a name when --list is absent
        return 1;
    };
    let Some(sequence) = config.sequence.get(&name) else {
        let available = config
            .sequence
            .keys()
            .cloned()
            .collect::<Vec<String>>()
            .join(", ");
        write_error_block(
            &format!("Unknown sequence `{name}`"),
            &if available.is_empty() {
                "no sequences are defined".to_owned()
            } else {
                format!("defined sequences: {available}")
            },
            None,
        );
        return 1;
    };
    let steps = sequence_steps(sequence);
    let tuning = config.tuning();

    let interactive = !args.plain && std::io::stdout().is_terminal();
    if interactive {
        return match run_app(TuiRequest::Sequence { steps, cwd }, tuning, activity()) {
            Ok(code) => code,
            Err(err) => {
                write_error_block("Terminal session failed", &err.to_string(), None);
                1
            }
        };
    }

    let report = headless_sequence(steps, cwd, tuning.unbounded_head());
    report_exit_code(&report)
}

fn headless_single(spec: RunSpec, tuning: Tuning) -> RunReport {
    let mut sink = PlainSink::stdout(OutputMode::from_env());
    if SpinnerStatus::suitable() {
        let mut status = SpinnerStatus::stderr();
        run_to_completion(spec, tuning, activity(), &mut sink, &mut status)
    } else {
        let mut status = QuietStatus;
        run_to_completion(spec, tuning, activity(), &mut sink, &mut status)
    }
}

fn headless_sequence(steps: Vec<StepSpec>, cwd: PathBuf, tuning: Tuning) -> RunReport {
    let mut sink = PlainSink::stdout(OutputMode::from_env());
    if SpinnerStatus::suitable() {
        let mut status = SpinnerStatus::stderr();
        run_sequence_to_completion(steps, cwd, tuning, activity(), &mut sink, &mut status)
    } else {
        let mut status = QuietStatus;
        run_sequence_to_completion(steps, cwd, tuning, activity(), &mut sink, &mut status)
    }
}

fn sequence_steps(sequence: &SequenceConfig) -> Vec<StepSpec> {
    sequence
        .steps
        .iter()
        .map(|step| {
            let mut spec = StepSpec::new(step.command.clone(), step.args.clone());
            if let Some(label) = &step.label {
                spec = spec.with_label(label.clone());
            }
            spec
        })
        .collect()
}

fn render_sequence_table(config: &ConfigFile) -> String {
    let mut builder = Builder::default();
    builder.push_record(["sequence", "steps", "description"]);
    for (name, sequence) in &config.sequence {
        let step_count = sequence.steps.len().to_string();
        builder.push_record([
            name.as_str(),
            step_count.as_str(),
            sequence.description.as_deref().unwrap_or(""),
        ]);
    }
    let mut table = builder.build();
    table.with(Style::blank());
    table.with(Padding::new(0, 2, 0, 0));
    let mut rendered = table.to_string();
    rendered.push('\n');
    rendered
}

fn resolve_cwd(requested: Option<PathBuf>) -> Option<PathBuf> {
    match requested {
        Some(path) => {
            if path.is_dir() {
                Some(path)
            } else {
                write_error_block(
                    "Working directory does not exist",
                    &path.display().to_string(),
                    None,
                );
                None
            }
        }
        None => match std::env::current_dir() {
            Ok(cwd) => Some(cwd),
            Err(err) => {
                write_error_block("Cannot resolve current directory", &err.to_string(), None);
                None
            }
        },
    }
}

fn load_tuning(cwd: &Path) -> Result<Tuning, i32> {
    match discover_config(cwd) {
        Ok(Some((_, config))) => Ok(config.tuning()),
        Ok(None) => Ok(Tuning::default()),
        Err(err) => {
            write_error_block("Invalid spillway.toml", &err.to_string(), None);
            Err(1)
        }
    }
}

fn activity() -> Option<Box<dyn ActivityLog>> {
    Some(Box::new(TracingActivity))
}

fn init_logging(log_file: Option<&Path>) {
    let Some(path) = log_file else {
        return;
    };
    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        Ok(file) => file,
        Err(err) => {
            write_error_block(
                "Cannot open log file",
                &format!("{}: {err}", path.display()),
                None,
            );
            return;
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

fn report_exit_code(report: &RunReport) -> i32 {
    if report.ok {
        return 0;
    }
    report.exit_code.unwrap_or(1)
}
