//! Child process spawning and the threads that turn its streams into
//! runner events.
//!
//! Each run gets two reader threads (stdout, stderr) sending raw chunks
//! followed by an EOF marker, and a wait thread reporting the exit
//! status. Every event carries the generation of the run that spawned
//! it, so the runner can discard events from a superseded process.

use std::io::{ErrorKind, Read};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Child, Command as ProcessCommand, Stdio};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::{setpgid, Pid};

use super::RunnerError;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(40);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamSource {
    Stdout,
    Stderr,
}

#[derive(Debug)]
pub(crate) enum ChildEvent {
    Chunk {
        generation: u64,
        source: StreamSource,
        data: Vec<u8>,
    },
    Eof {
        generation: u64,
        source: StreamSource,
    },
    Exited {
        generation: u64,
        outcome: ExitOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExitOutcome {
    Code(i32),
    Signal(i32),
    Unknown,
    WaitError(String),
}

/// Handle to the one process a runner may have active.
pub(crate) struct ActiveChild {
    child: Arc<Mutex<Child>>,
    pid: u32,
}

impl ActiveChild {
    /// Send SIGTERM to the child's process group. Does not wait for the
    /// OS to confirm; the wait thread reports the eventual exit.
    pub(crate) fn terminate(&self) {
        #[cfg(unix)]
        {
            let pid = self.pid as i32;
            if pid > 0 {
                let _ = kill(Pid::from_raw(-pid), Signal::SIGTERM);
                return;
            }
        }
        let _ = self.child.lock().expect("child lock").kill();
    }
}

/// Spawn `command` with piped stdio and start the reader/wait threads.
/// With `shell` set, the command line runs under `sh -lc` with the
/// arguments shell-quoted.
pub(crate) fn spawn_streaming(
    command: &str,
    args: &[String],
    cwd: &Path,
    shell: bool,
    generation: u64,
    events: &Sender<ChildEvent>,
) -> Result<ActiveChild, RunnerError> {
    let mut process = build_command(command, args, cwd, shell);

    let mut child = process.spawn().map_err(|error| RunnerError::Spawn {
        command: command.to_owned(),
        error,
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RunnerError::MissingStdio {
            command: command.to_owned(),
        })?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RunnerError::MissingStdio {
            command: command.to_owned(),
        })?;

    let pid = child.id();
    let child = Arc::new(Mutex::new(child));

    spawn_reader(stdout, StreamSource::Stdout, generation, events.clone());
    spawn_reader(stderr, StreamSource::Stderr, generation, events.clone());

    {
        let child = child.clone();
        let events = events.clone();
        thread::spawn(move || loop {
            let status = child.lock().expect("child lock").try_wait();
            match status {
                Ok(Some(status)) => {
                    let _ = events.send(ChildEvent::Exited {
                        generation,
                        outcome: exit_outcome(status),
                    });
                    break;
                }
                Ok(None) => thread::sleep(WAIT_POLL_INTERVAL),
                Err(err) => {
                    let _ = events.send(ChildEvent::Exited {
                        generation,
                        outcome: ExitOutcome::WaitError(err.to_string()),
                    });
                    break;
                }
            }
        });
    }

    Ok(ActiveChild { child, pid })
}

fn build_command(command: &str, args: &[String], cwd: &Path, shell: bool) -> ProcessCommand {
    let mut process = if shell {
        let mut rendered = command.to_owned();
        for arg in args {
            rendered.push(' ');
            rendered.push_str(&shell_quote(arg));
        }
        let mut process = ProcessCommand::new("sh");
        process.arg("-lc").arg(rendered);
        process
    } else {
        let mut process = ProcessCommand::new(command);
        process.args(args);
        process
    };
    process
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Ask well-behaved children for uncolored output; anything that
        // colors anyway is handled by the sanitizer.
        .env("NO_COLOR", "1")
        .env("FORCE_COLOR", "0");
    #[cfg(unix)]
    unsafe {
        process.pre_exec(|| {
            setpgid(Pid::from_raw(0), Pid::from_raw(0))
                .map_err(|error| std::io::Error::new(ErrorKind::Other, error.to_string()))
        });
    }
    with_local_tool_path(&mut process, cwd);
    process
}

fn spawn_reader<R: Read + Send + 'static>(
    mut stream: R,
    source: StreamSource,
    generation: u64,
    events: Sender<ChildEvent>,
) {
    thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    let sent = events.send(ChildEvent::Chunk {
                        generation,
                        source,
                        data: chunk[..n].to_vec(),
                    });
                    if sent.is_err() {
                        return;
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        let _ = events.send(ChildEvent::Eof { generation, source });
    });
}

fn exit_outcome(status: std::process::ExitStatus) -> ExitOutcome {
    if let Some(code) = status.code() {
        return ExitOutcome::Code(code);
    }
    #[cfg(unix)]
    if let Some(signal) = status.signal() {
        return ExitOutcome::Signal(signal);
    }
    ExitOutcome::Unknown
}

/// Commands frequently run inside JS module directories; make their
/// local tool shims resolvable the way a project-level npm script would.
fn with_local_tool_path(process: &mut ProcessCommand, cwd: &Path) {
    let local_bin = cwd.join("node_modules/.bin");
    if !local_bin.is_dir() {
        return;
    }
    let local_rendered = local_bin.display().to_string();
    let merged = match std::env::var("PATH") {
        Ok(path) if !path.is_empty() => format!("{local_rendered}:{path}"),
        _ => local_rendered,
    };
    process.env("PATH", merged);
}

pub(crate) fn shell_quote(raw: &str) -> String {
    if raw.is_empty() {
        return "''".to_owned();
    }
    let escaped = raw.replace('\'', "'\"'\"'");
    format!("'{escaped}'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_wraps_and_escapes() {
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
    }
}
