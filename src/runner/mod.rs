//! The process runner: one external command (or an ordered sequence of
//! them) streamed into a display sink with head/buffer output policy,
//! throttled rendering, and post-hoc transcript search.
//!
//! The runner is a state machine driven by a caller-owned pump. `run`
//! and `run_sequence` return after initiating the spawn; stream chunks,
//! EOF markers, and exit statuses arrive as events on an internal
//! channel and are applied by [`ProcessRunner::pump`]. Every event
//! carries the generation of the run that produced it, so output from a
//! killed or superseded process can never reach a newer run's buffer.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use crate::buffer::{LineAssembler, OutputBuffer};
use crate::config::Tuning;
use crate::display::{ActivityLog, DisplaySink, StatusSink, StatusState};
use crate::sanitize::sanitize_line;
use crate::search::{render_results, SearchSession};
use crate::theme::{styled, Theme};
use crate::throttle::{RenderThrottle, StatusThrottle};

mod sequence;
mod spawn;

pub use sequence::StepSpec;

use sequence::SequenceState;
use spawn::{spawn_streaming, ActiveChild, ChildEvent, ExitOutcome, StreamSource};

const MAX_EVENTS_PER_TICK: usize = 200;
const COMPLETION_RULE: &str = "────────────────────────────────────────";

#[derive(Debug)]
pub enum RunnerError {
    Spawn {
        command: String,
        error: std::io::Error,
    },
    MissingStdio {
        command: String,
    },
}

impl std::fmt::Display for RunnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerError::Spawn { command, error } => {
                write!(f, "failed to start `{command}`: {error}")
            }
            RunnerError::MissingStdio { command } => {
                write!(f, "process `{command}` missing stdout/stderr pipe")
            }
        }
    }
}

impl std::error::Error for RunnerError {}

/// One command invocation: what to run, where, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Run the command line under `sh -lc` instead of spawning the
    /// executable directly.
    pub shell: bool,
    /// Keep existing display content instead of clearing it. The output
    /// buffer is reset either way.
    pub append: bool,
}

impl RunSpec {
    pub fn new(command: impl Into<String>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: cwd.into(),
            shell: false,
            append: false,
        }
    }

    pub fn with_shell(mut self) -> Self {
        self.shell = true;
        self
    }

    pub fn with_append(mut self) -> Self {
        self.append = true;
        self
    }

    pub fn command_line(&self) -> String {
        let mut rendered = self.command.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }
}

/// Live: every line goes to the display as it arrives. Buffered: lines
/// accumulate silently until the completion flush. One-way per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamingMode {
    Live,
    Buffered,
}

/// Terminal state of the most recent run or sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success {
        duration: Duration,
    },
    Failed {
        detail: String,
        code: Option<i32>,
        duration: Duration,
    },
    Error {
        message: String,
        duration: Duration,
    },
}

#[derive(Debug)]
struct RunState {
    command_line: String,
    runnable: String,
    started: Instant,
    exit: Option<ExitOutcome>,
    stdout_open: bool,
    stderr_open: bool,
    stdout_lines: LineAssembler,
    stderr_lines: LineAssembler,
}

impl RunState {
    fn new(command_line: String, runnable: String) -> Self {
        Self {
            command_line,
            runnable,
            started: Instant::now(),
            exit: None,
            stdout_open: true,
            stderr_open: true,
            stdout_lines: LineAssembler::new(),
            stderr_lines: LineAssembler::new(),
        }
    }

    /// Settled once the exit status arrived and both pipes hit EOF —
    /// only then is the buffer complete.
    fn is_settled(&self) -> bool {
        self.exit.is_some() && !self.stdout_open && !self.stderr_open
    }
}

pub struct ProcessRunner {
    tuning: Tuning,
    theme: Theme,
    activity: Option<Box<dyn ActivityLog>>,
    events_tx: Sender<ChildEvent>,
    events_rx: Receiver<ChildEvent>,
    generation: u64,
    active: Option<ActiveChild>,
    run: Option<RunState>,
    sequence: Option<SequenceState>,
    buffer: OutputBuffer,
    mode: StreamingMode,
    head_count: usize,
    render_throttle: RenderThrottle,
    status_throttle: StatusThrottle,
    search: Option<SearchSession>,
    last_outcome: Option<RunOutcome>,
}

impl ProcessRunner {
    pub fn new(tuning: Tuning) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            theme: Theme::default(),
            activity: None,
            events_tx,
            events_rx,
            generation: 0,
            active: None,
            run: None,
            sequence: None,
            buffer: OutputBuffer::new(),
            mode: StreamingMode::Live,
            head_count: 0,
            render_throttle: RenderThrottle::new(tuning.render_throttle),
            status_throttle: StatusThrottle::new(tuning.status_throttle),
            search: None,
            last_outcome: None,
            tuning,
        }
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    pub fn with_activity(mut self, activity: Box<dyn ActivityLog>) -> Self {
        self.activity = Some(activity);
        self
    }

    /// Start a command. Any active process is killed first, and buffer,
    /// streaming, and search state reset for the new run. Spawn failures
    /// are reported through the sinks; the runner stays idle and
    /// re-runnable.
    pub fn run(
        &mut self,
        spec: RunSpec,
        display: &mut dyn DisplaySink,
        status: &mut dyn StatusSink,
    ) {
        self.kill();
        self.reset_session(spec.append, display);

        let command_line = spec.command_line();
        let runnable = format!("cd {} && {command_line}", spec.cwd.display());
        self.emit_start_banner(&command_line, &spec.cwd, &runnable, display);
        display.render();
        status.status(StatusState::Running, &command_line);
        if let Some(activity) = self.activity.as_mut() {
            activity.info(&format!("START  {runnable}"));
        }

        self.spawn_into_run(
            &spec.command,
            &spec.args,
            &spec.cwd,
            spec.shell,
            command_line,
            runnable,
            display,
            status,
        );
    }

    /// Run steps strictly in order in one continuous display/buffer
    /// session. A step's non-zero exit is recorded and the sequence
    /// continues; only a failure to start a step halts the remainder.
    pub fn run_sequence(
        &mut self,
        steps: Vec<StepSpec>,
        cwd: PathBuf,
        display: &mut dyn DisplaySink,
        status: &mut dyn StatusSink,
    ) {
        if steps.is_empty() {
            display.append_line(&styled(
                self.theme.warning,
                "Nothing to run: sequence has no steps.",
            ));
            display.render();
            return;
        }

        self.kill();
        self.reset_session(false, display);

        let first = &steps[0];
        let first_message = first.label.clone().unwrap_or_else(|| first.command_line());
        status.status(StatusState::Running, &first_message);

        self.sequence = Some(SequenceState::new(steps, cwd));
        self.start_current_step(display, status);
    }

    /// Terminate the active process, if any. The handle clears
    /// immediately; the process's exit event finalizes the run when it
    /// arrives. No-op when nothing is running.
    pub fn kill(&mut self) {
        self.status_throttle.reset();
        if let Some(active) = self.active.take() {
            active.terminate();
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Whether any work remains: an active process, a run awaiting its
    /// exit event, or further sequence steps.
    pub fn is_busy(&self) -> bool {
        self.active.is_some() || self.run.is_some() || self.sequence.is_some()
    }

    pub fn has_buffer(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn buffer_lines(&self) -> &[String] {
        self.buffer.lines()
    }

    pub fn last_outcome(&self) -> Option<&RunOutcome> {
        self.last_outcome.as_ref()
    }

    /// Apply pending process events and fire due throttles. `wait`
    /// bounds the block on the first event; the drain per call is
    /// bounded so a torrent of output cannot starve the caller's loop.
    pub fn pump(
        &mut self,
        wait: Duration,
        display: &mut dyn DisplaySink,
        status: &mut dyn StatusSink,
    ) {
        let mut drained = 0usize;
        while drained < MAX_EVENTS_PER_TICK {
            let event = if drained == 0 {
                self.events_rx.recv_timeout(wait).ok()
            } else {
                self.events_rx.try_recv().ok()
            };
            let Some(event) = event else {
                break;
            };
            drained += 1;
            self.handle_event(event, display, status);
        }

        let now = Instant::now();
        if self.render_throttle.poll(now) {
            display.render();
        }
        if self.status_throttle.poll(now) {
            if let Some(run) = &self.run {
                status.status(
                    StatusState::Running,
                    &format!("{}  ({} lines)", run.command_line, self.buffer.len()),
                );
            }
        }
    }

    fn handle_event(
        &mut self,
        event: ChildEvent,
        display: &mut dyn DisplaySink,
        status: &mut dyn StatusSink,
    ) {
        match event {
            ChildEvent::Chunk {
                generation,
                source,
                data,
            } => {
                if generation != self.generation {
                    return;
                }
                let lines = {
                    let Some(run) = self.run.as_mut() else {
                        return;
                    };
                    match source {
                        StreamSource::Stdout => run.stdout_lines.feed(&data),
                        StreamSource::Stderr => run.stderr_lines.feed(&data),
                    }
                };
                for raw in lines {
                    if raw.is_empty() {
                        continue;
                    }
                    self.ingest_line(source, &raw, display);
                }
            }
            ChildEvent::Eof { generation, source } => {
                if generation != self.generation {
                    return;
                }
                let flushed = {
                    let Some(run) = self.run.as_mut() else {
                        return;
                    };
                    match source {
                        StreamSource::Stdout => {
                            run.stdout_open = false;
                            run.stdout_lines.finish()
                        }
                        StreamSource::Stderr => {
                            run.stderr_open = false;
                            run.stderr_lines.finish()
                        }
                    }
                };
                if let Some(raw) = flushed {
                    if !raw.is_empty() {
                        self.ingest_line(source, &raw, display);
                    }
                }
                self.maybe_finalize(display, status);
            }
            ChildEvent::Exited {
                generation,
                outcome,
            } => {
                if generation != self.generation {
                    return;
                }
                if let Some(run) = self.run.as_mut() {
                    run.exit = Some(outcome);
                }
                self.maybe_finalize(display, status);
            }
        }
    }

    /// Sanitize, buffer, and (while live) display one line of output.
    fn ingest_line(&mut self, source: StreamSource, raw: &str, display: &mut dyn DisplaySink) {
        let sanitized = sanitize_line(raw);
        let line = match source {
            StreamSource::Stdout => sanitized,
            StreamSource::Stderr => styled(self.theme.stderr, &sanitized),
        };
        self.buffer.push(line.clone());

        match self.mode {
            StreamingMode::Live => {
                display.append_line(&line);
                self.head_count += 1;
                if self.render_throttle.request(Instant::now()) {
                    display.render();
                }
                if self.head_count >= self.tuning.head_line_limit {
                    self.mode = StreamingMode::Buffered;
                    display.append_line("");
                    display.append_line(&styled(
                        self.theme.warning,
                        "... buffering remaining output (scrollable when complete)",
                    ));
                    if self.render_throttle.request(Instant::now()) {
                        display.render();
                    }
                }
            }
            StreamingMode::Buffered => {
                self.status_throttle.arm(Instant::now());
            }
        }
    }

    fn maybe_finalize(&mut self, display: &mut dyn DisplaySink, status: &mut dyn StatusSink) {
        if !self.run.as_ref().is_some_and(RunState::is_settled) {
            return;
        }
        let Some(run) = self.run.take() else {
            return;
        };
        self.active = None;
        self.status_throttle.reset();

        let duration = run.started.elapsed();
        let outcome = run.exit.clone().unwrap_or(ExitOutcome::Unknown);

        if let Some(activity) = self.activity.as_mut() {
            let state = match &outcome {
                ExitOutcome::Code(0) => "OK".to_owned(),
                ExitOutcome::Code(code) => format!("FAIL({code})"),
                ExitOutcome::Signal(signal) => format!("SIGNAL({signal})"),
                ExitOutcome::Unknown => "FAIL(unknown)".to_owned(),
                ExitOutcome::WaitError(message) => format!("ERROR({message})"),
            };
            activity.elapsed(run.started, &format!("{state}  {}", run.runnable));
        }

        if self.sequence.is_some() {
            self.finalize_step(run, outcome, duration, display, status);
        } else {
            self.finalize_single(run, outcome, duration, display, status);
        }
    }

    fn finalize_single(
        &mut self,
        run: RunState,
        outcome: ExitOutcome,
        duration: Duration,
        display: &mut dyn DisplaySink,
        status: &mut dyn StatusSink,
    ) {
        self.flush_buffer(display);

        let duration_text = format_duration(duration);
        let line_note = if self.buffer.len() > self.tuning.head_line_limit {
            format!(
                "  {}",
                styled(self.theme.muted, &format!("({} lines)", self.buffer.len()))
            )
        } else {
            String::new()
        };

        display.append_line("");
        display.append_line(&styled(self.theme.rule, COMPLETION_RULE));
        match outcome {
            ExitOutcome::Code(0) => {
                display.append_line(&format!(
                    "{}{line_note}",
                    styled(
                        self.theme.success,
                        &format!("✓ Done  {}  ({duration_text})", run.command_line)
                    )
                ));
                status.status(
                    StatusState::Success,
                    &format!("{} -- {duration_text}", run.command_line),
                );
                self.last_outcome = Some(RunOutcome::Success { duration });
            }
            ExitOutcome::Code(code) => {
                display.append_line(&format!(
                    "{}{line_note}",
                    styled(
                        self.theme.error,
                        &format!(
                            "✗ Failed (exit {code})  {}  ({duration_text})",
                            run.command_line
                        )
                    )
                ));
                status.status(
                    StatusState::Error,
                    &format!("{} -- exit {code} ({duration_text})", run.command_line),
                );
                self.last_outcome = Some(RunOutcome::Failed {
                    detail: format!("exit {code}"),
                    code: Some(code),
                    duration,
                });
            }
            ExitOutcome::Signal(signal) => {
                display.append_line(&format!(
                    "{}{line_note}",
                    styled(
                        self.theme.error,
                        &format!(
                            "✗ Failed (signal {signal})  {}  ({duration_text})",
                            run.command_line
                        )
                    )
                ));
                status.status(
                    StatusState::Error,
                    &format!("{} -- signal {signal} ({duration_text})", run.command_line),
                );
                self.last_outcome = Some(RunOutcome::Failed {
                    detail: format!("signal {signal}"),
                    code: None,
                    duration,
                });
            }
            ExitOutcome::Unknown => {
                display.append_line(&styled(
                    self.theme.error,
                    &format!(
                        "✗ Failed (unknown exit)  {}  ({duration_text})",
                        run.command_line
                    ),
                ));
                status.status(
                    StatusState::Error,
                    &format!("{} -- unknown exit ({duration_text})", run.command_line),
                );
                self.last_outcome = Some(RunOutcome::Failed {
                    detail: "unknown exit".to_owned(),
                    code: None,
                    duration,
                });
            }
            ExitOutcome::WaitError(message) => {
                display.append_line(&styled(
                    self.theme.error,
                    &format!("✗ Error  {message}  ({duration_text})"),
                ));
                status.status(StatusState::Error, &format!("{message} ({duration_text})"));
                self.last_outcome = Some(RunOutcome::Error { message, duration });
            }
        }
        display.set_scroll_percent(100);
        display.render();
    }

    fn finalize_step(
        &mut self,
        run: RunState,
        outcome: ExitOutcome,
        duration: Duration,
        display: &mut dyn DisplaySink,
        status: &mut dyn StatusSink,
    ) {
        let duration_text = format_duration(duration);
        match &outcome {
            ExitOutcome::Code(0) => {
                display.append_line(&styled(
                    self.theme.success,
                    &format!("  ✓ {} ({duration_text})", run.command_line),
                ));
            }
            ExitOutcome::Code(code) => {
                display.append_line(&styled(
                    self.theme.error,
                    &format!("  ✗ {} exit {code} ({duration_text})", run.command_line),
                ));
            }
            ExitOutcome::Signal(signal) => {
                display.append_line(&styled(
                    self.theme.error,
                    &format!("  ✗ {} signal {signal} ({duration_text})", run.command_line),
                ));
            }
            ExitOutcome::Unknown => {
                display.append_line(&styled(
                    self.theme.error,
                    &format!("  ✗ {} unknown exit ({duration_text})", run.command_line),
                ));
            }
            ExitOutcome::WaitError(message) => {
                display.append_line(&styled(
                    self.theme.error,
                    &format!("  ✗ {} error: {message} ({duration_text})", run.command_line),
                ));
            }
        }

        if let Some(sequence) = self.sequence.as_mut() {
            sequence.advance();
            if !sequence.is_complete() {
                self.start_current_step(display, status);
                return;
            }
        }
        let Some(sequence) = self.sequence.take() else {
            return;
        };

        let total = sequence.started.elapsed();
        let total_text = format_duration(total);
        self.flush_buffer(display);
        display.append_line("");
        display.append_line(&styled(self.theme.rule, COMPLETION_RULE));
        display.append_line(&styled(
            self.theme.success,
            &format!("✓ Done  {} commands  ({total_text})", sequence.steps.len()),
        ));
        status.status(
            StatusState::Success,
            &format!("Sequence complete -- {total_text}"),
        );
        self.last_outcome = Some(RunOutcome::Success { duration: total });
        display.set_scroll_percent(100);
        display.render();
    }

    fn start_current_step(&mut self, display: &mut dyn DisplaySink, status: &mut dyn StatusSink) {
        let (step, index, cwd) = {
            let Some(sequence) = self.sequence.as_ref() else {
                return;
            };
            let Some(step) = sequence.current() else {
                return;
            };
            (step.clone(), sequence.index, sequence.cwd.clone())
        };

        if index > 0 {
            display.append_line("");
            display.append_line(&styled(self.theme.separator, COMPLETION_RULE));
            display.append_line("");
        }
        if let Some(label) = &step.label {
            display.append_line(&styled(self.theme.warning, label));
        }
        let command_line = step.command_line();
        let runnable = format!("cd {} && {command_line}", cwd.display());
        self.emit_start_banner(&command_line, &cwd, &runnable, display);
        display.render();

        if let Some(activity) = self.activity.as_mut() {
            activity.info(&format!("START  {runnable}"));
        }

        self.spawn_into_run(
            &step.command,
            &step.args,
            &cwd,
            false,
            command_line,
            runnable,
            display,
            status,
        );
        // A step that failed to spawn halts the remaining steps
        if self.active.is_none() {
            self.sequence = None;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_into_run(
        &mut self,
        command: &str,
        args: &[String],
        cwd: &Path,
        shell: bool,
        command_line: String,
        runnable: String,
        display: &mut dyn DisplaySink,
        status: &mut dyn StatusSink,
    ) {
        match spawn_streaming(command, args, cwd, shell, self.generation, &self.events_tx) {
            Ok(child) => {
                self.active = Some(child);
                self.run = Some(RunState::new(command_line, runnable));
            }
            Err(err) => {
                let message = err.to_string();
                display.append_line(&styled(self.theme.error, &message));
                status.status(StatusState::Error, &message);
                display.render();
                if let Some(activity) = self.activity.as_mut() {
                    activity.info(&format!("ERROR  {runnable}  {message}"));
                }
                self.last_outcome = Some(RunOutcome::Error {
                    message,
                    duration: Duration::ZERO,
                });
            }
        }
    }

    fn emit_start_banner(
        &self,
        command_line: &str,
        cwd: &Path,
        runnable: &str,
        display: &mut dyn DisplaySink,
    ) {
        display.append_line(&styled(self.theme.accent, &format!("$ {command_line}")));
        display.append_line(&styled(
            self.theme.muted,
            &format!("  cwd: {}", cwd.display()),
        ));
        display.append_line(&styled(self.theme.muted, &format!("  run: {runnable}")));
        display.append_line("");
    }

    fn reset_session(&mut self, append: bool, display: &mut dyn DisplaySink) {
        self.generation += 1;
        self.buffer.clear();
        self.head_count = 0;
        self.mode = StreamingMode::Live;
        self.render_throttle.reset();
        self.status_throttle.reset();
        self.search = None;
        self.sequence = None;
        self.run = None;
        self.last_outcome = None;
        if !append {
            display.set_content("");
        }
    }

    /// After a buffered run, load the whole transcript into the display
    /// in one call so the user can scroll through everything.
    fn flush_buffer(&mut self, display: &mut dyn DisplaySink) {
        if self.mode != StreamingMode::Buffered {
            // Everything already streamed live
            return;
        }
        display.set_content(&self.buffer.joined());
        display.set_scroll_percent(100);
    }

    /// Search the output buffer. Empty query is a no-op; an empty buffer
    /// reports "nothing to search". The session snapshots matches at
    /// call time.
    pub fn search(
        &mut self,
        query: &str,
        display: &mut dyn DisplaySink,
        status: &mut dyn StatusSink,
    ) {
        if query.is_empty() {
            return;
        }
        if self.buffer.is_empty() {
            display.set_content(&format!(
                "{}\n\nRun a command first, then search with [/].",
                styled(self.theme.warning, "No output to search.")
            ));
            display.render();
            return;
        }
        self.search = Some(SearchSession::build(
            self.buffer.lines(),
            query,
            &self.theme,
        ));
        self.render_search(display, status);
    }

    /// Move to the next (+1) or previous (-1) match, wrapping around.
    /// No-op without an active session or with zero matches.
    pub fn search_navigate(
        &mut self,
        direction: i32,
        display: &mut dyn DisplaySink,
        status: &mut dyn StatusSink,
    ) {
        let Some(session) = self.search.as_mut() else {
            return;
        };
        if !session.navigate(direction) {
            return;
        }
        self.render_search(display, status);
    }

    /// Leave search mode and restore the full transcript.
    pub fn search_clear(&mut self, display: &mut dyn DisplaySink) {
        self.search = None;
        if !self.buffer.is_empty() {
            display.set_content(&self.buffer.joined());
            display.set_scroll_percent(100);
            display.render();
        }
    }

    /// True whenever a search session exists, even one with zero
    /// matches — "searched, found nothing" is distinct from "never
    /// searched".
    pub fn is_search_active(&self) -> bool {
        self.search.is_some()
    }

    fn render_search(&mut self, display: &mut dyn DisplaySink, status: &mut dyn StatusSink) {
        let Some(session) = &self.search else {
            return;
        };
        let view = render_results(session, self.buffer.len(), &self.theme);
        display.set_content(&view.content);
        display.set_scroll_percent(view.scroll_percent);
        if let Some(message) = &view.status {
            status.status(StatusState::Search, message);
        }
        display.render();
    }
}

/// Human-readable wall-clock duration: `1.2s`, `1m 23s`, `2h 5m 12s`.
pub fn format_duration(elapsed: Duration) -> String {
    let total_ms = elapsed.as_millis();
    let total_seconds = total_ms / 1000;
    if total_seconds < 60 {
        let tenths = (total_ms % 1000) / 100;
        return format!("{total_seconds}.{tenths}s");
    }
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    if minutes < 60 {
        return format!("{minutes}m {seconds}s");
    }
    let hours = minutes / 60;
    let minutes = minutes % 60;
    format!("{hours}h {minutes}m {seconds}s")
}

/// Summary of a completed headless run, for the `--json` contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub command: String,
    pub cwd: PathBuf,
    pub ok: bool,
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub line_count: usize,
}

/// Drive a single run to completion on the calling thread.
pub fn run_to_completion(
    spec: RunSpec,
    tuning: Tuning,
    activity: Option<Box<dyn ActivityLog>>,
    display: &mut dyn DisplaySink,
    status: &mut dyn StatusSink,
) -> RunReport {
    let command = spec.command_line();
    let cwd = spec.cwd.clone();
    let mut runner = ProcessRunner::new(tuning);
    if let Some(activity) = activity {
        runner = runner.with_activity(activity);
    }
    runner.run(spec, display, status);
    drive_to_idle(&mut runner, display, status);
    report_from(&runner, command, cwd)
}

/// Drive a sequence to completion on the calling thread.
pub fn run_sequence_to_completion(
    steps: Vec<StepSpec>,
    cwd: PathBuf,
    tuning: Tuning,
    activity: Option<Box<dyn ActivityLog>>,
    display: &mut dyn DisplaySink,
    status: &mut dyn StatusSink,
) -> RunReport {
    let command = steps
        .iter()
        .map(StepSpec::command_line)
        .collect::<Vec<String>>()
        .join(" && ");
    let mut runner = ProcessRunner::new(tuning);
    if let Some(activity) = activity {
        runner = runner.with_activity(activity);
    }
    runner.run_sequence(steps, cwd.clone(), display, status);
    drive_to_idle(&mut runner, display, status);
    report_from(&runner, command, cwd)
}

fn drive_to_idle(
    runner: &mut ProcessRunner,
    display: &mut dyn DisplaySink,
    status: &mut dyn StatusSink,
) {
    while runner.is_busy() {
        runner.pump(Duration::from_millis(25), display, status);
    }
}

fn report_from(runner: &ProcessRunner, command: String, cwd: PathBuf) -> RunReport {
    let (ok, exit_code, duration) = match runner.last_outcome() {
        Some(RunOutcome::Success { duration }) => (true, Some(0), *duration),
        Some(RunOutcome::Failed { code, duration, .. }) => (false, *code, *duration),
        Some(RunOutcome::Error { duration, .. }) => (false, None, *duration),
        None => (false, None, Duration::ZERO),
    };
    RunReport {
        command,
        cwd,
        ok,
        exit_code,
        duration,
        line_count: runner.buffer_lines().len(),
    }
}

/// Versioned JSON rendering of a run report.
pub fn render_report_json(report: &RunReport) -> String {
    let payload = serde_json::json!({
        "schema": "spillway.run.v1",
        "schema_version": 1,
        "ok": report.ok,
        "command": report.command,
        "cwd": report.cwd.display().to_string(),
        "exit_code": report.exit_code,
        "duration_ms": report.duration.as_millis() as u64,
        "line_count": report.line_count,
    });
    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "{}".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_shapes() {
        assert_eq!(format_duration(Duration::from_millis(1234)), "1.2s");
        assert_eq!(format_duration(Duration::from_millis(150)), "0.1s");
        assert_eq!(format_duration(Duration::from_secs(83)), "1m 23s");
        assert_eq!(format_duration(Duration::from_secs(7512)), "2h 5m 12s");
    }

    #[test]
    fn run_spec_command_line_joins_args() {
        let spec = RunSpec::new("git", vec!["diff".to_owned(), "--stat".to_owned()], "/tmp");
        assert_eq!(spec.command_line(), "git diff --stat");
    }

    #[test]
    fn report_json_carries_schema_and_fields() {
        let report = RunReport {
            command: "echo hi".to_owned(),
            cwd: PathBuf::from("/tmp"),
            ok: true,
            exit_code: Some(0),
            duration: Duration::from_millis(1500),
            line_count: 1,
        };
        let rendered = render_report_json(&report);
        let parsed: serde_json::Value = serde_json::from_str(&rendered).expect("json");
        assert_eq!(parsed["schema"], "spillway.run.v1");
        assert_eq!(parsed["ok"], true);
        assert_eq!(parsed["exit_code"], 0);
        assert_eq!(parsed["duration_ms"], 1500);
        assert_eq!(parsed["line_count"], 1);
    }
}
