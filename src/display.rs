//! The seams between the runner and its host: display, status bar, and
//! activity log. The runner only ever talks to these traits; concrete
//! sinks live here (plain stream output) and in the TUI module.

use std::io::{IsTerminal, Write};
use std::time::Instant;

use anstream::{AutoStream, ColorChoice};
use indicatif::{ProgressBar, ProgressStyle};

use crate::theme::{is_ci_environment, resolve_color_enabled, styled, OutputMode, Theme};

/// Where run output and banners go. Lines may carry ANSI SGR styling
/// produced by [`crate::theme::styled`]; a sink interprets or strips it
/// as appropriate for its medium.
pub trait DisplaySink {
    /// Append one line to the display.
    fn append_line(&mut self, line: &str);
    /// Replace the entire display content in one call.
    fn set_content(&mut self, content: &str);
    /// Scroll to a percentage of content height (100 = end).
    fn set_scroll_percent(&mut self, percent: u8);
    /// Request a repaint. Callers throttle this; a sink may treat it as
    /// a flush.
    fn render(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusState {
    Running,
    Success,
    Error,
    Search,
}

/// One-line status reporting (a status bar, a spinner, a log line).
pub trait StatusSink {
    fn status(&mut self, state: StatusState, message: &str);
}

/// Audit trail for run lifecycle events. Never used for control flow.
pub trait ActivityLog {
    fn info(&mut self, line: &str);
    fn elapsed(&mut self, started: Instant, line: &str);
}

/// Line-oriented display sink over an [`anstream::AutoStream`], for
/// non-interactive use. `AutoStream` strips our SGR styling when color
/// is not wanted, so the same marked-up lines serve both media.
pub struct PlainSink<W: Write> {
    writer: W,
}

impl<W: Write> PlainSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl PlainSink<AutoStream<std::io::Stdout>> {
    pub fn stdout(mode: OutputMode) -> Self {
        let choice = match mode {
            OutputMode::Auto => ColorChoice::Auto,
            OutputMode::Always => ColorChoice::AlwaysAnsi,
            OutputMode::Never => ColorChoice::Never,
        };
        Self::new(AutoStream::new(std::io::stdout(), choice))
    }
}

impl<W: Write> DisplaySink for PlainSink<W> {
    fn append_line(&mut self, line: &str) {
        let _ = writeln!(self.writer, "{line}");
    }

    fn set_content(&mut self, content: &str) {
        // A stream has no content to replace; re-emitting the full
        // content would duplicate what already streamed past. Headless
        // drivers lift the head limit so the runner never buffers, which
        // keeps this path unused during normal runs.
        let _ = content;
    }

    fn set_scroll_percent(&mut self, _percent: u8) {}

    fn render(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Status sink backed by an `indicatif` spinner, for interactive plain
/// mode (the TUI has its own status bar).
pub struct SpinnerStatus {
    spinner: ProgressBar,
}

impl SpinnerStatus {
    pub fn stderr() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    /// Whether a spinner makes sense for the current stderr.
    pub fn suitable() -> bool {
        std::io::stderr().is_terminal() && !is_ci_environment()
    }
}

impl StatusSink for SpinnerStatus {
    fn status(&mut self, state: StatusState, message: &str) {
        match state {
            StatusState::Running | StatusState::Search => {
                self.spinner.set_message(message.to_owned());
            }
            StatusState::Success => {
                self.spinner.finish_with_message(message.to_owned());
            }
            StatusState::Error => {
                self.spinner.abandon_with_message(message.to_owned());
            }
        }
    }
}

/// Status sink that discards everything (non-TTY plain mode: the output
/// stream already carries the banners).
#[derive(Debug, Default)]
pub struct QuietStatus;

impl StatusSink for QuietStatus {
    fn status(&mut self, _state: StatusState, _message: &str) {}
}

/// Activity log forwarding to `tracing`. The binary decides where the
/// subscriber writes.
#[derive(Debug, Default)]
pub struct TracingActivity;

impl ActivityLog for TracingActivity {
    fn info(&mut self, line: &str) {
        tracing::info!(target: "spillway::activity", "{line}");
    }

    fn elapsed(&mut self, started: Instant, line: &str) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(target: "spillway::activity", elapsed_ms, "{line}");
    }
}

/// Styled error block on stderr, for the binary's failure paths.
pub fn write_error_block(title: &str, body: &str, hint: Option<&str>) {
    let mode = OutputMode::from_env();
    let choice = match mode {
        OutputMode::Auto => ColorChoice::Auto,
        OutputMode::Always => ColorChoice::AlwaysAnsi,
        OutputMode::Never => ColorChoice::Never,
    };
    let color = resolve_color_enabled(mode, std::io::stderr().is_terminal());
    let theme = Theme::default();
    let mut stream = AutoStream::new(std::io::stderr(), choice);
    let marker = if color {
        styled(theme.error, "[error]")
    } else {
        "[error]".to_owned()
    };
    let _ = writeln!(stream, "{marker} {title}");
    let _ = writeln!(stream, "  {body}");
    if let Some(hint) = hint {
        let label = if color {
            styled(theme.muted, "hint")
        } else {
            "hint".to_owned()
        };
        let _ = writeln!(stream, "  {label}: {hint}");
    }
}
