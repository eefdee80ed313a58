//! Interactive terminal driver for the runner: an output pane, a
//! state-colored status bar, and a key map covering search, scrolling,
//! and kill.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnableLineWrap, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Style};
use ratatui::text::Text;
use ratatui::widgets::Paragraph;
use ratatui::{Frame, Terminal};

use crate::config::Tuning;
use crate::display::ActivityLog;
use crate::runner::{ProcessRunner, RunOutcome, RunSpec, StepSpec};

mod pane;

use pane::{LogPane, StatusBar};

const EVENT_DRAIN_WAIT: Duration = Duration::from_millis(2);
const INPUT_POLL_WAIT: Duration = Duration::from_millis(25);
const PAGE_SCROLL_LINES: usize = 10;

type TuiTerminal = Terminal<CrosstermBackend<std::io::Stdout>>;

#[derive(Debug)]
pub enum TuiError {
    Io(io::Error),
}

impl std::fmt::Display for TuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TuiError::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for TuiError {}

impl From<io::Error> for TuiError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// What to execute when the session opens.
pub enum TuiRequest {
    Single(RunSpec),
    Sequence { steps: Vec<StepSpec>, cwd: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Command,
    SearchInput,
}

enum LoopControl {
    Continue,
    Quit,
}

/// Run the interactive session to completion. Returns the exit code the
/// process should report: the child's where there was one, 1 on error.
pub fn run_app(
    request: TuiRequest,
    tuning: Tuning,
    activity: Option<Box<dyn ActivityLog>>,
) -> Result<i32, TuiError> {
    let mut terminal = init_terminal()?;
    let outcome = run_loop(&mut terminal, request, tuning, activity);
    restore_terminal(&mut terminal)?;
    outcome
}

fn init_terminal() -> Result<TuiTerminal, io::Error> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<(), io::Error> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, EnableLineWrap)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop(
    terminal: &mut TuiTerminal,
    request: TuiRequest,
    tuning: Tuning,
    activity: Option<Box<dyn ActivityLog>>,
) -> Result<i32, TuiError> {
    let mut runner = ProcessRunner::new(tuning);
    if let Some(activity) = activity {
        runner = runner.with_activity(activity);
    }
    let mut pane = LogPane::new();
    let mut status_bar = StatusBar::new();

    match request {
        TuiRequest::Single(spec) => runner.run(spec, &mut pane, &mut status_bar),
        TuiRequest::Sequence { steps, cwd } => {
            runner.run_sequence(steps, cwd, &mut pane, &mut status_bar)
        }
    }

    let mut input_mode = InputMode::Command;
    let mut search_input = String::new();
    let mut force_draw = true;

    loop {
        runner.pump(EVENT_DRAIN_WAIT, &mut pane, &mut status_bar);

        if event::poll(INPUT_POLL_WAIT)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    let control = handle_key(
                        &key,
                        &mut runner,
                        &mut pane,
                        &mut status_bar,
                        &mut input_mode,
                        &mut search_input,
                    );
                    force_draw = true;
                    if matches!(control, LoopControl::Quit) {
                        break;
                    }
                }
                Event::Resize(_, _) => force_draw = true,
                _ => {}
            }
        }

        if pane.take_dirty() || status_bar.take_dirty() || force_draw {
            force_draw = false;
            terminal.draw(|frame| {
                render_ui(frame, &mut pane, &status_bar, input_mode, &search_input)
            })?;
        }
    }

    runner.kill();
    Ok(exit_code(runner.last_outcome()))
}

fn handle_key(
    key: &KeyEvent,
    runner: &mut ProcessRunner,
    pane: &mut LogPane,
    status_bar: &mut StatusBar,
    input_mode: &mut InputMode,
    search_input: &mut String,
) -> LoopControl {
    if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
        return LoopControl::Quit;
    }

    if *input_mode == InputMode::SearchInput {
        match key.code {
            KeyCode::Enter => {
                *input_mode = InputMode::Command;
                let query = search_input.trim().to_owned();
                if !query.is_empty() {
                    runner.search(&query, pane, status_bar);
                }
            }
            KeyCode::Esc => {
                *input_mode = InputMode::Command;
                search_input.clear();
            }
            KeyCode::Backspace => {
                search_input.pop();
            }
            KeyCode::Char(c) => {
                search_input.push(c);
            }
            _ => {}
        }
        return LoopControl::Continue;
    }

    match key.code {
        KeyCode::Char('q') => return LoopControl::Quit,
        KeyCode::Char('k') => runner.kill(),
        KeyCode::Char('/') => {
            // Search is for completed output; the engine would accept a
            // partial buffer, but the key map follows the idle-only
            // policy.
            if !runner.is_running() && runner.has_buffer() {
                *input_mode = InputMode::SearchInput;
                search_input.clear();
            }
        }
        KeyCode::Char(']') => {
            if runner.is_search_active() {
                runner.search_navigate(1, pane, status_bar);
            }
        }
        KeyCode::Char('[') => {
            if runner.is_search_active() {
                runner.search_navigate(-1, pane, status_bar);
            }
        }
        KeyCode::Esc => {
            if runner.is_search_active() {
                runner.search_clear(pane);
            } else if !runner.is_busy() {
                return LoopControl::Quit;
            }
        }
        KeyCode::Up => pane.scroll_up(1),
        KeyCode::Down => pane.scroll_down(1),
        KeyCode::PageUp => pane.scroll_up(PAGE_SCROLL_LINES),
        KeyCode::PageDown => pane.scroll_down(PAGE_SCROLL_LINES),
        KeyCode::Home => pane.scroll_home(),
        KeyCode::End => pane.scroll_end(),
        _ => {}
    }

    LoopControl::Continue
}

fn render_ui(
    frame: &mut Frame,
    pane: &mut LogPane,
    status_bar: &StatusBar,
    input_mode: InputMode,
    search_input: &str,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let output_height = chunks[0].height as usize;
    let lines = pane.visible_lines(output_height);
    frame.render_widget(Paragraph::new(Text::from(lines)), chunks[0]);

    frame.render_widget(Paragraph::new(status_bar.line()), chunks[1]);

    let hints = match input_mode {
        InputMode::SearchInput => format!(" Search: {search_input}▏  [Enter] go  [Esc] cancel"),
        InputMode::Command => {
            " [/] search  ] next  [ prev  [k] kill  [Esc] back  [q] quit".to_owned()
        }
    };
    frame.render_widget(
        Paragraph::new(hints).style(Style::default().fg(Color::DarkGray)),
        chunks[2],
    );
}

fn exit_code(outcome: Option<&RunOutcome>) -> i32 {
    match outcome {
        Some(RunOutcome::Success { .. }) => 0,
        Some(RunOutcome::Failed { code, .. }) => code.unwrap_or(1),
        Some(RunOutcome::Error { .. }) => 1,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn exit_code_maps_outcomes() {
        assert_eq!(exit_code(None), 0);
        assert_eq!(
            exit_code(Some(&RunOutcome::Success {
                duration: Duration::ZERO
            })),
            0
        );
        assert_eq!(
            exit_code(Some(&RunOutcome::Failed {
                detail: "exit 3".to_owned(),
                code: Some(3),
                duration: Duration::ZERO
            })),
            3
        );
        assert_eq!(
            exit_code(Some(&RunOutcome::Failed {
                detail: "signal 15".to_owned(),
                code: None,
                duration: Duration::ZERO
            })),
            1
        );
        assert_eq!(
            exit_code(Some(&RunOutcome::Error {
                message: "boom".to_owned(),
                duration: Duration::ZERO
            })),
            1
        );
    }
}
