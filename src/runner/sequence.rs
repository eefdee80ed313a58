//! Explicit state for a multi-step run: the step list, the index of the
//! step currently executing, and the shared timing baseline. The runner
//! advances this when a step's process finalizes.

use std::path::PathBuf;
use std::time::Instant;

/// One step of a sequence: a command, its arguments, and an optional
/// human-readable label shown above the step's banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpec {
    pub command: String,
    pub args: Vec<String>,
    pub label: Option<String>,
}

impl StepSpec {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
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

#[derive(Debug)]
pub(super) struct SequenceState {
    pub(super) steps: Vec<StepSpec>,
    pub(super) index: usize,
    pub(super) cwd: PathBuf,
    pub(super) started: Instant,
}

impl SequenceState {
    pub(super) fn new(steps: Vec<StepSpec>, cwd: PathBuf) -> Self {
        Self {
            steps,
            index: 0,
            cwd,
            started: Instant::now(),
        }
    }

    pub(super) fn current(&self) -> Option<&StepSpec> {
        self.steps.get(self.index)
    }

    pub(super) fn advance(&mut self) {
        self.index += 1;
    }

    pub(super) fn is_complete(&self) -> bool {
        self.index >= self.steps.len()
    }
}
