//! Recording sinks for exercising the runner without a terminal.

use std::time::Instant;

use crate::display::{ActivityLog, DisplaySink, StatusSink, StatusState};

/// Captures every display call in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub appended: Vec<String>,
    pub contents: Vec<String>,
    pub scrolls: Vec<u8>,
    pub renders: usize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content-replacement calls after the initial clear, i.e. flushes
    /// and search views.
    pub fn replacements(&self) -> Vec<&String> {
        self.contents.iter().filter(|c| !c.is_empty()).collect()
    }
}

impl DisplaySink for RecordingSink {
    fn append_line(&mut self, line: &str) {
        self.appended.push(line.to_owned());
    }

    fn set_content(&mut self, content: &str) {
        self.contents.push(content.to_owned());
    }

    fn set_scroll_percent(&mut self, percent: u8) {
        self.scrolls.push(percent);
    }

    fn render(&mut self) {
        self.renders += 1;
    }
}

#[derive(Debug, Default)]
pub struct RecordingStatus {
    pub updates: Vec<(StatusState, String)>,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&(StatusState, String)> {
        self.updates.last()
    }
}

impl StatusSink for RecordingStatus {
    fn status(&mut self, state: StatusState, message: &str) {
        self.updates.push((state, message.to_owned()));
    }
}

#[derive(Debug, Default)]
pub struct RecordingActivity {
    pub lines: Vec<String>,
}

impl ActivityLog for RecordingActivity {
    fn info(&mut self, line: &str) {
        self.lines.push(line.to_owned());
    }

    fn elapsed(&mut self, _started: Instant, line: &str) {
        self.lines.push(line.to_owned());
    }
}
