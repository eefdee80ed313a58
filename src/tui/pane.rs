//! The output pane and status bar the runner streams into, plus the
//! ANSI-SGR-to-span parser that turns styled lines into ratatui text.

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

use crate::display::{DisplaySink, StatusSink, StatusState};

/// Scrollable line store behind the output area. Follows the end while
/// output streams; manual scrolling detaches, `End` re-attaches.
#[derive(Debug, Default)]
pub(super) struct LogPane {
    lines: Vec<String>,
    follow: bool,
    offset: usize,
    requested_percent: Option<u8>,
    last_height: usize,
    dirty: bool,
}

impl LogPane {
    pub(super) fn new() -> Self {
        Self {
            follow: true,
            dirty: true,
            ..Self::default()
        }
    }

    pub(super) fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Resolve scrolling against the current viewport height and return
    /// the visible slice as styled lines.
    pub(super) fn visible_lines(&mut self, height: usize) -> Vec<Line<'static>> {
        self.last_height = height.max(1);
        let max_offset = self.lines.len().saturating_sub(self.last_height);
        if let Some(percent) = self.requested_percent.take() {
            self.offset = (self.lines.len() * percent as usize / 100).min(max_offset);
            self.follow = percent >= 100;
        }
        let start = if self.follow {
            max_offset
        } else {
            self.offset.min(max_offset)
        };
        self.offset = start;
        let end = (start + self.last_height).min(self.lines.len());
        self.lines[start..end]
            .iter()
            .map(|line| ansi_line(line, Style::default()))
            .collect()
    }

    pub(super) fn scroll_up(&mut self, amount: usize) {
        self.follow = false;
        self.offset = self.offset.saturating_sub(amount);
        self.dirty = true;
    }

    pub(super) fn scroll_down(&mut self, amount: usize) {
        let max_offset = self.lines.len().saturating_sub(self.last_height.max(1));
        self.offset = (self.offset + amount).min(max_offset);
        if self.offset == max_offset {
            self.follow = true;
        }
        self.dirty = true;
    }

    pub(super) fn scroll_home(&mut self) {
        self.follow = false;
        self.offset = 0;
        self.dirty = true;
    }

    pub(super) fn scroll_end(&mut self) {
        self.follow = true;
        self.dirty = true;
    }
}

impl DisplaySink for LogPane {
    fn append_line(&mut self, line: &str) {
        self.lines.push(line.to_owned());
        self.dirty = true;
    }

    fn set_content(&mut self, content: &str) {
        self.lines = if content.is_empty() {
            Vec::new()
        } else {
            content.split('\n').map(str::to_owned).collect()
        };
        self.offset = 0;
        self.dirty = true;
    }

    fn set_scroll_percent(&mut self, percent: u8) {
        self.requested_percent = Some(percent);
        self.dirty = true;
    }

    fn render(&mut self) {
        self.dirty = true;
    }
}

/// One-line status bar colored by run state.
#[derive(Debug)]
pub(super) struct StatusBar {
    state: StatusState,
    message: String,
    dirty: bool,
}

impl StatusBar {
    pub(super) fn new() -> Self {
        Self {
            state: StatusState::Success,
            message: "ready".to_owned(),
            dirty: true,
        }
    }

    pub(super) fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(super) fn line(&self) -> Line<'static> {
        let style = match self.state {
            StatusState::Running => Style::default().fg(Color::Cyan),
            StatusState::Success => Style::default().fg(Color::Green),
            StatusState::Error => Style::default().fg(Color::Red),
            StatusState::Search => Style::default().fg(Color::Yellow),
        };
        Line::from(Span::styled(format!(" {}", self.message), style))
    }
}

impl StatusSink for StatusBar {
    fn status(&mut self, state: StatusState, message: &str) {
        self.state = state;
        self.message = message.to_owned();
        self.dirty = true;
    }
}

/// Parse a line containing ANSI SGR sequences into styled spans. Non-SGR
/// escapes are dropped.
pub(super) fn ansi_line(raw: &str, base: Style) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut style = base;
    let mut buf = String::new();
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        if chars[i] == '\u{1b}' && chars.get(i + 1) == Some(&'[') {
            if !buf.is_empty() {
                spans.push(Span::styled(std::mem::take(&mut buf), style));
            }
            i += 2;
            let mut code = String::new();
            while i < chars.len() {
                let final_byte = chars[i];
                if ('@'..='~').contains(&final_byte) {
                    if final_byte == 'm' {
                        style = apply_sgr(style, &code, base);
                    }
                    break;
                }
                code.push(chars[i]);
                i += 1;
            }
        } else {
            buf.push(chars[i]);
        }
        i += 1;
    }
    if !buf.is_empty() {
        spans.push(Span::styled(buf, style));
    }
    if spans.is_empty() {
        return Line::from("");
    }
    Line::from(spans)
}

fn apply_sgr(current: Style, sgr: &str, base: Style) -> Style {
    let mut style = current;
    let parts = if sgr.is_empty() {
        vec!["0"]
    } else {
        sgr.split(';').collect::<Vec<&str>>()
    };
    for part in parts {
        match part.parse::<u8>() {
            Ok(0) => style = base,
            Ok(1) => style = style.add_modifier(Modifier::BOLD),
            Ok(2) => style = style.add_modifier(Modifier::DIM),
            Ok(3) => style = style.add_modifier(Modifier::ITALIC),
            Ok(4) => style = style.add_modifier(Modifier::UNDERLINED),
            Ok(22) => style = style.remove_modifier(Modifier::BOLD | Modifier::DIM),
            Ok(23) => style = style.remove_modifier(Modifier::ITALIC),
            Ok(24) => style = style.remove_modifier(Modifier::UNDERLINED),
            Ok(30) => style = style.fg(Color::Black),
            Ok(31) => style = style.fg(Color::Red),
            Ok(32) => style = style.fg(Color::Green),
            Ok(33) => style = style.fg(Color::Yellow),
            Ok(34) => style = style.fg(Color::Blue),
            Ok(35) => style = style.fg(Color::Magenta),
            Ok(36) => style = style.fg(Color::Cyan),
            Ok(37) => style = style.fg(Color::Gray),
            Ok(39) => style = style.fg(base.fg.unwrap_or(Color::Reset)),
            Ok(90) => style = style.fg(Color::DarkGray),
            Ok(91) => style = style.fg(Color::LightRed),
            Ok(92) => style = style.fg(Color::LightGreen),
            Ok(93) => style = style.fg(Color::LightYellow),
            Ok(94) => style = style.fg(Color::LightBlue),
            Ok(95) => style = style.fg(Color::LightMagenta),
            Ok(96) => style = style.fg(Color::LightCyan),
            Ok(97) => style = style.fg(Color::White),
            _ => {}
        }
    }
    style
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::{styled, Theme};

    #[test]
    fn ansi_line_parses_basic_colour_sequence() {
        let line = ansi_line("\u{1b}[31merror\u{1b}[0m ok", Style::default());
        assert_eq!(line.spans.len(), 2);
        assert_eq!(line.spans[0].content.as_ref(), "error");
        assert_eq!(line.spans[1].content.as_ref(), " ok");
    }

    #[test]
    fn ansi_line_handles_theme_styled_text() {
        let theme = Theme::default();
        let line = ansi_line(&styled(theme.success, "✓ Done"), Style::default());
        let rendered: String = line
            .spans
            .iter()
            .map(|span| span.content.as_ref())
            .collect();
        assert_eq!(rendered, "✓ Done");
    }

    #[test]
    fn ansi_line_ignores_non_sgr_escape_sequences() {
        let line = ansi_line(
            "\u{1b}[2K\u{1b}[1Ahello \u{1b}[31mred\u{1b}[0m",
            Style::default(),
        );
        let rendered: String = line
            .spans
            .iter()
            .map(|span| span.content.as_ref())
            .collect();
        assert_eq!(rendered, "hello red");
    }

    #[test]
    fn pane_follows_end_until_scrolled() {
        let mut pane = LogPane::new();
        for i in 0..10 {
            pane.append_line(&format!("line-{i}"));
        }
        let visible = pane.visible_lines(4);
        assert_eq!(visible.len(), 4);
        assert_eq!(visible[3].spans[0].content.as_ref(), "line-9");

        pane.scroll_up(2);
        let visible = pane.visible_lines(4);
        assert_eq!(visible[0].spans[0].content.as_ref(), "line-4");

        pane.scroll_end();
        let visible = pane.visible_lines(4);
        assert_eq!(visible[3].spans[0].content.as_ref(), "line-9");
    }

    #[test]
    fn pane_scroll_percent_reattaches_follow_at_end() {
        let mut pane = LogPane::new();
        for i in 0..20 {
            pane.append_line(&format!("line-{i}"));
        }
        pane.scroll_home();
        let visible = pane.visible_lines(5);
        assert_eq!(visible[0].spans[0].content.as_ref(), "line-0");

        pane.set_scroll_percent(100);
        let visible = pane.visible_lines(5);
        assert_eq!(visible[4].spans[0].content.as_ref(), "line-19");
        // New lines keep the view pinned to the end again
        pane.append_line("line-20");
        let visible = pane.visible_lines(5);
        assert_eq!(visible[4].spans[0].content.as_ref(), "line-20");
    }
}
