//! Post-hoc search over a completed output buffer: case-insensitive
//! substring matching, a rendered results view, and wraparound
//! next/previous navigation.

use crate::sanitize::strip_ansi;
use crate::theme::{styled, Theme};

/// One search over the buffer as it stood at the call. Exists even with
/// zero matches — "searched, found nothing" is distinct from "never
/// searched".
#[derive(Debug)]
pub struct SearchSession {
    query: String,
    matches: Vec<usize>,
    cursor: Option<usize>,
    result_lines: Vec<String>,
}

/// Rendered results view plus the scroll/status side effects that go
/// with it.
#[derive(Debug, PartialEq, Eq)]
pub struct SearchView {
    pub content: String,
    pub scroll_percent: u8,
    pub status: Option<String>,
}

impl SearchSession {
    /// Scan every buffer line (ANSI-stripped projection) for the query,
    /// ASCII case-insensitive. Match indices are ascending buffer
    /// positions; the cursor starts unselected.
    pub fn build(lines: &[String], query: &str, theme: &Theme) -> Self {
        let mut matches = Vec::new();
        let mut result_lines = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            let plain = strip_ansi(line);
            let ranges = match_ranges(&plain, query);
            if ranges.is_empty() {
                continue;
            }
            matches.push(index);
            let number = styled(theme.muted, &format!("{:>5}:", index + 1));
            let highlighted = highlight_ranges(&plain, &ranges, theme);
            result_lines.push(format!("{number} {highlighted}"));
        }
        Self {
            query: query.to_owned(),
            matches,
            cursor: None,
            result_lines,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> &[usize] {
        &self.matches
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Move the cursor by +1/-1 with wraparound. From the unselected
    /// state, forward selects the first match and backward the last.
    /// No-op (returns false) when there are no matches.
    pub fn navigate(&mut self, direction: i32) -> bool {
        if self.matches.is_empty() {
            return false;
        }
        let len = self.matches.len();
        self.cursor = Some(match self.cursor {
            None => {
                if direction >= 0 {
                    0
                } else {
                    len - 1
                }
            }
            Some(current) => {
                if direction >= 0 {
                    (current + 1) % len
                } else if current == 0 {
                    len - 1
                } else {
                    current - 1
                }
            }
        });
        true
    }
}

/// Build the results view: header, one entry per match with the current
/// one marked, footer with the match count and key hints.
pub fn render_results(session: &SearchSession, buffer_len: usize, theme: &Theme) -> SearchView {
    let mut lines = Vec::new();
    lines.push(format!(
        "{}  in {buffer_len} buffered lines",
        styled(theme.rule, &format!("Search: \"{}\"", session.query))
    ));
    lines.push(String::new());

    for (i, entry) in session.result_lines.iter().enumerate() {
        if session.cursor == Some(i) {
            lines.push(format!("{} {entry}", styled(theme.marker, ">>>")));
        } else {
            lines.push(format!("    {entry}"));
        }
    }

    lines.push(String::new());
    if session.matches.is_empty() {
        lines.push(format!(
            "{} for \"{}\" in {buffer_len} lines",
            styled(theme.warning, "No matches found"),
            session.query
        ));
    } else {
        lines.push(format!(
            "{}  ] next  [ prev",
            styled(theme.rule, &format!("{} matches", session.matches.len()))
        ));
    }
    lines.push("[/] search again  [Esc] back to full output".to_owned());

    let total = lines.len();
    let (scroll_percent, status) = match session.cursor {
        Some(cursor) if !session.matches.is_empty() => {
            // +2 accounts for the header lines before the entries
            let target = cursor + 2;
            let percent = ((target * 100) / total.max(1)).min(100) as u8;
            let line = session.matches[cursor] + 1;
            let message = format!(
                "Match {}/{}  line {line}  ] next  [ prev  [/] search  [Esc] done",
                cursor + 1,
                session.matches.len()
            );
            (percent, Some(message))
        }
        _ => (0, None),
    };

    SearchView {
        content: lines.join("\n"),
        scroll_percent,
        status,
    }
}

/// Non-overlapping match ranges of `query` in `plain`, ASCII
/// case-insensitive. Byte offsets; empty queries never match.
fn match_ranges(plain: &str, query: &str) -> Vec<(usize, usize)> {
    let needle = query.as_bytes();
    if needle.is_empty() {
        return Vec::new();
    }
    let haystack = plain.as_bytes();
    let mut ranges = Vec::new();
    let mut from = 0usize;
    while from + needle.len() <= haystack.len() {
        let found = (from..=haystack.len() - needle.len())
            .find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle));
        let Some(start) = found else {
            break;
        };
        ranges.push((start, start + needle.len()));
        from = start + needle.len();
    }
    ranges
}

fn highlight_ranges(plain: &str, ranges: &[(usize, usize)], theme: &Theme) -> String {
    let mut out = String::with_capacity(plain.len());
    let mut at = 0usize;
    for &(start, end) in ranges {
        out.push_str(&plain[at..start]);
        out.push_str(&styled(theme.highlight, &plain[start..end]));
        at = end;
    }
    out.push_str(&plain[at..]);
    out
}
