//! Escape-sequence and control-byte stripping for child process output.
//!
//! Child processes are spawned with color disabled, but plenty of tools
//! emit escape sequences regardless. Everything that reaches the output
//! buffer goes through [`sanitize_line`] first, so buffer content is
//! plain text and the only styling on screen is what spillway itself
//! renders.

/// Remove ANSI escape sequences: CSI (`ESC [ ... <final>`), OSC
/// (`ESC ] ... BEL` or `ESC ] ... ESC \`), and two-byte sequences such
/// as charset selection (`ESC ( B`).
pub fn strip_ansi(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0usize;
    while i < chars.len() {
        if chars[i] != '\u{1b}' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let Some(&next) = chars.get(i + 1) else {
            // Dangling ESC at end of input
            i += 1;
            continue;
        };
        match next {
            '[' => {
                i += 2;
                while i < chars.len() {
                    if ('@'..='~').contains(&chars[i]) {
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            ']' => {
                i += 2;
                while i < chars.len() {
                    if chars[i] == '\u{0007}' {
                        i += 1;
                        break;
                    }
                    if chars[i] == '\u{1b}' && chars.get(i + 1) == Some(&'\\') {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            }
            _ => {
                // Two-byte escape (charset selection and friends)
                i += 2;
            }
        }
    }
    out
}

/// Drop control bytes that would corrupt a line-oriented display:
/// C0 controls (except tab), carriage returns, and DEL. Any ESC still
/// present after [`strip_ansi`] is dropped here too.
pub fn strip_controls(raw: &str) -> String {
    raw.chars()
        .filter(|ch| {
            !matches!(
                ch,
                '\r' | '\u{0000}'..='\u{0008}' | '\u{000A}'..='\u{001F}' | '\u{007F}'
            )
        })
        .collect()
}

/// Full sanitization pass for one line of child output.
pub fn sanitize_line(raw: &str) -> String {
    strip_controls(&strip_ansi(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_sgr_color_sequences() {
        assert_eq!(strip_ansi("\u{1b}[31mred\u{1b}[0m plain"), "red plain");
        assert_eq!(strip_ansi("\u{1b}[1;38;5;208mbold\u{1b}[m"), "bold");
    }

    #[test]
    fn strips_osc_sequences_with_both_terminators() {
        assert_eq!(strip_ansi("\u{1b}]0;title\u{0007}body"), "body");
        assert_eq!(strip_ansi("\u{1b}]8;;http://x\u{1b}\\link"), "link");
    }

    #[test]
    fn strips_two_byte_escapes() {
        assert_eq!(strip_ansi("\u{1b}(Btext"), "text");
    }

    #[test]
    fn dangling_escape_is_dropped() {
        assert_eq!(strip_ansi("tail\u{1b}"), "tail");
        assert_eq!(strip_ansi("tail\u{1b}["), "tail");
    }

    #[test]
    fn control_filter_keeps_tabs_and_text() {
        assert_eq!(strip_controls("a\tb"), "a\tb");
        assert_eq!(strip_controls("a\u{0008}b\rc"), "abc");
    }

    #[test]
    fn sanitize_line_combines_both_passes() {
        assert_eq!(
            sanitize_line("\u{1b}[32mok\u{1b}[0m\u{0007} done\r"),
            "ok done"
        );
    }
}
