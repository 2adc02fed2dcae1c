use regex::Regex;
use std::sync::OnceLock;

fn ansi_regex() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| {
        Regex::new(concat!(
            r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)", // OSC ... BEL / ST
            r"|\x1b[P^_][^\x1b]*\x1b\\",          // DCS / PM / APC
            r"|\x1b\[[0-?]*[ -/]*[@-~]",          // CSI
            r"|\x1b[()*+][0-9A-Za-z]",            // charset designation
            r"|\x1b[@-Z\\-_=>78]",                // two-byte escapes
        ))
        .expect("ansi pattern must compile")
    })
}

/// Remove terminal escape sequences and control characters.
///
/// Carriage returns inside a line keep only the last written segment, so a
/// progress bar collapses to its final state.
pub fn strip_control_sequences(text: &str) -> String {
    let without_escapes = ansi_regex().replace_all(text, "");
    let normalized = without_escapes.replace("\r\n", "\n");

    let mut lines = Vec::new();
    for line in normalized.split('\n') {
        let line = match line.trim_end_matches('\r').rsplit('\r').find(|s| !s.is_empty()) {
            Some(segment) => segment,
            None => "",
        };
        let mut cleaned = String::with_capacity(line.len());
        for ch in line.chars() {
            match ch {
                '\u{8}' => {
                    cleaned.pop();
                }
                '\t' => cleaned.push(ch),
                c if c.is_control() => {}
                c => cleaned.push(c),
            }
        }
        lines.push(cleaned);
    }
    lines.join("\n")
}

/// Drop the echoed copy of `input` from the start of `output`.
///
/// Each input line is matched against the leading output lines; a line
/// counts as an echo when it equals the input or ends with it after a
/// prompt.
pub fn strip_echo(output: &str, input: &str) -> String {
    let input_lines: Vec<&str> = input
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if input_lines.is_empty() {
        return output.to_string();
    }

    let mut lines: Vec<&str> = output.lines().collect();
    let mut start = 0;
    while start < lines.len() && lines[start].trim().is_empty() {
        start += 1;
    }

    let mut consumed = start;
    for expected in &input_lines {
        match lines.get(consumed) {
            Some(line) if line.trim() == *expected || line.trim_end().ends_with(expected) => {
                consumed += 1;
            }
            _ => break,
        }
    }

    if consumed == start {
        return output.to_string();
    }
    lines.drain(..consumed);
    lines.join("\n")
}

/// Trim trailing whitespace per line, collapse runs of blank lines to one
/// and drop blank lines at both ends.
pub fn collapse_blank_lines(text: &str) -> String {
    let mut result: Vec<&str> = Vec::new();
    let mut previous_blank = false;
    for line in text.lines() {
        let line = line.trim_end();
        let blank = line.is_empty();
        if blank && (previous_blank || result.is_empty()) {
            continue;
        }
        result.push(line);
        previous_blank = blank;
    }
    while result.last().is_some_and(|l| l.is_empty()) {
        result.pop();
    }
    result.join("\n")
}

/// Keep at most `max_chars` characters, preferring the tail of the output.
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let omitted = total - max_chars;
    let tail: String = text.chars().skip(omitted).collect();
    format!("[... {} characters truncated ...]\n{}", omitted, tail)
}

/// Output cleanup applied to everything returned from a session
#[derive(Debug, Clone, Copy)]
pub struct OutputSanitizer {
    max_chars: usize,
}

impl OutputSanitizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Full cleanup pipeline. `input` is stripped when echoed back;
    /// `max_chars` overrides the configured budget for this call only.
    pub fn sanitize(&self, raw: &str, input: Option<&str>, max_chars: Option<usize>) -> String {
        let mut text = strip_control_sequences(raw);
        if let Some(input) = input {
            text = strip_echo(&text, input);
        }
        let text = collapse_blank_lines(&text);
        truncate_output(&text, max_chars.unwrap_or(self.max_chars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strip_control_sequences() {
        assert_eq!(strip_control_sequences("hello world"), "hello world");
        assert_eq!(strip_control_sequences("\x1b[32mgreen\x1b[0m text"), "green text");
        assert_eq!(strip_control_sequences("\x1b]0;My Title\x07hello"), "hello");
        assert_eq!(strip_control_sequences("line1\r\nline2"), "line1\nline2");
        assert_eq!(strip_control_sequences("\x1b[?2004hprompt$ "), "prompt$ ");
        assert_eq!(strip_control_sequences("10%\r50%\r100%\r\n"), "100%\n");
        assert_eq!(strip_control_sequences("abc\u{8}d"), "abd");
    }

    #[test]
    fn test_strip_echo() {
        assert_eq!(strip_echo("echo hi\nhi\n$ ", "echo hi"), "hi\n$ ");
        assert_eq!(strip_echo("$ echo hi\nhi", "echo hi"), "hi");
        assert_eq!(strip_echo("hi\n$ ", "echo hi"), "hi\n$ ");
        assert_eq!(strip_echo("a\nb\nout", "a\nb"), "out");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("\n\na  \n\n\n\nb\n\n"), "a\n\nb");
    }

    #[test]
    fn test_truncate_keeps_tail() {
        assert_eq!(truncate_output("short", 10), "short");
        let truncated = truncate_output("0123456789abcdef", 6);
        assert_eq!(truncated, "[... 10 characters truncated ...]\nabcdef");
    }

    #[test]
    fn test_sanitize_pipeline() {
        let sanitizer = OutputSanitizer::new(1000);
        let raw = "ls\r\n\x1b[01;34msrc\x1b[0m\r\n\r\n\r\nCargo.toml\r\n$ ";
        assert_eq!(sanitizer.sanitize(raw, Some("ls"), None), "src\n\nCargo.toml\n$");
    }
}
