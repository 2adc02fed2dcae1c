use vt100::Parser;

/// VT100 screen state for a pty-backed terminal
pub struct ScreenBuffer {
    parser: Parser,
    cols: u16,
    rows: u16,
}

impl ScreenBuffer {
    /// Create a new screen buffer
    pub fn new(cols: u16, rows: u16, scrollback_lines: usize) -> Self {
        Self {
            parser: Parser::new(rows, cols, scrollback_lines),
            cols,
            rows,
        }
    }

    /// Feed raw output bytes to the emulator
    pub fn process(&mut self, data: &[u8]) {
        self.parser.process(data);
    }

    /// Visible viewport as plain text
    pub fn visible_text(&self) -> String {
        let lines: Vec<String> = self.parser.screen().rows(0, self.cols).collect();
        join_trimmed(lines)
    }

    /// Scrollback followed by the viewport as plain text
    pub fn full_text(&mut self) -> String {
        self.parser.set_scrollback(usize::MAX);
        let depth = self.parser.screen().scrollback();

        let mut lines = Vec::with_capacity(depth + self.rows as usize);
        for offset in (1..=depth).rev() {
            self.parser.set_scrollback(offset);
            if let Some(row) = self.parser.screen().rows(0, self.cols).next() {
                lines.push(row);
            }
        }

        self.parser.set_scrollback(0);
        lines.extend(self.parser.screen().rows(0, self.cols));
        join_trimmed(lines)
    }

    /// Get terminal size (cols, rows)
    pub fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    /// Resize the emulated screen, keeping its contents
    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.cols = cols;
        self.rows = rows;
        self.parser.set_size(rows, cols);
    }
}

/// Render bytes in a scratch emulator, so cursor movement and carriage
/// returns resolve to what a viewer would finally see.
pub fn render_bytes(data: &[u8], cols: u16, rows: u16, scrollback_lines: usize) -> String {
    let mut buffer = ScreenBuffer::new(cols, rows, scrollback_lines);
    buffer.process(data);
    buffer.full_text()
}

fn join_trimmed(mut lines: Vec<String>) -> String {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines
        .iter()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carriage_return_resolves_progress() {
        let text = render_bytes(b"progress 10%\rprogress 55%\rprogress 100%\r\ndone\r\n", 40, 5, 100);
        assert_eq!(text, "progress 100%\ndone");
    }

    #[test]
    fn test_full_text_includes_scrollback() {
        let mut buffer = ScreenBuffer::new(20, 3, 100);
        for i in 1..=6 {
            buffer.process(format!("line {}\r\n", i).as_bytes());
        }
        let visible = buffer.visible_text();
        assert!(!visible.contains("line 1"));
        assert!(visible.contains("line 6"));

        let full = buffer.full_text();
        let expected: Vec<String> = (1..=6).map(|i| format!("line {}", i)).collect();
        assert_eq!(full, expected.join("\n"));
    }

    #[test]
    fn test_resize_keeps_size() {
        let mut buffer = ScreenBuffer::new(80, 24, 100);
        buffer.resize(100, 30);
        assert_eq!(buffer.size(), (100, 30));
    }
}
