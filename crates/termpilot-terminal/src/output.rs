/// Output accumulation shared between reader threads and readers
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::screen_buffer::ScreenBuffer;
use super::MAX_PENDING_OUTPUT_BYTES;

/// Line-capped raw history for pipe mode.
///
/// Bytes are decoded incrementally so a multi-byte character split across
/// two reads is not mangled.
pub struct ScrollbackBuffer {
    lines: VecDeque<String>,
    partial: String,
    undecoded: Vec<u8>,
    max_lines: usize,
}

impl ScrollbackBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            partial: String::new(),
            undecoded: Vec::new(),
            max_lines: max_lines.max(1),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.undecoded.extend_from_slice(data);
        let text = match std::str::from_utf8(&self.undecoded) {
            Ok(text) => {
                let text = text.to_string();
                self.undecoded.clear();
                text
            }
            Err(e) if e.error_len().is_none() => {
                // Incomplete sequence at the end: keep it for the next chunk
                let valid = e.valid_up_to();
                let text = String::from_utf8_lossy(&self.undecoded[..valid]).into_owned();
                self.undecoded.drain(..valid);
                text
            }
            Err(_) => {
                let text = String::from_utf8_lossy(&self.undecoded).into_owned();
                self.undecoded.clear();
                text
            }
        };

        let mut pieces = text.split('\n');
        if let Some(first) = pieces.next() {
            self.partial.push_str(first);
        }
        for piece in pieces {
            let complete = std::mem::replace(&mut self.partial, piece.to_string());
            self.lines.push_back(complete);
            if self.lines.len() > self.max_lines {
                self.lines.pop_front();
            }
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len() + usize::from(!self.partial.is_empty())
    }

    pub fn text(&self) -> String {
        let mut text = self.lines.iter().cloned().collect::<Vec<_>>().join("\n");
        if !self.partial.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&self.partial);
        }
        text
    }
}

/// Everything a terminal has received from its child
pub struct OutputState {
    /// Bytes received since the last write
    pub since_write: Vec<u8>,
    /// Raw history (pipe mode)
    pub history: ScrollbackBuffer,
    /// Emulated screen (pty mode); dropped on dispose
    pub screen: Option<ScreenBuffer>,
    /// Total bytes ever received
    pub total_bytes: u64,
    /// Arrival time of the most recent chunk
    pub last_output_at: Option<Instant>,
}

impl OutputState {
    pub fn new(screen: Option<ScreenBuffer>, scrollback_lines: usize) -> Self {
        Self {
            since_write: Vec::new(),
            history: ScrollbackBuffer::new(scrollback_lines),
            screen,
            total_bytes: 0,
            last_output_at: None,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }

        self.since_write.extend_from_slice(data);
        trim_front(&mut self.since_write, MAX_PENDING_OUTPUT_BYTES);

        match self.screen.as_mut() {
            Some(screen) => screen.process(data),
            None => self.history.push(data),
        }

        self.total_bytes += data.len() as u64;
        self.last_output_at = Some(Instant::now());
    }
}

/// Drop the oldest bytes so at most `max` remain. The cut moves forward to
/// the next line start, or past a split UTF-8 character when there is no
/// newline, so a replay never begins mid-sequence.
fn trim_front(buffer: &mut Vec<u8>, max: usize) {
    if buffer.len() <= max {
        return;
    }
    let excess = buffer.len() - max;
    let rest = &buffer[excess..];
    let cut = match rest.iter().position(|&b| b == b'\n') {
        Some(offset) => excess + offset + 1,
        None => excess + rest.iter().take_while(|&&b| b & 0xC0 == 0x80).count(),
    };
    buffer.drain(..cut);
}

/// Copy everything `reader` yields into `output` on a background thread,
/// until EOF or a read error.
pub fn spawn_pump<R>(label: &'static str, mut reader: R, output: Arc<Mutex<OutputState>>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = vec![0u8; 4096];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    let mut state = output.lock().unwrap_or_else(|e| e.into_inner());
                    state.push(&buffer[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    // EIO is how a pty master reports that the child side closed
                    log::debug!("{} reader stopped: {}", label, e);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrollback_caps_lines() {
        let mut buffer = ScrollbackBuffer::new(3);
        buffer.push(b"a\nb\nc\nd\ne");
        assert_eq!(buffer.text(), "b\nc\nd\ne");
        buffer.push(b"f\n");
        assert_eq!(buffer.text(), "c\nd\nef");
        assert_eq!(buffer.line_count(), 3);
    }

    #[test]
    fn test_scrollback_joins_split_utf8() {
        let mut buffer = ScrollbackBuffer::new(10);
        let bytes = "héllo\n".as_bytes();
        buffer.push(&bytes[..2]);
        buffer.push(&bytes[2..]);
        assert_eq!(buffer.text(), "héllo");
    }

    #[test]
    fn test_trim_front_starts_at_line_boundary() {
        let mut buffer = b"\x1b[31mold line\nnew line\n".to_vec();
        trim_front(&mut buffer, 15);
        assert_eq!(buffer, b"new line\n");

        let mut buffer = b"short".to_vec();
        trim_front(&mut buffer, 15);
        assert_eq!(buffer, b"short");
    }

    #[test]
    fn test_trim_front_skips_split_character() {
        let mut buffer = "aé€z".as_bytes().to_vec();
        // Keeping 4 bytes would start inside the euro sign
        trim_front(&mut buffer, 4);
        assert_eq!(buffer, b"z");
    }

    #[test]
    fn test_state_tracks_since_write() {
        let mut state = OutputState::new(None, 100);
        state.push(b"first\n");
        state.since_write.clear();
        state.push(b"second\n");
        assert_eq!(state.since_write, b"second\n");
        assert_eq!(state.total_bytes, 13);
        assert!(state.last_output_at.is_some());
        assert_eq!(state.history.text(), "first\nsecond");
    }
}
