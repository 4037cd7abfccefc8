//! Line editor and tokenizer for the operator console.
//!
//! Bytes arrive one at a time from a UART or similar. [`Shell::input`]
//! collects them into a line, echoing and handling backspace, and reports
//! [`ShellResult::Ready`] when a line is complete. [`Shell::fields`] then
//! splits the line into whitespace-separated fields; double quotes group
//! words and backslash escapes work inside them.
//!
//! # Examples
//!
//! ```rust
//! use ethmqtt::system::shell::{Shell, ShellResult};
//!
//! let mut shell = Shell::new();
//! shell.set_echo(false);
//! let mut echo = heapless::String::<8>::new();
//! let mut result = ShellResult::Pending;
//! for &byte in b"publish a/b \"hello world\"\r" {
//!     result = shell.input(byte, &mut echo);
//! }
//! assert_eq!(result, ShellResult::Ready);
//! let fields = shell.fields();
//! assert_eq!(&fields[..], &["publish", "a/b", "hello world"]);
//! ```

use core::fmt::Write;

use heapless::Vec;

/// Maximum size of the input buffer for one line.
///
/// Sized for a publish command carrying a full topic and message.
pub const MAX_BUFFER_SIZE: usize = 384;

/// Maximum number of fields in one line.
pub const MAX_ARGS: usize = 16;

/// ASCII control characters
pub const ASCII_BACKSPACE: u8 = 0x08;
/// Line feed.
pub const ASCII_LF: u8 = 0x0A;
/// Carriage return.
pub const ASCII_CR: u8 = 0x0D;
/// Delete, sent by many terminals for backspace.
pub const ASCII_DEL: u8 = 0x7F;
/// Field separator.
pub const ASCII_SPACE: u8 = 0x20;

/// Outcome of feeding one byte to the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellResult {
    /// The line is not complete yet.
    Pending,
    /// A non-empty line is complete; read it with [`Shell::fields`].
    Ready,
    /// The line grew past [`MAX_BUFFER_SIZE`]; the byte was dropped.
    BufferOverflow,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ShellResult {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ShellResult::Pending => defmt::write!(f, "Pending"),
            ShellResult::Ready => defmt::write!(f, "Ready"),
            ShellResult::BufferOverflow => defmt::write!(f, "BufferOverflow"),
        }
    }
}

/// Fields of one line, borrowed from the shell's buffer.
pub type Fields<'a> = Vec<&'a str, MAX_ARGS>;

/// Console line state.
#[derive(Debug, Clone)]
pub struct Shell {
    buffer: [u8; MAX_BUFFER_SIZE],
    buffer_len: usize,
    echo_enabled: bool,
    ready: bool,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    /// Create an empty shell with echo enabled.
    pub const fn new() -> Self {
        Shell {
            buffer: [0; MAX_BUFFER_SIZE],
            buffer_len: 0,
            echo_enabled: true,
            ready: false,
        }
    }

    /// Turn echo of typed characters on or off.
    pub fn set_echo(&mut self, enabled: bool) {
        self.echo_enabled = enabled;
    }

    /// Feed one received byte, echoing through `out`.
    ///
    /// After [`ShellResult::Ready`] the line stays available until the next
    /// byte is fed in.
    pub fn input<W: Write>(&mut self, byte: u8, out: &mut W) -> ShellResult {
        if self.ready {
            self.clear();
        }
        match byte {
            ASCII_CR | ASCII_LF => {
                if self.echo_enabled {
                    let _ = out.write_str("\r\n");
                }
                if self.buffer_len == 0 {
                    return ShellResult::Pending;
                }
                self.ready = true;
                ShellResult::Ready
            }
            ASCII_BACKSPACE | ASCII_DEL => {
                if self.buffer_len > 0 {
                    self.buffer_len -= 1;
                    if self.echo_enabled {
                        let _ = out.write_str("\x08 \x08");
                    }
                }
                ShellResult::Pending
            }
            0x20..0x7F => {
                if self.buffer_len >= MAX_BUFFER_SIZE {
                    return ShellResult::BufferOverflow;
                }
                self.buffer[self.buffer_len] = byte;
                self.buffer_len += 1;
                if self.echo_enabled {
                    let _ = out.write_char(byte as char);
                }
                ShellResult::Pending
            }
            _ => ShellResult::Pending,
        }
    }

    /// Discard the current line.
    pub fn clear(&mut self) {
        self.buffer_len = 0;
        self.ready = false;
    }

    /// The raw text typed so far.
    pub fn line(&self) -> &str {
        // Only printable ASCII is ever stored.
        core::str::from_utf8(&self.buffer[..self.buffer_len]).unwrap_or("")
    }

    /// Split the completed line into fields.
    ///
    /// Escapes inside quotes are resolved in place, so the line is consumed:
    /// call this once per [`ShellResult::Ready`]. Fields past
    /// [`MAX_ARGS`] are dropped.
    pub fn fields(&mut self) -> Fields<'_> {
        let mut spans: Vec<(usize, usize), MAX_ARGS> = Vec::new();
        let len = self.buffer_len;
        let buffer = &mut self.buffer;
        let mut i = 0;

        while i < len && !spans.is_full() {
            while i < len && buffer[i] == ASCII_SPACE {
                i += 1;
            }
            if i >= len {
                break;
            }

            let span = if buffer[i] == b'"' {
                i += 1;
                let start = i;
                let mut write = i;
                while i < len && buffer[i] != b'"' {
                    if buffer[i] == b'\\' && i + 1 < len {
                        i += 1;
                        buffer[write] = match buffer[i] {
                            b'n' => b'\n',
                            b't' => b'\t',
                            b'r' => b'\r',
                            other => other,
                        };
                    } else {
                        buffer[write] = buffer[i];
                    }
                    write += 1;
                    i += 1;
                }
                // Skip the closing quote; an unclosed quote runs to the end.
                i += 1;
                (start, write)
            } else {
                let start = i;
                while i < len && buffer[i] != ASCII_SPACE && buffer[i] != b'"' {
                    i += 1;
                }
                (start, i)
            };
            let _ = spans.push(span);
        }

        self.ready = false;
        self.buffer_len = 0;

        let buffer = &self.buffer;
        spans
            .iter()
            .filter_map(|&(start, end)| core::str::from_utf8(&buffer[start..end]).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::String;

    fn feed(shell: &mut Shell, text: &[u8]) -> ShellResult {
        let mut echo: String<512> = String::new();
        let mut result = ShellResult::Pending;
        for &byte in text {
            result = shell.input(byte, &mut echo);
        }
        result
    }

    #[test]
    fn splits_on_spaces() {
        let mut shell = Shell::new();
        assert_eq!(feed(&mut shell, b"  set  MQTT 192.168.2.1 \r"), ShellResult::Ready);
        assert_eq!(&shell.fields()[..], &["set", "MQTT", "192.168.2.1"]);
    }

    #[test]
    fn quotes_and_escapes() {
        let mut shell = Shell::new();
        feed(&mut shell, b"publish t \"say \\\"hi\\\"\" 1\n");
        assert_eq!(&shell.fields()[..], &["publish", "t", "say \"hi\"", "1"]);
    }

    #[test]
    fn backspace_edits_line() {
        let mut shell = Shell::new();
        let mut echo: String<64> = String::new();
        for &byte in b"pinx" {
            shell.input(byte, &mut echo);
        }
        shell.input(ASCII_DEL, &mut echo);
        shell.input(b'g', &mut echo);
        assert_eq!(shell.line(), "ping");
        assert!(echo.ends_with("\x08 \x08g"));
    }

    #[test]
    fn empty_line_is_not_ready() {
        let mut shell = Shell::new();
        assert_eq!(feed(&mut shell, b"\r\n"), ShellResult::Pending);
    }

    #[test]
    fn overflow_is_reported() {
        let mut shell = Shell::new();
        shell.set_echo(false);
        let long = [b'a'; MAX_BUFFER_SIZE + 1];
        assert_eq!(feed(&mut shell, &long), ShellResult::BufferOverflow);
        assert_eq!(shell.line().len(), MAX_BUFFER_SIZE);
    }

    #[test]
    fn field_count_is_bounded() {
        let mut shell = Shell::new();
        feed(&mut shell, b"a b c d e f g h i j k l m n o p q r s\r");
        assert_eq!(shell.fields().len(), MAX_ARGS);
    }

    #[test]
    fn next_byte_starts_a_new_line() {
        let mut shell = Shell::new();
        feed(&mut shell, b"status\r");
        feed(&mut shell, b"p");
        assert_eq!(shell.line(), "p");
    }
}
