//! The frame writer: the only thing that touches the terminal.

use std::io::{self, Write};

use crossterm::cursor::{MoveToColumn, MoveUp};
use crossterm::queue;
use crossterm::terminal::{self, Clear, ClearType};

/// Sink for whole frames.
///
/// A frame is written piecewise with [`write`](FrameWriter::write) and then
/// committed with [`flush`](FrameWriter::flush), which must first move the
/// cursor back over the previously flushed frame so the new one overwrites it.
pub trait FrameWriter: Send {
    /// Current terminal width in columns.
    fn width(&self) -> io::Result<usize>;

    /// Buffer part of the next frame.
    fn write(&mut self, bytes: &[u8]);

    /// Replace the previous frame with the buffered one, which spans
    /// `line_count` lines.
    fn flush(&mut self, line_count: usize) -> io::Result<()>;
}

/// A [`FrameWriter`] drawing in place on an ANSI terminal.
#[derive(Debug)]
pub struct TerminalWriter<W> {
    out: W,
    buf: Vec<u8>,
    last_lines: usize,
}

impl TerminalWriter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            buf: Vec::new(),
            last_lines: 0,
        }
    }

    /// Consume the writer, returning the underlying output.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn clear_previous(&mut self) -> io::Result<()> {
        if self.last_lines == 0 {
            return Ok(());
        }
        let up = u16::try_from(self.last_lines).unwrap_or(u16::MAX);
        queue!(
            self.out,
            MoveUp(up),
            MoveToColumn(0),
            Clear(ClearType::FromCursorDown)
        )
    }
}

impl<W: Write + Send> FrameWriter for TerminalWriter<W> {
    fn width(&self) -> io::Result<usize> {
        let (cols, _rows) = terminal::size()?;
        Ok(cols as usize)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn flush(&mut self, line_count: usize) -> io::Result<()> {
        let result = self
            .clear_previous()
            .and_then(|_| self.out.write_all(&self.buf))
            .and_then(|_| self.out.flush());
        self.buf.clear();
        // On failure the cursor position is unknown; start over.
        self.last_lines = if result.is_ok() { line_count } else { 0 };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_flush_writes_without_moving() {
        let mut writer = TerminalWriter::new(Vec::new());
        writer.write(b"a\n");
        writer.write(b"b\n");
        writer.flush(2).unwrap();
        assert_eq!(writer.into_inner(), b"a\nb\n");
    }

    #[test]
    fn later_flush_moves_up_by_previous_line_count() {
        let mut writer = TerminalWriter::new(Vec::new());
        writer.write(b"a\nb\n");
        writer.flush(2).unwrap();
        writer.write(b"c\n");
        writer.flush(1).unwrap();

        let out = String::from_utf8(writer.into_inner()).unwrap();
        // CSI 2 A = cursor up two lines, CSI J = clear to end of screen
        assert!(out.starts_with("a\nb\n\x1b[2A"));
        assert!(out.contains("\x1b[J"));
        assert!(out.ends_with("c\n"));
    }

    #[test]
    fn buffer_is_cleared_after_flush() {
        let mut writer = TerminalWriter::new(Vec::new());
        writer.write(b"x\n");
        writer.flush(1).unwrap();
        writer.flush(0).unwrap();
        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(out.matches('x').count(), 1);
    }
}
