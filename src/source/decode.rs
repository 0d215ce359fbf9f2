//! Line splitting for Docker log output
//!
//! The Docker client already separates stdout and stderr chunks. A chunk is
//! not a line though: writes may stop mid-line or carry several lines. Each
//! stream keeps its own partial line so interleaved output never glues an
//! unfinished stdout write onto a stderr line. Lines are decoded lossily and
//! trimmed.

use bollard::container::LogOutput;
use bytes::BytesMut;

use crate::models::LogLine;

/// Which output stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
    /// TTY containers have a single merged stream
    Console,
    Stdin,
}

impl OutputStream {
    const ALL: [OutputStream; 4] = [
        OutputStream::Stdout,
        OutputStream::Stderr,
        OutputStream::Console,
        OutputStream::Stdin,
    ];

    fn index(self) -> usize {
        match self {
            OutputStream::Stdout => 0,
            OutputStream::Stderr => 1,
            OutputStream::Console => 2,
            OutputStream::Stdin => 3,
        }
    }
}

/// Incremental splitter from log output chunks to lines
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: [BytesMut; 4],
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every line it completed
    pub fn feed(&mut self, output: LogOutput) -> Vec<LogLine> {
        let (stream, message) = match output {
            LogOutput::StdOut { message } => (OutputStream::Stdout, message),
            LogOutput::StdErr { message } => (OutputStream::Stderr, message),
            LogOutput::Console { message } => (OutputStream::Console, message),
            LogOutput::StdIn { message } => (OutputStream::Stdin, message),
        };
        self.push(stream, &message)
    }

    /// Feed raw bytes belonging to `stream`
    pub fn push(&mut self, stream: OutputStream, payload: &[u8]) -> Vec<LogLine> {
        let partial = &mut self.partial[stream.index()];
        let mut lines = Vec::new();
        let mut rest = payload;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            if partial.is_empty() {
                lines.push(decode_line(head));
            } else {
                partial.extend_from_slice(head);
                let line = partial.split();
                lines.push(decode_line(&line));
            }
            rest = &tail[1..];
        }
        partial.extend_from_slice(rest);
        lines
    }

    /// Flush lines that never got their newline, stdout first
    pub fn finish(&mut self) -> Vec<LogLine> {
        OutputStream::ALL
            .iter()
            .filter_map(|stream| {
                let partial = &mut self.partial[stream.index()];
                if partial.is_empty() {
                    None
                } else {
                    Some(decode_line(&partial.split()))
                }
            })
            .collect()
    }
}

fn decode_line(raw: &[u8]) -> LogLine {
    LogLine::new(String::from_utf8_lossy(raw).trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn stdout(payload: &'static [u8]) -> LogOutput {
        LogOutput::StdOut {
            message: Bytes::from_static(payload),
        }
    }

    fn stderr(payload: &'static [u8]) -> LogOutput {
        LogOutput::StdErr {
            message: Bytes::from_static(payload),
        }
    }

    fn texts(lines: &[LogLine]) -> Vec<&str> {
        lines.iter().map(LogLine::as_str).collect()
    }

    #[test]
    fn test_lines_are_split_and_trimmed() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.feed(LogOutput::Console {
            message: Bytes::from_static(b"  first\r\nsecond\nthi"),
        });
        assert_eq!(texts(&lines), vec!["first", "second"]);

        let lines = splitter.feed(LogOutput::Console {
            message: Bytes::from_static(b"rd\n"),
        });
        assert_eq!(texts(&lines), vec!["third"]);
        assert!(splitter.finish().is_empty());
    }

    #[test]
    fn test_interleaved_streams_keep_their_own_partial_lines() {
        let mut splitter = LineSplitter::new();
        let mut lines = Vec::new();
        lines.extend(splitter.feed(stdout(b"progress 50%")));
        lines.extend(splitter.feed(stderr(b"warning: disk low\n")));
        lines.extend(splitter.feed(stdout(b" done\n")));

        assert_eq!(texts(&lines), vec!["warning: disk low", "progress 50% done"]);
    }

    #[test]
    fn test_finish_flushes_each_stream() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.feed(stderr(b"err tail")).is_empty());
        assert!(splitter.feed(stdout(b"out tail")).is_empty());

        assert_eq!(texts(&splitter.finish()), vec!["out tail", "err tail"]);
        assert!(splitter.finish().is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.push(OutputStream::Stdout, b"caf\xff\n");
        assert_eq!(texts(&lines), vec!["caf\u{fffd}"]);
    }
}
