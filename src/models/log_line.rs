use std::fmt;
use std::sync::Arc;

/// A single decoded, trimmed line of workload output
///
/// `seq` is assigned by the hub when the line is appended; lines coming
/// straight from a source carry 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub seq: u64,
    pub text: Arc<str>,
}

impl LogLine {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self {
            seq: 0,
            text: text.into(),
        }
    }

    pub(crate) fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for LogLine {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for LogLine {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
