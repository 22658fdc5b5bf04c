use lazy_static::lazy_static;
use regex::Regex;

pub const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024;
pub const TRUNCATION_MARKER: &str = "\n[Output truncated]";

lazy_static! {
    // CSI sequences (colours, cursor movement) and OSC sequences (window titles)
    static ref ANSI_ESCAPE: Regex =
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
            .expect("ANSI pattern is valid");
}

pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Combined stdout+stderr of one run, kept in arrival order.
///
/// Bytes are held raw and decoded once at the end, so a UTF-8 sequence split
/// across two frames is not mangled.
#[derive(Debug)]
pub struct OutputBuffer {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
    strip_ansi: bool,
}

impl OutputBuffer {
    pub fn new(limit: usize, strip_ansi: bool) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            truncated: false,
            strip_ansi,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.bytes.extend_from_slice(&chunk[..room]);
            self.truncated = true;
        } else {
            self.bytes.extend_from_slice(chunk);
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn finish(self) -> String {
        let decoded = String::from_utf8_lossy(&self.bytes);
        let mut text = if self.strip_ansi {
            strip_ansi(&decoded)
        } else {
            decoded.into_owned()
        };
        if self.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}
