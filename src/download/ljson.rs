//! Incremental line-delimited JSON reading
//!
//! Data files are consumed straight off the HTTP byte stream; the
//! splitter hands back complete lines as chunks arrive and never buffers
//! more than the current partial line. Lines may end in `\n`, `\r`, or
//! `\r\n`, including a `\r\n` split across two chunks.

use crate::error::DownloadError;

#[derive(Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        LineSplitter::default()
    }

    /// Feed one chunk; returns the complete lines it finished. Empty and
    /// whitespace-only lines are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, DownloadError> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0usize;
        let mut i = 0usize;
        while i < self.buffer.len() {
            match self.buffer[i] {
                b'\n' => {
                    push_line(&mut lines, &self.buffer[start..i])?;
                    i += 1;
                    start = i;
                }
                b'\r' => {
                    if i + 1 == self.buffer.len() {
                        // Might be the first half of a \r\n spanning
                        // chunks; wait for the next chunk.
                        break;
                    }
                    push_line(&mut lines, &self.buffer[start..i])?;
                    i += if self.buffer[i + 1] == b'\n' { 2 } else { 1 };
                    start = i;
                }
                _ => i += 1,
            }
        }
        self.buffer.drain(..start);
        Ok(lines)
    }

    /// Flush the trailing line at end of stream, if any.
    pub fn finish(mut self) -> Result<Option<String>, DownloadError> {
        // A lone trailing \r terminates its line.
        if self.buffer.last() == Some(&b'\r') {
            self.buffer.pop();
        }
        let mut lines = Vec::new();
        push_line(&mut lines, &self.buffer)?;
        Ok(lines.pop())
    }
}

fn push_line(lines: &mut Vec<String>, bytes: &[u8]) -> Result<(), DownloadError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DownloadError::FileInvalidJson {
        reason: "line is not valid UTF-8".to_string(),
    })?;
    if !text.trim().is_empty() {
        lines.push(text.to_string());
    }
    Ok(())
}

/// Parse one line as a JSON object.
pub fn parse_line(line: &str) -> Result<serde_json::Map<String, serde_json::Value>, DownloadError> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| DownloadError::FileInvalidJson {
            reason: e.to_string(),
        })?;
    match value {
        serde_json::Value::Object(object) => Ok(object),
        _ => Err(DownloadError::FileInvalidJson {
            reason: "line is not a JSON object".to_string(),
        }),
    }
}
