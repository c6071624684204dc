// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io::{self, Write};

/// Line-buffering writer that prefixes every complete line with a label.
///
/// Bytes after the last newline are held back until the next newline
/// arrives or [`PrefixedWriter::finish`] is called, so interleaved output of
/// concurrent subprocesses never splits a line.
pub struct PrefixedWriter<W: Write> {
    label: String,
    pending: Vec<u8>,
    inner: W,
}

impl<W: Write> PrefixedWriter<W> {
    pub fn new(label: impl Into<String>, inner: W) -> Self {
        Self {
            label: label.into(),
            pending: Vec::new(),
            inner,
        }
    }

    fn emit_line(&mut self, line: &[u8]) -> io::Result<()> {
        let mut out = Vec::with_capacity(self.label.len() + line.len() + 2);
        out.extend_from_slice(self.label.as_bytes());
        out.push(b' ');
        out.extend_from_slice(line);
        out.push(b'\n');
        self.inner.write_all(&out)
    }

    /// Emits any buffered partial line and returns the wrapped writer.
    pub fn finish(mut self) -> io::Result<W> {
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            self.emit_line(&pending)?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for PrefixedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.emit_line(&line)?;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_complete_lines() {
        let mut writer = PrefixedWriter::new("[cluster-a]", Vec::new());
        writer.write_all(b"one\ntwo\n").unwrap();
        let out = writer.finish().unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[cluster-a] one\n[cluster-a] two\n");
    }

    #[test]
    fn test_buffers_partial_lines() {
        let mut writer = PrefixedWriter::new("p", Vec::new());
        writer.write_all(b"hel").unwrap();
        writer.write_all(b"lo\nwor").unwrap();
        assert_eq!(writer.inner, b"p hello\n".to_vec());

        writer.write_all(b"ld").unwrap();
        let out = writer.finish().unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "p hello\np world\n");
    }

    #[test]
    fn test_empty_output() {
        let writer = PrefixedWriter::new("p", Vec::new());
        assert!(writer.finish().unwrap().is_empty());
    }
}
