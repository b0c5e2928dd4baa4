//! Batch accumulation, quoting, and lexing.
//!
//! A [`MessageBuffer`] is a growable byte sequence plus one offset. The
//! offset marks the start of the line under construction while a batch
//! is being built, the next line to lex while a received batch is being
//! consumed, and the first unflushed byte while a batch is being
//! written out. Once a read completes, the buffer ends at a newline and
//! holds exactly one batch.

use std::io::{self, Read, Write};

use crate::error::{ReadStatus, WireError, WireResult, WriteStatus};

/// Continuation marker: a line ending in ` ;` before its newline says
/// the batch continues on the next line.
const CONTINUE: u8 = b';';

/// Bytes pulled from the stream per read attempt.
const READ_BLOCK: usize = 200;

/// True for bytes that may appear in a word without quoting.
fn is_unquoted_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'+' | b'_' | b'/' | b'%' | b'.')
}

/// Whether `word` must travel quoted: it is empty, or some byte falls
/// outside the unquoted set.
pub fn word_needs_quoting(word: &str) -> bool {
    word.is_empty() || word.bytes().any(|b| !is_unquoted_byte(b))
}

fn hex_nibble(v: u8) -> u8 {
    match v {
        0..=9 => b'0' + v,
        _ => b'a' + (v - 10),
    }
}

/// Framing buffer for one direction of a connection.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    buf: Vec<u8>,
    /// Line start (building), lex cursor (reading), or flush cursor
    /// (writing).
    offset: usize,
}

impl MessageBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True once the lex cursor has consumed the whole batch.
    pub fn is_at_end(&self) -> bool {
        self.offset == self.buf.len()
    }

    /// The raw buffered bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Start a new line. If a line is already present it is terminated
    /// with a continuation marker first.
    pub fn begin_line(&mut self) {
        if !self.buf.is_empty() {
            self.buf.extend_from_slice(b" ;\n");
        }
        self.offset = self.buf.len();
    }

    /// Append one word, quoting it only when its content requires it.
    pub fn append_word(&mut self, word: &str) {
        self.append(word, word_needs_quoting(word));
    }

    /// Append one word, always quoted. Used for payloads that must
    /// arrive as a single argument regardless of content.
    pub fn append_quoted(&mut self, word: &str) {
        self.append(word, true);
    }

    /// Append a decimal integer word.
    pub fn append_integer(&mut self, value: u32) {
        self.append(&value.to_string(), false);
    }

    fn append(&mut self, word: &str, quote: bool) {
        if word.is_empty() && !quote {
            return;
        }
        if self.buf.len() != self.offset {
            self.buf.push(b' ');
        }
        if !quote {
            self.buf.extend_from_slice(word.as_bytes());
            return;
        }
        self.buf.reserve(word.len() * 3 + 2);
        self.buf.push(b'\'');
        for &b in word.as_bytes() {
            if b >= 0x20 && b != 0x7f && b != b'\\' && b != b'\'' {
                self.buf.push(b);
                continue;
            }
            self.buf.push(b'\\');
            match b {
                b'\t' => self.buf.push(b't'),
                b'\n' => self.buf.push(b'n'),
                b'\\' | b'\'' => self.buf.push(b),
                _ => {
                    self.buf.push(hex_nibble(b >> 4));
                    self.buf.push(hex_nibble(b & 0xf));
                }
            }
        }
        self.buf.push(b'\'');
    }

    /// Terminate the final line with a bare newline and rewind the
    /// cursor so the batch can be flushed.
    pub fn prepare_to_write(&mut self) {
        self.buf.push(b'\n');
        self.offset = 0;
    }

    /// Reset to empty, ready to receive the next batch.
    pub fn prepare_to_read(&mut self) {
        self.buf.clear();
        self.offset = 0;
    }

    /// Hand the buffered bytes over, leaving the buffer empty.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        self.offset = 0;
        std::mem::take(&mut self.buf)
    }

    /// Install a complete batch received out of band (in-process
    /// handoff). The batch must end at a line terminator.
    pub fn load_batch(&mut self, bytes: Vec<u8>) -> WireResult<()> {
        if bytes.last() != Some(&b'\n') {
            return Err(WireError::UnterminatedBatch);
        }
        self.buf = bytes;
        self.offset = 0;
        Ok(())
    }

    /// Perform one nonblocking read. Returns [`ReadStatus::Complete`]
    /// once the buffer ends at a non-continued newline, and
    /// [`ReadStatus::NeedMore`] while the batch is unfinished,
    /// including when the latest line ended in a continuation. Bytes
    /// past a batch terminator in the same read are rejected as
    /// [`WireError::TrailingData`] with the complete batch kept; other
    /// I/O failures clear the buffer.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R) -> WireResult<ReadStatus> {
        let scan_from = self.buf.len();
        let mut chunk = [0u8; READ_BLOCK];
        let count = match reader.read(&mut chunk) {
            Ok(0) => return Ok(ReadStatus::Eof),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadStatus::NeedMore),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(ReadStatus::Interrupted),
            Err(e) => {
                self.prepare_to_read();
                return Err(WireError::Io(e));
            }
        };
        self.buf.extend_from_slice(&chunk[..count]);

        // Scan the newly arrived bytes for line terminators.
        let mut continued = true;
        let mut pos = scan_from;
        while let Some(found) = self.buf[pos..].iter().position(|&b| b == b'\n') {
            let newline = pos + found;
            continued = newline != 0 && self.buf[newline - 1] == CONTINUE;
            pos = newline + 1;
            if pos == self.buf.len() {
                break;
            }
            if !continued {
                // A second batch may not be pipelined past the
                // terminator of the first.
                self.buf.truncate(pos);
                return Err(WireError::TrailingData);
            }
        }

        Ok(if continued {
            ReadStatus::NeedMore
        } else {
            ReadStatus::Complete
        })
    }

    /// Perform one nonblocking write from the flush cursor. A partial
    /// write advances the cursor and reports
    /// [`WriteStatus::NeedMore`]; completion and fatal errors reset the
    /// buffer.
    pub fn drain_to<W: Write>(&mut self, writer: &mut W) -> WireResult<WriteStatus> {
        let limit = self.buf.len() - self.offset;
        match writer.write(&self.buf[self.offset..]) {
            Ok(0) if limit > 0 => {
                self.prepare_to_read();
                Err(WireError::Io(io::ErrorKind::WriteZero.into()))
            }
            Ok(n) => {
                self.offset += n;
                if n == limit {
                    self.prepare_to_read();
                    Ok(WriteStatus::Complete)
                } else {
                    Ok(WriteStatus::NeedMore)
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(WriteStatus::NeedMore),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(WriteStatus::Interrupted),
            Err(e) => {
                self.prepare_to_read();
                Err(WireError::Io(e))
            }
        }
    }

    /// Lex the next line of the received batch into words, with the
    /// continuation marker stripped. Returns `None` when the batch is
    /// exhausted or on an empty line, which ends message processing.
    /// A grammar violation yields [`WireError::MalformedLine`] carrying
    /// the raw line text, and the cursor moves on to the next line.
    pub fn lex(&mut self) -> Option<WireResult<Vec<String>>> {
        if self.is_at_end() {
            return None;
        }
        debug_assert_eq!(self.buf.last(), Some(&b'\n'), "lex needs a complete batch");

        match lex_line(&self.buf, self.offset) {
            Ok((words, next)) => {
                self.offset = next;
                if words.is_empty() {
                    return None;
                }
                Some(Ok(words))
            }
            Err(()) => {
                // Skip to the next line, preserving this one's text for
                // the diagnostic response.
                let newline = self.buf[self.offset..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map(|p| self.offset + p)
                    .unwrap_or(self.buf.len() - 1);
                let mut end = newline;
                if end >= self.offset + 2
                    && self.buf[end - 1] == CONTINUE
                    && self.buf[end - 2] == b' '
                {
                    end -= 2;
                }
                let raw = String::from_utf8_lossy(&self.buf[self.offset..end]).into_owned();
                self.offset = newline + 1;
                Some(Err(WireError::MalformedLine { raw }))
            }
        }
    }

    /// Text of the most recently lexed line, continuation marker
    /// stripped. Used to echo offending requests back in diagnostics.
    pub fn lexed_line(&self) -> String {
        if self.offset == 0 {
            return String::new();
        }
        let mut start = self.offset - 1;
        while start > 0 && self.buf[start - 1] != b'\n' {
            start -= 1;
        }
        let mut end = self.offset - 1;
        if end >= start + 2 && self.buf[end - 1] == CONTINUE && self.buf[end - 2] == b' ' {
            end -= 2;
        }
        String::from_utf8_lossy(&self.buf[start..end]).into_owned()
    }
}

/// Lex one physical line starting at `start`. Returns the words and the
/// cursor position after the line's newline, or `Err(())` on a grammar
/// violation.
fn lex_line(buf: &[u8], start: usize) -> Result<(Vec<String>, usize), ()> {
    let mut words: Vec<String> = Vec::new();
    let mut word: Option<String> = None;
    let mut ix = start;

    loop {
        let c = buf[ix];
        ix += 1;

        match c {
            b' ' | b'\t' => {
                if let Some(w) = word.take() {
                    words.push(w);
                }
            }
            b'\n' => break,
            CONTINUE => {
                // Only valid as a standalone final word.
                if word.is_some() || buf[ix] != b'\n' {
                    return Err(());
                }
                ix += 1;
                break;
            }
            b'\'' => {
                let current = word.get_or_insert_with(String::new);
                ix = lex_quoted(buf, ix, current)?;
            }
            c if c <= b' ' || c >= 0x7f => return Err(()),
            c => {
                word.get_or_insert_with(String::new).push(c as char);
            }
        }
    }

    if let Some(w) = word.take() {
        words.push(w);
    }
    Ok((words, ix))
}

/// Lex the remainder of a quoted word (the opening quote is already
/// consumed). Appends the unescaped content to `out` and returns the
/// cursor position after the closing quote.
fn lex_quoted(buf: &[u8], mut ix: usize, out: &mut String) -> Result<usize, ()> {
    let mut bytes: Vec<u8> = Vec::new();
    loop {
        let c = buf[ix];
        if c == b'\n' || c < b' ' || c == 0x7f {
            // Unterminated quote or a stray control byte.
            return Err(());
        }
        ix += 1;
        if c == b'\'' {
            break;
        }
        if c != b'\\' {
            bytes.push(c);
            continue;
        }
        match buf[ix] {
            b'\\' | b'\'' => {
                bytes.push(buf[ix]);
                ix += 1;
            }
            b'n' => {
                bytes.push(b'\n');
                ix += 1;
            }
            b't' => {
                bytes.push(b'\t');
                ix += 1;
            }
            b'_' => {
                // Legacy space escape, accepted on input only.
                bytes.push(b' ');
                ix += 1;
            }
            _ => {
                // Hex escape: one nibble required, a second optional.
                let mut value: u8 = 0;
                let mut got = 0;
                while got < 2 {
                    let nibble = match buf[ix] {
                        h @ b'0'..=b'9' => h - b'0',
                        h @ b'a'..=b'f' => h - b'a' + 10,
                        _ => {
                            if got == 0 {
                                return Err(());
                            }
                            break;
                        }
                    };
                    ix += 1;
                    value = (value << 4) | nibble;
                    got += 1;
                }
                bytes.push(value);
            }
        }
    }

    let text = String::from_utf8(bytes).map_err(|_| ())?;
    out.push_str(&text);
    Ok(ix)
}
