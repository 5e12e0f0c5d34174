// SPDX-License-Identifier: Apache-2.0

//! Line reader for a single file that is appended to, truncated, replaced
//! or rewritten in place while it is being read.
//!
//! The reader is polled: every [`TailingReader::read_line`] call either
//! returns one complete line or rolls all cursors back to the last committed
//! line boundary. After an attempt that hit end-of-stream, the next attempt
//! first checks whether the file behind the path is still the one we were
//! reading, and starts over from the beginning when it is not.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{Span, debug, info, warn};

use super::encoding::{Decoded, TextEncoding};
use super::error::{Result, TailError};
use super::file_id::{FileId, FileIdentity, PlatformIdentity};
use super::ring_window::RingWindow;

/// Number of bytes kept for the head and tail windows.
pub const WINDOW_SIZE: usize = 32;

/// Parameters needed to continue reading a file after a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub offset: u64,
    pub file_id: FileId,
    pub head: Vec<u8>,
    pub tail: Vec<u8>,
}

pub struct TailingReader {
    path: PathBuf,
    default_encoding: TextEncoding,
    encoding: TextEncoding,
    byte_cursor: u64,
    char_cursor: u64,
    file_id: FileId,
    last_read_at: Option<SystemTime>,
    head: RingWindow<u8>,
    tail: RingWindow<u8>,
    handle: Option<BufReader<File>>,
    check_rotation: bool,
    resume: Option<ResumePoint>,
    closed: bool,
    identity: Arc<dyn FileIdentity>,
    span: Span,
}

/// Bytes and characters consumed by the current attempt, not yet committed.
#[derive(Default)]
struct Attempt {
    pos: u64,
    bytes: Vec<u8>,
    chars: u64,
}

impl TailingReader {
    pub fn new(path: impl Into<PathBuf>, default_encoding: TextEncoding) -> Self {
        let path = path.into();
        let span = tracing::info_span!("tail", path = %path.display());

        Self {
            path,
            default_encoding,
            encoding: default_encoding,
            byte_cursor: 0,
            char_cursor: 0,
            file_id: FileId::UNKNOWN,
            last_read_at: None,
            head: RingWindow::new(WINDOW_SIZE),
            tail: RingWindow::new(WINDOW_SIZE),
            handle: None,
            check_rotation: false,
            resume: None,
            closed: false,
            identity: Arc::new(PlatformIdentity),
            span,
        }
    }

    /// Continue from a previously reported [`ResumePoint`]. The offset is
    /// only trusted once the file identity and the head and tail windows have
    /// been checked against the file; otherwise reading restarts at zero.
    pub fn resume(
        path: impl Into<PathBuf>,
        default_encoding: TextEncoding,
        resume: ResumePoint,
    ) -> Self {
        let mut reader = Self::new(path, default_encoding);
        if resume.offset > 0 {
            reader.resume = Some(resume);
        }
        reader
    }

    pub fn with_identity(mut self, identity: Arc<dyn FileIdentity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current_position(&self) -> u64 {
        self.byte_cursor
    }

    /// Characters committed since the file was opened. After a resume this
    /// counts from the resume offset.
    pub fn current_char_position(&self) -> u64 {
        self.char_cursor
    }

    pub fn current_header(&self) -> Vec<u8> {
        self.head.to_vec()
    }

    pub fn current_tail(&self) -> Vec<u8> {
        self.tail.to_vec()
    }

    pub fn current_encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn resume_point(&self) -> ResumePoint {
        ResumePoint {
            offset: self.byte_cursor,
            file_id: self.file_id,
            head: self.head.to_vec(),
            tail: self.tail.to_vec(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the file handle. Any further read fails with [`TailError::Closed`].
    pub fn close(&mut self) {
        if !self.closed {
            debug!(parent: &self.span, offset = self.byte_cursor, "Closing tailing reader");
        }
        self.handle = None;
        self.closed = true;
    }

    /// Read the next complete line, terminator included.
    ///
    /// Returns `Ok(None)` when the file is missing or ends before a line
    /// terminator; in that case nothing is consumed. A CR LF pair is consumed
    /// as a whole but only the CR is returned.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        if self.closed {
            return Err(TailError::Closed(self.path.clone()));
        }

        if self.handle.is_none() && !self.open()? {
            return Ok(None);
        }

        if std::mem::take(&mut self.check_rotation) {
            let rotated = match self.detect_rotation() {
                Ok(rotated) => rotated,
                Err(e) => {
                    self.check_rotation = true;
                    self.restore_position();
                    return Err(TailError::io(&self.path, e));
                }
            };

            if let Some(reason) = rotated {
                info!(
                    parent: &self.span,
                    reason,
                    offset = self.byte_cursor,
                    "Capture file rotated, reading from the start"
                );
                self.handle = None;
                self.reset_state();
                if !self.open()? {
                    return Ok(None);
                }
            } else if !self.file_id.is_known() {
                self.file_id = self.handle_identity();
            }
        }

        let start_encoding = self.encoding;
        match self.read_line_attempt() {
            Ok(Some((line, attempt))) => {
                self.commit(attempt);
                Ok(Some(line))
            }
            Ok(None) => {
                self.encoding = start_encoding;
                self.rollback()
                    .map_err(|e| TailError::io(&self.path, e))?;
                self.check_rotation = true;
                Ok(None)
            }
            Err(e) => {
                self.encoding = start_encoding;
                self.restore_position();
                Err(TailError::io(&self.path, e))
            }
        }
    }

    /// Open the file, applying a pending resume point. Returns `false` when
    /// the file could not be opened.
    fn open(&mut self) -> Result<bool> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) => {
                warn!(parent: &self.span, error = %e, "Unable to open capture file");
                return Ok(false);
            }
        };
        let mut handle = BufReader::new(file);

        match self.resume.take() {
            Some(resume) => {
                self.byte_cursor = resume.offset;
                self.char_cursor = 0;
                self.file_id = resume.file_id;
                self.head = RingWindow::from_slice(WINDOW_SIZE, &resume.head);
                self.tail = RingWindow::from_slice(WINDOW_SIZE, &resume.tail);
                self.encoding =
                    TextEncoding::sniff(&resume.head).unwrap_or(self.default_encoding);
                self.last_read_at = None;
                self.check_rotation = true;

                handle
                    .seek(SeekFrom::Start(self.byte_cursor))
                    .map_err(|e| TailError::io(&self.path, e))?;
                self.handle = Some(handle);

                info!(
                    parent: &self.span,
                    offset = self.byte_cursor,
                    file_id = %self.file_id,
                    "Opened capture file, verifying resume point"
                );
            }
            None => {
                self.reset_state();
                self.handle = Some(handle);
                self.file_id = self.handle_identity();

                info!(
                    parent: &self.span,
                    file_id = %self.file_id,
                    "Opened capture file"
                );
            }
        }

        Ok(true)
    }

    fn handle_identity(&self) -> FileId {
        self.handle
            .as_ref()
            .and_then(|h| self.identity.of_file(h.get_ref()).ok())
            .unwrap_or(FileId::UNKNOWN)
    }

    fn reset_state(&mut self) {
        self.byte_cursor = 0;
        self.char_cursor = 0;
        self.file_id = FileId::UNKNOWN;
        self.encoding = self.default_encoding;
        self.last_read_at = None;
        self.head.reset();
        self.tail.reset();
    }

    /// Decide whether the file behind the path is no longer the stream we
    /// have been reading.
    fn detect_rotation(&mut self) -> io::Result<Option<&'static str>> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(None);
        };

        let len = handle.get_ref().metadata()?.len();
        if self.byte_cursor > len {
            return Ok(Some("file size decreased"));
        }

        if self.file_id.is_known() {
            if let Ok(current) = self.identity.of_path(&self.path) {
                if current != self.file_id {
                    return Ok(Some("file identity changed"));
                }
            }
        }

        let modified = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        let changed_since_read = match (modified, self.last_read_at) {
            (Some(modified), Some(last_read)) => modified > last_read,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !changed_since_read {
            return Ok(None);
        }

        let cursor = self.byte_cursor;
        let (head, tail) = (&self.head, &self.tail);
        restoring_position(handle, cursor, |handle| {
            // A file shorter than the head reads back short and cannot match
            if !head.matches(&read_range(handle, 0, head.len())?) {
                return Ok(Some("file header changed"));
            }
            if cursor <= WINDOW_SIZE as u64 {
                return Ok(None);
            }
            let tail_matches = match cursor.checked_sub(tail.len() as u64) {
                Some(start) => tail.matches(&read_range(handle, start, tail.len())?),
                None => false,
            };
            Ok((!tail_matches).then_some("file tail changed"))
        })
    }

    fn rollback(&mut self) -> io::Result<()> {
        if let Some(handle) = self.handle.as_mut() {
            handle.seek(SeekFrom::Start(self.byte_cursor))?;
        }
        Ok(())
    }

    /// Put the handle back at the committed cursor after a failed read. If
    /// even that fails the handle is dropped and the next call reopens at
    /// the committed resume point.
    fn restore_position(&mut self) {
        if let Err(seek_err) = self.rollback() {
            debug!(parent: &self.span, error = %seek_err, "Dropping handle after failed rollback");
            self.handle = None;
            self.resume = Some(self.resume_point());
        }
    }

    fn commit(&mut self, attempt: Attempt) {
        for b in attempt.bytes {
            if self.byte_cursor < WINDOW_SIZE as u64 {
                self.head.enqueue(b);
            }
            self.tail.enqueue(b);
            self.byte_cursor += 1;
        }
        debug_assert_eq!(self.byte_cursor, attempt.pos);

        self.char_cursor += attempt.chars;
        self.last_read_at = Some(SystemTime::now());
    }

    fn read_line_attempt(&mut self) -> io::Result<Option<(String, Attempt)>> {
        let mut attempt = Attempt {
            pos: self.byte_cursor,
            ..Default::default()
        };
        let mut line = String::new();

        while let Some(ch) = self.next_char(&mut attempt)? {
            line.push(ch);

            match ch {
                '\n' => return Ok(Some((line, attempt))),
                '\r' => {
                    let mark = (attempt.pos, attempt.bytes.len(), attempt.chars);
                    if self.next_char(&mut attempt)? != Some('\n') {
                        (attempt.pos, attempt.chars) = (mark.0, mark.2);
                        attempt.bytes.truncate(mark.1);
                        if let Some(handle) = self.handle.as_mut() {
                            handle.seek(SeekFrom::Start(attempt.pos))?;
                        }
                    }
                    return Ok(Some((line, attempt)));
                }
                _ => {}
            }
        }

        Ok(None)
    }

    /// Decode the next character, or `None` at end-of-stream.
    fn next_char(&mut self, attempt: &mut Attempt) -> io::Result<Option<char>> {
        let span = &self.span;
        let Some(handle) = self.handle.as_mut() else {
            return Ok(None);
        };

        if attempt.pos == 0 {
            let mut preamble = [0u8; TextEncoding::MAX_PREAMBLE];
            let n = read_up_to(handle, &mut preamble)?;
            match TextEncoding::sniff(&preamble[..n]) {
                Some(encoding) => {
                    let bom = encoding.preamble();
                    attempt.bytes.extend_from_slice(bom);
                    attempt.pos = bom.len() as u64;
                    if encoding != self.encoding {
                        debug!(parent: span, %encoding, "Detected byte order mark");
                    }
                    self.encoding = encoding;
                }
                None => self.encoding = self.default_encoding,
            }
            handle.seek(SeekFrom::Start(attempt.pos))?;
        }

        let mut buf = Vec::with_capacity(self.encoding.max_char_width());
        loop {
            let Some(byte) = read_byte(handle)? else {
                return Ok(None);
            };
            buf.push(byte);

            match self.encoding.decode(&buf) {
                Decoded::Incomplete => continue,
                Decoded::Char(ch) => {
                    attempt.pos += buf.len() as u64;
                    attempt.bytes.extend_from_slice(&buf);
                    attempt.chars += 1;
                    return Ok(Some(ch));
                }
                Decoded::Invalid(n) => {
                    let n = n.clamp(1, buf.len());
                    attempt.pos += n as u64;
                    attempt.bytes.extend_from_slice(&buf[..n]);
                    attempt.chars += 1;
                    if n < buf.len() {
                        handle.seek_relative(-((buf.len() - n) as i64))?;
                    }
                    return Ok(Some(char::REPLACEMENT_CHARACTER));
                }
            }
        }
    }
}

impl std::fmt::Debug for TailingReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailingReader")
            .field("path", &self.path)
            .field("encoding", &self.encoding)
            .field("byte_cursor", &self.byte_cursor)
            .field("char_cursor", &self.char_cursor)
            .field("file_id", &self.file_id)
            .field("open", &self.handle.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

fn read_byte<R: Read>(reader: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Fill as much of `buf` as the stream currently holds.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Run `f` against `reader`, then seek back to `pos` whether `f` succeeded
/// or not.
fn restoring_position<R, T, F>(reader: &mut R, pos: u64, f: F) -> io::Result<T>
where
    R: Seek,
    F: FnOnce(&mut R) -> io::Result<T>,
{
    let result = f(reader);
    let restored = reader.seek(SeekFrom::Start(pos));
    let value = result?;
    restored?;
    Ok(value)
}

fn read_range<R: Read + Seek>(reader: &mut R, start: u64, len: usize) -> io::Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; len];
    let n = read_up_to(reader, &mut buf)?;
    buf.truncate(n);
    Ok(buf)
}
