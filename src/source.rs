//! Buffered character stream with peek and checkpoint/restore.
//!
//! The source decodes its input to UTF-8 once (via `encoding_rs_io`) and
//! hands out `char`s. Invalid sequences that survive decoding surface as
//! U+FFFD so the tokenizer can flag them.

use std::{
    io::{self, Cursor, Read},
    path::{Path, PathBuf},
};

use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;

use crate::{error::Result, io_utils};

const CHUNK_SIZE: usize = 16 * 1024;
/// Characters kept behind a checkpoint before it is given up.
pub const DEFAULT_LOOKAHEAD_LIMIT: usize = 4 * 1024 * 1024;

enum Origin {
    Text(String),
    File {
        path: PathBuf,
        encoding: &'static Encoding,
    },
    Stream,
}

/// Opaque position returned by [`CharSource::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    offset: u64,
}

pub struct CharSource {
    origin: Origin,
    input: Box<dyn Read>,
    encoding: &'static Encoding,
    has_bom: bool,
    raw: Vec<u8>,
    chars: Vec<char>,
    pos: usize,
    /// Absolute offset of `chars[0]`.
    base: u64,
    pinned: Option<u64>,
    exhausted: bool,
    lookahead_limit: usize,
}

impl CharSource {
    /// In-memory text; always resettable.
    pub fn from_text(text: impl Into<String>) -> Self {
        let mut text = text.into();
        let has_bom = text.starts_with('\u{feff}');
        if has_bom {
            text.remove(0);
        }
        let input: Box<dyn Read> = Box::new(Cursor::new(text.clone().into_bytes()));
        Self::build(Origin::Text(text), input, UTF_8, has_bom)
    }

    /// Opens a file, sniffing the code page unless `encoding` is given.
    /// File sources can be reset by reopening. `-` reads stdin.
    pub fn from_path(path: &Path, encoding: Option<&'static Encoding>) -> Result<Self> {
        if io_utils::is_dash(path) {
            return Ok(Self::from_reader(io_utils::open_input(path)?, encoding));
        }
        let (detected, has_bom) = io_utils::sniff_file(path)?;
        let encoding = encoding.unwrap_or(detected);
        let input = decode_reader(io_utils::open_input(path)?, encoding);
        Ok(Self::build(
            Origin::File {
                path: path.to_path_buf(),
                encoding,
            },
            input,
            encoding,
            has_bom,
        ))
    }

    /// Wraps a forward-only byte stream; cannot be reset.
    pub fn from_reader(reader: impl Read + 'static, encoding: Option<&'static Encoding>) -> Self {
        let encoding = encoding.unwrap_or(UTF_8);
        let input = decode_reader(reader, encoding);
        Self::build(Origin::Stream, input, encoding, false)
    }

    fn build(
        origin: Origin,
        input: Box<dyn Read>,
        encoding: &'static Encoding,
        has_bom: bool,
    ) -> Self {
        Self {
            origin,
            input,
            encoding,
            has_bom,
            raw: Vec::new(),
            chars: Vec::new(),
            pos: 0,
            base: 0,
            pinned: None,
            exhausted: false,
            lookahead_limit: DEFAULT_LOOKAHEAD_LIMIT,
        }
    }

    pub fn with_lookahead_limit(mut self, limit: usize) -> Self {
        self.lookahead_limit = limit.max(1);
        self
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn has_byte_order_mark(&self) -> bool {
        self.has_bom
    }

    pub fn is_resettable(&self) -> bool {
        !matches!(self.origin, Origin::Stream)
    }

    /// Rewinds to the very first character.
    pub fn reset(&mut self) -> Result<()> {
        let input: Box<dyn Read> = match &self.origin {
            Origin::Text(text) => Box::new(Cursor::new(text.clone().into_bytes())),
            Origin::File { path, encoding } => {
                decode_reader(io_utils::open_input(path)?, *encoding)
            }
            Origin::Stream => return Err(crate::error::ReaderError::NotResettable),
        };
        self.input = input;
        self.raw.clear();
        self.chars.clear();
        self.pos = 0;
        self.base = 0;
        self.pinned = None;
        self.exhausted = false;
        Ok(())
    }

    pub fn peek(&mut self) -> io::Result<Option<char>> {
        if self.pos >= self.chars.len() && !self.fill()? {
            return Ok(None);
        }
        Ok(Some(self.chars[self.pos]))
    }

    pub fn next_char(&mut self) -> io::Result<Option<char>> {
        let next = self.peek()?;
        if next.is_some() {
            self.pos += 1;
        }
        Ok(next)
    }

    /// True once every character has been consumed.
    pub fn at_end(&mut self) -> io::Result<bool> {
        Ok(self.peek()?.is_none())
    }

    /// Remembers the current position. Only one checkpoint is held at a time;
    /// taking a new one replaces the old.
    pub fn checkpoint(&mut self) -> Checkpoint {
        let offset = self.offset();
        self.pinned = Some(offset);
        Checkpoint { offset }
    }

    /// Returns to `checkpoint`. Fails when the buffered look-ahead grew past
    /// the limit and the characters behind the checkpoint were dropped.
    pub fn restore(&mut self, checkpoint: Checkpoint) -> bool {
        self.pinned = None;
        if checkpoint.offset < self.base {
            return false;
        }
        let relative = (checkpoint.offset - self.base) as usize;
        if relative > self.chars.len() {
            return false;
        }
        self.pos = relative;
        true
    }

    pub fn release(&mut self) {
        self.pinned = None;
    }

    fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    fn fill(&mut self) -> io::Result<bool> {
        self.compact();
        while self.pos >= self.chars.len() {
            if self.exhausted {
                return Ok(false);
            }
            let mut chunk = [0u8; CHUNK_SIZE];
            let read = loop {
                match self.input.read(&mut chunk) {
                    Ok(n) => break n,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(err),
                }
            };
            if read == 0 {
                self.exhausted = true;
                if !self.raw.is_empty() {
                    let tail = String::from_utf8_lossy(&self.raw).into_owned();
                    self.chars.extend(tail.chars());
                    self.raw.clear();
                }
            } else {
                self.raw.extend_from_slice(&chunk[..read]);
                decode_prefix(&mut self.raw, &mut self.chars);
            }
        }
        Ok(true)
    }

    fn compact(&mut self) {
        let keep_from = match self.pinned {
            Some(pinned) if pinned >= self.base => ((pinned - self.base) as usize).min(self.pos),
            _ => self.pos,
        };
        let mut drop = keep_from;
        if self.pos - keep_from > self.lookahead_limit {
            // give up the checkpoint, restore() will report it lost
            drop = self.pos;
        }
        if drop > 0 {
            self.chars.drain(..drop);
            self.base += drop as u64;
            self.pos -= drop;
        }
    }
}

fn decode_reader<R: Read + 'static>(reader: R, encoding: &'static Encoding) -> Box<dyn Read> {
    Box::new(
        DecodeReaderBytesBuilder::new()
            .encoding(Some(encoding))
            .bom_override(true)
            .strip_bom(true)
            .build(reader),
    )
}

/// Moves every complete UTF-8 sequence from `raw` into `chars`, keeping an
/// incomplete trailing sequence for the next chunk.
fn decode_prefix(raw: &mut Vec<u8>, chars: &mut Vec<char>) {
    let mut start = 0usize;
    loop {
        match std::str::from_utf8(&raw[start..]) {
            Ok(valid) => {
                chars.extend(valid.chars());
                raw.clear();
                return;
            }
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                if let Ok(valid) = std::str::from_utf8(&raw[start..start + valid_up_to]) {
                    chars.extend(valid.chars());
                }
                match err.error_len() {
                    Some(len) => {
                        chars.push('\u{FFFD}');
                        start += valid_up_to + len;
                    }
                    None => {
                        raw.drain(..start + valid_up_to);
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(source: &mut CharSource) -> String {
        let mut out = String::new();
        while let Some(ch) = source.next_char().unwrap() {
            out.push(ch);
        }
        out
    }

    #[test]
    fn peek_does_not_consume() {
        let mut source = CharSource::from_text("ab");
        assert_eq!(source.peek().unwrap(), Some('a'));
        assert_eq!(source.peek().unwrap(), Some('a'));
        assert_eq!(source.next_char().unwrap(), Some('a'));
        assert_eq!(source.next_char().unwrap(), Some('b'));
        assert_eq!(source.next_char().unwrap(), None);
        assert!(source.at_end().unwrap());
    }

    #[test]
    fn checkpoint_restore_rewinds() {
        let mut source = CharSource::from_text("abcdef");
        source.next_char().unwrap();
        let checkpoint = source.checkpoint();
        assert_eq!(drain(&mut source), "bcdef");
        assert!(source.restore(checkpoint));
        assert_eq!(drain(&mut source), "bcdef");
    }

    #[test]
    fn checkpoint_is_lost_past_lookahead_limit() {
        let text = "x".repeat(CHUNK_SIZE * 3);
        let mut source = CharSource::from_text(text).with_lookahead_limit(10);
        let checkpoint = source.checkpoint();
        drain(&mut source);
        assert!(!source.restore(checkpoint));
    }

    #[test]
    fn reset_rereads_text_and_strips_bom() {
        let mut source = CharSource::from_text("\u{feff}a,b");
        assert!(source.has_byte_order_mark());
        assert_eq!(drain(&mut source), "a,b");
        source.reset().unwrap();
        assert_eq!(drain(&mut source), "a,b");
    }

    #[test]
    fn streams_are_not_resettable() {
        let mut source = CharSource::from_reader(Cursor::new(b"a".to_vec()), None);
        assert!(!source.is_resettable());
        assert!(source.reset().is_err());
    }

    #[test]
    fn decodes_windows_1252_streams() {
        let bytes = b"caf\xe9".to_vec();
        let mut source =
            CharSource::from_reader(Cursor::new(bytes), Some(encoding_rs::WINDOWS_1252));
        assert_eq!(drain(&mut source), "caf\u{e9}");
    }

    #[test]
    fn decode_prefix_keeps_incomplete_sequences() {
        let mut raw = vec![b'a', 0xC3];
        let mut chars = Vec::new();
        decode_prefix(&mut raw, &mut chars);
        assert_eq!(chars, vec!['a']);
        assert_eq!(raw, vec![0xC3]);
        raw.push(0xA9);
        decode_prefix(&mut raw, &mut chars);
        assert_eq!(chars, vec!['a', '\u{e9}']);
        assert!(raw.is_empty());

        let mut raw = vec![b'a', 0xFF, b'b'];
        let mut chars = Vec::new();
        decode_prefix(&mut raw, &mut chars);
        assert_eq!(chars, vec!['a', '\u{FFFD}', 'b']);
    }
}
