//! Turns raw terminal bytes into key events.
//!
//! Every input reader hands its stream to a [`Decoder`] once the stream is
//! readable. Each call performs a single `read`, so it never blocks on a
//! stream that was just reported ready.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::io::{self, Read};

const READ_CHUNK: usize = 256;

/// Longest unfinished sequence kept for the next read. Anything longer is
/// not a key and gets dropped.
const MAX_PENDING: usize = 32;

/// Errors produced while decoding terminal input.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The input stream reached end of file.
    #[error("input stream closed")]
    Eof,
    /// The underlying read failed.
    #[error("reading input: {0}")]
    Io(#[from] io::Error),
}

/// Stateful key decoder for one input stream.
///
/// A read can end in the middle of a key: half of a multibyte character, or
/// an escape sequence missing its final byte. The decoder keeps that tail and
/// prepends it to the next chunk. A lone `ESC` is reported as
/// [`KeyCode::Esc`] right away, but `ESC [` and `ESC O` at the very end of a
/// chunk wait for the next read.
#[derive(Debug, Default)]
pub struct Decoder {
    pending: Vec<u8>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the next available chunk from `reader` and decode every complete
    /// key in it.
    ///
    /// Sequences the decoder does not recognize (mouse reports, paste
    /// brackets) are skipped, so the result can be empty.
    pub fn decode(&mut self, reader: &mut dyn Read) -> Result<Vec<KeyEvent>, DecodeError> {
        let mut buf = [0u8; READ_CHUNK];
        let n = loop {
            match reader.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::Io(e)),
            }
        };
        if n == 0 {
            return Err(DecodeError::Eof);
        }
        Ok(self.feed(&buf[..n]))
    }

    /// Decode `chunk` after whatever the previous call left unfinished.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<KeyEvent> {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut keys = Vec::new();
        let used = parse_into(&bytes, &mut keys);
        let tail = &bytes[used..];
        if tail.len() <= MAX_PENDING {
            self.pending = tail.to_vec();
        } else {
            tracing::trace!(len = tail.len(), "dropping unterminated sequence");
        }
        keys
    }

    /// Bytes held back from the last chunk.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}

/// Decode all complete keys contained in `bytes`. An unfinished sequence at
/// the end is dropped.
pub fn parse_keys(bytes: &[u8]) -> Vec<KeyEvent> {
    let mut keys = Vec::new();
    parse_into(bytes, &mut keys);
    keys
}

/// Push every complete key onto `keys`, returning how many bytes were used.
fn parse_into(bytes: &[u8], keys: &mut Vec<KeyEvent>) -> usize {
    let mut at = 0;
    while at < bytes.len() {
        match parse_one(&bytes[at..]) {
            Step::Done(key, used) => {
                keys.extend(key);
                at += used.max(1);
            }
            Step::Incomplete => break,
        }
    }
    at
}

enum Step {
    /// A key, or `None` for a skipped sequence, and the bytes it used.
    Done(Option<KeyEvent>, usize),
    /// The slice ends partway through a sequence.
    Incomplete,
}

impl Step {
    fn after(self, prefix: usize) -> Step {
        match self {
            Step::Done(key, used) => Step::Done(key, used + prefix),
            Step::Incomplete => Step::Incomplete,
        }
    }
}

fn key(code: KeyCode, modifiers: KeyModifiers) -> Option<KeyEvent> {
    Some(KeyEvent::new(code, modifiers))
}

fn done(code: KeyCode, modifiers: KeyModifiers, used: usize) -> Step {
    Step::Done(key(code, modifiers), used)
}

fn replacement() -> Step {
    done(KeyCode::Char(char::REPLACEMENT_CHARACTER), KeyModifiers::NONE, 1)
}

/// Parse one key from the front of a non-empty slice.
fn parse_one(bytes: &[u8]) -> Step {
    match bytes[0] {
        0x1b => parse_escape(bytes),
        b'\r' | b'\n' => done(KeyCode::Enter, KeyModifiers::NONE, 1),
        b'\t' => done(KeyCode::Tab, KeyModifiers::NONE, 1),
        0x7f | 0x08 => done(KeyCode::Backspace, KeyModifiers::NONE, 1),
        0x00 => done(KeyCode::Char(' '), KeyModifiers::CONTROL, 1),
        c @ 0x01..=0x1a => done(
            KeyCode::Char((c - 0x01 + b'a') as char),
            KeyModifiers::CONTROL,
            1,
        ),
        c @ 0x1c..=0x1f => done(
            KeyCode::Char((c - 0x1c + b'4') as char),
            KeyModifiers::CONTROL,
            1,
        ),
        _ => parse_char(bytes),
    }
}

fn parse_escape(bytes: &[u8]) -> Step {
    match bytes.get(1) {
        None | Some(0x1b) => done(KeyCode::Esc, KeyModifiers::NONE, 1),
        Some(b'[') => parse_csi(&bytes[2..]).after(2),
        Some(b'O') => match bytes.get(2) {
            Some(&final_byte) => Step::Done(parse_ss3(final_byte), 3),
            None => Step::Incomplete,
        },
        Some(_) => match parse_one(&bytes[1..]) {
            Step::Done(key, used) => Step::Done(
                key.map(|mut k| {
                    k.modifiers |= KeyModifiers::ALT;
                    k
                }),
                used + 1,
            ),
            Step::Incomplete => Step::Incomplete,
        },
    }
}

fn parse_ss3(final_byte: u8) -> Option<KeyEvent> {
    let code = cursor_key(final_byte)?;
    key(code, KeyModifiers::NONE)
}

/// Keys whose CSI/SS3 form is identified by the final byte alone.
fn cursor_key(final_byte: u8) -> Option<KeyCode> {
    Some(match final_byte {
        b'A' => KeyCode::Up,
        b'B' => KeyCode::Down,
        b'C' => KeyCode::Right,
        b'D' => KeyCode::Left,
        b'H' => KeyCode::Home,
        b'F' => KeyCode::End,
        b'P' => KeyCode::F(1),
        b'Q' => KeyCode::F(2),
        b'R' => KeyCode::F(3),
        b'S' => KeyCode::F(4),
        _ => return None,
    })
}

/// Parse the body of a CSI sequence (the bytes after `ESC [`).
fn parse_csi(body: &[u8]) -> Step {
    let Some(end) = body.iter().position(|b| (0x40..=0x7e).contains(b)) else {
        return Step::Incomplete;
    };
    let final_byte = body[end];
    let params: Vec<u16> = std::str::from_utf8(&body[..end])
        .unwrap_or_default()
        .split(';')
        .map(|p| p.parse().unwrap_or(0))
        .collect();
    let modifiers = params.get(1).copied().map_or(KeyModifiers::NONE, xterm_modifiers);

    let code = match final_byte {
        b'Z' => return done(KeyCode::BackTab, KeyModifiers::SHIFT, end + 1),
        b'~' => tilde_key(params.first().copied().unwrap_or(0)),
        other => cursor_key(other),
    };
    Step::Done(code.and_then(|code| key(code, modifiers)), end + 1)
}

fn tilde_key(param: u16) -> Option<KeyCode> {
    Some(match param {
        1 | 7 => KeyCode::Home,
        2 => KeyCode::Insert,
        3 => KeyCode::Delete,
        4 | 8 => KeyCode::End,
        5 => KeyCode::PageUp,
        6 => KeyCode::PageDown,
        n @ 11..=15 => KeyCode::F((n - 10) as u8),
        n @ 17..=21 => KeyCode::F((n - 11) as u8),
        n @ 23..=24 => KeyCode::F((n - 12) as u8),
        _ => return None,
    })
}

/// Decode the xterm modifier parameter (`1 + bitmask`).
fn xterm_modifiers(param: u16) -> KeyModifiers {
    let mask = param.saturating_sub(1);
    let mut modifiers = KeyModifiers::NONE;
    if mask & 1 != 0 {
        modifiers |= KeyModifiers::SHIFT;
    }
    if mask & 2 != 0 {
        modifiers |= KeyModifiers::ALT;
    }
    if mask & 4 != 0 {
        modifiers |= KeyModifiers::CONTROL;
    }
    modifiers
}

fn parse_char(bytes: &[u8]) -> Step {
    let width = match bytes[0] {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => return replacement(),
    };
    let Some(seq) = bytes.get(..width) else {
        // Only continuation bytes so far: the rest may be in the next read.
        if bytes[1..].iter().all(|b| (0x80..=0xbf).contains(b)) {
            return Step::Incomplete;
        }
        return replacement();
    };
    let Some(ch) = std::str::from_utf8(seq).ok().and_then(|s| s.chars().next()) else {
        return replacement();
    };
    let modifiers = if ch.is_uppercase() {
        KeyModifiers::SHIFT
    } else {
        KeyModifiers::NONE
    };
    done(KeyCode::Char(ch), modifiers, width)
}
