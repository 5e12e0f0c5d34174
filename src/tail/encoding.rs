// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Text encodings that can be recognised from a byte order mark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
}

/// Outcome of decoding the bytes accumulated so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// A complete character was decoded from the whole buffer.
    Char(char),
    /// More bytes are needed.
    Incomplete,
    /// The first `n` bytes of the buffer can never become a valid
    /// character. Bytes past `n` belong to the next character.
    Invalid(usize),
}

impl TextEncoding {
    /// Candidates in sniffing order. UTF-32LE must be tried before UTF-16LE
    /// because its preamble starts with the UTF-16LE one.
    pub const SNIFF_ORDER: [TextEncoding; 5] = [
        TextEncoding::Utf32Le,
        TextEncoding::Utf32Be,
        TextEncoding::Utf8,
        TextEncoding::Utf16Le,
        TextEncoding::Utf16Be,
    ];

    /// Longest preamble of any candidate.
    pub const MAX_PREAMBLE: usize = 4;

    pub fn preamble(&self) -> &'static [u8] {
        match self {
            TextEncoding::Utf8 => &[0xEF, 0xBB, 0xBF],
            TextEncoding::Utf16Le => &[0xFF, 0xFE],
            TextEncoding::Utf16Be => &[0xFE, 0xFF],
            TextEncoding::Utf32Le => &[0xFF, 0xFE, 0x00, 0x00],
            TextEncoding::Utf32Be => &[0x00, 0x00, 0xFE, 0xFF],
        }
    }

    /// Maximum number of bytes a single character can occupy. Every
    /// supported encoding tops out at four.
    pub fn max_char_width(&self) -> usize {
        4
    }

    /// Find the encoding whose preamble starts `bytes`, longest preamble first.
    pub fn sniff(bytes: &[u8]) -> Option<TextEncoding> {
        Self::SNIFF_ORDER
            .into_iter()
            .find(|enc| bytes.starts_with(enc.preamble()))
    }

    /// Try to decode `buf` as exactly one character.
    pub fn decode(&self, buf: &[u8]) -> Decoded {
        if buf.is_empty() {
            return Decoded::Incomplete;
        }
        if buf.len() > self.max_char_width() {
            return Decoded::Invalid(buf.len());
        }

        match self {
            TextEncoding::Utf8 => decode_utf8(buf),
            TextEncoding::Utf16Le => decode_utf16(buf, u16::from_le_bytes),
            TextEncoding::Utf16Be => decode_utf16(buf, u16::from_be_bytes),
            TextEncoding::Utf32Le => decode_utf32(buf, u32::from_le_bytes),
            TextEncoding::Utf32Be => decode_utf32(buf, u32::from_be_bytes),
        }
    }
}

fn decode_utf8(buf: &[u8]) -> Decoded {
    match std::str::from_utf8(buf) {
        Ok(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Decoded::Char(c),
                _ => Decoded::Invalid(buf.len()),
            }
        }
        Err(e) => match (e.valid_up_to(), e.error_len()) {
            // the input ended mid-sequence
            (0, None) => Decoded::Incomplete,
            (0, Some(n)) => Decoded::Invalid(n),
            (n, _) => Decoded::Invalid(n),
        },
    }
}

fn decode_utf16(buf: &[u8], unit: fn([u8; 2]) -> u16) -> Decoded {
    if buf.len() % 2 != 0 {
        return Decoded::Incomplete;
    }

    let units: Vec<u16> = buf.chunks_exact(2).map(|c| unit([c[0], c[1]])).collect();
    match units.as_slice() {
        [hi] if (0xD800..0xDC00).contains(hi) => Decoded::Incomplete,
        [u] => match char::from_u32(*u as u32) {
            Some(c) => Decoded::Char(c),
            None => Decoded::Invalid(2),
        },
        [_, _] => match char::decode_utf16(units.iter().copied()).next() {
            Some(Ok(c)) => Decoded::Char(c),
            _ => Decoded::Invalid(2),
        },
        _ => Decoded::Invalid(buf.len()),
    }
}

fn decode_utf32(buf: &[u8], unit: fn([u8; 4]) -> u32) -> Decoded {
    if buf.len() < 4 {
        return Decoded::Incomplete;
    }

    match char::from_u32(unit([buf[0], buf[1], buf[2], buf[3]])) {
        Some(c) => Decoded::Char(c),
        None => Decoded::Invalid(4),
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
            TextEncoding::Utf32Le => "utf-32le",
            TextEncoding::Utf32Be => "utf-32be",
        };
        f.write_str(name)
    }
}
