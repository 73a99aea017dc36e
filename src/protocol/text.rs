//! Text codec
//!
//! Fixed-format hexadecimal rendering of a message, used for traffic
//! dumps and for parsing command strings typed by a user.
//!
//! ## Format
//! ```text
//! HHHH R CC L DD DD DD DD DD DD DD DD
//! 0         1         2         3
//! 01234567890123456789012345678901234
//! ```
//! - `HHHH`: hash (correlation tag), 4 hex digits
//! - `R`: response marker, or a space for requests
//! - `CC`: opcode, 2 hex digits
//! - `L`: payload length, 1 hex digit (0..=8)
//! - `DD`: exactly `L` payload bytes, 2 hex digits each
//!
//! Every separator is exactly one space. Hex is written lowercase and
//! accepted in either case.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use super::message::{Message, MAX_PAYLOAD};
use crate::error::ParseError;

/// Length of a message with an empty payload
pub const MIN_TEXT_LEN: usize = 11;

/// Character position of the response marker
const MARKER_POS: usize = 5;

/// Number of characters a message with `length` payload bytes occupies
pub fn text_len(length: usize) -> usize {
    MIN_TEXT_LEN + 3 * length
}

// =============================================================================
// Encoding
// =============================================================================

/// Render a message in the fixed text format
pub fn encode_text(message: &Message) -> String {
    let payload = message.payload();
    let mut out = String::with_capacity(text_len(payload.len()));

    // Writing into a String cannot fail
    let _ = write!(
        out,
        "{:04x}{}{:02x} {:x}",
        message.hash,
        if message.response { " R " } else { "   " },
        message.opcode,
        payload.len()
    );
    for byte in payload {
        let _ = write!(out, " {:02x}", byte);
    }

    out
}

// =============================================================================
// Decoding
// =============================================================================

/// Parse a message from the fixed text format
///
/// Trailing whitespace (such as a line terminator) is ignored; any
/// other deviation from the format is an error.
pub fn decode_text(input: &str) -> Result<Message, ParseError> {
    let text = input.trim_end();
    let bytes = text.as_bytes();

    if bytes.len() < MIN_TEXT_LEN {
        return Err(ParseError::TooShort {
            expected: MIN_TEXT_LEN,
            actual: bytes.len(),
        });
    }

    let mut message = Message::default();

    message.hash = parse_hex(text, 0, 4)? as u16;
    expect_space(bytes, 4)?;
    message.response = match bytes[MARKER_POS] {
        b' ' => false,
        b'R' | b'r' => true,
        _ => return Err(ParseError::InvalidMarker(char_at(text, MARKER_POS))),
    };
    expect_space(bytes, 6)?;
    message.opcode = parse_hex(text, 7, 9)? as u8;
    expect_space(bytes, 9)?;

    let length = parse_hex(text, 10, 11)? as u8;
    if length as usize > MAX_PAYLOAD {
        return Err(ParseError::LengthOutOfRange(length));
    }

    let required = text_len(length as usize);
    if bytes.len() < required {
        return Err(ParseError::TooShort {
            expected: required,
            actual: bytes.len(),
        });
    }

    for i in 0..length as usize {
        let start = MIN_TEXT_LEN + 3 * i;
        expect_space(bytes, start)?;
        message.data[i] = parse_hex(text, start + 1, start + 3)? as u8;
    }

    if bytes.len() > required {
        return Err(ParseError::TrailingInput { position: required });
    }

    message.length = length;
    Ok(message)
}

/// Parse the hex digits in `text[start..end]`
fn parse_hex(text: &str, start: usize, end: usize) -> Result<u32, ParseError> {
    let bytes = text.as_bytes();
    let mut value = 0u32;

    for position in start..end {
        let digit = (bytes[position] as char)
            .to_digit(16)
            .ok_or_else(|| ParseError::InvalidHex {
                position,
                found: char_at(text, position),
            })?;
        value = value * 16 + digit;
    }

    Ok(value)
}

fn expect_space(bytes: &[u8], position: usize) -> Result<(), ParseError> {
    if bytes[position] == b' ' {
        Ok(())
    } else {
        Err(ParseError::MissingSeparator { position })
    }
}

/// The character starting at byte `position`, or U+FFFD inside a
/// multi-byte sequence
fn char_at(text: &str, position: usize) -> char {
    if text.is_char_boundary(position) {
        text[position..].chars().next().unwrap_or(char::REPLACEMENT_CHARACTER)
    } else {
        char::REPLACEMENT_CHARACTER
    }
}

// =============================================================================
// Trait impls
// =============================================================================

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_text(self))
    }
}

impl FromStr for Message {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_text(s)
    }
}
