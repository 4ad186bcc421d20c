//! Binary string codec.
//!
//! Scripts see raw bytes as printable text: graphic ASCII characters and space stand
//! for themselves, `~` and every other byte is written `~XX` in hex. Encoding always
//! succeeds and decoding is its exact inverse, so a child's output survives embedded
//! NULs, control characters and invalid UTF-8.

use std::fmt::Write;

const ESCAPE: u8 = b'~';

fn is_literal(byte: u8) -> bool {
    (byte.is_ascii_graphic() || byte == b' ') && byte != ESCAPE
}

/// Appends the binary-string form of `bytes` to `out`.
pub fn encode_into(bytes: &[u8], out: &mut String) {
    out.reserve(bytes.len());
    for &byte in bytes {
        if is_literal(byte) {
            out.push(char::from(byte));
        } else {
            // writing to a String cannot fail
            let _ = write!(out, "~{byte:02X}");
        }
    }
}

#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    encode_into(bytes, &mut out);
    out
}

/// Decodes a binary string, or `None` if it is malformed.
///
/// Malformed means an unprintable character, or a `~` not followed by two hex digits
/// (either case).
#[must_use]
pub fn decode(text: &str) -> Option<Vec<u8>> {
    let mut bytes = text.bytes();
    let mut out = Vec::with_capacity(text.len());
    while let Some(byte) = bytes.next() {
        if byte == ESCAPE {
            let hi = hex_value(bytes.next()?)?;
            let lo = hex_value(bytes.next()?)?;
            out.push((hi << 4) | lo);
        } else if is_literal(byte) {
            out.push(byte);
        } else {
            return None;
        }
    }
    Some(out)
}

fn hex_value(digit: u8) -> Option<u8> {
    char::from(digit)
        .to_digit(16)
        .and_then(|value| u8::try_from(value).ok())
}
