//! Safe line codec.
//!
//! Encodes an ordered sequence of strings onto a single line with comma
//! separators, double-quote enclosure and backslash escapes. Every write is
//! read back and compared against its input before it is accepted.
//!
//! ## Encoding rules
//!
//! 1. A value containing `\n` is rejected.
//! 2. A value containing a backslash has `\`, `"`, `'` and NUL backslash-escaped.
//! 3. A value containing `,`, `"`, `\`, space, tab or `\r` is enclosed in
//!    quotes; inside quotes a backslash protects the following character and
//!    any other `"` is doubled.
//!
//! Decoding reverses the steps; the unescape pass only runs on values that
//! contain a backslash after unquoting.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::io::{BufRead, Read, Seek, SeekFrom, Write};

const SEPARATOR: char = ',';
const ENCLOSURE: char = '"';
const ESCAPE: char = '\\';
const EOL: char = '\n';

/// Encodes `values` as one newline-terminated line, verifying in memory
/// that it decodes back to the same values.
///
/// # Errors
///
/// Returns an error if `values` is empty, a value contains a newline, or
/// the encoded line does not decode back to the input.
pub fn encode_line<S: AsRef<str>>(values: &[S]) -> CodecResult<String> {
    let line = encode_unchecked(values)?;
    verify(values, &decode_str(&line))?;
    Ok(line)
}

/// Encodes typed values, accepting only [`Value::Text`].
///
/// # Errors
///
/// Returns [`CodecError::InvalidValueType`] for any non-text value, plus the
/// errors of [`encode_line`].
pub fn encode_values(values: &[Value]) -> CodecResult<String> {
    let texts = values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            value.as_str().ok_or(CodecError::InvalidValueType {
                index,
                found: value.kind(),
            })
        })
        .collect::<CodecResult<Vec<&str>>>()?;
    encode_line(&texts)
}

/// Writes `values` as one line at the current position of `out`, then
/// seeks back, re-reads the written bytes and compares them against
/// `values`. On success the cursor is left after the line.
///
/// Returns the number of bytes written, including the terminator.
///
/// # Errors
///
/// Returns an error if encoding fails, an I/O error occurs, or the bytes
/// read back do not decode to `values`.
pub fn write_line<F, S>(out: &mut F, values: &[S]) -> CodecResult<u64>
where
    F: Read + Write + Seek,
    S: AsRef<str>,
{
    let line = encode_unchecked(values)?;
    let start = out.stream_position()?;
    out.write_all(line.as_bytes())?;
    out.flush()?;
    let end = out.stream_position()?;

    out.seek(SeekFrom::Start(start))?;
    let mut written = vec![0u8; line.len()];
    out.read_exact(&mut written)?;
    let read_back = String::from_utf8_lossy(&written);
    verify(values, &decode_str(&read_back))?;

    out.seek(SeekFrom::Start(end))?;
    Ok(end - start)
}

/// Reads one line from `input` and decodes it.
///
/// Returns `None` at end of input.
///
/// # Errors
///
/// Returns an error on I/O failure or invalid UTF-8.
pub fn read_line<R: BufRead>(input: &mut R) -> CodecResult<Option<Vec<String>>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(decode_str(&line)))
}

/// Decodes a single line (with or without its terminator) into values.
///
/// A blank line decodes to one empty string, never to an empty sequence.
#[must_use]
pub fn decode_str(line: &str) -> Vec<String> {
    let line = line.strip_suffix(EOL).unwrap_or(line);
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        let mut field = String::new();
        if chars.peek() == Some(&ENCLOSURE) {
            chars.next();
            while let Some(c) = chars.next() {
                if c == ESCAPE {
                    field.push(c);
                    if let Some(next) = chars.next() {
                        field.push(next);
                    }
                } else if c == ENCLOSURE {
                    if chars.peek() == Some(&ENCLOSURE) {
                        chars.next();
                        field.push(ENCLOSURE);
                    } else {
                        break;
                    }
                } else {
                    field.push(c);
                }
            }
            // tolerate stray characters between the closing quote and the separator
            while let Some(&c) = chars.peek() {
                if c == SEPARATOR {
                    break;
                }
                field.push(c);
                chars.next();
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == SEPARATOR {
                    break;
                }
                field.push(c);
                chars.next();
            }
        }

        if field.contains(ESCAPE) {
            field = strip_slashes(&field);
        }
        fields.push(field);

        if chars.next().is_none() {
            break;
        }
    }
    fields
}

fn encode_unchecked<S: AsRef<str>>(values: &[S]) -> CodecResult<String> {
    if values.is_empty() {
        return Err(CodecError::EmptyInput {
            operation: "line encoding",
        });
    }
    let mut line = String::new();
    for (index, value) in values.iter().enumerate() {
        let value = value.as_ref();
        if value.contains(EOL) {
            return Err(CodecError::ContainsEol {
                index,
                value: value.to_string(),
            });
        }
        if index > 0 {
            line.push(SEPARATOR);
        }
        if value.contains(ESCAPE) {
            push_field(&mut line, &add_slashes(value));
        } else {
            push_field(&mut line, value);
        }
    }
    line.push(EOL);
    Ok(line)
}

fn push_field(line: &mut String, field: &str) {
    let needs_enclosure = field
        .chars()
        .any(|c| matches!(c, SEPARATOR | ENCLOSURE | ESCAPE | ' ' | '\t' | '\r'));
    if !needs_enclosure {
        line.push_str(field);
        return;
    }
    line.push(ENCLOSURE);
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        line.push(c);
        if c == ESCAPE {
            if let Some(next) = chars.next() {
                line.push(next);
            }
        } else if c == ENCLOSURE {
            line.push(ENCLOSURE);
        }
    }
    line.push(ENCLOSURE);
}

fn verify<S: AsRef<str>>(original: &[S], read_back: &[String]) -> CodecResult<()> {
    let longest = original.len().max(read_back.len());
    for index in 0..longest {
        let expected: Option<&str> = original.get(index).map(AsRef::as_ref);
        let actual = read_back.get(index).map(String::as_str);
        if expected != actual {
            return Err(CodecError::CsvRoundTrip {
                index,
                original: expected.unwrap_or("<missing>").to_string(),
                read_back: actual.unwrap_or("<missing>").to_string(),
            });
        }
    }
    Ok(())
}

fn add_slashes(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\\' | '"' | '\'' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn strip_slashes(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('\0'),
            Some(next) => out.push(next),
            None => {}
        }
    }
    out
}
