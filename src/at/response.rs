//! Locating status tokens in the raw receive buffer.
//!
//! Responses are never decoded as a whole. A token is found by plain
//! substring search; the few responses we need values from are read as the
//! comma separated fields of the line that follows a known prefix, e.g.
//! `+CSQ: 15,99`.

use core::str::{self, Split};

use crate::error::{Error, Result};

use super::{HTTP_READ_PREFIX, HTTP_REQUEST_PREFIX, SIGNAL_QUALITY_PREFIX};

/// Byte offset of the first occurrence of `needle`
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

pub fn contains(haystack: &[u8], needle: &str) -> bool {
    find(haystack, needle.as_bytes()).is_some()
}

/// Start and end offsets of the text following `prefix` up to the line end.
/// `None` while the prefix or the line end has not arrived yet.
fn locate_line(buf: &[u8], prefix: &str) -> Option<(usize, usize)> {
    let start = find(buf, prefix.as_bytes())? + prefix.len();
    let len = buf[start..]
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')?;
    Some((start, start + len))
}

/// Rest of the first complete line starting with `prefix`, prefix excluded
pub fn line_after<'b>(buf: &'b [u8], prefix: &str) -> Option<&'b [u8]> {
    locate_line(buf, prefix).map(|(start, end)| &buf[start..end])
}

/// Comma separated fields, surrounding whitespace and quotes removed
pub struct Fields<'a> {
    inner: Split<'a, char>,
}

impl<'a> Iterator for Fields<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|f| f.trim().trim_matches('"'))
    }
}

pub fn fields(line: &str) -> Fields<'_> {
    Fields {
        inner: line.split(','),
    }
}

fn parse_error(prefix: &str, reason: &'static str) -> Error {
    Error::Parse {
        prefix: prefix.into(),
        reason,
    }
}

/// Field `index` of the line following `prefix`.
///
/// `Ok(None)` means the line is not complete yet. A complete line without
/// the requested field is a parse error.
pub fn field<'b>(buf: &'b [u8], prefix: &str, index: usize) -> Result<Option<&'b str>> {
    let Some(line) = line_after(buf, prefix) else {
        return Ok(None);
    };
    let line = str::from_utf8(line).map_err(|_| parse_error(prefix, "not valid UTF-8"))?;
    match fields(line).nth(index) {
        Some(value) if !value.is_empty() => Ok(Some(value)),
        Some(_) => Err(parse_error(prefix, "empty field")),
        None => Err(parse_error(prefix, "field index out of range")),
    }
}

fn parse_number<T: str::FromStr>(
    buf: &[u8],
    prefix: &str,
    index: usize,
) -> Result<Option<T>> {
    match field(buf, prefix, index)? {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| parse_error(prefix, "not a number")),
        None => Ok(None),
    }
}

// +CSQ: 15,99
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalQuality {
    pub rssi: u8,
    pub ber: u8,
}

impl SignalQuality {
    pub fn parse(buf: &[u8]) -> Result<Option<Self>> {
        let Some(rssi) = parse_number(buf, SIGNAL_QUALITY_PREFIX, 0)? else {
            return Ok(None);
        };
        let Some(ber) = parse_number(buf, SIGNAL_QUALITY_PREFIX, 1)? else {
            return Ok(None);
        };
        Ok(Some(Self { rssi, ber }))
    }

    /// Received signal strength in dBm, 2 dBm steps between -113 and -51.
    /// `None` while the modem reports the signal as not known.
    pub fn dbm(&self) -> Option<i16> {
        match self.rssi {
            0..=31 => Some(-113 + 2 * self.rssi as i16),
            _ => None,
        }
    }
}

// +SHREQ: "GET",200,387
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStatus {
    pub method: heapless::String<8>,
    pub status: u16,
    pub length: usize,
}

impl HttpStatus {
    pub fn parse(buf: &[u8]) -> Result<Option<Self>> {
        let Some(method) = field(buf, HTTP_REQUEST_PREFIX, 0)? else {
            return Ok(None);
        };
        let method = heapless::String::try_from(method)
            .map_err(|_| parse_error(HTTP_REQUEST_PREFIX, "method too long"))?;
        let Some(status) = parse_number(buf, HTTP_REQUEST_PREFIX, 1)? else {
            return Ok(None);
        };
        let Some(length) = parse_number(buf, HTTP_REQUEST_PREFIX, 2)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            method,
            status,
            length,
        }))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Body bytes following a `+SHREAD: <len>` header line.
///
/// At most `<len>` bytes are returned; fewer if the buffer ends (or was
/// truncated by the ingestor) before the declared length.
pub fn read_payload(buf: &[u8]) -> Result<Option<&[u8]>> {
    let Some(declared) = parse_number::<usize>(buf, HTTP_READ_PREFIX, 0)? else {
        return Ok(None);
    };
    let Some((_, end)) = locate_line(buf, HTTP_READ_PREFIX) else {
        return Ok(None);
    };
    let body = &buf[end..];
    let body = body
        .strip_prefix(b"\r\n")
        .or_else(|| body.strip_prefix(b"\n"))
        .unwrap_or(body);
    if body.len() < declared {
        log::warn!(
            "+SHREAD declared {} bytes, only {} received",
            declared,
            body.len()
        );
    }
    Ok(Some(&body[..declared.min(body.len())]))
}
