//! Kramer Protocol 3000 ASCII encode/decode.
//!
//! Every Kramer family in this workspace speaks the same line protocol:
//! commands start with `#`, queries add a `?` to the verb, and the device
//! answers with one LF-terminated line such as `~01@VID 3>1 OK\r\n`.
//!
//! The device signals failure by embedding `ERR` in the reply text. There is
//! no separate error channel, so every reply is checked with
//! [`check_error`] before any field is extracted.

use bytes::{BufMut, Bytes, BytesMut};

use avctl_core::error::{Error, Result};

/// The line-feed byte that terminates every reply frame.
pub const TERMINATOR: u8 = b'\n';

/// The token a device embeds in a reply to signal failure.
pub const ERROR_TOKEN: &str = "ERR";

/// Line ending for an outbound command.
///
/// Queries and routing commands end in CRLF; the level and mute setters of
/// both DSP families end in a bare CR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Cr,
    CrLf,
}

impl Ending {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            Ending::Cr => b"\r",
            Ending::CrLf => b"\r\n",
        }
    }
}

/// Encode a query: `#<VERB>? <params>\r\n`, or `#<VERB>?\r\n` without params.
pub fn encode_query(verb: &str, params: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(verb.len() + params.len() + 5);
    buf.put_u8(b'#');
    buf.put_slice(verb.as_bytes());
    buf.put_u8(b'?');
    if !params.is_empty() {
        buf.put_u8(b' ');
        buf.put_slice(params.as_bytes());
    }
    buf.put_slice(Ending::CrLf.as_bytes());
    buf.freeze()
}

/// Encode a set command: `#<VERB> <params>` plus `ending`.
pub fn encode_set(verb: &str, params: &str, ending: Ending) -> Bytes {
    let mut buf = BytesMut::with_capacity(verb.len() + params.len() + 4);
    buf.put_u8(b'#');
    buf.put_slice(verb.as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(params.as_bytes());
    buf.put_slice(ending.as_bytes());
    buf.freeze()
}

/// Result of attempting to decode one reply frame from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete frame was decoded.
    Response {
        /// The frame text with the trailing CR/LF removed.
        text: String,
        /// Number of bytes consumed from the input buffer.
        consumed: usize,
    },

    /// The buffer does not yet contain a terminator. More data is needed.
    Incomplete,
}

/// Decode one LF-terminated frame from the front of `buf`.
///
/// Non-UTF-8 bytes are replaced rather than rejected; the content check is
/// left to the caller.
pub fn decode_response(buf: &[u8]) -> DecodeResult {
    let Some(pos) = buf.iter().position(|&b| b == TERMINATOR) else {
        return DecodeResult::Incomplete;
    };

    let text = String::from_utf8_lossy(&buf[..pos])
        .trim_end_matches(['\r', '\n'])
        .to_string();

    DecodeResult::Response {
        text,
        consumed: pos + 1,
    }
}

/// Fail with [`Error::Protocol`] if `response` carries the error token.
pub fn check_error(command: &[u8], response: &str) -> Result<()> {
    if response.contains(ERROR_TOKEN) {
        return Err(Error::protocol(command, response));
    }
    Ok(())
}

/// Fail with [`Error::Protocol`] unless `response` contains `token`.
pub fn expect_token(command: &[u8], response: &str, token: &str) -> Result<()> {
    if response.contains(token) {
        Ok(())
    } else {
        Err(Error::protocol(command, response))
    }
}

/// Return the trimmed text after the echoed `verb`.
///
/// `~01@MODEL VS-44DT` with verb `MODEL` yields `VS-44DT`. The verb must
/// stand as a whole token, so `MUTE` does not match inside `X-MUTE`. A
/// reply that does not echo the verb is a protocol error.
pub fn strip_verb<'a>(command: &[u8], response: &'a str, verb: &str) -> Result<&'a str> {
    let in_token = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
    response
        .match_indices(verb)
        .find(|&(at, _)| {
            let before = response[..at].chars().next_back();
            let after = response[at + verb.len()..].chars().next();
            !before.is_some_and(in_token) && !after.is_some_and(in_token)
        })
        .map(|(at, _)| response[at + verb.len()..].trim())
        .ok_or_else(|| Error::protocol(command, response))
}

/// Split a payload on `,` and trim each field.
pub fn fields(payload: &str) -> Vec<&str> {
    payload.split(',').map(str::trim).collect()
}

/// Parse a field as an integer, reporting the whole reply on failure.
pub fn parse_int(command: &[u8], response: &str, field: &str) -> Result<i32> {
    field
        .trim()
        .parse()
        .map_err(|_| Error::protocol(command, response))
}
