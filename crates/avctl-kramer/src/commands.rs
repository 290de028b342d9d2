//! Kramer command builders and reply parsers.
//!
//! This module provides functions to construct Protocol 3000 commands for
//! routing, audio level, mute, signal and inventory queries, and to parse
//! the corresponding replies.
//!
//! All functions are pure -- they produce byte buffers or consume reply
//! strings without performing any I/O. Ports are taken as 0-based [`Port`]s
//! and converted to the device's 1-based numbering here. Replies reaching
//! these parsers have already passed the `ERR` check.
//!
//! # Reply shapes
//!
//! | Command | Example reply |
//! |---|---|
//! | `#VID? 1` | `~01@VID 3>1` |
//! | `#ROUTE? 1,1` | `~01@ROUTE 1,1,3` |
//! | `#X-AUD-LVL? OUT.ANALOG_AUDIO.1.AUDIO.1` | `~01@X-AUD-LVL OUT.ANALOG_AUDIO.1.AUDIO.1,-50.0` |
//! | `#X-MUTE? OUT.ANALOG_AUDIO.1.AUDIO.1` | `~01@X-MUTE OUT.ANALOG_AUDIO.1.AUDIO.1,OFF` |
//! | `#AUD-LVL? 1,1` | `~01@AUD-LVL 1,1,40` |
//! | `#MUTE? 1` | `~01@MUTE 1,0` |
//! | `#SIGNAL? 1` | `~01@SIGNAL 1,1` |

use bytes::Bytes;

use avctl_core::{Error, Port, Result};
use avctl_text_io::protocol::{
    Ending, encode_query, encode_set, expect_token, fields, parse_int, strip_verb,
};

// ---------------------------------------------------------------
// Verbs
// ---------------------------------------------------------------

pub const VID: &str = "VID";
pub const ROUTE: &str = "ROUTE";
pub const X_AUD_LVL: &str = "X-AUD-LVL";
pub const X_MUTE: &str = "X-MUTE";
pub const AUD_LVL: &str = "AUD-LVL";
pub const MUTE: &str = "MUTE";
pub const SIGNAL: &str = "SIGNAL";
pub const LOCK_FP: &str = "LOCK-FP";

pub const BUILD_DATE: &str = "BUILD-DATE";
pub const MODEL: &str = "MODEL";
pub const PROT_VER: &str = "PROT-VER";
pub const VERSION: &str = "VERSION";
pub const SN: &str = "SN";
pub const NET_IP: &str = "NET-IP";
pub const NET_GATE: &str = "NET-GATE";
pub const NET_MAC: &str = "NET-MAC";

/// Prefix the device puts in front of its protocol version.
const PROTOCOL_PREFIX: &str = "3000:";

/// The VP558 addresses its routing and level tables through layer 1.
const VP558_LAYER: &str = "1";

fn afm20_block_path(block: &str) -> String {
    format!("OUT.ANALOG_AUDIO.{block}.AUDIO.1")
}

/// Parse a 1-based device port number into a public [`Port`].
fn parse_device_port(cmd: &[u8], reply: &str, field: &str) -> Result<Port> {
    let n: u32 = field
        .trim()
        .parse()
        .map_err(|_| Error::protocol(cmd, reply))?;
    Port::from_device(n).map_err(|_| Error::protocol(cmd, reply))
}

// ---------------------------------------------------------------
// Matrix switcher routing
// ---------------------------------------------------------------

/// `#VID? <out>` -- which input feeds `output`.
pub fn cmd_get_input(output: Port) -> Bytes {
    encode_query(VID, &output.to_device().to_string())
}

/// `#VID <in>><out>` -- route `input` to `output`.
pub fn cmd_set_input(output: Port, input: Port) -> Bytes {
    encode_set(
        VID,
        &format!("{}>{}", input.to_device(), output.to_device()),
        Ending::CrLf,
    )
}

/// Parse `~01@VID <in>><out>` into the 0-based input.
pub fn parse_input(cmd: &[u8], reply: &str) -> Result<Port> {
    let payload = strip_verb(cmd, reply, VID)?;
    let input = payload.split('>').next().unwrap_or_default();
    parse_device_port(cmd, reply, input)
}

/// A set reply only has to echo the verb.
pub fn check_set_input(cmd: &[u8], reply: &str) -> Result<()> {
    expect_token(cmd, reply, VID)
}

// ---------------------------------------------------------------
// VP558 routing
// ---------------------------------------------------------------

/// `#ROUTE? 1,<out>`
pub fn cmd_get_route(output: Port) -> Bytes {
    encode_query(ROUTE, &format!("{VP558_LAYER},{}", output.to_device()))
}

/// `#ROUTE 1,<out>,<in>`
pub fn cmd_set_route(output: Port, input: Port) -> Bytes {
    encode_set(
        ROUTE,
        &format!("{VP558_LAYER},{},{}", output.to_device(), input.to_device()),
        Ending::CrLf,
    )
}

/// Parse `~01@ROUTE 1,<out>,<in>` into the 0-based input.
pub fn parse_route(cmd: &[u8], reply: &str) -> Result<Port> {
    let payload = strip_verb(cmd, reply, ROUTE)?;
    let parts = fields(payload);
    if parts.len() < 3 {
        return Err(Error::protocol(cmd, reply));
    }
    parse_device_port(cmd, reply, parts[2])
}

pub fn check_set_route(cmd: &[u8], reply: &str) -> Result<()> {
    expect_token(cmd, reply, ROUTE)
}

// ---------------------------------------------------------------
// AFM-20 audio
// ---------------------------------------------------------------

pub fn cmd_afm20_get_level(block: &str) -> Bytes {
    encode_query(X_AUD_LVL, &afm20_block_path(block))
}

/// Level set in decibels. Terminated by a bare CR.
pub fn cmd_afm20_set_level(block: &str, db: i32) -> Bytes {
    encode_set(
        X_AUD_LVL,
        &format!("{}, {db}", afm20_block_path(block)),
        Ending::Cr,
    )
}

/// Parse the decibel value after the comma, dropping any fraction.
///
/// `-50.0` reads as `-50`.
pub fn parse_afm20_level(cmd: &[u8], reply: &str) -> Result<i32> {
    let parts = fields(strip_verb(cmd, reply, X_AUD_LVL)?);
    if parts.len() < 2 {
        return Err(Error::protocol(cmd, reply));
    }
    let whole = parts[1].split('.').next().unwrap_or_default();
    parse_int(cmd, reply, whole)
}

pub fn cmd_afm20_get_mute(block: &str) -> Bytes {
    encode_query(X_MUTE, &afm20_block_path(block))
}

pub fn cmd_afm20_set_mute(block: &str, muted: bool) -> Bytes {
    let state = if muted { "ON" } else { "OFF" };
    encode_set(
        X_MUTE,
        &format!("{}, {state}", afm20_block_path(block)),
        Ending::Cr,
    )
}

/// Anything other than `OFF` after the comma counts as muted.
pub fn parse_afm20_mute(cmd: &[u8], reply: &str) -> Result<bool> {
    let parts = fields(strip_verb(cmd, reply, X_MUTE)?);
    if parts.len() < 2 {
        return Err(Error::protocol(cmd, reply));
    }
    Ok(parts[1] != "OFF")
}

// ---------------------------------------------------------------
// VP558 audio
// ---------------------------------------------------------------

pub fn cmd_vp558_get_level(block: &str) -> Bytes {
    encode_query(AUD_LVL, &format!("{VP558_LAYER},{block}"))
}

/// Level set on the device's native 0-100 scale. Terminated by a bare CR.
pub fn cmd_vp558_set_level(block: &str, level: i32) -> Bytes {
    encode_set(AUD_LVL, &format!("{VP558_LAYER},{block},{level}"), Ending::Cr)
}

/// Parse `~01@AUD-LVL 1,<block>,<level>`; exactly three fields.
pub fn parse_vp558_level(cmd: &[u8], reply: &str) -> Result<i32> {
    let parts = fields(strip_verb(cmd, reply, AUD_LVL)?);
    if parts.len() != 3 {
        return Err(Error::protocol(cmd, reply));
    }
    parse_int(cmd, reply, parts[2])
}

pub fn cmd_vp558_get_mute(block: &str) -> Bytes {
    encode_query(MUTE, block)
}

pub fn cmd_vp558_set_mute(block: &str, muted: bool) -> Bytes {
    let state = if muted { 1 } else { 0 };
    encode_set(MUTE, &format!("{block},{state}"), Ending::Cr)
}

/// Parse `~01@MUTE <block>,<0|1>`; `0` is unmuted.
pub fn parse_vp558_mute(cmd: &[u8], reply: &str) -> Result<bool> {
    let parts = fields(strip_verb(cmd, reply, MUTE)?);
    if parts.len() < 2 {
        return Err(Error::protocol(cmd, reply));
    }
    Ok(parts[1] != "0")
}

// ---------------------------------------------------------------
// Inventory, signal, front panel
// ---------------------------------------------------------------

/// `#<VERB>?` with no parameter.
pub fn cmd_hardware_query(verb: &str) -> Bytes {
    encode_query(verb, "")
}

/// The trimmed text after the echoed verb.
pub fn parse_hardware_field<'a>(cmd: &[u8], reply: &'a str, verb: &str) -> Result<&'a str> {
    strip_verb(cmd, reply, verb)
}

/// Drop the `3000:` prefix from a protocol version reply.
pub fn normalize_protocol_version(raw: &str) -> &str {
    raw.strip_prefix(PROTOCOL_PREFIX).unwrap_or(raw).trim()
}

pub fn cmd_signal(port: Port) -> Bytes {
    encode_query(SIGNAL, &port.to_device().to_string())
}

/// Parse `~01@SIGNAL <port>,<0|1>`; `1` is active.
pub fn parse_signal(cmd: &[u8], reply: &str) -> Result<bool> {
    let payload = strip_verb(cmd, reply, SIGNAL)?;
    let parts = fields(payload);
    if parts.len() < 2 {
        return Err(Error::protocol(cmd, reply));
    }
    Ok(parts[1] == "1")
}

/// `#LOCK-FP 1|0`
pub fn cmd_front_lock(locked: bool) -> Bytes {
    encode_set(LOCK_FP, if locked { "1" } else { "0" }, Ending::CrLf)
}

pub fn check_front_lock(cmd: &[u8], reply: &str) -> Result<()> {
    expect_token(cmd, reply, "OK")
}
