//! VIA command encoding and reply parsing.
//!
//! Commands are single XML records:
//!
//! ```text
//! <P><UN>admin</UN><Pwd></Pwd><Cmd>Vol</Cmd><P1>Get</P1></P>
//! ```
//!
//! `UN`, `Pwd` and `Cmd` are always present; `P1`..`P10` only when set.
//! The password is sent with `Login` and left empty otherwise. Records are
//! written without a terminator.
//!
//! Replies are newline-terminated, pipe-delimited text such as
//! `Vol|Get|42` or `RCode|Get|Code|1234`. Parsers here take a reply that has
//! already had its line ending removed.

use serde::Serialize;

use avctl_core::error::{Error, Result};
use avctl_core::types::{NetworkInfo, UserState, ViaUsers};

/// Maximum number of positional parameters a command carries.
pub const MAX_PARAMS: usize = 10;

pub const LOGIN: &str = "Login";
pub const VOLUME: &str = "Vol";
pub const SERIAL_NUMBER: &str = "GetSerialNo";
pub const VERSION: &str = "GetVersion";
pub const MAC_ADDRESS: &str = "GetMacAdd";
pub const IP_INFO: &str = "IpInfo";
pub const PARTICIPANTS: &str = "PList";
pub const ROOM_CODE: &str = "RCode";
pub const REBOOT: &str = "Reboot";
pub const RESET: &str = "Reset";
pub const ALERT: &str = "IAlert";

/// Username the keep-alive ping is sent under.
pub const PING_USERNAME: &str = "su";

/// Presenter list marker for "nobody is presenting".
const NO_PRESENTERS: &str = "error14";

/// A VIA command and its positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViaCommand {
    command: String,
    params: Vec<String>,
}

impl ViaCommand {
    pub fn new(command: impl Into<String>) -> Self {
        ViaCommand {
            command: command.into(),
            params: Vec::new(),
        }
    }

    /// Append the next positional parameter (`P1`, then `P2`, ...).
    pub fn param(mut self, value: impl Into<String>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.command
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Serialize the record for `username`, with `password` only when given.
    pub fn encode(&self, username: &str, password: Option<&str>) -> Result<String> {
        if self.params.len() > MAX_PARAMS {
            return Err(Error::InvalidParameter(format!(
                "{} takes at most {MAX_PARAMS} parameters, got {}",
                self.command,
                self.params.len()
            )));
        }

        let p = |i: usize| self.params.get(i).map(String::as_str);
        let record = Record {
            username,
            password: password.unwrap_or_default(),
            command: &self.command,
            p1: p(0),
            p2: p(1),
            p3: p(2),
            p4: p(3),
            p5: p(4),
            p6: p(5),
            p7: p(6),
            p8: p(7),
            p9: p(8),
            p10: p(9),
        };

        let mut xml = String::new();
        let mut ser = quick_xml::se::Serializer::new(&mut xml);
        ser.expand_empty_elements(true);
        record
            .serialize(ser)
            .map_err(|e| Error::InvalidParameter(format!("cannot encode {}: {e}", self.command)))?;
        Ok(xml)
    }

    /// The `Login` command. Encode it with the password.
    pub fn login() -> Self {
        ViaCommand::new(LOGIN)
    }

    /// The keep-alive record the monitor sends.
    pub fn ping() -> Self {
        ViaCommand::new(IP_INFO)
    }
}

#[derive(Serialize)]
#[serde(rename = "P")]
struct Record<'a> {
    #[serde(rename = "UN")]
    username: &'a str,
    #[serde(rename = "Pwd")]
    password: &'a str,
    #[serde(rename = "Cmd")]
    command: &'a str,
    #[serde(rename = "P1", skip_serializing_if = "Option::is_none")]
    p1: Option<&'a str>,
    #[serde(rename = "P2", skip_serializing_if = "Option::is_none")]
    p2: Option<&'a str>,
    #[serde(rename = "P3", skip_serializing_if = "Option::is_none")]
    p3: Option<&'a str>,
    #[serde(rename = "P4", skip_serializing_if = "Option::is_none")]
    p4: Option<&'a str>,
    #[serde(rename = "P5", skip_serializing_if = "Option::is_none")]
    p5: Option<&'a str>,
    #[serde(rename = "P6", skip_serializing_if = "Option::is_none")]
    p6: Option<&'a str>,
    #[serde(rename = "P7", skip_serializing_if = "Option::is_none")]
    p7: Option<&'a str>,
    #[serde(rename = "P8", skip_serializing_if = "Option::is_none")]
    p8: Option<&'a str>,
    #[serde(rename = "P9", skip_serializing_if = "Option::is_none")]
    p9: Option<&'a str>,
    #[serde(rename = "P10", skip_serializing_if = "Option::is_none")]
    p10: Option<&'a str>,
}

// ---------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------

/// Split a reply into its pipe-delimited segments.
pub fn segments(reply: &str) -> Vec<&str> {
    reply.trim_end_matches(['\r', '\n']).split('|').collect()
}

/// Split a reply that must have exactly `count` segments.
pub fn expect_segments<'a>(cmd: &ViaCommand, reply: &'a str, count: usize) -> Result<Vec<&'a str>> {
    let parts = segments(reply);
    if parts.len() != count {
        return Err(Error::protocol(cmd.name(), reply));
    }
    Ok(parts)
}

/// The value after the first pipe, or the whole reply when there is none.
///
/// `GetSerialNo|A1B2C3` reads as `A1B2C3`.
pub fn payload(reply: &str) -> &str {
    let parts = segments(reply);
    parts.get(1).copied().unwrap_or(parts[0]).trim()
}

/// Whether a login reply grants the session.
pub fn login_succeeded(reply: &str) -> bool {
    !reply.contains("Error") && reply.contains("Successful")
}

/// The first run of ASCII digits in a volume reply.
///
/// The device answers `Vol|Get|42` or nothing; there is no error form.
pub fn parse_volume(cmd: &ViaCommand, reply: &str) -> Result<i32> {
    let digits: String = reply
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().map_err(|_| Error::protocol(cmd.name(), reply))
}

/// Parse an `IpInfo` reply into the hostname and network settings.
///
/// Items look like `IP:10.0.0.9`; keys are matched by substring (`IP`,
/// `GAT`, `DNS`, `Host`) and unrecognized items are ignored.
pub fn parse_ip_info(reply: &str) -> (String, NetworkInfo) {
    let mut hostname = String::new();
    let mut network = NetworkInfo::default();

    for item in segments(reply) {
        let Some((key, value)) = item.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if key.contains("IP") {
            network.ip_address = value.to_string();
        } else if key.contains("GAT") {
            network.gateway = value.to_string();
        } else if key.contains("DNS") {
            network.dns = vec![value.to_string()];
        } else if key.contains("Host") {
            hostname = value.to_string();
        }
    }

    (hostname, network)
}

/// Count presenters in a `PList|all|1|...` reply.
pub fn parse_presenter_count(cmd: &ViaCommand, reply: &str) -> Result<usize> {
    let parts = expect_segments(cmd, reply, 4)?;
    let list = parts[3];
    if list.to_ascii_lowercase().contains(NO_PRESENTERS) {
        return Ok(0);
    }
    Ok(list.split('$').count())
}

/// Parse a `PList|all|4|nick_state#nick_state...` roster.
///
/// Entries without a state, or with an unknown state code, are skipped.
pub fn parse_users(cmd: &ViaCommand, reply: &str) -> Result<ViaUsers> {
    let parts = segments(reply);
    if parts.len() < 4 {
        return Err(Error::protocol(cmd.name(), reply));
    }

    let mut users = ViaUsers::default();
    for entry in parts[3].split('#').filter(|e| !e.is_empty()) {
        let mut fields = entry.split('_');
        let (Some(nickname), Some(code)) = (fields.next(), fields.next()) else {
            continue;
        };
        if let Some(state) = UserState::from_code(code.trim()) {
            users.insert(nickname, state);
        }
    }
    Ok(users)
}

/// The code in an `RCode|Get|Code|<code>` reply.
pub fn parse_room_code(cmd: &ViaCommand, reply: &str) -> Result<String> {
    let parts = expect_segments(cmd, reply, 4)?;
    Ok(parts[3].trim().to_string())
}

pub fn check_reset(cmd: &ViaCommand, reply: &str) -> Result<()> {
    if reply.contains(RESET) && reply.contains('1') {
        Ok(())
    } else {
        Err(Error::protocol(cmd.name(), reply))
    }
}

/// An alert reply carries `1` in its second segment when it was shown.
pub fn check_alert(cmd: &ViaCommand, reply: &str) -> Result<()> {
    match segments(reply).get(1).map(|s| s.trim()) {
        Some("1") => Ok(()),
        _ => Err(Error::protocol(cmd.name(), reply)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_volume_get() {
        let xml = ViaCommand::new(VOLUME).param("Get").encode("admin", None).unwrap();
        assert_eq!(
            xml,
            "<P><UN>admin</UN><Pwd></Pwd><Cmd>Vol</Cmd><P1>Get</P1></P>"
        );
    }

    #[test]
    fn encode_login_carries_password() {
        let xml = ViaCommand::login().encode("admin", Some("secret")).unwrap();
        assert_eq!(xml, "<P><UN>admin</UN><Pwd>secret</Pwd><Cmd>Login</Cmd></P>");
    }

    #[test]
    fn encode_ping() {
        let xml = ViaCommand::ping().encode(PING_USERNAME, None).unwrap();
        assert_eq!(xml, "<P><UN>su</UN><Pwd></Pwd><Cmd>IpInfo</Cmd></P>");
    }

    #[test]
    fn encode_three_params_in_order() {
        let xml = ViaCommand::new(ALERT)
            .param("Hello")
            .param("0")
            .param("5")
            .encode("admin", None)
            .unwrap();
        assert!(xml.ends_with("<Cmd>IAlert</Cmd><P1>Hello</P1><P2>0</P2><P3>5</P3></P>"));
    }

    #[test]
    fn encode_rejects_eleven_params() {
        let mut cmd = ViaCommand::new("X");
        for i in 0..11 {
            cmd = cmd.param(i.to_string());
        }
        assert!(matches!(
            cmd.encode("admin", None),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn payload_takes_second_piece() {
        assert_eq!(payload("GetSerialNo|A1B2C3\r\n"), "A1B2C3");
        assert_eq!(payload("bare"), "bare");
    }

    #[test]
    fn login_verdict() {
        assert!(login_succeeded("Login|Successful"));
        assert!(!login_succeeded("Login|Error|Successful"));
        assert!(!login_succeeded("Login|Failed"));
    }

    #[test]
    fn volume_first_digit_run() {
        let cmd = ViaCommand::new(VOLUME).param("Get");
        assert_eq!(parse_volume(&cmd, "Vol|Get|42").unwrap(), 42);
        assert!(matches!(
            parse_volume(&cmd, "Vol|Get|"),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn ip_info_items() {
        let (host, net) =
            parse_ip_info("IpInfo|IP:10.0.0.9|GAT:10.0.0.1|DNS:10.0.0.2|Host:via-room1");
        assert_eq!(host, "via-room1");
        assert_eq!(net.ip_address, "10.0.0.9");
        assert_eq!(net.gateway, "10.0.0.1");
        assert_eq!(net.dns, vec!["10.0.0.2".to_string()]);
    }

    #[test]
    fn presenter_count() {
        let cmd = ViaCommand::new(PARTICIPANTS).param("all").param("1");
        assert_eq!(parse_presenter_count(&cmd, "PList|all|1|ERROR14").unwrap(), 0);
        assert_eq!(parse_presenter_count(&cmd, "PList|all|1|ann$bob").unwrap(), 2);
        assert!(parse_presenter_count(&cmd, "PList|all|1").is_err());
    }

    #[test]
    fn users_grouped_by_state() {
        let cmd = ViaCommand::new(PARTICIPANTS).param("all").param("4");
        let users = parse_users(&cmd, "PList|all|4|ann_1#bob_0#cat_2#bad#dan_9#").unwrap();
        assert_eq!(users.active, vec!["ann"]);
        assert_eq!(users.inactive, vec!["bob"]);
        assert_eq!(users.waiting, vec!["cat"]);
        assert_eq!(users.len(), 3);
    }

    #[test]
    fn room_code_needs_four_segments() {
        let cmd = ViaCommand::new(ROOM_CODE).param("Get").param("Code");
        assert_eq!(parse_room_code(&cmd, "RCode|Get|Code|4821 ").unwrap(), "4821");
        assert!(parse_room_code(&cmd, "RCode|Get|4821").is_err());
    }

    #[test]
    fn reset_and_alert_replies() {
        let reset = ViaCommand::new(RESET);
        assert!(check_reset(&reset, "Reset|1").is_ok());
        assert!(check_reset(&reset, "Reset|0").is_err());

        let alert = ViaCommand::new(ALERT);
        assert!(check_alert(&alert, "IAlert|1").is_ok());
        assert!(check_alert(&alert, "IAlert|0").is_err());
        assert!(check_alert(&alert, "IAlert").is_err());
    }
}
