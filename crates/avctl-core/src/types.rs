//! Shared data types for avctl.
//!
//! These types are used across all device families and form the public
//! vocabulary of the library. The serialized field names match the JSON
//! documents existing room-control services already exchange.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default TCP port for Kramer Protocol 3000 devices.
pub const KRAMER_PORT: u16 = 5000;

/// Default TCP port for the VIA appliance's XML API.
pub const VIA_PORT: u16 = 9982;

/// Hardware protocol family of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Family {
    /// Kramer matrix video switcher (`#VID`).
    MatrixSwitcher,
    /// Kramer AFM-20 DSP (`#X-AUD-LVL`, `#X-MUTE`, decibel volume).
    Afm20,
    /// Kramer VP-558 scaler/DSP (`#AUD-LVL`, `#MUTE`, `#ROUTE`).
    Vp558,
    /// Kramer VIA collaboration appliance (XML over TCP).
    Via,
}

impl Family {
    /// The TCP port this family listens on by default.
    pub fn default_port(self) -> u16 {
        match self {
            Family::Via => VIA_PORT,
            _ => KRAMER_PORT,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Family::MatrixSwitcher => "matrix-switcher",
            Family::Afm20 => "afm20",
            Family::Vp558 => "vp558",
            Family::Via => "via",
        };
        f.write_str(s)
    }
}

/// Username/password pair for the VIA appliance.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where a device lives and how to talk to it.
///
/// Immutable once built; each adapter owns its endpoint for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    address: String,
    family: Family,
    port: u16,
    credentials: Option<Credentials>,
}

impl Endpoint {
    /// Create an endpoint on the family's default port.
    pub fn new(address: impl Into<String>, family: Family) -> Self {
        Endpoint {
            address: address.into(),
            family,
            port: family.default_port(),
            credentials: None,
        }
    }

    /// Override the TCP port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Attach VIA credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// `host:port` string suitable for dialing.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Network settings reported by a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub ip_address: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub mac_address: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub gateway: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub dns: Vec<String>,
}

/// Inventory information assembled from a device's query commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareInfo {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub hostname: String,
    #[serde(rename = "model_name", skip_serializing_if = "String::is_empty", default)]
    pub model: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub serial_number: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub build_date: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub firmware_version: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub protocol_version: String,
    #[serde(rename = "network_information", default)]
    pub network: NetworkInfo,
}

/// Whether a device currently sees an active source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSignal {
    pub active: bool,
}

/// Presence state of a single VIA participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserState {
    Inactive,
    Active,
    Waiting,
}

impl UserState {
    /// Parse the numeric state code the VIA appends to each nickname.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(UserState::Inactive),
            "1" => Some(UserState::Active),
            "2" => Some(UserState::Waiting),
            _ => None,
        }
    }
}

/// Nicknames of the users attached to a VIA, grouped by state.
///
/// Rebuilt in full on every poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViaUsers {
    #[serde(rename = "inactive_users")]
    pub inactive: Vec<String>,
    #[serde(rename = "active_users")]
    pub active: Vec<String>,
    #[serde(rename = "users_waiting")]
    pub waiting: Vec<String>,
}

impl ViaUsers {
    pub fn insert(&mut self, nickname: impl Into<String>, state: UserState) {
        let list = match state {
            UserState::Inactive => &mut self.inactive,
            UserState::Active => &mut self.active,
            UserState::Waiting => &mut self.waiting,
        };
        list.push(nickname.into());
    }

    pub fn len(&self) -> usize {
        self.inactive.len() + self.active.len() + self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
