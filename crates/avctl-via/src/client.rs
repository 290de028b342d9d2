//! ViaClient -- the [`Device`] implementation for the VIA appliance.
//!
//! Every call opens a fresh session: connect, discard the welcome line,
//! log in, send one command, read one reply line, disconnect. The VIA has
//! a single global volume, so the block argument of the volume methods is
//! ignored. Routing and mute are not supported.

use async_trait::async_trait;
use tracing::{debug, info};

use avctl_core::device::Device;
use avctl_core::error::Result;
use avctl_core::types::{Credentials, Endpoint, HardwareInfo, ViaUsers};
use avctl_core::units::check_volume;

use crate::codec::{self, ViaCommand};
use crate::session::{SessionConfig, ViaSession};

/// Duration code the alert popup is shown with.
const ALERT_DURATION: &str = "5";

/// A Kramer VIA collaboration appliance.
///
/// Constructed via [`ViaBuilder`](crate::builder::ViaBuilder).
pub struct ViaClient {
    endpoint: Endpoint,
    credentials: Credentials,
    config: SessionConfig,
}

impl ViaClient {
    pub(crate) fn new(endpoint: Endpoint, credentials: Credentials, config: SessionConfig) -> Self {
        ViaClient {
            endpoint,
            credentials,
            config,
        }
    }

    /// Run `cmd` on a fresh authenticated connection and return the reply.
    pub async fn send_command(&self, cmd: &ViaCommand) -> Result<String> {
        let addr = self.endpoint.socket_addr();
        let mut session = ViaSession::open(&addr, &self.credentials, self.config).await?;
        let result = session.command(cmd, &self.credentials.username).await;
        session.close().await;
        result
    }

    /// The current room code.
    pub async fn room_code(&self) -> Result<String> {
        let cmd = ViaCommand::new(codec::ROOM_CODE).param("Get").param("Code");
        let reply = self.send_command(&cmd).await?;
        codec::parse_room_code(&cmd, &reply)
    }

    /// Number of users presenting right now.
    pub async fn presenter_count(&self) -> Result<usize> {
        let cmd = ViaCommand::new(codec::PARTICIPANTS).param("all").param("1");
        let reply = self.send_command(&cmd).await?;
        codec::parse_presenter_count(&cmd, &reply)
    }

    /// Everyone attached to the VIA, grouped by state.
    pub async fn users(&self) -> Result<ViaUsers> {
        let cmd = ViaCommand::new(codec::PARTICIPANTS).param("all").param("4");
        let reply = self.send_command(&cmd).await?;
        codec::parse_users(&cmd, &reply)
    }

    /// Reboot the appliance. The reply is not checked.
    pub async fn reboot(&self) -> Result<()> {
        info!(addr = %self.endpoint.address(), "rebooting VIA");
        self.send_command(&ViaCommand::new(codec::REBOOT)).await?;
        Ok(())
    }

    /// Restart the VIA's admin session, which clears some lock-ups.
    pub async fn reset(&self) -> Result<()> {
        info!(addr = %self.endpoint.address(), "resetting VIA session");
        let cmd = ViaCommand::new(codec::RESET);
        let reply = self.send_command(&cmd).await?;
        codec::check_reset(&cmd, &reply)
    }

    /// Pop up `message` on the VIA display.
    pub async fn alert(&self, message: &str) -> Result<()> {
        debug!(addr = %self.endpoint.address(), message, "sending alert");
        let cmd = ViaCommand::new(codec::ALERT)
            .param(message)
            .param("0")
            .param(ALERT_DURATION);
        let reply = self.send_command(&cmd).await?;
        codec::check_alert(&cmd, &reply)
    }

    /// Whether the VIA answers an authenticated serial-number query.
    pub async fn is_connected(&self) -> bool {
        match self.send_command(&ViaCommand::new(codec::SERIAL_NUMBER)).await {
            Ok(reply) => reply.contains(codec::SERIAL_NUMBER),
            Err(e) => {
                debug!(addr = %self.endpoint.address(), error = %e, "VIA not reachable");
                false
            }
        }
    }

    async fn query_field(&self, command: &str, field: &'static str) -> Result<String> {
        let address = self.endpoint.address();
        let reply = self
            .send_command(&ViaCommand::new(command))
            .await
            .map_err(|e| e.in_field(field, address))?;
        Ok(reply)
    }
}

#[async_trait]
impl Device for ViaClient {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn get_volume(&self, _block: &str) -> Result<i32> {
        let cmd = ViaCommand::new(codec::VOLUME).param("Get");
        let reply = self.send_command(&cmd).await?;
        codec::parse_volume(&cmd, &reply)
    }

    async fn set_volume(&self, _block: &str, level: i32) -> Result<()> {
        let level = check_volume(level)?;
        debug!(addr = %self.endpoint.address(), level, "setting volume");
        let cmd = ViaCommand::new(codec::VOLUME)
            .param("Set")
            .param(level.to_string());
        self.send_command(&cmd).await?;
        Ok(())
    }

    async fn get_hardware_info(&self) -> Result<HardwareInfo> {
        debug!(addr = %self.endpoint.address(), "querying hardware info");

        let serial = self.query_field(codec::SERIAL_NUMBER, "serial number").await?;
        let version = self.query_field(codec::VERSION, "firmware version").await?;
        let mac = self.query_field(codec::MAC_ADDRESS, "MAC address").await?;
        let ip_info = self.query_field(codec::IP_INFO, "IP information").await?;

        let (hostname, mut network) = codec::parse_ip_info(&ip_info);
        network.mac_address = codec::payload(&mac).to_string();

        Ok(HardwareInfo {
            hostname,
            serial_number: codec::payload(&serial).to_string(),
            firmware_version: codec::payload(&version).to_string(),
            network,
            ..HardwareInfo::default()
        })
    }

    /// Active when at least one user is presenting.
    async fn get_active_signal(&self) -> Result<bool> {
        Ok(self.presenter_count().await? > 0)
    }
}
