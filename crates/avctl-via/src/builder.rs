//! Fluent builder for VIA clients and monitors.
//!
//! ```no_run
//! use avctl_core::{Credentials, Device};
//! use avctl_via::ViaBuilder;
//!
//! # async fn example() -> avctl_core::Result<()> {
//! let builder = ViaBuilder::new("10.5.34.40", Credentials::new("su", "supass"));
//! let via = builder.build();
//! println!("volume: {}", via.get_volume("").await?);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use avctl_core::types::{Credentials, Endpoint, Family};

use crate::client::ViaClient;
use crate::monitor::{MonitorConfig, ViaMonitor};
use crate::session::SessionConfig;

/// Builder for [`ViaClient`] and [`ViaMonitor`].
#[derive(Clone)]
pub struct ViaBuilder {
    address: String,
    port: Option<u16>,
    credentials: Credentials,
    config: MonitorConfig,
}

impl ViaBuilder {
    pub fn new(address: impl Into<String>, credentials: Credentials) -> Self {
        ViaBuilder {
            address: address.into(),
            port: None,
            credentials,
            config: MonitorConfig::default(),
        }
    }

    /// Override the TCP port (default: 9982).
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Deadline for each reply line (default: 7s).
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.read_timeout = timeout;
        self
    }

    /// Deadline for each write (default: 5s).
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.write_timeout = timeout;
        self
    }

    /// Deadline for the TCP connect (default: 5s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.connect_timeout = timeout;
        self
    }

    /// Monitor only: delay before reconnecting after a failure (default: 10s).
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.reconnect_interval = interval;
        self
    }

    /// Monitor only: keep-alive period (default: 60s).
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    /// Monitor only: reconnect after this long without a line (default: 300s).
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    fn endpoint(&self) -> Endpoint {
        let mut endpoint = Endpoint::new(self.address.clone(), Family::Via)
            .with_credentials(self.credentials.clone());
        if let Some(port) = self.port {
            endpoint = endpoint.with_port(port);
        }
        endpoint
    }

    fn session_config(&self) -> SessionConfig {
        self.config.session
    }

    /// A client that opens a fresh session per command. Nothing is dialed
    /// until the first call.
    pub fn build(self) -> ViaClient {
        let endpoint = self.endpoint();
        let session = self.session_config();
        ViaClient::new(endpoint, self.credentials, session)
    }

    /// Start a persistent event monitor. Must be called inside a Tokio
    /// runtime.
    pub fn monitor(self) -> ViaMonitor {
        self.monitor_with_cancel(CancellationToken::new())
    }

    /// Start a monitor that stops when `cancel` is cancelled.
    pub fn monitor_with_cancel(self, cancel: CancellationToken) -> ViaMonitor {
        let addr = self.endpoint().socket_addr();
        ViaMonitor::start_with_cancel(addr, self.credentials, self.config, cancel)
    }
}
