//! Fluent builders for the Kramer adapters.
//!
//! Each builder separates configuration from construction: callers set the
//! port, pool and timeout options, then call `build()`. Nothing is dialed
//! until the first command, so `build()` cannot fail.
//!
//! # Example
//!
//! ```no_run
//! use avctl_core::{Device, Port};
//! use avctl_kramer::builder::SwitcherBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> avctl_core::Result<()> {
//! let switcher = SwitcherBuilder::new("10.5.34.12")
//!     .read_timeout(Duration::from_secs(2))
//!     .build();
//! switcher.set_input(Port::new(0), Port::new(2)).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use avctl_core::transport::Dialer;
use avctl_core::types::{Endpoint, Family};
use avctl_core::units::Port;
use avctl_text_io::exchange::{DEFAULT_READ_TIMEOUT, ExchangeConfig};
use avctl_transport::pool::{DEFAULT_SETTLE_DELAY, DEFAULT_TTL};
use avctl_transport::tcp::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_TIMEOUT};
use avctl_transport::{PoolConfig, TcpDialer};

use crate::afm20::Afm20;
use crate::connection::KramerConnection;
use crate::switcher::MatrixSwitcher;
use crate::vp558::Vp558;

/// Connection settings shared by every Kramer family.
struct ConnectionOptions {
    address: String,
    port: Option<u16>,
    ttl: Duration,
    settle_delay: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    connect_timeout: Duration,
    dialer: Option<Arc<dyn Dialer>>,
}

impl ConnectionOptions {
    fn new(address: &str) -> Self {
        ConnectionOptions {
            address: address.to_string(),
            port: None,
            ttl: DEFAULT_TTL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            dialer: None,
        }
    }

    fn connect(self, family: Family) -> KramerConnection {
        let mut endpoint = Endpoint::new(self.address, family);
        if let Some(port) = self.port {
            endpoint = endpoint.with_port(port);
        }
        let dialer = self.dialer.unwrap_or_else(|| {
            Arc::new(
                TcpDialer::new(endpoint.socket_addr())
                    .connect_timeout(self.connect_timeout)
                    .write_timeout(self.write_timeout),
            )
        });
        KramerConnection::new(
            endpoint,
            dialer,
            PoolConfig {
                ttl: self.ttl,
                settle_delay: self.settle_delay,
            },
            ExchangeConfig {
                read_timeout: self.read_timeout,
            },
        )
    }
}

/// Setters every Kramer builder shares.
macro_rules! connection_setters {
    () => {
        /// Override the TCP port (default: 5000).
        pub fn port(mut self, port: u16) -> Self {
            self.options.port = Some(port);
            self
        }

        /// How long an idle pooled connection stays open (default: 30s).
        pub fn ttl(mut self, ttl: Duration) -> Self {
            self.options.ttl = ttl;
            self
        }

        /// Pause after dialing before the first command (default: 500ms).
        pub fn settle_delay(mut self, delay: Duration) -> Self {
            self.options.settle_delay = delay;
            self
        }

        /// Deadline for reading a command's reply frames (default: 3s).
        pub fn read_timeout(mut self, timeout: Duration) -> Self {
            self.options.read_timeout = timeout;
            self
        }

        /// Deadline for each socket write (default: 5s).
        pub fn write_timeout(mut self, timeout: Duration) -> Self {
            self.options.write_timeout = timeout;
            self
        }

        /// Deadline for establishing the TCP connection (default: 5s).
        pub fn connect_timeout(mut self, timeout: Duration) -> Self {
            self.options.connect_timeout = timeout;
            self
        }

        /// Open connections through `dialer` instead of TCP.
        ///
        /// This is the entry point for testing: pass a `MockDialer` from
        /// `avctl-test-harness`. The port and TCP timeouts are ignored.
        pub fn dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
            self.options.dialer = Some(dialer);
            self
        }
    };
}

/// Fluent builder for [`MatrixSwitcher`].
pub struct SwitcherBuilder {
    options: ConnectionOptions,
    signal_port: Port,
}

impl SwitcherBuilder {
    pub fn new(address: &str) -> Self {
        SwitcherBuilder {
            options: ConnectionOptions::new(address),
            signal_port: Port::new(0),
        }
    }

    connection_setters!();

    /// The port [`Device::get_active_signal`](avctl_core::Device::get_active_signal)
    /// checks (default: port 0).
    pub fn signal_port(mut self, port: Port) -> Self {
        self.signal_port = port;
        self
    }

    pub fn build(self) -> MatrixSwitcher {
        MatrixSwitcher::new(self.options.connect(Family::MatrixSwitcher), self.signal_port)
    }
}

/// Fluent builder for [`Afm20`].
pub struct Afm20Builder {
    options: ConnectionOptions,
}

impl Afm20Builder {
    pub fn new(address: &str) -> Self {
        Afm20Builder {
            options: ConnectionOptions::new(address),
        }
    }

    connection_setters!();

    pub fn build(self) -> Afm20 {
        Afm20::new(self.options.connect(Family::Afm20))
    }
}

/// Fluent builder for [`Vp558`].
pub struct Vp558Builder {
    options: ConnectionOptions,
}

impl Vp558Builder {
    pub fn new(address: &str) -> Self {
        Vp558Builder {
            options: ConnectionOptions::new(address),
        }
    }

    connection_setters!();

    pub fn build(self) -> Vp558 {
        Vp558::new(self.options.connect(Family::Vp558))
    }
}
