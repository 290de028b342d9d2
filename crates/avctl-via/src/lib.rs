//! Kramer VIA backend for avctl.
//!
//! The VIA speaks an XML-record-over-TCP protocol on port 9982: every
//! connection is greeted with a welcome line and must log in before any
//! command, and replies are single pipe-delimited lines. This crate
//! provides:
//!
//! - **Codec** ([`codec`]) -- encodes `<P>` command records and parses
//!   the pipe-delimited replies.
//! - **Session** ([`session`]) -- one authenticated TCP connection.
//! - **Client** ([`ViaClient`]) -- one-shot commands implementing
//!   [`Device`](avctl_core::Device) plus the VIA-only extras (room code,
//!   participants, alert, reboot, reset).
//! - **Monitor** ([`ViaMonitor`]) -- a persistent, self-reconnecting
//!   session that publishes [`MonitorEvent`](avctl_core::MonitorEvent)s.
//!
//! # Monitoring events
//!
//! ```no_run
//! use avctl_core::{Credentials, MonitorEvent};
//! use avctl_via::ViaBuilder;
//!
//! # async fn example() {
//! let monitor = ViaBuilder::new("10.5.34.40", Credentials::new("su", "supass")).monitor();
//! let mut events = monitor.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let MonitorEvent::Via(ev) = event {
//!         println!("{} {} {:?}", ev.kind.as_str(), ev.action, ev.user);
//!     }
//! }
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod codec;
pub mod events;
pub mod monitor;
pub mod session;

pub use builder::ViaBuilder;
pub use client::ViaClient;
pub use codec::ViaCommand;
pub use events::classify_line;
pub use monitor::{MonitorConfig, ViaMonitor};
pub use session::{SessionConfig, ViaSession};
