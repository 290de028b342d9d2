//! avctl-core: Core traits, types, and error definitions for avctl.
//!
//! This crate defines the family-agnostic abstractions that every avctl
//! adapter implements. Room-control services depend on these types without
//! pulling in a specific device driver.
//!
//! # Key types
//!
//! - [`Device`] -- the uniform capability trait for any AV device
//! - [`Transport`] / [`Dialer`] -- byte-level communication channel
//! - [`Port`] and the [`units`] converters -- public vs. device addressing
//! - [`MonitorEvent`] / [`ViaEvent`] -- asynchronous VIA notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod device;
pub mod error;
pub mod events;
pub mod transport;
pub mod types;
pub mod units;

// Re-export key types at crate root for ergonomic `use avctl_core::*`.
pub use device::Device;
pub use error::{Error, Result};
pub use events::{MonitorEvent, SessionState, ViaAction, ViaEvent, ViaEventKind};
pub use transport::{Dialer, Transport};
pub use types::*;
pub use units::{
    AFM20_DB_RANGE, DbRange, Port, check_volume, decibel_to_volume, port_from_device,
    port_to_device, volume_to_decibel,
};
