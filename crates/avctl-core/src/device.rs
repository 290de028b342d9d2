//! The `Device` trait -- uniform capability surface for all hardware families.
//!
//! Room-control services program against `dyn Device` without knowing
//! which wire protocol sits underneath. Each family crate (`avctl-kramer`,
//! `avctl-via`) provides concrete adapters that implement this trait and
//! keep their codec rules private.
//!
//! Every method is a single request/response exchange (or a short fixed
//! sequence of them). Dropping the returned future cancels the call; the
//! adapter's connection handling discards any half-finished exchange.
//! Capability calls never retry on their own.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::{Endpoint, HardwareInfo};
use crate::units::Port;

/// Unified asynchronous interface for controlling one AV device.
///
/// Capabilities a family does not implement keep the default bodies, which
/// return [`Error::Unsupported`] without touching the network.
#[async_trait]
pub trait Device: Send + Sync {
    /// The endpoint this adapter talks to.
    fn endpoint(&self) -> &Endpoint;

    /// Get the input currently routed to `output`.
    async fn get_input(&self, output: Port) -> Result<Port> {
        let _ = output;
        Err(unsupported(self.endpoint(), "input routing"))
    }

    /// Route `input` to `output`.
    async fn set_input(&self, output: Port, input: Port) -> Result<()> {
        let _ = (output, input);
        Err(unsupported(self.endpoint(), "input routing"))
    }

    /// Get the volume of an audio block as a 0–100 percentage.
    async fn get_volume(&self, block: &str) -> Result<i32> {
        let _ = block;
        Err(unsupported(self.endpoint(), "volume"))
    }

    /// Set the volume of an audio block. `level` must be 0–100.
    async fn set_volume(&self, block: &str, level: i32) -> Result<()> {
        let _ = (block, level);
        Err(unsupported(self.endpoint(), "volume"))
    }

    /// Get whether an audio block is muted.
    async fn get_mute(&self, block: &str) -> Result<bool> {
        let _ = block;
        Err(unsupported(self.endpoint(), "mute"))
    }

    /// Mute or unmute an audio block.
    async fn set_mute(&self, block: &str, muted: bool) -> Result<()> {
        let _ = (block, muted);
        Err(unsupported(self.endpoint(), "mute"))
    }

    /// Assemble the device's hardware inventory.
    ///
    /// The first failing sub-query aborts the whole call with
    /// [`Error::HardwareInfo`] naming the field.
    async fn get_hardware_info(&self) -> Result<HardwareInfo>;

    /// Whether the device currently sees an active source.
    async fn get_active_signal(&self) -> Result<bool> {
        Err(unsupported(self.endpoint(), "active signal"))
    }
}

fn unsupported(endpoint: &Endpoint, capability: &str) -> Error {
    Error::Unsupported(format!("{} on {}", capability, endpoint.family()))
}
