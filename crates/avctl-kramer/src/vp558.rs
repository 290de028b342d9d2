//! Vp558 -- the [`Device`] implementation for the Kramer VP-558 scaler.
//!
//! Routing goes through `#ROUTE` on layer 1 and audio levels use the
//! device's own 0-100 scale.
//!
//! # Double responses
//!
//! A level or mute set that changes state is answered with two frames; a
//! set to the current value gets one. The setters therefore read the
//! current value first and tell the exchange how many frames to consume,
//! all within one [`KramerSession`] so no other command on this handle can
//! slip in between. A change made by another controller between the read
//! and the write still miscounts; the next exchange discards the stray
//! frame.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use avctl_core::device::Device;
use avctl_core::error::Result;
use avctl_core::types::{Endpoint, HardwareInfo};
use avctl_core::units::{Port, check_volume};

use crate::commands;
use crate::connection::{KramerConnection, KramerSession};
use crate::hardware;

/// A Kramer VP-558 presentation switcher/scaler.
///
/// Constructed via [`Vp558Builder`](crate::builder::Vp558Builder).
pub struct Vp558 {
    conn: KramerConnection,
}

/// Frames a set reply spans, given whether it changes device state.
fn reply_frames(changes_state: bool) -> usize {
    if changes_state { 2 } else { 1 }
}

impl Vp558 {
    pub(crate) fn new(conn: KramerConnection) -> Self {
        Vp558 { conn }
    }

    /// Volume of several blocks. The first failing block aborts the call.
    pub async fn volumes(&self, blocks: &[&str]) -> Result<BTreeMap<String, i32>> {
        let mut levels = BTreeMap::new();
        for block in blocks {
            levels.insert(block.to_string(), self.get_volume(block).await?);
        }
        Ok(levels)
    }

    /// Mute state of several blocks. The first failing block aborts the call.
    pub async fn mutes(&self, blocks: &[&str]) -> Result<BTreeMap<String, bool>> {
        let mut states = BTreeMap::new();
        for block in blocks {
            states.insert(block.to_string(), self.get_mute(block).await?);
        }
        Ok(states)
    }

    pub async fn close(&self) {
        self.conn.close().await;
    }

    async fn read_level(session: &mut KramerSession<'_>, block: &str) -> Result<i32> {
        let cmd = commands::cmd_vp558_get_level(block);
        let reply = session.command(&cmd, 1).await?;
        commands::parse_vp558_level(&cmd, &reply)
    }

    async fn read_mute(session: &mut KramerSession<'_>, block: &str) -> Result<bool> {
        let cmd = commands::cmd_vp558_get_mute(block);
        let reply = session.command(&cmd, 1).await?;
        commands::parse_vp558_mute(&cmd, &reply)
    }
}

#[async_trait]
impl Device for Vp558 {
    fn endpoint(&self) -> &Endpoint {
        self.conn.endpoint()
    }

    async fn get_input(&self, output: Port) -> Result<Port> {
        let cmd = commands::cmd_get_route(output);
        let reply = self.conn.command(&cmd).await?;
        let input = commands::parse_route(&cmd, &reply)?;
        debug!(addr = %self.conn.endpoint().address(), %output, %input, "current route");
        Ok(input)
    }

    async fn set_input(&self, output: Port, input: Port) -> Result<()> {
        debug!(addr = %self.conn.endpoint().address(), %output, %input, "routing");
        let cmd = commands::cmd_set_route(output, input);
        let reply = self.conn.command(&cmd).await?;
        commands::check_set_route(&cmd, &reply)
    }

    async fn get_volume(&self, block: &str) -> Result<i32> {
        let mut session = self.conn.session().await?;
        Self::read_level(&mut session, block).await
    }

    async fn set_volume(&self, block: &str, level: i32) -> Result<()> {
        let level = check_volume(level)?;
        let mut session = self.conn.session().await?;

        let current = Self::read_level(&mut session, block).await?;
        let frames = reply_frames(current != level);
        debug!(
            addr = %self.conn.endpoint().address(),
            block, current, level, frames,
            "setting volume"
        );

        let cmd = commands::cmd_vp558_set_level(block, level);
        session.command(&cmd, frames).await?;
        Ok(())
    }

    async fn get_mute(&self, block: &str) -> Result<bool> {
        let mut session = self.conn.session().await?;
        Self::read_mute(&mut session, block).await
    }

    async fn set_mute(&self, block: &str, muted: bool) -> Result<()> {
        let mut session = self.conn.session().await?;

        let current = Self::read_mute(&mut session, block).await?;
        let frames = reply_frames(current != muted);
        debug!(
            addr = %self.conn.endpoint().address(),
            block, current, muted, frames,
            "setting mute"
        );

        let cmd = commands::cmd_vp558_set_mute(block, muted);
        session.command(&cmd, frames).await?;
        Ok(())
    }

    async fn get_hardware_info(&self) -> Result<HardwareInfo> {
        hardware::query_hardware_info(&self.conn).await
    }
}
