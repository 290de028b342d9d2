//! Afm20 -- the [`Device`] implementation for the Kramer AFM-20 DSP.
//!
//! The AFM-20 addresses its analog outputs as
//! `OUT.ANALOG_AUDIO.<block>.AUDIO.1` and takes levels in decibels. The
//! public 0-100 volume is mapped linearly onto [`AFM20_DB_RANGE`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use avctl_core::device::Device;
use avctl_core::error::Result;
use avctl_core::types::{Endpoint, HardwareInfo};
use avctl_core::units::{AFM20_DB_RANGE, check_volume, decibel_to_volume, volume_to_decibel};

use crate::commands;
use crate::connection::KramerConnection;
use crate::hardware;

/// A Kramer AFM-20 audio DSP.
///
/// Constructed via [`Afm20Builder`](crate::builder::Afm20Builder).
pub struct Afm20 {
    conn: KramerConnection,
}

impl Afm20 {
    pub(crate) fn new(conn: KramerConnection) -> Self {
        Afm20 { conn }
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
}

#[async_trait]
impl Device for Afm20 {
    fn endpoint(&self) -> &Endpoint {
        self.conn.endpoint()
    }

    async fn get_volume(&self, block: &str) -> Result<i32> {
        let cmd = commands::cmd_afm20_get_level(block);
        let reply = self.conn.command(&cmd).await?;
        let db = commands::parse_afm20_level(&cmd, &reply)?;
        let level = decibel_to_volume(db, AFM20_DB_RANGE);
        debug!(addr = %self.conn.endpoint().address(), block, db, level, "volume");
        Ok(level)
    }

    async fn set_volume(&self, block: &str, level: i32) -> Result<()> {
        let level = check_volume(level)?;
        let db = volume_to_decibel(level, AFM20_DB_RANGE);
        debug!(addr = %self.conn.endpoint().address(), block, level, db, "setting volume");
        let cmd = commands::cmd_afm20_set_level(block, db);
        self.conn.command(&cmd).await?;
        Ok(())
    }

    async fn get_mute(&self, block: &str) -> Result<bool> {
        let cmd = commands::cmd_afm20_get_mute(block);
        let reply = self.conn.command(&cmd).await?;
        commands::parse_afm20_mute(&cmd, &reply)
    }

    async fn set_mute(&self, block: &str, muted: bool) -> Result<()> {
        debug!(addr = %self.conn.endpoint().address(), block, muted, "setting mute");
        let cmd = commands::cmd_afm20_set_mute(block, muted);
        self.conn.command(&cmd).await?;
        Ok(())
    }

    async fn get_hardware_info(&self) -> Result<HardwareInfo> {
        hardware::query_hardware_info(&self.conn).await
    }
}
