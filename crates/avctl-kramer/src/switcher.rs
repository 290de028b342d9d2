//! MatrixSwitcher -- the [`Device`] implementation for Kramer matrix video
//! switchers (VS-44DT and friends).
//!
//! Routing uses `#VID`, inventory the shared query sequence, and signal
//! detection `#SIGNAL`. The switcher has no audio blocks, so volume and
//! mute keep the trait's `Unsupported` defaults.

use async_trait::async_trait;
use tracing::debug;

use avctl_core::device::Device;
use avctl_core::error::Result;
use avctl_core::types::{Endpoint, HardwareInfo};
use avctl_core::units::Port;

use crate::commands;
use crate::connection::KramerConnection;
use crate::hardware;

/// A Kramer matrix video switcher.
///
/// Constructed via [`SwitcherBuilder`](crate::builder::SwitcherBuilder).
pub struct MatrixSwitcher {
    conn: KramerConnection,
    signal_port: Port,
}

impl MatrixSwitcher {
    pub(crate) fn new(conn: KramerConnection, signal_port: Port) -> Self {
        MatrixSwitcher { conn, signal_port }
    }

    /// Whether `port` currently sees an active source.
    pub async fn active_signal_on(&self, port: Port) -> Result<bool> {
        let cmd = commands::cmd_signal(port);
        let reply = self.conn.command(&cmd).await?;
        let active = commands::parse_signal(&cmd, &reply)?;
        debug!(addr = %self.conn.endpoint().address(), %port, active, "signal state");
        Ok(active)
    }

    /// Lock or unlock the front-panel buttons.
    pub async fn set_front_lock(&self, locked: bool) -> Result<()> {
        debug!(addr = %self.conn.endpoint().address(), locked, "setting front panel lock");
        let cmd = commands::cmd_front_lock(locked);
        let reply = self.conn.command(&cmd).await?;
        commands::check_front_lock(&cmd, &reply)
    }

    /// The routed input for `output`, formatted as `"<in>:<out>"`.
    pub async fn input_by_output(&self, output: Port) -> Result<String> {
        let input = self.get_input(output).await?;
        Ok(format!("{input}:{output}"))
    }

    /// The port [`Device::get_active_signal`] reports on.
    pub fn signal_port(&self) -> Port {
        self.signal_port
    }

    /// Close the pooled connection.
    pub async fn close(&self) {
        self.conn.close().await;
    }
}

#[async_trait]
impl Device for MatrixSwitcher {
    fn endpoint(&self) -> &Endpoint {
        self.conn.endpoint()
    }

    async fn get_input(&self, output: Port) -> Result<Port> {
        let cmd = commands::cmd_get_input(output);
        let reply = self.conn.command(&cmd).await?;
        let input = commands::parse_input(&cmd, &reply)?;
        debug!(addr = %self.conn.endpoint().address(), %output, %input, "current route");
        Ok(input)
    }

    async fn set_input(&self, output: Port, input: Port) -> Result<()> {
        debug!(addr = %self.conn.endpoint().address(), %output, %input, "routing");
        let cmd = commands::cmd_set_input(output, input);
        let reply = self.conn.command(&cmd).await?;
        commands::check_set_input(&cmd, &reply)
    }

    async fn get_hardware_info(&self) -> Result<HardwareInfo> {
        hardware::query_hardware_info(&self.conn).await
    }

    async fn get_active_signal(&self) -> Result<bool> {
        self.active_signal_on(self.signal_port).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use avctl_core::Error;
    use avctl_test_harness::{MockDialer, MockProbe, MockTransport};

    use crate::builder::SwitcherBuilder;

    fn switcher(mock: MockTransport) -> (MatrixSwitcher, MockProbe) {
        let probe = mock.probe();
        let vs = SwitcherBuilder::new("10.0.0.5")
            .settle_delay(std::time::Duration::ZERO)
            .dialer(Arc::new(MockDialer::new(vec![mock])))
            .build();
        (vs, probe)
    }

    #[tokio::test]
    async fn set_input_sends_one_based_route() {
        let mut mock = MockTransport::new();
        mock.expect(b"#VID 3>1\r\n", b"~01@VID 3>1 OK\r\n");
        let (vs, probe) = switcher(mock);

        vs.set_input(Port::new(0), Port::new(2)).await.unwrap();
        assert_eq!(probe.sent_text(), vec!["#VID 3>1\r\n"]);
    }

    #[tokio::test]
    async fn set_input_rejects_reply_without_vid() {
        let mut mock = MockTransport::new();
        mock.expect(b"#VID 3>1\r\n", b"~01@ROUTE OK\r\n");
        let (vs, _) = switcher(mock);

        let err = vs.set_input(Port::new(0), Port::new(2)).await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test]
    async fn get_input_is_zero_based() {
        let mut mock = MockTransport::new();
        mock.expect(b"#VID? 2\r\n", b"~01@VID 4>2\r\n");
        let (vs, _) = switcher(mock);

        assert_eq!(vs.get_input(Port::new(1)).await.unwrap(), Port::new(3));
    }

    #[tokio::test]
    async fn input_by_output_formats_pair() {
        let mut mock = MockTransport::new();
        mock.expect(b"#VID? 1\r\n", b"~01@VID 3>1\r\n");
        let (vs, _) = switcher(mock);

        assert_eq!(vs.input_by_output(Port::new(0)).await.unwrap(), "2:0");
    }

    #[tokio::test]
    async fn err_reply_is_protocol_error() {
        let mut mock = MockTransport::new();
        mock.expect(b"#VID? 1\r\n", b"~01@VID ERR 003\r\n");
        let (vs, _) = switcher(mock);

        assert!(matches!(
            vs.get_input(Port::new(0)).await,
            Err(Error::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn active_signal_uses_configured_port() {
        let mut mock = MockTransport::new();
        mock.expect(b"#SIGNAL? 1\r\n", b"~01@SIGNAL 1,1\r\n");
        mock.expect(b"#SIGNAL? 3\r\n", b"~01@SIGNAL 3,0\r\n");
        let (vs, _) = switcher(mock);

        assert_eq!(vs.signal_port(), Port::new(0));
        assert!(vs.get_active_signal().await.unwrap());
        assert!(!vs.active_signal_on(Port::new(2)).await.unwrap());
    }

    #[tokio::test]
    async fn front_lock_requires_ok() {
        let mut mock = MockTransport::new();
        mock.expect(b"#LOCK-FP 1\r\n", b"~01@LOCK-FP 1 OK\r\n");
        mock.expect(b"#LOCK-FP 0\r\n", b"~01@LOCK-FP 0\r\n");
        let (vs, _) = switcher(mock);

        vs.set_front_lock(true).await.unwrap();
        assert!(matches!(
            vs.set_front_lock(false).await,
            Err(Error::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn audio_is_unsupported_without_io() {
        let (vs, probe) = switcher(MockTransport::new());

        assert!(matches!(vs.get_volume("1").await, Err(Error::Unsupported(_))));
        assert!(matches!(vs.set_mute("1", true).await, Err(Error::Unsupported(_))));
        assert!(probe.sent_data().is_empty());
    }

    #[tokio::test]
    async fn hardware_info_through_trait_object() {
        let mut mock = MockTransport::new();
        crate::hardware::tests::expect_full_inventory(&mut mock);
        let (vs, _) = switcher(mock);
        let device: Box<dyn Device> = Box::new(vs);

        let info = device.get_hardware_info().await.unwrap();
        assert_eq!(info.hostname, "10.0.0.5");
        assert_eq!(info.protocol_version, "1.0");
    }
}
