//! Error types for avctl.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Validation, transport, protocol, and
//! capability errors are all captured here.

/// The error type for all avctl operations.
///
/// Variants cover the full range of failure modes encountered when talking
/// to AV hardware: rejected caller input, socket failures and deadlines,
/// device replies that do not parse or carry an error sentinel, and
/// capabilities a device family does not implement.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (dial failure, socket write failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// The device answered, but the reply was not what the command expects.
    ///
    /// Raised when the reply carries the device's error sentinel (`ERR`),
    /// is missing the echoed verb, or has the wrong number of fields. Both
    /// the encoded command and the raw reply are kept for diagnosis.
    #[error("protocol error: command {command:?} got response {response:?}")]
    Protocol {
        /// The command as it was written to the wire.
        command: String,
        /// The raw reply from the device.
        response: String,
    },

    /// A line from the device could not be interpreted at all.
    ///
    /// Used where there is no originating command, e.g. unsolicited event
    /// lines on a VIA monitoring connection.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Timed out waiting for the device.
    ///
    /// A timeout does not distinguish a busy device from an unreachable one.
    #[error("timeout waiting for response")]
    Timeout,

    /// The requested capability is not implemented by this device family.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An invalid parameter was passed by the caller. No I/O was attempted.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The VIA appliance rejected the login.
    #[error("login rejected: {0}")]
    Login(String),

    /// A hardware-info query sequence aborted on the named field.
    #[error("failed to get {field} from {address}: {source}")]
    HardwareInfo {
        /// Human readable name of the field that failed (e.g. "serial number").
        field: &'static str,
        /// Address of the device being queried.
        address: String,
        /// The error raised by the failing sub-query.
        #[source]
        source: Box<Error>,
    },

    /// No connection to the device has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a [`Error::Protocol`] from raw command and reply bytes.
    pub fn protocol(command: impl AsRef<[u8]>, response: impl AsRef<[u8]>) -> Self {
        Error::Protocol {
            command: String::from_utf8_lossy(command.as_ref()).trim_end().to_string(),
            response: String::from_utf8_lossy(response.as_ref()).trim_end().to_string(),
        }
    }

    /// Wrap `self` as the cause of a failed hardware-info field.
    pub fn in_field(self, field: &'static str, address: &str) -> Self {
        Error::HardwareInfo {
            field,
            address: address.to_string(),
            source: Box::new(self),
        }
    }

    /// Whether this error came from the socket rather than the device's reply.
    ///
    /// Connection pools drop the underlying connection when this is true,
    /// since the stream may be half-read.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::Timeout
                | Error::NotConnected
                | Error::ConnectionLost
                | Error::Io(_)
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("dial failed".into());
        assert_eq!(e.to_string(), "transport error: dial failed");
    }

    #[test]
    fn error_display_protocol() {
        let e = Error::protocol(b"#VID? 1\r\n", b"~01@VID ERR 002\r\n");
        assert_eq!(
            e.to_string(),
            "protocol error: command \"#VID? 1\" got response \"~01@VID ERR 002\""
        );
    }

    #[test]
    fn error_display_timeout() {
        let e = Error::Timeout;
        assert_eq!(e.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_unsupported() {
        let e = Error::Unsupported("mute on VIA".into());
        assert_eq!(e.to_string(), "unsupported operation: mute on VIA");
    }

    #[test]
    fn error_display_invalid_parameter() {
        let e = Error::InvalidParameter("port -1".into());
        assert_eq!(e.to_string(), "invalid parameter: port -1");
    }

    #[test]
    fn error_display_login() {
        let e = Error::Login("Error: bad password".into());
        assert_eq!(e.to_string(), "login rejected: Error: bad password");
    }

    #[test]
    fn error_display_hardware_info_names_field() {
        let e = Error::Timeout.in_field("serial number", "10.0.0.5");
        assert_eq!(
            e.to_string(),
            "failed to get serial number from 10.0.0.5: timeout waiting for response"
        );
        let source = std::error::Error::source(&e).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("timeout waiting for response"));
    }

    #[test]
    fn error_display_connection_lost() {
        let e = Error::ConnectionLost;
        assert_eq!(e.to_string(), "connection lost");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn transport_classification() {
        assert!(Error::Timeout.is_transport());
        assert!(Error::ConnectionLost.is_transport());
        assert!(Error::Transport("x".into()).is_transport());
        assert!(!Error::protocol("a", "b").is_transport());
        assert!(!Error::InvalidParameter("x".into()).is_transport());
        assert!(!Error::Unsupported("x".into()).is_transport());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}
