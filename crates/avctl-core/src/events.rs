//! Asynchronous event types.
//!
//! The VIA appliance pushes unsolicited lines on an authenticated
//! connection whenever users join, leave, share media or start presenting.
//! The monitor in `avctl-via` classifies those lines into [`ViaEvent`]s and
//! publishes them, together with its own connection lifecycle, as
//! [`MonitorEvent`]s through a `tokio::sync::broadcast` channel.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Connection state of a persistent VIA monitoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    /// Not connected and not trying to be.
    Disconnected,
    /// Dialing the appliance.
    Connecting,
    /// Socket open; the welcome banner has not been read yet.
    AwaitingWelcome,
    /// Login command sent; waiting for the verdict.
    LoggingIn,
    /// Logged in and reading events.
    Connected,
    /// Waiting out the reconnect delay after a failure.
    Reconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingWelcome => "awaiting-welcome",
            SessionState::LoggingIn => "logging-in",
            SessionState::Connected => "connected",
            SessionState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// What kind of activity a VIA event line reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViaEventKind {
    /// Number of users currently logged in.
    #[serde(rename = "current-user-count")]
    UserCount,
    /// A single user logged in or out.
    #[serde(rename = "user-login-logout")]
    UserLoginLogout,
    /// Media playback started or stopped.
    #[serde(rename = "MediaStatus")]
    Media,
    /// A user started or stopped presenting.
    #[serde(rename = "presenting")]
    Presenting,
}

impl ViaEventKind {
    /// The event type key published to the event bus.
    pub fn as_str(self) -> &'static str {
        match self {
            ViaEventKind::UserCount => "current-user-count",
            ViaEventKind::UserLoginLogout => "user-login-logout",
            ViaEventKind::Media => "MediaStatus",
            ViaEventKind::Presenting => "presenting",
        }
    }
}

/// The transition an event line reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViaAction {
    LoginCount,
    Login,
    Logout,
    MediaStarted,
    MediaStopped,
    PresentationStarted,
    PresentationStopped,
}

impl ViaAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ViaAction::LoginCount => "login-count",
            ViaAction::Login => "login",
            ViaAction::Logout => "logout",
            ViaAction::MediaStarted => "media-started",
            ViaAction::MediaStopped => "media-stopped",
            ViaAction::PresentationStarted => "presentation-started",
            ViaAction::PresentationStopped => "presentation-stopped",
        }
    }
}

impl fmt::Display for ViaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured event parsed from one VIA event line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViaEvent {
    #[serde(rename = "event_type")]
    pub kind: ViaEventKind,
    pub action: ViaAction,
    /// The user the event concerns, when the line names one.
    pub user: Option<String>,
    /// Event value: the logged-in count for [`ViaEventKind::UserCount`],
    /// otherwise the action string.
    pub state: String,
    pub observed_at: SystemTime,
}

impl ViaEvent {
    pub fn new(kind: ViaEventKind, action: ViaAction, user: Option<String>) -> Self {
        ViaEvent {
            kind,
            action,
            user,
            state: action.as_str().to_string(),
            observed_at: SystemTime::now(),
        }
    }

    /// Replace the event's state value.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }
}

/// An event emitted by a VIA monitor.
///
/// Events are delivered on a best-effort basis through a bounded broadcast
/// channel; slow consumers may miss events.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// The session moved to a new state.
    StateChanged(SessionState),
    /// A reconnect attempt is about to start after the delay.
    Reconnecting {
        /// 1-based count of consecutive attempts since the last successful login.
        attempt: u32,
    },
    /// An event line was classified.
    Via(ViaEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_keys() {
        assert_eq!(ViaEventKind::UserCount.as_str(), "current-user-count");
        assert_eq!(ViaEventKind::UserLoginLogout.as_str(), "user-login-logout");
        assert_eq!(ViaEventKind::Media.as_str(), "MediaStatus");
        assert_eq!(ViaEventKind::Presenting.as_str(), "presenting");
    }

    #[test]
    fn event_state_defaults_to_action() {
        let ev = ViaEvent::new(
            ViaEventKind::UserLoginLogout,
            ViaAction::Login,
            Some("jdoe".into()),
        );
        assert_eq!(ev.state, "login");
        let ev = ev.with_state("3");
        assert_eq!(ev.state, "3");
    }

    #[test]
    fn event_serializes_with_bus_keys() {
        let ev = ViaEvent::new(ViaEventKind::Presenting, ViaAction::PresentationStarted, None);
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event_type"], "presenting");
        assert_eq!(json["action"], "presentation-started");
        assert_eq!(json["state"], "presentation-started");
    }

    #[test]
    fn session_state_display() {
        assert_eq!(SessionState::AwaitingWelcome.to_string(), "awaiting-welcome");
        assert_eq!(SessionState::Reconnecting.to_string(), "reconnecting");
    }

    #[test]
    fn monitor_event_is_clone_send() {
        fn assert_send<T: Send + Clone>() {}
        assert_send::<MonitorEvent>();
    }
}
