//! Classification of unsolicited VIA event lines.
//!
//! | Line | Event |
//! |---|---|
//! | `PList\|Get\|cnt\|<n>` | `current-user-count`, state `n - 1` |
//! | `PList\|Get\|1\|<user>` | `user-login-logout` / `login` |
//! | `PList\|Get\|0\|<user>` | `user-login-logout` / `logout` |
//! | `MediaStatus\|Get\|1` | `MediaStatus` / `media-started` |
//! | `DisplayStatus\|Get\|<user>\|1` | `presenting` / `presentation-started` |
//!
//! Anything else, including ping replies, is not an event.

use tracing::debug;

use avctl_core::error::{Error, Result};
use avctl_core::events::{ViaAction, ViaEvent, ViaEventKind};

const PARTICIPANTS: &str = "PList";
const MEDIA_STATUS: &str = "MediaStatus";
const DISPLAY_STATUS: &str = "DisplayStatus";
const COUNT_MARKER: &str = "cnt";

/// Classify one event line.
///
/// Returns `Ok(None)` for lines that are not events and for events whose
/// state flag is neither `1` nor `0`. A recognized event line with missing
/// fields is [`Error::Malformed`].
pub fn classify_line(line: &str) -> Result<Option<ViaEvent>> {
    let line = line.trim();
    let out: Vec<&str> = line.split('|').collect();

    let event = match out[0] {
        PARTICIPANTS => {
            let flag = field(&out, 2, line)?;
            if flag == COUNT_MARKER {
                let count: i64 = field(&out, 3, line)?
                    .parse()
                    .map_err(|_| Error::Malformed(format!("bad user count in {line:?}")))?;
                let logged_in = count - 1;
                Some(
                    ViaEvent::new(ViaEventKind::UserCount, ViaAction::LoginCount, None)
                        .with_state(logged_in.to_string()),
                )
            } else {
                let user = field(&out, 3, line)?;
                on_off(flag, ViaAction::Login, ViaAction::Logout).map(|action| {
                    ViaEvent::new(ViaEventKind::UserLoginLogout, action, Some(user.to_string()))
                })
            }
        }
        MEDIA_STATUS => {
            let flag = field(&out, 2, line)?;
            on_off(flag, ViaAction::MediaStarted, ViaAction::MediaStopped)
                .map(|action| ViaEvent::new(ViaEventKind::Media, action, None))
        }
        DISPLAY_STATUS => {
            let user = field(&out, 2, line)?;
            let flag = field(&out, 3, line)?;
            on_off(flag, ViaAction::PresentationStarted, ViaAction::PresentationStopped)
                .map(|action| ViaEvent::new(ViaEventKind::Presenting, action, Some(user.to_string())))
        }
        _ => return Ok(None),
    };

    if event.is_none() {
        debug!(line = %line, "ignoring event with unknown state");
    }
    Ok(event)
}

fn field<'a>(out: &[&'a str], index: usize, line: &str) -> Result<&'a str> {
    out.get(index)
        .map(|s| s.trim())
        .ok_or_else(|| Error::Malformed(format!("event line {line:?} has no field {index}")))
}

fn on_off(flag: &str, on: ViaAction, off: ViaAction) -> Option<ViaAction> {
    match flag {
        "1" => Some(on),
        "0" => Some(off),
        _ => None,
    }
}
