//! # avctl -- normalized control of Kramer AV hardware
//!
//! `avctl` exposes one capability surface (input routing, volume, mute,
//! hardware inventory, active-signal detection) over the incompatible wire
//! protocols of Kramer matrix switchers, AFM-20 and VP-558 DSPs, and the
//! VIA collaboration appliance. The VIA additionally streams unsolicited
//! events, which [`via::ViaMonitor`] turns into [`MonitorEvent`]s.
//!
//! ## Quick Start
//!
//! ```no_run
//! use avctl::{Device, Port};
//! use avctl::kramer::SwitcherBuilder;
//!
//! #[tokio::main]
//! async fn main() -> avctl::Result<()> {
//!     let switcher = SwitcherBuilder::new("10.5.34.12").build();
//!     switcher.set_input(Port::new(0), Port::new(2)).await?;
//!     println!("output 0 <- input {}", switcher.get_input(Port::new(0)).await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                | Purpose                                            |
//! |----------------------|----------------------------------------------------|
//! | `avctl-core`         | [`Device`] trait, types, unit converters, errors   |
//! | `avctl-transport`    | TCP transport and pooled connections               |
//! | `avctl-text-io`      | Kramer Protocol 3000 codec and frame exchange      |
//! | `avctl-kramer`       | Matrix switcher, AFM-20 and VP-558 adapters        |
//! | `avctl-via`          | VIA client and persistent event monitor            |
//! | **`avctl`**          | This facade crate                                  |
//!
//! ## Feature Flags
//!
//! | Feature  | Enables            | Default |
//! |----------|--------------------|---------|
//! | `kramer` | [`kramer`] module  | yes     |
//! | `via`    | [`via`] module     | yes     |

pub use avctl_core::*;

/// Kramer Protocol 3000 backends.
///
/// Provides [`MatrixSwitcher`](kramer::MatrixSwitcher),
/// [`Afm20`](kramer::Afm20) and [`Vp558`](kramer::Vp558) with their
/// builders. All three share a pooled, serialized connection per device.
#[cfg(feature = "kramer")]
pub mod kramer {
    pub use avctl_kramer::*;
}

/// Kramer VIA backend.
///
/// Provides [`ViaClient`](via::ViaClient) for one-shot commands and
/// [`ViaMonitor`](via::ViaMonitor) for the persistent event stream, both
/// built with [`ViaBuilder`](via::ViaBuilder).
#[cfg(feature = "via")]
pub mod via {
    pub use avctl_via::*;
}

/// Every device family supported by the enabled backends.
///
/// ```
/// for family in avctl::supported_families() {
///     println!("{family} (port {})", family.default_port());
/// }
/// ```
pub fn supported_families() -> Vec<Family> {
    let mut families = Vec::new();

    #[cfg(feature = "kramer")]
    families.extend([Family::MatrixSwitcher, Family::Afm20, Family::Vp558]);

    #[cfg(feature = "via")]
    families.push(Family::Via);

    families
}

/// Build the adapter for `endpoint` with default settings.
///
/// VIA endpoints must carry credentials. Nothing is dialed until the first
/// capability call.
pub fn open(endpoint: &Endpoint) -> Result<Box<dyn Device>> {
    match endpoint.family() {
        #[cfg(feature = "kramer")]
        Family::MatrixSwitcher => Ok(Box::new(
            kramer::SwitcherBuilder::new(endpoint.address())
                .port(endpoint.port())
                .build(),
        )),
        #[cfg(feature = "kramer")]
        Family::Afm20 => Ok(Box::new(
            kramer::Afm20Builder::new(endpoint.address())
                .port(endpoint.port())
                .build(),
        )),
        #[cfg(feature = "kramer")]
        Family::Vp558 => Ok(Box::new(
            kramer::Vp558Builder::new(endpoint.address())
                .port(endpoint.port())
                .build(),
        )),
        #[cfg(feature = "via")]
        Family::Via => {
            let credentials = endpoint.credentials().cloned().ok_or_else(|| {
                Error::InvalidParameter("VIA endpoint requires credentials".into())
            })?;
            Ok(Box::new(
                via::ViaBuilder::new(endpoint.address(), credentials)
                    .port(endpoint.port())
                    .build(),
            ))
        }
        #[allow(unreachable_patterns)]
        family => Err(Error::Unsupported(format!(
            "{family} backend is not enabled"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(all(feature = "kramer", feature = "via"))]
    fn default_features_cover_all_families() {
        assert_eq!(
            supported_families(),
            vec![
                Family::MatrixSwitcher,
                Family::Afm20,
                Family::Vp558,
                Family::Via
            ]
        );
    }

    #[tokio::test]
    #[cfg(feature = "kramer")]
    async fn open_keeps_endpoint() {
        let endpoint = Endpoint::new("192.0.2.7", Family::Vp558).with_port(5001);
        let device = open(&endpoint).unwrap();
        assert_eq!(device.endpoint().socket_addr(), "192.0.2.7:5001");
        assert_eq!(device.endpoint().family(), Family::Vp558);
    }

    #[test]
    #[cfg(feature = "via")]
    fn via_without_credentials_is_rejected() {
        let endpoint = Endpoint::new("192.0.2.8", Family::Via);
        assert!(matches!(open(&endpoint), Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    #[cfg(feature = "via")]
    async fn open_via_with_credentials() {
        let endpoint = Endpoint::new("192.0.2.8", Family::Via)
            .with_credentials(Credentials::new("su", "supass"));
        let device = open(&endpoint).unwrap();
        assert_eq!(device.endpoint().port(), 9982);
        assert!(matches!(device.get_mute("1").await, Err(Error::Unsupported(_))));
    }
}
