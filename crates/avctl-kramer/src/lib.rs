//! Kramer Protocol 3000 backends for avctl.
//!
//! This crate drives three Kramer device families over the P3000 ASCII
//! protocol on TCP port 5000. It provides:
//!
//! - **Command builders** ([`commands`]) -- encode routing, level, mute,
//!   signal and inventory commands and parse their replies.
//! - **Connection** ([`connection`]) -- a pooled, serialized command channel
//!   that applies the `ERR` check and drops broken sockets.
//! - **Adapters** -- [`MatrixSwitcher`] (`#VID`), [`Afm20`] (`#X-AUD-LVL`
//!   in decibels) and [`Vp558`] (`#ROUTE`, `#AUD-LVL` with double-response
//!   handling), each implementing [`Device`](avctl_core::Device).
//! - **Builders** ([`builder`]) -- fluent construction with defaults.
//!
//! # Example
//!
//! ```
//! use avctl_core::Port;
//! use avctl_kramer::commands::{cmd_set_input, parse_input};
//!
//! // Route public input 2 to public output 0; the device counts from 1.
//! assert_eq!(&cmd_set_input(Port::new(0), Port::new(2))[..], b"#VID 3>1\r\n");
//!
//! let input = parse_input(b"#VID? 1\r\n", "~01@VID 3>1").unwrap();
//! assert_eq!(input, Port::new(2));
//! ```

pub mod afm20;
pub mod builder;
pub mod commands;
pub mod connection;
mod hardware;
pub mod switcher;
pub mod vp558;

pub use afm20::Afm20;
pub use builder::{Afm20Builder, SwitcherBuilder, Vp558Builder};
pub use switcher::MatrixSwitcher;
pub use vp558::Vp558;
