//! Shared line-protocol support for the Kramer device families.
//!
//! The matrix switcher, the AFM-20 and the VP558 all speak Kramer
//! Protocol 3000: `#`-prefixed ASCII commands answered by LF-terminated
//! reply lines that signal failure with an embedded `ERR` token.
//!
//! # Architecture
//!
//! - [`protocol`] -- encode commands, decode and check reply frames
//! - [`exchange`] -- write one command and read one or two frames under a
//!   single deadline

pub mod exchange;
pub mod protocol;

pub use exchange::{ExchangeConfig, exchange, read_frame};
pub use protocol::{DecodeResult, Ending};
