//! Transport implementations for avctl.
//!
//! This crate provides the concrete [`Transport`](avctl_core::Transport)
//! used to reach devices on the network, plus the connection pool the
//! Kramer adapters share:
//!
//! - [`TcpTransport`] / [`TcpDialer`]: TCP connections with connect and
//!   write deadlines
//! - [`ConnectionPool`]: one serialized, idle-expiring connection per
//!   endpoint
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use avctl_transport::{ConnectionPool, PoolConfig, TcpDialer};
//!
//! # async fn example() -> avctl_core::Result<()> {
//! let pool = ConnectionPool::new(
//!     Arc::new(TcpDialer::new("10.5.34.20:5000")),
//!     PoolConfig::default(),
//! );
//!
//! let mut conn = pool.acquire().await?;
//! conn.transport().send(b"#VID? 1\r\n").await?;
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod tcp;

pub use pool::{ConnectionPool, PoolConfig, PoolGuard, PooledConnection};
pub use tcp::{TcpDialer, TcpTransport};
