//! TCP transport for the private join protocol.
//!
//! Two streaming calls over framed TCP connections: sources push
//! prepared rows to the helper (`PushRows`), the receiver pulls the
//! converted table back (`PullRows`). The helper authenticates sources
//! by the id carried in their hello frame and starts converting as soon
//! as the first row arrives.

mod client;
mod error;
mod server;
mod stats;

pub use client::{pull_rows, push_rows};
pub use error::{NetError, Result};
pub use server::run_helper;
pub use stats::{CountingStream, NetStats, StatsSnapshot};
