//! Bridges a dial-up modem on a serial line to a remote telnet host: three
//! layers (serial/modem controller, telnet session, pipeline manager) each
//! run on their own thread, joined by shared ring/double buffers.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod datalog;
pub mod double_buffer;
pub mod errors;
pub mod lockfile;
pub mod modem;
pub mod pipeline;
pub mod ring_buffer;
pub mod serial;
pub mod signals;
pub mod telnet_session;

pub use bridge::Bridge;
pub use errors::{BridgeError, BridgeResult};
