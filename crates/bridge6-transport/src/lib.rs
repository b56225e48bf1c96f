//! Transport boundary for the bridge6 tunnel bridge.
//!
//! A tunnel endpoint connects to us over a named, path-addressed duplex byte
//! channel:
//! - Unix domain sockets (Linux/macOS)
//! - Named pipes (Windows)
//!
//! This is the lowest layer of bridge6. The session registry consumes only
//! the [`PipeStream`] contract provided here (accept/read/write/close); it
//! never creates sockets itself.

pub mod error;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::PipeStream;

#[cfg(unix)]
pub use uds::UnixSocketListener;
