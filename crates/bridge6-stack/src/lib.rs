//! Client session registry and layered protocol pipeline.
//!
//! The registry accepts tunnel clients over a local socket, keeps their
//! per-session state (MTU, announced addresses), and hands decoded tunnel
//! frames to an event sink. The pipeline routes parsed packets up and down
//! through stacked protocol layers, the registry sitting beneath the lowest
//! layer as the packet source and sink.

pub mod error;
pub mod handlers;
pub mod layer;
pub mod registry;

pub use error::{Result, StackError};
pub use layer::{LayerId, Protocol, ProtocolContext, Stack};
pub use registry::{ClientHandle, SessionRegistry, TunnelEvents, DEFAULT_MTU, MIN_MTU};
