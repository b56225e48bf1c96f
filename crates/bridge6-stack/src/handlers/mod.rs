//! Ready-made protocols for the common bridge setups.

mod echo;
mod heartbeat;
mod logger;
mod relay;

pub use echo::{Icmpv6EchoResponder, UdpEchoResponder, DEFAULT_UDP_ECHO_PORT};
pub use heartbeat::Heartbeat;
pub use logger::HexLogger;
pub use relay::Relay;
