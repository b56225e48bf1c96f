//! Passive traffic logger.

use std::fmt::Write as _;

use bridge6_wire::Packet;
use tracing::{debug, info};

use crate::layer::{Protocol, ProtocolContext};
use crate::registry::ClientHandle;

/// Logs every packet crossing its layer, in both directions, as a hex dump.
/// Never consumes or mutates traffic.
#[derive(Debug, Default)]
pub struct HexLogger;

impl HexLogger {
    fn log(&self, direction: &str, handle: ClientHandle, packet: &Packet) {
        // Serializing a clone leaves the original's checksum fields alone.
        match packet.clone().serialize(None) {
            Ok(wire) => {
                info!(
                    direction,
                    ?handle,
                    len = wire.len(),
                    hex = %hex_dump(&wire),
                    "packet"
                );
            }
            Err(err) => debug!(direction, ?handle, %err, "unserializable packet"),
        }
    }
}

fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

impl Protocol for HexLogger {
    fn name(&self) -> &str {
        "hex-logger"
    }

    fn on_receive_from_below(
        &mut self,
        handle: ClientHandle,
        packet: &Packet,
        _ctx: &mut ProtocolContext,
    ) {
        self.log("up", handle, packet);
    }

    fn on_receive_from_above(
        &mut self,
        handle: ClientHandle,
        packet: &Packet,
        _ctx: &mut ProtocolContext,
    ) {
        self.log("down", handle, packet);
    }
}
