//! Echo responders for ICMPv6 ping and a fixed UDP port.

use bridge6_wire::{Icmpv6Body, Ipv6Packet, Packet, ICMPV6_ECHO_REPLY};
use tracing::debug;

use crate::layer::{Protocol, ProtocolContext};
use crate::registry::ClientHandle;

/// Answers ICMPv6 echo requests arriving from below with echo replies sent
/// back down to the same client.
#[derive(Debug, Default)]
pub struct Icmpv6EchoResponder;

impl Protocol for Icmpv6EchoResponder {
    fn name(&self) -> &str {
        "icmpv6-echo"
    }

    fn on_receive_from_below(
        &mut self,
        handle: ClientHandle,
        packet: &Packet,
        ctx: &mut ProtocolContext,
    ) {
        let Packet::Ipv6(ip) = packet else {
            return;
        };
        let Packet::Icmpv6(icmp) = ip.payload.as_ref() else {
            return;
        };
        let Icmpv6Body::EchoRequest(echo) = &icmp.body else {
            return;
        };
        debug!(
            ?handle,
            source = %ip.source,
            identifier = echo.identifier,
            sequence = echo.sequence,
            "answering echo request"
        );

        let mut reply = ip.clone();
        reply.source = ip.destination;
        reply.destination = ip.source;
        if let Packet::Icmpv6(inner) = reply.payload.as_mut() {
            inner.icmp_type = ICMPV6_ECHO_REPLY;
            inner.body = Icmpv6Body::EchoReply(echo.clone());
        }
        let mut reply = Packet::Ipv6(reply);
        reply.reset_checksums();
        ctx.send_down(handle, reply);
    }
}

/// Default port of the UDP echo responder.
pub const DEFAULT_UDP_ECHO_PORT: u16 = 12345;

/// Echoes UDP datagrams addressed to one port back to the sender, with the
/// address pair and port pair swapped.
#[derive(Debug)]
pub struct UdpEchoResponder {
    port: u16,
}

impl UdpEchoResponder {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl Default for UdpEchoResponder {
    fn default() -> Self {
        Self::new(DEFAULT_UDP_ECHO_PORT)
    }
}

impl Protocol for UdpEchoResponder {
    fn name(&self) -> &str {
        "udp-echo"
    }

    fn on_receive_from_below(
        &mut self,
        handle: ClientHandle,
        packet: &Packet,
        ctx: &mut ProtocolContext,
    ) {
        let Packet::Ipv6(ip) = packet else {
            return;
        };
        let Packet::Udp(udp) = ip.payload.as_ref() else {
            return;
        };
        if udp.destination_port != self.port {
            return;
        }
        debug!(
            ?handle,
            source = %ip.source,
            source_port = udp.source_port,
            "echoing udp datagram"
        );

        let mut reply = ip.clone();
        reply.source = ip.destination;
        reply.destination = ip.source;
        if let Packet::Udp(inner) = reply.payload.as_mut() {
            inner.source_port = udp.destination_port;
            inner.destination_port = udp.source_port;
        }
        let mut reply = Packet::Ipv6(reply);
        reply.reset_checksums();
        ctx.send_down(handle, reply);
    }
}
