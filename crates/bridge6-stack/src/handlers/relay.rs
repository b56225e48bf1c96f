//! Pass-through link protocol.

use bridge6_wire::Packet;

use crate::layer::{Protocol, ProtocolContext};
use crate::registry::ClientHandle;

/// Forwards traffic unchanged in both directions. Sits on the link layer of
/// a bridge so ingress climbs to the layers above and replies fall through
/// to the egress sink.
#[derive(Debug, Default)]
pub struct Relay;

impl Protocol for Relay {
    fn name(&self) -> &str {
        "relay"
    }

    fn on_receive_from_below(
        &mut self,
        handle: ClientHandle,
        packet: &Packet,
        ctx: &mut ProtocolContext,
    ) {
        ctx.send_up(handle, packet.clone());
    }

    fn on_receive_from_above(
        &mut self,
        handle: ClientHandle,
        packet: &Packet,
        ctx: &mut ProtocolContext,
    ) {
        ctx.send_down(handle, packet.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;

    use super::*;
    use crate::layer::Stack;

    /// Turns everything that arrives from below straight back around.
    struct Bouncer;

    impl Protocol for Bouncer {
        fn name(&self) -> &str {
            "bouncer"
        }

        fn on_receive_from_below(
            &mut self,
            handle: ClientHandle,
            packet: &Packet,
            ctx: &mut ProtocolContext,
        ) {
            ctx.send_down(handle, packet.clone());
        }
    }

    #[test]
    fn relays_both_directions() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let mut stack = Stack::new();
        let link = stack.add_layer("link");
        let network = stack.add_layer("network");
        stack.bind(link, network).expect("bind");
        stack.register(link, Box::new(Relay)).expect("register");
        stack.register(network, Box::new(Bouncer)).expect("register");

        let sink = captured.clone();
        stack.set_egress(Box::new(move |_, packet| {
            sink.lock().expect("sink lock").push(packet);
        }));

        // Up through the link, back down from the network, out the bottom.
        let handle = ClientHandle::synthetic(3);
        stack
            .inject_from_below(link, handle, Packet::Opaque(Bytes::from_static(b"x")))
            .expect("inject");

        let captured = captured.lock().expect("sink lock");
        assert_eq!(*captured, vec![Packet::Opaque(Bytes::from_static(b"x"))]);
    }
}
