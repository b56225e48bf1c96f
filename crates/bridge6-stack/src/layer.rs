//! Layered protocol pipeline.
//!
//! A [`Stack`] owns layers in an arena and addresses them by [`LayerId`];
//! each layer has at most one neighbor above and one below. Protocols
//! registered on a layer all see every packet that reaches it (broadcast, in
//! registration order) and reply by queuing sends on the [`ProtocolContext`];
//! queued events are drained iteratively, so a reply never re-enters a
//! handler that is still on the call stack.
//!
//! Traffic that falls off the bottom of the stack goes to the egress sink,
//! which the bridge wires to [`SessionRegistry::send_data`].
//!
//! [`SessionRegistry::send_data`]: crate::registry::SessionRegistry::send_data

use std::collections::VecDeque;

use bridge6_wire::Packet;
use tracing::{debug, warn};

use crate::error::{Result, StackError};
use crate::registry::ClientHandle;

/// Index of a layer within its [`Stack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(usize);

/// A packet handler attached to a layer.
///
/// Both receive hooks default to ignoring the packet, so a protocol that
/// only cares about one direction implements one method.
pub trait Protocol: Send {
    /// Short name for log events.
    fn name(&self) -> &str;

    /// A packet arrived from the layer below (or from the wire, at the
    /// bottom layer).
    fn on_receive_from_below(
        &mut self,
        handle: ClientHandle,
        packet: &Packet,
        ctx: &mut ProtocolContext,
    ) {
        let _ = (handle, packet, ctx);
    }

    /// A packet arrived from the layer above.
    fn on_receive_from_above(
        &mut self,
        handle: ClientHandle,
        packet: &Packet,
        ctx: &mut ProtocolContext,
    ) {
        let _ = (handle, packet, ctx);
    }

    /// Teardown hook, called once from [`Stack::kill`].
    fn kill(&mut self) {}
}

/// Where an in-flight packet entered the layer it is being delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Below,
    Above,
}

struct Event {
    layer: LayerId,
    origin: Origin,
    handle: ClientHandle,
    packet: Packet,
}

/// Send queue handed to protocols during delivery.
///
/// Sends are deferred: they are routed to the neighboring layer (or the
/// egress sink) after the current delivery pass completes.
#[derive(Default)]
pub struct ProtocolContext {
    up: Vec<(ClientHandle, Packet)>,
    down: Vec<(ClientHandle, Packet)>,
}

impl ProtocolContext {
    /// Queue a packet for the layer above.
    pub fn send_up(&mut self, handle: ClientHandle, packet: Packet) {
        self.up.push((handle, packet));
    }

    /// Queue a packet for the layer below, or the egress sink at the bottom.
    pub fn send_down(&mut self, handle: ClientHandle, packet: Packet) {
        self.down.push((handle, packet));
    }
}

struct Layer {
    name: String,
    protocols: Vec<Box<dyn Protocol>>,
    above: Option<LayerId>,
    below: Option<LayerId>,
}

/// Sink for traffic leaving the bottom of the stack.
pub type EgressSink = Box<dyn FnMut(ClientHandle, Packet) + Send>;

/// Arena of layers plus the event pump that moves packets between them.
#[derive(Default)]
pub struct Stack {
    layers: Vec<Layer>,
    egress: Option<EgressSink>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty, unbound layer.
    pub fn add_layer(&mut self, name: impl Into<String>) -> LayerId {
        let id = LayerId(self.layers.len());
        self.layers.push(Layer {
            name: name.into(),
            protocols: Vec::new(),
            above: None,
            below: None,
        });
        id
    }

    /// Attach a protocol to a layer. Delivery order follows registration
    /// order.
    pub fn register(&mut self, layer: LayerId, protocol: Box<dyn Protocol>) -> Result<()> {
        let slot = self
            .layers
            .get_mut(layer.0)
            .ok_or(StackError::UnknownLayer(layer))?;
        debug!(layer = %slot.name, protocol = protocol.name(), "protocol registered");
        slot.protocols.push(protocol);
        Ok(())
    }

    /// Make `upper` the layer above `lower`. Each side of a layer binds at
    /// most once; rebinding is rejected, not replaced.
    pub fn bind(&mut self, lower: LayerId, upper: LayerId) -> Result<()> {
        if lower == upper {
            warn!(layer = lower.0, "refusing to bind a layer to itself");
            return Err(StackError::SelfBind(lower));
        }
        self.layer(lower)?;
        self.layer(upper)?;
        if self.layers[lower.0].above.is_some() {
            warn!(layer = %self.layers[lower.0].name, "layer already has an upper neighbor");
            return Err(StackError::AlreadyBound(lower));
        }
        if self.layers[upper.0].below.is_some() {
            warn!(layer = %self.layers[upper.0].name, "layer already has a lower neighbor");
            return Err(StackError::AlreadyBound(upper));
        }
        self.layers[lower.0].above = Some(upper);
        self.layers[upper.0].below = Some(lower);
        Ok(())
    }

    /// Install the sink for traffic leaving the bottom layer.
    pub fn set_egress(&mut self, sink: EgressSink) {
        self.egress = Some(sink);
    }

    /// Deliver a packet to a layer as if it came from below, then drain
    /// every send it triggers.
    pub fn inject_from_below(
        &mut self,
        layer: LayerId,
        handle: ClientHandle,
        packet: Packet,
    ) -> Result<()> {
        self.layer(layer)?;
        self.pump(Event {
            layer,
            origin: Origin::Below,
            handle,
            packet,
        });
        Ok(())
    }

    /// Deliver a packet to a layer as if it came from above.
    pub fn inject_from_above(
        &mut self,
        layer: LayerId,
        handle: ClientHandle,
        packet: Packet,
    ) -> Result<()> {
        self.layer(layer)?;
        self.pump(Event {
            layer,
            origin: Origin::Above,
            handle,
            packet,
        });
        Ok(())
    }

    /// Run every protocol's teardown hook and clear the arena.
    pub fn kill(&mut self) {
        for layer in &mut self.layers {
            for protocol in &mut layer.protocols {
                debug!(layer = %layer.name, protocol = protocol.name(), "killing protocol");
                protocol.kill();
            }
        }
        self.layers.clear();
        self.egress = None;
    }

    fn layer(&self, id: LayerId) -> Result<&Layer> {
        self.layers.get(id.0).ok_or(StackError::UnknownLayer(id))
    }

    fn pump(&mut self, first: Event) {
        let mut events = VecDeque::from([first]);
        while let Some(event) = events.pop_front() {
            let mut ctx = ProtocolContext::default();
            let layer = &mut self.layers[event.layer.0];
            for protocol in &mut layer.protocols {
                match event.origin {
                    Origin::Below => {
                        protocol.on_receive_from_below(event.handle, &event.packet, &mut ctx)
                    }
                    Origin::Above => {
                        protocol.on_receive_from_above(event.handle, &event.packet, &mut ctx)
                    }
                }
            }
            let above = layer.above;
            let below = layer.below;
            let name = layer.name.clone();

            for (handle, packet) in ctx.up {
                match above {
                    Some(target) => events.push_back(Event {
                        layer: target,
                        origin: Origin::Below,
                        handle,
                        packet,
                    }),
                    None => warn!(layer = %name, "send up with no upper neighbor, dropping"),
                }
            }
            for (handle, packet) in ctx.down {
                match below {
                    Some(target) => events.push_back(Event {
                        layer: target,
                        origin: Origin::Above,
                        handle,
                        packet,
                    }),
                    None => match self.egress.as_mut() {
                        Some(sink) => sink(handle, packet),
                        None => {
                            warn!(layer = %name, "send down with no egress sink, dropping")
                        }
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;

    use super::*;

    fn handle() -> ClientHandle {
        ClientHandle::synthetic(7)
    }

    fn opaque(tag: &[u8]) -> Packet {
        Packet::Opaque(Bytes::copy_from_slice(tag))
    }

    /// Records deliveries into a shared log; optionally forwards each
    /// packet onward in a fixed direction.
    struct Probe {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        forward_up: bool,
        forward_down: bool,
    }

    impl Probe {
        fn new(label: &'static str, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                label,
                log,
                forward_up: false,
                forward_down: false,
            }
        }
    }

    impl Protocol for Probe {
        fn name(&self) -> &str {
            self.label
        }

        fn on_receive_from_below(
            &mut self,
            handle: ClientHandle,
            packet: &Packet,
            ctx: &mut ProtocolContext,
        ) {
            self.log
                .lock()
                .expect("log lock")
                .push(format!("{}:below", self.label));
            if self.forward_up {
                ctx.send_up(handle, packet.clone());
            }
        }

        fn on_receive_from_above(
            &mut self,
            handle: ClientHandle,
            packet: &Packet,
            ctx: &mut ProtocolContext,
        ) {
            self.log
                .lock()
                .expect("log lock")
                .push(format!("{}:above", self.label));
            if self.forward_down {
                ctx.send_down(handle, packet.clone());
            }
        }

        fn kill(&mut self) {
            self.log
                .lock()
                .expect("log lock")
                .push(format!("{}:kill", self.label));
        }
    }

    #[test]
    fn broadcast_follows_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = Stack::new();
        let link = stack.add_layer("link");
        stack
            .register(link, Box::new(Probe::new("first", log.clone())))
            .expect("register");
        stack
            .register(link, Box::new(Probe::new("second", log.clone())))
            .expect("register");

        stack
            .inject_from_below(link, handle(), opaque(b"x"))
            .expect("inject");

        assert_eq!(
            *log.lock().expect("log lock"),
            vec!["first:below".to_string(), "second:below".to_string()]
        );
    }

    #[test]
    fn sends_climb_through_bound_layers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = Stack::new();
        let link = stack.add_layer("link");
        let network = stack.add_layer("network");
        stack.bind(link, network).expect("bind");

        let mut riser = Probe::new("riser", log.clone());
        riser.forward_up = true;
        stack.register(link, Box::new(riser)).expect("register");
        stack
            .register(network, Box::new(Probe::new("top", log.clone())))
            .expect("register");

        stack
            .inject_from_below(link, handle(), opaque(b"x"))
            .expect("inject");

        assert_eq!(
            *log.lock().expect("log lock"),
            vec!["riser:below".to_string(), "top:below".to_string()]
        );
    }

    #[test]
    fn bottom_sends_fall_into_the_egress_sink() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = Stack::new();
        let link = stack.add_layer("link");

        let sink_log = captured.clone();
        stack.set_egress(Box::new(move |handle, packet| {
            sink_log.lock().expect("sink lock").push((handle, packet));
        }));

        let mut sinker = Probe::new("sinker", log.clone());
        sinker.forward_down = true;
        stack.register(link, Box::new(sinker)).expect("register");

        stack
            .inject_from_above(link, handle(), opaque(b"egress"))
            .expect("inject");

        let captured = captured.lock().expect("sink lock");
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0, handle());
        assert_eq!(captured[0].1, opaque(b"egress"));
    }

    #[test]
    fn unneighbored_sends_are_dropped_without_panic() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = Stack::new();
        let lonely = stack.add_layer("lonely");
        let mut probe = Probe::new("probe", log.clone());
        probe.forward_up = true;
        stack.register(lonely, Box::new(probe)).expect("register");

        stack
            .inject_from_below(lonely, handle(), opaque(b"x"))
            .expect("inject");
        assert_eq!(log.lock().expect("log lock").len(), 1);
    }

    #[test]
    fn rebinding_either_side_is_rejected() {
        let mut stack = Stack::new();
        let a = stack.add_layer("a");
        let b = stack.add_layer("b");
        let c = stack.add_layer("c");
        stack.bind(a, b).expect("first bind");

        assert!(matches!(
            stack.bind(a, c).expect_err("a is taken"),
            StackError::AlreadyBound(id) if id == a
        ));
        assert!(matches!(
            stack.bind(c, b).expect_err("b is taken"),
            StackError::AlreadyBound(id) if id == b
        ));
        assert!(matches!(
            stack.bind(c, c).expect_err("self bind"),
            StackError::SelfBind(_)
        ));
    }

    #[test]
    fn unknown_layer_ids_are_rejected() {
        let mut stack = Stack::new();
        let ghost = LayerId(42);
        assert!(matches!(
            stack
                .inject_from_below(ghost, handle(), opaque(b"x"))
                .expect_err("no such layer"),
            StackError::UnknownLayer(_)
        ));
        assert!(matches!(
            stack
                .register(ghost, Box::new(Probe::new("p", Arc::default())))
                .expect_err("no such layer"),
            StackError::UnknownLayer(_)
        ));
    }

    #[test]
    fn kill_reaches_every_protocol_and_clears_the_arena() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = Stack::new();
        let link = stack.add_layer("link");
        let network = stack.add_layer("network");
        stack.bind(link, network).expect("bind");
        stack
            .register(link, Box::new(Probe::new("low", log.clone())))
            .expect("register");
        stack
            .register(network, Box::new(Probe::new("high", log.clone())))
            .expect("register");

        stack.kill();

        assert_eq!(
            *log.lock().expect("log lock"),
            vec!["low:kill".to_string(), "high:kill".to_string()]
        );
        assert!(matches!(
            stack
                .inject_from_below(link, handle(), opaque(b"x"))
                .expect_err("arena is cleared"),
            StackError::UnknownLayer(_)
        ));
    }
}
