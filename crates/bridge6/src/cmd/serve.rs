use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use bridge6_stack::handlers::{
    Heartbeat, HexLogger, Icmpv6EchoResponder, Relay, UdpEchoResponder,
};
use bridge6_stack::{ClientHandle, LayerId, SessionRegistry, Stack, TunnelEvents};
use bridge6_wire::{BitCursor, Ipv6Packet, Packet};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{stack_error, CliError, CliResult, SUCCESS};

const ETHERTYPE_IPV6: u16 = 0x86DD;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Feeds decoded client traffic into the bottom of the stack.
struct Ingress {
    stack: Arc<Mutex<Stack>>,
    link: LayerId,
}

impl TunnelEvents for Ingress {
    fn on_data(&self, handle: ClientHandle, flags: u16, ethertype: u16, frame: Bytes) {
        let mut cur = BitCursor::new(&frame);
        let packet = match Ipv6Packet::deserialize(&mut cur) {
            Ok(packet) => Packet::Ipv6(packet),
            Err(err) => {
                warn!(?handle, flags, ethertype, %err, "undecodable frame dropped");
                return;
            }
        };
        if let Err(err) = lock(&self.stack).inject_from_below(self.link, handle, packet) {
            warn!(?handle, %err, "ingress rejected");
        }
    }

    fn on_connect(&self, handle: ClientHandle) {
        info!(?handle, "tunnel client connected");
    }

    fn on_disconnect(&self, handle: ClientHandle) {
        info!(?handle, "tunnel client disconnected");
    }
}

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let heartbeat_interval = args
        .heartbeat
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    let stack = Arc::new(Mutex::new(Stack::new()));
    let link = {
        let mut guard = lock(&stack);
        let link = guard.add_layer("link");
        let network = guard.add_layer("network");
        guard
            .bind(link, network)
            .map_err(|err| stack_error("stack wiring failed", err))?;
        guard
            .register(link, Box::new(Relay))
            .map_err(|err| stack_error("stack wiring failed", err))?;
        if !args.quiet_traffic {
            guard
                .register(network, Box::new(HexLogger))
                .map_err(|err| stack_error("stack wiring failed", err))?;
        }
        guard
            .register(network, Box::new(Icmpv6EchoResponder))
            .map_err(|err| stack_error("stack wiring failed", err))?;
        guard
            .register(network, Box::new(UdpEchoResponder::new(args.udp_echo_port)))
            .map_err(|err| stack_error("stack wiring failed", err))?;
        link
    };

    let ingress = Arc::new(Ingress {
        stack: Arc::clone(&stack),
        link,
    });
    let registry = Arc::new(
        SessionRegistry::bind(&args.path, ingress)
            .map_err(|err| stack_error("bind failed", err))?,
    );

    let egress_registry = Arc::clone(&registry);
    lock(&stack).set_egress(Box::new(move |handle, mut packet| {
        match packet.serialize(None) {
            Ok(wire) => {
                if let Err(err) = egress_registry.send_data(handle, 0, ETHERTYPE_IPV6, wire) {
                    // Synthetic handles have no session; real ones may have
                    // just disconnected. Neither is fatal.
                    debug!(?handle, %err, "egress frame dropped");
                }
            }
            Err(err) => warn!(?handle, %err, "unserializable egress packet dropped"),
        }
    }));

    let heartbeat = heartbeat_interval
        .map(|interval| Heartbeat::spawn(Arc::clone(&stack), link, interval))
        .transpose()
        .map_err(|err| stack_error("heartbeat setup failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;
    info!(
        path = %registry.path().display(),
        udp_echo_port = args.udp_echo_port,
        "bridge running"
    );

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    info!("shutting down");
    if let Some(heartbeat) = heartbeat {
        heartbeat.stop();
    }
    registry.stop();
    lock(&stack).kill();

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use bridge6_stack::{Protocol, ProtocolContext};

    use super::*;

    struct Probe {
        seen: Arc<Mutex<Vec<Packet>>>,
    }

    impl Protocol for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn on_receive_from_below(
            &mut self,
            _handle: ClientHandle,
            packet: &Packet,
            _ctx: &mut ProtocolContext,
        ) {
            self.seen.lock().expect("seen lock").push(packet.clone());
        }
    }

    #[test]
    fn ingress_parses_and_injects_ipv6_frames() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stack = Arc::new(Mutex::new(Stack::new()));
        let link = {
            let mut guard = stack.lock().expect("stack lock");
            let link = guard.add_layer("link");
            guard
                .register(link, Box::new(Probe { seen: seen.clone() }))
                .expect("register");
            link
        };
        let ingress = Ingress {
            stack: stack.clone(),
            link,
        };

        let mut source = Packet::Ipv6(Ipv6Packet {
            hop_limit: 1,
            source: "fc00::1".parse().expect("address"),
            destination: "fc00::2".parse().expect("address"),
            payload: Box::new(Packet::Opaque(Bytes::from_static(b"hi"))),
            ..Ipv6Packet::default()
        });
        let wire = source.serialize(None).expect("serialize");
        let handle = ClientHandle::synthetic(9);

        ingress.on_data(handle, 0, ETHERTYPE_IPV6, wire);
        assert_eq!(seen.lock().expect("seen lock").len(), 1);

        // Garbage frames are dropped without reaching the stack.
        ingress.on_data(handle, 0, ETHERTYPE_IPV6, Bytes::from_static(b"\x00garbage"));
        assert_eq!(seen.lock().expect("seen lock").len(), 1);
    }
}
