//! Synthetic loopback traffic generator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, warn};

use bridge6_wire::{EchoMessage, Icmpv6Body, Icmpv6Packet, Ipv6Packet, Packet, ICMPV6_ECHO_REQUEST};

use crate::error::Result;
use crate::layer::{LayerId, Stack};
use crate::registry::{lock, ClientHandle};

/// Periodically injects a loopback echo request upward from a synthetic
/// handle. Exercises the upward path of a stack without a real client;
/// the bundled echo responder turns each beat into a downward reply.
pub struct Heartbeat {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Handle the beats are attributed to. Outside the accept-minted range,
    /// so it can never collide with a real client.
    pub const HANDLE: ClientHandle = ClientHandle::synthetic(0);

    /// Start beating into `layer` every `interval`.
    pub fn spawn(stack: Arc<Mutex<Stack>>, layer: LayerId, interval: Duration) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("bridge6-heartbeat".into())
            .spawn(move || {
                let mut sequence: u16 = 0;
                while flag.load(Ordering::SeqCst) {
                    let deadline = Instant::now() + interval;
                    while flag.load(Ordering::SeqCst) && Instant::now() < deadline {
                        thread::sleep(Duration::from_millis(10).min(interval));
                    }
                    if !flag.load(Ordering::SeqCst) {
                        break;
                    }
                    let packet = beat(sequence);
                    sequence = sequence.wrapping_add(1);
                    if let Err(err) =
                        lock(&stack).inject_from_below(layer, Self::HANDLE, packet)
                    {
                        warn!(%err, "heartbeat injection failed, stopping");
                        break;
                    }
                    debug!(sequence, "heartbeat");
                }
            })?;
        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    /// Stop the generator and wait for its thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("heartbeat thread panicked");
            }
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn beat(sequence: u16) -> Packet {
    Packet::Ipv6(Ipv6Packet {
        hop_limit: 64,
        source: std::net::Ipv6Addr::LOCALHOST,
        destination: std::net::Ipv6Addr::LOCALHOST,
        payload: Box::new(Packet::Icmpv6(Icmpv6Packet {
            icmp_type: ICMPV6_ECHO_REQUEST,
            code: 0,
            checksum: 0,
            body: Icmpv6Body::EchoRequest(EchoMessage {
                identifier: 0,
                sequence,
                data: Bytes::from_static(b"heartbeat"),
            }),
        })),
        ..Ipv6Packet::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{Protocol, ProtocolContext};

    struct Counter {
        seen: Arc<Mutex<Vec<u16>>>,
    }

    impl Protocol for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn on_receive_from_below(
            &mut self,
            handle: ClientHandle,
            packet: &Packet,
            _ctx: &mut ProtocolContext,
        ) {
            assert_eq!(handle, Heartbeat::HANDLE);
            let Packet::Ipv6(ip) = packet else {
                panic!("beats are IPv6");
            };
            let Packet::Icmpv6(icmp) = ip.payload.as_ref() else {
                panic!("beats are ICMPv6");
            };
            let Icmpv6Body::EchoRequest(echo) = &icmp.body else {
                panic!("beats are echo requests");
            };
            self.seen.lock().expect("seen lock").push(echo.sequence);
        }
    }

    #[test]
    fn beats_arrive_with_increasing_sequence() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stack = Arc::new(Mutex::new(Stack::new()));
        let layer = {
            let mut stack = stack.lock().expect("stack lock");
            let layer = stack.add_layer("link");
            stack
                .register(layer, Box::new(Counter { seen: seen.clone() }))
                .expect("register");
            layer
        };

        let heartbeat = Heartbeat::spawn(stack, layer, Duration::from_millis(10))
            .expect("heartbeat should spawn");
        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.lock().expect("seen lock").len() < 3 {
            assert!(Instant::now() < deadline, "timed out waiting for beats");
            thread::sleep(Duration::from_millis(5));
        }
        heartbeat.stop();

        let seen = seen.lock().expect("seen lock");
        assert!(seen.windows(2).all(|w| w[1] == w[0].wrapping_add(1)));
    }
}
