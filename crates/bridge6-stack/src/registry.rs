//! Multi-client tunnel session registry.
//!
//! Accepts tunnel clients on a local socket and runs one read loop per
//! client. Decoded DATA frames go to the registered [`TunnelEvents`] sink;
//! ADD_IPV6_ADDRESS and SET_MTU frames mutate the client's session state in
//! place. Replies are routed back by [`ClientHandle`].

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tracing::{debug, error, info, warn};

use bridge6_transport::{PipeStream, UnixSocketListener};
use bridge6_wire::envelope::{self, TunnelFrame};
use bridge6_wire::BitCursor;

use crate::error::{Result, StackError};

/// Initial read-buffer size, until a client reconfigures it with SET_MTU.
pub const DEFAULT_MTU: usize = 2048;

/// Smallest MTU a client may set: a DATA envelope header plus one IPv6
/// header. Anything lower would starve its own read loop (a zero-length
/// buffer reads as EOF).
pub const MIN_MTU: usize = 45;

/// How long `stop` waits for the accept and read loops before detaching.
const STOP_GRACE: Duration = Duration::from_secs(3);

/// Opaque per-connection routing key, minted on accept.
///
/// Handles are never reused within a registry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientHandle(u64);

impl ClientHandle {
    /// A handle outside the accept-minted range, for traffic sources that
    /// are not real clients (loopback generators, tests).
    pub const fn synthetic(id: u64) -> Self {
        ClientHandle(id | 1 << 63)
    }
}

/// Sink for traffic and lifecycle events, called from read-loop threads.
pub trait TunnelEvents: Send + Sync + 'static {
    /// A DATA frame arrived from this client: tunnel flags, ethertype, and
    /// the raw network-layer frame bytes. Parsing is the receiver's job.
    fn on_data(&self, handle: ClientHandle, flags: u16, ethertype: u16, frame: Bytes);

    fn on_connect(&self, handle: ClientHandle) {
        let _ = handle;
    }

    fn on_disconnect(&self, handle: ClientHandle) {
        let _ = handle;
    }
}

/// Per-client state. The write half lives behind its own lock so replies
/// from any thread serialize cleanly; the read half is owned by the
/// client's read loop.
struct ClientSession {
    writer: Mutex<Option<PipeStream>>,
    mtu: AtomicUsize,
    addresses: Mutex<Vec<Ipv6Addr>>,
}

impl ClientSession {
    fn new(writer: PipeStream) -> Self {
        Self {
            writer: Mutex::new(Some(writer)),
            mtu: AtomicUsize::new(DEFAULT_MTU),
            addresses: Mutex::new(Vec::new()),
        }
    }
}

struct RegistryInner {
    path: PathBuf,
    running: AtomicBool,
    next_id: AtomicU64,
    sessions: Mutex<HashMap<ClientHandle, Arc<ClientSession>>>,
    readers: Mutex<Vec<JoinHandle<()>>>,
    events: Arc<dyn TunnelEvents>,
}

/// Accepts tunnel clients and owns their sessions.
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
}

// Lock helper: a poisoned lock means a read loop panicked mid-update; the
// session data itself stays usable, so keep going rather than cascade.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionRegistry {
    /// Bind the socket and start accepting clients in a background thread.
    pub fn bind(path: impl AsRef<Path>, events: Arc<dyn TunnelEvents>) -> Result<Self> {
        let listener = UnixSocketListener::bind(&path)?;
        info!(path = %listener.path().display(), "session registry listening");

        let inner = Arc::new(RegistryInner {
            path: listener.path().to_path_buf(),
            running: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
            readers: Mutex::new(Vec::new()),
            events,
        });

        let accept_inner = Arc::clone(&inner);
        let accept_thread = thread::Builder::new()
            .name("bridge6-accept".into())
            .spawn(move || accept_loop(listener, accept_inner))?;

        Ok(Self {
            inner,
            accept_thread: Mutex::new(Some(accept_thread)),
        })
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        lock(&self.inner.sessions).len()
    }

    /// Current read-buffer size for a client, if still connected.
    pub fn mtu(&self, handle: ClientHandle) -> Option<usize> {
        lock(&self.inner.sessions)
            .get(&handle)
            .map(|s| s.mtu.load(Ordering::Relaxed))
    }

    /// Addresses the client has announced, in arrival order.
    pub fn addresses(&self, handle: ClientHandle) -> Option<Vec<Ipv6Addr>> {
        lock(&self.inner.sessions)
            .get(&handle)
            .map(|s| lock(&s.addresses).clone())
    }

    /// Serialize a tunnel frame and write it to one client.
    pub fn send_to(&self, handle: ClientHandle, frame: &TunnelFrame) -> Result<()> {
        let session = lock(&self.inner.sessions)
            .get(&handle)
            .cloned()
            .ok_or(StackError::Disconnected(handle))?;

        let mut wire = BytesMut::new();
        envelope::encode(frame, &mut wire);

        let mut writer = lock(&session.writer);
        match writer.as_mut() {
            Some(stream) => {
                stream.write_all(&wire)?;
                stream.flush()?;
                Ok(())
            }
            None => Err(StackError::Disconnected(handle)),
        }
    }

    /// Convenience wrapper for the common reply path.
    pub fn send_data(
        &self,
        handle: ClientHandle,
        flags: u16,
        ethertype: u16,
        frame: Bytes,
    ) -> Result<()> {
        self.send_to(
            handle,
            &TunnelFrame::Data {
                flags,
                ethertype,
                frame,
            },
        )
    }

    /// Stop accepting, disconnect all clients, and join the loops.
    ///
    /// Each loop gets a bounded grace period; a loop that does not finish in
    /// time is detached with a warning rather than blocking shutdown.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(path = %self.inner.path.display(), "session registry stopping");

        // The accept loop blocks in accept(); a throwaway connection to our
        // own socket wakes it so it can observe the flag.
        if let Err(err) = UnixSocketListener::connect(&self.inner.path) {
            debug!(%err, "accept wake connect failed");
        }

        // Shut down every client socket so blocked reads return.
        let sessions: Vec<Arc<ClientSession>> =
            lock(&self.inner.sessions).values().cloned().collect();
        for session in sessions {
            if let Some(stream) = lock(&session.writer).take() {
                if let Err(err) = stream.shutdown() {
                    debug!(%err, "client shutdown during stop");
                }
            }
        }

        if let Some(handle) = lock(&self.accept_thread).take() {
            join_with_grace(handle, STOP_GRACE, "accept loop");
        }
        let readers: Vec<JoinHandle<()>> = lock(&self.inner.readers).drain(..).collect();
        for handle in readers {
            join_with_grace(handle, STOP_GRACE, "client read loop");
        }
        lock(&self.inner.sessions).clear();
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_with_grace(handle: JoinHandle<()>, grace: Duration, name: &str) {
    let deadline = Instant::now() + grace;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(thread = name, "did not finish within grace period, detaching");
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    if handle.join().is_err() {
        error!(thread = name, "thread panicked");
    }
}

fn accept_loop(listener: UnixSocketListener, inner: Arc<RegistryInner>) {
    while inner.running.load(Ordering::SeqCst) {
        let stream = match listener.accept() {
            Ok(stream) => stream,
            Err(err) => {
                if inner.running.load(Ordering::SeqCst) {
                    error!(%err, "accept failed");
                }
                continue;
            }
        };
        if !inner.running.load(Ordering::SeqCst) {
            break;
        }

        let handle = ClientHandle(inner.next_id.fetch_add(1, Ordering::Relaxed));
        if let Some((uid, gid, pid)) = stream.peer_credentials() {
            debug!(?handle, uid, gid, pid, "client connected");
        } else {
            debug!(?handle, "client connected");
        }

        let writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(err) => {
                error!(?handle, %err, "could not clone client stream, dropping client");
                continue;
            }
        };
        let session = Arc::new(ClientSession::new(writer));
        lock(&inner.sessions).insert(handle, Arc::clone(&session));
        inner.events.on_connect(handle);

        let reader_inner = Arc::clone(&inner);
        let spawned = thread::Builder::new()
            .name(format!("bridge6-client-{}", handle.0))
            .spawn(move || read_loop(reader_inner, handle, stream, session));
        match spawned {
            Ok(join) => lock(&inner.readers).push(join),
            Err(err) => {
                error!(?handle, %err, "could not spawn read loop, dropping client");
                remove_session(&inner, handle);
            }
        }
    }
    debug!("accept loop finished");
}

fn read_loop(
    inner: Arc<RegistryInner>,
    handle: ClientHandle,
    mut stream: PipeStream,
    session: Arc<ClientSession>,
) {
    loop {
        // Allocated fresh each pass so a SET_MTU from the previous read
        // takes effect on the next one.
        let mut buf = vec![0u8; session.mtu.load(Ordering::Relaxed)];
        let read = match stream.read(&mut buf) {
            Ok(0) => {
                debug!(?handle, "client closed the tunnel");
                break;
            }
            Ok(read) => read,
            Err(err) => {
                if inner.running.load(Ordering::SeqCst) {
                    warn!(?handle, %err, "client read failed");
                }
                break;
            }
        };

        let mut cur = BitCursor::new(&buf[..read]);
        for frame in envelope::decode_all(&mut cur) {
            match frame {
                TunnelFrame::Data {
                    flags,
                    ethertype,
                    frame,
                } => inner.events.on_data(handle, flags, ethertype, frame),
                TunnelFrame::AddAddress(address) => {
                    info!(?handle, %address, "client announced address");
                    lock(&session.addresses).push(address);
                }
                TunnelFrame::SetMtu(mtu) => {
                    let mtu = mtu as usize;
                    if mtu < MIN_MTU {
                        warn!(?handle, mtu, min = MIN_MTU, "ignoring mtu below minimum");
                    } else {
                        info!(?handle, mtu, "client set mtu");
                        session.mtu.store(mtu, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    if let Some(writer) = lock(&session.writer).take() {
        if let Err(err) = writer.shutdown() {
            debug!(?handle, %err, "shutdown after read loop");
        }
    }
    remove_session(&inner, handle);
}

fn remove_session(inner: &RegistryInner, handle: ClientHandle) {
    if lock(&inner.sessions).remove(&handle).is_some() {
        inner.events.on_disconnect(handle);
        debug!(?handle, "session removed");
    }
}
