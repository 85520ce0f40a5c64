//! UDP broadcast discovery server.
//!
//! The server binds a UDP socket on the discovery port (default 20400),
//! listens for `Discover` datagrams from other nodes, and keeps a
//! [`DeviceRegistry`] of every peer it hears.  It also *sends* Discover
//! datagrams to the subnet broadcast address so that other nodes learn about
//! this one.
//!
//! # How discovery works (for beginners)
//!
//! 1. On [`DiscoveryServer::start`] the node binds `0.0.0.0:<port>` and starts
//!    a receive loop.  One second later it broadcasts its own Discover
//!    message.
//!
//! 2. Every node listening on the port receives that datagram, including the
//!    sender itself: broadcast is looped back to the local host.  Seeing its
//!    own message proves the broadcast path works end to end, and the server
//!    records that as [`DiscoveryServer::last_discover_confirmed`].
//!
//! 3. A Discover from another node either refreshes its registry entry or
//!    creates one.  New entries arm the settle timer (see
//!    [`super::debounce`]).  When the burst of new peers has settled, the
//!    server broadcasts once more, so peers that missed us announce
//!    themselves, and then calls the `on_discover` callback.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ──start()──► Starting ──bound + receiver ready──► Running
//!    ▲                    │                                    │
//!    └────bind failed─────┘                                 stop()
//!    ▲                                                         │
//!    └──────────receiver acknowledged exit──── Stopping ◄──────┘
//! ```
//!
//! `start()` and `stop()` are serialized by an async lifecycle lock.
//! `start()` returns once the receive loop is live.  `stop()` returns once the
//! receive loop has dropped the socket and every in-flight datagram handler
//! has finished; no registry mutation happens after that.
//!
//! # Shared state
//!
//! The registry and the scalar status fields are behind `parking_lot`
//! mutexes that are held for one read or write at a time, never across an
//! `.await`.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use p2plocate_core::protocol::MAX_DATAGRAM_SIZE;
use p2plocate_core::{
    decode_message, encode_message, CodecError, Device, DeviceRegistry, Message, MessageKind,
    Observation,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::debounce::run_debounced;
use super::interfaces::{NetworkInfoProvider, SystemNetworkInfo};
use crate::infrastructure::identity::{FileIdentityProvider, IdentityProvider};

/// Default UDP port for discovery traffic.
pub const DEFAULT_DISCOVERY_PORT: u16 = 20400;

/// Delay between a successful start and the first self-announcement.
pub const DEFAULT_ANNOUNCE_DELAY: Duration = Duration::from_secs(1);

/// Quiet period that ends a burst of new-peer arrivals.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Error type for discovery server operations.
///
/// I/O sources are reference-counted so the same error can be returned to the
/// caller and cached in [`DiscoveryServer::last_error`].
#[derive(Debug, Clone, Error)]
pub enum ServerError {
    /// The receive socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    StartupFailure {
        addr: SocketAddr,
        #[source]
        source: Arc<std::io::Error>,
    },
    /// A Discover datagram could not be sent.
    #[error("failed to send discover message to {target}: {source}")]
    SendFailure {
        target: SocketAddr,
        #[source]
        source: Arc<std::io::Error>,
    },
    /// The outbound message could not be encoded.
    #[error("failed to encode discover message: {0}")]
    Encode(#[source] Arc<CodecError>),
    /// The receive loop hit a socket error.  Reception continues.
    #[error("discovery recv error: {0}")]
    Receive(#[source] Arc<std::io::Error>),
}

/// Lifecycle state of a [`DiscoveryServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Stopped => "stopped",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Construction parameters for a [`DiscoveryServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// UDP port to listen on and to send Discover datagrams to.
    pub port: u16,
    /// Identity to announce.  Resolved from the identity provider on first
    /// start when `None` or empty.
    pub client_id: Option<String>,
    /// Functions advertised in every Discover message.
    pub functions: Vec<String>,
    /// Destination for Discover datagrams.  Resolved from the network info
    /// provider on first use when `None`.
    pub broadcast_address: Option<Ipv4Addr>,
    /// Delay before the self-announcement that follows a start.
    pub announce_delay: Duration,
    /// Quiet period that ends a burst of new peers.
    pub debounce_window: Duration,
}

impl ServerConfig {
    /// Returns a config for `port` with every other field at its default.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_DISCOVERY_PORT,
            client_id: None,
            functions: Vec::new(),
            broadcast_address: None,
            announce_delay: DEFAULT_ANNOUNCE_DELAY,
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
        }
    }
}

/// Callback invoked after a burst of newly discovered peers has settled.
pub type DiscoverCallback = Arc<dyn Fn() + Send + Sync>;

// ── Shared state ──────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Status {
    state: ServerState,
    last_discover_sent_at: Option<SystemTime>,
    last_discover_confirmed: bool,
    last_error: Option<ServerError>,
}

/// State reachable from the server handle and from every background task.
struct Shared {
    port: u16,
    functions: Vec<String>,
    announce_delay: Duration,
    debounce_window: Duration,
    identity: Arc<dyn IdentityProvider>,
    network: Arc<dyn NetworkInfoProvider>,
    client_id: Mutex<Option<String>>,
    broadcast_address: Mutex<Option<Ipv4Addr>>,
    status: Mutex<Status>,
    registry: Mutex<DeviceRegistry>,
    on_discover: Mutex<Option<DiscoverCallback>>,
}

impl Shared {
    fn set_state(&self, state: ServerState) {
        self.status.lock().state = state;
    }

    fn record_error(&self, err: ServerError) {
        self.status.lock().last_error = Some(err);
    }

    /// Returns the client id, asking the identity provider only the first time.
    async fn resolve_client_id(&self) -> String {
        let cached = self.client_id.lock().clone();
        if let Some(id) = cached {
            return id;
        }

        let identity = Arc::clone(&self.identity);
        let resolved = match tokio::task::spawn_blocking(move || identity.client_id()).await {
            Ok(id) if !id.is_empty() => id,
            _ => {
                warn!("identity provider returned no client id; using an ephemeral one");
                Uuid::new_v4().to_string()
            }
        };
        self.client_id.lock().get_or_insert(resolved).clone()
    }

    /// Returns the broadcast address, asking the network provider only the first time.
    async fn resolve_broadcast_address(&self) -> Ipv4Addr {
        let cached = *self.broadcast_address.lock();
        if let Some(addr) = cached {
            return addr;
        }

        let network = Arc::clone(&self.network);
        let resolved = tokio::task::spawn_blocking(move || network.local_broadcast_address())
            .await
            .unwrap_or(Ipv4Addr::BROADCAST);
        *self.broadcast_address.lock().get_or_insert(resolved)
    }

    /// Sends one Discover datagram to `<broadcast>:<port>`.
    async fn discover(&self) -> Result<(), ServerError> {
        let client_id = self.resolve_client_id().await;
        let target = SocketAddr::from((self.resolve_broadcast_address().await, self.port));

        let msg = Message::discover(client_id, self.functions.clone());
        let bytes = encode_message(&msg).map_err(|e| ServerError::Encode(Arc::new(e)))?;

        let send_failure = |source: std::io::Error| ServerError::SendFailure {
            target,
            source: Arc::new(source),
        };
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(send_failure)?;
        socket.set_broadcast(true).map_err(send_failure)?;

        debug!("sending discover message to {target}");
        self.status.lock().last_discover_sent_at = Some(SystemTime::now());
        socket.send_to(&bytes, target).await.map_err(send_failure)?;
        Ok(())
    }

    /// Sends a Discover from a background task, where there is no caller to
    /// hand the error to.
    async fn discover_in_background(&self, reason: &str) {
        if let Err(e) = self.discover().await {
            warn!("{reason} discover failed: {e}");
            self.record_error(e);
        }
    }

    /// Runs when a burst of new peers has settled.
    ///
    /// A panicking callback is logged and contained so later bursts are
    /// still announced and reported.
    async fn settle(&self) {
        self.discover_in_background("post-settle").await;

        let callback = self.on_discover.lock().clone();
        if let Some(callback) = callback {
            if panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                error!("on_discover callback panicked");
            }
        }
    }

    /// Decodes and applies one inbound datagram.
    ///
    /// Sends on `arrivals` when a previously unknown peer was added.
    fn handle_datagram(&self, datagram: &[u8], src: SocketAddr, arrivals: &mpsc::UnboundedSender<()>) {
        let msg = match decode_message(datagram) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(
                    "dropping undecodable datagram from {src}: {e} ({})",
                    String::from_utf8_lossy(datagram)
                );
                return;
            }
        };

        match msg.kind {
            MessageKind::Discover => {
                debug!("discover message received from {} at {src}", msg.sender_id);

                let is_self = self.client_id.lock().as_deref() == Some(msg.sender_id.as_str());
                if is_self {
                    self.status.lock().last_discover_confirmed = true;
                    return;
                }

                let outcome = self.registry.lock().observe(
                    &msg.sender_id,
                    msg.functions,
                    src,
                    SystemTime::now(),
                );
                if outcome == Observation::Added {
                    info!("discovered new peer {} at {src}", msg.sender_id);
                    // The receiver only goes away while the server is stopping.
                    let _ = arrivals.send(());
                }
            }
            MessageKind::Unknown(tag) => {
                warn!(
                    "unknown message type {tag:?} received from {} at {src}",
                    msg.sender_id
                );
            }
        }
    }
}

// ── Background tasks ──────────────────────────────────────────────────────────

/// Handles to the tasks of one running session.
struct RunningTasks {
    cancel: watch::Sender<bool>,
    receiver: JoinHandle<()>,
    announcer: JoinHandle<()>,
    settler: JoinHandle<()>,
}

impl RunningTasks {
    /// Cancels every task and waits for each to finish.
    async fn shutdown(self) {
        let _ = self.cancel.send(true);
        self.announcer.abort();
        self.settler.abort();

        if let Err(e) = self.receiver.await {
            if e.is_panic() {
                error!("discovery receiver panicked: {e}");
            }
        }
        let _ = self.announcer.await;
        let _ = self.settler.await;
    }

    /// Cancels every task without waiting.
    fn abort(self) {
        let _ = self.cancel.send(true);
        self.receiver.abort();
        self.announcer.abort();
        self.settler.abort();
    }
}

/// The receive loop.  Owns the socket; dropping it on exit closes the socket.
async fn receive_loop(
    shared: Arc<Shared>,
    socket: UdpSocket,
    mut cancel: watch::Receiver<bool>,
    arrivals: mpsc::UnboundedSender<()>,
    ready: oneshot::Sender<()>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut handlers = JoinSet::new();
    let _ = ready.send(());

    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            Some(_) = handlers.join_next(), if !handlers.is_empty() => {}
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, src)) => {
                    let datagram = buf[..len].to_vec();
                    let shared = Arc::clone(&shared);
                    let arrivals = arrivals.clone();
                    handlers.spawn(async move {
                        shared.handle_datagram(&datagram, src, &arrivals);
                    });
                }
                Err(e) => {
                    error!("error whilst listening for messages: {e}");
                    shared.record_error(ServerError::Receive(Arc::new(e)));
                }
            },
        }
    }

    drop(socket);
    handlers.shutdown().await;
    info!("discovery receiver stopped");
}

// ── Public handle ─────────────────────────────────────────────────────────────

/// Discovers peers on the local network and tracks what they advertise.
///
/// # Example
///
/// ```rust,no_run
/// use p2plocate::{DiscoveryServer, ServerConfig};
///
/// # async fn run() -> Result<(), p2plocate::ServerError> {
/// let server = DiscoveryServer::new(ServerConfig {
///     functions: vec!["print".to_string()],
///     ..ServerConfig::new(20400)
/// });
/// server.on_discover(|| println!("new peers found"));
/// server.start().await?;
/// let printers = server.devices_for_function("print");
/// server.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct DiscoveryServer {
    shared: Arc<Shared>,
    lifecycle: tokio::sync::Mutex<Option<RunningTasks>>,
}

impl DiscoveryServer {
    /// Creates a server that persists its identity to `./clientid` and reads
    /// addressing from the host's interfaces.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_providers(
            config,
            Arc::new(FileIdentityProvider::default()),
            Arc::new(SystemNetworkInfo),
        )
    }

    /// Creates a server with explicit identity and network providers.
    pub fn with_providers(
        config: ServerConfig,
        identity: Arc<dyn IdentityProvider>,
        network: Arc<dyn NetworkInfoProvider>,
    ) -> Self {
        let shared = Shared {
            port: config.port,
            functions: config.functions,
            announce_delay: config.announce_delay,
            debounce_window: config.debounce_window,
            identity,
            network,
            client_id: Mutex::new(config.client_id.filter(|id| !id.is_empty())),
            broadcast_address: Mutex::new(config.broadcast_address),
            status: Mutex::new(Status {
                state: ServerState::Stopped,
                last_discover_sent_at: None,
                last_discover_confirmed: false,
                last_error: None,
            }),
            registry: Mutex::new(DeviceRegistry::new()),
            on_discover: Mutex::new(None),
        };
        Self {
            shared: Arc::new(shared),
            lifecycle: tokio::sync::Mutex::new(None),
        }
    }

    /// Starts listening for Discover messages.
    ///
    /// Returns once the receive loop is live.  Calling `start` on a running
    /// server does nothing and returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::StartupFailure`] if the socket cannot be bound.
    /// The server stays stopped and the error is also kept in
    /// [`last_error`](Self::last_error).
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            return Ok(());
        }

        {
            let mut status = self.shared.status.lock();
            status.state = ServerState::Starting;
            status.last_error = None;
        }

        let client_id = self.shared.resolve_client_id().await;
        let broadcast = self.shared.resolve_broadcast_address().await;

        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.shared.port));
        let socket = match UdpSocket::bind(bind_addr).await {
            Ok(socket) => socket,
            Err(source) => {
                let err = ServerError::StartupFailure {
                    addr: bind_addr,
                    source: Arc::new(source),
                };
                error!("{err}");
                let mut status = self.shared.status.lock();
                status.state = ServerState::Stopped;
                status.last_error = Some(err.clone());
                return Err(err);
            }
        };
        info!(
            "listening for device messages on UDP {bind_addr} as {client_id}, broadcasting to {broadcast}"
        );

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (arrivals_tx, arrivals_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let receiver = tokio::spawn(receive_loop(
            Arc::clone(&self.shared),
            socket,
            cancel_rx,
            arrivals_tx,
            ready_tx,
        ));
        if ready_rx.await.is_err() {
            // The receiver exited before signalling readiness; it owned the socket.
            let err = ServerError::StartupFailure {
                addr: bind_addr,
                source: Arc::new(std::io::Error::other("receive loop exited during startup")),
            };
            error!("{err}");
            let mut status = self.shared.status.lock();
            status.state = ServerState::Stopped;
            status.last_error = Some(err.clone());
            return Err(err);
        }

        let settler = {
            let shared = Arc::clone(&self.shared);
            let window = shared.debounce_window;
            tokio::spawn(async move {
                run_debounced(window, arrivals_rx, || shared.settle()).await;
            })
        };

        let announcer = {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                tokio::time::sleep(shared.announce_delay).await;
                shared.discover_in_background("self-announcement").await;
            })
        };

        *lifecycle = Some(RunningTasks {
            cancel: cancel_tx,
            receiver,
            announcer,
            settler,
        });
        self.shared.set_state(ServerState::Running);
        Ok(())
    }

    /// Stops listening and waits for the receive loop to exit.
    ///
    /// Does nothing if the server is not running.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(tasks) = lifecycle.take() else {
            return;
        };

        info!("stopped listening for device messages");
        self.shared.set_state(ServerState::Stopping);
        tasks.shutdown().await;
        self.shared.set_state(ServerState::Stopped);
    }

    /// Broadcasts a Discover message carrying this node's id and functions.
    ///
    /// Works whether or not the server is running.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::SendFailure`] or [`ServerError::Encode`].  The
    /// running state is not affected.
    pub async fn discover(&self) -> Result<(), ServerError> {
        self.shared.discover().await
    }

    /// Registers the callback fired after each settled burst of new peers.
    ///
    /// There is one slot; a later registration replaces the earlier one.
    /// The callback runs on the settle task.  If it panics, the panic is
    /// logged and the next burst still fires it.
    pub fn on_discover<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.shared.on_discover.lock() = Some(Arc::new(callback));
    }

    /// Returns the devices that advertise `function`, in first-seen order.
    pub fn devices_for_function(&self, function: &str) -> Vec<Device> {
        self.shared.registry.lock().devices_with_function(function)
    }

    /// Returns the device registered under `peer_id`.
    pub fn device(&self, peer_id: &str) -> Option<Device> {
        self.shared.registry.lock().get(peer_id).cloned()
    }

    /// Returns every known device, in first-seen order.
    pub fn devices(&self) -> Vec<Device> {
        self.shared.registry.lock().all()
    }

    pub fn state(&self) -> ServerState {
        self.shared.status.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    pub fn port(&self) -> u16 {
        self.shared.port
    }

    pub fn functions(&self) -> &[String] {
        &self.shared.functions
    }

    /// The announced client id, once configured or resolved.
    pub fn client_id(&self) -> Option<String> {
        self.shared.client_id.lock().clone()
    }

    /// The Discover destination, once configured or resolved.
    pub fn broadcast_address(&self) -> Option<Ipv4Addr> {
        *self.shared.broadcast_address.lock()
    }

    /// `true` once this server has received its own Discover broadcast.
    pub fn last_discover_confirmed(&self) -> bool {
        self.shared.status.lock().last_discover_confirmed
    }

    /// When the most recent Discover was sent.
    pub fn last_discover_sent_at(&self) -> Option<SystemTime> {
        self.shared.status.lock().last_discover_sent_at
    }

    /// The most recent startup or background error.  Cleared by each `start`.
    pub fn last_error(&self) -> Option<ServerError> {
        self.shared.status.lock().last_error.clone()
    }
}

impl Drop for DiscoveryServer {
    fn drop(&mut self) {
        if let Some(tasks) = self.lifecycle.get_mut().take() {
            tasks.abort();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
