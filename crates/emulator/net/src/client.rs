//! Remote controller synchronization
//!
//! The client connects to a controller over HTTP and polls it for queued
//! command payloads:
//!
//! - `GET /` returns the next queued payload, or an empty body
//! - `DELETE /` drops the head of the queue once it has been applied
//! - `POST /STATUS` receives `{"status": "<STATUS>"}` on every status change
//!
//! Delivery is at-least-once. If the `DELETE` is lost the controller serves the
//! same payload again, and applying it again is harmless. Conversely, when
//! local state changes after a payload was applied, the last payload is applied
//! once more so the controller's intent is restored.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nfcemu_core::{CommandRouter, Emulator, Origin, Outcome, Status};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{Error, Result, ResultExt};

/// Bound on establishing the controller connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on each HTTP exchange with the controller
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Shortest polling interval
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Connection lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session
    #[default]
    Disconnected,
    /// Connect in progress
    Connecting,
    /// Session established
    Connected,
    /// Last connect attempt failed
    Failed,
}

/// Precondition checked before connecting
pub trait Reachability: Send + Sync + std::fmt::Debug {
    /// Whether `host:port` is reachable through some local network
    ///
    /// Called on a blocking thread.
    fn is_available(&self, host: &str, port: u16) -> bool;
}

/// Reachability check that succeeds when the OS has a route to the controller
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteReachability;

impl Reachability for RouteReachability {
    fn is_available(&self, host: &str, port: u16) -> bool {
        let Some(target) = (host, port).to_socket_addrs().ok().and_then(|mut a| a.next()) else {
            return false;
        };
        let local = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        // connecting a UDP socket only consults the routing table
        UdpSocket::bind(local).and_then(|socket| socket.connect(target)).is_ok()
    }
}

/// Outcome of one polling cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A fresh payload was applied
    Applied,
    /// The last payload was applied again after a local change
    Replayed,
    /// Nothing to do
    Idle,
    /// The controller could not be reached
    Failed,
}

/// State carried between polling cycles
#[derive(Debug)]
pub struct Poller {
    emulator: Emulator,
    router: CommandRouter,
    http: reqwest::Client,
    base: Url,
    last_body: Option<String>,
    last_version: u64,
}

impl Poller {
    /// Create a poller for the controller at `base`
    pub fn new(emulator: Emulator, http: reqwest::Client, base: Url) -> Self {
        Self {
            router: emulator.router(),
            last_version: emulator.clock().current(),
            emulator,
            http,
            base,
            last_body: None,
        }
    }

    /// Run one cycle: fetch, apply or replay, acknowledge
    #[instrument(level = "debug", skip(self), fields(base = %self.base))]
    pub async fn cycle(&mut self) -> CycleOutcome {
        let body = match self.fetch().await {
            Ok(body) => body,
            Err(e) => {
                warn!(%e, "Polling the controller failed");
                self.note(format!("STATE-EXT: GET Error ({e})."), Outcome::Failure);
                return CycleOutcome::Failed;
            }
        };

        if !body.trim().is_empty() {
            let outcome = self.router.apply(&body);
            if !outcome.log_cleared {
                self.note(format!("GET RESP: {body}"), Outcome::from(outcome.applied));
            }
            self.last_version = self.emulator.clock().current();
            self.last_body = Some(body);
            self.acknowledge().await;
            return CycleOutcome::Applied;
        }

        let version = self.emulator.clock().current();
        match &self.last_body {
            Some(body) if version != self.last_version => {
                debug!(version, last = self.last_version, "Local state changed, replaying last command");
                self.router.apply(body);
                self.last_version = self.emulator.clock().current();
                CycleOutcome::Replayed
            }
            _ => CycleOutcome::Idle,
        }
    }

    async fn fetch(&self) -> Result<String> {
        let response = self
            .http
            .get(self.base.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context("GET /")?;
        response.text().await.context("reading controller response")
    }

    async fn acknowledge(&self) {
        let result = async {
            self.http
                .delete(self.base.clone())
                .send()
                .await?
                .error_for_status()?;
            Ok::<_, Error>(())
        }
        .await;
        if let Err(e) = result {
            warn!(%e, "Clearing the controller queue failed");
            self.note(format!("STATE-EXT: DELETE Error ({e})."), Outcome::Failure);
        }
    }

    fn note(&self, message: String, outcome: Outcome) {
        self.emulator.log().append(&message, Origin::Server, outcome);
    }
}

#[derive(Debug)]
struct Session {
    address: String,
    port: u16,
    base: Url,
    _socket: TcpStream,
    shutdown: CancellationToken,
    poller: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Shared {
    emulator: Emulator,
    reachability: Arc<dyn Reachability>,
    http: reqwest::Client,
    in_flight: AtomicBool,
    session: Mutex<Option<Session>>,
    state: watch::Sender<ConnectionState>,
}

/// Clears the in-flight flag when dropped
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Client synchronizing the emulator with a remote controller
///
/// Clones share the same session.
#[derive(Debug, Clone)]
pub struct RemoteSyncClient {
    shared: Arc<Shared>,
}

impl RemoteSyncClient {
    /// Create a disconnected client using [`RouteReachability`]
    pub fn new(emulator: Emulator) -> Result<Self> {
        Self::with_reachability(emulator, Arc::new(RouteReachability))
    }

    /// Create a disconnected client with a custom reachability check
    pub fn with_reachability(emulator: Emulator, reachability: Arc<dyn Reachability>) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            shared: Arc::new(Shared {
                emulator,
                reachability,
                http,
                in_flight: AtomicBool::new(false),
                session: Mutex::new(None),
                state,
            }),
        })
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receive connection state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Connect to the controller at `address:port`
    ///
    /// Polling starts when `interval_ms` is positive; shorter intervals than
    /// [`MIN_POLL_INTERVAL`] are raised to it. Does nothing while another
    /// connect or disconnect is in flight.
    pub async fn connect(&self, address: &str, port: u16, interval_ms: u64) -> ConnectionState {
        let Some(_guard) = InFlight::acquire(&self.shared.in_flight) else {
            debug!("Connect ignored, operation in flight");
            return self.state();
        };
        if let Some(previous) = self.shared.session.lock().take() {
            debug!(address = %previous.address, "Replacing existing session");
            previous.shutdown.cancel();
        }

        self.set_state(ConnectionState::Connecting);
        let target = format!("{address}:{port}");

        let reachability = self.shared.reachability.clone();
        let host = address.to_string();
        let available = tokio::task::spawn_blocking(move || reachability.is_available(&host, port))
            .await
            .unwrap_or(false);
        if !available {
            warn!(%target, "Network unavailable");
            self.note(format!("STATE-EXT: Server Connection {target} Failed."), Outcome::Failure);
            self.set_state(ConnectionState::Disconnected);
            return ConnectionState::Disconnected;
        }

        match self.establish(address, port).await {
            Ok((base, socket)) => {
                let shutdown = CancellationToken::new();
                let poller = (interval_ms > 0).then(|| {
                    let interval = Duration::from_millis(interval_ms).max(MIN_POLL_INTERVAL);
                    let poller = Poller::new(
                        self.shared.emulator.clone(),
                        self.shared.http.clone(),
                        base.clone(),
                    );
                    tokio::spawn(poll_loop(poller, interval, shutdown.clone()))
                });
                *self.shared.session.lock() = Some(Session {
                    address: address.to_string(),
                    port,
                    base,
                    _socket: socket,
                    shutdown,
                    poller,
                });
                info!(%target, "Connected to controller");
                self.note(format!("STATE-EXT: Server Connection {target} Success."), Outcome::Success);
                self.set_state(ConnectionState::Connected);
                ConnectionState::Connected
            }
            Err(e) => {
                warn!(%target, %e, "Connecting to controller failed");
                let message = match e {
                    Error::Io(_) | Error::Timeout(_) => {
                        format!("STATE-EXT: Server Connection {target} Failed.")
                    }
                    other => format!("STATE-EXT: Server Connection {target} Error ({other})."),
                };
                self.note(message, Outcome::Failure);
                self.set_state(ConnectionState::Failed);
                ConnectionState::Failed
            }
        }
    }

    async fn establish(&self, address: &str, port: u16) -> Result<(Url, TcpStream)> {
        let base = Url::parse(&format!("http://{address}:{port}/"))?;
        let socket = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((address, port)))
            .await
            .map_err(|_| Error::Timeout(CONNECT_TIMEOUT))??;
        Ok((base, socket))
    }

    /// Drop the session, returning the address it was connected to
    ///
    /// Does nothing while another connect or disconnect is in flight.
    pub async fn disconnect(&self) -> Option<String> {
        let Some(_guard) = InFlight::acquire(&self.shared.in_flight) else {
            debug!("Disconnect ignored, operation in flight");
            return None;
        };
        let session = self.shared.session.lock().take();
        let previous = match session {
            Some(mut session) => {
                session.shutdown.cancel();
                if let Some(poller) = session.poller.take()
                    && let Err(e) = poller.await
                    && !e.is_cancelled()
                {
                    warn!(%e, "Polling task panicked");
                }
                Some(format!("{}:{}", session.address, session.port))
            }
            None => None,
        };

        self.set_state(ConnectionState::Disconnected);
        let message = match &previous {
            Some(target) => format!("STATE-EXT: Server Connection {target} Disconnected."),
            None => "STATE-EXT: Server Connection Disconnected.".to_string(),
        };
        info!(previous = ?previous, "Disconnected from controller");
        self.note(message, Outcome::Failure);
        previous
    }

    /// Report `status` to the controller without waiting for the result
    ///
    /// Returns `false` when there is no connected session to report to.
    pub fn post_status(&self, status: Status) -> bool {
        if self.state() != ConnectionState::Connected {
            return false;
        }
        let Some(url) = self
            .shared
            .session
            .lock()
            .as_ref()
            .and_then(|session| session.base.join("STATUS").ok())
        else {
            return false;
        };

        let shared = self.shared.clone();
        tokio::spawn(async move {
            let body = serde_json::json!({ "status": status.to_string() });
            let result = async {
                shared.http.post(url).json(&body).send().await?.error_for_status()?;
                Ok::<_, Error>(())
            }
            .await;
            if let Err(e) = result {
                warn!(%e, %status, "Posting status failed");
                shared.emulator.log().append(
                    &format!("STATE-EXT: POST Error ({e})."),
                    Origin::Server,
                    Outcome::Failure,
                );
            }
        });
        true
    }

    /// Forward every status change to the controller until the emulator is gone
    pub fn forward_status(&self) -> JoinHandle<()> {
        let client = self.clone();
        let mut changes = self.shared.emulator.status().subscribe();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let status = *changes.borrow_and_update();
                client.post_status(status);
            }
        })
    }

    fn set_state(&self, state: ConnectionState) {
        self.shared.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    fn note(&self, message: String, outcome: Outcome) {
        self.shared.emulator.log().append(&message, Origin::Server, outcome);
    }
}

async fn poll_loop(mut poller: Poller, interval: Duration, shutdown: CancellationToken) {
    debug!(?interval, "Polling started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            outcome = poller.cycle() => debug!(?outcome, "Polling cycle done"),
        }
        tokio::select! {
            _ = shutdown.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }
    debug!("Polling stopped");
}
