//! Local command server
//!
//! A raw TCP listener for controllers on the same network. Each connection
//! carries one request:
//!
//! - `GET /STATUS` answers the current emulator status
//! - `POST <any path>` applies the body as a command payload and answers `OK`
//! - anything else closes the connection without a response

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use nfcemu_core::{CommandRouter, Emulator, Origin, Outcome};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::http::{self, Limits, Method};

/// How long a connection may take to deliver its request
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of the local server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerState {
    /// Not listening
    Stopped,
    /// Listening on `port`
    Running {
        /// Bound port
        port: u16,
    },
    /// Binding failed; stays here until the next start
    Error(String),
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    connections: HashMap<u64, (SocketAddr, AbortHandle)>,
}

#[derive(Debug)]
struct Inner {
    state: ServerState,
    shutdown: Option<CancellationToken>,
    accept: Option<JoinHandle<()>>,
}

/// Listener applying payloads posted by local controllers
#[derive(Debug, Clone)]
pub struct LocalCommandServer {
    emulator: Emulator,
    limits: Limits,
    inner: Arc<Mutex<Inner>>,
    registry: Arc<Mutex<Registry>>,
}

impl LocalCommandServer {
    /// Create a stopped server for `emulator`
    pub fn new(emulator: Emulator) -> Self {
        Self {
            emulator,
            limits: Limits::default(),
            inner: Arc::new(Mutex::new(Inner {
                state: ServerState::Stopped,
                shutdown: None,
                accept: None,
            })),
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Override the request size bounds
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Current state
    pub fn state(&self) -> ServerState {
        self.inner.lock().state.clone()
    }

    /// Peers with an open connection
    pub fn connected_devices(&self) -> Vec<SocketAddr> {
        self.registry
            .lock()
            .connections
            .values()
            .map(|(addr, _)| *addr)
            .collect()
    }

    /// Start listening on `port` (0 picks a free port)
    ///
    /// Starting a running server is a no-op returning its port. A bind failure
    /// moves the server to [`ServerState::Error`] without retrying.
    pub async fn start(&self, port: u16) -> Result<u16> {
        if let ServerState::Running { port } = self.state() {
            return Ok(port);
        }

        let listener = match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => listener,
            Err(e) => return Err(self.bind_failed(e)),
        };
        let port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => return Err(self.bind_failed(e)),
        };

        let shutdown = CancellationToken::new();
        {
            let mut inner = self.inner.lock();
            if let ServerState::Running { port } = inner.state {
                // lost a race with a concurrent start
                return Ok(port);
            }
            inner.state = ServerState::Running { port };
            inner.shutdown = Some(shutdown.clone());
            inner.accept = Some(tokio::spawn(self.clone().accept_loop(listener, shutdown)));
        }
        info!(port, "Local command server started");
        self.note(format!("STATE-INT: Server started on port {port}."), Outcome::Success);
        Ok(port)
    }

    /// Stop listening and close every open connection
    ///
    /// Safe to call repeatedly and before [`Self::start`]. The port is released
    /// when this returns.
    pub async fn stop(&self) {
        let (shutdown, accept) = {
            let mut inner = self.inner.lock();
            let shutdown = inner.shutdown.take();
            if shutdown.is_some() || matches!(inner.state, ServerState::Error(_)) {
                inner.state = ServerState::Stopped;
            }
            (shutdown, inner.accept.take())
        };
        let Some(shutdown) = shutdown else {
            return;
        };

        shutdown.cancel();
        if let Some(accept) = accept
            && let Err(e) = accept.await
        {
            warn!(%e, "Accept loop panicked");
        }
        let connections: Vec<_> = self.registry.lock().connections.drain().collect();
        for (_, (addr, handle)) in connections {
            debug!(%addr, "Closing connection");
            handle.abort();
            self.note(format!("STATE-INT: Device disconnected {addr}."), Outcome::Failure);
        }
        info!("Local command server stopped");
        self.note("STATE-INT: Server stopped.".to_string(), Outcome::Failure);
    }

    fn bind_failed(&self, e: std::io::Error) -> Error {
        warn!(%e, "Local command server failed to start");
        self.inner.lock().state = ServerState::Error(e.to_string());
        self.emulator.status().set_error();
        self.note(format!("STATE-INT: Server start error ({e})."), Outcome::Failure);
        Error::Io(e)
    }

    async fn accept_loop(self, listener: TcpListener, shutdown: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, addr)) => self.spawn_connection(stream, addr),
                Err(e) => warn!(%e, "Accept failed"),
            }
        }
        debug!("Accept loop finished");
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        self.note(format!("STATE-INT: Device connected {addr}."), Outcome::Success);
        let server = self.clone();
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        let task = tokio::spawn(async move {
            if let Err(e) = server.serve(stream).await {
                debug!(%addr, %e, "Connection ended with error");
            }
            // `stop` logs the disconnect for entries it drains
            let registered = server.registry.lock().connections.remove(&id).is_some();
            if registered {
                server.note(format!("STATE-INT: Device disconnected {addr}."), Outcome::Failure);
            }
        });
        registry.connections.insert(id, (addr, task.abort_handle()));
    }

    #[instrument(level = "debug", skip_all, err)]
    async fn serve(&self, mut stream: TcpStream) -> Result<()> {
        let request = tokio::time::timeout(READ_TIMEOUT, http::read_request(&mut stream, &self.limits))
            .await
            .map_err(|_| Error::Timeout(READ_TIMEOUT))??;

        match request.method {
            Method::Get if request.path.eq_ignore_ascii_case("/STATUS") => {
                let status = self.emulator.status().current().to_string();
                http::write_response(&mut stream, 200, "OK", status.as_bytes()).await
            }
            Method::Post => {
                if !request.body.is_empty() {
                    let payload = String::from_utf8_lossy(&request.body);
                    apply_posted(&self.emulator.router(), &self.emulator, &payload);
                }
                http::write_response(&mut stream, 200, "OK", b"OK").await
            }
            method => {
                debug!(?method, path = %request.path, "Unsupported request, closing");
                Ok(())
            }
        }
    }

    fn note(&self, message: String, outcome: Outcome) {
        self.emulator.log().append(&message, Origin::Server, outcome);
    }
}

fn apply_posted(router: &CommandRouter, emulator: &Emulator, payload: &str) {
    let outcome = router.apply(payload);
    if !outcome.log_cleared {
        emulator
            .log()
            .append(&format!("POST: {payload}"), Origin::Server, Outcome::from(outcome.applied));
    }
}
