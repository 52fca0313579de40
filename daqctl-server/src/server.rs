use std::{
    io,
    net::{SocketAddr, UdpSocket as StdUdpSocket},
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    thread::{self, JoinHandle},
};

use daqctl_protocol::{
    DEFAULT_PORT, Datagram, MAX_DATAGRAM_SIZE, Request, chain::MAX_CHAIN_LEN,
};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::{handler, live::CrateArray};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub max_response_datagrams: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_response_datagrams: MAX_CHAIN_LEN,
        }
    }
}

/// Builder to create a [Server] instance and modify configuration options
///
/// # Example
///
/// ```ignore
/// use daqctl_server::server::Builder;
///
/// let handle = Builder::new()
///     .bind_addr("127.0.0.1:0".parse()?)
///     .max_response_datagrams(16)
///     .build(crates)
///     .spawn()?;
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the address the UDP socket binds to. Port 0 picks a free port.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the most datagrams a single answer may span.
    /// Larger answers are replaced by "no data".
    pub fn max_response_datagrams(mut self, count: usize) -> Self {
        self.config.max_response_datagrams = count;
        self
    }

    /// Build and return the server
    pub fn build(self, crates: Arc<CrateArray>) -> Server {
        Server::new(crates, self.config)
    }
}

/// Lifecycle of a spawned server.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ServerState {
    /// The socket is bound, the control thread has not started serving yet.
    Bound = 0,
    Listening = 1,
    Stopped = 2,
}

impl ServerState {
    fn from_u8(value: u8) -> ServerState {
        match value {
            0 => ServerState::Bound,
            1 => ServerState::Listening,
            _ => ServerState::Stopped,
        }
    }
}

pub struct Server {
    crates: Arc<CrateArray>,
    config: Config,
}

impl Server {
    pub fn new(crates: Arc<CrateArray>, config: Config) -> Server {
        Server { crates, config }
    }

    /// Binds the socket on the calling thread and serves requests on a new one.
    ///
    /// Binding errors are returned here; the returned handle stops the server.
    pub fn spawn(self) -> io::Result<ServerHandle> {
        let socket = StdUdpSocket::bind(self.config.bind_addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()?;

        let state = Arc::new(AtomicU8::new(ServerState::Bound as u8));
        let shutdown = CancellationToken::new();
        let thread = thread::Builder::new()
            .name("daqctl-server".to_string())
            .spawn({
                let state = state.clone();
                let shutdown = shutdown.clone();
                move || {
                    runtime.block_on(async {
                        match UdpSocket::from_std(socket) {
                            Ok(socket) => {
                                state.store(ServerState::Listening as u8, Ordering::Release);
                                if let Err(e) = self.serve(socket, shutdown).await {
                                    log::error!("Server stopped with error: {}", e);
                                }
                            }
                            Err(e) => log::error!("Cannot register socket: {}", e),
                        }
                    });
                    state.store(ServerState::Stopped as u8, Ordering::Release);
                }
            })?;
        log::info!("Server bound to {}", local_addr);

        Ok(ServerHandle {
            local_addr,
            state,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Answers requests on `socket` until `shutdown` is cancelled.
    pub async fn serve(&self, socket: UdpSocket, shutdown: CancellationToken) -> io::Result<()> {
        log::info!("Server listening on {}", socket.local_addr()?);
        // One byte more than allowed, so oversized datagrams are detected.
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE + 1];
        loop {
            let (len, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = socket.recv_from(&mut buffer) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        log::warn!("Receive failed: {}", e);
                        continue;
                    }
                },
            };
            log::trace!("Received from {}: {:02x?}", peer, &buffer[..len]);
            let Some(request) = self.parse(&buffer[..len], peer) else {
                continue;
            };
            log::debug!("Received {} request from {}", request.command(), peer);
            let datagrams =
                handler::answer(&self.crates, request, self.config.max_response_datagrams);
            self.send(&socket, &datagrams, peer).await;
        }
        log::info!("Server shut down");
        Ok(())
    }

    fn parse(&self, bytes: &[u8], peer: SocketAddr) -> Option<Request> {
        match Datagram::parse(bytes).and_then(Request::decode) {
            Ok(request) => Some(request),
            Err(e) => {
                log::warn!("Dropping datagram from {}: {}", peer, e);
                None
            }
        }
    }

    async fn send(&self, socket: &UdpSocket, datagrams: &[Datagram], peer: SocketAddr) {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        for datagram in datagrams {
            let bytes = datagram.encode(&mut buffer);
            if let Err(e) = socket.send_to(bytes, peer).await {
                log::warn!("Sending to {} failed: {}", peer, e);
                return;
            }
        }
        log::debug!("Sent {} datagram(s) to {}", datagrams.len(), peer);
    }
}

/// Owner of a spawned server. Dropping the handle shuts the server down.
pub struct ServerHandle {
    local_addr: SocketAddr,
    state: Arc<AtomicU8>,
    shutdown: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// The address the server is bound to, with the actual port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// A token that stops the server when cancelled, e.g. from a signal handler.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops the server and waits for the control thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("Server thread panicked");
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
