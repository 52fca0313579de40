//! # Crate Control Client
//!
//! A Rust client library for inspecting and controlling the crates of a running
//! data-acquisition process over the crate control protocol.
//!
//! ## Overview
//!
//! Every operation sends one request datagram to the control server of the
//! process and collects the datagrams of its answer until the answer decodes
//! completely. Calls are synchronous and bounded by a timeout; the client never
//! spawns threads.
//!
//! ## Operations
//!
//! - **is_online**: Probe whether a control server answers at all
//! - **crate_array**: Names and module types of all crates
//! - **crate_info**: Live counters, tags and modules of one crate
//! - **register_array**: Named registers of a module with their current values
//! - **config** / **config_dump**: Configuration trees, full or reduced to what
//!   differs from defaults
//! - **goc_read** / **goc_write**: Words behind the generic op controller of a crate
//! - **module_access**: Raw register reads and writes against a module
//!
//! For the wire format, see the [`daqctl_protocol`] crate.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use daqctl_client::Client;
//! use daqctl_protocol::{AccessEntry, BitWidth, Target};
//!
//! let client = Client::new("daq-pc:23546")?;
//! if !client.is_online() {
//!     return Ok(());
//! }
//!
//! let info = client.crate_info(0)?;
//! println!("{}: {} events", info.name, info.event_count);
//!
//! let mut entries = [
//!     AccessEntry::write(0x6004, BitWidth::W16, 100),
//!     AccessEntry::read(0x6004, BitWidth::W16),
//! ];
//! client.module_access(Target::module_at(0, 2), &mut entries)?;
//! assert_eq!(entries[1].value, 100);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! A server that cannot answer a request replies with "no data", reported as
//! [`ClientError::NoData`]. The server does not say why; its log does.
use std::{
    error::Error,
    fmt::Display,
    io::{self, ErrorKind},
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket},
    time::{Duration, Instant},
};

use daqctl_protocol::{
    AccessEntry, ConfigNode, CrateInfo, CrateTopology, Datagram, GocAddress, MAGIC_VERSION,
    MAX_DATAGRAM_SIZE, Reassembler, RegisterArray, Request, RequestError, Target, Wire,
    error::ReadError,
};

#[derive(Debug, Clone)]
pub struct Config {
    /// How long to wait for a complete answer.
    pub timeout: Duration,
    /// How long [`Client::is_online`] waits.
    pub online_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            online_timeout: Duration::from_millis(250),
        }
    }
}

/// Builder to create a [Client] with non-default timeouts
///
/// # Example
///
/// ```ignore
/// use daqctl_client::Builder;
/// use std::time::Duration;
///
/// let client = Builder::new()
///     .timeout(Duration::from_secs(5))
///     .build("daq-pc:23546")?;
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn online_timeout(mut self, timeout: Duration) -> Self {
        self.config.online_timeout = timeout;
        self
    }

    /// Resolves `addr` and returns the client.
    pub fn build(self, addr: impl ToSocketAddrs) -> io::Result<Client> {
        Client::with_config(addr, self.config)
    }
}

#[derive(Debug)]
pub enum ClientError {
    Io(io::Error),
    /// No complete answer arrived in time.
    Timeout,
    /// The server could not answer the request.
    NoData,
    /// The answer arrived completely but does not decode.
    Decode(ReadError),
    Request(RequestError),
    /// The answer decodes but does not fit the request.
    UnexpectedAnswer(&'static str),
}

impl From<io::Error> for ClientError {
    fn from(value: io::Error) -> Self {
        ClientError::Io(value)
    }
}

impl From<ReadError> for ClientError {
    fn from(value: ReadError) -> Self {
        ClientError::Decode(value)
    }
}

impl From<RequestError> for ClientError {
    fn from(value: RequestError) -> Self {
        ClientError::Request(value)
    }
}

impl Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Io(err) => write!(f, "I/O error: {}", err),
            ClientError::Timeout => write!(f, "No complete answer before timeout"),
            ClientError::NoData => write!(f, "Server has no data for this request"),
            ClientError::Decode(err) => write!(f, "Invalid answer: {}", err),
            ClientError::Request(err) => write!(f, "{}", err),
            ClientError::UnexpectedAnswer(what) => write!(f, "Unexpected answer: {}", what),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClientError::Io(err) => Some(err),
            ClientError::Decode(err) => Some(err),
            ClientError::Request(err) => Some(err),
            _ => None,
        }
    }
}

/// Client for the control server of one data-acquisition process.
#[derive(Debug, Clone)]
pub struct Client {
    server: SocketAddr,
    config: Config,
}

impl Client {
    pub fn new(addr: impl ToSocketAddrs) -> io::Result<Client> {
        Client::with_config(addr, Config::default())
    }

    pub fn with_config(addr: impl ToSocketAddrs, config: Config) -> io::Result<Client> {
        let server = addr.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(ErrorKind::NotFound, "Address resolves to nothing")
        })?;
        Ok(Client { server, config })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    /// Whether a control server answers within the online timeout.
    pub fn is_online(&self) -> bool {
        match self.call::<u32>(&Request::OnlineCheck, self.config.online_timeout) {
            Ok(magic) => magic == MAGIC_VERSION,
            Err(e) => {
                log::debug!("{} is not online: {}", self.server, e);
                false
            }
        }
    }

    pub fn crate_array(&self) -> Result<Vec<CrateTopology>, ClientError> {
        self.request(&Request::CrateArray)
    }

    pub fn crate_info(&self, crate_i: u16) -> Result<CrateInfo, ClientError> {
        self.request(&Request::CrateInfo { crate_i })
    }

    pub fn register_array(&self, target: Target) -> Result<RegisterArray, ClientError> {
        self.request(&Request::RegisterList(target))
    }

    /// The full configuration below `target`, one tree per root.
    pub fn config(&self, target: Target) -> Result<Vec<ConfigNode>, ClientError> {
        self.request(&Request::Config(target))
    }

    /// The configuration below `target` that differs from defaults.
    /// Empty if nothing was touched.
    pub fn config_dump(&self, target: Target) -> Result<Vec<ConfigNode>, ClientError> {
        self.request(&Request::ConfigDump(target))
    }

    /// Reads `count` words from consecutive 32-bit offsets.
    pub fn goc_read(&self, address: GocAddress, count: u16) -> Result<Vec<u32>, ClientError> {
        let values: Vec<u32> = self.request(&Request::GocRead { address, count })?;
        if values.len() != usize::from(count) {
            return Err(ClientError::UnexpectedAnswer("GOC word count"));
        }
        Ok(values)
    }

    /// Writes `values` to consecutive 32-bit offsets. Returns the number written.
    pub fn goc_write(&self, address: GocAddress, values: &[u32]) -> Result<u32, ClientError> {
        self.request(&Request::GocWrite {
            address,
            values: values.to_vec(),
        })
    }

    /// Executes `entries` in order against the module at `target`.
    ///
    /// The values read by read entries are stored back into `entries`.
    pub fn module_access(
        &self,
        target: Target,
        entries: &mut [AccessEntry],
    ) -> Result<(), ClientError> {
        let answered: Vec<AccessEntry> = self.request(&Request::ModuleAccess {
            target,
            entries: entries.to_vec(),
        })?;
        if answered.len() != entries.len() {
            return Err(ClientError::UnexpectedAnswer("access entry count"));
        }
        for (entry, answer) in entries.iter_mut().zip(answered) {
            if entry.is_read {
                entry.value = answer.value;
            }
        }
        Ok(())
    }

    fn request<T: Wire>(&self, request: &Request) -> Result<T, ClientError> {
        self.call(request, self.config.timeout)
    }

    /// Sends `request` from a fresh socket and waits for the complete answer.
    ///
    /// The socket lives for this call only, so late datagrams of an earlier
    /// call are never mistaken for part of this answer.
    fn call<T: Wire>(&self, request: &Request, timeout: Duration) -> Result<T, ClientError> {
        let datagram = request.encode()?;
        let local: SocketAddr = match self.server {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(self.server)?;

        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        socket.send(datagram.encode(&mut buffer))?;
        log::debug!("Sent {} request to {}", request.command(), self.server);

        let deadline = Instant::now() + timeout;
        let mut reassembler = Reassembler::new();
        let mut last_error = None;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(match last_error {
                    Some(ReadError::IncompleteChain) | None => ClientError::Timeout,
                    Some(error) => ClientError::Decode(error),
                });
            }
            socket.set_read_timeout(Some(remaining))?;
            let len = match socket.recv(&mut buffer) {
                Ok(len) => len,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let datagram = match Datagram::parse(&buffer[..len]) {
                Ok(datagram) => datagram,
                Err(e) => {
                    log::debug!("Ignoring datagram from {}: {}", self.server, e);
                    continue;
                }
            };
            log::trace!(
                "Received datagram {} with {} entries",
                datagram.sequence_id(),
                datagram.entry_count()
            );
            if datagram.is_empty() {
                return Err(ClientError::NoData);
            }
            if !reassembler.insert(datagram) {
                continue;
            }
            match reassembler.decode::<T>() {
                Ok(value) => return Ok(value),
                Err(e) => last_error = Some(e),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use daqctl_protocol::{BitWidth, DatagramChain};
    use std::thread;

    /// Answers the first request it receives with `datagrams`, in the given order.
    fn responder(datagrams: Vec<Datagram>) -> (SocketAddr, thread::JoinHandle<Request>) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = socket.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
            let (len, peer) = socket.recv_from(&mut buffer).unwrap();
            let request = Request::decode(Datagram::parse(&buffer[..len]).unwrap()).unwrap();
            for datagram in datagrams {
                let mut out = [0u8; MAX_DATAGRAM_SIZE];
                socket.send_to(datagram.encode(&mut out), peer).unwrap();
            }
            request
        });
        (addr, handle)
    }

    #[test]
    fn silent_server_is_not_online() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = Builder::new()
            .online_timeout(Duration::from_millis(100))
            .build(silent.local_addr().unwrap())
            .unwrap();
        let start = Instant::now();
        assert!(!client.is_online());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn no_data_answer() {
        let (addr, handle) = responder(vec![Datagram::new(0)]);
        let client = Client::new(addr).unwrap();
        assert!(matches!(client.crate_info(3), Err(ClientError::NoData)));
        assert_eq!(handle.join().unwrap(), Request::CrateInfo { crate_i: 3 });
    }

    #[test]
    fn reassembles_out_of_order_answer() {
        let names: Vec<CrateTopology> = (0..400)
            .map(|i| CrateTopology {
                name: format!("crate number {}", i),
                modules: Vec::new(),
            })
            .collect();
        let mut chain = DatagramChain::new();
        names.pack(&mut chain);
        let mut datagrams = chain.finish().unwrap();
        assert!(datagrams.len() > 2);
        datagrams.reverse();

        let (addr, handle) = responder(datagrams);
        let client = Client::new(addr).unwrap();
        assert_eq!(client.crate_array().unwrap(), names);
        assert_eq!(handle.join().unwrap(), Request::CrateArray);
    }

    #[test]
    fn incomplete_answer_times_out() {
        let mut chain = DatagramChain::new();
        (0..1000u32).collect::<Vec<_>>().pack(&mut chain);
        let mut datagrams = chain.finish().unwrap();
        datagrams.remove(1);

        let (addr, handle) = responder(datagrams);
        let client = Builder::new()
            .timeout(Duration::from_millis(200))
            .build(addr)
            .unwrap();
        let address = GocAddress {
            crate_i: 0,
            sfp: 0,
            card: 0,
            offset: 0,
        };
        assert!(matches!(
            client.goc_read(address, 1000),
            Err(ClientError::Timeout)
        ));
        handle.join().unwrap();
    }

    #[test]
    fn module_access_copies_reads_back() {
        let answer = vec![
            AccessEntry::write(0x1060, BitWidth::W16, 0x1e),
            AccessEntry {
                value: 0x1e,
                ..AccessEntry::read(0x1060, BitWidth::W16)
            },
        ];
        let mut chain = DatagramChain::new();
        answer.pack(&mut chain);
        let (addr, handle) = responder(chain.finish().unwrap());

        let client = Client::new(addr).unwrap();
        let mut entries = [
            AccessEntry::write(0x1060, BitWidth::W16, 0x1e),
            AccessEntry::read(0x1060, BitWidth::W16),
        ];
        client
            .module_access(Target::module_at(0, 0), &mut entries)
            .unwrap();
        assert_eq!(entries[1].value, 0x1e);
        assert!(handle.join().unwrap().is_write());
    }
}
