//! Control commands and the single-datagram requests that carry them.
use std::{error::Error, fmt::Display};

use crate::{
    chain::{ChainReader, Datagram, DatagramChain, Reassembler},
    error::{ChainError, ReadError},
    schema::AccessEntry,
    wire::{Wire, option_from_u16, option_to_u16},
};

/// Default UDP port of the control server.
pub const DEFAULT_PORT: u16 = 23546;

/// Command ids as they appear on the wire.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Command {
    OnlineCheck = 1,
    CrateArray = 2,
    CrateInfo = 3,
    RegisterList = 4,
    Config = 5,
    ConfigDump = 6,
    GocRead = 7,
    GocWrite = 8,
    ModuleAccess = 9,
}

impl Command {
    pub fn from_u8(value: u8) -> Option<Command> {
        Some(match value {
            1 => Command::OnlineCheck,
            2 => Command::CrateArray,
            3 => Command::CrateInfo,
            4 => Command::RegisterList,
            5 => Command::Config,
            6 => Command::ConfigDump,
            7 => Command::GocRead,
            8 => Command::GocWrite,
            9 => Command::ModuleAccess,
            _ => return None,
        })
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::OnlineCheck => "online-check",
            Command::CrateArray => "crate-array",
            Command::CrateInfo => "crate-info",
            Command::RegisterList => "register-list",
            Command::Config => "config",
            Command::ConfigDump => "config-dump",
            Command::GocRead => "goc-read",
            Command::GocWrite => "goc-write",
            Command::ModuleAccess => "module-access",
        };
        write!(f, "{}", name)
    }
}

/// Addresses a crate, module or submodule of the process.
///
/// With a tag index set, `module_j` counts modules within that tag rather than
/// within the whole crate.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Target {
    pub crate_i: Option<u16>,
    pub tag_i: Option<u16>,
    pub module_j: Option<u16>,
    pub submodule_k: Option<u16>,
}

impl Target {
    /// The whole process: every crate.
    pub fn process() -> Target {
        Target::default()
    }

    pub fn crate_at(crate_i: u16) -> Target {
        Target {
            crate_i: Some(crate_i),
            ..Target::default()
        }
    }

    pub fn module_at(crate_i: u16, module_j: u16) -> Target {
        Target::crate_at(crate_i).module(module_j)
    }

    pub fn tag(mut self, tag_i: u16) -> Target {
        self.tag_i = Some(tag_i);
        self
    }

    pub fn module(mut self, module_j: u16) -> Target {
        self.module_j = Some(module_j);
        self
    }

    pub fn submodule(mut self, submodule_k: u16) -> Target {
        self.submodule_k = Some(submodule_k);
        self
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Some(crate_i) = self.crate_i else {
            return write!(f, "*");
        };
        write!(f, "crate[{}]", crate_i)?;
        if let Some(tag_i) = self.tag_i {
            write!(f, ".tag[{}]", tag_i)?;
        }
        if let Some(module_j) = self.module_j {
            write!(f, ".module[{}]", module_j)?;
        }
        if let Some(submodule_k) = self.submodule_k {
            write!(f, ".submodule[{}]", submodule_k)?;
        }
        Ok(())
    }
}

impl Wire for Target {
    fn pack(&self, chain: &mut DatagramChain) {
        chain.record(8, |p| {
            p.pack_u16(option_to_u16(self.crate_i));
            p.pack_u16(option_to_u16(self.tag_i));
            p.pack_u16(option_to_u16(self.module_j));
            p.pack_u16(option_to_u16(self.submodule_k));
        });
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        let record = reader.begin_record()?;
        Ok(Target {
            crate_i: option_from_u16(record.unpack_u16()?),
            tag_i: option_from_u16(record.unpack_u16()?),
            module_j: option_from_u16(record.unpack_u16()?),
            submodule_k: option_from_u16(record.unpack_u16()?),
        })
    }
}

/// Location of a word behind a crate's generic op controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct GocAddress {
    pub crate_i: u16,
    pub sfp: u8,
    pub card: u16,
    pub offset: u32,
}

impl Wire for GocAddress {
    fn pack(&self, chain: &mut DatagramChain) {
        chain.record(2 + 1 + 2 + 4, |p| {
            p.pack_u16(self.crate_i);
            p.pack_u8(self.sfp);
            p.pack_u16(self.card);
            p.pack_u32(self.offset);
        });
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        let record = reader.begin_record()?;
        Ok(GocAddress {
            crate_i: record.unpack_u16()?,
            sfp: record.unpack_u8()?,
            card: record.unpack_u16()?,
            offset: record.unpack_u32()?,
        })
    }
}

/// A request from a client. Every request fits into a single datagram.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Request {
    /// Liveness probe, answered with [`MAGIC_VERSION`](crate::chain::MAGIC_VERSION).
    OnlineCheck,
    /// Topology of all crates.
    CrateArray,
    /// Live counters and shape of one crate.
    CrateInfo { crate_i: u16 },
    /// Named registers of one module with their current values.
    RegisterList(Target),
    /// Full configuration below the target.
    Config(Target),
    /// Configuration below the target, reduced to what differs from defaults.
    ConfigDump(Target),
    /// Reads `count` consecutive words.
    GocRead { address: GocAddress, count: u16 },
    /// Writes consecutive words.
    GocWrite {
        address: GocAddress,
        values: Vec<u32>,
    },
    /// Raw register operations against one module, executed in order.
    ModuleAccess {
        target: Target,
        entries: Vec<AccessEntry>,
    },
}

impl Request {
    pub fn command(&self) -> Command {
        match self {
            Request::OnlineCheck => Command::OnlineCheck,
            Request::CrateArray => Command::CrateArray,
            Request::CrateInfo { .. } => Command::CrateInfo,
            Request::RegisterList(_) => Command::RegisterList,
            Request::Config(_) => Command::Config,
            Request::ConfigDump(_) => Command::ConfigDump,
            Request::GocRead { .. } => Command::GocRead,
            Request::GocWrite { .. } => Command::GocWrite,
            Request::ModuleAccess { .. } => Command::ModuleAccess,
        }
    }

    /// Whether executing the request may change hardware state.
    pub fn is_write(&self) -> bool {
        match self {
            Request::GocWrite { .. } => true,
            Request::ModuleAccess { entries, .. } => entries.iter().any(|e| !e.is_read),
            _ => false,
        }
    }

    pub fn encode(&self) -> Result<Datagram, RequestError> {
        let mut chain = DatagramChain::with_limit(1);
        self.pack(&mut chain);
        let mut datagrams = chain.finish()?;
        Ok(datagrams.remove(0))
    }

    pub fn decode(datagram: Datagram) -> Result<Request, ReadError> {
        let mut reassembler = Reassembler::new();
        reassembler.insert(datagram);
        reassembler.decode()
    }
}

impl Wire for Request {
    fn pack(&self, chain: &mut DatagramChain) {
        chain.record(1, |p| p.pack_u8(self.command() as u8));
        match self {
            Request::OnlineCheck | Request::CrateArray => {}
            Request::CrateInfo { crate_i } => crate_i.pack(chain),
            Request::RegisterList(target)
            | Request::Config(target)
            | Request::ConfigDump(target) => target.pack(chain),
            Request::GocRead { address, count } => {
                address.pack(chain);
                count.pack(chain);
            }
            Request::GocWrite { address, values } => {
                address.pack(chain);
                values.pack(chain);
            }
            Request::ModuleAccess { target, entries } => {
                target.pack(chain);
                entries.pack(chain);
            }
        }
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        let id = reader.begin_record()?.unpack_u8()?;
        let command = Command::from_u8(id).ok_or(ReadError::InvalidTag {
            field: "command",
            tag: id,
        })?;
        Ok(match command {
            Command::OnlineCheck => Request::OnlineCheck,
            Command::CrateArray => Request::CrateArray,
            Command::CrateInfo => Request::CrateInfo {
                crate_i: u16::unpack(reader)?,
            },
            Command::RegisterList => Request::RegisterList(Target::unpack(reader)?),
            Command::Config => Request::Config(Target::unpack(reader)?),
            Command::ConfigDump => Request::ConfigDump(Target::unpack(reader)?),
            Command::GocRead => Request::GocRead {
                address: GocAddress::unpack(reader)?,
                count: u16::unpack(reader)?,
            },
            Command::GocWrite => Request::GocWrite {
                address: GocAddress::unpack(reader)?,
                values: Vec::unpack(reader)?,
            },
            Command::ModuleAccess => Request::ModuleAccess {
                target: Target::unpack(reader)?,
                entries: Vec::unpack(reader)?,
            },
        })
    }
}

/// Errors raised while building a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The request would not fit into a single datagram.
    TooLarge(ChainError),
}

impl From<ChainError> for RequestError {
    fn from(value: ChainError) -> Self {
        RequestError::TooLarge(value)
    }
}

impl Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::TooLarge(error) => write!(f, "Request too large: {}", error),
        }
    }
}

impl Error for RequestError {}
