//! # Crate Control Protocol Library
//!
//! This crate implements the wire format of the crate control protocol, a binary
//! request/response scheme over UDP that lets external tools inspect and poke a
//! running data-acquisition process.
//!
//! ## Overview
//!
//! A client sends one small request datagram naming a [`Command`] and a [`Target`].
//! The server answers with one or more datagrams. Answers can be arbitrarily large
//! structured values (a whole configuration tree, a register table), so they are
//! cut into MTU-sized datagrams by a [`DatagramChain`] and put back together on
//! the client by a [`Reassembler`].
//!
//! The crate provides:
//!
//! - Bounds-checked big-endian packing ([`pack::Packer`], [`pack::Unpacker`])
//! - Fragmentation and reassembly of record sequences ([`chain`])
//! - The [`Wire`] encodings of configuration trees, crate topology, crate info,
//!   register arrays and module access lists
//! - The [`Request`] enum with one variant per command
//!
//! ## Datagram Format
//!
//! ```text
//! [magic/version: u32][entry_count: u8][sequence_id: u8][records...]
//! ```
//!
//! All fields are big-endian. Strings are NUL-terminated. A record never spans
//! two datagrams and the entry count is the number of records in the datagram.
//! A single datagram without entries is the "no data" answer.
//!
//! ## Basic Usage
//!
//! ```
//! use daqctl_protocol::{Datagram, MAX_DATAGRAM_SIZE, Request, Target};
//!
//! let request = Request::RegisterList(Target::module_at(0, 2));
//! let datagram = request.encode().expect("request fits a datagram");
//!
//! let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
//! let bytes = datagram.encode(&mut buffer);
//! // Send bytes to the server...
//!
//! let received = Datagram::parse(bytes).expect("valid datagram");
//! assert_eq!(Request::decode(received), Ok(request));
//! ```
//!
//! ### Packing large answers
//!
//! ```
//! use daqctl_protocol::{DatagramChain, Reassembler, Wire};
//!
//! let values: Vec<u32> = (0..2000).collect();
//! let mut chain = DatagramChain::new();
//! values.pack(&mut chain);
//! let datagrams = chain.finish().expect("within chain limit");
//! assert!(datagrams.len() > 1);
//!
//! let mut reassembler = Reassembler::new();
//! for datagram in datagrams.into_iter().rev() {
//!     reassembler.insert(datagram);
//! }
//! assert_eq!(reassembler.decode::<Vec<u32>>(), Ok(values));
//! ```
//!
//! ## Error Handling
//!
//! Decoding failures are reported as [`error::ReadError`]; they are expected for
//! network input and never panic. Packing more than a buffer holds is a bug in the
//! code that sized the buffer and panics.
pub mod chain;
pub mod config;
pub mod error;
pub mod keyword;
pub mod pack;
pub mod request;
pub mod schema;
pub mod wire;

pub use chain::{
    ChainReader, Datagram, DatagramChain, MAGIC_VERSION, MAX_DATAGRAM_SIZE, Reassembler,
};
pub use config::{ConfigNode, ConfigScalar, NodeKind, ScalarValue};
pub use keyword::Keyword;
pub use request::{Command, DEFAULT_PORT, GocAddress, Request, RequestError, Target};
pub use schema::{
    Access, AccessEntry, BitWidth, CrateInfo, CrateTopology, CustomRegister, ModuleInfo,
    ModuleTopology, RegisterArray, RegisterDescriptor, RegisterValue, TagInfo,
};
pub use wire::Wire;
