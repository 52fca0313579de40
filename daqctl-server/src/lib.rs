//! # Crate Control Server Library
//!
//! This crate answers crate control requests from inside a running
//! data-acquisition process, without getting in the way of its readout loop.
//!
//! ## Overview
//!
//! The acquisition process describes its hardware as a [`live::CrateArray`]: crates,
//! their trigger tags, modules and submodules, configuration trees and counters.
//! The array is shared through an `Arc` between the readout thread, which owns all
//! mutation, and the control server, which only reads snapshots of it or forwards
//! raw register accesses to the module drivers.
//!
//! ## Architecture
//!
//! - **[`ModuleDriver`] / [`GocAccess`] traits**: the interface to hardware. A
//!   driver knows its static register table and how to read and write its mapping.
//! - **[`live`]**: the shared crate model, with explicit synchronization for every
//!   field the readout loop touches.
//! - **[`server::Server`]**: binds the UDP socket and runs the request loop on a
//!   dedicated thread, returning a [`server::ServerHandle`] that stops it.
//! - **[`sim`]**: in-memory drivers for tests and demonstrations.
//!
//! ## How It Works
//!
//! 1. The process builds its crate array and wraps it in an `Arc`
//! 2. [`server::Server::spawn`] binds the socket and starts the control thread
//! 3. Each request datagram is decoded and dispatched on its command
//! 4. The handler builds a fresh snapshot of the live state and packs it into a
//!    datagram chain
//! 5. Every datagram of the chain is sent back to the requesting address
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use daqctl_server::{live::{Crate, CrateArray, Module}, server::Builder, sim::SimulatedModule};
//! use daqctl_protocol::Keyword;
//!
//! let crates = Arc::new(CrateArray::new(vec![
//!     Crate::new("Main").with_module(Module::new(
//!         Keyword::MESYTEC_MADC32,
//!         SimulatedModule::mesytec_madc32(),
//!     )),
//! ]));
//!
//! let handle = Builder::new()
//!     .bind_addr("127.0.0.1:23546".parse().unwrap())
//!     .build(crates.clone())
//!     .spawn()?;
//!
//! // Run the acquisition loop, updating crates.crates()[0].counters() ...
//!
//! handle.shutdown();
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Requests that cannot be answered (unknown indices, missing GOC, hardware
//! errors) are logged and answered with the "no data" datagram.
//! Malformed request datagrams are logged and dropped.
//!
//! ## Logging
//!
//! This crate uses the `log` crate for diagnostics: server lifecycle at `info`,
//! every request at `debug`, dropped or failed requests at `warn`.
//!
//! ## Thread Model
//!
//! One dedicated thread per server, running a single-threaded tokio runtime.
//! Requests are answered one after the other.
use std::io;

use daqctl_protocol::{BitWidth, CustomRegister, RegisterDescriptor};

pub mod error;
pub mod handler;
pub mod live;
pub mod registers;
pub mod server;
pub mod sim;

pub use error::HandlerError;

/// Trait that module drivers implement to expose their registers.
///
/// The control server calls into a driver while holding the module's lock, so
/// calls are never concurrent with the readout loop's use of the same module.
pub trait ModuleDriver: Send {
    /// The static register table of the module type.
    fn registers(&self) -> &[RegisterDescriptor];

    /// Reads the register at byte `offset` of the module's mapping.
    fn read(&mut self, offset: u32, width: BitWidth) -> io::Result<u32>;

    /// Writes the register at byte `offset` of the module's mapping.
    fn write(&mut self, offset: u32, width: BitWidth, value: u32) -> io::Result<()>;

    /// Registers outside of the static table, for example generated ones.
    fn custom_registers(&mut self) -> io::Result<Vec<CustomRegister>> {
        Ok(Vec::new())
    }
}

/// Trait for a crate's generic op controller, addressing words by SFP, card and offset.
pub trait GocAccess: Send {
    fn read(&mut self, sfp: u8, card: u16, offset: u32) -> io::Result<u32>;

    fn write(&mut self, sfp: u8, card: u16, offset: u32, value: u32) -> io::Result<()>;
}
