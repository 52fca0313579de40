//! In-memory stand-ins for module drivers and the generic op controller.
//!
//! They behave like the hardware as far as the control path can tell: register
//! accesses have to be aligned and inside the mapping, values are truncated to the
//! access width, and registers that were never written read back their reset value.
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
};

use daqctl_protocol::{BitWidth, CustomRegister, RegisterDescriptor};

use crate::{GocAccess, ModuleDriver, registers};

/// A module whose register file lives in memory.
#[derive(Debug, Clone)]
pub struct SimulatedModule {
    registers: &'static [RegisterDescriptor],
    size: u32,
    memory: HashMap<u32, u32>,
    custom: Vec<CustomRegister>,
}

impl SimulatedModule {
    /// A module with `size` bytes of address space and the given register table.
    pub fn new(registers: &'static [RegisterDescriptor], size: u32) -> SimulatedModule {
        SimulatedModule {
            registers,
            size,
            memory: HashMap::new(),
            custom: Vec::new(),
        }
    }

    pub fn mesytec_madc32() -> SimulatedModule {
        SimulatedModule::new(registers::MESYTEC_MADC32, 0x1_0000)
            .with_value(0x600E, 0x0210)
            .with_value(0x6004, 0xff)
    }

    pub fn caen_v775() -> SimulatedModule {
        SimulatedModule::new(registers::CAEN_V775, 0x1_0000)
            .with_value(0x1000, 0x0905)
            .with_value(0x1060, 0x1e)
    }

    /// Presets the reset value at `offset`.
    pub fn with_value(mut self, offset: u32, value: u32) -> SimulatedModule {
        self.memory.insert(offset, value);
        self
    }

    pub fn with_custom_register(mut self, name: impl Into<String>, value: u32) -> SimulatedModule {
        self.custom.push(CustomRegister {
            name: name.into(),
            value,
        });
        self
    }

    fn check(&self, offset: u32, width: BitWidth) -> io::Result<()> {
        let bytes = width.bytes() as u32;
        if offset % bytes != 0 {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("Offset {:#x} is not aligned to {} bits", offset, width.bits()),
            ));
        }
        if offset.checked_add(bytes).is_none_or(|end| end > self.size) {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("Offset {:#x} is outside of {:#x} bytes", offset, self.size),
            ));
        }
        Ok(())
    }
}

impl ModuleDriver for SimulatedModule {
    fn registers(&self) -> &[RegisterDescriptor] {
        self.registers
    }

    fn read(&mut self, offset: u32, width: BitWidth) -> io::Result<u32> {
        self.check(offset, width)?;
        Ok(self.memory.get(&offset).copied().unwrap_or(0) & width.mask())
    }

    fn write(&mut self, offset: u32, width: BitWidth, value: u32) -> io::Result<()> {
        self.check(offset, width)?;
        log::trace!("Simulated write {:#x}/{} = {:#x}", offset, width.bits(), value);
        self.memory.insert(offset, value & width.mask());
        Ok(())
    }

    fn custom_registers(&mut self) -> io::Result<Vec<CustomRegister>> {
        Ok(self.custom.clone())
    }
}

/// A generic op controller with `sfps` links and unlimited cards per link.
#[derive(Debug, Clone, Default)]
pub struct SimulatedGoc {
    sfps: u8,
    memory: HashMap<(u8, u16, u32), u32>,
}

impl SimulatedGoc {
    pub fn new(sfps: u8) -> SimulatedGoc {
        SimulatedGoc {
            sfps,
            memory: HashMap::new(),
        }
    }

    fn check(&self, sfp: u8) -> io::Result<()> {
        if sfp >= self.sfps {
            return Err(io::Error::new(
                ErrorKind::NotFound,
                format!("No SFP {} (controller has {})", sfp, self.sfps),
            ));
        }
        Ok(())
    }
}

impl GocAccess for SimulatedGoc {
    fn read(&mut self, sfp: u8, card: u16, offset: u32) -> io::Result<u32> {
        self.check(sfp)?;
        Ok(self.memory.get(&(sfp, card, offset)).copied().unwrap_or(0))
    }

    fn write(&mut self, sfp: u8, card: u16, offset: u32, value: u32) -> io::Result<()> {
        self.check(sfp)?;
        self.memory.insert((sfp, card, offset), value);
        Ok(())
    }
}
