//! Flat record encodings for crate topology, live crate info, register arrays
//! and raw module access lists.
use std::borrow::Cow;
use std::fmt::Display;

use crate::{
    chain::{ChainReader, DatagramChain},
    error::ReadError,
    keyword::Keyword,
    wire::{Wire, bool_from_u8, clamp_str, str_size},
};

/// Shape of one module of a crate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModuleTopology {
    pub module_type: Keyword,
    pub submodules: Vec<Keyword>,
}

impl Wire for ModuleTopology {
    fn pack(&self, chain: &mut DatagramChain) {
        self.module_type.pack(chain);
        self.submodules.pack(chain);
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        Ok(ModuleTopology {
            module_type: Keyword::unpack(reader)?,
            submodules: Vec::unpack(reader)?,
        })
    }
}

/// Shape of one crate, as answered by the crate-array command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CrateTopology {
    pub name: String,
    pub modules: Vec<ModuleTopology>,
}

impl Wire for CrateTopology {
    fn pack(&self, chain: &mut DatagramChain) {
        chain.record(str_size(&self.name), |p| p.pack_str(clamp_str(&self.name)));
        self.modules.pack(chain);
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        Ok(CrateTopology {
            name: reader.begin_record()?.unpack_string()?,
            modules: Vec::unpack(reader)?,
        })
    }
}

/// Live view of one trigger tag.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TagInfo {
    pub name: String,
    pub event_count: u32,
    /// Indices into the crate's module list.
    pub modules: Vec<u16>,
}

impl Wire for TagInfo {
    fn pack(&self, chain: &mut DatagramChain) {
        chain.record(str_size(&self.name) + 4, |p| {
            p.pack_str(clamp_str(&self.name));
            p.pack_u32(self.event_count);
        });
        self.modules.pack(chain);
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        let record = reader.begin_record()?;
        let name = record.unpack_string()?;
        let event_count = record.unpack_u32()?;
        Ok(TagInfo {
            name,
            event_count,
            modules: Vec::unpack(reader)?,
        })
    }
}

/// Live view of one module.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModuleInfo {
    pub module_type: Keyword,
    pub event_counter: u32,
    pub counter_mask: u32,
    pub submodules: Vec<Keyword>,
}

impl Wire for ModuleInfo {
    fn pack(&self, chain: &mut DatagramChain) {
        chain.record(2 + 4 + 4, |p| {
            p.pack_u16(self.module_type.id());
            p.pack_u32(self.event_counter);
            p.pack_u32(self.counter_mask);
        });
        self.submodules.pack(chain);
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        let record = reader.begin_record()?;
        let module_type = Keyword::new(record.unpack_u16()?);
        let event_counter = record.unpack_u32()?;
        let counter_mask = record.unpack_u32()?;
        Ok(ModuleInfo {
            module_type,
            event_counter,
            counter_mask,
            submodules: Vec::unpack(reader)?,
        })
    }
}

/// Snapshot of the acquisition state of one crate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CrateInfo {
    pub name: String,
    pub running: bool,
    pub event_count: u64,
    pub deadtime_release_us: u32,
    pub tags: Vec<TagInfo>,
    pub modules: Vec<ModuleInfo>,
}

impl Wire for CrateInfo {
    fn pack(&self, chain: &mut DatagramChain) {
        chain.record(str_size(&self.name) + 1 + 8 + 4, |p| {
            p.pack_str(clamp_str(&self.name));
            p.pack_u8(self.running as u8);
            p.pack_u64(self.event_count);
            p.pack_u32(self.deadtime_release_us);
        });
        self.tags.pack(chain);
        self.modules.pack(chain);
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        let record = reader.begin_record()?;
        let name = record.unpack_string()?;
        let running = bool_from_u8("running", record.unpack_u8()?)?;
        let event_count = record.unpack_u64()?;
        let deadtime_release_us = record.unpack_u32()?;
        Ok(CrateInfo {
            name,
            running,
            event_count,
            deadtime_release_us,
            tags: Vec::unpack(reader)?,
            modules: Vec::unpack(reader)?,
        })
    }
}

/// Width of a single register access.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BitWidth {
    W8,
    W16,
    W32,
}

impl BitWidth {
    pub fn bits(&self) -> u8 {
        match self {
            BitWidth::W8 => 8,
            BitWidth::W16 => 16,
            BitWidth::W32 => 32,
        }
    }

    pub fn bytes(&self) -> usize {
        usize::from(self.bits() / 8)
    }

    pub fn from_bits(bits: u8) -> Option<BitWidth> {
        match bits {
            8 => Some(BitWidth::W8),
            16 => Some(BitWidth::W16),
            32 => Some(BitWidth::W32),
            _ => None,
        }
    }

    /// Largest value representable at this width.
    pub fn mask(&self) -> u32 {
        match self {
            BitWidth::W8 => 0xff,
            BitWidth::W16 => 0xffff,
            BitWidth::W32 => 0xffff_ffff,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn is_readable(&self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }

    fn to_u8(self) -> u8 {
        match self {
            Access::Read => 1,
            Access::Write => 2,
            Access::ReadWrite => 3,
        }
    }

    fn from_u8(value: u8) -> Result<Access, ReadError> {
        match value {
            1 => Ok(Access::Read),
            2 => Ok(Access::Write),
            3 => Ok(Access::ReadWrite),
            tag => Err(ReadError::InvalidTag {
                field: "access",
                tag,
            }),
        }
    }
}

/// Static metadata of one register of a module type.
///
/// Driver tables are `const` slices, hence the borrowed name; decoded
/// descriptors own theirs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegisterDescriptor {
    pub name: Cow<'static, str>,
    pub offset: u32,
    pub width: BitWidth,
    pub access: Access,
}

impl RegisterDescriptor {
    pub const fn new(name: &'static str, offset: u32, width: BitWidth, access: Access) -> Self {
        RegisterDescriptor {
            name: Cow::Borrowed(name),
            offset,
            width,
            access,
        }
    }
}

/// A static register together with the value it held at request time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegisterValue {
    pub descriptor: RegisterDescriptor,
    pub value: u32,
}

impl Wire for RegisterValue {
    fn pack(&self, chain: &mut DatagramChain) {
        let descriptor = &self.descriptor;
        chain.record(str_size(&descriptor.name) + 4 + 1 + 1 + 4, |p| {
            p.pack_str(clamp_str(&descriptor.name));
            p.pack_u32(descriptor.offset);
            p.pack_u8(descriptor.width.bits());
            p.pack_u8(descriptor.access.to_u8());
            p.pack_u32(self.value);
        });
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        let record = reader.begin_record()?;
        let name = record.unpack_string()?;
        let offset = record.unpack_u32()?;
        let bits = record.unpack_u8()?;
        let width = BitWidth::from_bits(bits).ok_or(ReadError::InvalidTag {
            field: "bit width",
            tag: bits,
        })?;
        let access = Access::from_u8(record.unpack_u8()?)?;
        let value = record.unpack_u32()?;
        Ok(RegisterValue {
            descriptor: RegisterDescriptor {
                name: Cow::Owned(name),
                offset,
                width,
                access,
            },
            value,
        })
    }
}

/// A register outside of the static descriptor table of its module type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CustomRegister {
    pub name: String,
    pub value: u32,
}

impl Wire for CustomRegister {
    fn pack(&self, chain: &mut DatagramChain) {
        chain.record(str_size(&self.name) + 4, |p| {
            p.pack_str(clamp_str(&self.name));
            p.pack_u32(self.value);
        });
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        let record = reader.begin_record()?;
        Ok(CustomRegister {
            name: record.unpack_string()?,
            value: record.unpack_u32()?,
        })
    }
}

/// All registers of one module with their live values.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegisterArray {
    pub module_type: Keyword,
    pub registers: Vec<RegisterValue>,
    pub custom: Vec<CustomRegister>,
}

impl RegisterArray {
    pub fn get(&self, name: &str) -> Option<u32> {
        self.registers
            .iter()
            .find(|r| r.descriptor.name == name)
            .map(|r| r.value)
            .or_else(|| self.custom.iter().find(|r| r.name == name).map(|r| r.value))
    }
}

impl Wire for RegisterArray {
    fn pack(&self, chain: &mut DatagramChain) {
        self.module_type.pack(chain);
        self.registers.pack(chain);
        self.custom.pack(chain);
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        Ok(RegisterArray {
            module_type: Keyword::unpack(reader)?,
            registers: Vec::unpack(reader)?,
            custom: Vec::unpack(reader)?,
        })
    }
}

/// One raw register operation against a module's mapping.
///
/// The width is kept as sent; nothing but the executing module validates it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AccessEntry {
    pub offset: u32,
    pub bits: u8,
    pub is_read: bool,
    pub value: u32,
}

impl AccessEntry {
    pub fn read(offset: u32, width: BitWidth) -> AccessEntry {
        AccessEntry {
            offset,
            bits: width.bits(),
            is_read: true,
            value: 0,
        }
    }

    pub fn write(offset: u32, width: BitWidth, value: u32) -> AccessEntry {
        AccessEntry {
            offset,
            bits: width.bits(),
            is_read: false,
            value,
        }
    }

    pub fn width(&self) -> Option<BitWidth> {
        BitWidth::from_bits(self.bits)
    }
}

impl Display for AccessEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = if self.is_read { "read" } else { "write" };
        write!(
            f,
            "{} 0x{:04x}/{} = 0x{:x}",
            op, self.offset, self.bits, self.value
        )
    }
}

impl Wire for AccessEntry {
    fn pack(&self, chain: &mut DatagramChain) {
        chain.record(4 + 1 + 1 + 4, |p| {
            p.pack_u32(self.offset);
            p.pack_u8(self.bits);
            p.pack_u8(self.is_read as u8);
            p.pack_u32(self.value);
        });
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        let record = reader.begin_record()?;
        let offset = record.unpack_u32()?;
        let bits = record.unpack_u8()?;
        let is_read = bool_from_u8("is_read", record.unpack_u8()?)?;
        let value = record.unpack_u32()?;
        Ok(AccessEntry {
            offset,
            bits,
            is_read,
            value,
        })
    }
}
