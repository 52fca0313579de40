//! # Memory-Mapped Module Backend
//!
//! For modules whose registers are reachable through a memory mapping, e.g. a
//! VME bridge window exposed as `/dev/mem` or a UIO device.
//!
//! ## Example Usage
//!
//! ```ignore
//! use daqctl_server::{live::Module, registers};
//!
//! let driver = MappedModule::open("/dev/uio0", 0, 0x10000, registers::CAEN_V775)?;
//! let module = Module::new(Keyword::CAEN_V775, driver);
//! ```
use std::{
    ffi::c_void,
    fs::OpenOptions,
    io::{self, ErrorKind},
    num::NonZero,
    path::Path,
    ptr::{NonNull, read_volatile, write_volatile},
};

use daqctl_protocol::{BitWidth, RegisterDescriptor};
use daqctl_server::ModuleDriver;
use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap};

/// Module driver accessing registers through a shared memory mapping
pub struct MappedModule {
    mem: NonNull<c_void>,
    size: usize,
    registers: &'static [RegisterDescriptor],
}

// The mapping is owned by this value and only accessed through `&mut self`.
unsafe impl Send for MappedModule {}

impl MappedModule {
    /// Maps `size` bytes of `path` starting at `base`, which must be page aligned.
    pub fn open(
        path: impl AsRef<Path>,
        base: u64,
        size: usize,
        registers: &'static [RegisterDescriptor],
    ) -> io::Result<MappedModule> {
        let path = path.as_ref();
        log::debug!("Opening {} for mapping", path.display());
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let length = NonZero::new(size)
            .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "Mapping size is zero"))?;
        let offset = base
            .try_into()
            .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "Base address out of range"))?;

        let mem = unsafe {
            log::debug!("Mapping 0x{:x} bytes at 0x{:x}", size, base);
            mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                file,
                offset,
            )?
        };
        log::info!("Mapped {} at 0x{:x}", path.display(), base);
        Ok(MappedModule {
            mem,
            size,
            registers,
        })
    }

    fn address(&self, offset: u32, width: BitWidth) -> io::Result<*mut u8> {
        let offset = offset as usize;
        if offset % width.bytes() != 0 {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("Offset 0x{:x} is not aligned to {} bits", offset, width.bits()),
            ));
        }
        if offset + width.bytes() > self.size {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("Offset 0x{:x} is outside of the 0x{:x} byte mapping", offset, self.size),
            ));
        }
        Ok(unsafe { self.mem.as_ptr().cast::<u8>().add(offset) })
    }
}

impl Drop for MappedModule {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.mem, self.size);
        }
    }
}

impl ModuleDriver for MappedModule {
    fn registers(&self) -> &[RegisterDescriptor] {
        self.registers
    }

    fn read(&mut self, offset: u32, width: BitWidth) -> io::Result<u32> {
        let address = self.address(offset, width)?;
        let value = unsafe {
            match width {
                BitWidth::W8 => u32::from(read_volatile(address)),
                BitWidth::W16 => u32::from(read_volatile(address.cast::<u16>())),
                BitWidth::W32 => read_volatile(address.cast::<u32>()),
            }
        };
        log::trace!("Mapped read 0x{:x}/{} = 0x{:x}", offset, width.bits(), value);
        Ok(value)
    }

    fn write(&mut self, offset: u32, width: BitWidth, value: u32) -> io::Result<()> {
        let address = self.address(offset, width)?;
        log::trace!("Mapped write 0x{:x}/{} = 0x{:x}", offset, width.bits(), value);
        unsafe {
            match width {
                BitWidth::W8 => write_volatile(address, value as u8),
                BitWidth::W16 => write_volatile(address.cast::<u16>(), value as u16),
                BitWidth::W32 => write_volatile(address.cast::<u32>(), value),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use daqctl_server::registers;
    use std::fs;

    #[test]
    fn read_write_through_file_mapping() {
        let path = std::env::temp_dir().join(format!("daqctl-mmap-{}", std::process::id()));
        let file = fs::File::create(&path).unwrap();
        file.set_len(0x1000).unwrap();
        drop(file);

        let mut module = MappedModule::open(&path, 0, 0x1000, registers::CAEN_V775).unwrap();
        module.write(0x60, BitWidth::W16, 0x1_abcd).unwrap();
        assert_eq!(module.read(0x60, BitWidth::W16).unwrap(), 0xabcd);
        module.write(0x100, BitWidth::W32, 0xdead_beef).unwrap();
        assert_eq!(module.read(0x100, BitWidth::W32).unwrap(), 0xdead_beef);
        assert!(module.read(0x61, BitWidth::W16).is_err());
        assert!(module.read(0x1000, BitWidth::W8).is_err());
        assert_eq!(module.registers().len(), registers::CAEN_V775.len());
        drop(module);

        fs::remove_file(&path).unwrap();
    }
}
