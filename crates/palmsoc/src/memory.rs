//! Physical address space of the SoC.
//!
//! [`PhysMemory`] owns every byte of RAM and ROM storage (as banks) and a table
//! of regions mapping physical windows onto that storage or onto a peripheral.
//! Two regions may share one bank, which is how the RAM mirror aliases
//! primary RAM.
//!
//! The CPU engine maps the same banks into its own address space by pointer,
//! so a bank must never move once allocated; banks are boxed slices that are
//! only dropped together with the `PhysMemory`.

use crate::board::DeviceId;
use crate::profile::RomChipType;
use palmsoc_hw::memory_map::PAGE_SIZE;
use thiserror::Error;
use tracing::debug;

/// Index of a storage bank inside [`PhysMemory`]
pub type BankId = usize;

/// What a region is backed by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    Ram { bank: BankId },
    Rom { bank: BankId, chip: RomChipType },
    /// Reads as zero, writes dropped
    Void,
    Mmio(DeviceId),
}

/// One registered window of the physical address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub name: &'static str,
    pub base: u32,
    pub size: u32,
    pub backing: Backing,
}

impl Region {
    /// Exclusive end address (may be 2^32)
    pub fn end(&self) -> u64 {
        self.base as u64 + self.size as u64
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && (addr as u64) < self.end()
    }

    fn overlaps(&self, other: &Region) -> bool {
        (self.base as u64) < other.end() && (other.base as u64) < self.end()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemError {
    #[error("region {name} at {base:#X} overlaps {other}")]
    Overlap {
        name: &'static str,
        base: u32,
        other: &'static str,
    },
    #[error("region {name} at {base:#X} (size {size:#X}) is not page aligned")]
    Misaligned {
        name: &'static str,
        base: u32,
        size: u32,
    },
    #[error("region {name} at {base:#X} is empty or runs past the end of the address space")]
    BadSize { name: &'static str, base: u32 },
    #[error("region {name} needs {needed:#X} bytes but bank {bank} holds {len:#X}")]
    BankTooSmall {
        name: &'static str,
        bank: BankId,
        needed: usize,
        len: usize,
    },
    #[error("could not allocate {size} bytes of backing storage")]
    Alloc { size: usize },
    #[error("unmapped physical address {0:#X}")]
    Unmapped(u32),
    #[error("physical address {0:#X} is not backed by memory")]
    NotMemory(u32),
    #[error("write to read-only memory at {0:#X}")]
    ReadOnly(u32),
}

/// Storage banks plus the region table
#[derive(Debug, Default)]
pub struct PhysMemory {
    banks: Vec<Box<[u8]>>,
    regions: Vec<Region>,
}

impl PhysMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zeroed storage bank
    pub fn alloc_bank(&mut self, size: usize) -> Result<BankId, MemError> {
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(size)
            .map_err(|_| MemError::Alloc { size })?;
        storage.resize(size, 0u8);
        self.banks.push(storage.into_boxed_slice());
        debug!("Allocated bank {} ({} KB)", self.banks.len() - 1, size / 1024);
        Ok(self.banks.len() - 1)
    }

    /// Register a region; rejects overlaps with any existing region
    pub fn add_region(
        &mut self,
        name: &'static str,
        base: u32,
        size: u32,
        backing: Backing,
    ) -> Result<Region, MemError> {
        let region = Region {
            name,
            base,
            size,
            backing,
        };

        if size == 0 || region.end() > 1u64 << 32 {
            return Err(MemError::BadSize { name, base });
        }

        match backing {
            Backing::Ram { bank } | Backing::Rom { bank, .. } => {
                if base % PAGE_SIZE != 0 || size % PAGE_SIZE != 0 {
                    return Err(MemError::Misaligned { name, base, size });
                }
                let len = self.bank_len(bank);
                if (size as usize) > len {
                    return Err(MemError::BankTooSmall {
                        name,
                        bank,
                        needed: size as usize,
                        len,
                    });
                }
            }
            Backing::Void | Backing::Mmio(_) => {}
        }

        if let Some(other) = self.regions.iter().find(|r| r.overlaps(&region)) {
            return Err(MemError::Overlap {
                name,
                base,
                other: other.name,
            });
        }

        debug!(
            "  Region {:<10} {:#010X} - {:#010X} {:?}",
            name,
            base,
            region.end(),
            backing
        );
        self.regions.push(region);
        Ok(region)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Find the region covering `addr`
    pub fn find(&self, addr: u32) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains(addr))
    }

    pub fn bank_len(&self, bank: BankId) -> usize {
        self.banks.get(bank).map_or(0, |b| b.len())
    }

    /// Raw pointer to a bank, for engines that map storage by address.
    ///
    /// The pointer stays valid until this `PhysMemory` is dropped.
    pub fn bank_ptr(&mut self, bank: BankId) -> Option<*mut u8> {
        self.banks.get_mut(bank).map(|b| b.as_mut_ptr())
    }

    pub fn bank(&self, bank: BankId) -> Option<&[u8]> {
        self.banks.get(bank).map(|b| &b[..])
    }

    /// Copy `data` into a bank, bypassing region permissions (ROM loading)
    pub fn load(&mut self, bank: BankId, offset: usize, data: &[u8]) -> Result<(), MemError> {
        let len = self.bank_len(bank);
        let needed = offset + data.len();
        let storage = self
            .banks
            .get_mut(bank)
            .filter(|_| needed <= len)
            .ok_or(MemError::BankTooSmall {
                name: "load",
                bank,
                needed,
                len,
            })?;
        storage[offset..needed].copy_from_slice(data);
        Ok(())
    }

    /// Resolve `addr` to a bank slot; `None` for void windows
    fn locate(&self, addr: u32, len: u32) -> Result<Option<(BankId, usize, &Region)>, MemError> {
        let region = self.find(addr).ok_or(MemError::Unmapped(addr))?;
        if addr as u64 + len as u64 > region.end() {
            return Err(MemError::Unmapped(region.end() as u32));
        }
        match region.backing {
            Backing::Ram { bank } | Backing::Rom { bank, .. } => {
                Ok(Some((bank, (addr - region.base) as usize, region)))
            }
            Backing::Void => Ok(None),
            Backing::Mmio(_) => Err(MemError::NotMemory(addr)),
        }
    }

    /// Read `buf.len()` bytes starting at `addr` (within one region)
    pub fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), MemError> {
        match self.locate(addr, buf.len() as u32)? {
            Some((bank, offset, _)) => {
                buf.copy_from_slice(&self.banks[bank][offset..offset + buf.len()]);
            }
            None => buf.fill(0),
        }
        Ok(())
    }

    /// Write `data` starting at `addr` (within one region)
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), MemError> {
        let (bank, offset) = match self.locate(addr, data.len() as u32)? {
            None => return Ok(()),
            Some((_, _, region)) if matches!(region.backing, Backing::Rom { chip, .. } if chip.write_faults()) => {
                return Err(MemError::ReadOnly(addr));
            }
            Some((_, _, region)) if matches!(region.backing, Backing::Rom { .. }) => {
                return Ok(());
            }
            Some((bank, offset, _)) => (bank, offset),
        };
        self.banks[bank][offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn read_u8(&self, addr: u32) -> Result<u8, MemError> {
        let mut b = [0u8; 1];
        self.read(addr, &mut b)?;
        Ok(b[0])
    }

    pub fn read_u16(&self, addr: u32) -> Result<u16, MemError> {
        let mut b = [0u8; 2];
        self.read(addr, &mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    pub fn read_u32(&self, addr: u32) -> Result<u32, MemError> {
        let mut b = [0u8; 4];
        self.read(addr, &mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub fn write_u8(&mut self, addr: u32, value: u8) -> Result<(), MemError> {
        self.write(addr, &[value])
    }

    pub fn write_u16(&mut self, addr: u32, value: u16) -> Result<(), MemError> {
        self.write(addr, &value.to_le_bytes())
    }

    pub fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), MemError> {
        self.write(addr, &value.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAM: u32 = 0xA000_0000;
    const SIZE: u32 = 0x10_0000;

    fn ram_with_mirror() -> PhysMemory {
        let mut mem = PhysMemory::new();
        let bank = mem.alloc_bank(SIZE as usize).unwrap();
        mem.add_region("ram", RAM, SIZE, Backing::Ram { bank }).unwrap();
        mem.add_region("ram-mirror", RAM + SIZE, SIZE, Backing::Ram { bank })
            .unwrap();
        mem
    }

    #[test]
    fn test_mirror_aliases_primary() {
        let mut mem = ram_with_mirror();

        mem.write_u32(RAM + 0x1234, 0xDEAD_BEEF).unwrap();
        assert_eq!(mem.read_u32(RAM + SIZE + 0x1234).unwrap(), 0xDEAD_BEEF);

        mem.write_u16(RAM + SIZE + 0x40, 0x55AA).unwrap();
        assert_eq!(mem.read_u16(RAM + 0x40).unwrap(), 0x55AA);
    }

    #[test]
    fn test_overlap_rejected() {
        let mut mem = ram_with_mirror();
        let err = mem
            .add_region("late", RAM + 0x1000, 0x10, Backing::Void)
            .unwrap_err();
        assert_eq!(
            err,
            MemError::Overlap {
                name: "late",
                base: RAM + 0x1000,
                other: "ram"
            }
        );
        // Touching but not overlapping is fine
        mem.add_region("after", RAM + 2 * SIZE, 0x1000, Backing::Void)
            .unwrap();
    }

    #[test]
    fn test_backed_regions_must_be_page_aligned() {
        let mut mem = PhysMemory::new();
        let bank = mem.alloc_bank(0x2000).unwrap();
        assert!(matches!(
            mem.add_region("odd", 0x800, 0x1000, Backing::Ram { bank }),
            Err(MemError::Misaligned { .. })
        ));
        assert!(matches!(
            mem.add_region("big", 0, 0x3000, Backing::Ram { bank }),
            Err(MemError::BankTooSmall { .. })
        ));
        // MMIO windows may be unaligned
        mem.add_region(
            "i2c",
            0x4030_1680,
            0x30,
            Backing::Mmio(DeviceId::I2c),
        )
        .unwrap();
    }

    #[test]
    fn test_rom_write_policy() {
        let mut mem = PhysMemory::new();
        let quiet = mem.alloc_bank(0x1000).unwrap();
        let loud = mem.alloc_bank(0x1000).unwrap();
        mem.load(quiet, 0, &[1, 2, 3, 4]).unwrap();
        mem.add_region(
            "rom0",
            0,
            0x1000,
            Backing::Rom {
                bank: quiet,
                chip: RomChipType::WriteIgnore,
            },
        )
        .unwrap();
        mem.add_region(
            "rom1",
            0x1000,
            0x1000,
            Backing::Rom {
                bank: loud,
                chip: RomChipType::WriteError,
            },
        )
        .unwrap();

        mem.write_u32(0, 0xFFFF_FFFF).unwrap();
        assert_eq!(mem.read_u32(0).unwrap(), 0x0403_0201);
        assert_eq!(mem.write_u8(0x1000, 1), Err(MemError::ReadOnly(0x1000)));
    }

    #[test]
    fn test_unmapped_and_mmio_access() {
        let mut mem = ram_with_mirror();
        mem.add_region("gpio", 0x40E0_0000, 0x1000, Backing::Mmio(DeviceId::Gpio))
            .unwrap();
        assert_eq!(mem.read_u32(0x1000_0000), Err(MemError::Unmapped(0x1000_0000)));
        assert_eq!(mem.read_u32(0x40E0_0000), Err(MemError::NotMemory(0x40E0_0000)));
        // Crossing the end of a region is a fault
        assert!(mem.read_u32(RAM + 2 * SIZE - 2).is_err());
    }

    #[test]
    fn test_void_reads_zero() {
        let mut mem = PhysMemory::new();
        mem.add_region("void", 0x1000, 0x1000, Backing::Void).unwrap();
        mem.write_u32(0x1000, 5).unwrap();
        assert_eq!(mem.read_u32(0x1000).unwrap(), 0);
    }
}
