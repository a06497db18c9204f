//! # References
//! - PXA255 Processor Developer's Manual, chapter 2 "System Architecture"
//! - PXA27x Processor Family Developer's Manual, table 2-2 "Memory Map"

/// Boot ROM / NOR flash, chip select 0
///
/// The CPU fetches its reset vector from here.
pub mod rom {
    /// ROM base address
    pub const BASE: u32 = 0x0000_0000;
    /// Largest ROM window we accept (chip selects 0 and 1, 64 MB each)
    pub const MAX_SIZE: usize = 128 * 1024 * 1024;
}

/// SDRAM bank 0
///
/// The RAM size is a device property; the mirror window begins directly after
/// the populated RAM so firmware size probes see the storage repeat.
pub mod ram {
    /// SDRAM base address
    pub const BASE: u32 = 0xA000_0000;
    /// Upper bound of the SDRAM partition (4 banks of 64 MB)
    pub const END: u32 = 0xB000_0000;
}

/// Small internal SRAM bank
pub mod sram {
    /// Internal SRAM base address
    pub const BASE: u32 = 0x5C00_0000;
    /// Internal SRAM size (256 KB)
    pub const SIZE: usize = 256 * 1024;
}

/// Peripheral partition boundaries
pub mod peripherals {
    /// Start of the memory-mapped register partition
    pub const BASE: u32 = 0x4000_0000;
    /// End of the memory-mapped register partition (exclusive)
    pub const END: u32 = 0x6000_0000;
}

/// Smallest mapping granule the CPU engine accepts
pub const PAGE_SIZE: u32 = 0x1000;
