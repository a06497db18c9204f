//! # References
//! - PXA255 Developer's Manual, chapter 7 "LCD Controller"
//! - PXA27x Developer's Manual, chapter 7 "LCD Controller"

/// LCD controller MMIO region base address
pub const BASE: u32 = 0x4400_0000;

/// LCD controller MMIO region size
pub const SIZE: u32 = 0x1000;

/// LCD register offsets (relative to `BASE`)
pub mod registers {
    /// Control registers 0..3
    pub const LCCR0: u32 = 0x000;
    pub const LCCR1: u32 = 0x004;
    pub const LCCR2: u32 = 0x008;
    pub const LCCR3: u32 = 0x00C;

    /// DMA channel 0 frame branch
    pub const FBR0: u32 = 0x020;

    /// Status register (write 1 to clear)
    pub const LCSR: u32 = 0x038;

    /// Interrupt ID
    pub const LIIDR: u32 = 0x03C;

    /// DMA channel 0 frame descriptor address
    pub const FDADR0: u32 = 0x200;

    /// DMA channel 0 frame source address (read only)
    pub const FSADR0: u32 = 0x204;

    /// DMA channel 0 frame ID (read only)
    pub const FIDR0: u32 = 0x208;

    /// DMA channel 0 command (read only)
    pub const LDCMD0: u32 = 0x20C;
}

/// LCCR0 bits
pub mod lccr0 {
    /// Controller enable
    pub const ENB: u32 = 1 << 0;
    /// Disable
    pub const DIS: u32 = 1 << 10;
    /// End of frame mask (1 = no interrupt)
    pub const EFM: u32 = 1 << 6;
}

/// LCSR bits
pub mod lcsr {
    /// LCD disable done
    pub const LDD: u32 = 1 << 0;
    /// Start of frame
    pub const SOF: u32 = 1 << 1;
    /// Bus error
    pub const BER: u32 = 1 << 2;
    /// End of frame
    pub const EOF: u32 = 1 << 8;
}

/// LCCR3 bits per pixel field
pub const LCCR3_BPP_SHIFT: u32 = 24;
/// LCCR3 bits per pixel mask (after shifting)
pub const LCCR3_BPP_MASK: u32 = 0x7;
/// LCCR3 BPP encoding for 16 bits per pixel
pub const BPP_16: u32 = 4;

/// Frame descriptor layout in memory (word offsets from the descriptor address)
pub mod descriptor {
    pub const FDADR: u32 = 0x0;
    pub const FSADR: u32 = 0x4;
    pub const FIDR: u32 = 0x8;
    pub const LDCMD: u32 = 0xC;

    /// LDCMD length mask in bytes
    pub const LEN_MASK: u32 = 0x001F_FFFF;
    /// LDCMD palette load
    pub const PAL: u32 = 1 << 26;
}
