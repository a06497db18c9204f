//! # References
//! - PXA255 Developer's Manual, chapter 5 "DMA Controller"
//! - PXA27x Developer's Manual, chapter 5 "DMA Controller"

/// DMA controller MMIO region base address
pub const BASE: u32 = 0x4000_0000;

/// DMA controller MMIO region size (covers the PXA27x high DRCMR bank)
pub const SIZE: u32 = 0x2000;

/// Channel count on the PXA25x/PXA26x
pub const CHANNELS_PXA25X: usize = 16;

/// Channel count on the PXA27x
pub const CHANNELS_PXA27X: usize = 32;

/// Request line count on the PXA27x (PXA25x uses the first 40)
pub const REQUESTS: usize = 75;

/// DMA register offsets (relative to `BASE`)
pub mod registers {
    /// Channel control/status, `4 * channel`
    pub const DCSR: u32 = 0x000;

    /// Alignment register (PXA27x)
    pub const DALGN: u32 = 0x0A0;

    /// Programmed I/O control status (PXA27x)
    pub const DPCSR: u32 = 0x0A4;

    /// Interrupt register, one bit per channel
    pub const DINT: u32 = 0x0F0;

    /// Request to channel map for requests 0..64, `4 * request`
    pub const DRCMR: u32 = 0x100;

    /// Request to channel map for requests 64.., `4 * (request - 64)`
    pub const DRCMR_HI: u32 = 0x1100;

    /// Descriptor registers, `16 * channel`
    pub const DDADR: u32 = 0x200;
    pub const DSADR: u32 = 0x204;
    pub const DTADR: u32 = 0x208;
    pub const DCMD: u32 = 0x20C;
}

/// DCSR bits
pub mod dcsr {
    /// Bus error interrupt
    pub const BUSERRINTR: u32 = 1 << 0;
    /// Start interrupt
    pub const STARTINTR: u32 = 1 << 1;
    /// End interrupt
    pub const ENDINTR: u32 = 1 << 2;
    /// Stopped
    pub const STOPSTATE: u32 = 1 << 3;
    /// Request pending
    pub const REQPEND: u32 = 1 << 8;
    /// Stop interrupt enable
    pub const STOPIRQEN: u32 = 1 << 29;
    /// No-descriptor fetch mode
    pub const NODESCFETCH: u32 = 1 << 30;
    /// Run
    pub const RUN: u32 = 1 << 31;

    /// Bits cleared by writing 1
    pub const WRITE_CLEAR: u32 = BUSERRINTR | STARTINTR | ENDINTR;
}

/// DCMD bits
pub mod dcmd {
    /// Transfer length mask
    pub const LENGTH: u32 = 0x1FFF;
    /// End interrupt enable
    pub const ENDIRQEN: u32 = 1 << 21;
    /// Start interrupt enable
    pub const STARTIRQEN: u32 = 1 << 22;
    /// Target flow control
    pub const FLOWTRG: u32 = 1 << 28;
    /// Source flow control
    pub const FLOWSRC: u32 = 1 << 29;
    /// Increment target address
    pub const INCTRGADDR: u32 = 1 << 30;
    /// Increment source address
    pub const INCSRCADDR: u32 = 1 << 31;
}

/// DDADR stop bit
pub const DDADR_STOP: u32 = 1 << 0;

/// DRCMR map valid bit
pub const DRCMR_MAPVLD: u32 = 1 << 7;

/// DRCMR channel number mask
pub const DRCMR_CHLNUM: u32 = 0x1F;

/// Request line numbers
pub mod requests {
    pub const I2S_RX: u8 = 2;
    pub const I2S_TX: u8 = 3;
    pub const BTUART_RX: u8 = 4;
    pub const BTUART_TX: u8 = 5;
    pub const FFUART_RX: u8 = 6;
    pub const FFUART_TX: u8 = 7;
    pub const AC97_MIC: u8 = 8;
    pub const AC97_AUDIO_RX: u8 = 11;
    pub const AC97_AUDIO_TX: u8 = 12;
    pub const SSP_RX: u8 = 13;
    pub const SSP_TX: u8 = 14;
    pub const NSSP_RX: u8 = 15;
    pub const NSSP_TX: u8 = 16;
    pub const STUART_RX: u8 = 19;
    pub const STUART_TX: u8 = 20;
    pub const MMC_RX: u8 = 21;
    pub const MMC_TX: u8 = 22;
    pub const ASSP_RX: u8 = 23;
    pub const ASSP_TX: u8 = 24;
    pub const SSP2_RX: u8 = 66;
    pub const SSP2_TX: u8 = 67;
    pub const SSP3_RX: u8 = 70;
    pub const SSP3_TX: u8 = 71;
}
