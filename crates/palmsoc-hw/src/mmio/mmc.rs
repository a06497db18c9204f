//! # References
//! - PXA255 Developer's Manual, chapter 15 "MultiMediaCard Controller"
//! - SD Physical Layer Simplified Specification, version 2.00

/// MMC controller MMIO region base address
pub const BASE: u32 = 0x4110_0000;

/// MMC controller MMIO region size
pub const SIZE: u32 = 0x1000;

/// Receive and transmit FIFO depth in bytes
pub const FIFO_DEPTH: usize = 32;

/// MMC register offsets (relative to `BASE`)
pub mod registers {
    /// Start/stop clock
    pub const STRPCL: u32 = 0x00;
    /// Status
    pub const STAT: u32 = 0x04;
    /// Clock rate
    pub const CLKRT: u32 = 0x08;
    /// SPI mode control
    pub const SPI: u32 = 0x0C;
    /// Command and data control
    pub const CMDAT: u32 = 0x10;
    /// Response timeout
    pub const RESTO: u32 = 0x14;
    /// Read timeout
    pub const RDTO: u32 = 0x18;
    /// Block length
    pub const BLKLEN: u32 = 0x1C;
    /// Block count
    pub const NOB: u32 = 0x20;
    /// Partial buffer full
    pub const PRTBUF: u32 = 0x24;
    /// Interrupt mask (1 = masked)
    pub const I_MASK: u32 = 0x28;
    /// Interrupt request
    pub const I_REG: u32 = 0x2C;
    /// Command index
    pub const CMD: u32 = 0x30;
    /// Argument high half
    pub const ARGH: u32 = 0x34;
    /// Argument low half
    pub const ARGL: u32 = 0x38;
    /// Response FIFO (16-bit entries)
    pub const RES: u32 = 0x3C;
    /// Receive data FIFO
    pub const RXFIFO: u32 = 0x40;
    /// Transmit data FIFO
    pub const TXFIFO: u32 = 0x44;
}

/// STRPCL commands
pub mod strpcl {
    pub const STOP_CLK: u32 = 0x1;
    pub const START_CLK: u32 = 0x2;
}

/// STAT bits
pub mod stat {
    pub const TIME_OUT_READ: u32 = 1 << 0;
    pub const TIME_OUT_RESPONSE: u32 = 1 << 1;
    pub const CRC_READ_ERROR: u32 = 1 << 3;
    pub const XMIT_FIFO_EMPTY: u32 = 1 << 6;
    pub const RECV_FIFO_FULL: u32 = 1 << 7;
    pub const CLK_EN: u32 = 1 << 8;
    pub const DATA_TRAN_DONE: u32 = 1 << 11;
    pub const PRG_DONE: u32 = 1 << 12;
    pub const END_CMD_RES: u32 = 1 << 13;
}

/// I_REG / I_MASK bits
pub mod ireg {
    pub const DATA_TRAN_DONE: u32 = 1 << 0;
    pub const PRG_DONE: u32 = 1 << 1;
    pub const END_CMD_RES: u32 = 1 << 2;
    pub const STOP_CMD: u32 = 1 << 3;
    pub const CLK_IS_OFF: u32 = 1 << 4;
    pub const RXFIFO_RD_REQ: u32 = 1 << 5;
    pub const TXFIFO_WR_REQ: u32 = 1 << 6;
}

/// CMDAT bits
pub mod cmdat {
    /// Response format mask (0 none, 1 R1/R4/R5/R6, 2 R2, 3 R3)
    pub const RESPONSE_FORMAT: u32 = 0x3;
    /// Data transfer follows the command
    pub const DATA_EN: u32 = 1 << 2;
    /// Data direction is card-bound
    pub const WRITE: u32 = 1 << 3;
    /// Card requires 80 initialization clocks
    pub const INIT: u32 = 1 << 6;
}

/// SD card commands
pub mod commands {
    pub const GO_IDLE_STATE: u8 = 0;
    pub const ALL_SEND_CID: u8 = 2;
    pub const SEND_RELATIVE_ADDR: u8 = 3;
    pub const SELECT_CARD: u8 = 7;
    pub const SEND_IF_COND: u8 = 8;
    pub const SEND_CSD: u8 = 9;
    pub const STOP_TRANSMISSION: u8 = 12;
    pub const SEND_STATUS: u8 = 13;
    pub const SET_BLOCKLEN: u8 = 16;
    pub const READ_SINGLE_BLOCK: u8 = 17;
    pub const READ_MULTIPLE_BLOCK: u8 = 18;
    pub const WRITE_BLOCK: u8 = 24;
    pub const WRITE_MULTIPLE_BLOCK: u8 = 25;
    pub const APP_CMD: u8 = 55;

    /// Application commands (preceded by APP_CMD)
    pub const ACMD_SET_BUS_WIDTH: u8 = 6;
    pub const ACMD_SD_SEND_OP_COND: u8 = 41;
    pub const ACMD_SEND_SCR: u8 = 51;
}

/// SD sector size in bytes
pub const SECTOR_SIZE: usize = 512;
