//! Peripheral register windows.
//!
//! Each module carries the window `BASE` and `SIZE`, the interrupt line the
//! block raises and, where the emulator models them, the register offsets
//! (relative to `BASE`) and bit assignments.
//!
//! # References
//! - PXA255 Processor Developer's Manual, appendix A "Register Summary"
//! - PXA27x Processor Family Developer's Manual, chapter 27 "Register Summary"

pub mod dma;
pub mod lcd;
pub mod mmc;

/// Interrupt controller
pub mod intc {
    pub const BASE: u32 = 0x40D0_0000;
    pub const SIZE: u32 = 0x1000;

    pub mod registers {
        /// IRQ pending (pending & mask & !level)
        pub const ICIP: u32 = 0x00;
        /// Mask register
        pub const ICMR: u32 = 0x04;
        /// Level register (1 = FIQ)
        pub const ICLR: u32 = 0x08;
        /// FIQ pending (pending & mask & level)
        pub const ICFP: u32 = 0x0C;
        /// Raw pending
        pub const ICPR: u32 = 0x10;
        /// Control register (bit 0 = DIM, only unmasked sources wake from idle)
        pub const ICCR: u32 = 0x14;
        /// Highest priority pending (PXA27x)
        pub const ICHP: u32 = 0x18;
        /// Second bank (PXA27x sources 32..64)
        pub const ICIP2: u32 = 0x9C;
        pub const ICMR2: u32 = 0xA0;
        pub const ICLR2: u32 = 0xA4;
        pub const ICFP2: u32 = 0xA8;
        pub const ICPR2: u32 = 0xAC;
    }
}

/// OS timer
pub mod ost {
    pub const BASE: u32 = 0x40A0_0000;
    pub const SIZE: u32 = 0x1000;

    pub mod registers {
        /// Match registers 0..3 at 0x00, 0x04, 0x08, 0x0C
        pub const OSMR0: u32 = 0x00;
        /// Counter
        pub const OSCR: u32 = 0x10;
        /// Status (write 1 to clear)
        pub const OSSR: u32 = 0x14;
        /// Watchdog enable
        pub const OWER: u32 = 0x18;
        /// Interrupt enable
        pub const OIER: u32 = 0x1C;
    }

    /// Number of match channels
    pub const CHANNELS: usize = 4;
}

/// Real-time clock
pub mod rtc {
    pub const BASE: u32 = 0x4090_0000;
    pub const SIZE: u32 = 0x1000;

    pub mod registers {
        pub const RCNR: u32 = 0x00;
        pub const RTAR: u32 = 0x04;
        pub const RTSR: u32 = 0x08;
        pub const RTTR: u32 = 0x0C;
    }

    /// RTSR bits
    pub mod status {
        /// Alarm detected
        pub const AL: u32 = 1 << 0;
        /// 1 Hz tick detected
        pub const HZ: u32 = 1 << 1;
        /// Alarm interrupt enable
        pub const ALE: u32 = 1 << 2;
        /// 1 Hz interrupt enable
        pub const HZE: u32 = 1 << 3;
    }
}

/// 16550-compatible UARTs
pub mod uart {
    pub const FFUART_BASE: u32 = 0x4010_0000;
    pub const BTUART_BASE: u32 = 0x4020_0000;
    pub const STUART_BASE: u32 = 0x4070_0000;
    /// Hardware UART (PXA25x/PXA26x)
    pub const HWUART_BASE: u32 = 0x4160_0000;
    pub const SIZE: u32 = 0x1000;

    /// Receive and transmit FIFO depth
    pub const FIFO_DEPTH: usize = 64;

    pub mod registers {
        /// RBR on read, THR on write, DLL with LCR.DLAB
        pub const DATA: u32 = 0x00;
        /// IER, DLH with LCR.DLAB
        pub const IER: u32 = 0x04;
        /// IIR on read, FCR on write
        pub const IIR: u32 = 0x08;
        pub const LCR: u32 = 0x0C;
        pub const MCR: u32 = 0x10;
        pub const LSR: u32 = 0x14;
        pub const MSR: u32 = 0x18;
        pub const SPR: u32 = 0x1C;
        pub const ISR: u32 = 0x20;
    }

    /// IER bits
    pub mod ier {
        pub const RAVIE: u32 = 0x01;
        pub const TIE: u32 = 0x02;
        /// Unit enable
        pub const UUE: u32 = 0x40;
    }

    /// LSR bits
    pub mod lsr {
        pub const DR: u32 = 0x01;
        pub const OE: u32 = 0x02;
        pub const TDRQ: u32 = 0x20;
        pub const TEMT: u32 = 0x40;
    }

    /// FCR bits
    pub mod fcr {
        pub const TRFIFOE: u32 = 0x01;
        pub const RESETRF: u32 = 0x02;
        pub const RESETTF: u32 = 0x04;
    }

    /// LCR divisor latch access bit
    pub const LCR_DLAB: u32 = 0x80;
    /// IIR value when no interrupt is pending
    pub const IIR_NO_INT: u32 = 0x01;
    /// IIR interrupt id: transmit FIFO requests data
    pub const IIR_TX: u32 = 0x02;
    /// IIR interrupt id: received data available
    pub const IIR_RX: u32 = 0x04;
    /// IIR bits reporting enabled FIFOs
    pub const IIR_FIFOES: u32 = 0xC0;
}

/// GPIO controller
pub mod gpio {
    pub const BASE: u32 = 0x40E0_0000;
    pub const SIZE: u32 = 0x1000;

    /// GPIO pins on PXA25x/PXA26x (three 32-bit banks, 85 used)
    pub const BANKS_PXA25X: usize = 3;
    /// GPIO pins on PXA27x (four 32-bit banks, 121 used)
    pub const BANKS_PXA27X: usize = 4;

    /// Register group offsets for banks 0..3; each group is indexed by
    /// `4 * bank` for banks 0..3, except bank 3 which lives at `BANK3_*`.
    pub mod registers {
        pub const GPLR: u32 = 0x00;
        pub const GPDR: u32 = 0x0C;
        pub const GPSR: u32 = 0x18;
        pub const GPCR: u32 = 0x24;
        pub const GRER: u32 = 0x30;
        pub const GFER: u32 = 0x3C;
        pub const GEDR: u32 = 0x48;
        /// Alternate function registers, 2 bits per pin, 8 registers
        pub const GAFR: u32 = 0x54;

        pub const BANK3_GPLR: u32 = 0x100;
        pub const BANK3_GPDR: u32 = 0x10C;
        pub const BANK3_GPSR: u32 = 0x118;
        pub const BANK3_GPCR: u32 = 0x124;
        pub const BANK3_GRER: u32 = 0x130;
        pub const BANK3_GFER: u32 = 0x13C;
        pub const BANK3_GEDR: u32 = 0x148;
    }
}

/// Synchronous serial ports
pub mod ssp {
    pub const SSP1_BASE: u32 = 0x4100_0000;
    /// Network SSP (PXA25x/PXA26x)
    pub const NSSP_BASE: u32 = 0x4140_0000;
    /// Audio SSP (PXA26x)
    pub const ASSP_BASE: u32 = 0x4150_0000;
    /// SSP2 (PXA27x)
    pub const SSP2_BASE: u32 = 0x4170_0000;
    /// SSP3 (PXA27x)
    pub const SSP3_BASE: u32 = 0x4190_0000;
    pub const SIZE: u32 = 0x1000;

    /// FIFO depth in words
    pub const FIFO_DEPTH: usize = 16;

    pub mod registers {
        pub const SSCR0: u32 = 0x00;
        pub const SSCR1: u32 = 0x04;
        pub const SSSR: u32 = 0x08;
        pub const SSITR: u32 = 0x0C;
        pub const SSDR: u32 = 0x10;
    }

    /// SSCR0 port enable
    pub const SSCR0_SSE: u32 = 1 << 7;

    /// SSCR1 bits
    pub mod sscr1 {
        pub const RIE: u32 = 0x01;
        pub const TIE: u32 = 0x02;
        /// Loopback mode
        pub const LBM: u32 = 0x04;
    }

    /// SSSR bits
    pub mod sssr {
        pub const TNF: u32 = 0x04;
        pub const RNE: u32 = 0x08;
        pub const BSY: u32 = 0x10;
        pub const TFS: u32 = 0x20;
        pub const RFS: u32 = 0x40;
        pub const ROR: u32 = 0x80;
    }
}

/// AC97 controller
pub mod ac97 {
    pub const BASE: u32 = 0x4050_0000;
    pub const SIZE: u32 = 0x1000;

    pub mod registers {
        /// PCM out control
        pub const POCR: u32 = 0x00;
        /// PCM in control
        pub const PICR: u32 = 0x04;
        /// Global control
        pub const GCR: u32 = 0x0C;
        /// PCM out status
        pub const POSR: u32 = 0x10;
        /// PCM in status
        pub const PISR: u32 = 0x14;
        /// Global status
        pub const GSR: u32 = 0x1C;
        /// Codec access
        pub const CAR: u32 = 0x20;
        /// PCM data
        pub const PCDR: u32 = 0x40;
        /// Primary audio codec register window
        pub const CODEC_BASE: u32 = 0x200;
        pub const CODEC_END: u32 = 0x300;
    }

    /// POCR FIFO service request interrupt enable
    pub const POCR_FSRIE: u32 = 1 << 1;
    /// POCR FIFO error interrupt enable
    pub const POCR_FEIE: u32 = 1 << 3;
    /// POSR FIFO error (underrun)
    pub const POSR_FIFOE: u32 = 1 << 4;
    /// POSR FIFO service request
    pub const POSR_FSR: u32 = 1 << 2;
    /// GSR primary codec ready
    pub const GSR_PCR: u32 = 1 << 8;
    /// GSR command done
    pub const GSR_CDONE: u32 = 1 << 19;
    /// GSR status done
    pub const GSR_SDONE: u32 = 1 << 18;
    /// GCR cold reset (active low)
    pub const GCR_COLD_RST: u32 = 1 << 1;

    /// PCM FIFO depth in samples
    pub const FIFO_DEPTH: usize = 16;
}

/// I2S controller
pub mod i2s {
    pub const BASE: u32 = 0x4040_0000;
    pub const SIZE: u32 = 0x1000;

    pub mod registers {
        pub const SACR0: u32 = 0x00;
        pub const SACR1: u32 = 0x04;
        pub const SASR0: u32 = 0x0C;
        pub const SAIMR: u32 = 0x14;
        pub const SAICR: u32 = 0x18;
        pub const SADIV: u32 = 0x60;
        pub const SADR: u32 = 0x80;
    }

    /// SACR0 enable
    pub const SACR0_ENB: u32 = 0x01;
    /// SACR0 transmit FIFO threshold field
    pub const SACR0_TFTH_SHIFT: u32 = 8;
    /// SAICR bit clearing the transmit underrun status
    pub const SAICR_TUR: u32 = 0x20;

    /// Transmit and receive FIFO depth in samples
    pub const FIFO_DEPTH: usize = 16;

    /// SASR0 bits (SAIMR uses the same positions)
    pub mod status {
        pub const TNF: u32 = 0x01;
        pub const RNE: u32 = 0x02;
        pub const BSY: u32 = 0x04;
        pub const TFS: u32 = 0x08;
        pub const RFS: u32 = 0x10;
        pub const TUR: u32 = 0x20;
    }
}

/// I2C bus controller
pub mod i2c {
    pub const BASE: u32 = 0x4030_1680;
    pub const SIZE: u32 = 0x30;

    pub mod registers {
        pub const IBMR: u32 = 0x00;
        pub const IDBR: u32 = 0x08;
        pub const ICR: u32 = 0x10;
        pub const ISR: u32 = 0x18;
        pub const ISAR: u32 = 0x20;
    }

    /// ICR bits
    pub mod icr {
        pub const START: u32 = 0x0001;
        pub const STOP: u32 = 0x0002;
        pub const TB: u32 = 0x0008;
        pub const IUE: u32 = 0x0040;
        pub const ITEIE: u32 = 0x0100;
        pub const IRFIE: u32 = 0x0200;
    }

    /// ISR bits
    pub mod isr {
        pub const RWM: u32 = 0x0001;
        pub const ACKNAK: u32 = 0x0002;
        pub const UB: u32 = 0x0004;
        pub const IBB: u32 = 0x0008;
        pub const ITE: u32 = 0x0040;
        pub const IRF: u32 = 0x0080;
    }
}

/// PWM channels
pub mod pwm {
    pub const PWM0_BASE: u32 = 0x40B0_0000;
    pub const PWM1_BASE: u32 = 0x40C0_0000;
    /// PXA27x only
    pub const PWM2_BASE: u32 = 0x40B0_0010;
    /// PXA27x only
    pub const PWM3_BASE: u32 = 0x40C0_0010;
    pub const SIZE: u32 = 0x10;

    pub mod registers {
        pub const PWMCR: u32 = 0x00;
        pub const PWMDCR: u32 = 0x04;
        pub const PWMPCR: u32 = 0x08;
    }
}

/// Memory controller
pub mod memctrl {
    pub const BASE: u32 = 0x4800_0000;
    pub const SIZE: u32 = 0x1000;

    pub mod registers {
        pub const MDCNFG: u32 = 0x00;
        pub const MDREFR: u32 = 0x04;
        pub const MSC0: u32 = 0x08;
        pub const MSC1: u32 = 0x0C;
        pub const MSC2: u32 = 0x10;
        pub const MECR: u32 = 0x14;
        pub const SXCNFG: u32 = 0x1C;
        pub const MDMRS: u32 = 0x40;
        pub const BOOT_DEF: u32 = 0x44;
        /// PXA27x arbiter control
        pub const ARB_CNTL: u32 = 0x48;
    }
}

/// Power manager and clock manager
pub mod pwrclk {
    pub const PWRMAN_BASE: u32 = 0x40F0_0000;
    pub const PWRMAN_SIZE: u32 = 0x1000;
    pub const CLKMAN_BASE: u32 = 0x4130_0000;
    pub const CLKMAN_SIZE: u32 = 0x1000;

    pub mod registers {
        pub const PMCR: u32 = 0x00;
        pub const PSSR: u32 = 0x04;
        pub const PSPR: u32 = 0x08;
        pub const PWER: u32 = 0x0C;
        /// Reset controller status
        pub const RCSR: u32 = 0x30;

        pub const CCCR: u32 = 0x00;
        pub const CKEN: u32 = 0x04;
        pub const OSCC: u32 = 0x08;
        /// PXA27x core clock status
        pub const CCSR: u32 = 0x0C;
    }

    /// RCSR hardware reset
    pub const RCSR_HWR: u32 = 0x01;
    /// OSCC oscillator OK
    pub const OSCC_OOK: u32 = 0x01;
}

/// USB device controller (first generation on PXA25x/PXA26x, second on PXA27x)
pub mod udc {
    pub const BASE: u32 = 0x4060_0000;
    pub const SIZE: u32 = 0x1000;

    pub mod registers {
        pub const UDCCR: u32 = 0x00;
    }
}

/// Keypad controller (PXA27x)
pub mod kpc {
    pub const BASE: u32 = 0x4150_0000;
    pub const SIZE: u32 = 0x1000;

    pub mod registers {
        pub const KPC: u32 = 0x00;
        pub const KPDK: u32 = 0x08;
        pub const KPREC: u32 = 0x10;
        pub const KPMK: u32 = 0x18;
        pub const KPAS: u32 = 0x20;
        pub const KPKDI: u32 = 0x48;
    }

    /// KPC direct keypad enable
    pub const KPC_DE: u32 = 1 << 1;
    /// KPC direct keypad interrupt enable
    pub const KPC_DIE: u32 = 1 << 0;
    /// KPC direct keypad interrupt pending
    pub const KPC_DI: u32 = 1 << 5;
    /// KPC matrix keypad interrupt enable
    pub const KPC_MIE: u32 = 1 << 11;
    /// KPC matrix keypad enable
    pub const KPC_ME: u32 = 1 << 12;
    /// KPC matrix keypad interrupt pending
    pub const KPC_MI: u32 = 1 << 22;
    /// KPDK direct key pressed since last read
    pub const KPDK_DKP: u32 = 1 << 31;
}

/// Internal memory controller (PXA27x)
pub mod imc {
    pub const BASE: u32 = 0x5800_0000;
    pub const SIZE: u32 = 0x1000;

    pub mod registers {
        pub const IMPMCR: u32 = 0x00;
        pub const IMPMSR: u32 = 0x08;
    }
}
