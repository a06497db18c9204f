//! Interrupt controller.
//!
//! Sources drive their line level with [`InterruptController::set`]; the
//! controller combines pending, mask and level (IRQ vs FIQ routing) into the
//! two outputs the CPU samples before every instruction.

use palmsoc_hw::mmio::intc::registers as reg;
use tracing::{trace, warn};

#[derive(Debug, Clone)]
pub struct InterruptController {
    lines: u8,
    pending: u64,
    mask: u64,
    level: u64,
    iccr: u32,
}

impl InterruptController {
    pub fn new(lines: u8) -> Self {
        Self {
            lines,
            pending: 0,
            mask: 0,
            level: 0,
            iccr: 0,
        }
    }

    pub fn lines(&self) -> u8 {
        self.lines
    }

    /// Drive `line` high or low
    pub fn set(&mut self, line: u8, asserted: bool) {
        if line >= self.lines {
            warn!("INTC: source {} does not exist on this part", line);
            return;
        }
        let bit = 1u64 << line;
        let before = self.pending;
        if asserted {
            self.pending |= bit;
        } else {
            self.pending &= !bit;
        }
        if before != self.pending {
            trace!("INTC: line {} -> {}", line, asserted);
        }
    }

    pub fn raise(&mut self, line: u8) {
        self.set(line, true);
    }

    pub fn lower(&mut self, line: u8) {
        self.set(line, false);
    }

    pub fn is_pending(&self, line: u8) -> bool {
        line < self.lines && self.pending & (1 << line) != 0
    }

    fn irq_bits(&self) -> u64 {
        self.pending & self.mask & !self.level
    }

    fn fiq_bits(&self) -> u64 {
        self.pending & self.mask & self.level
    }

    /// IRQ output to the core
    pub fn irq_asserted(&self) -> bool {
        self.irq_bits() != 0
    }

    /// FIQ output to the core
    pub fn fiq_asserted(&self) -> bool {
        self.fiq_bits() != 0
    }

    /// ICHP: highest priority pending IRQ and FIQ (lowest line number wins)
    fn highest_pending(&self) -> u32 {
        let mut value = 0;
        let irq = self.irq_bits();
        if irq != 0 {
            value |= 1 << 31 | (irq.trailing_zeros() << 16);
        }
        let fiq = self.fiq_bits();
        if fiq != 0 {
            value |= 1 << 15 | fiq.trailing_zeros();
        }
        value
    }

    pub fn read(&self, offset: u32) -> u32 {
        let wide = self.lines > 32;
        let value = match offset {
            reg::ICIP => self.irq_bits() as u32,
            reg::ICMR => self.mask as u32,
            reg::ICLR => self.level as u32,
            reg::ICFP => self.fiq_bits() as u32,
            reg::ICPR => self.pending as u32,
            reg::ICCR => self.iccr,
            reg::ICHP if wide => self.highest_pending(),
            reg::ICIP2 if wide => (self.irq_bits() >> 32) as u32,
            reg::ICMR2 if wide => (self.mask >> 32) as u32,
            reg::ICLR2 if wide => (self.level >> 32) as u32,
            reg::ICFP2 if wide => (self.fiq_bits() >> 32) as u32,
            reg::ICPR2 if wide => (self.pending >> 32) as u32,
            _ => {
                warn!("Unknown INTC register read: offset={:#X}", offset);
                0
            }
        };
        trace!("INTC read: offset={:#X}, value={:#X}", offset, value);
        value
    }

    pub fn write(&mut self, offset: u32, value: u32) {
        trace!("INTC write: offset={:#X}, value={:#X}", offset, value);
        let wide = self.lines > 32;
        let low = |old: u64| (old & !0xFFFF_FFFF) | value as u64;
        let high = |old: u64| (old & 0xFFFF_FFFF) | (value as u64) << 32;
        match offset {
            reg::ICMR => self.mask = low(self.mask),
            reg::ICLR => self.level = low(self.level),
            reg::ICCR => self.iccr = value & 1,
            reg::ICMR2 if wide => self.mask = high(self.mask),
            reg::ICLR2 if wide => self.level = high(self.level),
            reg::ICIP | reg::ICFP | reg::ICPR | reg::ICIP2 | reg::ICFP2 | reg::ICPR2 => {
                trace!("INTC: ignoring write to read-only register {:#X}", offset);
            }
            _ => warn!(
                "Unknown INTC register write: offset={:#X}, value={:#X}",
                offset, value
            ),
        }
    }
}
