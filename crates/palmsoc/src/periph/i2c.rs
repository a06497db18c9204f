//! I2C bus controller, master mode only.
//!
//! A byte transfer started by setting ICR.TB completes immediately: the
//! addressed target (if one is attached) acknowledges or not, and the
//! controller reports ITE or IRF on the next status read.

use super::Peripheral;
use super::intc::InterruptController;
use palmsoc_hw::irq;
use palmsoc_hw::mmio::i2c::{icr, isr, registers as reg};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// Target device on the bus
pub trait I2cTarget {
    /// Receive a byte from the master; returns whether it was acknowledged
    fn write(&mut self, byte: u8) -> bool;

    /// Provide a byte to the master
    fn read(&mut self) -> u8;
}

pub struct I2c {
    base: u32,
    icr: u32,
    isr: u32,
    idbr: u32,
    isar: u32,
    selected: Option<u8>,
    targets: BTreeMap<u8, Box<dyn I2cTarget>>,
}

impl I2c {
    pub fn new(base: u32) -> Self {
        Self {
            base,
            icr: 0,
            isr: 0,
            idbr: 0,
            isar: 0,
            selected: None,
            targets: BTreeMap::new(),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Attach a target at a 7-bit bus address
    pub fn attach(&mut self, address: u8, target: Box<dyn I2cTarget>) {
        debug!("I2C: target attached at {:#04X}", address);
        self.targets.insert(address & 0x7F, target);
    }

    fn transfer(&mut self) {
        let byte = self.idbr as u8;
        if self.icr & icr::START != 0 {
            let address = byte >> 1;
            let reading = byte & 1 != 0;
            let present = self.targets.contains_key(&address);
            trace!("I2C: start, address={:#04X}, read={}", address, reading);
            self.selected = present.then_some(address);
            self.isr |= isr::UB | isr::IBB | isr::ITE;
            self.set_status(isr::RWM, reading);
            self.set_status(isr::ACKNAK, !present);
        } else if self.isr & isr::RWM != 0 {
            self.idbr = match self.selected.and_then(|a| self.targets.get_mut(&a)) {
                Some(target) => u32::from(target.read()),
                None => 0xFF,
            };
            self.isr |= isr::IRF;
        } else {
            let ack = match self.selected.and_then(|a| self.targets.get_mut(&a)) {
                Some(target) => target.write(byte),
                None => false,
            };
            self.isr |= isr::ITE;
            self.set_status(isr::ACKNAK, !ack);
        }

        if self.icr & icr::STOP != 0 {
            self.selected = None;
            self.isr &= !(isr::UB | isr::IBB);
        }
        self.icr &= !icr::TB;
    }

    fn set_status(&mut self, bit: u32, on: bool) {
        if on {
            self.isr |= bit;
        } else {
            self.isr &= !bit;
        }
    }

    fn update_irq(&self, intc: &mut InterruptController) {
        let asserted = (self.icr & icr::ITEIE != 0 && self.isr & isr::ITE != 0)
            || (self.icr & icr::IRFIE != 0 && self.isr & isr::IRF != 0);
        intc.set(irq::I2C, asserted);
    }
}

impl Peripheral for I2c {
    fn name(&self) -> &'static str {
        "I2C"
    }

    fn read(&mut self, offset: u32, _intc: &mut InterruptController) -> u32 {
        match offset {
            // SCL and SDA idle high
            reg::IBMR => 0x3,
            reg::IDBR => self.idbr,
            reg::ICR => self.icr,
            reg::ISR => self.isr,
            reg::ISAR => self.isar,
            _ => {
                warn!("Unknown I2C register read: offset={:#X}", offset);
                0
            }
        }
    }

    fn write(&mut self, offset: u32, value: u32, intc: &mut InterruptController) {
        match offset {
            reg::IBMR => {}
            reg::IDBR => self.idbr = value & 0xFF,
            reg::ICR => {
                self.icr = value & 0xFFFF;
                if self.icr & icr::IUE != 0 && self.icr & icr::TB != 0 {
                    self.transfer();
                }
            }
            reg::ISR => self.isr &= !(value & (isr::ITE | isr::IRF)),
            reg::ISAR => self.isar = value & 0x7F,
            _ => warn!(
                "Unknown I2C register write: offset={:#X}, value={:#X}",
                offset, value
            ),
        }
        self.update_irq(intc);
    }
}
