//! GPIO controller.
//!
//! Pins are grouped in 32-bit banks. External inputs are driven by the
//! device model and the keypad relay through [`Gpio::set_input`]; enabled
//! edges latch into GEDR and raise GPIO0, GPIO1 or the shared GPIOx line.

use super::Peripheral;
use super::intc::InterruptController;
use palmsoc_hw::irq;
use palmsoc_hw::mmio::gpio::registers as reg;
use tracing::{debug, trace, warn};

const MAX_BANKS: usize = 4;
const GAFR_REGS: usize = 8;

/// Per-bank register kinds sharing the same layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Level,
    Direction,
    Set,
    Clear,
    Rising,
    Falling,
    Edge,
}

#[derive(Debug, Clone)]
pub struct Gpio {
    base: u32,
    banks: usize,
    inputs: [u32; MAX_BANKS],
    outputs: [u32; MAX_BANKS],
    direction: [u32; MAX_BANKS],
    rising: [u32; MAX_BANKS],
    falling: [u32; MAX_BANKS],
    edge: [u32; MAX_BANKS],
    alt_function: [u32; GAFR_REGS],
}

impl Gpio {
    pub fn new(base: u32, banks: usize) -> Self {
        Self {
            base,
            banks: banks.min(MAX_BANKS),
            inputs: [0; MAX_BANKS],
            outputs: [0; MAX_BANKS],
            direction: [0; MAX_BANKS],
            rising: [0; MAX_BANKS],
            falling: [0; MAX_BANKS],
            edge: [0; MAX_BANKS],
            alt_function: [0; GAFR_REGS],
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn pin_count(&self) -> u32 {
        self.banks as u32 * 32
    }

    fn level(&self, bank: usize) -> u32 {
        (self.outputs[bank] & self.direction[bank]) | (self.inputs[bank] & !self.direction[bank])
    }

    /// Current level of `pin` as seen by software
    pub fn pin_level(&self, pin: u32) -> bool {
        let bank = (pin / 32) as usize;
        bank < self.banks && self.level(bank) & (1 << (pin % 32)) != 0
    }

    /// Drive the external level of an input pin
    pub fn set_input(&mut self, pin: u32, high: bool, intc: &mut InterruptController) {
        let bank = (pin / 32) as usize;
        if bank >= self.banks {
            warn!("GPIO: pin {} does not exist", pin);
            return;
        }
        let bit = 1 << (pin % 32);
        let before = self.level(bank);
        if high {
            self.inputs[bank] |= bit;
        } else {
            self.inputs[bank] &= !bit;
        }
        let after = self.level(bank);
        let rose = !before & after & self.rising[bank];
        let fell = before & !after & self.falling[bank];
        if (rose | fell) & bit != 0 {
            trace!("GPIO: edge on pin {}", pin);
            self.edge[bank] |= bit;
        }
        self.update_irqs(intc);
    }

    fn update_irqs(&self, intc: &mut InterruptController) {
        intc.set(irq::GPIO0, self.edge[0] & 1 != 0);
        intc.set(irq::GPIO1, self.edge[0] & 2 != 0);
        let others = self.edge[0] & !3 != 0 || self.edge[1..self.banks].iter().any(|&e| e != 0);
        intc.set(irq::GPIO_X, others);
    }

    /// Map an offset to (kind, bank)
    fn decode(&self, offset: u32) -> Option<(Kind, usize)> {
        let (group, bank) = if offset >= reg::BANK3_GPLR {
            let rel = offset - reg::BANK3_GPLR;
            if rel % 12 != 0 {
                return None;
            }
            (rel / 12, 3)
        } else if offset < reg::GAFR {
            (offset / 12, ((offset % 12) / 4) as usize)
        } else {
            return None;
        };
        let kind = match group {
            0 => Kind::Level,
            1 => Kind::Direction,
            2 => Kind::Set,
            3 => Kind::Clear,
            4 => Kind::Rising,
            5 => Kind::Falling,
            6 => Kind::Edge,
            _ => return None,
        };
        (bank < self.banks).then_some((kind, bank))
    }
}

impl Peripheral for Gpio {
    fn name(&self) -> &'static str {
        "GPIO"
    }

    fn read(&mut self, offset: u32, _intc: &mut InterruptController) -> u32 {
        if (reg::GAFR..reg::GAFR + 4 * GAFR_REGS as u32).contains(&offset) {
            return self.alt_function[((offset - reg::GAFR) / 4) as usize];
        }
        match self.decode(offset) {
            Some((Kind::Level, bank)) => self.level(bank),
            Some((Kind::Direction, bank)) => self.direction[bank],
            Some((Kind::Set | Kind::Clear, _)) => 0,
            Some((Kind::Rising, bank)) => self.rising[bank],
            Some((Kind::Falling, bank)) => self.falling[bank],
            Some((Kind::Edge, bank)) => self.edge[bank],
            None => {
                warn!("Unknown GPIO register read: offset={:#X}", offset);
                0
            }
        }
    }

    fn write(&mut self, offset: u32, value: u32, intc: &mut InterruptController) {
        if (reg::GAFR..reg::GAFR + 4 * GAFR_REGS as u32).contains(&offset) {
            self.alt_function[((offset - reg::GAFR) / 4) as usize] = value;
            return;
        }
        match self.decode(offset) {
            Some((Kind::Level, _)) => {}
            Some((Kind::Direction, bank)) => {
                self.direction[bank] = value;
                debug!("GPIO bank {} direction: {:#010X}", bank, value);
            }
            Some((Kind::Set, bank)) => self.outputs[bank] |= value,
            Some((Kind::Clear, bank)) => self.outputs[bank] &= !value,
            Some((Kind::Rising, bank)) => self.rising[bank] = value,
            Some((Kind::Falling, bank)) => self.falling[bank] = value,
            Some((Kind::Edge, bank)) => self.edge[bank] &= !value,
            None => warn!(
                "Unknown GPIO register write: offset={:#X}, value={:#X}",
                offset, value
            ),
        }
        self.update_irqs(intc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palmsoc_hw::mmio::gpio::{BANKS_PXA25X, BASE};

    #[test]
    fn test_outputs_and_level() {
        let mut intc = InterruptController::new(32);
        let mut gpio = Gpio::new(BASE, BANKS_PXA25X);
        gpio.write(reg::GPDR + 4, 1 << 3, &mut intc);
        gpio.write(reg::GPSR + 4, 1 << 3, &mut intc);
        assert!(gpio.pin_level(35));
        assert_eq!(gpio.read(reg::GPLR + 4, &mut intc), 1 << 3);

        gpio.write(reg::GPCR + 4, 1 << 3, &mut intc);
        assert!(!gpio.pin_level(35));
    }

    #[test]
    fn test_falling_edge_interrupt() {
        let mut intc = InterruptController::new(32);
        let mut gpio = Gpio::new(BASE, BANKS_PXA25X);
        gpio.set_input(70, true, &mut intc);
        gpio.write(reg::GFER + 8, 1 << 6, &mut intc);

        gpio.set_input(70, false, &mut intc);
        assert!(intc.is_pending(irq::GPIO_X));
        assert_eq!(gpio.read(reg::GEDR + 8, &mut intc), 1 << 6);

        gpio.write(reg::GEDR + 8, 1 << 6, &mut intc);
        assert!(!intc.is_pending(irq::GPIO_X));
    }

    #[test]
    fn test_gpio0_has_its_own_line() {
        let mut intc = InterruptController::new(32);
        let mut gpio = Gpio::new(BASE, BANKS_PXA25X);
        gpio.write(reg::GRER, 1, &mut intc);
        gpio.set_input(0, true, &mut intc);
        assert!(intc.is_pending(irq::GPIO0));
        assert!(!intc.is_pending(irq::GPIO_X));
    }

    #[test]
    fn test_fourth_bank() {
        let mut intc = InterruptController::new(64);
        let mut narrow = Gpio::new(BASE, BANKS_PXA25X);
        narrow.set_input(100, true, &mut intc);
        assert!(!narrow.pin_level(100));

        let mut wide = Gpio::new(BASE, 4);
        wide.set_input(100, true, &mut intc);
        assert!(wide.pin_level(100));
        assert_eq!(wide.read(reg::BANK3_GPLR, &mut intc), 1 << 4);
    }
}
