//! OS timer: a free-running counter and four match channels.

use super::Peripheral;
use super::intc::InterruptController;
use palmsoc_hw::irq;
use palmsoc_hw::mmio::ost::{CHANNELS, registers as reg};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct OsTimer {
    base: u32,
    /// Interrupt line of match channel 0; channels 1..3 follow
    irq: u8,
    oscr: u32,
    osmr: [u32; CHANNELS],
    ossr: u32,
    ower: u32,
    oier: u32,
}

impl OsTimer {
    pub fn new(base: u32) -> Self {
        Self {
            base,
            irq: irq::OST0,
            oscr: 0,
            osmr: [0; CHANNELS],
            ossr: 0,
            ower: 0,
            oier: 0,
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn counter(&self) -> u32 {
        self.oscr
    }

    /// Advance the counter by one tick and latch matches
    pub fn tick(&mut self, intc: &mut InterruptController) {
        self.oscr = self.oscr.wrapping_add(1);
        for (channel, &match_value) in self.osmr.iter().enumerate() {
            if match_value == self.oscr {
                self.ossr |= 1 << channel;
                if channel == 3 && self.ower & 1 != 0 {
                    warn!("OST: watchdog match at {:#X}", self.oscr);
                }
            }
        }
        self.update_irqs(intc);
    }

    fn update_irqs(&self, intc: &mut InterruptController) {
        for channel in 0..CHANNELS {
            let bit = 1 << channel;
            intc.set(
                self.irq + channel as u8,
                self.ossr & self.oier & bit != 0,
            );
        }
    }
}

impl Peripheral for OsTimer {
    fn name(&self) -> &'static str {
        "OST"
    }

    fn read(&mut self, offset: u32, _intc: &mut InterruptController) -> u32 {
        match offset {
            reg::OSMR0..=0x0C => self.osmr[(offset / 4) as usize],
            reg::OSCR => self.oscr,
            reg::OSSR => self.ossr,
            reg::OWER => self.ower,
            reg::OIER => self.oier,
            _ => {
                warn!("Unknown OST register read: offset={:#X}", offset);
                0
            }
        }
    }

    fn write(&mut self, offset: u32, value: u32, intc: &mut InterruptController) {
        match offset {
            reg::OSMR0..=0x0C => self.osmr[(offset / 4) as usize] = value,
            reg::OSCR => self.oscr = value,
            reg::OSSR => self.ossr &= !(value & 0xF),
            // The watchdog enable is sticky until reset
            reg::OWER => self.ower |= value & 1,
            reg::OIER => {
                self.oier = value & 0xF;
                debug!("OST interrupt enable: {:#X}", self.oier);
            }
            _ => {
                warn!(
                    "Unknown OST register write: offset={:#X}, value={:#X}",
                    offset, value
                );
                return;
            }
        }
        self.update_irqs(intc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palmsoc_hw::mmio::ost::BASE;

    #[test]
    fn test_match_raises_interrupt() {
        let mut intc = InterruptController::new(32);
        let mut ost = OsTimer::new(BASE);
        ost.write(reg::OSMR0 + 4, 3, &mut intc);
        ost.write(reg::OIER, 0b10, &mut intc);

        ost.tick(&mut intc);
        ost.tick(&mut intc);
        assert!(!intc.is_pending(irq::OST1));
        ost.tick(&mut intc);
        assert!(intc.is_pending(irq::OST1));
        assert_eq!(ost.read(reg::OSSR, &mut intc), 0b10);

        // Write one to clear
        ost.write(reg::OSSR, 0b10, &mut intc);
        assert!(!intc.is_pending(irq::OST1));
        assert_eq!(ost.counter(), 3);
    }

    #[test]
    fn test_disabled_match_only_sets_status() {
        let mut intc = InterruptController::new(32);
        let mut ost = OsTimer::new(BASE);
        ost.write(reg::OSMR0, 1, &mut intc);
        ost.tick(&mut intc);
        assert_eq!(ost.read(reg::OSSR, &mut intc), 1);
        assert!(!intc.is_pending(irq::OST0));
    }
}
