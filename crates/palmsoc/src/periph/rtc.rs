//! Real-time clock.
//!
//! The counter advances once per scheduler update; alarm and 1 Hz status
//! bits are raised on the two RTC interrupt lines when enabled.

use super::Peripheral;
use super::intc::InterruptController;
use palmsoc_hw::irq;
use palmsoc_hw::mmio::rtc::{registers as reg, status};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Rtc {
    base: u32,
    rcnr: u32,
    rtar: u32,
    rtsr: u32,
    rttr: u32,
}

impl Rtc {
    pub fn new(base: u32) -> Self {
        Self {
            base,
            rcnr: 0,
            rtar: 0,
            rtsr: 0,
            rttr: 0x7FFF,
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn seconds(&self) -> u32 {
        self.rcnr
    }

    /// One RTC second
    pub fn update(&mut self, intc: &mut InterruptController) {
        self.rcnr = self.rcnr.wrapping_add(1);
        self.rtsr |= status::HZ;
        if self.rcnr == self.rtar {
            self.rtsr |= status::AL;
            debug!("RTC alarm at {}", self.rcnr);
        }
        self.update_irqs(intc);
    }

    fn update_irqs(&self, intc: &mut InterruptController) {
        intc.set(
            irq::RTC_HZ,
            self.rtsr & status::HZ != 0 && self.rtsr & status::HZE != 0,
        );
        intc.set(
            irq::RTC_ALARM,
            self.rtsr & status::AL != 0 && self.rtsr & status::ALE != 0,
        );
    }
}

impl Peripheral for Rtc {
    fn name(&self) -> &'static str {
        "RTC"
    }

    fn read(&mut self, offset: u32, _intc: &mut InterruptController) -> u32 {
        match offset {
            reg::RCNR => self.rcnr,
            reg::RTAR => self.rtar,
            reg::RTSR => self.rtsr,
            reg::RTTR => self.rttr,
            _ => {
                warn!("Unknown RTC register read: offset={:#X}", offset);
                0
            }
        }
    }

    fn write(&mut self, offset: u32, value: u32, intc: &mut InterruptController) {
        match offset {
            reg::RCNR => self.rcnr = value,
            reg::RTAR => self.rtar = value,
            reg::RTSR => {
                let clear = value & (status::AL | status::HZ);
                let enables = value & (status::ALE | status::HZE);
                self.rtsr = (self.rtsr & !clear & !(status::ALE | status::HZE)) | enables;
            }
            reg::RTTR => self.rttr = value,
            _ => {
                warn!(
                    "Unknown RTC register write: offset={:#X}, value={:#X}",
                    offset, value
                );
                return;
            }
        }
        self.update_irqs(intc);
    }
}
