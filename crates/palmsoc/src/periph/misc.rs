//! Blocks modeled as register files with reset values: PWM channels, the
//! memory controller, the power and clock managers, the USB device
//! controllers and the internal memory controller. Also the co-processor
//! record that picks the CPU engine variant.

use super::Peripheral;
use super::intc::InterruptController;
use crate::manifest::{CoprocessorKind, UdcGeneration};
use palmsoc_hw::mmio::{imc, memctrl, pwm, pwrclk, udc};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Sparse register storage with per-offset reset values.
///
/// Offsets without a reset value read as zero until written.
#[derive(Debug, Clone, Default)]
pub struct RegisterFile {
    values: BTreeMap<u32, u32>,
}

impl RegisterFile {
    pub fn with_resets(resets: &[(u32, u32)]) -> Self {
        Self {
            values: resets.iter().copied().collect(),
        }
    }

    pub fn get(&self, offset: u32) -> u32 {
        self.values.get(&offset).copied().unwrap_or(0)
    }

    pub fn set(&mut self, offset: u32, value: u32) {
        self.values.insert(offset, value);
    }
}

/// One PWM channel
#[derive(Debug, Clone)]
pub struct Pwm {
    base: u32,
    control: u32,
    duty: u32,
    period: u32,
}

impl Pwm {
    pub fn new(base: u32) -> Self {
        Self {
            base,
            control: 0,
            duty: 0,
            period: 0,
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Output duty cycle in 1/1024 units
    pub fn duty_cycle(&self) -> u32 {
        // Bit 10 of PWMDCR forces the output high
        if self.duty & (1 << 10) != 0 {
            return 1024;
        }
        let period = (self.period & 0x3FF) + 1;
        ((self.duty & 0x3FF) * 1024 / period).min(1024)
    }
}

impl Peripheral for Pwm {
    fn name(&self) -> &'static str {
        "PWM"
    }

    fn read(&mut self, offset: u32, _intc: &mut InterruptController) -> u32 {
        match offset {
            pwm::registers::PWMCR => self.control,
            pwm::registers::PWMDCR => self.duty,
            pwm::registers::PWMPCR => self.period,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32, _intc: &mut InterruptController) {
        match offset {
            pwm::registers::PWMCR => self.control = value & 0x7F,
            pwm::registers::PWMDCR => self.duty = value & 0x7FF,
            pwm::registers::PWMPCR => self.period = value & 0x3FF,
            _ => {}
        }
        trace!("PWM {:#X}: duty {}/1024", self.base, self.duty_cycle());
    }
}

/// Static memory and SDRAM controller
#[derive(Debug, Clone)]
pub struct MemoryController {
    regs: RegisterFile,
}

impl MemoryController {
    pub fn new() -> Self {
        use memctrl::registers as reg;
        Self {
            regs: RegisterFile::with_resets(&[
                (reg::MDCNFG, 0x0B00_0B00),
                (reg::MDREFR, 0x03CA_4018),
                (reg::MSC0, 0x7FF0_7FF0),
                (reg::MSC1, 0x7FF0_7FF0),
                (reg::MSC2, 0x7FF0_7FF0),
                (reg::SXCNFG, 0x4000_4000),
                (reg::BOOT_DEF, 0x0000_0008),
            ]),
        }
    }
}

impl Default for MemoryController {
    fn default() -> Self {
        Self::new()
    }
}

impl Peripheral for MemoryController {
    fn name(&self) -> &'static str {
        "MEMC"
    }

    fn read(&mut self, offset: u32, _intc: &mut InterruptController) -> u32 {
        self.regs.get(offset)
    }

    fn write(&mut self, offset: u32, value: u32, _intc: &mut InterruptController) {
        use memctrl::registers as reg;
        match offset {
            // Boot configuration pins are read-only
            reg::BOOT_DEF => {}
            // Self-refresh exit bit always reads back clear
            reg::MDREFR => self.regs.set(offset, value & !(1 << 22)),
            _ => self.regs.set(offset, value),
        }
    }
}

/// Power manager
#[derive(Debug, Clone)]
pub struct PowerManager {
    regs: RegisterFile,
}

impl PowerManager {
    pub fn new() -> Self {
        use pwrclk::registers as reg;
        Self {
            regs: RegisterFile::with_resets(&[(reg::RCSR, pwrclk::RCSR_HWR)]),
        }
    }
}

impl Default for PowerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Peripheral for PowerManager {
    fn name(&self) -> &'static str {
        "PWRMAN"
    }

    fn read(&mut self, offset: u32, _intc: &mut InterruptController) -> u32 {
        self.regs.get(offset)
    }

    fn write(&mut self, offset: u32, value: u32, _intc: &mut InterruptController) {
        use pwrclk::registers as reg;
        match offset {
            // Sleep and reset status are write-one-to-clear
            reg::PSSR | reg::RCSR => {
                let current = self.regs.get(offset);
                self.regs.set(offset, current & !value);
            }
            _ => self.regs.set(offset, value),
        }
    }
}

/// Clock manager
#[derive(Debug, Clone)]
pub struct ClockManager {
    regs: RegisterFile,
    track_cccr: bool,
}

impl ClockManager {
    /// `extended` selects the PXA27x layout, whose CCSR mirrors CCCR
    pub fn new(extended: bool) -> Self {
        use pwrclk::registers as reg;
        let cccr = if extended { 0x0000_0161 } else { 0x0000_0121 };
        let cken = if extended { 0x0040_0200 } else { 0x0001_7DEF };
        let mut regs = RegisterFile::with_resets(&[
            (reg::CCCR, cccr),
            (reg::CKEN, cken),
            (reg::OSCC, pwrclk::OSCC_OOK),
        ]);
        if extended {
            regs.set(reg::CCSR, cccr);
        }
        Self {
            regs,
            track_cccr: extended,
        }
    }
}

impl Peripheral for ClockManager {
    fn name(&self) -> &'static str {
        "CLKMAN"
    }

    fn read(&mut self, offset: u32, _intc: &mut InterruptController) -> u32 {
        self.regs.get(offset)
    }

    fn write(&mut self, offset: u32, value: u32, _intc: &mut InterruptController) {
        use pwrclk::registers as reg;
        match offset {
            reg::CCSR if self.track_cccr => {}
            // The oscillator is always stable
            reg::OSCC => self.regs.set(offset, value | pwrclk::OSCC_OOK),
            reg::CCCR => {
                debug!("CLKMAN CCCR: {:#X}", value);
                self.regs.set(offset, value);
                if self.track_cccr {
                    self.regs.set(reg::CCSR, value);
                }
            }
            _ => self.regs.set(offset, value),
        }
    }
}

/// USB device controller; no host is ever connected
#[derive(Debug, Clone)]
pub struct Udc {
    generation: UdcGeneration,
    regs: RegisterFile,
}

impl Udc {
    pub fn new(generation: UdcGeneration) -> Self {
        let udccr = match generation {
            // Resume detected and endpoint 0 idle on the first generation
            UdcGeneration::First => 0x0000_00A0,
            UdcGeneration::Second => 0,
        };
        Self {
            generation,
            regs: RegisterFile::with_resets(&[(udc::registers::UDCCR, udccr)]),
        }
    }

    pub fn generation(&self) -> UdcGeneration {
        self.generation
    }
}

impl Peripheral for Udc {
    fn name(&self) -> &'static str {
        match self.generation {
            UdcGeneration::First => "UDC",
            UdcGeneration::Second => "UDC2",
        }
    }

    fn read(&mut self, offset: u32, _intc: &mut InterruptController) -> u32 {
        self.regs.get(offset)
    }

    fn write(&mut self, offset: u32, value: u32, _intc: &mut InterruptController) {
        self.regs.set(offset, value);
    }
}

/// Internal memory controller (on-chip SRAM power management)
#[derive(Debug, Clone, Default)]
pub struct Imc {
    regs: RegisterFile,
}

impl Imc {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Peripheral for Imc {
    fn name(&self) -> &'static str {
        "IMC"
    }

    fn read(&mut self, offset: u32, _intc: &mut InterruptController) -> u32 {
        match offset {
            // Every bank reports powered on
            imc::registers::IMPMSR => 0,
            _ => self.regs.get(offset),
        }
    }

    fn write(&mut self, offset: u32, value: u32, _intc: &mut InterruptController) {
        self.regs.set(offset, value);
    }
}

/// Co-processor attached to the core: the XScale DSP extension (CP0
/// 40-bit accumulator) or the iWMMXt multimedia unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coprocessor {
    kind: CoprocessorKind,
}

impl Coprocessor {
    pub fn new(kind: CoprocessorKind) -> Self {
        debug!("Co-processor: {:?}", kind);
        Self { kind }
    }

    pub fn kind(&self) -> CoprocessorKind {
        self.kind
    }

    /// Width of the accumulator registers in bits
    pub fn accumulator_bits(&self) -> u32 {
        match self.kind {
            CoprocessorKind::LegacyDsp => 40,
            CoprocessorKind::Wmmx => 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwrclk::registers as reg;

    #[test]
    fn test_reset_status_is_write_one_to_clear() {
        let mut intc = InterruptController::new(32);
        let mut pm = PowerManager::new();
        assert_eq!(pm.read(reg::RCSR, &mut intc), pwrclk::RCSR_HWR);
        pm.write(reg::RCSR, pwrclk::RCSR_HWR, &mut intc);
        assert_eq!(pm.read(reg::RCSR, &mut intc), 0);

        pm.write(reg::PSPR, 0xA000_0000, &mut intc);
        assert_eq!(pm.read(reg::PSPR, &mut intc), 0xA000_0000);
    }

    #[test]
    fn test_clock_manager_status_tracks_cccr() {
        let mut intc = InterruptController::new(64);
        let mut cm = ClockManager::new(true);
        cm.write(reg::CCCR, 0x0000_0290, &mut intc);
        assert_eq!(cm.read(reg::CCSR, &mut intc), 0x0000_0290);
        cm.write(reg::OSCC, 0, &mut intc);
        assert_ne!(cm.read(reg::OSCC, &mut intc) & pwrclk::OSCC_OOK, 0);

        let mut legacy = ClockManager::new(false);
        assert_eq!(legacy.read(reg::CKEN, &mut intc), 0x0001_7DEF);
    }

    #[test]
    fn test_pwm_duty_cycle() {
        let mut intc = InterruptController::new(32);
        let mut channel = Pwm::new(pwm::PWM0_BASE);
        channel.write(pwm::registers::PWMPCR, 0x3FF, &mut intc);
        channel.write(pwm::registers::PWMDCR, 0x200, &mut intc);
        assert_eq!(channel.duty_cycle(), 512);
        channel.write(pwm::registers::PWMDCR, 1 << 10, &mut intc);
        assert_eq!(channel.duty_cycle(), 1024);
    }

    #[test]
    fn test_memory_controller_boot_pins_read_only() {
        let mut intc = InterruptController::new(32);
        let mut mc = MemoryController::new();
        mc.write(memctrl::registers::BOOT_DEF, 0, &mut intc);
        assert_eq!(mc.read(memctrl::registers::BOOT_DEF, &mut intc), 8);
        mc.write(memctrl::registers::MSC0, 0x1234_5678, &mut intc);
        assert_eq!(mc.read(memctrl::registers::MSC0, &mut intc), 0x1234_5678);
    }

    #[test]
    fn test_coprocessor_accumulator_width() {
        assert_eq!(Coprocessor::new(CoprocessorKind::LegacyDsp).accumulator_bits(), 40);
        assert_eq!(Coprocessor::new(CoprocessorKind::Wmmx).accumulator_bits(), 64);
    }
}
