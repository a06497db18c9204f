//! Audio blocks: the AC97 controller (with its primary codec register
//! window) and the I2S controller.
//!
//! Neither block is wired to a host audio device. Samples written by the
//! guest are drained into a bounded buffer at the service rate so that FIFO
//! status and interrupts behave the way a driver expects.

use super::intc::InterruptController;
use super::{Fifo, Peripheral};
use palmsoc_hw::irq;
use palmsoc_hw::mmio::{ac97, i2s};
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// Samples kept for a consumer before the oldest are discarded
const SAMPLE_BUFFER: usize = 4096;

/// Number of 16-bit codec registers behind the AC97 window
const CODEC_REGS: usize = 64;

#[derive(Debug, Clone)]
struct SampleBuffer {
    samples: VecDeque<u32>,
}

impl SampleBuffer {
    fn new() -> Self {
        Self {
            samples: VecDeque::new(),
        }
    }

    fn push(&mut self, sample: u32) {
        if self.samples.len() >= SAMPLE_BUFFER {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn take(&mut self) -> Vec<u32> {
        self.samples.drain(..).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Ac97 {
    base: u32,
    pocr: u32,
    picr: u32,
    gcr: u32,
    posr_error: bool,
    gsr: u32,
    car: u32,
    codec: [u16; CODEC_REGS],
    out: Fifo<u32>,
    played: SampleBuffer,
}

impl Ac97 {
    pub fn new(base: u32) -> Self {
        let mut codec = [0; CODEC_REGS];
        // Powerdown control/status: all sections ready
        codec[0x26 / 2] = 0x000F;
        // Vendor id (Wolfson WM97xx)
        codec[0x7C / 2] = 0x574D;
        codec[0x7E / 2] = 0x4C12;
        Self {
            base,
            pocr: 0,
            picr: 0,
            gcr: 0,
            posr_error: false,
            gsr: 0,
            car: 0,
            codec,
            out: Fifo::new(ac97::FIFO_DEPTH),
            played: SampleBuffer::new(),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Codec register value as last written by the guest
    pub fn codec_register(&self, index: u8) -> u16 {
        self.codec[(index as usize / 2) % CODEC_REGS]
    }

    /// Drain the PCM out FIFO into the sample buffer
    pub fn process(&mut self, intc: &mut InterruptController) {
        if self.gcr & ac97::GCR_COLD_RST != 0 {
            if self.out.is_empty() && self.pocr != 0 {
                self.posr_error = true;
            }
            while let Some(sample) = self.out.pop() {
                self.played.push(sample);
            }
        }
        self.update_irq(intc);
    }

    /// PCM out DMA request
    pub fn out_request(&self) -> bool {
        self.gcr & ac97::GCR_COLD_RST != 0 && !self.out.is_full()
    }

    /// Samples played since the last call
    pub fn take_samples(&mut self) -> Vec<u32> {
        self.played.take()
    }

    fn posr(&self) -> u32 {
        let mut value = 0;
        if self.out.len() <= self.out.capacity() / 2 {
            value |= ac97::POSR_FSR;
        }
        if self.posr_error {
            value |= ac97::POSR_FIFOE;
        }
        value
    }

    fn update_irq(&self, intc: &mut InterruptController) {
        let posr = self.posr();
        let asserted = (self.pocr & ac97::POCR_FSRIE != 0 && posr & ac97::POSR_FSR != 0)
            || (self.pocr & ac97::POCR_FEIE != 0 && posr & ac97::POSR_FIFOE != 0);
        intc.set(irq::AC97, asserted);
    }

    fn codec_index(offset: u32) -> usize {
        ((offset - ac97::registers::CODEC_BASE) / 4) as usize % CODEC_REGS
    }
}

impl Peripheral for Ac97 {
    fn name(&self) -> &'static str {
        "AC97"
    }

    fn read(&mut self, offset: u32, intc: &mut InterruptController) -> u32 {
        use ac97::registers as reg;
        let value = match offset {
            reg::POCR => self.pocr,
            reg::PICR => self.picr,
            reg::GCR => self.gcr,
            reg::POSR => self.posr(),
            // Capture is not modeled; the input FIFO never fills
            reg::PISR => 0,
            reg::GSR => self.gsr,
            reg::CAR => self.car,
            reg::PCDR => 0,
            reg::CODEC_BASE..reg::CODEC_END => {
                self.gsr |= ac97::GSR_SDONE;
                u32::from(self.codec[Self::codec_index(offset)])
            }
            _ => {
                warn!("Unknown AC97 register read: offset={:#X}", offset);
                0
            }
        };
        self.update_irq(intc);
        value
    }

    fn write(&mut self, offset: u32, value: u32, intc: &mut InterruptController) {
        use ac97::registers as reg;
        match offset {
            reg::POCR => self.pocr = value,
            reg::PICR => self.picr = value,
            reg::GCR => {
                let was_reset = self.gcr & ac97::GCR_COLD_RST == 0;
                self.gcr = value;
                if was_reset && value & ac97::GCR_COLD_RST != 0 {
                    debug!("AC97: cold reset released, codec ready");
                    self.gsr |= ac97::GSR_PCR;
                }
            }
            reg::POSR => {
                if value & ac97::POSR_FIFOE != 0 {
                    self.posr_error = false;
                }
            }
            reg::PISR => {}
            // Done bits are write-one-to-clear
            reg::GSR => self.gsr &= !(value & (ac97::GSR_CDONE | ac97::GSR_SDONE)),
            reg::CAR => self.car = value & 1,
            reg::PCDR => {
                if !self.out.push(value) {
                    trace!("AC97: PCM out FIFO full");
                }
            }
            reg::CODEC_BASE..reg::CODEC_END => {
                let index = Self::codec_index(offset);
                trace!("AC97 codec register {:#04X} <- {:#06X}", index * 2, value);
                self.codec[index] = value as u16;
                self.gsr |= ac97::GSR_CDONE;
                self.car = 0;
            }
            _ => warn!(
                "Unknown AC97 register write: offset={:#X}, value={:#X}",
                offset, value
            ),
        }
        self.update_irq(intc);
    }
}

#[derive(Debug, Clone)]
pub struct I2s {
    base: u32,
    sacr0: u32,
    sacr1: u32,
    saimr: u32,
    sadiv: u32,
    underrun: bool,
    tx: Fifo<u32>,
    played: SampleBuffer,
}

impl I2s {
    pub fn new(base: u32) -> Self {
        Self {
            base,
            sacr0: 0,
            sacr1: 0,
            saimr: 0,
            sadiv: 0x1A,
            underrun: false,
            tx: Fifo::new(i2s::FIFO_DEPTH),
            played: SampleBuffer::new(),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    fn enabled(&self) -> bool {
        self.sacr0 & i2s::SACR0_ENB != 0
    }

    /// Shift queued samples out of the transmit FIFO
    pub fn process(&mut self, intc: &mut InterruptController) {
        if self.enabled() {
            if self.tx.is_empty() {
                self.underrun = true;
            }
            while let Some(sample) = self.tx.pop() {
                self.played.push(sample);
            }
        }
        self.update_irq(intc);
    }

    /// Transmit DMA request
    pub fn tx_request(&self) -> bool {
        self.enabled() && !self.tx.is_full()
    }

    pub fn take_samples(&mut self) -> Vec<u32> {
        self.played.take()
    }

    fn status(&self) -> u32 {
        use i2s::status;
        let threshold = ((self.sacr0 >> i2s::SACR0_TFTH_SHIFT) & 0xF) as usize;
        let mut value = 0;
        if !self.tx.is_full() {
            value |= status::TNF;
        }
        if !self.tx.is_empty() {
            value |= status::BSY;
        }
        if self.enabled() && self.tx.len() <= threshold {
            value |= status::TFS;
        }
        if self.underrun {
            value |= status::TUR;
        }
        value
    }

    fn update_irq(&self, intc: &mut InterruptController) {
        intc.set(irq::I2S, self.status() & self.saimr != 0);
    }
}

impl Peripheral for I2s {
    fn name(&self) -> &'static str {
        "I2S"
    }

    fn read(&mut self, offset: u32, intc: &mut InterruptController) -> u32 {
        use i2s::registers as reg;
        let value = match offset {
            reg::SACR0 => self.sacr0,
            reg::SACR1 => self.sacr1,
            reg::SASR0 => self.status(),
            reg::SAIMR => self.saimr,
            reg::SADIV => self.sadiv,
            reg::SADR => 0,
            _ => {
                warn!("Unknown I2S register read: offset={:#X}", offset);
                0
            }
        };
        self.update_irq(intc);
        value
    }

    fn write(&mut self, offset: u32, value: u32, intc: &mut InterruptController) {
        use i2s::registers as reg;
        match offset {
            reg::SACR0 => {
                self.sacr0 = value;
                if !self.enabled() {
                    self.tx.clear();
                }
            }
            reg::SACR1 => self.sacr1 = value,
            reg::SASR0 => {}
            reg::SAIMR => self.saimr = value,
            reg::SAICR => {
                if value & i2s::SAICR_TUR != 0 {
                    self.underrun = false;
                }
            }
            reg::SADIV => self.sadiv = value & 0x7F,
            reg::SADR => {
                if !self.tx.push(value) {
                    trace!("I2S: transmit FIFO full");
                }
            }
            _ => warn!(
                "Unknown I2S register write: offset={:#X}, value={:#X}",
                offset, value
            ),
        }
        self.update_irq(intc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac97::registers as areg;
    use i2s::registers as ireg;

    #[test]
    fn test_codec_ready_after_cold_reset() {
        let mut intc = InterruptController::new(32);
        let mut ctrl = Ac97::new(ac97::BASE);
        assert_eq!(ctrl.read(areg::GSR, &mut intc) & ac97::GSR_PCR, 0);

        ctrl.write(areg::GCR, ac97::GCR_COLD_RST, &mut intc);
        assert_ne!(ctrl.read(areg::GSR, &mut intc) & ac97::GSR_PCR, 0);
    }

    #[test]
    fn test_codec_register_window() {
        let mut intc = InterruptController::new(32);
        let mut ctrl = Ac97::new(ac97::BASE);
        // Master volume is codec register 0x02
        ctrl.write(areg::CODEC_BASE + 0x02 * 2, 0x0808, &mut intc);
        assert_eq!(ctrl.codec_register(0x02), 0x0808);
        assert_ne!(ctrl.read(areg::GSR, &mut intc) & ac97::GSR_CDONE, 0);

        assert_eq!(ctrl.read(areg::CODEC_BASE + 0x7C * 2, &mut intc), 0x574D);
        assert_ne!(ctrl.read(areg::GSR, &mut intc) & ac97::GSR_SDONE, 0);

        ctrl.write(areg::GSR, ac97::GSR_CDONE | ac97::GSR_SDONE, &mut intc);
        assert_eq!(
            ctrl.read(areg::GSR, &mut intc) & (ac97::GSR_CDONE | ac97::GSR_SDONE),
            0
        );
    }

    #[test]
    fn test_pcm_out_drains_and_interrupts() {
        let mut intc = InterruptController::new(32);
        let mut ctrl = Ac97::new(ac97::BASE);
        ctrl.write(areg::GCR, ac97::GCR_COLD_RST, &mut intc);
        for sample in 0..ac97::FIFO_DEPTH as u32 {
            ctrl.write(areg::PCDR, sample, &mut intc);
        }
        assert!(!ctrl.out_request());
        assert_eq!(ctrl.read(areg::POSR, &mut intc) & ac97::POSR_FSR, 0);

        ctrl.write(areg::POCR, ac97::POCR_FSRIE, &mut intc);
        assert!(!intc.is_pending(irq::AC97));
        ctrl.process(&mut intc);
        assert!(intc.is_pending(irq::AC97));
        assert_eq!(ctrl.take_samples().len(), ac97::FIFO_DEPTH);
        assert!(ctrl.take_samples().is_empty());
    }

    #[test]
    fn test_i2s_underrun() {
        let mut intc = InterruptController::new(32);
        let mut port = I2s::new(i2s::BASE);
        port.write(ireg::SAIMR, i2s::status::TUR, &mut intc);
        port.write(ireg::SACR0, i2s::SACR0_ENB, &mut intc);
        port.write(ireg::SADR, 0x1234_5678, &mut intc);

        port.process(&mut intc);
        assert!(!intc.is_pending(irq::I2S));
        assert_eq!(port.take_samples(), vec![0x1234_5678]);

        port.process(&mut intc);
        assert!(intc.is_pending(irq::I2S));
        port.write(ireg::SAICR, i2s::SAICR_TUR, &mut intc);
        assert!(!intc.is_pending(irq::I2S));
    }
}
