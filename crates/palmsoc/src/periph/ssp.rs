//! Synchronous serial ports (SSP1, NSSP, ASSP, SSP2, SSP3).
//!
//! Words written to the transmit FIFO are shifted out when the scheduler
//! services the port; whatever the attached client answers lands in the
//! receive FIFO.

use super::intc::InterruptController;
use super::{Fifo, Peripheral};
use crate::manifest::{SspPort, SspRole};
use palmsoc_hw::mmio::ssp::{FIFO_DEPTH, SSCR0_SSE, registers as reg, sscr1, sssr};
use tracing::{debug, trace, warn};

/// Device on the far end of an SSP link
pub trait SspClient {
    /// Shift `word` out and return the word shifted in
    fn exchange(&mut self, word: u32) -> u32;
}

#[derive(Debug, Clone)]
pub struct Ssp {
    port: SspPort,
    sscr0: u32,
    sscr1: u32,
    ssitr: u32,
    overrun: bool,
    rx: Fifo<u32>,
    tx: Fifo<u32>,
}

impl Ssp {
    pub fn new(port: SspPort) -> Self {
        Self {
            port,
            sscr0: 0,
            sscr1: 0,
            ssitr: 0,
            overrun: false,
            rx: Fifo::new(FIFO_DEPTH),
            tx: Fifo::new(FIFO_DEPTH),
        }
    }

    pub fn role(&self) -> SspRole {
        self.port.role
    }

    pub fn base(&self) -> u32 {
        self.port.base
    }

    pub fn enabled(&self) -> bool {
        self.sscr0 & SSCR0_SSE != 0
    }

    fn word_mask(&self) -> u32 {
        // Data size select: DSS + 1 bits
        let bits = (self.sscr0 & 0xF) + 1;
        if bits >= 32 { u32::MAX } else { (1 << bits) - 1 }
    }

    /// Shift every queued word through the client
    pub fn process(&mut self, intc: &mut InterruptController, mut client: Option<&mut dyn SspClient>) {
        if self.enabled() {
            let mask = self.word_mask();
            while let Some(word) = self.tx.pop() {
                let reply = if self.sscr1 & sscr1::LBM != 0 {
                    word
                } else if let Some(client) = client.as_deref_mut() {
                    client.exchange(word)
                } else {
                    0
                };
                if !self.rx.push(reply & mask) {
                    self.overrun = true;
                }
            }
        }
        self.update_irq(intc);
    }

    /// Receive request for the DMA controller
    pub fn rx_request(&self) -> bool {
        self.enabled() && !self.rx.is_empty()
    }

    /// Transmit request for the DMA controller
    pub fn tx_request(&self) -> bool {
        self.enabled() && !self.tx.is_full()
    }

    pub fn rx_dreq(&self) -> u8 {
        self.port.rx_dreq
    }

    pub fn tx_dreq(&self) -> u8 {
        self.port.tx_dreq
    }

    fn status(&self) -> u32 {
        let tx_threshold = ((self.sscr1 >> 6) & 0xF) as usize;
        let rx_threshold = ((self.sscr1 >> 10) & 0xF) as usize;
        let mut value = 0;
        if !self.tx.is_full() {
            value |= sssr::TNF;
        }
        if !self.rx.is_empty() {
            value |= sssr::RNE;
        }
        if !self.tx.is_empty() {
            value |= sssr::BSY;
        }
        if self.enabled() && self.tx.len() <= tx_threshold {
            value |= sssr::TFS;
        }
        if self.rx.len() > rx_threshold {
            value |= sssr::RFS;
        }
        if self.overrun {
            value |= sssr::ROR;
        }
        value
    }

    fn update_irq(&self, intc: &mut InterruptController) {
        let status = self.status();
        let asserted = (self.sscr1 & sscr1::RIE != 0 && status & sssr::RFS != 0)
            || (self.sscr1 & sscr1::TIE != 0 && status & sssr::TFS != 0)
            || self.overrun;
        intc.set(self.port.irq, asserted);
    }
}

impl Peripheral for Ssp {
    fn name(&self) -> &'static str {
        match self.port.role {
            SspRole::Ssp1 => "SSP1",
            SspRole::Nssp => "NSSP",
            SspRole::Assp => "ASSP",
            SspRole::Ssp2 => "SSP2",
            SspRole::Ssp3 => "SSP3",
        }
    }

    fn read(&mut self, offset: u32, intc: &mut InterruptController) -> u32 {
        let value = match offset {
            reg::SSCR0 => self.sscr0,
            reg::SSCR1 => self.sscr1,
            reg::SSSR => self.status(),
            reg::SSITR => self.ssitr,
            reg::SSDR => self.rx.pop().unwrap_or(0),
            _ => {
                warn!("Unknown {} register read: offset={:#X}", self.name(), offset);
                0
            }
        };
        self.update_irq(intc);
        value
    }

    fn write(&mut self, offset: u32, value: u32, intc: &mut InterruptController) {
        match offset {
            reg::SSCR0 => {
                let was_enabled = self.enabled();
                self.sscr0 = value;
                if was_enabled && !self.enabled() {
                    self.rx.clear();
                    self.tx.clear();
                }
                debug!("{} SSCR0: {:#X}", self.name(), value);
            }
            reg::SSCR1 => self.sscr1 = value,
            reg::SSSR => {
                if value & sssr::ROR != 0 {
                    self.overrun = false;
                }
            }
            reg::SSITR => self.ssitr = value,
            reg::SSDR => {
                if !self.tx.push(value) {
                    trace!("{}: transmit FIFO full", self.name());
                }
            }
            _ => warn!(
                "Unknown {} register write: offset={:#X}, value={:#X}",
                self.name(),
                offset,
                value
            ),
        }
        self.update_irq(intc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Revision, resolve};

    struct Echo(u32);

    impl SspClient for Echo {
        fn exchange(&mut self, word: u32) -> u32 {
            self.0 += 1;
            word ^ 0xFF
        }
    }

    fn ssp1() -> (Ssp, InterruptController) {
        let port = resolve(Revision::Pxa25x).ssp_ports[0];
        (Ssp::new(port), InterruptController::new(32))
    }

    #[test]
    fn test_exchange_with_client() {
        let (mut ssp, mut intc) = ssp1();
        // 8-bit frames, enabled
        ssp.write(reg::SSCR0, SSCR0_SSE | 7, &mut intc);
        ssp.write(reg::SSDR, 0x0F, &mut intc);
        ssp.write(reg::SSDR, 0x1F, &mut intc);
        assert_ne!(ssp.read(reg::SSSR, &mut intc) & sssr::BSY, 0);

        let mut client = Echo(0);
        ssp.process(&mut intc, Some(&mut client));
        assert_eq!(client.0, 2);
        assert_eq!(ssp.read(reg::SSDR, &mut intc), 0xF0);
        assert_eq!(ssp.read(reg::SSDR, &mut intc), 0xE0);
        assert_eq!(ssp.read(reg::SSSR, &mut intc) & (sssr::RNE | sssr::BSY), 0);
    }

    #[test]
    fn test_loopback_and_rx_interrupt() {
        let (mut ssp, mut intc) = ssp1();
        ssp.write(reg::SSCR1, sscr1::LBM | sscr1::RIE, &mut intc);
        ssp.write(reg::SSCR0, SSCR0_SSE | 15, &mut intc);
        ssp.write(reg::SSDR, 0xBEEF, &mut intc);
        ssp.process(&mut intc, None);

        assert!(intc.is_pending(palmsoc_hw::irq::SSP));
        assert!(ssp.rx_request());
        assert_eq!(ssp.read(reg::SSDR, &mut intc), 0xBEEF);
        assert!(!intc.is_pending(palmsoc_hw::irq::SSP));
    }

    #[test]
    fn test_disabled_port_holds_words() {
        let (mut ssp, mut intc) = ssp1();
        ssp.write(reg::SSDR, 1, &mut intc);
        ssp.process(&mut intc, None);
        assert_eq!(ssp.read(reg::SSSR, &mut intc) & sssr::RNE, 0);
        assert!(!ssp.rx_request());
    }
}
