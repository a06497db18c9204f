//! 16550-compatible UARTs (FFUART, BTUART, STUART, HWUART).
//!
//! The register file is modeled closely enough for polled and interrupt
//! driven drivers. Bytes move between the FIFOs and an optional host
//! endpoint when the scheduler calls [`Uart::process`].

use super::intc::InterruptController;
use super::{Fifo, Peripheral};
use palmsoc_hw::mmio::uart::{
    FIFO_DEPTH, IIR_FIFOES, IIR_NO_INT, IIR_RX, IIR_TX, LCR_DLAB, fcr, ier, lsr,
    registers as reg,
};
use std::io::Write;
use tracing::{debug, trace, warn};

/// Which of the on-chip UARTs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UartPort {
    Ff,
    Hw,
    St,
    Bt,
}

/// Host side of a UART link
pub trait SerialHost {
    /// Accept one byte transmitted by the guest
    fn write_byte(&mut self, byte: u8);

    /// Offer one byte to the guest, if any is waiting
    fn read_byte(&mut self) -> Option<u8> {
        None
    }
}

/// Sends guest output to the host's stdout
#[derive(Debug, Default)]
pub struct StdoutSerial;

impl SerialHost for StdoutSerial {
    fn write_byte(&mut self, byte: u8) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(&[byte]);
        if byte == b'\n' {
            let _ = out.flush();
        }
    }
}

pub struct Uart {
    port: UartPort,
    base: u32,
    irq: u8,
    rx: Fifo<u8>,
    tx: Fifo<u8>,
    ier: u32,
    lcr: u32,
    mcr: u32,
    fcr: u32,
    dll: u32,
    dlh: u32,
    spr: u32,
    isr: u32,
    overrun: bool,
    host: Option<Box<dyn SerialHost>>,
}

impl Uart {
    pub fn new(port: UartPort, base: u32, irq: u8) -> Self {
        Self {
            port,
            base,
            irq,
            rx: Fifo::new(FIFO_DEPTH),
            tx: Fifo::new(FIFO_DEPTH),
            ier: 0,
            lcr: 0,
            mcr: 0,
            fcr: 0,
            dll: 0,
            dlh: 0,
            spr: 0,
            isr: 0,
            overrun: false,
            host: None,
        }
    }

    pub fn port(&self) -> UartPort {
        self.port
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Connect (or disconnect) the host endpoint
    pub fn attach_host(&mut self, host: Option<Box<dyn SerialHost>>) {
        debug!("UART {:?}: host attached: {}", self.port, host.is_some());
        self.host = host;
    }

    fn enabled(&self) -> bool {
        self.ier & ier::UUE != 0
    }

    fn fifo_enabled(&self) -> bool {
        self.fcr & fcr::TRFIFOE != 0
    }

    fn tx_requests_data(&self) -> bool {
        if self.fifo_enabled() {
            self.tx.len() <= self.tx.capacity() / 2
        } else {
            self.tx.is_empty()
        }
    }

    /// Inject a byte into the receive FIFO, as if it arrived on the wire
    pub fn receive(&mut self, byte: u8, intc: &mut InterruptController) {
        if !self.rx.push(byte) {
            self.overrun = true;
        }
        self.update_irq(intc);
    }

    /// Move bytes between the FIFOs and the host endpoint
    pub fn process(&mut self, intc: &mut InterruptController) {
        if self.enabled() {
            while let Some(byte) = self.tx.pop() {
                if let Some(host) = self.host.as_mut() {
                    host.write_byte(byte);
                }
            }
            if let Some(host) = self.host.as_mut() {
                while !self.rx.is_full() {
                    match host.read_byte() {
                        Some(byte) => {
                            self.rx.push(byte);
                        }
                        None => break,
                    }
                }
            }
        }
        self.update_irq(intc);
    }

    fn lsr(&self) -> u32 {
        let mut value = 0;
        if !self.rx.is_empty() {
            value |= lsr::DR;
        }
        if self.overrun {
            value |= lsr::OE;
        }
        if self.tx_requests_data() {
            value |= lsr::TDRQ;
        }
        if self.tx.is_empty() {
            value |= lsr::TEMT;
        }
        value
    }

    fn iir(&self) -> u32 {
        let fifo_bits = if self.fifo_enabled() { IIR_FIFOES } else { 0 };
        let id = if self.ier & ier::RAVIE != 0 && !self.rx.is_empty() {
            IIR_RX
        } else if self.ier & ier::TIE != 0 && self.tx_requests_data() {
            IIR_TX
        } else {
            IIR_NO_INT
        };
        fifo_bits | id
    }

    fn update_irq(&self, intc: &mut InterruptController) {
        intc.set(self.irq, self.enabled() && self.iir() & IIR_NO_INT == 0);
    }
}

impl Peripheral for Uart {
    fn name(&self) -> &'static str {
        match self.port {
            UartPort::Ff => "FFUART",
            UartPort::Hw => "HWUART",
            UartPort::St => "STUART",
            UartPort::Bt => "BTUART",
        }
    }

    fn read(&mut self, offset: u32, intc: &mut InterruptController) -> u32 {
        let dlab = self.lcr & LCR_DLAB != 0;
        let value = match offset {
            reg::DATA if dlab => self.dll,
            reg::DATA => self.rx.pop().map_or(0, u32::from),
            reg::IER if dlab => self.dlh,
            reg::IER => self.ier,
            reg::IIR => self.iir(),
            reg::LCR => self.lcr,
            reg::MCR => self.mcr,
            reg::LSR => {
                let value = self.lsr();
                self.overrun = false;
                value
            }
            // CTS, DSR and DCD asserted
            reg::MSR => 0xB0,
            reg::SPR => self.spr,
            reg::ISR => self.isr,
            _ => {
                warn!(
                    "Unknown {} register read: offset={:#X}",
                    self.name(),
                    offset
                );
                0
            }
        };
        self.update_irq(intc);
        value
    }

    fn write(&mut self, offset: u32, value: u32, intc: &mut InterruptController) {
        trace!(
            "{} write: offset={:#X}, value={:#X}",
            self.name(),
            offset,
            value
        );
        let dlab = self.lcr & LCR_DLAB != 0;
        match offset {
            reg::DATA if dlab => self.dll = value & 0xFF,
            reg::DATA => {
                if !self.tx.push(value as u8) {
                    trace!("{}: transmit FIFO full, byte dropped", self.name());
                }
            }
            reg::IER if dlab => self.dlh = value & 0xFF,
            reg::IER => {
                self.ier = value & 0xFF;
                debug!("{} IER: {:#X}", self.name(), self.ier);
            }
            reg::IIR => {
                if value & fcr::RESETRF != 0 {
                    self.rx.clear();
                }
                if value & fcr::RESETTF != 0 {
                    self.tx.clear();
                }
                self.fcr = value & !(fcr::RESETRF | fcr::RESETTF);
            }
            reg::LCR => self.lcr = value & 0xFF,
            reg::MCR => self.mcr = value & 0x1F,
            reg::LSR | reg::MSR => {}
            reg::SPR => self.spr = value & 0xFF,
            reg::ISR => self.isr = value & 0x1F,
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
    use palmsoc_hw::irq;
    use palmsoc_hw::mmio::uart::FFUART_BASE;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Capture {
        out: Rc<RefCell<Vec<u8>>>,
        input: Vec<u8>,
    }

    impl SerialHost for Capture {
        fn write_byte(&mut self, byte: u8) {
            self.out.borrow_mut().push(byte);
        }

        fn read_byte(&mut self) -> Option<u8> {
            self.input.pop()
        }
    }

    fn uart() -> (Uart, InterruptController) {
        (
            Uart::new(UartPort::Ff, FFUART_BASE, irq::FFUART),
            InterruptController::new(32),
        )
    }

    #[test]
    fn test_transmit_reaches_host_when_enabled() {
        let (mut uart, mut intc) = uart();
        let out = Rc::new(RefCell::new(Vec::new()));
        uart.attach_host(Some(Box::new(Capture {
            out: out.clone(),
            input: Vec::new(),
        })));

        for &b in b"hi" {
            uart.write(reg::DATA, b as u32, &mut intc);
        }
        uart.process(&mut intc);
        assert!(out.borrow().is_empty());
        assert_eq!(uart.read(reg::LSR, &mut intc) & lsr::TEMT, 0);

        uart.write(reg::IER, ier::UUE, &mut intc);
        uart.process(&mut intc);
        assert_eq!(&out.borrow()[..], b"hi");
        assert_ne!(uart.read(reg::LSR, &mut intc) & lsr::TEMT, 0);
    }

    #[test]
    fn test_receive_interrupt() {
        let (mut uart, mut intc) = uart();
        uart.attach_host(Some(Box::new(Capture {
            out: Rc::new(RefCell::new(Vec::new())),
            input: vec![b'b', b'a'],
        })));
        uart.write(reg::IER, ier::UUE | ier::RAVIE, &mut intc);
        uart.process(&mut intc);

        assert!(intc.is_pending(irq::FFUART));
        assert_eq!(uart.read(reg::IIR, &mut intc), IIR_RX);
        assert_eq!(uart.read(reg::DATA, &mut intc), b'a' as u32);
        assert_eq!(uart.read(reg::DATA, &mut intc), b'b' as u32);
        assert_eq!(uart.read(reg::LSR, &mut intc) & lsr::DR, 0);
        assert!(!intc.is_pending(irq::FFUART));
    }

    #[test]
    fn test_divisor_latch() {
        let (mut uart, mut intc) = uart();
        uart.write(reg::LCR, LCR_DLAB | 0x3, &mut intc);
        uart.write(reg::DATA, 8, &mut intc);
        uart.write(reg::IER, 0, &mut intc);
        assert_eq!(uart.read(reg::DATA, &mut intc), 8);

        uart.write(reg::LCR, 0x3, &mut intc);
        assert_eq!(uart.read(reg::IER, &mut intc), 0);
        assert_eq!(uart.read(reg::LSR, &mut intc) & lsr::DR, 0);
    }

    #[test]
    fn test_overrun_is_sticky_until_read() {
        let (mut uart, mut intc) = uart();
        for i in 0..=FIFO_DEPTH {
            uart.receive(i as u8, &mut intc);
        }
        assert_ne!(uart.read(reg::LSR, &mut intc) & lsr::OE, 0);
        assert_eq!(uart.read(reg::LSR, &mut intc) & lsr::OE, 0);
    }
}
