//! MMC/SD controller.
//!
//! A command runs to completion when software starts the bus clock. The
//! response lands in the 16-bit response FIFO the way the hardware presents
//! it; data moves between the inserted [`VirtualSd`] and the byte FIFOs one
//! access at a time.

use super::intc::InterruptController;
use super::{Fifo, Peripheral};
use crate::vsd::{SdResponse, VirtualSd};
use palmsoc_hw::irq;
use palmsoc_hw::mmio::mmc::{FIFO_DEPTH, cmdat, ireg, registers as reg, stat, strpcl};
use std::collections::VecDeque;
use tracing::{debug, instrument, trace, warn};

/// Sticky STAT bits cleared when the next command starts
const STAT_EVENTS: u32 = stat::TIME_OUT_READ
    | stat::TIME_OUT_RESPONSE
    | stat::CRC_READ_ERROR
    | stat::DATA_TRAN_DONE
    | stat::PRG_DONE
    | stat::END_CMD_RES;

pub struct MmcController {
    base: u32,
    card: Option<VirtualSd>,
    clock_on: bool,
    stat: u32,
    events: u32,
    i_mask: u32,
    cmd: u32,
    argh: u32,
    argl: u32,
    cmdat: u32,
    clkrt: u32,
    spi: u32,
    resto: u32,
    rdto: u32,
    blklen: u32,
    nob: u32,
    response: VecDeque<u16>,
    rx: Fifo<u8>,
    read_remaining: usize,
    write_remaining: usize,
}

impl MmcController {
    pub fn new(base: u32) -> Self {
        Self {
            base,
            card: None,
            clock_on: false,
            stat: 0,
            events: 0,
            i_mask: 0x7F,
            cmd: 0,
            argh: 0,
            argl: 0,
            cmdat: 0,
            clkrt: 0,
            spi: 0,
            resto: 0x40,
            rdto: 0xFFFF,
            blklen: 0,
            nob: 0,
            response: VecDeque::with_capacity(9),
            rx: Fifo::new(FIFO_DEPTH),
            read_remaining: 0,
            write_remaining: 0,
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn insert_card(&mut self, card: VirtualSd) {
        debug!("MMC: card inserted, {} sectors", card.sector_count());
        self.card = Some(card);
    }

    pub fn card(&self) -> Option<&VirtualSd> {
        self.card.as_ref()
    }

    /// Receive DMA request
    pub fn rx_request(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Transmit DMA request
    pub fn tx_request(&self) -> bool {
        self.write_remaining > 0
    }

    fn argument(&self) -> u32 {
        (self.argh & 0xFFFF) << 16 | (self.argl & 0xFFFF)
    }

    fn run_command(&mut self) {
        let index = (self.cmd & 0x3F) as u8;
        let arg = self.argument();
        trace!("MMC: CMD{} arg={:#X} cmdat={:#X}", index, arg, self.cmdat);

        self.stat &= !STAT_EVENTS;
        self.events = 0;
        self.response.clear();
        self.rx.clear();
        self.read_remaining = 0;
        self.write_remaining = 0;

        let response = match self.card.as_mut() {
            Some(card) => card.command(index, arg),
            None => SdResponse::None,
        };
        let format = self.cmdat & cmdat::RESPONSE_FORMAT;
        if format != 0 {
            if response == SdResponse::None {
                debug!("MMC: CMD{} response timeout", index);
                self.stat |= stat::TIME_OUT_RESPONSE;
            } else {
                self.pack_response(index, response);
            }
        }
        self.stat |= stat::END_CMD_RES;
        self.events |= ireg::END_CMD_RES;

        if self.cmdat & cmdat::DATA_EN != 0 && self.stat & stat::TIME_OUT_RESPONSE == 0 {
            let length = (self.nob.max(1) * self.blklen) as usize;
            if self.cmdat & cmdat::WRITE != 0 {
                self.write_remaining = length;
            } else {
                self.read_remaining = length;
                self.refill();
            }
            if length == 0 {
                self.finish_data();
            }
        }
    }

    /// Lay out a response as the controller presents it: a header byte,
    /// the payload most significant byte first, then the CRC slot
    fn pack_response(&mut self, index: u8, response: SdResponse) {
        let mut bytes = Vec::with_capacity(18);
        match response {
            SdResponse::None => return,
            SdResponse::R2(words) => {
                bytes.push(0x3F);
                for word in words {
                    bytes.extend_from_slice(&word.to_be_bytes());
                }
            }
            SdResponse::R3(word) => {
                bytes.push(0x3F);
                bytes.extend_from_slice(&word.to_be_bytes());
            }
            SdResponse::R1(word) | SdResponse::R6(word) | SdResponse::R7(word) => {
                bytes.push(index & 0x3F);
                bytes.extend_from_slice(&word.to_be_bytes());
            }
        }
        bytes.push(0);
        for pair in bytes.chunks(2) {
            let hi = u16::from(pair[0]);
            let lo = pair.get(1).copied().map_or(0, u16::from);
            self.response.push_back(hi << 8 | lo);
        }
    }

    fn refill(&mut self) {
        let Some(card) = self.card.as_mut() else {
            self.read_remaining = 0;
            return;
        };
        while self.read_remaining > 0 && !self.rx.is_full() {
            match card.read_byte() {
                Some(byte) => {
                    self.rx.push(byte);
                    self.read_remaining -= 1;
                }
                None => {
                    warn!("MMC: card stopped sending with {} bytes left", self.read_remaining);
                    self.stat |= stat::TIME_OUT_READ;
                    self.read_remaining = 0;
                }
            }
        }
    }

    fn finish_data(&mut self) {
        self.stat |= stat::DATA_TRAN_DONE;
        self.events |= ireg::DATA_TRAN_DONE;
        if self.cmdat & cmdat::WRITE != 0 {
            self.stat |= stat::PRG_DONE;
            self.events |= ireg::PRG_DONE;
        }
    }

    fn status(&self) -> u32 {
        let mut value = self.stat | stat::XMIT_FIFO_EMPTY;
        if self.clock_on {
            value |= stat::CLK_EN;
        }
        if self.rx.is_full() {
            value |= stat::RECV_FIFO_FULL;
        }
        value
    }

    fn interrupts(&self) -> u32 {
        let mut value = self.events;
        if !self.rx.is_empty() {
            value |= ireg::RXFIFO_RD_REQ;
        }
        if self.write_remaining > 0 {
            value |= ireg::TXFIFO_WR_REQ;
        }
        if !self.clock_on {
            value |= ireg::CLK_IS_OFF;
        }
        value
    }

    fn update_irq(&self, intc: &mut InterruptController) {
        intc.set(irq::MMC, self.interrupts() & !self.i_mask & 0x7F != 0);
    }
}

impl Peripheral for MmcController {
    fn name(&self) -> &'static str {
        "MMC"
    }

    #[instrument(level = "trace", skip(self, intc), fields(base = self.base))]
    fn read(&mut self, offset: u32, intc: &mut InterruptController) -> u32 {
        let value = match offset {
            reg::STRPCL => 0,
            reg::STAT => self.status(),
            reg::CLKRT => self.clkrt,
            reg::SPI => self.spi,
            reg::CMDAT => self.cmdat,
            reg::RESTO => self.resto,
            reg::RDTO => self.rdto,
            reg::BLKLEN => self.blklen,
            reg::NOB => self.nob,
            reg::PRTBUF => 0,
            reg::I_MASK => self.i_mask,
            reg::I_REG => self.interrupts(),
            reg::CMD => self.cmd,
            reg::ARGH => self.argh,
            reg::ARGL => self.argl,
            reg::RES => self.response.pop_front().map_or(0, u32::from),
            reg::RXFIFO => {
                let byte = self.rx.pop().unwrap_or(0);
                if self.rx.is_empty() {
                    self.refill();
                    if self.rx.is_empty() && self.read_remaining == 0 {
                        self.finish_data();
                    }
                }
                u32::from(byte)
            }
            reg::TXFIFO => 0,
            _ => {
                warn!("Unknown MMC register read: offset={:#X}", offset);
                0
            }
        };
        self.update_irq(intc);
        value
    }

    #[instrument(level = "trace", skip(self, intc), fields(base = self.base))]
    fn write(&mut self, offset: u32, value: u32, intc: &mut InterruptController) {
        match offset {
            reg::STRPCL => match value & 0x3 {
                strpcl::START_CLK => {
                    self.clock_on = true;
                    self.run_command();
                }
                strpcl::STOP_CLK => self.clock_on = false,
                _ => {}
            },
            reg::CLKRT => self.clkrt = value & 0x7,
            reg::SPI => self.spi = value & 0xF,
            reg::CMDAT => self.cmdat = value & 0xFFFF,
            reg::RESTO => self.resto = value & 0x7F,
            reg::RDTO => self.rdto = value & 0xFFFF,
            reg::BLKLEN => self.blklen = value & 0x3FF,
            reg::NOB => self.nob = value & 0xFFFF,
            reg::PRTBUF => {}
            reg::I_MASK => self.i_mask = value & 0x7F,
            reg::CMD => self.cmd = value & 0x3F,
            reg::ARGH => self.argh = value & 0xFFFF,
            reg::ARGL => self.argl = value & 0xFFFF,
            reg::TXFIFO => {
                if self.write_remaining == 0 {
                    trace!("MMC: unexpected transmit byte {:#04X}", value);
                } else {
                    if let Some(card) = self.card.as_mut() {
                        card.write_byte(value as u8);
                    }
                    self.write_remaining -= 1;
                    if self.write_remaining == 0 {
                        self.finish_data();
                    }
                }
            }
            reg::STAT | reg::I_REG | reg::RES | reg::RXFIFO => {}
            _ => warn!(
                "Unknown MMC register write: offset={:#X}, value={:#X}",
                offset, value
            ),
        }
        self.update_irq(intc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsd::{ClosureSectorIo, Sector};
    use palmsoc_hw::mmio::mmc::{BASE, SECTOR_SIZE, commands as cmd};

    fn card() -> VirtualSd {
        let io = ClosureSectorIo::new(
            |index, buf: &mut Sector| {
                buf.fill(index as u8 + 1);
                Ok(())
            },
            |_, _: &Sector| Ok(()),
        );
        VirtualSd::new(64, Box::new(io))
    }

    fn issue(mmc: &mut MmcController, intc: &mut InterruptController, index: u8, arg: u32, flags: u32) {
        mmc.write(reg::CMD, u32::from(index), intc);
        mmc.write(reg::ARGH, arg >> 16, intc);
        mmc.write(reg::ARGL, arg & 0xFFFF, intc);
        mmc.write(reg::CMDAT, flags, intc);
        mmc.write(reg::STRPCL, strpcl::START_CLK, intc);
    }

    /// Decode a 48-bit response the way drivers do
    fn short_response(mmc: &mut MmcController, intc: &mut InterruptController) -> u32 {
        let w0 = mmc.read(reg::RES, intc);
        let w1 = mmc.read(reg::RES, intc);
        let w2 = mmc.read(reg::RES, intc);
        (w0 & 0xFF) << 24 | w1 << 8 | w2 >> 8
    }

    #[test]
    fn test_no_card_times_out() {
        let mut intc = InterruptController::new(32);
        let mut mmc = MmcController::new(BASE);
        issue(&mut mmc, &mut intc, cmd::SEND_IF_COND, 0x1AA, 1);
        let status = mmc.read(reg::STAT, &mut intc);
        assert_ne!(status & stat::TIME_OUT_RESPONSE, 0);
        assert_ne!(status & stat::END_CMD_RES, 0);
    }

    #[test]
    fn test_response_fifo_layout() {
        let mut intc = InterruptController::new(32);
        let mut mmc = MmcController::new(BASE);
        mmc.insert_card(card());
        mmc.write(reg::I_MASK, !ireg::END_CMD_RES & 0x7F, &mut intc);

        issue(&mut mmc, &mut intc, cmd::SEND_IF_COND, 0x1AA, 1);
        assert!(intc.is_pending(irq::MMC));
        assert_eq!(short_response(&mut mmc, &mut intc), 0x1AA);
    }

    #[test]
    fn test_block_read_through_rx_fifo() {
        let mut intc = InterruptController::new(32);
        let mut mmc = MmcController::new(BASE);
        mmc.insert_card(card());

        issue(&mut mmc, &mut intc, cmd::GO_IDLE_STATE, 0, 0);
        issue(&mut mmc, &mut intc, cmd::APP_CMD, 0, 1);
        issue(&mut mmc, &mut intc, cmd::ACMD_SD_SEND_OP_COND, 0x00FF_8000, 3);
        issue(&mut mmc, &mut intc, cmd::ALL_SEND_CID, 0, 2);
        issue(&mut mmc, &mut intc, cmd::SEND_RELATIVE_ADDR, 0, 1);
        let rca = short_response(&mut mmc, &mut intc) & 0xFFFF_0000;
        issue(&mut mmc, &mut intc, cmd::SELECT_CARD, rca, 1);

        mmc.write(reg::BLKLEN, SECTOR_SIZE as u32, &mut intc);
        mmc.write(reg::NOB, 1, &mut intc);
        issue(&mut mmc, &mut intc, cmd::READ_SINGLE_BLOCK, 7, 1 | cmdat::DATA_EN);
        assert!(mmc.rx_request());

        let data: Vec<u32> = (0..SECTOR_SIZE)
            .map(|_| mmc.read(reg::RXFIFO, &mut intc))
            .collect();
        assert!(data.iter().all(|&b| b == 8));
        assert!(!mmc.rx_request());
        assert_ne!(mmc.read(reg::I_REG, &mut intc) & ireg::DATA_TRAN_DONE, 0);
    }
}
