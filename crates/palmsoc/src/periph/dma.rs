//! DMA controller.
//!
//! Each running channel moves at most one burst per service call, either
//! from registers programmed directly (no-descriptor mode) or from
//! descriptor chains fetched from memory. Flow-controlled channels only move
//! data while the request line mapped to them is active.

use super::Peripheral;
use super::intc::InterruptController;
use crate::memory::{MemError, PhysMemory};
use palmsoc_hw::irq;
use palmsoc_hw::mmio::dma::{
    DDADR_STOP, DRCMR_CHLNUM, DRCMR_MAPVLD, REQUESTS, dcmd, dcsr, registers as reg,
};
use tracing::{debug, trace, warn};

/// Memory and register space as seen by a bus master
pub trait DmaBus {
    fn read(&mut self, addr: u32, width: usize) -> Result<u32, MemError>;
    fn write(&mut self, addr: u32, width: usize, value: u32) -> Result<(), MemError>;
}

impl DmaBus for PhysMemory {
    fn read(&mut self, addr: u32, width: usize) -> Result<u32, MemError> {
        match width {
            1 => self.read_u8(addr).map(u32::from),
            2 => self.read_u16(addr).map(u32::from),
            _ => self.read_u32(addr),
        }
    }

    fn write(&mut self, addr: u32, width: usize, value: u32) -> Result<(), MemError> {
        match width {
            1 => self.write_u8(addr, value as u8),
            2 => self.write_u16(addr, value as u16),
            _ => self.write_u32(addr, value),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Channel {
    dcsr: u32,
    ddadr: u32,
    dsadr: u32,
    dtadr: u32,
    dcmd: u32,
    /// A descriptor must be fetched before the next transfer
    fetch_pending: bool,
    /// The descriptor just completed was the last of its chain
    last_descriptor: bool,
}

impl Channel {
    fn stopped() -> Self {
        Self {
            dcsr: dcsr::STOPSTATE,
            ..Default::default()
        }
    }

    fn running(&self) -> bool {
        self.dcsr & dcsr::RUN != 0
    }

    fn descriptor_mode(&self) -> bool {
        self.dcsr & dcsr::NODESCFETCH == 0
    }

    fn interrupting(&self) -> bool {
        self.dcsr & dcsr::WRITE_CLEAR != 0
            || (self.dcsr & dcsr::STOPSTATE != 0 && self.dcsr & dcsr::STOPIRQEN != 0)
    }

    fn stop(&mut self) {
        self.dcsr = (self.dcsr & !dcsr::RUN) | dcsr::STOPSTATE;
    }

    fn transfer_width(&self) -> usize {
        match (self.dcmd >> 14) & 3 {
            1 => 1,
            2 => 2,
            _ => 4,
        }
    }

    fn burst_bytes(&self) -> u32 {
        match (self.dcmd >> 16) & 3 {
            1 => 8,
            2 => 16,
            _ => 32,
        }
    }
}

pub struct DmaController {
    base: u32,
    channels: Vec<Channel>,
    drcmr: [u32; REQUESTS],
    requests: [bool; REQUESTS],
}

impl DmaController {
    pub fn new(base: u32, channels: usize) -> Self {
        Self {
            base,
            channels: vec![Channel::stopped(); channels],
            drcmr: [0; REQUESTS],
            requests: [false; REQUESTS],
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Drive a peripheral request line
    pub fn set_request(&mut self, request: u8, active: bool) {
        if let Some(r) = self.requests.get_mut(request as usize) {
            *r = active;
        }
    }

    /// Channel servicing `request`, if the map entry is valid
    fn mapped_channel(&self, request: usize) -> Option<usize> {
        let map = self.drcmr[request];
        (map & DRCMR_MAPVLD != 0).then_some((map & DRCMR_CHLNUM) as usize)
    }

    fn request_active_for(&self, channel: usize) -> bool {
        (0..REQUESTS).any(|r| self.requests[r] && self.mapped_channel(r) == Some(channel))
    }

    fn dint(&self) -> u32 {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, ch)| ch.interrupting())
            .fold(0, |acc, (i, _)| acc | 1 << i)
    }

    pub fn update_irq(&self, intc: &mut InterruptController) {
        intc.set(irq::DMA, self.dint() != 0);
    }

    /// Run one burst on every channel that can make progress
    pub fn service(&mut self, bus: &mut dyn DmaBus) {
        for index in 0..self.channels.len() {
            if !self.channels[index].running() {
                continue;
            }
            let flow = self.channels[index].dcmd & (dcmd::FLOWSRC | dcmd::FLOWTRG) != 0;
            let needs_fetch = self.channels[index].fetch_pending;
            if !needs_fetch && flow && !self.request_active_for(index) {
                continue;
            }
            if let Err(e) = self.step_channel(index, bus) {
                warn!("DMA channel {}: bus error: {}", index, e);
                let ch = &mut self.channels[index];
                ch.dcsr |= dcsr::BUSERRINTR;
                ch.stop();
            }
        }
    }

    fn fetch_descriptor(ch: &mut Channel, bus: &mut dyn DmaBus) -> Result<(), MemError> {
        let addr = ch.ddadr & !0xF;
        ch.ddadr = bus.read(addr, 4)?;
        ch.dsadr = bus.read(addr + 4, 4)?;
        ch.dtadr = bus.read(addr + 8, 4)?;
        ch.dcmd = bus.read(addr + 12, 4)?;
        ch.fetch_pending = false;
        ch.last_descriptor = ch.ddadr & DDADR_STOP != 0;
        if ch.dcmd & dcmd::STARTIRQEN != 0 {
            ch.dcsr |= dcsr::STARTINTR;
        }
        trace!(
            "DMA descriptor @ {:#X}: src={:#X} dst={:#X} cmd={:#X} next={:#X}",
            addr, ch.dsadr, ch.dtadr, ch.dcmd, ch.ddadr
        );
        Ok(())
    }

    fn step_channel(&mut self, index: usize, bus: &mut dyn DmaBus) -> Result<(), MemError> {
        let ch = &mut self.channels[index];
        if ch.fetch_pending {
            Self::fetch_descriptor(ch, bus)?;
        }

        let width = ch.transfer_width();
        let mut budget = ch.burst_bytes();
        while budget > 0 && ch.dcmd & dcmd::LENGTH != 0 {
            let value = bus.read(ch.dsadr, width)?;
            bus.write(ch.dtadr, width, value)?;
            if ch.dcmd & dcmd::INCSRCADDR != 0 {
                ch.dsadr = ch.dsadr.wrapping_add(width as u32);
            }
            if ch.dcmd & dcmd::INCTRGADDR != 0 {
                ch.dtadr = ch.dtadr.wrapping_add(width as u32);
            }
            let len = ch.dcmd & dcmd::LENGTH;
            let moved = (width as u32).min(len);
            ch.dcmd = (ch.dcmd & !dcmd::LENGTH) | (len - moved);
            budget = budget.saturating_sub(width as u32);
        }

        if ch.dcmd & dcmd::LENGTH == 0 {
            if ch.dcmd & dcmd::ENDIRQEN != 0 {
                ch.dcsr |= dcsr::ENDINTR;
            }
            if ch.descriptor_mode() && !ch.last_descriptor {
                ch.fetch_pending = true;
            } else {
                debug!("DMA channel {} finished", index);
                ch.stop();
            }
        }
        Ok(())
    }

    fn write_dcsr(&mut self, index: usize, value: u32) {
        let ch = &mut self.channels[index];
        let was_running = ch.running();
        ch.dcsr &= !(value & dcsr::WRITE_CLEAR);
        let control = dcsr::RUN | dcsr::NODESCFETCH | dcsr::STOPIRQEN;
        ch.dcsr = (ch.dcsr & !control) | (value & control);

        if ch.running() && !was_running {
            ch.dcsr &= !dcsr::STOPSTATE;
            ch.fetch_pending = ch.descriptor_mode();
            ch.last_descriptor = !ch.descriptor_mode();
            debug!(
                "DMA channel {} started ({})",
                index,
                if ch.descriptor_mode() {
                    "descriptor"
                } else {
                    "no-descriptor"
                }
            );
        } else if !ch.running() {
            ch.dcsr |= dcsr::STOPSTATE;
        }
    }

    /// Decode a per-channel register offset into (channel, register)
    fn channel_reg(&self, offset: u32) -> Option<(usize, u32)> {
        match offset {
            reg::DCSR..reg::DALGN => {
                let index = (offset / 4) as usize;
                (index < self.channels.len()).then_some((index, reg::DCSR))
            }
            reg::DDADR..0x400 => {
                let index = ((offset - reg::DDADR) / 16) as usize;
                let register = reg::DDADR + (offset & 0xF);
                (index < self.channels.len()).then_some((index, register))
            }
            _ => None,
        }
    }

    fn drcmr_index(offset: u32) -> Option<usize> {
        let index = match offset {
            reg::DRCMR..reg::DDADR => (offset - reg::DRCMR) / 4,
            reg::DRCMR_HI.. => 64 + (offset - reg::DRCMR_HI) / 4,
            _ => return None,
        } as usize;
        (index < REQUESTS).then_some(index)
    }
}

impl Peripheral for DmaController {
    fn name(&self) -> &'static str {
        "DMA"
    }

    fn read(&mut self, offset: u32, _intc: &mut InterruptController) -> u32 {
        if offset == reg::DINT {
            return self.dint();
        }
        if let Some(index) = Self::drcmr_index(offset) {
            return self.drcmr[index];
        }
        match self.channel_reg(offset) {
            Some((i, reg::DCSR)) => {
                let ch = &self.channels[i];
                let reqpend = if self.request_active_for(i) {
                    dcsr::REQPEND
                } else {
                    0
                };
                ch.dcsr | reqpend
            }
            Some((i, reg::DDADR)) => self.channels[i].ddadr,
            Some((i, reg::DSADR)) => self.channels[i].dsadr,
            Some((i, reg::DTADR)) => self.channels[i].dtadr,
            Some((i, reg::DCMD)) => self.channels[i].dcmd,
            _ => {
                trace!("DMA read of unmodeled register {:#X}", offset);
                0
            }
        }
    }

    fn write(&mut self, offset: u32, value: u32, intc: &mut InterruptController) {
        if let Some(index) = Self::drcmr_index(offset) {
            self.drcmr[index] = value & (DRCMR_MAPVLD | DRCMR_CHLNUM);
            debug!("DMA request {} -> {:#X}", index, self.drcmr[index]);
            return;
        }
        match self.channel_reg(offset) {
            Some((i, reg::DCSR)) => self.write_dcsr(i, value),
            Some((i, reg::DDADR)) => self.channels[i].ddadr = value,
            Some((i, reg::DSADR)) => self.channels[i].dsadr = value,
            Some((i, reg::DTADR)) => self.channels[i].dtadr = value,
            Some((i, reg::DCMD)) => self.channels[i].dcmd = value,
            _ => {
                trace!(
                    "DMA write of unmodeled register {:#X} = {:#X}",
                    offset, value
                );
            }
        }
        self.update_irq(intc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Backing;
    use palmsoc_hw::mmio::dma::{BASE, CHANNELS_PXA25X};

    const RAM: u32 = 0xA000_0000;

    fn setup() -> (DmaController, PhysMemory, InterruptController) {
        let mut mem = PhysMemory::new();
        let bank = mem.alloc_bank(0x10000).unwrap();
        mem.add_region("ram", RAM, 0x10000, Backing::Ram { bank })
            .unwrap();
        (
            DmaController::new(BASE, CHANNELS_PXA25X),
            mem,
            InterruptController::new(32),
        )
    }

    #[test]
    fn test_no_descriptor_copy() {
        let (mut dma, mut mem, mut intc) = setup();
        for i in 0..16u32 {
            mem.write_u32(RAM + i * 4, i + 1).unwrap();
        }
        dma.write(reg::DSADR, RAM, &mut intc);
        dma.write(reg::DTADR, RAM + 0x1000, &mut intc);
        dma.write(
            reg::DCMD,
            dcmd::INCSRCADDR | dcmd::INCTRGADDR | dcmd::ENDIRQEN | (3 << 16) | (3 << 14) | 64,
            &mut intc,
        );
        dma.write(reg::DCSR, dcsr::RUN | dcsr::NODESCFETCH, &mut intc);

        dma.service(&mut mem);
        dma.update_irq(&mut intc);
        // One 32-byte burst per service
        assert_eq!(dma.read(reg::DCMD, &mut intc) & dcmd::LENGTH, 32);
        assert!(!intc.is_pending(irq::DMA));

        dma.service(&mut mem);
        dma.update_irq(&mut intc);
        assert_eq!(mem.read_u32(RAM + 0x1000 + 60).unwrap(), 16);
        assert!(intc.is_pending(irq::DMA));
        assert_eq!(dma.read(reg::DINT, &mut intc), 1);
        let status = dma.read(reg::DCSR, &mut intc);
        assert_ne!(status & dcsr::ENDINTR, 0);
        assert_ne!(status & dcsr::STOPSTATE, 0);

        dma.write(reg::DCSR, dcsr::ENDINTR | dcsr::NODESCFETCH, &mut intc);
        assert!(!intc.is_pending(irq::DMA));
    }

    #[test]
    fn test_descriptor_chain() {
        let (mut dma, mut mem, mut intc) = setup();
        let desc = RAM + 0x2000;
        // Two descriptors, each copying one word
        let words = [
            desc + 0x10,
            RAM,
            RAM + 0x100,
            dcmd::INCSRCADDR | dcmd::INCTRGADDR | 4,
            DDADR_STOP,
            RAM + 4,
            RAM + 0x104,
            dcmd::INCSRCADDR | dcmd::INCTRGADDR | dcmd::ENDIRQEN | 4,
        ];
        for (i, w) in words.iter().enumerate() {
            mem.write_u32(desc + i as u32 * 4, *w).unwrap();
        }
        mem.write_u32(RAM, 0xAAAA_AAAA).unwrap();
        mem.write_u32(RAM + 4, 0xBBBB_BBBB).unwrap();

        dma.write(reg::DDADR + 16 * 2, desc, &mut intc);
        dma.write(reg::DCSR + 4 * 2, dcsr::RUN, &mut intc);
        for _ in 0..4 {
            dma.service(&mut mem);
        }
        dma.update_irq(&mut intc);

        assert_eq!(mem.read_u32(RAM + 0x100).unwrap(), 0xAAAA_AAAA);
        assert_eq!(mem.read_u32(RAM + 0x104).unwrap(), 0xBBBB_BBBB);
        assert_eq!(dma.read(reg::DINT, &mut intc), 1 << 2);
        assert_ne!(dma.read(reg::DCSR + 8, &mut intc) & dcsr::STOPSTATE, 0);
    }

    #[test]
    fn test_bus_error_outside_ram() {
        let (mut dma, mut mem, mut intc) = setup();
        dma.write(reg::DSADR, 0x1000_0000, &mut intc);
        dma.write(reg::DTADR, RAM, &mut intc);
        dma.write(reg::DCMD, 4, &mut intc);
        dma.write(reg::DCSR, dcsr::RUN | dcsr::NODESCFETCH, &mut intc);
        dma.service(&mut mem);
        dma.update_irq(&mut intc);
        assert_ne!(dma.read(reg::DCSR, &mut intc) & dcsr::BUSERRINTR, 0);
        assert!(intc.is_pending(irq::DMA));
    }

    #[test]
    fn test_flow_control_waits_for_request() {
        let (mut dma, mut mem, mut intc) = setup();
        mem.write_u32(RAM, 7).unwrap();
        dma.write(reg::DRCMR + 4 * 13, DRCMR_MAPVLD | 1, &mut intc);
        dma.write(reg::DSADR + 16, RAM, &mut intc);
        dma.write(reg::DTADR + 16, RAM + 0x40, &mut intc);
        dma.write(reg::DCMD + 16, dcmd::FLOWSRC | 4, &mut intc);
        dma.write(reg::DCSR + 4, dcsr::RUN | dcsr::NODESCFETCH, &mut intc);

        dma.service(&mut mem);
        assert_eq!(mem.read_u32(RAM + 0x40).unwrap(), 0);

        dma.set_request(13, true);
        assert_ne!(dma.read(reg::DCSR + 4, &mut intc) & dcsr::REQPEND, 0);
        dma.service(&mut mem);
        assert_eq!(mem.read_u32(RAM + 0x40).unwrap(), 7);
    }
}
