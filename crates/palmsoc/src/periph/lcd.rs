//! LCD controller.
//!
//! Each scheduled frame walks the channel 0 descriptor chain in memory,
//! reads the 16 bpp framebuffer it points at and converts it to an RGBA
//! [`Frame`].

use super::Peripheral;
use super::dma::DmaBus;
use super::intc::InterruptController;
use crate::profile::DisplayConfig;
use palmsoc_hw::irq;
use palmsoc_hw::mmio::lcd::{
    BPP_16, LCCR3_BPP_MASK, LCCR3_BPP_SHIFT, descriptor, lccr0, lcsr, registers as reg,
};
use tracing::{debug, trace, warn};

/// One composed display frame, RGBA8888, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    /// RGBA value of the pixel at (x, y), `None` outside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let rgba = self.pixels.get(i..i + 4)?;
        rgba.try_into().ok()
    }
}

/// Expand an RGB565 pixel to RGBA8888
pub fn rgb565_to_rgba(pixel: u16) -> [u8; 4] {
    let r = ((pixel >> 11) & 0x1F) as u8;
    let g = ((pixel >> 5) & 0x3F) as u8;
    let b = (pixel & 0x1F) as u8;
    [
        (r << 3) | (r >> 2),
        (g << 2) | (g >> 4),
        (b << 3) | (b >> 2),
        0xFF,
    ]
}

#[derive(Debug, Clone)]
pub struct Lcd {
    base: u32,
    display: DisplayConfig,
    lccr: [u32; 4],
    fbr0: u32,
    lcsr: u32,
    fdadr0: u32,
    fsadr0: u32,
    fidr0: u32,
    ldcmd0: u32,
}

impl Lcd {
    pub fn new(base: u32, display: DisplayConfig) -> Self {
        Self {
            base,
            display,
            lccr: [0; 4],
            fbr0: 0,
            lcsr: 0,
            fdadr0: 0,
            fsadr0: 0,
            fidr0: 0,
            ldcmd0: 0,
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn display(&self) -> DisplayConfig {
        self.display
    }

    pub fn enabled(&self) -> bool {
        self.lccr[0] & lccr0::ENB != 0
    }

    fn bits_per_pixel_code(&self) -> u32 {
        (self.lccr[3] >> LCCR3_BPP_SHIFT) & LCCR3_BPP_MASK
    }

    /// Fetch the descriptor at `addr` into the channel 0 registers
    fn load_descriptor(&mut self, bus: &mut dyn DmaBus, addr: u32) -> Result<(), ()> {
        let mut word = |offset: u32| {
            bus.read(addr + offset, 4).map_err(|e| {
                warn!("LCD: descriptor fetch failed: {}", e);
            })
        };
        let next = word(descriptor::FDADR)?;
        let source = word(descriptor::FSADR)?;
        let id = word(descriptor::FIDR)?;
        let command = word(descriptor::LDCMD)?;
        self.fdadr0 = next;
        self.fsadr0 = source;
        self.fidr0 = id;
        self.ldcmd0 = command;
        Ok(())
    }

    /// Compose one frame from memory. Returns `None` while the controller is
    /// disabled or after a bus error.
    pub fn compose(
        &mut self,
        bus: &mut dyn DmaBus,
        intc: &mut InterruptController,
    ) -> Option<Frame> {
        if !self.enabled() || self.fdadr0 == 0 {
            return None;
        }
        if self.fbr0 & 1 != 0 {
            trace!("LCD: taking frame branch to {:#X}", self.fbr0 & !0xF);
            self.fdadr0 = self.fbr0 & !0xF;
            self.fbr0 = 0;
        }

        let mut addr = self.fdadr0;
        if self.load_descriptor(bus, addr).is_err() {
            return self.bus_error(intc);
        }
        // A palette descriptor is followed by the frame descriptor
        if self.ldcmd0 & descriptor::PAL != 0 {
            addr = self.fdadr0;
            if self.load_descriptor(bus, addr).is_err() {
                return self.bus_error(intc);
            }
        }
        self.lcsr |= lcsr::SOF;

        if self.bits_per_pixel_code() != BPP_16 {
            trace!("LCD: unsupported depth code {}", self.bits_per_pixel_code());
            self.end_of_frame(intc);
            return None;
        }

        let width = u32::from(self.display.width);
        let height = u32::from(self.display.height);
        let count = width * height;
        if (self.ldcmd0 & descriptor::LEN_MASK) / 2 < count {
            trace!("LCD: descriptor shorter than the panel, reading past it");
        }
        let mut pixels = Vec::with_capacity((count * 4) as usize);
        let mut src = self.fsadr0;
        for _ in 0..count / 2 {
            let Ok(pair) = bus.read(src, 4) else {
                return self.bus_error(intc);
            };
            pixels.extend_from_slice(&rgb565_to_rgba(pair as u16));
            pixels.extend_from_slice(&rgb565_to_rgba((pair >> 16) as u16));
            src = src.wrapping_add(4);
        }
        self.end_of_frame(intc);
        Some(Frame {
            width,
            height,
            pixels,
        })
    }

    fn end_of_frame(&mut self, intc: &mut InterruptController) {
        self.lcsr |= lcsr::EOF;
        self.update_irq(intc);
    }

    fn bus_error(&mut self, intc: &mut InterruptController) -> Option<Frame> {
        warn!("LCD: bus error at descriptor {:#X}", self.fdadr0);
        self.lcsr |= lcsr::BER;
        self.update_irq(intc);
        None
    }

    fn update_irq(&self, intc: &mut InterruptController) {
        let eof = self.lcsr & lcsr::EOF != 0 && self.lccr[0] & lccr0::EFM == 0;
        let errors = self.lcsr & (lcsr::BER | lcsr::LDD) != 0;
        intc.set(irq::LCD, eof || errors);
    }
}

impl Peripheral for Lcd {
    fn name(&self) -> &'static str {
        "LCD"
    }

    fn read(&mut self, offset: u32, _intc: &mut InterruptController) -> u32 {
        match offset {
            reg::LCCR0 | reg::LCCR1 | reg::LCCR2 | reg::LCCR3 => self.lccr[(offset / 4) as usize],
            reg::FBR0 => self.fbr0,
            reg::LCSR => self.lcsr,
            reg::LIIDR => self.fidr0,
            reg::FDADR0 => self.fdadr0,
            reg::FSADR0 => self.fsadr0,
            reg::FIDR0 => self.fidr0,
            reg::LDCMD0 => self.ldcmd0,
            _ => {
                warn!("Unknown LCD register read: offset={:#X}", offset);
                0
            }
        }
    }

    fn write(&mut self, offset: u32, value: u32, intc: &mut InterruptController) {
        match offset {
            reg::LCCR0 => {
                let was_enabled = self.enabled();
                self.lccr[0] = value;
                if was_enabled && !self.enabled() {
                    debug!("LCD: disabled");
                    self.lcsr |= lcsr::LDD;
                } else if !was_enabled && self.enabled() {
                    debug!(
                        "LCD: enabled, {}x{}, descriptor {:#X}",
                        self.display.width, self.display.height, self.fdadr0
                    );
                }
            }
            reg::LCCR1 | reg::LCCR2 | reg::LCCR3 => self.lccr[(offset / 4) as usize] = value,
            reg::FBR0 => self.fbr0 = value,
            reg::LCSR => self.lcsr &= !value,
            reg::FDADR0 => self.fdadr0 = value & !0xF,
            reg::LIIDR | reg::FSADR0 | reg::FIDR0 | reg::LDCMD0 => {}
            _ => warn!(
                "Unknown LCD register write: offset={:#X}, value={:#X}",
                offset, value
            ),
        }
        self.update_irq(intc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Backing, PhysMemory};
    use palmsoc_hw::memory_map::ram;
    use palmsoc_hw::mmio::lcd::BASE;

    const DESC: u32 = ram::BASE + 0x1000;
    const FB: u32 = ram::BASE + 0x2000;

    fn small_display() -> DisplayConfig {
        DisplayConfig {
            width: 4,
            height: 2,
            graffiti_height: 0,
        }
    }

    fn memory() -> PhysMemory {
        let mut mem = PhysMemory::new();
        let bank = mem.alloc_bank(0x10000).unwrap();
        mem.add_region("ram", ram::BASE, 0x10000, Backing::Ram { bank }).unwrap();
        mem.write_u32(DESC + descriptor::FDADR, DESC).unwrap();
        mem.write_u32(DESC + descriptor::FSADR, FB).unwrap();
        mem.write_u32(DESC + descriptor::FIDR, 0x55).unwrap();
        mem.write_u32(DESC + descriptor::LDCMD, 16).unwrap();
        mem
    }

    fn enabled_lcd(intc: &mut InterruptController) -> Lcd {
        let mut lcd = Lcd::new(BASE, small_display());
        lcd.write(reg::FDADR0, DESC, intc);
        lcd.write(reg::LCCR3, BPP_16 << LCCR3_BPP_SHIFT, intc);
        lcd.write(reg::LCCR0, lccr0::ENB, intc);
        lcd
    }

    #[test]
    fn test_rgb565_expansion() {
        assert_eq!(rgb565_to_rgba(0xFFFF), [0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(rgb565_to_rgba(0xF800), [0xFF, 0, 0, 0xFF]);
        assert_eq!(rgb565_to_rgba(0x07E0), [0, 0xFF, 0, 0xFF]);
        assert_eq!(rgb565_to_rgba(0x001F), [0, 0, 0xFF, 0xFF]);
    }

    #[test]
    fn test_compose_frame_from_descriptor() {
        let mut intc = InterruptController::new(32);
        let mut mem = memory();
        mem.write_u16(FB, 0xF800).unwrap();
        mem.write_u16(FB + 2 * 5, 0x001F).unwrap();
        let mut lcd = enabled_lcd(&mut intc);

        let frame = lcd.compose(&mut mem, &mut intc).unwrap();
        assert_eq!((frame.width, frame.height), (4, 2));
        assert_eq!(frame.pixels.len(), 4 * 2 * 4);
        assert_eq!(frame.pixel(0, 0), Some([0xFF, 0, 0, 0xFF]));
        assert_eq!(frame.pixel(1, 1), Some([0, 0, 0xFF, 0xFF]));
        assert_eq!(frame.pixel(4, 0), None);
        assert_eq!(frame.pixel(0, 2), None);
        assert_eq!(lcd.read(reg::FIDR0, &mut intc), 0x55);

        assert!(intc.is_pending(irq::LCD));
        lcd.write(reg::LCSR, lcsr::EOF | lcsr::SOF, &mut intc);
        assert!(!intc.is_pending(irq::LCD));
    }

    #[test]
    fn test_pixel_on_short_buffer() {
        let frame = Frame {
            width: 2,
            height: 2,
            pixels: vec![0xAA; 4 * 3],
        };
        assert_eq!(frame.pixel(0, 1), Some([0xAA; 4]));
        assert_eq!(frame.pixel(1, 1), None);
    }

    #[test]
    fn test_end_of_frame_mask() {
        let mut intc = InterruptController::new(32);
        let mut mem = memory();
        let mut lcd = enabled_lcd(&mut intc);
        lcd.write(reg::LCCR0, lccr0::ENB | lccr0::EFM, &mut intc);
        assert!(lcd.compose(&mut mem, &mut intc).is_some());
        assert!(!intc.is_pending(irq::LCD));
        assert_ne!(lcd.read(reg::LCSR, &mut intc) & lcsr::EOF, 0);
    }

    #[test]
    fn test_disabled_or_unmapped() {
        let mut intc = InterruptController::new(32);
        let mut mem = memory();
        let mut lcd = Lcd::new(BASE, small_display());
        assert!(lcd.compose(&mut mem, &mut intc).is_none());

        lcd.write(reg::FDADR0, 0x1000_0000, &mut intc);
        lcd.write(reg::LCCR0, lccr0::ENB, &mut intc);
        assert!(lcd.compose(&mut mem, &mut intc).is_none());
        assert_ne!(lcd.read(reg::LCSR, &mut intc) & lcsr::BER, 0);
    }
}
