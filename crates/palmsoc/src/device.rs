//! Board-level device models.
//!
//! The SoC is the same across handhelds; what differs is what hangs off its
//! pins. A [`DeviceModel`] wires buttons to GPIO lines, answers on the
//! serial buses it owns and picks the UART used as a debug console.
//! [`PalmDevice`] is the generic Palm model used for every builtin profile.

use crate::keypad::{Key, Keypad};
use crate::manifest::{Revision, SspRole};
use crate::periph::gpio::Gpio;
use crate::periph::i2c::{I2c, I2cTarget};
use crate::periph::intc::InterruptController;
use crate::periph::ssp::SspClient;
use crate::periph::uart::UartPort;
use crate::profile::DisplayConfig;
use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::{debug, info, trace};

/// Pen contact point in screen pixels (graffiti area included)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PenPosition {
    pub x: u16,
    pub y: u16,
}

/// Peripherals a device model may wire itself to during setup
pub struct DevicePeripherals<'a> {
    pub keypad: &'a mut Keypad,
    pub gpio: &'a mut Gpio,
    pub i2c: &'a mut I2c,
    pub intc: &'a mut InterruptController,
}

pub trait DeviceModel {
    fn name(&self) -> &'static str;

    /// Connect buttons, pen line and bus targets
    fn setup(&mut self, io: &mut DevicePeripherals<'_>);

    fn key(&mut self, key: Key, pressed: bool);

    /// `None` when the pen is lifted
    fn touch(&mut self, pen: Option<PenPosition>);

    /// Called every scheduler step with the global step counter, starting at 1
    fn periodic(&mut self, cycles: u64);

    fn is_key_pressed(&self, key: Key) -> bool;

    /// UART carrying the firmware's debug console
    fn debug_uart(&self) -> UartPort;

    /// Device on the far end of an SSP port, if any
    fn ssp_client(&mut self, role: SspRole) -> Option<&mut dyn SspClient>;
}

/// Raw NAND image: 512-byte pages each followed by 16 spare bytes.
///
/// Only the page geometry is checked; the NAND controller is not modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NandImage {
    pages: u64,
}

impl NandImage {
    pub const PAGE_SIZE: usize = 512;
    pub const SPARE_SIZE: usize = 16;
    const RAW_PAGE: u64 = (Self::PAGE_SIZE + Self::SPARE_SIZE) as u64;

    /// Check that `path` holds a whole number of raw pages
    pub fn open(path: &Path) -> io::Result<Self> {
        let len = File::open(path)?.metadata()?.len();
        if len == 0 || len % Self::RAW_PAGE != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "NAND image {} is {} bytes, not a whole number of {}-byte pages",
                    path.display(),
                    len,
                    Self::RAW_PAGE
                ),
            ));
        }
        let pages = len / Self::RAW_PAGE;
        info!("NAND image {}: {} pages", path.display(), pages);
        Ok(Self { pages })
    }

    pub fn page_count(&self) -> u64 {
        self.pages
    }
}

/// Steps between touch controller conversions
const SAMPLE_INTERVAL: u64 = 4096;

/// ADS7846-style resistive touch controller on SSP1.
///
/// A control byte (START bit set) selects a channel; the 12-bit conversion
/// is shifted out on the following exchange, left-aligned in 15 bits.
#[derive(Debug, Clone)]
pub struct TouchController {
    width: u32,
    height: u32,
    pen: Option<PenPosition>,
    /// Latched X and Y conversions
    sample: Option<(u16, u16)>,
    shift: u32,
}

impl TouchController {
    const START: u32 = 0x80;
    const MAX: u32 = 0xFFF;

    pub fn new(display: DisplayConfig) -> Self {
        Self {
            width: u32::from(display.width),
            height: u32::from(display.height) + u32::from(display.graffiti_height),
            pen: None,
            sample: None,
            shift: 0,
        }
    }

    pub fn set_pen(&mut self, pen: Option<PenPosition>) {
        self.pen = pen;
        if pen.is_none() {
            self.sample = None;
        }
    }

    /// Convert the current pen position
    pub fn latch(&mut self) {
        let scale = |v: u16, span: u32| {
            let v = u32::from(v).min(span.saturating_sub(1));
            (v * Self::MAX / span.saturating_sub(1).max(1)) as u16
        };
        self.sample = self
            .pen
            .map(|p| (scale(p.x, self.width), scale(p.y, self.height)));
    }

    fn convert(&self, channel: u32) -> u32 {
        match (channel, self.sample) {
            // X+ and Y+ positions
            (5, Some((x, _))) => u32::from(x),
            (1, Some((_, y))) => u32::from(y),
            // Z1 and Z2 pressure plates
            (3, Some(_)) => 0x400,
            (4, Some(_)) => 0x800,
            (4, None) => Self::MAX,
            // Battery, about 3.9 V through the 1/4 divider
            (2, _) => 0x9C0,
            // Temperature diodes
            (0, _) => 0x3A0,
            (7, _) => 0x420,
            _ => 0,
        }
    }
}

impl SspClient for TouchController {
    fn exchange(&mut self, word: u32) -> u32 {
        let out = std::mem::take(&mut self.shift);
        if word & Self::START != 0 {
            let channel = (word >> 4) & 7;
            self.shift = self.convert(channel) << 3;
            trace!("Touch: channel {} -> {:#X}", channel, self.shift >> 3);
        }
        out
    }
}

/// Fuel gauge on the I2C bus: a byte write selects a register, reads
/// stream registers from there
#[derive(Debug, Clone)]
pub struct BatteryGauge {
    pointer: u8,
    /// State of charge in percent
    charge: u8,
    millivolts: u16,
}

impl BatteryGauge {
    pub const ADDRESS: u8 = 0x55;

    pub fn new() -> Self {
        Self {
            pointer: 0,
            charge: 100,
            millivolts: 4100,
        }
    }

    fn register(&self, index: u8) -> u8 {
        match index {
            0x08 => self.millivolts as u8,
            0x09 => (self.millivolts >> 8) as u8,
            0x0B => self.charge,
            _ => 0,
        }
    }
}

impl Default for BatteryGauge {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cTarget for BatteryGauge {
    fn write(&mut self, byte: u8) -> bool {
        self.pointer = byte;
        true
    }

    fn read(&mut self) -> u8 {
        let value = self.register(self.pointer);
        self.pointer = self.pointer.wrapping_add(1);
        value
    }
}

/// GPIO assignment of one board generation
struct PinMap {
    keys: &'static [(Key, u32, bool)],
    /// Keypad-scan direct inputs (PXA27x boards only)
    direct: &'static [(Key, u8)],
    pen: u32,
}

const LEGACY_PINS: PinMap = PinMap {
    keys: &[
        (Key::Power, 0, true),
        (Key::Hard1, 13, true),
        (Key::Hard2, 14, true),
        (Key::Hard3, 15, true),
        (Key::Hard4, 16, true),
        (Key::Up, 9, true),
        (Key::Down, 10, true),
        (Key::Left, 11, true),
        (Key::Right, 12, true),
        (Key::Select, 20, true),
    ],
    direct: &[],
    pen: 21,
};

const EXTENDED_PINS: PinMap = PinMap {
    keys: &[
        (Key::Power, 0, true),
        (Key::Hard1, 13, true),
        (Key::Hard2, 14, true),
        (Key::Hard3, 15, true),
        (Key::Hard4, 16, true),
    ],
    direct: &[
        (Key::Up, 0),
        (Key::Down, 1),
        (Key::Left, 2),
        (Key::Right, 3),
        (Key::Select, 4),
    ],
    pen: 14 + 32,
};

/// Generic Palm handheld
#[derive(Debug)]
pub struct PalmDevice {
    revision: Revision,
    keys: BTreeSet<Key>,
    touch: TouchController,
    nand: Option<NandImage>,
}

impl PalmDevice {
    pub fn new(revision: Revision, display: DisplayConfig, nand: Option<NandImage>) -> Self {
        Self {
            revision,
            keys: BTreeSet::new(),
            touch: TouchController::new(display),
            nand,
        }
    }

    fn pins(&self) -> &'static PinMap {
        match self.revision {
            Revision::Pxa25x | Revision::Pxa26x => &LEGACY_PINS,
            Revision::Pxa27x => &EXTENDED_PINS,
        }
    }
}

impl DeviceModel for PalmDevice {
    fn name(&self) -> &'static str {
        "palm"
    }

    fn setup(&mut self, io: &mut DevicePeripherals<'_>) {
        let pins = self.pins();
        for &(key, pin, active_low) in pins.keys {
            io.keypad.add_gpio_key(key, pin, active_low);
        }
        for &(key, index) in pins.direct {
            io.keypad.add_direct_key(key, index);
        }
        io.keypad.set_pen_line(pins.pen, true);
        io.keypad.release_all(io.gpio, io.intc);
        io.i2c.attach(BatteryGauge::ADDRESS, Box::new(BatteryGauge::new()));
        debug!(
            "Palm device on {}: {} GPIO keys, NAND pages: {:?}",
            self.revision,
            pins.keys.len(),
            self.nand.map(|nand| nand.page_count())
        );
    }

    fn key(&mut self, key: Key, pressed: bool) {
        if pressed {
            self.keys.insert(key);
        } else {
            self.keys.remove(&key);
        }
    }

    fn touch(&mut self, pen: Option<PenPosition>) {
        self.touch.set_pen(pen);
    }

    fn periodic(&mut self, cycles: u64) {
        if cycles % SAMPLE_INTERVAL == 0 {
            self.touch.latch();
        }
    }

    fn is_key_pressed(&self, key: Key) -> bool {
        self.keys.contains(&key)
    }

    fn debug_uart(&self) -> UartPort {
        UartPort::Ff
    }

    fn ssp_client(&mut self, role: SspRole) -> Option<&mut dyn SspClient> {
        match role {
            SspRole::Ssp1 => Some(&mut self.touch),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn display() -> DisplayConfig {
        DisplayConfig {
            width: 320,
            height: 320,
            graffiti_height: 120,
        }
    }

    fn convert(touch: &mut TouchController, channel: u32) -> u32 {
        touch.exchange(0x80 | channel << 4);
        touch.exchange(0) >> 3
    }

    #[test]
    fn test_touch_conversion_scales_to_12_bits() {
        let mut touch = TouchController::new(display());
        touch.set_pen(Some(PenPosition { x: 319, y: 0 }));
        touch.latch();
        assert_eq!(convert(&mut touch, 5), 0xFFF);
        assert_eq!(convert(&mut touch, 1), 0);

        touch.set_pen(Some(PenPosition { x: 0, y: 439 }));
        touch.latch();
        assert_eq!(convert(&mut touch, 5), 0);
        assert_eq!(convert(&mut touch, 1), 0xFFF);
    }

    #[test]
    fn test_touch_pen_up_reports_no_pressure() {
        let mut touch = TouchController::new(display());
        touch.set_pen(Some(PenPosition { x: 10, y: 10 }));
        touch.latch();
        assert_eq!(convert(&mut touch, 3), 0x400);
        touch.set_pen(None);
        assert_eq!(convert(&mut touch, 3), 0);
        assert_eq!(convert(&mut touch, 4), 0xFFF);
    }

    #[test]
    fn test_sample_waits_for_periodic_latch() {
        let mut device = PalmDevice::new(Revision::Pxa25x, display(), None);
        device.touch(Some(PenPosition { x: 319, y: 0 }));
        let client = device.ssp_client(SspRole::Ssp1).unwrap();
        client.exchange(0xD0);
        assert_eq!(client.exchange(0), 0);

        device.periodic(SAMPLE_INTERVAL);
        let client = device.ssp_client(SspRole::Ssp1).unwrap();
        client.exchange(0xD0);
        assert_eq!(client.exchange(0) >> 3, 0xFFF);
        assert!(device.ssp_client(SspRole::Nssp).is_none());
    }

    #[test]
    fn test_battery_gauge_registers() {
        let mut gauge = BatteryGauge::new();
        assert!(gauge.write(0x08));
        let low = gauge.read();
        let high = gauge.read();
        assert_eq!(u16::from_le_bytes([low, high]), 4100);
        gauge.write(0x0B);
        assert_eq!(gauge.read(), 100);
    }

    #[test]
    fn test_nand_geometry() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xFF; 528 * 2]).unwrap();
        file.flush().unwrap();
        let nand = NandImage::open(file.path()).unwrap();
        assert_eq!(nand.page_count(), 2);

        file.write_all(&[0xFF; 10]).unwrap();
        file.flush().unwrap();
        let err = NandImage::open(file.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_empty_nand_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(NandImage::open(file.path()).is_err());
    }

    #[test]
    fn test_missing_nand_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(NandImage::open(&dir.path().join("absent.bin")).is_err());
    }
}
