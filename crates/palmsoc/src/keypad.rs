//! Key to GPIO relay.
//!
//! The device model declares which GPIO line (and, on the PXA27x, which
//! keypad-scan direct input) each hardware button drives. Key and pen
//! events from the host are turned into pin levels here.

use crate::periph::gpio::Gpio;
use crate::periph::intc::InterruptController;
use crate::periph::kpc::KeypadScanner;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// Hardware buttons of a Palm handheld
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Power,
    /// Calendar
    Hard1,
    /// Contacts
    Hard2,
    /// Tasks
    Hard3,
    /// Notes
    Hard4,
    Up,
    Down,
    Left,
    Right,
    Select,
}

impl Key {
    pub const ALL: [Key; 10] = [
        Key::Power,
        Key::Hard1,
        Key::Hard2,
        Key::Hard3,
        Key::Hard4,
        Key::Up,
        Key::Down,
        Key::Left,
        Key::Right,
        Key::Select,
    ];
}

/// One GPIO input and its polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioLine {
    pub pin: u32,
    pub active_low: bool,
}

impl GpioLine {
    fn level(&self, asserted: bool) -> bool {
        asserted != self.active_low
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Route {
    gpio: Option<GpioLine>,
    direct: Option<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct Keypad {
    routes: BTreeMap<Key, Route>,
    pressed: BTreeSet<Key>,
    pen: Option<GpioLine>,
    pen_down: bool,
}

impl Keypad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `key` to a GPIO input
    pub fn add_gpio_key(&mut self, key: Key, pin: u32, active_low: bool) {
        debug!("Keypad: {:?} -> GPIO {} (active low: {})", key, pin, active_low);
        self.routes.entry(key).or_default().gpio = Some(GpioLine { pin, active_low });
    }

    /// Route `key` to a keypad-scan direct input as well
    pub fn add_direct_key(&mut self, key: Key, index: u8) {
        debug!("Keypad: {:?} -> direct key {}", key, index);
        self.routes.entry(key).or_default().direct = Some(index);
    }

    /// GPIO line reporting pen contact
    pub fn set_pen_line(&mut self, pin: u32, active_low: bool) {
        self.pen = Some(GpioLine { pin, active_low });
    }

    /// Drive every routed line to its released level
    pub fn release_all(&mut self, gpio: &mut Gpio, intc: &mut InterruptController) {
        self.pressed.clear();
        self.pen_down = false;
        for route in self.routes.values() {
            if let Some(line) = route.gpio {
                gpio.set_input(line.pin, line.level(false), intc);
            }
        }
        if let Some(line) = self.pen {
            gpio.set_input(line.pin, line.level(false), intc);
        }
    }

    pub fn key_event(
        &mut self,
        key: Key,
        pressed: bool,
        gpio: &mut Gpio,
        kpc: Option<&mut KeypadScanner>,
        intc: &mut InterruptController,
    ) {
        if pressed {
            self.pressed.insert(key);
        } else {
            self.pressed.remove(&key);
        }
        let Some(route) = self.routes.get(&key).copied() else {
            trace!("Keypad: {:?} has no route", key);
            return;
        };
        if let Some(line) = route.gpio {
            gpio.set_input(line.pin, line.level(pressed), intc);
        }
        if let (Some(index), Some(kpc)) = (route.direct, kpc) {
            kpc.set_direct_key(index, pressed, intc);
        }
    }

    pub fn pen_event(&mut self, down: bool, gpio: &mut Gpio, intc: &mut InterruptController) {
        self.pen_down = down;
        if let Some(line) = self.pen {
            gpio.set_input(line.pin, line.level(down), intc);
        }
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        self.pressed.contains(&key)
    }

    pub fn is_pen_down(&self) -> bool {
        self.pen_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palmsoc_hw::mmio::gpio::BASE;
    use palmsoc_hw::mmio::kpc;

    #[test]
    fn test_active_low_key_drives_gpio() {
        let mut intc = InterruptController::new(32);
        let mut gpio = Gpio::new(BASE, 3);
        let mut keypad = Keypad::new();
        keypad.add_gpio_key(Key::Power, 0, true);
        keypad.add_gpio_key(Key::Hard1, 13, false);
        keypad.release_all(&mut gpio, &mut intc);
        assert!(gpio.pin_level(0));
        assert!(!gpio.pin_level(13));

        keypad.key_event(Key::Power, true, &mut gpio, None, &mut intc);
        assert!(!gpio.pin_level(0));
        assert!(keypad.is_pressed(Key::Power));

        keypad.key_event(Key::Hard1, true, &mut gpio, None, &mut intc);
        assert!(gpio.pin_level(13));
        keypad.key_event(Key::Hard1, false, &mut gpio, None, &mut intc);
        assert!(!gpio.pin_level(13));
        assert!(!keypad.is_pressed(Key::Hard1));
    }

    #[test]
    fn test_unrouted_key_is_still_tracked() {
        let mut intc = InterruptController::new(32);
        let mut gpio = Gpio::new(BASE, 3);
        let mut keypad = Keypad::new();
        keypad.key_event(Key::Select, true, &mut gpio, None, &mut intc);
        assert!(keypad.is_pressed(Key::Select));
    }

    #[test]
    fn test_direct_key_reaches_scanner() {
        let mut intc = InterruptController::new(64);
        let mut gpio = Gpio::new(BASE, 4);
        let mut scanner = KeypadScanner::new(kpc::BASE);
        let mut keypad = Keypad::new();
        keypad.add_direct_key(Key::Up, 3);
        keypad.key_event(Key::Up, true, &mut gpio, Some(&mut scanner), &mut intc);
        assert!(scanner.is_direct_pressed(3));
    }

    #[test]
    fn test_pen_line() {
        let mut intc = InterruptController::new(32);
        let mut gpio = Gpio::new(BASE, 3);
        let mut keypad = Keypad::new();
        keypad.set_pen_line(21, true);
        keypad.release_all(&mut gpio, &mut intc);
        assert!(gpio.pin_level(21));
        keypad.pen_event(true, &mut gpio, &mut intc);
        assert!(!gpio.pin_level(21));
        assert!(keypad.is_pen_down());
    }
}
