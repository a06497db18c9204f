//! Host input delivery.
//!
//! Both entry points update the device model and the keypad relay in the same
//! call, so the next scheduler step sees them agree.

use crate::board::Board;
use crate::device::PenPosition;
use crate::keypad::Key;
use crate::soc::Soc;
use tracing::trace;

impl Soc {
    /// Press or release a hardware button
    pub fn key_event(&mut self, key: Key, pressed: bool) {
        trace!("Input: {:?} pressed={}", key, pressed);
        self.device.key(key, pressed);
        let Board {
            keypad,
            intc,
            devices,
            ..
        } = &mut self.board;
        keypad.key_event(
            key,
            pressed,
            &mut devices.gpio,
            devices.revision.kpc_mut(),
            intc,
        );
    }

    /// Move the pen to `pen`, or lift it with `None`
    pub fn pen_event(&mut self, pen: Option<PenPosition>) {
        trace!("Input: pen {:?}", pen);
        self.device.touch(pen);
        let Board {
            keypad,
            intc,
            devices,
            ..
        } = &mut self.board;
        keypad.pen_event(pen.is_some(), &mut devices.gpio, intc);
    }

    pub fn is_key_pressed(&self, key: Key) -> bool {
        self.device.is_key_pressed(key) && self.board.keypad.is_pressed(key)
    }
}

#[cfg(test)]
mod tests {
    use crate::device::PenPosition;
    use crate::keypad::Key;
    use crate::manifest::Revision;
    use crate::soc::tests::{counting_soc, test_config};

    #[test]
    fn test_key_reaches_device_and_keypad() {
        for revision in Revision::ALL {
            let (mut soc, _) = counting_soc(test_config(revision));
            soc.key_event(Key::Hard1, true);
            assert!(soc.device().is_key_pressed(Key::Hard1));
            assert!(soc.board().keypad.is_pressed(Key::Hard1));
            assert!(soc.is_key_pressed(Key::Hard1));

            soc.key_event(Key::Hard1, false);
            assert!(!soc.device().is_key_pressed(Key::Hard1));
            assert!(!soc.board().keypad.is_pressed(Key::Hard1));
        }
    }

    #[test]
    fn test_key_drives_active_low_gpio() {
        let (mut soc, _) = counting_soc(test_config(Revision::Pxa25x));
        // Calendar button sits on GPIO13
        assert!(soc.board().devices.gpio.pin_level(13));
        soc.key_event(Key::Hard1, true);
        assert!(!soc.board().devices.gpio.pin_level(13));
        soc.run(1);
        soc.key_event(Key::Hard1, false);
        assert!(soc.board().devices.gpio.pin_level(13));
    }

    #[test]
    fn test_navigator_uses_keypad_scanner_on_pxa27x() {
        let (mut soc, _) = counting_soc(test_config(Revision::Pxa27x));
        soc.key_event(Key::Up, true);
        let kpc = soc.board().devices.revision.kpc().unwrap();
        assert!(kpc.is_direct_pressed(0));
        assert!(soc.device().is_key_pressed(Key::Up));

        soc.key_event(Key::Up, false);
        let kpc = soc.board().devices.revision.kpc().unwrap();
        assert!(!kpc.is_direct_pressed(0));
    }

    #[test]
    fn test_pen_down_and_lift() {
        let (mut soc, _) = counting_soc(test_config(Revision::Pxa25x));
        soc.pen_event(Some(PenPosition { x: 40, y: 80 }));
        assert!(soc.board().keypad.is_pen_down());
        assert!(!soc.board().devices.gpio.pin_level(21));

        soc.pen_event(None);
        assert!(!soc.board().keypad.is_pen_down());
        assert!(soc.board().devices.gpio.pin_level(21));
    }
}
