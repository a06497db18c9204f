//! Keypad-scan co-processor (PXA27x).
//!
//! The scan itself is not simulated: the keypad relay reports key state
//! changes directly, and the registers reflect the current state.

use super::Peripheral;
use super::intc::InterruptController;
use palmsoc_hw::irq;
use palmsoc_hw::mmio::kpc::{
    KPC_DE, KPC_DI, KPC_DIE, KPC_ME, KPC_MI, KPC_MIE, KPDK_DKP, registers as reg,
};
use tracing::{trace, warn};

const DIRECT_KEYS: u8 = 8;
const MATRIX_SIZE: u8 = 8;

#[derive(Debug, Clone)]
pub struct KeypadScanner {
    base: u32,
    kpc: u32,
    direct: u8,
    direct_changed: bool,
    /// One bit per column for each row
    matrix: [u8; MATRIX_SIZE as usize],
    kprec: u32,
    kpkdi: u32,
}

impl KeypadScanner {
    pub fn new(base: u32) -> Self {
        Self {
            base,
            kpc: 0,
            direct: 0,
            direct_changed: false,
            matrix: [0; MATRIX_SIZE as usize],
            kprec: 0,
            kpkdi: 0x64,
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Report a direct key line changing state
    pub fn set_direct_key(&mut self, index: u8, pressed: bool, intc: &mut InterruptController) {
        if index >= DIRECT_KEYS {
            warn!("KPC: direct key {} out of range", index);
            return;
        }
        let bit = 1 << index;
        let before = self.direct;
        if pressed {
            self.direct |= bit;
        } else {
            self.direct &= !bit;
        }
        if before != self.direct && self.kpc & KPC_DE != 0 {
            trace!("KPC: direct key {} pressed={}", index, pressed);
            self.direct_changed = true;
            if self.kpc & KPC_DIE != 0 {
                self.kpc |= KPC_DI;
            }
        }
        self.update_irq(intc);
    }

    /// Report a matrix key changing state
    pub fn set_matrix_key(
        &mut self,
        row: u8,
        col: u8,
        pressed: bool,
        intc: &mut InterruptController,
    ) {
        if row >= MATRIX_SIZE || col >= MATRIX_SIZE {
            warn!("KPC: matrix key {}x{} out of range", row, col);
            return;
        }
        let bit = 1 << col;
        let before = self.matrix[row as usize];
        if pressed {
            self.matrix[row as usize] |= bit;
        } else {
            self.matrix[row as usize] &= !bit;
        }
        if before != self.matrix[row as usize]
            && self.kpc & KPC_ME != 0
            && self.kpc & KPC_MIE != 0
        {
            self.kpc |= KPC_MI;
        }
        self.update_irq(intc);
    }

    pub fn is_direct_pressed(&self, index: u8) -> bool {
        index < DIRECT_KEYS && self.direct & (1 << index) != 0
    }

    /// Automatic scan result: the single pressed key, or the count when
    /// several are down
    fn kpas(&self) -> u32 {
        let pressed: Vec<(u8, u8)> = (0..MATRIX_SIZE)
            .flat_map(|row| (0..MATRIX_SIZE).map(move |col| (row, col)))
            .filter(|&(row, col)| self.matrix[row as usize] & (1 << col) != 0)
            .collect();
        let (row, col) = match pressed.as_slice() {
            [(row, col)] => (u32::from(*row), u32::from(*col)),
            _ => (0xF, 0xF),
        };
        ((pressed.len() as u32 & 0x1F) << 26) | (row << 4) | col
    }

    fn update_irq(&self, intc: &mut InterruptController) {
        intc.set(irq::KEYPAD, self.kpc & (KPC_DI | KPC_MI) != 0);
    }
}

impl Peripheral for KeypadScanner {
    fn name(&self) -> &'static str {
        "KPC"
    }

    fn read(&mut self, offset: u32, intc: &mut InterruptController) -> u32 {
        let value = match offset {
            reg::KPC => {
                // Interrupt pending bits clear on read
                let value = self.kpc;
                self.kpc &= !(KPC_DI | KPC_MI);
                value
            }
            reg::KPDK => {
                let mut value = u32::from(self.direct);
                if self.direct_changed {
                    value |= KPDK_DKP;
                    self.direct_changed = false;
                }
                value
            }
            reg::KPREC => self.kprec,
            reg::KPMK => u32::from(self.matrix.iter().fold(0, |acc, row| acc | row)),
            reg::KPAS => self.kpas(),
            reg::KPKDI => self.kpkdi,
            _ => {
                warn!("Unknown KPC register read: offset={:#X}", offset);
                0
            }
        };
        self.update_irq(intc);
        value
    }

    fn write(&mut self, offset: u32, value: u32, intc: &mut InterruptController) {
        match offset {
            reg::KPC => self.kpc = (value & !(KPC_DI | KPC_MI)) | (self.kpc & (KPC_DI | KPC_MI)),
            reg::KPREC => self.kprec = value,
            reg::KPKDI => self.kpkdi = value & 0xFFFF,
            reg::KPDK | reg::KPMK | reg::KPAS => {}
            _ => warn!(
                "Unknown KPC register write: offset={:#X}, value={:#X}",
                offset, value
            ),
        }
        self.update_irq(intc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palmsoc_hw::mmio::kpc::BASE;

    #[test]
    fn test_direct_key_interrupt_and_status() {
        let mut intc = InterruptController::new(64);
        let mut kpc = KeypadScanner::new(BASE);
        kpc.write(reg::KPC, KPC_DE | KPC_DIE, &mut intc);

        kpc.set_direct_key(2, true, &mut intc);
        assert!(intc.is_pending(irq::KEYPAD));
        assert!(kpc.is_direct_pressed(2));

        assert_ne!(kpc.read(reg::KPC, &mut intc) & KPC_DI, 0);
        assert!(!intc.is_pending(irq::KEYPAD));
        assert_eq!(kpc.read(reg::KPDK, &mut intc), KPDK_DKP | 1 << 2);
        assert_eq!(kpc.read(reg::KPDK, &mut intc), 1 << 2);
    }

    #[test]
    fn test_disabled_direct_keys_do_not_interrupt() {
        let mut intc = InterruptController::new(64);
        let mut kpc = KeypadScanner::new(BASE);
        kpc.set_direct_key(0, true, &mut intc);
        assert!(!intc.is_pending(irq::KEYPAD));
        assert_eq!(kpc.read(reg::KPDK, &mut intc), 1);
    }

    #[test]
    fn test_matrix_scan_result() {
        let mut intc = InterruptController::new(64);
        let mut kpc = KeypadScanner::new(BASE);
        assert_eq!(kpc.read(reg::KPAS, &mut intc), 0xFF);

        kpc.set_matrix_key(1, 3, true, &mut intc);
        assert_eq!(kpc.read(reg::KPAS, &mut intc), (1 << 26) | 0x13);

        kpc.set_matrix_key(2, 0, true, &mut intc);
        assert_eq!(kpc.read(reg::KPAS, &mut intc), (2 << 26) | 0xFF);
    }
}
