//! Register-level peripheral models.
//!
//! Every block is constructed with its base address and interrupt line and
//! owns only its own registers. The interrupt controller (and physical
//! memory, for bus masters) is lent to a block for the duration of one
//! register access or one service call; no block stores a reference to
//! another.
//!
//! Register accesses arrive as word-aligned offsets relative to the block's
//! base. Narrower CPU accesses are widened by the board before they get here.

use intc::InterruptController;

pub mod audio;
pub mod dma;
pub mod gpio;
pub mod i2c;
pub mod intc;
pub mod kpc;
pub mod lcd;
pub mod misc;
pub mod mmc;
pub mod rtc;
pub mod ssp;
pub mod timer;
pub mod uart;

/// A memory-mapped register block
pub trait Peripheral {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Read the register at `offset`
    fn read(&mut self, offset: u32, intc: &mut InterruptController) -> u32;

    /// Write `value` to the register at `offset`
    fn write(&mut self, offset: u32, value: u32, intc: &mut InterruptController);
}

/// Fixed-capacity FIFO shared by the serial blocks
#[derive(Debug, Clone)]
pub struct Fifo<T> {
    items: std::collections::VecDeque<T>,
    capacity: usize,
}

impl<T> Fifo<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: std::collections::VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an item; returns `false` (dropping the item) when full
    pub fn push(&mut self, item: T) -> bool {
        if self.items.len() >= self.capacity {
            return false;
        }
        self.items.push_back(item);
        true
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_capacity() {
        let mut fifo = Fifo::new(2);
        assert!(fifo.push(1));
        assert!(fifo.push(2));
        assert!(!fifo.push(3));
        assert!(fifo.is_full());
        assert_eq!(fifo.pop(), Some(1));
        assert_eq!(fifo.len(), 1);
        fifo.clear();
        assert!(fifo.is_empty());
    }
}
