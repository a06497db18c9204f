//! Hardware definitions for PXA25x/PXA26x/PXA27x based handhelds.
//!
//! Pure constants: physical memory map, peripheral register windows, interrupt
//! lines, DMA request numbers and per-generation CPU identifiers. Nothing in
//! this crate has behavior; the emulator crate consumes it.

pub mod irq;
pub mod memory_map;
pub mod mmio;
pub mod specs;
