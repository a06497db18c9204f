//! CPU engine interface.
//!
//! The scheduler only needs two things from a core: make a region of the
//! physical map visible to it, and execute exactly one instruction against
//! the board. [`UnicornCore`] is the production engine.

use crate::board::Board;
use crate::manifest::CoprocessorKind;
use crate::memory::{PhysMemory, Region};
use thiserror::Error;
use unicorn_engine::unicorn_const::uc_error;

pub mod unicorn;

pub use self::unicorn::UnicornCore;

/// Parameters fixed when the core is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuConfig {
    /// Reset vector
    pub rom_base: u32,
    /// Selects the XScale variant (PXA25x DSP or PXA27x iWMMXt)
    pub coprocessor: CoprocessorKind,
    /// Serve the GDB remote protocol on this TCP port
    pub debug_port: Option<u16>,
    /// Value returned by CP15 c0 ID reads
    pub cpu_id: u32,
}

#[derive(Debug, Error)]
pub enum CpuError {
    #[error("CPU engine error: {0:?}")]
    Engine(uc_error),
    #[error("debug stub could not listen")]
    Debugger(#[from] std::io::Error),
    #[error("region {name} at {base:#X} has no storage to map")]
    Unmappable { name: &'static str, base: u32 },
}

impl From<uc_error> for CpuError {
    fn from(e: uc_error) -> Self {
        CpuError::Engine(e)
    }
}

pub trait CpuEngine {
    /// Make `region` visible in the core's address space
    fn map_region(&mut self, region: &Region, mem: &mut PhysMemory) -> Result<(), CpuError>;

    /// Execute one instruction, taking a pending FIQ or IRQ first.
    ///
    /// Faults are delivered to the emulated firmware as exceptions.
    fn step(&mut self, board: &mut Board);

    /// Address of the next instruction
    fn pc(&self) -> u32;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Engine that executes nothing and counts steps
    #[derive(Debug, Default)]
    pub struct CountingCore {
        pub steps: Rc<Cell<u64>>,
        pub regions: Vec<Region>,
    }

    impl CpuEngine for CountingCore {
        fn map_region(&mut self, region: &Region, _mem: &mut PhysMemory) -> Result<(), CpuError> {
            self.regions.push(*region);
            Ok(())
        }

        fn step(&mut self, _board: &mut Board) {
            self.steps.set(self.steps.get() + 1);
        }

        fn pc(&self) -> u32 {
            (self.steps.get() * 4) as u32
        }
    }
}
