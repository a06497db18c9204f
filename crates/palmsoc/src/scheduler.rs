//! Cycle-driven service scheduling.
//!
//! One scheduler step is one CPU instruction. Before the instruction runs,
//! the 64-bit cycle counter is incremented and every service whose rate
//! divides the new counter value runs, in table order. All rates are powers
//! of two, so "due" is a mask test.

/// Peripheral work serviced from the cycle counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// OS timer tick
    Timer,
    /// Every SSP, then the DMA controller, then every UART
    SerialBus,
    /// AC97, then I2S
    Audio,
    /// Device model periodic hook
    Device,
    /// Compose and publish one LCD frame
    LcdFrame,
    /// Real-time clock update
    Rtc,
}

/// One row of the service table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub service: Service,
    /// Steps between runs; a power of two
    pub rate: u64,
}

impl Slot {
    pub fn is_due(&self, counter: u64) -> bool {
        counter & (self.rate - 1) == 0
    }
}

/// Services in execution order; the CPU step follows the last row
pub const SERVICE_TABLE: [Slot; 6] = [
    Slot {
        service: Service::Timer,
        rate: 8,
    },
    Slot {
        service: Service::SerialBus,
        rate: 256,
    },
    Slot {
        service: Service::Audio,
        rate: 2048,
    },
    Slot {
        service: Service::Device,
        rate: 1,
    },
    Slot {
        service: Service::LcdFrame,
        rate: 8192,
    },
    Slot {
        service: Service::Rtc,
        rate: 16_777_216,
    },
];

/// Monotonic cycle counter
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    counter: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn starting_at(counter: u64) -> Self {
        Self { counter }
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Advance one step; returns the new counter value
    pub fn tick(&mut self) -> u64 {
        self.counter = self.counter.wrapping_add(1);
        self.counter
    }

    /// Services due at `counter`, in table order
    pub fn due(counter: u64) -> impl Iterator<Item = Service> {
        SERVICE_TABLE
            .iter()
            .filter(move |slot| slot.is_due(counter))
            .map(|slot| slot.service)
    }
}
