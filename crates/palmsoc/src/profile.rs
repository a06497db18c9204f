//! Static per-model device constants.
//!
//! A profile fixes everything about a handheld that is not the SoC itself:
//! how much SDRAM is populated, what kind of chip backs the ROM window, what
//! firmware sees when it probes past the RAM mirror, the panel geometry and
//! which PXA generation the board carries.

use crate::manifest::Revision;
use palmsoc_hw::specs::{clock, display};
use thiserror::Error;

/// What lives in the address space directly above the RAM mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamTermination {
    /// RAM repeats; the window above aliases the same storage
    Mirror,
    /// Reads return zero, writes are dropped
    WriteIgnore,
    /// Nothing is mapped; accesses abort
    None,
}

/// Behavior of the chip mapped at the ROM window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomChipType {
    /// Mask ROM; stray writes are dropped
    WriteIgnore,
    /// Mask ROM; writes raise a data abort
    WriteError,
    /// NOR flash; the command interface is not modeled, writes are dropped
    NorFlash,
}

impl RomChipType {
    /// Whether a write into this chip faults
    pub fn write_faults(self) -> bool {
        matches!(self, RomChipType::WriteError)
    }
}

/// Panel geometry reported to the LCD controller and the frontend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayConfig {
    pub width: u16,
    pub height: u16,
    /// Rows of the panel covered by the silkscreened graffiti area (0 if none)
    pub graffiti_height: u16,
}

/// Static description of one handheld model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub name: &'static str,
    pub ram_size: usize,
    pub rom_chip: RomChipType,
    pub ram_termination: RamTermination,
    pub display: DisplayConfig,
    pub revision: Revision,
    /// Nominal core clock, used by the host pacer
    pub clock_hz: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("unknown device model {0:?}")]
    UnknownModel(String),
}

const MIB: usize = 1024 * 1024;

impl DeviceProfile {
    /// Names accepted by [`DeviceProfile::builtin`]
    pub const NAMES: &'static [&'static str] = &["palm-tx", "tungsten-t3", "tungsten-e2"];

    /// Palm T|X: PXA270, 32 MB, 320x480 with a dynamic input area
    pub fn palm_tx() -> Self {
        Self {
            name: "palm-tx",
            ram_size: 32 * MIB,
            rom_chip: RomChipType::NorFlash,
            ram_termination: RamTermination::Mirror,
            display: DisplayConfig {
                width: display::HIRES_WIDTH,
                height: display::HIRES_PLUS_HEIGHT,
                graffiti_height: 0,
            },
            revision: Revision::Pxa27x,
            clock_hz: clock::PXA270_HZ,
        }
    }

    /// Tungsten|T3: PXA263, 64 MB, 320x480 slider
    pub fn tungsten_t3() -> Self {
        Self {
            name: "tungsten-t3",
            ram_size: 64 * MIB,
            rom_chip: RomChipType::WriteIgnore,
            ram_termination: RamTermination::Mirror,
            display: DisplayConfig {
                width: display::HIRES_WIDTH,
                height: display::HIRES_PLUS_HEIGHT,
                graffiti_height: 0,
            },
            revision: Revision::Pxa26x,
            clock_hz: clock::PXA26X_HZ,
        }
    }

    /// Tungsten|E2: PXA255, 32 MB, square 320x320 with a silkscreen area below
    pub fn tungsten_e2() -> Self {
        Self {
            name: "tungsten-e2",
            ram_size: 32 * MIB,
            rom_chip: RomChipType::WriteError,
            ram_termination: RamTermination::WriteIgnore,
            display: DisplayConfig {
                width: display::HIRES_WIDTH,
                height: display::HIRES_HEIGHT,
                graffiti_height: display::GRAFFITI_HEIGHT,
            },
            revision: Revision::Pxa25x,
            clock_hz: clock::PXA255_HZ,
        }
    }

    /// Look up a builtin profile by name
    pub fn builtin(name: &str) -> Result<Self, ProfileError> {
        match name {
            "palm-tx" => Ok(Self::palm_tx()),
            "tungsten-t3" => Ok(Self::tungsten_t3()),
            "tungsten-e2" => Ok(Self::tungsten_e2()),
            other => Err(ProfileError::UnknownModel(other.to_string())),
        }
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::palm_tx()
    }
}
