//! Interrupt controller source numbers.
//!
//! Lines 0..32 are shared between generations; a few numbers are reused by
//! peripherals that only exist on one generation (for example NSSP on the
//! PXA25x and SSP2 on the PXA27x both use line 16).
//!
//! # References
//! - PXA255 Developer's Manual, table 4-36 "Interrupt Controller Pending Register"
//! - PXA27x Developer's Manual, table 25-1 "Peripheral ID Assignment"

/// SSP3 (PXA27x)
pub const SSP3: u8 = 0;
/// Keypad controller (PXA27x)
pub const KEYPAD: u8 = 4;
/// Power manager I2C
pub const PWR_I2C: u8 = 6;
/// Hardware UART (PXA25x/PXA26x)
pub const HWUART: u8 = 7;
/// GPIO 0 edge detect
pub const GPIO0: u8 = 8;
/// GPIO 1 edge detect
pub const GPIO1: u8 = 9;
/// Edge detect on any other GPIO
pub const GPIO_X: u8 = 10;
/// USB device controller
pub const USB: u8 = 11;
/// Performance monitoring unit
pub const PMU: u8 = 12;
/// I2S
pub const I2S: u8 = 13;
/// AC97
pub const AC97: u8 = 14;
/// Audio SSP (PXA26x)
pub const ASSP: u8 = 15;
/// Network SSP (PXA25x/PXA26x)
pub const NSSP: u8 = 16;
/// SSP2 (PXA27x)
pub const SSP2: u8 = 16;
/// LCD controller
pub const LCD: u8 = 17;
/// I2C
pub const I2C: u8 = 18;
/// Infrared communications port
pub const ICP: u8 = 19;
/// Standard UART
pub const STUART: u8 = 20;
/// Bluetooth UART
pub const BTUART: u8 = 21;
/// Full function UART
pub const FFUART: u8 = 22;
/// MMC/SD controller
pub const MMC: u8 = 23;
/// SSP1
pub const SSP: u8 = 24;
/// DMA controller
pub const DMA: u8 = 25;
/// OS timer match 0
pub const OST0: u8 = 26;
/// OS timer match 1
pub const OST1: u8 = 27;
/// OS timer match 2
pub const OST2: u8 = 28;
/// OS timer match 3
pub const OST3: u8 = 29;
/// RTC 1 Hz tick
pub const RTC_HZ: u8 = 30;
/// RTC alarm
pub const RTC_ALARM: u8 = 31;

/// Number of sources on the PXA25x/PXA26x controller
pub const LINES_PXA25X: u8 = 32;
/// Number of sources on the PXA27x controller
pub const LINES_PXA27X: u8 = 64;
