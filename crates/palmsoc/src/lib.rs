pub mod args;
pub mod board;
pub mod core;
pub mod cp15;
pub mod cpu;
pub mod device;
pub mod gdb;
pub mod input;
pub mod keypad;
pub mod mailbox;
pub mod manifest;
pub mod memory;
pub mod periph;
pub mod profile;
pub mod scheduler;
pub mod soc;
pub mod vsd;

// Re-export commonly used types
pub use args::{Args, ArgsError};
pub use core::{EmulatorConfig, EmulatorCore, StopReason};
pub use device::PenPosition;
pub use keypad::Key;
pub use manifest::Revision;
pub use periph::lcd::Frame;
pub use profile::DeviceProfile;
pub use soc::{Soc, SocConfig, SocInitError};
