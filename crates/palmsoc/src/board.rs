//! The SoC bus.
//!
//! [`Board`] owns physical memory, the interrupt controller, the DMA
//! controller, the keypad relay and every register block present for the
//! revision. CPU accesses that land in an MMIO window are routed here by the
//! region table; bus-master traffic from the DMA controller goes through
//! [`SystemBus`], which sees the same memory and register blocks.

use crate::keypad::Keypad;
use crate::memory::{Backing, MemError, PhysMemory};
use crate::periph::Peripheral;
use crate::periph::audio::{Ac97, I2s};
use crate::periph::dma::{DmaBus, DmaController};
use crate::periph::gpio::Gpio;
use crate::periph::i2c::I2c;
use crate::periph::intc::InterruptController;
use crate::periph::kpc::KeypadScanner;
use crate::periph::lcd::{Frame, Lcd};
use crate::periph::misc::{
    ClockManager, Coprocessor, Imc, MemoryController, PowerManager, Pwm, Udc,
};
use crate::periph::mmc::MmcController;
use crate::periph::rtc::Rtc;
use crate::periph::ssp::Ssp;
use crate::periph::timer::OsTimer;
use crate::periph::uart::{Uart, UartPort};
use palmsoc_hw::mmio::dma::requests;
use tracing::{instrument, trace, warn};

/// Register block behind an MMIO region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceId {
    Intc,
    Dma,
    Gpio,
    Ost,
    Rtc,
    Uart(UartPort),
    PwrMan,
    ClkMan,
    I2c,
    MemCtrl,
    Ac97,
    /// Index into [`Devices::ssps`]
    Ssp(usize),
    I2s,
    /// Index into [`Devices::pwms`]
    Pwm(usize),
    Mmc,
    Lcd,
    Udc,
    Kpc,
    Imc,
}

/// Blocks that only exist on one side of the PXA25x/PXA27x split
#[derive(Debug, Clone)]
pub enum RevisionBlock {
    /// PXA25x and PXA26x
    Legacy { dsp: Coprocessor, udc: Udc },
    /// PXA27x
    Extended {
        wmmx: Coprocessor,
        imc: Imc,
        kpc: KeypadScanner,
        udc: Udc,
    },
}

impl RevisionBlock {
    pub fn coprocessor(&self) -> Coprocessor {
        match self {
            RevisionBlock::Legacy { dsp, .. } => *dsp,
            RevisionBlock::Extended { wmmx, .. } => *wmmx,
        }
    }

    pub fn udc(&self) -> &Udc {
        match self {
            RevisionBlock::Legacy { udc, .. } | RevisionBlock::Extended { udc, .. } => udc,
        }
    }

    fn udc_mut(&mut self) -> &mut Udc {
        match self {
            RevisionBlock::Legacy { udc, .. } | RevisionBlock::Extended { udc, .. } => udc,
        }
    }

    pub fn kpc(&self) -> Option<&KeypadScanner> {
        match self {
            RevisionBlock::Extended { kpc, .. } => Some(kpc),
            RevisionBlock::Legacy { .. } => None,
        }
    }

    pub fn kpc_mut(&mut self) -> Option<&mut KeypadScanner> {
        match self {
            RevisionBlock::Extended { kpc, .. } => Some(kpc),
            RevisionBlock::Legacy { .. } => None,
        }
    }

    fn imc_mut(&mut self) -> Option<&mut Imc> {
        match self {
            RevisionBlock::Extended { imc, .. } => Some(imc),
            RevisionBlock::Legacy { .. } => None,
        }
    }
}

/// Every register block other than the interrupt and DMA controllers
pub struct Devices {
    pub gpio: Gpio,
    pub ost: OsTimer,
    pub rtc: Rtc,
    pub uarts: Vec<Uart>,
    pub pwrman: PowerManager,
    pub clkman: ClockManager,
    pub i2c: I2c,
    pub memctrl: MemoryController,
    pub ac97: Ac97,
    pub ssps: Vec<Ssp>,
    pub i2s: I2s,
    pub pwms: Vec<Pwm>,
    pub mmc: MmcController,
    pub lcd: Lcd,
    pub revision: RevisionBlock,
}

impl Devices {
    pub fn uart_mut(&mut self, port: UartPort) -> Option<&mut Uart> {
        self.uarts.iter_mut().find(|u| u.port() == port)
    }

    /// The block answering for `id`, if this revision has it
    pub fn peripheral_mut(&mut self, id: DeviceId) -> Option<&mut dyn Peripheral> {
        match id {
            DeviceId::Gpio => Some(&mut self.gpio),
            DeviceId::Ost => Some(&mut self.ost),
            DeviceId::Rtc => Some(&mut self.rtc),
            DeviceId::Uart(port) => self.uart_mut(port).map(|u| u as &mut dyn Peripheral),
            DeviceId::PwrMan => Some(&mut self.pwrman),
            DeviceId::ClkMan => Some(&mut self.clkman),
            DeviceId::I2c => Some(&mut self.i2c),
            DeviceId::MemCtrl => Some(&mut self.memctrl),
            DeviceId::Ac97 => Some(&mut self.ac97),
            DeviceId::Ssp(index) => self.ssps.get_mut(index).map(|s| s as &mut dyn Peripheral),
            DeviceId::I2s => Some(&mut self.i2s),
            DeviceId::Pwm(index) => self.pwms.get_mut(index).map(|p| p as &mut dyn Peripheral),
            DeviceId::Mmc => Some(&mut self.mmc),
            DeviceId::Lcd => Some(&mut self.lcd),
            DeviceId::Udc => Some(self.revision.udc_mut()),
            DeviceId::Kpc => self.revision.kpc_mut().map(|k| k as &mut dyn Peripheral),
            DeviceId::Imc => self.revision.imc_mut().map(|i| i as &mut dyn Peripheral),
            DeviceId::Intc | DeviceId::Dma => None,
        }
    }
}

/// Shift a word-wide register value down to the accessed lane
fn narrow(value: u32, offset: u32, size: usize) -> u32 {
    let value = value >> ((offset & 3) * 8);
    match size {
        1 => value & 0xFF,
        2 => value & 0xFFFF,
        _ => value,
    }
}

/// Place a narrow write into its lane of a word-wide register
fn widen(value: u32, offset: u32, size: usize) -> u32 {
    let value = match size {
        1 => value & 0xFF,
        2 => value & 0xFFFF,
        _ => value,
    };
    value << ((offset & 3) * 8)
}

/// Memory plus register blocks as seen by the DMA controller
pub struct SystemBus<'a> {
    mem: &'a mut PhysMemory,
    devices: &'a mut Devices,
    intc: &'a mut InterruptController,
}

impl SystemBus<'_> {
    fn register(&self, addr: u32) -> Option<(DeviceId, u32)> {
        match self.mem.find(addr) {
            Some(region) => match region.backing {
                Backing::Mmio(id) => Some((id, addr - region.base)),
                _ => None,
            },
            None => None,
        }
    }
}

impl DmaBus for SystemBus<'_> {
    fn read(&mut self, addr: u32, width: usize) -> Result<u32, MemError> {
        let Some((id, offset)) = self.register(addr) else {
            return DmaBus::read(&mut *self.mem, addr, width);
        };
        let dev = self
            .devices
            .peripheral_mut(id)
            .ok_or(MemError::NotMemory(addr))?;
        Ok(narrow(dev.read(offset & !3, self.intc), offset, width))
    }

    fn write(&mut self, addr: u32, width: usize, value: u32) -> Result<(), MemError> {
        let Some((id, offset)) = self.register(addr) else {
            return DmaBus::write(&mut *self.mem, addr, width, value);
        };
        let dev = self
            .devices
            .peripheral_mut(id)
            .ok_or(MemError::NotMemory(addr))?;
        dev.write(offset & !3, widen(value, offset, width), self.intc);
        Ok(())
    }
}

pub struct Board {
    pub mem: PhysMemory,
    pub intc: InterruptController,
    pub dma: DmaController,
    pub keypad: Keypad,
    pub devices: Devices,
}

impl Board {
    /// MMIO block and offset for `addr`
    fn decode(&self, addr: u32) -> Option<(DeviceId, u32)> {
        let region = self.mem.find(addr)?;
        match region.backing {
            Backing::Mmio(id) => Some((id, addr - region.base)),
            _ => None,
        }
    }

    /// CPU read of a memory-mapped register
    #[instrument(level = "trace", skip(self))]
    pub fn mmio_read(&mut self, addr: u32, size: usize) -> u32 {
        let Some((id, offset)) = self.decode(addr) else {
            warn!("MMIO read from unmapped register {:#X}", addr);
            return 0;
        };
        let aligned = offset & !3;
        let value = match id {
            DeviceId::Intc => self.intc.read(aligned),
            DeviceId::Dma => self.dma.read(aligned, &mut self.intc),
            _ => match self.devices.peripheral_mut(id) {
                Some(dev) => dev.read(aligned, &mut self.intc),
                None => {
                    warn!("MMIO read from absent block {:?} at {:#X}", id, addr);
                    0
                }
            },
        };
        let value = narrow(value, offset, size);
        trace!("MMIO read {:?}+{:#X} = {:#X}", id, offset, value);
        value
    }

    /// CPU write of a memory-mapped register
    #[instrument(level = "trace", skip(self))]
    pub fn mmio_write(&mut self, addr: u32, size: usize, value: u32) {
        let Some((id, offset)) = self.decode(addr) else {
            warn!(
                "MMIO write to unmapped register {:#X}, value={:#X}",
                addr, value
            );
            return;
        };
        let aligned = offset & !3;
        let value = widen(value, offset, size);
        trace!("MMIO write {:?}+{:#X} = {:#X}", id, offset, value);
        match id {
            DeviceId::Intc => self.intc.write(aligned, value),
            DeviceId::Dma => self.dma.write(aligned, value, &mut self.intc),
            _ => match self.devices.peripheral_mut(id) {
                Some(dev) => dev.write(aligned, value, &mut self.intc),
                None => warn!("MMIO write to absent block {:?} at {:#X}", id, addr),
            },
        }
    }

    /// Mirror every peripheral FIFO state onto its DMA request line
    pub fn drive_dma_requests(&mut self) {
        let devices = &self.devices;
        for ssp in &devices.ssps {
            self.dma.set_request(ssp.rx_dreq(), ssp.rx_request());
            self.dma.set_request(ssp.tx_dreq(), ssp.tx_request());
        }
        self.dma.set_request(requests::MMC_RX, devices.mmc.rx_request());
        self.dma.set_request(requests::MMC_TX, devices.mmc.tx_request());
        self.dma.set_request(requests::I2S_TX, devices.i2s.tx_request());
        self.dma
            .set_request(requests::AC97_AUDIO_TX, devices.ac97.out_request());
    }

    /// Let the DMA controller move one burst per active channel
    pub fn service_dma(&mut self) {
        self.drive_dma_requests();
        let mut bus = SystemBus {
            mem: &mut self.mem,
            devices: &mut self.devices,
            intc: &mut self.intc,
        };
        self.dma.service(&mut bus);
        self.dma.update_irq(&mut self.intc);
    }

    /// Compose one LCD frame from RAM
    pub fn compose_frame(&mut self) -> Option<Frame> {
        self.devices.lcd.compose(&mut self.mem, &mut self.intc)
    }
}
