//! The composed system-on-chip.
//!
//! [`Soc::init`] builds the machine in a fixed order, walking the peripheral
//! manifest for the requested revision. Every step that can fail reports
//! itself through its own [`SocInitError`] variant; whatever was built before
//! the failing step is dropped on the way out.
//!
//! [`Soc::run`] is the cycle scheduler: it always executes exactly the number
//! of steps it is asked for.

use crate::board::{Board, DeviceId, Devices, RevisionBlock};
use crate::cpu::{CpuConfig, CpuEngine, CpuError, UnicornCore};
use crate::device::{DeviceModel, DevicePeripherals, NandImage, PalmDevice};
use crate::keypad::Keypad;
use crate::mailbox::FrameMailbox;
use crate::manifest::{self, CoprocessorKind, PeripheralManifest, Revision, SspRole};
use crate::memory::{Backing, MemError, PhysMemory, Region};
use crate::periph::audio::{Ac97, I2s};
use crate::periph::dma::DmaController;
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
use crate::periph::uart::{SerialHost, Uart, UartPort};
use crate::profile::{DeviceProfile, RamTermination};
use crate::scheduler::{Scheduler, Service};
use crate::vsd::{SectorIo, VirtualSd};
use palmsoc_hw::irq;
use palmsoc_hw::memory_map::{PAGE_SIZE, ram, rom, sram};
use palmsoc_hw::mmio as hw;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, info_span};

/// Backing store and size of the virtual SD card
pub struct SdCardConfig {
    /// Zero means no card is inserted
    pub sectors: u64,
    pub io: Box<dyn SectorIo>,
}

/// Everything [`Soc::init`] needs
pub struct SocConfig {
    /// ROM image pieces, laid out back to back (page aligned) from the ROM base
    pub rom: Vec<Vec<u8>>,
    pub sd_card: Option<SdCardConfig>,
    pub nand: Option<PathBuf>,
    /// Serve GDB on this TCP port
    pub debug_port: Option<u16>,
    pub profile: DeviceProfile,
    pub revision: Revision,
    /// Host end of the device's debug UART
    pub serial: Option<Box<dyn SerialHost>>,
}

impl SocConfig {
    /// A configuration using the profile's own revision and no optional parts
    pub fn new(rom: Vec<Vec<u8>>, profile: DeviceProfile) -> Self {
        Self {
            rom,
            sd_card: None,
            nand: None,
            debug_port: None,
            revision: profile.revision,
            profile,
            serial: None,
        }
    }
}

/// Cause of a failed construction step
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Mem(#[from] MemError),
    #[error(transparent)]
    Cpu(#[from] CpuError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Invalid(String),
}

/// Construction failure, naming the step that failed
#[derive(Debug, Error)]
pub enum SocInitError {
    #[error("failed to build memory subsystem")]
    Memory(#[source] BuildError),
    #[error("failed to build CPU core")]
    Cpu(#[source] BuildError),
    #[error("failed to build RAM")]
    Ram(#[source] BuildError),
    #[error("failed to build ROM")]
    Rom(#[source] BuildError),
    #[error("failed to build interrupt controller")]
    Intc(#[source] BuildError),
    #[error("failed to build DMA controller")]
    Dma(#[source] BuildError),
    #[error("failed to build revision-specific blocks")]
    Revision(#[source] BuildError),
    #[error("failed to build GPIO controller")]
    Gpio(#[source] BuildError),
    #[error("failed to build timers")]
    Timers(#[source] BuildError),
    #[error("failed to build UARTs")]
    Uarts(#[source] BuildError),
    #[error("failed to build power, clock, I2C and memory controllers")]
    SystemControl(#[source] BuildError),
    #[error("failed to build AC97 controller")]
    Ac97(#[source] BuildError),
    #[error("failed to build SSP ports")]
    Ssp(#[source] BuildError),
    #[error("failed to build I2S controller")]
    I2s(#[source] BuildError),
    #[error("failed to build PWM")]
    Pwm(#[source] BuildError),
    #[error("failed to build MMC controller")]
    Mmc(#[source] BuildError),
    #[error("failed to build LCD controller")]
    Lcd(#[source] BuildError),
    #[error("failed to build SD card")]
    SdCard(#[source] BuildError),
    #[error("failed to build device model")]
    Device(#[source] BuildError),
}

/// Register `name` in the physical map and make it visible to the CPU
fn map(
    cpu: &mut dyn CpuEngine,
    mem: &mut PhysMemory,
    name: &'static str,
    base: u32,
    size: u32,
    backing: Backing,
) -> Result<Region, BuildError> {
    let region = mem.add_region(name, base, size, backing)?;
    cpu.map_region(&region, mem)?;
    Ok(region)
}

fn map_device(
    cpu: &mut dyn CpuEngine,
    mem: &mut PhysMemory,
    name: &'static str,
    base: u32,
    size: u32,
    id: DeviceId,
) -> Result<(), BuildError> {
    map(cpu, mem, name, base, size, Backing::Mmio(id)).map(|_| ())
}

fn page_align(len: usize) -> usize {
    len.next_multiple_of(PAGE_SIZE as usize)
}

fn check_ram(profile: &DeviceProfile) -> Result<(), BuildError> {
    let size = profile.ram_size as u64;
    let span = match profile.ram_termination {
        RamTermination::None => 2 * size,
        RamTermination::Mirror | RamTermination::WriteIgnore => 3 * size,
    };
    if size == 0 || size % PAGE_SIZE as u64 != 0 || ram::BASE as u64 + span > ram::END as u64 {
        return Err(BuildError::Invalid(format!(
            "RAM size {:#X} does not fit the SDRAM partition",
            profile.ram_size
        )));
    }
    Ok(())
}

fn build_ram(
    cpu: &mut dyn CpuEngine,
    mem: &mut PhysMemory,
    profile: &DeviceProfile,
) -> Result<(), BuildError> {
    let size = profile.ram_size as u32;
    let bank = mem.alloc_bank(profile.ram_size)?;
    map(cpu, mem, "ram", ram::BASE, size, Backing::Ram { bank })?;
    map(cpu, mem, "ram-mirror", ram::BASE + size, size, Backing::Ram { bank })?;
    // The termination style covers the window above the mirror
    let above = ram::BASE + 2 * size;
    match profile.ram_termination {
        RamTermination::Mirror => {
            map(cpu, mem, "ram-mirror-high", above, size, Backing::Ram { bank })?;
        }
        RamTermination::WriteIgnore => {
            map(cpu, mem, "ram-void", above, size, Backing::Void)?;
        }
        RamTermination::None => {}
    }
    info!(
        "RAM: {} MB at {:#X}, termination {:?}",
        profile.ram_size / (1024 * 1024),
        ram::BASE,
        profile.ram_termination
    );
    Ok(())
}

fn build_rom(
    cpu: &mut dyn CpuEngine,
    mem: &mut PhysMemory,
    pieces: &[Vec<u8>],
    profile: &DeviceProfile,
) -> Result<(), BuildError> {
    if pieces.is_empty() || pieces.iter().any(|p| p.is_empty()) {
        return Err(BuildError::Invalid("empty ROM image".into()));
    }
    let total: usize = pieces.iter().map(|p| page_align(p.len())).sum();
    if total > rom::MAX_SIZE {
        return Err(BuildError::Invalid(format!(
            "ROM image of {:#X} bytes exceeds the {:#X} byte window",
            total,
            rom::MAX_SIZE
        )));
    }

    let bank = mem.alloc_bank(total)?;
    let mut offset = 0;
    for (i, piece) in pieces.iter().enumerate() {
        mem.load(bank, offset, piece)?;
        debug!("  ROM piece {} at {:#X} ({} bytes)", i, rom::BASE as usize + offset, piece.len());
        offset += page_align(piece.len());
    }
    map(
        cpu,
        mem,
        "rom",
        rom::BASE,
        total as u32,
        Backing::Rom {
            bank,
            chip: profile.rom_chip,
        },
    )?;
    info!("ROM: {} KB ({:?})", total / 1024, profile.rom_chip);
    Ok(())
}

fn build_revision_block(
    cpu: &mut dyn CpuEngine,
    mem: &mut PhysMemory,
    manifest: &PeripheralManifest,
) -> Result<RevisionBlock, BuildError> {
    let udc = Udc::new(manifest.udc);
    map_device(cpu, mem, "udc", hw::udc::BASE, hw::udc::SIZE, DeviceId::Udc)?;

    if manifest.onchip_sram {
        let bank = mem.alloc_bank(sram::SIZE)?;
        map(cpu, mem, "sram", sram::BASE, sram::SIZE as u32, Backing::Ram { bank })?;
    }

    let block = match manifest.coprocessor {
        CoprocessorKind::LegacyDsp => RevisionBlock::Legacy {
            dsp: Coprocessor::new(CoprocessorKind::LegacyDsp),
            udc,
        },
        CoprocessorKind::Wmmx => {
            map_device(cpu, mem, "imc", hw::imc::BASE, hw::imc::SIZE, DeviceId::Imc)?;
            map_device(cpu, mem, "kpc", hw::kpc::BASE, hw::kpc::SIZE, DeviceId::Kpc)?;
            RevisionBlock::Extended {
                wmmx: Coprocessor::new(CoprocessorKind::Wmmx),
                imc: Imc::new(),
                kpc: KeypadScanner::new(hw::kpc::BASE),
                udc,
            }
        }
    };
    Ok(block)
}

fn build_uarts(
    cpu: &mut dyn CpuEngine,
    mem: &mut PhysMemory,
    manifest: &PeripheralManifest,
) -> Result<Vec<Uart>, BuildError> {
    let mut ports = vec![(UartPort::Ff, "ffuart", hw::uart::FFUART_BASE, irq::FFUART)];
    if manifest.hw_uart {
        ports.push((UartPort::Hw, "hwuart", hw::uart::HWUART_BASE, irq::HWUART));
    }
    ports.push((UartPort::St, "stuart", hw::uart::STUART_BASE, irq::STUART));
    ports.push((UartPort::Bt, "btuart", hw::uart::BTUART_BASE, irq::BTUART));

    let mut uarts = Vec::with_capacity(ports.len());
    for (port, name, base, line) in ports {
        map_device(cpu, mem, name, base, hw::uart::SIZE, DeviceId::Uart(port))?;
        uarts.push(Uart::new(port, base, line));
    }
    Ok(uarts)
}

fn ssp_region_name(role: SspRole) -> &'static str {
    match role {
        SspRole::Ssp1 => "ssp1",
        SspRole::Nssp => "nssp",
        SspRole::Assp => "assp",
        SspRole::Ssp2 => "ssp2",
        SspRole::Ssp3 => "ssp3",
    }
}

const PWM_NAMES: [&str; 4] = ["pwm0", "pwm1", "pwm2", "pwm3"];

pub struct Soc {
    /// Must drop before `board`, whose memory banks it maps
    pub(crate) cpu: Box<dyn CpuEngine>,
    pub(crate) board: Board,
    pub(crate) device: Box<dyn DeviceModel>,
    scheduler: Scheduler,
    mailbox: FrameMailbox,
    manifest: PeripheralManifest,
    profile: DeviceProfile,
}

impl Soc {
    /// Build a SoC around the unicorn CPU engine
    pub fn init(config: SocConfig) -> Result<Self, SocInitError> {
        Self::init_with(config, |cpu| Ok(Box::new(UnicornCore::new(cpu)?)))
    }

    /// Build a SoC around a caller-supplied CPU engine
    pub fn init_with<F>(config: SocConfig, make_cpu: F) -> Result<Self, SocInitError>
    where
        F: FnOnce(&CpuConfig) -> Result<Box<dyn CpuEngine>, CpuError>,
    {
        let SocConfig {
            rom: rom_pieces,
            sd_card,
            nand,
            debug_port,
            profile,
            revision,
            serial,
        } = config;
        let _span = info_span!("soc_init", model = profile.name, %revision).entered();
        let manifest = manifest::resolve(revision);
        info!("=== Building {} SoC for {} ===", revision, profile.name);

        // 1. Memory subsystem
        check_ram(&profile).map_err(SocInitError::Memory)?;
        let mut mem = PhysMemory::new();

        // 2. CPU core
        let cpu_config = CpuConfig {
            rom_base: rom::BASE,
            coprocessor: manifest.coprocessor,
            debug_port,
            cpu_id: manifest.cpu_id,
        };
        let mut cpu = make_cpu(&cpu_config).map_err(|e| SocInitError::Cpu(e.into()))?;
        let cpu_ref = cpu.as_mut();

        // 3. RAM, its mirror and whatever terminates them
        build_ram(cpu_ref, &mut mem, &profile).map_err(SocInitError::Ram)?;

        // 4. ROM
        build_rom(cpu_ref, &mut mem, &rom_pieces, &profile).map_err(SocInitError::Rom)?;
        drop(rom_pieces);

        // 5. Interrupt controller
        let mut intc = InterruptController::new(manifest.intc_lines);
        map_device(cpu_ref, &mut mem, "intc", hw::intc::BASE, hw::intc::SIZE, DeviceId::Intc)
            .map_err(SocInitError::Intc)?;

        // 6. DMA controller
        let dma = DmaController::new(hw::dma::BASE, manifest.dma_channels);
        map_device(cpu_ref, &mut mem, "dma", hw::dma::BASE, hw::dma::SIZE, DeviceId::Dma)
            .map_err(SocInitError::Dma)?;

        // 7. Revision-specific blocks
        let revision_block = build_revision_block(cpu_ref, &mut mem, &manifest)
            .map_err(SocInitError::Revision)?;

        // 8. GPIO
        let mut gpio = Gpio::new(hw::gpio::BASE, manifest.gpio_banks);
        map_device(cpu_ref, &mut mem, "gpio", hw::gpio::BASE, hw::gpio::SIZE, DeviceId::Gpio)
            .map_err(SocInitError::Gpio)?;

        // 9. OS timer and RTC
        let ost = OsTimer::new(hw::ost::BASE);
        let rtc = Rtc::new(hw::rtc::BASE);
        map_device(cpu_ref, &mut mem, "ost", hw::ost::BASE, hw::ost::SIZE, DeviceId::Ost)
            .and_then(|_| {
                map_device(cpu_ref, &mut mem, "rtc", hw::rtc::BASE, hw::rtc::SIZE, DeviceId::Rtc)
            })
            .map_err(SocInitError::Timers)?;

        // 10. UARTs
        let mut uarts = build_uarts(cpu_ref, &mut mem, &manifest).map_err(SocInitError::Uarts)?;

        // 11. Power and clock manager, I2C, memory controller
        let pwrman = PowerManager::new();
        let clkman = ClockManager::new(manifest.coprocessor == CoprocessorKind::Wmmx);
        let mut i2c = I2c::new(hw::i2c::BASE);
        let memctrl = MemoryController::new();
        [
            ("pwrman", hw::pwrclk::PWRMAN_BASE, hw::pwrclk::PWRMAN_SIZE, DeviceId::PwrMan),
            ("clkman", hw::pwrclk::CLKMAN_BASE, hw::pwrclk::CLKMAN_SIZE, DeviceId::ClkMan),
            ("i2c", hw::i2c::BASE, hw::i2c::SIZE, DeviceId::I2c),
            ("memctrl", hw::memctrl::BASE, hw::memctrl::SIZE, DeviceId::MemCtrl),
        ]
        .into_iter()
        .try_for_each(|(name, base, size, id)| map_device(cpu_ref, &mut mem, name, base, size, id))
        .map_err(SocInitError::SystemControl)?;

        // 12. AC97
        let ac97 = Ac97::new(hw::ac97::BASE);
        map_device(cpu_ref, &mut mem, "ac97", hw::ac97::BASE, hw::ac97::SIZE, DeviceId::Ac97)
            .map_err(SocInitError::Ac97)?;

        // 13. Synchronous serial ports
        let mut ssps = Vec::with_capacity(manifest.ssp_ports.len());
        for (index, port) in manifest.ssp_ports.iter().enumerate() {
            map_device(
                cpu_ref,
                &mut mem,
                ssp_region_name(port.role),
                port.base,
                hw::ssp::SIZE,
                DeviceId::Ssp(index),
            )
            .map_err(SocInitError::Ssp)?;
            ssps.push(Ssp::new(*port));
        }

        // 14. I2S
        let i2s = I2s::new(hw::i2s::BASE);
        map_device(cpu_ref, &mut mem, "i2s", hw::i2s::BASE, hw::i2s::SIZE, DeviceId::I2s)
            .map_err(SocInitError::I2s)?;

        // 15. PWM
        let mut pwms = Vec::with_capacity(manifest.pwm_bases.len());
        for (index, (&base, name)) in manifest.pwm_bases.iter().zip(PWM_NAMES).enumerate() {
            map_device(cpu_ref, &mut mem, name, base, hw::pwm::SIZE, DeviceId::Pwm(index))
                .map_err(SocInitError::Pwm)?;
            pwms.push(Pwm::new(base));
        }

        // 16. MMC/SD controller
        let mut mmc = MmcController::new(hw::mmc::BASE);
        map_device(cpu_ref, &mut mem, "mmc", hw::mmc::BASE, hw::mmc::SIZE, DeviceId::Mmc)
            .map_err(SocInitError::Mmc)?;

        // 17. LCD controller
        let lcd = Lcd::new(hw::lcd::BASE, profile.display);
        map_device(cpu_ref, &mut mem, "lcd", hw::lcd::BASE, hw::lcd::SIZE, DeviceId::Lcd)
            .map_err(SocInitError::Lcd)?;

        // 18. Keypad relay; routes are declared by the device model
        let mut keypad = Keypad::new();

        // 19. Virtual SD card
        if let Some(SdCardConfig { sectors, io }) = sd_card.filter(|sd| sd.sectors > 0) {
            if sectors > VirtualSd::MAX_SECTORS {
                return Err(SocInitError::SdCard(BuildError::Invalid(format!(
                    "{} sectors exceed the largest SDHC card",
                    sectors
                ))));
            }
            info!("SD card: {} MB", sectors / 2048);
            mmc.insert_card(VirtualSd::new(sectors, io));
        }

        // 20. Device model
        let nand = nand
            .as_deref()
            .map(NandImage::open)
            .transpose()
            .map_err(|e| SocInitError::Device(e.into()))?;
        let mut device: Box<dyn DeviceModel> =
            Box::new(PalmDevice::new(revision, profile.display, nand));
        device.setup(&mut DevicePeripherals {
            keypad: &mut keypad,
            gpio: &mut gpio,
            i2c: &mut i2c,
            intc: &mut intc,
        });
        let debug_port = device.debug_uart();
        match uarts.iter_mut().find(|u| u.port() == debug_port) {
            Some(uart) => uart.attach_host(serial),
            None => {
                return Err(SocInitError::Device(BuildError::Invalid(format!(
                    "debug UART {:?} is not present on {}",
                    debug_port, revision
                ))));
            }
        }

        let board = Board {
            mem,
            intc,
            dma,
            keypad,
            devices: Devices {
                gpio,
                ost,
                rtc,
                uarts,
                pwrman,
                clkman,
                i2c,
                memctrl,
                ac97,
                ssps,
                i2s,
                pwms,
                mmc,
                lcd,
                revision: revision_block,
            },
        };
        info!(
            "SoC ready: {} regions, device model {:?}",
            board.mem.regions().len(),
            device.name()
        );

        Ok(Self {
            cpu,
            board,
            device,
            scheduler: Scheduler::new(),
            mailbox: FrameMailbox::new(),
            manifest,
            profile,
        })
    }

    /// Execute exactly `max_cycles` steps; returns `max_cycles`
    pub fn run(&mut self, max_cycles: u64) -> u64 {
        for _ in 0..max_cycles {
            let counter = self.scheduler.tick();
            for service in Scheduler::due(counter) {
                self.service(service, counter);
            }
            self.cpu.step(&mut self.board);
        }
        max_cycles
    }

    /// `counter` is the step being serviced, counted from 1 since construction
    fn service(&mut self, service: Service, counter: u64) {
        let board = &mut self.board;
        match service {
            Service::Timer => board.devices.ost.tick(&mut board.intc),
            Service::SerialBus => {
                for ssp in &mut board.devices.ssps {
                    let client = self.device.ssp_client(ssp.role());
                    ssp.process(&mut board.intc, client);
                }
                board.service_dma();
                for uart in &mut board.devices.uarts {
                    uart.process(&mut board.intc);
                }
            }
            Service::Audio => {
                board.devices.ac97.process(&mut board.intc);
                board.devices.i2s.process(&mut board.intc);
            }
            Service::Device => self.device.periodic(counter),
            Service::LcdFrame => {
                if let Some(frame) = board.compose_frame() {
                    self.mailbox.publish(frame);
                }
            }
            Service::Rtc => board.devices.rtc.update(&mut board.intc),
        }
    }

    /// Most recent frame not yet acknowledged
    pub fn get_pending_frame(&self) -> Option<&Frame> {
        self.mailbox.pending()
    }

    pub fn reset_pending_frame(&mut self) {
        self.mailbox.reset();
    }

    /// Steps executed since construction
    pub fn cycles(&self) -> u64 {
        self.scheduler.counter()
    }

    pub fn pc(&self) -> u32 {
        self.cpu.pc()
    }

    pub fn manifest(&self) -> &PeripheralManifest {
        &self.manifest
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    pub fn device(&self) -> &dyn DeviceModel {
        self.device.as_ref()
    }
}
