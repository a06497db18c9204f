//! XScale core on top of `unicorn-engine`.
//!
//! Unicorn executes the instructions; this module supplies what it does not:
//! MMIO dispatch into the [`Board`], CP15 ID answers, and ARM exception entry
//! for IRQ, FIQ, SWI, undefined instructions and aborts. Unicorn is started
//! for exactly one instruction per [`CpuEngine::step`].

use super::{CpuConfig, CpuEngine, CpuError};
use crate::board::Board;
use crate::cp15::{self, Cp15Action};
use crate::gdb::{DebugTarget, GdbStub};
use crate::manifest::CoprocessorKind;
use crate::memory::{Backing, BankId, PhysMemory, Region};
use palmsoc_hw::memory_map::PAGE_SIZE;
use std::collections::BTreeSet;
use tracing::{debug, info, trace, warn};
use unicorn_engine::unicorn_const::{Arch, HookType, MemType, Mode, Prot, uc_error};
use unicorn_engine::{ArmCpuModel, RegisterARM, Unicorn};

mod psr {
    pub const MODE_MASK: u32 = 0x1F;
    pub const THUMB: u32 = 1 << 5;
    pub const FIQ_DISABLE: u32 = 1 << 6;
    pub const IRQ_DISABLE: u32 = 1 << 7;

    pub const MODE_FIQ: u32 = 0x11;
    pub const MODE_IRQ: u32 = 0x12;
    pub const MODE_SVC: u32 = 0x13;
    pub const MODE_ABT: u32 = 0x17;
    pub const MODE_UND: u32 = 0x1B;

    /// Supervisor mode with IRQ and FIQ masked
    pub const RESET: u32 = MODE_SVC | IRQ_DISABLE | FIQ_DISABLE;
}

/// Exception numbers reported through the interrupt hook
mod excp {
    pub const UDEF: u32 = 1;
    pub const SWI: u32 = 2;
    pub const PREFETCH_ABORT: u32 = 3;
    pub const DATA_ABORT: u32 = 4;
    pub const BKPT: u32 = 7;
}

const HIGH_VECTORS: u32 = 0xFFFF_0000;

const GPRS: [RegisterARM; 16] = [
    RegisterARM::R0,
    RegisterARM::R1,
    RegisterARM::R2,
    RegisterARM::R3,
    RegisterARM::R4,
    RegisterARM::R5,
    RegisterARM::R6,
    RegisterARM::R7,
    RegisterARM::R8,
    RegisterARM::R9,
    RegisterARM::R10,
    RegisterARM::R11,
    RegisterARM::R12,
    RegisterARM::SP,
    RegisterARM::LR,
    RegisterARM::PC,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exception {
    Undefined,
    Swi,
    PrefetchAbort,
    DataAbort,
    Irq,
    Fiq,
}

impl Exception {
    /// Vector offset and processor mode
    fn entry(self) -> (u32, u32) {
        match self {
            Exception::Undefined => (0x04, psr::MODE_UND),
            Exception::Swi => (0x08, psr::MODE_SVC),
            Exception::PrefetchAbort => (0x0C, psr::MODE_ABT),
            Exception::DataAbort => (0x10, psr::MODE_ABT),
            Exception::Irq => (0x18, psr::MODE_IRQ),
            Exception::Fiq => (0x1C, psr::MODE_FIQ),
        }
    }

    /// Banked LR for an exception taken with `pc` in the engine
    ///
    /// `pc` is the faulting instruction for undefined instructions and aborts,
    /// the following instruction for SWI and the next one to run for IRQ/FIQ.
    fn return_address(self, pc: u32, thumb: bool) -> u32 {
        match self {
            Exception::Undefined => pc.wrapping_add(if thumb { 2 } else { 4 }),
            Exception::Swi => pc,
            Exception::PrefetchAbort | Exception::Irq | Exception::Fiq => pc.wrapping_add(4),
            Exception::DataAbort => pc.wrapping_add(8),
        }
    }
}

/// State reachable from unicorn callbacks
struct BusLink {
    /// Valid only for the duration of `emu_start` inside `step`
    board: *mut Board,
    cpu_id: u32,
    high_vectors: bool,
    /// Address of the last invalid memory access
    fault: Option<u32>,
    /// Exception raised by the instruction just executed, with the PC it left
    exception: Option<(Exception, u32)>,
}

impl BusLink {
    fn board(&mut self) -> Option<&mut Board> {
        // SAFETY: `board` is either null or was derived from the `&mut Board`
        // passed to `step`, which is not otherwise touched while unicorn runs.
        unsafe { self.board.as_mut() }
    }
}

pub struct UnicornCore {
    emu: Unicorn<'static, BusLink>,
    /// MMIO pages already handed to unicorn (several blocks can share one)
    mmio_pages: BTreeSet<u32>,
    gdb: Option<GdbStub>,
}

fn cpu_model(kind: CoprocessorKind) -> ArmCpuModel {
    match kind {
        CoprocessorKind::LegacyDsp => ArmCpuModel::PXA255,
        CoprocessorKind::Wmmx => ArmCpuModel::PXA270,
    }
}

fn read_reg(uc: &Unicorn<'_, BusLink>, reg: RegisterARM) -> u32 {
    uc.reg_read(reg).unwrap_or(0) as u32
}

fn write_reg(uc: &mut Unicorn<'_, BusLink>, reg: RegisterARM, value: u32) {
    if let Err(e) = uc.reg_write(reg, value as u64) {
        warn!("Register write {:?} = {:#X} failed: {:?}", reg, value, e);
    }
}

/// Intercept MRC/MCR to p15 ahead of execution
fn cp15_hook(uc: &mut Unicorn<'_, BusLink>, addr: u64, size: u32) {
    // Thumb has no coprocessor instructions
    if size != 4 {
        return;
    }
    let mut bytes = [0u8; 4];
    if uc.mem_read(addr, &mut bytes).is_err() {
        return;
    }
    let Some(access) = cp15::decode(u32::from_le_bytes(bytes)) else {
        return;
    };

    let rd = GPRS[access.rd as usize];
    let cpu_id = uc.get_data().cpu_id;
    match cp15::handle(access, read_reg(uc, rd), cpu_id) {
        Cp15Action::Load(value) => {
            write_reg(uc, rd, value);
            write_reg(uc, RegisterARM::PC, addr as u32 + 4);
        }
        Cp15Action::Control { high_vectors } => {
            uc.get_data_mut().high_vectors = high_vectors;
        }
        Cp15Action::PassThrough => {}
    }
}

fn intr_hook(uc: &mut Unicorn<'_, BusLink>, intno: u32) {
    let exception = match intno {
        excp::SWI => Exception::Swi,
        excp::UDEF => Exception::Undefined,
        excp::PREFETCH_ABORT | excp::BKPT => Exception::PrefetchAbort,
        excp::DATA_ABORT => Exception::DataAbort,
        other => {
            warn!("Unhandled CPU exception {}", other);
            return;
        }
    };
    let pc = read_reg(uc, RegisterARM::PC);
    trace!("CPU exception {:?} at {:#X}", exception, pc);
    uc.get_data_mut().exception = Some((exception, pc));
    if let Err(e) = uc.emu_stop() {
        warn!("emu_stop failed: {:?}", e);
    }
}

fn invalid_mem_hook(
    uc: &mut Unicorn<'_, BusLink>,
    kind: MemType,
    addr: u64,
    size: usize,
    _value: i64,
) -> bool {
    trace!("Invalid {:?} of {} bytes at {:#X}", kind, size, addr);
    uc.get_data_mut().fault = Some(addr as u32);
    false
}

impl UnicornCore {
    pub fn new(config: &CpuConfig) -> Result<Self, CpuError> {
        let link = BusLink {
            board: std::ptr::null_mut(),
            cpu_id: config.cpu_id,
            high_vectors: false,
            fault: None,
            exception: None,
        };
        let mut emu = Unicorn::new_with_data(Arch::ARM, Mode::LITTLE_ENDIAN, link)?;
        let model = cpu_model(config.coprocessor);
        emu.ctl_set_cpu_model(model as i32)?;
        info!(
            "CPU: XScale with {:?}, ID {:#010X}, reset at {:#X}",
            config.coprocessor, config.cpu_id, config.rom_base
        );

        emu.add_code_hook(0, u64::MAX, cp15_hook)?;
        emu.add_intr_hook(intr_hook)?;
        emu.add_mem_hook(HookType::MEM_INVALID, 0, u64::MAX, invalid_mem_hook)?;

        write_reg(&mut emu, RegisterARM::CPSR, psr::RESET);
        write_reg(&mut emu, RegisterARM::PC, config.rom_base);

        let gdb = config.debug_port.map(GdbStub::bind).transpose()?;

        Ok(Self {
            emu,
            mmio_pages: BTreeSet::new(),
            gdb,
        })
    }

    pub fn cpsr(&self) -> u32 {
        read_reg(&self.emu, RegisterARM::CPSR)
    }

    pub fn register(&self, index: usize) -> u32 {
        GPRS.get(index).map_or(0, |&reg| read_reg(&self.emu, reg))
    }

    fn vector_base(&self) -> u32 {
        if self.emu.get_data().high_vectors {
            HIGH_VECTORS
        } else {
            0
        }
    }

    fn map_bank(
        &mut self,
        region: &Region,
        mem: &mut PhysMemory,
        bank: BankId,
        prot: Prot,
    ) -> Result<(), CpuError> {
        let ptr = mem.bank_ptr(bank).ok_or(CpuError::Unmappable {
            name: region.name,
            base: region.base,
        })?;
        // SAFETY: banks are boxed slices that never move, and `Soc` drops the
        // CPU engine before the board that owns them.
        unsafe {
            self.emu
                .mem_map_ptr(region.base as u64, region.size as u64, prot, ptr as _)?;
        }
        Ok(())
    }

    fn map_mmio(&mut self, region: &Region) -> Result<(), CpuError> {
        let first = region.base & !(PAGE_SIZE - 1);
        let last = ((region.end() - 1) as u32) & !(PAGE_SIZE - 1);
        for page in (first..=last).step_by(PAGE_SIZE as usize) {
            if !self.mmio_pages.insert(page) {
                continue;
            }
            self.emu.mmio_map(
                page as u64,
                PAGE_SIZE as u64,
                Some(move |uc: &mut Unicorn<'_, BusLink>, offset: u64, size: usize| {
                    let addr = page + offset as u32;
                    match uc.get_data_mut().board() {
                        Some(board) => board.mmio_read(addr, size) as u64,
                        None => 0,
                    }
                }),
                Some(
                    move |uc: &mut Unicorn<'_, BusLink>, offset: u64, size: usize, value: u64| {
                        let addr = page + offset as u32;
                        if let Some(board) = uc.get_data_mut().board() {
                            board.mmio_write(addr, size, value as u32);
                        }
                    },
                ),
            )?;
        }
        Ok(())
    }

    /// Switch to the exception's mode and jump to its vector
    fn enter_exception(&mut self, exception: Exception, pc: u32) {
        let cpsr = self.cpsr();
        let thumb = cpsr & psr::THUMB != 0;
        let (vector, mode) = exception.entry();
        let lr = exception.return_address(pc, thumb);

        let mut new_cpsr = (cpsr & !(psr::MODE_MASK | psr::THUMB)) | mode | psr::IRQ_DISABLE;
        if exception == Exception::Fiq {
            new_cpsr |= psr::FIQ_DISABLE;
        }
        let target = self.vector_base() + vector;
        trace!(
            "Exception {:?}: pc={:#X} lr={:#X} -> {:#X}",
            exception, pc, lr, target
        );

        // CPSR first so SPSR and LR land in the new mode's banks
        write_reg(&mut self.emu, RegisterARM::CPSR, new_cpsr);
        write_reg(&mut self.emu, RegisterARM::SPSR, cpsr);
        write_reg(&mut self.emu, RegisterARM::LR, lr);
        write_reg(&mut self.emu, RegisterARM::PC, target);
    }

    /// Take a pending FIQ, else a pending IRQ, if unmasked
    fn deliver_interrupts(&mut self, board: &Board) {
        let cpsr = self.cpsr();
        if board.intc.fiq_asserted() && cpsr & psr::FIQ_DISABLE == 0 {
            self.enter_exception(Exception::Fiq, self.pc());
        } else if board.intc.irq_asserted() && cpsr & psr::IRQ_DISABLE == 0 {
            self.enter_exception(Exception::Irq, self.pc());
        }
    }

    /// Turn an engine error from a one-instruction run into guest-visible state
    fn handle_fault(&mut self, err: uc_error, fault: Option<u32>, board: &Board) {
        let pc = self.pc();
        match err {
            uc_error::INSN_INVALID => {
                debug!("Undefined instruction at {:#X}", pc);
                self.enter_exception(Exception::Undefined, pc);
            }
            uc_error::FETCH_UNMAPPED | uc_error::FETCH_PROT => {
                warn!("Prefetch abort at {:#X}", pc);
                self.enter_exception(Exception::PrefetchAbort, pc);
            }
            uc_error::WRITE_PROT => {
                let addr = fault.unwrap_or(0);
                let faults = match board.mem.find(addr).map(|r| r.backing) {
                    Some(Backing::Rom { chip, .. }) => chip.write_faults(),
                    _ => false,
                };
                if faults {
                    warn!("Write to ROM at {:#X} (pc={:#X})", addr, pc);
                    self.enter_exception(Exception::DataAbort, pc);
                } else {
                    trace!("Dropped write to {:#X} (pc={:#X})", addr, pc);
                    self.skip_instruction(pc);
                }
            }
            uc_error::READ_UNMAPPED | uc_error::WRITE_UNMAPPED | uc_error::READ_PROT => {
                warn!(
                    "Data abort at {:#X} accessing {:#X}",
                    pc,
                    fault.unwrap_or(0)
                );
                self.enter_exception(Exception::DataAbort, pc);
            }
            other => {
                warn!("CPU error {:?} at {:#X}; skipping instruction", other, pc);
                self.skip_instruction(pc);
            }
        }
    }

    fn skip_instruction(&mut self, pc: u32) {
        let size = if self.cpsr() & psr::THUMB != 0 { 2 } else { 4 };
        write_reg(&mut self.emu, RegisterARM::PC, pc.wrapping_add(size));
    }
}

impl CpuEngine for UnicornCore {
    fn map_region(&mut self, region: &Region, mem: &mut PhysMemory) -> Result<(), CpuError> {
        debug!(
            "  CPU map {:<10} {:#010X} - {:#010X}",
            region.name,
            region.base,
            region.end()
        );
        match region.backing {
            Backing::Ram { bank } => self.map_bank(region, mem, bank, Prot::ALL),
            // Writes fault into `handle_fault`, which applies the chip policy
            Backing::Rom { bank, .. } => self.map_bank(region, mem, bank, Prot::READ | Prot::EXEC),
            Backing::Void => {
                self.emu.mem_map(
                    region.base as u64,
                    region.size as u64,
                    Prot::READ | Prot::EXEC,
                )?;
                Ok(())
            }
            Backing::Mmio(_) => self.map_mmio(region),
        }
    }

    fn step(&mut self, board: &mut Board) {
        self.deliver_interrupts(board);

        if let Some(gdb) = self.gdb.as_mut() {
            let pc = read_reg(&self.emu, RegisterARM::PC);
            gdb.before_step(pc, &UcTarget(&self.emu));
        }

        let pc = self.pc();
        let thumb = self.cpsr() & psr::THUMB != 0;
        let begin = pc as u64 | thumb as u64;

        let link = self.emu.get_data_mut();
        link.board = &mut *board as *mut Board;
        link.fault = None;
        link.exception = None;

        let result = self.emu.emu_start(begin, u64::MAX, 0, 1);

        let link = self.emu.get_data_mut();
        link.board = std::ptr::null_mut();
        let fault = link.fault.take();
        let exception = link.exception.take();

        if let Some((exception, pc)) = exception {
            self.enter_exception(exception, pc);
        } else if let Err(err) = result {
            self.handle_fault(err, fault, board);
        }
    }

    fn pc(&self) -> u32 {
        read_reg(&self.emu, RegisterARM::PC)
    }
}

/// Read-only view of the engine for the debug stub
struct UcTarget<'a>(&'a Unicorn<'static, BusLink>);

impl DebugTarget for UcTarget<'_> {
    fn registers(&self) -> [u32; 17] {
        let mut regs = [0u32; 17];
        for (slot, &reg) in regs.iter_mut().zip(GPRS.iter()) {
            *slot = read_reg(self.0, reg);
        }
        regs[16] = read_reg(self.0, RegisterARM::CPSR);
        regs
    }

    fn read_memory(&self, addr: u32, buf: &mut [u8]) -> bool {
        self.0.mem_read(addr as u64, buf).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_vectors_and_modes() {
        assert_eq!(Exception::Undefined.entry(), (0x04, 0x1B));
        assert_eq!(Exception::Swi.entry(), (0x08, 0x13));
        assert_eq!(Exception::PrefetchAbort.entry(), (0x0C, 0x17));
        assert_eq!(Exception::DataAbort.entry(), (0x10, 0x17));
        assert_eq!(Exception::Irq.entry(), (0x18, 0x12));
        assert_eq!(Exception::Fiq.entry(), (0x1C, 0x11));
    }

    #[test]
    fn test_return_addresses() {
        assert_eq!(Exception::Undefined.return_address(0x100, false), 0x104);
        assert_eq!(Exception::Undefined.return_address(0x100, true), 0x102);
        assert_eq!(Exception::Swi.return_address(0x104, false), 0x104);
        assert_eq!(Exception::PrefetchAbort.return_address(0x100, false), 0x104);
        assert_eq!(Exception::DataAbort.return_address(0x100, false), 0x108);
        assert_eq!(Exception::Irq.return_address(0x100, true), 0x104);
    }

    #[test]
    fn test_reset_state() {
        assert_eq!(psr::RESET, 0xD3);
    }
}
