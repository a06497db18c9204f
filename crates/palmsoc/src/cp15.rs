//! XScale CP15 (system control coprocessor) interception.
//!
//! The engine models CP15 itself; this hook only overrides what the board
//! must decide:
//! - `MRC p15, 0, Rd, c0, c0, 0` returns the configured main ID
//! - `MRC p15, 0, Rd, c0, c0, 1` returns the cache type
//! - `MCR p15, 0, Rd, c1, c0, 0` is observed for the high-vectors bit and
//!   then executed normally
//!
//! # References
//! - Intel XScale Core Developer's Manual, chapter 7 "Configuration"

use palmsoc_hw::specs::cpu::CACHE_TYPE;
use tracing::{debug, trace};

/// Coprocessor register transfer, any condition: cond 1110 opc1 L CRn Rd 1111 opc2 1 CRm
const CP15_MASK: u32 = 0x0F00_0F10;
const CP15_VALUE: u32 = 0x0E00_0F10;

/// Condition field value for "always"
const COND_ALWAYS: u32 = 0xE;

/// SCTLR.V: exception vectors at 0xFFFF0000
pub const SCTLR_V: u32 = 1 << 13;

/// Decoded CP15 register transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cp15Access {
    pub read: bool,
    pub opc1: u32,
    pub crn: u32,
    pub rd: u32,
    pub crm: u32,
    pub opc2: u32,
}

/// Decode an unconditional MRC/MCR to p15
pub fn decode(insn: u32) -> Option<Cp15Access> {
    if insn & CP15_MASK != CP15_VALUE || insn >> 28 != COND_ALWAYS {
        return None;
    }
    Some(Cp15Access {
        read: insn & (1 << 20) != 0,
        opc1: (insn >> 21) & 0x7,
        crn: (insn >> 16) & 0xF,
        rd: (insn >> 12) & 0xF,
        crm: insn & 0xF,
        opc2: (insn >> 5) & 0x7,
    })
}

/// What the core should do with an intercepted access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cp15Action {
    /// Write `value` to Rd and skip the instruction
    Load(u32),
    /// Control register write carrying this value of the V bit
    Control { high_vectors: bool },
    /// Let the engine execute it
    PassThrough,
}

/// Decide how to handle `access`; `rd_value` is the current content of Rd
pub fn handle(access: Cp15Access, rd_value: u32, cpu_id: u32) -> Cp15Action {
    match access {
        Cp15Access {
            read: true,
            opc1: 0,
            crn: 0,
            crm: 0,
            opc2,
            rd,
        } if rd != 15 && opc2 <= 1 => {
            let value = if opc2 == 0 { cpu_id } else { CACHE_TYPE };
            trace!("CP15: ID read (opc2={}) -> {:#X}", opc2, value);
            Cp15Action::Load(value)
        }
        Cp15Access {
            read: false,
            opc1: 0,
            crn: 1,
            crm: 0,
            opc2: 0,
            ..
        } => {
            let high_vectors = rd_value & SCTLR_V != 0;
            debug!(
                "CP15: control register {:#X} (MMU={}, high vectors={})",
                rd_value,
                rd_value & 1 != 0,
                high_vectors
            );
            Cp15Action::Control { high_vectors }
        }
        _ => Cp15Action::PassThrough,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // mrc p15, 0, r0, c0, c0, 0
    const MRC_MAIN_ID: u32 = 0xEE10_0F10;
    // mrc p15, 0, r3, c0, c0, 1
    const MRC_CACHE_TYPE: u32 = 0xEE10_3F30;
    // mcr p15, 0, r1, c1, c0, 0
    const MCR_CONTROL: u32 = 0xEE01_1F10;

    #[test]
    fn test_decode_fields() {
        let access = decode(MRC_CACHE_TYPE).unwrap();
        assert!(access.read);
        assert_eq!((access.crn, access.crm, access.opc2, access.rd), (0, 0, 1, 3));

        let access = decode(MCR_CONTROL).unwrap();
        assert!(!access.read);
        assert_eq!((access.crn, access.rd), (1, 1));
    }

    #[test]
    fn test_rejects_other_coprocessors_and_conditions() {
        // mrc p14, 0, r0, c0, c0, 0
        assert_eq!(decode(0xEE10_0E10), None);
        // mrceq p15, 0, r0, c0, c0, 0
        assert_eq!(decode(0x0E10_0F10), None);
        // mov r0, r0
        assert_eq!(decode(0xE1A0_0000), None);
    }

    #[test]
    fn test_id_reads() {
        let id = 0x4926_5013;
        assert_eq!(handle(decode(MRC_MAIN_ID).unwrap(), 0, id), Cp15Action::Load(id));
        assert_eq!(
            handle(decode(MRC_CACHE_TYPE).unwrap(), 0, id),
            Cp15Action::Load(CACHE_TYPE)
        );
    }

    #[test]
    fn test_control_write_reports_vectors() {
        let access = decode(MCR_CONTROL).unwrap();
        assert_eq!(
            handle(access, 0x2000 | 0x78, 0),
            Cp15Action::Control { high_vectors: true }
        );
        assert_eq!(
            handle(access, 0x78, 0),
            Cp15Action::Control { high_vectors: false }
        );
    }

    #[test]
    fn test_other_registers_pass_through() {
        // mrc p15, 0, r0, c2, c0, 0 (translation table base)
        let access = decode(0xEE12_0F10).unwrap();
        assert_eq!(handle(access, 0, 0), Cp15Action::PassThrough);
    }
}
