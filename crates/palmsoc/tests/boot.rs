//! End-to-end runs on the unicorn engine with tiny hand-assembled ROMs.

use palmsoc::profile::RomChipType;
use palmsoc::{DeviceProfile, Revision, Soc, SocConfig};

const RAM_BASE: u32 = 0xA000_0000;

// b .
const SPIN: u32 = 0xEAFF_FFFE;

fn rom(words: &[u32]) -> Vec<Vec<u8>> {
    vec![words.iter().flat_map(|w| w.to_le_bytes()).collect()]
}

fn boot(words: &[u32], profile: DeviceProfile) -> Soc {
    Soc::init(SocConfig::new(rom(words), profile)).expect("SoC should build")
}

#[test]
fn spin_loop_runs_exact_cycle_counts() {
    let mut soc = boot(&[SPIN], DeviceProfile::palm_tx());
    assert_eq!(soc.profile().revision, Revision::Pxa27x);
    assert!(soc.board().mem.find(RAM_BASE).is_some());

    assert_eq!(soc.run(1_000_000), 1_000_000);
    assert_eq!(soc.cycles(), 1_000_000);
    assert_eq!(soc.pc(), 0);

    assert_eq!(soc.run(0), 0);
    assert_eq!(soc.cycles(), 1_000_000);
}

#[test]
fn store_reaches_ram_and_mirror() {
    let profile = DeviceProfile::palm_tx();
    let mirror = RAM_BASE + profile.ram_size as u32;
    let mut soc = boot(
        &[
            0xE3A0_04A0, // mov r0, #0xA0000000
            0xE3A0_1055, // mov r1, #0x55
            0xE580_1000, // str r1, [r0]
            SPIN,
        ],
        profile,
    );
    soc.run(16);
    assert_eq!(soc.pc(), 12);
    let mem = &soc.board().mem;
    assert_eq!(mem.read_u32(RAM_BASE).unwrap(), 0x55);
    assert_eq!(mem.read_u32(mirror).unwrap(), 0x55);
}

#[test]
fn main_id_read_returns_revision_cpu_id() {
    for (profile, expected) in [
        (DeviceProfile::palm_tx(), 0x4926_5013),
        (DeviceProfile::tungsten_e2(), 0x6905_2D06),
    ] {
        let mut soc = boot(
            &[
                0xEE10_0F10, // mrc p15, 0, r0, c0, c0, 0
                0xE3A0_14A0, // mov r1, #0xA0000000
                0xE581_0000, // str r0, [r1]
                SPIN,
            ],
            profile,
        );
        soc.run(16);
        assert_eq!(soc.board().mem.read_u32(RAM_BASE).unwrap(), expected);
    }
}

#[test]
fn undefined_instruction_enters_vector() {
    let mut soc = boot(
        &[
            0xE7F0_00F0, // udf
            SPIN,        // undefined instruction vector
        ],
        DeviceProfile::tungsten_e2(),
    );
    soc.run(4);
    assert_eq!(soc.pc(), 0x04);
}

#[test]
fn rom_write_faults_only_on_erroring_chips() {
    let program = [
        0xE3A0_0000, // mov r0, #0
        0xE580_0000, // str r0, [r0]
        SPIN,
        0xE1A0_0000, // nop
        SPIN, // data abort vector
    ];

    let mut profile = DeviceProfile::tungsten_e2();
    profile.rom_chip = RomChipType::WriteError;
    let mut soc = boot(&program, profile);
    soc.run(8);
    assert_eq!(soc.pc(), 0x10);

    let mut profile = DeviceProfile::tungsten_e2();
    profile.rom_chip = RomChipType::WriteIgnore;
    let mut soc = boot(&program, profile);
    soc.run(8);
    assert_eq!(soc.pc(), 0x08);
    assert_eq!(soc.board().mem.read_u32(0).unwrap(), 0xE3A0_0000);
}

#[test]
fn key_events_survive_real_steps() {
    let mut soc = boot(&[SPIN], DeviceProfile::palm_tx());
    soc.key_event(palmsoc::Key::Power, true);
    soc.run(1000);
    assert!(soc.is_key_pressed(palmsoc::Key::Power));
    assert!(soc.get_pending_frame().is_none());
}
