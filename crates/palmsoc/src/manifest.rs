//! Revision to peripheral-set resolution.
//!
//! [`resolve`] is the single place that knows which blocks a PXA generation
//! carries. The composer never branches on the revision itself; it walks the
//! manifest.

use palmsoc_hw::irq;
use palmsoc_hw::mmio::{dma, gpio, pwm, ssp};
use palmsoc_hw::specs::cpu;

/// Hardware generation of the SoC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Revision {
    /// Gen-A: PXA250/PXA255
    #[value(name = "pxa25x")]
    Pxa25x,
    /// Gen-B: PXA260/PXA261/PXA262/PXA263
    #[value(name = "pxa26x")]
    Pxa26x,
    /// Gen-C: PXA270
    #[value(name = "pxa27x")]
    Pxa27x,
}

impl Revision {
    pub const ALL: [Revision; 3] = [Revision::Pxa25x, Revision::Pxa26x, Revision::Pxa27x];
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Revision::Pxa25x => "PXA25x",
            Revision::Pxa26x => "PXA26x",
            Revision::Pxa27x => "PXA27x",
        };
        f.write_str(name)
    }
}

/// Co-processor bolted onto the XScale core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoprocessorKind {
    /// CP0 40-bit accumulator (PXA25x/PXA26x)
    LegacyDsp,
    /// Intel Wireless MMX (PXA27x)
    Wmmx,
}

/// Which USB device controller the part carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdcGeneration {
    First,
    Second,
}

/// Identity of a synchronous serial port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SspRole {
    Ssp1,
    Nssp,
    Assp,
    Ssp2,
    Ssp3,
}

/// Where one SSP lives and how it is wired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SspPort {
    pub role: SspRole,
    pub base: u32,
    pub irq: u8,
    /// DMA request raised while the receive FIFO holds data
    pub rx_dreq: u8,
    /// DMA request raised while the transmit FIFO has room
    pub tx_dreq: u8,
}

/// The complete, revision-determined set of blocks to instantiate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeripheralManifest {
    pub revision: Revision,
    pub cpu_id: u32,
    pub coprocessor: CoprocessorKind,
    pub udc: UdcGeneration,
    /// Internal memory controller and keypad-scan co-processor (PXA27x)
    pub imc: bool,
    pub kpc: bool,
    pub hw_uart: bool,
    /// Small on-chip SRAM bank
    pub onchip_sram: bool,
    pub intc_lines: u8,
    pub gpio_banks: usize,
    pub dma_channels: usize,
    pub ssp_ports: &'static [SspPort],
    pub pwm_bases: &'static [u32],
}

const SSP1: SspPort = SspPort {
    role: SspRole::Ssp1,
    base: ssp::SSP1_BASE,
    irq: irq::SSP,
    rx_dreq: dma::requests::SSP_RX,
    tx_dreq: dma::requests::SSP_TX,
};

const NSSP: SspPort = SspPort {
    role: SspRole::Nssp,
    base: ssp::NSSP_BASE,
    irq: irq::NSSP,
    rx_dreq: dma::requests::NSSP_RX,
    tx_dreq: dma::requests::NSSP_TX,
};

const ASSP: SspPort = SspPort {
    role: SspRole::Assp,
    base: ssp::ASSP_BASE,
    irq: irq::ASSP,
    rx_dreq: dma::requests::ASSP_RX,
    tx_dreq: dma::requests::ASSP_TX,
};

const SSP2: SspPort = SspPort {
    role: SspRole::Ssp2,
    base: ssp::SSP2_BASE,
    irq: irq::SSP2,
    rx_dreq: dma::requests::SSP2_RX,
    tx_dreq: dma::requests::SSP2_TX,
};

const SSP3: SspPort = SspPort {
    role: SspRole::Ssp3,
    base: ssp::SSP3_BASE,
    irq: irq::SSP3,
    rx_dreq: dma::requests::SSP3_RX,
    tx_dreq: dma::requests::SSP3_TX,
};

const PWM_LEGACY: [u32; 2] = [pwm::PWM0_BASE, pwm::PWM1_BASE];
const PWM_EXTENDED: [u32; 4] = [pwm::PWM0_BASE, pwm::PWM1_BASE, pwm::PWM2_BASE, pwm::PWM3_BASE];

/// Map a revision to its peripheral manifest
pub fn resolve(revision: Revision) -> PeripheralManifest {
    match revision {
        Revision::Pxa25x => PeripheralManifest {
            revision,
            cpu_id: cpu::CPUID_PXA255,
            coprocessor: CoprocessorKind::LegacyDsp,
            udc: UdcGeneration::First,
            imc: false,
            kpc: false,
            hw_uart: true,
            onchip_sram: false,
            intc_lines: irq::LINES_PXA25X,
            gpio_banks: gpio::BANKS_PXA25X,
            dma_channels: dma::CHANNELS_PXA25X,
            ssp_ports: &[SSP1, NSSP],
            pwm_bases: &PWM_LEGACY,
        },
        Revision::Pxa26x => PeripheralManifest {
            revision,
            cpu_id: cpu::CPUID_PXA260,
            coprocessor: CoprocessorKind::LegacyDsp,
            udc: UdcGeneration::First,
            imc: false,
            kpc: false,
            hw_uart: true,
            onchip_sram: true,
            intc_lines: irq::LINES_PXA25X,
            gpio_banks: gpio::BANKS_PXA25X,
            dma_channels: dma::CHANNELS_PXA25X,
            ssp_ports: &[SSP1, NSSP, ASSP],
            pwm_bases: &PWM_LEGACY,
        },
        Revision::Pxa27x => PeripheralManifest {
            revision,
            cpu_id: cpu::CPUID_PXA270,
            coprocessor: CoprocessorKind::Wmmx,
            udc: UdcGeneration::Second,
            imc: true,
            kpc: true,
            hw_uart: false,
            onchip_sram: false,
            intc_lines: irq::LINES_PXA27X,
            gpio_banks: gpio::BANKS_PXA27X,
            dma_channels: dma::CHANNELS_PXA27X,
            ssp_ports: &[SSP1, SSP2, SSP3],
            pwm_bases: &PWM_EXTENDED,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_pure() {
        for rev in Revision::ALL {
            assert_eq!(resolve(rev), resolve(rev));
            assert_eq!(resolve(rev).revision, rev);
        }
    }

    #[test]
    fn test_cpu_ids() {
        assert_eq!(resolve(Revision::Pxa25x).cpu_id, 0x6905_2D06);
        assert_eq!(resolve(Revision::Pxa26x).cpu_id, 0x6905_2D06);
        assert_eq!(resolve(Revision::Pxa27x).cpu_id, 0x4926_5013);
    }

    #[test]
    fn test_coprocessors_are_exclusive() {
        let c = resolve(Revision::Pxa27x);
        assert_eq!(c.coprocessor, CoprocessorKind::Wmmx);
        assert_eq!(c.udc, UdcGeneration::Second);
        assert!(c.imc && c.kpc);

        for rev in [Revision::Pxa25x, Revision::Pxa26x] {
            let m = resolve(rev);
            assert_eq!(m.coprocessor, CoprocessorKind::LegacyDsp);
            assert_eq!(m.udc, UdcGeneration::First);
            assert!(!m.imc && !m.kpc);
        }
    }

    #[test]
    fn test_hw_uart_iff_not_gen_c() {
        for rev in Revision::ALL {
            assert_eq!(resolve(rev).hw_uart, rev != Revision::Pxa27x);
        }
    }

    #[test]
    fn test_ssp_roles() {
        let roles = |rev| {
            resolve(rev)
                .ssp_ports
                .iter()
                .map(|p| p.role)
                .collect::<Vec<_>>()
        };
        assert_eq!(roles(Revision::Pxa25x), [SspRole::Ssp1, SspRole::Nssp]);
        assert_eq!(
            roles(Revision::Pxa26x),
            [SspRole::Ssp1, SspRole::Nssp, SspRole::Assp]
        );
        assert_eq!(
            roles(Revision::Pxa27x),
            [SspRole::Ssp1, SspRole::Ssp2, SspRole::Ssp3]
        );
    }

    #[test]
    fn test_pwm_and_sram() {
        assert_eq!(resolve(Revision::Pxa25x).pwm_bases.len(), 2);
        assert_eq!(resolve(Revision::Pxa26x).pwm_bases.len(), 2);
        assert_eq!(resolve(Revision::Pxa27x).pwm_bases.len(), 4);

        assert!(!resolve(Revision::Pxa25x).onchip_sram);
        assert!(resolve(Revision::Pxa26x).onchip_sram);
        assert!(!resolve(Revision::Pxa27x).onchip_sram);
    }
}
