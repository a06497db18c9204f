use crate::manifest::Revision;
use crate::periph::uart::StdoutSerial;
use crate::profile::{DeviceProfile, ProfileError};
use crate::soc::{SdCardConfig, SocConfig};
use crate::vsd::FileSectorIo;
use crate::EmulatorConfig;
use clap::Parser;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "PXA-based Palm handheld emulator")]
pub struct Args {
    /// ROM image pieces, placed back to back from address 0
    #[arg(required = true)]
    pub rom: Vec<PathBuf>,

    /// Device model (palm-tx, tungsten-t3, tungsten-e2)
    #[arg(long, short = 'm', default_value = "palm-tx")]
    pub model: String,

    /// Override the model's SoC revision
    #[arg(long, value_enum)]
    pub revision: Option<Revision>,

    /// Path to SD card image (raw sectors)
    #[arg(long)]
    pub sd_card: Option<PathBuf>,

    /// Path to NAND image (512-byte pages with 16 spare bytes)
    #[arg(long)]
    pub nand: Option<PathBuf>,

    /// Serve the GDB remote protocol on this port
    #[arg(long)]
    pub gdb_port: Option<u16>,

    /// Stop after this many cycles (hex: 0x1234 or decimal: 1234)
    #[arg(long, short = 'n', value_parser = parse_hex_or_dec)]
    pub cycles: Option<u64>,

    /// Stop after this many milliseconds of wall-clock time
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Run at the model's nominal clock rate
    #[arg(long)]
    pub realtime: bool,

    /// Nominal clock rate used with --realtime
    #[arg(long, value_parser = parse_hex_or_dec)]
    pub clock_hz: Option<u64>,

    /// Echo the debug UART to stdout
    #[arg(long)]
    pub serial: bool,
}

#[derive(Debug, Error)]
pub enum ArgsError {
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Invalid(&'static str),
}

impl Args {
    /// Validate that the arguments are consistent
    pub fn validate(&self) -> Result<(), ArgsError> {
        if self.clock_hz == Some(0) {
            return Err(ArgsError::Invalid("--clock-hz must be nonzero"));
        }
        if self.clock_hz.is_some() && !self.realtime {
            return Err(ArgsError::Invalid("--clock-hz requires --realtime"));
        }
        DeviceProfile::builtin(&self.model)?;
        Ok(())
    }

    /// Read the images named on the command line and describe the SoC
    pub fn to_soc_config(&self) -> Result<SocConfig, ArgsError> {
        let profile = DeviceProfile::builtin(&self.model)?;

        let rom = self
            .rom
            .iter()
            .map(|path| {
                info!("Loading ROM piece from file: {:?}", path);
                std::fs::read(path).map_err(|source| ArgsError::Io {
                    path: path.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let sd_card = match &self.sd_card {
            Some(path) => {
                let (io, sectors) = FileSectorIo::open(path).map_err(|source| ArgsError::Io {
                    path: path.clone(),
                    source,
                })?;
                Some(SdCardConfig {
                    sectors,
                    io: Box::new(io),
                })
            }
            None => None,
        };

        let mut config = SocConfig::new(rom, profile);
        if let Some(revision) = self.revision {
            config.revision = revision;
        }
        config.sd_card = sd_card;
        config.nand = self.nand.clone();
        config.debug_port = self.gdb_port;
        if self.serial {
            config.serial = Some(Box::new(StdoutSerial));
        }
        Ok(config)
    }

    /// Convert Args to EmulatorConfig
    pub fn to_emulator_config(&self) -> EmulatorConfig {
        EmulatorConfig {
            max_cycles: self.cycles,
            timeout_ms: self.timeout_ms,
            paced: self.realtime,
            clock_hz: self.clock_hz,
        }
    }
}

pub fn parse_hex_or_dec(s: &str) -> Result<u64, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::io::Write;

    #[test]
    fn test_parse_hex_or_dec() {
        assert_eq!(parse_hex_or_dec("0x1000"), Ok(4096));
        assert_eq!(parse_hex_or_dec("1000"), Ok(1000));
        assert!(parse_hex_or_dec("0xZZ").is_err());
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["palmsoc", "rom.bin"]).unwrap();
        assert_eq!(args.model, "palm-tx");
        assert_eq!(args.revision, None);
        assert!(args.validate().is_ok());
        let config = args.to_emulator_config();
        assert_eq!(config.max_cycles, None);
        assert!(!config.paced);
    }

    #[test]
    fn test_rom_is_required() {
        assert!(Args::try_parse_from(["palmsoc"]).is_err());
    }

    #[test]
    fn test_revision_and_cycles() {
        let args = Args::try_parse_from([
            "palmsoc",
            "a.bin",
            "b.bin",
            "--revision",
            "pxa26x",
            "-n",
            "0x100",
        ])
        .unwrap();
        assert_eq!(args.rom.len(), 2);
        assert_eq!(args.revision, Some(Revision::Pxa26x));
        assert_eq!(args.to_emulator_config().max_cycles, Some(256));
    }

    #[test]
    fn test_validate_rejects_bad_combinations() {
        let args = Args::try_parse_from(["palmsoc", "rom.bin", "--model", "zire"]).unwrap();
        assert!(matches!(args.validate(), Err(ArgsError::Profile(_))));

        let args = Args::try_parse_from(["palmsoc", "rom.bin", "--clock-hz", "1000"]).unwrap();
        assert!(matches!(args.validate(), Err(ArgsError::Invalid(_))));

        let args =
            Args::try_parse_from(["palmsoc", "rom.bin", "--realtime", "--clock-hz", "0"]).unwrap();
        assert!(matches!(args.validate(), Err(ArgsError::Invalid(_))));
    }

    #[test]
    fn test_to_soc_config_reads_images() {
        let dir = tempfile::tempdir().unwrap();
        let rom_path = dir.path().join("rom.bin");
        std::fs::File::create(&rom_path)
            .unwrap()
            .write_all(&[0xFE, 0xFF, 0xFF, 0xEA])
            .unwrap();
        let sd_path = dir.path().join("sd.img");
        std::fs::File::create(&sd_path)
            .unwrap()
            .set_len(64 * 512)
            .unwrap();

        let args = Args::try_parse_from([
            OsStr::new("palmsoc"),
            rom_path.as_os_str(),
            OsStr::new("--model"),
            OsStr::new("tungsten-e2"),
            OsStr::new("--sd-card"),
            sd_path.as_os_str(),
        ])
        .unwrap();
        let config = args.to_soc_config().unwrap();
        assert_eq!(config.rom, vec![vec![0xFE, 0xFF, 0xFF, 0xEA]]);
        assert_eq!(config.profile.name, "tungsten-e2");
        assert_eq!(config.revision, Revision::Pxa25x);
        assert_eq!(config.sd_card.map(|sd| sd.sectors), Some(64));
    }

    #[test]
    fn test_missing_rom_names_path() {
        let args = Args::try_parse_from(["palmsoc", "/nonexistent/rom.bin"]).unwrap();
        match args.to_soc_config() {
            Err(err @ ArgsError::Io { .. }) => {
                assert!(err.to_string().starts_with("/nonexistent/rom.bin"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("missing ROM accepted"),
        }
    }
}
