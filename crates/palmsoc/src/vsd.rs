//! Virtual SD card.
//!
//! Implements the SD command state machine on top of a [`SectorIo`] backing
//! store. The card always identifies as high capacity, so data commands take
//! block (sector) addresses.
//!
//! # References
//! - SD Specifications Part 1, Physical Layer Simplified Specification

use palmsoc_hw::mmio::mmc::{SECTOR_SIZE, commands as cmd};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, trace, warn};

pub type Sector = [u8; SECTOR_SIZE];

/// Backing store for the card's sectors
pub trait SectorIo {
    fn read_sector(&mut self, index: u64, buf: &mut Sector) -> io::Result<()>;
    fn write_sector(&mut self, index: u64, buf: &Sector) -> io::Result<()>;
}

/// Sector store backed by a read closure and a write closure
pub struct ClosureSectorIo<R, W> {
    read: R,
    write: W,
}

impl<R, W> ClosureSectorIo<R, W>
where
    R: FnMut(u64, &mut Sector) -> io::Result<()>,
    W: FnMut(u64, &Sector) -> io::Result<()>,
{
    pub fn new(read: R, write: W) -> Self {
        Self { read, write }
    }
}

impl<R, W> SectorIo for ClosureSectorIo<R, W>
where
    R: FnMut(u64, &mut Sector) -> io::Result<()>,
    W: FnMut(u64, &Sector) -> io::Result<()>,
{
    fn read_sector(&mut self, index: u64, buf: &mut Sector) -> io::Result<()> {
        (self.read)(index, buf)
    }

    fn write_sector(&mut self, index: u64, buf: &Sector) -> io::Result<()> {
        (self.write)(index, buf)
    }
}

/// Sector store backed by a raw image file
#[derive(Debug)]
pub struct FileSectorIo {
    file: File,
}

impl FileSectorIo {
    /// Open an image read/write; returns the store and its sector count
    pub fn open(path: &Path) -> io::Result<(Self, u64)> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let sectors = file.metadata()?.len() / SECTOR_SIZE as u64;
        debug!("Opened SD card image {:?}: {} sectors", path, sectors);
        Ok((Self { file }, sectors))
    }
}

impl SectorIo for FileSectorIo {
    fn read_sector(&mut self, index: u64, buf: &mut Sector) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(index * SECTOR_SIZE as u64))?;
        self.file.read_exact(buf)
    }

    fn write_sector(&mut self, index: u64, buf: &Sector) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(index * SECTOR_SIZE as u64))?;
        self.file.write_all(buf)?;
        self.file.flush()
    }
}

/// Card states, as reported in the R1 CURRENT_STATE field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CardState {
    Idle = 0,
    Ready = 1,
    Identify = 2,
    Standby = 3,
    Transfer = 4,
    Data = 5,
    Receive = 6,
    Program = 7,
}

/// Response produced by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdResponse {
    /// No response (CMD0, or the card ignored the command)
    None,
    /// 32-bit card status (R1/R1b)
    R1(u32),
    /// 128-bit CID or CSD, most significant word first
    R2([u32; 4]),
    /// Operating conditions register
    R3(u32),
    /// Published RCA and condensed status
    R6(u32),
    /// Interface condition echo
    R7(u32),
}

/// R1 card status bits
mod status {
    pub const OUT_OF_RANGE: u32 = 1 << 31;
    pub const ILLEGAL_COMMAND: u32 = 1 << 22;
    pub const READY_FOR_DATA: u32 = 1 << 8;
    pub const APP_CMD: u32 = 1 << 5;
}

/// Powered up, 2.7 to 3.6 V, high capacity
const OCR: u32 = 0x80FF_8000 | (1 << 30);

const RCA: u32 = 0x0001;

const CID: [u32; 4] = [0x1D41_4453, 0x4443_4152, 0x1000_0000, 0x0101_8A00];

#[derive(Debug)]
enum Transfer {
    None,
    Read {
        next: u64,
        multi: bool,
        buf: Vec<u8>,
        pos: usize,
    },
    Write {
        next: u64,
        multi: bool,
        buf: Vec<u8>,
    },
}

pub struct VirtualSd {
    sectors: u64,
    io: Box<dyn SectorIo>,
    state: CardState,
    app_cmd: bool,
    pending_errors: u32,
    block_len: u32,
    transfer: Transfer,
}

impl std::fmt::Debug for VirtualSd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualSd")
            .field("sectors", &self.sectors)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl VirtualSd {
    /// Largest card the CSD version 2.0 size field can describe (2 TiB)
    pub const MAX_SECTORS: u64 = 1 << 32;

    pub fn new(sectors: u64, io: Box<dyn SectorIo>) -> Self {
        Self {
            sectors,
            io,
            state: CardState::Idle,
            app_cmd: false,
            pending_errors: 0,
            block_len: SECTOR_SIZE as u32,
            transfer: Transfer::None,
        }
    }

    /// Open a raw image file as a card
    pub fn from_image(path: &Path) -> io::Result<Self> {
        let (io, sectors) = FileSectorIo::open(path)?;
        Ok(Self::new(sectors, Box::new(io)))
    }

    pub fn sector_count(&self) -> u64 {
        self.sectors
    }

    pub fn state(&self) -> CardState {
        self.state
    }

    /// Block length last set with SET_BLOCKLEN
    pub fn block_len(&self) -> u32 {
        self.block_len
    }

    fn card_status(&mut self) -> u32 {
        let mut value = (self.state as u32) << 9 | std::mem::take(&mut self.pending_errors);
        if matches!(self.transfer, Transfer::None) {
            value |= status::READY_FOR_DATA;
        }
        if self.app_cmd {
            value |= status::APP_CMD;
        }
        value
    }

    /// CSD version 2.0: C_SIZE counts 512 KiB units
    fn csd(&self) -> [u32; 4] {
        let c_size = (self.sectors / 1024).saturating_sub(1) as u32 & 0x3F_FFFF;
        [
            0x400E_0032,
            0x5B59_0000 | (c_size >> 16),
            ((c_size & 0xFFFF) << 16) | 0x7F80,
            0x0A40_0000,
        ]
    }

    /// Execute a command (or, after CMD55, an application command)
    pub fn command(&mut self, index: u8, arg: u32) -> SdResponse {
        if std::mem::take(&mut self.app_cmd) {
            debug!("vSD ACMD{} arg={:#X}", index, arg);
            if let Some(response) = self.app_command(index, arg) {
                return response;
            }
        }
        debug!("vSD CMD{} arg={:#X}", index, arg);
        match index {
            cmd::GO_IDLE_STATE => {
                self.state = CardState::Idle;
                self.transfer = Transfer::None;
                SdResponse::None
            }
            cmd::ALL_SEND_CID => {
                if self.state == CardState::Ready {
                    self.state = CardState::Identify;
                }
                SdResponse::R2(CID)
            }
            cmd::SEND_RELATIVE_ADDR => {
                if self.state == CardState::Identify {
                    self.state = CardState::Standby;
                }
                let status = self.card_status();
                // Condensed status: bits 23, 22, 19 and 12:0
                let condensed =
                    (status & 0x1FFF) | ((status >> 8) & 0xC000) | ((status >> 6) & 0x2000);
                SdResponse::R6(RCA << 16 | condensed)
            }
            cmd::SELECT_CARD => {
                let status = self.card_status();
                if arg >> 16 == RCA {
                    if self.state == CardState::Standby {
                        self.state = CardState::Transfer;
                    }
                } else if self.state == CardState::Transfer {
                    self.state = CardState::Standby;
                }
                SdResponse::R1(status)
            }
            cmd::SEND_IF_COND => SdResponse::R7(arg & 0xFFF),
            cmd::SEND_CSD => SdResponse::R2(self.csd()),
            cmd::STOP_TRANSMISSION => {
                self.transfer = Transfer::None;
                if matches!(self.state, CardState::Data | CardState::Receive) {
                    self.state = CardState::Transfer;
                }
                SdResponse::R1(self.card_status())
            }
            cmd::SEND_STATUS => SdResponse::R1(self.card_status()),
            cmd::SET_BLOCKLEN => {
                if arg as usize != SECTOR_SIZE {
                    trace!("vSD: block length {} ignored for high capacity", arg);
                }
                self.block_len = arg;
                SdResponse::R1(self.card_status())
            }
            cmd::READ_SINGLE_BLOCK | cmd::READ_MULTIPLE_BLOCK => {
                let multi = index == cmd::READ_MULTIPLE_BLOCK;
                self.start_read(u64::from(arg), multi)
            }
            cmd::WRITE_BLOCK | cmd::WRITE_MULTIPLE_BLOCK => {
                let multi = index == cmd::WRITE_MULTIPLE_BLOCK;
                self.start_write(u64::from(arg), multi)
            }
            cmd::APP_CMD => {
                self.app_cmd = true;
                SdResponse::R1(self.card_status())
            }
            _ => {
                warn!("vSD: unsupported CMD{}", index);
                self.pending_errors |= status::ILLEGAL_COMMAND;
                SdResponse::None
            }
        }
    }

    /// Application commands; `None` falls through to the regular table
    fn app_command(&mut self, index: u8, arg: u32) -> Option<SdResponse> {
        let response = match index {
            cmd::ACMD_SET_BUS_WIDTH => {
                debug!("vSD bus width: {}", if arg & 3 == 2 { 4 } else { 1 });
                SdResponse::R1(self.card_status())
            }
            cmd::ACMD_SD_SEND_OP_COND => {
                if self.state == CardState::Idle && arg != 0 {
                    self.state = CardState::Ready;
                }
                SdResponse::R3(OCR)
            }
            cmd::ACMD_SEND_SCR => {
                let status = self.card_status();
                // SD 2.0, 1 and 4 bit bus
                let scr = vec![0x02, 0x35, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00];
                self.state = CardState::Data;
                self.transfer = Transfer::Read {
                    next: self.sectors,
                    multi: false,
                    buf: scr,
                    pos: 0,
                };
                SdResponse::R1(status)
            }
            _ => return None,
        };
        Some(response)
    }

    fn load(&mut self, index: u64) -> Vec<u8> {
        let mut sector = [0u8; SECTOR_SIZE];
        if let Err(e) = self.io.read_sector(index, &mut sector) {
            warn!("vSD: failed to read sector {}: {}", index, e);
            sector.fill(0);
        }
        sector.to_vec()
    }

    fn start_read(&mut self, sector: u64, multi: bool) -> SdResponse {
        if self.state != CardState::Transfer {
            self.pending_errors |= status::ILLEGAL_COMMAND;
            return SdResponse::R1(self.card_status());
        }
        if sector >= self.sectors {
            self.pending_errors |= status::OUT_OF_RANGE;
            return SdResponse::R1(self.card_status());
        }
        let status = self.card_status();
        let buf = self.load(sector);
        self.state = CardState::Data;
        self.transfer = Transfer::Read {
            next: sector + 1,
            multi,
            buf,
            pos: 0,
        };
        SdResponse::R1(status)
    }

    fn start_write(&mut self, sector: u64, multi: bool) -> SdResponse {
        if self.state != CardState::Transfer {
            self.pending_errors |= status::ILLEGAL_COMMAND;
            return SdResponse::R1(self.card_status());
        }
        if sector >= self.sectors {
            self.pending_errors |= status::OUT_OF_RANGE;
            return SdResponse::R1(self.card_status());
        }
        let status = self.card_status();
        self.state = CardState::Receive;
        self.transfer = Transfer::Write {
            next: sector,
            multi,
            buf: Vec::with_capacity(SECTOR_SIZE),
        };
        SdResponse::R1(status)
    }

    /// Whether the card has read data waiting for the host
    pub fn has_read_data(&self) -> bool {
        matches!(self.transfer, Transfer::Read { .. })
    }

    /// Whether the card expects write data from the host
    pub fn wants_write_data(&self) -> bool {
        matches!(self.transfer, Transfer::Write { .. })
    }

    /// Next byte of the current read transfer
    pub fn read_byte(&mut self) -> Option<u8> {
        let Transfer::Read { next, multi, buf, pos } = &mut self.transfer else {
            return None;
        };
        let byte = buf[*pos];
        *pos += 1;
        if *pos < buf.len() {
            return Some(byte);
        }

        // Block finished
        if *multi && *next < self.sectors {
            let index = *next;
            *next += 1;
            let block = self.load(index);
            if let Transfer::Read { buf, pos, .. } = &mut self.transfer {
                *buf = block;
                *pos = 0;
            }
        } else {
            if *multi {
                self.pending_errors |= status::OUT_OF_RANGE;
            }
            self.transfer = Transfer::None;
            self.state = CardState::Transfer;
        }
        Some(byte)
    }

    /// Accept one byte of the current write transfer; returns `true` when
    /// the byte completed a block
    pub fn write_byte(&mut self, byte: u8) -> bool {
        let Transfer::Write { next, multi, buf } = &mut self.transfer else {
            return false;
        };
        buf.push(byte);
        if buf.len() < SECTOR_SIZE {
            return false;
        }

        let index = *next;
        let mut sector = [0u8; SECTOR_SIZE];
        sector.copy_from_slice(buf);
        buf.clear();
        *next += 1;
        let done = !*multi || *next >= self.sectors;
        if let Err(e) = self.io.write_sector(index, &sector) {
            warn!("vSD: failed to write sector {}: {}", index, e);
        } else {
            trace!("vSD: wrote sector {}", index);
        }
        if done {
            self.transfer = Transfer::None;
            self.state = CardState::Transfer;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn memory_card(sectors: u64) -> (VirtualSd, Rc<RefCell<Vec<u8>>>) {
        let data = Rc::new(RefCell::new(vec![0u8; sectors as usize * SECTOR_SIZE]));
        for (i, b) in data.borrow_mut().iter_mut().enumerate() {
            *b = (i / SECTOR_SIZE) as u8;
        }
        let read_data = data.clone();
        let write_data = data.clone();
        let io = ClosureSectorIo::new(
            move |index, buf: &mut Sector| {
                let start = index as usize * SECTOR_SIZE;
                buf.copy_from_slice(&read_data.borrow()[start..start + SECTOR_SIZE]);
                Ok(())
            },
            move |index, buf: &Sector| {
                let start = index as usize * SECTOR_SIZE;
                write_data.borrow_mut()[start..start + SECTOR_SIZE].copy_from_slice(buf);
                Ok(())
            },
        );
        (VirtualSd::new(sectors, Box::new(io)), data)
    }

    fn bring_up(card: &mut VirtualSd) {
        assert_eq!(card.command(cmd::GO_IDLE_STATE, 0), SdResponse::None);
        assert_eq!(card.command(cmd::SEND_IF_COND, 0x1AA), SdResponse::R7(0x1AA));
        card.command(cmd::APP_CMD, 0);
        assert_eq!(card.command(cmd::ACMD_SD_SEND_OP_COND, 0x40FF_8000), SdResponse::R3(OCR));
        assert_eq!(card.state(), CardState::Ready);
        card.command(cmd::ALL_SEND_CID, 0);
        let SdResponse::R6(r6) = card.command(cmd::SEND_RELATIVE_ADDR, 0) else {
            panic!("expected R6");
        };
        card.command(cmd::SELECT_CARD, r6 & 0xFFFF_0000);
        assert_eq!(card.state(), CardState::Transfer);
    }

    #[test]
    fn test_identification_sequence() {
        let (mut card, _) = memory_card(2048);
        bring_up(&mut card);
        let SdResponse::R2(csd) = card.command(cmd::SEND_CSD, RCA << 16) else {
            panic!("expected R2");
        };
        // C_SIZE = 2048 / 1024 - 1
        assert_eq!(csd[2] >> 16, 1);
    }

    #[test]
    fn test_multi_block_read_until_stop() {
        let (mut card, _) = memory_card(4);
        bring_up(&mut card);
        card.command(cmd::READ_MULTIPLE_BLOCK, 1);
        assert_eq!(card.state(), CardState::Data);

        let bytes: Vec<u8> = (0..2 * SECTOR_SIZE).filter_map(|_| card.read_byte()).collect();
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[SECTOR_SIZE], 2);
        assert!(card.has_read_data());

        card.command(cmd::STOP_TRANSMISSION, 0);
        assert_eq!(card.state(), CardState::Transfer);
        assert_eq!(card.read_byte(), None);
    }

    #[test]
    fn test_single_block_write() {
        let (mut card, data) = memory_card(4);
        bring_up(&mut card);
        card.command(cmd::WRITE_BLOCK, 3);
        let completed = (0..SECTOR_SIZE).map(|_| card.write_byte(0xAB)).filter(|&c| c).count();
        assert_eq!(completed, 1);
        assert_eq!(card.state(), CardState::Transfer);
        assert!(data.borrow()[3 * SECTOR_SIZE..].iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_out_of_range_read() {
        let (mut card, _) = memory_card(4);
        bring_up(&mut card);
        let SdResponse::R1(status) = card.command(cmd::READ_SINGLE_BLOCK, 10) else {
            panic!("expected R1");
        };
        assert_ne!(status & status::OUT_OF_RANGE, 0);
        assert!(!card.has_read_data());
        assert_eq!(card.state(), CardState::Transfer);
    }

    #[test]
    fn test_file_backed_card() {
        let mut image = tempfile::NamedTempFile::new().unwrap();
        let mut contents = vec![0u8; 8 * SECTOR_SIZE];
        contents[5 * SECTOR_SIZE] = 0x5A;
        image.write_all(&contents).unwrap();
        image.flush().unwrap();

        let mut card = VirtualSd::from_image(image.path()).unwrap();
        assert_eq!(card.sector_count(), 8);
        bring_up(&mut card);
        card.command(cmd::READ_SINGLE_BLOCK, 5);
        assert_eq!(card.read_byte(), Some(0x5A));

        card.command(cmd::STOP_TRANSMISSION, 0);
        card.command(cmd::WRITE_BLOCK, 0);
        for _ in 0..SECTOR_SIZE {
            card.write_byte(0x11);
        }
        let written = std::fs::read(image.path()).unwrap();
        assert!(written[..SECTOR_SIZE].iter().all(|&b| b == 0x11));
    }
}
