//! GDB Remote Serial Protocol stub for the ARM core.
//!
//! The stub is polled by the CPU engine before every instruction. It never
//! blocks while the guest runs: the listener and a running session are
//! non-blocking, and the engine only blocks while a client holds the target
//! halted. Supported:
//!
//! - Register read (`g`/`p`), using GDB's default ARM layout
//!   (r0-r15, f0-f7, fps, cpsr)
//! - Memory read (`m`)
//! - Single step (`s`) and continue (`c`), including `vCont`
//! - Software breakpoints (`Z0`/`z0`)
//! - Interrupt (Ctrl+C), detach (`D`) and kill (`k`, treated as detach)
//!
//! ```text
//! palmsoc rom.bin --gdb-port 1234
//! arm-none-eabi-gdb -ex "target remote :1234"
//! ```

use std::collections::BTreeSet;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// How often (in steps) the listener is polled for a client
const ACCEPT_INTERVAL: u32 = 1 << 16;
/// How often (in steps) a running session is polled for Ctrl+C
const INTERRUPT_INTERVAL: u32 = 1 << 12;
/// Largest memory read served in one packet
const MAX_READ: usize = 0x1000;

const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// Register file and memory as the debugger sees them
pub trait DebugTarget {
    /// r0-r15 followed by cpsr
    fn registers(&self) -> [u32; 17];

    /// Fill `buf` from guest memory; `false` if any byte is inaccessible
    fn read_memory(&self, addr: u32, buf: &mut [u8]) -> bool;
}

/// What the engine should do after a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GdbAction {
    /// Stay halted and read the next packet
    None,
    Continue,
    Step,
    /// Drop the session and keep running
    Detach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Stepping,
    Halted,
}

struct Session {
    stream: TcpStream,
    buf: Vec<u8>,
}

pub struct GdbStub {
    listener: TcpListener,
    session: Option<Session>,
    breakpoints: BTreeSet<u32>,
    state: RunState,
    polls: u32,
}

impl GdbStub {
    /// Listen on `127.0.0.1:port` (0 picks a free port)
    pub fn bind(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))?;
        listener.set_nonblocking(true)?;
        info!("GDB stub listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            session: None,
            breakpoints: BTreeSet::new(),
            state: RunState::Running,
            polls: 0,
        })
    }

    pub fn port(&self) -> io::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Called before the instruction at `pc` executes; blocks while halted
    pub fn before_step(&mut self, pc: u32, target: &dyn DebugTarget) {
        self.polls = self.polls.wrapping_add(1);

        if self.session.is_none() {
            if self.polls % ACCEPT_INTERVAL == 1 {
                self.try_accept();
            }
            if self.session.is_none() {
                return;
            }
        }

        match self.state {
            RunState::Stepping => self.halt(),
            RunState::Running if self.breakpoints.contains(&pc) => {
                debug!("GDB: breakpoint at {:#X}", pc);
                self.halt();
            }
            RunState::Running if self.polls % INTERRUPT_INTERVAL == 0 => {
                self.poll_interrupt();
            }
            _ => {}
        }

        while self.state == RunState::Halted {
            let action = match self.serve_packet(target) {
                Ok(action) => action,
                Err(e) => {
                    warn!("GDB session lost: {}", e);
                    GdbAction::Detach
                }
            };
            match action {
                GdbAction::None => {}
                GdbAction::Continue => self.resume(RunState::Running),
                GdbAction::Step => self.resume(RunState::Stepping),
                GdbAction::Detach => self.drop_session(),
            }
        }
    }

    fn try_accept(&mut self) {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                info!("GDB client connected from {}", addr);
                let ready = stream
                    .set_nonblocking(false)
                    .and_then(|_| stream.set_nodelay(true));
                if let Err(e) = ready {
                    warn!("GDB: could not configure client socket: {}", e);
                    return;
                }
                self.session = Some(Session {
                    stream,
                    buf: Vec::with_capacity(256),
                });
                // A new client expects the target stopped
                self.state = RunState::Halted;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!("GDB accept failed: {}", e),
        }
    }

    /// Stop and report SIGTRAP
    fn halt(&mut self) {
        self.state = RunState::Halted;
        let sent = match self.session.as_mut() {
            Some(session) => session
                .stream
                .set_nonblocking(false)
                .and_then(|_| session.send_packet(b"S05")),
            None => return,
        };
        if let Err(e) = sent {
            warn!("GDB session lost: {}", e);
            self.drop_session();
        }
    }

    fn resume(&mut self, state: RunState) {
        self.state = state;
        if let Some(session) = self.session.as_ref() {
            if let Err(e) = session.stream.set_nonblocking(true) {
                warn!("GDB session lost: {}", e);
                self.drop_session();
            }
        }
    }

    /// Check a running session for Ctrl+C or a hangup
    fn poll_interrupt(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let mut byte = [0u8; 1];
        match session.stream.read(&mut byte) {
            Ok(0) => {
                info!("GDB client disconnected");
                self.drop_session();
            }
            Ok(_) if byte[0] == 0x03 => {
                debug!("GDB: interrupt");
                self.halt();
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => {
                warn!("GDB session lost: {}", e);
                self.drop_session();
            }
        }
    }

    fn serve_packet(&mut self, target: &dyn DebugTarget) -> io::Result<GdbAction> {
        let Some(session) = self.session.as_mut() else {
            return Ok(GdbAction::Detach);
        };
        let packet = session.read_packet()?;
        let (reply, action) = respond(&packet, target, &mut self.breakpoints);
        if let Some(reply) = reply {
            session.send_packet(reply.as_bytes())?;
        }
        Ok(action)
    }

    fn drop_session(&mut self) {
        self.session = None;
        self.breakpoints.clear();
        self.state = RunState::Running;
    }
}

impl Session {
    /// Read one packet body; `$<data>#<checksum>` or a bare Ctrl+C
    fn read_packet(&mut self) -> io::Result<Vec<u8>> {
        let mut byte = [0u8; 1];

        // Skip acks until '$' or an interrupt
        loop {
            self.stream.read_exact(&mut byte)?;
            if byte[0] == 0x03 {
                return Ok(b"?".to_vec());
            }
            if byte[0] == b'$' {
                break;
            }
        }

        self.buf.clear();
        loop {
            self.stream.read_exact(&mut byte)?;
            if byte[0] == b'#' {
                break;
            }
            self.buf.push(byte[0]);
        }

        // Checksum is not validated
        let mut checksum = [0u8; 2];
        self.stream.read_exact(&mut checksum)?;

        self.stream.write_all(b"+")?;
        self.stream.flush()?;
        Ok(self.buf.clone())
    }

    fn send_packet(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(&frame(data))?;
        self.stream.flush()?;

        let mut ack = [0u8; 1];
        self.stream.read_exact(&mut ack)?;
        Ok(())
    }
}

/// Wrap `data` as `$<data>#<checksum>`
fn frame(data: &[u8]) -> Vec<u8> {
    let checksum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    let mut pkt = Vec::with_capacity(data.len() + 4);
    pkt.push(b'$');
    pkt.extend_from_slice(data);
    pkt.push(b'#');
    pkt.push(HEX_CHARS[(checksum >> 4) as usize]);
    pkt.push(HEX_CHARS[(checksum & 0xF) as usize]);
    pkt
}

/// Little-endian hex of a 32-bit register, GDB's wire format
fn hex_u32(out: &mut String, value: u32) {
    for byte in value.to_le_bytes() {
        out.push(HEX_CHARS[(byte >> 4) as usize] as char);
        out.push(HEX_CHARS[(byte & 0xF) as usize] as char);
    }
}

fn parse_hex_u32(s: &[u8]) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut val = 0u32;
    for &b in s {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return None,
        };
        val = val.checked_mul(16)?.checked_add(digit as u32)?;
    }
    Some(val)
}

/// `<addr>,<len>` or `<type>,<addr>,<kind>` fields
fn parse_fields(args: &[u8]) -> Option<Vec<u32>> {
    args.split(|&b| b == b',').map(parse_hex_u32).collect()
}

/// Answer one packet; `None` means no reply is sent (execution resumes)
pub fn respond(
    packet: &[u8],
    target: &dyn DebugTarget,
    breakpoints: &mut BTreeSet<u32>,
) -> (Option<String>, GdbAction) {
    let Some((&cmd, args)) = packet.split_first() else {
        return (Some(String::new()), GdbAction::None);
    };
    let reply = |s: &str| (Some(s.to_string()), GdbAction::None);

    match cmd {
        b'?' => reply("S05"),

        b'g' => {
            let regs = target.registers();
            let mut out = String::with_capacity(168 * 2);
            for &r in &regs[..16] {
                hex_u32(&mut out, r);
            }
            // f0-f7 (12 bytes each) and fps
            out.push_str(&"0".repeat(8 * 24 + 8));
            hex_u32(&mut out, regs[16]);
            (Some(out), GdbAction::None)
        }

        b'p' => {
            let regs = target.registers();
            let mut out = String::new();
            match parse_hex_u32(args) {
                Some(n @ 0..=15) => hex_u32(&mut out, regs[n as usize]),
                Some(16..=23) => out.push_str(&"0".repeat(24)),
                Some(24) => hex_u32(&mut out, 0),
                Some(25) => hex_u32(&mut out, regs[16]),
                _ => return reply("E01"),
            }
            (Some(out), GdbAction::None)
        }

        b'm' => {
            let Some(&[addr, len]) = parse_fields(args).as_deref() else {
                return reply("E01");
            };
            let mut buf = vec![0u8; (len as usize).min(MAX_READ)];
            if !target.read_memory(addr, &mut buf) {
                return reply("E14");
            }
            let mut out = String::with_capacity(buf.len() * 2);
            for byte in buf {
                out.push(HEX_CHARS[(byte >> 4) as usize] as char);
                out.push(HEX_CHARS[(byte & 0xF) as usize] as char);
            }
            (Some(out), GdbAction::None)
        }

        b'c' => (None, GdbAction::Continue),
        b's' => (None, GdbAction::Step),

        b'Z' | b'z' => match parse_fields(args).as_deref() {
            Some([0, addr, ..]) => {
                if cmd == b'Z' {
                    breakpoints.insert(*addr);
                } else {
                    breakpoints.remove(addr);
                }
                reply("OK")
            }
            // Hardware breakpoints and watchpoints are not offered
            Some([_, _, ..]) => reply(""),
            _ => reply("E01"),
        },

        b'D' => (Some("OK".to_string()), GdbAction::Detach),
        b'k' => (None, GdbAction::Detach),

        b'q' => {
            let query = std::str::from_utf8(args).unwrap_or("");
            if query.starts_with("Supported") {
                reply("PacketSize=4000")
            } else if query == "Attached" {
                reply("1")
            } else if query == "C" {
                reply("QC1")
            } else if query.starts_with("fThreadInfo") {
                reply("m1")
            } else if query.starts_with("sThreadInfo") {
                reply("l")
            } else {
                reply("")
            }
        }

        b'v' => {
            let query = std::str::from_utf8(args).unwrap_or("");
            if query == "Cont?" {
                reply("vCont;c;s")
            } else if query.starts_with("Cont;c") {
                (None, GdbAction::Continue)
            } else if query.starts_with("Cont;s") {
                (None, GdbAction::Step)
            } else {
                reply("")
            }
        }

        _ => reply(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake;

    impl DebugTarget for Fake {
        fn registers(&self) -> [u32; 17] {
            let mut regs = [0u32; 17];
            for (i, r) in regs.iter_mut().enumerate() {
                *r = i as u32;
            }
            regs[15] = 0xA000_0000;
            regs[16] = 0x6000_00D3;
            regs
        }

        fn read_memory(&self, addr: u32, buf: &mut [u8]) -> bool {
            if addr >= 0x1000 {
                return false;
            }
            for (i, b) in buf.iter_mut().enumerate() {
                *b = (addr as usize + i) as u8;
            }
            true
        }
    }

    fn ask(packet: &[u8]) -> (Option<String>, GdbAction) {
        respond(packet, &Fake, &mut BTreeSet::new())
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u32(b"1234"), Some(0x1234));
        assert_eq!(parse_hex_u32(b"FFFFffff"), Some(0xFFFF_FFFF));
        assert_eq!(parse_hex_u32(b"1FFFFFFFF"), None);
        assert_eq!(parse_hex_u32(b""), None);
        assert_eq!(parse_hex_u32(b"xyz"), None);
    }

    #[test]
    fn test_frame_checksum() {
        assert_eq!(frame(b"OK"), b"$OK#9a");
        assert_eq!(frame(b""), b"$#00");
    }

    #[test]
    fn test_register_dump_layout() {
        let (reply, action) = ask(b"g");
        let reply = reply.unwrap();
        assert_eq!(action, GdbAction::None);
        // 16 core registers, 8 FPA registers, fps and cpsr
        assert_eq!(reply.len(), (16 * 4 + 8 * 12 + 4 + 4) * 2);
        assert_eq!(&reply[8..16], "01000000");
        assert_eq!(&reply[15 * 8..16 * 8], "000000a0");
        assert_eq!(&reply[reply.len() - 8..], "d3000060");
    }

    #[test]
    fn test_single_register() {
        assert_eq!(ask(b"pf").0.unwrap(), "000000a0");
        assert_eq!(ask(b"p19").0.unwrap(), "d3000060");
        assert_eq!(ask(b"p10").0.unwrap().len(), 24);
        assert_eq!(ask(b"p40").0.unwrap(), "E01");
    }

    #[test]
    fn test_memory_read() {
        assert_eq!(ask(b"m10,4").0.unwrap(), "10111213");
        assert_eq!(ask(b"m2000,4").0.unwrap(), "E14");
        assert_eq!(ask(b"m10").0.unwrap(), "E01");
    }

    #[test]
    fn test_breakpoints() {
        let mut bps = BTreeSet::new();
        assert_eq!(respond(b"Z0,a0000100,4", &Fake, &mut bps).0.unwrap(), "OK");
        assert!(bps.contains(&0xA000_0100));
        // Watchpoints are declined
        assert_eq!(respond(b"Z2,100,4", &Fake, &mut bps).0.unwrap(), "");
        assert_eq!(respond(b"z0,a0000100,4", &Fake, &mut bps).0.unwrap(), "OK");
        assert!(bps.is_empty());
    }

    #[test]
    fn test_execution_control() {
        assert_eq!(ask(b"c"), (None, GdbAction::Continue));
        assert_eq!(ask(b"s"), (None, GdbAction::Step));
        assert_eq!(ask(b"vCont;s:1"), (None, GdbAction::Step));
        assert_eq!(ask(b"vCont?").0.unwrap(), "vCont;c;s");
        assert_eq!(ask(b"D"), (Some("OK".into()), GdbAction::Detach));
        assert_eq!(ask(b"k"), (None, GdbAction::Detach));
    }

    #[test]
    fn test_queries_and_unknown() {
        assert_eq!(ask(b"?").0.unwrap(), "S05");
        assert_eq!(ask(b"qSupported:multiprocess+").0.unwrap(), "PacketSize=4000");
        assert_eq!(ask(b"qfThreadInfo").0.unwrap(), "m1");
        assert_eq!(ask(b"X100,0:").0.unwrap(), "");
    }

    #[test]
    fn test_bind_ephemeral_port() {
        let stub = GdbStub::bind(0).unwrap();
        assert_ne!(stub.port().unwrap(), 0);
        assert!(!stub.is_connected());
    }
}
