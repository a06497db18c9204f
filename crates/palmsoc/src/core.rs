//! Host-side driver around a [`Soc`].
//!
//! [`EmulatorCore`] is what frontends and the CLI hold: it applies the run
//! limits and decides how many cycles each call to [`Soc::run`] gets, either
//! a fixed quantum or a wall-clock budget from the [`Pacer`].

use crate::soc::{Soc, SocConfig, SocInitError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Cycles per call when not pacing: one LCD frame interval
const QUANTUM: u64 = 8192;

/// Backlog beyond which the pacer gives up catching up
const MAX_LAG: Duration = Duration::from_millis(500);

/// Budget handed out right after a resync
const RESYNC_SLICE: Duration = Duration::from_millis(10);

/// Configuration for the emulator
#[derive(Debug, Clone, Default)]
pub struct EmulatorConfig {
    /// Stop after this many cycles
    pub max_cycles: Option<u64>,
    /// Optional timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Run at the profile's nominal clock instead of as fast as possible
    pub paced: bool,
    /// Override of the profile's nominal clock
    pub clock_hz: Option<u64>,
}

/// Result of running the emulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cycle limit was reached
    CycleLimit,
    /// Timeout reached
    Timeout,
}

fn cycles_in(elapsed: Duration, clock_hz: u64) -> u64 {
    (elapsed.as_nanos() * clock_hz as u128 / 1_000_000_000) as u64
}

/// Turns wall-clock time into cycle budgets at a nominal clock rate
#[derive(Debug, Clone)]
pub struct Pacer {
    clock_hz: u64,
    origin: Instant,
    issued: u64,
}

impl Pacer {
    pub fn new(clock_hz: u64, now: Instant) -> Self {
        Self {
            clock_hz,
            origin: now,
            issued: 0,
        }
    }

    pub fn clock_hz(&self) -> u64 {
        self.clock_hz
    }

    /// Cycles owed at `now`. More than 500 ms of backlog is dropped and
    /// pacing restarts from `now`.
    pub fn budget(&mut self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.origin);
        let owed = cycles_in(elapsed, self.clock_hz).saturating_sub(self.issued);
        if owed > cycles_in(MAX_LAG, self.clock_hz) {
            debug!("Pacer: {} cycles behind, resynchronizing", owed);
            self.origin = now;
            self.issued = cycles_in(RESYNC_SLICE, self.clock_hz);
            return self.issued;
        }
        self.issued += owed;
        owed
    }
}

/// A SoC plus run limits
pub struct EmulatorCore {
    soc: Soc,
    max_cycles: Option<u64>,
    timeout_ms: Option<u64>,
    pacer: Option<Pacer>,
    start_time: Instant,
}

impl EmulatorCore {
    /// Build the SoC and wrap it
    pub fn new(soc_config: SocConfig, config: EmulatorConfig) -> Result<Self, SocInitError> {
        let soc = Soc::init(soc_config)?;
        Ok(Self::from_soc(soc, config))
    }

    pub fn from_soc(soc: Soc, config: EmulatorConfig) -> Self {
        let start_time = Instant::now();
        let pacer = config.paced.then(|| {
            let clock_hz = config.clock_hz.unwrap_or(soc.profile().clock_hz);
            info!("Pacing at {} MHz", clock_hz / 1_000_000);
            Pacer::new(clock_hz, start_time)
        });
        Self {
            soc,
            max_cycles: config.max_cycles,
            timeout_ms: config.timeout_ms,
            pacer,
            start_time,
        }
    }

    /// Run one slice; returns the cycles executed
    pub fn step(&mut self) -> u64 {
        let budget = match &mut self.pacer {
            Some(pacer) => pacer.budget(Instant::now()),
            None => QUANTUM,
        };
        let budget = match self.max_cycles {
            Some(max) => budget.min(max.saturating_sub(self.soc.cycles())),
            None => budget,
        };
        self.soc.run(budget)
    }

    /// Check if any stop condition is met
    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.max_cycles.is_some_and(|max| self.soc.cycles() >= max) {
            return Some(StopReason::CycleLimit);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            let elapsed_ms = self.start_time.elapsed().as_millis() as u64;
            if elapsed_ms >= timeout_ms {
                info!("Timeout reached: {} ms", elapsed_ms);
                return Some(StopReason::Timeout);
            }
        }
        None
    }

    /// Run until a stop condition is reached
    pub fn run(&mut self) -> StopReason {
        loop {
            if let Some(reason) = self.stop_reason() {
                return reason;
            }
            if self.step() == 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    pub fn soc(&self) -> &Soc {
        &self.soc
    }

    pub fn soc_mut(&mut self) -> &mut Soc {
        &mut self.soc
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log final emulator state
    pub fn print_final_state(&self) {
        let cycles = self.soc.cycles();
        let elapsed = self.elapsed();
        info!("Cycles executed: {}", cycles);
        info!("Elapsed time: {:.2?}", elapsed);
        if !elapsed.is_zero() {
            info!(
                "Effective clock: {:.2} MHz",
                cycles as f64 / elapsed.as_secs_f64() / 1e6
            );
        }
        info!("PC: {:#010X}", self.soc.pc());
        info!("Frame pending: {}", self.soc.get_pending_frame().is_some());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Revision;
    use crate::soc::tests::{counting_soc, test_config};

    const MHZ: u64 = 1_000_000;

    #[test]
    fn test_pacer_budget_tracks_wall_clock() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(MHZ, t0);
        assert_eq!(pacer.budget(t0), 0);
        assert_eq!(pacer.budget(t0 + Duration::from_millis(10)), 10_000);
        assert_eq!(pacer.budget(t0 + Duration::from_millis(10)), 0);
        assert_eq!(pacer.budget(t0 + Duration::from_millis(25)), 15_000);
    }

    #[test]
    fn test_pacer_tolerates_lag_up_to_limit() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(MHZ, t0);
        assert_eq!(pacer.budget(t0 + Duration::from_millis(500)), 500_000);
    }

    #[test]
    fn test_pacer_resyncs_when_far_behind() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(MHZ, t0);
        let late = t0 + Duration::from_secs(3);
        assert_eq!(pacer.budget(late), 10_000);
        // The slice already covers the next 10 ms
        assert_eq!(pacer.budget(late + Duration::from_millis(5)), 0);
        assert_eq!(pacer.budget(late + Duration::from_millis(30)), 20_000);
    }

    #[test]
    fn test_run_stops_exactly_at_cycle_limit() {
        let (soc, steps) = counting_soc(test_config(Revision::Pxa27x));
        let mut core = EmulatorCore::from_soc(
            soc,
            EmulatorConfig {
                max_cycles: Some(20_000),
                ..Default::default()
            },
        );
        assert_eq!(core.run(), StopReason::CycleLimit);
        assert_eq!(core.soc().cycles(), 20_000);
        assert_eq!(steps.get(), 20_000);
    }

    #[test]
    fn test_zero_timeout_stops_immediately() {
        let (soc, steps) = counting_soc(test_config(Revision::Pxa25x));
        let mut core = EmulatorCore::from_soc(
            soc,
            EmulatorConfig {
                timeout_ms: Some(0),
                ..Default::default()
            },
        );
        assert_eq!(core.run(), StopReason::Timeout);
        assert_eq!(steps.get(), 0);
    }

    #[test]
    fn test_pacer_uses_profile_clock() {
        let (soc, _) = counting_soc(test_config(Revision::Pxa25x));
        let core = EmulatorCore::from_soc(
            soc,
            EmulatorConfig {
                paced: true,
                ..Default::default()
            },
        );
        assert_eq!(core.pacer.as_ref().map(Pacer::clock_hz), Some(MHZ));
    }
}
