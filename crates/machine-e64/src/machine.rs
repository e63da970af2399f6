//! The E64 machine scheduler.
//!
//! One call to [`Machine::run`] executes CPU instructions until the requested
//! cycles are used up. After every instruction the CIA and timer run for the
//! same number of cycles, so their interrupts land on instruction
//! boundaries. The sound chip is then clocked for the whole step through a
//! CPU-to-sound frequency divider, and at each frame boundary the blitter is
//! notified and its queued operations are drained.

use emu_core::{Device, FrequencyDivider, IplPin, M68kCore};
use log::{debug, info, warn};

use crate::audio::{self, AudioQueue, AudioStats, QueueBand, Retiming};
use crate::config::MachineConfig;
use crate::encoder::SharedEncoder;
use crate::error::Result;
use crate::frame::FrameClock;
use crate::mmu::{Chipset, Mmu};
use crate::recorder::WavRecorder;

/// Which loop the host drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Running,
    Paused,
}

/// Outcome of [`Machine::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum StepResult {
    Stepped,
    /// The CPU stopped on a breakpoint. The host should pause.
    BreakpointHit,
}

/// A complete E64 system.
pub struct Machine<C: M68kCore> {
    cpu: C,
    mmu: Mmu,
    encoder: SharedEncoder,
    audio: Box<dyn AudioQueue>,
    config: MachineConfig,
    mode: Mode,
    /// Requested but not yet executed CPU cycles.
    cpu_cycle_balance: i64,
    frame: FrameClock,
    stats: AudioStats,
    cpu_to_sound: FrequencyDivider,
    recorder: Option<WavRecorder>,
}

impl<C: M68kCore> Machine<C> {
    /// Assemble a machine and reset it.
    ///
    /// Devices in `chips` must have registered their interrupt lines on
    /// `encoder`. The encoder output is wired to the CPU's IPL input here.
    pub fn new(
        mut cpu: C,
        chips: Chipset,
        encoder: SharedEncoder,
        audio: Box<dyn AudioQueue>,
        config: MachineConfig,
    ) -> Self {
        let ipl = IplPin::new();
        encoder.borrow_mut().connect_cpu(ipl.clone());
        cpu.connect_ipl(ipl);
        let mmu = Mmu::with_builtin_rom(chips, config.rom_path.clone());
        let mut machine = Self {
            cpu,
            mmu,
            encoder,
            audio,
            frame: FrameClock::new(config.cycles_per_frame()),
            cpu_to_sound: FrequencyDivider::new(config.cpu_clock_hz.max(1), config.sound_clock_hz),
            config,
            mode: Mode::Running,
            cpu_cycle_balance: 0,
            stats: AudioStats::default(),
            recorder: None,
        };
        machine.reset();
        machine
    }

    /// Run the CPU for about `cycles` cycles.
    ///
    /// At least one instruction always executes, so `run(0)` single-steps.
    /// Overshoot is carried in the cycle balance and taken off the next call.
    pub fn run(&mut self, cycles: u32) -> StepResult {
        self.cpu_cycle_balance += i64::from(cycles);

        let mut consumed: u64 = 0;
        let hit = loop {
            let before = self.cpu.clock();
            self.cpu.execute(&mut self.mmu);
            let step = self.cpu.clock().wrapping_sub(before) as u32;

            let chips = self.mmu.chips_mut();
            chips.cia.run(step);
            chips.timer.run(step);
            consumed += u64::from(step);

            if self.cpu.breakpoint_reached() {
                break true;
            }
            if consumed as i64 >= self.cpu_cycle_balance {
                break false;
            }
        };

        if hit {
            self.cpu_cycle_balance = 0;
        } else {
            self.cpu_cycle_balance -= consumed as i64;
        }

        self.run_sound(consumed);
        self.advance_frame(consumed);

        if hit {
            self.cpu.clear_breakpoint();
            debug!("breakpoint at ${:06x}", self.cpu.pc());
            StepResult::BreakpointHit
        } else {
            StepResult::Stepped
        }
    }

    fn run_sound(&mut self, consumed: u64) {
        let queued = self.audio.queued_bytes();
        let target = self.config.audio_buffer_bytes;
        let band = QueueBand::classify(queued, target);
        self.stats.record(band);

        let sound = &mut self.mmu.chips_mut().sound;
        if let Some(recorder) = self.recorder.as_mut() {
            run_device(&mut **sound, self.cpu_to_sound.clock(consumed));
            let mut failed = None;
            while let Some(sample) = sound.record_buffer_pop() {
                if let Err(e) = recorder.push(sample) {
                    failed = Some(e);
                    break;
                }
            }
            if let Some(e) = failed {
                warn!("recording stopped: {e}");
                self.recorder = None;
            }
        } else if let Retiming::Run(rate) = band.retiming() {
            run_device(&mut **sound, self.cpu_to_sound.clock_scaled(consumed, rate));
        }

        if audio::ready_to_start(queued, target) {
            self.audio.start();
        }
    }

    fn advance_frame(&mut self, consumed: u64) {
        if self.frame.advance(consumed) {
            let blitter = &mut self.mmu.chips_mut().blitter;
            blitter.notify_screen_refreshed();
            while blitter.run_next_operation() {}
        }
    }

    /// Reset every component and the CPU.
    pub fn reset(&mut self) {
        info!("system reset");
        self.cpu_cycle_balance = 0;
        self.frame.reset();
        self.stats.reset();
        self.cpu_to_sound.reset();

        self.mmu.reset();
        let chips = self.mmu.chips_mut();
        chips.sound.reset();
        chips.blitter.reset();
        chips.timer.reset();
        chips.cia.reset();

        self.cpu.reset(&mut self.mmu);
        self.cpu.set_clock(0);
        info!("rom: {}", self.mmu.rom_source());
    }

    /// True once after each frame boundary.
    pub fn frame_done(&mut self) -> bool {
        self.frame.frame_done()
    }

    /// CPU cycles accumulated in the current frame.
    #[must_use]
    pub fn frame_cycles(&self) -> i64 {
        self.frame.cycles()
    }

    #[must_use]
    pub fn cycles_per_frame(&self) -> u32 {
        self.frame.cycles_per_frame()
    }

    /// Requested cycles not yet executed. Negative after an overshoot.
    #[must_use]
    pub fn cpu_cycle_balance(&self) -> i64 {
        self.cpu_cycle_balance
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn flip_modes(&mut self) {
        self.mode = match self.mode {
            Mode::Running => Mode::Paused,
            Mode::Paused => Mode::Running,
        };
    }

    pub fn pause(&mut self) {
        self.mode = Mode::Paused;
    }

    /// Start or stop recording sound to a WAV file.
    ///
    /// Returns whether recording is active afterwards.
    pub fn toggle_recording(&mut self) -> Result<bool> {
        if let Some(recorder) = self.recorder.take() {
            recorder.finalize()?;
            Ok(false)
        } else {
            let recorder =
                WavRecorder::create(&self.config.recording_dir, self.config.sample_rate)?;
            self.mmu.chips_mut().sound.clear_record_buffer();
            self.recorder = Some(recorder);
            Ok(true)
        }
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    /// False if an underrun or overrun happened since the previous call.
    pub fn buffer_within_specs(&mut self) -> bool {
        self.stats.within_specs()
    }

    #[must_use]
    pub fn audio_stats(&self) -> &AudioStats {
        &self.stats
    }

    #[must_use]
    pub fn cpu(&self) -> &C {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut C {
        &mut self.cpu
    }

    #[must_use]
    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    pub fn mmu_mut(&mut self) -> &mut Mmu {
        &mut self.mmu
    }

    #[must_use]
    pub fn encoder(&self) -> &SharedEncoder {
        &self.encoder
    }

    #[must_use]
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }
}

/// Run `device` for a cycle count that may not fit its `u32` interface.
fn run_device<D: Device + ?Sized>(device: &mut D, mut cycles: u64) {
    while cycles > u64::from(u32::MAX) {
        device.run(u32::MAX);
        cycles -= u64::from(u32::MAX);
    }
    device.run(cycles as u32);
}

impl<C: M68kCore> Drop for Machine<C> {
    fn drop(&mut self) {
        self.stats.log_summary();
        if let Some(recorder) = self.recorder.take() {
            if let Err(e) = recorder.finalize() {
                warn!("cannot finish recording: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestMachine, test_machine};

    fn machine() -> TestMachine {
        test_machine(MachineConfig::default()).expect("machine")
    }

    #[test]
    fn reset_fetches_vectors_through_the_bus() {
        let t = machine();
        assert_eq!(t.machine.cpu().pc(), 0x02_0008);
        assert_eq!(t.machine.cpu().ssp(), 0x0010_0000);
        assert_eq!(t.machine.cpu().clock(), 0);
    }

    #[test]
    fn run_zero_single_steps() {
        let mut t = machine();
        let _ = t.machine.run(0);
        assert_eq!(t.machine.cpu().instructions(), 1);
        assert_eq!(t.machine.cpu_cycle_balance(), -4);
        // The overshoot is paid back by the next request
        let _ = t.machine.run(8);
        assert_eq!(t.machine.cpu().clock(), 8);
        assert_eq!(t.machine.cpu_cycle_balance(), 0);
    }

    #[test]
    fn mode_toggles() {
        let mut t = machine();
        assert_eq!(t.machine.mode(), Mode::Running);
        t.machine.flip_modes();
        assert_eq!(t.machine.mode(), Mode::Paused);
        t.machine.flip_modes();
        assert_eq!(t.machine.mode(), Mode::Running);
        t.machine.pause();
        t.machine.pause();
        assert_eq!(t.machine.mode(), Mode::Paused);
    }

    #[test]
    fn cpu_ipl_follows_the_encoder() {
        let mut t = machine();
        let line = crate::encoder::IrqLine::connect(t.machine.encoder(), 5).expect("connect");
        let _ = t.machine.run(0);
        line.pull();
        assert_eq!(t.machine.cpu().ipl(), 5);
        let _ = t.machine.run(0);
        line.release();
        assert_eq!(t.machine.cpu().ipl(), 0);
        let _ = t.machine.run(0);
        assert_eq!(t.machine.cpu().ipl_log(), &[0, 5, 0]);
    }

    #[test]
    fn rom_file_is_loaded_by_the_first_reset() {
        let path =
            std::env::temp_dir().join(format!("e64-machine-rom-{}.bin", std::process::id()));
        std::fs::write(&path, vec![0u8; crate::rom::ROM_SIZE]).expect("write rom");
        let config = MachineConfig {
            rom_path: Some(path.clone()),
            ..MachineConfig::default()
        };
        let t = test_machine(config).expect("machine");
        let _ = std::fs::remove_file(&path);
        assert_eq!(
            *t.machine.mmu().rom_source(),
            crate::rom::RomSource::File(path)
        );
        assert_eq!(t.machine.cpu().pc(), 0);
    }
}
