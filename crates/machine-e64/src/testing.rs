//! Test doubles: a scripted CPU core, recording peripherals and a fixed
//! audio queue.
//!
//! Every peripheral keeps its state behind an `Rc<RefCell<_>>` so tests can
//! inspect it after the device has been boxed into a [`Chipset`]. All devices
//! append to one shared [`Trace`] to make call order observable.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use emu_core::{
    ADDRESS_MASK, Blitter, Bus, Device, FontBank, IplPin, M68kCore, Register, Sound,
};

use crate::audio::AudioQueue;
use crate::config::MachineConfig;
use crate::encoder::{IrqLine, SharedEncoder};
use crate::error::Result;
use crate::machine::Machine;
use crate::mmu::Chipset;

/// Call log shared by all test devices.
pub type Trace = Rc<RefCell<Vec<&'static str>>>;

/// Interrupt level of the test timer.
pub const TIMER_IRQ_LEVEL: u8 = 6;

// --- CPU ---------------------------------------------------------------------

/// A CPU core that fetches one word per instruction and burns a scripted
/// number of cycles.
#[derive(Debug, Clone)]
pub struct ScriptedCore {
    pc: u32,
    d: [u32; 8],
    a: [u32; 8],
    sr: u16,
    usp: u32,
    ssp: u32,
    clock: u64,
    ipl: IplPin,
    cycle_pattern: Vec<u32>,
    step: usize,
    breakpoints: Vec<u32>,
    breakpoint: bool,
    instructions: u64,
    ipl_log: Vec<u8>,
}

impl Default for ScriptedCore {
    fn default() -> Self {
        Self::with_cycles(vec![4])
    }
}

impl ScriptedCore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions take `pattern[0]`, `pattern[1]`, ... cycles, repeating.
    #[must_use]
    pub fn with_cycles(pattern: Vec<u32>) -> Self {
        let cycle_pattern = if pattern.is_empty() { vec![4] } else { pattern };
        Self {
            pc: 0,
            d: [0; 8],
            a: [0; 8],
            sr: 0x2700,
            usp: 0,
            ssp: 0,
            clock: 0,
            ipl: IplPin::new(),
            cycle_pattern,
            step: 0,
            breakpoints: Vec::new(),
            breakpoint: false,
            instructions: 0,
            ipl_log: Vec::new(),
        }
    }

    /// Stop before executing the instruction at `address`.
    pub fn add_breakpoint(&mut self, address: u32) {
        self.breakpoints.push(address & ADDRESS_MASK);
    }

    #[must_use]
    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    /// IPL input seen by each executed instruction.
    #[must_use]
    pub fn ipl_log(&self) -> &[u8] {
        &self.ipl_log
    }

    #[must_use]
    pub fn ssp(&self) -> u32 {
        self.ssp
    }
}

impl M68kCore for ScriptedCore {
    fn execute<B: Bus>(&mut self, bus: &mut B) {
        self.ipl_log.push(self.ipl.get());
        let _opcode = bus.read_16(self.pc);
        self.pc = (self.pc + 2) & ADDRESS_MASK;
        let cycles = self.cycle_pattern[self.step % self.cycle_pattern.len()];
        self.step += 1;
        self.clock += u64::from(cycles);
        self.instructions += 1;
        if self.breakpoints.contains(&self.pc) {
            self.breakpoint = true;
        }
    }

    fn clock(&self) -> u64 {
        self.clock
    }

    fn set_clock(&mut self, cycles: u64) {
        self.clock = cycles;
    }

    fn reset<B: Bus>(&mut self, bus: &mut B) {
        let long = |bus: &mut B, address: u32| {
            (u32::from(bus.read_16(address)) << 16) | u32::from(bus.read_16(address + 2))
        };
        self.ssp = long(bus, 0);
        self.a[7] = self.ssp;
        self.pc = long(bus, 4) & ADDRESS_MASK;
        self.sr = 0x2700;
        self.step = 0;
        self.instructions = 0;
        self.breakpoint = false;
    }

    fn pc(&self) -> u32 {
        self.pc
    }

    fn set_pc(&mut self, pc: u32) {
        self.pc = pc & ADDRESS_MASK;
    }

    fn register(&self, reg: Register) -> u32 {
        match reg {
            Register::D(n) => self.d[usize::from(n & 7)],
            Register::A(n) => self.a[usize::from(n & 7)],
            Register::Sr => u32::from(self.sr),
            Register::Usp => self.usp,
            Register::Ssp => self.ssp,
        }
    }

    fn set_register(&mut self, reg: Register, value: u32) {
        match reg {
            Register::D(n) => self.d[usize::from(n & 7)] = value,
            Register::A(n) => self.a[usize::from(n & 7)] = value,
            Register::Sr => self.sr = value as u16,
            Register::Usp => self.usp = value,
            Register::Ssp => self.ssp = value,
        }
    }

    fn connect_ipl(&mut self, pin: IplPin) {
        self.ipl = pin;
    }

    fn set_ipl(&mut self, level: u8) {
        self.ipl.set(level);
    }

    fn ipl(&self) -> u8 {
        self.ipl.get()
    }

    fn breakpoint_reached(&self) -> bool {
        self.breakpoint
    }

    fn clear_breakpoint(&mut self) {
        self.breakpoint = false;
    }
}

// --- Peripherals -------------------------------------------------------------

/// Register file and call record of a test device.
#[derive(Debug)]
pub struct DeviceState {
    pub registers: Vec<u8>,
    pub reads: Vec<u16>,
    pub writes: Vec<(u16, u8)>,
    pub runs: Vec<u32>,
    pub cycles: u64,
    pub resets: u32,
}

impl DeviceState {
    fn new(size: usize) -> Self {
        Self {
            registers: vec![0; size],
            reads: Vec::new(),
            writes: Vec::new(),
            runs: Vec::new(),
            cycles: 0,
            resets: 0,
        }
    }

    fn read(&mut self, offset: u16) -> u8 {
        self.reads.push(offset);
        self.registers
            .get(usize::from(offset))
            .copied()
            .unwrap_or(0)
    }

    fn write(&mut self, offset: u16, value: u8) {
        self.writes.push((offset, value));
        if let Some(reg) = self.registers.get_mut(usize::from(offset)) {
            *reg = value;
        }
    }

    fn run(&mut self, cycles: u32) {
        self.runs.push(cycles);
        self.cycles += u64::from(cycles);
    }
}

/// A plain register-file device.
pub struct ProbeDevice {
    name: &'static str,
    state: Rc<RefCell<DeviceState>>,
    trace: Trace,
}

impl ProbeDevice {
    #[must_use]
    pub fn new(name: &'static str, trace: &Trace) -> (Self, Rc<RefCell<DeviceState>>) {
        let state = Rc::new(RefCell::new(DeviceState::new(0x100)));
        let device = Self {
            name,
            state: Rc::clone(&state),
            trace: Rc::clone(trace),
        };
        (device, state)
    }
}

impl Device for ProbeDevice {
    fn reset(&mut self) {
        self.state.borrow_mut().resets += 1;
        self.trace.borrow_mut().push(self.name);
    }

    fn run(&mut self, cycles: u32) {
        self.state.borrow_mut().run(cycles);
        self.trace.borrow_mut().push(self.name);
    }

    fn io_read_8(&mut self, offset: u16) -> u8 {
        self.state.borrow_mut().read(offset)
    }

    fn io_write_8(&mut self, offset: u16, value: u8) {
        self.state.borrow_mut().write(offset, value);
    }
}

#[derive(Debug, Default)]
pub struct TimerState {
    /// Cycles between timer 0 interrupts. `None` stops the timer.
    pub period: Option<u32>,
    pub counter: u32,
    /// Pending interrupt bits, one per timer.
    pub pending: u8,
    pub writes: Vec<(u16, u8)>,
    pub cycles: u64,
    pub resets: u32,
}

/// A timer with one periodic channel (bit 0).
///
/// Register 0 reads the pending bits; writing a bit there acknowledges it.
/// The interrupt line is held while any bit is pending.
pub struct TestTimer {
    state: Rc<RefCell<TimerState>>,
    irq: Option<IrqLine>,
    trace: Trace,
}

impl TestTimer {
    #[must_use]
    pub fn new(irq: Option<IrqLine>, trace: &Trace) -> (Self, Rc<RefCell<TimerState>>) {
        let state = Rc::new(RefCell::new(TimerState::default()));
        let timer = Self {
            state: Rc::clone(&state),
            irq,
            trace: Rc::clone(trace),
        };
        (timer, state)
    }

    fn update_line(&self, pending: u8) {
        if let Some(irq) = &self.irq {
            if pending != 0 {
                irq.pull();
            } else {
                irq.release();
            }
        }
    }
}

impl Device for TestTimer {
    fn reset(&mut self) {
        {
            let mut state = self.state.borrow_mut();
            state.counter = 0;
            state.pending = 0;
            state.resets += 1;
        }
        self.update_line(0);
        self.trace.borrow_mut().push("timer");
    }

    fn run(&mut self, cycles: u32) {
        let pending = {
            let mut state = self.state.borrow_mut();
            state.cycles += u64::from(cycles);
            if let Some(period) = state.period.filter(|&p| p > 0) {
                state.counter += cycles;
                while state.counter >= period {
                    state.counter -= period;
                    state.pending |= 1;
                }
            }
            state.pending
        };
        self.update_line(pending);
        self.trace.borrow_mut().push("timer");
    }

    fn io_read_8(&mut self, offset: u16) -> u8 {
        if offset == 0 { self.state.borrow().pending } else { 0 }
    }

    fn io_write_8(&mut self, offset: u16, value: u8) {
        let pending = {
            let mut state = self.state.borrow_mut();
            state.writes.push((offset, value));
            if offset == 0 {
                state.pending &= !value;
            }
            state.pending
        };
        self.update_line(pending);
    }
}

#[derive(Debug)]
pub struct BlitterState {
    pub io: DeviceState,
    pub memory: HashMap<u32, u8>,
    pub memory_writes: usize,
    pub contexts: Vec<u8>,
    /// Operations queued at each screen refresh.
    pub ops_per_frame: u32,
    pub queued_ops: u32,
    pub ops_run: u32,
    pub refreshes: u32,
}

impl BlitterState {
    #[must_use]
    pub fn memory_at(&self, address: u32) -> u8 {
        self.memory
            .get(&(address & ADDRESS_MASK))
            .copied()
            .unwrap_or(0)
    }

    /// Deterministic font contents.
    #[must_use]
    pub fn font_entry(&self, bank: FontBank, index: u16) -> u16 {
        match bank {
            FontBank::Cbm => index ^ 0xA55A,
            FontBank::Amiga => index.rotate_left(4) ^ 0x0F0F,
        }
    }
}

/// A blitter with sparse video memory and a counting operation queue.
pub struct RamBlitter {
    state: Rc<RefCell<BlitterState>>,
    trace: Trace,
}

impl RamBlitter {
    #[must_use]
    pub fn new(trace: &Trace) -> (Self, Rc<RefCell<BlitterState>>) {
        let state = Rc::new(RefCell::new(BlitterState {
            io: DeviceState::new(0x100),
            memory: HashMap::new(),
            memory_writes: 0,
            contexts: vec![0; 0x1_0000],
            ops_per_frame: 0,
            queued_ops: 0,
            ops_run: 0,
            refreshes: 0,
        }));
        let blitter = Self {
            state: Rc::clone(&state),
            trace: Rc::clone(trace),
        };
        (blitter, state)
    }
}

impl Device for RamBlitter {
    fn reset(&mut self) {
        let mut state = self.state.borrow_mut();
        state.io.resets += 1;
        state.queued_ops = 0;
        self.trace.borrow_mut().push("blitter");
    }

    fn run(&mut self, cycles: u32) {
        self.state.borrow_mut().io.run(cycles);
    }

    fn io_read_8(&mut self, offset: u16) -> u8 {
        self.state.borrow_mut().io.read(offset)
    }

    fn io_write_8(&mut self, offset: u16, value: u8) {
        self.state.borrow_mut().io.write(offset, value);
    }
}

impl Blitter for RamBlitter {
    fn video_memory_read_8(&mut self, address: u32) -> u8 {
        self.state.borrow().memory_at(address)
    }

    fn video_memory_write_8(&mut self, address: u32, value: u8) {
        let mut state = self.state.borrow_mut();
        state.memory.insert(address & ADDRESS_MASK, value);
        state.memory_writes += 1;
    }

    fn blit_context_read_8(&mut self, offset: u16) -> u8 {
        self.state.borrow().contexts[usize::from(offset)]
    }

    fn blit_context_write_8(&mut self, offset: u16, value: u8) {
        self.state.borrow_mut().contexts[usize::from(offset)] = value;
    }

    fn font_entry(&self, bank: FontBank, index: u16) -> u16 {
        self.state.borrow().font_entry(bank, index)
    }

    fn notify_screen_refreshed(&mut self) {
        let mut state = self.state.borrow_mut();
        state.refreshes += 1;
        state.queued_ops += state.ops_per_frame;
        self.trace.borrow_mut().push("blitter:refresh");
    }

    fn run_next_operation(&mut self) -> bool {
        let mut state = self.state.borrow_mut();
        if state.queued_ops == 0 {
            return false;
        }
        state.queued_ops -= 1;
        state.ops_run += 1;
        self.trace.borrow_mut().push("blitter:op");
        true
    }
}

#[derive(Debug)]
pub struct SoundState {
    pub io: DeviceState,
    pub record_buffer: VecDeque<f32>,
    pub clears: u32,
}

/// A sound chip producing one sample per non-empty run.
pub struct RecordingSound {
    state: Rc<RefCell<SoundState>>,
    trace: Trace,
}

impl RecordingSound {
    #[must_use]
    pub fn new(trace: &Trace) -> (Self, Rc<RefCell<SoundState>>) {
        let state = Rc::new(RefCell::new(SoundState {
            io: DeviceState::new(0x400),
            record_buffer: VecDeque::new(),
            clears: 0,
        }));
        let sound = Self {
            state: Rc::clone(&state),
            trace: Rc::clone(trace),
        };
        (sound, state)
    }
}

impl Device for RecordingSound {
    fn reset(&mut self) {
        let mut state = self.state.borrow_mut();
        state.io.resets += 1;
        self.trace.borrow_mut().push("sound");
    }

    fn run(&mut self, cycles: u32) {
        let mut state = self.state.borrow_mut();
        state.io.run(cycles);
        if cycles > 0 {
            let sample = (cycles as f32 / 1000.0).min(1.0);
            state.record_buffer.push_back(sample);
        }
        self.trace.borrow_mut().push("sound");
    }

    fn io_read_8(&mut self, offset: u16) -> u8 {
        self.state.borrow_mut().io.read(offset)
    }

    fn io_write_8(&mut self, offset: u16, value: u8) {
        self.state.borrow_mut().io.write(offset, value);
    }
}

impl Sound for RecordingSound {
    fn record_buffer_pop(&mut self) -> Option<f32> {
        self.state.borrow_mut().record_buffer.pop_front()
    }

    fn clear_record_buffer(&mut self) {
        let mut state = self.state.borrow_mut();
        state.record_buffer.clear();
        state.clears += 1;
    }
}

// --- Audio -------------------------------------------------------------------

/// Audio queue whose occupancy is set by the test. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FixedAudioQueue {
    queued: Rc<Cell<usize>>,
    starts: Rc<Cell<u32>>,
}

impl FixedAudioQueue {
    #[must_use]
    pub fn new(queued: usize) -> Self {
        let queue = Self::default();
        queue.set_queued(queued);
        queue
    }

    pub fn set_queued(&self, bytes: usize) {
        self.queued.set(bytes);
    }

    /// Number of `start` calls.
    #[must_use]
    pub fn starts(&self) -> u32 {
        self.starts.get()
    }
}

impl AudioQueue for FixedAudioQueue {
    fn queued_bytes(&self) -> usize {
        self.queued.get()
    }

    fn start(&mut self) {
        self.starts.set(self.starts.get() + 1);
    }
}

// --- Assembly ----------------------------------------------------------------

/// Handles to the state of every device in a test chipset.
pub struct Probes {
    pub trace: Trace,
    pub blitter: Rc<RefCell<BlitterState>>,
    pub timer: Rc<RefCell<TimerState>>,
    pub cia: Rc<RefCell<DeviceState>>,
    pub sound: Rc<RefCell<SoundState>>,
}

/// Build a chipset of test devices. The timer's line is registered on
/// `encoder` at [`TIMER_IRQ_LEVEL`].
pub fn test_chipset(encoder: &SharedEncoder) -> Result<(Chipset, Probes)> {
    let trace = Trace::default();
    let (blitter, blitter_state) = RamBlitter::new(&trace);
    let irq = IrqLine::connect(encoder, TIMER_IRQ_LEVEL)?;
    let (timer, timer_state) = TestTimer::new(Some(irq), &trace);
    let (cia, cia_state) = ProbeDevice::new("cia", &trace);
    let (sound, sound_state) = RecordingSound::new(&trace);

    let chips = Chipset {
        blitter: Box::new(blitter),
        timer: Box::new(timer),
        cia: Box::new(cia),
        sound: Box::new(sound),
    };
    let probes = Probes {
        trace,
        blitter: blitter_state,
        timer: timer_state,
        cia: cia_state,
        sound: sound_state,
    };
    Ok((chips, probes))
}

pub struct TestMachine {
    pub machine: Machine<ScriptedCore>,
    pub probes: Probes,
    pub audio: FixedAudioQueue,
}

/// A machine with a 4-cycle scripted core and the queue at its target size.
pub fn test_machine(config: MachineConfig) -> Result<TestMachine> {
    test_machine_with_core(ScriptedCore::new(), config)
}

pub fn test_machine_with_core(core: ScriptedCore, config: MachineConfig) -> Result<TestMachine> {
    let encoder = crate::encoder::PriorityEncoder::shared();
    let (chips, probes) = test_chipset(&encoder)?;
    let audio = FixedAudioQueue::new(config.audio_buffer_bytes);
    let machine = Machine::new(core, chips, encoder, Box::new(audio.clone()), config);
    Ok(TestMachine {
        machine,
        probes,
        audio,
    })
}
