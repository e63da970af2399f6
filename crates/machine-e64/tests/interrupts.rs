mod common;

use emu_core::{Bus, M68kCore};
use machine_e64::testing::{TIMER_IRQ_LEVEL, test_machine};
use machine_e64::{IrqLine, MachineConfig};

#[test]
fn timer_interrupt_reaches_cpu_on_next_instruction() {
    common::init_logging();
    let mut t = test_machine(MachineConfig::default()).expect("machine");
    t.probes.timer.borrow_mut().period = Some(10);

    // 4 cycles per instruction: the timer fires during the third
    for _ in 0..4 {
        let _ = t.machine.run(0);
    }
    assert_eq!(t.machine.encoder().borrow().level(), TIMER_IRQ_LEVEL);

    assert_eq!(t.machine.cpu().ipl(), TIMER_IRQ_LEVEL);

    // Acknowledge through the timer's I/O page
    t.machine.mmu_mut().write_8(0x00_0900, 0x01);
    assert_eq!(t.machine.encoder().borrow().level(), 0);
    assert_eq!(t.machine.cpu().ipl(), 0);

    let _ = t.machine.run(0);
    assert_eq!(t.machine.cpu().ipl_log(), &[0, 0, 0, TIMER_IRQ_LEVEL, 0]);
}

#[test]
fn highest_device_wins_until_released() {
    let mut t = test_machine(MachineConfig::default()).expect("machine");
    let blitter = IrqLine::connect(t.machine.encoder(), 4).expect("connect");
    let cia = IrqLine::connect(t.machine.encoder(), 2).expect("connect");

    cia.pull();
    assert_eq!(t.machine.cpu().ipl(), 2);
    let _ = t.machine.run(0);
    blitter.pull();
    assert_eq!(t.machine.cpu().ipl(), 4);
    let _ = t.machine.run(0);
    blitter.release();
    let _ = t.machine.run(0);
    cia.release();
    let _ = t.machine.run(0);

    assert_eq!(t.machine.cpu().ipl_log(), &[2, 4, 2, 0]);
}

#[test]
fn device_handles_follow_registration_order() {
    let t = test_machine(MachineConfig::default()).expect("machine");
    // The test chipset's timer holds handle 0
    let lines: Vec<IrqLine> = (1..=5)
        .map(|level| IrqLine::connect(t.machine.encoder(), level).expect("connect"))
        .collect();
    let handles: Vec<usize> = lines.iter().map(|line| line.handle().index()).collect();
    assert_eq!(handles, vec![1, 2, 3, 4, 5]);
    assert_eq!(t.machine.encoder().borrow().line_count(), 6);
}

#[test]
fn cia_runs_before_timer_after_every_instruction() {
    let mut t = test_machine(MachineConfig::default()).expect("machine");
    t.probes.trace.borrow_mut().clear();
    let _ = t.machine.run(8);
    assert_eq!(
        *t.probes.trace.borrow(),
        vec!["cia", "timer", "cia", "timer", "sound"]
    );
    assert_eq!(t.probes.cia.borrow().runs, vec![4, 4]);
}
