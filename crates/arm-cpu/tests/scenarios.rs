//! End-to-end instruction scenarios driven through `Cpu::step`, covering
//! the flag-setting cases the inline unit tests in `cpu.rs` don't already
//! exercise (signed overflow, subtraction carry/borrow).

use arm_cpu::cpu::Cpu;
use arm_cpu::host_io::SearchPath;
use sim_core::registers::PC;
use sim_core::{flags, Machine};

const BASE: u32 = 0x1000;

fn cpu_with_ram() -> Cpu {
    let mut m = Machine::new();
    m.set_journal_disabled(true);
    m.memory_mut().register_region("ram", BASE, 0x1000).unwrap();
    m.write_register(PC, BASE);
    m.set_journal_disabled(false);
    Cpu::new(m, SearchPath::new("."), BASE + 0x8000)
}

fn store(cpu: &mut Cpu, addr: u32, word: u32) {
    cpu.machine.memory_mut().store_word(addr, word);
}

#[test]
fn s2_signed_overflow() {
    let mut cpu = cpu_with_ram();
    cpu.machine.set_journal_disabled(true);
    cpu.machine.write_register(0, 0x7FFF_FFFF);
    cpu.machine.write_register(1, 1);
    cpu.machine.set_journal_disabled(false);

    store(&mut cpu, BASE, 0xE090_0001); // ADDS r0, r0, r1
    cpu.step().unwrap();

    assert_eq!(cpu.machine.registers().get(0), 0x8000_0000);
    let f = cpu.machine.registers().get(16);
    assert!(flags::is_set(f, flags::N));
    assert!(!flags::is_set(f, flags::Z));
    assert!(flags::is_set(f, flags::V));
    assert!(!flags::is_set(f, flags::C));
}

#[test]
fn s3_subtraction_sets_carry_correctly() {
    let mut cpu = cpu_with_ram();
    cpu.machine.set_journal_disabled(true);
    cpu.machine.write_register(0, 5);
    cpu.machine.write_register(1, 3);
    cpu.machine.set_journal_disabled(false);

    store(&mut cpu, BASE, 0xE050_0001); // SUBS r0, r0, r1
    cpu.step().unwrap();

    assert_eq!(cpu.machine.registers().get(0), 2);
    let f = cpu.machine.registers().get(16);
    assert!(!flags::is_set(f, flags::N));
    assert!(!flags::is_set(f, flags::Z));
    assert!(!flags::is_set(f, flags::V));
    assert!(flags::is_set(f, flags::C));

    cpu.machine.set_journal_disabled(true);
    cpu.machine.write_register(0, 3);
    cpu.machine.write_register(1, 5);
    cpu.machine.write_register(PC, BASE);
    cpu.machine.set_journal_disabled(false);

    cpu.step().unwrap();

    assert_eq!(cpu.machine.registers().get(0), 0xFFFF_FFFE);
    let f = cpu.machine.registers().get(16);
    assert!(flags::is_set(f, flags::N));
    assert!(!flags::is_set(f, flags::Z));
    assert!(!flags::is_set(f, flags::V));
    assert!(!flags::is_set(f, flags::C));
}
