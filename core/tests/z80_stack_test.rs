use mark3_core::cpu::z80::Z80;
mod common;
use common::{TestBus, step};

#[test]
fn test_push_pop_roundtrip() {
    let mut cpu = Z80::new();
    let mut bus = TestBus::new();
    cpu.sp = 0x1000;
    cpu.set_bc(0x1234);
    bus.load(0, &[0xC5, 0xD1]); // PUSH BC; POP DE

    assert_eq!(step(&mut cpu, &mut bus), 11);
    assert_eq!(cpu.sp, 0x0FFE);
    assert_eq!(bus.memory[0x0FFE], 0x34);
    assert_eq!(bus.memory[0x0FFF], 0x12);

    assert_eq!(step(&mut cpu, &mut bus), 10);
    assert_eq!(cpu.sp, 0x1000);
    assert_eq!(cpu.get_de(), 0x1234);
}

#[test]
fn test_push_pop_af() {
    let mut cpu = Z80::new();
    let mut bus = TestBus::new();
    cpu.sp = 0x1000;
    cpu.a = 0xAB;
    cpu.f = 0xCD;
    bus.load(0, &[0xF5, 0xE1]); // PUSH AF; POP HL

    step(&mut cpu, &mut bus);
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.get_hl(), 0xABCD);
}

#[test]
fn test_stack_wraps_at_zero() {
    let mut cpu = Z80::new();
    let mut bus = TestBus::new();
    cpu.sp = 0x0001;
    cpu.set_hl(0x5678);
    bus.load(0, &[0xE5]); // PUSH HL

    step(&mut cpu, &mut bus);
    assert_eq!(cpu.sp, 0xFFFF);
    assert_eq!(bus.memory[0x0000], 0x56);
    assert_eq!(bus.memory[0xFFFF], 0x78);
}
