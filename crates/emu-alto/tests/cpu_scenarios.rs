//! Machine-level scenarios driving hand-assembled microcode.

use emu_alto::microcode::{
    ALU_BUS, BS_NONE, BS_READ_MD, BS_READ_R, F1_BLOCK, F1_LOAD_MAR, F1_TASK, F2_EMU_LOAD_IR,
    TASK_EMULATOR, assemble,
};
use emu_alto::{Alto, AltoConfig, CpuError, MemTransport, SystemType};

fn machine() -> Alto {
    let (transport, _peer) = MemTransport::pair();
    Alto::new(&AltoConfig::blank(SystemType::AltoII3KRam), Box::new(transport)).expect("machine")
}

#[test]
fn reset_and_single_nop_cycle() {
    let mut alto = machine();
    alto.step().expect("step");

    assert_eq!(alto.cpu.cycle, 1);
    assert_eq!(alto.cpu.ctask, 0);
    assert_eq!(alto.cpu.mpc, 0);
    assert_eq!(alto.cpu.mir, 0);
    assert_eq!(alto.cpu.pending, 1 << TASK_EMULATOR);
    assert_eq!(alto.cpu.t, 0);
    assert_eq!(alto.cpu.l, 0);
    assert!(alto.cpu.r.iter().all(|&r| r == 0));
}

#[test]
fn load_mar_then_read_md_drains_the_pair() {
    let mut alto = machine();
    alto.bus.mem.ram_write(0, 0o100, 0xAAAA);
    alto.bus.mem.ram_write(0, 0o101, 0x5555);
    alto.cpu.r[1] = 0o100;

    // 0: MAR<- R1;  1: T<- MD;  2: T<- MD
    alto.cpu.microcode[0] = assemble(1, ALU_BUS, BS_READ_R, F1_LOAD_MAR, 0, false, false, 1);
    alto.cpu.microcode[1] = assemble(0, ALU_BUS, BS_READ_MD, 0, 0, true, false, 2);
    alto.cpu.microcode[2] = assemble(0, ALU_BUS, BS_READ_MD, 0, 0, true, false, 3);

    alto.step().expect("pipeline fill"); // reset NOP, fetches word 0
    alto.step().expect("MAR load");
    assert_eq!(alto.bus.mem.mem_low, 0xAAAA);
    assert_eq!(alto.bus.mem.mem_high, 0x5555);

    alto.step().expect("first MD read");
    assert_eq!(alto.cpu.t, 0xAAAA);
    alto.step().expect("second MD read");
    assert_eq!(alto.cpu.t, 0x5555);
}

#[test]
fn alto_i_pairs_downward() {
    let (transport, _peer) = MemTransport::pair();
    let mut alto = Alto::new(&AltoConfig::blank(SystemType::AltoI), Box::new(transport))
        .expect("machine");
    alto.bus.mem.ram_write(0, 0o101, 0x1234);
    alto.bus.mem.ram_write(0, 0o100, 0x4321);
    alto.cpu.r[1] = 0o101;
    alto.cpu.microcode[0] = assemble(1, ALU_BUS, BS_READ_R, F1_LOAD_MAR, 0, false, false, 1);
    alto.step().expect("fill");
    alto.step().expect("MAR load");
    // addr | 1: 0o101 pairs with itself.
    assert_eq!(alto.bus.mem.mem_low, 0x1234);
    assert_eq!(alto.bus.mem.mem_high, 0x1234);
}

#[test]
fn task_function_picks_the_highest_pending() {
    let mut alto = machine();
    alto.cpu.pending |= (1 << 4) | (1 << 9);
    alto.cpu.mir = assemble(0, ALU_BUS, BS_NONE, F1_TASK, 0, false, false, 0);
    alto.step().expect("step");
    assert_eq!(alto.cpu.ntask, 9);
    assert_eq!(alto.cpu.ctask, 9);
    assert!(alto.cpu.task_switch);
}

#[test]
fn emulator_block_is_a_sticky_fault() {
    let mut alto = machine();
    alto.cpu.mir = assemble(0, ALU_BUS, BS_NONE, F1_BLOCK, 0, false, false, 0);
    let before_cycle = alto.cpu.cycle;
    let before_pending = alto.cpu.pending;

    let err = alto.step().expect_err("block must fault");
    assert!(matches!(err, CpuError::EmulatorBlocked { .. }));
    // State untouched by the faulting instruction.
    assert_eq!(alto.cpu.cycle, before_cycle);
    assert_eq!(alto.cpu.pending, before_pending);

    // Sticky until reset.
    assert!(alto.step().is_err());
    alto.reset();
    assert!(alto.step().is_ok());
}

#[test]
fn load_ir_merges_dispatch_bits_into_next() {
    let mut alto = machine();
    // IR<- from R3; the NEXT merge picks up bus bit 0 and bits 5-7.
    alto.cpu.r[3] = 0x8700;
    alto.cpu.skip = true;
    alto.cpu.mir = assemble(3, ALU_BUS, BS_READ_R, 0, F2_EMU_LOAD_IR, false, false, 0);
    alto.step().expect("step");
    assert_eq!(alto.cpu.ir, 0x8700);
    assert!(!alto.cpu.skip, "IR<- clears skip");
    // 0x8000>>12 = 8, (0x8700>>8)&7 = 7.
    assert_eq!(alto.cpu.task_mpc[0], 0x000F);
}

#[test]
fn wired_and_with_the_constant_rom() {
    let (transport, _peer) = MemTransport::pair();
    let mut config = AltoConfig::blank(SystemType::AltoII3KRam);
    // Constant at address (RSEL 0).(BS 4) = 4.
    config.constant_rom[8] = 0xF0;
    config.constant_rom[9] = 0x0F;
    let mut alto = Alto::new(&config, Box::new(transport)).expect("machine");

    // BS 4 in the emulator drives nothing (reads as all ones), so the
    // wired-AND leaves exactly the constant on the bus.
    alto.cpu.mir = assemble(0, ALU_BUS, 4, 0, 0, true, false, 0);
    alto.step().expect("step");
    assert_eq!(alto.cpu.t, 0x0FF0);
}
