//! `NMI`/`INT` sampling at instruction boundaries: the `EI`-deferred rule,
//! edge- vs level-sensitivity, `HALT` wake-up, and the IM 0/1/2 acceptance
//! sequences themselves.

mod common;

use common::Harness;
use zace::Pins;

#[test]
fn ei_defers_acceptance_until_after_the_next_instruction() {
    let mut h = Harness::new(&[0xFB, 0x00, 0x00]); // EI, NOP, NOP
    h.cpu.sp = 0x8000;
    let pins = h.cpu.init();
    h.cpu.iff1 = false;
    h.cpu.iff2 = false;
    h.cpu.im = 1;

    let (pins, ei_ticks) = h.run_until_done(pins.with_int(true));
    assert_eq!(ei_ticks, 4, "EI itself takes one M1, no extra cycles");
    assert!(h.cpu.iff1);
    assert_eq!(h.cpu.pc, 1, "the pending INT must not divert EI's own fetch");

    let (_, nop_and_accept_ticks) = h.run_until_done(pins.with_int(true));
    assert_eq!(nop_and_accept_ticks, 17, "NOP (4T) plus the IM1 accept (13T)");
    assert_eq!(h.cpu.pc, 0x0038);
    assert_eq!(h.cpu.sp, 0x7FFE);
    assert!(!h.cpu.iff1);
    assert!(!h.cpu.iff2);
}

#[test]
fn halt_refetches_in_place_until_an_interrupt_wakes_it() {
    let mut h = Harness::new(&[]);
    h.mem[0x0100] = 0x76; // HALT
    h.cpu.sp = 0x8000;
    let pins = h.cpu.init();
    h.cpu.pc = 0x0100;
    h.cpu.iff1 = true;
    h.cpu.iff2 = true;
    h.cpu.im = 1;

    let (pins, halt_ticks) = h.run_until_done(pins);
    assert_eq!(halt_ticks, 4);
    assert!(h.cpu.halted);
    assert_eq!(h.cpu.pc, 0x0101);

    // Re-fetch with no interrupt pending: halted, PC unmoved.
    let (pins, refetch_ticks) = h.run_until_done(pins);
    assert_eq!(refetch_ticks, 4);
    assert!(h.cpu.halted);
    assert_eq!(h.cpu.pc, 0x0101);

    let pc_before_wake = h.cpu.pc;
    let (_, wake_ticks) = h.run_until_done(pins.with_int(true));
    assert_eq!(wake_ticks, 4 + 13);
    assert!(!h.cpu.halted);
    assert_eq!(h.cpu.pc, 0x0038);
    // The return address pushed is the address right after `HALT`, which
    // `finish_fetch` already advanced `PC` to before the CPU ever halted.
    assert_eq!(h.mem[0x7FFE], (pc_before_wake & 0xFF) as u8);
    assert_eq!(h.mem[0x7FFF], (pc_before_wake >> 8) as u8);
}

#[test]
fn nmi_is_only_accepted_on_the_rising_edge() {
    let mut h = Harness::new(&[0x00, 0x00]); // NOP, NOP
    h.cpu.sp = 0x8000;
    h.mem[0x0066] = 0x00; // NOP at the NMI landing pad
    let pins = h.cpu.init();

    let (pins, _) = h.run_until_done(pins); // baseline NOP, NMI low throughout

    let (pins, accept_ticks) = h.run_until_done(pins.with_nmi(true));
    assert_eq!(accept_ticks, 4 + 11, "NOP fetch plus the 11T NMI sequence");
    assert_eq!(h.cpu.pc, 0x0066);
    assert_eq!(h.cpu.sp, 0x7FFE);

    // NMI is still held high: held level, not a new edge, must not re-fire.
    let (_, second_ticks) = h.run_until_done(pins.with_nmi(true));
    assert_eq!(second_ticks, 4);
    assert_eq!(h.cpu.pc, 0x0067);
    assert_eq!(h.cpu.sp, 0x7FFE);
}

#[test]
fn im2_accept_reads_a_vector_through_the_i_register_table() {
    let mut h = Harness::new(&[0x00]); // NOP
    h.cpu.sp = 0x8000;
    h.int_vector = 0x10;
    h.mem[0x2010] = 0x00;
    h.mem[0x2011] = 0x90;
    let pins = h.cpu.init();
    h.cpu.iff1 = true;
    h.cpu.im = 2;
    h.cpu.i = 0x20;

    let (pins, _) = h.run_until_done(pins); // baseline NOP
    let (_, ticks) = h.run_until_done(pins.with_int(true));

    assert_eq!(ticks, 4 + 19);
    assert_eq!(h.cpu.pc, 0x9000);
    assert_eq!(h.cpu.wz, 0x9000);
    assert_eq!(h.cpu.sp, 0x7FFE);
}

#[test]
fn im0_accept_narrows_the_device_byte_to_an_rst_target() {
    let mut h = Harness::new(&[0x00]); // NOP
    h.cpu.sp = 0x8000;
    h.int_vector = 0xD7; // RST 10h encoding; low 6 bits narrow to 0x10
    let pins = h.cpu.init();
    h.cpu.iff1 = true;
    h.cpu.im = 0;

    let (pins, _) = h.run_until_done(pins);
    let (_, ticks) = h.run_until_done(pins.with_int(true));

    assert_eq!(ticks, 4 + 13);
    assert_eq!(h.cpu.pc, 0x0010);
}

#[test]
fn reti_pulses_the_daisy_chain_pin_for_one_tick() {
    let mut h = Harness::new(&[0xED, 0x4D]); // RETI
    h.cpu.sp = 0x8000;
    h.mem[0x8000] = 0x00;
    h.mem[0x8001] = 0x40;
    let pins = h.cpu.init();

    let mut pulses = 0u32;
    let (_, ticks) = h.run_until_done_observing(pins, |_, out: Pins| {
        if out.reti() {
            pulses += 1;
        }
    });

    assert_eq!(pulses, 1);
    assert_eq!(h.cpu.pc, 0x4000);
    assert_eq!(ticks, 4 + 4 + 3 + 3);
}
