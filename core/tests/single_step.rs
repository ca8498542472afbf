//! Single-step-style fixtures: set up a CPU to match a literal `initial`
//! state, run exactly one instruction, and diff against the literal `final`
//! state. Mirrors the shape of the public `SingleStepTests`/z80 test data,
//! but the fixtures themselves are inlined as JSON strings rather than read
//! from an external submodule, since that submodule isn't available here.

mod common;

use common::Harness;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, BoolFromInt};
use zace::Z80;

macro_rules! single_step_test_opcodes {
    ($($opcode:literal),+ $(,)?) => {
        $(
            paste::paste! {
                #[test]
                fn [<single_step_opcode_ $opcode>]() {
                    test_opcode($opcode);
                }
            }
        )+
    };
}

single_step_test_opcodes! {
    "00", "3e", "80",
}

fn test_opcode(opcode: &str) {
    let cases = load_cases(opcode);

    for case in cases {
        let mut harness = Harness::new(&[]);
        let pins = harness.cpu.init();
        case.initial.apply_to(&mut harness);
        harness.run_until_done(pins);

        let actual = State::capture(&harness.cpu, &harness.mem, &case.final_state.ram);

        assert_eq!(
            case.final_state, actual,
            "opcode {opcode} case {:?}\n  initial: {:?}\n  expected: {:?}\n  actual:   {:?}",
            case.name, case.initial, case.final_state, actual,
        );
    }
}

/// Each opcode's literal fixture JSON, keyed by the same two-hex-digit name
/// the real `SingleStepTests` corpus uses per file.
fn load_cases(opcode: &str) -> Vec<SingleStepCase> {
    let json = match opcode {
        "00" => NOP_FIXTURE,
        "3e" => LD_A_N_FIXTURE,
        "80" => ADD_A_B_FIXTURE,
        other => panic!("no inline fixture for opcode {other}"),
    };
    serde_json::from_str(json).unwrap_or_else(|e| panic!("malformed fixture for {opcode}: {e}"))
}

#[derive(Debug, Deserialize)]
struct SingleStepCase {
    name: String,
    initial: State,
    #[serde(rename = "final")]
    final_state: State,
}

/// The bits of CPU state a single-step fixture cares about. `ram` only ever
/// lists the addresses a given case touches, so capturing `final` state
/// reads back exactly those addresses rather than the whole 64K image.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
struct State {
    pc: u16,
    sp: u16,
    a: u8,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    f: u8,
    h: u8,
    l: u8,
    ix: u16,
    iy: u16,
    i: u8,
    r: u8,
    im: u8,
    #[serde_as(as = "BoolFromInt")]
    iff1: bool,
    #[serde_as(as = "BoolFromInt")]
    iff2: bool,
    ram: Vec<(u16, u8)>,
}

impl State {
    fn apply_to(&self, h: &mut Harness) {
        h.cpu.regs.set_a(self.a);
        h.cpu.regs.set_b(self.b);
        h.cpu.regs.set_c(self.c);
        h.cpu.regs.set_d(self.d);
        h.cpu.regs.set_e(self.e);
        h.cpu.regs.set_f(self.f);
        h.cpu.regs.set_h(self.h);
        h.cpu.regs.set_l(self.l);
        h.cpu.ix_iy.set_ix(self.ix);
        h.cpu.ix_iy.set_iy(self.iy);
        h.cpu.pc = self.pc;
        h.cpu.sp = self.sp;
        h.cpu.i = self.i;
        h.cpu.r = self.r;
        h.cpu.im = self.im;
        h.cpu.iff1 = self.iff1;
        h.cpu.iff2 = self.iff2;

        for &(addr, value) in &self.ram {
            h.mem[addr as usize] = value;
        }
    }

    fn capture(cpu: &Z80, mem: &[u8; 0x1_0000], ram_addrs: &[(u16, u8)]) -> Self {
        Self {
            pc: cpu.pc,
            sp: cpu.sp,
            a: cpu.regs.a(),
            b: cpu.regs.b(),
            c: cpu.regs.c(),
            d: cpu.regs.d(),
            e: cpu.regs.e(),
            f: cpu.regs.f(),
            h: cpu.regs.h(),
            l: cpu.regs.l(),
            ix: cpu.ix_iy.ix(),
            iy: cpu.ix_iy.iy(),
            i: cpu.i,
            r: cpu.r,
            im: cpu.im,
            iff1: cpu.iff1,
            iff2: cpu.iff2,
            ram: ram_addrs
                .iter()
                .map(|&(addr, _)| (addr, mem[addr as usize]))
                .collect(),
        }
    }
}

const NOP_FIXTURE: &str = r#"[
  {
    "name": "00 0",
    "initial": {
      "pc": 0, "sp": 0, "a": 0, "b": 0, "c": 0, "d": 0, "e": 0, "f": 0,
      "h": 0, "l": 0, "ix": 0, "iy": 0, "i": 0, "r": 0, "im": 0,
      "iff1": 0, "iff2": 0, "ram": [[0, 0]]
    },
    "final": {
      "pc": 1, "sp": 0, "a": 0, "b": 0, "c": 0, "d": 0, "e": 0, "f": 0,
      "h": 0, "l": 0, "ix": 0, "iy": 0, "i": 0, "r": 1, "im": 0,
      "iff1": 0, "iff2": 0, "ram": [[0, 0]]
    }
  }
]"#;

const LD_A_N_FIXTURE: &str = r#"[
  {
    "name": "3e 0",
    "initial": {
      "pc": 0, "sp": 0, "a": 0, "b": 0, "c": 0, "d": 0, "e": 0, "f": 0,
      "h": 0, "l": 0, "ix": 0, "iy": 0, "i": 0, "r": 0, "im": 0,
      "iff1": 0, "iff2": 0, "ram": [[0, 62], [1, 66]]
    },
    "final": {
      "pc": 2, "sp": 0, "a": 66, "b": 0, "c": 0, "d": 0, "e": 0, "f": 0,
      "h": 0, "l": 0, "ix": 0, "iy": 0, "i": 0, "r": 1, "im": 0,
      "iff1": 0, "iff2": 0, "ram": [[0, 62], [1, 66]]
    }
  }
]"#;

const ADD_A_B_FIXTURE: &str = r#"[
  {
    "name": "80 0",
    "initial": {
      "pc": 16, "sp": 0, "a": 5, "b": 10, "c": 0, "d": 0, "e": 0, "f": 0,
      "h": 0, "l": 0, "ix": 0, "iy": 0, "i": 0, "r": 0, "im": 0,
      "iff1": 0, "iff2": 0, "ram": [[16, 128]]
    },
    "final": {
      "pc": 17, "sp": 0, "a": 15, "b": 10, "c": 0, "d": 0, "e": 0, "f": 8,
      "h": 0, "l": 0, "ix": 0, "iy": 0, "i": 0, "r": 1, "im": 0,
      "iff1": 0, "iff2": 0, "ram": [[16, 128]]
    }
  }
]"#;
