//! Static opcode decode.
//!
//! Rather than transcribing four 256-entry tables by hand, every table here
//! is derived algorithmically from the opcode's `x`/`y`/`z` field split
//! (`x = opcode>>6`, `y = (opcode>>3)&7`, `z = opcode&7`, `p = y>>1`,
//! `q = y&1`), the decomposition every Z80 decoder in the wild uses (see
//! <http://www.z80.info/decoding.htm>). A hand-authored 256-row table has no
//! compiler or test feedback to catch a single mistyped entry; the
//! algorithmic form collapses the 256 entries down to the handful of row
//! templates actually present in the hardware, so there's far less surface
//! for a transcription slip to hide in.
//!
//! `DD`/`FD` register substitution is handled by asking the caller's active
//! [`Prefix`] to `reindex` each `H`/`L`/`HL` operand as it's built, rather
//! than duplicating every table per prefix.

use crate::alu::ShiftKind;
use crate::mcycle::{Action, Addr, AluOp, MCycle, RepeatFamily, Stage, StageQueue};
use crate::operand::{Condition, Operand16, Operand8};
use crate::registers::Prefix;

fn push(q: &mut StageQueue, cycle: MCycle, action: Action) {
    q.push(Stage::new(cycle, action));
}

const R_TABLE: [Operand8; 8] = [
    Operand8::B,
    Operand8::C,
    Operand8::D,
    Operand8::E,
    Operand8::H,
    Operand8::L,
    Operand8::A, // placeholder for z==6, never read: (HL) is handled specially
    Operand8::A,
];

fn reg8(z: u8, prefix: Prefix) -> Operand8 {
    R_TABLE[z as usize].reindex(prefix.is_indexed(), prefix.uses_iy())
}

const RP_TABLE: [Operand16; 4] = [Operand16::Bc, Operand16::De, Operand16::Hl, Operand16::Sp];

fn reg16_sp(p: u8, prefix: Prefix) -> Operand16 {
    RP_TABLE[p as usize].reindex(prefix.is_indexed(), prefix.uses_iy())
}

const RP2_TABLE: [Operand16; 4] = [Operand16::Bc, Operand16::De, Operand16::Hl, Operand16::Af];

fn reg16_af(p: u8, prefix: Prefix) -> Operand16 {
    RP2_TABLE[p as usize].reindex(prefix.is_indexed(), prefix.uses_iy())
}

const ALU_TABLE: [AluOp; 8] = [
    AluOp::Add,
    AluOp::Adc,
    AluOp::Sub,
    AluOp::Sbc,
    AluOp::And,
    AluOp::Xor,
    AluOp::Or,
    AluOp::Cp,
];

const ROT_TABLE: [ShiftKind; 8] = [
    ShiftKind::Rlc,
    ShiftKind::Rrc,
    ShiftKind::Rl,
    ShiftKind::Rr,
    ShiftKind::Sla,
    ShiftKind::Sra,
    ShiftKind::Sll,
    ShiftKind::Srl,
];

/// Result of interpreting one freshly-fetched opcode byte under the current
/// prefix state.
pub struct Dispatch {
    pub stages: StageQueue,
    pub next_prefix: Prefix,
}

fn done(stages: StageQueue) -> Dispatch {
    Dispatch {
        stages,
        next_prefix: Prefix::None,
    }
}

fn extend_prefix(next_prefix: Prefix) -> Dispatch {
    Dispatch {
        stages: StageQueue::new(),
        next_prefix,
    }
}

/// Entry point called once per fetched opcode byte. `halted` short-circuits
/// to the NOP decode per spec.md's HALT re-fetch behavior.
#[must_use]
pub fn dispatch(prefix: Prefix, opcode: u8, halted: bool) -> Dispatch {
    if halted {
        return done(StageQueue::new());
    }

    match (prefix, opcode) {
        (Prefix::None | Prefix::Dd | Prefix::Fd, 0xCB) if prefix != Prefix::Cb => {
            if prefix.is_indexed() {
                let mut q = StageQueue::new();
                push(&mut q, MCycle::MemRead(Addr::Pc), Action::LatchDisplacement);
                push(&mut q, MCycle::MemRead(Addr::Pc), Action::DecodeIndexedCb);
                Dispatch {
                    stages: q,
                    next_prefix: if prefix.uses_iy() {
                        Prefix::FdCb
                    } else {
                        Prefix::DdCb
                    },
                }
            } else {
                extend_prefix(Prefix::Cb)
            }
        }
        (_, 0xDD) => extend_prefix(Prefix::Dd),
        (_, 0xFD) => extend_prefix(Prefix::Fd),
        (Prefix::None, 0xED) => extend_prefix(Prefix::Ed),
        (Prefix::Cb, _) => done(decode_cb(opcode, Prefix::None)),
        (Prefix::Dd | Prefix::Fd, _) if opcode == 0xCB => unreachable!(),
        (Prefix::Dd, _) => done(decode_main(opcode, Prefix::Dd)),
        (Prefix::Fd, _) => done(decode_main(opcode, Prefix::Fd)),
        (Prefix::Ed, _) => done(decode_ed(opcode)),
        (Prefix::None, _) => done(decode_main(opcode, Prefix::None)),
        (Prefix::DdCb | Prefix::FdCb, _) => unreachable!("handled via DecodeIndexedCb"),
    }
}

/// Builds the `MemRead(Pc) + Internal(5)` displacement prelude shared by
/// every `(IX+d)`/`(IY+d)` memory operand, per the generic "+12T" rule
/// (prefix fetch + displacement read + 5 internal) documented in
/// DESIGN.md.
fn push_displacement_prelude(q: &mut StageQueue, prefix: Prefix) {
    push(q, MCycle::MemRead(Addr::Pc), Action::LatchDisplacement);
    push(
        q,
        MCycle::Internal(5),
        Action::ComputeEffectiveAddress {
            iy: prefix.uses_iy(),
        },
    );
}

fn uses_indirect_hl(z: u8) -> bool {
    z == 6
}

fn decode_main(opcode: u8, prefix: Prefix) -> StageQueue {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;
    let p = y >> 1;
    let q = y & 1;

    let mut out = StageQueue::new();
    let indexed = prefix.is_indexed();

    match x {
        0 => decode_x0(&mut out, y, z, p, q, prefix),
        1 => {
            if z == 6 && y == 6 {
                push(&mut out, MCycle::Internal(0), Action::Halt);
            } else if z == 6 {
                if indexed {
                    push_displacement_prelude(&mut out, prefix);
                }
                push(
                    &mut out,
                    MCycle::MemWrite(Addr::Hl),
                    Action::Move8 {
                        dst: Operand8::Tmp8,
                        src: reg8(y, Prefix::None),
                    },
                );
            } else if y == 6 {
                if indexed {
                    push_displacement_prelude(&mut out, prefix);
                }
                push(
                    &mut out,
                    MCycle::MemRead(Addr::Hl),
                    Action::Move8 {
                        dst: reg8(y, Prefix::None),
                        src: Operand8::Tmp8,
                    },
                );
            } else {
                push(
                    &mut out,
                    MCycle::Internal(0),
                    Action::Move8 {
                        dst: reg8(y, prefix),
                        src: reg8(z, prefix),
                    },
                );
            }
        }
        2 => {
            if uses_indirect_hl(z) {
                if indexed {
                    push_displacement_prelude(&mut out, prefix);
                }
                push(
                    &mut out,
                    MCycle::MemRead(Addr::Hl),
                    Action::Alu {
                        op: ALU_TABLE[y as usize],
                        src: Operand8::Tmp8,
                    },
                );
            } else {
                push(
                    &mut out,
                    MCycle::Internal(0),
                    Action::Alu {
                        op: ALU_TABLE[y as usize],
                        src: reg8(z, prefix),
                    },
                );
            }
        }
        3 => decode_x3(&mut out, y, z, p, q, prefix),
        _ => unreachable!(),
    }
    out
}

fn decode_x0(out: &mut StageQueue, y: u8, z: u8, p: u8, q: u8, prefix: Prefix) {
    match z {
        0 => match y {
            0 => push(out, MCycle::Internal(0), Action::None), // NOP
            1 => push(out, MCycle::Internal(0), Action::ExAfAf),
            2 => {
                // DJNZ e: not taken stops here (8T total); the taken half's
                // extra Internal(5) is appended dynamically by `Djnz`.
                push(out, MCycle::Internal(1), Action::None);
                push(out, MCycle::MemRead(Addr::Pc), Action::Djnz);
            }
            3 => {
                push(out, MCycle::MemRead(Addr::Pc), Action::None);
                push(out, MCycle::Internal(5), Action::JumpRelative);
            }
            _ => {
                // JR cc,e: not taken stops here (7T total); cpu.rs appends
                // the Internal(5)+jump only when the condition holds.
                push(
                    out,
                    MCycle::MemRead(Addr::Pc),
                    Action::JumpRelativeConditional {
                        cond: Condition::TABLE[(y - 4) as usize],
                    },
                );
            }
        },
        1 => {
            if q == 0 {
                push(out, MCycle::MemRead(Addr::Pc), Action::None);
                push(
                    out,
                    MCycle::MemRead(Addr::Pc),
                    Action::Move16 {
                        dst: reg16_sp(p, prefix),
                        src: Operand16::Tmp16,
                    },
                );
            } else {
                push(
                    out,
                    MCycle::Internal(7),
                    Action::Add16 {
                        dst: Operand16::Hl.reindex(prefix.is_indexed(), prefix.uses_iy()),
                        src: reg16_sp(p, prefix),
                    },
                );
            }
        }
        2 => {
            let (cycle, action) = match (p, q) {
                (0, 0) => (
                    MCycle::MemWrite(Addr::Bc),
                    Action::Move8 {
                        dst: Operand8::Tmp8,
                        src: Operand8::A,
                    },
                ),
                (0, 1) => (
                    MCycle::MemRead(Addr::Bc),
                    Action::Move8 {
                        dst: Operand8::A,
                        src: Operand8::Tmp8,
                    },
                ),
                (1, 0) => (
                    MCycle::MemWrite(Addr::De),
                    Action::Move8 {
                        dst: Operand8::Tmp8,
                        src: Operand8::A,
                    },
                ),
                (1, 1) => (
                    MCycle::MemRead(Addr::De),
                    Action::Move8 {
                        dst: Operand8::A,
                        src: Operand8::Tmp8,
                    },
                ),
                (2, 0) => {
                    push(out, MCycle::MemRead(Addr::Pc), Action::None);
                    push(out, MCycle::MemRead(Addr::Pc), Action::LatchWz);
                    push(
                        out,
                        MCycle::MemWrite(Addr::Wz),
                        Action::Move8 {
                            dst: Operand8::Tmp8,
                            src: Operand8::L.reindex(prefix.is_indexed(), prefix.uses_iy()),
                        },
                    );
                    push(
                        out,
                        MCycle::MemWrite(Addr::Wz),
                        Action::Move8 {
                            dst: Operand8::Tmp8,
                            src: Operand8::H.reindex(prefix.is_indexed(), prefix.uses_iy()),
                        },
                    );
                    return;
                }
                (2, 1) => {
                    push(out, MCycle::MemRead(Addr::Pc), Action::None);
                    push(out, MCycle::MemRead(Addr::Pc), Action::LatchWz);
                    push(out, MCycle::MemRead(Addr::Wz), Action::None);
                    push(
                        out,
                        MCycle::MemRead(Addr::Wz),
                        Action::Move16 {
                            dst: Operand16::Hl.reindex(prefix.is_indexed(), prefix.uses_iy()),
                            src: Operand16::Tmp16,
                        },
                    );
                    return;
                }
                (3, 0) => {
                    push(out, MCycle::MemRead(Addr::Pc), Action::None);
                    push(out, MCycle::MemRead(Addr::Pc), Action::LatchWz);
                    push(
                        out,
                        MCycle::MemWrite(Addr::Wz),
                        Action::Move8 {
                            dst: Operand8::Tmp8,
                            src: Operand8::A,
                        },
                    );
                    return;
                }
                _ => {
                    push(out, MCycle::MemRead(Addr::Pc), Action::None);
                    push(out, MCycle::MemRead(Addr::Pc), Action::LatchWz);
                    push(
                        out,
                        MCycle::MemRead(Addr::Wz),
                        Action::Move8 {
                            dst: Operand8::A,
                            src: Operand8::Tmp8,
                        },
                    );
                    return;
                }
            };
            push(out, cycle, action);
        }
        3 => {
            let target = reg16_sp(p, prefix);
            push(
                out,
                MCycle::Internal(2),
                if q == 0 {
                    Action::Inc16 { target }
                } else {
                    Action::Dec16 { target }
                },
            );
        }
        4 => {
            if y == 6 {
                if prefix.is_indexed() {
                    push_displacement_prelude(out, prefix);
                }
                push(out, MCycle::MemRead(Addr::Hl), Action::None);
                push(
                    out,
                    MCycle::Internal(1),
                    Action::Inc8 {
                        target: Operand8::Tmp8,
                    },
                );
                push(
                    out,
                    MCycle::MemWrite(Addr::Hl),
                    Action::Move8 {
                        dst: Operand8::Tmp8,
                        src: Operand8::Tmp8,
                    },
                );
            } else {
                push(
                    out,
                    MCycle::Internal(0),
                    Action::Inc8 { target: reg8(y, prefix) },
                );
            }
        }
        5 => {
            if y == 6 {
                if prefix.is_indexed() {
                    push_displacement_prelude(out, prefix);
                }
                push(out, MCycle::MemRead(Addr::Hl), Action::None);
                push(
                    out,
                    MCycle::Internal(1),
                    Action::Dec8 {
                        target: Operand8::Tmp8,
                    },
                );
                push(
                    out,
                    MCycle::MemWrite(Addr::Hl),
                    Action::Move8 {
                        dst: Operand8::Tmp8,
                        src: Operand8::Tmp8,
                    },
                );
            } else {
                push(
                    out,
                    MCycle::Internal(0),
                    Action::Dec8 { target: reg8(y, prefix) },
                );
            }
        }
        6 => {
            if y == 6 {
                if prefix.is_indexed() {
                    push_displacement_prelude(out, prefix);
                }
                push(out, MCycle::MemRead(Addr::Pc), Action::None);
                push(
                    out,
                    MCycle::MemWrite(Addr::Hl),
                    Action::Move8 {
                        dst: Operand8::Tmp8,
                        src: Operand8::Tmp8,
                    },
                );
            } else {
                push(out, MCycle::MemRead(Addr::Pc), Action::None);
                push(
                    out,
                    MCycle::Internal(0),
                    Action::Move8 {
                        dst: reg8(y, prefix),
                        src: Operand8::Tmp8,
                    },
                );
            }
        }
        7 => {
            let action = match y {
                0 => Action::RotateAccumulator { kind: ShiftKind::Rlc },
                1 => Action::RotateAccumulator { kind: ShiftKind::Rrc },
                2 => Action::RotateAccumulator { kind: ShiftKind::Rl },
                3 => Action::RotateAccumulator { kind: ShiftKind::Rr },
                4 => Action::Daa,
                5 => Action::Cpl,
                6 => Action::Scf,
                _ => Action::Ccf,
            };
            push(out, MCycle::Internal(0), action);
        }
        _ => unreachable!(),
    }
}

fn decode_x3(out: &mut StageQueue, y: u8, z: u8, p: u8, q: u8, prefix: Prefix) {
    match z {
        0 => push(
            out,
            MCycle::Internal(1),
            Action::RetConditional {
                cond: Condition::TABLE[y as usize],
            },
        ),
        1 => {
            if q == 0 {
                push(
                    out,
                    MCycle::MemRead(Addr::Sp),
                    Action::Pop { reg: reg16_af(p, prefix) },
                );
                push(
                    out,
                    MCycle::MemRead(Addr::Sp),
                    Action::Pop { reg: reg16_af(p, prefix) },
                );
            } else {
                match p {
                    0 => {
                        push(out, MCycle::MemRead(Addr::Sp), Action::RetPop);
                        push(out, MCycle::MemRead(Addr::Sp), Action::RetPop);
                    }
                    1 => push(out, MCycle::Internal(0), Action::Exx),
                    2 => push(
                        out,
                        MCycle::Internal(0),
                        Action::Move16 {
                            dst: Operand16::Pc,
                            src: Operand16::Hl.reindex(prefix.is_indexed(), prefix.uses_iy()),
                        },
                    ),
                    _ => push(
                        out,
                        MCycle::Internal(2),
                        Action::Move16 {
                            dst: Operand16::Sp,
                            src: Operand16::Hl.reindex(prefix.is_indexed(), prefix.uses_iy()),
                        },
                    ),
                }
            }
        }
        2 => {
            push(out, MCycle::MemRead(Addr::Pc), Action::None);
            push(
                out,
                MCycle::MemRead(Addr::Pc),
                Action::JumpConditional {
                    cond: Condition::TABLE[y as usize],
                },
            );
        }
        3 => match y {
            0 => {
                push(out, MCycle::MemRead(Addr::Pc), Action::None);
                push(out, MCycle::MemRead(Addr::Pc), Action::Jump);
            }
            1 => {} // CB prefix handled in `dispatch`
            2 => {
                push(out, MCycle::MemRead(Addr::Pc), Action::None);
                push(
                    out,
                    MCycle::IoWrite(Addr::IoImm),
                    Action::OutC { src: Operand8::A },
                );
            }
            3 => {
                push(out, MCycle::MemRead(Addr::Pc), Action::None);
                push(out, MCycle::IoRead(Addr::IoImm), Action::InR { reg: Operand8::A });
            }
            4 => {
                // EX (SP),HL: reads and writes the same two bytes at
                // SP/SP+1 with no net change to SP itself, so it cannot
                // share the push/pop phase-toggle that every other
                // `Addr::Sp` access relies on.
                push(out, MCycle::MemRead(Addr::SpFixed), Action::None);
                push(out, MCycle::MemRead(Addr::SpFixed), Action::None);
                push(out, MCycle::Internal(1), Action::None);
                push(out, MCycle::MemWrite(Addr::SpFixed), Action::ExSpIndHl);
                push(out, MCycle::MemWrite(Addr::SpFixed), Action::LatchTmp16Hi);
            }
            5 => push(out, MCycle::Internal(0), Action::ExDeHl),
            6 => push(out, MCycle::Internal(0), Action::Di),
            _ => push(out, MCycle::Internal(0), Action::Ei),
        },
        4 => {
            push(out, MCycle::MemRead(Addr::Pc), Action::None);
            push(
                out,
                MCycle::MemRead(Addr::Pc),
                Action::CallConditional {
                    cond: Condition::TABLE[y as usize],
                },
            );
        }
        5 => {
            if q == 0 {
                push(out, MCycle::Internal(1), Action::None);
                push(
                    out,
                    MCycle::MemWrite(Addr::Sp),
                    Action::Push { reg: reg16_af(p, prefix) },
                );
                push(
                    out,
                    MCycle::MemWrite(Addr::Sp),
                    Action::Push { reg: reg16_af(p, prefix) },
                );
            } else if p == 0 {
                push(out, MCycle::MemRead(Addr::Pc), Action::None);
                push(out, MCycle::MemRead(Addr::Pc), Action::None);
                push(out, MCycle::Internal(1), Action::None);
                push(out, MCycle::MemWrite(Addr::Sp), Action::CallPush);
                push(out, MCycle::MemWrite(Addr::Sp), Action::CallPush);
            }
        }
        6 => push(
            out,
            MCycle::MemRead(Addr::Pc),
            Action::Alu {
                op: ALU_TABLE[y as usize],
                src: Operand8::Tmp8,
            },
        ),
        7 => {
            push(out, MCycle::Internal(1), Action::None);
            push(out, MCycle::MemWrite(Addr::Sp), Action::Rst { target: y * 8 });
            push(out, MCycle::MemWrite(Addr::Sp), Action::Rst { target: y * 8 });
        }
        _ => unreachable!(),
    }
}

/// `CB`-table rotate/shift/`BIT`/`RES`/`SET`, register and `(HL)` forms.
fn decode_cb(opcode: u8, prefix: Prefix) -> StageQueue {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;
    let mut out = StageQueue::new();

    if z == 6 {
        match x {
            0 => {
                push(&mut out, MCycle::MemRead(Addr::Hl), Action::None);
                push(
                    &mut out,
                    MCycle::Internal(1),
                    Action::Shift {
                        kind: ROT_TABLE[y as usize],
                        target: Operand8::Tmp8,
                    },
                );
                push(
                    &mut out,
                    MCycle::MemWrite(Addr::Hl),
                    Action::Move8 {
                        dst: Operand8::Tmp8,
                        src: Operand8::Tmp8,
                    },
                );
            }
            1 => push(
                &mut out,
                MCycle::MemRead(Addr::Hl),
                Action::Bit {
                    n: y,
                    operand: Operand8::Tmp8,
                    undoc_source: Operand8::Tmp8,
                },
            ),
            2 => {
                push(&mut out, MCycle::MemRead(Addr::Hl), Action::None);
                push(&mut out, MCycle::Internal(1), Action::Res { n: y, target: Operand8::Tmp8 });
                push(
                    &mut out,
                    MCycle::MemWrite(Addr::Hl),
                    Action::Move8 {
                        dst: Operand8::Tmp8,
                        src: Operand8::Tmp8,
                    },
                );
            }
            _ => {
                push(&mut out, MCycle::MemRead(Addr::Hl), Action::None);
                push(&mut out, MCycle::Internal(1), Action::Set { n: y, target: Operand8::Tmp8 });
                push(
                    &mut out,
                    MCycle::MemWrite(Addr::Hl),
                    Action::Move8 {
                        dst: Operand8::Tmp8,
                        src: Operand8::Tmp8,
                    },
                );
            }
        }
        return out;
    }

    let r = reg8(z, prefix);
    let action = match x {
        0 => Action::Shift {
            kind: ROT_TABLE[y as usize],
            target: r,
        },
        1 => Action::Bit {
            n: y,
            operand: r,
            undoc_source: r,
        },
        2 => Action::Res { n: y, target: r },
        _ => Action::Set { n: y, target: r },
    };
    push(&mut out, MCycle::Internal(0), action);
    out
}

/// `DD CB d op` / `FD CB d op`, once the displacement and sub-opcode bytes
/// have both been read as plain memory cycles. Every CB-table row operates
/// on `(IX+d)`/`(IY+d)`; the undocumented dual-target forms (where `z != 6`
/// also copies the result into a register) are folded in via an extra
/// `Move8` stage.
#[must_use]
pub fn decode_indexed_cb(opcode: u8, iy: bool) -> StageQueue {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;
    let mut out = StageQueue::new();
    let _ = iy;

    match x {
        1 => {
            push(
                &mut out,
                MCycle::Internal(2),
                Action::None,
            );
            push(
                &mut out,
                MCycle::MemRead(Addr::Hl),
                Action::Bit {
                    n: y,
                    operand: Operand8::Tmp8,
                    undoc_source: Operand8::Tmp8,
                },
            );
        }
        _ => {
            push(&mut out, MCycle::Internal(2), Action::None);
            push(&mut out, MCycle::MemRead(Addr::Hl), Action::None);
            let compute = match x {
                0 => Action::Shift {
                    kind: ROT_TABLE[y as usize],
                    target: Operand8::Tmp8,
                },
                2 => Action::Res { n: y, target: Operand8::Tmp8 },
                _ => Action::Set { n: y, target: Operand8::Tmp8 },
            };
            push(&mut out, MCycle::Internal(1), compute);
            push(
                &mut out,
                MCycle::MemWrite(Addr::Hl),
                Action::Move8 {
                    dst: Operand8::Tmp8,
                    src: Operand8::Tmp8,
                },
            );
            // Undocumented dual-target form: the computed byte is also
            // copied into the named 8-bit register (z != 6) or nowhere
            // (z == 6, the documented form).
            if z != 6 {
                push(
                    &mut out,
                    MCycle::Internal(0),
                    Action::Move8 {
                        dst: R_TABLE[z as usize],
                        src: Operand8::Tmp8,
                    },
                );
            }
        }
    }
    out
}

/// Low/high 8-bit operand pair for `RP_TABLE[p]`, used by `LD (nn),rr`/
/// `LD rr,(nn)` which move a 16-bit register through the bus one byte at a
/// time. `SP` has no architectural 8-bit halves, so it gets dedicated
/// scratch-only operands.
fn pair_halves(p: u8) -> (Operand8, Operand8) {
    match p {
        0 => (Operand8::C, Operand8::B),
        1 => (Operand8::E, Operand8::D),
        2 => (Operand8::L, Operand8::H),
        _ => (Operand8::SpLow, Operand8::SpHigh),
    }
}

const ED_IM_TABLE: [u8; 8] = [0, 0, 1, 2, 0, 0, 1, 2];

fn decode_ed(opcode: u8) -> StageQueue {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;
    let p = y >> 1;
    let q = y & 1;
    let mut out = StageQueue::new();

    if x != 1 && x != 2 {
        // Unused ED row: behaves as an 8T NOP.
        push(&mut out, MCycle::Internal(4), Action::None);
        return out;
    }

    if x == 2 {
        if (4..=7).contains(&y) && z <= 3 {
            push_block_io_op(&mut out, y, z);
        } else {
            push(&mut out, MCycle::Internal(4), Action::None);
        }
        return out;
    }

    match z {
        0 => {
            if y == 6 {
                push(&mut out, MCycle::IoRead(Addr::IoBc), Action::InFlagsOnly);
            } else {
                push(
                    &mut out,
                    MCycle::IoRead(Addr::IoBc),
                    Action::InR { reg: R_TABLE[y as usize] },
                );
            }
        }
        1 => {
            if y == 6 {
                push(
                    &mut out,
                    MCycle::IoWrite(Addr::IoBc),
                    Action::OutC { src: Operand8::Const(0) },
                );
            } else {
                push(
                    &mut out,
                    MCycle::IoWrite(Addr::IoBc),
                    Action::OutC { src: R_TABLE[y as usize] },
                );
            }
        }
        2 => {
            push(
                &mut out,
                MCycle::Internal(7),
                if q == 0 {
                    Action::Sbc16 { src: RP_TABLE[p as usize] }
                } else {
                    Action::Adc16 { src: RP_TABLE[p as usize] }
                },
            );
        }
        3 => {
            push(&mut out, MCycle::MemRead(Addr::Pc), Action::None);
            push(&mut out, MCycle::MemRead(Addr::Pc), Action::LatchWz);
            let (lo, hi) = pair_halves(p);
            if q == 0 {
                push(
                    &mut out,
                    MCycle::MemWrite(Addr::Wz),
                    Action::Move8 { dst: Operand8::Tmp8, src: lo },
                );
                push(
                    &mut out,
                    MCycle::MemWrite(Addr::Wz),
                    Action::Move8 { dst: Operand8::Tmp8, src: hi },
                );
            } else {
                push(&mut out, MCycle::MemRead(Addr::Wz), Action::None);
                push(
                    &mut out,
                    MCycle::MemRead(Addr::Wz),
                    Action::Move16 {
                        dst: RP_TABLE[p as usize],
                        src: Operand16::Tmp16,
                    },
                );
            }
        }
        4 => push(&mut out, MCycle::Internal(0), Action::Neg),
        5 => {
            push(
                &mut out,
                MCycle::Internal(0),
                if y == 1 { Action::Reti } else { Action::Retn },
            );
        }
        6 => push(&mut out, MCycle::Internal(0), Action::ImMode { mode: ED_IM_TABLE[y as usize] }),
        7 => match y {
            4 => {
                push(&mut out, MCycle::MemRead(Addr::Hl), Action::None);
                push(&mut out, MCycle::Internal(4), Action::Rrd);
                push(
                    &mut out,
                    MCycle::MemWrite(Addr::Hl),
                    Action::Move8 { dst: Operand8::Tmp8, src: Operand8::Tmp8 },
                );
            }
            5 => {
                push(&mut out, MCycle::MemRead(Addr::Hl), Action::None);
                push(&mut out, MCycle::Internal(4), Action::Rld);
                push(
                    &mut out,
                    MCycle::MemWrite(Addr::Hl),
                    Action::Move8 { dst: Operand8::Tmp8, src: Operand8::Tmp8 },
                );
            }
            _ => {
                let action = match y {
                    0 => Action::Move8 { dst: Operand8::I, src: Operand8::A },
                    1 => Action::Move8 { dst: Operand8::R, src: Operand8::A },
                    2 => Action::Move8 { dst: Operand8::A, src: Operand8::I },
                    3 => Action::Move8 { dst: Operand8::A, src: Operand8::R },
                    _ => Action::None,
                };
                push(&mut out, MCycle::Internal(1), action);
            }
        },
        _ => unreachable!(),
    }
    out
}

/// `LDI/LDD/CPI/CPD/INI/IND/OUTI/OUTD` and their repeating `*IR`/`*DR`
/// siblings share these same stage shapes; the repeat decision itself is
/// made at runtime (`repeat_family` below, consulted by `cpu.rs` once the
/// base op's action has run) rather than baked into the decode here.
fn push_block_io_op(out: &mut StageQueue, y: u8, z: u8) {
    let dec = y & 1 != 0;
    match z {
        0 => {
            push(out, MCycle::MemRead(Addr::Hl), Action::None);
            push(
                out,
                MCycle::MemWrite(Addr::De),
                if dec { Action::Ldd } else { Action::Ldi },
            );
            push(out, MCycle::Internal(2), Action::None);
        }
        1 => {
            push(out, MCycle::MemRead(Addr::Hl), Action::None);
            push(
                out,
                MCycle::Internal(5),
                if dec { Action::Cpd } else { Action::Cpi },
            );
        }
        2 => {
            push(out, MCycle::IoRead(Addr::IoBc), Action::None);
            push(
                out,
                MCycle::MemWrite(Addr::Hl),
                if dec { Action::Ind } else { Action::Ini },
            );
            push(out, MCycle::Internal(1), Action::None);
        }
        _ => {
            push(out, MCycle::MemRead(Addr::Hl), Action::None);
            push(
                out,
                MCycle::IoWrite(Addr::IoBc),
                if dec { Action::Outd } else { Action::Outi },
            );
            push(out, MCycle::Internal(1), Action::None);
        }
    }
}

/// Whether the given `ED` block op (`y` field, `4..=7`) repeats, and which
/// family's repeat condition applies. Only the `*IR`/`*DR` row (`y` `6`/`7`)
/// repeats; `y` `4`/`5` (`LDI`/`LDD`/...) always runs exactly once.
#[must_use]
pub fn repeat_family(y: u8, z: u8) -> Option<RepeatFamily> {
    if y < 6 {
        return None;
    }
    match z {
        0 => Some(RepeatFamily::Ld),
        1 => Some(RepeatFamily::Cp),
        2 | 3 => Some(RepeatFamily::InOut),
        _ => None,
    }
}
