//! The `Z80` state machine: register file, in-flight stage queue, and the
//! per-T-state bus driver that ties them together.
//!
//! Grounded on the teacher's [`Sm83`](../../../examples/Estus-Dev-DotMatrix)
//! at M-cycle granularity — one struct holding registers plus a queue of
//! micro-operations, drained one entry per `exec_m_cycle` — generalized to
//! the Z80's larger register set and to T-state (not M-cycle) granularity,
//! since the pin-level contract (`WAIT` mid-cycle, refresh cycles, interrupt
//! acknowledge) is only observable one clock edge at a time.

use crate::alu;
use crate::decode;
use crate::flags;
use crate::interrupt;
use crate::mcycle::{Action, Addr, AluOp, MCycle, RepeatFamily, Stage, StageQueue};
use crate::operand::{Condition, Operand16, Operand8};
use crate::pins::Pins;
use crate::registers::{IndexRegisters, Prefix, Registers};

/// The whole architectural and in-flight state of one Z80 core.
pub struct Z80 {
    pub regs: Registers,
    pub shadow: Registers,
    pub ix_iy: IndexRegisters,
    pub wz: u16,
    pub pc: u16,
    pub sp: u16,
    pub i: u8,
    pub r: u8,
    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,
    pub halted: bool,

    /// Chain state while a lead-in byte (`CB`/`DD`/`ED`/`FD`) is waiting on
    /// the byte that follows. `None` once a real opcode has been dispatched.
    prefix: Prefix,
    /// The indexing state the CURRENT instruction decoded under — captured
    /// from `prefix` the moment dispatch stops chaining, and consulted by
    /// [`Z80::resolve_addr`] for `Addr::Hl`'s `(IX+d)`/`(IY+d)` retargeting.
    active_prefix: Prefix,
    /// The last top-level opcode byte dispatched (the `ED`-table byte for
    /// block ops), used by `maybe_repeat` to recover `y`/`z`.
    opcode: u8,
    displacement: u8,
    /// Effective address folded from `IX`/`IY` plus `displacement`.
    ea: u16,

    tmp8: u8,
    tmp16_lo: u8,
    tmp16_hi: u8,
    /// Toggled by every read-cycle latch; low when a two-read word assembly
    /// (or a stack pop) has just completed its second half.
    word_phase: bool,
    /// Toggled by the push/call/RST/interrupt-accept family to distinguish
    /// a two-write sequence's first half from its second.
    stack_phase: bool,
    /// Toggled by every `Addr::SpFixed` access (`EX (SP),HL`'s two bytes).
    ex_sp_phase: bool,
    /// Set by `EI`; consumed (and cleared) by the very next instruction
    /// boundary so that boundary's `INT` sample is skipped once.
    suppress_int_once: bool,

    pending: StageQueue,
    stage: MCycle,
    action: Action,
    sub: u8,
    /// Address latched by `resolve_addr` at the start of the current bus
    /// stage; re-driven unchanged for every sub-T-state of that stage.
    bus_addr: u16,
    /// Opcode byte latched during `Fetch`'s wait-sampled sub, read back once
    /// the fetch's trailing refresh sub has also run.
    opcode_latch: u8,

    nmi_latched: bool,
    last_nmi_level: bool,
    /// Pulsed onto the `RETI` pin for exactly one tick after decoding it.
    reti_pulse: bool,
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl Z80 {
    /// A freshly constructed core, registers at the Open Question's chosen
    /// `0xFFFF` convention (DESIGN.md). Does not arm a fetch — call
    /// [`Z80::init`] before the first [`Z80::tick`].
    #[must_use]
    pub fn new() -> Self {
        let mut regs = Registers::new();
        regs.set_af(0xFFFF);
        regs.set_bc(0xFFFF);
        regs.set_de(0xFFFF);
        regs.set_hl(0xFFFF);

        let mut shadow = Registers::new();
        shadow.set_af(0xFFFF);
        shadow.set_bc(0xFFFF);
        shadow.set_de(0xFFFF);
        shadow.set_hl(0xFFFF);

        let mut ix_iy = IndexRegisters::new();
        ix_iy.set_ix(0xFFFF);
        ix_iy.set_iy(0xFFFF);

        Self {
            regs,
            shadow,
            ix_iy,
            wz: 0xFFFF,
            pc: 0,
            sp: 0xFFFF,
            i: 0,
            r: 0,
            iff1: false,
            iff2: false,
            im: 0,
            halted: false,
            prefix: Prefix::None,
            active_prefix: Prefix::None,
            opcode: 0,
            displacement: 0,
            ea: 0,
            tmp8: 0,
            tmp16_lo: 0,
            tmp16_hi: 0,
            word_phase: false,
            stack_phase: false,
            ex_sp_phase: false,
            suppress_int_once: false,
            pending: StageQueue::new(),
            stage: MCycle::Internal(0),
            action: Action::None,
            sub: 0,
            bus_addr: 0,
            opcode_latch: 0,
            nmi_latched: false,
            last_nmi_level: false,
            reti_pulse: false,
        }
    }

    /// Hardware reset per spec.md §4.7: clears `PC`, `IFF1/2`, `IM`, prefix
    /// state, `R`, `I`, and arms a fetch at `0x0000`. Deliberately leaves
    /// `AF`/`BC`/`DE`/`HL`/`IX`/`IY`/`SP`/shadow registers untouched — real
    /// hardware leaves them undefined, and [`Z80::new`]'s construction
    /// default already covers the chosen convention.
    pub fn init(&mut self) -> Pins {
        self.apply_reset();
        self.arm_fetch();
        self.drive_sub(Pins::new())
    }

    /// Force `PC` and arm a fetch there for the next tick, bypassing
    /// whatever instruction was in flight.
    pub fn prefetch(&mut self, new_pc: u16) -> Pins {
        self.pc = new_pc;
        self.pending.clear();
        self.stack_phase = false;
        self.word_phase = false;
        self.ex_sp_phase = false;
        self.arm_fetch();
        self.drive_sub(Pins::new())
    }

    /// True once the CPU is poised at the first sub-T-state of a fresh `M1`
    /// fetch with nothing queued — the next tick begins a new opcode.
    #[must_use]
    pub fn opdone(&self) -> bool {
        matches!(self.stage, MCycle::Fetch) && self.sub == 0 && self.pending.is_empty()
    }

    /// Advance by one T-state: drive this sub-step's pins, sample `WAIT` if
    /// this is the wait-sampleable sub, and otherwise latch/advance.
    pub fn tick(&mut self, pins_in: Pins) -> Pins {
        let mut pins_out = self.drive_sub(pins_in);

        if Some(self.sub) == self.stage.wait_sample_sub() && pins_in.wait() {
            return pins_out;
        }

        self.complete_sub(pins_in);
        self.sub += 1;
        if self.sub >= self.stage.len() {
            self.finish_stage(pins_in);
        }

        if self.reti_pulse {
            pins_out = pins_out.with_reti(true);
            self.reti_pulse = false;
        }

        pins_out
    }

    fn apply_reset(&mut self) {
        self.pc = 0;
        self.iff1 = false;
        self.iff2 = false;
        self.im = 0;
        self.prefix = Prefix::None;
        self.active_prefix = Prefix::None;
        self.displacement = 0;
        self.r = 0;
        self.i = 0;
        self.halted = false;
        self.pending.clear();
        self.nmi_latched = false;
        self.last_nmi_level = false;
        self.suppress_int_once = false;
    }

    fn arm_fetch(&mut self) {
        self.bump_refresh();
        self.stage = MCycle::Fetch;
        self.action = Action::None;
        self.sub = 0;
    }

    fn bump_refresh(&mut self) {
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
    }

    // ---- per-sub bus driving --------------------------------------------

    fn drive_sub(&self, pins_in: Pins) -> Pins {
        let pins = pins_in.clear_control();
        match self.stage {
            MCycle::Fetch => self.drive_fetch(pins),
            MCycle::MemRead(_) => self.drive_mem_read(pins),
            MCycle::MemWrite(_) => self.drive_mem_write(pins),
            MCycle::IoRead(_) => self.drive_io_read(pins),
            MCycle::IoWrite(_) => self.drive_io_write(pins),
            MCycle::Internal(_) => pins,
            MCycle::IntAck => self.drive_int_ack(pins),
        }
    }

    fn drive_fetch(&self, pins: Pins) -> Pins {
        match self.sub {
            0 => pins.with_address(self.pc).with_m1(true),
            1 | 2 => pins.with_address(self.pc).with_m1(true).with_mreq(true).with_rd(true),
            _ => pins
                .with_address((u16::from(self.i) << 8) | u16::from(self.r))
                .with_mreq(true)
                .with_rfsh(true),
        }
    }

    fn drive_mem_read(&self, pins: Pins) -> Pins {
        match self.sub {
            0 => pins.with_address(self.bus_addr),
            _ => pins.with_address(self.bus_addr).with_mreq(true).with_rd(true),
        }
    }

    fn drive_mem_write(&self, pins: Pins) -> Pins {
        match self.sub {
            0 => pins.with_address(self.bus_addr).with_data(self.tmp8),
            _ => pins
                .with_address(self.bus_addr)
                .with_data(self.tmp8)
                .with_mreq(true)
                .with_wr(true),
        }
    }

    fn drive_io_read(&self, pins: Pins) -> Pins {
        match self.sub {
            0 => pins.with_address(self.bus_addr),
            _ => pins.with_address(self.bus_addr).with_iorq(true).with_rd(true),
        }
    }

    fn drive_io_write(&self, pins: Pins) -> Pins {
        match self.sub {
            0 => pins.with_address(self.bus_addr).with_data(self.tmp8),
            _ => pins
                .with_address(self.bus_addr)
                .with_data(self.tmp8)
                .with_iorq(true)
                .with_wr(true),
        }
    }

    fn drive_int_ack(&self, pins: Pins) -> Pins {
        if self.sub < 2 {
            pins.with_address(self.pc).with_m1(true)
        } else {
            pins.with_address(self.pc).with_m1(true).with_iorq(true)
        }
    }

    // ---- per-sub / per-stage completion -----------------------------------

    fn complete_sub(&mut self, pins_in: Pins) {
        if Some(self.sub) != self.stage.wait_sample_sub() {
            return;
        }
        match self.stage {
            MCycle::Fetch => self.opcode_latch = pins_in.data(),
            MCycle::MemRead(addr) | MCycle::IoRead(addr) => {
                self.latch_read_byte(pins_in.data());
                self.post_complete_addr(addr, false);
            }
            MCycle::MemWrite(addr) | MCycle::IoWrite(addr) => {
                self.post_complete_addr(addr, true);
            }
            MCycle::IntAck => self.tmp8 = pins_in.data(),
            MCycle::Internal(_) => {}
        }
    }

    fn finish_stage(&mut self, pins_in: Pins) {
        match self.stage {
            MCycle::Fetch => self.finish_fetch(pins_in),
            MCycle::MemWrite(_) | MCycle::IoWrite(_) => self.advance_to_next_stage(pins_in),
            _ => {
                self.run_action(self.action);
                self.advance_to_next_stage(pins_in);
            }
        }
    }

    fn finish_fetch(&mut self, pins_in: Pins) {
        if self.halted {
            self.begin_instruction_boundary(pins_in);
            return;
        }

        let opcode = self.opcode_latch;
        self.pc = self.pc.wrapping_add(1);
        let chain_prefix = self.prefix;
        let dispatch = decode::dispatch(chain_prefix, opcode, false);

        if dispatch.stages.is_empty() {
            self.prefix = dispatch.next_prefix;
            self.arm_fetch();
            return;
        }

        self.prefix = Prefix::None;
        self.active_prefix = chain_prefix;
        self.opcode = opcode;
        self.word_phase = false;
        self.stack_phase = false;
        self.ex_sp_phase = false;
        self.pending = dispatch.stages;
        self.advance_to_next_stage(pins_in);
    }

    /// Pop the next queued stage, chaining through any zero-length (pure
    /// register) stages immediately, or fall through to the
    /// reset/interrupt/fetch decision once the queue runs dry.
    fn advance_to_next_stage(&mut self, pins_in: Pins) {
        loop {
            match self.pending.pop() {
                Some(stage) => {
                    self.stage = stage.cycle;
                    self.action = stage.action;
                    self.sub = 0;
                    if stage.cycle.len() == 0 {
                        self.run_action(self.action);
                        continue;
                    }
                    self.begin_stage();
                    return;
                }
                None => {
                    self.begin_instruction_boundary(pins_in);
                    return;
                }
            }
        }
    }

    /// Resolve the new stage's address (and, for writes, run the tagged
    /// action immediately so it can fill `tmp8` before the first drive).
    fn begin_stage(&mut self) {
        match self.stage {
            MCycle::MemRead(addr) | MCycle::IoRead(addr) => {
                self.bus_addr = self.resolve_addr(addr, false);
            }
            MCycle::MemWrite(addr) | MCycle::IoWrite(addr) => {
                self.bus_addr = self.resolve_addr(addr, true);
                self.run_action(self.action);
            }
            MCycle::Fetch | MCycle::Internal(_) | MCycle::IntAck => {}
        }
    }

    /// Reset/`NMI`/`INT` sampling at an instruction boundary (spec.md §4.6),
    /// then arm whatever comes next: a reset fetch, an acceptance sequence,
    /// or a plain fetch.
    fn begin_instruction_boundary(&mut self, pins_in: Pins) {
        let nmi_edge = pins_in.nmi() && !self.last_nmi_level;
        self.last_nmi_level = pins_in.nmi();
        if nmi_edge {
            self.nmi_latched = true;
        }

        if pins_in.res() {
            self.apply_reset();
            self.arm_fetch();
            return;
        }

        if self.nmi_latched {
            self.nmi_latched = false;
            self.halted = false;
            self.stack_phase = false;
            self.pending = interrupt::nmi_stages();
            self.advance_to_next_stage(pins_in);
            return;
        }

        let suppressed = self.suppress_int_once;
        self.suppress_int_once = false;
        if pins_in.int() && self.iff1 && !suppressed {
            self.halted = false;
            self.stack_phase = false;
            self.pending = interrupt::ack_stages(self.im);
            self.advance_to_next_stage(pins_in);
            return;
        }

        self.arm_fetch();
    }

    // ---- address resolution -------------------------------------------

    /// Resolve a stage's bus address against live CPU state, mutating
    /// `SP`/`ex_sp_phase` where the `Addr` kind itself calls for it.
    fn resolve_addr(&mut self, addr: Addr, is_write: bool) -> u16 {
        match addr {
            Addr::Pc => self.pc,
            Addr::Hl => {
                if self.active_prefix.is_indexed() {
                    self.ea
                } else {
                    self.regs.hl()
                }
            }
            Addr::Bc => self.regs.bc(),
            Addr::De => self.regs.de(),
            Addr::Sp => {
                if is_write {
                    self.sp = self.sp.wrapping_sub(1);
                }
                self.sp
            }
            Addr::Wz => self.wz,
            Addr::IoBc => (u16::from(self.regs.b()) << 8) | u16::from(self.regs.c()),
            Addr::IoImm => (u16::from(self.regs.a()) << 8) | u16::from(self.tmp8),
            Addr::SpFixed => {
                let resolved = if self.ex_sp_phase {
                    self.sp.wrapping_add(1)
                } else {
                    self.sp
                };
                self.ex_sp_phase = !self.ex_sp_phase;
                resolved
            }
        }
    }

    /// Bookkeeping that happens once a read/write against `addr` completes:
    /// `SP` advances on pops, `WZ` always advances (both directions) so
    /// consecutive `(nn)` accesses walk `WZ, WZ+1`.
    fn post_complete_addr(&mut self, addr: Addr, is_write: bool) {
        match addr {
            Addr::Pc => self.pc = self.pc.wrapping_add(1),
            Addr::Sp if !is_write => self.sp = self.sp.wrapping_add(1),
            Addr::Wz => self.wz = self.wz.wrapping_add(1),
            _ => {}
        }
    }

    fn latch_read_byte(&mut self, byte: u8) {
        self.tmp8 = byte;
        if self.word_phase {
            self.tmp16_hi = byte;
        } else {
            self.tmp16_lo = byte;
        }
        self.word_phase = !self.word_phase;
    }

    fn tmp16(&self) -> u16 {
        (u16::from(self.tmp16_hi) << 8) | u16::from(self.tmp16_lo)
    }

    fn fold_displacement(&mut self, iy: bool) {
        let base = if iy { self.ix_iy.iy() } else { self.ix_iy.ix() };
        self.ea = base.wrapping_add(i16::from(self.displacement as i8) as u16);
        self.wz = self.ea;
    }

    // ---- operand access --------------------------------------------------

    fn read8(&self, op: Operand8) -> u8 {
        match op {
            Operand8::B => self.regs.b(),
            Operand8::C => self.regs.c(),
            Operand8::D => self.regs.d(),
            Operand8::E => self.regs.e(),
            Operand8::H => self.regs.h(),
            Operand8::L => self.regs.l(),
            Operand8::A => self.regs.a(),
            Operand8::F => self.regs.f(),
            Operand8::I => self.i,
            Operand8::R => self.r,
            Operand8::Ixh => self.ix_iy.ixh(),
            Operand8::Ixl => self.ix_iy.ixl(),
            Operand8::Iyh => self.ix_iy.iyh(),
            Operand8::Iyl => self.ix_iy.iyl(),
            Operand8::SpLow => self.sp as u8,
            Operand8::SpHigh => (self.sp >> 8) as u8,
            Operand8::Tmp8 => self.tmp8,
            Operand8::Const(v) => v,
        }
    }

    fn write8(&mut self, op: Operand8, v: u8) {
        match op {
            Operand8::B => self.regs.set_b(v),
            Operand8::C => self.regs.set_c(v),
            Operand8::D => self.regs.set_d(v),
            Operand8::E => self.regs.set_e(v),
            Operand8::H => self.regs.set_h(v),
            Operand8::L => self.regs.set_l(v),
            Operand8::A => self.regs.set_a(v),
            Operand8::F => self.regs.set_f(v),
            Operand8::I => self.i = v,
            Operand8::R => self.r = v,
            Operand8::Ixh => self.ix_iy.set_ixh(v),
            Operand8::Ixl => self.ix_iy.set_ixl(v),
            Operand8::Iyh => self.ix_iy.set_iyh(v),
            Operand8::Iyl => self.ix_iy.set_iyl(v),
            Operand8::SpLow => self.sp = (self.sp & 0xFF00) | u16::from(v),
            Operand8::SpHigh => self.sp = (self.sp & 0x00FF) | (u16::from(v) << 8),
            Operand8::Tmp8 => self.tmp8 = v,
            Operand8::Const(_) => {}
        }
    }

    fn read16(&self, op: Operand16) -> u16 {
        match op {
            Operand16::Bc => self.regs.bc(),
            Operand16::De => self.regs.de(),
            Operand16::Hl => self.regs.hl(),
            Operand16::Sp => self.sp,
            Operand16::Af => self.regs.af(),
            Operand16::Ix => self.ix_iy.ix(),
            Operand16::Iy => self.ix_iy.iy(),
            Operand16::Pc => self.pc,
            Operand16::Wz => self.wz,
            Operand16::Tmp16 => self.tmp16(),
        }
    }

    fn write16(&mut self, op: Operand16, v: u16) {
        match op {
            Operand16::Bc => self.regs.set_bc(v),
            Operand16::De => self.regs.set_de(v),
            Operand16::Hl => self.regs.set_hl(v),
            Operand16::Sp => self.sp = v,
            Operand16::Af => self.regs.set_af(v),
            Operand16::Ix => self.ix_iy.set_ix(v),
            Operand16::Iy => self.ix_iy.set_iy(v),
            Operand16::Pc => self.pc = v,
            Operand16::Wz => self.wz = v,
            Operand16::Tmp16 => {
                self.tmp16_lo = v as u8;
                self.tmp16_hi = (v >> 8) as u8;
            }
        }
    }

    fn condition_holds(&self, cond: Condition) -> bool {
        match cond {
            Condition::Nz => !self.regs.zero(),
            Condition::Z => self.regs.zero(),
            Condition::Nc => !self.regs.carry(),
            Condition::C => self.regs.carry(),
            Condition::Po => !self.regs.parity_overflow(),
            Condition::Pe => self.regs.parity_overflow(),
            Condition::P => !self.regs.sign(),
            Condition::M => self.regs.sign(),
        }
    }

    fn apply_alu(&mut self, op: AluOp, src: Operand8) {
        let a = self.regs.a();
        let b = self.read8(src);
        let cf = self.regs.carry();
        let (result, f) = match op {
            AluOp::Add => alu::add8(a, b, false),
            AluOp::Adc => alu::add8(a, b, cf),
            AluOp::Sub => alu::sub8(a, b, false),
            AluOp::Sbc => alu::sub8(a, b, cf),
            AluOp::And => alu::and8(a, b),
            AluOp::Or => alu::or8(a, b),
            AluOp::Xor => alu::xor8(a, b),
            AluOp::Cp => (a, alu::cp8(a, b)),
        };
        self.regs.set_f(f);
        if op != AluOp::Cp {
            self.regs.set_a(result);
        }
    }

    fn push_pc_then_jump(&mut self, target: u16, clear_iff2: bool) {
        if !self.stack_phase {
            self.iff1 = false;
            if clear_iff2 {
                self.iff2 = false;
            }
            self.tmp8 = (self.pc >> 8) as u8;
            self.stack_phase = true;
        } else {
            self.tmp8 = self.pc as u8;
            self.stack_phase = false;
            self.pc = target;
            self.wz = target;
        }
    }

    fn block_transfer(&mut self, dec: bool) {
        let value = self.tmp8;
        let hl = self.regs.hl();
        let de = self.regs.de();
        if dec {
            self.regs.set_hl(hl.wrapping_sub(1));
            self.regs.set_de(de.wrapping_sub(1));
        } else {
            self.regs.set_hl(hl.wrapping_add(1));
            self.regs.set_de(de.wrapping_add(1));
        }
        let bc_after = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc_after);
        let f = alu::block_transfer_flags(self.regs.a(), value, bc_after, self.regs.f());
        self.regs.set_f(f);
        self.maybe_repeat();
    }

    fn block_compare(&mut self, dec: bool) {
        let value = self.tmp8;
        let hl = self.regs.hl();
        self.regs.set_hl(if dec { hl.wrapping_sub(1) } else { hl.wrapping_add(1) });
        let bc_after = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc_after);
        let f = alu::block_compare_flags(self.regs.a(), value, bc_after, self.regs.f());
        self.regs.set_f(f);
        self.maybe_repeat();
    }

    fn block_in(&mut self, dec: bool) {
        let value = self.tmp8;
        let hl = self.regs.hl();
        self.regs.set_hl(if dec { hl.wrapping_sub(1) } else { hl.wrapping_add(1) });
        let c = self.regs.c();
        let b_after = self.regs.b().wrapping_sub(1);
        self.regs.set_b(b_after);
        let k = if dec {
            u16::from(value) + u16::from(c.wrapping_sub(1))
        } else {
            u16::from(value) + u16::from(c.wrapping_add(1))
        };
        let f = alu::block_io_flags(value, b_after, k, true);
        self.regs.set_f(f);
        self.maybe_repeat();
    }

    fn block_out(&mut self, dec: bool) {
        let value = self.tmp8;
        let hl = self.regs.hl();
        self.regs.set_hl(if dec { hl.wrapping_sub(1) } else { hl.wrapping_add(1) });
        let b_after = self.regs.b().wrapping_sub(1);
        self.regs.set_b(b_after);
        let l = self.regs.l();
        let k = u16::from(value) + u16::from(l);
        let f = alu::block_io_flags(value, b_after, k, true);
        self.regs.set_f(f);
        self.maybe_repeat();
    }

    /// After any block op's transfer/compare/IO action, re-derive `y`/`z`
    /// from the opcode dispatched this instruction and rewind `PC` if the
    /// `*IR`/`*DR` row's runtime condition still holds.
    fn maybe_repeat(&mut self) {
        let y = (self.opcode >> 3) & 7;
        let z = self.opcode & 7;
        let Some(family) = decode::repeat_family(y, z) else {
            return;
        };
        let repeats = match family {
            RepeatFamily::Ld => self.regs.bc() != 0,
            RepeatFamily::Cp => self.regs.bc() != 0 && !self.regs.zero(),
            RepeatFamily::InOut => self.regs.b() != 0,
        };
        if !repeats {
            return;
        }
        self.pc = self.pc.wrapping_sub(2);
        self.pending.push(Stage::new(MCycle::Internal(5), Action::None));
    }

    #[allow(clippy::too_many_lines)]
    fn run_action(&mut self, action: Action) {
        match action {
            Action::None => {}
            Action::LatchDisplacement => self.displacement = self.tmp8,
            Action::DecodeIndexedCb => {
                self.fold_displacement(self.active_prefix.uses_iy());
                let opcode = self.tmp8;
                let mut stages = decode::decode_indexed_cb(opcode, self.active_prefix.uses_iy());
                while let Some(stage) = stages.pop() {
                    self.pending.push(stage);
                }
            }
            Action::ComputeEffectiveAddress { iy } => self.fold_displacement(iy),
            Action::Move8 { dst, src } => {
                let v = self.read8(src);
                self.write8(dst, v);
            }
            Action::Move16 { dst, src } => {
                let v = self.read16(src);
                self.write16(dst, v);
            }
            Action::Alu { op, src } => self.apply_alu(op, src),
            Action::Inc8 { target } => {
                let v = self.read8(target);
                let (r, f) = alu::inc8(v, self.regs.carry());
                self.write8(target, r);
                self.regs.set_f(f);
            }
            Action::Dec8 { target } => {
                let v = self.read8(target);
                let (r, f) = alu::dec8(v, self.regs.carry());
                self.write8(target, r);
                self.regs.set_f(f);
            }
            Action::Inc16 { target } => {
                let v = self.read16(target);
                self.write16(target, v.wrapping_add(1));
            }
            Action::Dec16 { target } => {
                let v = self.read16(target);
                self.write16(target, v.wrapping_sub(1));
            }
            Action::Add16 { dst, src } => {
                let a = self.read16(dst);
                let b = self.read16(src);
                self.wz = a.wrapping_add(1);
                let (r, f) = alu::add16(a, b, self.regs.f());
                self.write16(dst, r);
                self.regs.set_f(f);
            }
            Action::Adc16 { src } => {
                let a = self.regs.hl();
                let b = self.read16(src);
                self.wz = a.wrapping_add(1);
                let (r, f) = alu::adc16(a, b, self.regs.carry());
                self.regs.set_hl(r);
                self.regs.set_f(f);
            }
            Action::Sbc16 { src } => {
                let a = self.regs.hl();
                let b = self.read16(src);
                self.wz = a.wrapping_add(1);
                let (r, f) = alu::sbc16(a, b, self.regs.carry());
                self.regs.set_hl(r);
                self.regs.set_f(f);
            }
            Action::RotateAccumulator { kind } => {
                let a = self.regs.a();
                let (r, f) = alu::rotate_accumulator(kind, a, self.regs.carry(), self.regs.f());
                self.regs.set_a(r);
                self.regs.set_f(f);
            }
            Action::Shift { kind, target } => {
                let v = self.read8(target);
                let (r, f) = alu::shift8(kind, v, self.regs.carry());
                self.write8(target, r);
                self.regs.set_f(f);
            }
            Action::Bit { n, operand, undoc_source } => {
                let value = self.read8(operand);
                let src = if undoc_source == Operand8::Tmp8 {
                    (self.wz >> 8) as u8
                } else {
                    self.read8(undoc_source)
                };
                let f = alu::bit(n, value, src, self.regs.f());
                self.regs.set_f(f);
            }
            Action::Res { n, target } => {
                let v = self.read8(target);
                self.write8(target, alu::res(n, v));
            }
            Action::Set { n, target } => {
                let v = self.read8(target);
                self.write8(target, alu::set(n, v));
            }
            Action::Daa => {
                let (r, f) = alu::daa(self.regs.a(), self.regs.f());
                self.regs.set_a(r);
                self.regs.set_f(f);
            }
            Action::Scf => {
                let f = alu::scf(self.regs.a(), self.regs.f());
                self.regs.set_f(f);
            }
            Action::Ccf => {
                let f = alu::ccf(self.regs.a(), self.regs.f());
                self.regs.set_f(f);
            }
            Action::Cpl => {
                let a = !self.regs.a();
                self.regs.set_a(a);
                let f = (self.regs.f() & (flags::SF | flags::ZF | flags::PF | flags::CF))
                    | flags::HF
                    | flags::NF
                    | flags::undocumented_bits(a);
                self.regs.set_f(f);
            }
            Action::Neg => {
                let (r, f) = alu::sub8(0, self.regs.a(), false);
                self.regs.set_a(r);
                self.regs.set_f(f);
            }
            Action::Rld => {
                let hl_byte = self.tmp8;
                let a = self.regs.a();
                let new_hl = (hl_byte << 4) | (a & 0x0F);
                let new_a = (a & 0xF0) | (hl_byte >> 4);
                self.tmp8 = new_hl;
                self.regs.set_a(new_a);
                let f = (self.regs.f() & flags::CF)
                    | flags::sign(new_a)
                    | flags::zero(new_a)
                    | flags::parity(new_a)
                    | flags::undocumented_bits(new_a);
                self.regs.set_f(f);
            }
            Action::Rrd => {
                let hl_byte = self.tmp8;
                let a = self.regs.a();
                let new_hl = (a << 4) | (hl_byte >> 4);
                let new_a = (a & 0xF0) | (hl_byte & 0x0F);
                self.tmp8 = new_hl;
                self.regs.set_a(new_a);
                let f = (self.regs.f() & flags::CF)
                    | flags::sign(new_a)
                    | flags::zero(new_a)
                    | flags::parity(new_a)
                    | flags::undocumented_bits(new_a);
                self.regs.set_f(f);
            }
            Action::ExDeHl => {
                let de = self.regs.de();
                let hl = self.regs.hl();
                self.regs.set_de(hl);
                self.regs.set_hl(de);
            }
            Action::ExAfAf => {
                let main_af = self.regs.af();
                let shadow_af = self.shadow.af();
                self.regs.set_af(shadow_af);
                self.shadow.set_af(main_af);
            }
            Action::Exx => {
                let (bc, de, hl) = (self.regs.bc(), self.regs.de(), self.regs.hl());
                let (bc2, de2, hl2) = (self.shadow.bc(), self.shadow.de(), self.shadow.hl());
                self.regs.set_bc(bc2);
                self.regs.set_de(de2);
                self.regs.set_hl(hl2);
                self.shadow.set_bc(bc);
                self.shadow.set_de(de);
                self.shadow.set_hl(hl);
            }
            Action::ExSpIndHl => {
                let reg =
                    Operand16::Hl.reindex(self.active_prefix.is_indexed(), self.active_prefix.uses_iy());
                let old_val = self.read16(reg);
                let new_val = self.tmp16();
                self.write16(reg, new_val);
                self.tmp8 = old_val as u8;
                self.tmp16_hi = (old_val >> 8) as u8;
                self.wz = new_val;
            }
            Action::LatchTmp16Hi => self.tmp8 = self.tmp16_hi,
            Action::Jump => {
                self.pc = self.tmp16();
                self.wz = self.pc;
            }
            Action::JumpConditional { cond } => {
                self.wz = self.tmp16();
                if self.condition_holds(cond) {
                    self.pc = self.wz;
                }
            }
            Action::JumpRelative => {
                let offset = self.tmp8 as i8;
                self.pc = self.pc.wrapping_add(i16::from(offset) as u16);
                self.wz = self.pc;
            }
            Action::JumpRelativeConditional { cond } => {
                if self.condition_holds(cond) {
                    self.pending.push(Stage::new(MCycle::Internal(5), Action::JumpRelative));
                }
            }
            Action::Djnz => {
                self.regs.set_b(self.regs.b().wrapping_sub(1));
                if self.regs.b() != 0 {
                    self.pending.push(Stage::new(MCycle::Internal(5), Action::JumpRelative));
                }
            }
            Action::CallConditional { cond } => {
                if self.condition_holds(cond) {
                    self.pending.push(Stage::new(MCycle::Internal(1), Action::None));
                    self.pending.push(Stage::new(MCycle::MemWrite(Addr::Sp), Action::CallPush));
                    self.pending.push(Stage::new(MCycle::MemWrite(Addr::Sp), Action::CallPush));
                }
            }
            Action::CallPush => {
                if !self.stack_phase {
                    self.wz = self.tmp16();
                    self.tmp8 = (self.pc >> 8) as u8;
                    self.stack_phase = true;
                } else {
                    self.tmp8 = self.pc as u8;
                    self.stack_phase = false;
                    self.pc = self.wz;
                }
            }
            Action::RetConditional { cond } => {
                if self.condition_holds(cond) {
                    self.pending.push(Stage::new(MCycle::MemRead(Addr::Sp), Action::RetPop));
                    self.pending.push(Stage::new(MCycle::MemRead(Addr::Sp), Action::RetPop));
                }
            }
            Action::RetPop => {
                if !self.word_phase {
                    self.pc = self.tmp16();
                    self.wz = self.pc;
                }
            }
            Action::Retn => {
                self.iff1 = self.iff2;
                self.pending.push(Stage::new(MCycle::MemRead(Addr::Sp), Action::RetPop));
                self.pending.push(Stage::new(MCycle::MemRead(Addr::Sp), Action::RetPop));
            }
            Action::Reti => {
                self.reti_pulse = true;
                self.pending.push(Stage::new(MCycle::MemRead(Addr::Sp), Action::RetPop));
                self.pending.push(Stage::new(MCycle::MemRead(Addr::Sp), Action::RetPop));
            }
            Action::Rst { target } => {
                if !self.stack_phase {
                    self.tmp8 = (self.pc >> 8) as u8;
                    self.stack_phase = true;
                } else {
                    self.tmp8 = self.pc as u8;
                    self.stack_phase = false;
                    self.pc = u16::from(target);
                    self.wz = self.pc;
                }
            }
            Action::NmiAccept => self.push_pc_then_jump(0x0066, false),
            Action::Im0Accept => {
                let target = self.ea;
                self.push_pc_then_jump(target, true);
            }
            Action::Im1Accept => self.push_pc_then_jump(0x0038, true),
            Action::Im2Accept => {
                let target = self.tmp16();
                self.push_pc_then_jump(target, true);
            }
            Action::LatchVectorBase => {
                self.wz = (u16::from(self.i) << 8) | u16::from(self.tmp8 & 0xFE);
            }
            Action::LatchIm0Target => self.ea = u16::from(self.tmp8 & 0x38),
            Action::LatchWz => self.wz = self.tmp16(),
            Action::Push { reg } => {
                let v = self.read16(reg);
                if !self.stack_phase {
                    self.tmp8 = (v >> 8) as u8;
                    self.stack_phase = true;
                } else {
                    self.tmp8 = v as u8;
                    self.stack_phase = false;
                }
            }
            Action::Pop { reg } => {
                if !self.word_phase {
                    let v = self.tmp16();
                    self.write16(reg, v);
                }
            }
            Action::Di => {
                self.iff1 = false;
                self.iff2 = false;
            }
            Action::Ei => {
                self.iff1 = true;
                self.iff2 = true;
                self.suppress_int_once = true;
            }
            Action::ImMode { mode } => self.im = mode,
            Action::Halt => self.halted = true,
            Action::InR { reg } => {
                let v = self.tmp8;
                self.write8(reg, v);
                let f = (self.regs.f() & flags::CF)
                    | flags::sign(v)
                    | flags::zero(v)
                    | flags::undocumented_bits(v)
                    | flags::parity(v);
                self.regs.set_f(f);
                self.wz = self.bus_addr.wrapping_add(1);
            }
            Action::InFlagsOnly => {
                let v = self.tmp8;
                let f = (self.regs.f() & flags::CF)
                    | flags::sign(v)
                    | flags::zero(v)
                    | flags::undocumented_bits(v)
                    | flags::parity(v);
                self.regs.set_f(f);
                self.wz = self.bus_addr.wrapping_add(1);
            }
            Action::OutC { src } => {
                self.tmp8 = self.read8(src);
                self.wz = self.bus_addr.wrapping_add(1);
            }
            Action::Ldi => self.block_transfer(false),
            Action::Ldd => self.block_transfer(true),
            Action::Cpi => self.block_compare(false),
            Action::Cpd => self.block_compare(true),
            Action::Ini => self.block_in(false),
            Action::Ind => self.block_in(true),
            Action::Outi => self.block_out(false),
            Action::Outd => self.block_out(true),
        }
    }
}

impl std::fmt::Debug for Z80 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Z80 {{ AF:{:04X} BC:{:04X} DE:{:04X} HL:{:04X} IX:{:04X} IY:{:04X} SP:{:04X} \
             PC:{:04X} WZ:{:04X} I:{:02X} R:{:02X} IM:{} IFF1:{} IFF2:{} HALT:{} }}",
            self.regs.af(),
            self.regs.bc(),
            self.regs.de(),
            self.regs.hl(),
            self.ix_iy.ix(),
            self.ix_iy.iy(),
            self.sp,
            self.pc,
            self.wz,
            self.i,
            self.r,
            self.im,
            self.iff1 as u8,
            self.iff2 as u8,
            self.halted as u8,
        )
    }
}
