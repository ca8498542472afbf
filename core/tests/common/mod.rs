//! Shared flat-memory/IO harness for driving a [`zace::Z80`] through whole
//! instructions from outside the crate, the way a host would wire up real
//! chips to the pin bus.

use zace::Pins;
use zace::Z80;

pub struct Harness {
    pub cpu: Z80,
    pub mem: [u8; 0x1_0000],
    pub io: [u8; 0x100],
    /// Byte a daisy-chained peripheral places on the data bus during an
    /// `IntAck` cycle (`M1` + `IORQ`, no `RD`/`WR`) — the IM 2 vector low
    /// byte, or whatever the IM 0 device wants executed.
    pub int_vector: u8,
}

impl Harness {
    pub fn new(program: &[u8]) -> Self {
        let mut mem = [0u8; 0x1_0000];
        mem[..program.len()].copy_from_slice(program);
        Self {
            cpu: Z80::new(),
            mem,
            io: [0u8; 0x100],
            int_vector: 0,
        }
    }

    fn service(&mut self, pins: Pins) -> Pins {
        if pins.m1() && pins.iorq() {
            pins.with_data(self.int_vector)
        } else if pins.iorq() {
            let port = (pins.address() & 0xFF) as usize;
            if pins.is_read() {
                pins.with_data(self.io[port])
            } else if pins.is_write() {
                self.io[port] = pins.data();
                pins
            } else {
                pins
            }
        } else if pins.is_read() {
            pins.with_data(self.mem[pins.address() as usize])
        } else if pins.is_write() {
            self.mem[pins.address() as usize] = pins.data();
            pins
        } else {
            pins
        }
    }

    /// Drive ticks (servicing the bus each time) until the in-flight
    /// instruction/acceptance sequence completes. `pins` carries whatever
    /// host-input levels (`INT`/`NMI`/`WAIT`) the caller wants asserted for
    /// every tick of this run.
    pub fn run_until_done(&mut self, mut pins: Pins) -> (Pins, u32) {
        let mut ticks = 0u32;
        loop {
            pins = self.service(pins);
            pins = self.cpu.tick(pins);
            ticks += 1;
            if self.cpu.opdone() {
                return (pins, ticks);
            }
        }
    }

    /// Like [`Self::run_until_done`] but lets the caller adjust pins (e.g.
    /// assert `WAIT` on a specific tick) between drives.
    pub fn run_until_done_with<F>(&mut self, mut pins: Pins, mut adjust: F) -> (Pins, u32)
    where
        F: FnMut(u32, Pins) -> Pins,
    {
        let mut ticks = 0u32;
        loop {
            pins = self.service(pins);
            pins = adjust(ticks, pins);
            pins = self.cpu.tick(pins);
            ticks += 1;
            if self.cpu.opdone() {
                return (pins, ticks);
            }
        }
    }

    /// Like [`Self::run_until_done`] but hands every tick's output pins to
    /// `observe`, so the caller can watch a pulse (`RETI`, `HALT`) that only
    /// appears on the output side of a single tick.
    pub fn run_until_done_observing<F>(&mut self, mut pins: Pins, mut observe: F) -> (Pins, u32)
    where
        F: FnMut(u32, Pins),
    {
        let mut ticks = 0u32;
        loop {
            pins = self.service(pins);
            pins = self.cpu.tick(pins);
            observe(ticks, pins);
            ticks += 1;
            if self.cpu.opdone() {
                return (pins, ticks);
            }
        }
    }
}
