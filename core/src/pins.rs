//! The pin bus: a bit-packed view of every Z80 pin, shared verbatim between
//! the CPU core and whatever memory/IO/interrupt peripherals the host wires
//! up around it.
//!
//! Bit positions are part of the public contract (spec ties every chip in a
//! simulated system to the same pin word), so they're fixed here and must
//! never be renumbered.

use proc_bitfield::bitfield;

bitfield! {
    /// The full 40-bit Z80 pin state, packed into a `u64`.
    ///
    /// Address and data buses sit in the low bits; control strobes above
    /// them; `WAIT`/`INT`/`NMI`/`RES` above that; the virtual daisy-chain
    /// pins (`IEIO`, `RETI`) at the top. Gaps between fields (e.g. bits
    /// 35-36) are reserved and always read as zero.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Pins(u64): Debug, FromRaw, IntoRaw, DerefRaw {
        /// 16-bit address bus.
        pub address: u16 @ 0..=15,

        /// 8-bit data bus.
        pub data: u8 @ 16..=23,

        /// Machine cycle 1 (opcode fetch).
        pub m1: bool @ 24,

        /// Memory request.
        pub mreq: bool @ 25,

        /// IO request.
        pub iorq: bool @ 26,

        /// Read strobe.
        pub rd: bool @ 27,

        /// Write strobe.
        pub wr: bool @ 28,

        /// Halt acknowledge (driven by the CPU, not a host input).
        pub halt: bool @ 29,

        /// Maskable interrupt request (host input, level-sensitive).
        pub int: bool @ 30,

        /// Reset (host input).
        pub res: bool @ 31,

        /// Non-maskable interrupt (host input, edge-sensitive).
        pub nmi: bool @ 32,

        /// Wait (host input; stretches the current T-state when asserted
        /// during a wait-sampleable cycle).
        pub wait: bool @ 33,

        /// Refresh cycle strobe.
        pub rfsh: bool @ 34,

        /// Daisy-chain enable-in/enable-out (host/peripheral managed).
        pub ieio: bool @ 37,

        /// Pulsed high for one tick when a `RETI` was just decoded, so a
        /// servicing peripheral can lower its in-service flag.
        pub reti: bool @ 38,
    }
}

/// The strobes re-driven fresh every T-state; cleared at the start of each
/// `tick` so a step only asserts the ones it actually needs this cycle.
const CONTROL_MASK: u64 = (1 << 24) | (1 << 25) | (1 << 26) | (1 << 27) | (1 << 28) | (1 << 34);

impl Pins {
    /// Mask off `{M1, MREQ, IORQ, RD, WR, RFSH}`, leaving address/data/input
    /// pins and the daisy-chain pins untouched. Called once at the top of
    /// every `tick`.
    #[must_use]
    pub const fn clear_control(self) -> Self {
        Self(self.0 & !CONTROL_MASK)
    }

    /// True if any of the memory/IO read-or-write strobes are asserted
    /// alongside `RD`, i.e. the host must place a byte on the data bus
    /// before the next tick.
    #[must_use]
    pub fn is_read(self) -> bool {
        self.rd() && (self.mreq() || self.iorq())
    }

    /// True if the host must latch `data` from the address bus this cycle.
    #[must_use]
    pub fn is_write(self) -> bool {
        self.wr() && (self.mreq() || self.iorq())
    }
}


impl Default for Pins {
    fn default() -> Self {
        Self::new()
    }
}

impl Pins {
    /// All pins low.
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }
}
