//! The Z80 register file.
//!
//! Register pairs are packed into bitfields rather than C-style unions, so
//! the 8/16-bit views stay consistent by construction instead of by relying
//! on host endianness (spec.md Design Notes §9). The packing mirrors the
//! teacher's `Sm83Registers`: one `u64` per register bank, with each 8-bit
//! half and its combined 16-bit pair addressable through `proc-bitfield`
//! accessors.

use proc_bitfield::bitfield;

use crate::flags;

bitfield! {
    /// One bank of the four general-purpose register pairs (`AF`, `BC`,
    /// `DE`, `HL`). Used for both the main bank and the shadow bank; `EXX`
    /// and `EX AF,AF'` just swap which bank is "main".
    #[derive(Clone, Copy, Eq, PartialEq)]
    pub struct Registers(u64): Debug, FromRaw, IntoRaw, DerefRaw {
        /// Flags: `S Z Y H X P/V N C`, bit 7 down to bit 0.
        pub f: u8 @ 0..=7,
        pub a: u8 @ 8..=15,
        pub af: u16 @ 0..=15,

        pub c: u8 @ 16..=23,
        pub b: u8 @ 24..=31,
        pub bc: u16 @ 16..=31,

        pub e: u8 @ 32..=39,
        pub d: u8 @ 40..=47,
        pub de: u16 @ 32..=47,

        pub l: u8 @ 48..=55,
        pub h: u8 @ 56..=63,
        pub hl: u16 @ 48..=63,
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl Registers {
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    #[must_use]
    pub fn sign(self) -> bool {
        self.f() & flags::SF != 0
    }

    #[must_use]
    pub fn zero(self) -> bool {
        self.f() & flags::ZF != 0
    }

    #[must_use]
    pub fn carry(self) -> bool {
        self.f() & flags::CF != 0
    }

    #[must_use]
    pub fn half_carry(self) -> bool {
        self.f() & flags::HF != 0
    }

    #[must_use]
    pub fn parity_overflow(self) -> bool {
        self.f() & flags::PF != 0
    }

    #[must_use]
    pub fn subtract(self) -> bool {
        self.f() & flags::NF != 0
    }
}

bitfield! {
    /// `IX` and `IY`, each addressable as a 16-bit pair or as two 8-bit
    /// halves (`IXH/IXL`, `IYH/IYL`) — the halves only reachable once a
    /// `DD`/`FD` prefix has retargeted an instruction that would otherwise
    /// reference `H`/`L`.
    #[derive(Clone, Copy, Eq, PartialEq)]
    pub struct IndexRegisters(u32): Debug, FromRaw, IntoRaw, DerefRaw {
        pub ixl: u8 @ 0..=7,
        pub ixh: u8 @ 8..=15,
        pub ix: u16 @ 0..=15,

        pub iyl: u8 @ 16..=23,
        pub iyh: u8 @ 24..=31,
        pub iy: u16 @ 16..=31,
    }
}

impl Default for IndexRegisters {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexRegisters {
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }
}

/// Which of the seven decode tables the CPU is currently interpreting
/// opcodes through, and (for the index-prefixed forms) the operand
/// displacement once it has been fetched.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum Prefix {
    #[default]
    None,
    Cb,
    Ed,
    /// `DD` seen; `HL`/`H`/`L` references retarget to `IX`/`IXH`/`IXL`.
    Dd,
    /// `FD` seen; `HL`/`H`/`L` references retarget to `IY`/`IYH`/`IYL`.
    Fd,
    /// `DD CB d`; the displacement has been fetched, next byte is the
    /// CB-table sub-opcode operating on `(IX+d)`.
    DdCb,
    /// `FD CB d`; as above for `(IY+d)`.
    FdCb,
}

impl Prefix {
    #[must_use]
    pub const fn is_indexed(self) -> bool {
        matches!(self, Self::Dd | Self::Fd | Self::DdCb | Self::FdCb)
    }

    #[must_use]
    pub const fn uses_iy(self) -> bool {
        matches!(self, Self::Fd | Self::FdCb)
    }
}
