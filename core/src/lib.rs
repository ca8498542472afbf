mod alu;
mod cpu;
mod decode;
mod flags;
mod ie_chain;
mod interrupt;
mod mcycle;
mod operand;
mod pins;
mod registers;

pub use cpu::Z80;
pub use ie_chain::IeChain;
pub use mcycle::{Action, Addr, MCycle};
pub use operand::{Condition, Operand16, Operand8};
pub use pins::Pins;
pub use registers::{IndexRegisters, Prefix, Registers};
