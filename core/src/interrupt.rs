//! `NMI`/`INT` acceptance sequence builders.
//!
//! `cpu.rs` decides *whether* to accept (edge-latched `NMI`, level-sampled
//! `INT` gated on `IFF1` and the EI-deferred rule) and calls into here only
//! to get the [`StageQueue`] of bus cycles the acceptance itself drives.
//! Grounded on the same shape as `decode.rs`'s opcode decode — a few stage
//! templates instead of one path per interrupt mode — since acceptance is,
//! mechanically, just another instruction the CPU "executes" in place of a
//! normal fetch.

use crate::mcycle::{Action, Addr, MCycle, Stage, StageQueue};

fn push(q: &mut StageQueue, cycle: MCycle, action: Action) {
    q.push(Stage::new(cycle, action));
}

/// `NMI` acceptance: 5T recognition + two 3T pushes of `PC`, landing at
/// `0x0066`. 11T total, per spec.
#[must_use]
pub fn nmi_stages() -> StageQueue {
    let mut q = StageQueue::new();
    push(&mut q, MCycle::Internal(5), Action::None);
    push(&mut q, MCycle::MemWrite(Addr::Sp), Action::NmiAccept);
    push(&mut q, MCycle::MemWrite(Addr::Sp), Action::NmiAccept);
    q
}

/// `INT` acceptance for the given interrupt mode. IM 0 narrows to the
/// `RST`-shaped byte every real peripheral places on the bus; IM 1 is a
/// fixed `RST 38h`; IM 2 reads a vector-table pointer before pushing.
#[must_use]
pub fn ack_stages(im: u8) -> StageQueue {
    let mut q = StageQueue::new();
    match im {
        2 => {
            push(&mut q, MCycle::IntAck, Action::LatchVectorBase);
            push(&mut q, MCycle::MemRead(Addr::Wz), Action::None);
            push(&mut q, MCycle::MemRead(Addr::Wz), Action::None);
            push(&mut q, MCycle::MemWrite(Addr::Sp), Action::Im2Accept);
            push(&mut q, MCycle::MemWrite(Addr::Sp), Action::Im2Accept);
        }
        1 => {
            push(&mut q, MCycle::IntAck, Action::None);
            push(&mut q, MCycle::MemWrite(Addr::Sp), Action::Im1Accept);
            push(&mut q, MCycle::MemWrite(Addr::Sp), Action::Im1Accept);
        }
        _ => {
            push(&mut q, MCycle::IntAck, Action::LatchIm0Target);
            push(&mut q, MCycle::MemWrite(Addr::Sp), Action::Im0Accept);
            push(&mut q, MCycle::MemWrite(Addr::Sp), Action::Im0Accept);
        }
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nmi_sequence_totals_eleven_t_states() {
        let mut q = nmi_stages();
        let mut total = 0u32;
        while let Some(stage) = q.pop() {
            total += u32::from(stage.cycle.len());
        }
        assert_eq!(total, 11);
    }

    #[test]
    fn im1_sequence_totals_thirteen_t_states() {
        let mut q = ack_stages(1);
        let mut total = 0u32;
        while let Some(stage) = q.pop() {
            total += u32::from(stage.cycle.len());
        }
        assert_eq!(total, 13);
    }

    #[test]
    fn im2_sequence_totals_nineteen_t_states() {
        let mut q = ack_stages(2);
        let mut total = 0u32;
        while let Some(stage) = q.pop() {
            total += u32::from(stage.cycle.len());
        }
        assert_eq!(total, 19);
    }
}
