//! The 16/32-bit ISA decoder.
//!
//! Decoding is a small interpreter over data: the tables in
//! [`tables`] map bit patterns to `(opcode, format, operand enums, semantic
//! function)`, ordered most-specific-first, and the registries in
//! [`operands`] turn operand enums into bound operand objects. The decoder
//! itself only classifies the word length, walks the right table, and
//! assembles the [`Instruction`] record.
//!
//! Fetch-side faults (misaligned or out-of-range addresses, unknown
//! encodings) produce pseudo-instructions whose semantic function raises the
//! corresponding trap when executed, so the retirement loop never needs a
//! separate error path.

pub mod encoding;
pub mod operands;
pub mod tables;

use crate::instruction::Instruction;
use crate::state::CheriotState;
use log::trace;
use operands::{bind_dest, bind_source, DecodeContext};
use std::fmt::Write as _;
use std::rc::Rc;
use tables::DecodeEntry;

/// Every opcode the decoder can emit. `None` marks the pseudo-instructions
/// fabricated for fetch faults and unknown encodings.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Opcode {
    None,
    // RV32I.
    Lui,
    Auipcc,
    Auicgp,
    Cjal,
    Cjalr,
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,
    Sb,
    Sh,
    Sw,
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
    Slli,
    Srli,
    Srai,
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
    // RV32M.
    Mul,
    Mulh,
    Mulhsu,
    Mulhu,
    Div,
    Divu,
    Rem,
    Remu,
    // Memory ordering and system.
    Fence,
    FenceI,
    Ecall,
    Ebreak,
    Mret,
    Wfi,
    Csrrw,
    Csrrs,
    Csrrc,
    Csrrwi,
    Csrrsi,
    Csrrci,
    // CHERIoT capability operations.
    CAndPerm,
    CClearTag,
    CGetAddr,
    CGetBase,
    CGetHigh,
    CGetLen,
    CGetPerm,
    CGetTag,
    CGetTop,
    CGetType,
    CIncAddr,
    CIncAddrImm,
    CLoadCap,
    CStoreCap,
    CMove,
    Cram,
    Crrl,
    CSeal,
    CSetAddr,
    CSetBounds,
    CSetBoundsExact,
    CSetBoundsImm,
    CSetEqualExact,
    CSetHigh,
    CSpecialRw,
    CSub,
    CTestSubset,
    CUnseal,
    // RV32A.
    LrW,
    ScW,
    AmoSwapW,
    AmoAddW,
    AmoXorW,
    AmoAndW,
    AmoOrW,
    AmoMinW,
    AmoMaxW,
    AmoMinuW,
    AmoMaxuW,
    // Vector configuration.
    Vsetvli,
    Vsetivli,
    Vsetvl,
    // Compressed.
    CompAddi4spn,
    CompLw,
    CompSw,
    CompLc,
    CompSc,
    CompNop,
    CompAddi,
    CompJal,
    CompLi,
    CompAddi16sp,
    CompLui,
    CompSrli,
    CompSrai,
    CompAndi,
    CompSub,
    CompXor,
    CompOr,
    CompAnd,
    CompJ,
    CompBeqz,
    CompBnez,
    CompSlli,
    CompLwsp,
    CompLcsp,
    CompJr,
    CompJalr,
    CompMv,
    CompAdd,
    CompEbreak,
    CompSwsp,
    CompScsp,
}

/// Instruction formats, as the test-rig register-number reporting sees them.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Format {
    None,
    R,
    /// Unary capability operations: rd and rs1 only.
    R2,
    I,
    /// Immediate-only system forms (`csrrwi` and friends): rd only.
    I2,
    /// Capability immediate forms with a 5-bit immediate.
    I5,
    S,
    B,
    U,
    J,
    /// Atomic operations.
    A,
    CA,
    CB,
    CI,
    CIW,
    CJ,
    CL,
    CR,
    CS,
    CSS,
    CSH,
}

/// The ISA decoder. Stateless: all decode inputs come from the word and the
/// architectural state passed in per call.
#[derive(Debug, Default)]
pub struct CheriotDecoder;

impl CheriotDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode one instruction word fetched from `address`.
    ///
    /// This always returns an executable instruction: fetch faults and
    /// unknown encodings yield pseudo-instructions that raise the matching
    /// trap from their semantic function.
    pub fn decode_instruction(
        &self,
        state: &CheriotState,
        address: u32,
        word: u32,
    ) -> Rc<Instruction> {
        trace!("decoding {word:#010x} at {address:#010x}");
        if address & 1 != 0 {
            return Rc::new(pseudo_instruction(
                address,
                word,
                "misaligned instruction address",
                sem_fetch_misaligned,
            ));
        }
        if (address as u64) < state.min_physical_address() as u64
            || (address as u64) >= state.max_physical_address()
        {
            return Rc::new(pseudo_instruction(
                address,
                word,
                "instruction address out of physical memory",
                sem_fetch_access_fault,
            ));
        }
        let (entry, size, word) = if word & 0b11 == 0b11 {
            (tables::lookup_32(word), 4, word)
        } else {
            let word16 = word & 0xFFFF;
            // The all-zeros pattern is the canonical defined-illegal
            // instruction.
            let entry = if word16 == 0 { None } else { tables::lookup_16(word16) };
            (entry, 2, word16)
        };
        let Some(entry) = entry else {
            return Rc::new(Instruction::new(
                address,
                size,
                word,
                Opcode::None,
                "unknown instruction".to_string(),
                vec![],
                vec![],
                sem_illegal_instruction,
                None,
            ));
        };
        Rc::new(build_instruction(state, address, size, word, entry))
    }
}

/// Assemble the instruction record for a matched table entry: bind every
/// operand through the registries and attach the optional data-phase child.
fn build_instruction(
    state: &CheriotState,
    address: u32,
    size: u32,
    word: u32,
    entry: &'static DecodeEntry,
) -> Instruction {
    let ctx = DecodeContext {
        word,
        opcode: entry.opcode,
        state,
    };
    let sources: Vec<_> = entry.sources.iter().map(|&op| bind_source(&ctx, op)).collect();
    let destinations: Vec<_> = entry
        .dests
        .iter()
        .map(|&op| bind_dest(&ctx, op, 0))
        .collect();
    let child = entry.child.map(|child| {
        let dests = child
            .dests
            .iter()
            .map(|&op| bind_dest(&ctx, op, 0))
            .collect();
        Rc::new(Instruction::new(
            address,
            size,
            word,
            entry.opcode,
            format!("{}.data", entry.mnemonic),
            vec![],
            dests,
            child.semantic,
            None,
        ))
    });
    let mut disassembly = entry.mnemonic.to_string();
    let mut first = true;
    for dest in &destinations {
        let separator = if first { " " } else { ", " };
        let _ = write!(disassembly, "{separator}{dest}");
        first = false;
    }
    for source in &sources {
        let separator = if first { " " } else { ", " };
        let _ = write!(disassembly, "{separator}{source}");
        first = false;
    }
    Instruction::new(
        address,
        size,
        word,
        entry.opcode,
        disassembly,
        sources,
        destinations,
        entry.semantic,
        child,
    )
}

fn pseudo_instruction(
    address: u32,
    word: u32,
    disassembly: &str,
    semantic: crate::instruction::SemanticFn,
) -> Instruction {
    Instruction::new(
        address,
        1,
        word,
        Opcode::None,
        disassembly.to_string(),
        vec![],
        vec![],
        semantic,
        None,
    )
}

fn sem_fetch_misaligned(inst: &Instruction, state: &mut CheriotState) {
    state.trap(
        false,
        inst.address(),
        crate::state::Exception::InstructionAddressMisaligned.code(),
        inst.address() ^ 0x1,
        Some(inst),
    );
}

fn sem_fetch_access_fault(inst: &Instruction, state: &mut CheriotState) {
    state.trap(
        false,
        inst.address(),
        crate::state::Exception::InstructionAccessFault.code(),
        inst.address(),
        Some(inst),
    );
}

fn sem_illegal_instruction(inst: &Instruction, state: &mut CheriotState) {
    state.trap(
        false,
        inst.raw(),
        crate::state::Exception::IllegalInstruction.code(),
        inst.address(),
        Some(inst),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::TaggedMemory;
    use crate::state::Config;

    fn state() -> CheriotState {
        CheriotState::new(TaggedMemory::new(0x8000_0000, 0x1_0000), Config::default())
    }

    #[test]
    fn test_width_classification() {
        let state = state();
        let decoder = CheriotDecoder::new();
        // lui x12, 0x80002
        let inst = decoder.decode_instruction(&state, 0x8000_0000, 0x8000_2637);
        assert_eq!(Opcode::Lui, inst.opcode());
        assert_eq!(4, inst.size());
        // c.addi x10, 1 (only the low half matters)
        let inst = decoder.decode_instruction(&state, 0x8000_0000, 0xFFFF_0505);
        assert_eq!(Opcode::CompAddi, inst.opcode());
        assert_eq!(2, inst.size());
    }

    #[test]
    fn test_misaligned_address_yields_pseudo() {
        let state = state();
        let decoder = CheriotDecoder::new();
        let inst = decoder.decode_instruction(&state, 0x8000_0001, 0x13);
        assert_eq!(Opcode::None, inst.opcode());
        assert_eq!(1, inst.size());
    }

    #[test]
    fn test_out_of_range_address_yields_pseudo() {
        let state = state();
        let decoder = CheriotDecoder::new();
        let inst = decoder.decode_instruction(&state, 0x9000_0000, 0x13);
        assert_eq!(Opcode::None, inst.opcode());
        assert_eq!(1, inst.size());
    }

    #[test]
    fn test_all_zeros_is_illegal() {
        let state = state();
        let decoder = CheriotDecoder::new();
        let inst = decoder.decode_instruction(&state, 0x8000_0000, 0);
        assert_eq!(Opcode::None, inst.opcode());
        assert_eq!(2, inst.size());
    }

    #[test]
    fn test_decode_is_deterministic() {
        let state = state();
        let decoder = CheriotDecoder::new();
        let a = decoder.decode_instruction(&state, 0x8000_0000, 0x8000_2637);
        let b = decoder.decode_instruction(&state, 0x8000_0000, 0x8000_2637);
        assert_eq!(a.opcode(), b.opcode());
        assert_eq!(a.sources(), b.sources());
        assert_eq!(a.destinations(), b.destinations());
        assert_eq!(a.disassembly(), b.disassembly());
    }
}
