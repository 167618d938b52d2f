//! The decoded instruction record.
//!
//! An [`Instruction`] is fully bound at decode time: every source and
//! destination operand refers to a concrete register, immediate, CSR or
//! special register, and the semantic function never re-decodes. Records are
//! reference counted (`Rc`) because the retirement adapter holds them briefly
//! past the execution boundary; the adapter's clone is the only expected
//! second owner, and the child pointer is strictly one-way.

use crate::decode::operands::{DestOperand, SourceOperand};
use crate::decode::Opcode;
use crate::state::CheriotState;
use std::rc::Rc;

/// A semantic function: mutates state through the instruction's pre-bound
/// operands. Traps abort the remaining effects by returning early after
/// calling into the trap engine; nothing is written to a destination after a
/// fault.
pub type SemanticFn = fn(&Instruction, &mut CheriotState);

/// One decoded instruction occurrence.
#[derive(Clone)]
pub struct Instruction {
    address: u32,
    /// 2 or 4 bytes; 1 marks the pseudo-instructions the decoder fabricates
    /// for fetch faults.
    size: u32,
    /// The raw instruction word (low half only for compressed encodings).
    raw: u32,
    opcode: Opcode,
    disassembly: String,
    sources: Vec<SourceOperand>,
    destinations: Vec<DestOperand>,
    semantic: SemanticFn,
    /// Completion phase of split memory operations; runs after the memory
    /// system has produced the loaded value.
    child: Option<Rc<Instruction>>,
}

impl Instruction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: u32,
        size: u32,
        raw: u32,
        opcode: Opcode,
        disassembly: String,
        sources: Vec<SourceOperand>,
        destinations: Vec<DestOperand>,
        semantic: SemanticFn,
        child: Option<Rc<Instruction>>,
    ) -> Self {
        Self {
            address,
            size,
            raw,
            opcode,
            disassembly,
            sources,
            destinations,
            semantic,
            child,
        }
    }

    /// Run the semantic function against `state`.
    pub fn execute(&self, state: &mut CheriotState) {
        (self.semantic)(self, state)
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn disassembly(&self) -> &str {
        &self.disassembly
    }

    /// The `i`th source operand, in the order the semantic function reads
    /// them. Out-of-range indices yield the null operand, which semantic
    /// functions report as an internal error.
    pub fn source(&self, i: usize) -> &SourceOperand {
        static NONE: SourceOperand = SourceOperand::None;
        self.sources.get(i).unwrap_or(&NONE)
    }

    /// The `i`th destination operand, in the order they are written.
    pub fn destination(&self, i: usize) -> &DestOperand {
        static NONE: DestOperand = DestOperand::none();
        self.destinations.get(i).unwrap_or(&NONE)
    }

    pub fn sources(&self) -> &[SourceOperand] {
        &self.sources
    }

    pub fn destinations(&self) -> &[DestOperand] {
        &self.destinations
    }

    pub fn child(&self) -> Option<&Rc<Instruction>> {
        self.child.as_ref()
    }
}

impl std::fmt::Debug for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instruction")
            .field("address", &format_args!("{:#010x}", self.address))
            .field("size", &self.size)
            .field("opcode", &self.opcode)
            .field("disassembly", &self.disassembly)
            .finish_non_exhaustive()
    }
}
