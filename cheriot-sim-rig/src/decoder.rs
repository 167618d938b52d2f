//! The rig-side decode wrapper.
//!
//! Besides the executable instruction, the trace needs the decoded register
//! numbers `(rd, rs1, rs2)` exactly as the reference implementation reports
//! them. Those follow the instruction *format*, with a second pass that
//! zeroes fields the reference leaves unpopulated, plus a handful of
//! opcode-specific cases in the compressed space.

use cheriot_sim_core::decode::{encoding, tables, CheriotDecoder, Format, Opcode};
use cheriot_sim_core::instruction::Instruction;
use cheriot_sim_core::state::CheriotState;
use std::rc::Rc;

/// Register numbers for the trace, as the reference implementation reports
/// them for this instruction's format.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct DecodeInfo {
    pub rd: u8,
    pub rs1: u8,
    pub rs2: u8,
}

/// Decoder wrapper owning the core ISA decoder.
#[derive(Debug, Default)]
pub struct RigDecoder {
    decoder: CheriotDecoder,
}

impl RigDecoder {
    pub fn new() -> Self {
        Self {
            decoder: CheriotDecoder::new(),
        }
    }

    /// Decode `inst_word` at `address`, filling in the reported register
    /// triple.
    pub fn decode_instruction(
        &self,
        state: &CheriotState,
        address: u32,
        inst_word: u32,
        info: &mut DecodeInfo,
    ) -> Rc<Instruction> {
        let entry = if inst_word & 0b11 == 0b11 {
            tables::lookup_32(inst_word)
        } else {
            tables::lookup_16(inst_word)
        };
        let (opcode, format) = entry
            .map(|entry| (entry.opcode, entry.format))
            .unwrap_or((Opcode::None, Format::None));
        *info = register_triple(inst_word, opcode, format);
        self.decoder.decode_instruction(state, address, inst_word)
    }
}

fn register_triple(word: u32, opcode: Opcode, format: Format) -> DecodeInfo {
    let rd = |w| u8::from(encoding::rd(w));
    let rs1 = |w| u8::from(encoding::rs1(w));
    let rs2 = |w| u8::from(encoding::rs2(w));
    let c_rd = |w| u8::from(encoding::c_rd(w));
    let c_rs2 = |w| u8::from(encoding::c_rs2(w));
    let prime1 = |w| u8::from(encoding::c_rs1_prime(w));
    let prime2 = |w| u8::from(encoding::c_rs2_prime(w));

    let mut info = match format {
        // Atomic instructions use all three fields.
        Format::A | Format::R => DecodeInfo {
            rd: rd(word),
            rs1: rs1(word),
            rs2: rs2(word),
        },
        Format::B => DecodeInfo {
            rd: 0,
            rs1: rs1(word),
            rs2: rs2(word),
        },
        Format::I => DecodeInfo {
            rd: rd(word),
            rs1: rs1(word),
            rs2: 0,
        },
        Format::I2 => DecodeInfo {
            rd: rd(word),
            rs1: 0,
            rs2: 0,
        },
        Format::I5 | Format::R2 => DecodeInfo {
            rd: rd(word),
            rs1: rs1(word),
            rs2: 0,
        },
        Format::J | Format::U => DecodeInfo {
            rd: rd(word),
            rs1: 0,
            rs2: 0,
        },
        Format::S => DecodeInfo {
            rd: 0,
            rs1: rs1(word),
            rs2: rs2(word),
        },
        Format::CA => DecodeInfo {
            rd: prime1(word),
            rs1: prime1(word),
            rs2: prime2(word),
        },
        Format::CSH => DecodeInfo {
            rd: prime1(word),
            rs1: prime1(word),
            rs2: 0,
        },
        Format::CB => DecodeInfo {
            rd: 0,
            rs1: prime1(word),
            rs2: 0,
        },
        Format::CI => DecodeInfo {
            rd: c_rd(word),
            // The stack-relative loads have an implicit x2 base.
            rs1: if matches!(opcode, Opcode::CompLwsp | Opcode::CompLcsp) {
                2
            } else {
                c_rd(word)
            },
            rs2: 0,
        },
        Format::CIW => DecodeInfo {
            rd: prime2(word),
            rs1: 2,
            rs2: 0,
        },
        // The link register is fixed by the opcode alone.
        Format::CJ => DecodeInfo {
            rd: if opcode == Opcode::CompJ { 0 } else { 1 },
            rs1: 0,
            rs2: 0,
        },
        Format::CL => DecodeInfo {
            rd: prime2(word),
            rs1: prime1(word),
            rs2: 0,
        },
        Format::CR => match opcode {
            Opcode::CompMv => DecodeInfo {
                rd: c_rd(word),
                rs1: 0,
                rs2: c_rs2(word),
            },
            Opcode::CompEbreak => DecodeInfo::default(),
            Opcode::CompAdd => DecodeInfo {
                rd: c_rd(word),
                rs1: c_rd(word),
                rs2: c_rs2(word),
            },
            Opcode::CompJr => DecodeInfo {
                rd: 0,
                rs1: c_rd(word),
                rs2: 0,
            },
            Opcode::CompJalr => DecodeInfo {
                rd: 1,
                rs1: c_rd(word),
                rs2: 0,
            },
            _ => DecodeInfo::default(),
        },
        Format::CS => DecodeInfo {
            rd: 0,
            rs1: prime1(word),
            rs2: prime2(word),
        },
        Format::CSS => DecodeInfo {
            rd: 0,
            rs1: 0,
            rs2: c_rs2(word),
        },
        Format::None => DecodeInfo::default(),
    };

    // The reference implementation leaves the source fields of these formats
    // unpopulated.
    if matches!(
        format,
        Format::I | Format::I5 | Format::R2 | Format::CB | Format::CSH | Format::CIW | Format::CI
    ) {
        info.rs1 = 0;
    }
    if matches!(
        format,
        Format::R | Format::B | Format::CR | Format::CA | Format::S
    ) {
        info.rs1 = 0;
        info.rs2 = 0;
    }
    if opcode == Opcode::CompSlli {
        info.rs1 = 0;
    }
    info
}
