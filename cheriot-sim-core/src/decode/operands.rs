//! Operand enums, bound operand objects, and the getter registries.
//!
//! The decoder never materializes operands itself: for each opcode the decode
//! table lists operand *enums*, and two dense registries map each enum to a
//! getter that extracts the concrete operand (register field, immediate, CSR,
//! special register, vector group) from the current instruction word. The
//! destination registry additionally takes a write latency in cycles, kept
//! for latency bookkeeping.
//!
//! A missing registry entry is a construction-time defect: it is logged with
//! the opcode name and yields the null operand, which the semantic function
//! reports as an internal error when executed.

use super::encoding;
use super::Opcode;
use crate::csr::ScrSpecifier;
use crate::registers::Specifier;
use crate::state::CheriotState;
use log::error;
use std::fmt;

/// Source operand namespace. One entry per operand convention that appears
/// in the decode tables.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(usize)]
pub enum SourceOp {
    None = 0,
    /// The *aq* ordering bit of an atomic instruction, as a literal.
    AAq,
    /// The *rl* ordering bit of an atomic instruction, as a literal.
    ARl,
    /// B-format branch offset (signed).
    BImm12,
    /// The stack capability `c2`/`csp` (implicit in stack-relative
    /// compressed encodings).
    C2,
    /// CS/CL-format rs1', capability view.
    C3cs1,
    /// CS-format rs2', capability view.
    C3cs2,
    /// CS/CL-format rs1', integer view.
    C3rs1,
    /// CS-format rs2', integer view.
    C3rs2,
    /// CR-format rs1, capability view.
    Ccrs1,
    /// CR-format rs2, capability view.
    Ccrs2,
    /// CSS-format rs2, capability view.
    Ccs2,
    /// The global pointer capability `c3`/`cgp` (implicit in `auicgp`).
    Cgp,
    /// Zero-extended 5-bit CSR immediate (rs1 field).
    CsrUimm5,
    /// CR-format rs1, integer view.
    Crs1,
    /// CR-format rs2, integer view.
    Crs2,
    /// R/I-format rs1, capability view.
    Cs1,
    /// R-format rs2, capability view.
    Cs2,
    /// The 12-bit CSR index, as an immediate carrying the CSR name.
    Csr,
    /// R-format rs1, FP register.
    Frs1,
    /// R-format rs2, FP register.
    Frs2,
    /// R4-format rs3, FP register.
    Frs3,
    /// CB-format branch offset (signed).
    ICbImm8,
    /// CI-format 6-bit immediate (signed).
    ICiImm6,
    /// CI-format `c.lui` immediate (signed, bits 17:12).
    ICiImm612,
    /// CI-format `c.addi16sp` immediate (signed, scaled by 16).
    ICiImm6x16,
    /// CI-format 6-bit immediate (unsigned).
    ICiUimm6,
    /// CI-format stack load offset scaled by 4.
    ICiUimm6x4,
    /// CI-format stack load offset scaled by 8.
    ICiUimm6x8,
    /// CIW-format `c.addi4spn` immediate (unsigned, scaled by 4).
    ICiwUimm8x4,
    /// CJ-format jump offset (signed).
    ICjImm11,
    /// CL/CS-format offset scaled by 4.
    IClUimm5x4,
    /// CL/CS-format offset scaled by 8.
    IClUimm5x8,
    /// CSH-format 6-bit immediate (signed, `c.andi`).
    ICshImm6,
    /// CSH-format 6-bit shift amount (unsigned).
    ICshUimm6,
    /// CSS-format stack store offset scaled by 4.
    ICssUimm6x4,
    /// CSS-format stack store offset scaled by 8.
    ICssUimm6x8,
    /// I-format 12-bit immediate (signed).
    IImm12,
    /// 5-bit shift amount from the rs2 field (unsigned).
    IUimm5,
    /// I-format 12-bit immediate (unsigned, `csetboundsimm`).
    IUimm12,
    /// J-format 21-bit offset (signed).
    JImm20,
    /// The program counter capability.
    Pcc,
    /// R-format rd read as a source, integer view.
    Rd,
    /// FP rounding-mode field, as a literal.
    Rm,
    /// R/I-format rs1, integer view. A zero field is the literal `0`.
    Rs1,
    /// R-format rs2, integer view. A zero field is the literal `0`.
    Rs2,
    /// S-format store offset (signed).
    SImm12,
    /// Special capability register selected by the rs2 field (28..=31).
    Scr,
    /// U-format upper immediate (pc-relative flavor).
    SImm20,
    /// U-format upper immediate (absolute flavor).
    UImm20,
    /// Vector register group at the rd field, read as a source.
    Vd,
    /// Vector mask operand: the all-ones mask when the vm bit is set,
    /// register v0 otherwise.
    Vm,
    /// Vector register group at the rs1 field.
    Vs1,
    /// Vector register group at the rs2 field.
    Vs2,
    /// The integer literal 0.
    X0,
    /// The stack pointer's integer view.
    X2,
    PastMaxValue,
}

impl SourceOp {
    pub const COUNT: usize = Self::PastMaxValue as usize;

    /// All real operand enums, in declaration order (excludes the
    /// `PastMaxValue` sentinel).
    pub const ALL: [Self; Self::COUNT] = [
        Self::None,
        Self::AAq,
        Self::ARl,
        Self::BImm12,
        Self::C2,
        Self::C3cs1,
        Self::C3cs2,
        Self::C3rs1,
        Self::C3rs2,
        Self::Ccrs1,
        Self::Ccrs2,
        Self::Ccs2,
        Self::Cgp,
        Self::CsrUimm5,
        Self::Crs1,
        Self::Crs2,
        Self::Cs1,
        Self::Cs2,
        Self::Csr,
        Self::Frs1,
        Self::Frs2,
        Self::Frs3,
        Self::ICbImm8,
        Self::ICiImm6,
        Self::ICiImm612,
        Self::ICiImm6x16,
        Self::ICiUimm6,
        Self::ICiUimm6x4,
        Self::ICiUimm6x8,
        Self::ICiwUimm8x4,
        Self::ICjImm11,
        Self::IClUimm5x4,
        Self::IClUimm5x8,
        Self::ICshImm6,
        Self::ICshUimm6,
        Self::ICssUimm6x4,
        Self::ICssUimm6x8,
        Self::IImm12,
        Self::IUimm5,
        Self::IUimm12,
        Self::JImm20,
        Self::Pcc,
        Self::Rd,
        Self::Rm,
        Self::Rs1,
        Self::Rs2,
        Self::SImm12,
        Self::Scr,
        Self::SImm20,
        Self::UImm20,
        Self::Vd,
        Self::Vm,
        Self::Vs1,
        Self::Vs2,
        Self::X0,
        Self::X2,
    ];
}

/// Destination operand namespace.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(usize)]
pub enum DestOp {
    None = 0,
    /// The stack capability `c2`/`csp`.
    C2,
    /// CL-format rd', capability view.
    C3cd,
    /// CL-format rd', integer view.
    C3rd,
    /// CL/CS-format rs1', integer view (written by post-increment forms).
    C3rs1,
    /// R/I-format rd, capability view. A zero field writes the sink.
    Cd,
    /// CJ-format link register: `c1` for `c.jal`, the sink for `c.j`. The
    /// assignment is keyed on the opcode alone.
    CjLink,
    /// CSR write destination carrying the 12-bit index.
    Csr,
    /// R-format rd, FP register.
    Frd,
    /// R/I-format rd, integer view. A zero field writes the sink.
    Rd,
    /// Special capability register selected by the rs2 field (28..=31).
    Scr,
    /// Vector register group at the rd field.
    Vd,
    /// The link register `c1`, capability view.
    X1,
    PastMaxValue,
}

impl DestOp {
    pub const COUNT: usize = Self::PastMaxValue as usize;

    pub const ALL: [Self; Self::COUNT] = [
        Self::None,
        Self::C2,
        Self::C3cd,
        Self::C3rd,
        Self::C3rs1,
        Self::Cd,
        Self::CjLink,
        Self::Csr,
        Self::Frd,
        Self::Rd,
        Self::Scr,
        Self::Vd,
        Self::X1,
    ];
}

/// Register-group sizes for vector operands, indexed by `register % 8`.
/// Register 0, 8, 16, 24 head groups of 8; 4, 12, 20, 28 groups of 4;
/// even non-multiples-of-4 groups of 2; odd registers stand alone. This
/// handles fractional-LMUL grouping without consulting `vtype`.
pub const VECTOR_GROUP_SIZE: [u8; 8] = [8, 1, 2, 1, 4, 1, 2, 1];

/// A bound source operand.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SourceOperand {
    /// The null operand: produced for missing getters; the semantic function
    /// raises an internal error on use.
    None,
    /// Integer view of a capability register (its address field).
    XReg(Specifier),
    /// Full capability view of a register. Reading `c0` observes the null
    /// capability.
    CapReg(Specifier),
    /// The program counter capability.
    Pcc,
    /// A special capability register.
    Scr(ScrSpecifier),
    /// A bound immediate (both signed and unsigned immediates fit in i64).
    Imm(i64),
    /// A compile-time literal, e.g. the integer 0 for a zero rd field.
    Literal(u32),
    /// A CSR index immediate, with the CSR name when the CSR exists (kept
    /// for disassembly).
    Csr {
        index: u16,
        name: Option<&'static str>,
    },
    /// A floating-point register.
    FpReg(u8),
    /// A vector register group spanning `count` registers from `start`.
    VecGroup { start: u8, count: u8 },
    /// The vector mask: all-ones when unmasked, register v0 otherwise.
    VecMask { unmasked: bool },
}

impl fmt::Display for SourceOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "<none>"),
            Self::XReg(r) => write!(f, "x{}", u8::from(*r)),
            Self::CapReg(r) => write!(f, "{r}"),
            Self::Pcc => write!(f, "pcc"),
            Self::Scr(scr) => write!(f, "{}", scr.name()),
            Self::Imm(imm) => write!(f, "{imm}"),
            Self::Literal(v) => write!(f, "{v}"),
            Self::Csr { index, name } => match name {
                Some(name) => write!(f, "{name}"),
                None => write!(f, "csr({index:#05x})"),
            },
            Self::FpReg(r) => write!(f, "f{r}"),
            Self::VecGroup { start, .. } => write!(f, "v{start}"),
            Self::VecMask { unmasked: true } => write!(f, "vm"),
            Self::VecMask { unmasked: false } => write!(f, "v0.t"),
        }
    }
}

/// What a destination operand writes to.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DestOperandKind {
    None,
    /// Integer write: the register becomes the null capability carrying the
    /// value as its address.
    XReg(Specifier),
    /// Full capability write.
    CapReg(Specifier),
    /// The write sink standing in for x0/c0 destinations.
    Sink,
    /// A special capability register.
    Scr(ScrSpecifier),
    /// A CSR write carrying the 12-bit index.
    Csr(u16),
    FpReg(u8),
    VecGroup { start: u8, count: u8 },
}

/// A bound destination operand: the target plus its write latency in cycles
/// (always 0 in this functional simulator, carried for bookkeeping).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DestOperand {
    pub kind: DestOperandKind,
    pub latency: u8,
}

impl DestOperand {
    pub const fn none() -> Self {
        Self {
            kind: DestOperandKind::None,
            latency: 0,
        }
    }

    fn new(kind: DestOperandKind, latency: u8) -> Self {
        Self { kind, latency }
    }
}

impl fmt::Display for DestOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DestOperandKind::None => write!(f, "<none>"),
            DestOperandKind::XReg(r) => write!(f, "x{}", u8::from(*r)),
            DestOperandKind::CapReg(r) => write!(f, "{r}"),
            DestOperandKind::Sink => write!(f, "x0"),
            DestOperandKind::Scr(scr) => write!(f, "{}", scr.name()),
            DestOperandKind::Csr(index) => write!(f, "csr({index:#05x})"),
            DestOperandKind::FpReg(r) => write!(f, "f{r}"),
            DestOperandKind::VecGroup { start, .. } => write!(f, "v{start}"),
        }
    }
}

/// Everything a getter may consult: the instruction word, the decoded
/// opcode, and the state (for CSR name lookup).
pub struct DecodeContext<'a> {
    pub word: u32,
    pub opcode: Opcode,
    pub state: &'a CheriotState,
}

pub type SourceGetter = fn(&DecodeContext) -> Option<SourceOperand>;
pub type DestGetter = fn(&DecodeContext, u8) -> Option<DestOperand>;

/// Look up the getter for a source operand enum.
pub fn source_getter(op: SourceOp) -> Option<SourceGetter> {
    SOURCE_GETTERS[op as usize]
}

/// Look up the getter for a destination operand enum.
pub fn dest_getter(op: DestOp) -> Option<DestGetter> {
    DEST_GETTERS[op as usize]
}

/// Materialize a source operand, logging a construction-time error when the
/// registry has no entry for `op`.
pub fn bind_source(ctx: &DecodeContext, op: SourceOp) -> SourceOperand {
    let Some(getter) = source_getter(op) else {
        error!(
            "no getter for source operand {op:?} of instruction {:?}",
            ctx.opcode
        );
        return SourceOperand::None;
    };
    getter(ctx).unwrap_or(SourceOperand::None)
}

/// Materialize a destination operand; see [`bind_source`].
pub fn bind_dest(ctx: &DecodeContext, op: DestOp, latency: u8) -> DestOperand {
    let Some(getter) = dest_getter(op) else {
        error!(
            "no getter for destination operand {op:?} of instruction {:?}",
            ctx.opcode
        );
        return DestOperand::none();
    };
    getter(ctx, latency).unwrap_or(DestOperand::none())
}

//
// Source getters.
//

fn get_none(_: &DecodeContext) -> Option<SourceOperand> {
    None
}

fn get_a_aq(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Literal(encoding::a_aq(ctx.word) as u32))
}

fn get_a_rl(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Literal(encoding::a_rl(ctx.word) as u32))
}

fn get_b_imm12(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::b_imm(ctx.word) as i64))
}

fn get_c2(_: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::CapReg(Specifier::C2))
}

fn get_c3cs1(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::CapReg(encoding::c_rs1_prime(ctx.word)))
}

fn get_c3cs2(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::CapReg(encoding::c_rs2_prime(ctx.word)))
}

fn get_c3rs1(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::XReg(encoding::c_rs1_prime(ctx.word)))
}

fn get_c3rs2(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::XReg(encoding::c_rs2_prime(ctx.word)))
}

fn get_ccrs1(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::CapReg(encoding::c_rd(ctx.word)))
}

fn get_ccrs2(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::CapReg(encoding::c_rs2(ctx.word)))
}

fn get_ccs2(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::CapReg(encoding::c_rs2(ctx.word)))
}

fn get_cgp(_: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::CapReg(Specifier::C3))
}

fn get_csr_uimm5(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::csr_uimm5(ctx.word) as i64))
}

fn get_crs1(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::XReg(encoding::c_rd(ctx.word)))
}

fn get_crs2(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::XReg(encoding::c_rs2(ctx.word)))
}

fn get_cs1(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::CapReg(encoding::rs1(ctx.word)))
}

fn get_cs2(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::CapReg(encoding::rs2(ctx.word)))
}

fn get_csr(ctx: &DecodeContext) -> Option<SourceOperand> {
    let index = encoding::i_uimm12(ctx.word) as u16;
    let name = ctx.state.csrs().get(index).ok().map(|csr| csr.name());
    Some(SourceOperand::Csr { index, name })
}

fn get_frs1(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::FpReg(u8::from(encoding::rs1(ctx.word))))
}

fn get_frs2(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::FpReg(u8::from(encoding::rs2(ctx.word))))
}

fn get_frs3(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::FpReg((ctx.word >> 27) as u8))
}

fn get_cb_imm8(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::cb_imm8(ctx.word) as i64))
}

fn get_ci_imm6(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::ci_imm6(ctx.word) as i64))
}

fn get_ci_imm612(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::ci_imm18(ctx.word) as i64))
}

fn get_ci_imm6x16(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::ci_imm6x16(ctx.word) as i64))
}

fn get_ci_uimm6(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::ci_uimm6(ctx.word) as i64))
}

fn get_ci_uimm6x4(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::ci_uimm6x4(ctx.word) as i64))
}

fn get_ci_uimm6x8(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::ci_uimm6x8(ctx.word) as i64))
}

fn get_ciw_uimm8x4(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::ciw_uimm8x4(ctx.word) as i64))
}

fn get_cj_imm11(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::cj_imm11(ctx.word) as i64))
}

fn get_cl_uimm5x4(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::cl_uimm5x4(ctx.word) as i64))
}

fn get_cl_uimm5x8(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::cl_uimm5x8(ctx.word) as i64))
}

fn get_csh_imm6(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::csh_imm6(ctx.word) as i64))
}

fn get_csh_uimm6(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::csh_uimm6(ctx.word) as i64))
}

fn get_css_uimm6x4(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::css_uimm6x4(ctx.word) as i64))
}

fn get_css_uimm6x8(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::css_uimm6x8(ctx.word) as i64))
}

fn get_i_imm12(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::i_imm(ctx.word) as i64))
}

fn get_i_uimm5(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::r_uimm5(ctx.word) as i64))
}

fn get_i_uimm12(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::i_uimm12(ctx.word) as i64))
}

fn get_j_imm20(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::j_imm(ctx.word) as i64))
}

fn get_pcc(_: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Pcc)
}

fn get_rd_source(ctx: &DecodeContext) -> Option<SourceOperand> {
    let rd = encoding::rd(ctx.word);
    if u8::from(rd) == 0 {
        // A zero field is the compile-time literal 0, not a read of x0.
        return Some(SourceOperand::Literal(0));
    }
    Some(SourceOperand::XReg(rd))
}

fn get_rm(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Literal(encoding::funct3(ctx.word)))
}

fn get_rs1(ctx: &DecodeContext) -> Option<SourceOperand> {
    let rs1 = encoding::rs1(ctx.word);
    if u8::from(rs1) == 0 {
        return Some(SourceOperand::Literal(0));
    }
    Some(SourceOperand::XReg(rs1))
}

fn get_rs2(ctx: &DecodeContext) -> Option<SourceOperand> {
    let rs2 = encoding::rs2(ctx.word);
    if u8::from(rs2) == 0 {
        return Some(SourceOperand::Literal(0));
    }
    Some(SourceOperand::XReg(rs2))
}

fn get_s_imm12(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::s_imm(ctx.word) as i64))
}

fn get_scr(ctx: &DecodeContext) -> Option<SourceOperand> {
    // Indices outside 28..=31 yield null, signaling an illegal instruction.
    ScrSpecifier::from_index(u32::from(encoding::rs2(ctx.word))).map(SourceOperand::Scr)
}

fn get_s_imm20(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::u_imm(ctx.word) as i64))
}

fn get_u_imm20(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Imm(encoding::u_imm(ctx.word) as i64))
}

fn vec_group(field: Specifier) -> SourceOperand {
    let start = u8::from(field);
    SourceOperand::VecGroup {
        start,
        count: VECTOR_GROUP_SIZE[start as usize % 8],
    }
}

fn get_vd_source(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(vec_group(encoding::rd(ctx.word)))
}

fn get_vm(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::VecMask {
        unmasked: (ctx.word >> 25) & 1 == 1,
    })
}

fn get_vs1(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(vec_group(encoding::rs1(ctx.word)))
}

fn get_vs2(ctx: &DecodeContext) -> Option<SourceOperand> {
    Some(vec_group(encoding::rs2(ctx.word)))
}

fn get_x0(_: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::Literal(0))
}

fn get_x2(_: &DecodeContext) -> Option<SourceOperand> {
    Some(SourceOperand::XReg(Specifier::C2))
}

//
// Destination getters.
//

fn get_dest_none(_: &DecodeContext, _: u8) -> Option<DestOperand> {
    None
}

fn get_dest_c2(_: &DecodeContext, latency: u8) -> Option<DestOperand> {
    Some(DestOperand::new(
        DestOperandKind::CapReg(Specifier::C2),
        latency,
    ))
}

fn get_dest_c3cd(ctx: &DecodeContext, latency: u8) -> Option<DestOperand> {
    Some(DestOperand::new(
        DestOperandKind::CapReg(encoding::c_rd_prime(ctx.word)),
        latency,
    ))
}

fn get_dest_c3rd(ctx: &DecodeContext, latency: u8) -> Option<DestOperand> {
    Some(DestOperand::new(
        DestOperandKind::XReg(encoding::c_rd_prime(ctx.word)),
        latency,
    ))
}

fn get_dest_c3rs1(ctx: &DecodeContext, latency: u8) -> Option<DestOperand> {
    Some(DestOperand::new(
        DestOperandKind::XReg(encoding::c_rs1_prime(ctx.word)),
        latency,
    ))
}

fn get_dest_cd(ctx: &DecodeContext, latency: u8) -> Option<DestOperand> {
    let rd = encoding::rd(ctx.word);
    if u8::from(rd) == 0 {
        // Writes to c0 go to the sink register.
        return Some(DestOperand::new(DestOperandKind::Sink, latency));
    }
    Some(DestOperand::new(DestOperandKind::CapReg(rd), latency))
}

fn get_dest_cj_link(ctx: &DecodeContext, latency: u8) -> Option<DestOperand> {
    // The CJ format has no register field; the link register assignment is
    // keyed on the opcode alone.
    let kind = match ctx.opcode {
        Opcode::CompJal => DestOperandKind::CapReg(Specifier::C1),
        _ => DestOperandKind::Sink,
    };
    Some(DestOperand::new(kind, latency))
}

fn get_dest_csr(ctx: &DecodeContext, latency: u8) -> Option<DestOperand> {
    Some(DestOperand::new(
        DestOperandKind::Csr(encoding::i_uimm12(ctx.word) as u16),
        latency,
    ))
}

fn get_dest_frd(ctx: &DecodeContext, latency: u8) -> Option<DestOperand> {
    Some(DestOperand::new(
        DestOperandKind::FpReg(u8::from(encoding::rd(ctx.word))),
        latency,
    ))
}

fn get_dest_rd(ctx: &DecodeContext, latency: u8) -> Option<DestOperand> {
    let rd = encoding::rd(ctx.word);
    if u8::from(rd) == 0 {
        return Some(DestOperand::new(DestOperandKind::Sink, 0));
    }
    Some(DestOperand::new(DestOperandKind::XReg(rd), latency))
}

fn get_dest_scr(ctx: &DecodeContext, latency: u8) -> Option<DestOperand> {
    let scr = ScrSpecifier::from_index(u32::from(encoding::rs2(ctx.word)))?;
    Some(DestOperand::new(DestOperandKind::Scr(scr), latency))
}

fn get_dest_vd(ctx: &DecodeContext, latency: u8) -> Option<DestOperand> {
    let start = u8::from(encoding::rd(ctx.word));
    Some(DestOperand::new(
        DestOperandKind::VecGroup {
            start,
            count: VECTOR_GROUP_SIZE[start as usize % 8],
        },
        latency,
    ))
}

fn get_dest_x1(_: &DecodeContext, latency: u8) -> Option<DestOperand> {
    Some(DestOperand::new(
        DestOperandKind::CapReg(Specifier::C1),
        latency,
    ))
}

//
// The registries: dense arrays indexed by the operand enums.
//

static SOURCE_GETTERS: [Option<SourceGetter>; SourceOp::COUNT] = build_source_getters();
static DEST_GETTERS: [Option<DestGetter>; DestOp::COUNT] = build_dest_getters();

const fn build_source_getters() -> [Option<SourceGetter>; SourceOp::COUNT] {
    let mut table: [Option<SourceGetter>; SourceOp::COUNT] = [None; SourceOp::COUNT];
    table[SourceOp::None as usize] = Some(get_none as SourceGetter);
    table[SourceOp::AAq as usize] = Some(get_a_aq as SourceGetter);
    table[SourceOp::ARl as usize] = Some(get_a_rl as SourceGetter);
    table[SourceOp::BImm12 as usize] = Some(get_b_imm12 as SourceGetter);
    table[SourceOp::C2 as usize] = Some(get_c2 as SourceGetter);
    table[SourceOp::C3cs1 as usize] = Some(get_c3cs1 as SourceGetter);
    table[SourceOp::C3cs2 as usize] = Some(get_c3cs2 as SourceGetter);
    table[SourceOp::C3rs1 as usize] = Some(get_c3rs1 as SourceGetter);
    table[SourceOp::C3rs2 as usize] = Some(get_c3rs2 as SourceGetter);
    table[SourceOp::Ccrs1 as usize] = Some(get_ccrs1 as SourceGetter);
    table[SourceOp::Ccrs2 as usize] = Some(get_ccrs2 as SourceGetter);
    table[SourceOp::Ccs2 as usize] = Some(get_ccs2 as SourceGetter);
    table[SourceOp::Cgp as usize] = Some(get_cgp as SourceGetter);
    table[SourceOp::CsrUimm5 as usize] = Some(get_csr_uimm5 as SourceGetter);
    table[SourceOp::Crs1 as usize] = Some(get_crs1 as SourceGetter);
    table[SourceOp::Crs2 as usize] = Some(get_crs2 as SourceGetter);
    table[SourceOp::Cs1 as usize] = Some(get_cs1 as SourceGetter);
    table[SourceOp::Cs2 as usize] = Some(get_cs2 as SourceGetter);
    table[SourceOp::Csr as usize] = Some(get_csr as SourceGetter);
    table[SourceOp::Frs1 as usize] = Some(get_frs1 as SourceGetter);
    table[SourceOp::Frs2 as usize] = Some(get_frs2 as SourceGetter);
    table[SourceOp::Frs3 as usize] = Some(get_frs3 as SourceGetter);
    table[SourceOp::ICbImm8 as usize] = Some(get_cb_imm8 as SourceGetter);
    table[SourceOp::ICiImm6 as usize] = Some(get_ci_imm6 as SourceGetter);
    table[SourceOp::ICiImm612 as usize] = Some(get_ci_imm612 as SourceGetter);
    table[SourceOp::ICiImm6x16 as usize] = Some(get_ci_imm6x16 as SourceGetter);
    table[SourceOp::ICiUimm6 as usize] = Some(get_ci_uimm6 as SourceGetter);
    table[SourceOp::ICiUimm6x4 as usize] = Some(get_ci_uimm6x4 as SourceGetter);
    table[SourceOp::ICiUimm6x8 as usize] = Some(get_ci_uimm6x8 as SourceGetter);
    table[SourceOp::ICiwUimm8x4 as usize] = Some(get_ciw_uimm8x4 as SourceGetter);
    table[SourceOp::ICjImm11 as usize] = Some(get_cj_imm11 as SourceGetter);
    table[SourceOp::IClUimm5x4 as usize] = Some(get_cl_uimm5x4 as SourceGetter);
    table[SourceOp::IClUimm5x8 as usize] = Some(get_cl_uimm5x8 as SourceGetter);
    table[SourceOp::ICshImm6 as usize] = Some(get_csh_imm6 as SourceGetter);
    table[SourceOp::ICshUimm6 as usize] = Some(get_csh_uimm6 as SourceGetter);
    table[SourceOp::ICssUimm6x4 as usize] = Some(get_css_uimm6x4 as SourceGetter);
    table[SourceOp::ICssUimm6x8 as usize] = Some(get_css_uimm6x8 as SourceGetter);
    table[SourceOp::IImm12 as usize] = Some(get_i_imm12 as SourceGetter);
    table[SourceOp::IUimm5 as usize] = Some(get_i_uimm5 as SourceGetter);
    table[SourceOp::IUimm12 as usize] = Some(get_i_uimm12 as SourceGetter);
    table[SourceOp::JImm20 as usize] = Some(get_j_imm20 as SourceGetter);
    table[SourceOp::Pcc as usize] = Some(get_pcc as SourceGetter);
    table[SourceOp::Rd as usize] = Some(get_rd_source as SourceGetter);
    table[SourceOp::Rm as usize] = Some(get_rm as SourceGetter);
    table[SourceOp::Rs1 as usize] = Some(get_rs1 as SourceGetter);
    table[SourceOp::Rs2 as usize] = Some(get_rs2 as SourceGetter);
    table[SourceOp::SImm12 as usize] = Some(get_s_imm12 as SourceGetter);
    table[SourceOp::Scr as usize] = Some(get_scr as SourceGetter);
    table[SourceOp::SImm20 as usize] = Some(get_s_imm20 as SourceGetter);
    table[SourceOp::UImm20 as usize] = Some(get_u_imm20 as SourceGetter);
    table[SourceOp::Vd as usize] = Some(get_vd_source as SourceGetter);
    table[SourceOp::Vm as usize] = Some(get_vm as SourceGetter);
    table[SourceOp::Vs1 as usize] = Some(get_vs1 as SourceGetter);
    table[SourceOp::Vs2 as usize] = Some(get_vs2 as SourceGetter);
    table[SourceOp::X0 as usize] = Some(get_x0 as SourceGetter);
    table[SourceOp::X2 as usize] = Some(get_x2 as SourceGetter);
    table
}

const fn build_dest_getters() -> [Option<DestGetter>; DestOp::COUNT] {
    let mut table: [Option<DestGetter>; DestOp::COUNT] = [None; DestOp::COUNT];
    table[DestOp::None as usize] = Some(get_dest_none as DestGetter);
    table[DestOp::C2 as usize] = Some(get_dest_c2 as DestGetter);
    table[DestOp::C3cd as usize] = Some(get_dest_c3cd as DestGetter);
    table[DestOp::C3rd as usize] = Some(get_dest_c3rd as DestGetter);
    table[DestOp::C3rs1 as usize] = Some(get_dest_c3rs1 as DestGetter);
    table[DestOp::Cd as usize] = Some(get_dest_cd as DestGetter);
    table[DestOp::CjLink as usize] = Some(get_dest_cj_link as DestGetter);
    table[DestOp::Csr as usize] = Some(get_dest_csr as DestGetter);
    table[DestOp::Frd as usize] = Some(get_dest_frd as DestGetter);
    table[DestOp::Rd as usize] = Some(get_dest_rd as DestGetter);
    table[DestOp::Scr as usize] = Some(get_dest_scr as DestGetter);
    table[DestOp::Vd as usize] = Some(get_dest_vd as DestGetter);
    table[DestOp::X1 as usize] = Some(get_dest_x1 as DestGetter);
    table
}

const_assert_eq!(SourceOp::ALL.len(), SourceOp::COUNT);
const_assert_eq!(DestOp::ALL.len(), DestOp::COUNT);
