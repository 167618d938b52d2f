//! The decode tables.
//!
//! Each table row maps a masked bit pattern to its opcode, format, operand
//! enums and semantic function. The tables are data, not code: the decoder
//! walks them in order and takes the first match, so rows are ordered by
//! specificity (larger masks first) within each table. Loads carry a child
//! spec describing the data phase that runs once the memory system has
//! produced the value.

use super::operands::{DestOp, SourceOp};
use super::{Format, Opcode};
use crate::execute::*;
use crate::instruction::SemanticFn;

/// The completion phase of a split memory operation.
pub struct ChildSpec {
    pub dests: &'static [DestOp],
    pub semantic: SemanticFn,
}

/// One decode-table row.
pub struct DecodeEntry {
    pub mask: u32,
    pub value: u32,
    pub opcode: Opcode,
    pub format: Format,
    pub mnemonic: &'static str,
    pub sources: &'static [SourceOp],
    pub dests: &'static [DestOp],
    pub semantic: SemanticFn,
    pub child: Option<&'static ChildSpec>,
}

/// Find the first (most specific) 32-bit table row matching `word`.
pub fn lookup_32(word: u32) -> Option<&'static DecodeEntry> {
    DECODE_32.iter().find(|entry| word & entry.mask == entry.value)
}

/// Find the first (most specific) 16-bit table row matching the low half of
/// `word`.
pub fn lookup_16(word: u32) -> Option<&'static DecodeEntry> {
    let word = word & 0xFFFF;
    DECODE_16.iter().find(|entry| word & entry.mask == entry.value)
}

macro_rules! entry {
    ($mask:expr, $value:expr, $opcode:ident, $format:ident, $mnemonic:expr,
     [$($source:ident),*], [$($dest:ident),*], $semantic:expr) => {
        DecodeEntry {
            mask: $mask,
            value: $value,
            opcode: Opcode::$opcode,
            format: Format::$format,
            mnemonic: $mnemonic,
            sources: &[$(SourceOp::$source),*],
            dests: &[$(DestOp::$dest),*],
            semantic: $semantic,
            child: None,
        }
    };
    ($mask:expr, $value:expr, $opcode:ident, $format:ident, $mnemonic:expr,
     [$($source:ident),*], [$($dest:ident),*], $semantic:expr, $child:expr) => {
        DecodeEntry {
            mask: $mask,
            value: $value,
            opcode: Opcode::$opcode,
            format: Format::$format,
            mnemonic: $mnemonic,
            sources: &[$(SourceOp::$source),*],
            dests: &[$(DestOp::$dest),*],
            semantic: $semantic,
            child: Some($child),
        }
    };
}

static LOAD_B_CHILD: ChildSpec = ChildSpec { dests: &[DestOp::Rd], semantic: sem_load_complete_b };
static LOAD_H_CHILD: ChildSpec = ChildSpec { dests: &[DestOp::Rd], semantic: sem_load_complete_h };
static LOAD_W_CHILD: ChildSpec = ChildSpec { dests: &[DestOp::Rd], semantic: sem_load_complete_w };
static LOAD_BU_CHILD: ChildSpec = ChildSpec { dests: &[DestOp::Rd], semantic: sem_load_complete_bu };
static LOAD_HU_CHILD: ChildSpec = ChildSpec { dests: &[DestOp::Rd], semantic: sem_load_complete_hu };
static LOAD_CAP_CHILD: ChildSpec = ChildSpec { dests: &[DestOp::Cd], semantic: sem_load_cap_complete };
static CLW_CHILD: ChildSpec = ChildSpec { dests: &[DestOp::C3rd], semantic: sem_load_complete_w };
static CLC_CHILD: ChildSpec = ChildSpec { dests: &[DestOp::C3cd], semantic: sem_load_cap_complete };
static AMO_CHILD: ChildSpec = ChildSpec { dests: &[DestOp::Rd], semantic: sem_load_complete_w };

/// 32-bit decode table. Rows are grouped by descending mask specificity;
/// within a group order is immaterial because patterns are disjoint.
static DECODE_32: [DecodeEntry; 100] = [
    // Fully-specified system encodings.
    entry!(0xFFFF_FFFF, 0x0000_0073, Ecall, I, "ecall", [], [], sem_ecall),
    entry!(0xFFFF_FFFF, 0x0010_0073, Ebreak, I, "ebreak", [], [], sem_ebreak),
    entry!(0xFFFF_FFFF, 0x3020_0073, Mret, I, "mret", [], [], sem_mret),
    entry!(0xFFFF_FFFF, 0x1050_0073, Wfi, I, "wfi", [], [], sem_wfi),
    // Unary capability operations: funct7 = 0x7f, operation in the rs2 field.
    entry!(0xFFF0_707F, 0xFE00_005B, CGetPerm, R2, "cgetperm", [Cs1], [Rd], sem_cgetperm),
    entry!(0xFFF0_707F, 0xFE10_005B, CGetType, R2, "cgettype", [Cs1], [Rd], sem_cgettype),
    entry!(0xFFF0_707F, 0xFE20_005B, CGetBase, R2, "cgetbase", [Cs1], [Rd], sem_cgetbase),
    entry!(0xFFF0_707F, 0xFE30_005B, CGetLen, R2, "cgetlen", [Cs1], [Rd], sem_cgetlen),
    entry!(0xFFF0_707F, 0xFE40_005B, CGetTag, R2, "cgettag", [Cs1], [Rd], sem_cgettag),
    entry!(0xFFF0_707F, 0xFE80_005B, Crrl, R2, "crrl", [Rs1], [Rd], sem_crrl),
    entry!(0xFFF0_707F, 0xFE90_005B, Cram, R2, "cram", [Rs1], [Rd], sem_cram),
    entry!(0xFFF0_707F, 0xFEA0_005B, CMove, R2, "cmove", [Cs1], [Cd], sem_cmove),
    entry!(0xFFF0_707F, 0xFEB0_005B, CClearTag, R2, "ccleartag", [Cs1], [Cd], sem_ccleartag),
    entry!(0xFFF0_707F, 0xFEF0_005B, CGetAddr, R2, "cgetaddr", [Cs1], [Rd], sem_cgetaddr),
    entry!(0xFFF0_707F, 0xFF70_005B, CGetHigh, R2, "cgethigh", [Cs1], [Rd], sem_cgethigh),
    entry!(0xFFF0_707F, 0xFF80_005B, CGetTop, R2, "cgettop", [Cs1], [Rd], sem_cgettop),
    // lr.w requires a zero rs2 field (aq/rl are don't-care).
    entry!(0xF9F0_707F, 0x1000_202F, LrW, A, "lr.w", [Cs1, AAq, ARl], [], sem_lr_w, &AMO_CHILD),
    // Two-source capability operations, selected by funct7.
    entry!(0xFE00_707F, 0x0200_005B, CSpecialRw, R, "cspecialrw", [Cs1, Scr], [Cd, Scr], sem_cspecialrw),
    entry!(0xFE00_707F, 0x1000_005B, CSetBounds, R, "csetbounds", [Cs1, Rs2], [Cd], sem_csetbounds),
    entry!(0xFE00_707F, 0x1200_005B, CSetBoundsExact, R, "csetboundsexact", [Cs1, Rs2], [Cd], sem_csetboundsexact),
    entry!(0xFE00_707F, 0x1600_005B, CSeal, R, "cseal", [Cs1, Cs2], [Cd], sem_cseal),
    entry!(0xFE00_707F, 0x1800_005B, CUnseal, R, "cunseal", [Cs1, Cs2], [Cd], sem_cunseal),
    entry!(0xFE00_707F, 0x1A00_005B, CAndPerm, R, "candperm", [Cs1, Rs2], [Cd], sem_candperm),
    entry!(0xFE00_707F, 0x2000_005B, CSetAddr, R, "csetaddr", [Cs1, Rs2], [Cd], sem_csetaddr),
    entry!(0xFE00_707F, 0x2200_005B, CIncAddr, R, "cincaddr", [Cs1, Rs2], [Cd], sem_cincaddr),
    entry!(0xFE00_707F, 0x2800_005B, CSub, R, "csub", [Cs1, Cs2], [Rd], sem_sub),
    entry!(0xFE00_707F, 0x2C00_005B, CSetHigh, R, "csethigh", [Cs1, Rs2], [Cd], sem_csethigh),
    entry!(0xFE00_707F, 0x4000_005B, CTestSubset, R, "ctestsubset", [Cs1, Cs2], [Rd], sem_ctestsubset),
    entry!(0xFE00_707F, 0x4200_005B, CSetEqualExact, R, "csetequalexact", [Cs1, Cs2], [Rd], sem_csetequalexact),
    // Base register-register ALU (funct7 + funct3).
    entry!(0xFE00_707F, 0x0000_0033, Add, R, "add", [Rs1, Rs2], [Rd], sem_add),
    entry!(0xFE00_707F, 0x4000_0033, Sub, R, "sub", [Rs1, Rs2], [Rd], sem_sub),
    entry!(0xFE00_707F, 0x0000_1033, Sll, R, "sll", [Rs1, Rs2], [Rd], sem_sll),
    entry!(0xFE00_707F, 0x0000_2033, Slt, R, "slt", [Rs1, Rs2], [Rd], sem_slt),
    entry!(0xFE00_707F, 0x0000_3033, Sltu, R, "sltu", [Rs1, Rs2], [Rd], sem_sltu),
    entry!(0xFE00_707F, 0x0000_4033, Xor, R, "xor", [Rs1, Rs2], [Rd], sem_xor),
    entry!(0xFE00_707F, 0x0000_5033, Srl, R, "srl", [Rs1, Rs2], [Rd], sem_srl),
    entry!(0xFE00_707F, 0x4000_5033, Sra, R, "sra", [Rs1, Rs2], [Rd], sem_sra),
    entry!(0xFE00_707F, 0x0000_6033, Or, R, "or", [Rs1, Rs2], [Rd], sem_or),
    entry!(0xFE00_707F, 0x0000_7033, And, R, "and", [Rs1, Rs2], [Rd], sem_and),
    entry!(0xFE00_707F, 0x0200_0033, Mul, R, "mul", [Rs1, Rs2], [Rd], sem_mul),
    entry!(0xFE00_707F, 0x0200_1033, Mulh, R, "mulh", [Rs1, Rs2], [Rd], sem_mulh),
    entry!(0xFE00_707F, 0x0200_2033, Mulhsu, R, "mulhsu", [Rs1, Rs2], [Rd], sem_mulhsu),
    entry!(0xFE00_707F, 0x0200_3033, Mulhu, R, "mulhu", [Rs1, Rs2], [Rd], sem_mulhu),
    entry!(0xFE00_707F, 0x0200_4033, Div, R, "div", [Rs1, Rs2], [Rd], sem_div),
    entry!(0xFE00_707F, 0x0200_5033, Divu, R, "divu", [Rs1, Rs2], [Rd], sem_divu),
    entry!(0xFE00_707F, 0x0200_6033, Rem, R, "rem", [Rs1, Rs2], [Rd], sem_rem),
    entry!(0xFE00_707F, 0x0200_7033, Remu, R, "remu", [Rs1, Rs2], [Rd], sem_remu),
    // Shift-immediate forms (funct7 + funct3).
    entry!(0xFE00_707F, 0x0000_1013, Slli, I, "slli", [Rs1, IUimm5], [Rd], sem_sll),
    entry!(0xFE00_707F, 0x0000_5013, Srli, I, "srli", [Rs1, IUimm5], [Rd], sem_srl),
    entry!(0xFE00_707F, 0x4000_5013, Srai, I, "srai", [Rs1, IUimm5], [Rd], sem_sra),
    // Vector configuration.
    entry!(0xFE00_707F, 0x8000_7057, Vsetvl, R, "vsetvl", [Rs1, Rs2], [Rd], sem_vsetvl),
    // Atomics (funct5 + funct3; aq/rl are operands).
    entry!(0xF800_707F, 0x1800_202F, ScW, A, "sc.w", [Cs1, Rs2, AAq, ARl], [Rd], sem_sc_w),
    entry!(0xF800_707F, 0x0800_202F, AmoSwapW, A, "amoswap.w", [Cs1, Rs2, AAq, ARl], [], sem_amoswap_w, &AMO_CHILD),
    entry!(0xF800_707F, 0x0000_202F, AmoAddW, A, "amoadd.w", [Cs1, Rs2, AAq, ARl], [], sem_amoadd_w, &AMO_CHILD),
    entry!(0xF800_707F, 0x2000_202F, AmoXorW, A, "amoxor.w", [Cs1, Rs2, AAq, ARl], [], sem_amoxor_w, &AMO_CHILD),
    entry!(0xF800_707F, 0x6000_202F, AmoAndW, A, "amoand.w", [Cs1, Rs2, AAq, ARl], [], sem_amoand_w, &AMO_CHILD),
    entry!(0xF800_707F, 0x4000_202F, AmoOrW, A, "amoor.w", [Cs1, Rs2, AAq, ARl], [], sem_amoor_w, &AMO_CHILD),
    entry!(0xF800_707F, 0x8000_202F, AmoMinW, A, "amomin.w", [Cs1, Rs2, AAq, ARl], [], sem_amomin_w, &AMO_CHILD),
    entry!(0xF800_707F, 0xA000_202F, AmoMaxW, A, "amomax.w", [Cs1, Rs2, AAq, ARl], [], sem_amomax_w, &AMO_CHILD),
    entry!(0xF800_707F, 0xC000_202F, AmoMinuW, A, "amominu.w", [Cs1, Rs2, AAq, ARl], [], sem_amominu_w, &AMO_CHILD),
    entry!(0xF800_707F, 0xE000_202F, AmoMaxuW, A, "amomaxu.w", [Cs1, Rs2, AAq, ARl], [], sem_amomaxu_w, &AMO_CHILD),
    entry!(0xC000_707F, 0xC000_7057, Vsetivli, I2, "vsetivli", [CsrUimm5, IUimm12], [Rd], sem_vsetivli),
    entry!(0x8000_707F, 0x0000_7057, Vsetvli, I, "vsetvli", [Rs1, IUimm12], [Rd], sem_vsetvli),
    // funct3-discriminated forms.
    entry!(0x0000_707F, 0x0000_0063, Beq, B, "beq", [Rs1, Rs2, BImm12], [], sem_beq),
    entry!(0x0000_707F, 0x0000_1063, Bne, B, "bne", [Rs1, Rs2, BImm12], [], sem_bne),
    entry!(0x0000_707F, 0x0000_4063, Blt, B, "blt", [Rs1, Rs2, BImm12], [], sem_blt),
    entry!(0x0000_707F, 0x0000_5063, Bge, B, "bge", [Rs1, Rs2, BImm12], [], sem_bge),
    entry!(0x0000_707F, 0x0000_6063, Bltu, B, "bltu", [Rs1, Rs2, BImm12], [], sem_bltu),
    entry!(0x0000_707F, 0x0000_7063, Bgeu, B, "bgeu", [Rs1, Rs2, BImm12], [], sem_bgeu),
    entry!(0x0000_707F, 0x0000_0003, Lb, I, "lb", [Cs1, IImm12], [], sem_load_b, &LOAD_B_CHILD),
    entry!(0x0000_707F, 0x0000_1003, Lh, I, "lh", [Cs1, IImm12], [], sem_load_h, &LOAD_H_CHILD),
    entry!(0x0000_707F, 0x0000_2003, Lw, I, "lw", [Cs1, IImm12], [], sem_load_w, &LOAD_W_CHILD),
    entry!(0x0000_707F, 0x0000_3003, CLoadCap, I, "clc", [Cs1, IImm12], [], sem_load_cap, &LOAD_CAP_CHILD),
    entry!(0x0000_707F, 0x0000_4003, Lbu, I, "lbu", [Cs1, IImm12], [], sem_load_bu, &LOAD_BU_CHILD),
    entry!(0x0000_707F, 0x0000_5003, Lhu, I, "lhu", [Cs1, IImm12], [], sem_load_hu, &LOAD_HU_CHILD),
    entry!(0x0000_707F, 0x0000_0023, Sb, S, "sb", [Cs1, SImm12, Rs2], [], sem_store_b),
    entry!(0x0000_707F, 0x0000_1023, Sh, S, "sh", [Cs1, SImm12, Rs2], [], sem_store_h),
    entry!(0x0000_707F, 0x0000_2023, Sw, S, "sw", [Cs1, SImm12, Rs2], [], sem_store_w),
    entry!(0x0000_707F, 0x0000_3023, CStoreCap, S, "csc", [Cs1, SImm12, Cs2], [], sem_store_cap),
    entry!(0x0000_707F, 0x0000_0013, Addi, I, "addi", [Rs1, IImm12], [Rd], sem_add),
    entry!(0x0000_707F, 0x0000_2013, Slti, I, "slti", [Rs1, IImm12], [Rd], sem_slt),
    entry!(0x0000_707F, 0x0000_3013, Sltiu, I, "sltiu", [Rs1, IImm12], [Rd], sem_sltu),
    entry!(0x0000_707F, 0x0000_4013, Xori, I, "xori", [Rs1, IImm12], [Rd], sem_xor),
    entry!(0x0000_707F, 0x0000_6013, Ori, I, "ori", [Rs1, IImm12], [Rd], sem_or),
    entry!(0x0000_707F, 0x0000_7013, Andi, I, "andi", [Rs1, IImm12], [Rd], sem_and),
    entry!(0x0000_707F, 0x0000_000F, Fence, I, "fence", [], [], sem_fence),
    entry!(0x0000_707F, 0x0000_100F, FenceI, I, "fence.i", [], [], sem_fence_i),
    entry!(0x0000_707F, 0x0000_1073, Csrrw, I, "csrrw", [Csr, Rs1], [Csr, Rd], sem_csrrw),
    entry!(0x0000_707F, 0x0000_2073, Csrrs, I, "csrrs", [Csr, Rs1], [Csr, Rd], sem_csrrs),
    entry!(0x0000_707F, 0x0000_3073, Csrrc, I, "csrrc", [Csr, Rs1], [Csr, Rd], sem_csrrc),
    entry!(0x0000_707F, 0x0000_5073, Csrrwi, I2, "csrrwi", [Csr, CsrUimm5], [Csr, Rd], sem_csrrw),
    entry!(0x0000_707F, 0x0000_6073, Csrrsi, I2, "csrrsi", [Csr, CsrUimm5], [Csr, Rd], sem_csrrs),
    entry!(0x0000_707F, 0x0000_7073, Csrrci, I2, "csrrci", [Csr, CsrUimm5], [Csr, Rd], sem_csrrc),
    entry!(0x0000_707F, 0x0000_105B, CIncAddrImm, I, "cincaddrimm", [Cs1, IImm12], [Cd], sem_cincaddr),
    entry!(0x0000_707F, 0x0000_205B, CSetBoundsImm, I, "csetboundsimm", [Cs1, IUimm12], [Cd], sem_csetbounds),
    entry!(0x0000_707F, 0x0000_0067, Cjalr, I, "cjalr", [Cs1, IImm12], [Cd], sem_cjalr),
    // Opcode-only forms.
    entry!(0x0000_007F, 0x0000_0037, Lui, U, "lui", [UImm20], [Rd], sem_li),
    entry!(0x0000_007F, 0x0000_0017, Auipcc, U, "auipcc", [Pcc, SImm20], [Cd], sem_auipcc),
    entry!(0x0000_007F, 0x0000_007B, Auicgp, U, "auicgp", [Cgp, SImm20], [Cd], sem_auipcc),
    entry!(0x0000_007F, 0x0000_006F, Cjal, J, "cjal", [JImm20], [Cd], sem_cjal),
];

/// 16-bit decode table, same ordering discipline as [`DECODE_32`].
static DECODE_16: [DecodeEntry; 31] = [
    entry!(0xFFFF, 0x0001, CompNop, CI, "c.nop", [], [], sem_nop),
    entry!(0xFFFF, 0x9002, CompEbreak, CR, "c.ebreak", [], [], sem_ebreak),
    entry!(0xEF83, 0x6101, CompAddi16sp, CI, "c.addi16sp", [C2, ICiImm6x16], [C2], sem_cincaddr),
    entry!(0xF07F, 0x8002, CompJr, CR, "c.jr", [Ccrs1], [], sem_cjalr),
    entry!(0xF07F, 0x9002, CompJalr, CR, "c.jalr", [Ccrs1], [X1], sem_cjalr),
    entry!(0xFC63, 0x8C01, CompSub, CA, "c.sub", [C3rs1, C3rs2], [C3rd], sem_sub),
    entry!(0xFC63, 0x8C21, CompXor, CA, "c.xor", [C3rs1, C3rs2], [C3rd], sem_xor),
    entry!(0xFC63, 0x8C41, CompOr, CA, "c.or", [C3rs1, C3rs2], [C3rd], sem_or),
    entry!(0xFC63, 0x8C61, CompAnd, CA, "c.and", [C3rs1, C3rs2], [C3rd], sem_and),
    entry!(0xF003, 0x8002, CompMv, CR, "c.mv", [Ccrs2], [Cd], sem_cmove),
    entry!(0xF003, 0x9002, CompAdd, CR, "c.add", [Crs1, Crs2], [Rd], sem_add),
    entry!(0xEC03, 0x8001, CompSrli, CSH, "c.srli", [C3rs1, ICshUimm6], [C3rs1], sem_srl),
    entry!(0xEC03, 0x8401, CompSrai, CSH, "c.srai", [C3rs1, ICshUimm6], [C3rs1], sem_sra),
    entry!(0xEC03, 0x8801, CompAndi, CSH, "c.andi", [C3rs1, ICshImm6], [C3rs1], sem_and),
    entry!(0xE003, 0x0000, CompAddi4spn, CIW, "c.addi4spn", [C2, ICiwUimm8x4], [C3cd], sem_cincaddr),
    entry!(0xE003, 0x4000, CompLw, CL, "c.lw", [C3cs1, IClUimm5x4], [], sem_load_w, &CLW_CHILD),
    entry!(0xE003, 0x6000, CompLc, CL, "c.lc", [C3cs1, IClUimm5x8], [], sem_load_cap, &CLC_CHILD),
    entry!(0xE003, 0xC000, CompSw, CS, "c.sw", [C3cs1, IClUimm5x4, C3rs2], [], sem_store_w),
    entry!(0xE003, 0xE000, CompSc, CS, "c.sc", [C3cs1, IClUimm5x8, C3cs2], [], sem_store_cap),
    entry!(0xE003, 0x0001, CompAddi, CI, "c.addi", [Rd, ICiImm6], [Rd], sem_add),
    entry!(0xE003, 0x2001, CompJal, CJ, "c.jal", [ICjImm11], [CjLink], sem_cjal),
    entry!(0xE003, 0x4001, CompLi, CI, "c.li", [ICiImm6], [Rd], sem_li),
    entry!(0xE003, 0x6001, CompLui, CI, "c.lui", [ICiImm612], [Rd], sem_li),
    entry!(0xE003, 0xA001, CompJ, CJ, "c.j", [ICjImm11], [CjLink], sem_cjal),
    entry!(0xE003, 0xC001, CompBeqz, CB, "c.beqz", [C3rs1, X0, ICbImm8], [], sem_beq),
    entry!(0xE003, 0xE001, CompBnez, CB, "c.bnez", [C3rs1, X0, ICbImm8], [], sem_bne),
    entry!(0xE003, 0x0002, CompSlli, CI, "c.slli", [Rd, ICiUimm6], [Rd], sem_sll),
    entry!(0xE003, 0x4002, CompLwsp, CI, "c.lwsp", [C2, ICiUimm6x4], [], sem_load_w, &LOAD_W_CHILD),
    entry!(0xE003, 0x6002, CompLcsp, CI, "c.lcsp", [C2, ICiUimm6x8], [], sem_load_cap, &LOAD_CAP_CHILD),
    entry!(0xE003, 0xC002, CompSwsp, CSS, "c.swsp", [C2, ICssUimm6x4, Crs2], [], sem_store_w),
    entry!(0xE003, 0xE002, CompScsp, CSS, "c.scsp", [C2, ICssUimm6x8, Ccs2], [], sem_store_cap),
];
