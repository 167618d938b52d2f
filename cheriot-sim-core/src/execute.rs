//! Semantic functions.
//!
//! Every function here follows the same contract: it reads its pre-bound
//! source operands in order, performs the operation, and writes its
//! destination operands in order. A fault calls into the trap engine and
//! returns before any destination is written, so a trapping instruction has
//! no architectural effects beyond the trap itself.
//!
//! Capability checks follow the fixed order tag, permission, seal, bounds;
//! the first failing check wins.

use crate::capability::{CapabilityRegister, Permissions, OTYPE_FIRST, OTYPE_LAST, OTYPE_SENTRY};
use crate::csr::ScrSpecifier;
use crate::decode::operands::{DestOperandKind, SourceOperand};
use crate::instruction::Instruction;
use crate::memory::AtomicOp;
use crate::registers::Specifier;
use crate::state::{CapException, CapIndex, CheriotState, Exception};
use log::trace;

//
// Operand access helpers.
//

/// Read a source operand as a 32-bit integer (the address view for
/// capability-shaped operands).
fn src_u32(inst: &Instruction, state: &CheriotState, index: usize) -> u32 {
    match inst.source(index) {
        SourceOperand::XReg(r) | SourceOperand::CapReg(r) => state.registers().x(*r),
        SourceOperand::Pcc => state.pcc().address(),
        SourceOperand::Scr(scr) => state.scr(*scr).address(),
        SourceOperand::Imm(imm) => *imm as u32,
        SourceOperand::Literal(value) => *value,
        SourceOperand::Csr { index, .. } => *index as u32,
        SourceOperand::None
        | SourceOperand::FpReg(_)
        | SourceOperand::VecGroup { .. }
        | SourceOperand::VecMask { .. } => 0,
    }
}

/// Read a source operand as a full capability. Non-capability operands yield
/// the null capability.
fn src_cap(inst: &Instruction, state: &CheriotState, index: usize) -> CapabilityRegister {
    match inst.source(index) {
        SourceOperand::CapReg(r) => state.registers().c(*r).clone(),
        SourceOperand::Pcc => state.pcc().clone(),
        SourceOperand::Scr(scr) => state.scr(*scr).clone(),
        _ => CapabilityRegister::null(),
    }
}

/// The capability index of a source operand, for fault reporting and the
/// state's memory entrypoints.
fn auth_index(inst: &Instruction, index: usize) -> CapIndex {
    match inst.source(index) {
        SourceOperand::CapReg(r) | SourceOperand::XReg(r) => CapIndex::Register(*r),
        SourceOperand::Pcc => CapIndex::Pcc,
        SourceOperand::Scr(ScrSpecifier::Mtcc) => CapIndex::Mtcc,
        SourceOperand::Scr(ScrSpecifier::Mtdc) => CapIndex::Mtdc,
        SourceOperand::Scr(ScrSpecifier::Mscratchc) => CapIndex::Mscratchc,
        SourceOperand::Scr(ScrSpecifier::Mepcc) => CapIndex::Mepcc,
        _ => CapIndex::Register(Specifier::C0),
    }
}

/// Write an integer result: the target register becomes the null capability
/// carrying the value as its address.
fn write_dest_u32(inst: &Instruction, state: &mut CheriotState, index: usize, value: u32) {
    match &inst.destination(index).kind {
        DestOperandKind::XReg(r) | DestOperandKind::CapReg(r) => {
            state.registers_mut().set_x(*r, value)
        }
        DestOperandKind::FpReg(r) => state.set_fp_register(*r, value as u64),
        DestOperandKind::Csr(csr) => {
            let _ = state.write_csr(*csr, state.privilege_mode(), value, !0);
        }
        DestOperandKind::Sink | DestOperandKind::None => {}
        DestOperandKind::Scr(_) | DestOperandKind::VecGroup { .. } => {}
    }
}

/// Write a capability result.
fn write_dest_cap(
    inst: &Instruction,
    state: &mut CheriotState,
    index: usize,
    value: CapabilityRegister,
) {
    match &inst.destination(index).kind {
        DestOperandKind::CapReg(r) => state.registers_mut().set_c(*r, value),
        DestOperandKind::XReg(r) => state.registers_mut().set_x(*r, value.address()),
        DestOperandKind::Scr(scr) => state.set_scr(*scr, value),
        _ => {}
    }
}

fn illegal_instruction(inst: &Instruction, state: &mut CheriotState) {
    state.trap(
        false,
        inst.raw(),
        Exception::IllegalInstruction.code(),
        inst.address(),
        Some(inst),
    );
}

/// Width in bytes of the smallest fetchable instruction, used for
/// control-flow bounds checks.
fn min_fetch_size(state: &CheriotState) -> u32 {
    if state.has_compact() {
        2
    } else {
        4
    }
}

//
// Integer computational instructions. One function serves both the
// register-register and the immediate form, since the operand list already
// fixed what the second source is.
//

fn binary_op(
    inst: &Instruction,
    state: &mut CheriotState,
    op: impl FnOnce(u32, u32) -> u32,
) {
    let a = src_u32(inst, state, 0);
    let b = src_u32(inst, state, 1);
    write_dest_u32(inst, state, 0, op(a, b));
}

/// > ADD performs the addition of rs1 and rs2. Arithmetic overflow is
/// > ignored and the result is simply the low XLEN bits of the result.
pub fn sem_add(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| a.wrapping_add(b));
}

/// > SUB performs the subtraction of rs2 from rs1.
pub fn sem_sub(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| a.wrapping_sub(b));
}

/// > SLT and SLTU perform signed and unsigned compares respectively, writing
/// > 1 to rd if rs1 < rs2, 0 otherwise.
pub fn sem_slt(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| ((a as i32) < (b as i32)) as u32);
}

pub fn sem_sltu(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| (a < b) as u32);
}

pub fn sem_and(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| a & b);
}

pub fn sem_or(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| a | b);
}

pub fn sem_xor(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| a ^ b);
}

/// Shifts take their amount from the low five bits of the second source,
/// whether it is a register or an immediate.
pub fn sem_sll(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| a << (b & 0x1F));
}

pub fn sem_srl(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| a >> (b & 0x1F));
}

pub fn sem_sra(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| ((a as i32) >> (b & 0x1F)) as u32);
}

/// Writes its immediate source: `lui`, `c.li`, `c.lui` (the extractors
/// pre-shift the value).
pub fn sem_li(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let value = src_u32(inst, state, 0);
    write_dest_u32(inst, state, 0, value);
}

/// `auipcc`/`auicgp`: derive a capability from pcc (or cgp) with the
/// upper immediate added to its address.
pub fn sem_auipcc(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let base = src_cap(inst, state, 0);
    let offset = src_u32(inst, state, 1);
    let mut result = base.clone();
    result.set_address(base.address().wrapping_add(offset));
    write_dest_cap(inst, state, 0, result);
}

//
// Multiply/divide.
//

pub fn sem_mul(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| a.wrapping_mul(b));
}

pub fn sem_mulh(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| {
        ((a as i32 as i64).wrapping_mul(b as i32 as i64) >> 32) as u32
    });
}

pub fn sem_mulhsu(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| {
        ((a as i32 as i64).wrapping_mul(b as i64) >> 32) as u32
    });
}

pub fn sem_mulhu(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| ((a as u64 * b as u64) >> 32) as u32);
}

/// > The quotient of division by zero has all bits set. Signed division
/// > overflow wraps to the dividend.
pub fn sem_div(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| {
        let (a, b) = (a as i32, b as i32);
        if b == 0 {
            u32::MAX
        } else {
            a.wrapping_div(b) as u32
        }
    });
}

pub fn sem_divu(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| if b == 0 { u32::MAX } else { a / b });
}

pub fn sem_rem(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| {
        let (a, b) = (a as i32, b as i32);
        if b == 0 {
            a as u32
        } else {
            a.wrapping_rem(b) as u32
        }
    });
}

pub fn sem_remu(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    binary_op(inst, state, |a, b| if b == 0 { a } else { a % b });
}

//
// Control transfer.
//

fn branch_target_ok(inst: &Instruction, state: &mut CheriotState, target: u32) -> bool {
    let misaligned = target & 1 != 0 || (!state.has_compact() && target & 0b10 != 0);
    if misaligned {
        state.trap(
            false,
            target,
            Exception::InstructionAddressMisaligned.code(),
            inst.address(),
            Some(inst),
        );
        return false;
    }
    true
}

fn branch_op(inst: &Instruction, state: &mut CheriotState, cond: impl FnOnce(u32, u32) -> bool) {
    let a = src_u32(inst, state, 0);
    let b = src_u32(inst, state, 1);
    if !cond(a, b) {
        return;
    }
    let target = inst.address().wrapping_add(src_u32(inst, state, 2));
    if !branch_target_ok(inst, state, target) {
        return;
    }
    state.pcc_mut().set_address(target);
    state.set_branch(true);
}

/// > Branch instructions compare two registers. The 12-bit B-immediate
/// > encodes signed offsets in multiples of 2 bytes, relative to the address
/// > of the branch instruction.
pub fn sem_beq(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    branch_op(inst, state, |a, b| a == b);
}

pub fn sem_bne(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    branch_op(inst, state, |a, b| a != b);
}

pub fn sem_blt(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    branch_op(inst, state, |a, b| (a as i32) < (b as i32));
}

pub fn sem_bge(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    branch_op(inst, state, |a, b| (a as i32) >= (b as i32));
}

pub fn sem_bltu(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    branch_op(inst, state, |a, b| a < b);
}

pub fn sem_bgeu(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    branch_op(inst, state, |a, b| a >= b);
}

/// `cjal`/`c.jal`/`c.j`: pc-relative jump; the link destination receives a
/// sealed entry capability derived from pcc so it can only be jumped
/// through.
pub fn sem_cjal(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let offset = src_u32(inst, state, 0);
    let target = inst.address().wrapping_add(offset);
    if !branch_target_ok(inst, state, target) {
        return;
    }
    let mut link = state.pcc().clone();
    link.set_address(inst.address().wrapping_add(inst.size()));
    link.seal(OTYPE_SENTRY);
    state.pcc_mut().set_address(target);
    state.set_branch(true);
    write_dest_cap(inst, state, 0, link);
}

/// `cjalr`/`c.jr`/`c.jalr`: jump through a capability, installing it as the
/// new pcc. Sealed entry capabilities are implicitly unsealed, but only when
/// no offset is applied.
pub fn sem_cjalr(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let target_cap = src_cap(inst, state, 0);
    let auth = auth_index(inst, 0);
    let offset = src_u32(inst, state, 1);
    let target = target_cap.address().wrapping_add(offset) & !1;
    let epc = inst.address();
    if !target_cap.tag() {
        state.handle_cheri_reg_exception(inst, epc, CapException::TagViolation, auth);
        return;
    }
    if !target_cap.has_permission(Permissions::EXECUTE) {
        state.handle_cheri_reg_exception(inst, epc, CapException::PermitExecuteViolation, auth);
        return;
    }
    if target_cap.is_sealed() && !(target_cap.is_sentry() && offset == 0) {
        state.handle_cheri_reg_exception(inst, epc, CapException::SealViolation, auth);
        return;
    }
    if !target_cap.is_in_bounds(target, min_fetch_size(state)) {
        state.handle_cheri_reg_exception(inst, epc, CapException::BoundsViolation, auth);
        return;
    }
    if !branch_target_ok(inst, state, target) {
        return;
    }
    let mut link = state.pcc().clone();
    link.set_address(epc.wrapping_add(inst.size()));
    link.seal(OTYPE_SENTRY);
    let mut new_pcc = target_cap;
    new_pcc.unseal();
    new_pcc.set_address(target);
    *state.pcc_mut() = new_pcc;
    state.set_branch(true);
    write_dest_cap(inst, state, 0, link);
}

/// `mret`: return from a trap through mepcc (the cjalr-through-mepcc
/// convention). Requires system-register access on pcc.
pub fn sem_mret(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    if !state.pcc().has_permission(Permissions::ACCESS_SYSTEM_REGISTERS) {
        state.handle_cheri_reg_exception(
            inst,
            inst.address(),
            CapException::PermitAccessSystemRegistersViolation,
            CapIndex::Pcc,
        );
        return;
    }
    let mut new_pcc = state.scr(ScrSpecifier::Mepcc).clone();
    if new_pcc.is_sentry() {
        new_pcc.unseal();
    }
    let target = new_pcc.address() & !1;
    new_pcc.set_address(target);
    *state.pcc_mut() = new_pcc;
    state.set_branch(true);
    state.signal_return_from_interrupt();
}

//
// Memory.
//

fn effective_address(inst: &Instruction, state: &CheriotState, cap: &CapabilityRegister) -> u32 {
    cap.address().wrapping_add(src_u32(inst, state, 1))
}

fn load_op(inst: &Instruction, state: &mut CheriotState, size: u32) {
    let cap = src_cap(inst, state, 0);
    let address = effective_address(inst, state, &cap);
    if state
        .load_memory(inst, auth_index(inst, 0), address, size)
        .is_some()
    {
        if let Some(child) = inst.child() {
            child.execute(state);
        }
    }
}

pub fn sem_load_b(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    load_op(inst, state, 1);
}

pub fn sem_load_h(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    load_op(inst, state, 2);
}

pub fn sem_load_w(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    load_op(inst, state, 4);
}

pub fn sem_load_bu(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    load_op(inst, state, 1);
}

pub fn sem_load_hu(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    load_op(inst, state, 2);
}

// Data-phase children: extend the latched value and write the destination.

pub fn sem_load_complete_b(inst: &Instruction, state: &mut CheriotState) {
    let value = state.load_value() as u8 as i8 as i32 as u32;
    write_dest_u32(inst, state, 0, value);
}

pub fn sem_load_complete_h(inst: &Instruction, state: &mut CheriotState) {
    let value = state.load_value() as u16 as i16 as i32 as u32;
    write_dest_u32(inst, state, 0, value);
}

pub fn sem_load_complete_w(inst: &Instruction, state: &mut CheriotState) {
    let value = state.load_value() as u32;
    write_dest_u32(inst, state, 0, value);
}

pub fn sem_load_complete_bu(inst: &Instruction, state: &mut CheriotState) {
    let value = state.load_value() as u8 as u32;
    write_dest_u32(inst, state, 0, value);
}

pub fn sem_load_complete_hu(inst: &Instruction, state: &mut CheriotState) {
    let value = state.load_value() as u16 as u32;
    write_dest_u32(inst, state, 0, value);
}

fn store_op(inst: &Instruction, state: &mut CheriotState, size: u32) {
    let cap = src_cap(inst, state, 0);
    let address = effective_address(inst, state, &cap);
    let value = src_u32(inst, state, 2) as u64;
    state.store_memory(inst, auth_index(inst, 0), address, size, value);
}

pub fn sem_store_b(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    store_op(inst, state, 1);
}

pub fn sem_store_h(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    store_op(inst, state, 2);
}

pub fn sem_store_w(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    store_op(inst, state, 4);
}

/// `clc`: load a capability with its tag; the loaded capability is filtered
/// by the authority's load-global/load-mutable permissions.
pub fn sem_load_cap(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let cap = src_cap(inst, state, 0);
    let address = effective_address(inst, state, &cap);
    if state
        .load_capability(inst, auth_index(inst, 0), address, false)
        .is_some()
    {
        if let Some(child) = inst.child() {
            child.execute(state);
        }
    }
}

pub fn sem_load_cap_complete(inst: &Instruction, state: &mut CheriotState) {
    let loaded = state.loaded_cap().clone();
    write_dest_cap(inst, state, 0, loaded);
}

/// `csc`: store a capability, propagating its tag.
pub fn sem_store_cap(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let cap = src_cap(inst, state, 0);
    let address = effective_address(inst, state, &cap);
    let source = src_cap(inst, state, 2);
    state.store_capability(inst, auth_index(inst, 0), address, &source);
}

//
// Atomics.
//

pub fn sem_lr_w(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let cap = src_cap(inst, state, 0);
    let address = cap.address();
    if state
        .load_memory(inst, auth_index(inst, 0), address, 4)
        .is_some()
    {
        state.set_reservation(address);
        if let Some(child) = inst.child() {
            child.execute(state);
        }
    }
}

pub fn sem_sc_w(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let cap = src_cap(inst, state, 0);
    let address = cap.address();
    if !state.check_and_clear_reservation(address) {
        write_dest_u32(inst, state, 0, 1);
        return;
    }
    let value = src_u32(inst, state, 1) as u64;
    if state.store_memory(inst, auth_index(inst, 0), address, 4, value) {
        write_dest_u32(inst, state, 0, 0);
    }
}

fn amo_op(inst: &Instruction, state: &mut CheriotState, op: AtomicOp) {
    let cap = src_cap(inst, state, 0);
    let address = cap.address();
    let value = src_u32(inst, state, 1);
    if state
        .amo_memory(inst, auth_index(inst, 0), address, op, value)
        .is_some()
    {
        if let Some(child) = inst.child() {
            child.execute(state);
        }
    }
}

pub fn sem_amoswap_w(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    amo_op(inst, state, AtomicOp::Swap);
}

pub fn sem_amoadd_w(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    amo_op(inst, state, AtomicOp::Add);
}

pub fn sem_amoxor_w(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    amo_op(inst, state, AtomicOp::Xor);
}

pub fn sem_amoand_w(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    amo_op(inst, state, AtomicOp::And);
}

pub fn sem_amoor_w(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    amo_op(inst, state, AtomicOp::Or);
}

pub fn sem_amomin_w(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    amo_op(inst, state, AtomicOp::Min);
}

pub fn sem_amomax_w(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    amo_op(inst, state, AtomicOp::Max);
}

pub fn sem_amominu_w(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    amo_op(inst, state, AtomicOp::Minu);
}

pub fn sem_amomaxu_w(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    amo_op(inst, state, AtomicOp::Maxu);
}

//
// Memory ordering and environment.
//

pub fn sem_nop(_inst: &Instruction, _state: &mut CheriotState) {}

pub fn sem_fence(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let raw = inst.raw();
    state.fence(inst, (raw >> 24) & 0xF, (raw >> 20) & 0xF);
}

pub fn sem_fence_i(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    state.fence_i(inst);
}

pub fn sem_ecall(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    state.ecall(inst);
}

pub fn sem_ebreak(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    state.ebreak(inst);
}

pub fn sem_wfi(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    state.wfi(inst);
}

//
// CSR instructions.
//

#[derive(Clone, Copy, Eq, PartialEq)]
enum CsrOp {
    ReadWrite,
    ReadSet,
    ReadClear,
}

fn csr_op(inst: &Instruction, state: &mut CheriotState, op: CsrOp) {
    let SourceOperand::Csr { index, .. } = *inst.source(0) else {
        illegal_instruction(inst, state);
        return;
    };
    let privilege = state.privilege_mode();
    let old = match state.read_csr(index, privilege) {
        Ok(old) => old,
        Err(_) => {
            illegal_instruction(inst, state);
            return;
        }
    };
    // For the set/clear forms, a zero source register (the literal 0) means
    // the CSR is not written at all.
    let operand = src_u32(inst, state, 1);
    let skip_write =
        op != CsrOp::ReadWrite && matches!(inst.source(1), SourceOperand::Literal(0));
    if !skip_write {
        let (value, mask) = match op {
            CsrOp::ReadWrite => (operand, !0),
            CsrOp::ReadSet => (operand, operand),
            CsrOp::ReadClear => (0, operand),
        };
        if state.write_csr(index, privilege, value, mask).is_err() {
            illegal_instruction(inst, state);
            return;
        }
        state.check_for_interrupt();
    }
    // Destination 0 is the CSR write (already performed); destination 1 is
    // rd.
    write_dest_u32(inst, state, 1, old);
}

pub fn sem_csrrw(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    csr_op(inst, state, CsrOp::ReadWrite);
}

pub fn sem_csrrs(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    csr_op(inst, state, CsrOp::ReadSet);
}

pub fn sem_csrrc(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    csr_op(inst, state, CsrOp::ReadClear);
}

/// `cspecialrw`: read, and optionally replace, a special capability
/// register. Writing requires a non-zero cs1 field; access requires the
/// system-register permission on pcc.
pub fn sem_cspecialrw(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let SourceOperand::Scr(scr) = *inst.source(1) else {
        // An out-of-range SCR index decodes to the null operand.
        illegal_instruction(inst, state);
        return;
    };
    if !state.pcc().has_permission(Permissions::ACCESS_SYSTEM_REGISTERS) {
        let index = match scr {
            ScrSpecifier::Mtcc => CapIndex::Mtcc,
            ScrSpecifier::Mtdc => CapIndex::Mtdc,
            ScrSpecifier::Mscratchc => CapIndex::Mscratchc,
            ScrSpecifier::Mepcc => CapIndex::Mepcc,
        };
        state.handle_cheri_reg_exception(
            inst,
            inst.address(),
            CapException::PermitAccessSystemRegistersViolation,
            index,
        );
        return;
    }
    let old = state.scr(scr).clone();
    if let SourceOperand::CapReg(rs1) = *inst.source(0) {
        if u8::from(rs1) != 0 {
            let new = state.registers().c(rs1).clone();
            state.set_scr(scr, new);
        }
    }
    write_dest_cap(inst, state, 0, old);
}

//
// Capability manipulation.
//

fn unary_cap_query(
    inst: &Instruction,
    state: &mut CheriotState,
    query: impl FnOnce(&CapabilityRegister) -> u32,
) {
    let cap = src_cap(inst, state, 0);
    write_dest_u32(inst, state, 0, query(&cap));
}

pub fn sem_cgetaddr(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    unary_cap_query(inst, state, |cap| cap.address());
}

pub fn sem_cgetbase(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    unary_cap_query(inst, state, |cap| cap.base());
}

/// The length and top queries saturate to the XLEN maximum, since the root
/// capabilities span more than 32 bits.
pub fn sem_cgetlen(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    unary_cap_query(inst, state, |cap| cap.length().min(u32::MAX as u64) as u32);
}

pub fn sem_cgettop(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    unary_cap_query(inst, state, |cap| cap.top().min(u32::MAX as u64) as u32);
}

pub fn sem_cgetperm(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    unary_cap_query(inst, state, |cap| cap.permissions().bits());
}

pub fn sem_cgettag(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    unary_cap_query(inst, state, |cap| cap.tag() as u32);
}

pub fn sem_cgettype(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    unary_cap_query(inst, state, |cap| cap.otype());
}

pub fn sem_cgethigh(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    unary_cap_query(inst, state, |cap| cap.high_word());
}

pub fn sem_cmove(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let cap = src_cap(inst, state, 0);
    write_dest_cap(inst, state, 0, cap);
}

pub fn sem_ccleartag(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let mut cap = src_cap(inst, state, 0);
    cap.clear_tag();
    write_dest_cap(inst, state, 0, cap);
}

/// Mutating a sealed capability never traps; it yields an untagged result.
fn sealed_to_untagged(source: &CapabilityRegister, result: &mut CapabilityRegister) {
    if source.is_sealed() {
        result.clear_tag();
    }
}

pub fn sem_candperm(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let cap = src_cap(inst, state, 0);
    let mask = Permissions::from_bits(src_u32(inst, state, 1));
    let mut result = cap.clone();
    sealed_to_untagged(&cap, &mut result);
    result.and_perm(mask);
    write_dest_cap(inst, state, 0, result);
}

pub fn sem_cincaddr(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let cap = src_cap(inst, state, 0);
    let increment = src_u32(inst, state, 1);
    let mut result = cap.clone();
    sealed_to_untagged(&cap, &mut result);
    result.set_address(cap.address().wrapping_add(increment));
    write_dest_cap(inst, state, 0, result);
}

pub fn sem_csetaddr(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let cap = src_cap(inst, state, 0);
    let address = src_u32(inst, state, 1);
    let mut result = cap.clone();
    sealed_to_untagged(&cap, &mut result);
    result.set_address(address);
    write_dest_cap(inst, state, 0, result);
}

pub fn sem_csethigh(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let cap = src_cap(inst, state, 0);
    let high = src_u32(inst, state, 1);
    let mut result = cap;
    result.set_high_word(high);
    write_dest_cap(inst, state, 0, result);
}

fn set_bounds_op(inst: &Instruction, state: &mut CheriotState, exact: bool) {
    let cap = src_cap(inst, state, 0);
    let length = src_u32(inst, state, 1);
    let base = cap.address();
    let mut result = cap.clone();
    sealed_to_untagged(&cap, &mut result);
    // Narrowing only: a request outside the source bounds is not authorized.
    if !cap.is_in_bounds(base, length) {
        result.clear_tag();
    }
    result.set_bounds(base, length as u64, exact);
    write_dest_cap(inst, state, 0, result);
}

pub fn sem_csetbounds(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    set_bounds_op(inst, state, false);
}

pub fn sem_csetboundsexact(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    set_bounds_op(inst, state, true);
}

/// `cseal`: seal cs1 with the object type named by the address of the
/// sealing authority cs2. An invalid authority yields an untagged result.
pub fn sem_cseal(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let cap = src_cap(inst, state, 0);
    let authority = src_cap(inst, state, 1);
    let otype = authority.address();
    let mut result = cap.clone();
    let valid = cap.tag()
        && !cap.is_sealed()
        && authority.tag()
        && !authority.is_sealed()
        && authority.has_permission(Permissions::SEAL)
        && authority.is_in_bounds(otype, 1)
        && (OTYPE_FIRST..=OTYPE_LAST).contains(&otype);
    if valid {
        result.seal(otype);
    } else {
        result.clear_tag();
    }
    write_dest_cap(inst, state, 0, result);
}

/// `cunseal`: inverse of `cseal`. The authority's address must name the
/// capability's object type and carry the unseal permission.
pub fn sem_cunseal(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let cap = src_cap(inst, state, 0);
    let authority = src_cap(inst, state, 1);
    let mut result = cap.clone();
    let valid = cap.tag()
        && cap.is_sealed()
        && authority.tag()
        && !authority.is_sealed()
        && authority.has_permission(Permissions::UNSEAL)
        && authority.is_in_bounds(authority.address(), 1)
        && authority.address() == cap.otype();
    if valid {
        result.unseal();
        if !authority.has_permission(Permissions::GLOBAL) {
            result.and_perm(Permissions::from_bits(!Permissions::GLOBAL.bits()));
        }
    } else {
        result.clear_tag();
    }
    write_dest_cap(inst, state, 0, result);
}

/// `ctestsubset rd, cs1, cs2`: is cs2 a subset of cs1?
pub fn sem_ctestsubset(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let superset = src_cap(inst, state, 0);
    let subset = src_cap(inst, state, 1);
    write_dest_u32(inst, state, 0, subset.is_subset_of(&superset) as u32);
}

/// `csetequalexact rd, cs1, cs2`: bit-for-bit equality including the tags.
pub fn sem_csetequalexact(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let a = src_cap(inst, state, 0);
    let b = src_cap(inst, state, 1);
    let equal = a.tag() == b.tag() && a.compress() == b.compress();
    write_dest_u32(inst, state, 0, equal as u32);
}

pub fn sem_cram(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let length = src_u32(inst, state, 0);
    write_dest_u32(
        inst,
        state,
        0,
        CapabilityRegister::representable_alignment_mask(length),
    );
}

pub fn sem_crrl(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let length = src_u32(inst, state, 0);
    write_dest_u32(inst, state, 0, CapabilityRegister::representable_length(length));
}

//
// Vector configuration.
//

fn vset_op(inst: &Instruction, state: &mut CheriotState, vtype: u32) {
    let dest_is_sink = matches!(inst.destination(0).kind, DestOperandKind::Sink);
    let avl = src_u32(inst, state, 0);
    let Some(vector) = state.vector_mut() else {
        illegal_instruction(inst, state);
        return;
    };
    vector.clear_vector_exception();
    vector.set_vtype(vtype);
    let requested = match inst.source(0) {
        // rs1 = x0: keep vl when rd is also x0, else select vlmax.
        SourceOperand::Literal(0) => {
            if dest_is_sink {
                vector.vector_length()
            } else {
                vector.max_vector_length()
            }
        }
        _ => avl,
    };
    vector.set_vector_length(requested);
    vector.clear_vstart();
    let vl = vector.vector_length();
    write_dest_u32(inst, state, 0, vl);
}

pub fn sem_vsetvli(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let vtype = src_u32(inst, state, 1) & 0x7FF;
    vset_op(inst, state, vtype);
}

pub fn sem_vsetivli(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let vtype = src_u32(inst, state, 1) & 0x3FF;
    vset_op(inst, state, vtype);
}

pub fn sem_vsetvl(inst: &Instruction, state: &mut CheriotState) {
    trace!("executing {}", inst.disassembly());
    let vtype = src_u32(inst, state, 1);
    vset_op(inst, state, vtype);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Root;
    use crate::csr;
    use crate::decode::CheriotDecoder;
    use crate::memory::TaggedMemory;
    use crate::state::{Config, CHERI_EXCEPTION_CODE};

    fn state() -> CheriotState {
        CheriotState::new(TaggedMemory::new(0x8000_0000, 0x1_0000), Config::default())
    }

    /// Decode and execute one instruction word at the current pcc, with the
    /// sequential-or-branch pc update of the retirement loop.
    fn exec(state: &mut CheriotState, word: u32) {
        let decoder = CheriotDecoder::new();
        let pc = state.pcc().address();
        let inst = decoder.decode_instruction(state, pc, word);
        inst.execute(state);
        let next_pc = if state.trap_set() || state.branch() {
            state.pcc().address()
        } else {
            pc.wrapping_add(inst.size())
        };
        state.set_branch(false);
        state.pcc_mut().set_address(next_pc);
    }

    fn x(state: &CheriotState, index: u8) -> u32 {
        state.registers().x(Specifier::from_u5(index))
    }

    #[test]
    fn test_lui_addi_builds_constant() {
        let mut state = state();
        // lui x12, 0x80002
        exec(&mut state, 0x8000_2637);
        assert_eq!(0x8000_2000, x(&state, 12));
        assert_eq!(0x8000_0004, state.pcc().address());
        // addi x12, x12, 0x468
        exec(&mut state, 0x4686_0613);
        assert_eq!(0x8000_2468, x(&state, 12));
        assert_eq!(0x8000_0008, state.pcc().address());
        assert!(!state.trap_set());
    }

    #[test]
    fn test_store_load_word_round_trip() {
        let mut state = state();
        // Build 0xdeadbeef in x11 and the address in x10 via mtdc.
        exec(&mut state, 0x8000_2637); // lui x12, 0x80002
        exec(&mut state, 0x4686_0613); // addi x12, x12, 0x468
        exec(&mut state, 0x03D0_055B); // cspecialrw c10, mtdc, c0
        assert!(state.registers().c(Specifier::from_u5(10)).tag());
        assert_eq!(0, x(&state, 10));
        exec(&mut state, 0x20C5_055B); // csetaddr c10, c10, x12
        assert_eq!(0x8000_2468, x(&state, 10));
        assert!(state.registers().c(Specifier::from_u5(10)).tag());
        // lui x11, 0xdeadc ; addi x11, x11, -0x111
        exec(&mut state, 0xDEAD_C5B7);
        exec(&mut state, 0xEEF5_8593);
        assert_eq!(0xDEAD_BEEF, x(&state, 11));
        // sw x11, 0(x10)
        exec(&mut state, 0x00B5_2023);
        assert!(!state.trap_set());
        let mut buf = [0u8; 4];
        state.dbg_load_memory(0x8000_2468, &mut buf).unwrap();
        assert_eq!(0xDEAD_BEEF, u32::from_le_bytes(buf));
        // lw x13, 0(x10)
        exec(&mut state, 0x0005_2683);
        assert_eq!(0xDEAD_BEEF, x(&state, 13));
    }

    #[test]
    fn test_taken_branch() {
        let mut state = state();
        // x1 == x2 (both memory root, address 0), so beq x1, x2, 0x124 is
        // taken.
        exec(&mut state, 0x1220_8263);
        assert_eq!(0x8000_0124, state.pcc().address());
        assert!(!state.trap_set());
    }

    #[test]
    fn test_untaken_branch_falls_through() {
        let mut state = state();
        // bne x1, x2, 0x124 with equal sources.
        exec(&mut state, 0x1220_9263);
        assert_eq!(0x8000_0004, state.pcc().address());
    }

    #[test]
    fn test_cjal_links_sentry() {
        let mut state = state();
        // cjal x1, 16 -> imm[4] at bit 24.
        let word = (1 << 24) | (1 << 7) | 0x6F;
        exec(&mut state, word);
        assert_eq!(0x8000_0010, state.pcc().address());
        let link = state.registers().c(Specifier::C1);
        assert!(link.tag());
        assert!(link.is_sentry());
        assert_eq!(0x8000_0004, link.address());
    }

    #[test]
    fn test_cjalr_through_sentry() {
        let mut state = state();
        // Build a sentry to 0x8000_0100 in c5.
        let mut target = state.executable_root().clone();
        target.set_address(0x8000_0100);
        target.seal(OTYPE_SENTRY);
        state.registers_mut().set_c(Specifier::from_u5(5), target);
        // cjalr c1, c5, 0.
        let word = (5 << 15) | (1 << 7) | 0x67;
        exec(&mut state, word);
        assert_eq!(0x8000_0100, state.pcc().address());
        assert!(!state.pcc().is_sealed());
        assert!(state.registers().c(Specifier::C1).is_sentry());
        // Jumping with a non-zero offset through a sentry is a seal
        // violation.
        let mut state2 = state;
        let mut target = state2.executable_root().clone();
        target.set_address(0x8000_0100);
        target.seal(OTYPE_SENTRY);
        state2.registers_mut().set_c(Specifier::from_u5(5), target);
        let word = (4 << 20) | (5 << 15) | (1 << 7) | 0x67;
        exec(&mut state2, word);
        assert!(state2.trap_set());
        let mtval = state2.csrs().get(csr::MTVAL).unwrap().raw();
        assert_eq!(CapException::SealViolation.code(), mtval & 0x1F);
    }

    #[test]
    fn test_non_executable_jump_target_faults() {
        let mut state = state();
        // c5 holds the (non-executable) memory root.
        let word = (5 << 15) | 0x67; // cjalr c0, c5, 0
        exec(&mut state, word);
        assert!(state.trap_set());
        let mtval = state.csrs().get(csr::MTVAL).unwrap().raw();
        assert_eq!(CapException::PermitExecuteViolation.code(), mtval & 0x1F);
        assert_eq!(5, mtval >> 5);
        assert_eq!(
            CHERI_EXCEPTION_CODE,
            state.csrs().get(csr::MCAUSE).unwrap().raw()
        );
    }

    #[test]
    fn test_trap_accounting_through_ecall_and_mret() {
        let mut state = state();
        let mut mtcc = state.executable_root().clone();
        mtcc.set_address(0x8000_0200);
        state.set_scr(ScrSpecifier::Mtcc, mtcc);
        state.pcc_mut().set_address(0x8000_0020);
        exec(&mut state, 0x0000_0073); // ecall
        assert_eq!(1, state.counter_interrupts_taken());
        assert_eq!(1, state.interrupt_handler_depth());
        assert_eq!(0x8000_0200, state.pcc().address());
        assert_eq!(0x8000_0020, state.scr(ScrSpecifier::Mepcc).address());
        state.clear_trap_set();
        exec(&mut state, 0x3020_0073); // mret
        assert_eq!(0, state.interrupt_handler_depth());
        assert_eq!(0x8000_0020, state.pcc().address());
    }

    #[test]
    fn test_csr_exchange() {
        let mut state = state();
        // csrrw x5, mscratch, x12 with x12 = 0x1234.
        state.registers_mut().set_x(Specifier::from_u5(12), 0x1234);
        let word = (0x340 << 20) | (12 << 15) | (1 << 12) | (5 << 7) | 0x73;
        exec(&mut state, word);
        assert_eq!(0, x(&state, 5));
        assert_eq!(
            0x1234,
            state
                .read_csr(csr::MSCRATCH, crate::PrivilegeLevel::Machine)
                .unwrap()
        );
        // csrrs x6, mscratch, x0 reads without writing.
        let word = (0x340 << 20) | (2 << 12) | (6 << 7) | 0x73;
        exec(&mut state, word);
        assert_eq!(0x1234, x(&state, 6));
    }

    #[test]
    fn test_unknown_csr_is_illegal() {
        let mut state = state();
        let word = (0x7C9u32 << 20) | (1 << 12) | 0x73; // csrrw x0, 0x7c9, x0
        exec(&mut state, word);
        assert!(state.trap_set());
        assert_eq!(
            Exception::IllegalInstruction.code(),
            state.csrs().get(csr::MCAUSE).unwrap().raw()
        );
        assert_eq!(word, state.csrs().get(csr::MTVAL).unwrap().raw());
    }

    #[test]
    fn test_csetbounds_narrows_and_checks_authority() {
        let mut state = state();
        // c5 = memory root at 0x8000_1000; csetbounds c6, c5, 0x100.
        let mut c5 = state.memory_root().clone();
        c5.set_address(0x8000_1000);
        state.registers_mut().set_c(Specifier::from_u5(5), c5);
        state.registers_mut().set_x(Specifier::from_u5(7), 0x100);
        let word = (0x08u32 << 25) | (7 << 20) | (5 << 15) | (6 << 7) | 0x5B;
        exec(&mut state, word);
        let c6 = state.registers().c(Specifier::from_u5(6)).clone();
        assert!(c6.tag());
        assert_eq!(0x8000_1000, c6.base());
        assert_eq!(0x8000_1100, c6.top());
        // Widening beyond the authority clears the tag.
        state.registers_mut().set_c(Specifier::from_u5(5), c6.clone());
        state.registers_mut().set_x(Specifier::from_u5(7), 0x200);
        exec(&mut state, word);
        assert!(!state.registers().c(Specifier::from_u5(6)).tag());
    }

    #[test]
    fn test_candperm_is_monotone() {
        let mut state = state();
        state.registers_mut().set_x(
            Specifier::from_u5(7),
            (Permissions::LOAD.bits() | Permissions::LOAD_STORE_CAP.bits() | Permissions::GLOBAL.bits())
                as u32,
        );
        // candperm c6, c5, x7
        let word = (0x0D << 25) | (7 << 20) | (5 << 15) | (6 << 7) | 0x5B;
        exec(&mut state, word);
        let c6 = state.registers().c(Specifier::from_u5(6));
        assert!(c6.tag());
        assert!(!c6.has_permission(Permissions::STORE));
        assert!(c6.has_permission(Permissions::LOAD));
    }

    #[test]
    fn test_seal_unseal_round_trip() {
        let mut state = state();
        // c5 = sealing root with address 3 (the otype).
        let mut sealer = state.sealing_root().clone();
        sealer.set_address(3);
        state.registers_mut().set_c(Specifier::from_u5(5), sealer);
        // cseal c6, c10, c5.
        let word = (0x0B << 25) | (5 << 20) | (10 << 15) | (6 << 7) | 0x5B;
        exec(&mut state, word);
        let sealed = state.registers().c(Specifier::from_u5(6)).clone();
        assert!(sealed.tag());
        assert!(sealed.is_sealed());
        assert_eq!(3, sealed.otype());
        // cunseal c7, c6, c5.
        let word = (0x0C << 25) | (5 << 20) | (6 << 15) | (7 << 7) | 0x5B;
        exec(&mut state, word);
        let unsealed = state.registers().c(Specifier::from_u5(7));
        assert!(unsealed.tag());
        assert!(!unsealed.is_sealed());
    }

    #[test]
    fn test_sealed_capability_rejects_mutation() {
        let mut state = state();
        let mut sealer = state.sealing_root().clone();
        sealer.set_address(2);
        state.registers_mut().set_c(Specifier::from_u5(5), sealer);
        let word = (0x0Bu32 << 25) | (5 << 20) | (10 << 15) | (6 << 7) | 0x5B; // cseal c6, c10, c5
        exec(&mut state, word);
        assert!(state.registers().c(Specifier::from_u5(6)).is_sealed());
        // csetaddr c7, c6, x0 on the sealed capability clears the tag.
        let word = (0x10u32 << 25) | (6 << 15) | (7 << 7) | 0x5B;
        exec(&mut state, word);
        assert!(!state.registers().c(Specifier::from_u5(7)).tag());
    }

    #[test]
    fn test_capability_store_then_byte_store_clears_tag() {
        let mut state = state();
        // c10 -> 0x8000_0400.
        let mut c10 = state.memory_root().clone();
        c10.set_address(0x8000_0400);
        state.registers_mut().set_c(Specifier::from_u5(10), c10);
        // csc c11, 0(c10): store the capability in c11.
        let word = (11 << 20) | (10 << 15) | (3 << 12) | 0x23;
        exec(&mut state, word);
        assert!(!state.trap_set());
        assert!(state.memory().load_capability(0x8000_0400).unwrap().1);
        // sb x0, 3(c10) clears the slot's tag.
        let word = (10 << 15) | (3 << 7) | 0x23;
        exec(&mut state, word);
        assert!(!state.memory().load_capability(0x8000_0400).unwrap().1);
        // clc c13, 0(c10): data still decodes, tag is gone.
        let word = (10 << 15) | (3 << 12) | (13 << 7) | 0x03;
        exec(&mut state, word);
        let c13 = state.registers().c(Specifier::from_u5(13));
        assert!(!c13.tag());
        assert!(c13.has_permission(Permissions::LOAD));
    }

    #[test]
    fn test_amoadd() {
        let mut state = state();
        let mut c8 = state.memory_root().clone();
        c8.set_address(0x8000_0800);
        state.registers_mut().set_c(Specifier::from_u5(8), c8);
        state.registers_mut().set_x(Specifier::from_u5(7), 5);
        state.dbg_store_memory(0x8000_0800, &10u32.to_le_bytes()).unwrap();
        // amoadd.w x6, x7, (c8)
        exec(&mut state, 0x0074_232F);
        assert_eq!(10, x(&state, 6));
        let mut buf = [0u8; 4];
        state.dbg_load_memory(0x8000_0800, &mut buf).unwrap();
        assert_eq!(15, u32::from_le_bytes(buf));
    }

    #[test]
    fn test_lr_sc() {
        let mut state = state();
        let mut c8 = state.memory_root().clone();
        c8.set_address(0x8000_0800);
        state.registers_mut().set_c(Specifier::from_u5(8), c8);
        state.registers_mut().set_x(Specifier::from_u5(7), 0x77);
        // lr.w x6, (c8)
        let word = (0x02u32 << 27) | (8 << 15) | (2 << 12) | (6 << 7) | 0x2F;
        exec(&mut state, word);
        assert_eq!(0, x(&state, 6));
        // sc.w x5, x7, (c8) succeeds.
        let word = (0x03u32 << 27) | (7 << 20) | (8 << 15) | (2 << 12) | (5 << 7) | 0x2F;
        exec(&mut state, word);
        assert_eq!(0, x(&state, 5));
        let mut buf = [0u8; 4];
        state.dbg_load_memory(0x8000_0800, &mut buf).unwrap();
        assert_eq!(0x77, u32::from_le_bytes(buf));
        // A second sc.w without a reservation fails.
        exec(&mut state, word);
        assert_eq!(1, x(&state, 5));
    }

    #[test]
    fn test_compressed_alu_and_jump() {
        let mut state = state();
        state.registers_mut().set_x(Specifier::from_u5(10), 7);
        // c.addi x10, 1
        exec(&mut state, 0x0505);
        assert_eq!(8, x(&state, 10));
        // c.j 4 is CompJ; offset 4 -> off[3:1] = 0b010 at bits 5:3.
        let pc = state.pcc().address();
        exec(&mut state, 0xA011);
        assert_eq!(pc + 4, state.pcc().address());
        // The sink link register of c.j leaves c1 untouched.
        assert!(state.registers().c(Specifier::C1).tag());
    }

    #[test]
    fn test_compressed_mv_moves_capability() {
        let mut state = state();
        let mut c11 = state.memory_root().clone();
        c11.set_address(0x8000_0123);
        state.registers_mut().set_c(Specifier::from_u5(11), c11);
        // c.mv x10, x11
        exec(&mut state, 0x852E);
        let c10 = state.registers().c(Specifier::from_u5(10));
        assert!(c10.tag());
        assert_eq!(0x8000_0123, c10.address());
    }

    #[test]
    fn test_cgetters() {
        let mut state = state();
        let mut c5 = state.memory_root().clone();
        c5.set_bounds(0x8000_1000, 0x100, true);
        c5.set_address(0x8000_1010);
        state.registers_mut().set_c(Specifier::from_u5(5), c5);
        // cgetaddr x6, c5
        let word = 0xFE00_005B | (15 << 20) | (5 << 15) | (6 << 7);
        exec(&mut state, word);
        assert_eq!(0x8000_1010, x(&state, 6));
        // cgetbase x6, c5
        let word = 0xFE00_005B | (2 << 20) | (5 << 15) | (6 << 7);
        exec(&mut state, word);
        assert_eq!(0x8000_1000, x(&state, 6));
        // cgetlen x6, c5
        let word = 0xFE00_005B | (3 << 20) | (5 << 15) | (6 << 7);
        exec(&mut state, word);
        assert_eq!(0x100, x(&state, 6));
        // cgetlen saturates for the root.
        let word = 0xFE00_005B | (3 << 20) | (10 << 15) | (6 << 7);
        exec(&mut state, word);
        assert_eq!(u32::MAX, x(&state, 6));
        // cgettag x6, c5
        let word = 0xFE00_005B | (4 << 20) | (5 << 15) | (6 << 7);
        exec(&mut state, word);
        assert_eq!(1, x(&state, 6));
    }

    #[test]
    fn test_rd_zero_writes_are_discarded() {
        let mut state = state();
        // addi x0, x0, 5
        exec(&mut state, 0x0050_0013);
        assert_eq!(0, x(&state, 0));
        assert!(!state.registers().c(Specifier::C0).tag());
    }

    #[test]
    fn test_root_derivability_holds_under_execution() {
        let mut state = state();
        exec(&mut state, 0x03D0_055B); // cspecialrw c10, mtdc, c0
        exec(&mut state, 0x20C5_055B); // csetaddr c10, c10, x12
        for specifier in Specifier::iter_all() {
            let cap = state.registers().c(specifier);
            if !cap.tag() {
                continue;
            }
            let under_memory = CapabilityRegister::root(Root::Memory)
                .permissions()
                .contains(cap.permissions());
            let under_exec = CapabilityRegister::root(Root::Executable)
                .permissions()
                .contains(cap.permissions());
            let under_seal = CapabilityRegister::root(Root::Sealing)
                .permissions()
                .contains(cap.permissions());
            assert!(
                under_memory || under_exec || under_seal,
                "{specifier} holds permissions not derivable from any root"
            );
        }
    }
}
