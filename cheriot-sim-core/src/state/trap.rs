//! Trap and interrupt delivery.
//!
//! All faults funnel through [`CheriotState::trap`]: it records the event,
//! writes `mepcc`/`mtval`/`mcause`, installs the handler's capability from
//! `mtcc` as the new `pcc`, and bumps the taken counter. Returning (via
//! `mret`) bumps the return counter; the difference of the two counters is
//! the current handler nesting depth.

use super::CheriotState;
use crate::csr;
use crate::instruction::Instruction;
use crate::registers::Specifier;
use log::trace;

/// The `mcause` value used for every capability-specific fault; the actual
/// capability cause lives in `mtval`.
pub const CHERI_EXCEPTION_CODE: u32 = 0x1C;

/// MSB of `mcause`, set for interrupts.
pub const INTERRUPT_FLAG: u32 = 1 << 31;

/// Standard RISC-V exception codes raised by this core.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Exception {
    InstructionAddressMisaligned = 0,
    InstructionAccessFault = 1,
    IllegalInstruction = 2,
    Breakpoint = 3,
    LoadAddressMisaligned = 4,
    LoadAccessFault = 5,
    StoreAddressMisaligned = 6,
    StoreAccessFault = 7,
    EnvironmentCallFromUMode = 8,
    EnvironmentCallFromMMode = 11,
}

impl Exception {
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// Capability-specific cause codes. These are encoded in `mtval`, never in
/// `mcause` (which is always [`CHERI_EXCEPTION_CODE`] for them).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CapException {
    BoundsViolation = 0x01,
    TagViolation = 0x02,
    SealViolation = 0x03,
    PermitExecuteViolation = 0x11,
    PermitLoadViolation = 0x12,
    PermitStoreViolation = 0x13,
    PermitStoreCapabilityViolation = 0x15,
    PermitStoreLocalCapabilityViolation = 0x16,
    PermitAccessSystemRegistersViolation = 0x18,
}

impl CapException {
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// Index of a capability register as encoded in the `mtval` of a capability
/// fault: `tval = (index << 5) | cause`. Values 0..=31 are the register
/// file; bit 5 marks the special registers.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CapIndex {
    Register(Specifier),
    Pcc,
    Mtcc,
    Mtdc,
    Mscratchc,
    Mepcc,
}

impl CapIndex {
    pub fn encode(self) -> u32 {
        match self {
            Self::Register(specifier) => u32::from(specifier),
            Self::Pcc => 0x20,
            Self::Mtcc => 0x3C,
            Self::Mtdc => 0x3D,
            Self::Mscratchc => 0x3E,
            Self::Mepcc => 0x3F,
        }
    }
}

/// Machine-level interrupt codes, in decreasing priority order.
///
/// > Multiple simultaneous interrupts destined for M-mode are handled in the
/// > following decreasing priority order: MEI, MSI, MTI.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InterruptCode {
    MachineExternal = 11,
    MachineSoftware = 3,
    MachineTimer = 7,
}

impl InterruptCode {
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// All interrupt codes, highest priority first.
    pub const BY_PRIORITY: [Self; 3] = [Self::MachineExternal, Self::MachineSoftware, Self::MachineTimer];
}

/// One recorded trap or interrupt, kept for introspection by hosts and
/// tests.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct InterruptInfo {
    pub is_interrupt: bool,
    pub cause: u32,
    pub tval: u32,
    pub epc: u32,
}

// mstatus fields used by trap entry/exit.
const MSTATUS_MIE: u32 = 1 << 3;
const MSTATUS_MPIE: u32 = 1 << 7;
const MSTATUS_MPP_SHIFT: u32 = 11;
const MSTATUS_MPP_MASK: u32 = 0b11 << MSTATUS_MPP_SHIFT;

impl CheriotState {
    /// The sole exception path. Records the event, saves `pcc` (with the
    /// address replaced by `epc`) into `mepcc`, writes `mtval` and `mcause`,
    /// and installs `mtcc` as the new `pcc` so the handler runs with the trap
    /// vector's bounds and permissions. Privilege stays at machine level.
    ///
    /// If a trap callback is registered and reports the event as handled, the
    /// default delivery is skipped (the event is still recorded).
    pub fn trap(
        &mut self,
        is_interrupt: bool,
        trap_value: u32,
        cause: u32,
        epc: u32,
        inst: Option<&Instruction>,
    ) {
        trace!(
            "trap: interrupt={is_interrupt} cause={cause:#x} tval={trap_value:#010x} epc={epc:#010x}"
        );
        self.interrupt_info_list.push_back(InterruptInfo {
            is_interrupt,
            cause,
            tval: trap_value,
            epc,
        });
        self.trap_set = true;
        if let Some(mut on_trap) = self.on_trap.take() {
            let handled = on_trap(is_interrupt, trap_value, cause, epc, inst);
            self.on_trap = Some(on_trap);
            if handled {
                return;
            }
        }

        let mut mepcc = self.registers.pcc().clone();
        mepcc.set_address(epc);
        self.mepcc = mepcc;
        self.csrs.get_mut(csr::MTVAL).unwrap().set_raw(trap_value);
        let mcause = cause | if is_interrupt { INTERRUPT_FLAG } else { 0 };
        self.csrs.get_mut(csr::MCAUSE).unwrap().set_raw(mcause);

        // pcc <- mtcc, capability-preserving: the handler's bounds and
        // permissions come from the trap vector capability.
        *self.registers.pcc_mut() = self.mtcc.clone();

        let mstatus = self.csrs.get_mut(csr::MSTATUS).unwrap();
        let old = mstatus.raw();
        let mut new = old & !(MSTATUS_MPIE | MSTATUS_MIE | MSTATUS_MPP_MASK);
        if old & MSTATUS_MIE != 0 {
            new |= MSTATUS_MPIE;
        }
        new |= (self.privilege_mode as u32) << MSTATUS_MPP_SHIFT;
        mstatus.set_raw(new);
        self.privilege_mode = crate::PrivilegeLevel::Machine;

        self.counter_interrupts_taken += 1;
        if is_interrupt {
            self.is_interrupt_available = false;
            self.available_interrupt = None;
        }
    }

    /// Register a CHERIoT-specific fault: `mtval` encodes the faulting
    /// register and the capability cause, `mcause` is the reserved CHERI
    /// code.
    pub fn handle_cheri_reg_exception(
        &mut self,
        inst: &Instruction,
        epc: u32,
        code: CapException,
        reg: CapIndex,
    ) {
        let tval = (reg.encode() << 5) | code.code();
        self.trap(false, tval, CHERI_EXCEPTION_CODE, epc, Some(inst));
    }

    /// Called after any event that may have made an interrupt pending or
    /// enabled. Picks the highest-priority pending enabled machine interrupt
    /// and marks it available for the core to take.
    pub fn check_for_interrupt(&mut self) {
        let mstatus = self.csrs.get(csr::MSTATUS).unwrap().raw();
        if mstatus & MSTATUS_MIE == 0 {
            self.is_interrupt_available = false;
            self.available_interrupt = None;
            return;
        }
        let mip = self.csrs.get(csr::MIP).unwrap().raw();
        let mie = self.csrs.get(csr::MIE).unwrap().raw();
        let pending = mip & mie;
        self.available_interrupt = InterruptCode::BY_PRIORITY
            .into_iter()
            .find(|code| pending & (1 << code.code()) != 0);
        self.is_interrupt_available = self.available_interrupt.is_some();
    }

    /// Take the available interrupt, if any, using `epc` as the return pc.
    pub fn take_available_interrupt(&mut self, epc: u32) {
        let Some(code) = self.available_interrupt else {
            return;
        };
        self.trap(true, 0, code.code(), epc, None);
    }

    /// Indicates that the program has returned from handling an interrupt
    /// (`mret`). Restores the interrupt-enable stack and bumps the return
    /// counter.
    pub fn signal_return_from_interrupt(&mut self) {
        let mstatus = self.csrs.get_mut(csr::MSTATUS).unwrap();
        let old = mstatus.raw();
        let mut new = old & !(MSTATUS_MIE | MSTATUS_MPP_MASK);
        if old & MSTATUS_MPIE != 0 {
            new |= MSTATUS_MIE;
        }
        new |= MSTATUS_MPIE;
        mstatus.set_raw(new);
        self.privilege_mode = match (old & MSTATUS_MPP_MASK) >> MSTATUS_MPP_SHIFT {
            0 => crate::PrivilegeLevel::User,
            _ => crate::PrivilegeLevel::Machine,
        };
        self.counter_interrupt_returns += 1;
    }

    /// Depth of the interrupt/trap handler currently being executed, or zero
    /// when no handler is running.
    pub fn interrupt_handler_depth(&self) -> u64 {
        self.counter_interrupts_taken - self.counter_interrupt_returns
    }

    pub fn counter_interrupts_taken(&self) -> u64 {
        self.counter_interrupts_taken
    }

    pub fn counter_interrupt_returns(&self) -> u64 {
        self.counter_interrupt_returns
    }

    /// True if an interrupt is available for the core to take.
    pub fn is_interrupt_available(&self) -> bool {
        self.is_interrupt_available
    }

    /// Resets the availability flag. This should only be called when
    /// resetting the core; the flag is normally cleared by the interrupt
    /// handling flow itself.
    pub fn reset_is_interrupt_available(&mut self) {
        self.is_interrupt_available = false;
        self.available_interrupt = None;
    }

    /// The recorded trap/interrupt events, oldest first.
    pub fn interrupt_info_list(&self) -> impl Iterator<Item = &InterruptInfo> {
        self.interrupt_info_list.iter()
    }
}
