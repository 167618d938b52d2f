//! The CHERIoT architectural state.
//!
//! [`CheriotState`] owns everything an instruction can observe or mutate: the
//! capability register file, the special capability registers, the CSR set,
//! tagged memory, the floating-point and vector sub-states, and the trap
//! machinery. Semantic functions reach all of it through the methods here;
//! the memory entrypoints apply the CHERIoT checks (tag, then permission,
//! then seal, then bounds) before any access reaches memory.

mod fp;
mod trap;
mod vector;

pub use fp::{fflags, FpState, RoundingMode};
pub use trap::{
    CapException, CapIndex, Exception, InterruptCode, InterruptInfo, CHERI_EXCEPTION_CODE,
    INTERRUPT_FLAG,
};
pub use vector::{VectorState, NUM_VECTOR_REGISTERS};

use crate::capability::{CapabilityRegister, Permissions, Root};
use crate::csr::{self, Csr, CsrError, CsrSet, CsrSpecifier, ScrSpecifier};
use crate::decode::CheriotDecoder;
use crate::instruction::Instruction;
use crate::memory::{AtomicOp, MemoryError, TaggedMemory};
use crate::registers::{RegisterFile, Specifier};
use crate::{PrivilegeLevel, RawPrivilegeLevel};
use log::trace;
use std::collections::VecDeque;
use thiserror::Error;

/// Bits of the misa register.
pub mod misa {
    /// Atomic extension.
    pub const A: u32 = 1 << 0;
    /// Compressed extension.
    pub const C: u32 = 1 << 2;
    /// Single-precision floating-point extension.
    pub const F: u32 = 1 << 5;
    /// Base integer ISA.
    pub const I: u32 = 1 << 8;
    /// Integer multiply/divide extension.
    pub const M: u32 = 1 << 12;
    /// User mode implemented.
    pub const U: u32 = 1 << 20;
    /// Vector extension.
    pub const V: u32 = 1 << 21;
    /// Non-standard extensions present (the CHERIoT capability extension).
    pub const X: u32 = 1 << 23;
    /// MXL = 1: XLEN is 32.
    pub const MXL_32: u32 = 1 << 30;
}

/// Configuration options for a [`CheriotState`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to which `pcc` is reset.
    pub reset_vector: u32,
    /// The advertised ISA. The C bit determines the width of the minimal
    /// fetch bounds check (2 bytes when compressed instructions exist, else
    /// 4).
    pub misa: u32,
    /// Vector register width in bytes; 0 disables the vector unit.
    pub vector_register_width: u32,
    /// Physical address of the revocation bitmap.
    pub revocation_mem_base: u32,
    /// First address covered by the revocation bitmap (one bit per 8 bytes).
    pub revocation_ram_base: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reset_vector: 0x8000_0000,
            misa: misa::MXL_32 | misa::I | misa::M | misa::A | misa::C | misa::U | misa::X,
            vector_register_width: 0,
            revocation_mem_base: 0,
            revocation_ram_base: 0,
        }
    }
}

/// Errors surfaced by the CSR access methods. Semantic functions translate
/// all of them into an illegal-instruction trap.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum CsrAccessError {
    #[error("unsupported CSR: {0:#05x}")]
    Unsupported(CsrSpecifier),
    /// Attempt to access a CSR that requires a higher privilege level.
    #[error(
        "cannot access CSR {specifier:#05x} from privilege level {actual_level}, \
         since it requires privilege level {required_level}"
    )]
    Privileged {
        specifier: CsrSpecifier,
        required_level: RawPrivilegeLevel,
        actual_level: PrivilegeLevel,
    },
    /// Attempt to write to a read-only register.
    #[error("writing to read-only CSR {0:#05x} is invalid")]
    WriteToReadOnly(CsrSpecifier),
}

impl From<CsrError> for CsrAccessError {
    fn from(_: CsrError) -> Self {
        // The only lookup failure that can reach guest code is an absent CSR.
        Self::Unsupported(0)
    }
}

/// Callback invoked for ecall/ebreak/wfi/cease events. Returning `true`
/// means the event was handled and the default behavior is skipped.
pub type InstructionCallback = Box<dyn FnMut(&Instruction) -> bool>;

/// Callback invoked on every trap: `(is_interrupt, trap_value, cause, epc,
/// instruction)`. Returning `true` skips the default delivery.
pub type TrapCallback = Box<dyn FnMut(bool, u32, u32, u32, Option<&Instruction>) -> bool>;

/// Memory traffic captured for the retirement trace of the current
/// instruction. Only filled while tracing is active.
#[derive(Debug, Clone, Default)]
pub struct TraceCapture {
    pub mem_addr: u64,
    pub rdata: [u64; 4],
    pub wdata: [u64; 4],
    pub rmask: u32,
    pub wmask: u32,
}

impl TraceCapture {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// The complete architectural state of one CHERIoT hart.
pub struct CheriotState {
    config: Config,
    registers: RegisterFile,
    /// Scratch register for semantic functions that need to stage a
    /// capability.
    temp_reg: CapabilityRegister,
    // Special capability registers.
    mtcc: CapabilityRegister,
    mtdc: CapabilityRegister,
    mscratchc: CapabilityRegister,
    mepcc: CapabilityRegister,
    // The three immutable boot-time roots.
    executable_root: CapabilityRegister,
    sealing_root: CapabilityRegister,
    memory_root: CapabilityRegister,
    csrs: CsrSet,
    memory: TaggedMemory,
    /// Whether the atomic (RMW) memory interface is available.
    atomics_enabled: bool,
    fp: FpState,
    fp_registers: [u64; 32],
    vector: Option<VectorState>,
    privilege_mode: PrivilegeLevel,
    /// Set by branch/jump semantic functions; tells the retirement loop that
    /// `pcc.address` already holds the next pc.
    branch: bool,
    /// Set by the trap engine; cleared by the retirement loop.
    trap_set: bool,
    /// Halted by a `cease`; only a reset leaves this state.
    ceased: bool,
    reservation: Option<u32>,
    // Interrupt machinery (see state/trap.rs).
    interrupt_info_list: VecDeque<InterruptInfo>,
    counter_interrupts_taken: u64,
    counter_interrupt_returns: u64,
    is_interrupt_available: bool,
    available_interrupt: Option<InterruptCode>,
    // Callbacks.
    on_ecall: Option<InstructionCallback>,
    on_wfi: Option<InstructionCallback>,
    on_cease: Option<InstructionCallback>,
    on_ebreak: Vec<InstructionCallback>,
    on_trap: Option<TrapCallback>,
    // Tracing.
    tracing_active: bool,
    capture: TraceCapture,
    // Completion slots for split memory operations.
    load_value: u64,
    loaded_cap: CapabilityRegister,
    /// Retired-instruction counter backing minstret/mcycle.
    retired_instructions: u64,
}

impl CheriotState {
    pub fn new(memory: TaggedMemory, config: Config) -> Self {
        let mut csrs = CsrSet::new();
        create_csrs(&mut csrs, &config);
        let vector = (config.vector_register_width > 0)
            .then(|| VectorState::new(config.vector_register_width));
        let mut state = Self {
            registers: RegisterFile::new(),
            temp_reg: CapabilityRegister::null(),
            mtcc: CapabilityRegister::null(),
            mtdc: CapabilityRegister::null(),
            mscratchc: CapabilityRegister::null(),
            mepcc: CapabilityRegister::null(),
            executable_root: CapabilityRegister::root(Root::Executable),
            sealing_root: CapabilityRegister::root(Root::Sealing),
            memory_root: CapabilityRegister::root(Root::Memory),
            csrs,
            memory,
            atomics_enabled: config.misa & misa::A != 0,
            fp: FpState::new(),
            fp_registers: [0; 32],
            vector,
            privilege_mode: PrivilegeLevel::Machine,
            branch: false,
            trap_set: false,
            ceased: false,
            reservation: None,
            interrupt_info_list: VecDeque::new(),
            counter_interrupts_taken: 0,
            counter_interrupt_returns: 0,
            is_interrupt_available: false,
            available_interrupt: None,
            on_ecall: None,
            on_wfi: None,
            on_cease: None,
            on_ebreak: Vec::new(),
            on_trap: None,
            tracing_active: false,
            capture: TraceCapture::default(),
            load_value: 0,
            loaded_cap: CapabilityRegister::null(),
            retired_instructions: 0,
            config,
        };
        state.reset();
        state
    }

    /// Reset all registers and CSRs to their architectural initial values:
    /// every general register holds the memory root, `pcc` the executable
    /// root with the address set to the reset vector.
    pub fn reset(&mut self) {
        for specifier in Specifier::iter_all().skip(1) {
            self.registers
                .set_c(specifier, CapabilityRegister::root(Root::Memory));
        }
        let mut pcc = CapabilityRegister::root(Root::Executable);
        pcc.set_address(self.config.reset_vector);
        *self.registers.pcc_mut() = pcc;
        self.temp_reg = CapabilityRegister::null();
        self.mtcc = CapabilityRegister::root(Root::Executable);
        self.mepcc = CapabilityRegister::root(Root::Executable);
        self.mtdc = CapabilityRegister::root(Root::Memory);
        self.mscratchc = CapabilityRegister::root(Root::Memory);
        let config = self.config.clone();
        self.csrs = CsrSet::new();
        create_csrs(&mut self.csrs, &config);
        self.privilege_mode = PrivilegeLevel::Machine;
        self.branch = false;
        self.trap_set = false;
        self.ceased = false;
        self.reservation = None;
        self.interrupt_info_list.clear();
        self.counter_interrupts_taken = 0;
        self.counter_interrupt_returns = 0;
        self.reset_is_interrupt_available();
        self.fp = FpState::new();
        self.fp_registers = [0; 32];
        if let Some(vector) = &mut self.vector {
            *vector = VectorState::new(self.config.vector_register_width);
        }
        self.capture.clear();
        self.load_value = 0;
        self.loaded_cap = CapabilityRegister::null();
        self.retired_instructions = 0;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// True if misa advertises the compressed extension; fetch bounds checks
    /// then only require 2 bytes.
    pub fn has_compact(&self) -> bool {
        self.config.misa & misa::C != 0
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    pub fn pcc(&self) -> &CapabilityRegister {
        self.registers.pcc()
    }

    pub fn pcc_mut(&mut self) -> &mut CapabilityRegister {
        self.registers.pcc_mut()
    }

    pub fn executable_root(&self) -> &CapabilityRegister {
        &self.executable_root
    }

    pub fn sealing_root(&self) -> &CapabilityRegister {
        &self.sealing_root
    }

    pub fn memory_root(&self) -> &CapabilityRegister {
        &self.memory_root
    }

    /// The global pointer capability (`c3`).
    pub fn cgp(&self) -> &CapabilityRegister {
        self.registers.c(Specifier::C3)
    }

    pub fn temp_reg(&self) -> &CapabilityRegister {
        &self.temp_reg
    }

    pub fn temp_reg_mut(&mut self) -> &mut CapabilityRegister {
        &mut self.temp_reg
    }

    pub fn scr(&self, specifier: ScrSpecifier) -> &CapabilityRegister {
        match specifier {
            ScrSpecifier::Mtcc => &self.mtcc,
            ScrSpecifier::Mtdc => &self.mtdc,
            ScrSpecifier::Mscratchc => &self.mscratchc,
            ScrSpecifier::Mepcc => &self.mepcc,
        }
    }

    pub fn set_scr(&mut self, specifier: ScrSpecifier, value: CapabilityRegister) {
        let slot = match specifier {
            ScrSpecifier::Mtcc => &mut self.mtcc,
            ScrSpecifier::Mtdc => &mut self.mtdc,
            ScrSpecifier::Mscratchc => &mut self.mscratchc,
            ScrSpecifier::Mepcc => &mut self.mepcc,
        };
        *slot = value;
    }

    /// Resolve a capability index (register file, pcc, or SCR) to its
    /// current value.
    pub fn cap_by_index(&self, index: CapIndex) -> &CapabilityRegister {
        match index {
            CapIndex::Register(specifier) => self.registers.c(specifier),
            CapIndex::Pcc => self.registers.pcc(),
            CapIndex::Mtcc => &self.mtcc,
            CapIndex::Mtdc => &self.mtdc,
            CapIndex::Mscratchc => &self.mscratchc,
            CapIndex::Mepcc => &self.mepcc,
        }
    }

    pub fn csrs(&self) -> &CsrSet {
        &self.csrs
    }

    pub fn csrs_mut(&mut self) -> &mut CsrSet {
        &mut self.csrs
    }

    pub fn memory(&self) -> &TaggedMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut TaggedMemory {
        &mut self.memory
    }

    pub fn max_physical_address(&self) -> u64 {
        self.memory.end()
    }

    pub fn min_physical_address(&self) -> u32 {
        self.memory.start()
    }

    pub fn privilege_mode(&self) -> PrivilegeLevel {
        self.privilege_mode
    }

    pub fn fp(&self) -> &FpState {
        &self.fp
    }

    pub fn fp_mut(&mut self) -> &mut FpState {
        &mut self.fp
    }

    pub fn fp_register(&self, index: u8) -> u64 {
        self.fp_registers[index as usize]
    }

    pub fn set_fp_register(&mut self, index: u8, value: u64) {
        self.fp_registers[index as usize] = value;
    }

    pub fn vector(&self) -> Option<&VectorState> {
        self.vector.as_ref()
    }

    pub fn vector_mut(&mut self) -> Option<&mut VectorState> {
        self.vector.as_mut()
    }

    pub fn branch(&self) -> bool {
        self.branch
    }

    pub fn set_branch(&mut self, value: bool) {
        self.branch = value;
    }

    pub fn trap_set(&self) -> bool {
        self.trap_set
    }

    pub fn clear_trap_set(&mut self) {
        self.trap_set = false;
    }

    pub fn ceased(&self) -> bool {
        self.ceased
    }

    pub fn tracing_active(&self) -> bool {
        self.tracing_active
    }

    pub fn set_tracing_active(&mut self, active: bool) {
        self.tracing_active = active;
    }

    pub fn capture(&self) -> &TraceCapture {
        &self.capture
    }

    pub fn clear_capture(&mut self) {
        self.capture.clear();
    }

    /// Value latched by the last scalar/capability load, for the data-phase
    /// child instruction.
    pub fn load_value(&self) -> u64 {
        self.load_value
    }

    pub fn loaded_cap(&self) -> &CapabilityRegister {
        &self.loaded_cap
    }

    pub fn retired_instructions(&self) -> u64 {
        self.retired_instructions
    }

    /// Bind the retired-instruction counter (minstret/mcycle) to an external
    /// count, as the test-rig adapter does once per packet.
    pub fn set_retired_instructions(&mut self, value: u64) {
        self.retired_instructions = value;
    }

    //
    // Callback registration.
    //

    pub fn set_on_ecall(&mut self, callback: InstructionCallback) {
        self.on_ecall = Some(callback);
    }

    pub fn set_on_wfi(&mut self, callback: InstructionCallback) {
        self.on_wfi = Some(callback);
    }

    pub fn set_on_cease(&mut self, callback: InstructionCallback) {
        self.on_cease = Some(callback);
    }

    pub fn add_ebreak_handler(&mut self, callback: InstructionCallback) {
        self.on_ebreak.push(callback);
    }

    pub fn set_on_trap(&mut self, callback: TrapCallback) {
        self.on_trap = Some(callback);
    }

    //
    // CSR access.
    //

    fn check_csr_access(
        &self,
        specifier: CsrSpecifier,
        privilege_level: PrivilegeLevel,
    ) -> Result<(), CsrAccessError> {
        if !self.csrs.contains(specifier) {
            return Err(CsrAccessError::Unsupported(specifier));
        }
        let required_level = csr::required_privilege_level(specifier);
        if privilege_level < required_level {
            return Err(CsrAccessError::Privileged {
                specifier,
                required_level,
                actual_level: privilege_level,
            });
        }
        Ok(())
    }

    /// Read the value of a CSR by its specifier, at the given privilege
    /// level. Adapter CSRs (counters, FP, vector, and the mtcc/mepcc views)
    /// are routed to their backing state.
    pub fn read_csr(
        &self,
        specifier: CsrSpecifier,
        privilege_level: PrivilegeLevel,
    ) -> Result<u32, CsrAccessError> {
        self.check_csr_access(specifier, privilege_level)?;
        let value = match specifier {
            csr::FFLAGS => self.fp.fflags(),
            csr::FRM => self.fp.frm(),
            csr::FCSR => self.fp.fcsr(),
            csr::VSTART => self.vector().map(VectorState::vstart).unwrap_or(0),
            csr::VXSAT => self.vector().map(|v| v.vxsat() as u32).unwrap_or(0),
            csr::VXRM => self.vector().map(VectorState::vxrm).unwrap_or(0),
            csr::VCSR => self.vector().map(VectorState::vcsr).unwrap_or(0),
            csr::VL => self.vector().map(VectorState::vector_length).unwrap_or(0),
            csr::VTYPE => self.vector().map(VectorState::vtype).unwrap_or(0),
            csr::VLENB => self
                .vector()
                .map(VectorState::register_byte_length)
                .unwrap_or(0),
            csr::CYCLE | csr::MCYCLE | csr::INSTRET | csr::MINSTRET => {
                self.retired_instructions as u32
            }
            csr::CYCLEH | csr::MCYCLEH | csr::INSTRETH | csr::MINSTRETH => {
                (self.retired_instructions >> 32) as u32
            }
            csr::MTVEC => self.mtcc.address() & !0b11,
            csr::MEPC => self.mepcc.address() & !0b1,
            _ => self.csrs.get(specifier)?.read(),
        };
        Ok(value)
    }

    /// Write a masked value to a CSR by its specifier. Only bits set in
    /// `mask` are written; write side effects happen even for a zero mask.
    pub fn write_csr(
        &mut self,
        specifier: CsrSpecifier,
        privilege_level: PrivilegeLevel,
        value: u32,
        mask: u32,
    ) -> Result<(), CsrAccessError> {
        self.check_csr_access(specifier, privilege_level)?;
        if csr::is_read_only(specifier) {
            return Err(CsrAccessError::WriteToReadOnly(specifier));
        }
        let merge = |old: u32| (old & !mask) | (value & mask);
        match specifier {
            csr::FFLAGS => {
                let new = merge(self.fp.fflags());
                self.fp.set_fflags(new);
            }
            csr::FRM => {
                let new = merge(self.fp.frm());
                self.fp.set_frm(new);
            }
            csr::FCSR => {
                let new = merge(self.fp.fcsr());
                self.fp.set_fcsr(new);
            }
            csr::VSTART => {
                if let Some(vector) = &mut self.vector {
                    let new = merge(vector.vstart());
                    vector.set_vstart(new);
                }
            }
            csr::VXSAT => {
                if let Some(vector) = &mut self.vector {
                    let new = merge(vector.vxsat() as u32);
                    vector.set_vxsat(new & 1 != 0);
                }
            }
            csr::VXRM => {
                if let Some(vector) = &mut self.vector {
                    let new = merge(vector.vxrm());
                    vector.set_vxrm(new);
                }
            }
            csr::VCSR => {
                if let Some(vector) = &mut self.vector {
                    let new = merge(vector.vcsr());
                    vector.set_vcsr(new);
                }
            }
            csr::MCYCLE | csr::MINSTRET => {
                let new = merge(self.retired_instructions as u32);
                self.retired_instructions =
                    (self.retired_instructions & !0xFFFF_FFFF) | new as u64;
            }
            csr::MCYCLEH | csr::MINSTRETH => {
                let new = merge((self.retired_instructions >> 32) as u32);
                self.retired_instructions =
                    (self.retired_instructions & 0xFFFF_FFFF) | (new as u64) << 32;
            }
            csr::MTVEC => {
                let new = merge(self.mtcc.address() & !0b11) & !0b11;
                self.mtcc.set_address(new);
            }
            csr::MEPC => {
                let new = merge(self.mepcc.address() & !0b1) & !0b1;
                self.mepcc.set_address(new);
            }
            _ => {
                let csr = self.csrs.get_mut(specifier)?;
                csr.write(merge(csr.raw()));
            }
        }
        Ok(())
    }

    /// Make a machine interrupt pending (or clear it) and re-evaluate
    /// interrupt availability.
    pub fn set_interrupt_pending(&mut self, code: InterruptCode, pending: bool) {
        let mip = self.csrs.get_mut(csr::MIP).unwrap();
        if pending {
            mip.set_raw(mip.raw() | 1 << code.code());
        } else {
            mip.set_raw(mip.raw() & !(1 << code.code()));
        }
        self.check_for_interrupt();
    }

    //
    // Memory entrypoints. Each applies the CHERIoT checks in order (tag,
    // permission, seal, bounds) against the authorizing capability, turns a
    // violation into a capability exception, and only then issues the tagged
    // memory request.
    //

    fn check_data_access(
        cap: &CapabilityRegister,
        address: u32,
        size: u32,
        permission: Permissions,
        violation: CapException,
    ) -> Result<(), CapException> {
        if !cap.tag() {
            Err(CapException::TagViolation)
        } else if !cap.has_permission(permission) {
            Err(violation)
        } else if cap.is_sealed() {
            Err(CapException::SealViolation)
        } else if !cap.is_in_bounds(address, size) {
            Err(CapException::BoundsViolation)
        } else {
            Ok(())
        }
    }

    /// Scalar load of `size` bytes (1, 2 or 4). Returns the zero-extended
    /// value, or `None` when a trap was raised. The value is also latched for
    /// the data-phase child instruction.
    pub fn load_memory(
        &mut self,
        inst: &Instruction,
        auth: CapIndex,
        address: u32,
        size: u32,
    ) -> Option<u64> {
        let cap = self.cap_by_index(auth).clone();
        if let Err(code) =
            Self::check_data_access(&cap, address, size, Permissions::LOAD, CapException::PermitLoadViolation)
        {
            self.handle_cheri_reg_exception(inst, inst.address(), code, auth);
            return None;
        }
        if address % size != 0 {
            self.trap(
                false,
                address,
                Exception::LoadAddressMisaligned.code(),
                inst.address(),
                Some(inst),
            );
            return None;
        }
        let mut buf = [0u8; 8];
        if self.memory.load(address, &mut buf[..size as usize]).is_err() {
            self.trap(
                false,
                address,
                Exception::LoadAccessFault.code(),
                inst.address(),
                Some(inst),
            );
            return None;
        }
        let value = u64::from_le_bytes(buf);
        if self.tracing_active {
            self.capture.mem_addr = address as u64;
            self.capture.rmask = (1 << size) - 1;
            self.capture.rdata[0] = value;
        }
        self.load_value = value;
        Some(value)
    }

    /// Scalar store of `size` bytes (1, 2 or 4).
    /// Returns `false` when a trap was raised.
    pub fn store_memory(
        &mut self,
        inst: &Instruction,
        auth: CapIndex,
        address: u32,
        size: u32,
        value: u64,
    ) -> bool {
        let cap = self.cap_by_index(auth).clone();
        if let Err(code) = Self::check_data_access(
            &cap,
            address,
            size,
            Permissions::STORE,
            CapException::PermitStoreViolation,
        ) {
            self.handle_cheri_reg_exception(inst, inst.address(), code, auth);
            return false;
        }
        if address % size != 0 {
            self.trap(
                false,
                address,
                Exception::StoreAddressMisaligned.code(),
                inst.address(),
                Some(inst),
            );
            return false;
        }
        let bytes = value.to_le_bytes();
        if self.memory.store(address, &bytes[..size as usize]).is_err() {
            self.trap(
                false,
                address,
                Exception::StoreAccessFault.code(),
                inst.address(),
                Some(inst),
            );
            return false;
        }
        if self.tracing_active {
            self.capture.mem_addr = address as u64;
            self.capture.wmask = (1 << size) - 1;
            self.capture.wdata[0] = value;
        }
        self.update_stack_high_water_mark(address);
        true
    }

    /// Word-sized atomic read-modify-write through the optional atomic
    /// interface. Requires both load and store permission on the authorizing
    /// capability. Returns the loaded value.
    pub fn amo_memory(
        &mut self,
        inst: &Instruction,
        auth: CapIndex,
        address: u32,
        op: AtomicOp,
        value: u32,
    ) -> Option<u32> {
        if !self.atomics_enabled {
            self.trap(
                false,
                inst.raw(),
                Exception::IllegalInstruction.code(),
                inst.address(),
                Some(inst),
            );
            return None;
        }
        let cap = self.cap_by_index(auth).clone();
        if let Err(code) =
            Self::check_data_access(&cap, address, 4, Permissions::LOAD, CapException::PermitLoadViolation)
                .and_then(|()| {
                    Self::check_data_access(
                        &cap,
                        address,
                        4,
                        Permissions::STORE,
                        CapException::PermitStoreViolation,
                    )
                })
        {
            self.handle_cheri_reg_exception(inst, inst.address(), code, auth);
            return None;
        }
        if address % 4 != 0 {
            self.trap(
                false,
                address,
                Exception::StoreAddressMisaligned.code(),
                inst.address(),
                Some(inst),
            );
            return None;
        }
        let old = match self.memory.atomic_rmw(address, op, value) {
            Ok(old) => old,
            Err(_) => {
                self.trap(
                    false,
                    address,
                    Exception::StoreAccessFault.code(),
                    inst.address(),
                    Some(inst),
                );
                return None;
            }
        };
        if self.tracing_active {
            self.capture.mem_addr = address as u64;
            self.capture.rmask = 0xF;
            self.capture.wmask = 0xF;
            self.capture.rdata[0] = old as u64;
        }
        self.load_value = old as u64;
        self.update_stack_high_water_mark(address);
        Some(old)
    }

    /// Capability load: returns the expanded capability, with its tag
    /// filtered by the authorizing capability's load permissions
    /// (`clear_tag` forces an untagged result). Also latched for the child
    /// instruction.
    pub fn load_capability(
        &mut self,
        inst: &Instruction,
        auth: CapIndex,
        address: u32,
        clear_tag: bool,
    ) -> Option<CapabilityRegister> {
        let cap = self.cap_by_index(auth).clone();
        if let Err(code) =
            Self::check_data_access(&cap, address, 8, Permissions::LOAD, CapException::PermitLoadViolation)
        {
            self.handle_cheri_reg_exception(inst, inst.address(), code, auth);
            return None;
        }
        if address % 8 != 0 {
            self.trap(
                false,
                address,
                Exception::LoadAddressMisaligned.code(),
                inst.address(),
                Some(inst),
            );
            return None;
        }
        let (bits, tag) = match self.memory.load_capability(address) {
            Ok(loaded) => loaded,
            Err(_) => {
                self.trap(
                    false,
                    address,
                    Exception::LoadAccessFault.code(),
                    inst.address(),
                    Some(inst),
                );
                return None;
            }
        };
        let mut loaded = CapabilityRegister::expand(bits, tag);
        if clear_tag || !cap.has_permission(Permissions::LOAD_STORE_CAP) {
            loaded.clear_tag();
        }
        if loaded.tag() {
            if !cap.has_permission(Permissions::LOAD_GLOBAL) {
                loaded.and_perm(Permissions::from_bits(
                    !(Permissions::GLOBAL.bits() | Permissions::LOAD_GLOBAL.bits()),
                ));
            }
            if !cap.has_permission(Permissions::LOAD_MUTABLE) && !loaded.is_sealed() {
                loaded.and_perm(Permissions::from_bits(
                    !(Permissions::STORE.bits() | Permissions::LOAD_MUTABLE.bits()),
                ));
            }
        }
        if self.tracing_active {
            self.capture.mem_addr = address as u64;
            self.capture.rmask = 0xFF;
            self.capture.rdata[0] = bits;
        }
        self.loaded_cap = loaded.clone();
        Some(loaded)
    }

    /// Capability store: writes the compressed image and propagates the
    /// source capability's tag, subject to the authorizing capability's
    /// store-capability permissions.
    pub fn store_capability(
        &mut self,
        inst: &Instruction,
        auth: CapIndex,
        address: u32,
        source: &CapabilityRegister,
    ) -> bool {
        let cap = self.cap_by_index(auth).clone();
        let mut check = Self::check_data_access(
            &cap,
            address,
            8,
            Permissions::STORE,
            CapException::PermitStoreViolation,
        );
        if check.is_ok() && source.tag() {
            if !cap.has_permission(Permissions::LOAD_STORE_CAP) {
                check = Err(CapException::PermitStoreCapabilityViolation);
            } else if !source.has_permission(Permissions::GLOBAL)
                && !cap.has_permission(Permissions::STORE_LOCAL)
            {
                check = Err(CapException::PermitStoreLocalCapabilityViolation);
            }
        }
        if let Err(code) = check {
            self.handle_cheri_reg_exception(inst, inst.address(), code, auth);
            return false;
        }
        if address % 8 != 0 {
            self.trap(
                false,
                address,
                Exception::StoreAddressMisaligned.code(),
                inst.address(),
                Some(inst),
            );
            return false;
        }
        let bits = source.compress();
        if self
            .memory
            .store_capability(address, bits, source.tag())
            .is_err()
        {
            self.trap(
                false,
                address,
                Exception::StoreAccessFault.code(),
                inst.address(),
                Some(inst),
            );
            return false;
        }
        if self.tracing_active {
            self.capture.mem_addr = address as u64;
            self.capture.wmask = 0xFF;
            self.capture.wdata[0] = bits;
        }
        self.update_stack_high_water_mark(address);
        true
    }

    /// Vector (indexed/strided) load: one element per active lane. Elements
    /// of inactive lanes are left untouched in `data`.
    pub fn load_memory_vector(
        &mut self,
        inst: &Instruction,
        auth: CapIndex,
        addresses: &[u32],
        mask: &[bool],
        el_size: u32,
        data: &mut [u8],
    ) -> bool {
        for (i, &address) in addresses.iter().enumerate() {
            if !mask.get(i).copied().unwrap_or(false) {
                continue;
            }
            let Some(value) = self.load_memory(inst, auth, address, el_size) else {
                return false;
            };
            let offset = i * el_size as usize;
            data[offset..offset + el_size as usize]
                .copy_from_slice(&value.to_le_bytes()[..el_size as usize]);
        }
        true
    }

    /// Vector (indexed/strided) store: one element per active lane.
    pub fn store_memory_vector(
        &mut self,
        inst: &Instruction,
        auth: CapIndex,
        addresses: &[u32],
        mask: &[bool],
        el_size: u32,
        data: &[u8],
    ) -> bool {
        for (i, &address) in addresses.iter().enumerate() {
            if !mask.get(i).copied().unwrap_or(false) {
                continue;
            }
            let offset = i * el_size as usize;
            let mut bytes = [0u8; 8];
            bytes[..el_size as usize].copy_from_slice(&data[offset..offset + el_size as usize]);
            if !self.store_memory(inst, auth, address, el_size, u64::from_le_bytes(bytes)) {
                return false;
            }
        }
        true
    }

    /// Check-free memory read for debuggers and hosts.
    pub fn dbg_load_memory(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.memory.load(address, buf)
    }

    /// Check-free memory write for debuggers and hosts.
    pub fn dbg_store_memory(&mut self, address: u32, buf: &[u8]) -> Result<(), MemoryError> {
        self.memory.store(address, buf)
    }

    /// Any store below the current stack high-water mark (and at or above
    /// its base) drags the mark down to the store address, 16-byte aligned.
    fn update_stack_high_water_mark(&mut self, address: u32) {
        let mshwm = self.csrs.get(csr::MSHWM).unwrap().raw();
        let mshwmb = self.csrs.get(csr::MSHWMB).unwrap().raw();
        if address >= mshwmb && address < mshwm {
            self.csrs
                .get_mut(csr::MSHWM)
                .unwrap()
                .set_raw(address & !0xF);
        }
    }

    //
    // Reservation tracking for lr.w/sc.w.
    //

    pub fn set_reservation(&mut self, address: u32) {
        self.reservation = Some(address & !0b11);
    }

    /// Returns whether a reservation covering `address` was held; always
    /// clears it.
    pub fn check_and_clear_reservation(&mut self, address: u32) -> bool {
        self.reservation.take() == Some(address & !0b11)
    }

    pub fn clear_reservation(&mut self) {
        self.reservation = None;
    }

    //
    // Environment operations invoked by semantic functions.
    //

    /// Fence operation. Purely a notification in this single-hart model.
    pub fn fence(&mut self, _inst: &Instruction, _predecessor: u32, _successor: u32) {}

    /// Instruction/data stream synchronization. A no-op here.
    pub fn fence_i(&mut self, _inst: &Instruction) {}

    /// System call: defers to the registered handler, otherwise traps with
    /// the environment-call cause for the current privilege mode.
    pub fn ecall(&mut self, inst: &Instruction) {
        if let Some(mut handler) = self.on_ecall.take() {
            let handled = handler(inst);
            self.on_ecall = Some(handler);
            if handled {
                return;
            }
        }
        let cause = match self.privilege_mode {
            PrivilegeLevel::User => Exception::EnvironmentCallFromUMode,
            PrivilegeLevel::Machine => Exception::EnvironmentCallFromMMode,
        };
        self.trap(false, 0, cause.code(), inst.address(), Some(inst));
    }

    /// Breakpoint: offers the event to every registered handler in order,
    /// then traps.
    pub fn ebreak(&mut self, inst: &Instruction) {
        let mut handlers = std::mem::take(&mut self.on_ebreak);
        let handled = handlers.iter_mut().any(|handler| handler(inst));
        self.on_ebreak = handlers;
        if handled {
            return;
        }
        self.trap(
            false,
            inst.address(),
            Exception::Breakpoint.code(),
            inst.address(),
            Some(inst),
        );
    }

    /// Wait for interrupt. Not a real wait: the host decides via the
    /// callback whether to do anything.
    pub fn wfi(&mut self, inst: &Instruction) {
        if let Some(mut handler) = self.on_wfi.take() {
            handler(inst);
            self.on_wfi = Some(handler);
        }
    }

    /// Cease execution: quiesce and halt until reset. Non-standard.
    pub fn cease(&mut self, inst: &Instruction) {
        if let Some(mut handler) = self.on_cease.take() {
            handler(inst);
            self.on_cease = Some(handler);
        }
        self.ceased = true;
    }

    /// Read the revocation bitmap bit for a capability base address.
    /// Consulted by revocation-sweep instructions only.
    pub fn must_revoke(&self, address: u32) -> bool {
        if self.config.revocation_mem_base == 0 {
            return false;
        }
        let Some(offset) = address.checked_sub(self.config.revocation_ram_base) else {
            return false;
        };
        let bit_index = offset / 8;
        let mut byte = [0u8];
        if self
            .memory
            .load(self.config.revocation_mem_base + bit_index / 8, &mut byte)
            .is_err()
        {
            return false;
        }
        byte[0] >> (bit_index % 8) & 1 == 1
    }

    //
    // Stepping (used by the standalone runner; the test rig drives its own
    // retirement loop).
    //

    /// Fetch, decode and execute one instruction at `pcc`, then advance the
    /// pc and take a pending interrupt if one is available.
    pub fn step(&mut self, decoder: &CheriotDecoder) {
        let pc = self.pcc().address();
        trace!("step at {pc:#010x}");
        let min_size = if self.has_compact() { 2 } else { 4 };
        let inst = if !self.pcc().tag() {
            let inst = decoder.decode_instruction(self, pc, 0);
            self.handle_cheri_reg_exception(&inst, pc, CapException::TagViolation, CapIndex::Pcc);
            None
        } else if !self.pcc().has_permission(Permissions::EXECUTE) {
            let inst = decoder.decode_instruction(self, pc, 0);
            self.handle_cheri_reg_exception(
                &inst,
                pc,
                CapException::PermitExecuteViolation,
                CapIndex::Pcc,
            );
            None
        } else if !self.pcc().is_in_bounds(pc, min_size) {
            let inst = decoder.decode_instruction(self, pc, 0);
            self.handle_cheri_reg_exception(&inst, pc, CapException::BoundsViolation, CapIndex::Pcc);
            None
        } else {
            let mut buf = [0u8; 4];
            // The tail of the window may only fit a compressed instruction.
            let readable = self.memory.end().saturating_sub(pc as u64).min(4) as usize;
            let fetched = readable >= 2 && self.memory.load(pc, &mut buf[..readable]).is_ok();
            if fetched {
                let word = u32::from_le_bytes(buf);
                Some(decoder.decode_instruction(self, pc, word))
            } else {
                let inst = decoder.decode_instruction(self, pc, 0);
                self.trap(
                    false,
                    pc,
                    Exception::InstructionAccessFault.code(),
                    pc,
                    Some(&inst),
                );
                None
            }
        };
        let mut next_pc = pc;
        if let Some(inst) = inst {
            next_pc = pc.wrapping_add(inst.size());
            inst.execute(self);
        }
        if self.trap_set || self.branch {
            next_pc = self.pcc().address();
        }
        self.trap_set = false;
        self.branch = false;
        self.pcc_mut().set_address(next_pc);
        self.retired_instructions += 1;
        self.check_for_interrupt();
        if self.is_interrupt_available {
            let epc = self.pcc().address();
            self.take_available_interrupt(epc);
            self.trap_set = false;
        }
    }
}

impl std::fmt::Debug for CheriotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheriotState")
            .field("pcc", &self.registers.pcc())
            .field("privilege_mode", &self.privilege_mode)
            .field("branch", &self.branch)
            .field("trap_set", &self.trap_set)
            .field("retired_instructions", &self.retired_instructions)
            .finish_non_exhaustive()
    }
}

/// Populate the CSR set. Adapter CSRs get placeholder storage here; their
/// reads and writes are routed to the backing state by
/// [`CheriotState::read_csr`]/[`CheriotState::write_csr`].
fn create_csrs(csrs: &mut CsrSet, config: &Config) {
    let entries = [
        Csr::new(csr::MSTATUS, "mstatus", 0, !0, 0x0000_1888),
        Csr::read_only(csr::MISA, "misa", config.misa),
        Csr::new(csr::MIE, "mie", 0, !0, 0x888),
        Csr::new(csr::MIP, "mip", 0, !0, 0x888),
        Csr::simple(csr::MTVEC, "mtvec", 0),
        Csr::simple(csr::MSTATUSH, "mstatush", 0),
        Csr::simple(csr::MSCRATCH, "mscratch", 0),
        Csr::simple(csr::MEPC, "mepc", 0),
        Csr::simple(csr::MCAUSE, "mcause", 0),
        Csr::simple(csr::MTVAL, "mtval", 0),
        Csr::simple(csr::MCYCLE, "mcycle", 0),
        Csr::simple(csr::MINSTRET, "minstret", 0),
        Csr::simple(csr::MCYCLEH, "mcycleh", 0),
        Csr::simple(csr::MINSTRETH, "minstreth", 0),
        Csr::new(csr::MSHWM, "mshwm", 0, !0, !0xF),
        Csr::new(csr::MSHWMB, "mshwmb", 0, !0, !0xF),
        Csr::read_only(csr::MVENDORID, "mvendorid", 0),
        Csr::read_only(csr::MARCHID, "marchid", 0),
        Csr::read_only(csr::MIMPID, "mimpid", 0),
        Csr::read_only(csr::MHARTID, "mhartid", 0),
        Csr::read_only(csr::CYCLE, "cycle", 0),
        Csr::read_only(csr::INSTRET, "instret", 0),
        Csr::read_only(csr::CYCLEH, "cycleh", 0),
        Csr::read_only(csr::INSTRETH, "instreth", 0),
        Csr::simple(csr::FFLAGS, "fflags", 0),
        Csr::simple(csr::FRM, "frm", 0),
        Csr::simple(csr::FCSR, "fcsr", 0),
    ];
    for entry in entries {
        csrs.add(entry).expect("duplicate CSR in construction table");
    }
    if config.vector_register_width > 0 {
        let vector_entries = [
            Csr::simple(csr::VSTART, "vstart", 0),
            Csr::simple(csr::VXSAT, "vxsat", 0),
            Csr::simple(csr::VXRM, "vxrm", 0),
            Csr::simple(csr::VCSR, "vcsr", 0),
            Csr::read_only(csr::VL, "vl", 0),
            Csr::read_only(csr::VTYPE, "vtype", 0),
            Csr::read_only(csr::VLENB, "vlenb", config.vector_register_width),
        ];
        for entry in vector_entries {
            csrs.add(entry).expect("duplicate CSR in construction table");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn state() -> CheriotState {
        CheriotState::new(TaggedMemory::new(0x8000_0000, 0x1_0000), Config::default())
    }

    fn dummy_inst() -> Instruction {
        Instruction::new(
            0x8000_0000,
            4,
            0,
            crate::decode::Opcode::None,
            "test".to_string(),
            vec![],
            vec![],
            |_, _| {},
            None,
        )
    }

    #[test]
    fn test_reset_values() {
        let state = state();
        assert_eq!(0x8000_0000, state.pcc().address());
        assert!(state.pcc().has_permission(Permissions::EXECUTE));
        for specifier in Specifier::iter_all().skip(1) {
            let c = state.registers().c(specifier);
            assert!(c.tag());
            assert!(c.has_permission(Permissions::STORE));
        }
        assert!(!state.registers().c(Specifier::C0).tag());
        assert!(state.scr(ScrSpecifier::Mtdc).tag());
        assert_eq!(0, state.scr(ScrSpecifier::Mtdc).address());
    }

    #[test]
    fn test_csr_read_write_roundtrip() {
        let mut state = state();
        state
            .write_csr(csr::MSCRATCH, PrivilegeLevel::Machine, 0x1234_5678, !0)
            .unwrap();
        assert_eq!(
            0x1234_5678,
            state.read_csr(csr::MSCRATCH, PrivilegeLevel::Machine).unwrap()
        );
    }

    #[test]
    fn test_csr_privilege_and_read_only() {
        let mut state = state();
        assert!(matches!(
            state.read_csr(csr::MSTATUS, PrivilegeLevel::User),
            Err(CsrAccessError::Privileged { .. })
        ));
        assert!(matches!(
            state.write_csr(csr::MVENDORID, PrivilegeLevel::Machine, 1, !0),
            Err(CsrAccessError::WriteToReadOnly(_))
        ));
        assert!(matches!(
            state.read_csr(0x7C9, PrivilegeLevel::Machine),
            Err(CsrAccessError::Unsupported(_))
        ));
    }

    #[test]
    fn test_counter_binding() {
        let mut state = state();
        state.set_retired_instructions(0x1_0000_0007);
        assert_eq!(
            7,
            state.read_csr(csr::MINSTRET, PrivilegeLevel::Machine).unwrap()
        );
        assert_eq!(
            1,
            state
                .read_csr(csr::MINSTRETH, PrivilegeLevel::Machine)
                .unwrap()
        );
        assert_eq!(
            7,
            state.read_csr(csr::MCYCLE, PrivilegeLevel::Machine).unwrap()
        );
    }

    #[test]
    fn test_mtvec_mepc_are_scr_views() {
        let mut state = state();
        state
            .write_csr(csr::MTVEC, PrivilegeLevel::Machine, 0x8000_0100, !0)
            .unwrap();
        assert_eq!(0x8000_0100, state.scr(ScrSpecifier::Mtcc).address());
        assert_eq!(
            0x8000_0100,
            state.read_csr(csr::MTVEC, PrivilegeLevel::Machine).unwrap()
        );
        let mut mepcc = state.scr(ScrSpecifier::Mepcc).clone();
        mepcc.set_address(0x8000_0203);
        state.set_scr(ScrSpecifier::Mepcc, mepcc);
        assert_eq!(
            0x8000_0202,
            state.read_csr(csr::MEPC, PrivilegeLevel::Machine).unwrap()
        );
    }

    #[test]
    fn test_load_store_through_root() {
        let mut state = state();
        let inst = dummy_inst();
        assert!(state.store_memory(
            &inst,
            CapIndex::Register(Specifier::from_u5(10)),
            0x8000_2468,
            4,
            0xDEAD_BEEF
        ));
        assert_eq!(
            Some(0xDEAD_BEEF),
            state.load_memory(&inst, CapIndex::Register(Specifier::from_u5(10)), 0x8000_2468, 4)
        );
        assert!(!state.trap_set());
    }

    #[test]
    fn test_untagged_load_raises_tag_violation() {
        let mut state = state();
        let inst = dummy_inst();
        // c0 is the null capability.
        assert_eq!(
            None,
            state.load_memory(&inst, CapIndex::Register(Specifier::C0), 0x8000_0000, 4)
        );
        assert!(state.trap_set());
        let mtval = state.csrs().get(csr::MTVAL).unwrap().raw();
        assert_eq!(CapException::TagViolation.code(), mtval & 0x1F);
        assert_eq!(0, mtval >> 5);
        assert_eq!(
            CHERI_EXCEPTION_CODE,
            state.csrs().get(csr::MCAUSE).unwrap().raw()
        );
    }

    #[test]
    fn test_out_of_window_access_is_access_fault() {
        let mut state = state();
        let inst = dummy_inst();
        // In bounds of the root capability, beyond physical memory.
        assert_eq!(
            None,
            state.load_memory(&inst, CapIndex::Register(Specifier::from_u5(5)), 0x9000_0000, 4)
        );
        assert!(state.trap_set());
        assert_eq!(
            Exception::LoadAccessFault.code(),
            state.csrs().get(csr::MCAUSE).unwrap().raw()
        );
        assert_eq!(0x9000_0000, state.csrs().get(csr::MTVAL).unwrap().raw());
    }

    #[test]
    fn test_trap_delivery_and_return_accounting() {
        let mut state = state();
        let inst = dummy_inst();
        let mut mtcc = state.executable_root().clone();
        mtcc.set_address(0x8000_0400);
        state.set_scr(ScrSpecifier::Mtcc, mtcc);
        state.trap(false, 0, Exception::EnvironmentCallFromMMode.code(), 0x8000_0020, Some(&inst));
        assert_eq!(1, state.counter_interrupts_taken());
        assert_eq!(1, state.interrupt_handler_depth());
        assert_eq!(0x8000_0400, state.pcc().address());
        assert_eq!(0x8000_0020, state.scr(ScrSpecifier::Mepcc).address());
        assert_eq!(11, state.csrs().get(csr::MCAUSE).unwrap().raw());
        state.signal_return_from_interrupt();
        assert_eq!(0, state.interrupt_handler_depth());
        assert_eq!(1, state.counter_interrupt_returns());
    }

    #[test]
    fn test_trap_callback_can_handle() {
        let mut state = state();
        let seen = Rc::new(Cell::new(false));
        let seen_clone = seen.clone();
        state.set_on_trap(Box::new(move |_, _, _, _, _| {
            seen_clone.set(true);
            true
        }));
        let pcc_before = state.pcc().clone();
        state.trap(false, 0, Exception::IllegalInstruction.code(), 0x8000_0000, None);
        assert!(seen.get());
        // Handled: default delivery skipped.
        assert_eq!(pcc_before.address(), state.pcc().address());
        assert!(state.trap_set());
    }

    #[test]
    fn test_interrupt_selection_priority() {
        let mut state = state();
        // Enable all machine interrupts, set MIE.
        state
            .write_csr(csr::MIE, PrivilegeLevel::Machine, 0x888, !0)
            .unwrap();
        let mstatus = state.csrs_mut().get_mut(csr::MSTATUS).unwrap();
        mstatus.set_raw(mstatus.raw() | 0b1000);
        state.set_interrupt_pending(InterruptCode::MachineTimer, true);
        state.set_interrupt_pending(InterruptCode::MachineExternal, true);
        assert!(state.is_interrupt_available());
        state.take_available_interrupt(0x8000_0010);
        let info = state.interrupt_info_list().last().unwrap();
        assert!(info.is_interrupt);
        assert_eq!(InterruptCode::MachineExternal.code(), info.cause);
        assert_eq!(
            INTERRUPT_FLAG | InterruptCode::MachineExternal.code(),
            state.csrs().get(csr::MCAUSE).unwrap().raw()
        );
    }

    #[test]
    fn test_capability_store_requires_store_local_for_non_global() {
        let mut state = state();
        let inst = dummy_inst();
        // Make a non-global source capability.
        let mut source = state.memory_root().clone();
        source.and_perm(Permissions::from_bits(!Permissions::GLOBAL.bits()));
        assert!(source.tag());
        // Authorize through a register stripped of store-local.
        let mut auth = state.memory_root().clone();
        auth.and_perm(Permissions::from_bits(!Permissions::STORE_LOCAL.bits()));
        state.registers_mut().set_c(Specifier::from_u5(9), auth);
        assert!(!state.store_capability(
            &inst,
            CapIndex::Register(Specifier::from_u5(9)),
            0x8000_0100,
            &source
        ));
        let mtval = state.csrs().get(csr::MTVAL).unwrap().raw();
        assert_eq!(
            CapException::PermitStoreLocalCapabilityViolation.code(),
            mtval & 0x1F
        );
        assert_eq!(9, mtval >> 5);
    }

    #[test]
    fn test_loaded_capability_is_filtered_by_load_permissions() {
        let mut state = state();
        let inst = dummy_inst();
        // Store the memory root at an aligned slot.
        let source = state.memory_root().clone();
        assert!(state.store_capability(
            &inst,
            CapIndex::Register(Specifier::from_u5(10)),
            0x8000_0200,
            &source
        ));
        // Load back through an authority without load-mutable.
        let mut auth = state.memory_root().clone();
        auth.and_perm(Permissions::from_bits(!Permissions::LOAD_MUTABLE.bits()));
        state.registers_mut().set_c(Specifier::from_u5(11), auth);
        let loaded = state
            .load_capability(&inst, CapIndex::Register(Specifier::from_u5(11)), 0x8000_0200, false)
            .unwrap();
        assert!(loaded.tag());
        assert!(!loaded.has_permission(Permissions::STORE));
        assert!(loaded.has_permission(Permissions::LOAD));
    }

    #[test]
    fn test_stack_high_water_mark_tracks_stores() {
        let mut state = state();
        let inst = dummy_inst();
        state
            .write_csr(csr::MSHWMB, PrivilegeLevel::Machine, 0x8000_0000, !0)
            .unwrap();
        state
            .write_csr(csr::MSHWM, PrivilegeLevel::Machine, 0x8000_1000, !0)
            .unwrap();
        assert!(state.store_memory(
            &inst,
            CapIndex::Register(Specifier::from_u5(2)),
            0x8000_0F08,
            4,
            0
        ));
        assert_eq!(
            0x8000_0F00,
            state.read_csr(csr::MSHWM, PrivilegeLevel::Machine).unwrap()
        );
    }

    #[test]
    fn test_ecall_callback() {
        let mut state = state();
        let inst = dummy_inst();
        state.set_on_ecall(Box::new(|_| true));
        state.ecall(&inst);
        assert!(!state.trap_set());
        state.set_on_ecall(Box::new(|_| false));
        state.ecall(&inst);
        assert!(state.trap_set());
        assert_eq!(11, state.csrs().get(csr::MCAUSE).unwrap().raw());
    }

    #[test]
    fn test_reservation() {
        let mut state = state();
        state.set_reservation(0x8000_0100);
        assert!(state.check_and_clear_reservation(0x8000_0100));
        assert!(!state.check_and_clear_reservation(0x8000_0100));
        state.set_reservation(0x8000_0100);
        assert!(!state.check_and_clear_reservation(0x8000_0200));
    }
}
