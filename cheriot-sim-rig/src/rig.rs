//! The retirement adapter.
//!
//! For every instruction packet received, the adapter snapshots the state
//! the reference implementation reports (pc, register triple, source
//! values), applies the pre-execution pcc checks, executes, and emits one
//! retirement record in the negotiated trace format. A trap turns the record
//! into a trap retirement with zeroed register and memory fields; a taken
//! branch redirects `pc_wdata` to the capability program counter.

use crate::decoder::{DecodeInfo, RigDecoder};
use crate::packets::*;
use cheriot_sim_core::capability::Permissions;
use cheriot_sim_core::csr;
use cheriot_sim_core::memory::TaggedMemory;
use cheriot_sim_core::registers::Specifier;
use cheriot_sim_core::state::{CapException, CapIndex, CheriotState, Config, Exception};
use log::{error, info};
use std::cell::Cell;
use std::io::{self, Write};
use std::rc::Rc;
use thiserror::Error;

/// The adapter's only failure mode besides socket I/O.
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
#[error("trace version {0} is not supported")]
pub struct UnsupportedVersionError(pub u32);

/// Size of the memory window the rig exposes, starting at the reset vector.
const MEMORY_BYTES: u32 = 64 * 1024;
/// The reset vector and window base used by the trace protocol.
const MEMORY_BASE: u32 = 0x8000_0000;

/// Highest trace version this adapter can produce.
pub const MAX_TRACE_VERSION: u32 = 2;

/// The simulator core wired up for differential trace testing.
pub struct CheriotTestRig {
    state: CheriotState,
    decoder: RigDecoder,
    trap_flag: Rc<Cell<bool>>,
    instruction_count: u64,
    trace_version: u32,
}

impl Default for CheriotTestRig {
    fn default() -> Self {
        Self::new()
    }
}

impl CheriotTestRig {
    pub fn new() -> Self {
        let memory = TaggedMemory::new(MEMORY_BASE, MEMORY_BYTES);
        let mut state = CheriotState::new(
            memory,
            Config {
                reset_vector: MEMORY_BASE,
                ..Config::default()
            },
        );
        let trap_flag = Rc::new(Cell::new(false));
        let flag = trap_flag.clone();
        state.set_on_trap(Box::new(move |_, _, _, _, _| {
            // Just capture that a trap occurred; delivery stays default.
            flag.set(true);
            false
        }));
        state.set_tracing_active(true);
        let mut rig = Self {
            state,
            decoder: RigDecoder::new(),
            trap_flag,
            instruction_count: 0,
            trace_version: 1,
        };
        rig.reset_arch();
        rig
    }

    /// The architectural state, for inspection by hosts and tests.
    pub fn state(&self) -> &CheriotState {
        &self.state
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    pub fn trace_version(&self) -> u32 {
        self.trace_version
    }

    pub fn max_supported_version(&self) -> u32 {
        MAX_TRACE_VERSION
    }

    /// Switch the trace format for subsequent packets.
    pub fn set_version(&mut self, version: u32) -> Result<(), UnsupportedVersionError> {
        if version == 0 || version > MAX_TRACE_VERSION {
            return Err(UnsupportedVersionError(version));
        }
        self.trace_version = version;
        Ok(())
    }

    /// Reset the architectural state to the trace protocol's initial
    /// conditions: pcc at the executable root with the reset-vector address,
    /// every other register the memory root, cleared memory and counters.
    fn reset_arch(&mut self) {
        self.state.reset();
        self.state
            .memory_mut()
            .clear(MEMORY_BASE, MEMORY_BYTES)
            .expect("reset window is always inside memory");
        self.instruction_count = 0;
        self.state.set_retired_instructions(0);
    }

    /// Handle an end-of-trace packet: reset and emit a reset record carrying
    /// `halt` (which encodes the supported version during negotiation).
    pub fn reset(&mut self, halt: u8, out: &mut impl Write) -> io::Result<()> {
        self.reset_arch();
        self.trap_flag.set(false);
        match self.trace_version {
            1 => {
                let packet = ExecutionPacket {
                    halt,
                    ..Default::default()
                };
                out.write_all(&packet.to_bytes())
            }
            _ => {
                let header = ExecutionPacketV2 {
                    trace_size: ExecutionPacketV2::SIZE as u64,
                    metadata: ExecutionPacketMetaData {
                        halt,
                        ..Default::default()
                    },
                    ..Default::default()
                };
                out.write_all(&header.to_bytes())
            }
        }
    }

    /// Execute one instruction packet and emit its retirement record.
    pub fn execute(
        &mut self,
        packet: &InstructionPacket,
        out: &mut impl Write,
    ) -> io::Result<()> {
        match self.trace_version {
            1 => self.execute_v1(packet, out),
            _ => self.execute_v2(packet, out),
        }
    }

    /// Common retirement flow shared by both trace versions. Returns the
    /// filled v1-shaped record plus the wide memory capture; the callers
    /// reshape it for the wire.
    fn retire(&mut self, packet: &InstructionPacket, check_tag: bool) -> Retirement {
        let mut inst_word = packet.insn;
        self.state.clear_capture();
        // A trap recorded by the previous packet marks this one as the first
        // handler instruction.
        let intr = self.trap_flag.get();
        self.trap_flag.set(false);
        self.state.clear_trap_set();

        let pc = self.state.pcc().address();
        let mut info = DecodeInfo::default();
        let inst = self
            .decoder
            .decode_instruction(&self.state, pc, inst_word, &mut info);
        let rs1_data = self.register_address(info.rs1);
        let rs2_data = self.register_address(info.rs2);
        let mut next_pc = pc.wrapping_add(inst.size());

        // Pre-execute checks on pcc; a failure raises the CHERI exception
        // and zeroes the traced instruction word.
        let min_size = if self.state.has_compact() { 2 } else { 4 };
        let pcc = self.state.pcc().clone();
        let failure = if check_tag && !pcc.tag() {
            Some(CapException::TagViolation)
        } else if !pcc.has_permission(Permissions::EXECUTE) {
            Some(CapException::PermitExecuteViolation)
        } else if !pcc.is_in_bounds(pc, min_size) {
            Some(CapException::BoundsViolation)
        } else {
            None
        };
        match failure {
            Some(code) => {
                self.state
                    .handle_cheri_reg_exception(&inst, inst.address(), code, CapIndex::Pcc);
                inst_word = 0;
            }
            None => inst.execute(&mut self.state),
        }

        let mut retirement = Retirement {
            pc_rdata: pc,
            insn: inst_word,
            intr,
            ..Default::default()
        };
        if self.state.trap_set() {
            next_pc = self.state.pcc().address();
            retirement.trap = true;
            // All register and memory fields stay zero, except the address
            // of a faulting data access.
            let mcause = self.state.csrs().get(csr::MCAUSE).expect("mcause exists").raw();
            if mcause == Exception::LoadAccessFault.code()
                || mcause == Exception::StoreAccessFault.code()
            {
                retirement.mem_addr =
                    self.state.csrs().get(csr::MTVAL).expect("mtval exists").raw() as u64;
            }
        } else {
            if self.state.branch() {
                next_pc = self.state.pcc().address();
            }
            retirement.rd_addr = info.rd;
            retirement.rs1_addr = info.rs1;
            retirement.rs2_addr = info.rs2;
            retirement.rs1_data = rs1_data;
            retirement.rs2_data = rs2_data;
            retirement.rd_wdata = self.register_address(info.rd);
            let capture = self.state.capture();
            retirement.mem_addr = capture.mem_addr;
            retirement.mem_rdata = capture.rdata;
            retirement.mem_wdata = capture.wdata;
            retirement.mem_rmask = capture.rmask;
            retirement.mem_wmask = capture.wmask;
        }
        self.state.set_branch(false);
        self.state.clear_trap_set();

        self.instruction_count += 1;
        self.state.set_retired_instructions(self.instruction_count);
        retirement.order = self.instruction_count;
        retirement.pc_wdata = next_pc;
        self.state.pcc_mut().set_address(next_pc);
        retirement
    }

    fn execute_v1(&mut self, packet: &InstructionPacket, out: &mut impl Write) -> io::Result<()> {
        let r = self.retire(packet, false);
        let packet = ExecutionPacket {
            order: r.order,
            pc_rdata: r.pc_rdata as u64,
            pc_wdata: r.pc_wdata as u64,
            insn: r.insn as u64,
            rs1_data: r.rs1_data as u64,
            rs2_data: r.rs2_data as u64,
            rd_wdata: r.rd_wdata as u64,
            mem_addr: r.mem_addr,
            mem_rdata: r.mem_rdata[0],
            mem_wdata: r.mem_wdata[0],
            mem_rmask: r.mem_rmask as u8,
            mem_wmask: r.mem_wmask as u8,
            rs1_addr: r.rs1_addr,
            rs2_addr: r.rs2_addr,
            rd_addr: r.rd_addr,
            trap: r.trap as u8,
            halt: 0,
            intr: r.intr as u8,
        };
        out.write_all(&packet.to_bytes())
    }

    fn execute_v2(&mut self, packet: &InstructionPacket, out: &mut impl Write) -> io::Result<()> {
        let r = self.retire(packet, true);
        let integer = ExecutionPacketExtInteger {
            rd_wdata: r.rd_wdata as u64,
            rs1_rdata: r.rs1_data as u64,
            rs2_rdata: r.rs2_data as u64,
            rd_addr: r.rd_addr,
            rs1_addr: r.rs1_addr,
            rs2_addr: r.rs2_addr,
        };
        let memory = ExecutionPacketExtMemAccess {
            mem_rdata: r.mem_rdata,
            mem_wdata: r.mem_wdata,
            mem_rmask: r.mem_rmask,
            mem_wmask: r.mem_wmask,
            mem_addr: r.mem_addr,
        };
        let mut header = ExecutionPacketV2 {
            trace_size: ExecutionPacketV2::SIZE as u64,
            metadata: ExecutionPacketMetaData {
                order: r.order,
                insn: r.insn as u64,
                trap: r.trap as u8,
                halt: 0,
                intr: r.intr as u8,
                mode: MODE_MACHINE,
                ixl: IXL_32,
                valid: 1,
            },
            pc: ExecutionPacketPc {
                pc_rdata: r.pc_rdata as u64,
                pc_wdata: r.pc_wdata as u64,
            },
            available_fields: 0,
        };
        if !memory.is_empty() {
            header.trace_size += ExecutionPacketExtMemAccess::SIZE as u64;
            header.available_fields |= AVAILABLE_MEM_ACCESS;
        }
        if !integer.is_empty() {
            header.trace_size += ExecutionPacketExtInteger::SIZE as u64;
            header.available_fields |= AVAILABLE_INT_DATA;
        }
        out.write_all(&header.to_bytes())?;
        if header.available_fields & AVAILABLE_INT_DATA != 0 {
            out.write_all(&integer.to_bytes())?;
        }
        if header.available_fields & AVAILABLE_MEM_ACCESS != 0 {
            out.write_all(&memory.to_bytes())?;
        }
        Ok(())
    }

    /// The raw address view of a register, as reported in the trace.
    fn register_address(&self, index: u8) -> u32 {
        match Specifier::new(index) {
            Some(specifier) => self.state.registers().x(specifier),
            None => {
                error!("register index {index} out of range");
                0
            }
        }
    }
}

/// One retirement, shaped for the v1 record but carrying the wide v2 memory
/// capture.
#[derive(Debug, Clone, Copy, Default)]
struct Retirement {
    order: u64,
    pc_rdata: u32,
    pc_wdata: u32,
    insn: u32,
    rs1_data: u32,
    rs2_data: u32,
    rd_wdata: u32,
    mem_addr: u64,
    mem_rdata: [u64; 4],
    mem_wdata: [u64; 4],
    mem_rmask: u32,
    mem_wmask: u32,
    rs1_addr: u8,
    rs2_addr: u8,
    rd_addr: u8,
    trap: bool,
    intr: bool,
}

/// Serve the trace protocol on an accepted connection: read instruction
/// packets, execute them, answer negotiation and reset commands.
pub fn serve_connection<S: io::Read + Write>(mut stream: S) -> io::Result<()> {
    let mut rig = CheriotTestRig::new();
    loop {
        let mut bytes = [0u8; InstructionPacket::SIZE];
        if !read_exact_or_eof(&mut stream, &mut bytes)? {
            info!("trace connection closed");
            return Ok(());
        }
        let packet = InstructionPacket::from_bytes(&bytes);
        match packet.cmd {
            CMD_END_OF_TRACE => {
                // An end-of-trace carrying "VERS" is a version query; the
                // reply encodes the supported maximum in the halt field.
                let halt = if packet.insn == VERSION_QUERY_INSN {
                    1 | rig.max_supported_version() as u8
                } else {
                    1
                };
                rig.reset(halt, &mut stream)?;
            }
            CMD_INSTRUCTION => rig.execute(&packet, &mut stream)?,
            CMD_SET_VERSION => {
                match rig.set_version(packet.insn) {
                    Ok(()) => {
                        let reply = VersionPacket {
                            version: packet.insn as u64,
                        };
                        stream.write_all(&reply.to_bytes())?;
                    }
                    Err(err) => {
                        error!("{err}");
                        return Err(io::Error::new(io::ErrorKind::InvalidInput, err));
                    }
                }
            }
            other => error!("unknown trace command (ignored): {other:#04x}"),
        }
    }
}

fn read_exact_or_eof(stream: &mut impl io::Read, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..])? {
            0 if filled == 0 => return Ok(false),
            0 => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "partial instruction packet",
                ))
            }
            n => filled += n,
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instruction(insn: u32) -> InstructionPacket {
        InstructionPacket {
            insn,
            time: 0,
            cmd: CMD_INSTRUCTION,
            padding: 0,
        }
    }

    fn execute_v1(rig: &mut CheriotTestRig, insn: u32) -> ExecutionPacket {
        let mut out = Vec::new();
        rig.execute(&instruction(insn), &mut out).unwrap();
        assert_eq!(ExecutionPacket::SIZE, out.len());
        decode_v1(&out)
    }

    fn decode_v1(bytes: &[u8]) -> ExecutionPacket {
        let word = |i: usize| u64::from_le_bytes(bytes[i * 8..i * 8 + 8].try_into().unwrap());
        ExecutionPacket {
            order: word(0),
            pc_rdata: word(1),
            pc_wdata: word(2),
            insn: word(3),
            rs1_data: word(4),
            rs2_data: word(5),
            rd_wdata: word(6),
            mem_addr: word(7),
            mem_rdata: word(8),
            mem_wdata: word(9),
            mem_rmask: bytes[80],
            mem_wmask: bytes[81],
            rs1_addr: bytes[82],
            rs2_addr: bytes[83],
            rd_addr: bytes[84],
            trap: bytes[85],
            halt: bytes[86],
            intr: bytes[87],
        }
    }

    #[test]
    fn test_lui_addi_scenario() {
        let mut rig = CheriotTestRig::new();
        // lui x12, 0x80002.
        let ep = execute_v1(&mut rig, 0x8000_2637);
        assert_eq!(1, ep.order);
        assert_eq!(0x8000_0000, ep.pc_rdata);
        assert_eq!(0x8000_0004, ep.pc_wdata);
        assert_eq!(12, ep.rd_addr);
        assert_eq!(0x8000_2000, ep.rd_wdata);
        assert_eq!(0, ep.trap);
        // addi x12, x12, 0x468.
        let ep = execute_v1(&mut rig, 0x4686_0613);
        assert_eq!(2, ep.order);
        assert_eq!(0x8000_0008, ep.pc_wdata);
        assert_eq!(0x8000_2468, ep.rd_wdata);
    }

    #[test]
    fn test_store_load_scenario() {
        let mut rig = CheriotTestRig::new();
        execute_v1(&mut rig, 0x8000_2637); // lui x12, 0x80002
        execute_v1(&mut rig, 0x4686_0613); // addi x12, x12, 0x468
        // cspecialrw c10, mtdc, c0: x10 = mtdc.address = 0, tag preserved.
        let ep = execute_v1(&mut rig, 0x03D0_055B);
        assert_eq!(0, ep.rd_wdata);
        assert!(rig.state().registers().c(Specifier::from_u5(10)).tag());
        // csetaddr c10, c10, x12.
        let ep = execute_v1(&mut rig, 0x20C5_055B);
        assert_eq!(0x8000_2468, ep.rd_wdata);
        // lui x11, 0xdeadc ; addi x11, x11, -0x111.
        execute_v1(&mut rig, 0xDEAD_C5B7);
        execute_v1(&mut rig, 0xEEF5_8593);
        // sw x11, 0(x10).
        let ep = execute_v1(&mut rig, 0x00B5_2023);
        assert_eq!(0, ep.trap);
        assert_eq!(0x8000_2468, ep.mem_addr);
        assert_eq!(0xF, ep.mem_wmask);
        assert_eq!(0xDEAD_BEEF, ep.mem_wdata);
        // lw x13, 0(x10).
        let ep = execute_v1(&mut rig, 0x0005_2683);
        assert_eq!(0xDEAD_BEEF, ep.rd_wdata);
        assert_eq!(0xF, ep.mem_rmask);
        assert_eq!(13, ep.rd_addr);
    }

    #[test]
    fn test_taken_branch_scenario() {
        let mut rig = CheriotTestRig::new();
        // beq x1, x2, 0x124 with x1 == x2.
        let ep = execute_v1(&mut rig, 0x1220_8263);
        assert_eq!(0x8000_0124, ep.pc_wdata);
        assert_eq!(0, ep.rd_addr);
        assert_eq!(0, ep.trap);
    }

    #[test]
    fn test_fetch_bounds_violation_scenario() {
        let mut rig = CheriotTestRig::new();
        // Put the trap handler inside the memory window.
        let mut mtcc = rig.state().executable_root().clone();
        mtcc.set_address(0x8000_0040);
        rig.state
            .set_scr(cheriot_sim_core::csr::ScrSpecifier::Mtcc, mtcc);
        // Narrow pcc to [0x8000_0000, 0x8000_0004) and point it past the
        // top.
        let mut pcc = rig.state().pcc().clone();
        pcc.set_bounds(0x8000_0000, 4, true);
        pcc.set_address(0x8000_0008);
        *rig.state.pcc_mut() = pcc;
        let mtcc_address = rig.state().scr(cheriot_sim_core::csr::ScrSpecifier::Mtcc).address();
        let ep = execute_v1(&mut rig, 0x0000_0013);
        assert_eq!(1, ep.trap);
        assert_eq!(0, ep.insn);
        assert_eq!(0, ep.rd_addr);
        assert_eq!(mtcc_address as u64, ep.pc_wdata);
        let mtval = rig.state().csrs().get(csr::MTVAL).unwrap().raw();
        assert_eq!((0x20 << 5) | CapException::BoundsViolation.code(), mtval);
        assert_eq!(
            cheriot_sim_core::state::CHERI_EXCEPTION_CODE,
            rig.state().csrs().get(csr::MCAUSE).unwrap().raw()
        );
        // The next packet is the first handler instruction.
        let ep = execute_v1(&mut rig, 0x0000_0013);
        assert_eq!(1, ep.intr);
        assert_eq!(0, ep.trap);
    }

    #[test]
    fn test_tag_clearing_store_scenario() {
        let mut rig = CheriotTestRig::new();
        // Point c10 at an aligned slot, store c11 there.
        execute_v1(&mut rig, 0x8000_2637); // lui x12, 0x80002
        execute_v1(&mut rig, 0x4686_0613); // addi x12, x12, 0x468 -> not aligned to 8
        // Rebuild an aligned address: addi x12, x0, 0x460 + lui.
        let mut rig = CheriotTestRig::new();
        execute_v1(&mut rig, 0x8000_2637); // lui x12, 0x80002
        execute_v1(&mut rig, 0x4606_0613); // addi x12, x12, 0x460
        execute_v1(&mut rig, 0x03D0_055B); // cspecialrw c10, mtdc, c0
        execute_v1(&mut rig, 0x20C5_055B); // csetaddr c10, c10, x12
        // csc c11, 0(c10).
        let ep = execute_v1(&mut rig, 0x00B5_3023);
        assert_eq!(0, ep.trap);
        assert_eq!(0xFF, ep.mem_wmask);
        assert!(rig.state().memory().load_capability(0x8000_2460).unwrap().1);
        // sb x0, 3(c10) clears the slot tag.
        execute_v1(&mut rig, 0x0005_01A3);
        assert!(!rig.state().memory().load_capability(0x8000_2460).unwrap().1);
        // clc c13, 0(c10): untagged result, fields still decode.
        execute_v1(&mut rig, 0x0005_3683);
        let c13 = rig.state().registers().c(Specifier::from_u5(13));
        assert!(!c13.tag());
        assert!(c13.has_permission(Permissions::LOAD));
    }

    #[test]
    fn test_trap_accounting_scenario() {
        let mut rig = CheriotTestRig::new();
        let mut mtcc = rig.state().executable_root().clone();
        mtcc.set_address(0x8000_0100);
        rig.state
            .set_scr(cheriot_sim_core::csr::ScrSpecifier::Mtcc, mtcc);
        // Step pc to 0x8000_0020 with nops.
        for _ in 0..8 {
            execute_v1(&mut rig, 0x0000_0013);
        }
        assert_eq!(0x8000_0020, rig.state().pcc().address());
        let ep = execute_v1(&mut rig, 0x0000_0073); // ecall
        assert_eq!(1, ep.trap);
        assert_eq!(1, rig.state().counter_interrupts_taken());
        assert_eq!(1, rig.state().interrupt_handler_depth());
        let ep = execute_v1(&mut rig, 0x3020_0073); // mret
        assert_eq!(0, ep.trap);
        assert_eq!(0x8000_0020, ep.pc_wdata);
        assert_eq!(1, rig.state().counter_interrupt_returns());
        assert_eq!(0, rig.state().interrupt_handler_depth());
    }

    #[test]
    fn test_order_matches_instruction_count() {
        let mut rig = CheriotTestRig::new();
        for expected in 1..=5u64 {
            let ep = execute_v1(&mut rig, 0x0000_0013);
            assert_eq!(expected, ep.order);
        }
        assert_eq!(
            5,
            rig.state()
                .read_csr(csr::MINSTRET, cheriot_sim_core::PrivilegeLevel::Machine)
                .unwrap()
        );
    }

    #[test]
    fn test_rd_zero_implies_zero_wdata() {
        let mut rig = CheriotTestRig::new();
        // addi x0, x1, 0: rd = 0.
        let ep = execute_v1(&mut rig, 0x0000_8013);
        assert_eq!(0, ep.rd_addr);
        assert_eq!(0, ep.rd_wdata);
    }

    #[test]
    fn test_illegal_instruction_packet() {
        let mut rig = CheriotTestRig::new();
        let ep = execute_v1(&mut rig, 0xFFFF_FFFF);
        assert_eq!(1, ep.trap);
        assert_eq!(0, ep.rd_addr);
        // Not a memory fault: mem_addr stays zero.
        assert_eq!(0, ep.mem_addr);
    }

    #[test]
    fn test_v2_packets() {
        let mut rig = CheriotTestRig::new();
        rig.set_version(2).unwrap();
        let mut out = Vec::new();
        // lui x12, 0x80002 writes a register: header + int-data.
        rig.execute(&instruction(0x8000_2637), &mut out).unwrap();
        assert_eq!(
            ExecutionPacketV2::SIZE + ExecutionPacketExtInteger::SIZE,
            out.len()
        );
        assert_eq!(b"trace-v2", &out[0..8]);
        let trace_size = u64::from_le_bytes(out[8..16].try_into().unwrap());
        assert_eq!(out.len() as u64, trace_size);
        let available = u64::from_le_bytes(out[56..64].try_into().unwrap());
        assert_eq!(AVAILABLE_INT_DATA, available);
        assert_eq!(b"int-data", &out[64..72]);
        // A nop writes nothing: bare header.
        let mut out = Vec::new();
        rig.execute(&instruction(0x0000_0013), &mut out).unwrap();
        assert_eq!(ExecutionPacketV2::SIZE, out.len());
        // Metadata mode/ixl/valid.
        assert_eq!(MODE_MACHINE, out[35]);
        assert_eq!(IXL_32, out[36]);
        assert_eq!(1, out[37]);
    }

    #[test]
    fn test_v2_upper_half_is_echoed() {
        let mut rig = CheriotTestRig::new();
        rig.set_version(2).unwrap();
        let mut out = Vec::new();
        // c.nop with garbage in the upper half: relaxed mode echoes it.
        rig.execute(&instruction(0xABCD_0001), &mut out).unwrap();
        let insn = u64::from_le_bytes(out[24..32].try_into().unwrap());
        assert_eq!(0xABCD_0001, insn);
    }

    #[test]
    fn test_version_negotiation() {
        let mut rig = CheriotTestRig::new();
        let mut out = Vec::new();
        // An end-of-trace carrying "VERS" answers with 1 | max version.
        rig.reset(1 | rig.max_supported_version() as u8, &mut out)
            .unwrap();
        let ep = decode_v1(&out);
        assert_eq!(3, ep.halt);
        assert_eq!(0, ep.order);
        assert!(rig.set_version(2).is_ok());
        assert!(rig.set_version(3).is_err());
    }

    #[test]
    fn test_reset_restores_initial_conditions() {
        let mut rig = CheriotTestRig::new();
        execute_v1(&mut rig, 0x8000_2637);
        execute_v1(&mut rig, 0x4686_0613);
        let mut out = Vec::new();
        rig.reset(1, &mut out).unwrap();
        assert_eq!(0, rig.instruction_count());
        assert_eq!(0x8000_0000, rig.state().pcc().address());
        assert_eq!(0, rig.state().registers().x(Specifier::from_u5(12)));
        assert!(rig.state().registers().c(Specifier::from_u5(12)).tag());
    }
}
