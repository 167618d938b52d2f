//! Wire formats for the trace protocol.
//!
//! The rig speaks two trace formats over the same socket. Version 1 is a
//! single fixed-size execution packet per retirement. Version 2 is a
//! header (metadata + pc pair) followed by optional integer and
//! memory-access extension packets, flagged in `available_fields` and
//! counted into `trace_size`.
//!
//! All fields are little-endian and packed; the codecs below spell the
//! layouts out byte by byte instead of transmuting structs.

/// Trace commands carried in the instruction packet.
pub const CMD_END_OF_TRACE: u8 = 0;
pub const CMD_INSTRUCTION: u8 = 1;
pub const CMD_SET_VERSION: u8 = 0x76;

/// An end-of-trace packet carrying this instruction word ("VERS") is a
/// version negotiation query.
pub const VERSION_QUERY_INSN: u32 = 0x5645_5253;

/// Privilege mode reported in v2 metadata.
pub const MODE_MACHINE: u8 = 3;
/// XLEN report in v2 metadata: 1 = 32 bits.
pub const IXL_32: u8 = 1;

/// `available_fields` bit for the integer-data extension packet.
pub const AVAILABLE_INT_DATA: u64 = 0x1;
/// `available_fields` bit for the memory-access extension packet.
pub const AVAILABLE_MEM_ACCESS: u64 = 0x2;

/// The per-instruction command packet received from the driving side.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct InstructionPacket {
    /// Instruction word. Sixteen-bit instructions are carried in the lower
    /// half; the upper half is echoed as supplied.
    pub insn: u32,
    /// Timestamp.
    pub time: u16,
    /// Trace command; see the `CMD_*` constants.
    pub cmd: u8,
    pub padding: u8,
}

impl InstructionPacket {
    pub const SIZE: usize = 8;

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            insn: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            time: u16::from_le_bytes(bytes[4..6].try_into().unwrap()),
            cmd: bytes[6],
            padding: bytes[7],
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.insn.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.time.to_le_bytes());
        bytes[6] = self.cmd;
        bytes[7] = self.padding;
        bytes
    }
}

/// The v1 execution packet, one per retirement.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ExecutionPacket {
    /// Instruction number: the minstret value after completion.
    pub order: u64,
    /// Pc for the current instruction.
    pub pc_rdata: u64,
    /// Pc after the instruction (pc + size, or the jump/trap target).
    pub pc_wdata: u64,
    pub insn: u64,
    pub rs1_data: u64,
    pub rs2_data: u64,
    /// Must be 0 when `rd_addr` is 0.
    pub rd_wdata: u64,
    /// Byte address of the memory access; 0 if unused.
    pub mem_addr: u64,
    pub mem_rdata: u64,
    pub mem_wdata: u64,
    /// Valid bytes read; 0 if unused.
    pub mem_rmask: u8,
    /// Valid bytes written; 0 if unused.
    pub mem_wmask: u8,
    pub rs1_addr: u8,
    pub rs2_addr: u8,
    /// Must be 0 when the instruction does not write a register.
    pub rd_addr: u8,
    /// Set for any exception.
    pub trap: u8,
    /// Marks the last packet before halting; also carries the negotiated
    /// version on reset.
    pub halt: u8,
    /// Set for the first instruction of a trap handler.
    pub intr: u8,
}

impl ExecutionPacket {
    pub const SIZE: usize = 88;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        let words = [
            self.order,
            self.pc_rdata,
            self.pc_wdata,
            self.insn,
            self.rs1_data,
            self.rs2_data,
            self.rd_wdata,
            self.mem_addr,
            self.mem_rdata,
            self.mem_wdata,
        ];
        for (i, word) in words.iter().enumerate() {
            bytes[i * 8..i * 8 + 8].copy_from_slice(&word.to_le_bytes());
        }
        bytes[80] = self.mem_rmask;
        bytes[81] = self.mem_wmask;
        bytes[82] = self.rs1_addr;
        bytes[83] = self.rs2_addr;
        bytes[84] = self.rd_addr;
        bytes[85] = self.trap;
        bytes[86] = self.halt;
        bytes[87] = self.intr;
        bytes
    }
}

/// Reply to a set-version command: `"version="` followed by the version.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct VersionPacket {
    pub version: u64,
}

impl VersionPacket {
    pub const SIZE: usize = 16;
    pub const MAGIC: &'static [u8; 8] = b"version=";

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(Self::MAGIC);
        bytes[8..16].copy_from_slice(&self.version.to_le_bytes());
        bytes
    }
}

/// The fixed metadata block of a v2 trace packet.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ExecutionPacketMetaData {
    /// Instruction index; no index is used twice and there are no gaps.
    pub order: u64,
    /// Instruction word, upper bits zero for shorter instructions.
    pub insn: u64,
    pub trap: u8,
    pub halt: u8,
    pub intr: u8,
    /// Current privilege level: 0 = U, 1 = S, 3 = M.
    pub mode: u8,
    /// MXL of the current level: 1 = 32, 2 = 64.
    pub ixl: u8,
    /// Always 1.
    pub valid: u8,
}

impl ExecutionPacketMetaData {
    pub const SIZE: usize = 24;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&self.order.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.insn.to_le_bytes());
        bytes[16] = self.trap;
        bytes[17] = self.halt;
        bytes[18] = self.intr;
        bytes[19] = self.mode;
        bytes[20] = self.ixl;
        bytes[21] = self.valid;
        // Bytes 22..24 pad to a multiple of 8.
        bytes
    }
}

/// The pc pair of a v2 trace packet.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ExecutionPacketPc {
    pub pc_rdata: u64,
    pub pc_wdata: u64,
}

impl ExecutionPacketPc {
    pub const SIZE: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&self.pc_rdata.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.pc_wdata.to_le_bytes());
        bytes
    }
}

/// The v2 header: magic, total size, metadata, pc pair and the extension
/// bitmap.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ExecutionPacketV2 {
    /// Size of this packet plus every extension that follows.
    pub trace_size: u64,
    pub metadata: ExecutionPacketMetaData,
    pub pc: ExecutionPacketPc,
    pub available_fields: u64,
}

impl ExecutionPacketV2 {
    pub const SIZE: usize = 64;
    pub const MAGIC: &'static [u8; 8] = b"trace-v2";

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(Self::MAGIC);
        bytes[8..16].copy_from_slice(&self.trace_size.to_le_bytes());
        bytes[16..40].copy_from_slice(&self.metadata.to_bytes());
        bytes[40..56].copy_from_slice(&self.pc.to_bytes());
        bytes[56..64].copy_from_slice(&self.available_fields.to_le_bytes());
        bytes
    }
}

/// The v2 integer-data extension.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ExecutionPacketExtInteger {
    pub rd_wdata: u64,
    /// Must be zero when `rs1_addr` is zero.
    pub rs1_rdata: u64,
    /// Must be zero when `rs2_addr` is zero.
    pub rs2_rdata: u64,
    pub rd_addr: u8,
    pub rs1_addr: u8,
    pub rs2_addr: u8,
}

impl ExecutionPacketExtInteger {
    pub const SIZE: usize = 40;
    pub const MAGIC: &'static [u8; 8] = b"int-data";

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(Self::MAGIC);
        bytes[8..16].copy_from_slice(&self.rd_wdata.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.rs1_rdata.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.rs2_rdata.to_le_bytes());
        bytes[32] = self.rd_addr;
        bytes[33] = self.rs1_addr;
        bytes[34] = self.rs2_addr;
        // Bytes 35..40 pad to a multiple of 8.
        bytes
    }

    pub fn is_empty(&self) -> bool {
        self.rd_addr == 0 && self.rs1_addr == 0 && self.rs2_addr == 0
    }
}

/// The v2 memory-access extension.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ExecutionPacketExtMemAccess {
    pub mem_rdata: [u64; 4],
    pub mem_wdata: [u64; 4],
    pub mem_rmask: u32,
    pub mem_wmask: u32,
    pub mem_addr: u64,
}

impl ExecutionPacketExtMemAccess {
    pub const SIZE: usize = 88;
    pub const MAGIC: &'static [u8; 8] = b"mem-data";

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(Self::MAGIC);
        for (i, word) in self.mem_rdata.iter().enumerate() {
            bytes[8 + i * 8..16 + i * 8].copy_from_slice(&word.to_le_bytes());
        }
        for (i, word) in self.mem_wdata.iter().enumerate() {
            bytes[40 + i * 8..48 + i * 8].copy_from_slice(&word.to_le_bytes());
        }
        bytes[72..76].copy_from_slice(&self.mem_rmask.to_le_bytes());
        bytes[76..80].copy_from_slice(&self.mem_wmask.to_le_bytes());
        bytes[80..88].copy_from_slice(&self.mem_addr.to_le_bytes());
        bytes
    }

    pub fn is_empty(&self) -> bool {
        self.mem_rmask == 0 && self.mem_wmask == 0 && self.mem_addr == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_packet_round_trip() {
        let packet = InstructionPacket {
            insn: 0x8000_2637,
            time: 42,
            cmd: CMD_INSTRUCTION,
            padding: 0,
        };
        assert_eq!(packet, InstructionPacket::from_bytes(&packet.to_bytes()));
    }

    #[test]
    fn test_execution_packet_layout() {
        let packet = ExecutionPacket {
            order: 1,
            pc_rdata: 0x8000_0000,
            pc_wdata: 0x8000_0004,
            insn: 0x8000_2637,
            rd_wdata: 0x8000_2000,
            rd_addr: 12,
            mem_rmask: 0xF,
            trap: 0,
            halt: 0,
            intr: 1,
            ..Default::default()
        };
        let bytes = packet.to_bytes();
        assert_eq!(ExecutionPacket::SIZE, bytes.len());
        assert_eq!(1, u64::from_le_bytes(bytes[0..8].try_into().unwrap()));
        assert_eq!(
            0x8000_0004,
            u64::from_le_bytes(bytes[16..24].try_into().unwrap())
        );
        assert_eq!(0xF, bytes[80]);
        assert_eq!(12, bytes[84]);
        assert_eq!(0, bytes[85]);
        assert_eq!(1, bytes[87]);
    }

    #[test]
    fn test_version_packet() {
        let bytes = VersionPacket { version: 2 }.to_bytes();
        assert_eq!(b"version=", &bytes[0..8]);
        assert_eq!(2, u64::from_le_bytes(bytes[8..16].try_into().unwrap()));
    }

    #[test]
    fn test_v2_header_layout() {
        let header = ExecutionPacketV2 {
            trace_size: ExecutionPacketV2::SIZE as u64,
            metadata: ExecutionPacketMetaData {
                order: 7,
                insn: 0x13,
                mode: MODE_MACHINE,
                ixl: IXL_32,
                valid: 1,
                ..Default::default()
            },
            pc: ExecutionPacketPc {
                pc_rdata: 0x8000_0000,
                pc_wdata: 0x8000_0004,
            },
            available_fields: AVAILABLE_INT_DATA,
        };
        let bytes = header.to_bytes();
        assert_eq!(b"trace-v2", &bytes[0..8]);
        assert_eq!(64, u64::from_le_bytes(bytes[8..16].try_into().unwrap()));
        assert_eq!(7, u64::from_le_bytes(bytes[16..24].try_into().unwrap()));
        // mode/ixl/valid sit after the three flag bytes.
        assert_eq!(MODE_MACHINE, bytes[35]);
        assert_eq!(IXL_32, bytes[36]);
        assert_eq!(1, bytes[37]);
        assert_eq!(
            0x8000_0000,
            u64::from_le_bytes(bytes[40..48].try_into().unwrap())
        );
        assert_eq!(
            AVAILABLE_INT_DATA,
            u64::from_le_bytes(bytes[56..64].try_into().unwrap())
        );
    }

    #[test]
    fn test_extension_magics_and_sizes() {
        let int_data = ExecutionPacketExtInteger::default().to_bytes();
        assert_eq!(40, int_data.len());
        assert_eq!(b"int-data", &int_data[0..8]);
        let mem_data = ExecutionPacketExtMemAccess::default().to_bytes();
        assert_eq!(88, mem_data.len());
        assert_eq!(b"mem-data", &mem_data[0..8]);
    }

    #[test]
    fn test_extension_presence() {
        assert!(ExecutionPacketExtInteger::default().is_empty());
        assert!(!ExecutionPacketExtInteger {
            rd_addr: 1,
            ..Default::default()
        }
        .is_empty());
        assert!(ExecutionPacketExtMemAccess::default().is_empty());
        assert!(!ExecutionPacketExtMemAccess {
            mem_wmask: 0xF,
            ..Default::default()
        }
        .is_empty());
    }
}
