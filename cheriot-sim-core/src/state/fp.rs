//! Floating-point sub-state: dynamic rounding mode and accrued exception
//! flags, plus the `fcsr` packing convention.
//!
//! > The fcsr register is a 32-bit read/write register that selects the
//! > dynamic rounding mode for floating-point arithmetic operations and holds
//! > the accrued exception flags. Bits 4:0 are the accrued exception flags
//! > (fflags); bits 7:5 are the rounding mode (frm).

/// Accrued exception flag bits, ORed into `fflags`. Flags accumulate; they
/// are never raised as traps.
pub mod fflags {
    /// Inexact.
    pub const NX: u32 = 1 << 0;
    /// Underflow.
    pub const UF: u32 = 1 << 1;
    /// Overflow.
    pub const OF: u32 = 1 << 2;
    /// Divide by zero.
    pub const DZ: u32 = 1 << 3;
    /// Invalid operation.
    pub const NV: u32 = 1 << 4;
}

/// Dynamic rounding modes, as encoded in `frm` and in instruction `rm`
/// fields.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RoundingMode {
    /// Round to nearest, ties to even.
    Rne = 0,
    /// Round towards zero.
    Rtz = 1,
    /// Round down.
    Rdn = 2,
    /// Round up.
    Rup = 3,
    /// Round to nearest, ties to max magnitude.
    Rmm = 4,
}

impl RoundingMode {
    /// Decode a 3-bit rounding-mode field. Values 5 and 6 are reserved;
    /// 7 selects the dynamic mode and is resolved by the caller against
    /// `frm`.
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Rne),
            1 => Some(Self::Rtz),
            2 => Some(Self::Rdn),
            3 => Some(Self::Rup),
            4 => Some(Self::Rmm),
            _ => None,
        }
    }
}

/// The floating-point sub-state backing the `fflags`, `frm` and `fcsr` CSRs.
#[derive(Debug, Clone, Default)]
pub struct FpState {
    frm: u32,
    fflags: u32,
}

impl FpState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frm(&self) -> u32 {
        self.frm
    }

    pub fn set_frm(&mut self, value: u32) {
        self.frm = value & 0b111;
    }

    pub fn fflags(&self) -> u32 {
        self.fflags
    }

    pub fn set_fflags(&mut self, value: u32) {
        self.fflags = value & 0x1F;
    }

    /// Accumulate exception flags (the usual path from semantic functions).
    pub fn accrue(&mut self, flags: u32) {
        self.fflags |= flags & 0x1F;
    }

    /// The packed `fcsr` view: `frm` in bits 7:5, `fflags` in bits 4:0.
    pub fn fcsr(&self) -> u32 {
        self.frm << 5 | self.fflags
    }

    pub fn set_fcsr(&mut self, value: u32) {
        self.frm = (value >> 5) & 0b111;
        self.fflags = value & 0x1F;
    }
}
