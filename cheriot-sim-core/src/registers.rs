//! The capability register file.
//!
//! CHERIoT replaces the 32 `x` registers with 32 capability registers
//! `c0..c31`; the plain integer view of a register is its address field. The
//! program counter is likewise a capability, `pcc`.
//!
//! Register `c0` is distinguished: reads observe the null capability and
//! writes are discarded, so `x0` keeps its RISC-V all-zeros behavior.

use crate::capability::CapabilityRegister;
use core::fmt;
use std::fmt::Formatter;

/// The bit width of the integer (address) view of a register.
pub const XLEN: u32 = 32;

/// The number of capability registers (indices start at `0` for `c0`).
pub const LEN: u8 = 32;

/// ABI names of the integer register views, indexed by register number.
pub const X_REGISTER_ALIASES: [&str; LEN as usize] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

/// ABI names of the capability register views, indexed by register number.
pub const C_REGISTER_ALIASES: [&str; LEN as usize] = [
    "cnull", "cra", "csp", "cgp", "ctp", "ct0", "ct1", "ct2", "cs0", "cs1", "ca0", "ca1", "ca2",
    "ca3", "ca4", "ca5", "ca6", "ca7", "cs2", "cs3", "cs4", "cs5", "cs6", "cs7", "cs8", "cs9",
    "cs10", "cs11", "ct3", "ct4", "ct5", "ct6",
];

/// ABI names of the floating-point registers, indexed by register number.
pub const F_REGISTER_ALIASES: [&str; LEN as usize] = [
    "ft0", "ft1", "ft2", "ft3", "ft4", "ft5", "ft6", "ft7", "fs0", "fs1", "fa0", "fa1", "fa2",
    "fa3", "fa4", "fa5", "fa6", "fa7", "fs2", "fs3", "fs4", "fs5", "fs6", "fs7", "fs8", "fs9",
    "fs10", "fs11", "ft8", "ft9", "ft10", "ft11",
];

/// A CHERIoT core's capability register file, plus the program counter
/// capability.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    c_registers: [CapabilityRegister; LEN as usize],
    pcc: CapabilityRegister,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// Returns a fresh file of null capabilities, with a null `pcc`.
    /// [`crate::state::CheriotState::reset`] installs the architectural reset
    /// values (memory roots, executable-root pcc).
    pub fn new() -> Self {
        Self {
            c_registers: std::array::from_fn(|_| CapabilityRegister::null()),
            pcc: CapabilityRegister::null(),
        }
    }

    /// Returns the capability in a register. Reading `c0` yields the null
    /// capability.
    pub fn c(&self, specifier: Specifier) -> &CapabilityRegister {
        &self.c_registers[usize::from(specifier)]
    }

    /// Returns the integer view of a register: its address field.
    pub fn x(&self, specifier: Specifier) -> u32 {
        self.c_registers[usize::from(specifier)].address()
    }

    /// Replace the capability in a register. Writes to `c0` are discarded.
    pub fn set_c(&mut self, specifier: Specifier, value: CapabilityRegister) {
        if specifier.0 != 0 {
            self.c_registers[specifier.0 as usize] = value;
        }
    }

    /// Write the integer view of a register: the register becomes the null
    /// capability carrying `value` as its address. Writes to `x0` are
    /// discarded.
    pub fn set_x(&mut self, specifier: Specifier, value: u32) {
        if specifier.0 != 0 {
            let mut cap = CapabilityRegister::null();
            cap.set_address(value);
            self.c_registers[specifier.0 as usize] = cap;
        }
    }

    /// Returns the program counter capability.
    pub fn pcc(&self) -> &CapabilityRegister {
        &self.pcc
    }

    /// Returns a mutable reference to the program counter capability.
    pub fn pcc_mut(&mut self) -> &mut CapabilityRegister {
        &mut self.pcc
    }
}

/// A capability register specifier. Can take values in the range `0..LEN`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct Specifier(u8);

impl Specifier {
    /// Register `c0`, a.k.a. `cnull`/`zero`: reads observe the null
    /// capability, writes are discarded.
    pub const C0: Self = Specifier(0);

    /// Register `c1`, the link register (`cra`).
    pub const C1: Self = Specifier(1);

    /// Register `c2`, the stack capability (`csp`).
    pub const C2: Self = Specifier(2);

    /// Register `c3`, the global pointer capability (`cgp`).
    pub const C3: Self = Specifier(3);

    /// Create a register specifier from its index, returning `None` if
    /// `index > 31`.
    pub fn new<U: TryInto<u8>>(index: U) -> Option<Self> {
        let index = index.try_into().ok()?;
        (index < LEN).then_some(Self(index))
    }

    /// Convert a 5-bit value into a register specifier.
    /// Panics if the value doesn't fit in 5 bits (`0..=31`).
    pub fn from_u5(value_u5: u8) -> Self {
        const_assert_eq!(LEN, 32);
        if value_u5 > 31 {
            panic!("out of range u5 used");
        }
        Self(value_u5)
    }

    /// Resolve a register name. Numeric (`c7`, `x7`) and ABI (`t2`, `ct2`)
    /// aliases all map to the same underlying register.
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(index) = name
            .strip_prefix('c')
            .or_else(|| name.strip_prefix('x'))
            .and_then(|n| n.parse::<u8>().ok())
        {
            return Self::new(index);
        }
        if let Some(i) = X_REGISTER_ALIASES.iter().position(|&a| a == name) {
            return Some(Self(i as u8));
        }
        if let Some(i) = C_REGISTER_ALIASES.iter().position(|&a| a == name) {
            return Some(Self(i as u8));
        }
        // `fp` is a second ABI name for s0/x8.
        (name == "fp").then_some(Self(8))
    }

    /// Return an iterator over all register specifiers, from c0 up to c31.
    pub fn iter_all() -> impl Iterator<Item = Self> {
        (0..LEN).map(Self)
    }
}

impl From<Specifier> for u8 {
    fn from(value: Specifier) -> Self {
        value.0
    }
}

impl From<Specifier> for u32 {
    fn from(value: Specifier) -> Self {
        value.0 as u32
    }
}

impl From<Specifier> for usize {
    fn from(value: Specifier) -> Self {
        value.0 as usize
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Root;

    #[test]
    fn test_write_to_c0_is_discarded() {
        let mut registers = RegisterFile::new();
        registers.set_x(Specifier::C0, 0xDEADBEEF);
        assert_eq!(0, registers.x(Specifier::C0));
        registers.set_c(Specifier::C0, CapabilityRegister::root(Root::Memory));
        assert!(!registers.c(Specifier::C0).tag());
    }

    #[test]
    fn test_x_view_strips_metadata() {
        let mut registers = RegisterFile::new();
        registers.set_c(Specifier::from_u5(10), CapabilityRegister::root(Root::Memory));
        assert!(registers.c(Specifier::from_u5(10)).tag());
        registers.set_x(Specifier::from_u5(10), 42);
        assert_eq!(42, registers.x(Specifier::from_u5(10)));
        assert!(!registers.c(Specifier::from_u5(10)).tag());
    }

    #[test]
    fn test_aliases_resolve_to_same_register() {
        for (i, (x, c)) in X_REGISTER_ALIASES
            .iter()
            .zip(C_REGISTER_ALIASES.iter())
            .enumerate()
        {
            let expect = Specifier::new(i).unwrap();
            assert_eq!(Some(expect), Specifier::from_name(x));
            assert_eq!(Some(expect), Specifier::from_name(c));
            assert_eq!(Some(expect), Specifier::from_name(&format!("x{i}")));
            assert_eq!(Some(expect), Specifier::from_name(&format!("c{i}")));
        }
        assert_eq!(Specifier::from_name("fp"), Specifier::from_name("s0"));
        assert_eq!(None, Specifier::from_name("c32"));
        assert_eq!(None, Specifier::from_name("q1"));
    }

    #[test]
    fn test_set_get() {
        let mut registers = RegisterFile::new();
        for i in 1..LEN {
            registers.set_x(Specifier::from_u5(i), i as u32 + 1);
        }
        for i in 1..LEN {
            assert_eq!(i as u32 + 1, registers.x(Specifier::from_u5(i)));
        }
    }
}
