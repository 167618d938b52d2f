//! The CHERIoT capability register.
//!
//! A capability is a fat pointer: a 32-bit address plus bounds, permissions
//! and a sealing type, all packed into a 64-bit memory image, with a single
//! out-of-band tag bit that confers authority.
//!
//! > A capability grants access to a range of memory, the bounds, and
//! > describes the operations that may be performed with it, the permissions.
//! > Capabilities may not be forged: every capability is derived from another
//! > capability, via operations that may shrink the set of rights, never grow
//! > it.
//!
//! The register keeps the decoded form (`base`/`top`/`permissions`/`otype`)
//! and re-compresses on demand for stores to memory. `top` is kept as a
//! 34-bit quantity since the root capabilities span `[0, 2^33)`.

use std::fmt;

/// Number of bytes a capability occupies in memory. The tag bit is held out
/// of band (one bit per 8-byte slot).
pub const CAPABILITY_SIZE_BYTES: u32 = 8;

/// Exclusive upper limit for capability tops: the roots span `[0, 2^33)`.
pub const MAX_TOP: u64 = 1 << 33;

/// Mantissa width of the compressed bounds (the `B` and `T` fields).
const MANTISSA_BITS: u32 = 9;
const MANTISSA_MASK: u32 = (1 << MANTISSA_BITS) - 1;

/// Largest directly encodable exponent; the encoding `0xF` maps to this.
const MAX_EXPONENT: u32 = 24;

/// Architectural permission bits in their expanded form.
///
/// The set is fixed by the CHERIoT permission lattice. Only subsets that
/// survive [`Permissions::normalize`] have a 6-bit compressed encoding; all
/// permission arithmetic in the simulator goes through that normalization so
/// a register never holds an unencodable set.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Permissions(u32);

impl Permissions {
    /// Global: the capability may be stored through non-store-local
    /// capabilities.
    pub const GLOBAL: Self = Self(1 << 0);
    /// Load global: capabilities loaded through this one keep their global
    /// permission.
    pub const LOAD_GLOBAL: Self = Self(1 << 1);
    /// Load mutable: capabilities loaded through this one keep their store
    /// permissions.
    pub const LOAD_MUTABLE: Self = Self(1 << 2);
    /// Store local: non-global capabilities may be stored through this one.
    pub const STORE_LOCAL: Self = Self(1 << 3);
    /// Permit load.
    pub const LOAD: Self = Self(1 << 4);
    /// Permit store.
    pub const STORE: Self = Self(1 << 5);
    /// Permit load and store of capabilities (with tags).
    pub const LOAD_STORE_CAP: Self = Self(1 << 6);
    /// Permit instruction fetch.
    pub const EXECUTE: Self = Self(1 << 7);
    /// Permit access to the special capability registers.
    pub const ACCESS_SYSTEM_REGISTERS: Self = Self(1 << 8);
    /// Permit sealing with an otype drawn from this capability.
    pub const SEAL: Self = Self(1 << 9);
    /// Permit unsealing with an otype drawn from this capability.
    pub const UNSEAL: Self = Self(1 << 10);
    /// Software-defined permission bit.
    pub const USER0: Self = Self(1 << 11);

    /// The empty permission set.
    pub const NONE: Self = Self(0);

    /// Permissions of the memory root: full data and capability access.
    pub const MEMORY_ROOT: Self = Self(
        Self::GLOBAL.0
            | Self::LOAD_GLOBAL.0
            | Self::LOAD_MUTABLE.0
            | Self::STORE_LOCAL.0
            | Self::LOAD.0
            | Self::STORE.0
            | Self::LOAD_STORE_CAP.0,
    );

    /// Permissions of the executable root: fetch plus read-only capability
    /// access and system-register access.
    pub const EXECUTABLE_ROOT: Self = Self(
        Self::GLOBAL.0
            | Self::LOAD_GLOBAL.0
            | Self::LOAD_MUTABLE.0
            | Self::LOAD.0
            | Self::LOAD_STORE_CAP.0
            | Self::EXECUTE.0
            | Self::ACCESS_SYSTEM_REGISTERS.0,
    );

    /// Permissions of the sealing root: seal, unseal and the user bit.
    pub const SEALING_ROOT: Self =
        Self(Self::GLOBAL.0 | Self::SEAL.0 | Self::UNSEAL.0 | Self::USER0.0);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & 0xFFF)
    }

    /// Returns `true` if every permission in `other` is also in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Reduce an arbitrary permission set to the nearest representable subset.
    ///
    /// The compressed form dedicates the format bits to one capability kind
    /// (executable, memory, data, sealing), so permissions from other kinds
    /// are dropped. Dropping bits keeps the operation monotone.
    pub fn normalize(self) -> Self {
        let gl = self.intersection(Self::GLOBAL);
        if self.contains(Self::EXECUTE.union(Self::LOAD).union(Self::LOAD_STORE_CAP)) {
            return gl.union(self.intersection(
                Self::EXECUTE
                    .union(Self::ACCESS_SYSTEM_REGISTERS)
                    .union(Self::LOAD)
                    .union(Self::LOAD_STORE_CAP)
                    .union(Self::LOAD_MUTABLE)
                    .union(Self::LOAD_GLOBAL),
            ));
        }
        if self.contains(Self::LOAD.union(Self::STORE).union(Self::LOAD_STORE_CAP)) {
            return gl.union(self.intersection(
                Self::LOAD
                    .union(Self::STORE)
                    .union(Self::LOAD_STORE_CAP)
                    .union(Self::STORE_LOCAL)
                    .union(Self::LOAD_MUTABLE)
                    .union(Self::LOAD_GLOBAL),
            ));
        }
        if self.contains(Self::LOAD.union(Self::LOAD_STORE_CAP)) {
            return gl.union(self.intersection(
                Self::LOAD
                    .union(Self::LOAD_STORE_CAP)
                    .union(Self::LOAD_MUTABLE)
                    .union(Self::LOAD_GLOBAL),
            ));
        }
        if self.contains(Self::STORE.union(Self::LOAD_STORE_CAP)) {
            return gl.union(Self::STORE.union(Self::LOAD_STORE_CAP));
        }
        if self.0 & (Self::LOAD.0 | Self::STORE.0) != 0 {
            return gl.union(self.intersection(Self::LOAD.union(Self::STORE)));
        }
        gl.union(self.intersection(Self::SEAL.union(Self::UNSEAL).union(Self::USER0)))
    }

    /// Compress a normalized permission set to its 6-bit encoding.
    /// Bit 5 is always the global permission.
    pub fn compress(self) -> u32 {
        let p = self.normalize();
        let gl = (p.contains(Self::GLOBAL) as u32) << 5;
        let bit = |perm: Self| p.contains(perm) as u32;
        if p.contains(Self::EXECUTE) {
            // 0b01_srs_lm_lg
            return gl
                | 0b01_000
                | bit(Self::ACCESS_SYSTEM_REGISTERS) << 2
                | bit(Self::LOAD_MUTABLE) << 1
                | bit(Self::LOAD_GLOBAL);
        }
        if p.contains(Self::LOAD.union(Self::STORE).union(Self::LOAD_STORE_CAP)) {
            // 0b11_sl_lm_lg
            return gl
                | 0b11_000
                | bit(Self::STORE_LOCAL) << 2
                | bit(Self::LOAD_MUTABLE) << 1
                | bit(Self::LOAD_GLOBAL);
        }
        if p.contains(Self::LOAD.union(Self::LOAD_STORE_CAP)) {
            // 0b101_lm_lg
            return gl | 0b101_00 | bit(Self::LOAD_MUTABLE) << 1 | bit(Self::LOAD_GLOBAL);
        }
        if p.contains(Self::STORE.union(Self::LOAD_STORE_CAP)) {
            // 0b10000
            return gl | 0b10000;
        }
        if p.0 & (Self::LOAD.0 | Self::STORE.0) != 0 {
            // 0b100_sd_ld
            return gl | 0b100_00 | bit(Self::STORE) << 1 | bit(Self::LOAD);
        }
        // 0b00_u0_se_us
        gl | bit(Self::USER0) << 2 | bit(Self::SEAL) << 1 | bit(Self::UNSEAL)
    }

    /// Expand a 6-bit compressed encoding to the architectural set.
    pub fn expand(compressed: u32) -> Self {
        let c = compressed & 0x3F;
        let mut p = if c & 0x20 != 0 { Self::GLOBAL } else { Self::NONE };
        let low = c & 0x1F;
        let bit = |n: u32| low & (1 << n) != 0;
        if low >> 3 == 0b01 {
            p = p.union(Self::EXECUTE).union(Self::LOAD).union(Self::LOAD_STORE_CAP);
            if bit(2) {
                p = p.union(Self::ACCESS_SYSTEM_REGISTERS);
            }
            if bit(1) {
                p = p.union(Self::LOAD_MUTABLE);
            }
            if bit(0) {
                p = p.union(Self::LOAD_GLOBAL);
            }
        } else if low >> 3 == 0b11 {
            p = p
                .union(Self::LOAD)
                .union(Self::STORE)
                .union(Self::LOAD_STORE_CAP);
            if bit(2) {
                p = p.union(Self::STORE_LOCAL);
            }
            if bit(1) {
                p = p.union(Self::LOAD_MUTABLE);
            }
            if bit(0) {
                p = p.union(Self::LOAD_GLOBAL);
            }
        } else if low >> 2 == 0b101 {
            p = p.union(Self::LOAD).union(Self::LOAD_STORE_CAP);
            if bit(1) {
                p = p.union(Self::LOAD_MUTABLE);
            }
            if bit(0) {
                p = p.union(Self::LOAD_GLOBAL);
            }
        } else if low == 0b10000 {
            p = p.union(Self::STORE).union(Self::LOAD_STORE_CAP);
        } else if low >> 2 == 0b100 {
            if bit(1) {
                p = p.union(Self::STORE);
            }
            if bit(0) {
                p = p.union(Self::LOAD);
            }
        } else {
            if bit(2) {
                p = p.union(Self::USER0);
            }
            if bit(1) {
                p = p.union(Self::SEAL);
            }
            if bit(0) {
                p = p.union(Self::UNSEAL);
            }
        }
        p
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Permissions, &str); 12] = [
            (Permissions::GLOBAL, "GL"),
            (Permissions::LOAD, "LD"),
            (Permissions::STORE, "SD"),
            (Permissions::LOAD_STORE_CAP, "MC"),
            (Permissions::LOAD_GLOBAL, "LG"),
            (Permissions::LOAD_MUTABLE, "LM"),
            (Permissions::STORE_LOCAL, "SL"),
            (Permissions::EXECUTE, "EX"),
            (Permissions::ACCESS_SYSTEM_REGISTERS, "SR"),
            (Permissions::SEAL, "SE"),
            (Permissions::UNSEAL, "US"),
            (Permissions::USER0, "U0"),
        ];
        let mut first = true;
        for (perm, name) in NAMES {
            if self.contains(perm) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

/// Object type value of an unsealed capability.
pub const OTYPE_UNSEALED: u32 = 0;
/// First valid sealing type.
pub const OTYPE_FIRST: u32 = 1;
/// Last valid sealing type (the field is 3 bits wide).
pub const OTYPE_LAST: u32 = 7;
/// Object type of the sentry capabilities produced by `cjal`/`cjalr`.
pub const OTYPE_SENTRY: u32 = 1;

/// The three boot-time root capabilities. Every capability in a running
/// program is derivable from one of these by non-reversible operations.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Root {
    Executable,
    Sealing,
    Memory,
}

/// A single capability register: decoded fields plus the tag.
///
/// Invariants maintained by every mutation:
/// - `base <= top <= 2^33`.
/// - A cleared tag never comes back except through [`Self::reset_as`] or
///   a tagged capability load.
/// - The permission set is always representable (normalized).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CapabilityRegister {
    tag: bool,
    address: u32,
    base: u32,
    top: u64,
    /// Exponent of the compressed bounds; 0..=14 or 24. Cached so the
    /// representable-window check does not re-derive it on every
    /// `set_address`.
    exponent: u32,
    permissions: Permissions,
    otype: u32,
    reserved: bool,
}

impl Default for CapabilityRegister {
    fn default() -> Self {
        Self::null()
    }
}

impl CapabilityRegister {
    /// The null capability: untagged, no authority, zero everything.
    pub fn null() -> Self {
        Self {
            tag: false,
            address: 0,
            base: 0,
            top: 0,
            exponent: 0,
            permissions: Permissions::NONE,
            otype: OTYPE_UNSEALED,
            reserved: false,
        }
    }

    /// One of the three boot-time roots: full bounds `[0, 2^33)` and the
    /// kind's full permission set.
    pub fn root(kind: Root) -> Self {
        let permissions = match kind {
            Root::Executable => Permissions::EXECUTABLE_ROOT,
            Root::Sealing => Permissions::SEALING_ROOT,
            Root::Memory => Permissions::MEMORY_ROOT,
        };
        Self {
            tag: true,
            address: 0,
            base: 0,
            top: MAX_TOP,
            exponent: MAX_EXPONENT,
            permissions,
            otype: OTYPE_UNSEALED,
            reserved: false,
        }
    }

    /// Overwrite this register with a root value.
    pub fn reset_as(&mut self, kind: Root) {
        *self = Self::root(kind);
    }

    pub fn tag(&self) -> bool {
        self.tag
    }

    pub fn clear_tag(&mut self) {
        self.tag = false;
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Exclusive top bound, a 34-bit quantity.
    pub fn top(&self) -> u64 {
        self.top
    }

    pub fn length(&self) -> u64 {
        self.top - self.base as u64
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn otype(&self) -> u32 {
        self.otype
    }

    /// A capability is sealed iff its object type is non-zero.
    pub fn is_sealed(&self) -> bool {
        self.otype != OTYPE_UNSEALED
    }

    /// True iff this is a sealed entry ("sentry") capability, which control
    /// transfers through `cjr`/`cjalr` implicitly unseal.
    pub fn is_sentry(&self) -> bool {
        self.otype == OTYPE_SENTRY
    }

    pub fn has_permission(&self, permission: Permissions) -> bool {
        self.permissions.contains(permission)
    }

    /// True iff `[address, address + size)` lies within the bounds.
    pub fn is_in_bounds(&self, address: u32, size: u32) -> bool {
        address >= self.base && address as u64 + size as u64 <= self.top
    }

    /// The window of addresses that decode to the same bounds: the full
    /// address space for exponent 24, `[base, base + 2^(E+9))` otherwise.
    pub fn is_representable(&self, address: u32) -> bool {
        if self.exponent >= MAX_EXPONENT {
            return true;
        }
        let window = 1u64 << (self.exponent + MANTISSA_BITS);
        (address as u64) >= self.base as u64 && (address as u64) < self.base as u64 + window
    }

    /// Set the address field. If the new address falls outside the
    /// representable window for the current bounds the tag is cleared; there
    /// is no trap (the inexact behavior).
    pub fn set_address(&mut self, address: u32) {
        if !self.is_representable(address) {
            self.tag = false;
        }
        self.address = address;
    }

    /// Clear permission bits. Monotone: the result is always a subset of the
    /// current set (normalization only ever drops bits).
    pub fn and_perm(&mut self, mask: Permissions) {
        self.permissions = self.permissions.intersection(mask).normalize();
    }

    /// Mark this capability as sealed with the given object type. Validity of
    /// the otype source is the caller's concern (see the `cseal` semantic
    /// function); out-of-range values clear the tag.
    pub fn seal(&mut self, otype: u32) {
        if !(OTYPE_FIRST..=OTYPE_LAST).contains(&otype) {
            self.tag = false;
            return;
        }
        self.otype = otype;
    }

    pub fn unseal(&mut self) {
        self.otype = OTYPE_UNSEALED;
    }

    /// Narrow the bounds to `[new_base, new_base + length)`, rounding to the
    /// compressed-encoding granule. Returns `true` if the requested bounds
    /// were representable exactly. With `exact`, a rounded result clears the
    /// tag instead of being installed approximately.
    ///
    /// The address field is left untouched; callers set it to the new base
    /// where the instruction semantics require that.
    pub fn set_bounds(&mut self, new_base: u32, length: u64, exact: bool) -> bool {
        let req_base = new_base as u64;
        let req_top = req_base + length;
        if req_top > MAX_TOP {
            self.tag = false;
            return false;
        }
        let mut exponent = 0;
        while exponent <= 14 && length > ((MANTISSA_MASK as u64) << exponent) {
            exponent += 1;
        }
        if exponent > 14 {
            exponent = MAX_EXPONENT;
        }
        let (base, top, exponent) = loop {
            let align = 1u64 << exponent;
            let base = req_base & !(align - 1);
            let top = (req_top + align - 1) & !(align - 1);
            let fits = if exponent == MAX_EXPONENT {
                top <= ((MANTISSA_MASK as u64) << MAX_EXPONENT) || top == MAX_TOP
            } else {
                top - base <= (MANTISSA_MASK as u64) << exponent
            };
            if fits {
                break (base, top, exponent);
            }
            exponent = if exponent < 14 { exponent + 1 } else { MAX_EXPONENT };
        };
        let is_exact = base == req_base && top == req_top;
        if exact && !is_exact {
            self.tag = false;
            return false;
        }
        self.base = base as u32;
        self.top = top;
        self.exponent = exponent;
        is_exact
    }

    /// Smallest representable length that is `>= length` (the CRRL result).
    pub fn representable_length(length: u32) -> u32 {
        let mask = Self::representable_alignment_mask(length);
        (length.wrapping_add(!mask)) & mask
    }

    /// Alignment mask required for a region of `length` bytes to have exactly
    /// representable bounds (the CRAM result).
    pub fn representable_alignment_mask(length: u32) -> u32 {
        let mut exponent = 0;
        while exponent <= 14 && length as u64 > ((MANTISSA_MASK as u64) << exponent) {
            exponent += 1;
        }
        if exponent > 14 {
            exponent = MAX_EXPONENT;
        }
        // Rounding the length up can itself overflow the mantissa once.
        if exponent < MAX_EXPONENT {
            let align = (1u32 << exponent) - 1;
            let rounded = (length as u64 + align as u64) & !(align as u64);
            if rounded > (MANTISSA_MASK as u64) << exponent {
                exponent = if exponent < 14 { exponent + 1 } else { MAX_EXPONENT };
            }
        }
        !((1u64 << exponent) - 1) as u32
    }

    /// The high (metadata) word of the 64-bit memory image.
    pub fn high_word(&self) -> u32 {
        (self.compress() >> 32) as u32
    }

    /// Replace the metadata word wholesale. The result cannot carry a tag;
    /// this exists for the `csethigh` instruction.
    pub fn set_high_word(&mut self, high: u32) {
        *self = Self::expand(((high as u64) << 32) | self.address as u64, false);
    }

    /// Pack into the 64-bit memory image:
    ///
    /// ```text
    /// bits 63..32: reserved(1) perms(6) otype(3) E(4) B(9) T(9)
    /// bits 31..0:  address
    /// ```
    pub fn compress(&self) -> u64 {
        let e4 = if self.exponent == MAX_EXPONENT {
            0xF
        } else {
            self.exponent
        };
        let b9 = (self.base >> self.exponent) & MANTISSA_MASK;
        let t9 = ((self.top >> self.exponent) as u32) & MANTISSA_MASK;
        let meta = ((self.reserved as u32) << 31)
            | (self.permissions.compress() << 25)
            | (self.otype << 22)
            | (e4 << 18)
            | (b9 << 9)
            | t9;
        ((meta as u64) << 32) | self.address as u64
    }

    /// Unpack a 64-bit memory image. Untagged bit patterns decode to
    /// *something* (the fields are observable), but the absent tag keeps them
    /// from carrying authority.
    pub fn expand(bits: u64, tag: bool) -> Self {
        let address = bits as u32;
        let meta = (bits >> 32) as u32;
        let t9 = meta & MANTISSA_MASK;
        let b9 = (meta >> 9) & MANTISSA_MASK;
        let e4 = (meta >> 18) & 0xF;
        let otype = (meta >> 22) & 0x7;
        let permissions = Permissions::expand((meta >> 25) & 0x3F);
        let reserved = meta >> 31 != 0;
        let exponent = if e4 == 0xF { MAX_EXPONENT } else { e4 };

        let (base, top) = if exponent == MAX_EXPONENT {
            let base = (b9 as u64) << MAX_EXPONENT;
            let mut top = (t9 as u64) << MAX_EXPONENT;
            if top <= base {
                // The top wraps into the next 2^33 region; in particular
                // B = T = 0 decodes to the root bounds [0, 2^33).
                top += MAX_TOP;
            }
            (base as u32, top.min(MAX_TOP))
        } else {
            let amid = (address >> exponent) & MANTISSA_MASK;
            let atop = (address as u64) >> (exponent + MANTISSA_BITS);
            let cb = (amid < b9) as u64;
            let ct = (t9 < b9) as u64;
            let base = (atop.wrapping_sub(cb) << MANTISSA_BITS | b9 as u64) << exponent;
            let top = (atop.wrapping_sub(cb).wrapping_add(ct) << MANTISSA_BITS | t9 as u64)
                << exponent;
            let base = base as u32;
            let top = (top & (MAX_TOP * 2 - 1)).max(base as u64).min(MAX_TOP);
            (base, top)
        };

        Self {
            tag,
            address,
            base,
            top,
            exponent,
            permissions,
            otype,
            reserved,
        }
    }

    /// True iff every right of `self` is also held by `other`: tag state
    /// matches, bounds nest and permissions are a subset. Used by
    /// `ctestsubset`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.tag == other.tag
            && self.base >= other.base
            && self.top <= other.top
            && other.permissions.contains(self.permissions)
    }
}

impl fmt::Display for CapabilityRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#010x} (v:{} [{:#010x}, {:#011x}) {} otype:{})",
            self.address,
            self.tag as u8,
            self.base,
            self.top,
            self.permissions,
            self.otype
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roots_round_trip() {
        for kind in [Root::Executable, Root::Sealing, Root::Memory] {
            let root = CapabilityRegister::root(kind);
            assert!(root.tag());
            assert_eq!(0, root.base());
            assert_eq!(MAX_TOP, root.top());
            assert!(!root.is_sealed());
            let bits = root.compress();
            let back = CapabilityRegister::expand(bits, true);
            assert_eq!(root, back, "root {kind:?} must round-trip");
        }
    }

    #[test]
    fn test_root_permissions_are_distinct() {
        let mem = CapabilityRegister::root(Root::Memory);
        let exe = CapabilityRegister::root(Root::Executable);
        let seal = CapabilityRegister::root(Root::Sealing);
        assert!(mem.has_permission(Permissions::STORE));
        assert!(!mem.has_permission(Permissions::EXECUTE));
        assert!(exe.has_permission(Permissions::EXECUTE));
        assert!(!exe.has_permission(Permissions::STORE));
        assert!(seal.has_permission(Permissions::SEAL));
        assert!(!seal.has_permission(Permissions::LOAD));
    }

    #[test]
    fn test_permission_compression_round_trip() {
        // Every subset that normalization can produce must round-trip through
        // the 6-bit form.
        for bits in 0..0x1000u32 {
            let normalized = Permissions::from_bits(bits).normalize();
            assert_eq!(
                normalized,
                Permissions::expand(normalized.compress()),
                "permission set {bits:#05x} (normalized {:#05x})",
                normalized.bits()
            );
        }
    }

    #[test]
    fn test_and_perm_is_monotone() {
        for mask in [
            Permissions::NONE,
            Permissions::LOAD,
            Permissions::MEMORY_ROOT,
            Permissions::from_bits(0xABC),
        ] {
            let mut cap = CapabilityRegister::root(Root::Memory);
            let before = cap.permissions();
            cap.and_perm(mask);
            assert!(before.contains(cap.permissions()));
        }
    }

    #[test]
    fn test_and_perm_all_is_identity() {
        let mut cap = CapabilityRegister::root(Root::Memory);
        let before = cap.clone();
        cap.and_perm(Permissions::from_bits(0xFFF));
        assert_eq!(before, cap);
    }

    #[test]
    fn test_set_bounds_exact() {
        let mut cap = CapabilityRegister::root(Root::Memory);
        assert!(cap.set_bounds(0x8000_0000, 0x100, true));
        assert!(cap.tag());
        assert_eq!(0x8000_0000, cap.base());
        assert_eq!(0x8000_0100, cap.top());
    }

    #[test]
    fn test_set_bounds_rounds_when_inexact() {
        let mut cap = CapabilityRegister::root(Root::Memory);
        // 0x40000 needs E > 0, so a base misaligned by one byte must round.
        let exact = cap.set_bounds(0x8000_0001, 0x40000, false);
        assert!(!exact);
        assert!(cap.base() <= 0x8000_0001);
        assert!(cap.top() >= 0x8000_0001 + 0x40000);
        assert!(cap.tag());
    }

    #[test]
    fn test_set_bounds_exact_failure_clears_tag() {
        let mut cap = CapabilityRegister::root(Root::Memory);
        assert!(!cap.set_bounds(0x8000_0001, 0x40000, true));
        assert!(!cap.tag());
    }

    #[test]
    fn test_set_address_within_window_keeps_tag() {
        let mut cap = CapabilityRegister::root(Root::Memory);
        cap.set_bounds(0x8000_0000, 0x10, true);
        cap.set_address(0x8000_0008);
        assert!(cap.tag());
        // Out of bounds but still inside the 2^9 representable window.
        cap.set_address(0x8000_0100);
        assert!(cap.tag());
        assert!(!cap.is_in_bounds(0x8000_0100, 1));
    }

    #[test]
    fn test_set_address_outside_window_clears_tag() {
        let mut cap = CapabilityRegister::root(Root::Memory);
        cap.set_bounds(0x8000_0000, 0x10, true);
        cap.set_address(0x9000_0000);
        assert!(!cap.tag());
        assert_eq!(0x9000_0000, cap.address());
    }

    #[test]
    fn test_set_address_is_idempotent() {
        let mut a = CapabilityRegister::root(Root::Memory);
        a.set_bounds(0x8000_0000, 0x10, true);
        let mut b = a.clone();
        a.set_address(0x8000_0004);
        b.set_address(0x8000_0004);
        b.set_address(0x8000_0004);
        assert_eq!(a, b);
    }

    #[test]
    fn test_bounds_round_trip_through_memory() {
        let mut cap = CapabilityRegister::root(Root::Memory);
        cap.set_bounds(0x8000_2000, 0x468, true);
        cap.set_address(0x8000_2468 - 0x400);
        let back = CapabilityRegister::expand(cap.compress(), cap.tag());
        assert_eq!(cap, back);
    }

    #[test]
    fn test_in_bounds_edges() {
        let mut cap = CapabilityRegister::root(Root::Memory);
        cap.set_bounds(0x1000, 0x100, true);
        assert!(cap.is_in_bounds(cap.base(), 0));
        assert!(cap.is_in_bounds(cap.top() as u32 - 1, 1));
        assert!(!cap.is_in_bounds(cap.top() as u32, 1));
        assert!(!cap.is_in_bounds(cap.base() - 1, 1));
    }

    #[test]
    fn test_seal_unseal() {
        let mut cap = CapabilityRegister::root(Root::Memory);
        cap.seal(3);
        assert!(cap.is_sealed());
        assert_eq!(3, cap.otype());
        cap.unseal();
        assert!(!cap.is_sealed());
    }

    #[test]
    fn test_seal_with_invalid_otype_clears_tag() {
        let mut cap = CapabilityRegister::root(Root::Memory);
        cap.seal(0);
        assert!(!cap.tag());
    }

    #[test]
    fn test_sealed_round_trip() {
        let mut cap = CapabilityRegister::root(Root::Executable);
        cap.set_bounds(0x8000_0000, 0x1000, true);
        cap.set_address(0x8000_0010);
        cap.seal(OTYPE_SENTRY);
        let back = CapabilityRegister::expand(cap.compress(), cap.tag());
        assert_eq!(cap, back);
    }

    #[test]
    fn test_representable_length() {
        assert_eq!(0, CapabilityRegister::representable_length(0));
        assert_eq!(0x1FF, CapabilityRegister::representable_length(0x1FF));
        // 0x200 requires E = 1, so lengths round to even.
        assert_eq!(0x202, CapabilityRegister::representable_length(0x201));
        assert_eq!(
            !0u32 << 1,
            CapabilityRegister::representable_alignment_mask(0x201)
        );
        assert_eq!(!0u32, CapabilityRegister::representable_alignment_mask(0x10));
    }

    #[test]
    fn test_null_has_no_authority() {
        let cap = CapabilityRegister::null();
        assert!(!cap.tag());
        assert_eq!(Permissions::NONE, cap.permissions());
        assert!(!cap.is_in_bounds(0, 1));
    }

    #[test]
    fn test_subset() {
        let root = CapabilityRegister::root(Root::Memory);
        let mut narrowed = root.clone();
        narrowed.set_bounds(0x1000, 0x100, true);
        narrowed.and_perm(Permissions::MEMORY_ROOT.intersection(Permissions::from_bits(
            Permissions::LOAD.bits() | Permissions::LOAD_STORE_CAP.bits() | Permissions::GLOBAL.bits(),
        )));
        assert!(narrowed.is_subset_of(&root));
        assert!(!root.is_subset_of(&narrowed));
    }
}
