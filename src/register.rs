//! 32-bit register and RV32I register file.

use crate::consts::REGISTER_COUNT;
use std::fmt;

/// ABI names of the general purpose registers, indexed by register number.
const ABI_NAMES: [&str; REGISTER_COUNT] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

/// Index of a general purpose register, always in `0..32`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterName(u8);

impl RegisterName {
    pub const ZERO: RegisterName = RegisterName(0);

    /// Returns `None` if `index` does not name a register.
    pub fn new(index: u8) -> Option<RegisterName> {
        if (index as usize) < REGISTER_COUNT {
            Some(RegisterName(index))
        } else {
            None
        }
    }

    /// Takes the low five bits of a decoded field.
    pub fn from_field(field: u32) -> RegisterName {
        RegisterName((field & 0x1f) as u8)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    pub fn abi_name(self) -> &'static str {
        ABI_NAMES[self.0 as usize]
    }

    /// Resolves `x0`..`x31` or an ABI alias (`fp` is accepted for `s0`).
    pub fn lookup(name: &str) -> Option<RegisterName> {
        if let Some(number) = name.strip_prefix('x') {
            if !number.bytes().all(|b| b.is_ascii_digit())
                || (number.len() > 1 && number.starts_with('0'))
            {
                return None;
            }
            return number.parse::<u8>().ok().and_then(RegisterName::new);
        }
        if name == "fp" {
            return Some(RegisterName(8));
        }
        ABI_NAMES
            .iter()
            .position(|&alias| alias == name)
            .map(|index| RegisterName(index as u8))
    }
}

impl fmt::Display for RegisterName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// A complete RV32I register file.
///
/// Holds 32 general purpose registers. `x0` is read-only and always reads as
/// zero; writes to it are accepted and dropped.
#[derive(Clone, Debug)]
pub struct RegisterFile {
    gpr: [Register; REGISTER_COUNT],
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[ ")?;
        for (i, reg) in self.gpr.iter().enumerate() {
            write!(f, "#{}={:x}, ", i, reg.read())?;
        }
        write!(f, "]")
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        RegisterFile::new()
    }
}

impl RegisterFile {
    /// Constructs a new `RegisterFile` with every register cleared.
    pub fn new() -> RegisterFile {
        let mut reg_file = RegisterFile {
            gpr: [Register::new(0, true); REGISTER_COUNT],
        };
        reg_file.gpr[0] = Register::new(0, false); // reinit x0 as read-only
        reg_file
    }

    /// Constructs a new `RegisterFile` with `sp` preset.
    pub fn with_stack_pointer(stack_pointer: u32) -> RegisterFile {
        let mut reg_file = RegisterFile::new();
        reg_file.gpr[2].write(stack_pointer);
        reg_file
    }

    pub fn read(&self, name: RegisterName) -> u32 {
        self.gpr[name.index() as usize].read()
    }

    pub fn write(&mut self, name: RegisterName, value: u32) {
        self.gpr[name.index() as usize].write(value);
    }

    /// Register values in index order, for inspection.
    pub fn values(&self) -> impl Iterator<Item = (RegisterName, u32)> + '_ {
        self.gpr
            .iter()
            .enumerate()
            .map(|(i, reg)| (RegisterName(i as u8), reg.read()))
    }
}

/// A write-protectable register.
#[derive(Clone, Copy, Debug)]
pub struct Register {
    /// The current register value.
    value: u32,

    /// If false, writing to the register has no effect.
    is_writable: bool,
}

impl Register {
    /// Constructs a new `Register`.
    pub fn new(value: u32, is_writable: bool) -> Register {
        Register { value, is_writable }
    }

    /// Reads the register's value.
    pub fn read(&self) -> u32 {
        self.value
    }

    /// Writes `value` to the register if it's writable, otherwise no effect.
    pub fn write(&mut self, value: u32) {
        if self.is_writable {
            self.value = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_register_ignores_writes() {
        let mut regs = RegisterFile::new();
        for &value in &[0u32, 1, 0x8000_0000, 0xffff_ffff, 12345] {
            regs.write(RegisterName::ZERO, value);
            assert_eq!(regs.read(RegisterName::ZERO), 0);
        }
    }

    #[test]
    fn general_registers_hold_values() {
        let mut regs = RegisterFile::new();
        for index in 1..32u8 {
            let name = RegisterName::new(index).unwrap();
            regs.write(name, u32::from(index) * 3);
        }
        for index in 1..32u8 {
            let name = RegisterName::new(index).unwrap();
            assert_eq!(regs.read(name), u32::from(index) * 3);
        }
    }

    #[test]
    fn stack_pointer_preset() {
        let regs = RegisterFile::with_stack_pointer(0x8000);
        assert_eq!(regs.read(RegisterName::lookup("sp").unwrap()), 0x8000);
    }

    #[test]
    fn name_lookup() {
        assert_eq!(RegisterName::lookup("x0"), Some(RegisterName::ZERO));
        assert_eq!(RegisterName::lookup("x31").map(RegisterName::index), Some(31));
        assert_eq!(RegisterName::lookup("zero"), Some(RegisterName::ZERO));
        assert_eq!(RegisterName::lookup("a0").map(RegisterName::index), Some(10));
        assert_eq!(RegisterName::lookup("fp").map(RegisterName::index), Some(8));
        assert_eq!(RegisterName::lookup("s0").map(RegisterName::index), Some(8));
        assert_eq!(RegisterName::lookup("t6").map(RegisterName::index), Some(31));
        assert_eq!(RegisterName::lookup("x32"), None);
        assert_eq!(RegisterName::lookup("x01"), None);
        assert_eq!(RegisterName::lookup("X1"), None);
        assert_eq!(RegisterName::lookup("r1"), None);
    }

    #[test]
    fn out_of_range_index() {
        assert!(RegisterName::new(31).is_some());
        assert!(RegisterName::new(32).is_none());
        assert_eq!(RegisterName::from_field(0xff).index(), 31);
    }
}
