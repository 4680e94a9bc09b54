//! Global constants

use std::ops::RangeInclusive;

/// Sizes in bytes.
pub const WORD_SIZE: u32 = 4;
pub const HALFWORD_SIZE: u32 = 2;
pub const BYTE_SIZE: u32 = 1;

/// Every RV32I instruction is one word wide.
pub const INSTRUCTION_SIZE: u32 = WORD_SIZE;

/// Number of general purpose registers.
pub const REGISTER_COUNT: usize = 32;

/// Bytes in the 32-bit address space.
pub const ADDRESS_SPACE_SIZE: u64 = 1 << 32;

/// Page size used when the host does not pick one.
pub const DEFAULT_PAGE_SIZE: u32 = 4096;

/// A canonical RISC-V NOP, encoded as ADDI x0, x0, 0.
pub const NOP: u32 = 0x13;

// Inclusive bit ranges of the instruction word fields
pub const OPCODE_BITS: RangeInclusive<u32> = 0..=6;
pub const RD_BITS: RangeInclusive<u32> = 7..=11;
pub const FUNCT3_BITS: RangeInclusive<u32> = 12..=14;
pub const RS1_BITS: RangeInclusive<u32> = 15..=19;
pub const RS2_BITS: RangeInclusive<u32> = 20..=24;
pub const FUNCT7_BITS: RangeInclusive<u32> = 25..=31;
pub const FUNCT12_BITS: RangeInclusive<u32> = 20..=31;
pub const IMM_I_BITS: RangeInclusive<u32> = 20..=31;

// Masks to isolate specific parts of the instruction using logical AND (&)
pub const OPCODE_MASK: u32 = 0x7f;
pub const FUNCT3_MASK: u32 = 0x7000;
pub const FUNCT7_MASK: u32 = 0xfe00_0000;
pub const FUNCT12_MASK: u32 = 0xfff0_0000;
pub const UPPER_IMM_MASK: u32 = 0xffff_f000;

/// Shift amounts of the immediate shift instructions fit in five bits.
pub const SHAMT_MASK: u32 = 0x1f;

pub const SYSCALL_NUM_REG: u8 = 17;
pub const SYSCALL_RET_REG: u8 = 10;
pub const SYSCALL_ARG1_REG: u8 = 10;

// System calls understood by the command line front end
pub const SYSCALL_PRINT_INT: u32 = 1;
pub const SYSCALL_EXIT: u32 = 10;
pub const SYSCALL_PRINT_CHAR: u32 = 11;
pub const SYSCALL_EXIT_CODE: u32 = 93;
