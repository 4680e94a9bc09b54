//! Instruction formats.
//!
//! Each format maps a word to a typed set of operands and back, following the
//! RV32I base encoding. Branch and jump immediates are byte offsets whose bit 0
//! is always zero, so it is not stored in the word.

use std::fmt;

use crate::assembler::{Operands, ParseErrorKind};
use crate::bits::{sign_extend, BitField};
use crate::consts::{IMM_I_BITS, RD_BITS, RS1_BITS, RS2_BITS, UPPER_IMM_MASK};
use crate::register::RegisterName;

/// RISC-V 32I instruction formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// I-type: `rd, rs1, imm[11:0]`
    Immediate,
    /// B-type: `rs1, rs2, imm[12:1]`
    Branch,
    /// J-type: `rd, imm[20:1]`
    Jump,
    /// S-type: `rs1, rs2, imm[11:0]`
    Store,
    /// U-type: `rd, imm[31:12]`
    Upper,
}

impl Format {
    pub fn decode(self, word: u32) -> Parameters {
        match self {
            Format::Immediate => Parameters::Immediate(ImmediateParams::decode(word)),
            Format::Branch => Parameters::Branch(BranchParams::decode(word)),
            Format::Jump => Parameters::Jump(JumpParams::decode(word)),
            Format::Store => Parameters::Store(StoreParams::decode(word)),
            Format::Upper => Parameters::Upper(UpperParams::decode(word)),
        }
    }

    /// Reads this format's operands in assembler order.
    pub fn read(self, operands: &Operands) -> Result<Parameters, ParseErrorKind> {
        let params = match self {
            Format::Immediate => {
                operands.expect_count(3)?;
                Parameters::Immediate(ImmediateParams {
                    rd: operands.register(0)?,
                    rs1: operands.register(1)?,
                    imm: operands.signed(2, 12)?,
                })
            }
            Format::Branch => {
                operands.expect_count(3)?;
                Parameters::Branch(BranchParams {
                    rs1: operands.register(0)?,
                    rs2: operands.register(1)?,
                    imm: operands.offset(2, 13)?,
                })
            }
            Format::Jump => {
                operands.expect_count(2)?;
                Parameters::Jump(JumpParams {
                    rd: operands.register(0)?,
                    imm: operands.offset(1, 21)?,
                })
            }
            Format::Store => {
                operands.expect_count(3)?;
                Parameters::Store(StoreParams {
                    rs2: operands.register(0)?,
                    rs1: operands.register(1)?,
                    imm: operands.signed(2, 12)?,
                })
            }
            Format::Upper => {
                operands.expect_count(2)?;
                Parameters::Upper(UpperParams {
                    rd: operands.register(0)?,
                    imm: operands.unsigned(1, 32)? & UPPER_IMM_MASK,
                })
            }
        };
        Ok(params)
    }
}

/// Operands of an I-type instruction. `imm` is sign-extended from 12 bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImmediateParams {
    pub rd: RegisterName,
    pub rs1: RegisterName,
    pub imm: i32,
}

impl ImmediateParams {
    pub fn decode(word: u32) -> Self {
        ImmediateParams {
            rd: RegisterName::from_field(word.bits(RD_BITS)),
            rs1: RegisterName::from_field(word.bits(RS1_BITS)),
            imm: sign_extend(word.bits(IMM_I_BITS), 12),
        }
    }

    pub fn encode(&self) -> u32 {
        0u32.with_bits(RD_BITS, self.rd.index().into())
            .with_bits(RS1_BITS, self.rs1.index().into())
            .with_bits(IMM_I_BITS, self.imm as u32)
    }
}

/// Operands of a B-type instruction. `imm` is an even byte offset in
/// `-4096..=4094`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BranchParams {
    pub rs1: RegisterName,
    pub rs2: RegisterName,
    pub imm: i32,
}

impl BranchParams {
    pub fn decode(word: u32) -> Self {
        let imm = 0u32
            .with_bits(1..=4, word.bits(8..=11))
            .with_bits(5..=10, word.bits(25..=30))
            .with_bits(11..=11, word.bits(7..=7))
            .with_bits(12..=12, word.bits(31..=31));
        BranchParams {
            rs1: RegisterName::from_field(word.bits(RS1_BITS)),
            rs2: RegisterName::from_field(word.bits(RS2_BITS)),
            imm: sign_extend(imm, 13),
        }
    }

    pub fn encode(&self) -> u32 {
        let imm = self.imm as u32;
        0u32.with_bits(RS1_BITS, self.rs1.index().into())
            .with_bits(RS2_BITS, self.rs2.index().into())
            .with_bits(8..=11, imm.bits(1..=4))
            .with_bits(25..=30, imm.bits(5..=10))
            .with_bits(7..=7, imm.bits(11..=11))
            .with_bits(31..=31, imm.bits(12..=12))
    }
}

/// Operands of a J-type instruction. `imm` is an even byte offset in
/// `-1048576..=1048574`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JumpParams {
    pub rd: RegisterName,
    pub imm: i32,
}

impl JumpParams {
    pub fn decode(word: u32) -> Self {
        let imm = 0u32
            .with_bits(1..=10, word.bits(21..=30))
            .with_bits(11..=11, word.bits(20..=20))
            .with_bits(12..=19, word.bits(12..=19))
            .with_bits(20..=20, word.bits(31..=31));
        JumpParams {
            rd: RegisterName::from_field(word.bits(RD_BITS)),
            imm: sign_extend(imm, 21),
        }
    }

    pub fn encode(&self) -> u32 {
        let imm = self.imm as u32;
        0u32.with_bits(RD_BITS, self.rd.index().into())
            .with_bits(21..=30, imm.bits(1..=10))
            .with_bits(20..=20, imm.bits(11..=11))
            .with_bits(12..=19, imm.bits(12..=19))
            .with_bits(31..=31, imm.bits(20..=20))
    }
}

/// Operands of an S-type instruction. `imm` is sign-extended from 12 bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreParams {
    pub rs1: RegisterName,
    pub rs2: RegisterName,
    pub imm: i32,
}

impl StoreParams {
    pub fn decode(word: u32) -> Self {
        let imm = 0u32
            .with_bits(0..=4, word.bits(7..=11))
            .with_bits(5..=11, word.bits(25..=31));
        StoreParams {
            rs1: RegisterName::from_field(word.bits(RS1_BITS)),
            rs2: RegisterName::from_field(word.bits(RS2_BITS)),
            imm: sign_extend(imm, 12),
        }
    }

    pub fn encode(&self) -> u32 {
        let imm = self.imm as u32;
        0u32.with_bits(RS1_BITS, self.rs1.index().into())
            .with_bits(RS2_BITS, self.rs2.index().into())
            .with_bits(7..=11, imm.bits(0..=4))
            .with_bits(25..=31, imm.bits(5..=11))
    }
}

/// Operands of a U-type instruction. `imm` keeps the upper 20 bits in place;
/// its low 12 bits are always zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpperParams {
    pub rd: RegisterName,
    pub imm: u32,
}

impl UpperParams {
    pub fn decode(word: u32) -> Self {
        UpperParams {
            rd: RegisterName::from_field(word.bits(RD_BITS)),
            imm: word & UPPER_IMM_MASK,
        }
    }

    pub fn encode(&self) -> u32 {
        0u32.with_bits(RD_BITS, self.rd.index().into()) | (self.imm & UPPER_IMM_MASK)
    }
}

/// Decoded operands, tagged by format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parameters {
    Immediate(ImmediateParams),
    Branch(BranchParams),
    Jump(JumpParams),
    Store(StoreParams),
    Upper(UpperParams),
}

impl Parameters {
    pub fn format(&self) -> Format {
        match self {
            Parameters::Immediate(_) => Format::Immediate,
            Parameters::Branch(_) => Format::Branch,
            Parameters::Jump(_) => Format::Jump,
            Parameters::Store(_) => Format::Store,
            Parameters::Upper(_) => Format::Upper,
        }
    }

    /// Operand bits only; opcode and locator fields are left zero.
    pub fn encode(&self) -> u32 {
        match self {
            Parameters::Immediate(p) => p.encode(),
            Parameters::Branch(p) => p.encode(),
            Parameters::Jump(p) => p.encode(),
            Parameters::Store(p) => p.encode(),
            Parameters::Upper(p) => p.encode(),
        }
    }
}

/// Operands in assembler order, e.g. `x1 x2 -4`.
impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Parameters::Immediate(p) => write!(f, "{} {} {}", p.rd, p.rs1, p.imm),
            Parameters::Branch(p) => write!(f, "{} {} {}", p.rs1, p.rs2, p.imm),
            Parameters::Jump(p) => write!(f, "{} {}", p.rd, p.imm),
            Parameters::Store(p) => write!(f, "{} {} {}", p.rs2, p.rs1, p.imm),
            Parameters::Upper(p) => write!(f, "{} {}", p.rd, p.imm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(index: u8) -> RegisterName {
        RegisterName::new(index).unwrap()
    }

    #[test]
    fn immediate_round_trip() {
        for &imm in &[0, 1, -1, 2047, -2048, 100, -100] {
            let params = Parameters::Immediate(ImmediateParams {
                rd: reg(31),
                rs1: reg(5),
                imm,
            });
            assert_eq!(Format::Immediate.decode(params.encode()), params);
        }
    }

    #[test]
    fn branch_round_trip() {
        for &imm in &[0, 2, -2, 8, -8, 4094, -4096, 2048, -2048, 1366] {
            let params = Parameters::Branch(BranchParams {
                rs1: reg(1),
                rs2: reg(30),
                imm,
            });
            assert_eq!(Format::Branch.decode(params.encode()), params);
        }
    }

    #[test]
    fn jump_round_trip() {
        for &imm in &[0, 2, -2, 2048, -2048, 4096, 1 << 19, -(1 << 19), 1_048_574, -1_048_576] {
            let params = Parameters::Jump(JumpParams { rd: reg(1), imm });
            assert_eq!(Format::Jump.decode(params.encode()), params);
        }
    }

    #[test]
    fn store_round_trip() {
        for &imm in &[0, 31, 32, -1, 2047, -2048] {
            let params = Parameters::Store(StoreParams {
                rs1: reg(2),
                rs2: reg(17),
                imm,
            });
            assert_eq!(Format::Store.decode(params.encode()), params);
        }
    }

    #[test]
    fn upper_round_trip() {
        for &imm in &[0, 0x1000, 0xffff_f000, 0x8000_0000, 0x1234_5000] {
            let params = Parameters::Upper(UpperParams { rd: reg(9), imm });
            assert_eq!(Format::Upper.decode(params.encode()), params);
        }
    }

    // Reference encodings produced by a standard RV32I assembler.
    #[test]
    fn canonical_bit_layouts() {
        // beq x0, x0, 8
        let beq = BranchParams {
            rs1: reg(0),
            rs2: reg(0),
            imm: 8,
        };
        assert_eq!(beq.encode() | 0x63, 0x0000_0463);
        // bne x1, x2, -4
        let bne = BranchParams::decode(0xfe20_9ee3);
        assert_eq!((bne.rs1, bne.rs2, bne.imm), (reg(1), reg(2), -4));
        // jal x0, -8
        let jal = JumpParams { rd: reg(0), imm: -8 };
        assert_eq!(jal.encode() | 0x6f, 0xff9f_f06f);
        // jal x1, 2048
        assert_eq!(JumpParams::decode(0x0010_00ef).imm, 2048);
        // sw x2, -4(x1)
        let sw = StoreParams::decode(0xfe20_ae23);
        assert_eq!((sw.rs1, sw.rs2, sw.imm), (reg(1), reg(2), -4));
        // addi x1, x1, -1
        let addi = ImmediateParams::decode(0xfff0_8093);
        assert_eq!((addi.rd, addi.rs1, addi.imm), (reg(1), reg(1), -1));
        // lui x5, 0x12345
        let lui = UpperParams::decode(0x1234_52b7);
        assert_eq!((lui.rd, lui.imm), (reg(5), 0x1234_5000));
    }

    #[test]
    fn operand_bits_stay_clear_of_opcode() {
        let params = Parameters::Jump(JumpParams {
            rd: reg(31),
            imm: -2,
        });
        assert_eq!(params.encode() & 0x7f, 0);
        let params = Parameters::Branch(BranchParams {
            rs1: reg(31),
            rs2: reg(31),
            imm: -2,
        });
        assert_eq!(params.encode() & 0x707f, 0);
    }

    #[test]
    fn display_in_assembler_order() {
        let store = Parameters::Store(StoreParams {
            rs1: reg(1),
            rs2: reg(2),
            imm: 8,
        });
        assert_eq!(store.to_string(), "x2 x1 8");
        let upper = Parameters::Upper(UpperParams {
            rd: reg(3),
            imm: 0x2000,
        });
        assert_eq!(upper.to_string(), "x3 8192");
    }
}
