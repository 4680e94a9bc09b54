//! Instruction descriptors and the decode stage.

use std::convert::TryFrom;
use std::fmt;
use thiserror::Error;

use crate::assembler::{Operands, ParseErrorKind};
use crate::bits::{sign_extend, BitField};
use crate::consts::{
    FUNCT12_BITS, FUNCT12_MASK, FUNCT3_BITS, FUNCT3_MASK, FUNCT7_BITS, FUNCT7_MASK, OPCODE_BITS,
    OPCODE_MASK, SHAMT_MASK,
};
use crate::exception::Exception;
use crate::format::{
    BranchParams, Format, ImmediateParams, JumpParams, Parameters, StoreParams, UpperParams,
};
use crate::processor::{Hooks, Machine};
use crate::register::RegisterName;

/// RISC-V 32I opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    OpImm = 0b00_100_11,
    Lui = 0b01_101_11,
    AuiPc = 0b00_101_11,
    Op = 0b01_100_11,
    Jal = 0b11_011_11,
    Jalr = 0b11_001_11,
    Branch = 0b11_000_11,
    Load = 0b00_000_11,
    Store = 0b01_000_11,
    System = 0b11_100_11,
}

impl TryFrom<u32> for Opcode {
    type Error = u32;

    /// Takes the opcode field of `word`; an unknown value is handed back.
    fn try_from(word: u32) -> Result<Self, u32> {
        let opcode = word.bits(OPCODE_BITS);
        let decoded = match opcode {
            0b00_100_11 => Opcode::OpImm,
            0b01_101_11 => Opcode::Lui,
            0b00_101_11 => Opcode::AuiPc,
            0b01_100_11 => Opcode::Op,
            0b11_011_11 => Opcode::Jal,
            0b11_001_11 => Opcode::Jalr,
            0b11_000_11 => Opcode::Branch,
            0b00_000_11 => Opcode::Load,
            0b01_000_11 => Opcode::Store,
            0b11_100_11 => Opcode::System,
            _ => return Err(opcode),
        };
        Ok(decoded)
    }
}

/// Secondary fields that pick one instruction out of an opcode group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Locator {
    None,
    Funct3(u32),
    Funct3Funct7(u32, u32),
    Funct3Funct12(u32, u32),
}

impl Locator {
    /// Word bits this locator constrains.
    pub fn mask(self) -> u32 {
        match self {
            Locator::None => 0,
            Locator::Funct3(_) => FUNCT3_MASK,
            Locator::Funct3Funct7(..) => FUNCT3_MASK | FUNCT7_MASK,
            Locator::Funct3Funct12(..) => FUNCT3_MASK | FUNCT12_MASK,
        }
    }

    /// The constrained bits, in place.
    pub fn bits(self) -> u32 {
        match self {
            Locator::None => 0,
            Locator::Funct3(funct3) => 0u32.with_bits(FUNCT3_BITS, funct3),
            Locator::Funct3Funct7(funct3, funct7) => 0u32
                .with_bits(FUNCT3_BITS, funct3)
                .with_bits(FUNCT7_BITS, funct7),
            Locator::Funct3Funct12(funct3, funct12) => 0u32
                .with_bits(FUNCT3_BITS, funct3)
                .with_bits(FUNCT12_BITS, funct12),
        }
    }
}

pub type Action<P> = fn(&mut Machine, &mut Hooks, P) -> Result<(), Exception>;

/// What an instruction does, tagged with the format its operands use.
#[derive(Clone, Copy)]
pub enum Semantics {
    Immediate(Action<ImmediateParams>),
    Branch(Action<BranchParams>),
    Jump(Action<JumpParams>),
    Store(Action<StoreParams>),
    Upper(Action<UpperParams>),
}

impl Semantics {
    pub fn format(&self) -> Format {
        match self {
            Semantics::Immediate(_) => Format::Immediate,
            Semantics::Branch(_) => Format::Branch,
            Semantics::Jump(_) => Format::Jump,
            Semantics::Store(_) => Format::Store,
            Semantics::Upper(_) => Format::Upper,
        }
    }
}

/// How the assembler and disassembler treat an instruction's operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shape {
    /// Operands as the format lays them out.
    Plain,
    /// I-type whose upper immediate bits are funct7; the operand is a shift amount.
    Shift,
    /// I-type whose whole immediate is funct12; no operands at all.
    Bare,
}

/// One entry of an instruction table.
#[derive(Clone, Copy)]
pub struct Descriptor {
    pub mnemonic: &'static str,
    pub opcode: Opcode,
    pub locator: Locator,
    pub semantics: Semantics,
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("mnemonic", &self.mnemonic)
            .field("opcode", &self.opcode)
            .field("locator", &self.locator)
            .field("format", &self.format())
            .finish()
    }
}

impl Descriptor {
    pub fn format(&self) -> Format {
        self.semantics.format()
    }

    fn shape(&self) -> Shape {
        match (self.format(), self.locator) {
            (Format::Immediate, Locator::Funct3Funct7(..)) => Shape::Shift,
            (Format::Immediate, Locator::Funct3Funct12(..)) => Shape::Bare,
            _ => Shape::Plain,
        }
    }

    /// (mask, value) such that a word belongs to this instruction exactly when
    /// `word & mask == value`.
    pub fn pattern(&self) -> (u32, u32) {
        (
            OPCODE_MASK | self.locator.mask(),
            self.opcode as u32 | self.locator.bits(),
        )
    }

    pub fn matches(&self, word: u32) -> bool {
        let (mask, value) = self.pattern();
        word & mask == value
    }

    /// Whether some word would match both descriptors.
    pub fn overlaps(&self, other: &Descriptor) -> bool {
        let (mask, value) = self.pattern();
        let (other_mask, other_value) = other.pattern();
        (value ^ other_value) & mask & other_mask == 0
    }

    /// Assembles a full word. Opcode and locator bits take precedence over
    /// anything the operands would put in the same fields.
    pub fn encode(&self, params: &Parameters) -> u32 {
        debug_assert_eq!(params.format(), self.format());
        let (mask, value) = self.pattern();
        (params.encode() & !mask) | value
    }

    /// Decodes the operands of a word this descriptor matches.
    pub fn decode_parameters(&self, word: u32) -> Parameters {
        let params = self.format().decode(word);
        match (self.shape(), params) {
            (Shape::Shift, Parameters::Immediate(p)) => Parameters::Immediate(ImmediateParams {
                imm: (p.imm as u32 & SHAMT_MASK) as i32,
                ..p
            }),
            _ => params,
        }
    }

    /// Reads operand tokens for this instruction.
    pub fn read_parameters(&self, operands: &Operands) -> Result<Parameters, ParseErrorKind> {
        match self.shape() {
            Shape::Plain => self.format().read(operands),
            Shape::Shift => {
                operands.expect_count(3)?;
                Ok(Parameters::Immediate(ImmediateParams {
                    rd: operands.register(0)?,
                    rs1: operands.register(1)?,
                    imm: operands.unsigned(2, 5)? as i32,
                }))
            }
            Shape::Bare => {
                operands.expect_count(0)?;
                let funct12 = self.locator.bits().bits(FUNCT12_BITS);
                Ok(Parameters::Immediate(ImmediateParams {
                    rd: RegisterName::ZERO,
                    rs1: RegisterName::ZERO,
                    imm: sign_extend(funct12, 12),
                }))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("illegal instruction 0x00000000")]
    IllegalZero,

    #[error("unknown opcode {opcode:#09b} in {word:#010x}")]
    UnknownOpcode { word: u32, opcode: u32 },

    #[error("no instruction matches {word:#010x}")]
    NoMatch { word: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("{first} and {second} can match the same word")]
    Ambiguous {
        first: &'static str,
        second: &'static str,
    },

    #[error("mnemonic {0} appears more than once")]
    DuplicateMnemonic(&'static str),
}

/// A single decoded machine instruction, ready to execute.
///
/// Only `InstructionSet::decode` builds one, so the parameters always have
/// the descriptor's format.
#[derive(Clone, Copy, Debug)]
pub struct DecodedInstruction<'a> {
    word: u32,
    descriptor: &'a Descriptor,
    parameters: Parameters,
}

impl<'a> DecodedInstruction<'a> {
    pub fn word(&self) -> u32 {
        self.word
    }

    pub fn descriptor(&self) -> &'a Descriptor {
        self.descriptor
    }

    pub fn parameters(&self) -> Parameters {
        self.parameters
    }

    pub fn mnemonic(&self) -> &'static str {
        self.descriptor.mnemonic
    }

    pub fn execute(&self, machine: &mut Machine, hooks: &mut Hooks) -> Result<(), Exception> {
        match (self.descriptor.semantics, self.parameters) {
            (Semantics::Immediate(action), Parameters::Immediate(p)) => action(machine, hooks, p),
            (Semantics::Branch(action), Parameters::Branch(p)) => action(machine, hooks, p),
            (Semantics::Jump(action), Parameters::Jump(p)) => action(machine, hooks, p),
            (Semantics::Store(action), Parameters::Store(p)) => action(machine, hooks, p),
            (Semantics::Upper(action), Parameters::Upper(p)) => action(machine, hooks, p),
            _ => unreachable!("parameters do not match {}", self.descriptor.mnemonic),
        }
    }
}

/// Disassembly in the assembler's syntax.
impl<'a> fmt::Display for DecodedInstruction<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.descriptor.shape() {
            Shape::Bare => write!(f, "{}", self.mnemonic()),
            Shape::Plain | Shape::Shift => write!(f, "{} {}", self.mnemonic(), self.parameters),
        }
    }
}

/// An ordered, unambiguous table of instruction descriptors.
#[derive(Debug)]
pub struct InstructionSet {
    descriptors: Vec<Descriptor>,
}

impl InstructionSet {
    /// Builds a table, rejecting descriptors that could match the same word
    /// or that share a mnemonic.
    pub fn new(descriptors: Vec<Descriptor>) -> Result<InstructionSet, TableError> {
        for (i, first) in descriptors.iter().enumerate() {
            for second in &descriptors[i + 1..] {
                if first.mnemonic == second.mnemonic {
                    return Err(TableError::DuplicateMnemonic(first.mnemonic));
                }
                if first.overlaps(second) {
                    return Err(TableError::Ambiguous {
                        first: first.mnemonic,
                        second: second.mnemonic,
                    });
                }
            }
        }
        Ok(InstructionSet { descriptors })
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Exact, case-sensitive lookup.
    pub fn find(&self, mnemonic: &str) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.mnemonic == mnemonic)
    }

    pub fn decode(&self, word: u32) -> Result<DecodedInstruction, DecodeError> {
        if word == 0 {
            return Err(DecodeError::IllegalZero);
        }
        Opcode::try_from(word).map_err(|opcode| DecodeError::UnknownOpcode { word, opcode })?;
        let descriptor = self
            .descriptors
            .iter()
            .find(|d| d.matches(word))
            .ok_or(DecodeError::NoMatch { word })?;
        Ok(DecodedInstruction {
            word,
            descriptor,
            parameters: descriptor.decode_parameters(word),
        })
    }
}
