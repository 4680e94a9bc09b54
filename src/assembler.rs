//! Text assembler.
//!
//! One instruction per line, operands separated by whitespace or commas, and
//! `;` starting a comment that runs to the end of the line:
//!
//! ```text
//! ADDI x1 x0 10     ; decimal
//! LUI  a0, 0x10000  ; ABI names, commas and hex are accepted too
//! ```

use byteorder::{ByteOrder, LittleEndian};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::fmt;
use std::ops::Range;
use thiserror::Error;

use crate::bits::{fits_signed, fits_unsigned};
use crate::consts::WORD_SIZE;
use crate::instruction::InstructionSet;
use crate::memory::PageStorage;
use crate::register::RegisterName;
use crate::rv32i;

lazy_static! {
    static ref SEPARATOR: Regex = Regex::new(r"[\s,]+").unwrap();
    static ref INTEGER: Regex = Regex::new(r"^([+-]?)(?:0[xX]([0-9a-fA-F]+)|([0-9]+))$").unwrap();
}

/// Why a line failed to assemble.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),

    #[error("`{0}` is not a register")]
    InvalidRegister(String),

    #[error("`{0}` is not an integer")]
    InvalidInteger(String),

    #[error("`{token}` does not fit in {bits} bits")]
    OutOfRange { token: String, bits: u32 },

    #[error("offset `{0}` is odd")]
    Misaligned(String),

    #[error("expected {expected} operands, found {found}")]
    WrongOperandCount { expected: usize, found: usize },
}

/// A failed assembly, pointing at the offending line.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("line {line}: {kind}: `{text}`")]
pub struct ParseError {
    /// 1-based line number.
    pub line: usize,
    pub text: String,
    pub kind: ParseErrorKind,
}

/// Positional operand tokens of one instruction.
#[derive(Clone, Copy, Debug)]
pub struct Operands<'t> {
    tokens: &'t [&'t str],
}

impl<'t> Operands<'t> {
    pub fn new(tokens: &'t [&'t str]) -> Self {
        Operands { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn expect_count(&self, expected: usize) -> Result<(), ParseErrorKind> {
        if self.len() == expected {
            Ok(())
        } else {
            Err(ParseErrorKind::WrongOperandCount {
                expected,
                found: self.len(),
            })
        }
    }

    fn token(&self, index: usize) -> Result<&'t str, ParseErrorKind> {
        self.tokens
            .get(index)
            .copied()
            .ok_or(ParseErrorKind::WrongOperandCount {
                expected: index + 1,
                found: self.len(),
            })
    }

    /// Resolves `x0`..`x31` or an ABI name.
    pub fn register(&self, index: usize) -> Result<RegisterName, ParseErrorKind> {
        let token = self.token(index)?;
        RegisterName::lookup(token).ok_or_else(|| ParseErrorKind::InvalidRegister(token.into()))
    }

    fn integer(&self, index: usize) -> Result<(&'t str, i64), ParseErrorKind> {
        let token = self.token(index)?;
        let invalid = || ParseErrorKind::InvalidInteger(token.into());
        let caps = INTEGER.captures(token).ok_or_else(invalid)?;
        let magnitude = match (caps.get(2), caps.get(3)) {
            (Some(hex), _) => i64::from_str_radix(hex.as_str(), 16),
            (_, Some(dec)) => dec.as_str().parse::<i64>(),
            _ => return Err(invalid()),
        }
        // Only overflow gets here; the pattern already rejected bad digits.
        .map_err(|_| ParseErrorKind::OutOfRange {
            token: token.into(),
            bits: 64,
        })?;
        let value = if &caps[1] == "-" { -magnitude } else { magnitude };
        Ok((token, value))
    }

    /// A two's complement integer of `bits` bits.
    pub fn signed(&self, index: usize, bits: u32) -> Result<i32, ParseErrorKind> {
        let (token, value) = self.integer(index)?;
        if fits_signed(value, bits) {
            Ok(value as i32)
        } else {
            Err(ParseErrorKind::OutOfRange {
                token: token.into(),
                bits,
            })
        }
    }

    /// A non-negative integer of `bits` bits.
    pub fn unsigned(&self, index: usize, bits: u32) -> Result<u32, ParseErrorKind> {
        let (token, value) = self.integer(index)?;
        if fits_unsigned(value, bits) {
            Ok(value as u32)
        } else {
            Err(ParseErrorKind::OutOfRange {
                token: token.into(),
                bits,
            })
        }
    }

    /// An even, signed byte offset of `bits` bits.
    pub fn offset(&self, index: usize, bits: u32) -> Result<i32, ParseErrorKind> {
        let value = self.signed(index, bits)?;
        if value % 2 == 0 {
            Ok(value)
        } else {
            Err(ParseErrorKind::Misaligned(self.tokens[index].into()))
        }
    }
}

/// An assembled program image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    source: String,
    bytes: Vec<u8>,
    ranges: Vec<Range<usize>>,
}

impl Program {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Little-endian instruction words.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte range in `source` of each instruction, in program order.
    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn words(&self) -> impl Iterator<Item = u32> + '_ {
        self.bytes
            .chunks_exact(WORD_SIZE as usize)
            .map(LittleEndian::read_u32)
    }

    /// Source text of the instruction at `index`.
    pub fn line_of(&self, index: usize) -> Option<&str> {
        self.ranges.get(index).map(|range| &self.source[range.clone()])
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Programs are installed as read-only code pages.
impl From<Program> for PageStorage {
    fn from(program: Program) -> PageStorage {
        PageStorage::ReadOnlyImage(program.bytes)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, (word, range)) in self.words().zip(&self.ranges).enumerate() {
            writeln!(
                f,
                "{:08x}: {:08x}  {}",
                i as u32 * WORD_SIZE,
                word,
                &self.source[range.clone()]
            )?;
        }
        Ok(())
    }
}

/// Turns source text into a `Program` using an instruction table.
#[derive(Clone, Copy, Debug)]
pub struct Assembler<'a> {
    instruction_set: &'a InstructionSet,
}

impl Default for Assembler<'static> {
    fn default() -> Self {
        Assembler::new()
    }
}

impl Assembler<'static> {
    /// An assembler for the RV32I table.
    pub fn new() -> Assembler<'static> {
        Assembler::with_instruction_set(rv32i::instruction_set())
    }
}

impl<'a> Assembler<'a> {
    pub fn with_instruction_set(instruction_set: &'a InstructionSet) -> Self {
        Assembler { instruction_set }
    }

    pub fn assemble(&self, source: &str) -> Result<Program, ParseError> {
        let mut bytes = Vec::new();
        let mut ranges = Vec::new();
        let mut line_start = 0;

        for (number, line) in source.split('\n').enumerate() {
            let code = match line.find(';') {
                Some(comment) => &line[..comment],
                None => line,
            };
            let trimmed = code.trim();
            if !trimmed.is_empty() {
                let word = self.assemble_line(trimmed).map_err(|kind| ParseError {
                    line: number + 1,
                    text: trimmed.into(),
                    kind,
                })?;
                debug!("{:3}: {:08x}  {}", number + 1, word, trimmed);

                let mut buf = [0; WORD_SIZE as usize];
                LittleEndian::write_u32(&mut buf, word);
                bytes.extend_from_slice(&buf);

                let offset = line_start + (trimmed.as_ptr() as usize - line.as_ptr() as usize);
                ranges.push(offset..offset + trimmed.len());
            }
            line_start += line.len() + 1;
        }

        Ok(Program {
            source: source.into(),
            bytes,
            ranges,
        })
    }

    /// Encodes one instruction with comments and surrounding blanks removed.
    pub fn assemble_line(&self, line: &str) -> Result<u32, ParseErrorKind> {
        let mut tokens = SEPARATOR.split(line).filter(|t| !t.is_empty());
        let mnemonic = tokens.next().unwrap_or("");
        let descriptor = self
            .instruction_set
            .find(mnemonic)
            .ok_or_else(|| ParseErrorKind::UnknownMnemonic(mnemonic.into()))?;
        let tokens: Vec<&str> = tokens.collect();
        let params = descriptor.read_parameters(&Operands::new(&tokens))?;
        Ok(descriptor.encode(&params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(source: &str) -> Result<Program, ParseError> {
        Assembler::new().assemble(source)
    }

    fn word(line: &str) -> u32 {
        Assembler::new().assemble_line(line).unwrap()
    }

    fn kind(line: &str) -> ParseErrorKind {
        Assembler::new().assemble_line(line).unwrap_err()
    }

    #[test]
    fn canonical_words() {
        assert_eq!(word("ADDI x0 x0 0"), 0x0000_0013);
        assert_eq!(word("ADDI x1 x1 -1"), 0xfff0_8093);
        assert_eq!(word("BNE x1 x2 -4"), 0xfe20_9ee3);
        assert_eq!(word("JAL x0 -8"), 0xff9f_f06f);
        assert_eq!(word("SW x2 x1 -4"), 0xfe20_ae23);
        assert_eq!(word("LUI x5 0x12345000"), 0x1234_52b7);
        assert_eq!(word("ECALL"), 0x0000_0073);
        assert_eq!(word("EBREAK"), 0x0010_0073);
        assert_eq!(word("SRAI x1 x1 3"), 0x4030_d093);
    }

    #[test]
    fn little_endian_bytes() {
        let program = assemble("ADDI x1 x0 1\nEBREAK").unwrap();
        assert_eq!(
            program.bytes(),
            &[0x93, 0x00, 0x10, 0x00, 0x73, 0x00, 0x10, 0x00]
        );
        assert_eq!(program.words().collect::<Vec<_>>(), vec![0x0010_0093, 0x0010_0073]);
    }

    #[test]
    fn comments_and_blank_lines() {
        let program = assemble(
            "
            ; a comment on its own
            ADDI x1 x0 1   ; trailing

               ECALL;tight
            ",
        )
        .unwrap();
        assert_eq!(program.words().count(), 2);
        assert_eq!(program.line_of(0), Some("ADDI x1 x0 1"));
        assert_eq!(program.line_of(1), Some("ECALL"));
    }

    #[test]
    fn source_ranges() {
        let source = "ADDI x1 x0 1\n  JAL x0 -4 ; back\n";
        let program = assemble(source).unwrap();
        assert_eq!(program.ranges(), &[0..12, 15..24]);
        assert_eq!(program.source(), source);
    }

    #[test]
    fn alternative_syntax() {
        assert_eq!(word("ADDI ra, zero, 0x10"), word("ADDI x1 x0 16"));
        assert_eq!(word("ADDI sp,sp,-0x10"), word("ADDI x2 x2 -16"));
        assert_eq!(word("SW a0, fp, 8"), word("SW x10 x8 8"));
        assert_eq!(word("ADDI t0 t0 +5"), word("ADDI x5 x5 5"));
    }

    #[test]
    fn unknown_mnemonic_reports_line() {
        let err = assemble("ADDI x1 x0 1\n\nFOO x1 x2\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.text, "FOO x1 x2");
        assert_eq!(err.kind, ParseErrorKind::UnknownMnemonic("FOO".into()));
        assert_eq!(err.to_string(), "line 3: unknown mnemonic `FOO`: `FOO x1 x2`");
    }

    #[test]
    fn mnemonics_are_case_sensitive() {
        assert_eq!(kind("addi x1 x0 1"), ParseErrorKind::UnknownMnemonic("addi".into()));
    }

    #[test]
    fn operand_errors() {
        assert_eq!(kind("ADDI x1 x32 1"), ParseErrorKind::InvalidRegister("x32".into()));
        assert_eq!(kind("ADDI x1 x0 ten"), ParseErrorKind::InvalidInteger("ten".into()));
        assert_eq!(kind("ADDI x1 x0 0x"), ParseErrorKind::InvalidInteger("0x".into()));
        assert_eq!(
            kind("ADDI x1 x0 2048"),
            ParseErrorKind::OutOfRange {
                token: "2048".into(),
                bits: 12
            }
        );
        assert_eq!(
            kind("SLLI x1 x1 32"),
            ParseErrorKind::OutOfRange {
                token: "32".into(),
                bits: 5
            }
        );
        assert_eq!(kind("BEQ x1 x2 3"), ParseErrorKind::Misaligned("3".into()));
        assert_eq!(
            kind("ADDI x1 x0"),
            ParseErrorKind::WrongOperandCount {
                expected: 3,
                found: 2
            }
        );
        assert_eq!(
            kind("ECALL x0"),
            ParseErrorKind::WrongOperandCount {
                expected: 0,
                found: 1
            }
        );
        assert!(matches!(
            kind("ADDI x1 x0 99999999999999999999"),
            ParseErrorKind::OutOfRange { bits: 64, .. }
        ));
    }

    #[test]
    fn upper_immediate_drops_low_bits() {
        assert_eq!(word("LUI x1 200"), word("LUI x1 0"));
        assert_eq!(word("LUI x1 0x1fff"), word("LUI x1 0x1000"));
    }

    #[test]
    fn disassembly_round_trip() {
        let source = "\
ADDI x1 x2 -7
SLTIU x3 x4 9
SRAI x5 x6 31
LUI x7 4096
AUIPC x8 8192
JAL x1 -2048
JALR x0 x1 0
BGEU x9 x10 100
LHU x11 x12 -2
SB x13 x14 2047
ECALL
EBREAK";
        let program = assemble(source).unwrap();
        let set = rv32i::instruction_set();
        let listing: Vec<String> = program
            .words()
            .map(|w| set.decode(w).unwrap().to_string())
            .collect();
        assert_eq!(listing, source.lines().collect::<Vec<_>>());
    }

    #[test]
    fn program_becomes_read_only_page() {
        let program = assemble("ECALL").unwrap();
        let storage: PageStorage = program.clone().into();
        assert_eq!(storage, PageStorage::ReadOnlyImage(program.into_bytes()));
    }
}
