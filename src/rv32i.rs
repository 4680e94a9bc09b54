//! The RV32I instruction table.
//!
//! Covers the immediate ALU operations, upper immediates, jumps, branches,
//! loads, stores and the two environment instructions. Register-register
//! operations, fences and CSR access are not part of this table.

use lazy_static::lazy_static;
use log::debug;

use crate::alu::{self, Condition, Operation};
use crate::bits::sign_extend;
use crate::exception::Exception;
use crate::format::{BranchParams, ImmediateParams, JumpParams, StoreParams, UpperParams};
use crate::instruction::{Descriptor, InstructionSet, Locator, Opcode, Semantics};
use crate::memory::Width;
use crate::processor::{HookError, Hooks, Machine};

lazy_static! {
    static ref RV32I: InstructionSet =
        InstructionSet::new(descriptors()).expect("RV32I table has overlapping entries");
}

/// The shared RV32I table.
pub fn instruction_set() -> &'static InstructionSet {
    &RV32I
}

fn op_imm(m: &mut Machine, p: ImmediateParams, op: Operation) -> Result<(), Exception> {
    let value = alu::alu(op, m.registers.read(p.rs1), p.imm as u32);
    m.registers.write(p.rd, value);
    m.advance();
    Ok(())
}

fn branch(m: &mut Machine, p: BranchParams, cond: Condition) -> Result<(), Exception> {
    if alu::compare(cond, m.registers.read(p.rs1), m.registers.read(p.rs2)) {
        m.jump_relative(p.imm);
    } else {
        m.advance();
    }
    Ok(())
}

fn load(m: &mut Machine, p: ImmediateParams, width: Width, signed: bool) -> Result<(), Exception> {
    let address = m.registers.read(p.rs1).wrapping_add(p.imm as u32);
    let raw = m.memory.peek(width, address)?;
    let value = if signed {
        sign_extend(raw, width.bits()) as u32
    } else {
        raw
    };
    m.registers.write(p.rd, value);
    m.advance();
    Ok(())
}

fn store(m: &mut Machine, p: StoreParams, width: Width) -> Result<(), Exception> {
    let address = m.registers.read(p.rs1).wrapping_add(p.imm as u32);
    m.memory.poke(width, address, m.registers.read(p.rs2))?;
    m.advance();
    Ok(())
}

fn lui(m: &mut Machine, _: &mut Hooks, p: UpperParams) -> Result<(), Exception> {
    m.registers.write(p.rd, p.imm);
    m.advance();
    Ok(())
}

fn auipc(m: &mut Machine, _: &mut Hooks, p: UpperParams) -> Result<(), Exception> {
    m.registers.write(p.rd, m.pc.wrapping_add(p.imm));
    m.advance();
    Ok(())
}

fn jal(m: &mut Machine, _: &mut Hooks, p: JumpParams) -> Result<(), Exception> {
    m.registers.write(p.rd, m.next_pc());
    m.jump_relative(p.imm);
    Ok(())
}

fn jalr(m: &mut Machine, _: &mut Hooks, p: ImmediateParams) -> Result<(), Exception> {
    // Target first: rd may be rs1.
    let target = m.registers.read(p.rs1).wrapping_add(p.imm as u32) & !1;
    m.registers.write(p.rd, m.next_pc());
    m.pc = target;
    Ok(())
}

/// Runs a host hook for the instruction at pc. A failing hook leaves the
/// registers and pc as they were before the call.
fn call_hook<F>(m: &mut Machine, hook: F) -> Result<(), Exception>
where
    F: FnOnce(&mut Machine) -> Result<(), HookError>,
{
    let pc = m.pc;
    let registers = m.registers.clone();
    if let Err(source) = hook(m) {
        m.pc = pc;
        m.registers = registers;
        return Err(Exception::Hook { pc, source });
    }
    m.advance();
    Ok(())
}

fn ecall(m: &mut Machine, hooks: &mut Hooks, _: ImmediateParams) -> Result<(), Exception> {
    debug!("system call at {:08x}", m.pc);
    call_hook(m, |m| hooks.system_call(m))
}

fn ebreak(m: &mut Machine, hooks: &mut Hooks, _: ImmediateParams) -> Result<(), Exception> {
    debug!("system break at {:08x}", m.pc);
    call_hook(m, |m| hooks.system_break(m))
}

fn descriptors() -> Vec<Descriptor> {
    use self::Opcode::*;

    fn d(
        mnemonic: &'static str,
        opcode: Opcode,
        locator: Locator,
        semantics: Semantics,
    ) -> Descriptor {
        Descriptor {
            mnemonic,
            opcode,
            locator,
            semantics,
        }
    }

    vec![
        // Operations on immediates
        d(
            "ADDI",
            OpImm,
            Locator::Funct3(0b000),
            Semantics::Immediate(|m, _, p| op_imm(m, p, Operation::Add)),
        ),
        d(
            "SLTI",
            OpImm,
            Locator::Funct3(0b010),
            Semantics::Immediate(|m, _, p| op_imm(m, p, Operation::Slt)),
        ),
        d(
            "SLTIU",
            OpImm,
            Locator::Funct3(0b011),
            Semantics::Immediate(|m, _, p| op_imm(m, p, Operation::Sltu)),
        ),
        d(
            "XORI",
            OpImm,
            Locator::Funct3(0b100),
            Semantics::Immediate(|m, _, p| op_imm(m, p, Operation::Xor)),
        ),
        d(
            "ORI",
            OpImm,
            Locator::Funct3(0b110),
            Semantics::Immediate(|m, _, p| op_imm(m, p, Operation::Or)),
        ),
        d(
            "ANDI",
            OpImm,
            Locator::Funct3(0b111),
            Semantics::Immediate(|m, _, p| op_imm(m, p, Operation::And)),
        ),
        d(
            "SLLI",
            OpImm,
            Locator::Funct3Funct7(0b001, 0b000_0000),
            Semantics::Immediate(|m, _, p| op_imm(m, p, Operation::Sll)),
        ),
        d(
            "SRLI",
            OpImm,
            Locator::Funct3Funct7(0b101, 0b000_0000),
            Semantics::Immediate(|m, _, p| op_imm(m, p, Operation::Srl)),
        ),
        d(
            "SRAI",
            OpImm,
            Locator::Funct3Funct7(0b101, 0b010_0000),
            Semantics::Immediate(|m, _, p| op_imm(m, p, Operation::Sra)),
        ),
        // Upper immediates
        d("LUI", Lui, Locator::None, Semantics::Upper(lui)),
        d("AUIPC", AuiPc, Locator::None, Semantics::Upper(auipc)),
        // Jumps
        d("JAL", Jal, Locator::None, Semantics::Jump(jal)),
        d("JALR", Jalr, Locator::Funct3(0b000), Semantics::Immediate(jalr)),
        // Branches
        d(
            "BEQ",
            Branch,
            Locator::Funct3(0b000),
            Semantics::Branch(|m, _, p| branch(m, p, Condition::Eq)),
        ),
        d(
            "BNE",
            Branch,
            Locator::Funct3(0b001),
            Semantics::Branch(|m, _, p| branch(m, p, Condition::Ne)),
        ),
        d(
            "BLT",
            Branch,
            Locator::Funct3(0b100),
            Semantics::Branch(|m, _, p| branch(m, p, Condition::Lt)),
        ),
        d(
            "BGE",
            Branch,
            Locator::Funct3(0b101),
            Semantics::Branch(|m, _, p| branch(m, p, Condition::Ge)),
        ),
        d(
            "BLTU",
            Branch,
            Locator::Funct3(0b110),
            Semantics::Branch(|m, _, p| branch(m, p, Condition::Ltu)),
        ),
        d(
            "BGEU",
            Branch,
            Locator::Funct3(0b111),
            Semantics::Branch(|m, _, p| branch(m, p, Condition::Geu)),
        ),
        // Loads
        d(
            "LB",
            Load,
            Locator::Funct3(0b000),
            Semantics::Immediate(|m, _, p| load(m, p, Width::Byte, true)),
        ),
        d(
            "LH",
            Load,
            Locator::Funct3(0b001),
            Semantics::Immediate(|m, _, p| load(m, p, Width::Half, true)),
        ),
        d(
            "LW",
            Load,
            Locator::Funct3(0b010),
            Semantics::Immediate(|m, _, p| load(m, p, Width::Word, false)),
        ),
        d(
            "LBU",
            Load,
            Locator::Funct3(0b100),
            Semantics::Immediate(|m, _, p| load(m, p, Width::Byte, false)),
        ),
        d(
            "LHU",
            Load,
            Locator::Funct3(0b101),
            Semantics::Immediate(|m, _, p| load(m, p, Width::Half, false)),
        ),
        // Stores
        d(
            "SB",
            Store,
            Locator::Funct3(0b000),
            Semantics::Store(|m, _, p| store(m, p, Width::Byte)),
        ),
        d(
            "SH",
            Store,
            Locator::Funct3(0b001),
            Semantics::Store(|m, _, p| store(m, p, Width::Half)),
        ),
        d(
            "SW",
            Store,
            Locator::Funct3(0b010),
            Semantics::Store(|m, _, p| store(m, p, Width::Word)),
        ),
        // Environment
        d("ECALL", System, Locator::Funct3Funct12(0b000, 0x000), Semantics::Immediate(ecall)),
        d("EBREAK", System, Locator::Funct3Funct12(0b000, 0x001), Semantics::Immediate(ebreak)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::Assembler;
    use crate::consts::NOP;
    use crate::format::{Format, Parameters};
    use crate::memory::{Memory, PageStorage};
    use crate::processor::Processor;
    use crate::register::RegisterName;

    fn x(index: u8) -> RegisterName {
        RegisterName::new(index).unwrap()
    }

    /// Runs `source` from address 0 of a single RAM page until it falls off
    /// the end of the program, with `setup` applied to the registers first.
    fn run(source: &str, setup: &[(u8, u32)]) -> Processor<'static> {
        let program = Assembler::new().assemble(source).unwrap();
        let mut bytes = program.bytes().to_vec();
        bytes.resize(1024, 0);
        let mut memory = Memory::new(1024);
        memory.insert(PageStorage::Ram(bytes)).unwrap();
        let mut p = Processor::new(memory);
        for &(reg, value) in setup {
            p.registers_mut().write(x(reg), value);
        }
        let end = program.bytes().len() as u32;
        while p.pc() < end {
            p.step().unwrap();
        }
        p
    }

    fn operand_samples(format: Format) -> Vec<Parameters> {
        let regs = [0u8, 1, 15, 31];
        let mut samples = Vec::new();
        for &a in &regs {
            for &b in &regs {
                match format {
                    Format::Immediate => {
                        for &imm in &[0, 1, -1, 2047, -2048] {
                            samples.push(Parameters::Immediate(ImmediateParams {
                                rd: x(a),
                                rs1: x(b),
                                imm,
                            }));
                        }
                    }
                    Format::Store => {
                        for &imm in &[0, 1, -1, 2047, -2048] {
                            samples.push(Parameters::Store(StoreParams {
                                rs1: x(a),
                                rs2: x(b),
                                imm,
                            }));
                        }
                    }
                    Format::Branch => {
                        for &imm in &[0, 2, -2, 4094, -4096] {
                            samples.push(Parameters::Branch(BranchParams {
                                rs1: x(a),
                                rs2: x(b),
                                imm,
                            }));
                        }
                    }
                    Format::Jump => {
                        for &imm in &[0, 2, -2, 1 << 19, -(1 << 19), 1_048_574, -1_048_576] {
                            samples.push(Parameters::Jump(JumpParams { rd: x(a), imm }));
                        }
                    }
                    Format::Upper => {
                        for &imm in &[0, 0x1000, 0xffff_f000, 0x7fff_f000] {
                            samples.push(Parameters::Upper(UpperParams { rd: x(a), imm }));
                        }
                    }
                }
            }
        }
        samples
    }

    #[test]
    fn table_is_consistent() {
        assert_eq!(instruction_set().descriptors().len(), 29);
        assert!(InstructionSet::new(descriptors()).is_ok());
    }

    #[test]
    fn encode_decode_round_trip() {
        let set = instruction_set();
        for descriptor in set.descriptors() {
            let samples: Vec<Parameters> = match descriptor.mnemonic {
                "ECALL" | "EBREAK" => vec![descriptor.decode_parameters(descriptor.pattern().1)],
                "SLLI" | "SRLI" | "SRAI" => [0, 1, 17, 31]
                    .iter()
                    .map(|&imm| {
                        Parameters::Immediate(ImmediateParams {
                            rd: x(3),
                            rs1: x(4),
                            imm,
                        })
                    })
                    .collect(),
                _ => operand_samples(descriptor.format()),
            };
            for params in samples {
                let word = descriptor.encode(&params);
                let decoded = set.decode(word).unwrap();
                assert_eq!(decoded.mnemonic(), descriptor.mnemonic, "{:08x}", word);
                assert_eq!(decoded.parameters(), params, "{}", descriptor.mnemonic);
            }
        }
    }

    #[test]
    fn canonical_words() {
        let set = instruction_set();
        let cases: &[(u32, &str)] = &[
            (NOP, "ADDI x0 x0 0"),
            (0x0000_0073, "ECALL"),
            (0x0010_0073, "EBREAK"),
            (0x4030_d093, "SRAI x1 x1 3"),
            (0x0030_d093, "SRLI x1 x1 3"),
            (0x0001_0117, "AUIPC x2 65536"),
            (0x0000_8067, "JALR x0 x1 0"),
            (0xfe20_ae23, "SW x2 x1 -4"),
            (0x0040_c183, "LBU x3 x1 4"),
        ];
        for &(word, text) in cases {
            assert_eq!(set.decode(word).unwrap().to_string(), text);
        }
    }

    #[test]
    fn immediate_logic_sign_extends() {
        let p = run(
            "
            ANDI x2 x1 -1
            ORI x3 x0 -2048
            XORI x4 x1 -1
            SLTI x5 x6 -1
            SLTIU x7 x0 -1
            ",
            &[(1, 0x1234_5678), (6, 0x8000_0000)],
        );
        assert_eq!(p.registers().read(x(2)), 0x1234_5678);
        assert_eq!(p.registers().read(x(3)), 0xffff_f800);
        assert_eq!(p.registers().read(x(4)), !0x1234_5678);
        assert_eq!(p.registers().read(x(5)), 1);
        assert_eq!(p.registers().read(x(7)), 1);
    }

    #[test]
    fn shifts() {
        let p = run(
            "
            SLLI x2 x1 4
            SRLI x3 x1 4
            SRAI x4 x1 4
            ",
            &[(1, 0x8000_00f0)],
        );
        assert_eq!(p.registers().read(x(2)), 0x0000_0f00);
        assert_eq!(p.registers().read(x(3)), 0x0800_000f);
        assert_eq!(p.registers().read(x(4)), 0xf800_000f);
    }

    #[test]
    fn upper_immediates() {
        let p = run(
            "
            LUI x1 0x12345000
            ADDI x0 x0 0
            AUIPC x2 4096
            ",
            &[],
        );
        assert_eq!(p.registers().read(x(1)), 0x1234_5000);
        assert_eq!(p.registers().read(x(2)), 8 + 4096);
    }

    #[test]
    fn jumps_link() {
        let p = run(
            "
            JAL x1 8
            ADDI x5 x0 1
            JALR x2 x1 8
            ADDI x6 x0 1
            ",
            &[],
        );
        // JAL skips the first ADDI; JALR jumps to 4 + 8 = 12, the second ADDI.
        assert_eq!(p.registers().read(x(1)), 4);
        assert_eq!(p.registers().read(x(2)), 12);
        assert_eq!(p.registers().read(x(5)), 0);
        assert_eq!(p.registers().read(x(6)), 1);
    }

    #[test]
    fn jalr_clears_low_bit_and_reads_rs1_before_linking() {
        let p = run(
            "
            JALR x1 x1 3
            ADDI x5 x0 1
            ADDI x6 x0 1
            ",
            &[(1, 5)],
        );
        // (5 + 3) & !1 = 8
        assert_eq!(p.registers().read(x(1)), 4);
        assert_eq!(p.registers().read(x(5)), 0);
        assert_eq!(p.registers().read(x(6)), 1);
    }

    #[test]
    fn branch_conditions() {
        let taken = |mnemonic: &str, a: u32, b: u32| {
            let source = format!("{} x1 x2 8\nADDI x3 x0 1\nADDI x4 x0 1", mnemonic);
            let p = run(&source, &[(1, a), (2, b)]);
            p.registers().read(x(3)) == 0
        };
        let minus_one = -1i32 as u32;
        assert!(taken("BEQ", 3, 3));
        assert!(!taken("BEQ", 3, 4));
        assert!(taken("BNE", 3, 4));
        assert!(taken("BLT", minus_one, 0));
        assert!(!taken("BLTU", minus_one, 0));
        assert!(taken("BGE", 0, minus_one));
        assert!(taken("BGEU", minus_one, 0));
        assert!(!taken("BGE", minus_one, 0));
    }

    #[test]
    fn backward_branch() {
        let p = run(
            "
            ADDI x1 x1 1
            BLT x1 x2 -4
            ",
            &[(2, 10)],
        );
        assert_eq!(p.registers().read(x(1)), 10);
    }

    #[test]
    fn loads_extend() {
        let p = run(
            "
            SW x2 x0 512
            LB x3 x0 512
            LBU x4 x0 512
            LH x5 x0 512
            LHU x6 x0 512
            LW x7 x0 512
            ",
            &[(2, 0xffff_8081)],
        );
        assert_eq!(p.registers().read(x(3)), 0xffff_ff81);
        assert_eq!(p.registers().read(x(4)), 0x81);
        assert_eq!(p.registers().read(x(5)), 0xffff_8081);
        assert_eq!(p.registers().read(x(6)), 0x8081);
        assert_eq!(p.registers().read(x(7)), 0xffff_8081);
    }

    #[test]
    fn narrow_stores() {
        let p = run(
            "
            SW x1 x0 512
            SB x2 x0 512
            SH x2 x0 514
            LW x3 x0 512
            ",
            &[(1, 0xffff_ffff), (2, 0x1234_5678)],
        );
        assert_eq!(p.registers().read(x(3)), 0x5678_ff78);
    }

    #[test]
    fn writes_to_x0_are_dropped() {
        let p = run("ADDI x0 x0 7\nLUI x0 4096\nJAL x0 4", &[]);
        assert_eq!(p.registers().read(RegisterName::ZERO), 0);
    }
}
