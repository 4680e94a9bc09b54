//! Emulator components for the RISC-V 32I instruction set.
//!
//! Source text goes through the [`assembler`] into a [`assembler::Program`],
//! which is installed as a page of [`memory::Memory`] and run by a
//! [`processor::Processor`] that decodes words through an
//! [`instruction::InstructionSet`].

pub mod alu;
pub mod assembler;
pub mod bits;
pub mod consts;
pub mod elf;
pub mod exception;
pub mod format;
pub mod instruction;
pub mod memory;
pub mod processor;
pub mod register;
pub mod rv32i;
