//! Fetch-decode-execute loop.

use log::{error, trace, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::consts::INSTRUCTION_SIZE;
use crate::exception::Exception;
use crate::instruction::InstructionSet;
use crate::memory::{Memory, Width};
use crate::register::RegisterFile;
use crate::rv32i;

/// Architectural state an instruction acts on.
#[derive(Clone, Debug)]
pub struct Machine {
    pub pc: u32,
    pub registers: RegisterFile,
    pub memory: Memory,
}

impl Machine {
    pub fn new(memory: Memory) -> Machine {
        Machine {
            pc: 0,
            registers: RegisterFile::new(),
            memory,
        }
    }

    /// Moves past the current instruction.
    pub fn advance(&mut self) {
        self.pc = self.pc.wrapping_add(INSTRUCTION_SIZE);
    }

    /// Address of the instruction after the current one.
    pub fn next_pc(&self) -> u32 {
        self.pc.wrapping_add(INSTRUCTION_SIZE)
    }

    /// Moves by a signed byte offset from the current instruction.
    pub fn jump_relative(&mut self, offset: i32) {
        self.pc = self.pc.wrapping_add(offset as u32);
    }
}

/// Failure reported by a host hook.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(message: impl Into<String>) -> HookError {
        HookError(message.into())
    }
}

pub type Hook = Box<dyn FnMut(&mut Machine) -> Result<(), HookError>>;

/// Host callables run synchronously on ECALL and EBREAK.
pub struct Hooks {
    system_call: Hook,
    system_break: Hook,
}

impl Default for Hooks {
    fn default() -> Self {
        Hooks {
            system_call: Box::new(|_| Ok(())),
            system_break: Box::new(|_| Ok(())),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Hooks")
    }
}

impl Hooks {
    pub fn system_call(&mut self, machine: &mut Machine) -> Result<(), HookError> {
        (self.system_call)(machine)
    }

    pub fn system_break(&mut self, machine: &mut Machine) -> Result<(), HookError> {
        (self.system_break)(machine)
    }
}

/// Shared flag a host sets to stop a running processor.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Running,
    /// Stopped by the host. Terminal.
    Halted,
    /// Stopped by an exception. Terminal.
    Faulted,
}

/// How a bounded run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Halted,
    BudgetExhausted,
}

/// A single RV32I hart.
pub struct Processor<'a> {
    machine: Machine,
    instruction_set: &'a InstructionSet,
    hooks: Hooks,
    status: Status,
    fault: Option<Exception>,
    steps: u64,
    stop: StopHandle,
}

impl fmt::Display for Processor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "step: {} | pc: {:08x} | status: {:?} | regs: {}",
            self.steps, self.machine.pc, self.status, self.machine.registers
        )
    }
}

impl Processor<'static> {
    /// Constructs a processor over `memory` using the RV32I instruction table.
    pub fn new(memory: Memory) -> Processor<'static> {
        Processor::with_instruction_set(memory, rv32i::instruction_set())
    }
}

impl<'a> Processor<'a> {
    pub fn with_instruction_set(memory: Memory, instruction_set: &'a InstructionSet) -> Self {
        Processor {
            machine: Machine::new(memory),
            instruction_set,
            hooks: Hooks::default(),
            status: Status::Running,
            fault: None,
            steps: 0,
            stop: StopHandle::default(),
        }
    }

    pub fn on_system_call<F>(&mut self, hook: F)
    where
        F: FnMut(&mut Machine) -> Result<(), HookError> + 'static,
    {
        self.hooks.system_call = Box::new(hook);
    }

    pub fn on_system_break<F>(&mut self, hook: F)
    where
        F: FnMut(&mut Machine) -> Result<(), HookError> + 'static,
    {
        self.hooks.system_break = Box::new(hook);
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    pub fn pc(&self) -> u32 {
        self.machine.pc
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.machine.pc = pc;
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.machine.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.machine.registers
    }

    pub fn memory(&self) -> &Memory {
        &self.machine.memory
    }

    pub fn instruction_set(&self) -> &'a InstructionSet {
        self.instruction_set
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// The exception that faulted the processor, if it has.
    pub fn fault(&self) -> Option<&Exception> {
        self.fault.as_ref()
    }

    /// Instructions retired so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stops a running processor for good.
    pub fn halt(&mut self) {
        if self.status == Status::Running {
            self.status = Status::Halted;
        }
    }

    /// Executes one instruction. On failure no register or pc change of the
    /// failing instruction is committed and the processor is left `Faulted`.
    /// This covers changes a failing hook made to registers or pc; memory a
    /// hook wrote before failing is kept.
    pub fn step(&mut self) -> Result<(), Exception> {
        if self.status != Status::Running {
            return Err(Exception::NotRunning(self.status));
        }
        match self.fetch_and_execute() {
            Ok(()) => {
                self.steps += 1;
                Ok(())
            }
            Err(exception) => {
                if exception.is_fatal_trap() {
                    error!("trap at pc {:08x}: {}", self.machine.pc, exception);
                } else {
                    warn!("fault at pc {:08x}: {}", self.machine.pc, exception);
                }
                self.status = Status::Faulted;
                self.fault = Some(exception.clone());
                Err(exception)
            }
        }
    }

    fn fetch_and_execute(&mut self) -> Result<(), Exception> {
        let pc = self.machine.pc;
        let word = self.machine.memory.peek(Width::Word, pc)?;
        let instruction_set = self.instruction_set;
        let inst = instruction_set.decode(word)?;
        trace!(
            "#{} | pc: {:08x} | val: {:08x} | inst: {}",
            self.steps,
            pc,
            word,
            inst
        );
        inst.execute(&mut self.machine, &mut self.hooks)
    }

    fn check_stop(&mut self) {
        if self.stop.is_requested() {
            self.halt();
        }
    }

    /// Steps until the host stops the processor or an instruction fails.
    pub fn run(&mut self) -> Result<(), Exception> {
        loop {
            self.check_stop();
            if self.status == Status::Halted {
                return Ok(());
            }
            self.step()?;
        }
    }

    /// Like `run`, but gives up after `max_steps` instructions and leaves the
    /// processor `Running`.
    pub fn run_for(&mut self, max_steps: u64) -> Result<RunOutcome, Exception> {
        for _ in 0..max_steps {
            self.check_stop();
            if self.status == Status::Halted {
                return Ok(RunOutcome::Halted);
            }
            self.step()?;
        }
        self.check_stop();
        if self.status == Status::Halted {
            Ok(RunOutcome::Halted)
        } else {
            Ok(RunOutcome::BudgetExhausted)
        }
    }
}
