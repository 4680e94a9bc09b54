//! Failures that stop a processor.

use thiserror::Error;

use crate::instruction::DecodeError;
use crate::memory::MemoryError;
use crate::processor::{HookError, Status};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Exception {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("hook failed at pc {pc:#010x}: {source}")]
    Hook { pc: u32, source: HookError },

    #[error("processor is {0:?}")]
    NotRunning(Status),
}

impl Exception {
    /// A guard page was touched. Such a run must not be resumed or retried.
    pub fn is_fatal_trap(&self) -> bool {
        match self {
            Exception::Memory(err) => err.is_fatal_trap(),
            _ => false,
        }
    }
}
