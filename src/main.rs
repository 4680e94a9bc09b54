//! A RISC-V 32I emulator.

use lazy_static::lazy_static;
use log::{error, info, LevelFilter};
use rv32i_emulator::assembler::Assembler;
use rv32i_emulator::consts;
use rv32i_emulator::elf;
use rv32i_emulator::memory::{Memory, PageStorage};
use rv32i_emulator::processor::{HookError, Machine, Processor, RunOutcome, StopHandle};
use rv32i_emulator::register::{RegisterFile, RegisterName};
use std::cell::Cell;
use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "rvemu")]
struct Opt {
    #[structopt(parse(from_os_str))]
    /// Assembly source, one instruction per line
    input: PathBuf,
    #[structopt(long = "elf")]
    /// Treats the input as an RV32 ELF executable
    elf: bool,
    #[structopt(long = "page-size")]
    /// Page size in bytes [default: 4096]
    page_size: Option<u32>,
    #[structopt(long = "ram-pages", default_value = "1")]
    /// RAM pages placed after the program; sp starts at their top
    ram_pages: u32,
    #[structopt(long = "max-steps")]
    /// Stops after this many instructions
    max_steps: Option<u64>,
    #[structopt(long = "print-steps")]
    /// Prints every executed instruction
    print_steps: bool,
    #[structopt(long = "dump")]
    /// Prints registers and the page table when the run ends
    dump: bool,
}

lazy_static! {
    static ref OPTS: Opt = Opt::from_args();
}

/// Zero page, code, RAM, guard page. Returns the memory, the entry point and
/// the top of RAM.
fn assembled_image(source: &str, page_size: u32) -> Result<(Memory, u32, u32), Box<dyn Error>> {
    let program = Assembler::new().assemble(source)?;
    let mut memory = Memory::new(page_size);
    memory.insert(PageStorage::AllZero)?;
    let code = memory.insert_image(program.bytes(), false)?;
    for _ in 0..OPTS.ram_pages {
        memory.insert(PageStorage::zeroed_ram(page_size))?;
    }
    let stack_top = memory.end() as u32;
    memory.insert(PageStorage::Guard)?;
    Ok((memory, code.start as u32, stack_top))
}

fn system_call(
    machine: &mut Machine,
    stop: &StopHandle,
    exit_code: &Cell<i32>,
) -> Result<(), HookError> {
    let syscall_num = machine
        .registers
        .read(RegisterName::from_field(consts::SYSCALL_NUM_REG.into()));
    let arg = machine
        .registers
        .read(RegisterName::from_field(consts::SYSCALL_ARG1_REG.into()));
    let io_error = |e: io::Error| HookError::new(format!("system call {}: {}", syscall_num, e));

    let result = match syscall_num {
        consts::SYSCALL_PRINT_INT => {
            let text = (arg as i32).to_string();
            io::stdout().write_all(text.as_bytes()).map_err(io_error)?;
            text.len() as u32
        }
        consts::SYSCALL_PRINT_CHAR => {
            io::stdout().write_all(&[arg as u8]).map_err(io_error)?;
            1
        }
        consts::SYSCALL_EXIT => {
            stop.request();
            0
        }
        consts::SYSCALL_EXIT_CODE => {
            exit_code.set(arg as i32);
            stop.request();
            arg
        }
        _ => return Err(HookError::new(format!("unknown system call {}", syscall_num))),
    };
    io::stdout().flush().map_err(io_error)?;
    machine
        .registers
        .write(RegisterName::from_field(consts::SYSCALL_RET_REG.into()), result);
    Ok(())
}

fn run() -> Result<i32, Box<dyn Error>> {
    let page_size = OPTS.page_size.unwrap_or(consts::DEFAULT_PAGE_SIZE);
    if page_size == 0 || page_size % consts::WORD_SIZE != 0 {
        return Err(format!("page size {} is not a positive multiple of 4", page_size).into());
    }

    let bytes = fs::read(&OPTS.input)?;
    let (memory, entry, stack_top) = if OPTS.elf {
        let image = elf::load(&bytes, page_size, OPTS.ram_pages)?;
        (image.memory, image.entry, image.stack_pointer)
    } else {
        assembled_image(&String::from_utf8(bytes)?, page_size)?
    };

    let mut processor = Processor::new(memory);
    processor.set_pc(entry);
    *processor.registers_mut() = RegisterFile::with_stack_pointer(stack_top);

    let exit_code = Rc::new(Cell::new(0));
    let stop = processor.stop_handle();
    let code = Rc::clone(&exit_code);
    processor.on_system_call(move |machine| system_call(machine, &stop, &code));
    let stop = processor.stop_handle();
    processor.on_system_break(move |_| {
        stop.request();
        Ok(())
    });

    info!("running {} from {:08x}", OPTS.input.display(), entry);
    let result = match OPTS.max_steps {
        Some(max_steps) => processor.run_for(max_steps),
        None => processor.run().map(|_| RunOutcome::Halted),
    };
    info!("stopped after {} steps: {:?}", processor.steps(), processor.status());

    if OPTS.dump {
        eprintln!("{}", processor);
        eprint!("{}", processor.memory());
    }

    match result? {
        RunOutcome::Halted => Ok(exit_code.get()),
        RunOutcome::BudgetExhausted => {
            Err(format!("no exit after {} steps", processor.steps()).into())
        }
    }
}

fn main() {
    let mut logger = env_logger::Builder::from_default_env();
    if OPTS.print_steps {
        logger.filter_module("rv32i_emulator::processor", LevelFilter::Trace);
    }
    logger.init();

    match run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            error!("{}", err);
            process::exit(1);
        }
    }
}
