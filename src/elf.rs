//! Loading statically linked RV32 ELF executables into paged memory.

use goblin::elf::header::EM_RISCV;
use goblin::elf::program_header::{PF_W, PT_LOAD};
use goblin::elf::Elf;
use log::debug;
use std::ops::Range;
use thiserror::Error;

use crate::consts::ADDRESS_SPACE_SIZE;
use crate::memory::{Memory, MemoryError, PageStorage};

/// A loaded executable, ready to run.
#[derive(Clone, Debug)]
pub struct Image {
    pub memory: Memory,
    pub entry: u32,
    /// Top of the stack pages. A stack ending at 2^32 wraps to 0.
    pub stack_pointer: u32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("not an ELF file: {0}")]
    Parse(#[from] goblin::error::Error),

    #[error("expected a 32-bit little-endian ELF")]
    WrongClass,

    #[error("expected a RISC-V executable, found machine {0}")]
    WrongMachine(u16),

    #[error("no loadable segments")]
    NoSegments,

    #[error("segment at {vaddr:#010x} points outside the file")]
    Truncated { vaddr: u64 },

    #[error("segment at {vaddr:#010x} does not fit in a 32-bit address space")]
    AddressOverflow { vaddr: u64 },

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

#[derive(Debug)]
struct Segment<'a> {
    range: Range<u64>,
    data: &'a [u8],
    writable: bool,
}

impl Segment<'_> {
    fn overlaps(&self, page: &Range<u64>) -> bool {
        self.range.start < page.end && page.start < self.range.end
    }

    /// Copies the file-backed part of this segment that falls in `page`.
    fn copy_into(&self, page: &Range<u64>, buf: &mut [u8]) {
        let file_end = self.range.start + self.data.len() as u64;
        let start = self.range.start.max(page.start);
        let end = file_end.min(page.end);
        if start >= end {
            return;
        }
        let src = (start - self.range.start) as usize..(end - self.range.start) as usize;
        let dst = (start - page.start) as usize..(end - page.start) as usize;
        buf[dst].copy_from_slice(&self.data[src]);
    }
}

fn segments<'a>(elf: &Elf, bytes: &'a [u8]) -> Result<Vec<Segment<'a>>, LoadError> {
    let mut segments = Vec::new();
    for header in elf.program_headers.iter().filter(|h| h.p_type == PT_LOAD) {
        let vaddr = header.p_vaddr;
        let end = vaddr
            .checked_add(header.p_memsz)
            .filter(|&end| end <= ADDRESS_SPACE_SIZE)
            .ok_or(LoadError::AddressOverflow { vaddr })?;
        let data = header
            .p_offset
            .checked_add(header.p_filesz)
            .filter(|_| header.p_filesz <= header.p_memsz)
            .and_then(|file_end| bytes.get(header.p_offset as usize..file_end as usize))
            .ok_or(LoadError::Truncated { vaddr })?;
        debug!(
            "segment {:08x}..{:08x} file {:#x} flags {:#x}",
            vaddr, end, header.p_filesz, header.p_flags
        );
        if vaddr < end {
            segments.push(Segment {
                range: vaddr..end,
                data,
                writable: header.p_flags & PF_W != 0,
            });
        }
    }
    Ok(segments)
}

/// Builds an address space from `bytes`.
///
/// Pages are laid out from address 0. A page touched by a writable segment
/// becomes RAM, one touched only by other segments a read-only image, and
/// one no segment touches reads as zero. `stack_pages` pages of RAM follow
/// the last segment, then a guard page.
pub fn load(bytes: &[u8], page_size: u32, stack_pages: u32) -> Result<Image, LoadError> {
    let elf = Elf::parse(bytes)?;
    if elf.is_64 || !elf.little_endian {
        return Err(LoadError::WrongClass);
    }
    if elf.header.e_machine != EM_RISCV {
        return Err(LoadError::WrongMachine(elf.header.e_machine));
    }

    let segments = segments(&elf, bytes)?;
    let top = segments
        .iter()
        .map(|s| s.range.end)
        .max()
        .ok_or(LoadError::NoSegments)?;

    let mut memory = Memory::new(page_size);
    let size = u64::from(page_size);
    let mut start = 0;
    while start < top {
        let page = start..start + size;
        let touching: Vec<&Segment> = segments.iter().filter(|s| s.overlaps(&page)).collect();
        let storage = if touching.is_empty() {
            PageStorage::AllZero
        } else {
            let mut buf = vec![0; page_size as usize];
            for segment in &touching {
                segment.copy_into(&page, &mut buf);
            }
            if touching.iter().any(|s| s.writable) {
                PageStorage::Ram(buf)
            } else {
                PageStorage::ReadOnlyImage(buf)
            }
        };
        memory.insert(storage)?;
        start += size;
    }
    for _ in 0..stack_pages {
        memory.insert(PageStorage::zeroed_ram(page_size))?;
    }
    let stack_pointer = memory.end() as u32;
    debug!("stack below {:08x}", memory.end());
    // Nothing past the top of the address space to guard.
    if memory.end() < ADDRESS_SPACE_SIZE {
        memory.insert(PageStorage::Guard)?;
    }

    Ok(Image {
        memory,
        entry: elf.entry as u32,
        stack_pointer,
    })
}
