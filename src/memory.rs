//! Paged address space.
//!
//! Pages are laid out back to back from address zero in insertion order. Every
//! page has the same size and owns one storage variant that decides how reads
//! and writes inside it behave. Multi-byte values are little-endian.

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

use crate::consts;

/// Width of a single memory access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    Byte,
    Half,
    Word,
}

impl Width {
    /// Size in bytes.
    pub fn bytes(self) -> u32 {
        match self {
            Width::Byte => consts::BYTE_SIZE,
            Width::Half => consts::HALFWORD_SIZE,
            Width::Word => consts::WORD_SIZE,
        }
    }

    pub fn bits(self) -> u32 {
        self.bytes() * 8
    }

    fn truncate(self, value: u32) -> u32 {
        match self {
            Width::Byte => value & 0xff,
            Width::Half => value & 0xffff,
            Width::Word => value,
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Access::Read => write!(f, "read"),
            Access::Write => write!(f, "write"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("address {address:#010x} is not inside any page")]
    OutOfRange { address: u32 },

    #[error("write to read-only page at {address:#010x}")]
    ReadOnly { address: u32 },

    /// Touching a guard page is a trap, not an ordinary bounds failure.
    #[error("{access} of guard page at {address:#010x}")]
    GuardPage { address: u32, access: Access },

    #[error("{width} write at {address:#010x} runs past the end of its page storage")]
    PageBoundary { address: u32, width: Width },

    #[error("{len} bytes do not fit in a page of {page_size} bytes")]
    ImageTooLarge { len: usize, page_size: u32 },

    #[error("no address space left for another page")]
    AddressSpaceExhausted,
}

impl MemoryError {
    pub fn is_fatal_trap(&self) -> bool {
        matches!(self, MemoryError::GuardPage { .. })
    }
}

/// Permission flags of a page, derived from its storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Permissions {
    pub readable: bool,
    pub writable: bool,
}

impl Permissions {
    pub const NONE: Permissions = Permissions {
        readable: false,
        writable: false,
    };
    pub const READ_ONLY: Permissions = Permissions {
        readable: true,
        writable: false,
    };
    pub const READ_WRITE: Permissions = Permissions {
        readable: true,
        writable: true,
    };
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let r = if self.readable { 'r' } else { '-' };
        let w = if self.writable { 'w' } else { '-' };
        write!(f, "{}{}", r, w)
    }
}

/// What backs a page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageStorage {
    /// Mutable bytes. May be shorter than the page: reads past the end give
    /// zero, writes past the end fail.
    Ram(Vec<u8>),
    /// Immutable bytes, typically an assembled program.
    ReadOnlyImage(Vec<u8>),
    /// Reads as zero everywhere, writes are discarded.
    AllZero,
    /// Any access traps.
    Guard,
}

impl PageStorage {
    /// RAM of `size` zero bytes.
    pub fn zeroed_ram(size: u32) -> PageStorage {
        PageStorage::Ram(vec![0; size as usize])
    }

    pub fn permissions(&self) -> Permissions {
        match self {
            PageStorage::Ram(_) | PageStorage::AllZero => Permissions::READ_WRITE,
            PageStorage::ReadOnlyImage(_) => Permissions::READ_ONLY,
            PageStorage::Guard => Permissions::NONE,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PageStorage::Ram(_) => "ram",
            PageStorage::ReadOnlyImage(_) => "read-only",
            PageStorage::AllZero => "zero",
            PageStorage::Guard => "guard",
        }
    }

    /// Backing bytes, if the storage has any.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            PageStorage::Ram(bytes) | PageStorage::ReadOnlyImage(bytes) => Some(bytes),
            PageStorage::AllZero | PageStorage::Guard => None,
        }
    }

    fn peek(&self, width: Width, offset: usize, address: u32) -> Result<u32, MemoryError> {
        match self {
            PageStorage::Ram(bytes) | PageStorage::ReadOnlyImage(bytes) => {
                Ok(read_le(bytes, offset, width))
            }
            PageStorage::AllZero => Ok(0),
            PageStorage::Guard => Err(MemoryError::GuardPage {
                address,
                access: Access::Read,
            }),
        }
    }

    fn poke(
        &mut self,
        width: Width,
        offset: usize,
        value: u32,
        address: u32,
    ) -> Result<(), MemoryError> {
        match self {
            PageStorage::Ram(bytes) => {
                if write_le(bytes, offset, width, value) {
                    Ok(())
                } else {
                    Err(MemoryError::PageBoundary { address, width })
                }
            }
            PageStorage::ReadOnlyImage(_) => Err(MemoryError::ReadOnly { address }),
            PageStorage::AllZero => Ok(()),
            PageStorage::Guard => Err(MemoryError::GuardPage {
                address,
                access: Access::Write,
            }),
        }
    }
}

fn extent(bytes: &[u8], offset: usize, width: Width) -> Option<Range<usize>> {
    let end = offset.checked_add(width.bytes() as usize)?;
    if end <= bytes.len() {
        Some(offset..end)
    } else {
        None
    }
}

fn read_le(bytes: &[u8], offset: usize, width: Width) -> u32 {
    let range = match extent(bytes, offset, width) {
        Some(range) => range,
        None => return 0,
    };
    let data = &bytes[range];
    match width {
        Width::Byte => u32::from(data[0]),
        Width::Half => u32::from(LittleEndian::read_u16(data)),
        Width::Word => LittleEndian::read_u32(data),
    }
}

/// Returns false, leaving `bytes` untouched, when the access does not fit.
fn write_le(bytes: &mut [u8], offset: usize, width: Width, value: u32) -> bool {
    let range = match extent(bytes, offset, width) {
        Some(range) => range,
        None => return false,
    };
    let data = &mut bytes[range];
    match width {
        Width::Byte => data[0] = value as u8,
        Width::Half => LittleEndian::write_u16(data, value as u16),
        Width::Word => LittleEndian::write_u32(data, value),
    }
    true
}

/// One page of the address space.
#[derive(Clone, Debug)]
pub struct Page {
    range: Range<u64>,
    permissions: Permissions,
    storage: PageStorage,
}

impl Page {
    /// Address range of the page. The top page of the address space ends at
    /// 2^32, which is why the range is wider than an address.
    pub fn range(&self) -> Range<u64> {
        self.range.clone()
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn storage(&self) -> &PageStorage {
        &self.storage
    }

    pub fn contains(&self, address: u32) -> bool {
        self.range.contains(&u64::from(address))
    }

    fn peek(&self, width: Width, address: u32) -> Result<u32, MemoryError> {
        if !self.contains(address) {
            return Err(MemoryError::OutOfRange { address });
        }
        let offset = (u64::from(address) - self.range.start) as usize;
        self.storage.peek(width, offset, address)
    }

    fn poke(&mut self, width: Width, address: u32, value: u32) -> Result<(), MemoryError> {
        if !self.contains(address) {
            return Err(MemoryError::OutOfRange { address });
        }
        let offset = (u64::from(address) - self.range.start) as usize;
        self.storage.poke(width, offset, value, address)
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:08x}..{:08x} {} {}",
            self.range.start,
            self.range.end,
            self.permissions,
            self.storage.kind()
        )
    }
}

/// An ordered sequence of equally sized pages starting at address zero.
#[derive(Clone, Debug)]
pub struct Memory {
    page_size: u32,
    pages: Vec<Page>,
}

impl Memory {
    /// Constructs an empty address space.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is zero.
    pub fn new(page_size: u32) -> Memory {
        assert!(page_size > 0, "page size must be non-zero");
        Memory {
            page_size,
            pages: Vec::new(),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// First address after the last page; 2^32 once the address space is full.
    pub fn end(&self) -> u64 {
        self.pages.last().map(|page| page.range.end).unwrap_or(0)
    }

    /// The page `address` falls into, if any.
    pub fn page_at(&self, address: u32) -> Option<&Page> {
        self.pages.get((address / self.page_size) as usize)
    }

    /// Appends one page after the last one and returns its address range.
    pub fn insert(&mut self, storage: PageStorage) -> Result<Range<u64>, MemoryError> {
        if let Some(bytes) = storage.bytes() {
            if bytes.len() > self.page_size as usize {
                return Err(MemoryError::ImageTooLarge {
                    len: bytes.len(),
                    page_size: self.page_size,
                });
            }
        }
        let start = self.end();
        let end = start + u64::from(self.page_size);
        if end > consts::ADDRESS_SPACE_SIZE {
            return Err(MemoryError::AddressSpaceExhausted);
        }
        log::debug!(
            "page #{} at {:08x}..{:08x}: {}",
            self.pages.len(),
            start,
            end,
            storage.kind()
        );
        self.pages.push(Page {
            range: start..end,
            permissions: storage.permissions(),
            storage,
        });
        Ok(start..end)
    }

    /// Appends as many pages as `bytes` needs, as RAM if `writable`, otherwise
    /// as a read-only image. An empty blob still takes one page.
    pub fn insert_image(
        &mut self,
        bytes: &[u8],
        writable: bool,
    ) -> Result<Range<u64>, MemoryError> {
        let start = self.end();
        let mut chunks = bytes.chunks(self.page_size as usize).peekable();
        if chunks.peek().is_none() {
            let storage = if writable {
                PageStorage::Ram(Vec::new())
            } else {
                PageStorage::ReadOnlyImage(Vec::new())
            };
            return self.insert(storage);
        }
        let mut end = start;
        for chunk in chunks {
            let storage = if writable {
                PageStorage::Ram(chunk.to_vec())
            } else {
                PageStorage::ReadOnlyImage(chunk.to_vec())
            };
            end = self.insert(storage)?.end;
        }
        Ok(start..end)
    }

    fn page_index(&self, address: u32) -> Result<usize, MemoryError> {
        let index = (address / self.page_size) as usize;
        if index < self.pages.len() {
            Ok(index)
        } else {
            Err(MemoryError::OutOfRange { address })
        }
    }

    pub fn peek(&self, width: Width, address: u32) -> Result<u32, MemoryError> {
        let index = self.page_index(address)?;
        self.pages[index].peek(width, address)
    }

    /// Stores the low `width` bits of `value`.
    pub fn poke(&mut self, width: Width, address: u32, value: u32) -> Result<(), MemoryError> {
        let index = self.page_index(address)?;
        self.pages[index].poke(width, address, width.truncate(value))
    }

    /// Reads `len` consecutive bytes starting at `address`.
    pub fn read_bytes(&self, address: u32, len: u32) -> Result<Vec<u8>, MemoryError> {
        (0..len)
            .map(|i| {
                let at = address
                    .checked_add(i)
                    .ok_or(MemoryError::OutOfRange { address })?;
                self.peek(Width::Byte, at).map(|byte| byte as u8)
            })
            .collect()
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "page size {}", self.page_size)?;
        for page in &self.pages {
            writeln!(f, "  {}", page)?;
        }
        Ok(())
    }
}
