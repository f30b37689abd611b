use crate::error::{CoreError, CoreResult};
use crate::utils;
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

enum Storage {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

/// Shared handle to the bytes of a core file, an executable, or a library. Cloning is
/// cheap: clones refer to the same mapping.
#[derive(Clone)]
pub struct ByteSource {
    name: Arc<str>,
    storage: Arc<Storage>,
}

impl ByteSource {
    pub fn open(path: &Path) -> CoreResult<Self> {
        let file = File::open(path)?;

        // This is unsafe because it has undefined behavior if the underlying file is
        // modified while the memory map is in use.
        let bytes = unsafe { Mmap::map(&file) }?;
        Ok(ByteSource {
            name: path.to_string_lossy().into(),
            storage: Arc::new(Storage::Mapped(bytes)),
        })
    }

    pub fn from_vec(name: &str, bytes: Vec<u8>) -> Self {
        ByteSource {
            name: name.into(),
            storage: Arc::new(Storage::Owned(bytes)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match self.storage.as_ref() {
            Storage::Mapped(m) => m,
            Storage::Owned(v) => v,
        }
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{} ({} bytes)", self.name, self.len())
    }
}

/// Byte order and word size aware view of an ELF image. The image may be a whole file
/// or, for ELF images found inside core segments, a window onto part of one.
///
/// Note that these functions all return a Result because core files are sometimes
/// corrupted and we want to continue to work as well as we can when that happens.
#[derive(Clone, Debug)]
pub struct Reader {
    pub little_endian: bool,
    pub sixty_four_bit: bool,
    source: ByteSource,
    base: usize,
    len: usize,
}

impl Reader {
    pub fn new(source: ByteSource) -> CoreResult<Self> {
        let len = source.len();
        Reader::with_window(source, 0, len)
    }

    /// Reader for an image that starts `base` bytes into the source and is at most
    /// `len` bytes long.
    pub fn with_window(source: ByteSource, base: usize, len: usize) -> CoreResult<Self> {
        // see https://en.wikipedia.org/wiki/Executable_and_Linkable_Format
        let available = source.len().saturating_sub(base);
        let len = len.min(available);
        let ident = source
            .as_slice()
            .get(base..base + len.min(16))
            .unwrap_or_default();
        utils::require(ident.len() == 16, || {
            CoreError::format("too small to be an ELF image")
        })?;
        utils::require(ident[0..4] == [0x7f, b'E', b'L', b'F'], || {
            CoreError::format("not an ELF image (bad magic)")
        })?;

        let sixty_four_bit = match ident[4] {
            1 => false,
            2 => true,
            class => return Err(CoreError::format(format!("bad ELF class: {class}"))),
        };
        let little_endian = match ident[5] {
            1 => true,
            2 => false,
            data => return Err(CoreError::format(format!("bad ELF data encoding: {data}"))),
        };
        let version = ident[6];
        utils::require(version == 1, || {
            CoreError::format(format!("bad ELF version: {version}"))
        })?;

        let header_size = if sixty_four_bit { 64 } else { 52 };
        utils::require(len >= header_size, || {
            CoreError::format("truncated ELF header")
        })?;

        Ok(Reader {
            little_endian,
            sixty_four_bit,
            source,
            base,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of this image within its byte source.
    pub fn base(&self) -> usize {
        self.base
    }

    pub fn source(&self) -> &ByteSource {
        &self.source
    }

    pub fn word_size(&self) -> usize {
        if self.sixty_four_bit { 8 } else { 4 }
    }

    pub fn slice(&self, offset: usize, size: usize) -> CoreResult<&[u8]> {
        match offset.checked_add(size) {
            Some(end) if end <= self.len => {
                Ok(&self.source.as_slice()[self.base + offset..self.base + end])
            }
            _ => Err(CoreError::corrupt(format!(
                "read of {size} bytes at offset 0x{offset:x} is past the end of {} (0x{:x} bytes)",
                self.source.name(),
                self.len
            ))),
        }
    }

    pub fn read_byte(&self, offset: usize) -> CoreResult<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    pub fn read_half(&self, offset: usize) -> CoreResult<u16> {
        let bytes: [u8; 2] = self.array(offset)?;
        if self.little_endian {
            Ok(u16::from_le_bytes(bytes))
        } else {
            Ok(u16::from_be_bytes(bytes))
        }
    }

    pub fn read_word(&self, offset: usize) -> CoreResult<u32> {
        let bytes: [u8; 4] = self.array(offset)?;
        if self.little_endian {
            Ok(u32::from_le_bytes(bytes))
        } else {
            Ok(u32::from_be_bytes(bytes))
        }
    }

    pub fn read_xword(&self, offset: usize) -> CoreResult<u64> {
        let bytes: [u8; 8] = self.array(offset)?;
        if self.little_endian {
            Ok(u64::from_le_bytes(bytes))
        } else {
            Ok(u64::from_be_bytes(bytes))
        }
    }

    /// Read either a u32 or u64 word depending on whether the image is 64-bit.
    /// But, for sanity, always return the result as 64 bits.
    pub fn read_addr(&self, offset: usize) -> CoreResult<u64> {
        if self.sixty_four_bit {
            self.read_xword(offset)
        } else {
            Ok(self.read_word(offset)? as u64)
        }
    }

    /// Null-terminated string of at most max_len bytes. Hitting the limit is treated as
    /// corruption.
    pub fn read_string(&self, offset: usize, max_len: usize) -> CoreResult<String> {
        let available = self.len.saturating_sub(offset).min(max_len);
        let bytes = self.slice(offset, available)?;
        match bytes.iter().position(|b| *b == 0) {
            Some(n) => Ok(String::from_utf8_lossy(&bytes[..n]).into_owned()),
            None => Err(CoreError::corrupt(format!(
                "unterminated string at offset 0x{offset:x}"
            ))),
        }
    }

    fn array<const N: usize>(&self, offset: usize) -> CoreResult<[u8; N]> {
        let slice = self.slice(offset, N)?;
        let mut bytes = [0; N];
        bytes.copy_from_slice(slice);
        Ok(bytes)
    }
}

/// Sequential reads from a Reader.
pub struct Stream<'a> {
    pub reader: &'a Reader,
    pub offset: usize,
}

impl<'a> Stream<'a> {
    pub fn new(reader: &'a Reader, offset: usize) -> Self {
        Stream { reader, offset }
    }

    pub fn read_byte(&mut self) -> CoreResult<u8> {
        let byte = self.reader.read_byte(self.offset)?;
        self.offset += 1;
        Ok(byte)
    }

    pub fn read_half(&mut self) -> CoreResult<u16> {
        let half = self.reader.read_half(self.offset)?;
        self.offset += 2;
        Ok(half)
    }

    pub fn read_word(&mut self) -> CoreResult<u32> {
        let word = self.reader.read_word(self.offset)?;
        self.offset += 4;
        Ok(word)
    }

    pub fn read_xword(&mut self) -> CoreResult<u64> {
        let xword = self.reader.read_xword(self.offset)?;
        self.offset += 8;
        Ok(xword)
    }

    pub fn read_int(&mut self) -> CoreResult<i32> {
        Ok(self.read_word()? as i32)
    }

    /// Corresponds to the kernel's user_long_t which is 64 or 32 bits. Also used for
    /// ELF addresses and offsets which have the same width.
    pub fn read_ulong(&mut self) -> CoreResult<u64> {
        let word = self.reader.read_addr(self.offset)?;
        self.offset += self.reader.word_size();
        Ok(word)
    }

    pub fn read_addr(&mut self) -> CoreResult<u64> {
        self.read_ulong()
    }

    pub fn read_offset(&mut self) -> CoreResult<u64> {
        self.read_ulong()
    }

    pub fn read_bytes(&mut self, size: usize) -> CoreResult<&'a [u8]> {
        let bytes = self.reader.slice(self.offset, size)?;
        self.offset += size;
        Ok(bytes)
    }

    /// Read a fixed size field holding a string padded with nulls.
    pub fn read_fixed_string(&mut self, size: usize) -> CoreResult<String> {
        let bytes = self.read_bytes(size)?;
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(size);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    pub fn skip(&mut self, size: usize) {
        self.offset = self.offset.saturating_add(size);
    }

    /// Advance to the next multiple of alignment counting from base, e.g. the start of
    /// a note descriptor (which the file only aligns to 4 bytes).
    pub fn align_from(&mut self, base: usize, alignment: usize) {
        let rem = self.offset.saturating_sub(base) % alignment;
        if rem != 0 {
            self.offset = self.offset.saturating_add(alignment - rem);
        }
    }
}
