//! The dynamic linker's list of loaded objects. The executable's DT_DEBUG entry points
//! at an r_debug struct (see /usr/include/link.h):
//!
//! ```text
//! struct r_debug {
//!     int r_version;
//!     struct link_map *r_map;
//!     ...
//! };
//! struct link_map {
//!     ElfW(Addr) l_addr;      // load bias
//!     char *l_name;           // absolute path
//!     ElfW(Dyn) *l_ld;        // dynamic section
//!     struct link_map *l_next, *l_prev;
//! };
//! ```
//!
//! Everything is read through the core's address space: the executable is often
//! mapped more than once and only one of the copies has a live DT_DEBUG.
use crate::elf::{DT_DEBUG, DT_NULL, is_valid_tag};
use crate::error::{CoreError, CoreResult};
use crate::memory::{AddressSpace, offset_address};
use crate::process::Diagnostics;
use std::collections::HashSet;

const MAX_LINK_MAP_ENTRIES: usize = 4096;

/// Upper bound on dynamic entries scanned looking for DT_DEBUG.
const MAX_DYNAMIC_SCAN: usize = 4096;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkMapEntry {
    /// l_addr: the difference between where the library was linked and where it was
    /// loaded. For libraries linked at zero this is the load address.
    pub base: u64,
    pub name: String,
    pub dynamic: u64,
}

/// Scans the dynamic table at addr for DT_DEBUG and returns the address of r_debug.
/// Invalid tags are reported but don't stop the scan.
pub fn find_debug_address(
    space: &AddressSpace,
    addr: u64,
    diagnostics: &mut Diagnostics,
) -> CoreResult<Option<u64>> {
    let word = space.word_size();
    let mut current = addr;
    for _ in 0..MAX_DYNAMIC_SCAN {
        let tag = space.read_pointer(current)?;
        let value = space.read_pointer(offset_address(current, word)?)?;
        if !is_valid_tag(tag) {
            let err = CoreError::corrupt(format!(
                "invalid tag 0x{tag:x} in the dynamic section at 0x{current:x}"
            ));
            diagnostics.warn("executable", &err);
        }
        match tag {
            DT_NULL => return Ok(None),
            DT_DEBUG if value == 0 => return Ok(None),
            DT_DEBUG => return Ok(Some(value)),
            _ => current = offset_address(current, 2 * word)?,
        }
    }
    Ok(None)
}

/// Walks the link map from r_debug. Entries with a zero load bias (the executable) or
/// without a name are skipped. On a bad pointer or a cycle the entries found so far
/// are returned along with the error.
pub fn read_link_map(space: &AddressSpace, r_debug: u64) -> (Vec<LinkMapEntry>, Option<CoreError>) {
    let mut entries = Vec::new();
    let word = space.word_size();
    let mut next = match offset_address(r_debug, word).and_then(|a| space.read_pointer(a)) {
        Ok(next) => next,
        Err(err) => return (entries, Some(err)),
    };

    let mut visited = HashSet::new();
    while next != 0 {
        if !visited.insert(next) {
            let err = CoreError::corrupt(format!("link map loops back to 0x{next:x}"));
            return (entries, Some(err));
        }
        if visited.len() > MAX_LINK_MAP_ENTRIES {
            let err = CoreError::corrupt(format!(
                "link map has more than {MAX_LINK_MAP_ENTRIES} entries"
            ));
            return (entries, Some(err));
        }

        let node = next;
        let fields = (|| -> CoreResult<(u64, u64, u64, u64)> {
            Ok((
                space.read_pointer(node)?,
                space.read_pointer(offset_address(node, word)?)?,
                space.read_pointer(offset_address(node, 2 * word)?)?,
                space.read_pointer(offset_address(node, 3 * word)?)?,
            ))
        })();
        let (base, name_addr, dynamic, link) = match fields {
            Ok(fields) => fields,
            Err(err) => return (entries, Some(err)),
        };
        next = link;

        if base == 0 {
            continue;
        }
        // Some loaders leave l_name null for the vdso.
        let Ok(name) = space.read_string_at(name_addr) else {
            continue;
        };
        if !name.is_empty() {
            entries.push(LinkMapEntry {
                base,
                name,
                dynamic,
            });
        }
    }
    (entries, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::{ByteSource, DT_STRTAB};
    use crate::memory::MemorySource;
    use crate::utils::synthetic::{self, ByteWriter};

    const B: u64 = 0x10000;

    fn put_str(w: &mut ByteWriter, at: usize, s: &str) {
        w.bytes[at..at + s.len()].copy_from_slice(s.as_bytes());
    }

    fn image(last_next: u64) -> Vec<u8> {
        let mut w = ByteWriter::new(true, true);
        w.pad_to(0x300);
        w.bytes[0] = 1; // r_version
        w.put_addr(0x08, B + 0x20);

        // the executable
        w.put_addr(0x20, 0);
        w.put_addr(0x28, B + 0x100);
        w.put_addr(0x38, B + 0x40);

        w.put_addr(0x40, 0x7f00_0000_0000);
        w.put_addr(0x48, B + 0x110);
        w.put_addr(0x50, 0x7f00_0020_0000);
        w.put_addr(0x58, B + 0x60);

        w.put_addr(0x60, 0x7f10_0000_0000);
        w.put_addr(0x68, B + 0x130);
        w.put_addr(0x78, last_next);

        put_str(&mut w, 0x110, "/lib64/libc.so.6");
        put_str(&mut w, 0x130, "linux-vdso.so.1");

        let dynamic = synthetic::dynamic(true, true, &[(DT_STRTAB, 0x1000), (DT_DEBUG, B)]);
        w.bytes[0x200..0x200 + dynamic.len()].copy_from_slice(&dynamic);
        w.bytes
    }

    fn space(bytes: Vec<u8>) -> AddressSpace {
        let mut space = AddressSpace::new(true, true);
        let size = bytes.len() as u64;
        space.add_source(MemorySource::backed(B, size, ByteSource::from_vec("core", bytes), 0, 6));
        space
    }

    #[test]
    fn walks_the_list() {
        let space = space(image(0));
        let mut diagnostics = Diagnostics::new(true);
        let r_debug = find_debug_address(&space, B + 0x200, &mut diagnostics).unwrap();
        assert_eq!(r_debug, Some(B));
        assert!(diagnostics.is_empty());

        let (entries, err) = read_link_map(&space, B);
        assert!(err.is_none());
        assert_eq!(
            entries,
            vec![
                LinkMapEntry {
                    base: 0x7f00_0000_0000,
                    name: "/lib64/libc.so.6".to_string(),
                    dynamic: 0x7f00_0020_0000,
                },
                LinkMapEntry {
                    base: 0x7f10_0000_0000,
                    name: "linux-vdso.so.1".to_string(),
                    dynamic: 0,
                },
            ]
        );
    }

    #[test]
    fn cycles_are_cut() {
        let space = space(image(B + 0x20));
        let (entries, err) = read_link_map(&space, B);
        assert_eq!(entries.len(), 2);
        insta::assert_snapshot!(err.unwrap().to_string(), @"corrupt data: link map loops back to 0x10020");
    }

    #[test]
    fn bad_pointer_keeps_earlier_entries() {
        let space = space(image(0xdead_0000));
        let (entries, err) = read_link_map(&space, B);
        assert_eq!(entries.len(), 2);
        assert_eq!(err.unwrap().kind(), crate::error::ErrorKind::MemoryFault);
    }

    #[test]
    fn r_debug_at_the_top_of_memory() {
        let space = space(image(0));
        let (entries, err) = read_link_map(&space, u64::MAX - 4);
        assert!(entries.is_empty());
        insta::assert_snapshot!(err.unwrap().to_string(), @"memory fault at 0xfffffffffffffffb: address wraps around the address space");
    }

    #[test]
    fn no_debug_entry() {
        let mut bytes = image(0);
        let dynamic = synthetic::dynamic(true, true, &[(DT_STRTAB, 0x1000), (0x5000_0000, 1)]);
        bytes[0x200..0x200 + dynamic.len()].copy_from_slice(&dynamic);
        let space = space(bytes);
        let mut diagnostics = Diagnostics::new(true);
        let r_debug = find_debug_address(&space, B + 0x200, &mut diagnostics).unwrap();
        assert_eq!(r_debug, None);
        assert_eq!(diagnostics.len(), 1);
    }
}
