//! A parsed ELF image: a core file, an executable or library on disk, or an executable
//! or library found inside one of a core file's segments.
use super::{
    ByteSource, ElfHeader, Note, ProgramHeader, Reader, SectionHeader, SectionType,
    SegmentType, read_notes, read_section_table,
};
use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use std::path::Path;

/// Longest section name or symbol name we'll read.
pub const MAX_NAME_LENGTH: usize = 4096;

pub struct ElfFile {
    /// Path for files, a description for in-core images.
    pub name: String,
    pub header: ElfHeader,
    pub reader: Reader,
    pub segments: Vec<ProgramHeader>,

    /// Empty if the file has no section table or if it failed validation.
    pub sections: Vec<SectionHeader>,

    /// Program headers or section headers that couldn't be read.
    pub errors: Vec<CoreError>,
}

impl ElfFile {
    pub fn open(path: &Path) -> CoreResult<Self> {
        let source = ByteSource::open(path)?;
        ElfFile::parse(source)
    }

    pub fn parse(source: ByteSource) -> CoreResult<Self> {
        let name = source.name().to_string();
        let reader = Reader::new(source)?;
        ElfFile::with_reader(name, reader)
    }

    /// Parses an image that starts offset bytes into source and is at most len bytes.
    pub fn parse_at(source: ByteSource, offset: usize, len: usize, name: &str) -> CoreResult<Self> {
        let reader = Reader::with_window(source, offset, len)?;
        ElfFile::with_reader(name.to_string(), reader)
    }

    fn with_reader(name: String, reader: Reader) -> CoreResult<Self> {
        let header = ElfHeader::new(&reader)?;
        let mut errors = Vec::new();
        let segments = ElfFile::load_segments(&reader, &header, &mut errors);
        let sections = match read_section_table(&reader, &header) {
            Ok(sections) => sections,
            Err(err) => {
                errors.push(err);
                Vec::new()
            }
        };
        Ok(ElfFile {
            name,
            header,
            reader,
            segments,
            sections,
            errors,
        })
    }

    pub fn loads(&self) -> impl Iterator<Item = &ProgramHeader> {
        self.segments.iter().filter(|s| s.is_load())
    }

    pub fn find_segment(&self, stype: SegmentType) -> Option<&ProgramHeader> {
        self.segments.iter().find(|s| s.stype == stype)
    }

    /// Lowest virtual address among the Load segments.
    pub fn load_base(&self) -> Option<u64> {
        self.loads().map(|s| s.vaddr).min()
    }

    /// Translates a virtual address (as linked) into an offset within the image.
    pub fn to_offset(&self, vaddr: u64) -> Option<u64> {
        self.loads().find_map(|s| s.to_offset(vaddr))
    }

    /// All the notes in all the Note segments along with errors for segments that were
    /// only partially readable.
    pub fn notes(&self) -> (Vec<Note>, Vec<CoreError>) {
        let mut notes = Vec::new();
        let mut errors = Vec::new();
        for ph in self.segments.iter().filter(|s| s.stype == SegmentType::Note) {
            let (mut found, err) = read_notes(&self.reader, ph);
            notes.append(&mut found);
            errors.extend(err);
        }
        (notes, errors)
    }

    pub fn find_sections(&self, stype: SectionType) -> impl Iterator<Item = &SectionHeader> {
        self.sections.iter().filter(move |s| s.stype == stype)
    }

    pub fn section_name(&self, section: &SectionHeader) -> Option<String> {
        let index = self.header.string_table_index as usize;
        self.find_string(index, section.name as usize).ok()
    }

    /// Returns a string from an arbitrary string table. Note that index can point into
    /// the middle of a string.
    pub fn find_string(&self, section_index: usize, str_index: usize) -> CoreResult<String> {
        let table = self.sections.get(section_index).ok_or_else(|| {
            CoreError::corrupt(format!("bad string table index: {section_index}"))
        })?;
        if str_index as u64 >= table.size {
            return Err(CoreError::corrupt(format!(
                "string index {str_index} is past the end of section {section_index}"
            )));
        }
        let max_len = ((table.size as usize) - str_index).min(MAX_NAME_LENGTH);
        let offset = (table.offset as usize).checked_add(str_index).ok_or_else(|| {
            CoreError::corrupt(format!("section {section_index} has a bad offset"))
        })?;
        self.reader.read_string(offset, max_len)
    }

    /// Descriptive properties for modules built from this image.
    pub fn properties(&self) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        properties.insert(
            "Object file type".to_string(),
            self.header.file_type.to_string(),
        );
        properties.insert(
            "Object file version".to_string(),
            self.header.version.to_string(),
        );
        properties.insert(
            "Processor-specific flags".to_string(),
            format!("0x{:x}", self.header.flags),
        );
        properties
    }

    fn load_segments(
        reader: &Reader,
        header: &ElfHeader,
        errors: &mut Vec<CoreError>,
    ) -> Vec<ProgramHeader> {
        let mut segments = Vec::new();
        let mut offset = header.ph_offset as usize;

        for _ in 0..header.num_ph_entries {
            match ProgramHeader::new(reader, offset) {
                Ok(ph) => segments.push(ph),
                Err(err) => {
                    errors.push(CoreError::corrupt(format!(
                        "program header at offset 0x{offset:x}: {err}"
                    )));
                }
            }
            match offset.checked_add(header.ph_entry_size as usize) {
                Some(next) => offset = next,
                None => {
                    errors.push(CoreError::corrupt(format!(
                        "program header table at offset 0x{:x} runs past the end of memory",
                        header.ph_offset
                    )));
                    break;
                }
            }
        }
        segments
    }
}
