// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Flattened, immutable symbol and line index for one loaded object.
//!
//! All parsing happens in [`ModuleIndex::load`]. The result owns plain sorted vectors and a
//! single string arena, so [`ModuleIndex::lookup`] is a binary search that neither allocates nor
//! locks and can be called from a signal handler.

use super::{ResolveError, Symbols, SymbolizerError};
use gimli::{EndianSlice, RunTimeEndian};
use object::{Object, ObjectSection, ObjectSegment, ObjectSymbol, SymbolKind};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use symbolic_common::Name;
use symbolic_demangle::{Demangle, DemangleOptions};
use tracing::debug;

/// Marks the first address past the end of a line sequence.
const NO_FILE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrSpan {
    start: u32,
    len: u32,
}

#[derive(Debug, Clone, Copy)]
struct FunctionEntry {
    address: u64,
    size: u64,
    name: StrSpan,
}

#[derive(Debug, Clone, Copy)]
struct LineEntry {
    address: u64,
    file: u32,
    line: u32,
}

#[derive(Debug)]
pub(crate) struct ModuleIndex {
    bias: usize,
    ranges: Vec<Range<usize>>,
    functions: Vec<FunctionEntry>,
    lines: Vec<LineEntry>,
    files: Vec<StrSpan>,
    strings: String,
}

#[derive(Default)]
struct Arena {
    strings: String,
    files: Vec<StrSpan>,
    file_ids: HashMap<String, u32>,
}

impl Arena {
    fn push(&mut self, s: &str) -> StrSpan {
        let start = self.strings.len() as u32;
        self.strings.push_str(s);
        StrSpan {
            start,
            len: s.len() as u32,
        }
    }

    fn intern_file(&mut self, path: String) -> u32 {
        if let Some(id) = self.file_ids.get(&path) {
            return *id;
        }
        let id = self.files.len() as u32;
        let span = self.push(&path);
        self.files.push(span);
        self.file_ids.insert(path, id);
        id
    }
}

impl ModuleIndex {
    /// Maps `path`, indexes its symbols and line tables and releases the mapping.
    ///
    /// `bias` is the difference between the runtime address of the object and the addresses
    /// recorded in the file.
    pub fn load(path: &Path, bias: usize) -> Result<Self, SymbolizerError> {
        let io_err = |source| SymbolizerError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        // SAFETY: the mapping is read-only and dropped before this function returns.
        let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(io_err)?;
        let object = object::File::parse(&*mmap).map_err(|source| SymbolizerError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let ranges = runtime_ranges(&object, bias);
        let mut arena = Arena::default();
        let functions = index_functions(&object, &mut arena);
        let lines = index_lines(&object, &mut arena);

        Ok(Self {
            bias,
            ranges,
            functions,
            lines,
            files: arena.files,
            strings: arena.strings,
        })
    }

    pub fn contains(&self, address: usize) -> bool {
        self.ranges.iter().any(|range| range.contains(&address))
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// SIGNAL SAFETY:
    ///     Binary searches over vectors that are never mutated after `load`.
    pub fn lookup(&self, address: usize) -> Result<Symbols<'_>, ResolveError> {
        if self.functions.is_empty() && self.lines.is_empty() {
            return Err(ResolveError::NoDebugInfo);
        }
        let svma = address.wrapping_sub(self.bias) as u64;
        let function = self.lookup_function(svma);
        let (file, line) = match self.lookup_line(svma) {
            Some((file, line)) => (Some(file), (line != 0).then_some(line)),
            None => (None, None),
        };
        Ok(Symbols {
            function,
            file,
            line,
        })
    }

    fn lookup_function(&self, svma: u64) -> Option<&str> {
        let idx = self.functions.partition_point(|f| f.address <= svma);
        let candidate = self.functions.get(idx.checked_sub(1)?)?;
        let covers = candidate.size == 0 || svma - candidate.address < candidate.size;
        covers.then(|| self.str(candidate.name))
    }

    fn lookup_line(&self, svma: u64) -> Option<(&str, u32)> {
        let idx = self.lines.partition_point(|l| l.address <= svma);
        let row = self.lines.get(idx.checked_sub(1)?)?;
        if row.file == NO_FILE {
            return None;
        }
        let file = self.files.get(row.file as usize)?;
        Some((self.str(*file), row.line))
    }

    fn str(&self, span: StrSpan) -> &str {
        let start = span.start as usize;
        self.strings
            .get(start..start + span.len as usize)
            .unwrap_or_default()
    }
}

fn runtime_ranges(object: &object::File, bias: usize) -> Vec<Range<usize>> {
    object
        .segments()
        .filter(|segment| segment.file_range().1 != 0 && segment.size() != 0)
        .map(|segment| {
            let start = (segment.address() as usize).wrapping_add(bias);
            start..start.wrapping_add(segment.size() as usize)
        })
        .collect()
}

fn demangle(raw: &str) -> Cow<'_, str> {
    #[cfg(target_os = "macos")]
    let raw = raw.strip_prefix('_').unwrap_or(raw);
    match Name::from(raw).demangle(DemangleOptions::name_only()) {
        Some(demangled) if demangled != raw => Cow::Owned(demangled),
        _ => Cow::Borrowed(raw),
    }
}

fn collect_functions<'data, S: ObjectSymbol<'data>>(
    symbols: impl Iterator<Item = S>,
    arena: &mut Arena,
) -> Vec<FunctionEntry> {
    let mut out = Vec::new();
    for symbol in symbols {
        if symbol.kind() != SymbolKind::Text || !symbol.is_definition() || symbol.address() == 0 {
            continue;
        }
        let Ok(name) = symbol.name() else { continue };
        if name.is_empty() {
            continue;
        }
        out.push(FunctionEntry {
            address: symbol.address(),
            size: symbol.size(),
            name: arena.push(&demangle(name)),
        });
    }
    out
}

fn index_functions(object: &object::File, arena: &mut Arena) -> Vec<FunctionEntry> {
    let mut functions = collect_functions(object.symbols(), arena);
    if functions.is_empty() {
        functions = collect_functions(object.dynamic_symbols(), arena);
    }
    // Aliases share an address; prefer the one that carries a size.
    functions.sort_by(|a, b| a.address.cmp(&b.address).then(b.size.cmp(&a.size)));
    functions.dedup_by_key(|f| f.address);
    functions
}

/// Line rows of every compilation unit that parses. A unit with invalid DWARF is skipped, and
/// an object whose DWARF cannot be read at all is indexed with symbols only.
fn index_lines(object: &object::File, arena: &mut Arena) -> Vec<LineEntry> {
    let endian = if object.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };
    let load_section = |id: gimli::SectionId| -> Result<Cow<[u8]>, gimli::Error> {
        Ok(object
            .section_by_name(id.name())
            .and_then(|section| section.uncompressed_data().ok())
            .unwrap_or(Cow::Borrowed(&[][..])))
    };
    let sections = match gimli::DwarfSections::load(load_section) {
        Ok(sections) => sections,
        Err(e) => {
            debug!("Indexing symbols only, DWARF sections are unreadable: {e}");
            return Vec::new();
        }
    };
    let dwarf = sections.borrow(|section| EndianSlice::new(Cow::as_ref(section), endian));

    let mut lines = Vec::new();
    let mut units = dwarf.units();
    loop {
        let header = match units.next() {
            Ok(Some(header)) => header,
            Ok(None) => break,
            // The headers iterator cannot resynchronize after a bad header.
            Err(e) => {
                debug!("Stopping at an invalid compilation unit header: {e}");
                break;
            }
        };
        let offset = header.offset();
        match index_unit(&dwarf, header, arena) {
            Ok(rows) => lines.extend(rows),
            Err(e) => debug!(?offset, "Skipping compilation unit: {e}"),
        }
    }
    // A sequence may end exactly where the next one starts; the real row must win.
    lines.sort_by_key(|l| (l.address, l.file != NO_FILE));
    lines
}

type Reader<'a> = EndianSlice<'a, RunTimeEndian>;

fn index_unit<'a>(
    dwarf: &gimli::Dwarf<Reader<'a>>,
    header: gimli::UnitHeader<Reader<'a>>,
    arena: &mut Arena,
) -> Result<Vec<LineEntry>, gimli::Error> {
    let unit = dwarf.unit(header)?;
    let Some(program) = unit.line_program.clone() else {
        return Ok(Vec::new());
    };
    let comp_dir = unit
        .comp_dir
        .map(|dir| PathBuf::from(dir.to_string_lossy().into_owned()))
        .unwrap_or_default();
    let mut unit_files: HashMap<u64, u32> = HashMap::new();
    let mut previous: Option<(u32, u32)> = None;
    let mut lines = Vec::new();

    let mut rows = program.rows();
    while let Some((header, row)) = rows.next_row()? {
        if row.end_sequence() {
            lines.push(LineEntry {
                address: row.address(),
                file: NO_FILE,
                line: 0,
            });
            previous = None;
            continue;
        }
        let file = match unit_files.get(&row.file_index()) {
            Some(id) => *id,
            None => {
                let Some(entry) = row.file(header) else {
                    continue;
                };
                let mut path = comp_dir.clone();
                if let Some(dir) = entry.directory(header) {
                    path.push(dwarf.attr_string(&unit, dir)?.to_string_lossy().as_ref());
                }
                path.push(
                    dwarf
                        .attr_string(&unit, entry.path_name())?
                        .to_string_lossy()
                        .as_ref(),
                );
                let id = arena.intern_file(path.to_string_lossy().into_owned());
                unit_files.insert(row.file_index(), id);
                id
            }
        };
        let line = row.line().map(|l| l.get() as u32).unwrap_or(0);
        if previous == Some((file, line)) {
            continue;
        }
        previous = Some((file, line));
        lines.push(LineEntry {
            address: row.address(),
            file,
            line,
        });
    }
    Ok(lines)
}

/// Copies the running executable into `dir` with an unknown DWARF version in its first
/// compilation unit.
#[cfg(all(test, target_os = "linux"))]
#[allow(clippy::unwrap_used)]
pub(super) fn copy_with_corrupt_first_unit(dir: &Path) -> PathBuf {
    let mut bytes = std::fs::read(std::env::current_exe().unwrap()).unwrap();
    let offset = {
        let object = object::File::parse(&*bytes).unwrap();
        let section = object.section_by_name(".debug_info").unwrap();
        section.file_range().unwrap().0 as usize
    };
    // The version follows the initial length, which is 12 bytes long in 64-bit DWARF.
    let version = if bytes[offset..offset + 4] == [0xff; 4] {
        offset + 12
    } else {
        offset + 4
    };
    bytes[version..version + 2].copy_from_slice(&0x63u16.to_ne_bytes());
    let path = dir.join("corrupt");
    std::fs::write(&path, bytes).unwrap();
    path
}
