use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::Result;
use crate::intern::StringTable;
use crate::traverse::{MappingTraversal, MappingVisitor};
use crate::types::{FilePosition, UNMAPPED};

/// One generated-range to original-position association.
///
/// `id` and `used` are encode-time state: every encode pass rewrites them,
/// so the stored mapping itself stays immutable from the producer's view.
#[derive(Debug)]
pub(crate) struct Mapping {
    pub source_file: Arc<str>,
    pub original_name: Option<Arc<str>>,
    pub original: FilePosition,
    pub start: FilePosition,
    pub end: FilePosition,
    pub id: Cell<i32>,
    pub used: Cell<bool>,
}

/// Collects the mappings of one generation session.
///
/// Mappings arrive in non-decreasing generated-start order (spans may nest
/// but never cross) and are handed to the encoders read-only. The optional
/// starting position and wrapper prefix shift generated positions as they
/// are stored, so both must be configured before the first mapping.
#[derive(Debug, Default)]
pub(crate) struct MappingStore {
    mappings: Vec<Mapping>,
    sources: StringTable,
    names: StringTable,
    source_contents: HashMap<Arc<str>, String>,
    offset: FilePosition,
    prefix: FilePosition,
}

/// Marks every mapping the traversal surfaces and hands out dense ids in
/// first-surfaced order. Mappings fully shadowed by a later identical span
/// stay unused and keep the unmapped id.
struct UsedMappingCheck {
    next_id: i32,
}

impl MappingVisitor for UsedMappingCheck {
    fn visit(
        &mut self,
        mapping: Option<&Mapping>,
        _start: FilePosition,
        _end: FilePosition,
    ) -> Result<()> {
        if let Some(m) = mapping {
            if !m.used.get() {
                m.used.set(true);
                m.id.set(self.next_id);
                self.next_id += 1;
            }
        }
        Ok(())
    }
}

pub(crate) fn shift_by(shift: FilePosition, pos: FilePosition) -> FilePosition {
    FilePosition {
        line: pos.line + shift.line,
        // only the first line carries the column displacement
        column: pos.column + if pos.line == 0 { shift.column } else { 0 },
    }
}

impl MappingStore {
    pub fn new() -> MappingStore {
        MappingStore::default()
    }

    /// Sets the position within the target file where the generated text
    /// begins. Must precede every `add_mapping` call.
    pub fn set_starting_position(&mut self, line: u32, column: u32) {
        assert!(
            self.mappings.is_empty(),
            "the starting position must be configured before any mapping is added"
        );
        self.offset = FilePosition::new(line, column);
    }

    /// Accounts for wrapper text prepended to the generated output.
    /// Must precede every `add_mapping` call.
    pub fn set_wrapper_prefix(&mut self, prefix: &str) {
        assert!(
            self.mappings.is_empty(),
            "the wrapper prefix must be configured before any mapping is added"
        );
        let mut line = 0;
        let mut column = 0;
        for ch in prefix.chars() {
            if ch == '\n' {
                line += 1;
                column = 0;
            } else {
                column += 1;
            }
        }
        self.prefix = FilePosition::new(line, column);
    }

    /// Stores one mapping. Absent `source` or `original` marks a construct
    /// without useful position data and is ignored.
    ///
    /// Panics when the adjusted start precedes the previous mapping's
    /// start; producing mappings out of generated order is a bug in the
    /// calling pipeline.
    pub fn add_mapping(
        &mut self,
        source: Option<&str>,
        name: Option<&str>,
        original: Option<FilePosition>,
        start: FilePosition,
        end: FilePosition,
    ) {
        let (source, original) = match (source, original) {
            (Some(source), Some(original)) => (source, original),
            _ => return,
        };

        let start = self.adjust(start);
        let end = self.adjust(end);
        if let Some(last) = self.mappings.last() {
            assert!(
                start >= last.start,
                "mappings must be added in generated order: {} follows {}",
                start,
                last.start
            );
        }
        debug_assert!(start <= end, "mapping ends {} before it starts {}", end, start);

        let source_file = self.sources.resolve(source);
        let original_name = name.map(|n| self.names.resolve(n));
        self.mappings.push(Mapping {
            source_file,
            original_name,
            original,
            start,
            end,
            id: Cell::new(UNMAPPED),
            used: Cell::new(false),
        });
    }

    /// Attaches the original text of `source` for formats that embed it.
    pub fn add_sources_content(&mut self, source: &str, content: &str) {
        let key = self.sources.resolve(source);
        self.source_contents.insert(key, content.to_string());
    }

    /// Drops all mappings and configuration; the store behaves like a
    /// fresh instance afterwards.
    pub fn reset(&mut self) {
        self.mappings.clear();
        self.sources.clear();
        self.names.clear();
        self.source_contents.clear();
        self.offset = FilePosition::default();
        self.prefix = FilePosition::default();
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn contents_for(&self, source: &str) -> Option<&str> {
        self.source_contents.get(source).map(String::as_str)
    }

    pub fn has_source_contents(&self) -> bool {
        !self.source_contents.is_empty()
    }

    /// Runs the mark-used pass: flags every mapping the traversal surfaces,
    /// assigns dense ids in first-surfaced order, and returns the highest
    /// generated line any used mapping touches.
    pub fn prepare_mappings(&self) -> Result<u32> {
        for m in &self.mappings {
            m.id.set(UNMAPPED);
            m.used.set(false);
        }

        let mut check = UsedMappingCheck { next_id: 0 };
        MappingTraversal::new(&self.mappings).traverse(&mut check)?;

        let mut max_line = 0;
        for m in self.mappings.iter().filter(|m| m.used.get()) {
            max_line = max_line.max(m.end.line);
        }
        Ok(max_line)
    }

    fn adjust(&self, pos: FilePosition) -> FilePosition {
        shift_by(self.prefix, shift_by(self.offset, pos))
    }
}
