use std::io::Write;
use std::sync::Arc;

use crate::errors::Result;
use crate::jsontypes::write_json_str;
use crate::store::{Mapping, MappingStore};
use crate::traverse::{MappingTraversal, MappingVisitor};
use crate::types::{FilePosition, UNMAPPED};

pub(crate) const LINE_MAP_HEADER: &str = "/** Begin line maps. **/";
pub(crate) const FILE_INFO_HEADER: &str = "/** Begin file information. **/";
pub(crate) const DEFINITION_HEADER: &str = "/** Begin mapping definitions. **/";

/// Writes the legacy three-section text format.
///
/// Section one holds a JSON array per generated line with one map id per
/// character column, section two a reserved placeholder per line, section
/// three a `[source, line, column, name?]` definition per used id.
pub(crate) fn append_to<W: Write>(store: &MappingStore, out: &mut W, file: &str) -> Result<()> {
    let max_line = store.prepare_mappings()?;
    let line_count = max_line + 1;

    write!(out, "{}{{ \"file\" : ", LINE_MAP_HEADER)?;
    write_json_str(out, file)?;
    writeln!(out, ", \"count\": {} }}", line_count)?;

    let mut mapper = LineMapper {
        out: &mut *out,
        first_entry: true,
    };
    mapper.open_line()?;
    MappingTraversal::new(store.mappings()).traverse(&mut mapper)?;
    mapper.close_line()?;

    writeln!(out, "{}", FILE_INFO_HEADER)?;
    for _ in 0..line_count {
        writeln!(out, "[]")?;
    }

    writeln!(out, "{}", DEFINITION_HEADER)?;
    // ids follow first-surfaced order, not stored order
    let mut used: Vec<&Mapping> = store.mappings().iter().filter(|m| m.used.get()).collect();
    used.sort_by_key(|m| m.id.get());
    let mut writer = MappingWriter { out, last: None };
    for mapping in used {
        writer.append_mapping(mapping)?;
    }
    Ok(())
}

/// Emits the per-column id arrays of section one.
struct LineMapper<'a, W: Write> {
    out: &'a mut W,
    first_entry: bool,
}

impl<W: Write> LineMapper<'_, W> {
    fn open_line(&mut self) -> Result<()> {
        self.out.write_all(b"[")?;
        self.first_entry = true;
        Ok(())
    }

    fn close_line(&mut self) -> Result<()> {
        self.out.write_all(b"]\n")?;
        Ok(())
    }

    fn add_char_entry(&mut self, id: i32) -> Result<()> {
        if self.first_entry {
            self.first_entry = false;
            write!(self.out, "{}", id)?;
        } else {
            write!(self.out, ",{}", id)?;
        }
        Ok(())
    }
}

impl<W: Write> MappingVisitor for LineMapper<'_, W> {
    fn visit(
        &mut self,
        mapping: Option<&Mapping>,
        start: FilePosition,
        end: FilePosition,
    ) -> Result<()> {
        let id = mapping.map_or(UNMAPPED, |m| m.id.get());

        // column entries land on the segment's last line; crossing a line
        // boundary just closes the current array, the generator cannot
        // know how long the intermediate lines are
        let mut column = start.column;
        for line in start.line..=end.line {
            if line == end.line {
                for _ in column..end.column {
                    self.add_char_entry(id)?;
                }
                break;
            }
            self.close_line()?;
            self.open_line()?;
            column = 0;
        }
        Ok(())
    }
}

/// Emits section three, re-escaping the source name only when it changes.
struct MappingWriter<'a, W: Write> {
    out: &'a mut W,
    last: Option<(Arc<str>, String)>,
}

impl<W: Write> MappingWriter<'_, W> {
    fn refresh_source(&mut self, source: &Arc<str>) -> Result<()> {
        let cached = self
            .last
            .as_ref()
            .map_or(false, |(last, _)| Arc::ptr_eq(last, source));
        if !cached {
            let escaped = serde_json::to_string(source.as_ref())?;
            self.last = Some((source.clone(), escaped));
        }
        Ok(())
    }

    fn append_mapping(&mut self, m: &Mapping) -> Result<()> {
        self.refresh_source(&m.source_file)?;
        let source = self
            .last
            .as_ref()
            .map(|(_, escaped)| escaped.as_str())
            .unwrap_or_default();
        write!(
            self.out,
            "[{},{},{}",
            source, m.original.line, m.original.column
        )?;
        if let Some(name) = &m.original_name {
            self.out.write_all(b",")?;
            write_json_str(self.out, name)?;
        }
        self.out.write_all(b"]\n")?;
        Ok(())
    }
}
