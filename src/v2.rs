use std::io::Write;

use crate::base64;
use crate::errors::Result;
use crate::intern::StringTable;
use crate::jsontypes::{write_json_str, write_string_array};
use crate::store::{Mapping, MappingStore};
use crate::traverse::{MappingTraversal, MappingVisitor};
use crate::types::{FilePosition, UNMAPPED};

// entries with more repetitions or wider ids take the escaped form
const MAX_SHORT_REPS: u32 = 16;
const MAX_SHORT_WIDTH: u32 = 4;

/// Writes the version 2 format: a JSON object whose `lineMaps` strings
/// run-length encode the per-column map ids of each generated line, and
/// whose definitions reference `sources`/`names` by index.
pub(crate) fn append_to<W: Write>(store: &MappingStore, out: &mut W, file: &str) -> Result<()> {
    let max_line = store.prepare_mappings()?;

    let mut used: Vec<&Mapping> = store.mappings().iter().filter(|m| m.used.get()).collect();
    used.sort_by_key(|m| m.id.get());

    // tables are emitted before the definitions that reference them
    let mut sources = StringTable::new();
    let mut names = StringTable::new();
    for m in &used {
        sources.intern(&m.source_file);
        if let Some(name) = &m.original_name {
            names.intern(name);
        }
    }

    out.write_all(b"{\n")?;
    out.write_all(b"\"version\":2,\n\"file\":")?;
    write_json_str(out, file)?;
    write!(out, ",\n\"lineCount\":{}", max_line + 1)?;

    out.write_all(b",\n\"lineMaps\":[")?;
    let mut mapper = LineMapper {
        out: &mut *out,
        first_line: true,
        last_id: 0,
        pending: None,
    };
    mapper.open_line()?;
    MappingTraversal::new(store.mappings()).traverse(&mut mapper)?;
    mapper.close_line()?;
    out.write_all(b"]")?;

    out.write_all(b",\n\"sources\":")?;
    write_string_array(out, &sources)?;
    out.write_all(b",\n\"names\":")?;
    write_string_array(out, &names)?;

    out.write_all(b",\n\"mappings\":[")?;
    for (index, m) in used.iter().enumerate() {
        if index > 0 {
            out.write_all(b",")?;
        }
        write!(
            out,
            "[{},{},{}",
            sources.intern(&m.source_file),
            m.original.line,
            m.original.column
        )?;
        if let Some(name) = &m.original_name {
            write!(out, ",{}", names.intern(name))?;
        }
        out.write_all(b"]")?;
    }
    out.write_all(b"]")?;
    out.write_all(b"\n}\n")?;
    Ok(())
}

/// Collects per-column ids into runs and encodes one string per line.
/// The relative-id base resets to 0 at every line start.
struct LineMapper<'a, W: Write> {
    out: &'a mut W,
    first_line: bool,
    last_id: i32,
    pending: Option<(i32, u32)>,
}

impl<W: Write> LineMapper<'_, W> {
    fn open_line(&mut self) -> Result<()> {
        if self.first_line {
            self.first_line = false;
        } else {
            self.out.write_all(b",")?;
        }
        self.out.write_all(b"\"")?;
        self.last_id = 0;
        self.pending = None;
        Ok(())
    }

    fn close_line(&mut self) -> Result<()> {
        self.flush_run()?;
        self.out.write_all(b"\"")?;
        Ok(())
    }

    fn push_run(&mut self, id: i32, reps: u32) -> Result<()> {
        if let Some((pending_id, pending_reps)) = &mut self.pending {
            if *pending_id == id {
                *pending_reps += reps;
                return Ok(());
            }
        }
        self.flush_run()?;
        self.pending = Some((id, reps));
        Ok(())
    }

    fn flush_run(&mut self) -> Result<()> {
        if let Some((id, reps)) = self.pending.take() {
            encode_entry(self.out, id, self.last_id, reps)?;
            self.last_id = id;
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

        let mut column = start.column;
        for line in start.line..=end.line {
            if line == end.line {
                if end.column > column {
                    self.push_run(id, end.column - column)?;
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

/// Encodes one `(id, repetitions)` run relative to the previous id.
///
/// The short form packs `reps` and the id width into one digit followed by
/// the relative id. Longer runs or wider ids use the escaped form: one `!`
/// per repetition digit, the id width, the repetition digits, then the id.
pub fn encode_entry<W: Write>(out: &mut W, id: i32, last_id: i32, reps: u32) -> Result<()> {
    debug_assert!(reps > 0, "empty run");
    let width = relative_id_width(id, last_id);
    if reps <= MAX_SHORT_REPS && width <= MAX_SHORT_WIDTH {
        let prefix = (((reps - 1) << 2) | (width - 1)) as u8;
        out.write_all(&[base64::encode_digit(prefix)])?;
    } else {
        let reps_width = base64_width(reps - 1);
        for _ in 0..reps_width {
            out.write_all(b"!")?;
        }
        out.write_all(&[base64::encode_digit(width as u8 - 1)])?;
        write_base64(out, u64::from(reps - 1), reps_width)?;
    }
    write_relative_id(out, id, last_id, width)
}

fn relative_id_width(id: i32, last_id: i32) -> u32 {
    let relative = i64::from(id) - i64::from(last_id);
    // negative ids wrap into the top half of the digit range, so -n needs
    // exactly as many digits as n - 1
    let scaled = if relative < 0 {
        (-relative - 1) * 2
    } else {
        relative * 2
    };
    let mut width = 1;
    let mut base = 64i64;
    while scaled >= base {
        width += 1;
        base *= 64;
    }
    width
}

fn write_relative_id<W: Write>(out: &mut W, id: i32, last_id: i32, width: u32) -> Result<()> {
    let relative = i64::from(id) - i64::from(last_id);
    let base = 1i64 << (6 * width);
    let value = if relative < 0 { relative + base } else { relative };
    write_base64(out, value as u64, width)
}

fn write_base64<W: Write>(out: &mut W, value: u64, width: u32) -> Result<()> {
    for position in (0..width).rev() {
        let digit = ((value >> (6 * position)) & 0x3f) as u8;
        out.write_all(&[base64::encode_digit(digit)])?;
    }
    Ok(())
}

fn base64_width(value: u32) -> u32 {
    let mut width = 1;
    let mut rest = value >> 6;
    while rest > 0 {
        width += 1;
        rest >>= 6;
    }
    width
}
