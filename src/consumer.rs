use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::errors::{Error, Result};
use crate::intern::StringTable;
use crate::types::UNMAPPED;
use crate::v1;

/// Original position a generated character maps back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalMapping {
    pub source: String,
    pub line: u32,
    pub column: u32,
    pub name: Option<String>,
}

impl fmt::Display for OriginalMapping {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)?;
        if let Some(name) = &self.name {
            write!(f, " ({})", name)?;
        }
        Ok(())
    }
}

/// Map ids for one run of characters, stored as a full id for the first
/// character and a byte-sized delta for each one after it. A line breaks
/// into a new fragment wherever the delta outgrows a byte.
#[derive(Debug)]
struct LineFragment {
    start_index: i32,
    offsets: Vec<i8>,
}

impl LineFragment {
    fn positions(&self) -> usize {
        self.offsets.len() + 1
    }

    fn id_at(&self, position: usize) -> i64 {
        let mut id = i64::from(self.start_index);
        for &delta in &self.offsets[..position] {
            id += i64::from(delta);
        }
        id
    }
}

/// Mapping definitions for a run of consecutive ids that share one source
/// file, with per-entry line deltas packed into bytes.
#[derive(Debug)]
struct SourceFileRun {
    start_map_id: u32,
    start_line: u32,
    last_line: u32,
    directory: Arc<str>,
    file_name: Arc<str>,
    line_offsets: Vec<i8>,
    columns: Vec<u16>,
    identifiers: Vec<String>,
}

/// Parsed form of a legacy three-section map, queryable by generated
/// position.
#[derive(Debug)]
pub struct SourceMapConsumerV1 {
    character_map: Vec<Vec<LineFragment>>,
    sources: Vec<SourceFileRun>,
}

#[derive(Debug, Deserialize)]
struct LineMapHead {
    count: i64,
}

struct Lines<'a> {
    rest: &'a str,
}

impl<'a> Lines<'a> {
    fn next_line(&mut self) -> Result<&'a str> {
        if self.rest.is_empty() {
            return Err(Error::invalid("unexpected end of input"));
        }
        let (line, rest) = match self.rest.find('\n') {
            Some(index) => (&self.rest[..index], &self.rest[index + 1..]),
            None => (self.rest, ""),
        };
        self.rest = rest;
        Ok(line.strip_suffix('\r').unwrap_or(line))
    }

    fn is_done(&self) -> bool {
        self.rest.is_empty()
    }
}

impl SourceMapConsumerV1 {
    /// Parses the complete text of a legacy map. Any malformed section
    /// fails the whole parse.
    pub fn parse(contents: &str) -> Result<SourceMapConsumerV1> {
        let mut lines = Lines { rest: contents };

        let head = lines
            .next_line()?
            .strip_prefix(v1::LINE_MAP_HEADER)
            .ok_or_else(|| Error::invalid("missing line map header"))?;
        let head: LineMapHead = serde_json::from_str(head)?;
        if head.count < 1 {
            return Err(Error::invalid(format!("invalid line count: {}", head.count)));
        }

        let mut character_map = Vec::new();
        let mut last_id = i64::from(UNMAPPED);
        let mut max_id = i64::from(UNMAPPED);
        for _ in 0..head.count {
            let text = lines.next_line()?;
            character_map.push(parse_char_line(text, &mut last_id, &mut max_id)?);
        }

        if !lines.next_line()?.starts_with(v1::FILE_INFO_HEADER) {
            return Err(Error::invalid("missing file information header"));
        }
        // file information carries no mapping data
        for _ in 0..head.count {
            lines.next_line()?;
        }

        if !lines.next_line()?.starts_with(v1::DEFINITION_HEADER) {
            return Err(Error::invalid("missing mapping definition header"));
        }
        let mut paths = StringTable::new();
        let mut sources = Vec::new();
        let mut definitions: u32 = 0;
        while !lines.is_done() {
            let text = lines.next_line()?;
            parse_definition(text, definitions, &mut paths, &mut sources)?;
            definitions += 1;
        }
        if max_id >= i64::from(definitions) {
            return Err(Error::invalid(format!(
                "mapping id {} has no definition",
                max_id
            )));
        }

        Ok(SourceMapConsumerV1 {
            character_map,
            sources,
        })
    }

    /// Looks up the original position for the 1-based generated `line`
    /// and `column`. Columns past the end of a line report the id its
    /// last character recorded.
    pub fn get_mapping_for_line(&self, line: u32, column: u32) -> Option<OriginalMapping> {
        if line < 1 || column < 1 {
            return None;
        }
        let fragments = self.character_map.get((line - 1) as usize)?;
        let last = fragments.last()?;

        let mut position = (column - 1) as usize;
        let mut map_id = last.id_at(last.offsets.len());
        for fragment in fragments {
            if position < fragment.positions() {
                map_id = fragment.id_at(position);
                break;
            }
            position -= fragment.positions();
        }

        if map_id < 0 {
            return None;
        }
        self.original_mapping_for(map_id as u32)
    }

    fn original_mapping_for(&self, map_id: u32) -> Option<OriginalMapping> {
        let index = self
            .sources
            .partition_point(|run| run.start_map_id <= map_id)
            .checked_sub(1)?;
        let run = &self.sources[index];
        let offset = (map_id - run.start_map_id) as usize;
        if offset >= run.columns.len() {
            return None;
        }

        let mut line = i64::from(run.start_line);
        for &delta in &run.line_offsets[..=offset] {
            line += i64::from(delta);
        }
        let identifier = &run.identifiers[offset];
        Some(OriginalMapping {
            source: format!("{}{}", run.directory, run.file_name),
            line: line as u32,
            column: u32::from(run.columns[offset]),
            name: if identifier.is_empty() {
                None
            } else {
                Some(identifier.clone())
            },
        })
    }
}

/// Expands one line map array into fragments. `null` repeats the id of
/// the previous character, carried over from earlier lines. A blank line
/// stands for a line without mappings and leaves that state untouched.
fn parse_char_line(
    text: &str,
    last_id: &mut i64,
    max_id: &mut i64,
) -> Result<Vec<LineFragment>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<Option<i64>> = serde_json::from_str(text)?;
    let mut fragments: Vec<LineFragment> = Vec::new();
    for entry in entries {
        let id = entry.unwrap_or(*last_id);
        if i32::try_from(id).is_err() {
            return Err(Error::invalid(format!("mapping id {} out of range", id)));
        }
        *max_id = (*max_id).max(id);
        let delta = id - *last_id;
        match fragments.last_mut() {
            Some(fragment) if (-128..=127).contains(&delta) => {
                fragment.offsets.push(delta as i8);
            }
            _ => fragments.push(LineFragment {
                start_index: id as i32,
                offsets: Vec::new(),
            }),
        }
        *last_id = id;
    }
    Ok(fragments)
}

fn parse_definition(
    text: &str,
    map_id: u32,
    paths: &mut StringTable,
    sources: &mut Vec<SourceFileRun>,
) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let fields = value
        .as_array()
        .ok_or_else(|| Error::invalid("mapping definition is not an array"))?;
    if fields.len() != 3 && fields.len() != 4 {
        return Err(Error::invalid(format!(
            "unexpected number of values in definition: {}",
            fields.len()
        )));
    }
    let file = fields[0]
        .as_str()
        .ok_or_else(|| Error::invalid("definition file is not a string"))?;
    let line = fields[1]
        .as_u64()
        .and_then(|line| u32::try_from(line).ok())
        .ok_or_else(|| Error::invalid("definition line out of range"))?;
    // columns are stored 16 bits wide; wider values wrap
    let column = fields[2]
        .as_u64()
        .ok_or_else(|| Error::invalid("definition column is not a number"))? as u16;
    let identifier = match fields.get(3) {
        Some(value) => value
            .as_str()
            .ok_or_else(|| Error::invalid("definition name is not a string"))?,
        None => "",
    };

    let (directory, file_name) = split_source(file);
    // a definition extends the last run when the file matches and the line
    // delta still fits in a byte
    let delta = sources.last().and_then(|run| {
        if *run.directory != *directory || *run.file_name != *file_name {
            return None;
        }
        let delta = i64::from(line) - i64::from(run.last_line);
        if (-128..=127).contains(&delta) {
            Some(delta as i8)
        } else {
            None
        }
    });
    if let Some(delta) = delta {
        if let Some(run) = sources.last_mut() {
            run.line_offsets.push(delta);
            run.columns.push(column);
            run.identifiers.push(identifier.to_string());
            run.last_line = line;
            return Ok(());
        }
    }

    sources.push(SourceFileRun {
        start_map_id: map_id,
        start_line: line,
        last_line: line,
        directory: paths.resolve(directory),
        file_name: paths.resolve(file_name),
        line_offsets: vec![0],
        columns: vec![column],
        identifiers: vec![identifier.to_string()],
    });
    Ok(())
}

/// Splits a path after the last `/`, keeping the slash on the directory
/// side so the two halves concatenate back to the input.
fn split_source(source: &str) -> (&str, &str) {
    match source.rfind('/') {
        Some(index) => source.split_at(index + 1),
        None => ("", source),
    }
}
