use std::io::Write;
use std::sync::Arc;

use crate::errors::{Error, Result};
use crate::intern::StringTable;
use crate::jsontypes::{write_json_str, write_string_array, RawSourceMap};
use crate::store::{shift_by, Mapping, MappingStore};
use crate::traverse::{MappingTraversal, MappingVisitor};
use crate::types::FilePosition;
use crate::vlq;

/// Writes the version 3 format: one `;`-separated chunk of Base64 VLQ
/// segments per generated line, each segment holding deltas against the
/// previous one.
pub(crate) fn append_to<W: Write>(store: &MappingStore, out: &mut W, file: &str) -> Result<()> {
    store.prepare_mappings()?;

    out.write_all(b"{\n\"version\":3,\n\"file\":")?;
    write_json_str(&mut *out, file)?;

    // the tables fill in while the mappings stream out, so they have to
    // come later in the object
    out.write_all(b",\n\"mappings\":\"")?;
    let mut mapper = LineMapper::new(&mut *out);
    MappingTraversal::new(store.mappings()).traverse(&mut mapper)?;
    mapper.finish()?;
    let LineMapper { sources, names, .. } = mapper;
    out.write_all(b"\"")?;

    out.write_all(b",\n\"sources\":")?;
    write_string_array(&mut *out, &sources)?;

    if store.has_source_contents() {
        out.write_all(b",\n\"sourcesContent\":[")?;
        for (index, source) in sources.iter().enumerate() {
            if index > 0 {
                out.write_all(b",")?;
            }
            match store.contents_for(source) {
                Some(content) => write_json_str(&mut *out, content)?,
                None => out.write_all(b"null")?,
            }
        }
        out.write_all(b"]")?;
    }

    out.write_all(b",\n\"names\":")?;
    write_string_array(&mut *out, &names)?;
    out.write_all(b"\n}\n")?;
    Ok(())
}

struct LineMapper<'a, W: Write> {
    out: &'a mut W,
    sources: StringTable,
    names: StringTable,
    // source of the previous mapped segment, so a run over one file skips
    // the table lookup
    last_source: Option<(Arc<str>, u32)>,
    previous_line: Option<u32>,
    previous_column: u32,
    previous_source_id: u32,
    previous_source_line: u32,
    previous_source_column: u32,
    previous_name_id: u32,
}

impl<'a, W: Write> LineMapper<'a, W> {
    fn new(out: &'a mut W) -> LineMapper<'a, W> {
        LineMapper {
            out,
            sources: StringTable::new(),
            names: StringTable::new(),
            last_source: None,
            previous_line: None,
            previous_column: 0,
            previous_source_id: 0,
            previous_source_line: 0,
            previous_source_column: 0,
            previous_name_id: 0,
        }
    }

    fn source_id(&mut self, source: &Arc<str>) -> u32 {
        if let Some((last, id)) = &self.last_source {
            if Arc::ptr_eq(last, source) {
                return *id;
            }
        }
        let id = self.sources.intern(source);
        self.last_source = Some((source.clone(), id));
        id
    }

    fn write_entry(&mut self, mapping: Option<&Mapping>, column: u32) -> Result<()> {
        vlq::encode(&mut *self.out, i64::from(column) - i64::from(self.previous_column))?;
        self.previous_column = column;

        // a segment with only the column delta marks the span as unmapped
        let m = match mapping {
            Some(m) => m,
            None => return Ok(()),
        };

        let source_id = self.source_id(&m.source_file);
        vlq::encode(
            &mut *self.out,
            i64::from(source_id) - i64::from(self.previous_source_id),
        )?;
        self.previous_source_id = source_id;

        vlq::encode(
            &mut *self.out,
            i64::from(m.original.line) - i64::from(self.previous_source_line),
        )?;
        self.previous_source_line = m.original.line;
        vlq::encode(
            &mut *self.out,
            i64::from(m.original.column) - i64::from(self.previous_source_column),
        )?;
        self.previous_source_column = m.original.column;

        if let Some(name) = &m.original_name {
            let name_id = self.names.intern(name);
            vlq::encode(&mut *self.out, i64::from(name_id) - i64::from(self.previous_name_id))?;
            self.previous_name_id = name_id;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.write_all(b";")?;
        Ok(())
    }
}

impl<'a, W: Write> MappingVisitor for LineMapper<'a, W> {
    fn visit(
        &mut self,
        mapping: Option<&Mapping>,
        start: FilePosition,
        end: FilePosition,
    ) -> Result<()> {
        if self.previous_line == Some(start.line) {
            self.out.write_all(b",")?;
        } else {
            self.previous_column = 0;
        }
        self.write_entry(mapping, start.column)?;
        self.previous_line = Some(start.line);

        // a segment reaching into later lines only closes the chunks it
        // crosses; the trailing lines stay empty
        for _ in start.line..end.line {
            self.out.write_all(b";")?;
        }
        Ok(())
    }
}

/// One entry of a version 3 index map: a sub-map placed at an offset in
/// the combined generated file.
#[derive(Debug, Clone)]
pub struct SourceMapSection {
    value: SectionValue,
    line: u32,
    column: u32,
}

#[derive(Debug, Clone)]
enum SectionValue {
    Url(String),
    Map(String),
}

impl SourceMapSection {
    /// Section whose map is given inline as the JSON text of a complete
    /// version 3 map.
    pub fn for_map<S: Into<String>>(map: S, line: u32, column: u32) -> SourceMapSection {
        SourceMapSection {
            value: SectionValue::Map(map.into()),
            line,
            column,
        }
    }

    /// Section whose map has to be fetched from `url`.
    pub fn for_url<S: Into<String>>(url: S, line: u32, column: u32) -> SourceMapSection {
        SourceMapSection {
            value: SectionValue::Url(url.into()),
            line,
            column,
        }
    }
}

/// Writes a version 3 index map stitching `sections` into one file.
/// Inline section maps are written verbatim.
pub(crate) fn append_index_map_to<W: Write>(
    out: &mut W,
    file: &str,
    sections: &[SourceMapSection],
) -> Result<()> {
    out.write_all(b"{\n\"version\":3,\n\"file\":")?;
    write_json_str(&mut *out, file)?;
    out.write_all(b",\n\"sections\":[\n")?;
    for (index, section) in sections.iter().enumerate() {
        if index > 0 {
            out.write_all(b",\n")?;
        }
        write!(
            out,
            "{{\n\"offset\":{{\n\"line\":{},\n\"column\":{}\n}},\n",
            section.line, section.column
        )?;
        match &section.value {
            SectionValue::Url(url) => {
                out.write_all(b"\"url\":")?;
                write_json_str(&mut *out, url)?;
            }
            SectionValue::Map(map) => {
                out.write_all(b"\"map\":")?;
                out.write_all(map.as_bytes())?;
            }
        }
        out.write_all(b"\n}")?;
    }
    out.write_all(b"\n]\n}\n")?;
    Ok(())
}

/// Folds the version 3 map in `contents` into `store`, shifting every
/// replayed position by (`line`, `column`). Nothing is replayed unless
/// the whole map validates.
pub(crate) fn merge_map_section(
    store: &mut MappingStore,
    line: u32,
    column: u32,
    contents: &str,
) -> Result<()> {
    let raw: RawSourceMap = serde_json::from_str(contents)?;

    let mut batches = Vec::new();
    collect_batches(&raw, FilePosition::new(line, column), &mut batches)?;
    for batch in &batches {
        replay_batch(store, batch);
    }
    Ok(())
}

struct MergeBatch<'a> {
    offset: FilePosition,
    sources: &'a [String],
    names: &'a [String],
    contents: Option<&'a [Option<String>]>,
    entries: Vec<MapEntry>,
}

struct MapEntry {
    source: u32,
    name: Option<u32>,
    original: FilePosition,
    start: FilePosition,
    end: FilePosition,
}

fn collect_batches<'a>(
    raw: &'a RawSourceMap,
    offset: FilePosition,
    batches: &mut Vec<MergeBatch<'a>>,
) -> Result<()> {
    if raw.version != Some(3) {
        return Err(Error::invalid("only version 3 maps can be merged"));
    }

    if let Some(sections) = &raw.sections {
        for section in sections {
            let placed = shift_by(
                offset,
                FilePosition::new(section.offset.line, section.offset.column),
            );
            match (&section.map, &section.url) {
                (Some(map), _) => collect_batches(map, placed, batches)?,
                (None, Some(url)) => {
                    return Err(Error::invalid(format!(
                        "cannot merge section by url reference: {}",
                        url
                    )));
                }
                (None, None) => {
                    return Err(Error::invalid("section carries neither a map nor a url"));
                }
            }
        }
        return Ok(());
    }

    let sources = raw.sources.as_deref().unwrap_or(&[]);
    let names = raw.names.as_deref().unwrap_or(&[]);
    let entries = parse_mappings(
        raw.mappings.as_deref().unwrap_or(""),
        sources.len(),
        names.len(),
    )?;
    batches.push(MergeBatch {
        offset,
        sources,
        names,
        contents: raw.sources_content.as_deref(),
        entries,
    });
    Ok(())
}

fn replay_batch(store: &mut MappingStore, batch: &MergeBatch) {
    for entry in &batch.entries {
        store.add_mapping(
            Some(batch.sources[entry.source as usize].as_str()),
            entry.name.map(|id| batch.names[id as usize].as_str()),
            Some(entry.original),
            shift_by(batch.offset, entry.start),
            shift_by(batch.offset, entry.end),
        );
    }
    if let Some(contents) = batch.contents {
        for (source, content) in batch.sources.iter().zip(contents) {
            if let Some(content) = content {
                store.add_sources_content(source, content);
            }
        }
    }
}

/// Decodes a `mappings` string into complete entries. A mapped segment
/// runs to the next segment; one still open at the end of the map runs
/// to the start of the line after the last segment.
fn parse_mappings(mappings: &str, source_count: usize, name_count: usize) -> Result<Vec<MapEntry>> {
    let mut entries = Vec::new();
    // source, name, original and generated start of the open segment
    let mut pending: Option<(u32, Option<u32>, FilePosition, FilePosition)> = None;
    let mut previous = FilePosition::default();

    let mut source_id: i64 = 0;
    let mut original_line: i64 = 0;
    let mut original_column: i64 = 0;
    let mut name_id: i64 = 0;

    for (line, text) in mappings.split(';').enumerate() {
        let mut generated_column: i64 = 0;
        for segment in text.split(',') {
            if segment.is_empty() {
                continue;
            }
            let fields = vlq::parse_segment(segment)?;
            if !matches!(fields.len(), 1 | 4 | 5) {
                return Err(Error::invalid(format!(
                    "unexpected number of values in segment: {}",
                    fields.len()
                )));
            }

            generated_column += fields[0];
            let start = FilePosition::new(
                line as u32,
                checked_position(generated_column, "generated column")?,
            );
            if start < previous {
                return Err(Error::invalid(
                    "mappings are not ordered by generated position",
                ));
            }
            previous = start;

            if let Some((source, name, original, mapped_start)) = pending.take() {
                entries.push(MapEntry {
                    source,
                    name,
                    original,
                    start: mapped_start,
                    end: start,
                });
            }

            if fields.len() > 1 {
                source_id += fields[1];
                if source_id < 0 || source_id as usize >= source_count {
                    return Err(Error::invalid(format!(
                        "source index {} out of range",
                        source_id
                    )));
                }
                original_line += fields[2];
                original_column += fields[3];
                let original = FilePosition::new(
                    checked_position(original_line, "original line")?,
                    checked_position(original_column, "original column")?,
                );
                let name = if fields.len() == 5 {
                    name_id += fields[4];
                    if name_id < 0 || name_id as usize >= name_count {
                        return Err(Error::invalid(format!("name index {} out of range", name_id)));
                    }
                    Some(name_id as u32)
                } else {
                    None
                };
                pending = Some((source_id as u32, name, original, start));
            }
        }
    }

    if let Some((source, name, original, start)) = pending.take() {
        entries.push(MapEntry {
            source,
            name,
            original,
            start,
            end: FilePosition::new(previous.line + 1, 0),
        });
    }
    Ok(entries)
}

fn checked_position(value: i64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::invalid(format!("{} {} out of range", what, value)))
}

#[cfg(test)]
mod test {
    use super::*;

    fn pos(line: u32, column: u32) -> FilePosition {
        FilePosition::new(line, column)
    }

    fn rendered(store: &MappingStore, file: &str) -> String {
        let mut buf = Vec::new();
        append_to(store, &mut buf, file).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_two_adjacent_mappings() {
        let mut store = MappingStore::new();
        store.add_mapping(Some("a.js"), None, Some(pos(0, 0)), pos(0, 0), pos(0, 5));
        store.add_mapping(Some("a.js"), Some("x"), Some(pos(1, 2)), pos(0, 5), pos(0, 8));
        assert_eq!(
            rendered(&store, "out.js"),
            "{\n\
             \"version\":3,\n\
             \"file\":\"out.js\",\n\
             \"mappings\":\"AAAA,KACEA;\",\n\
             \"sources\":[\"a.js\"],\n\
             \"names\":[\"x\"]\n\
             }\n"
        );
    }

    #[test]
    fn test_leading_gap_gets_single_field_segment() {
        let mut store = MappingStore::new();
        store.add_mapping(Some("a.js"), None, Some(pos(0, 0)), pos(0, 5), pos(0, 8));
        let text = rendered(&store, "out.js");
        assert!(text.contains("\"mappings\":\"A,KAAA;\""), "{}", text);
    }

    #[test]
    fn test_multi_line_mapping_closes_each_line() {
        let mut store = MappingStore::new();
        store.add_mapping(Some("a.js"), None, Some(pos(0, 0)), pos(0, 0), pos(1, 0));
        store.add_mapping(Some("a.js"), None, Some(pos(3, 1)), pos(1, 0), pos(1, 4));
        let text = rendered(&store, "out.js");
        assert!(text.contains("\"mappings\":\"AAAA;AAGC;\""), "{}", text);
    }

    #[test]
    fn test_deltas_against_previous_segment() {
        let mut store = MappingStore::new();
        store.add_mapping(Some("a.js"), Some("x"), Some(pos(0, 0)), pos(0, 0), pos(0, 1));
        store.add_mapping(Some("b.js"), Some("y"), Some(pos(0, 0)), pos(0, 1), pos(0, 2));
        store.add_mapping(Some("a.js"), Some("x"), Some(pos(0, 0)), pos(0, 2), pos(0, 3));
        let text = rendered(&store, "out.js");
        assert!(text.contains("\"mappings\":\"AAAAA,CCAAC,CDAAD;\""), "{}", text);
        assert!(text.contains("\"sources\":[\"a.js\",\"b.js\"]"), "{}", text);
        assert!(text.contains("\"names\":[\"x\",\"y\"]"), "{}", text);
    }

    #[test]
    fn test_sources_content_follows_source_order() {
        let mut store = MappingStore::new();
        store.add_mapping(Some("a.js"), None, Some(pos(0, 0)), pos(0, 0), pos(0, 3));
        store.add_mapping(Some("b.js"), None, Some(pos(0, 0)), pos(0, 3), pos(0, 6));
        store.add_sources_content("b.js", "var b;\n");
        let text = rendered(&store, "out.js");
        assert!(
            text.contains(r#""sourcesContent":[null,"var b;\n"]"#),
            "{}",
            text
        );
    }

    #[test]
    fn test_empty_store() {
        let store = MappingStore::new();
        assert_eq!(
            rendered(&store, "out.js"),
            "{\n\
             \"version\":3,\n\
             \"file\":\"out.js\",\n\
             \"mappings\":\";\",\n\
             \"sources\":[],\n\
             \"names\":[]\n\
             }\n"
        );
    }

    #[test]
    fn test_index_map() {
        let part = r#"{"version":3,"mappings":";","sources":[],"names":[]}"#;
        let sections = [
            SourceMapSection::for_map(part, 0, 0),
            SourceMapSection::for_url("maps/part2.js.map", 10, 0),
        ];
        let mut buf = Vec::new();
        append_index_map_to(&mut buf, "app.js", &sections).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["version"], 3);
        assert_eq!(value["file"], "app.js");
        let parts = value["sections"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["offset"]["line"], 0);
        assert_eq!(parts[0]["offset"]["column"], 0);
        assert_eq!(parts[0]["map"]["version"], 3);
        assert_eq!(parts[1]["offset"]["line"], 10);
        assert_eq!(parts[1]["url"], "maps/part2.js.map");
    }

    #[test]
    fn test_merge_replays_shifted_mappings() {
        let part = r#"{"version":3,"file":"part.js","mappings":"AAAA;AAGC;","sources":["a.js"],"names":[]}"#;
        let mut store = MappingStore::new();
        merge_map_section(&mut store, 2, 3, part).unwrap();
        assert_eq!(
            rendered(&store, "merged.js"),
            "{\n\
             \"version\":3,\n\
             \"file\":\"merged.js\",\n\
             \"mappings\":\"A;;GAAA;AAGC;;\",\n\
             \"sources\":[\"a.js\"],\n\
             \"names\":[]\n\
             }\n"
        );
    }

    #[test]
    fn test_merge_recurses_into_sections() {
        let contents = r#"{
            "version": 3,
            "sections": [{
                "offset": {"line": 1, "column": 0},
                "map": {"version":3,"mappings":"AAAA;","sources":["x.js"],"names":[]}
            }]
        }"#;
        let mut store = MappingStore::new();
        merge_map_section(&mut store, 1, 0, contents).unwrap();

        let mappings = store.mappings();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].start, pos(2, 0));
        assert_eq!(mappings[0].end, pos(3, 0));
        assert_eq!(&*mappings[0].source_file, "x.js");
    }

    #[test]
    fn test_merge_replays_sources_content() {
        let part = r#"{"version":3,"mappings":"AAAA;","sources":["x.js"],"sourcesContent":["let x"],"names":[]}"#;
        let mut store = MappingStore::new();
        merge_map_section(&mut store, 0, 0, part).unwrap();
        assert_eq!(store.contents_for("x.js"), Some("let x"));
    }

    #[test]
    fn test_merge_rejects_wrong_version() {
        let mut store = MappingStore::new();
        let err = merge_map_section(
            &mut store,
            0,
            0,
            r#"{"version":2,"mappings":";","sources":[],"names":[]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("only version 3"), "{}", err);
    }

    #[test]
    fn test_merge_rejects_url_sections() {
        let contents = r#"{
            "version": 3,
            "sections": [{"offset": {"line": 0, "column": 0}, "url": "maps/a.map"}]
        }"#;
        let mut store = MappingStore::new();
        let err = merge_map_section(&mut store, 0, 0, contents).unwrap_err();
        assert!(err.to_string().contains("url reference"), "{}", err);
    }

    #[test]
    fn test_merge_rejects_bad_segment_arity() {
        let part = r#"{"version":3,"mappings":"AAA;","sources":["x.js"],"names":[]}"#;
        let mut store = MappingStore::new();
        let err = merge_map_section(&mut store, 0, 0, part).unwrap_err();
        assert!(
            err.to_string().contains("unexpected number of values"),
            "{}",
            err
        );
    }

    #[test]
    fn test_merge_rejects_unordered_mappings() {
        let part = r#"{"version":3,"mappings":"KAAA,LAAA;","sources":["x.js"],"names":[]}"#;
        let mut store = MappingStore::new();
        let err = merge_map_section(&mut store, 0, 0, part).unwrap_err();
        assert!(err.to_string().contains("not ordered"), "{}", err);
    }

    #[test]
    fn test_merge_rejects_source_index_out_of_range() {
        let part = r#"{"version":3,"mappings":"ACAA;","sources":["x.js"],"names":[]}"#;
        let mut store = MappingStore::new();
        let err = merge_map_section(&mut store, 0, 0, part).unwrap_err();
        assert!(err.to_string().contains("source index"), "{}", err);
    }

    #[test]
    fn test_merge_is_all_or_nothing() {
        let contents = r#"{
            "version": 3,
            "sections": [{
                "offset": {"line": 0, "column": 0},
                "map": {"version":3,"mappings":"AAAA;","sources":["x.js"],"names":[]}
            }, {
                "offset": {"line": 5, "column": 0},
                "map": {"version":3,"mappings":"AAA;","sources":["y.js"],"names":[]}
            }]
        }"#;
        let mut store = MappingStore::new();
        assert!(merge_map_section(&mut store, 0, 0, contents).is_err());
        assert!(store.mappings().is_empty());
    }
}
