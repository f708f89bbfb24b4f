use std::io::Write;

use crate::errors::Result;
use crate::store::MappingStore;
use crate::types::{FilePosition, SourceMapFormat};
use crate::v1;
use crate::v2;
use crate::v3::{self, SourceMapSection};

/// Collects mappings for one compilation and renders them in the format
/// picked at construction time.
///
/// Mappings have to arrive ordered by the start of their generated span.
/// Rendering does not consume the collected state, so one generator can
/// write the same map several times.
#[derive(Debug, Default)]
pub struct SourceMapGenerator {
    format: SourceMapFormat,
    store: MappingStore,
}

impl SourceMapGenerator {
    pub fn new(format: SourceMapFormat) -> SourceMapGenerator {
        SourceMapGenerator {
            format,
            store: MappingStore::new(),
        }
    }

    pub fn format(&self) -> SourceMapFormat {
        self.format
    }

    /// Shifts all mappings as if the generated text started at the given
    /// position. Must be called before any mapping is added.
    pub fn set_starting_position(&mut self, line: u32, column: u32) {
        self.store.set_starting_position(line, column);
    }

    /// Shifts all mappings by the text a wrapper prepends to the
    /// generated output. Must be called before any mapping is added.
    pub fn set_wrapper_prefix(&mut self, prefix: &str) {
        self.store.set_wrapper_prefix(prefix);
    }

    /// Records that the generated span `start..end` came from `original`
    /// in `source`, optionally naming the symbol it belongs to. Calls
    /// without a source or original position are ignored.
    ///
    /// Panics when `start` precedes the start of the previously added
    /// mapping.
    pub fn add_mapping(
        &mut self,
        source: Option<&str>,
        name: Option<&str>,
        original: Option<FilePosition>,
        start: FilePosition,
        end: FilePosition,
    ) {
        self.store.add_mapping(source, name, original, start, end);
    }

    /// Attaches the original text of `source`, embedded by formats that
    /// support it.
    pub fn add_sources_content(&mut self, source: &str, content: &str) {
        self.store.add_sources_content(source, content);
    }

    /// Drops all mappings and configuration.
    pub fn reset(&mut self) {
        self.store.reset();
    }

    /// Writes the map for generated file `file` to `out`.
    pub fn append_to<W: Write>(&self, out: &mut W, file: &str) -> Result<()> {
        match self.format {
            SourceMapFormat::V1 => v1::append_to(&self.store, out, file),
            SourceMapFormat::V2 => v2::append_to(&self.store, out, file),
            SourceMapFormat::V3 => v3::append_to(&self.store, out, file),
        }
    }

    /// Writes an index map composing `sections` into the generated file
    /// `file`. Panics for formats without index map support.
    pub fn append_index_map_to<W: Write>(
        &self,
        out: &mut W,
        file: &str,
        sections: &[SourceMapSection],
    ) -> Result<()> {
        match self.format {
            SourceMapFormat::V3 => v3::append_index_map_to(out, file, sections),
            other => panic!("{:?} maps do not support index sections", other),
        }
    }

    /// Folds the map in `contents` into this generator, shifting it to
    /// the section offset (`line`, `column`). Panics for formats without
    /// merge support.
    pub fn merge_map_section(&mut self, line: u32, column: u32, contents: &str) -> Result<()> {
        match self.format {
            SourceMapFormat::V3 => v3::merge_map_section(&mut self.store, line, column, contents),
            other => panic!("{:?} maps do not support merging", other),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::consumer::SourceMapConsumerV1;

    fn pos(line: u32, column: u32) -> FilePosition {
        FilePosition::new(line, column)
    }

    fn rendered(generator: &SourceMapGenerator) -> String {
        let mut buf = Vec::new();
        generator.append_to(&mut buf, "out.js").unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn sample(format: SourceMapFormat) -> SourceMapGenerator {
        let mut generator = SourceMapGenerator::new(format);
        generator.add_mapping(Some("a.js"), None, Some(pos(0, 0)), pos(0, 0), pos(0, 5));
        generator.add_mapping(Some("a.js"), Some("x"), Some(pos(1, 2)), pos(0, 5), pos(0, 8));
        generator
    }

    #[test]
    fn test_format_dispatch() {
        assert!(rendered(&sample(SourceMapFormat::V1)).starts_with("/** Begin line maps. **/"));
        assert!(rendered(&sample(SourceMapFormat::V2)).contains("\"version\":2"));
        assert!(rendered(&sample(SourceMapFormat::V3)).contains("\"version\":3"));
        assert_eq!(SourceMapGenerator::default().format(), SourceMapFormat::V3);
    }

    #[test]
    fn test_starting_position_shifts_output() {
        let mut generator = SourceMapGenerator::new(SourceMapFormat::V3);
        generator.set_starting_position(2, 3);
        generator.add_mapping(Some("a.js"), None, Some(pos(0, 0)), pos(0, 0), pos(0, 2));
        assert!(rendered(&generator).contains("\"mappings\":\"A;;GAAA;\""));
    }

    #[test]
    fn test_rendering_is_repeatable() {
        let generator = sample(SourceMapFormat::V1);
        assert_eq!(rendered(&generator), rendered(&generator));
    }

    #[test]
    fn test_reset_behaves_like_fresh_generator() {
        let mut generator = SourceMapGenerator::new(SourceMapFormat::V3);
        generator.set_wrapper_prefix("(function(){");
        generator.add_mapping(Some("a.js"), None, Some(pos(0, 0)), pos(0, 0), pos(0, 2));
        let before = rendered(&generator);

        generator.reset();
        generator.add_mapping(Some("a.js"), None, Some(pos(0, 0)), pos(0, 0), pos(0, 2));
        let after = rendered(&generator);

        let mut fresh = SourceMapGenerator::new(SourceMapFormat::V3);
        fresh.add_mapping(Some("a.js"), None, Some(pos(0, 0)), pos(0, 0), pos(0, 2));
        assert_ne!(before, after);
        assert_eq!(after, rendered(&fresh));
    }

    #[test]
    fn test_v1_round_trip_through_consumer() {
        let text = rendered(&sample(SourceMapFormat::V1));
        let consumer = SourceMapConsumerV1::parse(&text).unwrap();
        let mapping = consumer.get_mapping_for_line(1, 6).unwrap();
        assert_eq!(mapping.source, "a.js");
        assert_eq!(mapping.line, 1);
        assert_eq!(mapping.column, 2);
        assert_eq!(mapping.name.as_deref(), Some("x"));
    }

    #[test]
    fn test_merge_through_generator() {
        let part = r#"{"version":3,"mappings":"AAAA;","sources":["x.js"],"names":[]}"#;
        let mut generator = SourceMapGenerator::new(SourceMapFormat::V3);
        generator.merge_map_section(1, 0, part).unwrap();
        assert!(rendered(&generator).contains("\"sources\":[\"x.js\"]"));
    }

    #[test]
    #[should_panic(expected = "do not support index sections")]
    fn test_index_map_panics_for_v1() {
        let generator = SourceMapGenerator::new(SourceMapFormat::V1);
        let sections = [SourceMapSection::for_url("a.map", 0, 0)];
        let _ = generator.append_index_map_to(&mut Vec::new(), "out.js", &sections);
    }

    #[test]
    #[should_panic(expected = "do not support merging")]
    fn test_merge_panics_for_v2() {
        let mut generator = SourceMapGenerator::new(SourceMapFormat::V2);
        let _ = generator.merge_map_section(0, 0, "{}");
    }
}
