use crate::errors::Result;
use crate::store::Mapping;
use crate::types::FilePosition;

/// Receives the flattened segments of one traversal pass.
///
/// `mapping` is the innermost mapping covering `[start, end)`, or `None`
/// for generated text no mapping claims. A single call may span several
/// generated lines.
pub(crate) trait MappingVisitor {
    fn visit(
        &mut self,
        mapping: Option<&Mapping>,
        start: FilePosition,
        end: FilePosition,
    ) -> Result<()>;
}

/// Walks start-ordered, properly nested mapping spans and emits maximal
/// disjoint segments in generated order, with no gaps and no overlaps.
///
/// Spans nest like AST nodes, so an explicit stack tracks the open ones:
/// whenever the next mapping starts at or after the top's end, the top is
/// closed and the segment up to its end emitted; any remaining gap before
/// the next mapping belongs to its parent (or to nothing at top level).
pub(crate) struct MappingTraversal<'a> {
    mappings: &'a [Mapping],
    cursor: FilePosition,
}

impl<'a> MappingTraversal<'a> {
    pub fn new(mappings: &'a [Mapping]) -> MappingTraversal<'a> {
        MappingTraversal {
            mappings,
            cursor: FilePosition::default(),
        }
    }

    pub fn traverse<V: MappingVisitor>(mut self, visitor: &mut V) -> Result<()> {
        let mappings = self.mappings;
        let mut stack: Vec<&Mapping> = Vec::new();

        for m in mappings {
            // close every open span ending at or before the next start
            while let Some(&top) = stack.last() {
                if top.end > m.start {
                    break;
                }
                stack.pop();
                self.maybe_visit(visitor, Some(top), top.end)?;
            }

            // the gap up to the next start belongs to the parent, if any
            debug_assert!(self.cursor <= m.start, "crossing mapping span at {}", m.start);
            self.maybe_visit(visitor, stack.last().copied(), m.start)?;

            stack.push(m);
        }

        while let Some(top) = stack.pop() {
            self.maybe_visit(visitor, Some(top), top.end)?;
        }
        Ok(())
    }

    fn maybe_visit<V: MappingVisitor>(
        &mut self,
        visitor: &mut V,
        mapping: Option<&Mapping>,
        next: FilePosition,
    ) -> Result<()> {
        // zero-width segments are never emitted
        if self.cursor < next {
            visitor.visit(mapping, self.cursor, next)?;
            self.cursor = next;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::store::Mapping;
    use crate::types::UNMAPPED;
    use std::cell::Cell;

    fn span(tag: &str, start: (u32, u32), end: (u32, u32)) -> Mapping {
        Mapping {
            source_file: Arc::from(tag),
            original_name: None,
            original: FilePosition::default(),
            start: FilePosition::new(start.0, start.1),
            end: FilePosition::new(end.0, end.1),
            id: Cell::new(UNMAPPED),
            used: Cell::new(false),
        }
    }

    struct Recorder {
        segments: Vec<(Option<String>, FilePosition, FilePosition)>,
    }

    impl MappingVisitor for Recorder {
        fn visit(
            &mut self,
            mapping: Option<&Mapping>,
            start: FilePosition,
            end: FilePosition,
        ) -> Result<()> {
            let tag = mapping.map(|m| m.source_file.to_string());
            self.segments.push((tag, start, end));
            Ok(())
        }
    }

    fn segments_of(mappings: &[Mapping]) -> Vec<(Option<String>, FilePosition, FilePosition)> {
        let mut recorder = Recorder { segments: Vec::new() };
        MappingTraversal::new(mappings).traverse(&mut recorder).unwrap();
        recorder.segments
    }

    fn seg(
        tag: Option<&str>,
        start: (u32, u32),
        end: (u32, u32),
    ) -> (Option<String>, FilePosition, FilePosition) {
        (
            tag.map(str::to_string),
            FilePosition::new(start.0, start.1),
            FilePosition::new(end.0, end.1),
        )
    }

    #[test]
    fn test_siblings_with_gap() {
        let mappings = [span("a", (0, 0), (0, 5)), span("b", (0, 7), (0, 9))];
        assert_eq!(
            segments_of(&mappings),
            vec![
                seg(Some("a"), (0, 0), (0, 5)),
                seg(None, (0, 5), (0, 7)),
                seg(Some("b"), (0, 7), (0, 9)),
            ]
        );
    }

    #[test]
    fn test_nested_child_splits_parent() {
        let mappings = [span("p", (0, 0), (0, 10)), span("c", (0, 3), (0, 6))];
        assert_eq!(
            segments_of(&mappings),
            vec![
                seg(Some("p"), (0, 0), (0, 3)),
                seg(Some("c"), (0, 3), (0, 6)),
                seg(Some("p"), (0, 6), (0, 10)),
            ]
        );
    }

    #[test]
    fn test_leading_gap_is_unmapped() {
        let mappings = [span("a", (1, 2), (1, 4))];
        assert_eq!(
            segments_of(&mappings),
            vec![seg(None, (0, 0), (1, 2)), seg(Some("a"), (1, 2), (1, 4))]
        );
    }

    #[test]
    fn test_adjacent_spans_touching() {
        let mappings = [span("a", (0, 0), (0, 5)), span("b", (0, 5), (0, 8))];
        assert_eq!(
            segments_of(&mappings),
            vec![seg(Some("a"), (0, 0), (0, 5)), seg(Some("b"), (0, 5), (0, 8))]
        );
    }

    #[test]
    fn test_identical_span_shadows_earlier() {
        let mappings = [span("old", (0, 0), (0, 4)), span("new", (0, 0), (0, 4))];
        // only the later duplicate ever surfaces
        assert_eq!(segments_of(&mappings), vec![seg(Some("new"), (0, 0), (0, 4))]);
    }

    #[test]
    fn test_multi_line_segment() {
        let mappings = [span("a", (0, 2), (2, 1))];
        assert_eq!(
            segments_of(&mappings),
            vec![seg(None, (0, 0), (0, 2)), seg(Some("a"), (0, 2), (2, 1))]
        );
    }

    #[test]
    fn test_deep_nesting_closes_in_order() {
        let mappings = [
            span("a", (0, 0), (0, 9)),
            span("b", (0, 1), (0, 8)),
            span("c", (0, 2), (0, 7)),
            span("d", (0, 9), (0, 10)),
        ];
        assert_eq!(
            segments_of(&mappings),
            vec![
                seg(Some("a"), (0, 0), (0, 1)),
                seg(Some("b"), (0, 1), (0, 2)),
                seg(Some("c"), (0, 2), (0, 7)),
                seg(Some("b"), (0, 7), (0, 8)),
                seg(Some("a"), (0, 8), (0, 9)),
                seg(Some("d"), (0, 9), (0, 10)),
            ]
        );
    }
}
