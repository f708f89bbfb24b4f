use std::fmt;

/// Map id of generated text no mapping claims.
pub(crate) const UNMAPPED: i32 = -1;

/// A zero-based (line, column) position in a text file.
///
/// Ordering is line-major: all positions on an earlier line precede all
/// positions on a later one.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilePosition {
    pub line: u32,
    pub column: u32,
}

impl FilePosition {
    #[inline]
    pub fn new(line: u32, column: u32) -> FilePosition {
        FilePosition { line, column }
    }
}

impl fmt::Display for FilePosition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({},{})", self.line, self.column)
    }
}

/// Wire format a generator emits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SourceMapFormat {
    /// Legacy three-section text format.
    V1,
    /// Run-length compressed JSON format.
    V2,
    /// The standard Base64-VLQ JSON format.
    V3,
}

impl Default for SourceMapFormat {
    fn default() -> SourceMapFormat {
        SourceMapFormat::V3
    }
}
