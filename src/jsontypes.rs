use std::io::Write;

use serde::Deserialize;

use crate::errors::Result;
use crate::intern::StringTable;

/// The fields of a version 3 map consumed when merging. Anything else in
/// the JSON object is ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct RawSourceMap {
    pub version: Option<u32>,
    pub mappings: Option<String>,
    pub sources: Option<Vec<String>>,
    #[serde(rename = "sourcesContent")]
    pub sources_content: Option<Vec<Option<String>>>,
    pub names: Option<Vec<String>>,
    pub sections: Option<Vec<RawSection>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSection {
    pub offset: RawOffset,
    pub url: Option<String>,
    pub map: Option<RawSourceMap>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawOffset {
    pub line: u32,
    pub column: u32,
}

/// Writes `s` as a JSON string literal, escapes included.
pub(crate) fn write_json_str<W: Write>(out: &mut W, s: &str) -> Result<()> {
    serde_json::to_writer(&mut *out, s)?;
    Ok(())
}

/// Writes an interning table as a JSON array of strings, in id order.
pub(crate) fn write_string_array<W: Write>(out: &mut W, table: &StringTable) -> Result<()> {
    out.write_all(b"[")?;
    for (index, value) in table.iter().enumerate() {
        if index > 0 {
            out.write_all(b",")?;
        }
        write_json_str(out, value)?;
    }
    out.write_all(b"]")?;
    Ok(())
}
