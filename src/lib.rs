//! Source map generation and consumption.
//!
//! [`SourceMapGenerator`] collects mappings from generated text back to
//! the sources it was compiled from and renders them in the legacy V1
//! and V2 formats or the standard V3 format, including V3 index maps
//! and section merging. [`SourceMapConsumerV1`] reads V1 maps back for
//! position lookups.
//!
//! ```
//! use srcmap::{FilePosition, SourceMapFormat, SourceMapGenerator};
//!
//! # fn main() -> srcmap::Result<()> {
//! let mut generator = SourceMapGenerator::new(SourceMapFormat::V3);
//! generator.add_mapping(
//!     Some("a.js"),
//!     Some("x"),
//!     Some(FilePosition::new(1, 2)),
//!     FilePosition::new(0, 0),
//!     FilePosition::new(0, 8),
//! );
//! let mut map = Vec::new();
//! generator.append_to(&mut map, "out.js")?;
//! # Ok(())
//! # }
//! ```

mod base64;
mod consumer;
mod errors;
mod generator;
mod intern;
mod jsontypes;
mod store;
mod traverse;
mod types;
mod v1;
mod v2;
mod v3;
mod vlq;

pub use consumer::{OriginalMapping, SourceMapConsumerV1};
pub use errors::{Error, Result};
pub use generator::SourceMapGenerator;
pub use types::{FilePosition, SourceMapFormat};
pub use v3::SourceMapSection;
