//! tunematch catalog record formats
//!
//! A catalog record is one known song: an identifier, an opaque metadata map and the
//! song's Chromaprint sub-fingerprints. Records can be stored as pretty JSON, BSON or
//! the compact `.tmfp` binary layout.

pub mod format;
pub mod json_format;
pub mod reader;
pub mod writer;

pub use format::{FpFile, FpFormatError, FpHeader, FpMetadata, HEADER_SIZE, MAGIC, VERSION};
pub use json_format::{mask_sub_fingerprint, RecordFormat, SongRecord};
pub use reader::FpReader;
pub use writer::FpWriter;
