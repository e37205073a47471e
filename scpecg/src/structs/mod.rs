//! Data structures representing record components.
//!
//! Contains the record framing and pointer directory, plus a typed model
//! for each section this crate decodes: patient metadata, Huffman tables,
//! lead definitions and rhythm data.

pub mod huffman;
pub mod lead;
pub mod metadata;
pub mod pointer;
pub mod record;
pub mod rhythm;

/// Pointer directory.
pub const POINTER: u16 = 0;
/// Patient and acquisition metadata.
pub const HEADER: u16 = 1;
/// Huffman tables.
pub const HUFFMAN: u16 = 2;
/// Lead definition.
pub const LEADS: u16 = 3;
/// Rhythm data.
pub const RHYTHM: u16 = 6;
