#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Decoder and encoder for SCP-ECG (EN 1064) electrocardiogram records.
//!
//! ### Record Organization
//!
//! **Framing**: A CRC and a length, followed by numbered sections that each carry
//! their own 16-byte header and CRC.
//! **Directory**: Section 0 lists the id, length and position of every other section.
//!
//! ### Decoded Sections
//!
//! - Section 1: patient and acquisition metadata
//! - Section 2: Huffman tables
//! - Section 3: lead definition
//! - Section 6: rhythm data
//!
//! Other sections are carried as raw bytes and written back unchanged.
//!
//! ### Integrity
//!
//! Record and section CRCs are checked. A section that fails its checks is kept
//! as raw bytes and the rest of the record still decodes. Strict decoding turns
//! every such finding into an error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scpecg::{Decoder, encode};
//!
//! let bytes = std::fs::read("recording.scp")?;
//! let record = Decoder::default().decode(&bytes)?;
//!
//! for diagnostic in record.diagnostics() {
//!     eprintln!("{diagnostic}");
//! }
//!
//! if let Some(waveform) = record.waveform() {
//!     for lead in waveform.leads() {
//!         println!("lead {}: {} samples", lead.id(), lead.samples().len());
//!     }
//! }
//!
//! // A record read from a well-formed file encodes to the same bytes.
//! assert_eq!(encode(&record)?, bytes);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Record processing.
///
/// 1. **Decoding** ([`process::decode`]): Locates and validates sections.
///
/// 2. **Dispatch** ([`process::dispatch`]): Routes each section to its decoder.
///
/// 3. **Encoding** ([`process::encode`]): Writes a record back to bytes.
pub mod process;

/// Data structures representing SCP-ECG components.
///
/// - **Directory** ([`structs::pointer`]): Record header and section 0
/// - **Metadata** ([`structs::metadata`]): Tagged patient fields
/// - **Huffman Tables** ([`structs::huffman`]): Code tables and decode trees
/// - **Leads** ([`structs::lead`]): Lead definition
/// - **Rhythm** ([`structs::rhythm`]): Sample reconstruction
/// - **Record** ([`structs::record`]): The decoded record
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading/writing
/// - **CRC Validation** ([`utils::crc`]): Error detection
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;

pub use process::decode::{Decoder, decode};
pub use process::encode::{Encoder, encode};
pub use structs::record::{Diagnostic, Record, Section, SectionPayload, SectionStatus};
pub use utils::crc;
pub use utils::errors::{DecodeError, EncodeError};
