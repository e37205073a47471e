//! Record header and pointer section (section 0).
//!
//! ## Record Layout
//!
//! ```text
//! offset 0   CRC-16 over bytes 2..length        (u16 LE)
//! offset 2   record length, including the CRC   (u32 LE)
//! offset 6   section 0, the pointer directory
//! ...        every other section, located through the directory
//! ```
//!
//! Every section starts with the same 16-byte header. Section 0 carries a
//! list of 10-byte pointer entries `(id u16, length u32, index u32)` where
//! `index` is the 1-based byte position of the section in the record. An
//! entry with zero length or zero index marks an absent section.

use log::Level::Warn;
use log::{debug, trace};
use scpecgd_macros::ToBytes;

use crate::log_or_err;
use crate::process::decode::DecoderState;
use crate::utils::byte_reader::ByteReader;
use crate::utils::crc;
use crate::utils::errors::DecodeError;

pub const RECORD_HEADER_SIZE: usize = 6;
pub const SECTION_HEADER_SIZE: usize = 16;
pub const POINTER_ENTRY_SIZE: usize = 10;
pub const MIN_RECORD_SIZE: usize = RECORD_HEADER_SIZE + SECTION_HEADER_SIZE;

/// Byte offset of section 0 within the record.
pub const POINTER_SECTION_OFFSET: usize = RECORD_HEADER_SIZE;

/// Section and protocol version written into fresh section headers (2.0).
pub const DEFAULT_VERSION: u8 = 20;

/// Reserved bytes of the pointer section header in version 2 records.
pub const POINTER_RESERVED: [u8; 6] = *b"SCPECG";

/// Whole-record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordHeader {
    pub crc: u16,
    pub length: u32,
}

/// 16-byte header shared by every section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ToBytes)]
pub struct SectionHeader {
    pub crc: u16,
    pub id: u16,
    /// Length of the whole section including this header.
    pub length: u32,
    pub version: u8,
    pub protocol_version: u8,
    pub reserved: [u8; 6],
}

impl SectionHeader {
    /// Header for a section that has not been laid out yet.
    pub fn new(id: u16) -> Self {
        Self {
            crc: 0,
            id,
            length: 0,
            version: DEFAULT_VERSION,
            protocol_version: DEFAULT_VERSION,
            reserved: if id == 0 { POINTER_RESERVED } else { [0; 6] },
        }
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let mut reader = ByteReader::new(bytes);
        Some(Self {
            crc: reader.u16()?,
            id: reader.u16()?,
            length: reader.u32()?,
            version: reader.u8()?,
            protocol_version: reader.u8()?,
            reserved: reader.array()?,
        })
    }
}

/// One entry of the pointer directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ToBytes)]
pub struct PointerEntry {
    pub id: u16,
    pub length: u32,
    /// 1-based byte position of the section start.
    pub index: u32,
}

impl PointerEntry {
    pub fn absent(id: u16) -> Self {
        Self {
            id,
            length: 0,
            index: 0,
        }
    }

    pub fn is_present(&self) -> bool {
        self.length != 0 && self.index != 0
    }

    fn parse(bytes: &[u8]) -> Option<Self> {
        let mut reader = ByteReader::new(bytes);
        Some(Self {
            id: reader.u16()?,
            length: reader.u32()?,
            index: reader.u32()?,
        })
    }
}

/// Location of one section within the record.
///
/// `raw` borrows the whole section, header included, from the caller's
/// buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDescriptor<'a> {
    pub id: u16,
    pub version: u8,
    pub protocol_version: u8,
    pub offset: usize,
    pub length: usize,
    pub raw: &'a [u8],
}

impl<'a> SectionDescriptor<'a> {
    /// Bounds-checks a directory entry against the record.
    pub fn locate(record: &'a [u8], entry: &PointerEntry) -> Result<Self, DecodeError> {
        let offset = entry.index.saturating_sub(1) as usize;
        let length = entry.length as usize;

        let out_of_bounds = DecodeError::SectionOutOfBounds {
            id: entry.id,
            offset,
            length,
            record_length: record.len(),
        };

        if length < SECTION_HEADER_SIZE {
            return Err(out_of_bounds);
        }

        let raw = offset
            .checked_add(length)
            .and_then(|end| record.get(offset..end))
            .ok_or(out_of_bounds)?;

        Ok(Self {
            id: entry.id,
            version: raw[8],
            protocol_version: raw[9],
            offset,
            length,
            raw,
        })
    }

    pub fn header(&self) -> Option<SectionHeader> {
        SectionHeader::parse(self.raw)
    }

    /// Section bytes after the 16-byte header.
    pub fn payload(&self) -> &'a [u8] {
        &self.raw[SECTION_HEADER_SIZE..]
    }

    /// Record offset of the first payload byte.
    pub fn payload_offset(&self) -> usize {
        self.offset + SECTION_HEADER_SIZE
    }

    /// Bytes covered by the section CRC.
    pub fn checked_bytes(&self) -> &'a [u8] {
        &self.raw[2..]
    }
}

/// Parsed record header and pointer directory.
#[derive(Debug, Clone)]
pub struct SectionIndex<'a> {
    pub header: RecordHeader,
    pub crc_valid: bool,
    /// The record, cut to its declared length.
    pub record: &'a [u8],
    pub pointer: SectionDescriptor<'a>,
    pub pointer_header: SectionHeader,
    /// Directory entries in stored order, absent sections included.
    pub entries: Vec<PointerEntry>,
    /// Present sections other than section 0, in ascending offset order.
    pub descriptors: Vec<SectionDescriptor<'a>>,
}

impl<'a> SectionIndex<'a> {
    pub fn read(state: &mut DecoderState, buf: &'a [u8]) -> Result<Self, DecodeError> {
        if buf.len() < MIN_RECORD_SIZE {
            return Err(DecodeError::TruncatedInput {
                declared: MIN_RECORD_SIZE,
                actual: buf.len(),
            });
        }

        let mut reader = ByteReader::new(buf);
        let header = RecordHeader {
            crc: reader.u16().unwrap_or_default(),
            length: reader.u32().unwrap_or_default(),
        };

        let declared = header.length as usize;
        if declared > buf.len() {
            return Err(DecodeError::TruncatedInput {
                declared,
                actual: buf.len(),
            });
        }

        if declared < MIN_RECORD_SIZE {
            return Err(DecodeError::TruncatedInput {
                declared: MIN_RECORD_SIZE,
                actual: declared,
            });
        }

        if buf.len() > declared {
            debug!(
                "Ignoring {} bytes past the declared record length",
                buf.len() - declared
            );
        }

        let record = &buf[..declared];

        let calculated = crc::compute(&record[2..]);
        let crc_valid = calculated == header.crc;
        if !crc_valid {
            log_or_err!(
                state,
                Warn,
                None,
                None,
                DecodeError::ChecksumMismatch {
                    calculated,
                    read: header.crc,
                }
            );
        }

        let pointer_header = SectionHeader::parse(&record[POINTER_SECTION_OFFSET..]).ok_or(
            DecodeError::TruncatedInput {
                declared,
                actual: buf.len(),
            },
        )?;

        if pointer_header.id != 0 {
            return Err(DecodeError::MissingDirectory {
                offset: POINTER_SECTION_OFFSET,
                found: pointer_header.id,
            });
        }

        let pointer = SectionDescriptor::locate(
            record,
            &PointerEntry {
                id: 0,
                length: pointer_header.length,
                index: POINTER_SECTION_OFFSET as u32 + 1,
            },
        )?;

        if (pointer.length - SECTION_HEADER_SIZE) % POINTER_ENTRY_SIZE != 0 {
            return Err(DecodeError::DirectoryCorrupt {
                length: pointer_header.length,
            });
        }

        let calculated = crc::compute(pointer.checked_bytes());
        if calculated != pointer_header.crc {
            log_or_err!(
                state,
                Warn,
                Some(0),
                None,
                DecodeError::SectionChecksumInvalid {
                    id: 0,
                    offset: pointer.offset,
                    calculated,
                    read: pointer_header.crc,
                }
            );
        }

        let entries: Vec<PointerEntry> = pointer
            .payload()
            .chunks_exact(POINTER_ENTRY_SIZE)
            .filter_map(PointerEntry::parse)
            .collect();

        let mut descriptors = Vec::with_capacity(entries.len());
        for entry in &entries {
            trace!(
                "Pointer entry: section {} length {} index {}",
                entry.id, entry.length, entry.index
            );

            if entry.id == 0 || !entry.is_present() {
                continue;
            }

            descriptors.push(SectionDescriptor::locate(record, entry)?);
        }

        descriptors.sort_by_key(|d| d.offset);

        debug!(
            "Record of {} bytes, {} directory entries, {} sections present",
            declared,
            entries.len(),
            descriptors.len()
        );

        Ok(Self {
            header,
            crc_valid,
            record,
            pointer,
            pointer_header,
            entries,
            descriptors,
        })
    }
}
