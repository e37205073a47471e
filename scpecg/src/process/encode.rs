use std::collections::HashSet;

use log::debug;

use crate::structs::huffman::CodeBook;
use crate::structs::lead::LeadDefinition;
use crate::structs::pointer::{
    POINTER_ENTRY_SIZE, POINTER_SECTION_OFFSET, PointerEntry, RECORD_HEADER_SIZE,
    SECTION_HEADER_SIZE, SectionHeader,
};
use crate::structs::record::{Record, Section, SectionPayload};
use crate::structs::{HUFFMAN, POINTER, RHYTHM};
use crate::utils::byteorder::WriteBytesLe;
use crate::utils::crc;
use crate::utils::errors::EncodeError;

/// Serializes records.
///
/// Sections are written in record order. A decoded record keeps its
/// directory, its section offsets and the bytes between sections while
/// every section still fits at its stored offset; from the first one that
/// does not, sections are laid out back to back. Every CRC and length is
/// recomputed. Leads decoded from a record keep their original bytes
/// unless `recompress` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder {
    recompress: bool,
}

impl Encoder {
    /// Re-encodes every lead from its samples. Failed leads are written
    /// as their zero-filled samples.
    pub fn recompress(mut self, recompress: bool) -> Self {
        self.recompress = recompress;
        self
    }

    pub fn encode(&self, record: &Record) -> Result<Vec<u8>, EncodeError> {
        let mut seen = HashSet::new();
        if let Some(dup) = record.sections().iter().find(|s| !seen.insert(s.id())) {
            return Err(EncodeError::DuplicateSection { section: dup.id() });
        }

        let lead_def = record
            .sections()
            .iter()
            .find_map(|s| match &s.payload {
                SectionPayload::LeadDefinition(l) => Some(l),
                _ => None,
            });
        let codebook = record
            .sections()
            .iter()
            .find_map(|s| match &s.payload {
                SectionPayload::HuffmanTables(t) if s.id() == HUFFMAN => Some(t.codebook()),
                _ => None,
            });

        let mut framed = Vec::with_capacity(record.sections().len());
        for section in record.sections().iter().filter(|s| s.id() != POINTER) {
            let payload = self.section_payload(section, lead_def, codebook)?;
            framed.push((section, frame_section(&section.header, &payload)?));
        }

        let pointer = record.section(POINTER);
        let decoded_directory = pointer.and_then(|s| s.descriptor).is_some();

        let mut entries: Vec<PointerEntry> = record.directory().to_vec();
        if !decoded_directory && !entries.iter().any(|e| e.id == POINTER) {
            entries.insert(0, PointerEntry::absent(POINTER));
        }
        for (section, _) in &framed {
            if !entries.iter().any(|e| e.id == section.id()) {
                entries.push(PointerEntry::absent(section.id()));
            }
        }

        let pointer_length = SECTION_HEADER_SIZE + entries.len() * POINTER_ENTRY_SIZE;
        let pointer_resized = pointer
            .and_then(|s| s.descriptor)
            .is_none_or(|d| d.length != pointer_length);
        let source = record.source();

        // A decoded record keeps its stored offsets, and the bytes between
        // sections, for as long as every section still fits where it was.
        let mut preserved = source.is_some() && !pointer_resized;

        let mut body = Vec::new();
        let mut positions = Vec::with_capacity(framed.len());
        let mut offset = POINTER_SECTION_OFFSET + pointer_length;
        for (section, bytes) in &framed {
            let stored = section.descriptor.map(|d| d.offset);
            match (source, stored) {
                (Some(source), Some(stored)) if preserved && stored >= offset => {
                    body.extend_from_slice(&source[offset..stored]);
                    offset = stored;
                }
                _ => preserved = false,
            }
            positions.push((section.id(), offset, bytes.len()));
            body.extend_from_slice(bytes);
            offset += bytes.len();
        }

        if let Some(source) = source.filter(|s| preserved && s.len() > offset) {
            body.extend_from_slice(&source[offset..]);
            offset = source.len();
        }

        let record_length =
            u32::try_from(offset).map_err(|_| EncodeError::RecordTooLarge { length: offset })?;

        for entry in &mut entries {
            if entry.id == POINTER {
                if !decoded_directory || (pointer_resized && entry.is_present()) {
                    entry.length = pointer_length as u32;
                    entry.index = POINTER_SECTION_OFFSET as u32 + 1;
                }
            } else if let Some(&(_, at, length)) =
                positions.iter().find(|(id, _, _)| *id == entry.id)
            {
                entry.length = length as u32;
                entry.index = at as u32 + 1;
            }
        }

        let pointer_header = pointer
            .map(|s| s.header)
            .unwrap_or_else(|| SectionHeader::new(POINTER));
        let mut directory = Vec::with_capacity(entries.len() * POINTER_ENTRY_SIZE);
        entries.write_le(&mut directory);

        let mut out = Vec::with_capacity(offset);
        out.extend_from_slice(&[0; RECORD_HEADER_SIZE]);
        out.extend(frame_section(&pointer_header, &directory)?);
        out.extend(body);

        out[2..RECORD_HEADER_SIZE].copy_from_slice(&record_length.to_le_bytes());
        let crc = crc::compute(&out[2..]);
        out[..2].copy_from_slice(&crc.to_le_bytes());

        debug!(
            "Encoded {} sections into {} bytes, CRC {:#06X}{}",
            framed.len() + 1,
            out.len(),
            crc,
            if preserved { ", stored layout kept" } else { "" }
        );

        Ok(out)
    }

    fn section_payload(
        &self,
        section: &Section,
        lead_def: Option<&LeadDefinition>,
        codebook: Option<&CodeBook>,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut payload = Vec::new();

        match &section.payload {
            SectionPayload::Metadata(metadata) => metadata.write(&mut payload)?,
            SectionPayload::HuffmanTables(tables) => tables.write(&mut payload)?,
            SectionPayload::LeadDefinition(leads) => leads.write(&mut payload)?,
            SectionPayload::Waveform(waveform) if self.recompress => waveform
                .without_encoded()
                .write(RHYTHM, &mut payload, lead_def, codebook)?,
            SectionPayload::Waveform(waveform) => {
                waveform.write(RHYTHM, &mut payload, lead_def, codebook)?
            }
            SectionPayload::Opaque(bytes) => payload.extend_from_slice(bytes),
            SectionPayload::Directory(_) => {}
        }

        Ok(payload)
    }
}

/// Encodes with the default options.
pub fn encode(record: &Record) -> Result<Vec<u8>, EncodeError> {
    Encoder::default().encode(record)
}

/// Prepends a 16-byte header built from `template` and stamps the CRC.
fn frame_section(template: &SectionHeader, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let total = SECTION_HEADER_SIZE + payload.len();
    let length = u32::try_from(total).map_err(|_| EncodeError::SectionTooLarge {
        section: template.id,
        length: total,
    })?;

    let header = SectionHeader {
        crc: 0,
        length,
        ..*template
    };

    let mut out = Vec::with_capacity(total);
    header.write_le(&mut out);
    out.extend_from_slice(payload);

    let crc = crc::compute(&out[2..]);
    out[..2].copy_from_slice(&crc.to_le_bytes());
    Ok(out)
}
