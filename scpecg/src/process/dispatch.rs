//! Validates every located section and hands it to its decoder.
//!
//! Sections are visited in offset order. The first pass checks framing
//! and decodes the sections that stand alone. Rhythm data depends on the
//! lead definition and the Huffman tables, so it is decoded in a second
//! pass once both are known.

use std::borrow::Cow;

use log::Level::Warn;
use log::{debug, trace};

use crate::log_or_err;
use crate::process::decode::DecoderState;
use crate::structs::huffman::{CodeBook, HuffmanTables};
use crate::structs::lead::LeadDefinition;
use crate::structs::metadata::Metadata;
use crate::structs::pointer::{SectionDescriptor, SectionIndex};
use crate::structs::record::{Section, SectionPayload, SectionStatus};
use crate::structs::rhythm::Waveform;
use crate::structs::{HEADER, HUFFMAN, LEADS, POINTER, RHYTHM};
use crate::utils::crc;
use crate::utils::errors::DecodeError;

pub fn dispatch<'a>(
    state: &mut DecoderState,
    index: &SectionIndex<'a>,
) -> Result<Vec<Section<'a>>, DecodeError> {
    let mut sections = Vec::with_capacity(index.descriptors.len() + 1);

    let pointer_crc = crc::compute(index.pointer.checked_bytes());
    sections.push(Section {
        header: index.pointer_header,
        descriptor: Some(index.pointer),
        payload: SectionPayload::Directory(index.entries.clone()),
        status: if pointer_crc == index.pointer_header.crc {
            SectionStatus::Valid
        } else {
            SectionStatus::Invalid(DecodeError::SectionChecksumInvalid {
                id: POINTER,
                offset: index.pointer.offset,
                calculated: pointer_crc,
                read: index.pointer_header.crc,
            })
        },
    });

    let mut previous = POINTER;
    let mut previous_end = index.pointer.offset + index.pointer.length;

    for descriptor in &index.descriptors {
        if descriptor.offset < previous_end {
            return Err(DecodeError::SectionOverlap {
                id: descriptor.id,
                previous,
                offset: descriptor.offset,
            });
        }
        if descriptor.offset > previous_end {
            debug!(
                "{} unused bytes before section {} at offset {}",
                descriptor.offset - previous_end,
                descriptor.id,
                descriptor.offset
            );
        }
        previous = descriptor.id;
        previous_end = descriptor.offset + descriptor.length;

        sections.push(read_section(state, descriptor)?);
    }

    for i in 0..sections.len() {
        if sections[i].id() != RHYTHM || !sections[i].is_valid() {
            continue;
        }
        let Some(descriptor) = sections[i].descriptor else {
            continue;
        };

        let waveform = {
            let lead_def = find_lead_definition(&sections);
            let codebook = find_codebook(&sections);
            Waveform::read(
                state,
                RHYTHM,
                descriptor.payload_offset(),
                descriptor.payload(),
                lead_def,
                codebook,
            )
        };

        match waveform {
            Ok(waveform) => sections[i].payload = SectionPayload::Waveform(waveform),
            Err(err) => {
                log_or_err!(state, Warn, Some(RHYTHM), None, err.clone());
                sections[i].status = SectionStatus::Invalid(err);
            }
        }
    }

    Ok(sections)
}

/// Checks framing and decodes a section that needs no other section.
fn read_section<'a>(
    state: &mut DecoderState,
    descriptor: &SectionDescriptor<'a>,
) -> Result<Section<'a>, DecodeError> {
    let id = descriptor.id;
    let mut section = Section {
        header: descriptor.header().ok_or(DecodeError::SectionOutOfBounds {
            id,
            offset: descriptor.offset,
            length: descriptor.length,
            record_length: descriptor.offset + descriptor.raw.len(),
        })?,
        descriptor: Some(*descriptor),
        payload: SectionPayload::Opaque(Cow::Borrowed(descriptor.payload())),
        status: SectionStatus::Valid,
    };

    trace!(
        "Section {} at offset {}: {} bytes, version {}",
        id, descriptor.offset, descriptor.length, descriptor.version
    );

    if let Err(err) = check_framing(descriptor, &section) {
        log_or_err!(state, Warn, Some(id), None, err.clone());
        section.status = SectionStatus::Invalid(err);
        return Ok(section);
    }

    let offset = descriptor.payload_offset();
    let payload = descriptor.payload();

    let decoded = match id {
        HEADER => Metadata::read(id, offset, payload).map(SectionPayload::Metadata),
        HUFFMAN => HuffmanTables::read(id, offset, payload).map(SectionPayload::HuffmanTables),
        LEADS => LeadDefinition::read(id, offset, payload).map(SectionPayload::LeadDefinition),
        _ => return Ok(section),
    };

    match decoded {
        Ok(payload) => section.payload = payload,
        Err(err) => {
            log_or_err!(state, Warn, Some(id), None, err.clone());
            section.status = SectionStatus::Invalid(err);
        }
    }

    Ok(section)
}

fn check_framing(descriptor: &SectionDescriptor, section: &Section) -> Result<(), DecodeError> {
    let header = &section.header;

    if header.id != descriptor.id || header.length as usize != descriptor.length {
        return Err(DecodeError::SectionHeaderMismatch {
            id: descriptor.id,
            header_id: header.id,
            header_length: header.length,
            directory_length: descriptor.length as u32,
        });
    }

    let calculated = crc::compute(descriptor.checked_bytes());
    if calculated != header.crc {
        return Err(DecodeError::SectionChecksumInvalid {
            id: descriptor.id,
            offset: descriptor.offset,
            calculated,
            read: header.crc,
        });
    }

    Ok(())
}

fn find_lead_definition<'s>(sections: &'s [Section]) -> Option<&'s LeadDefinition> {
    sections.iter().find_map(|s| match (&s.payload, &s.status) {
        (SectionPayload::LeadDefinition(l), SectionStatus::Valid) => Some(l),
        _ => None,
    })
}

/// `Ok(None)` selects 16-bit data. A section 2 that failed to decode makes
/// the waveform undecodable.
fn find_codebook<'s>(sections: &'s [Section]) -> Result<Option<&'s CodeBook>, DecodeError> {
    let Some(section) = sections.iter().find(|s| s.id() == HUFFMAN) else {
        return Ok(None);
    };

    match (&section.payload, &section.status) {
        (SectionPayload::HuffmanTables(t), SectionStatus::Valid) => Ok(Some(t.codebook())),
        (_, SectionStatus::Invalid(err @ DecodeError::InvalidCodeTable { .. })) => Err(err.clone()),
        _ => Err(DecodeError::MissingCodeTable { section: RHYTHM }),
    }
}
