//! Decoded record and its sections.

use std::borrow::Cow;
use std::fmt::{Display, Formatter};

use crate::structs::huffman::HuffmanTables;
use crate::structs::lead::LeadDefinition;
use crate::structs::metadata::Metadata;
use crate::structs::pointer::{PointerEntry, RecordHeader, SectionDescriptor, SectionHeader};
use crate::structs::rhythm::{CompressionMode, Waveform};
use crate::structs::{HEADER, HUFFMAN, LEADS, POINTER, RHYTHM};
use crate::utils::errors::DecodeError;

/// Highest section id the builder lists in a fresh directory.
const STANDARD_SECTION_MAX: u16 = 11;

/// A finding that did not stop decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub section: Option<u16>,
    pub lead: Option<usize>,
    pub level: log::Level,
    pub error: DecodeError,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.section, self.lead) {
            (Some(s), Some(l)) => write!(f, "section {s}, lead {l}: {}", self.error),
            (Some(s), None) => write!(f, "section {s}: {}", self.error),
            _ => write!(f, "record: {}", self.error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionStatus {
    Valid,
    Invalid(DecodeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionPayload<'a> {
    Directory(Vec<PointerEntry>),
    Metadata(Metadata),
    HuffmanTables(HuffmanTables),
    LeadDefinition(LeadDefinition),
    Waveform(Waveform<'a>),
    /// Payload bytes of a section that is not decoded or failed to decode.
    Opaque(Cow<'a, [u8]>),
}

impl SectionPayload<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            SectionPayload::Directory(_) => "directory",
            SectionPayload::Metadata(_) => "metadata",
            SectionPayload::HuffmanTables(_) => "huffman tables",
            SectionPayload::LeadDefinition(_) => "lead definition",
            SectionPayload::Waveform(_) => "rhythm data",
            SectionPayload::Opaque(_) => "opaque",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    pub header: SectionHeader,
    /// Where the section was found; `None` for sections built in memory.
    pub descriptor: Option<SectionDescriptor<'a>>,
    pub payload: SectionPayload<'a>,
    pub status: SectionStatus,
}

impl<'a> Section<'a> {
    pub fn new(id: u16, payload: SectionPayload<'a>) -> Self {
        Self {
            header: SectionHeader::new(id),
            descriptor: None,
            payload,
            status: SectionStatus::Valid,
        }
    }

    pub fn id(&self) -> u16 {
        self.header.id
    }

    pub fn is_valid(&self) -> bool {
        self.status == SectionStatus::Valid
    }
}

/// An SCP-ECG record.
///
/// Sections are kept in the order they appear in the record, section 0
/// first. Typed accessors return `None` for sections that are absent or
/// invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<'a> {
    header: RecordHeader,
    crc_valid: bool,
    /// The bytes the record was decoded from, cut to its declared length.
    source: Option<&'a [u8]>,
    sections: Vec<Section<'a>>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Record<'a> {
    pub(crate) fn from_parts(
        header: RecordHeader,
        crc_valid: bool,
        source: Option<&'a [u8]>,
        sections: Vec<Section<'a>>,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        Self {
            header,
            crc_valid,
            source,
            sections,
            diagnostics,
        }
    }

    pub fn builder() -> RecordBuilder<'a> {
        RecordBuilder::default()
    }

    /// Declared record length; 0 for a record that was never encoded.
    pub fn length(&self) -> u32 {
        self.header.length
    }

    pub fn crc(&self) -> u16 {
        self.header.crc
    }

    /// Whether the stored record CRC matched. Always false for built records.
    pub fn crc_valid(&self) -> bool {
        self.crc_valid
    }

    /// Pointer entries in stored order.
    pub fn directory(&self) -> &[PointerEntry] {
        match self.section(POINTER).map(|s| &s.payload) {
            Some(SectionPayload::Directory(entries)) => entries,
            _ => &[],
        }
    }

    /// Bytes the record was decoded from; `None` for built records.
    pub fn source(&self) -> Option<&'a [u8]> {
        self.source
    }

    pub fn sections(&self) -> &[Section<'a>] {
        &self.sections
    }

    /// First section with `id`.
    pub fn section(&self, id: u16) -> Option<&Section<'a>> {
        self.sections.iter().find(|s| s.id() == id)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn valid_payload(&self, id: u16) -> Option<&SectionPayload<'a>> {
        self.section(id)
            .filter(|s| s.is_valid())
            .map(|s| &s.payload)
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        match self.valid_payload(HEADER)? {
            SectionPayload::Metadata(m) => Some(m),
            _ => None,
        }
    }

    pub fn huffman_tables(&self) -> Option<&HuffmanTables> {
        match self.valid_payload(HUFFMAN)? {
            SectionPayload::HuffmanTables(t) => Some(t),
            _ => None,
        }
    }

    pub fn lead_definition(&self) -> Option<&LeadDefinition> {
        match self.valid_payload(LEADS)? {
            SectionPayload::LeadDefinition(l) => Some(l),
            _ => None,
        }
    }

    pub fn waveform(&self) -> Option<&Waveform<'a>> {
        match self.valid_payload(RHYTHM)? {
            SectionPayload::Waveform(w) => Some(w),
            _ => None,
        }
    }

    /// How section 6 is stored. `None` when there is no section 6, or when
    /// section 2 is present but invalid.
    pub fn compression_mode(&self) -> Option<CompressionMode> {
        self.section(RHYTHM)?;
        match self.section(HUFFMAN) {
            None => Some(CompressionMode::Plain),
            Some(_) => self.huffman_tables().map(|_| CompressionMode::Huffman),
        }
    }
}

/// Assembles a record in memory; encode it to get bytes.
#[derive(Debug, Default)]
pub struct RecordBuilder<'a> {
    sections: Vec<Section<'a>>,
}

impl<'a> RecordBuilder<'a> {
    fn set(mut self, id: u16, payload: SectionPayload<'a>) -> Self {
        self.sections.retain(|s| s.id() != id);
        self.sections.push(Section::new(id, payload));
        self
    }

    pub fn metadata(self, metadata: Metadata) -> Self {
        self.set(HEADER, SectionPayload::Metadata(metadata))
    }

    /// Selects Huffman coding for the waveform.
    pub fn huffman_tables(self, tables: HuffmanTables) -> Self {
        self.set(HUFFMAN, SectionPayload::HuffmanTables(tables))
    }

    pub fn lead_definition(self, leads: LeadDefinition) -> Self {
        self.set(LEADS, SectionPayload::LeadDefinition(leads))
    }

    pub fn waveform(self, waveform: Waveform<'a>) -> Self {
        self.set(RHYTHM, SectionPayload::Waveform(waveform))
    }

    /// A section carried as raw payload bytes.
    pub fn opaque(self, id: u16, payload: Vec<u8>) -> Self {
        self.set(id, SectionPayload::Opaque(Cow::Owned(payload)))
    }

    /// Sections are ordered by id. The directory lists ids 0 to 11 and any
    /// higher id in use.
    pub fn build(mut self) -> Record<'a> {
        self.sections.retain(|s| s.id() != POINTER);
        self.sections.sort_by_key(Section::id);

        let mut ids: Vec<u16> = (POINTER..=STANDARD_SECTION_MAX).collect();
        ids.extend(
            self.sections
                .iter()
                .map(Section::id)
                .filter(|&id| id > STANDARD_SECTION_MAX),
        );

        let directory = ids.into_iter().map(PointerEntry::absent).collect();

        let mut sections = Vec::with_capacity(self.sections.len() + 1);
        sections.push(Section::new(POINTER, SectionPayload::Directory(directory)));
        sections.extend(self.sections);

        Record::from_parts(RecordHeader::default(), false, None, sections, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::metadata::{FieldValue, TAG_PATIENT_ID};

    #[test]
    fn builder_orders_sections() {
        let record = Record::builder()
            .opaque(42, vec![1, 2, 3])
            .lead_definition(LeadDefinition::simultaneous(&[1], 1))
            .metadata(Metadata::default().with(TAG_PATIENT_ID, FieldValue::Text("7".into())))
            .opaque(42, vec![4])
            .build();

        let ids: Vec<u16> = record.sections().iter().map(Section::id).collect();
        assert_eq!(ids, vec![0, 1, 3, 42]);

        let dir: Vec<u16> = record.directory().iter().map(|e| e.id).collect();
        assert_eq!(dir, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 42]);
        assert!(record.directory().iter().all(|e| !e.is_present()));

        assert_eq!(record.metadata().and_then(Metadata::patient_id), Some("7"));
        assert!(record.waveform().is_none());
        assert!(record.compression_mode().is_none());
        assert_eq!(
            record.section(42).map(|s| &s.payload),
            Some(&SectionPayload::Opaque(Cow::Owned(vec![4])))
        );
        assert_eq!(record.sections()[0].header.reserved, *b"SCPECG");
    }

    #[test]
    fn invalid_sections_hide_payload() {
        let mut record = Record::builder()
            .lead_definition(LeadDefinition::simultaneous(&[1], 1))
            .build();
        record.sections[1].status = SectionStatus::Invalid(DecodeError::TruncatedSection {
            section: 3,
            offset: 0,
        });

        assert!(record.section(LEADS).is_some());
        assert!(record.lead_definition().is_none());
    }
}
