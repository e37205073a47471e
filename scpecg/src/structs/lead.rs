//! Lead definition (section 3).

use log::debug;
use scpecgd_macros::ToBytes;

use crate::utils::byte_reader::ByteReader;
use crate::utils::byteorder::WriteBytesLe;
use crate::utils::errors::{DecodeError, EncodeError};

const LEAD_ENTRY_SIZE: usize = 9;

const FLAG_REFERENCE_BEAT_SUBTRACTED: u8 = 0x01;
const FLAG_ALL_SIMULTANEOUS: u8 = 0x04;

/// Standard lead names by lead id.
pub fn lead_name(id: u8) -> Option<&'static str> {
    Some(match id {
        1 => "I",
        2 => "II",
        3 => "V1",
        4 => "V2",
        5 => "V3",
        6 => "V4",
        7 => "V5",
        8 => "V6",
        9 => "V7",
        10 => "V2R",
        11 => "V3R",
        12 => "V4R",
        13 => "V5R",
        14 => "V6R",
        15 => "V7R",
        16 => "X",
        17 => "Y",
        18 => "Z",
        61 => "III",
        62 => "aVR",
        63 => "aVL",
        64 => "aVF",
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToBytes)]
pub struct LeadEntry {
    /// 1-based index of the first sample.
    pub start_sample: u32,
    /// 1-based index of the last sample, inclusive.
    pub end_sample: u32,
    pub lead_id: u8,
}

impl LeadEntry {
    pub fn new(lead_id: u8, samples: u32) -> Self {
        Self {
            start_sample: 1,
            end_sample: samples,
            lead_id,
        }
    }

    pub fn sample_count(&self) -> usize {
        (self.end_sample as i64 - self.start_sample as i64 + 1).max(0) as usize
    }

    pub fn name(&self) -> String {
        lead_name(self.lead_id)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Lead {}", self.lead_id))
    }
}

/// Decoded section 3.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeadDefinition {
    pub flags: u8,
    pub leads: Vec<LeadEntry>,
    pub trailing: Vec<u8>,
}

impl LeadDefinition {
    /// Leads recorded together over the same sample range.
    pub fn simultaneous(lead_ids: &[u8], samples: u32) -> Self {
        let count = lead_ids.len().min(0x1F) as u8;
        Self {
            flags: FLAG_ALL_SIMULTANEOUS | (count << 3),
            leads: lead_ids
                .iter()
                .map(|&id| LeadEntry::new(id, samples))
                .collect(),
            trailing: Vec::new(),
        }
    }

    pub fn read(section: u16, base_offset: usize, payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(payload);
        let truncated = |reader: &ByteReader| DecodeError::TruncatedSection {
            section,
            offset: base_offset + reader.position(),
        };

        let count = reader.u8().ok_or_else(|| truncated(&reader))? as usize;
        let flags = reader.u8().ok_or_else(|| truncated(&reader))?;

        if reader.remaining() < count * LEAD_ENTRY_SIZE {
            return Err(truncated(&reader));
        }

        let mut leads = Vec::with_capacity(count);
        for _ in 0..count {
            let lead = LeadEntry {
                start_sample: reader.u32().ok_or_else(|| truncated(&reader))?,
                end_sample: reader.u32().ok_or_else(|| truncated(&reader))?,
                lead_id: reader.u8().ok_or_else(|| truncated(&reader))?,
            };
            debug!(
                "Lead {}: samples {}..={} ({} samples)",
                lead.name(),
                lead.start_sample,
                lead.end_sample,
                lead.sample_count()
            );
            leads.push(lead);
        }

        Ok(Self {
            flags,
            leads,
            trailing: reader.rest().to_vec(),
        })
    }

    pub fn write(&self, dst: &mut Vec<u8>) -> Result<(), EncodeError> {
        let count = u8::try_from(self.leads.len()).map_err(|_| EncodeError::SectionTooLarge {
            section: super::LEADS,
            length: self.leads.len(),
        })?;

        count.write_le(dst);
        self.flags.write_le(dst);
        self.leads.iter().for_each(|lead| lead.write_le(dst));
        dst.extend_from_slice(&self.trailing);
        Ok(())
    }

    pub fn reference_beat_subtracted(&self) -> bool {
        self.flags & FLAG_REFERENCE_BEAT_SUBTRACTED != 0
    }

    pub fn all_simultaneous(&self) -> bool {
        self.flags & FLAG_ALL_SIMULTANEOUS != 0
    }

    pub fn simultaneous_count(&self) -> u8 {
        self.flags >> 3
    }

    pub fn sample_counts(&self) -> Vec<usize> {
        self.leads.iter().map(LeadEntry::sample_count).collect()
    }
}

#[test]
fn lead_section_layout() {
    let def = LeadDefinition::simultaneous(&[1, 2, 61], 500);
    assert!(def.all_simultaneous());
    assert!(!def.reference_beat_subtracted());
    assert_eq!(def.simultaneous_count(), 3);

    let mut out = Vec::new();
    def.write(&mut out).unwrap();
    assert_eq!(out.len(), 2 + 3 * LEAD_ENTRY_SIZE);
    assert_eq!(&out[..11], &[3, 0x1C, 1, 0, 0, 0, 0xF4, 0x01, 0, 0, 1]);

    let parsed = LeadDefinition::read(3, 0, &out).unwrap();
    assert_eq!(parsed, def);
    assert_eq!(parsed.leads[2].name(), "III");
    assert_eq!(parsed.sample_counts(), vec![500, 500, 500]);
}

#[test]
fn lead_section_truncated() {
    let err = LeadDefinition::read(3, 50, &[2, 0, 1, 0, 0, 0]).unwrap_err();
    assert_eq!(
        err,
        DecodeError::TruncatedSection {
            section: 3,
            offset: 52
        }
    );
}

#[test]
fn inverted_range_has_no_samples() {
    let lead = LeadEntry {
        start_sample: 10,
        end_sample: 5,
        lead_id: 99,
    };
    assert_eq!(lead.sample_count(), 0);
    assert_eq!(lead.name(), "Lead 99");
}
