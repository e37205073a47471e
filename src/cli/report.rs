use serde::Serialize;

use scpecg::structs::metadata::{FieldValue, Metadata, TAG_TERMINATOR};
use scpecg::structs::rhythm::Waveform;
use scpecg::{Record, SectionStatus};

/// Serializable summary of a decoded record.
#[derive(Debug, Serialize)]
pub struct RecordReport {
    pub length: u32,
    pub crc: String,
    pub crc_valid: bool,
    pub sections: Vec<SectionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<PatientReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rhythm: Option<RhythmReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SectionReport {
    pub id: u16,
    pub kind: &'static str,
    pub length: u32,
    pub version: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct PatientReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquired: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FieldReport {
    pub tag: u8,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct RhythmReport {
    pub compression: String,
    pub difference_order: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    pub avm_nv: u16,
    pub leads: Vec<LeadReport>,
}

#[derive(Debug, Serialize)]
pub struct LeadReport {
    pub id: u8,
    pub name: String,
    pub samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordReport {
    pub fn new(record: &Record) -> Self {
        let sections = record
            .sections()
            .iter()
            .map(|section| SectionReport {
                id: section.id(),
                kind: section.payload.kind(),
                length: section.header.length,
                version: section.header.version,
                error: match &section.status {
                    SectionStatus::Valid => None,
                    SectionStatus::Invalid(e) => Some(e.to_string()),
                },
            })
            .collect();

        let fields = record
            .metadata()
            .map(|m| {
                m.fields
                    .iter()
                    .filter(|f| f.tag != TAG_TERMINATOR)
                    .map(|f| FieldReport {
                        tag: f.tag,
                        value: f.value.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            length: record.length(),
            crc: format!("0x{:04X}", record.crc()),
            crc_valid: record.crc_valid(),
            sections,
            patient: record.metadata().map(PatientReport::new),
            fields,
            rhythm: record.waveform().map(|w| RhythmReport::new(record, w)),
            diagnostics: record.diagnostics().iter().map(|d| d.to_string()).collect(),
        }
    }
}

impl PatientReport {
    fn new(metadata: &Metadata) -> Self {
        let acquired = match (metadata.acquisition_date(), metadata.acquisition_time()) {
            (Some(d), Some(t)) => Some(format!("{d} {t}")),
            (Some(d), None) => Some(d.to_string()),
            (None, Some(t)) => Some(t.to_string()),
            (None, None) => None,
        };

        Self {
            name: metadata.patient_name(),
            id: metadata.patient_id().map(str::to_string),
            date_of_birth: metadata.date_of_birth().map(|d| d.to_string()),
            age: metadata.age().map(|(value, _)| value),
            sex: metadata.sex().map(|s| s.to_string()),
            acquired,
        }
    }
}

impl RhythmReport {
    fn new(record: &Record, waveform: &Waveform) -> Self {
        let names: Vec<String> = lead_names(record, waveform);

        let leads = waveform
            .leads()
            .iter()
            .zip(names)
            .map(|(lead, name)| LeadReport {
                id: lead.id(),
                name,
                samples: lead.samples().len(),
                error: lead.error().map(|e| e.to_string()),
            })
            .collect();

        let longest = waveform
            .leads()
            .iter()
            .map(|l| l.samples().len())
            .max()
            .unwrap_or(0);

        Self {
            compression: record
                .compression_mode()
                .map(|m| m.to_string())
                .unwrap_or_default(),
            difference_order: u8::from(waveform.difference_order),
            sample_rate: waveform.sample_rate(),
            duration: waveform
                .sample_rate()
                .map(|rate| time_str(longest as f64 / rate)),
            avm_nv: waveform.avm,
            leads,
        }
    }
}

/// Display names for the leads of `waveform`, from section 3 when present.
pub fn lead_names(record: &Record, waveform: &Waveform) -> Vec<String> {
    let defined = record.lead_definition().map(|d| d.leads.as_slice());
    waveform
        .leads()
        .iter()
        .enumerate()
        .map(|(i, lead)| match defined.and_then(|d| d.get(i)) {
            Some(entry) => entry.name(),
            None => format!("Lead {}", lead.id()),
        })
        .collect()
}

pub fn time_str(sec: f64) -> String {
    let ms = sec * 1000f64;
    let minutes = (ms / 60000f64) as u64;
    let seconds = ((ms % 60000f64) / 1000f64) as u64;
    let milliseconds = (ms % 1000f64) as u64;

    format!("{minutes:02}:{seconds:02}.{milliseconds:03}")
}

/// Text rendering used in the info report.
pub fn field_label(tag: u8, value: &FieldValue) -> String {
    match value {
        FieldValue::Raw(bytes) => format!("Tag {tag} ({} bytes)", bytes.len()),
        _ => format!("Tag {tag}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_durations() {
        assert_eq!(time_str(10.0), "00:10.000");
        assert_eq!(time_str(61.25), "01:01.250");
    }
}
