//! Patient and acquisition metadata (section 1).
//!
//! Section 1 is a sequence of tag-length-value fields: a one-byte tag, a
//! little-endian u16 length, then the value bytes. Tag 255 terminates the
//! list. Each documented tag has a fixed value shape; values that do not
//! match the shape of their tag are kept as raw bytes so the section can
//! be written back unchanged.
//!
//! Duplicate tags are all retained in order. Lookups return the last one.

use std::fmt::{Display, Formatter};

use log::trace;

use crate::utils::byte_reader::ByteReader;
use crate::utils::byteorder::WriteBytesLe;
use crate::utils::errors::{DecodeError, EncodeError};

pub const TAG_LAST_NAME: u8 = 0;
pub const TAG_FIRST_NAME: u8 = 1;
pub const TAG_PATIENT_ID: u8 = 2;
pub const TAG_SECOND_LAST_NAME: u8 = 3;
pub const TAG_AGE: u8 = 4;
pub const TAG_DATE_OF_BIRTH: u8 = 5;
pub const TAG_HEIGHT: u8 = 6;
pub const TAG_WEIGHT: u8 = 7;
pub const TAG_SEX: u8 = 8;
pub const TAG_RACE: u8 = 9;
pub const TAG_SYSTOLIC_PRESSURE: u8 = 11;
pub const TAG_DIASTOLIC_PRESSURE: u8 = 12;
pub const TAG_ACQUIRING_INSTITUTION: u8 = 16;
pub const TAG_REFERRING_PHYSICIAN: u8 = 20;
pub const TAG_TECHNICIAN: u8 = 22;
pub const TAG_STAT_CODE: u8 = 24;
pub const TAG_ACQUISITION_DATE: u8 = 25;
pub const TAG_ACQUISITION_TIME: u8 = 26;
pub const TAG_BASELINE_FILTER: u8 = 27;
pub const TAG_LOW_PASS_FILTER: u8 = 28;
pub const TAG_FILTER_BITMAP: u8 = 29;
pub const TAG_FREE_TEXT: u8 = 30;
pub const TAG_SEQUENCE_NUMBER: u8 = 31;
pub const TAG_TERMINATOR: u8 = 255;

const FIELD_HEADER_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Text,
    Date,
    Time,
    Quantity,
    Code,
    Number,
    Raw,
}

fn field_kind(tag: u8) -> FieldKind {
    match tag {
        0..=3 | 13 | 16..=23 | 30 | 31 | 35 => FieldKind::Text,
        5 | 25 => FieldKind::Date,
        26 => FieldKind::Time,
        4 | 6 | 7 => FieldKind::Quantity,
        8 | 9 | 24 | 29 => FieldKind::Code,
        11 | 12 | 27 | 28 => FieldKind::Number,
        _ => FieldKind::Raw,
    }
}

/// Calendar date; zero components mean "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl Display for Date {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Display for Time {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Unknown,
    Male,
    Female,
    Unspecified,
    Other(u8),
}

impl From<u8> for Sex {
    fn from(value: u8) -> Self {
        match value {
            0 => Sex::Unknown,
            1 => Sex::Male,
            2 => Sex::Female,
            9 => Sex::Unspecified,
            v => Sex::Other(v),
        }
    }
}

impl Display for Sex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Sex::Unknown => write!(f, "Unknown"),
            Sex::Male => write!(f, "Male"),
            Sex::Female => write!(f, "Female"),
            Sex::Unspecified => write!(f, "Unspecified"),
            Sex::Other(v) => write!(f, "Code {v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// NUL-terminated text, stored without the terminator.
    Text(String),
    Date(Date),
    Time(Time),
    /// Value with a unit code, e.g. age in years or height in cm.
    Quantity { value: u16, unit: u8 },
    Code(u8),
    Number(u16),
    Raw(Vec<u8>),
}

impl FieldValue {
    pub fn parse(tag: u8, bytes: &[u8]) -> Self {
        let mut reader = ByteReader::new(bytes);

        let typed = match (field_kind(tag), bytes.len()) {
            (FieldKind::Text, _) => Self::parse_text(bytes),
            (FieldKind::Date, 4) => Some(FieldValue::Date(Date {
                year: reader.u16().unwrap_or_default(),
                month: bytes[2],
                day: bytes[3],
            })),
            (FieldKind::Time, 3) => Some(FieldValue::Time(Time {
                hour: bytes[0],
                minute: bytes[1],
                second: bytes[2],
            })),
            (FieldKind::Quantity, 3) => Some(FieldValue::Quantity {
                value: reader.u16().unwrap_or_default(),
                unit: bytes[2],
            }),
            (FieldKind::Code, 1) => Some(FieldValue::Code(bytes[0])),
            (FieldKind::Number, 2) => reader.u16().map(FieldValue::Number),
            _ => None,
        };

        typed.unwrap_or_else(|| FieldValue::Raw(bytes.to_vec()))
    }

    fn parse_text(bytes: &[u8]) -> Option<Self> {
        let (&last, body) = bytes.split_last()?;
        if last != 0 || body.contains(&0) {
            return None;
        }

        std::str::from_utf8(body)
            .ok()
            .map(|s| FieldValue::Text(s.to_owned()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            FieldValue::Text(s) => {
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            FieldValue::Date(d) => out.extend(crate::join_bytes_le!(d.year, d.month, d.day)),
            FieldValue::Time(t) => out.extend_from_slice(&[t.hour, t.minute, t.second]),
            FieldValue::Quantity { value, unit } => {
                value.write_le(&mut out);
                out.push(*unit);
            }
            FieldValue::Code(c) => out.push(*c),
            FieldValue::Number(n) => n.write_le(&mut out),
            FieldValue::Raw(bytes) => out.extend_from_slice(bytes),
        }
        out
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::Date(d) => write!(f, "{d}"),
            FieldValue::Time(t) => write!(f, "{t}"),
            FieldValue::Quantity { value, unit } => write!(f, "{value} (unit {unit})"),
            FieldValue::Code(c) => write!(f, "{c}"),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Raw(bytes) => {
                for b in bytes {
                    write!(f, "{b:02X}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub tag: u8,
    pub value: FieldValue,
}

/// Decoded section 1.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    /// Fields in stored order, the terminator included when present.
    pub fields: Vec<Field>,
    /// Bytes after the terminator or too short to hold a field header.
    pub trailing: Vec<u8>,
}

impl Metadata {
    /// Decodes a section 1 payload starting at record offset `base_offset`.
    pub fn read(section: u16, base_offset: usize, payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(payload);
        let mut metadata = Metadata::default();

        while reader.remaining() >= FIELD_HEADER_SIZE {
            let start = reader.position();
            let tag = reader.u8().unwrap_or_default();
            let length = reader.u16().unwrap_or_default() as usize;

            let value = reader.bytes(length).ok_or(DecodeError::TruncatedField {
                section,
                tag,
                offset: base_offset + start,
            })?;

            let value = FieldValue::parse(tag, value);
            trace!("Metadata tag {tag} ({length} bytes): {value}");
            metadata.fields.push(Field { tag, value });

            if tag == TAG_TERMINATOR {
                break;
            }
        }

        metadata.trailing = reader.rest().to_vec();

        Ok(metadata)
    }

    pub fn write(&self, dst: &mut Vec<u8>) -> Result<(), EncodeError> {
        for field in &self.fields {
            let bytes = field.value.to_bytes();
            let length = u16::try_from(bytes.len()).map_err(|_| EncodeError::FieldTooLong {
                tag: field.tag,
                length: bytes.len(),
            })?;

            dst.push(field.tag);
            length.write_le(dst);
            dst.extend_from_slice(&bytes);
        }

        dst.extend_from_slice(&self.trailing);
        Ok(())
    }

    /// Appends a field ahead of the terminator, adding a terminator if
    /// there is none yet.
    pub fn push(&mut self, tag: u8, value: FieldValue) {
        let terminator = self
            .fields
            .iter()
            .rposition(|f| f.tag == TAG_TERMINATOR)
            .map(|i| self.fields.remove(i))
            .unwrap_or(Field {
                tag: TAG_TERMINATOR,
                value: FieldValue::Raw(Vec::new()),
            });

        self.fields.push(Field { tag, value });
        self.fields.push(terminator);
    }

    pub fn with(mut self, tag: u8, value: FieldValue) -> Self {
        self.push(tag, value);
        self
    }

    /// Last value stored under `tag`.
    pub fn get(&self, tag: u8) -> Option<&FieldValue> {
        self.fields
            .iter()
            .rev()
            .find(|f| f.tag == tag)
            .map(|f| &f.value)
    }

    pub fn text(&self, tag: u8) -> Option<&str> {
        self.get(tag).and_then(FieldValue::as_text)
    }

    pub fn date(&self, tag: u8) -> Option<Date> {
        match self.get(tag)? {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// First and last name joined by a space, whichever are present.
    pub fn patient_name(&self) -> Option<String> {
        let parts: Vec<&str> = [TAG_FIRST_NAME, TAG_LAST_NAME]
            .into_iter()
            .filter_map(|tag| self.text(tag))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.text(TAG_PATIENT_ID)
    }

    pub fn date_of_birth(&self) -> Option<Date> {
        self.date(TAG_DATE_OF_BIRTH)
    }

    pub fn sex(&self) -> Option<Sex> {
        match self.get(TAG_SEX)? {
            FieldValue::Code(c) => Some(Sex::from(*c)),
            _ => None,
        }
    }

    /// Age value and unit code (1 = years, 2 = months, ...).
    pub fn age(&self) -> Option<(u16, u8)> {
        match self.get(TAG_AGE)? {
            FieldValue::Quantity { value, unit } => Some((*value, *unit)),
            _ => None,
        }
    }

    pub fn acquisition_date(&self) -> Option<Date> {
        self.date(TAG_ACQUISITION_DATE)
    }

    pub fn acquisition_time(&self) -> Option<Time> {
        match self.get(TAG_ACQUISITION_TIME)? {
            FieldValue::Time(t) => Some(*t),
            _ => None,
        }
    }
}
