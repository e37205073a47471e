/// Reports a recoverable finding.
///
/// When `$level` is at or above the decoder's fail level the error is
/// returned; otherwise it is logged and recorded as a diagnostic.
#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $section:expr, $lead:expr, $err:expr $(,)?) => {{
        let err = $err;
        if $level <= $state.fail_level {
            return Err(err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", err),
                ::log::Level::Warn => ::log::warn!("{}", err),
                ::log::Level::Info => ::log::info!("{}", err),
                ::log::Level::Debug => ::log::debug!("{}", err),
                ::log::Level::Trace => ::log::trace!("{}", err),
            }
            $state.diagnostics.push($crate::structs::record::Diagnostic {
                section: $section,
                lead: $lead,
                level: $level,
                error: err,
            });
        }
    }};
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Record truncated: {declared} bytes declared, {actual} bytes available")]
    TruncatedInput { declared: usize, actual: usize },

    #[error("Pointer section not found at offset {offset}: read section id {found}")]
    MissingDirectory { offset: usize, found: u16 },

    #[error("Pointer section length {length} does not hold a whole number of 10-byte entries")]
    DirectoryCorrupt { length: u32 },

    #[error(
        "Section {id} at offset {offset} with length {length} exceeds record length {record_length}"
    )]
    SectionOutOfBounds {
        id: u16,
        offset: usize,
        length: usize,
        record_length: usize,
    },

    #[error("Section {id} at offset {offset} overlaps section {previous}")]
    SectionOverlap {
        id: u16,
        previous: u16,
        offset: usize,
    },

    #[error(
        "Section {id} header disagrees with directory: header id {header_id}, length {header_length} (directory {directory_length})"
    )]
    SectionHeaderMismatch {
        id: u16,
        header_id: u16,
        header_length: u32,
        directory_length: u32,
    },

    #[error(
        "CRC failed on section {id} at offset {offset}. Calculated {calculated:#06X}, Read {read:#06X}"
    )]
    SectionChecksumInvalid {
        id: u16,
        offset: usize,
        calculated: u16,
        read: u16,
    },

    #[error("Field tag {tag} at offset {offset} of section {section} runs past the section end")]
    TruncatedField {
        section: u16,
        tag: u8,
        offset: usize,
    },

    #[error("Section {section} is truncated at offset {offset}")]
    TruncatedSection { section: u16, offset: usize },

    #[error("Section {section} uses Huffman coding but no usable code table is present")]
    MissingCodeTable { section: u16 },

    #[error("Invalid Huffman table {table}, code {code}: {reason}")]
    InvalidCodeTable {
        table: usize,
        code: usize,
        reason: &'static str,
    },

    #[error("Section {section} needs the lead definition section, which is absent or invalid")]
    MissingLeadDefinition { section: u16 },

    #[error("Section {section} declares {found} leads, lead definition declares {expected}")]
    LeadCountMismatch {
        section: u16,
        expected: usize,
        found: usize,
    },

    #[error("Lead {lead} bitstream ends inside a code at bit {bit_position}")]
    BitstreamMisaligned { lead: usize, bit_position: u64 },

    #[error("Lead {lead} bitstream holds no code matching the bits at {bit_position}")]
    UndecodableCode { lead: usize, bit_position: u64 },

    #[error("Section {section} declares unsupported difference order {value}")]
    UnsupportedEncoding { section: u16, value: u8 },

    #[error("Lead {lead} ran out of data after {decoded} of {expected} samples")]
    IncompleteWaveform {
        lead: usize,
        decoded: usize,
        expected: usize,
    },

    #[error("Record CRC failed. Calculated {calculated:#06X}, Read {read:#06X}")]
    ChecksumMismatch { calculated: u16, read: u16 },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Section {section} requires the lead definition section")]
    MissingLeadDefinition { section: u16 },

    #[error("Waveform has {found} leads, lead definition declares {expected}")]
    LeadCountMismatch { expected: usize, found: usize },

    #[error("Lead {lead} has {found} samples, lead definition declares {expected}")]
    SampleCountMismatch {
        lead: usize,
        expected: usize,
        found: usize,
    },

    #[error("Lead {lead}: value {value} does not fit a 16-bit sample")]
    ValueOutOfRange { lead: usize, value: i32 },

    #[error("Lead {lead}: value {value} has no code in Huffman table 1")]
    UnencodableValue { lead: usize, value: i32 },

    #[error("Lead {lead} encodes to {length} bytes, more than 65535")]
    LeadTooLong { lead: usize, length: usize },

    #[error("Section {section} is {length} bytes, which does not fit its length field")]
    SectionTooLarge { section: u16, length: usize },

    #[error("Metadata field {tag} holds {length} bytes, more than 65535")]
    FieldTooLong { tag: u8, length: usize },

    #[error("Huffman section holds {count} entries, more than a 16-bit count allows")]
    TableTooLarge { count: usize },

    #[error("Section {section} appears more than once")]
    DuplicateSection { section: u16 },

    #[error("Record is {length} bytes, more than a 32-bit length allows")]
    RecordTooLarge { length: usize },
}
