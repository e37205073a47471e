use log::debug;

use crate::process::dispatch;
use crate::structs::pointer::SectionIndex;
use crate::structs::record::{Diagnostic, Record};
use crate::utils::errors::DecodeError;

/// Decodes SCP-ECG records.
///
/// Integrity problems that still leave the record readable are collected
/// as [`Diagnostic`]s on the returned [`Record`] unless their level is at
/// or above the fail level, in which case decoding stops with that error.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    fail_level: log::Level,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
        }
    }
}

impl Decoder {
    /// Fails on the first checksum or section error.
    pub fn strict() -> Self {
        Self {
            fail_level: log::Level::Warn,
        }
    }

    /// Sets the failure level for validation errors.
    ///
    /// - `log::Level::Error`: Only fail on Error level messages (default)
    /// - `log::Level::Warn`: Fail on Warning level and above (strict mode)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }

    pub fn fail_level(&self) -> log::Level {
        self.fail_level
    }

    /// Decodes one record. Sections borrow from `bytes`.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Record<'a>, DecodeError> {
        let mut state = DecoderState {
            fail_level: self.fail_level,
            diagnostics: Vec::new(),
        };

        let index = SectionIndex::read(&mut state, bytes)?;
        let sections = dispatch::dispatch(&mut state, &index)?;

        debug!(
            "Decoded {} sections with {} diagnostics",
            sections.len(),
            state.diagnostics.len()
        );

        Ok(Record::from_parts(
            index.header,
            index.crc_valid,
            Some(index.record),
            sections,
            state.diagnostics,
        ))
    }
}

/// Decodes with the default, lenient fail level.
pub fn decode(bytes: &[u8]) -> Result<Record<'_>, DecodeError> {
    Decoder::default().decode(bytes)
}

/// Per-call decoding state threaded through the section readers.
#[derive(Debug)]
pub struct DecoderState {
    pub fail_level: log::Level,
    pub diagnostics: Vec<Diagnostic>,
}

impl Default for DecoderState {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
            diagnostics: Vec::new(),
        }
    }
}
