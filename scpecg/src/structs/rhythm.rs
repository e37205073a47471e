//! Rhythm data (section 6) and the per-lead sample decoder.
//!
//! ```text
//! u16  amplitude value multiplier, nV per count
//! u16  sample interval, µs
//! u8   difference order: 0 none, 1 first, 2 second
//! u8   bimodal compression flag
//! u16  encoded byte length, once per lead of section 3
//! ...  lead data, concatenated in lead order
//! ```
//!
//! With section 2 present, lead data is a Huffman bitstream; otherwise it
//! is little-endian i16 values. Either way the values are residuals of the
//! declared difference order.

use std::fmt::{Display, Formatter};

use log::Level::Warn;
use log::{debug, trace, warn};

use crate::log_or_err;
use crate::process::decode::DecoderState;
use crate::structs::huffman::{CodeBook, SymbolError};
use crate::structs::lead::LeadDefinition;
use crate::utils::bitstream_io::{BsIoSliceReader, BsIoVecWriter};
use crate::utils::byte_reader::ByteReader;
use crate::utils::byteorder::WriteBytesLe;
use crate::utils::errors::{DecodeError, EncodeError};

const RHYTHM_HEADER_SIZE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DifferenceOrder {
    #[default]
    None,
    First,
    Second,
}

impl DifferenceOrder {
    /// Samples stored literally at the start of each lead.
    fn literal_samples(self) -> usize {
        match self {
            DifferenceOrder::None => usize::MAX,
            DifferenceOrder::First => 1,
            DifferenceOrder::Second => 2,
        }
    }

    /// Value predicted from the previous two samples.
    #[inline]
    fn predict(self, prev: i32, prev2: i32) -> i32 {
        match self {
            DifferenceOrder::None => 0,
            DifferenceOrder::First => prev,
            DifferenceOrder::Second => prev.wrapping_mul(2).wrapping_sub(prev2),
        }
    }
}

impl From<DifferenceOrder> for u8 {
    fn from(value: DifferenceOrder) -> Self {
        match value {
            DifferenceOrder::None => 0,
            DifferenceOrder::First => 1,
            DifferenceOrder::Second => 2,
        }
    }
}

impl TryFrom<u8> for DifferenceOrder {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DifferenceOrder::None),
            1 => Ok(DifferenceOrder::First),
            2 => Ok(DifferenceOrder::Second),
            v => Err(v),
        }
    }
}

/// How lead data is stored, decided by the presence of section 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    Plain,
    Huffman,
}

impl Display for CompressionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressionMode::Plain => write!(f, "16-bit"),
            CompressionMode::Huffman => write!(f, "Huffman"),
        }
    }
}

/// One lead of reconstructed samples.
///
/// A lead read from a record keeps the bytes it was decoded from and
/// writes them back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lead<'a> {
    id: u8,
    samples: Vec<i32>,
    encoded: Option<&'a [u8]>,
    error: Option<DecodeError>,
}

impl Lead<'static> {
    pub fn new(id: u8, samples: Vec<i32>) -> Self {
        Self {
            id,
            samples,
            encoded: None,
            error: None,
        }
    }
}

impl<'a> Lead<'a> {
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    pub fn encoded(&self) -> Option<&'a [u8]> {
        self.encoded
    }

    /// Why decoding stopped early; the missing samples are zero.
    pub fn error(&self) -> Option<&DecodeError> {
        self.error.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeadDecoderState {
    AwaitingLiteralSamples,
    AccumulatingResidual,
    Reconstructing(i32),
    Done,
    Failed,
}

/// Lazily reconstructs the samples of one lead.
///
/// Yields `Ok(sample)` until the declared count is reached, or a single
/// `Err` after which the lead is finished. Build a new decoder to restart.
pub struct LeadDecoder<'a> {
    lead: usize,
    reader: BsIoSliceReader<'a>,
    codebook: Option<&'a CodeBook>,
    order: DifferenceOrder,
    table: usize,
    expected: usize,
    decoded: usize,
    prev: i32,
    prev2: i32,
    state: LeadDecoderState,
}

impl<'a> LeadDecoder<'a> {
    pub fn new(
        lead: usize,
        data: &'a [u8],
        codebook: Option<&'a CodeBook>,
        order: DifferenceOrder,
        expected: usize,
    ) -> Self {
        Self {
            lead,
            reader: BsIoSliceReader::from_slice(data),
            codebook,
            order,
            table: 0,
            expected,
            decoded: 0,
            prev: 0,
            prev2: 0,
            state: LeadDecoderState::AwaitingLiteralSamples,
        }
    }

    pub fn decoded(&self) -> usize {
        self.decoded
    }

    fn read_value(&mut self) -> Result<i32, DecodeError> {
        let lead = self.lead;
        let incomplete = DecodeError::IncompleteWaveform {
            lead,
            decoded: self.decoded,
            expected: self.expected,
        };

        match self.codebook {
            Some(book) => book
                .decode(&mut self.table, &mut self.reader)
                .map_err(|e| match e {
                    SymbolError::EndOfData => incomplete,
                    SymbolError::Truncated { bit_position } => DecodeError::BitstreamMisaligned {
                        lead,
                        bit_position,
                    },
                    SymbolError::Undecodable { bit_position } => {
                        DecodeError::UndecodableCode { lead, bit_position }
                    }
                }),
            None => {
                let bit_position = self.reader.position().unwrap_or_default();
                let misaligned = DecodeError::BitstreamMisaligned {
                    lead,
                    bit_position,
                };

                match self.reader.available() {
                    Ok(0) => Err(incomplete),
                    Ok(n) if n < 16 => Err(misaligned),
                    Ok(_) => self
                        .reader
                        .get_n::<u16>(16)
                        .map(|v| v.swap_bytes() as i16 as i32)
                        .map_err(|_| misaligned),
                    Err(_) => Err(misaligned),
                }
            }
        }
    }

    fn emit(&mut self, sample: i32) -> Option<Result<i32, DecodeError>> {
        self.prev2 = self.prev;
        self.prev = sample;
        self.decoded += 1;
        Some(Ok(sample))
    }

    fn fail(&mut self, err: DecodeError) -> Option<Result<i32, DecodeError>> {
        self.state = LeadDecoderState::Failed;
        Some(Err(err))
    }
}

impl Iterator for LeadDecoder<'_> {
    type Item = Result<i32, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                LeadDecoderState::Done | LeadDecoderState::Failed => return None,
                _ if self.decoded >= self.expected => {
                    self.state = LeadDecoderState::Done;
                }
                LeadDecoderState::AwaitingLiteralSamples => {
                    if self.decoded >= self.order.literal_samples() {
                        self.state = LeadDecoderState::AccumulatingResidual;
                        continue;
                    }

                    return match self.read_value() {
                        Ok(sample) => self.emit(sample),
                        Err(err) => self.fail(err),
                    };
                }
                LeadDecoderState::AccumulatingResidual => match self.read_value() {
                    Ok(residual) => self.state = LeadDecoderState::Reconstructing(residual),
                    Err(err) => return self.fail(err),
                },
                LeadDecoderState::Reconstructing(residual) => {
                    let sample = self
                        .order
                        .predict(self.prev, self.prev2)
                        .wrapping_add(residual);
                    self.state = LeadDecoderState::AccumulatingResidual;
                    return self.emit(sample);
                }
            }
        }
    }
}

/// Section 6 split into per-lead byte ranges.
#[derive(Debug, Clone)]
struct RhythmData<'a> {
    avm: u16,
    sample_interval: u16,
    difference_order: u8,
    bimodal: u8,
    leads: Vec<&'a [u8]>,
    trailing: &'a [u8],
}

impl<'a> RhythmData<'a> {
    fn read(
        section: u16,
        base_offset: usize,
        payload: &'a [u8],
        lead_count: usize,
    ) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(payload);
        let truncated = |reader: &ByteReader| DecodeError::TruncatedSection {
            section,
            offset: base_offset + reader.position(),
        };

        if reader.remaining() < RHYTHM_HEADER_SIZE {
            return Err(truncated(&reader));
        }

        let avm = reader.u16().unwrap_or_default();
        let sample_interval = reader.u16().unwrap_or_default();
        let difference_order = reader.u8().unwrap_or_default();
        let bimodal = reader.u8().unwrap_or_default();

        if reader.remaining() < lead_count * 2 {
            return Err(DecodeError::LeadCountMismatch {
                section,
                expected: lead_count,
                found: reader.remaining() / 2,
            });
        }

        let lengths: Vec<usize> = (0..lead_count)
            .map(|_| reader.u16().unwrap_or_default() as usize)
            .collect();

        let leads = lengths
            .iter()
            .map(|&len| reader.bytes(len).ok_or_else(|| truncated(&reader)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            avm,
            sample_interval,
            difference_order,
            bimodal,
            leads,
            trailing: reader.rest(),
        })
    }
}

/// Decoded section 6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waveform<'a> {
    /// Amplitude value multiplier in nanovolts per count.
    pub avm: u16,
    /// Sample interval in microseconds.
    pub sample_interval: u16,
    pub difference_order: DifferenceOrder,
    /// Nonzero when bimodal compression was used. Preserved, not undone.
    pub bimodal: u8,
    leads: Vec<Lead<'a>>,
    pub trailing: Vec<u8>,
}

impl<'a> Waveform<'a> {
    pub fn new(
        avm: u16,
        sample_interval: u16,
        difference_order: DifferenceOrder,
        leads: Vec<Lead<'a>>,
    ) -> Self {
        Self {
            avm,
            sample_interval,
            difference_order,
            bimodal: 0,
            leads,
            trailing: Vec::new(),
        }
    }

    pub fn leads(&self) -> &[Lead<'a>] {
        &self.leads
    }

    pub fn lead(&self, index: usize) -> Option<&Lead<'a>> {
        self.leads.get(index)
    }

    /// Copy whose leads are compressed from their samples when written.
    pub fn without_encoded(&self) -> Waveform<'static> {
        Waveform {
            avm: self.avm,
            sample_interval: self.sample_interval,
            difference_order: self.difference_order,
            bimodal: self.bimodal,
            leads: self
                .leads
                .iter()
                .map(|lead| Lead::new(lead.id, lead.samples.clone()))
                .collect(),
            trailing: self.trailing.clone(),
        }
    }

    pub fn sample_rate(&self) -> Option<f64> {
        (self.sample_interval != 0).then(|| 1_000_000.0 / self.sample_interval as f64)
    }

    /// Converts a sample to microvolts.
    pub fn microvolts(&self, sample: i32) -> f64 {
        sample as f64 * self.avm as f64 / 1000.0
    }

    /// Decodes every lead. `codebook` is `None` for 16-bit data.
    ///
    /// Section-level problems are returned. Per-lead problems are recorded
    /// on the lead and as diagnostics, and the lead is zero-filled to its
    /// declared count, capped at the most samples any lead of the section
    /// can hold.
    pub fn read(
        state: &mut DecoderState,
        section: u16,
        base_offset: usize,
        payload: &'a [u8],
        lead_def: Option<&LeadDefinition>,
        codebook: Result<Option<&CodeBook>, DecodeError>,
    ) -> Result<Self, DecodeError> {
        let lead_def = lead_def.ok_or(DecodeError::MissingLeadDefinition { section })?;
        let codebook = codebook?;

        let data = RhythmData::read(section, base_offset, payload, lead_def.leads.len())?;

        let difference_order = DifferenceOrder::try_from(data.difference_order)
            .map_err(|value| DecodeError::UnsupportedEncoding { section, value })?;

        debug!(
            "Rhythm data: {} leads, AVM {} nV, interval {} us, {:?} difference, {}",
            data.leads.len(),
            data.avm,
            data.sample_interval,
            difference_order,
            if codebook.is_some() { "Huffman" } else { "16-bit" }
        );

        if data.bimodal != 0 {
            warn!("Section {section} uses bimodal compression; samples are not rescaled");
        }
        if lead_def.reference_beat_subtracted() {
            warn!("Reference beat subtraction is flagged; samples are residuals");
        }

        // Most samples `len` bytes can hold: one bit per Huffman code,
        // two bytes per 16-bit sample.
        let capacity = |len: usize| match codebook {
            Some(_) => len.saturating_mul(8),
            None => len / 2,
        };
        // Failed leads are zero-filled up to this many samples at most.
        let fill_limit = data
            .leads
            .iter()
            .map(|bytes| capacity(bytes.len()))
            .max()
            .unwrap_or(0);

        let mut leads = Vec::with_capacity(data.leads.len());
        for (i, (entry, bytes)) in lead_def.leads.iter().zip(&data.leads).enumerate() {
            let expected = entry.sample_count();
            if expected > fill_limit {
                debug!(
                    "Lead {i} declares {expected} samples; the section holds at most {fill_limit}"
                );
            }

            let mut samples = Vec::with_capacity(expected.min(capacity(bytes.len())));
            let mut error = None;

            for sample in LeadDecoder::new(i, bytes, codebook, difference_order, expected) {
                match sample {
                    Ok(s) => samples.push(s),
                    Err(err) => error = Some(err),
                }
            }

            if let Some(err) = &error {
                log_or_err!(state, Warn, Some(section), Some(i), err.clone());
                samples.resize(expected.min(fill_limit).max(samples.len()), 0);
            }

            trace!("Lead {i}: {} samples from {} bytes", samples.len(), bytes.len());

            leads.push(Lead {
                id: entry.lead_id,
                samples,
                encoded: Some(*bytes),
                error,
            });
        }

        Ok(Self {
            avm: data.avm,
            sample_interval: data.sample_interval,
            difference_order,
            bimodal: data.bimodal,
            leads,
            trailing: data.trailing.to_vec(),
        })
    }

    pub fn write(
        &self,
        section: u16,
        dst: &mut Vec<u8>,
        lead_def: Option<&LeadDefinition>,
        codebook: Option<&CodeBook>,
    ) -> Result<(), EncodeError> {
        let lead_def = lead_def.ok_or(EncodeError::MissingLeadDefinition { section })?;

        if self.leads.len() != lead_def.leads.len() {
            return Err(EncodeError::LeadCountMismatch {
                expected: lead_def.leads.len(),
                found: self.leads.len(),
            });
        }

        let mut encoded = Vec::with_capacity(self.leads.len());
        for (i, (lead, entry)) in self.leads.iter().zip(&lead_def.leads).enumerate() {
            let bytes = match lead.encoded {
                Some(bytes) => bytes.to_vec(),
                None => self.compress(i, lead, entry.sample_count(), codebook)?,
            };

            if bytes.len() > u16::MAX as usize {
                return Err(EncodeError::LeadTooLong {
                    lead: i,
                    length: bytes.len(),
                });
            }
            encoded.push(bytes);
        }

        self.avm.write_le(dst);
        self.sample_interval.write_le(dst);
        u8::from(self.difference_order).write_le(dst);
        self.bimodal.write_le(dst);
        encoded
            .iter()
            .for_each(|bytes| (bytes.len() as u16).write_le(dst));
        encoded.iter().for_each(|bytes| dst.extend_from_slice(bytes));
        dst.extend_from_slice(&self.trailing);

        Ok(())
    }

    fn compress(
        &self,
        lead: usize,
        data: &Lead,
        expected: usize,
        codebook: Option<&CodeBook>,
    ) -> Result<Vec<u8>, EncodeError> {
        if data.samples.len() != expected {
            return Err(EncodeError::SampleCountMismatch {
                lead,
                expected,
                found: data.samples.len(),
            });
        }

        let order = self.difference_order;
        let (mut prev, mut prev2) = (0i32, 0i32);
        let residuals = data.samples.iter().enumerate().map(|(n, &x)| {
            let residual = if n < order.literal_samples() {
                x
            } else {
                x.wrapping_sub(order.predict(prev, prev2))
            };
            prev2 = prev;
            prev = x;
            residual
        });

        match codebook {
            Some(book) => {
                let mut writer = BsIoVecWriter::default();
                for value in residuals {
                    let unencodable = EncodeError::UnencodableValue { lead, value };
                    if !book.encode(value, &mut writer).map_err(|_| unencodable.clone())? {
                        return Err(unencodable);
                    }
                }
                writer
                    .finish()
                    .map_err(|_| EncodeError::LeadTooLong { lead, length: 0 })
            }
            None => {
                let mut out = Vec::with_capacity(expected * 2);
                for value in residuals {
                    i16::try_from(value)
                        .map_err(|_| EncodeError::ValueOutOfRange { lead, value })?
                        .write_le(&mut out);
                }
                Ok(out)
            }
        }
    }
}
