//! Huffman code tables (section 2).
//!
//! ```text
//! u16  table count, or 19999 for the built-in default table
//! per table:
//!   u16  code count
//!   per code (9 bytes):
//!     u8   prefix bits
//!     u8   total bits (prefix plus extra bits)
//!     u8   mode: 1 = value, 0 = switch table
//!     i16  base value (the value, or the 1-based target table)
//!     u32  base code, bit-reversed: bit i is the i-th bit on the wire
//! ```
//!
//! A code with extra bits carries its value as a two's-complement literal
//! of `total - prefix` bits after the prefix.

use std::collections::HashMap;
use std::io;

use log::{debug, trace};
use scpecgd_macros::ToBytes;

use crate::impl_u8_enum;
use crate::utils::bitstream_io::{BsIoSliceReader, BsIoVecWriter};
use crate::utils::byte_reader::ByteReader;
use crate::utils::byteorder::WriteBytesLe;
use crate::utils::errors::{DecodeError, EncodeError};

/// Table count value selecting the default table.
pub const DEFAULT_TABLE_MARKER: u16 = 19999;

const CODE_SIZE: usize = 9;
const MAX_PREFIX_BITS: u8 = 32;
const MAX_EXTRA_BITS: u8 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeMode {
    SwitchTable,
    Value,
}

impl From<CodeMode> for u8 {
    fn from(value: CodeMode) -> Self {
        match value {
            CodeMode::SwitchTable => 0,
            CodeMode::Value => 1,
        }
    }
}

impl TryFrom<u8> for CodeMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CodeMode::SwitchTable),
            1 => Ok(CodeMode::Value),
            v => Err(v),
        }
    }
}

impl_u8_enum!(CodeMode);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToBytes)]
pub struct HuffmanCode {
    pub prefix_bits: u8,
    pub total_bits: u8,
    pub mode: CodeMode,
    pub base_value: i16,
    pub base_code: u32,
}

impl HuffmanCode {
    pub const fn value(prefix_bits: u8, total_bits: u8, base_value: i16, base_code: u32) -> Self {
        Self {
            prefix_bits,
            total_bits,
            mode: CodeMode::Value,
            base_value,
            base_code,
        }
    }

    pub const fn switch(prefix_bits: u8, table: i16, base_code: u32) -> Self {
        Self {
            prefix_bits,
            total_bits: prefix_bits,
            mode: CodeMode::SwitchTable,
            base_value: table,
            base_code,
        }
    }

    #[inline]
    pub fn extra_bits(&self) -> u32 {
        self.total_bits.saturating_sub(self.prefix_bits) as u32
    }

    /// The i-th wire bit of the prefix.
    #[inline]
    fn path_bit(&self, i: u8) -> bool {
        (self.base_code >> i) & 1 == 1
    }

    fn write_prefix(&self, writer: &mut BsIoVecWriter) -> io::Result<()> {
        (0..self.prefix_bits).try_for_each(|i| writer.put(self.path_bit(i)))
    }

    fn read(reader: &mut ByteReader) -> Option<Result<Self, u8>> {
        let prefix_bits = reader.u8()?;
        let total_bits = reader.u8()?;
        let mode = reader.u8()?;
        let base_value = reader.i16()?;
        let base_code = reader.u32()?;

        Some(CodeMode::try_from(mode).map(|mode| Self {
            prefix_bits,
            total_bits,
            mode,
            base_value,
            base_code,
        }))
    }
}

/// The default table defined by the standard: values -8..=8 with
/// prefix codes, plus 8-bit and 16-bit literal escapes.
pub const DEFAULT_TABLE: [HuffmanCode; 19] = [
    HuffmanCode::value(1, 1, 0, 0),
    HuffmanCode::value(3, 3, 1, 1),
    HuffmanCode::value(3, 3, -1, 5),
    HuffmanCode::value(4, 4, 2, 3),
    HuffmanCode::value(4, 4, -2, 11),
    HuffmanCode::value(5, 5, 3, 7),
    HuffmanCode::value(5, 5, -3, 23),
    HuffmanCode::value(6, 6, 4, 15),
    HuffmanCode::value(6, 6, -4, 47),
    HuffmanCode::value(7, 7, 5, 31),
    HuffmanCode::value(7, 7, -5, 95),
    HuffmanCode::value(8, 8, 6, 63),
    HuffmanCode::value(8, 8, -6, 191),
    HuffmanCode::value(9, 9, 7, 127),
    HuffmanCode::value(9, 9, -7, 383),
    HuffmanCode::value(10, 10, 8, 255),
    HuffmanCode::value(10, 10, -8, 767),
    HuffmanCode::value(10, 18, 0, 511),
    HuffmanCode::value(10, 26, 0, 1023),
];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HuffmanTable {
    pub codes: Vec<HuffmanCode>,
}

/// Why reading one symbol from a lead bitstream stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolError {
    /// No bits left at a code boundary.
    EndOfData,
    /// Data ended inside a code or its extra bits.
    Truncated { bit_position: u64 },
    /// The bits at `bit_position` match no code of the current table.
    Undecodable { bit_position: u64 },
}

#[derive(Debug, Clone, Copy, Default)]
struct TreeNode {
    /// Child node indices for bit 0 and bit 1; 0 means none, the root is
    /// never a child.
    children: [u32; 2],
    leaf: Option<HuffmanCode>,
}

#[derive(Debug, Clone, Default)]
struct DecodeTree {
    nodes: Vec<TreeNode>,
}

impl DecodeTree {
    fn build(table: usize, codes: &[HuffmanCode], table_count: usize) -> Result<Self, DecodeError> {
        let invalid = |code: usize, reason: &'static str| DecodeError::InvalidCodeTable {
            table: table + 1,
            code: code + 1,
            reason,
        };

        if codes.is_empty() {
            return Err(invalid(0, "table holds no codes"));
        }

        let mut nodes = vec![TreeNode::default()];

        for (ci, code) in codes.iter().enumerate() {
            if code.prefix_bits == 0 || code.prefix_bits > MAX_PREFIX_BITS {
                return Err(invalid(ci, "prefix length outside 1..=32"));
            }
            if code.total_bits < code.prefix_bits {
                return Err(invalid(ci, "total bits shorter than prefix"));
            }
            if code.total_bits - code.prefix_bits > MAX_EXTRA_BITS {
                return Err(invalid(ci, "more than 32 extra bits"));
            }
            if code.mode == CodeMode::SwitchTable
                && (code.base_value < 1 || code.base_value as usize > table_count)
            {
                return Err(invalid(ci, "switch target outside the table list"));
            }
            if code.mode == CodeMode::SwitchTable && code.total_bits != code.prefix_bits {
                return Err(invalid(ci, "switch code with extra bits"));
            }

            let mut node = 0usize;
            for i in 0..code.prefix_bits {
                if nodes[node].leaf.is_some() {
                    return Err(invalid(ci, "code extends a shorter code"));
                }

                let bit = code.path_bit(i) as usize;
                let child = nodes[node].children[bit] as usize;
                node = if child == 0 {
                    nodes.push(TreeNode::default());
                    let new = nodes.len() - 1;
                    nodes[node].children[bit] = new as u32;
                    new
                } else {
                    child
                };
            }

            if nodes[node].leaf.is_some() {
                return Err(invalid(ci, "duplicate code"));
            }
            if nodes[node].children != [0, 0] {
                return Err(invalid(ci, "code is a prefix of a longer code"));
            }

            nodes[node].leaf = Some(*code);
        }

        Ok(Self { nodes })
    }
}

/// Validated decode trees and the encode index for table 1.
#[derive(Debug, Clone, Default)]
pub struct CodeBook {
    trees: Vec<DecodeTree>,
    /// Shortest direct code per value in table 1.
    direct: HashMap<i32, HuffmanCode>,
    /// Table 1 literal escapes, narrowest first.
    escapes: Vec<HuffmanCode>,
}

impl CodeBook {
    pub fn build(tables: &[HuffmanTable]) -> Result<Self, DecodeError> {
        let trees = tables
            .iter()
            .enumerate()
            .map(|(i, t)| DecodeTree::build(i, &t.codes, tables.len()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut direct: HashMap<i32, HuffmanCode> = HashMap::new();
        let mut escapes = Vec::new();

        for code in tables.first().map(|t| &t.codes[..]).unwrap_or_default() {
            if code.mode != CodeMode::Value {
                continue;
            }

            if code.extra_bits() > 0 {
                escapes.push(*code);
            } else {
                direct
                    .entry(code.base_value as i32)
                    .and_modify(|c| {
                        if code.prefix_bits < c.prefix_bits {
                            *c = *code
                        }
                    })
                    .or_insert(*code);
            }
        }

        escapes.sort_by_key(|c| c.total_bits);

        Ok(Self {
            trees,
            direct,
            escapes,
        })
    }

    pub fn table_count(&self) -> usize {
        self.trees.len()
    }

    /// Reads one value, following table switches. `table` is the 0-based
    /// current table and persists across calls.
    pub fn decode(
        &self,
        table: &mut usize,
        reader: &mut BsIoSliceReader,
    ) -> Result<i32, SymbolError> {
        loop {
            let start = reader.position().unwrap_or_default();
            let truncated = |_| SymbolError::Truncated {
                bit_position: start,
            };

            if reader.available().map_err(truncated)? == 0 {
                return Err(SymbolError::EndOfData);
            }

            let tree = self.trees.get(*table).ok_or(SymbolError::Undecodable {
                bit_position: start,
            })?;

            let mut node = &tree.nodes[0];
            let code = loop {
                if let Some(code) = node.leaf {
                    break code;
                }

                if reader.available().map_err(truncated)? == 0 {
                    return Err(SymbolError::Truncated {
                        bit_position: start,
                    });
                }

                let bit = reader.get().map_err(truncated)? as usize;
                match node.children[bit] {
                    0 => {
                        return Err(SymbolError::Undecodable {
                            bit_position: start,
                        });
                    }
                    child => node = &tree.nodes[child as usize],
                }
            };

            match code.mode {
                CodeMode::Value => {
                    let extra = code.extra_bits();
                    if extra == 0 {
                        return Ok(code.base_value as i32);
                    }
                    return reader.get_s32(extra).map_err(truncated);
                }
                CodeMode::SwitchTable => {
                    trace!("Switching to Huffman table {}", code.base_value);
                    *table = (code.base_value - 1) as usize;
                }
            }
        }
    }

    /// Cheapest table 1 code able to carry `value`.
    pub fn find_code(&self, value: i32) -> Option<HuffmanCode> {
        let direct = self.direct.get(&value).copied();
        let escape = self
            .escapes
            .iter()
            .find(|c| fits_signed(value, c.extra_bits()))
            .copied();

        match (direct, escape) {
            (Some(d), Some(e)) if e.total_bits < d.prefix_bits => Some(e),
            (Some(d), _) => Some(d),
            (None, e) => e,
        }
    }

    /// Writes `value` with its cheapest table 1 code; `false` when no code fits.
    pub fn encode(&self, value: i32, writer: &mut BsIoVecWriter) -> io::Result<bool> {
        let Some(code) = self.find_code(value) else {
            return Ok(false);
        };

        code.write_prefix(writer)?;
        writer.put_n(code.extra_bits(), value as u32)?;
        Ok(true)
    }
}

fn fits_signed(value: i32, bits: u32) -> bool {
    if bits >= 32 {
        return true;
    }
    let half = 1i64 << (bits - 1);
    (-half..half).contains(&(value as i64))
}

/// Decoded section 2.
#[derive(Debug, Clone)]
pub struct HuffmanTables {
    default: bool,
    tables: Vec<HuffmanTable>,
    trailing: Vec<u8>,
    codebook: CodeBook,
}

impl PartialEq for HuffmanTables {
    fn eq(&self, other: &Self) -> bool {
        self.default == other.default
            && self.tables == other.tables
            && self.trailing == other.trailing
    }
}

impl Eq for HuffmanTables {}

impl HuffmanTables {
    /// Validates explicit tables.
    pub fn new(tables: Vec<HuffmanTable>) -> Result<Self, DecodeError> {
        let codebook = CodeBook::build(&tables)?;
        Ok(Self {
            default: false,
            tables,
            trailing: Vec::new(),
            codebook,
        })
    }

    /// The default table, stored as the 19999 marker.
    pub fn standard() -> Self {
        let tables = vec![HuffmanTable {
            codes: DEFAULT_TABLE.to_vec(),
        }];
        let codebook = CodeBook::build(&tables).unwrap_or_default();

        Self {
            default: true,
            tables,
            trailing: Vec::new(),
            codebook,
        }
    }

    pub fn read(section: u16, base_offset: usize, payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(payload);
        let truncated = |reader: &ByteReader| DecodeError::TruncatedSection {
            section,
            offset: base_offset + reader.position(),
        };

        let count = reader.u16().ok_or_else(|| truncated(&reader))?;

        if count == DEFAULT_TABLE_MARKER {
            debug!("Section {section} selects the default Huffman table");
            let mut tables = Self::standard();
            tables.trailing = reader.rest().to_vec();
            return Ok(tables);
        }

        let mut tables = Vec::with_capacity(count as usize);
        for t in 0..count as usize {
            let code_count = reader.u16().ok_or_else(|| truncated(&reader))? as usize;
            if reader.remaining() < code_count * CODE_SIZE {
                return Err(truncated(&reader));
            }

            let mut codes = Vec::with_capacity(code_count);
            for c in 0..code_count {
                let code = HuffmanCode::read(&mut reader)
                    .ok_or_else(|| truncated(&reader))?
                    .map_err(|_| DecodeError::InvalidCodeTable {
                        table: t + 1,
                        code: c + 1,
                        reason: "unknown code mode",
                    })?;
                codes.push(code);
            }

            debug!("Huffman table {}: {} codes", t + 1, code_count);
            tables.push(HuffmanTable { codes });
        }

        let mut tables = Self::new(tables)?;
        tables.trailing = reader.rest().to_vec();
        Ok(tables)
    }

    pub fn write(&self, dst: &mut Vec<u8>) -> Result<(), EncodeError> {
        if self.default {
            DEFAULT_TABLE_MARKER.write_le(dst);
        } else {
            let count = self.tables.len();
            match u16::try_from(count) {
                Ok(c) if c != DEFAULT_TABLE_MARKER => c.write_le(dst),
                _ => return Err(EncodeError::TableTooLarge { count }),
            }

            for table in &self.tables {
                let count = table.codes.len();
                let count = u16::try_from(count).map_err(|_| EncodeError::TableTooLarge { count })?;
                count.write_le(dst);
                table.codes.iter().for_each(|code| code.write_le(dst));
            }
        }

        dst.extend_from_slice(&self.trailing);
        Ok(())
    }

    pub fn is_default(&self) -> bool {
        self.default
    }

    pub fn tables(&self) -> &[HuffmanTable] {
        &self.tables
    }

    pub fn trailing(&self) -> &[u8] {
        &self.trailing
    }

    pub fn codebook(&self) -> &CodeBook {
        &self.codebook
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(book: &CodeBook, data: &[u8], n: usize) -> Result<Vec<i32>, SymbolError> {
        let mut reader = BsIoSliceReader::from_slice(data);
        let mut table = 0;
        (0..n).map(|_| book.decode(&mut table, &mut reader)).collect()
    }

    #[test]
    fn default_table_is_valid() {
        let tables = HuffmanTables::standard();
        assert!(tables.is_default());
        assert!(CodeBook::build(tables.tables()).is_ok());
        assert_eq!(tables.codebook().table_count(), 1);
    }

    #[test]
    fn default_table_codes() {
        let book = HuffmanTables::standard().codebook().clone();
        // 0 | 100 | 101 | 1100 | 1101 -> 0, 1, -1, 2, -2
        let data = [0b0100_1011, 0b1001_1010];
        assert_eq!(decode_all(&book, &data, 5).unwrap(), vec![0, 1, -1, 2, -2]);
    }

    #[test]
    fn escape_codes_carry_literals() {
        let book = HuffmanTables::standard().codebook().clone();
        let mut writer = BsIoVecWriter::default();
        for v in [100, -129, 3000, -32768] {
            assert!(book.encode(v, &mut writer).unwrap());
        }
        let bits = writer.bits_written();
        assert_eq!(bits, 18 + 26 + 26 + 26);

        let data = writer.finish().unwrap();
        assert_eq!(
            decode_all(&book, &data, 4).unwrap(),
            vec![100, -129, 3000, -32768]
        );
    }

    #[test]
    fn encoder_prefers_shortest_code() {
        let book = HuffmanTables::standard().codebook().clone();
        assert_eq!(book.find_code(0).map(|c| c.total_bits), Some(1));
        assert_eq!(book.find_code(-8).map(|c| c.total_bits), Some(10));
        assert_eq!(book.find_code(9).map(|c| c.total_bits), Some(18));
        assert_eq!(book.find_code(200).map(|c| c.total_bits), Some(26));
        assert!(book.find_code(70000).is_none());
    }

    #[test]
    fn switch_codes_change_table() {
        // Table 1: "0" -> 7, "1" -> switch to table 2.
        // Table 2: "0" -> -3, "1" -> switch to table 1.
        let tables = HuffmanTables::new(vec![
            HuffmanTable {
                codes: vec![HuffmanCode::value(1, 1, 7, 0), HuffmanCode::switch(1, 2, 1)],
            },
            HuffmanTable {
                codes: vec![HuffmanCode::value(1, 1, -3, 0), HuffmanCode::switch(1, 1, 1)],
            },
        ])
        .unwrap();

        // 0 1 0 0 1 0 -> 7, (switch) -3, -3, (switch) 7
        let data = [0b0100_1000];
        assert_eq!(
            decode_all(tables.codebook(), &data, 4).unwrap(),
            vec![7, -3, -3, 7]
        );
    }

    #[test]
    fn invalid_tables() {
        let dup = HuffmanTables::new(vec![HuffmanTable {
            codes: vec![HuffmanCode::value(1, 1, 0, 0), HuffmanCode::value(1, 1, 1, 0)],
        }]);
        assert_eq!(
            dup.unwrap_err(),
            DecodeError::InvalidCodeTable {
                table: 1,
                code: 2,
                reason: "duplicate code",
            }
        );

        let prefix = HuffmanTables::new(vec![HuffmanTable {
            codes: vec![HuffmanCode::value(2, 2, 0, 0), HuffmanCode::value(1, 1, 1, 0)],
        }]);
        assert!(matches!(
            prefix.unwrap_err(),
            DecodeError::InvalidCodeTable { code: 2, .. }
        ));

        let switch = HuffmanTables::new(vec![HuffmanTable {
            codes: vec![HuffmanCode::switch(1, 5, 0)],
        }]);
        assert!(matches!(
            switch.unwrap_err(),
            DecodeError::InvalidCodeTable { .. }
        ));

        assert!(HuffmanTables::new(vec![HuffmanTable::default()]).is_err());
    }

    #[test]
    fn switch_codes_carry_no_extra_bits() {
        let padded = HuffmanCode {
            total_bits: 4,
            ..HuffmanCode::switch(1, 2, 1)
        };
        let tables = HuffmanTables::new(vec![
            HuffmanTable {
                codes: vec![HuffmanCode::value(1, 1, 0, 0), padded],
            },
            HuffmanTable {
                codes: vec![HuffmanCode::value(1, 1, 0, 0), HuffmanCode::switch(1, 1, 1)],
            },
        ]);
        assert_eq!(
            tables.unwrap_err(),
            DecodeError::InvalidCodeTable {
                table: 1,
                code: 2,
                reason: "switch code with extra bits",
            }
        );
    }

    #[test]
    fn undecodable_and_truncated() {
        let tables = HuffmanTables::new(vec![HuffmanTable {
            codes: vec![HuffmanCode::value(2, 2, 1, 0b00), HuffmanCode::value(2, 2, 2, 0b10)],
        }])
        .unwrap();
        let book = tables.codebook();

        // "00" -> 1, "01" -> 2, "1x" -> nothing
        let mut reader = BsIoSliceReader::from_slice(&[0b0001_1000]);
        let mut table = 0;
        assert_eq!(book.decode(&mut table, &mut reader), Ok(1));
        assert_eq!(book.decode(&mut table, &mut reader), Ok(2));
        assert_eq!(
            book.decode(&mut table, &mut reader),
            Err(SymbolError::Undecodable { bit_position: 4 })
        );

        let mut reader = BsIoSliceReader::from_slice(&[0b0000_0000]);
        for _ in 0..4 {
            assert_eq!(book.decode(&mut table, &mut reader), Ok(1));
        }
        assert_eq!(
            book.decode(&mut table, &mut reader),
            Err(SymbolError::EndOfData)
        );
    }

    #[test]
    fn section_bytes() {
        let mut payload = Vec::new();
        1u16.write_le(&mut payload);
        2u16.write_le(&mut payload);
        HuffmanCode::value(1, 1, 0, 0).write_le(&mut payload);
        HuffmanCode::value(1, 9, 0, 1).write_le(&mut payload);
        payload.extend_from_slice(&[0, 0]);

        assert_eq!(&payload[4..13], &[1, 1, 1, 0, 0, 0, 0, 0, 0]);

        let tables = HuffmanTables::read(2, 0, &payload).unwrap();
        assert!(!tables.is_default());
        assert_eq!(tables.tables()[0].codes.len(), 2);
        assert_eq!(tables.trailing(), &[0, 0]);

        let mut out = Vec::new();
        tables.write(&mut out).unwrap();
        assert_eq!(out, payload);

        let default = HuffmanTables::read(2, 0, &[0x1F, 0x4E]).unwrap();
        assert!(default.is_default());
        let mut out = Vec::new();
        default.write(&mut out).unwrap();
        assert_eq!(out, [0x1F, 0x4E]);
    }

    #[test]
    fn unknown_mode_byte() {
        let mut payload = Vec::new();
        1u16.write_le(&mut payload);
        1u16.write_le(&mut payload);
        payload.extend_from_slice(&[1, 1, 7, 0, 0, 0, 0, 0, 0]);

        assert!(matches!(
            HuffmanTables::read(2, 0, &payload),
            Err(DecodeError::InvalidCodeTable {
                reason: "unknown code mode",
                ..
            })
        ));
    }
}
