//! Bit-level I/O for Huffman-coded lead data.
//!
//! SCP-ECG packs Huffman codes MSB-first within each byte, so both the
//! reader and the writer are big-endian bitstreams over `bitstream-io`.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter, UnsignedInteger};

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        let avail = self.available()?;
        if n as u64 > avail {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "get_n({}): out of bounds bits at {}",
                    n,
                    self.bs.position_in_bits().unwrap_or(0)
                ),
            ));
        }

        self.bs.read_unsigned_var(n)
    }

    /// Reads an `n`-bit two's-complement value, `1 <= n <= 32`.
    #[inline(always)]
    pub fn get_s32(&mut self, n: u32) -> io::Result<i32> {
        if n == 0 {
            return Ok(0);
        }
        let raw = self.get_n::<u32>(n)?;
        let shift = 32 - n;
        Ok(((raw << shift) as i32) >> shift)
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs
            .position_in_bits()
            .map(|pos| self.len.saturating_sub(pos))
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }

    #[inline(always)]
    pub fn is_byte_aligned(&self) -> bool {
        self.bs.byte_aligned()
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

impl Default for BsIoSliceReader<'_> {
    fn default() -> Self {
        Self::from_slice(&[])
    }
}

/// Big-endian bit writer into an owned byte vector.
pub struct BsIoVecWriter {
    bs: BitWriter<Vec<u8>, BigEndian>,
    bits: u64,
}

impl Default for BsIoVecWriter {
    fn default() -> Self {
        Self {
            bs: BitWriter::new(Vec::new()),
            bits: 0,
        }
    }
}

impl BsIoVecWriter {
    #[inline(always)]
    pub fn put(&mut self, bit: bool) -> io::Result<()> {
        self.bits += 1;
        self.bs.write_bit(bit)
    }

    /// Writes the low `n` bits of `value`, most significant first.
    #[inline(always)]
    pub fn put_n(&mut self, n: u32, value: u32) -> io::Result<()> {
        if n == 0 {
            return Ok(());
        }

        let masked = if n >= 32 {
            value
        } else {
            value & ((1u32 << n) - 1)
        };

        self.bits += n as u64;
        self.bs.write_var(n, masked)
    }

    pub fn bits_written(&self) -> u64 {
        self.bits
    }

    /// Pads with zero bits to the next byte boundary and returns the bytes.
    pub fn finish(mut self) -> io::Result<Vec<u8>> {
        self.bs.byte_align()?;
        Ok(self.bs.into_writer())
    }
}

#[test]
fn reader_signed_and_unsigned() -> io::Result<()> {
    let data = [0b1011_0000u8, 0xFF, 0x80];
    let mut reader = BsIoSliceReader::from_slice(&data);

    assert!(reader.get()?);
    assert!(!reader.get()?);
    assert_eq!(reader.get_s32(2)?, -1);
    assert_eq!(reader.get_n::<u8>(4)?, 0);
    assert!(reader.is_byte_aligned());
    assert_eq!(reader.get_s32(8)?, -1);
    assert_eq!(reader.available()?, 8);
    assert!(reader.get_n::<u16>(9).is_err());
    Ok(())
}

#[test]
fn writer_pads_to_byte() -> io::Result<()> {
    let mut writer = BsIoVecWriter::default();
    writer.put(true)?;
    writer.put_n(3, 0b010)?;
    writer.put_n(6, 0xFFFF_FFFF)?;
    assert_eq!(writer.bits_written(), 10);
    assert_eq!(writer.finish()?, vec![0b1010_1111, 0b1100_0000]);
    Ok(())
}
