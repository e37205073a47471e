//! Bounds-checked little-endian cursor over a borrowed slice.
//!
//! Reads return `None` past the end so each section decoder can map the
//! shortfall onto its own error with the right context.

#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let out = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(out)
    }

    #[inline]
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    #[inline]
    pub fn u8(&mut self) -> Option<u8> {
        self.bytes(1).map(|b| b[0])
    }

    #[inline]
    pub fn u16(&mut self) -> Option<u16> {
        self.bytes(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    #[inline]
    pub fn i16(&mut self) -> Option<i16> {
        self.u16().map(|v| v as i16)
    }

    #[inline]
    pub fn u32(&mut self) -> Option<u32> {
        self.bytes(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    #[inline]
    pub fn array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.bytes(N).and_then(|b| b.try_into().ok())
    }
}

#[test]
fn reads_stop_at_end() {
    let mut r = ByteReader::new(&[0x34, 0x12, 0xFF, 0xFF, 0x01]);
    assert_eq!(r.u16(), Some(0x1234));
    assert_eq!(r.i16(), Some(-1));
    assert_eq!(r.u16(), None);
    assert_eq!(r.position(), 4);
    assert_eq!(r.u8(), Some(1));
    assert_eq!(r.remaining(), 0);
    assert_eq!(r.bytes(usize::MAX), None);
}
