//! CRC validation for SCP-ECG records.
//!
//! Both the whole-record checksum and every per-section checksum use
//! CRC-16/CCITT: polynomial 0x1021, initial value 0xFFFF, MSB-first,
//! no final XOR. The stored value is little-endian.

/// CRC parameters: polynomial and initial value.
pub struct Algorithm<T> {
    poly: T,
    init: T,
}

/// CRC-16/CCITT as used by EN 1064.
pub const CRC_CCITT_ALG: Algorithm<u16> = Algorithm {
    poly: 0x1021,
    init: 0xFFFF,
};

/// Shared instance; the table is built at compile time.
pub const CRC_CCITT: Crc16 = Crc16::new(&CRC_CCITT_ALG);

/// Shifts `len` bits of `value` through the CRC-16 register.
#[inline(always)]
pub const fn crc16(poly: u16, mut value: u16, len: usize) -> u16 {
    value <<= 8;

    let mut i = 0;
    while i < len {
        value = (value << 1) ^ (((value >> 15) & 1) * poly);
        i += 1;
    }

    value
}

#[inline(always)]
const fn crc16_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc16(poly, i as u16, 8);
        i += 1;
    }

    table
}

#[derive(Debug)]
pub struct Crc16 {
    pub poly: u16,
    pub init: u16,
    table: [u16; 256],
}

impl Crc16 {
    pub const fn new(algorithm: &Algorithm<u16>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            table: crc16_table(algorithm.poly),
        }
    }

    const fn table_entry(&self, index: u8) -> u16 {
        self.table[index as usize]
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u16, bytes: &[u8]) -> u16 {
        let mut i = 0;

        while i < bytes.len() {
            crc = (crc << 8) ^ self.table_entry((crc >> 8) as u8 ^ bytes[i]);
            i += 1;
        }

        crc
    }

    /// Computes the checksum of `bytes` from the initial value.
    ///
    /// An empty slice yields the initial value.
    #[inline]
    pub const fn compute(&self, bytes: &[u8]) -> u16 {
        self.update(self.init, bytes)
    }

    #[inline]
    pub const fn verify(&self, bytes: &[u8], expected: u16) -> bool {
        self.compute(bytes) == expected
    }
}

/// CRC-16/CCITT of `bytes`.
#[inline]
pub fn compute(bytes: &[u8]) -> u16 {
    CRC_CCITT.compute(bytes)
}

#[inline]
pub fn verify(bytes: &[u8], expected: u16) -> bool {
    CRC_CCITT.verify(bytes, expected)
}

#[test]
fn check_value() {
    assert_eq!(compute(b"123456789"), 0x29B1);
    assert!(verify(b"123456789", 0x29B1));
    assert!(!verify(b"123456788", 0x29B1));
}

#[test]
fn empty_input_is_initial_value() {
    assert_eq!(compute(&[]), 0xFFFF);
}

#[test]
fn incremental_update_matches_one_shot() {
    let data = b"SCPECG record payload";
    let split = CRC_CCITT.update(CRC_CCITT.update(0xFFFF, &data[..7]), &data[7..]);
    assert_eq!(split, compute(data));
}
