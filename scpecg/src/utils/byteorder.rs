//! Little-endian serialization helpers for fixed record layouts.
//!
//! Every multi-byte integer in an SCP-ECG record is little-endian. Layout
//! structs derive [`WriteBytesLe`] through `#[derive(ToBytes)]`.

pub trait WriteBytesLe {
    fn write_le(&self, dst: &mut Vec<u8>);
}

macro_rules! impl_num_le {
    ($($t:ty),+) => { $(
        impl WriteBytesLe for $t { #[inline] fn write_le(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_le_bytes()); }}
    )+ }
}

impl_num_le!(u8, i8, u16, i16, u32, i32);

impl<T: WriteBytesLe> WriteBytesLe for Vec<T> {
    #[inline]
    fn write_le(&self, dst: &mut Vec<u8>) {
        self.iter().for_each(|item| item.write_le(dst));
    }
}

impl<T: WriteBytesLe, const N: usize> WriteBytesLe for [T; N] {
    #[inline]
    fn write_le(&self, dst: &mut Vec<u8>) {
        self.iter().for_each(|item| item.write_le(dst));
    }
}

/// Implements [`WriteBytesLe`] for a fieldless enum stored as one byte.
#[macro_export]
macro_rules! impl_u8_enum {
    ($t:ty) => {
        impl $crate::utils::byteorder::WriteBytesLe for $t {
            fn write_le(&self, dst: &mut Vec<u8>) {
                dst.push(u8::from(*self))
            }
        }
    };
}

#[macro_export]
macro_rules! join_bytes_le {
    ( $($value:expr),+ $(,)? ) => {{
        let mut vec = Vec::<u8>::new();
        $( $crate::utils::byteorder::WriteBytesLe::write_le(&$value, &mut vec); )+
        vec
    }};
}

#[cfg(test)]
mod tests {
    use crate::utils::byteorder::WriteBytesLe;
    use scpecgd_macros::ToBytes;

    #[derive(ToBytes)]
    struct Mini {
        a: u16,
        b: u32,
        tag: [u8; 4],
        c: i16,
    }

    #[test]
    fn derived_layout_is_little_endian() {
        let s = Mini {
            a: 0x1234,
            b: 0xABCDEF01,
            tag: *b"SCPE",
            c: -2,
        };

        let mut out = Vec::new();
        s.write_le(&mut out);

        let expected = [
            0x34, 0x12, 0x01, 0xEF, 0xCD, 0xAB, b'S', b'C', b'P', b'E', 0xFE, 0xFF,
        ];
        assert_eq!(&out[..], &expected);
    }

    #[test]
    fn join_bytes() {
        let v = crate::join_bytes_le!(1u8, 0x0203u16, vec![4u8, 5u8]);
        assert_eq!(v, [1, 3, 2, 4, 5]);
    }
}
