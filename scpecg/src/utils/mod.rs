//! Utility functions and supporting infrastructure.
//!
//! Provides bitstream I/O, little-endian byte helpers, CRC validation and
//! error types.

pub mod bitstream_io;
pub mod byte_reader;
pub mod byteorder;
pub mod crc;
pub mod errors;
