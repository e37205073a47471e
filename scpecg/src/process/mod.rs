/// Record decoding.
///
/// Provides the [`Decoder`](decode::Decoder), which locates every section
/// through the pointer directory and returns a [`Record`](crate::Record)
/// together with the diagnostics collected on the way.
pub mod decode;

/// Section validation and two-pass dispatch to the section decoders.
pub mod dispatch;

/// Record encoding.
///
/// Provides the [`Encoder`](encode::Encoder), the mirror of the decoder.
pub mod encode;
