use super::{read_gaps, write_gamma, write_gaps, BitReader, Bits, ColorSetCodec};
use crate::Color;

/// Encodes a set as the gamma-coded set size followed by the gamma-coded gaps
/// between consecutive colors. Small for sparse sets and for sets of nearby colors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GapCodec;

impl ColorSetCodec for GapCodec {
    const TYPE_ID: &'static [u8] = b"gaps";

    fn encode(&self, colors: &[Color], _num_colors: u32, out: &mut Bits) {
        write_gamma(out, colors.len() as u64);
        write_gaps(out, colors.iter().copied());
    }

    fn decode(&self, reader: &mut BitReader<'_>, _num_colors: u32, out: &mut Vec<Color>) {
        let size = reader.read_gamma() as usize;
        out.reserve(size);
        read_gaps(reader, size, out);
    }
}
