//! Compressed storage of distinct color sets.
//!
//! Construction goes through the [ColorSetEncoder] capability: sets are encoded one by one,
//! partial encoders are concatenated with [append](ColorSetEncoder::append), and
//! [build](ColorSetEncoder::build) freezes the result into a [ColorSetStore]. Dense
//! color-set ids are positions in encoding order, so appending encoder B to encoder A
//! gives exactly the ids a single encoder would give to A's sets followed by B's sets.
//!
//! The bit-level representation of one set is chosen by a [ColorSetCodec]. This crate
//! provides [GapCodec] and [HybridCodec].

mod gap;
mod hybrid;

pub use gap::GapCodec;
pub use hybrid::HybridCodec;

use std::io::Read;
use std::io::Write;

use bitvec::prelude::*;
use byteorder::LittleEndian;
use byteorder::ReadBytesExt;

use crate::util;
use crate::Color;

/// Bit storage of encoded color sets.
pub type Bits = BitVec<u64, Lsb0>;

/// Incremental construction of a color-set store.
pub trait ColorSetEncoder: Send + Sized {
    /// The immutable store produced by [build](ColorSetEncoder::build).
    type Store: ColorSetStore;

    /// An empty encoder for color sets over `num_colors` colors.
    fn new(num_colors: u32) -> Self;

    /// Reserves space for at least `num_bits` more encoded bits.
    fn reserve_num_bits(&mut self, num_bits: usize);

    /// Encodes one color set, given in strictly ascending order. The set gets the next dense id.
    fn encode(&mut self, colors: &[Color]);

    /// Appends all sets encoded in `other`, in order, as if they had been encoded here.
    fn append(&mut self, other: &Self);

    /// Removes all encoded sets, keeping allocations.
    fn clear(&mut self);

    /// Number of sets encoded so far.
    fn num_color_sets(&self) -> usize;

    /// Number of encoded bits so far.
    fn num_bits(&self) -> usize;

    /// Freezes the encoder into a store.
    fn build(self) -> Self::Store;
}

/// Immutable store mapping dense color-set ids to color sets.
pub trait ColorSetStore: Sized + Send + Sync {
    /// Type identifier written in front of serialized indexes.
    const TYPE_ID: &'static [u8];

    fn num_colors(&self) -> u32;

    fn num_color_sets(&self) -> usize;

    /// Decodes color set `id` and pushes its colors in ascending order to `out`.
    /// Panics if `id >= self.num_color_sets()`.
    fn push_color_set(&self, id: usize, out: &mut Vec<Color>);

    /// Decodes color set `id` into a new vector.
    fn color_set(&self, id: usize) -> Vec<Color> {
        let mut out = Vec::new();
        self.push_color_set(id, &mut out);
        out
    }

    /// Size of the encoded sets in bits, excluding the offset table.
    fn num_bits(&self) -> usize;

    /// Writes the store and returns the number of bytes written.
    fn serialize<W: Write>(&self, out: &mut W) -> std::io::Result<usize>;

    /// Loads a store written with [serialize](ColorSetStore::serialize).
    fn load<R: Read>(input: &mut R) -> std::io::Result<Self>;
}

/// The bit-level representation of a single color set.
///
/// A codec may depend on the number of colors in the collection but must not
/// depend on any other set: every set is decodable on its own.
pub trait ColorSetCodec: Default + Clone + Copy + Send + Sync + std::fmt::Debug + PartialEq + Eq {
    /// Name used as the type identifier of serialized stores.
    const TYPE_ID: &'static [u8];

    /// Appends the encoding of `colors` (strictly ascending, all `< num_colors`) to `out`.
    fn encode(&self, colors: &[Color], num_colors: u32, out: &mut Bits);

    /// Decodes one set starting at the reader position and pushes its colors to `out`.
    fn decode(&self, reader: &mut BitReader<'_>, num_colors: u32, out: &mut Vec<Color>);
}

/// Sequential reader over encoded bits.
pub struct BitReader<'a> {
    bits: &'a BitSlice<u64, Lsb0>,
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bits: &'a BitSlice<u64, Lsb0>, pos: usize) -> Self {
        Self { bits, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_bit(&mut self) -> bool {
        let b = self.bits[self.pos];
        self.pos += 1;
        b
    }

    /// Reads an Elias-gamma coded integer written with [write_gamma].
    pub fn read_gamma(&mut self) -> u64 {
        let mut n_zeros = 0_usize;
        while !self.read_bit() {
            n_zeros += 1;
        }
        let mut v = 1_u64;
        for _ in 0..n_zeros {
            v = (v << 1) | self.read_bit() as u64;
        }
        v - 1
    }
}

/// Writes `x` as the Elias-gamma code of `x + 1`, so that zero is representable.
pub fn write_gamma(out: &mut Bits, x: u64) {
    let v = x + 1;
    let width = 64 - v.leading_zeros() as usize;
    for _ in 1..width {
        out.push(false);
    }
    for i in (0..width).rev() {
        out.push((v >> i) & 1 == 1);
    }
}

/// Gamma-codes the gaps of an ascending sequence: the first value as is, then
/// `x[i] - x[i-1] - 1` for every following value.
pub(crate) fn write_gaps(out: &mut Bits, values: impl IntoIterator<Item = Color>) {
    let mut prev: Option<Color> = None;
    for x in values {
        let gap = match prev {
            None => x,
            Some(p) => x - p - 1,
        };
        write_gamma(out, gap as u64);
        prev = Some(x);
    }
}

/// Inverse of [write_gaps] for `n` values.
pub(crate) fn read_gaps(reader: &mut BitReader<'_>, n: usize, out: &mut Vec<Color>) {
    let mut prev: Option<Color> = None;
    for _ in 0..n {
        let gap = reader.read_gamma() as Color;
        let x = match prev {
            None => gap,
            Some(p) => p + gap + 1,
        };
        out.push(x);
        prev = Some(x);
    }
}

/// A [ColorSetEncoder] storing sets back to back in one bit vector, with a table of
/// starting bit offsets. The codec decides the bits of each set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorSetsBuilder<C: ColorSetCodec> {
    num_colors: u32,
    bits: Bits,
    offsets: Vec<u64>, // Start of each set
    codec: C,
}

impl<C: ColorSetCodec> ColorSetEncoder for ColorSetsBuilder<C> {
    type Store = ColorSets<C>;

    fn new(num_colors: u32) -> Self {
        Self { num_colors, bits: Bits::new(), offsets: Vec::new(), codec: C::default() }
    }

    fn reserve_num_bits(&mut self, num_bits: usize) {
        self.bits.reserve(num_bits);
    }

    fn encode(&mut self, colors: &[Color]) {
        self.offsets.push(self.bits.len() as u64);
        self.codec.encode(colors, self.num_colors, &mut self.bits);
    }

    fn append(&mut self, other: &Self) {
        let shift = self.bits.len() as u64;
        self.offsets.extend(other.offsets.iter().map(|o| o + shift));
        self.bits.extend_from_bitslice(&other.bits);
    }

    fn clear(&mut self) {
        self.bits.clear();
        self.offsets.clear();
    }

    fn num_color_sets(&self) -> usize {
        self.offsets.len()
    }

    fn num_bits(&self) -> usize {
        self.bits.len()
    }

    fn build(mut self) -> ColorSets<C> {
        self.offsets.push(self.bits.len() as u64); // End sentinel
        self.bits.shrink_to_fit();
        self.offsets.shrink_to_fit();
        ColorSets { num_colors: self.num_colors, bits: self.bits, offsets: self.offsets, codec: self.codec }
    }
}

/// The immutable store built by [ColorSetsBuilder].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorSets<C: ColorSetCodec> {
    num_colors: u32,
    bits: Bits,
    offsets: Vec<u64>, // One per set plus an end sentinel
    codec: C,
}

impl<C: ColorSetCodec> ColorSets<C> {
    /// Iterates all color sets in id order.
    pub fn iter(&self) -> impl Iterator<Item = Vec<Color>> + '_ {
        (0..self.num_color_sets()).map(|id| self.color_set(id))
    }

    /// Encoded size of set `id` in bits.
    pub fn set_num_bits(&self, id: usize) -> usize {
        (self.offsets[id + 1] - self.offsets[id]) as usize
    }
}

impl<C: ColorSetCodec> ColorSetStore for ColorSets<C> {
    const TYPE_ID: &'static [u8] = C::TYPE_ID;

    fn num_colors(&self) -> u32 {
        self.num_colors
    }

    fn num_color_sets(&self) -> usize {
        self.offsets.len() - 1
    }

    fn push_color_set(&self, id: usize, out: &mut Vec<Color>) {
        assert!(id < self.num_color_sets(), "color set id {} out of range ({} sets)", id, self.num_color_sets());
        let mut reader = BitReader::new(&self.bits, self.offsets[id] as usize);
        self.codec.decode(&mut reader, self.num_colors, out);
        debug_assert_eq!(reader.position() as u64, self.offsets[id + 1]);
    }

    fn num_bits(&self) -> usize {
        self.bits.len()
    }

    fn serialize<W: Write>(&self, out: &mut W) -> std::io::Result<usize> {
        let mut n_written = 0_usize;
        n_written += util::write_bytes(out, &(self.num_colors as u64).to_le_bytes())?;
        n_written += util::write_u64_slice(out, &self.offsets)?;
        n_written += util::write_bytes(out, &(self.bits.len() as u64).to_le_bytes())?;
        n_written += util::write_u64_slice(out, self.bits.as_raw_slice())?;
        Ok(n_written)
    }

    fn load<R: Read>(input: &mut R) -> std::io::Result<Self> {
        let num_colors = input.read_u64::<LittleEndian>()? as u32;
        let offsets = util::read_u64_vec(input)?;
        let n_bits = input.read_u64::<LittleEndian>()? as usize;
        let words = util::read_u64_vec(input)?;

        if words.len() != n_bits.div_ceil(64) || !valid_offsets(&offsets, n_bits as u64) {
            return Err(std::io::ErrorKind::InvalidData.into());
        }

        let mut bits = Bits::from_vec(words);
        bits.truncate(n_bits);
        Ok(Self { num_colors, bits, offsets, codec: C::default() })
    }
}

// Offsets start at 0, never decrease and end at the number of bits
fn valid_offsets(offsets: &[u64], n_bits: u64) -> bool {
    offsets.first() == Some(&0)
        && offsets.last() == Some(&n_bits)
        && offsets.windows(2).all(|w| w[0] <= w[1])
}

/// Builder and store with gap coding.
pub type GapColorSetsBuilder = ColorSetsBuilder<GapCodec>;
pub type GapColorSets = ColorSets<GapCodec>;

/// Builder and store with density-dependent hybrid coding.
pub type HybridColorSetsBuilder = ColorSetsBuilder<HybridCodec>;
pub type HybridColorSets = ColorSets<HybridCodec>;

#[cfg(test)]
mod tests {

    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn gamma_codes() {
        let mut bits = Bits::new();
        for x in [0_u64, 1, 2, 3, 7, 8, 1000, u32::MAX as u64] {
            write_gamma(&mut bits, x);
        }
        // gamma(1) = "1", gamma(2) = "010"
        assert!(bits[0]);
        assert!(!bits[1] && bits[2] && !bits[3]);

        let mut reader = BitReader::new(&bits, 0);
        for x in [0_u64, 1, 2, 3, 7, 8, 1000, u32::MAX as u64] {
            assert_eq!(reader.read_gamma(), x);
        }
        assert_eq!(reader.position(), bits.len());
    }

    fn random_sets(n_sets: usize, num_colors: u32, seed: u64) -> Vec<Vec<Color>> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        (0..n_sets).map(|_| {
            // Vary the density so that all hybrid branches are exercised
            let density = rng.gen_range(0.0, 1.0);
            (0..num_colors).filter(|_| rng.gen_bool(density)).collect()
        }).collect()
    }

    fn check_append_matches_sequential<C: ColorSetCodec>() {
        let num_colors = 100;
        let sets = random_sets(300, num_colors, 42);

        let mut sequential = ColorSetsBuilder::<C>::new(num_colors);
        for s in sets.iter() {
            sequential.encode(s);
        }

        let mut merged = ColorSetsBuilder::<C>::new(num_colors);
        for chunk in sets.chunks(37) {
            let mut local = ColorSetsBuilder::<C>::new(num_colors);
            for s in chunk {
                local.encode(s);
            }
            merged.append(&local);
        }

        assert_eq!(merged, sequential);

        let store = merged.build();
        assert_eq!(store.num_color_sets(), sets.len());
        for (id, s) in sets.iter().enumerate() {
            assert_eq!(&store.color_set(id), s);
        }
    }

    #[test]
    fn gap_append_matches_sequential() {
        check_append_matches_sequential::<GapCodec>();
    }

    #[test]
    fn hybrid_append_matches_sequential() {
        check_append_matches_sequential::<HybridCodec>();
    }

    #[test]
    fn clear_resets_ids() {
        let mut b = GapColorSetsBuilder::new(10);
        b.encode(&[1, 2]);
        b.clear();
        assert_eq!(b.num_color_sets(), 0);
        assert_eq!(b.num_bits(), 0);
        b.encode(&[5]);
        let store = b.build();
        assert_eq!(store.num_color_sets(), 1);
        assert_eq!(store.color_set(0), vec![5]);
    }

    #[test]
    fn serialize_and_load() {
        let sets = random_sets(50, 64, 7);
        let mut b = HybridColorSetsBuilder::new(64);
        for s in sets.iter() {
            b.encode(s);
        }
        let store = b.build();

        let mut buf = Vec::<u8>::new();
        let n_written = store.serialize(&mut buf).unwrap();
        assert_eq!(n_written, buf.len());

        let loaded = HybridColorSets::load(&mut buf.as_slice()).unwrap();
        assert_eq!(store, loaded);
    }

    fn overwrite_u64(buf: &mut [u8], pos: usize, value: u64) {
        buf[pos..pos + 8].copy_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn load_rejects_corrupt_offsets() {
        let mut b = GapColorSetsBuilder::new(10);
        b.encode(&[1, 2]);
        b.encode(&[3]);
        b.encode(&[0, 9]);
        let store = b.build();
        let mut buf = Vec::<u8>::new();
        store.serialize(&mut buf).unwrap();

        // Layout: num_colors, number of offsets, then the offsets
        let offset_pos = |i: usize| 16 + 8 * i;
        let n_bits = store.num_bits() as u64;

        let mut first_not_zero = buf.clone();
        overwrite_u64(&mut first_not_zero, offset_pos(0), 1_000_000);
        assert!(GapColorSets::load(&mut first_not_zero.as_slice()).is_err());

        let mut decreasing = buf.clone();
        overwrite_u64(&mut decreasing, offset_pos(1), n_bits);
        assert!(GapColorSets::load(&mut decreasing.as_slice()).is_err());

        let mut past_end = buf.clone();
        overwrite_u64(&mut past_end, offset_pos(3), n_bits + 1);
        assert!(GapColorSets::load(&mut past_end.as_slice()).is_err());

        let mut huge_count = buf.clone();
        overwrite_u64(&mut huge_count, 8, u64::MAX / 4);
        assert!(GapColorSets::load(&mut huge_count.as_slice()).is_err());

        assert!(GapColorSets::load(&mut &buf[..buf.len() - 1]).is_err());
        assert!(GapColorSets::load(&mut buf.as_slice()).is_ok());
    }

    #[test]
    #[should_panic]
    fn out_of_range_id() {
        let mut b = GapColorSetsBuilder::new(10);
        b.encode(&[1]);
        b.build().color_set(1);
    }
}
