//! Run boundaries of the unitig stream and the unitig-to-color-set mapping built on them.

use simple_sds_sbwt::bit_vector::BitVector;
use simple_sds_sbwt::ops::BitVec;
use simple_sds_sbwt::ops::Rank;
use simple_sds_sbwt::raw_vector::AccessRaw;
use simple_sds_sbwt::raw_vector::PushRaw;
use simple_sds_sbwt::raw_vector::RawVector;
use simple_sds_sbwt::serialize::Serialize;

/// Marks the last unitig of every run of consecutive unitigs sharing a color set.
/// Grows by one bit per unitig; the bit of the previous unitig is set when a new run starts.
#[derive(Debug)]
pub struct BoundaryTracker {
    bits: RawVector,
}

impl Default for BoundaryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundaryTracker {
    pub fn new() -> Self {
        Self { bits: RawVector::new() }
    }

    /// Appends a 0-bit for the next unitig.
    pub fn push_unitig(&mut self) {
        self.bits.push_bit(false);
    }

    /// Marks the most recently pushed unitig as the end of its run. No-op before the first unitig.
    pub fn close_run(&mut self) {
        let n = self.bits.len();
        if n > 0 {
            self.bits.set_bit(n - 1, true);
        }
    }

    /// Number of unitigs pushed so far.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.len() == 0
    }

    /// Closes the final run and builds the rank structure.
    pub fn finish(mut self) -> U2c {
        self.close_run();
        let mut bits = BitVector::from(self.bits);
        bits.enable_rank();
        U2c { bits }
    }
}

/// The unitig-to-color-set mapping: a bit vector with one bit per unitig, set at run ends,
/// with rank support. The color-set id of unitig `i` is the number of run ends strictly
/// before position `i`, i.e. the 1-based rank of `i` minus one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct U2c {
    bits: BitVector,
}

impl U2c {
    /// Number of unitigs.
    pub fn num_unitigs(&self) -> usize {
        self.bits.len()
    }

    /// Number of runs, which is the number of color-set ids in use.
    pub fn num_color_sets(&self) -> usize {
        self.bits.count_ones()
    }

    /// Number of run ends in positions `[0, unitig_id]`.
    pub fn rank_inclusive(&self, unitig_id: usize) -> usize {
        self.bits.rank(unitig_id + 1)
    }

    /// Dense color-set id of the unitig. Panics if `unitig_id >= self.num_unitigs()`.
    pub fn color_set_id(&self, unitig_id: usize) -> usize {
        assert!(unitig_id < self.num_unitigs(), "unitig id {} out of range ({} unitigs)", unitig_id, self.num_unitigs());
        self.rank_inclusive(unitig_id) - 1
    }

    /// True iff the unitig is the last of its run.
    pub fn is_run_end(&self, unitig_id: usize) -> bool {
        self.bits.get(unitig_id)
    }

    /// The bits as booleans. Meant for inspection and tests.
    pub fn to_bools(&self) -> Vec<bool> {
        (0..self.bits.len()).map(|i| self.bits.get(i)).collect()
    }

    /// Size of the bit vector and its rank support in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.bits.size_in_bytes()
    }

    /// Writes the bit vector and returns the number of bytes written.
    pub fn serialize<W: std::io::Write>(&self, out: &mut W) -> std::io::Result<usize> {
        self.bits.serialize(out)?;
        Ok(self.bits.size_in_bytes())
    }

    /// Loads a bit vector written with [U2c::serialize].
    pub fn load<R: std::io::Read>(input: &mut R) -> std::io::Result<Self> {
        let mut bits = BitVector::load(input)?;
        if bits.len() == 0 || !bits.get(bits.len() - 1) {
            // The last unitig always ends a run
            return Err(std::io::ErrorKind::InvalidData.into());
        }
        bits.enable_rank();
        Ok(Self { bits })
    }
}
