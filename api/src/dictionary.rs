//! The k-mer dictionary collaborator: maps k-mers to the unitig containing them.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;

use crate::config::BuildConfiguration;
use crate::error::BuildError;
use crate::util::ACGT_TO_0123;

/// Exact-match lookup of k-mers. Unitig ids are record positions in the unitig file the
/// dictionary was built from.
pub trait KmerDictionary: Sync {
    fn k(&self) -> usize;

    /// Unitig containing `kmer`, or None if the k-mer is not in the dictionary or has the wrong length.
    fn lookup(&self, kmer: &[u8]) -> Option<usize>;
}

/// Builds a [KmerDictionary] from a FASTA file with one record per unitig.
pub trait KmerDictionaryBuilder {
    type Dictionary: KmerDictionary;

    /// K-mer length of the dictionaries this builder makes.
    fn k(&self) -> usize;

    /// Whether a k-mer and its reverse complement are the same key.
    fn canonical(&self) -> bool;

    fn build(&self, unitigs_path: &Path) -> Result<Self::Dictionary, BuildError>;
}

// Packs ACGT into 2 bits per base, first base highest. None if there is a non-ACGT character.
fn pack(kmer: &[u8]) -> Option<u64> {
    let mut x = 0_u64;
    for &c in kmer {
        let v = ACGT_TO_0123[c as usize];
        if v == 255 {
            return None;
        }
        x = (x << 2) | v as u64;
    }
    Some(x)
}

fn reverse_complement_packed(x: u64, k: usize) -> u64 {
    let mut x = x;
    let mut rc = 0_u64;
    for _ in 0..k {
        rc = (rc << 2) | (3 - (x & 3)); // A <-> T, C <-> G
        x >>= 2;
    }
    rc
}

/// A hash map from packed k-mers to unitig ids. Supports k up to 32.
#[derive(Debug, Clone)]
pub struct HashDictionary {
    k: usize,
    canonical: bool,
    map: HashMap<u64, usize>,
    num_collisions: usize,
}

impl HashDictionary {
    /// An empty dictionary. Panics if `k` is not in `1..=32`.
    pub fn new(k: usize, canonical: bool) -> Self {
        assert!(k > 0 && k <= 32, "k must be in range [1, 32], got {}", k);
        Self { k, canonical, map: HashMap::new(), num_collisions: 0 }
    }

    fn key(&self, packed: u64) -> u64 {
        if self.canonical {
            std::cmp::min(packed, reverse_complement_packed(packed, self.k))
        } else {
            packed
        }
    }

    /// Adds every k-mer of `seq` with the given unitig id. K-mers with non-ACGT characters
    /// are skipped. A k-mer that is already present keeps its earlier unitig.
    pub fn insert_unitig(&mut self, seq: &[u8], unitig_id: usize) {
        if seq.len() < self.k {
            return;
        }
        for kmer in seq.windows(self.k) {
            let Some(packed) = pack(kmer) else { continue };
            match self.map.entry(self.key(packed)) {
                Entry::Vacant(e) => {
                    e.insert(unitig_id);
                }
                Entry::Occupied(e) => {
                    if *e.get() != unitig_id {
                        self.num_collisions += 1;
                    }
                }
            }
        }
    }

    /// Number of distinct k-mers.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of k-mer occurrences that were found in an earlier unitig too.
    pub fn num_collisions(&self) -> usize {
        self.num_collisions
    }

    pub fn is_canonical(&self) -> bool {
        self.canonical
    }
}

impl KmerDictionary for HashDictionary {
    fn k(&self) -> usize {
        self.k
    }

    fn lookup(&self, kmer: &[u8]) -> Option<usize> {
        if kmer.len() != self.k {
            return None;
        }
        let packed = pack(kmer)?;
        self.map.get(&self.key(packed)).copied()
    }
}

/// Reads the unitig FASTA with jseqio and fills a [HashDictionary]. The i-th record is unitig i.
#[derive(Debug, Clone, Copy)]
pub struct HashDictionaryBuilder {
    pub k: usize,
    pub canonical: bool,
}

impl HashDictionaryBuilder {
    /// Takes k and the canonical mode from the build configuration.
    pub fn from_config(config: &BuildConfiguration) -> Self {
        Self { k: config.k, canonical: config.canonical }
    }
}

impl KmerDictionaryBuilder for HashDictionaryBuilder {
    type Dictionary = HashDictionary;

    fn k(&self) -> usize {
        self.k
    }

    fn canonical(&self) -> bool {
        self.canonical
    }

    fn build(&self, unitigs_path: &Path) -> Result<HashDictionary, BuildError> {
        if self.k == 0 || self.k > 32 {
            return Err(BuildError::Config(format!("k must be in range [1, 32], got k={}", self.k)));
        }

        let mut reader = jseqio::reader::DynamicFastXReader::from_file(&unitigs_path)
            .map_err(|e| BuildError::Dictionary(format!("could not open {}: {}", unitigs_path.display(), e)))?;

        let mut dict = HashDictionary::new(self.k, self.canonical);
        let mut unitig_id = 0_usize;
        while let Some(rec) = reader.read_next().map_err(|e| BuildError::Dictionary(e.to_string()))? {
            dict.insert_unitig(rec.seq, unitig_id);
            unitig_id += 1;
        }

        log::info!("{} distinct {}-mers in {} unitigs", dict.len(), self.k, unitig_id);
        if dict.num_collisions() > 0 {
            log::warn!("{} k-mer occurrences were already in an earlier unitig", dict.num_collisions());
        }
        Ok(dict)
    }
}
