//! Replays the unitig stream and checks the built index against it.
//!
//! Mismatches are collected and logged, they do not stop the pass.

use rayon::iter::IntoParallelRefIterator;
use rayon::iter::ParallelIterator;

use crate::dictionary::KmerDictionary;
use crate::encoding::ColorSetStore;
use crate::error::BuildError;
use crate::index::ColorSetIndex;
use crate::util::ACGT_TO_0123;
use crate::Color;
use crate::ColoredUnitigSource;

// Unitigs collected from the stream before a parallel check
const BATCH_SIZE: usize = 1 << 14;

/// One inconsistency between the stream and the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    /// The stream has a different number of unitigs than the index.
    UnitigCount { expected: usize, found: usize },
    /// A k-mer of the unitig is not in the dictionary.
    KmerNotFound { unitig: usize, kmer_pos: usize },
    /// A k-mer of the unitig resolves to another unitig.
    WrongUnitig { unitig: usize, kmer_pos: usize, found: usize },
    /// The decoded color set differs from the one in the stream.
    ColorSet { unitig: usize, color_set_id: usize, expected: Vec<Color>, found: Vec<Color> },
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mismatch::UnitigCount { expected, found } =>
                write!(f, "stream has {} unitigs, index has {}", expected, found),
            Mismatch::KmerNotFound { unitig, kmer_pos } =>
                write!(f, "unitig {}: k-mer at {} not found", unitig, kmer_pos),
            Mismatch::WrongUnitig { unitig, kmer_pos, found } =>
                write!(f, "unitig {}: k-mer at {} maps to unitig {}", unitig, kmer_pos, found),
            Mismatch::ColorSet { unitig, color_set_id, expected, found } =>
                write!(f, "unitig {}: color set {} is {:?}, expected {:?} (sizes {} and {})", unitig, color_set_id, found, expected, found.len(), expected.len()),
        }
    }
}

/// Outcome of a verification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub num_unitigs_checked: usize,
    pub mismatches: Vec<Mismatch>,
}

impl VerificationReport {
    pub fn is_ok(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Checks every unitig of a stream in parallel: every k-mer must resolve back to the
/// unitig through the dictionary, and the decoded color set must equal the streamed one.
pub struct Verifier {
    num_threads: usize,
}

impl Verifier {
    pub fn new(num_threads: usize) -> Self {
        Self { num_threads: num_threads.max(1) }
    }

    /// Walks `source` again and checks it against `index`. The dictionary check is skipped
    /// if no dictionary is given.
    pub fn verify<Src: ColoredUnitigSource, S: ColorSetStore>(
        &self,
        source: &Src,
        index: &ColorSetIndex<S>,
        dictionary: Option<&dyn KmerDictionary>,
    ) -> Result<VerificationReport, BuildError> {
        let thread_pool = rayon::ThreadPoolBuilder::new().num_threads(self.num_threads).build()
            .map_err(|e| BuildError::Config(format!("could not create a thread pool: {}", e)))?;

        let mut report = VerificationReport::default();
        let mut batch = Vec::<(usize, Vec<u8>, Vec<Color>)>::with_capacity(BATCH_SIZE);

        let check_batch = |batch: &mut Vec<(usize, Vec<u8>, Vec<Color>)>, report: &mut VerificationReport| {
            let found: Vec<Mismatch> = thread_pool.install(|| {
                batch.par_iter().flat_map_iter(|(unitig, seq, colors)| check_unitig(*unitig, seq, colors, index, dictionary)).collect()
            });
            for m in found.iter() {
                log::warn!("Verification mismatch: {}", m);
            }
            report.mismatches.extend(found);
            report.num_unitigs_checked += batch.len();
            batch.clear();
        };

        let mut unitig_id = 0_usize;
        source.for_each_unitig(|unitig| {
            if unitig_id < index.num_unitigs() {
                batch.push((unitig_id, unitig.seq.to_vec(), unitig.colors.to_vec()));
            }
            unitig_id += 1;
            if batch.len() == BATCH_SIZE {
                check_batch(&mut batch, &mut report);
            }
            Ok(())
        })?;
        check_batch(&mut batch, &mut report);

        if unitig_id != index.num_unitigs() {
            let m = Mismatch::UnitigCount { expected: unitig_id, found: index.num_unitigs() };
            log::warn!("Verification mismatch: {}", m);
            report.mismatches.push(m);
        }

        if report.is_ok() {
            log::info!("Verified {} unitigs", report.num_unitigs_checked);
        } else {
            log::warn!("{} mismatches in {} unitigs", report.mismatches.len(), report.num_unitigs_checked);
        }
        Ok(report)
    }
}

fn check_unitig<S: ColorSetStore>(
    unitig: usize,
    seq: &[u8],
    colors: &[Color],
    index: &ColorSetIndex<S>,
    dictionary: Option<&dyn KmerDictionary>,
) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();

    if let Some(dict) = dictionary {
        let k = dict.k();
        if seq.len() >= k {
            for (kmer_pos, kmer) in seq.windows(k).enumerate() {
                if kmer.iter().any(|&c| ACGT_TO_0123[c as usize] == 255) {
                    continue; // Not indexed
                }
                match dict.lookup(kmer) {
                    None => mismatches.push(Mismatch::KmerNotFound { unitig, kmer_pos }),
                    Some(found) if found != unitig => mismatches.push(Mismatch::WrongUnitig { unitig, kmer_pos, found }),
                    Some(_) => (),
                }
            }
        }
    }

    let color_set_id = index.color_set_id(unitig);
    let found = index.color_sets().color_set(color_set_id);
    if found != colors {
        mismatches.push(Mismatch::ColorSet { unitig, color_set_id, expected: colors.to_vec(), found });
    }

    mismatches
}
