//! # Introduction
//!
//! This crate builds the color part of a colored compacted de Bruijn graph index.
//! Every unitig of the graph is tagged with the set of reference genomes (*colors*)
//! it occurs in. The index stores every distinct color set once, in compressed form,
//! and maps each unitig to its color set in constant time, so that a query sequence
//! can be pseudo-aligned against a whole collection of references in one lookup pass.
//!
//! The graph itself is built elsewhere. It is consumed through the [ColoredUnitigSource]
//! trait as an ordered stream of `(unitig sequence, color set, same as previous)` triples.
//! Consecutive unitigs with an identical color set form a *run*, and each run is assigned
//! the next dense color-set id.
//!
//! # API Quick start
//!
//! ```
//! use colorindex::*;
//!
//! let unitigs: Vec<(&[u8], Vec<u32>)> = vec![
//!     (b"ACGTTGCA", vec![1, 2]),
//!     (b"TTGACCAT", vec![1, 2]),
//!     (b"GGGACTTA", vec![3]),
//! ];
//! let source = VecColoredUnitigs::new(4, unitigs.into_iter().map(|(s, c)| (s.to_vec(), c)).collect());
//!
//! let config = BuildConfiguration { num_colors: 4, num_threads: 2, ..Default::default() };
//! let mut builder = ColorSetIndexBuilder::<GapColorSetsBuilder>::new(config).unwrap();
//!
//! let mut unitig_fasta = Vec::<u8>::new();
//! let index = builder.build(&source, &mut unitig_fasta).unwrap();
//!
//! assert_eq!(index.num_unitigs(), 3);
//! assert_eq!(index.num_color_sets(), 2);
//! assert_eq!(index.colors_of_unitig(2), vec![3]);
//! ```
//!
//! # Construction pipeline
//!
//! A single producer thread (the caller) consumes the unitig stream. New color sets are
//! copied into fixed-capacity [StagingBuffer]s. When a buffer fills up it is handed to one
//! of T encoder workers, which compresses it into a thread-local partial store and then
//! appends the result to the global store strictly in dispatch order. The producer blocks
//! when all T workers are busy. The boundary bit vector that maps unitigs to color sets is
//! maintained on the producer thread alone. See [ColorSetIndexBuilder] for details.
//!
//! The result does not depend on the number of threads: a build with T = 1 and a build
//! with T = 8 over the same stream produce identical stores and identical bit vectors.

// Color ids, offsets and unitig ids are clearer with explicit indexing
#![allow(clippy::needless_range_loop)]

mod boundary;
mod config;
mod dictionary;
mod encoding;
mod error;
mod index;
mod observer;
mod pipeline;
mod staging;
mod turnstile;
mod util;
mod verify;

pub use boundary::{BoundaryTracker, U2c};
pub use config::{BuildConfiguration, ColorSetEncoding};
pub use dictionary::{HashDictionary, HashDictionaryBuilder, KmerDictionary, KmerDictionaryBuilder};
pub use encoding::*;
pub use error::BuildError;
pub use index::*;
pub use observer::{BuildObserver, LogObserver, NoopObserver};
pub use pipeline::{BuildStats, ColorSetIndexBuilder};
pub use staging::StagingBuffer;
pub use util::VecColoredUnitigs;
pub use verify::{Mismatch, VerificationReport, Verifier};

/// A color: the identifier of one reference genome.
pub type Color = u32;

/// One unitig of the colored compacted de Bruijn graph, as presented by the graph builder.
#[derive(Clone, Copy, Debug)]
pub struct ColoredUnitig<'a> {
    /// ASCII nucleotide sequence of the unitig.
    pub seq: &'a [u8],
    /// Colors of the unitig in strictly ascending order.
    pub colors: &'a [Color],
    /// True iff the color set is the same as the color set of the previous unitig in the stream.
    pub same_color_set: bool,
}

/// The graph-construction collaborator. Presents every unitig of the graph exactly once,
/// in a fixed order, synchronously on the calling thread. Maximal runs of consecutive
/// unitigs sharing a color set are flagged with `same_color_set`.
///
/// The stream must be replayable: the verifier walks it a second time after the build.
pub trait ColoredUnitigSource {
    /// Total number of colors (reference genomes). Every color in the stream is smaller than this.
    fn num_colors(&self) -> u32;

    /// Names of the references, indexed by color. May be empty if the source does not know them.
    fn filenames(&self) -> Vec<String> {
        Vec::new()
    }

    /// Calls `f` once per unitig in stream order. If `f` returns an error, the walk stops
    /// and the error is returned.
    fn for_each_unitig<F>(&self, f: F) -> Result<(), BuildError>
    where F: FnMut(ColoredUnitig<'_>) -> Result<(), BuildError>;
}
