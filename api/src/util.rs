//! Miscellaneous utility functions and constants used in the crate.

use std::io::Read;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;

use crate::BuildError;
use crate::Color;
use crate::ColoredUnitig;
use crate::ColoredUnitigSource;

// Returns the number of bytes written
pub(crate) fn write_bytes<W: std::io::Write>(out: &mut W, bytes: &[u8]) -> std::io::Result<usize>{
    out.write_all(bytes)?;
    Ok(bytes.len())
}

// Length-prefixed little-endian u64 array. Returns the number of bytes written.
pub(crate) fn write_u64_slice<W: std::io::Write>(out: &mut W, values: &[u64]) -> std::io::Result<usize> {
    let mut n_written = write_bytes(out, &(values.len() as u64).to_le_bytes())?;
    for v in values {
        n_written += write_bytes(out, &v.to_le_bytes())?;
    }
    Ok(n_written)
}

// Inverse of write_u64_slice
pub(crate) fn read_u64_vec<R: Read>(input: &mut R) -> std::io::Result<Vec<u64>> {
    let len = input.read_u64::<LittleEndian>()?;
    let n_bytes = len.checked_mul(8).ok_or(std::io::ErrorKind::InvalidData)?;

    // Read through take() so that a corrupt length does not allocate up front
    let mut bytes = Vec::<u8>::new();
    input.by_ref().take(n_bytes).read_to_end(&mut bytes)?;
    if bytes.len() as u64 != n_bytes {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    Ok(bytes.chunks_exact(8).map(|chunk| {
        let mut arr = [0_u8; 8];
        arr.copy_from_slice(chunk);
        u64::from_le_bytes(arr)
    }).collect())
}

// Length-prefixed byte string
pub(crate) fn write_string<W: std::io::Write>(out: &mut W, s: &[u8]) -> std::io::Result<usize> {
    let mut n_written = write_bytes(out, &(s.len() as u64).to_le_bytes())?;
    n_written += write_bytes(out, s)?;
    Ok(n_written)
}

pub(crate) fn read_string<R: Read>(input: &mut R, max_len: usize) -> std::io::Result<Vec<u8>> {
    let len = input.read_u64::<LittleEndian>()? as usize;
    if len > max_len {
        return Err(std::io::ErrorKind::InvalidData.into());
    }
    let mut buf = vec![0_u8; len];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

// Maps ascii A -> 0, C -> 1, G -> 2, T -> 3, and the same for lower case.
// All other characters map to 255.
pub(crate) const ACGT_TO_0123: [u8; 256] = {
    let mut table = [255_u8; 256];
    table[b'A' as usize] = 0; table[b'a' as usize] = 0;
    table[b'C' as usize] = 1; table[b'c' as usize] = 1;
    table[b'G' as usize] = 2; table[b'g' as usize] = 2;
    table[b'T' as usize] = 3; table[b't' as usize] = 3;
    table
};

/// Returns a description of what is wrong with the color set, or None if it is strictly
/// ascending and every color is smaller than `num_colors`.
pub(crate) fn check_color_set(colors: &[Color], num_colors: u32) -> Option<String> {
    for i in 0..colors.len() {
        if colors[i] >= num_colors {
            return Some(format!("color {} is out of range (number of colors is {})", colors[i], num_colors));
        }
        if i > 0 && colors[i] <= colors[i-1] {
            return Some(format!("colors are not strictly ascending at position {} ({} after {})", i, colors[i], colors[i-1]));
        }
    }
    None
}

/// An in-memory [ColoredUnitigSource] over owned unitigs. The `same_color_set` flag is
/// computed by comparing each color set with the color set of the previous unitig, so
/// runs are exactly the maximal blocks of consecutive equal sets.
#[derive(Clone, Debug, Default)]
pub struct VecColoredUnitigs {
    num_colors: u32,
    unitigs: Vec<(Vec<u8>, Vec<Color>)>,
    filenames: Vec<String>,
}

impl VecColoredUnitigs {
    /// Creates a source over `(sequence, colors)` pairs, presented in the given order.
    pub fn new(num_colors: u32, unitigs: Vec<(Vec<u8>, Vec<Color>)>) -> Self {
        Self { num_colors, unitigs, filenames: Vec::new() }
    }

    /// Sets the reference names, one per color.
    pub fn with_filenames(mut self, filenames: Vec<String>) -> Self {
        self.filenames = filenames;
        self
    }

    pub fn len(&self) -> usize {
        self.unitigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unitigs.is_empty()
    }

    /// The `i`-th unitig of the stream.
    pub fn get(&self, i: usize) -> (&[u8], &[Color]) {
        let (seq, colors) = &self.unitigs[i];
        (seq, colors)
    }
}

impl ColoredUnitigSource for VecColoredUnitigs {
    fn num_colors(&self) -> u32 {
        self.num_colors
    }

    fn filenames(&self) -> Vec<String> {
        self.filenames.clone()
    }

    fn for_each_unitig<F>(&self, mut f: F) -> Result<(), BuildError>
    where F: FnMut(ColoredUnitig<'_>) -> Result<(), BuildError> {
        let mut prev: Option<&[Color]> = None;
        for (seq, colors) in self.unitigs.iter() {
            let same_color_set = prev == Some(colors.as_slice());
            f(ColoredUnitig { seq, colors, same_color_set })?;
            prev = Some(colors.as_slice());
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn gen_random_dna_string(len: usize, seed: u64) -> Vec<u8> {
    use rand_chacha::rand_core::{RngCore, SeedableRng};

    let mut rng = rand_chacha::ChaCha20Rng::seed_from_u64(seed);
    (0..len).map(|_| {
        match rng.next_u64() % 4 {
            0 => b'A',
            1 => b'C',
            2 => b'G',
            3 => b'T',
            _ => panic!("Impossible")
        }
    }).collect()
}
