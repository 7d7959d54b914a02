use super::{read_gaps, write_gamma, write_gaps, BitReader, Bits, ColorSetCodec};
use crate::Color;

/// How a set of a given size is laid out. Depends only on the set size and the
/// number of colors, so no selector bits are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    Sparse,     // Gaps between present colors
    Bitmap,     // One bit per color
    Complement, // Gaps between absent colors
}

fn layout(size: usize, num_colors: u32) -> Layout {
    let n = num_colors as usize;
    if size * 4 < n {
        Layout::Sparse
    } else if size * 4 > 3 * n {
        Layout::Complement
    } else {
        Layout::Bitmap
    }
}

/// Encodes a set as its gamma-coded size followed by, depending on density:
/// gaps between colors (fewer than a quarter of all colors present), a bitmap of
/// `num_colors` bits (between a quarter and three quarters), or gaps between the
/// absent colors (more than three quarters present).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HybridCodec;

impl ColorSetCodec for HybridCodec {
    const TYPE_ID: &'static [u8] = b"hybrid";

    fn encode(&self, colors: &[Color], num_colors: u32, out: &mut Bits) {
        write_gamma(out, colors.len() as u64);
        match layout(colors.len(), num_colors) {
            Layout::Sparse => write_gaps(out, colors.iter().copied()),
            Layout::Bitmap => {
                let start = out.len();
                out.resize(start + num_colors as usize, false);
                for &c in colors {
                    out.set(start + c as usize, true);
                }
            }
            Layout::Complement => {
                let mut present = colors.iter().copied().peekable();
                let absent = (0..num_colors).filter(move |&c| {
                    if present.peek() == Some(&c) {
                        present.next();
                        false
                    } else {
                        true
                    }
                });
                write_gaps(out, absent);
            }
        }
    }

    fn decode(&self, reader: &mut BitReader<'_>, num_colors: u32, out: &mut Vec<Color>) {
        let size = reader.read_gamma() as usize;
        out.reserve(size);
        match layout(size, num_colors) {
            Layout::Sparse => read_gaps(reader, size, out),
            Layout::Bitmap => {
                for c in 0..num_colors {
                    if reader.read_bit() {
                        out.push(c);
                    }
                }
            }
            Layout::Complement => {
                let mut absent = Vec::with_capacity(num_colors as usize - size);
                read_gaps(reader, num_colors as usize - size, &mut absent);
                let mut absent = absent.into_iter().peekable();
                for c in 0..num_colors {
                    if absent.peek() == Some(&c) {
                        absent.next();
                    } else {
                        out.push(c);
                    }
                }
            }
        }
    }
}
