//! Build configuration for color-set index construction.

use std::path::PathBuf;

use crate::encoding::ColorSetStore;
use crate::encoding::GapColorSets;
use crate::encoding::HybridColorSets;
use crate::error::BuildError;

/// Number of 32-bit words reserved per color for one staging buffer.
pub const BUFFER_WORDS_PER_COLOR: usize = 10_000;

/// Hard cap for one staging buffer: 2^28 words.
pub const MAX_BUFFER_BYTES: usize = (1 << 28) * std::mem::size_of::<u32>();

/// Which color-set encoding to use for the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSetEncoding {
    /// Gamma-coded gaps between consecutive colors. See [GapCodec](crate::GapCodec).
    #[default]
    Gaps,
    /// Gaps, bitmap or complemented gaps depending on density. See [HybridCodec](crate::HybridCodec).
    Hybrid,
}

impl ColorSetEncoding {
    /// Type identifier of the store this encoding produces.
    pub fn type_id(&self) -> &'static [u8] {
        match self {
            ColorSetEncoding::Gaps => GapColorSets::TYPE_ID,
            ColorSetEncoding::Hybrid => HybridColorSets::TYPE_ID,
        }
    }
}

impl std::str::FromStr for ColorSetEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gaps" => Ok(ColorSetEncoding::Gaps),
            "hybrid" => Ok(ColorSetEncoding::Hybrid),
            _ => Err(format!("unknown color set encoding \"{}\" (expected gaps or hybrid)", s)),
        }
    }
}

/// Configuration parameters for building the index.
#[derive(Debug, Clone)]
pub struct BuildConfiguration {
    /// Number of colors in the collection. Sizes the staging buffers.
    pub num_colors: u32,

    /// Number of encoder worker slots T. At most T buffers are being encoded at any time.
    pub num_threads: usize,

    /// Capacity of one staging buffer in bytes. `None` means
    /// `min(num_colors * BUFFER_WORDS_PER_COLOR * 4, MAX_BUFFER_BYTES)`.
    pub buffer_bytes: Option<usize>,

    /// Directory for the intermediate unitig file
    pub tmp_dirname: PathBuf,

    /// Base name of the intermediate unitig file
    pub file_base_name: String,

    /// K-mer length of the dictionary (at most 32)
    pub k: usize,

    /// Build the dictionary in canonical mode (a k-mer and its reverse complement are the same key)
    pub canonical: bool,

    /// Run the verifier after the build
    pub check: bool,

    /// Color-set encoding of the store
    pub encoding: ColorSetEncoding,
}

impl Default for BuildConfiguration {
    fn default() -> Self {
        Self {
            num_colors: 0,
            num_threads: 1,
            buffer_bytes: None,
            tmp_dirname: PathBuf::from("."),
            file_base_name: String::from("colorindex"),
            k: 31,
            canonical: true,
            check: false,
            encoding: ColorSetEncoding::Gaps,
        }
    }
}

impl BuildConfiguration {

    /// Capacity of one staging buffer in bytes.
    pub fn staging_buffer_bytes(&self) -> usize {
        match self.buffer_bytes {
            Some(b) => b,
            None => std::cmp::min(
                (self.num_colors as usize).saturating_mul(BUFFER_WORDS_PER_COLOR * std::mem::size_of::<u32>()),
                MAX_BUFFER_BYTES,
            ),
        }
    }

    /// Path of the intermediate unitig file handed to the k-mer dictionary builder.
    pub fn unitigs_filename(&self) -> PathBuf {
        self.tmp_dirname.join(format!("{}.unitigs.fa", self.file_base_name))
    }

    /// Checks the parameters needed by the color-set stage.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.num_threads == 0 {
            return Err(BuildError::Config("num_threads must be at least 1".to_string()));
        }
        if self.num_colors == 0 {
            return Err(BuildError::Config("num_colors must be at least 1".to_string()));
        }

        // An empty buffer must hold the largest possible color set plus its size prefix
        let needed = (self.num_colors as usize + 1) * std::mem::size_of::<u32>();
        if self.staging_buffer_bytes() < needed {
            return Err(BuildError::Config(format!(
                "staging buffer of {} bytes cannot hold a color set of {} colors ({} bytes)",
                self.staging_buffer_bytes(), self.num_colors, needed
            )));
        }
        Ok(())
    }

    /// Checks the parameters of the dictionary stage.
    pub fn validate_dictionary(&self) -> Result<(), BuildError> {
        if self.k == 0 || self.k > 32 {
            return Err(BuildError::Config(format!("k must be in range [1, 32], got k={}", self.k)));
        }
        Ok(())
    }

    /// Log configuration parameters
    pub fn print(&self) {
        log::info!("Build configuration:");
        log::info!("  num_colors = {}", self.num_colors);
        log::info!("  num_threads = {}", self.num_threads);
        log::info!("  staging buffer = {}", human_bytes::human_bytes(self.staging_buffer_bytes() as f64));
        log::info!("  encoding = {:?}", self.encoding);
        log::debug!("  k = {}", self.k);
        log::debug!("  canonical = {}", self.canonical);
        log::debug!("  check = {}", self.check);
        log::debug!("  tmp_dirname = {}", self.tmp_dirname.display());
        log::debug!("  file_base_name = {}", self.file_base_name);
    }
}
