//! The finished index structures and the builder that runs all build steps.

use std::io::Read;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::Arc;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;

use crate::boundary::U2c;
use crate::config::BuildConfiguration;
use crate::config::ColorSetEncoding;
use crate::dictionary::KmerDictionary;
use crate::dictionary::KmerDictionaryBuilder;
use crate::encoding::ColorSetEncoder;
use crate::encoding::ColorSetStore;
use crate::encoding::GapColorSets;
use crate::encoding::GapColorSetsBuilder;
use crate::encoding::HybridColorSets;
use crate::encoding::HybridColorSetsBuilder;
use crate::error::BuildError;
use crate::observer::timed;
use crate::observer::BuildObserver;
use crate::observer::LogObserver;
use crate::pipeline::BuildStats;
use crate::pipeline::ColorSetIndexBuilder;
use crate::util;
use crate::verify::VerificationReport;
use crate::verify::Verifier;
use crate::Color;
use crate::ColoredUnitigSource;

const SERIALIZATION_MAGIC_STRING: &[u8] = b"colorindex-v0.1.0";

// Upper bound for a single reference name when loading
const MAX_FILENAME_LEN: usize = 1 << 16;

/// The color part of the index: the distinct color sets and the mapping from unitigs to them.
/// Build with [ColorSetIndexBuilder].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorSetIndex<S: ColorSetStore> {
    color_sets: S,
    u2c: U2c,
    filenames: Vec<String>,
}

impl<S: ColorSetStore> ColorSetIndex<S> {

    pub fn new(color_sets: S, u2c: U2c, filenames: Vec<String>) -> Self {
        Self { color_sets, u2c, filenames }
    }

    pub fn num_unitigs(&self) -> usize {
        self.u2c.num_unitigs()
    }

    pub fn num_color_sets(&self) -> usize {
        self.color_sets.num_color_sets()
    }

    pub fn num_colors(&self) -> u32 {
        self.color_sets.num_colors()
    }

    /// Dense color-set id of a unitig, in constant time.
    pub fn color_set_id(&self, unitig_id: usize) -> usize {
        self.u2c.color_set_id(unitig_id)
    }

    /// Decodes the color set of a unitig.
    pub fn colors_of_unitig(&self, unitig_id: usize) -> Vec<Color> {
        self.color_sets.color_set(self.color_set_id(unitig_id))
    }

    pub fn color_sets(&self) -> &S {
        &self.color_sets
    }

    pub fn u2c(&self) -> &U2c {
        &self.u2c
    }

    /// Reference names indexed by color. Empty if the unitig source did not provide them.
    pub fn filenames(&self) -> &[String] {
        &self.filenames
    }

    pub fn set_filenames(&mut self, filenames: Vec<String>) {
        self.filenames = filenames;
    }

    /// Writes the index and returns the number of bytes written. Load with [ColorSetIndex::load].
    pub fn serialize<W: Write>(&self, out: &mut W) -> std::io::Result<usize> {
        let mut n_written = 0_usize;

        n_written += util::write_bytes(out, &[SERIALIZATION_MAGIC_STRING.len() as u8])?;
        n_written += util::write_bytes(out, SERIALIZATION_MAGIC_STRING)?;

        n_written += self.u2c.serialize(out)?;
        n_written += self.color_sets.serialize(out)?;

        n_written += util::write_bytes(out, &(self.filenames.len() as u64).to_le_bytes())?;
        for name in self.filenames.iter() {
            n_written += util::write_string(out, name.as_bytes())?;
        }

        Ok(n_written)
    }

    /// Loads an index written with [ColorSetIndex::serialize].
    pub fn load<R: Read>(input: &mut R) -> std::io::Result<Self> {
        let magic_string_length = input.read_u8()?;
        let mut magic_string_buf = vec![0_u8; magic_string_length as usize];
        input.read_exact(&mut magic_string_buf)?;
        if magic_string_buf != SERIALIZATION_MAGIC_STRING {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, format!(
                "incorrect version string: expected \"{}\", found \"{}\"",
                String::from_utf8_lossy(SERIALIZATION_MAGIC_STRING), String::from_utf8_lossy(&magic_string_buf)
            )));
        }

        let u2c = U2c::load(input)?;
        let color_sets = S::load(input)?;
        if u2c.num_color_sets() != color_sets.num_color_sets() {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, format!(
                "{} runs in the unitig mapping but {} color sets", u2c.num_color_sets(), color_sets.num_color_sets()
            )));
        }

        let n_filenames = input.read_u64::<LittleEndian>()? as usize;
        let mut filenames = Vec::new();
        for _ in 0..n_filenames {
            let name = util::read_string(input, MAX_FILENAME_LEN)?;
            filenames.push(String::from_utf8(name).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?);
        }

        Ok(Self { color_sets, u2c, filenames })
    }
}

/// A [ColorSetIndex] with the color-set encoding chosen at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorIndexVariant {
    Gaps(ColorSetIndex<GapColorSets>),
    Hybrid(ColorSetIndex<HybridColorSets>),
}

macro_rules! with_variant {
    ($variant:expr, $index:ident => $body:expr) => {
        match $variant {
            ColorIndexVariant::Gaps($index) => $body,
            ColorIndexVariant::Hybrid($index) => $body,
        }
    };
}

impl ColorIndexVariant {
    /// Type identifier of the encoding, as written by [write_color_index_variant].
    pub fn type_id(&self) -> &'static [u8] {
        match self {
            ColorIndexVariant::Gaps(_) => GapColorSets::TYPE_ID,
            ColorIndexVariant::Hybrid(_) => HybridColorSets::TYPE_ID,
        }
    }

    pub fn num_unitigs(&self) -> usize {
        with_variant!(self, index => index.num_unitigs())
    }

    pub fn num_color_sets(&self) -> usize {
        with_variant!(self, index => index.num_color_sets())
    }

    pub fn num_colors(&self) -> u32 {
        with_variant!(self, index => index.num_colors())
    }

    pub fn color_set_id(&self, unitig_id: usize) -> usize {
        with_variant!(self, index => index.color_set_id(unitig_id))
    }

    pub fn colors_of_unitig(&self, unitig_id: usize) -> Vec<Color> {
        with_variant!(self, index => index.colors_of_unitig(unitig_id))
    }

    pub fn color_set(&self, color_set_id: usize) -> Vec<Color> {
        with_variant!(self, index => index.color_sets().color_set(color_set_id))
    }

    /// Size of the encoded color sets in bits.
    pub fn color_sets_num_bits(&self) -> usize {
        with_variant!(self, index => index.color_sets().num_bits())
    }

    pub fn u2c(&self) -> &U2c {
        with_variant!(self, index => index.u2c())
    }

    pub fn filenames(&self) -> &[String] {
        with_variant!(self, index => index.filenames())
    }
}

/// Writes the index with a type identifier in front, so that it can be loaded with
/// [load_color_index_variant] without knowing the encoding.
pub fn write_color_index_variant(index: &ColorIndexVariant, out: &mut impl Write) -> std::io::Result<usize> {
    let n_written = util::write_string(out, index.type_id())?;
    Ok(n_written + with_variant!(index, index => index.serialize(out)?))
}

/// Loads an index written with [write_color_index_variant].
pub fn load_color_index_variant(input: &mut impl Read) -> std::io::Result<ColorIndexVariant> {
    let type_id = util::read_string(input, 64)?;
    if type_id == GapColorSets::TYPE_ID {
        Ok(ColorIndexVariant::Gaps(ColorSetIndex::load(input)?))
    } else if type_id == HybridColorSets::TYPE_ID {
        Ok(ColorIndexVariant::Hybrid(ColorSetIndex::load(input)?))
    } else {
        Err(std::io::Error::new(std::io::ErrorKind::InvalidData, format!("unknown color index type \"{}\"", String::from_utf8_lossy(&type_id))))
    }
}

/// The complete index: colors plus the k-mer dictionary. Unitig ids agree between the two.
pub struct Index<S: ColorSetStore, D: KmerDictionary> {
    colors: ColorSetIndex<S>,
    dictionary: D,
}

impl<S: ColorSetStore, D: KmerDictionary> Index<S, D> {

    pub fn new(colors: ColorSetIndex<S>, dictionary: D) -> Self {
        Self { colors, dictionary }
    }

    pub fn num_unitigs(&self) -> usize {
        self.colors.num_unitigs()
    }

    pub fn num_color_sets(&self) -> usize {
        self.colors.num_color_sets()
    }

    pub fn num_colors(&self) -> u32 {
        self.colors.num_colors()
    }

    /// Color-set id of a unitig.
    pub fn u2c(&self, unitig_id: usize) -> usize {
        self.colors.color_set_id(unitig_id)
    }

    pub fn color_set(&self, color_set_id: usize) -> Vec<Color> {
        self.colors.color_sets().color_set(color_set_id)
    }

    /// Unitig containing the k-mer.
    pub fn lookup(&self, kmer: &[u8]) -> Option<usize> {
        self.dictionary.lookup(kmer)
    }

    /// Colors of the unitig containing the k-mer.
    pub fn color_set_of_kmer(&self, kmer: &[u8]) -> Option<Vec<Color>> {
        self.lookup(kmer).map(|unitig_id| self.colors.colors_of_unitig(unitig_id))
    }

    pub fn filenames(&self) -> &[String] {
        self.colors.filenames()
    }

    pub fn k(&self) -> usize {
        self.dictionary.k()
    }

    pub fn color_index(&self) -> &ColorSetIndex<S> {
        &self.colors
    }

    pub fn dictionary(&self) -> &D {
        &self.dictionary
    }

    pub fn into_parts(self) -> (ColorSetIndex<S>, D) {
        (self.colors, self.dictionary)
    }
}

/// Runs all build steps over a colored unitig stream: color sets and the unitig mapping,
/// the k-mer dictionary over the intermediate unitig file, reference names and, if
/// configured, verification.
pub struct IndexBuilder<E: ColorSetEncoder, B: KmerDictionaryBuilder> {
    config: BuildConfiguration,
    dictionary_builder: B,
    observer: Arc<dyn BuildObserver>,
    built: bool,
    stats: BuildStats,
    verification: Option<VerificationReport>,
    _encoder: PhantomData<E>,
}

impl<E: ColorSetEncoder, B: KmerDictionaryBuilder> IndexBuilder<E, B> {

    /// Fails with [BuildError::Config] if the configuration is invalid or does not agree
    /// with the encoder type or the dictionary builder.
    pub fn new(config: BuildConfiguration, dictionary_builder: B) -> Result<Self, BuildError> {
        config.validate()?;
        config.validate_dictionary()?;
        if E::Store::TYPE_ID != config.encoding.type_id() {
            return Err(BuildError::Config(format!(
                "encoding {:?} was configured, but the encoder builds {} stores",
                config.encoding, String::from_utf8_lossy(E::Store::TYPE_ID)
            )));
        }
        if dictionary_builder.k() != config.k || dictionary_builder.canonical() != config.canonical {
            return Err(BuildError::Config(format!(
                "dictionary builder has k={} canonical={}, configuration has k={} canonical={}",
                dictionary_builder.k(), dictionary_builder.canonical(), config.k, config.canonical
            )));
        }
        Ok(Self {
            config,
            dictionary_builder,
            observer: Arc::new(LogObserver),
            built: false,
            stats: BuildStats::default(),
            verification: None,
            _encoder: PhantomData,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn BuildObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Report of the verification step, if it was run.
    pub fn verification(&self) -> Option<&VerificationReport> {
        self.verification.as_ref()
    }

    pub fn build<S: ColoredUnitigSource>(&mut self, source: &S) -> Result<Index<E::Store, B::Dictionary>, BuildError> {
        if self.built {
            return Err(BuildError::AlreadyBuilt);
        }
        self.built = true;
        self.config.print();

        let unitigs_path = self.config.unitigs_filename();
        let file = std::fs::File::create(&unitigs_path).map_err(|source| BuildError::OpenOutput { path: unitigs_path.clone(), source })?;
        let mut unitigs_out = std::io::BufWriter::new(file);

        let mut color_builder = ColorSetIndexBuilder::<E>::new(self.config.clone())?.with_observer(self.observer.clone());
        let colors = color_builder.build(source, &mut unitigs_out);
        drop(unitigs_out);
        let colors = match colors {
            Ok(c) => c,
            Err(e) => {
                remove_unitigs_file(&unitigs_path);
                return Err(e);
            }
        };
        self.stats = color_builder.stats().clone();

        let dictionary = timed(self.observer.as_ref(), "Building k-mer dictionary", || self.dictionary_builder.build(&unitigs_path));
        remove_unitigs_file(&unitigs_path);
        let dictionary = dictionary?;

        if colors.filenames().is_empty() {
            log::info!("No reference names given");
        } else {
            log::info!("{} reference names", colors.filenames().len());
        }

        if self.config.check {
            let verifier = Verifier::new(self.config.num_threads);
            let report = timed(self.observer.as_ref(), "Verifying the index", || verifier.verify(source, &colors, Some(&dictionary)))?;
            self.verification = Some(report);
        }

        Ok(Index::new(colors, dictionary))
    }
}

/// Everything [build_color_index] produces.
pub struct BuiltColorIndex<D: KmerDictionary> {
    pub colors: ColorIndexVariant,
    pub dictionary: D,
    pub stats: BuildStats,
    pub verification: Option<VerificationReport>,
}

/// Runs [IndexBuilder] with the color-set encoding selected by `config.encoding`.
pub fn build_color_index<S: ColoredUnitigSource, B: KmerDictionaryBuilder>(
    config: BuildConfiguration,
    dictionary_builder: B,
    source: &S,
    observer: Arc<dyn BuildObserver>,
) -> Result<BuiltColorIndex<B::Dictionary>, BuildError> {
    match config.encoding {
        ColorSetEncoding::Gaps => build_encoded::<GapColorSetsBuilder, _, _>(config, dictionary_builder, source, observer, ColorIndexVariant::Gaps),
        ColorSetEncoding::Hybrid => build_encoded::<HybridColorSetsBuilder, _, _>(config, dictionary_builder, source, observer, ColorIndexVariant::Hybrid),
    }
}

fn build_encoded<E: ColorSetEncoder, S: ColoredUnitigSource, B: KmerDictionaryBuilder>(
    config: BuildConfiguration,
    dictionary_builder: B,
    source: &S,
    observer: Arc<dyn BuildObserver>,
    into_variant: fn(ColorSetIndex<E::Store>) -> ColorIndexVariant,
) -> Result<BuiltColorIndex<B::Dictionary>, BuildError> {
    let mut builder = IndexBuilder::<E, B>::new(config, dictionary_builder)?.with_observer(observer);
    let (colors, dictionary) = builder.build(source)?.into_parts();
    Ok(BuiltColorIndex {
        colors: into_variant(colors),
        dictionary,
        stats: builder.stats.clone(),
        verification: builder.verification.take(),
    })
}

fn remove_unitigs_file(path: &std::path::Path) {
    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("Could not remove {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{GapColorSetsBuilder, HybridColorSetsBuilder};
    use crate::util::VecColoredUnitigs;

    fn small_source() -> VecColoredUnitigs {
        VecColoredUnitigs::new(4, vec![
            (b"ACGTTGCAAC".to_vec(), vec![0, 1]),
            (b"TTGACCATGA".to_vec(), vec![0, 1]),
            (b"GGGACTTAGC".to_vec(), vec![3]),
            (b"CATCATCAGG".to_vec(), vec![]),
        ]).with_filenames(vec!["a.fna".to_string(), "b.fna".to_string(), "c.fna".to_string(), "d.fna".to_string()])
    }

    fn build_colors<E: ColorSetEncoder>(source: &VecColoredUnitigs) -> ColorSetIndex<E::Store> {
        let config = BuildConfiguration { num_colors: source.num_colors(), num_threads: 2, ..Default::default() };
        ColorSetIndexBuilder::<E>::new(config).unwrap().build(source, &mut Vec::new()).unwrap()
    }

    #[test]
    fn serialize_and_load() {
        let index = build_colors::<GapColorSetsBuilder>(&small_source());
        assert_eq!(index.filenames().len(), 4);

        let mut buf = Vec::<u8>::new();
        let n_written = index.serialize(&mut buf).unwrap();
        assert_eq!(n_written, buf.len());

        let loaded = ColorSetIndex::<GapColorSets>::load(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.colors_of_unitig(2), vec![3]);
    }

    #[test]
    fn bad_magic_string() {
        let index = build_colors::<GapColorSetsBuilder>(&small_source());
        let mut buf = Vec::<u8>::new();
        index.serialize(&mut buf).unwrap();
        buf[1] = b'X';
        assert!(ColorSetIndex::<GapColorSets>::load(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn variants_roundtrip() {
        let source = small_source();
        let gaps = ColorIndexVariant::Gaps(build_colors::<GapColorSetsBuilder>(&source));
        let hybrid = ColorIndexVariant::Hybrid(build_colors::<HybridColorSetsBuilder>(&source));

        for variant in [gaps, hybrid] {
            let mut buf = Vec::<u8>::new();
            let n_written = write_color_index_variant(&variant, &mut buf).unwrap();
            assert_eq!(n_written, buf.len());
            let loaded = load_color_index_variant(&mut buf.as_slice()).unwrap();
            assert_eq!(loaded.type_id(), variant.type_id());
            assert_eq!(loaded.num_unitigs(), 4);
            assert_eq!(loaded.num_color_sets(), 3);
            assert_eq!(loaded.colors_of_unitig(1), vec![0, 1]);
            assert!(loaded.colors_of_unitig(3).is_empty());
            assert_eq!(loaded, variant);
        }
    }

    #[test]
    fn unknown_variant() {
        let mut buf = Vec::<u8>::new();
        util::write_string(&mut buf, b"rle").unwrap();
        assert!(load_color_index_variant(&mut buf.as_slice()).is_err());
    }

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("colorindex-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test_log::test]
    fn full_build_with_dictionary() {
        let dir = temp_dir("index-test");
        let config = BuildConfiguration {
            num_colors: 4,
            num_threads: 2,
            k: 5,
            canonical: false,
            check: true,
            tmp_dirname: dir.clone(),
            file_base_name: "full".to_string(),
            ..Default::default()
        };
        let mut builder = IndexBuilder::<GapColorSetsBuilder, _>::new(config.clone(), crate::HashDictionaryBuilder { k: 5, canonical: false }).unwrap();
        let index = builder.build(&small_source()).unwrap();

        assert_eq!(index.num_unitigs(), 4);
        assert_eq!(index.num_color_sets(), 3);
        assert_eq!(index.num_colors(), 4);
        assert_eq!(index.u2c(2), 1);
        assert_eq!(index.color_set(1), vec![3]);
        assert_eq!(index.lookup(b"GGGAC"), Some(2));
        assert_eq!(index.color_set_of_kmer(b"GGGAC"), Some(vec![3]));
        assert_eq!(index.color_set_of_kmer(b"TGCAA"), Some(vec![0, 1]));
        assert_eq!(index.color_set_of_kmer(b"AAAAA"), None);
        assert_eq!(index.filenames()[3], "d.fna");

        // The intermediate file is gone
        assert!(!config.unitigs_filename().exists());

        let report = builder.verification().unwrap();
        assert_eq!(report.num_unitigs_checked, 4);
        assert!(report.is_ok(), "{:?}", report.mismatches);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unwritable_tmp_dir() {
        let config = BuildConfiguration {
            num_colors: 4,
            tmp_dirname: std::path::PathBuf::from("/nonexistent/colorindex/tmp"),
            ..Default::default()
        };
        let mut builder = IndexBuilder::<GapColorSetsBuilder, _>::new(config, crate::HashDictionaryBuilder { k: 31, canonical: true }).unwrap();
        assert!(matches!(builder.build(&small_source()), Err(BuildError::OpenOutput { .. })));
    }

    #[test]
    fn encoder_must_match_configured_encoding() {
        let config = BuildConfiguration { num_colors: 4, encoding: ColorSetEncoding::Hybrid, ..Default::default() };
        let dictionary_builder = crate::HashDictionaryBuilder::from_config(&config);
        let r = IndexBuilder::<GapColorSetsBuilder, _>::new(config.clone(), dictionary_builder);
        assert!(matches!(r, Err(BuildError::Config(_))));
        assert!(IndexBuilder::<HybridColorSetsBuilder, _>::new(config, dictionary_builder).is_ok());
    }

    #[test]
    fn dictionary_builder_must_match_config() {
        let config = BuildConfiguration { num_colors: 4, k: 21, canonical: true, ..Default::default() };
        for (k, canonical) in [(31, true), (21, false)] {
            let r = IndexBuilder::<GapColorSetsBuilder, _>::new(config.clone(), crate::HashDictionaryBuilder { k, canonical });
            assert!(matches!(r, Err(BuildError::Config(_))), "k={} canonical={}", k, canonical);
        }
    }

    #[test_log::test]
    fn build_selects_configured_encoding() {
        let dir = temp_dir("encoding-test");
        for encoding in [ColorSetEncoding::Gaps, ColorSetEncoding::Hybrid] {
            let config = BuildConfiguration {
                num_colors: 4,
                num_threads: 2,
                k: 5,
                check: true,
                tmp_dirname: dir.clone(),
                file_base_name: format!("{:?}", encoding),
                encoding,
                ..Default::default()
            };
            let built = build_color_index(config.clone(), crate::HashDictionaryBuilder::from_config(&config), &small_source(), Arc::new(crate::NoopObserver)).unwrap();

            assert_eq!(built.colors.type_id(), encoding.type_id());
            assert_eq!(built.colors.colors_of_unitig(2), vec![3]);
            assert_eq!(built.dictionary.lookup(b"GGGAC"), Some(2));
            assert_eq!(built.stats.num_unitigs, 4);
            assert!(built.verification.unwrap().is_ok());
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn rejects_bad_k() {
        let config = BuildConfiguration { num_colors: 4, k: 40, ..Default::default() };
        let r = IndexBuilder::<GapColorSetsBuilder, _>::new(config, crate::HashDictionaryBuilder { k: 40, canonical: true });
        assert!(matches!(r, Err(BuildError::Config(_))));
    }
}
