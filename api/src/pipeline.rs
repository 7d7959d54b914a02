//! The concurrent color-set builder.
//!
//! One producer (the calling thread) walks the unitig stream. New color sets go into the
//! staging buffer of the current worker slot. A full buffer is sent to that slot's encoder
//! worker together with the next ticket, and the producer moves on to the next slot,
//! first waiting for the worker of that slot to hand back its previous buffer. This bounds
//! the number of buffers in flight to the number of slots. Workers encode their buffer
//! into a thread-local encoder and append it to the global encoder through the
//! [Turnstile](crate::turnstile::Turnstile), strictly in ticket order.

use std::io::Write;
use std::marker::PhantomData;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam::channel::bounded;
use crossbeam::channel::Receiver;
use crossbeam::channel::Sender;
use serde::Serialize;

use crate::boundary::BoundaryTracker;
use crate::config::BuildConfiguration;
use crate::encoding::ColorSetEncoder;
use crate::encoding::ColorSetStore;
use crate::error::BuildError;
use crate::index::ColorSetIndex;
use crate::observer::timed;
use crate::observer::BuildObserver;
use crate::observer::LogObserver;
use crate::staging::StagingBuffer;
use crate::turnstile::AbortOnPanic;
use crate::turnstile::Turnstile;
use crate::util::check_color_set;
use crate::Color;
use crate::ColoredUnitig;
use crate::ColoredUnitigSource;

/// Counters collected during a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub num_unitigs: usize,
    pub num_distinct_color_sets: usize,
    pub num_buffers_dispatched: usize,
    /// Largest number of buffers being encoded or waiting to be appended at the same time
    pub max_in_flight: usize,
    pub staging_buffer_bytes: usize,
    pub color_sets_num_bits: usize,
}

/// Builds the color-set store and the unitig-to-color-set mapping from a unitig stream.
///
/// The encoder type decides the bit-level representation of the color sets, for example
/// [GapColorSetsBuilder](crate::GapColorSetsBuilder). A builder builds exactly once.
pub struct ColorSetIndexBuilder<E: ColorSetEncoder> {
    config: BuildConfiguration,
    observer: Arc<dyn BuildObserver>,
    built: bool,
    stats: BuildStats,
    _encoder: PhantomData<E>,
}

impl<E: ColorSetEncoder> ColorSetIndexBuilder<E> {

    /// Validates the configuration. Fails if it cannot be used for a build.
    pub fn new(config: BuildConfiguration) -> Result<Self, BuildError> {
        config.validate()?;
        Ok(Self { config, observer: Arc::new(LogObserver), built: false, stats: BuildStats::default(), _encoder: PhantomData })
    }

    /// Replaces the default [LogObserver].
    pub fn with_observer(mut self, observer: Arc<dyn BuildObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Statistics of the finished build.
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Consumes the stream once. The unitig sequences are written to `unitigs_out` in
    /// processing order, one `">\n" + seq + "\n"` record per unitig, so that record `i`
    /// is unitig `i`.
    pub fn build<S: ColoredUnitigSource, W: Write>(&mut self, source: &S, unitigs_out: &mut W) -> Result<ColorSetIndex<E::Store>, BuildError> {
        if self.built {
            return Err(BuildError::AlreadyBuilt);
        }
        if source.num_colors() != self.config.num_colors {
            return Err(BuildError::Config(format!(
                "the unitig source has {} colors but the configuration says {}",
                source.num_colors(), self.config.num_colors
            )));
        }
        self.built = true;

        let observer = self.observer.clone();
        let result = timed(observer.as_ref(), "Building color sets", || self.run(source, unitigs_out));
        if let Err(e) = &result {
            log::error!("Color set construction failed: {}", e);
        }
        result
    }

    fn run<S: ColoredUnitigSource, W: Write>(&mut self, source: &S, unitigs_out: &mut W) -> Result<ColorSetIndex<E::Store>, BuildError> {
        let num_colors = self.config.num_colors;
        let n_slots = self.config.num_threads;
        let buffer_bytes = self.config.staging_buffer_bytes();
        log::info!("Encoding color sets with {} workers, staging buffers of {}", n_slots, human_bytes::human_bytes(buffer_bytes as f64));

        let turnstile = Turnstile::new(E::new(num_colors));
        let in_flight = InFlight::default();

        let (producer_result, boundary, counters, worker_results) = std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(n_slots);
            let mut slots = Vec::with_capacity(n_slots);
            for _ in 0..n_slots {
                let (job_sender, job_receiver) = bounded::<Job>(1);
                let (recycle_sender, recycle_receiver) = bounded::<StagingBuffer>(1);
                let turnstile = &turnstile;
                let in_flight = &in_flight;
                handles.push(scope.spawn(move || run_worker(job_receiver, recycle_sender, turnstile, in_flight, num_colors)));
                slots.push(Slot { jobs: job_sender, recycled: recycle_receiver, dispatched: false });
            }

            let mut producer = Producer {
                num_colors,
                buffer_bytes,
                slots,
                current_slot: 0,
                current: StagingBuffer::new(buffer_bytes),
                next_ticket: 0,
                boundary: BoundaryTracker::new(),
                num_unitigs: 0,
                num_distinct: 0,
                in_flight: &in_flight,
            };

            let producer_result = {
                let _guard = AbortOnPanic { turnstile: &turnstile };
                producer.consume(source, unitigs_out)
            };
            if producer_result.is_err() {
                // Let the workers finish what they have without waiting for each other
                turnstile.abort();
            }

            let counters = (producer.num_unitigs, producer.num_distinct, producer.next_ticket as usize);
            let boundary = producer.boundary;
            drop(producer.slots); // Closes the job channels so that the workers exit

            let worker_results: Vec<std::thread::Result<Result<(), BuildError>>> = handles.into_iter().map(|h| h.join()).collect();
            (producer_result, boundary, counters, worker_results)
        });

        combine_errors(producer_result, worker_results)?;

        let (num_unitigs, num_distinct, num_dispatched) = counters;
        if turnstile.num_appended() != num_dispatched as u64 {
            return Err(BuildError::Invariant(format!("{} buffers dispatched but {} appended", num_dispatched, turnstile.num_appended())));
        }
        let global = turnstile.into_inner()?;
        if global.num_color_sets() != num_distinct {
            return Err(BuildError::Invariant(format!("{} color sets staged but {} encoded", num_distinct, global.num_color_sets())));
        }

        let u2c = boundary.finish();
        let store = global.build();

        if u2c.num_unitigs() != num_unitigs || u2c.num_color_sets() != num_distinct || store.num_color_sets() != num_distinct {
            return Err(BuildError::Invariant(format!(
                "{} unitigs and {} runs in the boundary vector, {} unitigs and {} distinct color sets in the stream, {} sets in the store",
                u2c.num_unitigs(), u2c.num_color_sets(), num_unitigs, num_distinct, store.num_color_sets()
            )));
        }

        self.stats = BuildStats {
            num_unitigs,
            num_distinct_color_sets: num_distinct,
            num_buffers_dispatched: num_dispatched,
            max_in_flight: in_flight.max.load(Ordering::SeqCst),
            staging_buffer_bytes: buffer_bytes,
            color_sets_num_bits: store.num_bits(),
        };
        log::info!("{} unitigs, {} distinct color sets, {} buffers dispatched", num_unitigs, num_distinct, num_dispatched);
        log::info!("Color sets take {}", human_bytes::human_bytes(store.num_bits().div_ceil(8) as f64));

        Ok(ColorSetIndex::new(store, u2c, source.filenames()))
    }
}

// A worker panic beats everything. Otherwise the first error that is not merely a
// consequence of another failure is reported, producer first.
fn combine_errors(producer_result: Result<(), BuildError>, worker_results: Vec<std::thread::Result<Result<(), BuildError>>>) -> Result<(), BuildError> {
    let mut errors = Vec::<BuildError>::new();
    if let Err(e) = producer_result {
        errors.push(e);
    }
    for (slot, r) in worker_results.into_iter().enumerate() {
        match r {
            Err(_) => return Err(BuildError::WorkerPanicked { slot }),
            Ok(Err(e)) => errors.push(e),
            Ok(Ok(())) => (),
        }
    }

    match errors.iter().position(|e| !e.is_secondary()) {
        Some(i) => Err(errors.swap_remove(i)),
        None => match errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        },
    }
}

#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

struct Job {
    ticket: u64,
    buffer: StagingBuffer,
}

// Producer end of one worker slot
struct Slot {
    jobs: Sender<Job>,
    recycled: Receiver<StagingBuffer>,
    dispatched: bool, // Whether the worker holds or has held a buffer of this slot
}

fn run_worker<E: ColorSetEncoder>(
    jobs: Receiver<Job>,
    recycle: Sender<StagingBuffer>,
    turnstile: &Turnstile<E>,
    in_flight: &InFlight,
    num_colors: u32,
) -> Result<(), BuildError> {
    let _guard = AbortOnPanic { turnstile };
    let mut local = E::new(num_colors);
    while let Ok(job) = jobs.recv() {
        local.clear();
        local.reserve_num_bits(job.buffer.size_in_bytes() * 8);
        for colors in job.buffer.iter() {
            local.encode(colors);
        }
        let appended = turnstile.append_in_turn(job.ticket, &local);
        in_flight.current.fetch_sub(1, Ordering::SeqCst);

        // The producer may already be gone after a failure elsewhere
        let _ = recycle.send(job.buffer);
        appended?;
    }
    Ok(())
}

struct Producer<'a> {
    num_colors: u32,
    buffer_bytes: usize,
    slots: Vec<Slot>,
    current_slot: usize,
    current: StagingBuffer, // Buffer of the current slot
    next_ticket: u64,
    boundary: BoundaryTracker,
    num_unitigs: usize,
    num_distinct: usize,
    in_flight: &'a InFlight,
}

impl Producer<'_> {

    fn consume<S: ColoredUnitigSource, W: Write>(&mut self, source: &S, out: &mut W) -> Result<(), BuildError> {
        source.for_each_unitig(|unitig| self.push_unitig(unitig, out))?;
        if self.num_unitigs == 0 {
            return Err(BuildError::EmptyStream);
        }
        if !self.current.is_empty() {
            self.dispatch()?;
        }
        out.flush()?;
        Ok(())
    }

    fn push_unitig<W: Write>(&mut self, unitig: ColoredUnitig<'_>, out: &mut W) -> Result<(), BuildError> {
        // The first unitig always starts a run
        if self.num_unitigs == 0 || !unitig.same_color_set {
            if let Some(reason) = check_color_set(unitig.colors, self.num_colors) {
                return Err(BuildError::InvalidColorSet { unitig: self.num_unitigs, reason });
            }
            self.boundary.close_run();
            self.stage(unitig.colors)?;
            self.num_distinct += 1;
        }
        self.boundary.push_unitig();

        out.write_all(b">\n")?;
        out.write_all(unitig.seq)?;
        out.write_all(b"\n")?;
        self.num_unitigs += 1;
        Ok(())
    }

    fn stage(&mut self, colors: &[Color]) -> Result<(), BuildError> {
        if self.current.insert(colors) {
            return Ok(());
        }
        if !self.current.is_empty() {
            self.dispatch()?;
            self.rotate()?;
            if self.current.insert(colors) {
                return Ok(());
            }
        }
        Err(BuildError::BufferTooSmall {
            num_colors: colors.len(),
            needed_bytes: StagingBuffer::record_bytes(colors.len()),
            capacity_bytes: self.current.capacity_in_bytes(),
        })
    }

    // Hands the current buffer to the worker of the current slot with the next ticket.
    fn dispatch(&mut self) -> Result<(), BuildError> {
        let slot = &mut self.slots[self.current_slot];
        let job = Job { ticket: self.next_ticket, buffer: std::mem::take(&mut self.current) };
        let n_sets = job.buffer.num_sets();

        let now_in_flight = self.in_flight.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.in_flight.max.fetch_max(now_in_flight, Ordering::SeqCst);
        if slot.jobs.send(job).is_err() {
            self.in_flight.current.fetch_sub(1, Ordering::SeqCst);
            return Err(BuildError::WorkerDisconnected { slot: self.current_slot });
        }
        slot.dispatched = true;
        log::debug!("Dispatched buffer {} with {} color sets to worker {}", self.next_ticket, n_sets, self.current_slot);
        self.next_ticket += 1;
        Ok(())
    }

    // Moves to the next slot and takes over its buffer, waiting for its worker if needed.
    fn rotate(&mut self) -> Result<(), BuildError> {
        self.current_slot = (self.current_slot + 1) % self.slots.len();
        let slot = &self.slots[self.current_slot];
        self.current = if slot.dispatched {
            slot.recycled.recv().map_err(|_| BuildError::WorkerDisconnected { slot: self.current_slot })?
        } else {
            StagingBuffer::new(self.buffer_bytes)
        };
        self.current.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::encoding::{GapColorSets, GapColorSetsBuilder, HybridColorSetsBuilder};
    use crate::observer::tests::RecordingObserver;
    use crate::util::VecColoredUnitigs;
    use crate::NoopObserver;

    fn config(num_colors: u32, num_threads: usize, buffer_bytes: Option<usize>) -> BuildConfiguration {
        BuildConfiguration { num_colors, num_threads, buffer_bytes, ..Default::default() }
    }

    fn build_gaps(source: &VecColoredUnitigs, config: BuildConfiguration) -> Result<(ColorSetIndex<GapColorSets>, BuildStats, Vec<u8>), BuildError> {
        let mut builder = ColorSetIndexBuilder::<GapColorSetsBuilder>::new(config)?.with_observer(Arc::new(NoopObserver));
        let mut fasta = Vec::<u8>::new();
        let index = builder.build(source, &mut fasta)?;
        Ok((index, builder.stats().clone(), fasta))
    }

    // Runs of random lengths with random color sets. Neighboring runs always differ.
    fn random_stream(n_runs: usize, num_colors: u32, seed: u64) -> VecColoredUnitigs {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut unitigs = Vec::new();
        let mut prev: Option<Vec<Color>> = None;
        for _ in 0..n_runs {
            let density = rng.gen_range(0.0, 1.0);
            let mut colors: Vec<Color> = (0..num_colors).filter(|_| rng.gen_bool(density)).collect();
            if prev.as_ref() == Some(&colors) {
                // Make it different from the previous run
                if colors.is_empty() { colors.push(0) } else { colors.pop(); }
            }
            let run_len = rng.gen_range(1, 6);
            for _ in 0..run_len {
                let seq: Vec<u8> = (0..rng.gen_range(5, 20)).map(|_| b"ACGT"[rng.gen_range(0, 4)]).collect();
                unitigs.push((seq, colors.clone()));
            }
            prev = Some(colors);
        }
        VecColoredUnitigs::new(num_colors, unitigs)
    }

    fn expected_ids(source: &VecColoredUnitigs) -> Vec<usize> {
        let mut ids = Vec::new();
        let mut id = 0;
        for i in 0..source.len() {
            if i > 0 && source.get(i).1 != source.get(i - 1).1 {
                id += 1;
            }
            ids.push(id);
        }
        ids
    }

    #[test_log::test]
    fn two_runs_scenario() {
        let source = VecColoredUnitigs::new(4, vec![
            (b"AAAA".to_vec(), vec![1, 2]),
            (b"CCCC".to_vec(), vec![1, 2]),
            (b"GGGG".to_vec(), vec![3]),
            (b"TTTT".to_vec(), vec![3]),
            (b"ACGT".to_vec(), vec![3]),
        ]);
        let (index, stats, fasta) = build_gaps(&source, config(4, 2, None)).unwrap();

        assert_eq!(index.u2c().to_bools(), vec![false, true, false, false, true]);
        assert_eq!(index.num_color_sets(), 2);
        assert_eq!(index.color_sets().color_set(0), vec![1, 2]);
        assert_eq!(index.color_sets().color_set(1), vec![3]);
        let ids: Vec<usize> = (0..5).map(|u| index.color_set_id(u)).collect();
        assert_eq!(ids, vec![0, 0, 1, 1, 1]);

        assert_eq!(stats.num_unitigs, 5);
        assert_eq!(stats.num_distinct_color_sets, 2);
        assert_eq!(stats.num_buffers_dispatched, 1);
        assert_eq!(fasta, b">\nAAAA\n>\nCCCC\n>\nGGGG\n>\nTTTT\n>\nACGT\n".to_vec());
    }

    #[test]
    fn single_unitig() {
        let source = VecColoredUnitigs::new(3, vec![(b"ACGTA".to_vec(), vec![0, 2])]);
        let (index, _, _) = build_gaps(&source, config(3, 4, None)).unwrap();
        assert_eq!(index.u2c().to_bools(), vec![true]);
        assert_eq!(index.u2c().rank_inclusive(0), 1);
        assert_eq!(index.color_set_id(0), 0);
        assert_eq!(index.colors_of_unitig(0), vec![0, 2]);
    }

    #[test]
    fn first_unitig_opens_a_run_even_if_flagged_same() {
        struct Flagged;
        impl ColoredUnitigSource for Flagged {
            fn num_colors(&self) -> u32 { 2 }
            fn for_each_unitig<F>(&self, mut f: F) -> Result<(), BuildError>
            where F: FnMut(ColoredUnitig<'_>) -> Result<(), BuildError> {
                f(ColoredUnitig { seq: b"AC", colors: &[1], same_color_set: true })?;
                f(ColoredUnitig { seq: b"GT", colors: &[1], same_color_set: true })
            }
        }
        let mut builder = ColorSetIndexBuilder::<GapColorSetsBuilder>::new(config(2, 1, None)).unwrap();
        let index = builder.build(&Flagged, &mut Vec::new()).unwrap();
        assert_eq!(index.u2c().to_bools(), vec![false, true]);
        assert_eq!(index.colors_of_unitig(1), vec![1]);
    }

    #[test]
    fn empty_color_sets_are_runs_too() {
        let source = VecColoredUnitigs::new(2, vec![
            (b"AA".to_vec(), vec![]),
            (b"CC".to_vec(), vec![0]),
            (b"GG".to_vec(), vec![]),
        ]);
        let (index, _, _) = build_gaps(&source, config(2, 1, None)).unwrap();
        assert_eq!(index.num_color_sets(), 3);
        assert!(index.colors_of_unitig(2).is_empty());
    }

    #[test]
    fn buffer_smaller_than_one_color_set() {
        // 4 colors need 20 bytes in the worst case
        let result = ColorSetIndexBuilder::<GapColorSetsBuilder>::new(config(4, 1, Some(16)));
        assert!(matches!(result, Err(BuildError::Config(_))));
    }

    #[test_log::test]
    fn thread_count_does_not_change_output() {
        let num_colors = 20;
        let source = random_stream(500, num_colors, 123);
        // Room for a handful of sets per buffer, so that there are many buffers
        let buffer_bytes = Some((num_colors as usize + 1) * 4 * 3);

        let (single, single_stats, single_fasta) = build_gaps(&source, config(num_colors, 1, buffer_bytes)).unwrap();
        let (multi, multi_stats, multi_fasta) = build_gaps(&source, config(num_colors, 8, buffer_bytes)).unwrap();

        assert!(single_stats.num_buffers_dispatched > 20);
        assert_eq!(single.color_sets(), multi.color_sets());
        assert_eq!(single.u2c(), multi.u2c());
        assert_eq!(single_fasta, multi_fasta);
        assert_eq!(single_stats.num_buffers_dispatched, multi_stats.num_buffers_dispatched);
        assert_eq!(single_stats.color_sets_num_bits, multi_stats.color_sets_num_bits);
    }

    #[test]
    fn round_trip_of_every_unitig() {
        let num_colors = 50;
        let source = random_stream(300, num_colors, 5);
        let mut builder = ColorSetIndexBuilder::<HybridColorSetsBuilder>::new(config(num_colors, 3, Some(1024))).unwrap();
        let index = builder.build(&source, &mut Vec::new()).unwrap();

        let ids = expected_ids(&source);
        assert_eq!(index.num_unitigs(), source.len());
        assert_eq!(index.num_color_sets(), ids[ids.len() - 1] + 1);
        for u in 0..source.len() {
            assert_eq!(index.color_set_id(u), ids[u]);
            assert_eq!(index.colors_of_unitig(u), source.get(u).1);
        }
    }

    #[test]
    fn in_flight_is_bounded_by_thread_count() {
        let num_colors = 10;
        let source = random_stream(2000, num_colors, 77);
        for n_threads in [1, 2, 3] {
            let (_, stats, _) = build_gaps(&source, config(num_colors, n_threads, Some(44))).unwrap();
            assert!(stats.num_buffers_dispatched > 100);
            assert!(stats.max_in_flight >= 1);
            assert!(stats.max_in_flight <= n_threads, "{} in flight with {} threads", stats.max_in_flight, n_threads);
        }
    }

    #[test]
    fn builds_only_once() {
        let source = VecColoredUnitigs::new(2, vec![(b"AC".to_vec(), vec![0])]);
        let mut builder = ColorSetIndexBuilder::<GapColorSetsBuilder>::new(config(2, 1, None)).unwrap();
        builder.build(&source, &mut Vec::new()).unwrap();
        assert!(matches!(builder.build(&source, &mut Vec::new()), Err(BuildError::AlreadyBuilt)));
    }

    #[test]
    fn empty_stream() {
        let source = VecColoredUnitigs::new(2, vec![]);
        assert!(matches!(build_gaps(&source, config(2, 2, None)), Err(BuildError::EmptyStream)));
    }

    #[test]
    fn invalid_color_sets() {
        let out_of_range = VecColoredUnitigs::new(2, vec![(b"AC".to_vec(), vec![0]), (b"GT".to_vec(), vec![2])]);
        assert!(matches!(build_gaps(&out_of_range, config(2, 2, None)), Err(BuildError::InvalidColorSet { unitig: 1, .. })));

        let unsorted = VecColoredUnitigs::new(3, vec![(b"AC".to_vec(), vec![2, 1])]);
        assert!(matches!(build_gaps(&unsorted, config(3, 2, None)), Err(BuildError::InvalidColorSet { unitig: 0, .. })));
    }

    #[test]
    fn color_count_must_match_source() {
        let source = VecColoredUnitigs::new(5, vec![(b"AC".to_vec(), vec![0])]);
        assert!(matches!(build_gaps(&source, config(4, 1, None)), Err(BuildError::Config(_))));
    }

    #[test]
    fn source_errors_are_returned() {
        struct Failing;
        impl ColoredUnitigSource for Failing {
            fn num_colors(&self) -> u32 { 4 }
            fn for_each_unitig<F>(&self, mut f: F) -> Result<(), BuildError>
            where F: FnMut(ColoredUnitig<'_>) -> Result<(), BuildError> {
                for i in 0..100_u32 {
                    f(ColoredUnitig { seq: b"ACGT", colors: &[i % 4], same_color_set: false })?;
                }
                Err(BuildError::Source("graph file truncated".to_string()))
            }
        }
        let mut builder = ColorSetIndexBuilder::<GapColorSetsBuilder>::new(config(4, 3, Some(20))).unwrap();
        assert!(matches!(builder.build(&Failing, &mut Vec::new()), Err(BuildError::Source(_))));
    }

    // Panics when asked to encode a set containing color 13.
    struct PanickyEncoder(GapColorSetsBuilder);

    impl ColorSetEncoder for PanickyEncoder {
        type Store = GapColorSets;
        fn new(num_colors: u32) -> Self { PanickyEncoder(GapColorSetsBuilder::new(num_colors)) }
        fn reserve_num_bits(&mut self, num_bits: usize) { self.0.reserve_num_bits(num_bits) }
        fn encode(&mut self, colors: &[Color]) {
            if colors.contains(&13) {
                panic!("cannot encode color 13");
            }
            self.0.encode(colors)
        }
        fn append(&mut self, other: &Self) { self.0.append(&other.0) }
        fn clear(&mut self) { self.0.clear() }
        fn num_color_sets(&self) -> usize { self.0.num_color_sets() }
        fn num_bits(&self) -> usize { self.0.num_bits() }
        fn build(self) -> GapColorSets { self.0.build() }
    }

    #[test]
    fn worker_panic_fails_the_build_without_hanging() {
        let unitigs: Vec<(Vec<u8>, Vec<Color>)> = (0..400_u32).map(|i| (b"ACGT".to_vec(), vec![i % 20])).collect();
        let source = VecColoredUnitigs::new(20, unitigs);
        let mut builder = ColorSetIndexBuilder::<PanickyEncoder>::new(config(20, 4, Some(84))).unwrap();
        let result = builder.build(&source, &mut Vec::new());
        assert!(matches!(result, Err(BuildError::WorkerPanicked { .. })), "{:?}", result.err());
    }

    #[test]
    fn observer_sees_the_stage() {
        let observer = Arc::new(RecordingObserver::default());
        let source = VecColoredUnitigs::new(2, vec![(b"AC".to_vec(), vec![0])]);
        let mut builder = ColorSetIndexBuilder::<GapColorSetsBuilder>::new(config(2, 1, None)).unwrap().with_observer(observer.clone());
        builder.build(&source, &mut Vec::new()).unwrap();
        assert_eq!(*observer.events.lock().unwrap(), vec!["start Building color sets".to_string(), "finish Building color sets".to_string()]);
    }

    #[test]
    fn error_priority() {
        let ok: std::thread::Result<Result<(), BuildError>> = Ok(Ok(()));
        let aborted = || -> std::thread::Result<Result<(), BuildError>> { Ok(Err(BuildError::Aborted)) };

        let r = combine_errors(Err(BuildError::WorkerDisconnected { slot: 1 }), vec![ok, aborted(), Ok(Err(BuildError::Invariant("x".to_string())))]);
        assert!(matches!(r, Err(BuildError::Invariant(_))));

        let r = combine_errors(Err(BuildError::EmptyStream), vec![aborted(), Err(Box::new("boom") as Box<dyn std::any::Any + Send>)]);
        assert!(matches!(r, Err(BuildError::WorkerPanicked { slot: 1 })));

        let r = combine_errors(Ok(()), vec![aborted()]);
        assert!(matches!(r, Err(BuildError::Aborted)));
    }
}
