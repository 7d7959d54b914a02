//! Stage timing hooks for the builders.

use std::time::Duration;

/// Receives the start and end of every build stage. Injected into the builders so that
/// timing and progress reporting stay out of the build logic.
pub trait BuildObserver: Send + Sync {
    fn stage_started(&self, stage: &str);
    fn stage_finished(&self, stage: &str, elapsed: Duration);
}

/// Logs stage timings at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl BuildObserver for LogObserver {
    fn stage_started(&self, stage: &str) {
        log::info!("{}", stage);
    }

    fn stage_finished(&self, stage: &str, elapsed: Duration) {
        log::info!("{} took {:.2} seconds", stage, elapsed.as_secs_f64());
    }
}

/// Reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BuildObserver for NoopObserver {
    fn stage_started(&self, _stage: &str) {}
    fn stage_finished(&self, _stage: &str, _elapsed: Duration) {}
}

// Runs `f` as a named stage.
pub(crate) fn timed<T>(observer: &dyn BuildObserver, stage: &str, f: impl FnOnce() -> T) -> T {
    observer.stage_started(stage);
    let start = std::time::Instant::now();
    let result = f();
    observer.stage_finished(stage, start.elapsed());
    result
}
