//! Ordered access to the global encoder.
//!
//! Every dispatched buffer gets a ticket from a monotonic counter. A worker that has
//! finished encoding its buffer waits here until its ticket is the next one to append,
//! appends its partial encoder to the global one, and passes the turn on. Waiting is on
//! a condition variable, not a spin loop.

use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::encoding::ColorSetEncoder;
use crate::error::BuildError;

struct State<E> {
    next_ticket: u64,
    aborted: bool,
    global: E,
}

pub(crate) struct Turnstile<E: ColorSetEncoder> {
    state: Mutex<State<E>>,
    turn_changed: Condvar,
}

impl<E: ColorSetEncoder> Turnstile<E> {
    pub fn new(global: E) -> Self {
        Self {
            state: Mutex::new(State { next_ticket: 0, aborted: false, global }),
            turn_changed: Condvar::new(),
        }
    }

    // A poisoned lock only means that some thread panicked while holding it. The panic
    // itself is reported through the join handle, so the state is still usable for abort.
    fn lock(&self) -> MutexGuard<'_, State<E>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Blocks until `ticket` is the next in line, then appends `local` to the global encoder.
    /// Returns [BuildError::Aborted] if the build was aborted while waiting.
    pub fn append_in_turn(&self, ticket: u64, local: &E) -> Result<(), BuildError> {
        let mut state = self.lock();
        while state.next_ticket != ticket && !state.aborted {
            state = self.turn_changed.wait(state).unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if state.aborted {
            return Err(BuildError::Aborted);
        }

        state.global.append(local);
        state.next_ticket += 1;
        log::debug!("Appended buffer {} ({} color sets in total)", ticket, state.global.num_color_sets());
        drop(state);
        self.turn_changed.notify_all();
        Ok(())
    }

    /// Wakes up all waiters and makes every later [append_in_turn](Turnstile::append_in_turn) fail.
    pub fn abort(&self) {
        self.lock().aborted = true;
        self.turn_changed.notify_all();
    }

    /// Number of tickets appended so far.
    pub fn num_appended(&self) -> u64 {
        self.lock().next_ticket
    }

    /// Takes out the global encoder once all workers are done.
    pub fn into_inner(self) -> Result<E, BuildError> {
        let state = self.state.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.aborted {
            return Err(BuildError::Aborted);
        }
        Ok(state.global)
    }
}

/// Aborts the turnstile if dropped during a panic, so that a worker dying mid-task
/// cannot leave the other workers waiting for its ticket forever.
pub(crate) struct AbortOnPanic<'a, E: ColorSetEncoder> {
    pub turnstile: &'a Turnstile<E>,
}

impl<E: ColorSetEncoder> Drop for AbortOnPanic<'_, E> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.turnstile.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{ColorSetStore, GapColorSetsBuilder};

    fn local_with(colors: &[u32]) -> GapColorSetsBuilder {
        let mut b = GapColorSetsBuilder::new(100);
        b.encode(colors);
        b
    }

    #[test]
    fn appends_in_ticket_order_regardless_of_arrival() {
        let turnstile = Turnstile::new(GapColorSetsBuilder::new(100));
        let n = 16_u64;

        std::thread::scope(|scope| {
            // Spawn in reverse so that high tickets typically arrive first
            for ticket in (0..n).rev() {
                let turnstile = &turnstile;
                scope.spawn(move || {
                    let local = local_with(&[ticket as u32]);
                    turnstile.append_in_turn(ticket, &local).unwrap();
                });
            }
        });

        assert_eq!(turnstile.num_appended(), n);
        let store = turnstile.into_inner().unwrap().build();
        for id in 0..n as usize {
            assert_eq!(store.color_set(id), vec![id as u32]);
        }
    }

    #[test]
    fn abort_wakes_waiters() {
        let turnstile = Turnstile::new(GapColorSetsBuilder::new(100));
        std::thread::scope(|scope| {
            let waiter = scope.spawn(|| turnstile.append_in_turn(5, &local_with(&[1])));
            std::thread::sleep(std::time::Duration::from_millis(20));
            turnstile.abort();
            assert!(matches!(waiter.join().unwrap(), Err(BuildError::Aborted)));
        });
        assert!(matches!(turnstile.into_inner(), Err(BuildError::Aborted)));
    }

    #[test]
    fn panic_guard_aborts() {
        let turnstile = Turnstile::new(GapColorSetsBuilder::new(100));
        std::thread::scope(|scope| {
            let h = scope.spawn(|| {
                let _guard = AbortOnPanic { turnstile: &turnstile };
                panic!("worker died");
            });
            assert!(h.join().is_err());
        });
        assert!(matches!(turnstile.append_in_turn(0, &local_with(&[1])), Err(BuildError::Aborted)));
    }
}
