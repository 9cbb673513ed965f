// Copyright 2026 the Cadenza Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The per-frame task scheduler.
//!
//! Two kinds of recurring work are managed per owner [`TargetId`]:
//! priority-ordered update callbacks invoked every frame, and interval
//! timers invoked on custom periods. Both support pause/resume and bulk
//! cancellation, and both may be mutated from inside callbacks while the
//! scheduler is ticking: the tick walks copy-on-write snapshots, removals
//! take effect immediately through tombstone flags, and additions wait for
//! the next tick.
//!
//! # Ownership
//!
//! There is no global instance. The application's top-level context
//! constructs a [`Scheduler`] (typically behind an `Rc`) and injects it into
//! the subsystems that register callbacks. All methods take `&self`; the
//! scheduler is single-threaded by design and is neither `Send` nor `Sync`.

mod entry;
mod timer;

pub use timer::SelectorKey;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use entry::{PriorityBuckets, TimerSet, UpdateEntry};
use timer::Timer;

use crate::error::ScheduleError;
use crate::target::TargetId;

#[derive(Default)]
struct SchedState {
    /// Timer registrations, one set per target ("selectors with interval").
    timer_sets: HashMap<TargetId, Rc<TimerSet>>,
    /// Fast pause/unschedule lookup for update entries.
    update_index: HashMap<TargetId, Rc<UpdateEntry>>,
    /// The same entries as `update_index`, partitioned and ordered for tick.
    buckets: PriorityBuckets,
}

/// Triggers scheduled callbacks once per frame. See the [module docs](self).
pub struct Scheduler {
    state: RefCell<SchedState>,
    time_scale: Cell<f32>,
}

impl Scheduler {
    /// Creates an empty scheduler with a time scale of `1.0`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RefCell::new(SchedState::default()),
            time_scale: Cell::new(1.0),
        }
    }

    /// Schedules `callback` to fire every `interval` seconds for `target`.
    ///
    /// An interval of `0.0` fires the callback exactly once per tick. The
    /// target's timer set is created lazily on its first timer; scheduling
    /// further timers onto the same target requires the same `paused` flag
    /// (mismatch fails with [`ScheduleError::PauseMismatch`] rather than
    /// silently adopting either state).
    ///
    /// # Errors
    ///
    /// [`ScheduleError::InvalidInterval`] if `interval` is negative or not
    /// finite, [`ScheduleError::PauseMismatch`] as described above.
    pub fn schedule<F>(
        &self,
        selector: impl Into<SelectorKey>,
        target: TargetId,
        interval: f32,
        paused: bool,
        callback: F,
    ) -> Result<(), ScheduleError>
    where
        F: FnMut(f32) + 'static,
    {
        if !interval.is_finite() || interval < 0.0 {
            return Err(ScheduleError::InvalidInterval(interval));
        }
        let selector = selector.into();

        let mut state = self.state.borrow_mut();
        let set = match state.timer_sets.get(&target) {
            Some(set) => {
                if set.is_paused() != paused {
                    return Err(ScheduleError::PauseMismatch {
                        target,
                        existing: set.is_paused(),
                    });
                }
                Rc::clone(set)
            }
            None => {
                let set = Rc::new(TimerSet::new(paused));
                state.timer_sets.insert(target, Rc::clone(&set));
                set
            }
        };

        log::debug!(
            "Scheduler: timer {:?} on target {:?} every {:.3}s (paused={})",
            selector,
            target,
            interval,
            paused
        );
        set.push(Rc::new(Timer::new(target, selector, interval, Box::new(callback))));
        Ok(())
    }

    /// Schedules `callback` to fire every frame for `target`.
    ///
    /// Priority determines invocation order within a tick: all negative
    /// priorities ascending, then zero in registration order, then positive
    /// ascending. Equal priorities keep registration order.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::UpdateAlreadyScheduled`] if the target already has
    /// an update callback; the existing registration is left untouched.
    pub fn schedule_update<F>(
        &self,
        target: TargetId,
        priority: i32,
        paused: bool,
        callback: F,
    ) -> Result<(), ScheduleError>
    where
        F: FnMut(f32) + 'static,
    {
        let mut state = self.state.borrow_mut();
        if state.update_index.contains_key(&target) {
            return Err(ScheduleError::UpdateAlreadyScheduled(target));
        }

        log::debug!(
            "Scheduler: update callback on target {:?} (priority={}, paused={})",
            target,
            priority,
            paused
        );
        let entry = Rc::new(UpdateEntry::new(target, priority, paused, Box::new(callback)));
        state.buckets.insert(Rc::clone(&entry));
        state.update_index.insert(target, entry);
        Ok(())
    }

    /// Removes the first timer on `target` whose key matches `selector`.
    ///
    /// No-op if the target has no timers or none match. The target's timer
    /// set is dropped entirely once its last timer is removed.
    pub fn unschedule(&self, selector: impl Into<SelectorKey>, target: TargetId) {
        let selector = selector.into();
        let mut state = self.state.borrow_mut();
        let Some(set) = state.timer_sets.get(&target) else {
            return;
        };
        if set.remove_first(&selector) && set.is_empty() {
            state.timer_sets.remove(&target);
        }
    }

    /// Removes `target`'s update callback. No-op if it has none.
    pub fn unschedule_update(&self, target: TargetId) {
        let mut state = self.state.borrow_mut();
        if let Some(entry) = state.update_index.remove(&target) {
            entry.retire();
            state.buckets.remove(&entry);
        }
    }

    /// Removes every registration for `target`: all of its timers and its
    /// update callback. No-op for an unknown target.
    pub fn unschedule_all_for(&self, target: TargetId) {
        {
            let mut state = self.state.borrow_mut();
            if let Some(set) = state.timer_sets.remove(&target) {
                set.retire_all();
            }
        }
        self.unschedule_update(target);
    }

    /// Removes every registration for every target.
    ///
    /// Safe to call mid-tick: the registered targets are snapshotted first,
    /// then unscheduled one by one.
    pub fn unschedule_all(&self) {
        let targets: Vec<TargetId> = {
            let state = self.state.borrow();
            state
                .timer_sets
                .keys()
                .chain(state.update_index.keys())
                .copied()
                .collect()
        };
        for target in targets {
            self.unschedule_all_for(target);
        }
    }

    /// Pauses `target`: neither its timers nor its update callback fire, and
    /// its timers stop accumulating elapsed time. No-op for an unknown target.
    pub fn pause(&self, target: TargetId) {
        self.set_paused(target, true);
    }

    /// Resumes `target` after a [`pause`](Self::pause). No-op for an unknown
    /// target.
    pub fn resume(&self, target: TargetId) {
        self.set_paused(target, false);
    }

    fn set_paused(&self, target: TargetId, paused: bool) {
        let state = self.state.borrow();
        if let Some(set) = state.timer_sets.get(&target) {
            set.set_paused(paused);
        }
        if let Some(entry) = state.update_index.get(&target) {
            entry.set_paused(paused);
        }
    }

    /// Sets the global multiplier applied to the `dt` of every tick.
    ///
    /// Values below `1.0` produce slow motion, above `1.0` fast forward. It
    /// affects every scheduled callback and timer.
    pub fn set_time_scale(&self, scale: f32) {
        self.time_scale.set(scale);
    }

    /// Returns the global time-scale multiplier.
    #[must_use]
    pub fn time_scale(&self) -> f32 {
        self.time_scale.get()
    }

    /// Returns `true` if `target` has any timer or update registration.
    #[must_use]
    pub fn is_scheduled(&self, target: TargetId) -> bool {
        let state = self.state.borrow();
        state.timer_sets.contains_key(&target) || state.update_index.contains_key(&target)
    }

    /// Returns `true` if `target` is registered and currently paused.
    #[must_use]
    pub fn is_paused(&self, target: TargetId) -> bool {
        let state = self.state.borrow();
        if let Some(set) = state.timer_sets.get(&target) {
            return set.is_paused();
        }
        if let Some(entry) = state.update_index.get(&target) {
            return entry.is_paused();
        }
        false
    }

    /// Returns `true` if nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let state = self.state.borrow();
        state.timer_sets.is_empty() && state.buckets.len() == 0
    }

    /// Advances the scheduler by `dt` seconds (before time scaling).
    ///
    /// Invocation order: negative-priority updates ascending, zero-priority
    /// in registration order, positive ascending, then every non-paused
    /// timer set. Paused entries and sets are skipped entirely, not ticked
    /// with a zero `dt`. Callbacks may freely schedule and unschedule during
    /// the walk; a panicking callback is reported and does not abort the
    /// remainder of the tick.
    pub fn tick(&self, dt: f32) {
        let dt = dt * self.time_scale.get();

        let (entries, sets) = {
            let state = self.state.borrow();
            (
                state.buckets.snapshot(),
                state.timer_sets.values().cloned().collect::<Vec<_>>(),
            )
        };

        for entry in &entries {
            if entry.is_alive() && !entry.is_paused() {
                entry.fire(dt);
            }
        }

        for set in &sets {
            if set.is_paused() {
                continue;
            }
            for timer in set.snapshot() {
                if timer.is_alive() {
                    timer.update(dt);
                }
            }
        }
    }

    /// Ends the scheduler's lifecycle: drops every registration and resets
    /// the time scale to `1.0`.
    pub fn shutdown(&self) {
        log::info!("Scheduler: shutting down, dropping all registrations");
        self.unschedule_all();
        self.time_scale.set(1.0);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::HashSet;

    fn counter() -> (Rc<Cell<u32>>, impl FnMut(f32)) {
        let count = Rc::new(Cell::new(0));
        let sink = Rc::clone(&count);
        (count, move |_| sink.set(sink.get() + 1))
    }

    #[test]
    fn updates_tick_in_priority_order_with_stable_ties() {
        let scheduler = Scheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let add = |priority: i32, label: &'static str| {
            let order = Rc::clone(&order);
            scheduler
                .schedule_update(TargetId::fresh(), priority, false, move |_| {
                    order.borrow_mut().push(label)
                })
                .unwrap();
        };
        add(5, "p5");
        add(-1, "n1");
        add(0, "z-first");
        add(2, "p2-a");
        add(-3, "n3");
        add(0, "z-second");
        add(2, "p2-b");

        scheduler.tick(0.016);
        assert_eq!(
            *order.borrow(),
            vec!["n3", "n1", "z-first", "z-second", "p2-a", "p2-b", "p5"]
        );
    }

    #[test]
    fn paused_target_is_skipped_and_its_timers_freeze() {
        let scheduler = Scheduler::new();
        let target = TargetId::fresh();
        let (fired, on_fire) = counter();
        let (updated, on_update) = counter();

        scheduler.schedule("beat", target, 1.0, false, on_fire).unwrap();
        scheduler.schedule_update(target, 0, false, on_update).unwrap();

        scheduler.pause(target);
        assert!(scheduler.is_paused(target));
        scheduler.tick(0.6);
        scheduler.tick(0.6);
        assert_eq!(fired.get(), 0);
        assert_eq!(updated.get(), 0);

        scheduler.resume(target);
        assert!(!scheduler.is_paused(target));
        // Paused ticks must not have advanced the timer: only 0.6s elapses here.
        scheduler.tick(0.6);
        assert_eq!(fired.get(), 0);
        assert_eq!(updated.get(), 1);

        scheduler.tick(0.6);
        assert_eq!(fired.get(), 1);
        assert_eq!(updated.get(), 2);
    }

    #[test]
    fn one_second_timer_fires_once_after_three_ticks_of_point_four() {
        let scheduler = Scheduler::new();
        let target = TargetId::fresh();
        let (fired, on_fire) = counter();
        scheduler.schedule("beat", target, 1.0, false, on_fire).unwrap();

        scheduler.tick(0.4);
        scheduler.tick(0.4);
        scheduler.tick(0.4);
        assert_eq!(fired.get(), 1);

        // The 0.2s remainder carries over: two more ticks reach 1.0s again.
        scheduler.tick(0.4);
        scheduler.tick(0.4);
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn zero_interval_timer_fires_exactly_once_per_tick() {
        let scheduler = Scheduler::new();
        let target = TargetId::fresh();
        let (fired, on_fire) = counter();
        scheduler.schedule("every-frame", target, 0.0, false, on_fire).unwrap();

        scheduler.tick(0.00001);
        scheduler.tick(500.0);
        scheduler.tick(0.016);
        assert_eq!(fired.get(), 3);
    }

    #[test]
    fn large_dt_fires_periodic_timer_multiple_times() {
        let scheduler = Scheduler::new();
        let (fired, on_fire) = counter();
        scheduler
            .schedule("beat", TargetId::fresh(), 0.25, false, on_fire)
            .unwrap();

        scheduler.tick(1.0);
        assert_eq!(fired.get(), 4);
    }

    #[test]
    fn rescheduling_update_fails_and_keeps_original() {
        let scheduler = Scheduler::new();
        let target = TargetId::fresh();
        let (original, on_update) = counter();
        scheduler.schedule_update(target, 0, false, on_update).unwrap();

        let result = scheduler.schedule_update(target, 3, false, |_| {
            panic!("replacement must never be registered")
        });
        assert_eq!(result, Err(ScheduleError::UpdateAlreadyScheduled(target)));

        scheduler.tick(0.016);
        assert_eq!(original.get(), 1);
    }

    #[test]
    fn pause_state_mismatch_is_rejected() {
        let scheduler = Scheduler::new();
        let target = TargetId::fresh();
        let (fired, on_fire) = counter();
        scheduler.schedule("a", target, 0.0, true, on_fire).unwrap();

        let result = scheduler.schedule("b", target, 0.0, false, |_| {});
        assert_eq!(
            result,
            Err(ScheduleError::PauseMismatch {
                target,
                existing: true
            })
        );

        // The original registration is intact and still paused.
        scheduler.tick(0.016);
        assert_eq!(fired.get(), 0);
        scheduler.resume(target);
        scheduler.tick(0.016);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn global_unschedule_silences_everything() {
        let scheduler = Scheduler::new();
        let (count, _) = counter();
        for priority in [-2, 0, 7] {
            let sink = Rc::clone(&count);
            let target = TargetId::fresh();
            scheduler
                .schedule_update(target, priority, false, move |_| sink.set(sink.get() + 1))
                .unwrap();
            let sink = Rc::clone(&count);
            scheduler
                .schedule("beat", target, 0.0, false, move |_| sink.set(sink.get() + 1))
                .unwrap();
        }

        scheduler.unschedule_all();
        assert!(scheduler.is_empty());
        scheduler.tick(100.0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn mid_tick_unschedule_skips_pending_target() {
        let scheduler = Rc::new(Scheduler::new());
        let victim = TargetId::fresh();
        let (fired, on_update) = counter();
        scheduler.schedule_update(victim, 5, false, on_update).unwrap();

        // Priority -1 runs first and removes the not-yet-visited entry.
        let weak = Rc::downgrade(&scheduler);
        scheduler
            .schedule_update(TargetId::fresh(), -1, false, move |_| {
                if let Some(scheduler) = weak.upgrade() {
                    scheduler.unschedule_update(victim);
                }
            })
            .unwrap();

        scheduler.tick(0.016);
        assert_eq!(fired.get(), 0);
        assert!(!scheduler.is_scheduled(victim));
    }

    #[test]
    fn registrations_made_during_tick_wait_for_next_tick() {
        let scheduler = Rc::new(Scheduler::new());
        let (fired, _) = counter();

        let weak = Rc::downgrade(&scheduler);
        let sink = Rc::clone(&fired);
        let mut installed = false;
        scheduler
            .schedule_update(TargetId::fresh(), 0, false, move |_| {
                if installed {
                    return;
                }
                installed = true;
                let scheduler = weak.upgrade().unwrap();
                let sink = Rc::clone(&sink);
                scheduler
                    .schedule("late", TargetId::fresh(), 0.0, false, move |_| {
                        sink.set(sink.get() + 1)
                    })
                    .unwrap();
            })
            .unwrap();

        scheduler.tick(0.016);
        assert_eq!(fired.get(), 0);
        scheduler.tick(0.016);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn time_scale_multiplies_delivered_dt() {
        let scheduler = Scheduler::new();
        scheduler.set_time_scale(2.0);
        assert_relative_eq!(scheduler.time_scale(), 2.0);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        scheduler
            .schedule_update(TargetId::fresh(), 0, false, move |dt| {
                sink.borrow_mut().push(dt)
            })
            .unwrap();
        let sink = Rc::clone(&seen);
        scheduler
            .schedule("frame", TargetId::fresh(), 0.0, false, move |dt| {
                sink.borrow_mut().push(dt)
            })
            .unwrap();

        scheduler.tick(0.1);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        for dt in seen.iter() {
            assert_relative_eq!(*dt, 0.2, epsilon = 1e-6);
        }
    }

    #[test]
    fn time_scale_reaches_periodic_timers() {
        let scheduler = Scheduler::new();
        scheduler.set_time_scale(2.0);
        let (fired, on_fire) = counter();
        scheduler
            .schedule("beat", TargetId::fresh(), 0.15, false, on_fire)
            .unwrap();

        // 0.1s of wall time is 0.2s of scaled time.
        scheduler.tick(0.1);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn unschedule_removes_first_match_and_empty_set() {
        let scheduler = Scheduler::new();
        let target = TargetId::fresh();
        let (a_fired, on_a) = counter();
        let (b_fired, on_b) = counter();
        scheduler.schedule("a", target, 0.0, false, on_a).unwrap();
        scheduler.schedule("b", target, 0.0, false, on_b).unwrap();

        scheduler.unschedule("a", target);
        scheduler.tick(0.016);
        assert_eq!(a_fired.get(), 0);
        assert_eq!(b_fired.get(), 1);
        assert!(scheduler.is_scheduled(target));

        scheduler.unschedule("b", target);
        assert!(!scheduler.is_scheduled(target));
    }

    #[test]
    fn timer_can_unschedule_itself_mid_burst() {
        let scheduler = Rc::new(Scheduler::new());
        let target = TargetId::fresh();
        let (fired, _) = counter();

        let weak = Rc::downgrade(&scheduler);
        let sink = Rc::clone(&fired);
        scheduler
            .schedule("once", target, 0.25, false, move |_| {
                sink.set(sink.get() + 1);
                if let Some(scheduler) = weak.upgrade() {
                    scheduler.unschedule("once", target);
                }
            })
            .unwrap();

        // 1.0s covers four firings, but the callback retires itself on the first.
        scheduler.tick(1.0);
        assert_eq!(fired.get(), 1);
        assert!(!scheduler.is_scheduled(target));
    }

    #[test]
    fn panicking_callback_does_not_abort_the_tick() {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));

        let scheduler = Scheduler::new();
        scheduler
            .schedule_update(TargetId::fresh(), -1, false, |_| panic!("boom"))
            .unwrap();
        let (fired, on_update) = counter();
        scheduler
            .schedule_update(TargetId::fresh(), 0, false, on_update)
            .unwrap();

        scheduler.tick(0.016);
        scheduler.tick(0.016);
        std::panic::set_hook(previous);

        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn lookup_misses_are_no_ops() {
        let scheduler = Scheduler::new();
        let stranger = TargetId::fresh();
        scheduler.pause(stranger);
        scheduler.resume(stranger);
        scheduler.unschedule("nothing", stranger);
        scheduler.unschedule_update(stranger);
        scheduler.unschedule_all_for(stranger);
        assert!(!scheduler.is_scheduled(stranger));
        assert!(!scheduler.is_paused(stranger));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn invalid_intervals_are_rejected() {
        let scheduler = Scheduler::new();
        let target = TargetId::fresh();
        for bad in [-0.5, f32::NAN, f32::INFINITY] {
            let result = scheduler.schedule("bad", target, bad, false, |_| {});
            assert!(matches!(result, Err(ScheduleError::InvalidInterval(_))));
        }
        assert!(scheduler.is_empty());
    }

    #[test]
    fn unschedule_all_for_clears_timers_and_update() {
        let scheduler = Scheduler::new();
        let target = TargetId::fresh();
        let (count, _) = counter();
        let sink = Rc::clone(&count);
        scheduler
            .schedule("beat", target, 0.0, false, move |_| sink.set(sink.get() + 1))
            .unwrap();
        let sink = Rc::clone(&count);
        scheduler
            .schedule_update(target, 0, false, move |_| sink.set(sink.get() + 1))
            .unwrap();

        scheduler.unschedule_all_for(target);
        scheduler.tick(1.0);
        assert_eq!(count.get(), 0);
        assert!(!scheduler.is_scheduled(target));
    }

    #[test]
    fn shutdown_purges_and_resets_time_scale() {
        let scheduler = Scheduler::new();
        scheduler.set_time_scale(0.5);
        scheduler
            .schedule("beat", TargetId::fresh(), 1.0, false, |_| {})
            .unwrap();

        scheduler.shutdown();
        assert!(scheduler.is_empty());
        assert_relative_eq!(scheduler.time_scale(), 1.0);
    }

    /// Replays a deterministic op sequence against a reference set: after
    /// every step, the set of targets with an active update entry must match
    /// plain add/remove bookkeeping.
    #[test]
    fn update_registrations_replay_like_a_set() {
        let scheduler = Scheduler::new();
        let targets: Vec<TargetId> = (0..8).map(|_| TargetId::fresh()).collect();
        let mut reference: HashSet<TargetId> = HashSet::new();

        let mut rng: u64 = 0x2545_f491_4f6c_dd1d;
        for _ in 0..200 {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let target = targets[(rng >> 33) as usize % targets.len()];
            let schedule = (rng >> 20) & 1 == 0;

            if schedule {
                let result = scheduler.schedule_update(target, 0, false, |_| {});
                if reference.insert(target) {
                    assert_eq!(result, Ok(()));
                } else {
                    assert_eq!(result, Err(ScheduleError::UpdateAlreadyScheduled(target)));
                }
            } else {
                scheduler.unschedule_update(target);
                reference.remove(&target);
            }

            for target in &targets {
                assert_eq!(scheduler.is_scheduled(*target), reference.contains(target));
            }
        }
    }
}
