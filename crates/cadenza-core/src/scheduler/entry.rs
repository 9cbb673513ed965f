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

//! Bookkeeping structures for the scheduler: per-target update entries,
//! per-target timer lists, and the sign-partitioned priority buckets.

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use super::timer::{SelectorKey, Timer};
use crate::target::TargetId;

/// One target's per-frame update registration.
///
/// At most one of these exists per target at any time. Pause and liveness
/// flags live in `Cell`s so a tick walking a snapshot observes removals and
/// pause changes made by earlier callbacks in the same pass.
pub(crate) struct UpdateEntry {
    target: TargetId,
    priority: i32,
    paused: Cell<bool>,
    alive: Cell<bool>,
    callback: RefCell<Box<dyn FnMut(f32)>>,
}

impl UpdateEntry {
    pub(crate) fn new(
        target: TargetId,
        priority: i32,
        paused: bool,
        callback: Box<dyn FnMut(f32)>,
    ) -> Self {
        Self {
            target,
            priority,
            paused: Cell::new(paused),
            alive: Cell::new(true),
            callback: RefCell::new(callback),
        }
    }

    pub(crate) fn priority(&self) -> i32 {
        self.priority
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.get()
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.set(paused);
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.get()
    }

    pub(crate) fn retire(&self) {
        self.alive.set(false);
    }

    /// Invokes the callback, isolating panics from the rest of the tick.
    pub(crate) fn fire(&self, dt: f32) {
        let Ok(mut callback) = self.callback.try_borrow_mut() else {
            log::trace!(
                "Update callback for target {:?} is already running; skipping re-entrant call",
                self.target
            );
            return;
        };

        if catch_unwind(AssertUnwindSafe(|| callback(dt))).is_err() {
            log::error!(
                "Update callback for target {:?} panicked; continuing with the rest of the tick",
                self.target
            );
        }
    }
}

/// The list of timers belonging to one target, plus the target's pause flag.
///
/// Exists only while it holds at least one timer; the scheduler drops it
/// from its target map when the list empties.
pub(crate) struct TimerSet {
    paused: Cell<bool>,
    timers: RefCell<Vec<Rc<Timer>>>,
}

impl TimerSet {
    pub(crate) fn new(paused: bool) -> Self {
        Self {
            paused: Cell::new(paused),
            timers: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.get()
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.set(paused);
    }

    pub(crate) fn push(&self, timer: Rc<Timer>) {
        self.timers.borrow_mut().push(timer);
    }

    /// Stable copy of the timer list for iteration. Timers added after the
    /// snapshot are not seen; timers removed after it are skipped via their
    /// `alive` flag.
    pub(crate) fn snapshot(&self) -> Vec<Rc<Timer>> {
        self.timers.borrow().clone()
    }

    /// Retires and removes the first timer matching `selector`.
    /// Returns `true` if a timer was removed.
    pub(crate) fn remove_first(&self, selector: &SelectorKey) -> bool {
        let mut timers = self.timers.borrow_mut();
        match timers.iter().position(|t| t.selector() == selector) {
            Some(index) => {
                timers[index].retire();
                timers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Retires every timer and empties the list.
    pub(crate) fn retire_all(&self) {
        let mut timers = self.timers.borrow_mut();
        for timer in timers.iter() {
            timer.retire();
        }
        timers.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.timers.borrow().is_empty()
    }
}

/// Update entries partitioned by priority sign, ticked negative, then zero,
/// then positive. Non-zero buckets stay sorted by priority ascending; ties
/// keep insertion order.
#[derive(Default)]
pub(crate) struct PriorityBuckets {
    negative: Vec<Rc<UpdateEntry>>,
    zero: Vec<Rc<UpdateEntry>>,
    positive: Vec<Rc<UpdateEntry>>,
}

impl PriorityBuckets {
    pub(crate) fn insert(&mut self, entry: Rc<UpdateEntry>) {
        let priority = entry.priority();
        if priority == 0 {
            self.zero.push(entry);
            return;
        }

        let bucket = self.bucket_mut(priority);
        // Insert after every entry with priority <= ours, keeping the sort
        // stable so equal priorities tick in insertion order.
        let index = bucket.partition_point(|e| e.priority() <= priority);
        bucket.insert(index, entry);
    }

    pub(crate) fn remove(&mut self, entry: &Rc<UpdateEntry>) {
        self.bucket_mut(entry.priority())
            .retain(|e| !Rc::ptr_eq(e, entry));
    }

    /// Stable copy of all entries in tick order: negative ascending, zero in
    /// insertion order, positive ascending.
    pub(crate) fn snapshot(&self) -> Vec<Rc<UpdateEntry>> {
        self.negative
            .iter()
            .chain(self.zero.iter())
            .chain(self.positive.iter())
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.negative.len() + self.zero.len() + self.positive.len()
    }

    fn bucket_mut(&mut self, priority: i32) -> &mut Vec<Rc<UpdateEntry>> {
        if priority < 0 {
            &mut self.negative
        } else if priority > 0 {
            &mut self.positive
        } else {
            &mut self.zero
        }
    }
}
