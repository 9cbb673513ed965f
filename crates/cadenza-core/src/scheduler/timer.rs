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

//! Interval timers and the selector keys used to unschedule them.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::target::TargetId;

/// Identifies a scheduled timer callback for targeted unscheduling.
///
/// Dispatch is always a typed closure captured at registration time; the key
/// exists purely so a caller can later remove one specific timer from a
/// target. A key is either a symbolic name chosen by the caller or a unique
/// token minted by [`SelectorKey::unique`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SelectorKey {
    /// A caller-chosen symbolic name, e.g. `"blink"`.
    Named(Cow<'static, str>),
    /// A process-unique token standing in for callback identity.
    Token(u64),
}

impl SelectorKey {
    /// Mints a key that is distinct from every other key in the process.
    ///
    /// Use this when the callback has no natural name and the caller keeps
    /// the returned key around for a later `unschedule`.
    pub fn unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        SelectorKey::Token(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl From<&'static str> for SelectorKey {
    fn from(name: &'static str) -> Self {
        SelectorKey::Named(Cow::Borrowed(name))
    }
}

impl From<String> for SelectorKey {
    fn from(name: String) -> Self {
        SelectorKey::Named(Cow::Owned(name))
    }
}

/// A single interval timer belonging to one target.
///
/// Accumulates elapsed time on every scheduler tick and fires its callback
/// while the accumulated time covers the interval, keeping the remainder.
/// An interval of zero fires exactly once per tick regardless of `dt`.
pub(crate) struct Timer {
    target: TargetId,
    selector: SelectorKey,
    interval: f32,
    elapsed: Cell<f32>,
    alive: Cell<bool>,
    callback: RefCell<Box<dyn FnMut(f32)>>,
}

impl Timer {
    pub(crate) fn new(
        target: TargetId,
        selector: SelectorKey,
        interval: f32,
        callback: Box<dyn FnMut(f32)>,
    ) -> Self {
        Self {
            target,
            selector,
            interval,
            elapsed: Cell::new(0.0),
            alive: Cell::new(true),
            callback: RefCell::new(callback),
        }
    }

    pub(crate) fn selector(&self) -> &SelectorKey {
        &self.selector
    }

    #[allow(dead_code)] // exercised by unit tests below
    pub(crate) fn interval(&self) -> f32 {
        self.interval
    }

    #[allow(dead_code)] // exercised by unit tests below
    pub(crate) fn elapsed(&self) -> f32 {
        self.elapsed.get()
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.get()
    }

    /// Marks the timer dead. A dead timer never fires again, even if a tick
    /// snapshot taken before the removal still holds a reference to it.
    pub(crate) fn retire(&self) {
        self.alive.set(false);
    }

    /// Advances the timer by `dt` seconds, firing as many times as the
    /// accumulated time covers the interval.
    ///
    /// Periodic timers receive the interval as the callback argument (the
    /// span covered by that firing); zero-interval timers receive `dt`.
    pub(crate) fn update(&self, dt: f32) {
        if !self.alive.get() {
            return;
        }
        if self.interval <= 0.0 {
            // Fires every tick, exactly once per call.
            self.fire(dt);
            return;
        }

        let mut elapsed = self.elapsed.get() + dt;
        while elapsed >= self.interval && self.alive.get() {
            elapsed -= self.interval;
            self.elapsed.set(elapsed);
            self.fire(self.interval);
        }
        self.elapsed.set(elapsed);
    }

    fn fire(&self, dt: f32) {
        let Ok(mut callback) = self.callback.try_borrow_mut() else {
            log::trace!(
                "Timer {:?} on target {:?} is already firing; skipping re-entrant fire",
                self.selector,
                self.target
            );
            return;
        };

        if catch_unwind(AssertUnwindSafe(|| callback(dt))).is_err() {
            log::error!(
                "Timer {:?} on target {:?} panicked; continuing with the rest of the tick",
                self.selector,
                self.target
            );
        }
    }
}
