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

//! Interval actions: finite-duration per-frame mutators driven by the
//! scheduler.
//!
//! An action owns no scheduling logic. It receives normalized progress
//! `t ∈ [0, 1]` once per frame between `start` and the moment its duration
//! elapses; what it mutates (opacity, position, volume) is entirely the
//! implementor's business. [`run_action`] is the glue that drives a boxed
//! action from a per-frame timer and tears the timer down when the action
//! completes.

use std::rc::Rc;

use crate::error::ScheduleError;
use crate::scheduler::{Scheduler, SelectorKey};
use crate::target::TargetId;

/// A finite-duration per-frame mutator.
pub trait IntervalAction {
    /// Total duration in seconds. A non-positive duration completes on the
    /// first frame.
    fn duration(&self) -> f32;

    /// Called once, on the first frame the action is driven.
    fn start(&mut self) {}

    /// Called every frame with normalized progress `t ∈ [0, 1]`.
    /// The final call always delivers exactly `t = 1.0`.
    fn update(&mut self, t: f32);

    /// Called once after the final [`update`](Self::update).
    fn stop(&mut self) {}

    /// The action running backwards, if it supports reversal.
    fn reversed(&self) -> Option<Box<dyn IntervalAction>> {
        None
    }
}

/// Drives `action` to completion on `target`, one frame at a time.
///
/// The action is advanced by a zero-interval timer: each tick accumulates
/// the scheduled `dt`, normalizes it against the action's duration, clamps
/// at `1.0` and hands it to [`IntervalAction::update`]. Once the duration
/// has elapsed the driver calls [`IntervalAction::stop`] and unschedules
/// itself. Only a weak scheduler handle is captured, so a driven action
/// never keeps the scheduler alive.
///
/// Returns the [`SelectorKey`] of the driving timer, usable with
/// [`Scheduler::unschedule`] to cancel the action early.
///
/// # Errors
///
/// [`ScheduleError::PauseMismatch`] if `target` already has paused timers.
pub fn run_action(
    scheduler: &Rc<Scheduler>,
    target: TargetId,
    mut action: Box<dyn IntervalAction>,
) -> Result<SelectorKey, ScheduleError> {
    let key = SelectorKey::unique();
    let driver_key = key.clone();
    let weak = Rc::downgrade(scheduler);
    let mut elapsed = 0.0_f32;
    let mut started = false;

    scheduler.schedule(key.clone(), target, 0.0, false, move |dt| {
        if !started {
            started = true;
            action.start();
        }
        elapsed += dt;

        let duration = action.duration();
        let t = if duration > 0.0 {
            (elapsed / duration).min(1.0)
        } else {
            1.0
        };
        action.update(t);

        if elapsed >= duration {
            action.stop();
            if let Some(scheduler) = weak.upgrade() {
                scheduler.unschedule(driver_key.clone(), target);
            } else {
                log::warn!(
                    "Action driver on target {:?} outlived its scheduler",
                    target
                );
            }
        }
    })?;

    Ok(key)
}
