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

//! Error types for scheduler registration.

use thiserror::Error;

use crate::target::TargetId;

/// A scheduler registration was rejected.
///
/// These are programmer-contract violations meant to fail fast; none of them
/// occur in normal operation. Lookup misses (unscheduling, pausing or
/// resuming an unregistered target) are deliberately *not* errors — they are
/// no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ScheduleError {
    /// A timer interval must be finite and non-negative.
    #[error("timer interval must be finite and >= 0, got {0}")]
    InvalidInterval(f32),

    /// Scheduling another timer onto a target must use the same initial
    /// pause state as the target's existing timers.
    #[error(
        "target {target:?} already has timers with paused={existing}; \
         scheduling with a different pause state is not allowed"
    )]
    PauseMismatch {
        /// The target whose timer set already exists.
        target: TargetId,
        /// The pause state the existing timer set carries.
        existing: bool,
    },

    /// A target can hold only one update callback; unschedule it first.
    #[error("target {0:?} already has an update callback scheduled; unschedule it first")]
    UpdateAlreadyScheduled(TargetId),
}
