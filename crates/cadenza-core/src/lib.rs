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

//! # Cadenza Core
//!
//! Per-frame task scheduler for interactive real-time applications:
//! priority-ordered update callbacks, interval timers, pause/resume and bulk
//! cancellation per target, all safe to mutate from inside callbacks while
//! the scheduler is ticking. Single-threaded cooperative model: the host's
//! frame loop calls [`Scheduler::tick`] once per frame.

#![warn(missing_docs)]

pub mod action;
pub mod error;
pub mod scheduler;
pub mod target;

pub use action::{run_action, IntervalAction};
pub use error::ScheduleError;
pub use scheduler::{Scheduler, SelectorKey};
pub use target::TargetId;
