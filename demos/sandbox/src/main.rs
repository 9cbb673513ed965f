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

// Cadenza Sandbox
// Main binary for testing and demos: drives the scheduler from a
// fixed-step frame loop, the way a host engine would.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;
use cadenza_core::{run_action, IntervalAction, Scheduler, TargetId};

const FRAME_DT: f32 = 1.0 / 60.0;
const FRAMES: u32 = 180; // three simulated seconds

/// A placeholder interval action: eases a logical value from 0 to 1 and
/// logs its progress. A real host would mutate opacity, position, volume...
struct Ramp {
    duration: f32,
    value: Rc<Cell<f32>>,
}

impl IntervalAction for Ramp {
    fn duration(&self) -> f32 {
        self.duration
    }

    fn start(&mut self) {
        log::info!("Ramp: started ({}s)", self.duration);
    }

    fn update(&mut self, t: f32) {
        self.value.set(t);
    }

    fn stop(&mut self) {
        log::info!("Ramp: finished at {:.2}", self.value.get());
    }
}

/// Top-level application context. It owns the scheduler and injects it into
/// whatever registers callbacks; there is no global instance.
struct SandboxApp {
    scheduler: Rc<Scheduler>,
}

impl SandboxApp {
    fn new() -> Self {
        Self {
            scheduler: Rc::new(Scheduler::new()),
        }
    }

    fn setup(&self) -> Result<()> {
        let scheduler = &self.scheduler;

        // Per-frame update callbacks at several priorities: input first,
        // simulation, then a late camera follow.
        let input = TargetId::fresh();
        scheduler.schedule_update(input, -10, false, |dt| {
            log::trace!("input: polled ({dt:.4}s)");
        })?;

        let simulation = TargetId::fresh();
        let simulated = Rc::new(Cell::new(0.0_f32));
        let clock = Rc::clone(&simulated);
        scheduler.schedule_update(simulation, 0, false, move |dt| {
            clock.set(clock.get() + dt);
        })?;

        let camera = TargetId::fresh();
        scheduler.schedule_update(camera, 10, false, |_| {
            log::trace!("camera: follow");
        })?;

        // A one-second heartbeat timer on the simulation target.
        let beats = Rc::clone(&simulated);
        scheduler.schedule("heartbeat", simulation, 1.0, false, move |_| {
            log::info!("heartbeat at t={:.2}s", beats.get());
        })?;

        // Drive a two-second ramp action on its own target.
        let ramp_value = Rc::new(Cell::new(0.0));
        run_action(
            scheduler,
            TargetId::fresh(),
            Box::new(Ramp {
                duration: 2.0,
                value: ramp_value,
            }),
        )?;

        // Pause and resume mid-run, from inside a callback.
        let paused_at = Rc::new(Cell::new(false));
        let flag = Rc::clone(&paused_at);
        let weak = Rc::downgrade(scheduler);
        let watch = Rc::clone(&simulated);
        scheduler.schedule("director", TargetId::fresh(), 0.5, false, move |_| {
            let Some(scheduler) = weak.upgrade() else {
                return;
            };
            if watch.get() > 1.0 && !flag.get() {
                flag.set(true);
                log::info!("director: pausing the camera target");
                scheduler.pause(camera);
            }
        })?;

        Ok(())
    }

    fn run(&self) {
        for frame in 0..FRAMES {
            if frame == FRAMES / 2 {
                log::info!("engaging slow motion");
                self.scheduler.set_time_scale(0.5);
            }
            self.scheduler.tick(FRAME_DT);
        }
    }

    fn shutdown(self) {
        self.scheduler.shutdown();
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app = SandboxApp::new();
    app.setup()?;
    app.run();
    app.shutdown();

    log::info!("sandbox done");
    Ok(())
}
