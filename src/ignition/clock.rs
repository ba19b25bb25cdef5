//! Interval-driven frame signals for hosts without their own frame loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

use super::Ignition;
use crate::config::Role;
use crate::{DiError, DiResult};

/// Drives the recurring phases of an [`Ignition`] from three independent
/// `tokio` intervals. The render clock only runs for [`Role::Client`].
///
/// The clocks stop when the `FrameClock` is dropped.
#[derive(Debug)]
pub struct FrameClock {
    tasks: Vec<JoinHandle<()>>,
}

impl FrameClock {
    /// Starts the clocks on the current runtime, each firing every `period`.
    pub fn start(ignition: Arc<Ignition>, period: Duration) -> DiResult<Self> {
        let runtime = Handle::try_current().map_err(|_| DiError::misuse("FrameClock::start needs a tokio runtime"))?;
        if period.is_zero() {
            return Err(DiError::misuse("FrameClock period must be non-zero"));
        }
        let origin = Instant::now();
        let mut tasks = Vec::with_capacity(3);

        let physics = ignition.clone();
        tasks.push(runtime.spawn(async move {
            let mut clock = interval(period);
            clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = origin;
            loop {
                let now = clock.tick().await;
                physics.dispatch_physics(now.duration_since(last).as_secs_f64(), now.duration_since(origin).as_secs_f64());
                last = now;
            }
        }));

        let tick = ignition.clone();
        tasks.push(runtime.spawn(async move {
            let mut clock = interval(period);
            clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = origin;
            loop {
                let now = clock.tick().await;
                tick.dispatch_tick(now.duration_since(last).as_secs_f64());
                last = now;
            }
        }));

        if ignition.config().role == Role::Client {
            let render = ignition.clone();
            tasks.push(runtime.spawn(async move {
                let mut clock = interval(period);
                clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
                let mut last = origin;
                loop {
                    let now = clock.tick().await;
                    render.dispatch_render(now.duration_since(last).as_secs_f64());
                    last = now;
                }
            }));
        }

        debug!(clocks = tasks.len(), ?period, "frame clock started");
        Ok(Self { tasks })
    }

    /// Number of running clocks.
    pub fn clocks(&self) -> usize {
        self.tasks.len()
    }

    pub fn stop(mut self) {
        self.abort_all();
    }

    fn abort_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for FrameClock {
    fn drop(&mut self) {
        self.abort_all();
    }
}
