//! Lifecycle phases and the handler traits instances implement to join them.
//!
//! `OnInit` runs once, strictly sequentially, and may suspend; ignition waits
//! for each init before starting the next. Every other phase is issued in order
//! but runs as an independent task.

use std::fmt;

use async_trait::async_trait;

use crate::error::BoxError;

/// Result returned by every lifecycle handler.
pub type LifecycleResult = Result<(), BoxError>;

/// One-time initialization, awaited in load order.
#[async_trait]
pub trait OnInit: Send + Sync {
    async fn on_init(&self) -> LifecycleResult;
}

/// One-time start, issued in load order after every init completed.
#[async_trait]
pub trait OnStart: Send + Sync {
    async fn on_start(&self) -> LifecycleResult;
}

/// Post-physics frame signal.
#[async_trait]
pub trait OnTick: Send + Sync {
    async fn on_tick(&self, dt: f64) -> LifecycleResult;
}

/// Pre-physics frame signal, carries the absolute simulation time as well.
#[async_trait]
pub trait OnPhysics: Send + Sync {
    async fn on_physics(&self, dt: f64, time: f64) -> LifecycleResult;
}

/// Pre-render frame signal, client role only.
#[async_trait]
pub trait OnRender: Send + Sync {
    async fn on_render(&self, dt: f64) -> LifecycleResult;
}

/// The five lifecycle points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    Start,
    Tick,
    Physics,
    Render,
}

impl Phase {
    pub const ALL: [Phase; 5] = [Phase::Init, Phase::Start, Phase::Tick, Phase::Physics, Phase::Render];

    /// Listener identifier of the phase, as tracked by the listener registry.
    pub fn listener_id(self) -> &'static str {
        match self {
            Phase::Init => "$ignite:OnInit",
            Phase::Start => "$ignite:OnStart",
            Phase::Tick => "$ignite:OnTick",
            Phase::Physics => "$ignite:OnPhysics",
            Phase::Render => "$ignite:OnRender",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Init => "OnInit",
            Phase::Start => "OnStart",
            Phase::Tick => "OnTick",
            Phase::Physics => "OnPhysics",
            Phase::Render => "OnRender",
        }
    }

    /// Whether the phase fires every frame.
    pub fn is_recurring(self) -> bool {
        matches!(self, Phase::Tick | Phase::Physics | Phase::Render)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
