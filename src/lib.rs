//! # ignite-di
//!
//! Metadata-driven dependency injection with a one-shot ignition sequence and
//! per-frame lifecycle dispatch.
//!
//! ## Features
//!
//! - **Metadata store**: keyed markers per type and member, inherited along a single-parent chain
//! - **Identifiers**: globally unique strings naming types for indirect dependency lookup
//! - **Singletons**: lazily constructed, cached, with constructor injection and cycle detection
//! - **Overrides and primitives**: literal values and factories bound to identifiers
//! - **Listener registry**: live membership sets per lifecycle phase or marker interface
//! - **Ignition**: deterministic load order, awaited inits, fire-and-forget starts and frame signals
//!
//! ## Quick Start
//!
//! ```rust
//! use ignite_di::{Container, IgniteConfig, Ignition, LifecycleResult, OnInit, OnStart};
//! use async_trait::async_trait;
//! use std::sync::{Arc, Mutex};
//!
//! struct Logger {
//!     lines: Mutex<Vec<String>>,
//! }
//!
//! #[async_trait]
//! impl OnInit for Logger {
//!     async fn on_init(&self) -> LifecycleResult {
//!         self.lines.lock().unwrap().push("logger ready".into());
//!         Ok(())
//!     }
//! }
//!
//! struct Game {
//!     logger: Arc<Logger>,
//! }
//!
//! #[async_trait]
//! impl OnStart for Game {
//!     async fn on_start(&self) -> LifecycleResult {
//!         self.logger.lines.lock().unwrap().push("game started".into());
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let container = Container::new();
//! container.register::<Logger>("game/Logger")
//!     .service()
//!     .constructor(|_| Ok(Logger { lines: Mutex::new(Vec::new()) }))
//!     .on_init()
//!     .finish()
//!     .unwrap();
//! container.register::<Game>("game/Game")
//!     .service()
//!     .depends_on(["game/Logger"])
//!     .constructor(|args| Ok(Game { logger: args.get(0)? }))
//!     .on_start()
//!     .finish()
//!     .unwrap();
//!
//! let ignition = Ignition::new(container.clone(), IgniteConfig::default());
//! ignition.ignite().await.unwrap();
//! assert_eq!(ignition.load_order(), vec!["game/Logger", "game/Game"]);
//!
//! let logger = container.resolve::<Logger>().unwrap();
//! assert_eq!(logger.lines.lock().unwrap()[0], "logger ready");
//! # }
//! ```
//!
//! ## Lifecycle
//!
//! - **OnInit**: awaited one at a time in load order; a failure aborts ignition
//! - **OnStart**: issued in load order once every init completed, not awaited
//! - **OnPhysics / OnTick / OnRender**: issued per frame to every live member, each on its own task

// Module declarations
pub mod config;
pub mod container;
pub mod error;
pub mod ignition;
pub mod instance;
pub mod key;
pub mod lifecycle;
pub mod listener;
pub mod metadata;
pub mod observer;
pub mod registration;

// Internal modules
mod internal;

// Re-export core types
pub use config::{IgniteConfig, Role};
pub use container::{Container, DependencyRequest, Override, OverrideFactory, Primitive, ResolveOptions, PRIMITIVE_PREFIX};
pub use error::{BoxError, DiError, DiResult};
pub use ignition::{FrameClock, IgnitionState, Ignition, DEFAULT_LOAD_ORDER};
pub use instance::{AnyArc, Capabilities, Instance, InstanceId};
pub use key::{key_of_type, TypeKey};
pub use lifecycle::{LifecycleResult, OnInit, OnPhysics, OnRender, OnStart, OnTick, Phase};
pub use listener::{ListenerCallback, ListenerRegistry, Subscription};
pub use metadata::{keys, MetaValue, MetadataStore, Property};
pub use observer::{DiObserver, TracingObserver};
pub use registration::{Args, TypeBuilder};
