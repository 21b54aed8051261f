//! Composition root.
//!
//! Builds the facade, health monitor, reconciliation loop, subscription manager and
//! invalidation dispatcher from one [`AppConfig`](crate::config::AppConfig), starts
//! their tasks, and tears them down in a fixed order.
//!
//! ```no_run
//! use std::sync::Arc;
//! use turnstile_core::{
//!     config::AppConfig,
//!     invalidation::{InvalidationSignal, InvalidationSink},
//!     runtime::SyncRuntime,
//! };
//!
//! struct Cache;
//!
//! impl InvalidationSink for Cache {
//!     fn invalidate(&self, signal: &InvalidationSignal) {
//!         println!("refetch {signal}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = SyncRuntime::builder()
//!         .with_config(AppConfig::load()?)
//!         .with_sink(Arc::new(Cache))
//!         .build()?;
//!
//!     runtime.components().viewer().bind("0x70997970c51812dc3a010c7d01b50e0d17dc79c8".parse()?);
//!
//!     tokio::signal::ctrl_c().await?;
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod components;
pub mod lifecycle;

pub use builder::{RuntimeError, SyncRuntimeBuilder};
pub use components::SyncComponents;
pub use lifecycle::SyncRuntime;
