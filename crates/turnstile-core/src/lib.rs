//! # Turnstile Core
//!
//! Client-side ledger synchronization and resilient access for the ticketing platform.
//!
//! - **[`facade`]**: single entry point for contract reads and writes, with backend
//!   failover, pre-flight simulation, and confirmation waits.
//!
//! - **[`backend`]**: the configured ledger routes, their HTTP transport, and the health
//!   monitor that classifies them.
//!
//! - **[`reconcile`]**: the polling loop diffing block height and the entity counter, and
//!   tracking submitted transactions until their receipts appear.
//!
//! - **[`subscription`]**: the push log subscription with bounded reconnection.
//!
//! - **[`invalidation`]**: the signal type both observers emit and the dispatch point
//!   feeding the application's cache.
//!
//! - **[`runtime`]**: builds and tears down all of the above.
//!
//! ## Architecture
//!
//! ```text
//!   application ──read/write──► ChainFacade ──► BackendSet ──► ledger RPC
//!                                    ▲
//!                               HealthTable ◄── HealthMonitor
//!
//!   ReconciliationLoop ──┐
//!                        ├──► InvalidationBus ──► dispatcher ──► InvalidationSink
//!   SubscriptionManager ─┘
//! ```
//!
//! Both observers watch the same ledger on purpose: the loop catches what a dropped
//! socket misses, and the subscription cuts latency while it is up.

pub mod abi;
pub mod backend;
pub mod config;
pub mod facade;
pub mod invalidation;
pub mod reconcile;
pub mod registry;
pub mod runtime;
pub mod storage;
pub mod subscription;
pub mod types;
pub mod utils;
pub mod viewer;

#[cfg(test)]
mod test_support;
