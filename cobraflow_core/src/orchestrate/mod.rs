//! Components moving jobs between the application and the worker pool
//!
//! - [`dispatcher::Dispatcher`] validates and publishes new jobs
//! - [`collector::ResultCollector`] applies results carrying the expected correlation id
//! - [`cancellation::CancellationGuard`] revokes pending requests of deleted jobs
//! - [`service::JobService`] wires them together for callers

pub mod cancellation;
pub mod collector;
pub mod dispatcher;
pub mod service;
