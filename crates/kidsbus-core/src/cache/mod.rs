//! In-memory entity cache.
//!
//! This module provides the `EntityCache` holding the console's copy of
//! the remote collections:
//! - Students, Parents, Buses
//! - Supervisors (read-only)
//!
//! The cache is only as fresh as its last explicit load. Bulk loads race a
//! fixed timeout and are never retried automatically.

pub mod store;

pub use store::{describe_age, CacheAges, Cached, CachedData, EntityCache};
