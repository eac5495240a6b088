//! Bus location lookup and periodic tracking.
//!
//! This module provides:
//! - `LocationProvider`: one source able to say where a bus is
//! - `LocationChain`: providers tried in a fixed priority order
//! - `LocationTracker`: cancellable polling sessions keyed by bus id
//!
//! Resolution never fails. When no provider answers, the result is
//! `Location::unavailable`.

pub mod provider;
pub mod providers;
pub mod tracker;

pub use provider::{LocationChain, LocationProvider};
pub use providers::{GpsProvider, PrimaryServiceProvider, StoreDocumentProvider};
pub use tracker::{LocationTracker, DEFAULT_TRACKING_INTERVAL_SECS};
