//! kidsbus core library.
//!
//! The cache-consistency engine behind the school-transport admin console:
//!
//! - `api`: the remote document store gateway
//! - `cache`: the in-memory mirror of the store's collections
//! - `sync`: the relationship synchronizer and capacity guard
//! - `location`: the bus location provider chain and tracker
//! - `console`: the session object tying them together
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use kidsbus_core::{Config, Console};
//!
//! let config = Config::load()?;
//! let mut console = Console::connect(&config)?;
//! console.init().await?;
//! for drift in console.audit() {
//!     println!("{}", drift);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod console;
pub mod error;
pub mod location;
pub mod models;
pub mod sync;
pub mod utils;

pub use api::{ApiError, Gateway, HttpGateway, MemoryGateway, RemoteStore};
pub use cache::EntityCache;
pub use config::Config;
pub use console::{Console, ConsoleSettings};
pub use error::{Error, Result};
pub use location::{LocationChain, LocationProvider, LocationTracker};
pub use sync::{CascadeFailure, Drift, Synced};
