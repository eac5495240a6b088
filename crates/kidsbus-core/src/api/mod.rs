//! Remote store access.
//!
//! This module provides the `Gateway` trait the rest of the console talks
//! to, the typed `RemoteStore` wrapper over it, and two implementations:
//!
//! - `HttpGateway`: the document store's REST interface
//! - `MemoryGateway`: an in-process store for demo runs and tests
//!
//! Writes answer with `{success, id?, error?}`; a refused write surfaces
//! as `ApiError::Rejected` carrying the store's message.

pub mod client;
pub mod error;
pub mod gateway;
pub mod memory;

pub use client::HttpGateway;
pub use error::ApiError;
pub use gateway::{Gateway, RemoteStore, WriteAck, WriteResponse};
pub use memory::{MemoryGateway, Operation};
