//! Outpost Storage - Entity store abstraction
//!
//! This crate provides the generic entity store Outpost persists through
//! (a key-value backend holding JSON records), typed models validated at
//! the store boundary, and per-entity repositories.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;
pub mod store;

pub use db::RedisStore;
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
pub use store::{kind, Record, Store, StoreError};
