//! # Storage Module
//!
//! Persistent storage backend for capability health data.
//!
//! Uses redb for ACID transactions, crash safety, and MVCC.

pub mod redb_store;

pub use redb_store::RedbStore;
