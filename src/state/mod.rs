//! Temporal state: per-entity value history queried over trailing windows.
//!
//! Rules carrying a `temporal_window` read an aggregate of recent values
//! instead of the instantaneous proposal value. The store is the only
//! mutable shared state touched by evaluation.

mod store;

pub use store::{StateEntry, StateStoreConfig, TemporalStateStore};
