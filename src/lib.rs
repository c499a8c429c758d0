//! Gazette: versioned issue history with running annexes and amendments
//!
//! Issues are stored as directories of JSON field files inside a git working
//! tree. The crate resolves which publication snapshot is in force before any
//! issue, replays amendments against it, and synchronizes the tree with a
//! remote.

pub mod amendment;
pub mod annex;
pub mod api;
pub mod cli;
pub mod concurrency;
pub mod config;
pub mod editing;
pub mod error;
pub mod logging;
pub mod model;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;
