//! Offline-first cache of a remote game catalog.
//!
//! The remote catalog is the source of truth; [`sync`] keeps a local SQLite
//! copy ([`db`]) up to date while fetching as little as possible from the
//! remote ([`remote`]). [`publish`] and [`server`] produce and serve the
//! remote side.

pub mod config;
pub mod db;
pub mod models;
pub mod publish;
pub mod remote;
pub mod server;
pub mod sync;
