//! Server-side modules for the catalog server.

mod catalog;

pub use catalog::{router, ServerState};
