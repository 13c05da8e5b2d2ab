//! rns-daemon library target.
//!
//! Exposes the router, the engine runtime and the shared state for
//! integration tests. The binary `main.rs` depends on this library target.

pub mod api_types;
pub mod routes;
pub mod runtime;
pub mod state;
