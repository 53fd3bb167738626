//! Management API
//!
//! REST endpoints for inspecting and changing the worker pool, triggering
//! rotation and fetching URLs through a worker.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
