//! Traffic routing through pool workers
//!
//! The router picks a live worker and hands the request to a [`Fetcher`],
//! which talks to the worker's local forward proxy.

pub mod fetch;
pub mod router;

pub use fetch::{Fetcher, HttpFetcher};
pub use router::RequestRouter;
