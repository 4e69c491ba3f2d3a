//! LeafGuard daemon library.
//!
//! Split from `main.rs` so the router and run loop can be driven from
//! integration tests.

pub mod error;
pub mod server;
pub mod startup;

pub use error::ApiError;
pub use server::{router, AppState};
pub use startup::{acquire, build, run, shutdown_signal, Runtime};
