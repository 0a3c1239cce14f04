//! HTTP surface of the quiz archive worker.
//!
//! Routes, the two versioned request decoders, the admission flow and the
//! error mapping onto HTTP status codes.

pub mod bootstrap;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

/// Application name reported by `GET /`.
pub const APP_NAME: &str = "quiz-archive-worker";

/// Application version reported by `GET /` and `GET /version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use bootstrap::{build_state, serve};
pub use routes::create_router;
pub use state::{AppContext, AppState};
