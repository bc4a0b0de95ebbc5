//! Frontera HTTP (axum) del motor de workflows de moldes.
//!
//! `build_router` recibe un `WorkflowService` ya cableado, con cualquier
//! `WorkflowStore` (Diesel en el servidor, memoria en las pruebas).
//! Los errores del motor se traducen a estado HTTP en `error.rs`.

pub mod config;
pub mod error;
pub mod routes;

pub use config::ServerConfig;
pub use error::{ApiError, ErrorBody};
pub use routes::{build_router, AppState, ACTOR_HEADER, IDEMPOTENCY_HEADER};
