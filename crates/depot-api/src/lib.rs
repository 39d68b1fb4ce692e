//! Depot API Library
//!
//! HTTP host for the depot engine: verb routing, status mapping, static
//! token authorization and telemetry.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod setup;
pub mod state;
pub mod telemetry;

pub use error::{ErrorResponse, HttpDepotError};
