//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod decode;
pub mod health;
pub mod intake;

pub use crate::state::AppState;
pub use decode::{decode_handler, DecodeResponse};
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use intake::{intake_handler, IntakeFormat, IntakeQuery, IntakeResponse, WarningEntry};
