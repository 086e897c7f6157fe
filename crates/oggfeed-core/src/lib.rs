//! # oggfeed-core
//!
//! Core types, configuration, and error handling shared by the oggfeed
//! decode engine and its front-ends.

pub mod config;
pub mod error;
pub mod types;

pub use config::DecodeConfig;
pub use error::{DecodeError, DecodeResult, Error, Result};
pub use types::*;
