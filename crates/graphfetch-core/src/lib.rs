//! # graphfetch-core
//!
//! Core types shared by every graphfetch crate: the [`FetchError`] error
//! enum, the [`Settings`] struct, and tracing-based logging helpers.

pub mod error;
pub mod logging;
pub mod settings;

pub use error::{FetchError, FetchResult};
pub use settings::Settings;
