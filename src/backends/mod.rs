//! Concrete [`crate::analyzer::ModelBackend`] implementations.
//!
//! The library's analysis stage never depends on a specific model
//! provider — only on the trait in [`crate::analyzer`]. This module holds
//! the one concrete implementation the crate ships, gated behind the
//! `openai-backend` feature so the library stays dependency-light for
//! callers who bring their own backend.

#[cfg(feature = "openai-backend")]
pub mod openai;

#[cfg(feature = "openai-backend")]
pub use openai::OpenAiBackend;
