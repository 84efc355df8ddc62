//! Shared types and error utilities used across all wabridge crates.

pub mod error;
pub mod types;

pub use {
    error::FromMessage,
    types::{MediaKind, MediaPayload},
};
