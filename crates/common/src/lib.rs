//! Identifiers and error helpers shared by every chatdesk crate.

pub mod error;
pub mod types;

pub use {
    error::FromMessage,
    types::{ModelId, ProviderId},
};
