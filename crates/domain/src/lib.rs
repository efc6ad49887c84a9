//! Shared domain types for htmlservd: configuration, the common error type,
//! content hashes, release identifiers, and name grammars.

pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod name;

pub use error::{Error, Result};
pub use hash::ContentHash;
pub use id::ReleaseId;
