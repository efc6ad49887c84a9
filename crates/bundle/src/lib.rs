//! Bundle decoding for htmlservd.
//!
//! A bundle is a tar stream (optionally gzip-compressed) carrying a JSON
//! manifest plus the resource files it references. Decoding validates every
//! referenced file against its declared SHA-256 before the apply engine
//! sees any of it.

pub mod decode;
pub mod manifest;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use decode::{decode, Bundle, BundleError, HashMismatch, ValidationError};
pub use manifest::{ApplyMode, Manifest, Resource, ResourceKind};
