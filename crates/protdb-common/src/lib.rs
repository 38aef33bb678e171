//! protdb Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the protdb workspace.
//!
//! # Overview
//!
//! - **Error Handling**: construction-time error kinds and the `Result` alias
//! - **Types**: species catalogue, database variants, pipeline stages, date tags
//! - **Checksums**: SHA-256 of produced artifacts
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use protdb_common::types::{DateTag, Species, Variant};
//!
//! fn main() -> protdb_common::Result<()> {
//!     let species: Species = "Human".parse()?;
//!     let variant: Variant = "pro-sw".parse()?;
//!     let tag: DateTag = "202401".parse()?;
//!     println!("{} {} {}", species, variant, tag);
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{ProtdbError, Result};
