//! Foundation types for the global ref database.
//!
//! Every other refdb crate depends on `refdb-types`. The types here carry no
//! storage semantics; they only name things.
//!
//! # Key Types
//!
//! - [`ObjectId`] — 160-bit git object id, with an all-zero "no object" sentinel
//! - [`ProjectName`] — the repository a ref belongs to

pub mod error;
pub mod object;
pub mod project;

pub use error::TypeError;
pub use object::ObjectId;
pub use project::ProjectName;
