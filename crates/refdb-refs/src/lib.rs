//! Ref model for the global ref database.
//!
//! A [`Ref`] is an immutable value: a name bound either to an object id or,
//! for symbolic refs, to the name of another ref. Two well-known shapes exist
//! besides stored refs:
//!
//! - the **null ref** ([`Ref::null`]), which stands for "this ref does not
//!   exist yet" when passed as the expected old value of a compare-and-put;
//! - the **new ref** ([`Ref::new_ref`]), an in-memory value that only ever
//!   appears as the desired new value of a compare-and-put.
//!
//! # Modules
//!
//! - [`error`] — Error types for ref construction
//! - [`types`] — [`Ref`] and [`RefStorage`]
//! - [`names`] — Ref name validation

pub mod error;
pub mod names;
pub mod types;

pub use error::{RefError, Result};
pub use names::{validate_ref_name, HEAD};
pub use types::{Ref, RefStorage};
