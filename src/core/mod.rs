//! Core types shared by every backend.

pub mod error;

pub use error::{DbError, DbResult};
