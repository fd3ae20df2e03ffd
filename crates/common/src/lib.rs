//! Common types, protocol definitions, and errors shared across `acciopassword` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
