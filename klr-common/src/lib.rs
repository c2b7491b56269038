//! Koala IR - Common Types and Errors
//! 
//! This crate contains the type descriptors handed over by the front end and
//! the error type shared by the IR builder, the passes and the driver.

pub mod error;
pub mod types;

pub use error::IrError;
pub use types::*;
