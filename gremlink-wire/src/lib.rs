// gremlink-wire - Shared wire model for the Gremlin Server protocol
//
// This crate defines the request/response shapes, the status code taxonomy,
// and the SASL token derivation used by the driver crate.

pub mod error;
pub mod request;
pub mod response;

// Re-export for convenience
pub use error::*;
pub use request::*;
pub use response::*;
