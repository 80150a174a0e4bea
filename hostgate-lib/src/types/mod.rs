#![allow(unreachable_pub)]

mod error;
mod request;
mod response;

pub use error::{ErrorKind, Rejection};
pub use request::Request;
pub use response::Response;

/// The hostgate `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
