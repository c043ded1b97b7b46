pub mod client_error;

pub use client_error::{ApiError, ApiErrorKind, ClientError, ClientResult};
