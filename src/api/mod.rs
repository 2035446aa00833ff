//! Client for the attendance / expense-approval REST API.

mod admin;
pub mod client;
pub mod error;
mod export;
mod requests;
pub mod retry;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{filename_from_headers, ApiClient, ClientConfig, Download};
pub use error::{ApiError, ErrorCode, ErrorDetails, ValidationErrorBuilder};
pub use export::ExportFormat;
pub use retry::{with_retry, RetryPolicy, Retryable};
