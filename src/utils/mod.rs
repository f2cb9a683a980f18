//! Utility modules.

pub mod retry;
pub mod text;

pub use retry::{Retryable, RetryConfig, RetryResult, with_retry};
pub use text::{estimate_tokens, has_meaningful_content, strip_markup};
