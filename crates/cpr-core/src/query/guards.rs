//! Shared guardrails for request payload bounds.

use crate::errors::{CprError, CprResult};

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_MAX_PAGE_SIZE: usize = 500;
pub const MIN_ANALYZER_TIMEOUT_SECS: u64 = 5;
pub const MAX_PREVIEW_BYTES: u64 = 128 * 1024;

pub fn clamp_int(value: i64, minimum: i64, maximum: i64) -> i64 {
    value.max(minimum).min(maximum)
}

/// Resolve the effective page size for a request.
///
/// `None` falls back to `default`; anything above `maximum` is clamped down.
/// Zero and negative sizes are rejected rather than clamped.
pub fn resolve_page_size(requested: Option<i64>, default: usize, maximum: usize) -> CprResult<usize> {
    let maximum = maximum.max(1) as i64;
    match requested {
        None => Ok(clamp_int(default as i64, 1, maximum) as usize),
        Some(value) if value < 1 => Err(CprError::InvalidArgument(format!(
            "page_size must be a positive integer, got {value}"
        ))),
        Some(value) => Ok(clamp_int(value, 1, maximum) as usize),
    }
}
