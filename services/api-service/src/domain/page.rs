use common::{AppError, AppResult};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}

/// Row offset of a 1-based page. Pages below 1, or so large the offset
/// would not fit, are rejected.
pub fn page_offset(page: i64, page_size: i64) -> AppResult<i64> {
    if page < 1 {
        return Err(AppError::invalid("page must be at least 1"));
    }
    (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| AppError::invalid("page is out of range"))
}
