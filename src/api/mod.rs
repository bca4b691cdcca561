//! REST API module.
//!
//! Handlers return `ApiResult`, so every outcome is either the success
//! envelope or an `AppError` rendered as the error envelope.

mod extract;
mod meetings;
mod topics;
mod user;

pub use meetings::*;
pub use topics::*;
pub use user::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Maximum page size for paginated listings.
const MAX_PAGE_LIMIT: i64 = 100;

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// 1-based page number (default: 1).
    #[serde(default = "default_page")]
    pub page: i64,
    /// Page size (default: 10).
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

impl PageQuery {
    /// Clamp to sane bounds and return `(page, limit, offset)`.
    pub fn resolve(&self) -> (i64, i64, i64) {
        let page = self.page.max(1);
        let limit = self.limit.clamp(1, MAX_PAGE_LIMIT);
        (page, limit, (page - 1).saturating_mul(limit))
    }
}

/// One page of a listing.
#[derive(Debug, Serialize)]
pub struct Paginated<T: Serialize> {
    pub results: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}
