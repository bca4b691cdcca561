//! Identity endpoint.

use super::{success, ApiResult};
use crate::auth::CurrentUser;

/// GET /api/user - Echo the identity forwarded with this request.
pub async fn get_current_user(user: CurrentUser) -> ApiResult<CurrentUser> {
    success(user)
}
