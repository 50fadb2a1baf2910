pub mod admin;
pub mod checkout;
pub mod intake;
pub mod webhooks;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

use axum::http::HeaderMap;

use crate::errors::ServiceError;

pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Checks the `Authorization: Bearer <shared secret>` header guarding
/// the admin actions. Runs before any request body is interpreted so an
/// unauthorized call has no side effects.
pub(crate) fn require_admin(headers: &HeaderMap, expected: &str) -> Result<(), ServiceError> {
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ServiceError::Unauthorized("missing admin credentials".to_string()))?;

    if !constant_time_eq(presented, expected) {
        return Err(ServiceError::Unauthorized(
            "invalid admin credentials".to_string(),
        ));
    }
    Ok(())
}
