use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeaderRejection,
    TypedHeader,
};
use tracing::error;

use crate::{errors::AppError, AppState};

/// Verifies the bearer token and hands the caller's claims to the handler as
/// an `Arc<IdentityClaims>` request extension.
pub async fn require_bearer_token(
    State(state): State<AppState>,
    auth_header: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // A missing header and a non-Bearer scheme are rejected alike.
    let Ok(TypedHeader(auth)) = auth_header else {
        return Err(AppError::unauthorized(
            "missing_token",
            "missing bearer authorization header",
        ));
    };

    let token = auth.token().trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("missing_token", "empty bearer token"));
    }

    let claims = match state.verifier.verify(token).await {
        Ok(claims) => claims,
        Err(err) => {
            error!(error = %err, "bearer token verification failed");
            return Err(AppError::unauthorized(
                "invalid_token",
                "token verification failed",
            ));
        }
    };

    request.extensions_mut().insert(Arc::new(claims));
    Ok(next.run(request).await)
}
