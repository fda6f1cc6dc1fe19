use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use crate::auth::cookies::{read_cookie, ACCESS_COOKIE};
use crate::auth::tokens::TokenIssuer;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo::UserStore;
use crate::users::repo_types::User;

/// Resolves the caller from the `accessToken` cookie or an `Authorization: Bearer` header.
pub async fn authenticate(
    tokens: &TokenIssuer,
    users: &dyn UserStore,
    headers: &HeaderMap,
) -> Result<User, ApiError> {
    let token = read_cookie(headers, ACCESS_COOKIE)
        .or_else(|| bearer_token(headers))
        .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

    let claims = tokens.verify_access(&token).map_err(|e| {
        warn!(error = %e, "invalid or expired access token");
        ApiError::unauthorized("Invalid access token")
    })?;

    users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid access token"))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth = headers.get(AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// The authenticated caller, loaded fresh from the store.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(&state.tokens, state.users.as_ref(), &parts.headers)
            .await
            .map(CurrentUser)
    }
}
