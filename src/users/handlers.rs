use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        rejection::JsonRejection,
        Multipart, State,
    },
    http::HeaderMap,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        cookies::{cleared_cookies, read_cookie, token_cookies, SetCookies, REFRESH_COOKIE},
        extractors::CurrentUser,
        tokens::TokenPair,
    },
    error::ApiError,
    media::UploadItem,
    response::{ApiResponse, Empty},
    state::AppState,
    users::{
        dto::{
            ChangePasswordRequest, LoginData, LoginRequest, RefreshRequest, RegisterForm,
            UpdateAccountRequest,
        },
        repo_types::PublicUser,
        services,
    },
};

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/refresh-token", post(refresh_token))
        .route("/users/logout", post(logout))
        .route("/users/change-password", post(change_password))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/users/current-user", get(current_user))
        .route("/users/update-account", patch(update_account))
        .route("/users/avatar", patch(update_avatar))
        .route("/users/cover-image", patch(update_cover_image))
}


/// Reads a file field. Empty parts (a form with no file chosen) count as absent.
async fn read_file(field: Field<'_>) -> Result<Option<UploadItem>, ApiError> {
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let body = field.bytes().await?;
    if body.is_empty() {
        return Ok(None);
    }
    Ok(Some(UploadItem { body, content_type }))
}

/// Returns the first non-empty file found under `name`.
async fn single_file(mut mp: Multipart, name: &str) -> Result<Option<UploadItem>, ApiError> {
    while let Some(field) = mp.next_field().await? {
        if field.name() == Some(name) {
            if let Some(item) = read_file(field).await? {
                return Ok(Some(item));
            }
        }
    }
    Ok(None)
}

/// POST /users/register (multipart: fullName, username, email, password, avatar, coverImage?)
#[instrument(skip(state, multipart))]
pub async fn register(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let mut mp = multipart?;
    let mut form = RegisterForm::default();
    while let Some(field) = mp.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "fullName" => form.full_name = Some(field.text().await?),
            "username" => form.username = Some(field.text().await?),
            "email" => form.email = Some(field.text().await?),
            "password" => form.password = Some(field.text().await?),
            "avatar" => form.avatar = read_file(field).await?,
            "coverImage" => form.cover_image = read_file(field).await?,
            _ => {}
        }
    }

    let user = services::register(&state, form).await?;
    Ok(ApiResponse::created(user, "User registered successfully"))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(SetCookies, ApiResponse<LoginData>), ApiError> {
    let Json(payload) = payload?;
    let (user, tokens) = services::login(&state, payload).await?;
    let cookies = token_cookies(&tokens, &state.tokens, &state.config.cookies);
    let data = LoginData {
        user,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    };
    Ok((cookies, ApiResponse::ok(data, "User logged in successfully")))
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<(SetCookies, ApiResponse<Empty>), ApiError> {
    services::logout(&state, &user).await?;
    Ok((
        cleared_cookies(&state.config.cookies),
        ApiResponse::ok(Empty::default(), "User logged out"),
    ))
}

/// POST /users/refresh-token. The `refreshToken` cookie wins over the body field.
#[instrument(skip_all)]
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Result<(SetCookies, ApiResponse<TokenPair>), ApiError> {
    let incoming = read_cookie(&headers, REFRESH_COOKIE)
        .or_else(|| body.and_then(|Json(b)| b.refresh_token));
    let tokens = services::refresh(&state, incoming).await?;
    let cookies = token_cookies(&tokens, &state.tokens, &state.config.cookies);
    Ok((cookies, ApiResponse::ok(tokens, "Access token refreshed")))
}

#[instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<ApiResponse<Empty>, ApiError> {
    let Json(payload) = payload?;
    services::change_password(&state, &user, payload).await?;
    Ok(ApiResponse::ok(Empty::default(), "Password changed successfully"))
}

#[instrument(skip_all)]
pub async fn current_user(CurrentUser(user): CurrentUser) -> ApiResponse<PublicUser> {
    ApiResponse::ok(user.into(), "Current user fetched successfully")
}

#[instrument(skip_all)]
pub async fn update_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let Json(payload) = payload?;
    let updated = services::update_account(&state, &user, payload).await?;
    Ok(ApiResponse::ok(updated, "Account details updated successfully"))
}

/// PATCH /users/avatar (multipart: avatar)
#[instrument(skip_all)]
pub async fn update_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let file = single_file(multipart?, "avatar").await?;
    let updated = services::update_avatar(&state, &user, file).await?;
    Ok(ApiResponse::ok(updated, "Avatar updated successfully"))
}

/// PATCH /users/cover-image (multipart: coverImage)
#[instrument(skip_all)]
pub async fn update_cover_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let file = single_file(multipart?, "coverImage").await?;
    let updated = services::update_cover_image(&state, &user, file).await?;
    Ok(ApiResponse::ok(updated, "Cover image updated successfully"))
}
