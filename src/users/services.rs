use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::auth::tokens::TokenPair;
use crate::error::ApiError;
use crate::media::{self, UploadItem, AVATAR_FOLDER, COVER_FOLDER};
use crate::state::AppState;
use crate::users::dto::{ChangePasswordRequest, LoginRequest, RegisterForm, UpdateAccountRequest};
use crate::users::repo_types::{NewUser, PublicUser, User};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trimmed value, or `None` when missing or blank.
fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Like `required`, but keeps the value as typed. Used for passwords.
fn required_raw(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn normalized_email(value: Option<String>) -> Result<Option<String>, ApiError> {
    let Some(email) = required(value).map(|e| e.to_lowercase()) else {
        return Ok(None);
    };
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::validation("Invalid email"));
    }
    Ok(Some(email))
}

#[instrument(skip(st, form))]
pub async fn register(st: &AppState, form: RegisterForm) -> Result<PublicUser, ApiError> {
    let (Some(full_name), Some(username), Some(email), Some(password)) = (
        required(form.full_name),
        required(form.username),
        required(form.email),
        required_raw(form.password),
    ) else {
        warn!("registration with missing fields");
        return Err(ApiError::validation("All fields are required"));
    };
    let username = username.to_lowercase();
    let email = normalized_email(Some(email))?.unwrap_or_default();

    if st
        .users
        .find_by_username_or_email(Some(&username), Some(&email))
        .await?
        .is_some()
    {
        warn!(%username, %email, "username or email already registered");
        return Err(ApiError::Conflict(
            "User with email or username already exists".into(),
        ));
    }

    let avatar = form
        .avatar
        .ok_or_else(|| ApiError::validation("Avatar file is required"))?;
    let avatar = media::upload_image(st.storage.as_ref(), AVATAR_FOLDER, avatar)
        .await
        .map_err(|e| {
            warn!(error = %e, "avatar upload failed");
            ApiError::validation("Avatar upload failed")
        })?;

    let cover_image = match form.cover_image {
        Some(item) => match media::upload_image(st.storage.as_ref(), COVER_FOLDER, item).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, "cover image upload failed; continuing without it");
                None
            }
        },
        None => None,
    };

    let created = st
        .users
        .create(NewUser {
            username,
            email,
            full_name,
            password,
            avatar,
            cover_image,
        })
        .await?;

    let user = st.users.find_by_id(created.id).await?.ok_or_else(|| {
        error!(user_id = %created.id, "created user missing on re-fetch");
        ApiError::Internal("Something went wrong while registering the user".into())
    })?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user.into())
}

#[instrument(skip(st, req))]
pub async fn login(st: &AppState, req: LoginRequest) -> Result<(PublicUser, TokenPair), ApiError> {
    let username = required(req.username).map(|u| u.to_lowercase());
    let email = required(req.email).map(|e| e.to_lowercase());
    if username.is_none() && email.is_none() {
        return Err(ApiError::validation("username or email is required"));
    }
    let password =
        required_raw(req.password).ok_or_else(|| ApiError::validation("password is required"))?;

    let user = st
        .users
        .find_by_username_or_email(username.as_deref(), email.as_deref())
        .await?
        .ok_or_else(|| {
            warn!(?username, ?email, "login for unknown user");
            ApiError::NotFound("User does not exist".into())
        })?;

    if !user.is_password_correct(&password)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::unauthorized("Invalid user credentials"));
    }

    let tokens = st.tokens.issue_tokens(st.users.as_ref(), user.id).await?;
    let user = st.users.find_by_id(user.id).await?.ok_or_else(|| {
        error!(user_id = %user.id, "user vanished during login");
        ApiError::Internal("Something went wrong while logging in".into())
    })?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok((user.into(), tokens))
}

#[instrument(skip(st, user), fields(user_id = %user.id))]
pub async fn logout(st: &AppState, user: &User) -> Result<(), ApiError> {
    st.users.set_refresh_token(user.id, None).await?;
    info!("user logged out");
    Ok(())
}

/// Exchanges a stored refresh token for a new pair. The presented token must be the
/// one currently stored on the user; anything else is a replay.
#[instrument(skip(st, incoming))]
pub async fn refresh(st: &AppState, incoming: Option<String>) -> Result<TokenPair, ApiError> {
    let incoming = required(incoming).ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

    let claims = st
        .tokens
        .verify_refresh(&incoming)
        .map_err(|e| ApiError::unauthorized(format!("Invalid refresh token: {e}")))?;

    let user = st
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    if user.refresh_token.as_deref() != Some(incoming.as_str()) {
        warn!(user_id = %user.id, "refresh token mismatch");
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    let tokens = st.tokens.issue_tokens(st.users.as_ref(), user.id).await?;
    info!(user_id = %user.id, "access token refreshed");
    Ok(tokens)
}

#[instrument(skip(st, user, req), fields(user_id = %user.id))]
pub async fn change_password(
    st: &AppState,
    user: &User,
    req: ChangePasswordRequest,
) -> Result<(), ApiError> {
    let (Some(old_password), Some(new_password)) =
        (required_raw(req.old_password), required_raw(req.new_password))
    else {
        return Err(ApiError::validation("oldPassword and newPassword are required"));
    };

    if !user.is_password_correct(&old_password)? {
        warn!("change password with wrong old password");
        return Err(ApiError::validation("Invalid old password"));
    }

    st.users.set_password(user.id, &new_password).await?;
    info!("password changed");
    Ok(())
}

#[instrument(skip(st, user, req), fields(user_id = %user.id))]
pub async fn update_account(
    st: &AppState,
    user: &User,
    req: UpdateAccountRequest,
) -> Result<PublicUser, ApiError> {
    let full_name = required(req.full_name);
    let email = normalized_email(req.email)?;
    let (Some(full_name), Some(email)) = (full_name, email) else {
        return Err(ApiError::validation("All fields are required"));
    };

    if let Some(owner) = st.users.find_by_username_or_email(None, Some(&email)).await? {
        if owner.id != user.id {
            return Err(ApiError::Conflict("Email is already in use".into()));
        }
    }

    let updated = st
        .users
        .update_account(user.id, &full_name, &email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User does not exist".into()))?;
    info!("account details updated");
    Ok(updated.into())
}

#[instrument(skip(st, user, file), fields(user_id = %user.id))]
pub async fn update_avatar(
    st: &AppState,
    user: &User,
    file: Option<UploadItem>,
) -> Result<PublicUser, ApiError> {
    let file = file.ok_or_else(|| ApiError::validation("Avatar file is missing"))?;
    let url = media::upload_image(st.storage.as_ref(), AVATAR_FOLDER, file)
        .await
        .map_err(|e| {
            warn!(error = %e, "avatar upload failed");
            ApiError::validation("Error while uploading avatar")
        })?;

    let updated = st
        .users
        .set_avatar(user.id, &url)
        .await?
        .ok_or_else(|| ApiError::NotFound("User does not exist".into()))?;

    discard_media(st, &user.avatar).await;
    info!("avatar updated");
    Ok(updated.into())
}

#[instrument(skip(st, user, file), fields(user_id = %user.id))]
pub async fn update_cover_image(
    st: &AppState,
    user: &User,
    file: Option<UploadItem>,
) -> Result<PublicUser, ApiError> {
    let file = file.ok_or_else(|| ApiError::validation("Cover image file is missing"))?;
    let url = media::upload_image(st.storage.as_ref(), COVER_FOLDER, file)
        .await
        .map_err(|e| {
            warn!(error = %e, "cover image upload failed");
            ApiError::validation("Error while uploading cover image")
        })?;

    let updated = st
        .users
        .set_cover_image(user.id, Some(&url))
        .await?
        .ok_or_else(|| ApiError::NotFound("User does not exist".into()))?;

    if let Some(old) = &user.cover_image {
        discard_media(st, old).await;
    }
    info!("cover image updated");
    Ok(updated.into())
}

/// Best-effort removal of a replaced image.
async fn discard_media(st: &AppState, url: &str) {
    if let Err(e) = media::delete_by_url(st.storage.as_ref(), url).await {
        warn!(error = %e, url, "failed to delete replaced image");
    }
}
