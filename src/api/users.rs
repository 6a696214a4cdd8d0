/// /api/v1/users endpoints
use crate::{
    account::{
        AuthenticatedSession, ChangePasswordRequest, LoginRequest, NewAccount, PublicProfile,
        RefreshRequest, TokenPair, UpdateAccountRequest,
    },
    api::{
        middleware::{with_token_cookies, without_token_cookies, SpooledForm, REFRESH_TOKEN_COOKIE},
        ApiResponse,
    },
    auth::AuthContext,
    context::AppContext,
    error::{HubError, HubResult},
    graph::{ChannelProfile, HistoryEntry},
};
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use futures::TryStreamExt;

/// Build user routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh-token", post(refresh_token))
        .route("/change-password", post(change_password))
        .route("/current-user", get(current_user))
        .route("/update-account", patch(update_account))
        .route("/avatar", patch(update_avatar))
        .route("/cover-image", patch(update_cover_image))
        .route("/channel/:username", get(channel_profile))
        .route("/history", get(watch_history))
}

/// Upload a spooled file, if one was sent under `name`
///
/// `Ok(None)` when the form had no such file. A file that was sent but could
/// not be uploaded is an internal failure.
async fn upload_part(ctx: &AppContext, form: &mut SpooledForm, name: &str) -> HubResult<Option<String>> {
    let Some(path) = form.take_file(name) else {
        return Ok(None);
    };

    match ctx.uploader.upload(&path).await? {
        Some(url) => Ok(Some(url)),
        None => Err(HubError::Internal(format!("{} upload failed", name))),
    }
}

/// Register endpoint (multipart)
async fn register(
    State(ctx): State<AppContext>,
    multipart: Multipart,
) -> HubResult<(StatusCode, Json<ApiResponse<PublicProfile>>)> {
    let mut form = SpooledForm::read(&ctx, multipart).await?;

    let fields = NewAccount {
        full_name: form.field("fullName"),
        username: form.field("username"),
        email: form.field("email"),
        password: form.field("password"),
    };
    tracing::info!("register: request for username {}", fields.username.trim());

    // Reject before anything reaches media storage
    let checked = match ctx.sessions.check_registration(&fields).await {
        Ok(()) if !form.has_file("avatar") => {
            Err(HubError::InvalidInput("Avatar is required".to_string()))
        }
        other => other,
    };
    if let Err(e) = checked {
        form.discard().await;
        return Err(e);
    }

    let uploads = async {
        let avatar = upload_part(&ctx, &mut form, "avatar").await?;
        let cover_image = upload_part(&ctx, &mut form, "coverImage").await?;
        Ok::<_, HubError>((avatar, cover_image))
    }
    .await;
    form.discard().await;
    let (avatar, cover_image) = uploads?;

    let profile = ctx.sessions.register(fields, avatar, cover_image).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            StatusCode::CREATED,
            profile,
            "User created successfully",
        )),
    ))
}

/// Login endpoint
async fn login(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> HubResult<(CookieJar, Json<ApiResponse<AuthenticatedSession>>)> {
    let identifier = req
        .identifier()
        .ok_or_else(|| HubError::InvalidInput("Username or email is required".to_string()))?;

    let session = ctx.sessions.login(identifier, &req.password).await?;
    let jar = with_token_cookies(jar, &session.access_token, &session.refresh_token);

    Ok((jar, Json(ApiResponse::ok(session, "User logged in successfully"))))
}

/// Logout endpoint
async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    jar: CookieJar,
) -> HubResult<(CookieJar, Json<ApiResponse<serde_json::Value>>)> {
    ctx.sessions.logout(&auth.account_id).await?;

    Ok((
        without_token_cookies(jar),
        Json(ApiResponse::ok(serde_json::json!({}), "User logged out successfully")),
    ))
}

/// Refresh token endpoint; the cookie takes precedence over the body
async fn refresh_token(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> HubResult<(CookieJar, Json<ApiResponse<TokenPair>>)> {
    let presented = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| body.and_then(|Json(req)| req.refresh_token));

    let pair = ctx.sessions.refresh(presented.as_deref()).await?;
    let jar = with_token_cookies(jar, &pair.access_token, &pair.refresh_token);

    Ok((jar, Json(ApiResponse::ok(pair, "Access token refreshed"))))
}

/// Change password endpoint
async fn change_password(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> HubResult<Json<ApiResponse<serde_json::Value>>> {
    ctx.sessions
        .change_password(&auth.account_id, &req.old_password, &req.new_password)
        .await?;

    Ok(Json(ApiResponse::ok(
        serde_json::json!({}),
        "Password changed successfully",
    )))
}

/// Current user endpoint
async fn current_user(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> HubResult<Json<ApiResponse<PublicProfile>>> {
    let profile = ctx.account_manager.current_user(&auth.account_id).await?;

    Ok(Json(ApiResponse::ok(profile, "Current user fetched successfully")))
}

/// Account details update endpoint
async fn update_account(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<UpdateAccountRequest>,
) -> HubResult<Json<ApiResponse<PublicProfile>>> {
    let profile = ctx
        .account_manager
        .update_details(&auth.account_id, req)
        .await?;

    Ok(Json(ApiResponse::ok(profile, "Account details updated successfully")))
}

/// Avatar update endpoint (multipart)
async fn update_avatar(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    multipart: Multipart,
) -> HubResult<Json<ApiResponse<PublicProfile>>> {
    let mut form = SpooledForm::read(&ctx, multipart).await?;
    let uploaded = upload_part(&ctx, &mut form, "avatar").await;
    form.discard().await;

    let profile = ctx
        .account_manager
        .update_avatar(&auth.account_id, uploaded?)
        .await?;

    Ok(Json(ApiResponse::ok(profile, "Avatar updated successfully")))
}

/// Cover image update endpoint (multipart)
async fn update_cover_image(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    multipart: Multipart,
) -> HubResult<Json<ApiResponse<PublicProfile>>> {
    let mut form = SpooledForm::read(&ctx, multipart).await?;
    let uploaded = upload_part(&ctx, &mut form, "coverImage").await;
    form.discard().await;

    let profile = ctx
        .account_manager
        .update_cover_image(&auth.account_id, uploaded?)
        .await?;

    Ok(Json(ApiResponse::ok(profile, "Cover image updated successfully")))
}

/// Channel profile endpoint
async fn channel_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(username): Path<String>,
) -> HubResult<Json<ApiResponse<ChannelProfile>>> {
    let channel = ctx
        .graph
        .channel_profile(&username, Some(&auth.account_id))
        .await?;

    Ok(Json(ApiResponse::ok(channel, "User channel fetched successfully")))
}

/// Watch history endpoint
async fn watch_history(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> HubResult<Json<ApiResponse<Vec<HistoryEntry>>>> {
    let entries: Vec<HistoryEntry> = ctx
        .graph
        .watch_history(&auth.account_id)
        .await?
        .try_collect()
        .await?;

    Ok(Json(ApiResponse::ok(entries, "Watch history fetched successfully")))
}
