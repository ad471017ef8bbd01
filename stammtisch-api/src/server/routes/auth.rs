use crate::server::{Result, ServerError, ServerRouter, auth, json::Json};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use stammtisch_common::model::{
    auth::PasswordDigest,
    user::{Email, UserHandle},
};
use stammtisch_db::client::DbClient;
use std::sync::Arc;

const PASSWORD_MIN_LEN: usize = 8;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_post(register).typed_post(login)
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
}

impl TokenResponse {
    fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer",
        }
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/register", rejection(ServerError))]
struct RegisterPath();

#[derive(Deserialize)]
struct RegisterRequest {
    handle: UserHandle,
    email: Email,
    password: String,
}

async fn register(
    RegisterPath(): RegisterPath,
    State(db): State<Arc<DbClient>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>)> {
    if request.password.chars().count() < PASSWORD_MIN_LEN {
        return Err(ServerError::PasswordTooShort(PASSWORD_MIN_LEN));
    }

    let digest = PasswordDigest::derive(&request.password)?;
    let user_id = db
        .create_user(&request.handle, &request.email, &digest)
        .await?;

    let token = auth::issue_token(&db, user_id).await?;

    Ok((StatusCode::CREATED, Json(TokenResponse::bearer(token))))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/login", rejection(ServerError))]
struct LoginPath();

#[derive(Deserialize)]
struct LoginRequest {
    handle: UserHandle,
    password: String,
}

async fn login(
    LoginPath(): LoginPath,
    State(db): State<Arc<DbClient>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    // An unknown handle and a wrong password fail identically.
    let (user, digest) = db
        .fetch_credentials(&request.handle)
        .await?
        .ok_or(ServerError::InvalidCredentials)?;

    if !digest.verify(&request.password)? {
        return Err(ServerError::InvalidCredentials);
    }

    let token = auth::issue_token(&db, user.id).await?;

    Ok(Json(TokenResponse::bearer(token)))
}
