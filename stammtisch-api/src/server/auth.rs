use crate::server::{Result, ServerError};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use stammtisch_common::model::{
    Id,
    auth::AccessToken,
    user::{User, UserMarker},
};
use stammtisch_db::client::DbClient;
use std::{convert::Infallible, sync::Arc};
use time::{Duration, UtcDateTime};

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

pub const TOKEN_LIFETIME: Duration = Duration::days(30);

/// The principal behind a request, if any.
///
/// Resolution never rejects: a missing header, a malformed or expired token,
/// and a session lookup failure all resolve to an anonymous request.
#[derive(Clone, Debug, Default)]
pub struct MaybePrincipal(pub Option<User>);

impl MaybePrincipal {
    #[must_use]
    pub fn principal(&self) -> Option<&User> {
        self.0.as_ref()
    }
}

impl<S> FromRequestParts<S> for MaybePrincipal
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(resolve_principal(parts, state).await))
    }
}

async fn resolve_principal<S>(parts: &mut Parts, state: &S) -> Option<User>
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    let header = AuthorizationHeader::from_request_parts(parts, state)
        .await
        .ok()?;
    let token: AccessToken = header.token().parse().ok()?;
    let token_hash = token.hash().ok()?;

    let db = Arc::<DbClient>::from_ref(state);
    let session = db.fetch_session(&token_hash).await.ok()??;

    if session.user != token.user_id || session.is_expired_at(UtcDateTime::now()) {
        return None;
    }

    db.fetch_user(session.user).await.ok()?
}

/// Mint, hash, and persist a fresh access token for `user_id`, returning its
/// client-side string form.
pub async fn issue_token(db: &DbClient, user_id: Id<UserMarker>) -> Result<String, ServerError> {
    let token = AccessToken::generate_random(user_id);
    let token_hash = token.hash()?;

    db.insert_session(user_id, &token_hash, Some(TOKEN_LIFETIME))
        .await?;

    Ok(token.as_token_str())
}
