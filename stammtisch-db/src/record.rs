//! Raw row shapes and their conversions into domain models.
//!
//! Author resolution happens here, in one place: a row with a principal
//! reference resolves to the principal's current handle, a row without one
//! resolves to its stored label verbatim. Rows whose principal was deleted
//! carry neither and resolve to an empty label (no backfill is attempted).

use sqlx::FromRow;
use stammtisch_common::model::{
    ModelValidationError,
    auth::{PasswordDigest, Session},
    comment::{Comment, CommentBody},
    post::{Author, PostKind, StoredPost},
    user::{User, UserHandle},
};
use time::{Duration, PrimitiveDateTime, UtcDateTime};

/// Stored timestamps are UTC wall-clock without offsets.
pub(crate) fn as_primitive(time: UtcDateTime) -> PrimitiveDateTime {
    PrimitiveDateTime::new(time.date(), time.time())
}

fn resolve_author(
    author_snowflake: Option<i64>,
    author_handle: Option<String>,
    author_label: Option<String>,
) -> Result<Author, ModelValidationError> {
    match (author_snowflake, author_handle) {
        (Some(snowflake), Some(handle)) => Ok(Author::Principal {
            id: snowflake.cast_unsigned().into(),
            handle: UserHandle::new(handle)?,
        }),
        _ => Ok(Author::Label(author_label.unwrap_or_default())),
    }
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub struct FeedPostRecord {
    pub post_snowflake: i64,
    pub created_at: PrimitiveDateTime,
    pub kind: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub link_url: Option<String>,
    pub image_url: Option<String>,
    pub author_snowflake: Option<i64>,
    pub author_handle: Option<String>,
    pub author_label: Option<String>,
}

impl TryFrom<FeedPostRecord> for StoredPost {
    type Error = ModelValidationError;

    fn try_from(value: FeedPostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.post_snowflake.cast_unsigned().into(),
            created_at: value.created_at.as_utc(),
            kind: value.kind.parse::<PostKind>()?,
            title: value.title,
            body: value.body,
            link_url: value.link_url,
            image_url: value.image_url,
            author: resolve_author(
                value.author_snowflake,
                value.author_handle,
                value.author_label,
            )?,
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub struct CommentRecord {
    pub comment_snowflake: i64,
    pub post_snowflake: i64,
    pub created_at: PrimitiveDateTime,
    pub body: String,
    pub author_snowflake: Option<i64>,
    pub author_handle: Option<String>,
    pub author_label: Option<String>,
}

impl TryFrom<CommentRecord> for Comment {
    type Error = ModelValidationError;

    fn try_from(value: CommentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.comment_snowflake.cast_unsigned().into(),
            post_id: value.post_snowflake.cast_unsigned().into(),
            created_at: value.created_at.as_utc(),
            body: CommentBody::new(value.body)?,
            author: resolve_author(
                value.author_snowflake,
                value.author_handle,
                value.author_label,
            )?,
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub struct UserRecord {
    pub user_snowflake: i64,
    pub handle: String,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.user_snowflake.cast_unsigned().into(),
            handle: UserHandle::new(value.handle)?,
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub struct CredentialRecord {
    pub user_snowflake: i64,
    pub handle: String,
    pub password_hash: Vec<u8>,
    pub password_salt: Vec<u8>,
}

impl TryFrom<CredentialRecord> for (User, PasswordDigest) {
    type Error = ModelValidationError;

    fn try_from(value: CredentialRecord) -> Result<Self, Self::Error> {
        use stammtisch_common::model::auth::InvalidTokenHashError;

        let user = User {
            id: value.user_snowflake.cast_unsigned().into(),
            handle: UserHandle::new(value.handle)?,
        };
        let digest = PasswordDigest {
            hash: value
                .password_hash
                .into_boxed_slice()
                .try_into()
                .map_err(|_| InvalidTokenHashError)?,
            salt: value
                .password_salt
                .as_slice()
                .try_into()
                .map_err(|_| InvalidTokenHashError)?,
        };

        Ok((user, digest))
    }
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub struct SessionRecord {
    pub user_snowflake: i64,
    pub token_hash: Vec<u8>,
    pub created_at: PrimitiveDateTime,
    pub expires_after_seconds: Option<i64>,
}

impl TryFrom<SessionRecord> for Session {
    type Error = ModelValidationError;

    fn try_from(value: SessionRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: value.user_snowflake.cast_unsigned().into(),
            token_hash: value.token_hash.into_boxed_slice().try_into()?,
            created_at: value.created_at.as_utc(),
            expires_after: value
                .expires_after_seconds
                .map(|seconds| Duration::seconds(seconds).try_into())
                .transpose()?,
        })
    }
}
